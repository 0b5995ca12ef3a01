//! The reference table: kernel objects and their counters.
//!
//! Every object has two counters.
//! The reachable count is the number of holders that could send to it;
//! the recognizable count is the number of holders that could compare it
//! for identity, and is never smaller than the reachable count.
//! The owner's own export claim is not counted;
//! it is represented by [`KernelObject::owner`].

use {
    crate::{
        error::{Counter, KernelError, Result},
        kref::{Kref, VatId},
    },
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
};

/// Record of a kernel object.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct KernelObject
{
    /// Vat that exported the object.
    ///
    /// [`None`] once the owner retired the object or was terminated.
    pub owner: Option<VatId>,

    #[allow(missing_docs)]
    pub reachable: u32,

    #[allow(missing_docs)]
    pub recognizable: u32,
}

/// Snapshot of the counters of an object.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Counts
{
    pub reachable: u32,
    pub recognizable: u32,
}

/// All live kernel objects.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ObjectTable
{
    objects: BTreeMap<Kref, KernelObject>,
    next_id: u64,
}

impl ObjectTable
{
    /// Create an empty table whose first object will be `ko<first_id>`.
    pub fn new(first_id: u64) -> Self
    {
        Self{objects: BTreeMap::new(), next_id: first_id}
    }

    /// Mint a new object exported by `owner`, with zero counts.
    pub fn create_object(&mut self, owner: VatId) -> Kref
    {
        let kref = Kref::object(self.next_id);
        self.next_id += 1;
        let object = KernelObject{owner: Some(owner), reachable: 0, recognizable: 0};
        self.objects.insert(kref, object);
        kref
    }

    #[allow(missing_docs)]
    pub fn get(&self, kref: Kref) -> Option<&KernelObject>
    {
        self.objects.get(&kref)
    }

    #[allow(missing_docs)]
    pub fn contains(&self, kref: Kref) -> bool
    {
        self.objects.contains_key(&kref)
    }

    /// The counters of an object.
    pub fn lookup(&self, kref: Kref) -> Result<Counts>
    {
        let object = self.object(kref)?;
        Ok(Counts{
            reachable:    object.reachable,
            recognizable: object.recognizable,
        })
    }

    /// The owner of an object.
    pub fn owner(&self, kref: Kref) -> Result<Option<VatId>>
    {
        Ok(self.object(kref)?.owner)
    }

    /// Change the owner of an object.
    ///
    /// Setting the owner to [`None`] is irreversible in practice:
    /// no vat can export an existing kref.
    pub fn set_owner(&mut self, kref: Kref, owner: Option<VatId>) -> Result<()>
    {
        self.object_mut(kref)?.owner = owner;
        Ok(())
    }

    #[allow(missing_docs)]
    pub fn inc_reachable(&mut self, kref: Kref, n: u32) -> Result<u32>
    {
        let object = self.object_mut(kref)?;
        object.reachable = object.reachable.checked_add(n)
            .ok_or(KernelError::Overflow{kref, counter: Counter::Reachable})?;
        check_order(kref, object)?;
        Ok(object.reachable)
    }

    #[allow(missing_docs)]
    pub fn dec_reachable(&mut self, kref: Kref, n: u32) -> Result<u32>
    {
        let object = self.object_mut(kref)?;
        object.reachable = object.reachable.checked_sub(n)
            .ok_or(KernelError::Underflow{kref, counter: Counter::Reachable})?;
        Ok(object.reachable)
    }

    #[allow(missing_docs)]
    pub fn inc_recognizable(&mut self, kref: Kref, n: u32) -> Result<u32>
    {
        let object = self.object_mut(kref)?;
        object.recognizable = object.recognizable.checked_add(n)
            .ok_or(KernelError::Overflow{kref, counter: Counter::Recognizable})?;
        Ok(object.recognizable)
    }

    #[allow(missing_docs)]
    pub fn dec_recognizable(&mut self, kref: Kref, n: u32) -> Result<u32>
    {
        let object = self.object_mut(kref)?;
        object.recognizable = object.recognizable.checked_sub(n)
            .ok_or(KernelError::Underflow{kref, counter: Counter::Recognizable})?;
        check_order(kref, object)?;
        Ok(object.recognizable)
    }

    /// Remove an object from the table.
    ///
    /// Only objects that nobody can recognize
    /// and whose owner gave up its export may be deleted.
    pub fn delete(&mut self, kref: Kref) -> Result<KernelObject>
    {
        let object = self.object(kref)?;
        if let Some(owner) = object.owner {
            return Err(KernelError::DeleteOwnedObject(kref, owner));
        }
        if object.recognizable != 0 {
            return Err(KernelError::DeleteRecognizedObject(kref));
        }
        self.objects.remove(&kref).ok_or(KernelError::UnknownKref(kref))
    }

    /// All objects, in kref order.
    pub fn iter(&self) -> impl Iterator<Item=(Kref, &KernelObject)>
    {
        self.objects.iter().map(|(&k, o)| (k, o))
    }

    /// Make every object owned by `vat` ownerless.
    ///
    /// Returns the orphaned krefs.
    pub fn orphan_all(&mut self, vat: VatId) -> Vec<Kref>
    {
        self.objects.iter_mut()
            .filter(|(_, o)| o.owner == Some(vat))
            .map(|(&k, o)| { o.owner = None; k })
            .collect()
    }

    fn object(&self, kref: Kref) -> Result<&KernelObject>
    {
        self.objects.get(&kref).ok_or(KernelError::UnknownKref(kref))
    }

    fn object_mut(&mut self, kref: Kref) -> Result<&mut KernelObject>
    {
        self.objects.get_mut(&kref).ok_or(KernelError::UnknownKref(kref))
    }
}

fn check_order(kref: Kref, object: &KernelObject) -> Result<()>
{
    if object.reachable > object.recognizable {
        return Err(KernelError::ReachableExceedsRecognizable{
            kref,
            reachable: object.reachable,
            recognizable: object.recognizable,
        });
    }
    Ok(())
}
