//! Per-vat translation tables between vrefs and krefs.

use {
    crate::{
        error::{KernelError, Result},
        kref::{Kref, RefKind, VatId, Vref},
    },
    serde::{Deserialize, Serialize},
    std::collections::{BTreeMap, BTreeSet},
};

mod translate;

/// C-list entry of one kref.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClistEntry
{
    /// How the vat refers to the kref.
    pub vref: Vref,

    /// For an import of an object, whether the vat holds a reachable claim
    /// as opposed to merely a recognizable one.
    /// For an export of an object, whether the owner still believes
    /// the object to be reachable, i.e. has not been told `dropExports`.
    /// Always set for promises.
    pub reachable: bool,
}

/// Bijection between the vrefs of one vat and krefs.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Clist
{
    vat: VatId,
    krefs: BTreeMap<Vref, Kref>,
    entries: BTreeMap<Kref, ClistEntry>,
    next_object_import: u64,
    next_promise_import: u64,

    /// Promise exports whose entries were removed.
    /// The vat may not mention these again.
    #[serde(default)]
    spent_promises: BTreeSet<Vref>,
}

impl Clist
{
    /// Create an empty c-list for the given vat.
    pub fn new(vat: VatId, first_object_import: u64, first_promise_import: u64)
        -> Self
    {
        Self{
            vat,
            krefs: BTreeMap::new(),
            entries: BTreeMap::new(),
            next_object_import: first_object_import,
            next_promise_import: first_promise_import,
            spent_promises: BTreeSet::new(),
        }
    }

    #[allow(missing_docs)]
    pub fn kref(&self, vref: Vref) -> Option<Kref>
    {
        self.krefs.get(&vref).copied()
    }

    #[allow(missing_docs)]
    pub fn entry(&self, kref: Kref) -> Option<&ClistEntry>
    {
        self.entries.get(&kref)
    }

    #[allow(missing_docs)]
    pub fn contains(&self, kref: Kref) -> bool
    {
        self.entries.contains_key(&kref)
    }

    /// Whether the entry for the kref exists and has its reachable flag set.
    pub fn is_reachable(&self, kref: Kref) -> bool
    {
        self.entries.get(&kref).map_or(false, |e| e.reachable)
    }

    /// Change the reachable flag of an entry.
    ///
    /// Returns the previous value of the flag,
    /// or [`None`] if there is no entry.
    pub fn set_reachable(&mut self, kref: Kref, reachable: bool) -> Option<bool>
    {
        let entry = self.entries.get_mut(&kref)?;
        Some(std::mem::replace(&mut entry.reachable, reachable))
    }

    /// Add an entry.
    ///
    /// Neither the vref nor the kref may already be in the c-list.
    pub fn insert(&mut self, vref: Vref, kref: Kref, reachable: bool)
        -> Result<()>
    {
        if self.krefs.contains_key(&vref) {
            return Err(KernelError::DuplicateVref(self.vat, vref));
        }
        if self.entries.contains_key(&kref) {
            return Err(KernelError::DuplicateKref(self.vat, kref));
        }
        self.krefs.insert(vref, kref);
        self.entries.insert(kref, ClistEntry{vref, reachable});
        Ok(())
    }

    /// Allocate a fresh import vref of the given kind.
    pub fn allocate_import(&mut self, kind: RefKind) -> Vref
    {
        match kind {
            RefKind::Object => {
                let id = self.next_object_import;
                self.next_object_import += 1;
                Vref::object_import(id)
            },
            RefKind::Promise => {
                let id = self.next_promise_import;
                self.next_promise_import += 1;
                Vref::promise_import(id)
            },
        }
    }

    /// Remove the entry for a kref, returning it.
    ///
    /// A removed promise export is spent for good.
    pub fn remove(&mut self, kref: Kref) -> Option<ClistEntry>
    {
        let entry = self.entries.remove(&kref)?;
        self.krefs.remove(&entry.vref);
        if entry.vref.is_promise() && entry.vref.is_export() {
            self.spent_promises.insert(entry.vref);
        }
        Some(entry)
    }

    /// Whether the vref is a promise export the vat already gave up.
    pub fn is_spent(&self, vref: Vref) -> bool
    {
        self.spent_promises.contains(&vref)
    }

    /// All entries, in kref order.
    pub fn iter(&self) -> impl Iterator<Item=(Kref, &ClistEntry)>
    {
        self.entries.iter().map(|(&k, e)| (k, e))
    }

    /// Take all entries, in kref order.
    pub fn into_entries(self) -> impl Iterator<Item=(Kref, ClistEntry)>
    {
        self.entries.into_iter()
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn bijection()
    {
        let mut clist = Clist::new(VatId(1), 50, 60);
        let vref = Vref::object_export(101);
        clist.insert(vref, Kref::object(20), true).unwrap();

        assert_eq!(clist.kref(vref), Some(Kref::object(20)));
        assert_eq!(clist.entry(Kref::object(20)).map(|e| e.vref), Some(vref));

        assert_eq!(clist.insert(vref, Kref::object(21), true),
                   Err(KernelError::DuplicateVref(VatId(1), vref)));
        assert_eq!(clist.insert(Vref::object_export(102), Kref::object(20), true),
                   Err(KernelError::DuplicateKref(VatId(1), Kref::object(20))));

        assert!(clist.remove(Kref::object(20)).is_some());
        assert_eq!(clist.kref(vref), None);
        assert!(clist.is_empty());
    }

    #[test]
    fn removed_promise_export_is_spent()
    {
        let mut clist = Clist::new(VatId(1), 50, 60);
        let export = Vref::promise_export(1);
        let import = Vref::promise_import(60);
        clist.insert(export, Kref::promise(40), true).unwrap();
        clist.insert(import, Kref::promise(41), true).unwrap();
        assert!(!clist.is_spent(export));

        clist.remove(Kref::promise(40));
        clist.remove(Kref::promise(41));
        assert!(clist.is_spent(export));
        assert!(!clist.is_spent(import));
        assert!(clist.is_empty());
    }

    #[test]
    fn import_allocation()
    {
        let mut clist = Clist::new(VatId(1), 50, 60);
        assert_eq!(clist.allocate_import(RefKind::Object), Vref::object_import(50));
        assert_eq!(clist.allocate_import(RefKind::Promise), Vref::promise_import(60));
        assert_eq!(clist.allocate_import(RefKind::Object), Vref::object_import(51));
    }

    #[test]
    fn reachable_flag()
    {
        let mut clist = Clist::new(VatId(1), 50, 60);
        let kref = Kref::object(20);
        assert_eq!(clist.set_reachable(kref, false), None);
        clist.insert(Vref::object_import(50), kref, true).unwrap();
        assert!(clist.is_reachable(kref));
        assert_eq!(clist.set_reachable(kref, false), Some(true));
        assert_eq!(clist.set_reachable(kref, false), Some(false));
        assert!(!clist.is_reachable(kref));
    }
}
