//! The kernel tables, owned in one place.
//!
//! [`KernelState`] is an arena: every record is keyed by id,
//! and vats only ever refer to records through their c-lists.
//! Cloning it yields a checkpoint that a failed crank is rolled back to.

pub use self::{dump::*, holder::*};

use {
    crate::{
        clist::Clist,
        config::KernelConfig,
        error::{KernelError, Result},
        gc::GcActionSet,
        kref::{Kref, VatId, Vref},
        promise::PromiseTable,
        scheduler::RunQueue,
        table::ObjectTable,
    },
    serde::{Deserialize, Serialize},
    std::collections::{BTreeMap, BTreeSet},
};

mod audit;
mod dump;
mod holder;

/// Kernel-side record of a live vat.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct VatRecord
{
    /// Name given by the host.
    pub name: String,

    /// Translation table of the vat.
    pub clist: Clist,
}

/// All kernel tables.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct KernelState
{
    pub (crate) objects: ObjectTable,
    pub (crate) promises: PromiseTable,
    pub (crate) vats: BTreeMap<VatId, VatRecord>,
    pub (crate) terminated: BTreeSet<VatId>,
    pub (crate) run_queue: RunQueue,
    pub (crate) gc_actions: GcActionSet,

    /// References held on behalf of the host.
    pub (crate) pins: BTreeMap<Kref, u32>,

    /// Krefs whose counters dropped during the current crank.
    ///
    /// Always empty between cranks.
    #[serde(skip)]
    pub (crate) maybe_free: BTreeSet<Kref>,

    next_vat_id: u32,
    first_object_import: u64,
    first_promise_import: u64,
}

impl KernelState
{
    /// Empty tables.
    pub fn new(config: &KernelConfig) -> Self
    {
        Self{
            objects:              ObjectTable::new(config.first_object_id),
            promises:             PromiseTable::new(config.first_promise_id),
            vats:                 BTreeMap::new(),
            terminated:           BTreeSet::new(),
            run_queue:            RunQueue::default(),
            gc_actions:           GcActionSet::default(),
            pins:                 BTreeMap::new(),
            maybe_free:           BTreeSet::new(),
            next_vat_id:          1,
            first_object_import:  config.first_import_object_id,
            first_promise_import: config.first_import_promise_id,
        }
    }

    #[allow(missing_docs)]
    pub fn objects(&self) -> &ObjectTable
    {
        &self.objects
    }

    #[allow(missing_docs)]
    pub fn promises(&self) -> &PromiseTable
    {
        &self.promises
    }

    #[allow(missing_docs)]
    pub fn run_queue(&self) -> &RunQueue
    {
        &self.run_queue
    }

    #[allow(missing_docs)]
    pub fn gc_actions(&self) -> &GcActionSet
    {
        &self.gc_actions
    }

    /// Live vats, in id order.
    pub fn vats(&self) -> impl Iterator<Item=(VatId, &VatRecord)>
    {
        self.vats.iter().map(|(&id, r)| (id, r))
    }

    /// Record of a live vat.
    pub fn vat(&self, vat: VatId) -> Option<&VatRecord>
    {
        self.vats.get(&vat)
    }

    /// Whether the vat exists and was not terminated.
    pub fn is_alive(&self, vat: VatId) -> bool
    {
        self.vats.contains_key(&vat)
    }

    /// Whether the vat was terminated.
    pub fn is_terminated(&self, vat: VatId) -> bool
    {
        self.terminated.contains(&vat)
    }

    /// Id of the live vat with the given name.
    pub fn vat_id(&self, name: &str) -> Option<VatId>
    {
        self.vats.iter().find(|(_, r)| r.name == name).map(|(&id, _)| id)
    }

    /// Register a new vat with an empty c-list.
    pub fn add_vat(&mut self, name: &str) -> Result<VatId>
    {
        if self.vat_id(name).is_some() {
            return Err(KernelError::DuplicateVatName(name.to_owned()));
        }
        let id = VatId(self.next_vat_id);
        self.next_vat_id += 1;
        let clist = Clist::new(id, self.first_object_import,
                               self.first_promise_import);
        self.vats.insert(id, VatRecord{name: name.to_owned(), clist});
        Ok(id)
    }

    /// Register an object export of a vat, as if the vat had mentioned it.
    ///
    /// Registering the same vref again returns the same kref.
    pub fn add_export(&mut self, vat: VatId, vref: Vref) -> Result<Kref>
    {
        if !vref.is_object() || !vref.is_export() {
            return Err(KernelError::NotAnExport(vref));
        }
        let clist = &mut vat_mut(&mut self.vats, vat)?.clist;
        if let Some(kref) = clist.kref(vref) {
            return Ok(kref);
        }
        let kref = self.objects.create_object(vat);
        clist.insert(vref, kref, true)?;
        Ok(kref)
    }

    /// Whether no work is left: no queued messages and no GC actions.
    pub fn is_idle(&self) -> bool
    {
        self.run_queue.is_empty() && self.gc_actions.is_empty()
    }
}

/// Look up a live vat for modification.
///
/// This is a free function so that callers can keep borrowing
/// the other tables of the state while they hold the record.
pub (crate) fn vat_mut(vats: &mut BTreeMap<VatId, VatRecord>, vat: VatId)
    -> Result<&mut VatRecord>
{
    vats.get_mut(&vat).ok_or(KernelError::UnknownVat(vat))
}

/// Look up a live vat.
pub (crate) fn vat_ref(vats: &BTreeMap<VatId, VatRecord>, vat: VatId)
    -> Result<&VatRecord>
{
    vats.get(&vat).ok_or(KernelError::UnknownVat(vat))
}
