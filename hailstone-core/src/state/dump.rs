use {
    super::KernelState,
    crate::{
        delivery::CapData,
        gc::GcAction,
        kref::{Kref, VatId, Vref},
        promise::PromiseState,
        scheduler::RunQueueEntry,
    },
    serde::{Deserialize, Serialize},
};

/// Read-only snapshot of the kernel tables, for tests and tooling.
#[allow(missing_docs)]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct KernelDump
{
    pub objects: Vec<ObjectRow>,
    pub promises: Vec<PromiseRow>,
    pub kernel_table: Vec<ClistRow>,
    pub gc_actions: Vec<GcAction>,
    pub run_queue: Vec<RunQueueEntry>,
    pub vats: Vec<VatRow>,
    pub terminated: Vec<VatId>,
    pub pins: Vec<PinRow>,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ObjectRow
{
    pub kref: Kref,
    pub owner: Option<VatId>,
    pub reachable: u32,
    pub recognizable: u32,
}

#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PromiseStatus
{
    Unresolved,
    Fulfilled,
    Rejected,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PromiseRow
{
    pub kref: Kref,
    pub status: PromiseStatus,
    pub decider: Option<VatId>,
    pub subscribers: Vec<VatId>,
    pub queued: usize,
    pub refcount: u32,
    pub data: Option<CapData<Kref>>,
}

/// One c-list entry.
#[allow(missing_docs)]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClistRow
{
    pub vat: VatId,
    pub vref: Vref,
    pub kref: Kref,
    pub reachable: bool,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct VatRow
{
    pub id: VatId,
    pub name: String,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PinRow
{
    pub kref: Kref,
    pub count: u32,
}

impl KernelState
{
    /// Take a snapshot of the tables.
    pub fn dump(&self) -> KernelDump
    {
        let objects = self.objects.iter()
            .map(|(kref, o)| ObjectRow{
                kref,
                owner: o.owner,
                reachable: o.reachable,
                recognizable: o.recognizable,
            })
            .collect();

        let promises = self.promises.iter()
            .map(|(kref, p)| {
                let (status, subscribers, queued, data) = match &p.state {
                    PromiseState::Unresolved{subscribers, queue, ..} =>
                        (PromiseStatus::Unresolved,
                         subscribers.iter().copied().collect(), queue.len(), None),
                    PromiseState::Fulfilled{data} =>
                        (PromiseStatus::Fulfilled, vec![], 0, Some(data.clone())),
                    PromiseState::Rejected{data} =>
                        (PromiseStatus::Rejected, vec![], 0, Some(data.clone())),
                };
                PromiseRow{
                    kref,
                    status,
                    decider: p.decider(),
                    subscribers,
                    queued,
                    refcount: p.refcount,
                    data,
                }
            })
            .collect();

        let kernel_table = self.vats.iter()
            .flat_map(|(&vat, r)| r.clist.iter().map(move |(kref, e)| ClistRow{
                vat,
                vref: e.vref,
                kref,
                reachable: e.reachable,
            }))
            .collect();

        KernelDump{
            objects,
            promises,
            kernel_table,
            gc_actions: self.gc_actions.iter().copied().collect(),
            run_queue:  self.run_queue.iter().cloned().collect(),
            vats: self.vats.iter()
                .map(|(&id, r)| VatRow{id, name: r.name.clone()})
                .collect(),
            terminated: self.terminated.iter().copied().collect(),
            pins: self.pins.iter()
                .map(|(&kref, &count)| PinRow{kref, count})
                .collect(),
        }
    }
}

impl KernelDump
{
    #[allow(missing_docs)]
    pub fn object(&self, kref: Kref) -> Option<&ObjectRow>
    {
        self.objects.iter().find(|o| o.kref == kref)
    }

    #[allow(missing_docs)]
    pub fn promise(&self, kref: Kref) -> Option<&PromiseRow>
    {
        self.promises.iter().find(|p| p.kref == kref)
    }

    /// Owner and counters of an object, if it exists.
    pub fn counts(&self, kref: Kref) -> Option<(Option<VatId>, u32, u32)>
    {
        self.object(kref).map(|o| (o.owner, o.reachable, o.recognizable))
    }

    /// How the vat refers to the kref, if it can.
    pub fn vref(&self, vat: VatId, kref: Kref) -> Option<Vref>
    {
        self.kernel_table.iter()
            .find(|r| r.vat == vat && r.kref == kref)
            .map(|r| r.vref)
    }

    /// Whether any vat's c-list mentions the kref.
    pub fn in_any_clist(&self, kref: Kref) -> bool
    {
        self.kernel_table.iter().any(|r| r.kref == kref)
    }
}
