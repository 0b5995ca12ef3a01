//! Kernel promises.

use {
    crate::{
        delivery::{CapData, KernelMessage},
        error::{Counter, KernelError, Result},
        kref::{Kref, VatId},
    },
    serde::{Deserialize, Serialize},
    std::collections::{BTreeMap, BTreeSet, VecDeque},
};

/// State of a promise.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum PromiseState
{
    /// Not yet resolved.
    Unresolved{
        /// Vat that may resolve the promise.
        ///
        /// [`None`] means the kernel decides it,
        /// which is the case for the result of a message in flight.
        decider: Option<VatId>,

        /// Vats to notify upon resolution.
        subscribers: BTreeSet<VatId>,

        /// Messages sent to the promise, in the order they were sent.
        queue: VecDeque<KernelMessage>,
    },

    #[allow(missing_docs)]
    Fulfilled{data: CapData<Kref>},

    #[allow(missing_docs)]
    Rejected{data: CapData<Kref>},
}

/// Record of a kernel promise.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct KernelPromise
{
    #[allow(missing_docs)]
    pub state: PromiseState,

    /// Number of holders of the promise.
    pub refcount: u32,
}

impl KernelPromise
{
    /// Whether the promise is resolved.
    pub fn is_resolved(&self) -> bool
    {
        !matches!(self.state, PromiseState::Unresolved{..})
    }

    /// The decider, if the promise is unresolved.
    pub fn decider(&self) -> Option<VatId>
    {
        match &self.state {
            PromiseState::Unresolved{decider, ..} => *decider,
            _ => None,
        }
    }

    /// Whether the promise was rejected, and with what,
    /// if the promise is resolved.
    pub fn resolution(&self) -> Option<(bool, &CapData<Kref>)>
    {
        match &self.state {
            PromiseState::Unresolved{..}  => None,
            PromiseState::Fulfilled{data} => Some((false, data)),
            PromiseState::Rejected{data}  => Some((true, data)),
        }
    }
}

/// What a promise held just before it was resolved.
pub struct Settled
{
    /// Subscribers that are now owed a notification.
    pub subscribers: BTreeSet<VatId>,

    /// Messages that must now be sent on to the resolution.
    pub queue: VecDeque<KernelMessage>,
}

/// All live kernel promises.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PromiseTable
{
    promises: BTreeMap<Kref, KernelPromise>,
    next_id: u64,
}

impl PromiseTable
{
    /// Create an empty table whose first promise will be `kp<first_id>`.
    pub fn new(first_id: u64) -> Self
    {
        Self{promises: BTreeMap::new(), next_id: first_id}
    }

    /// Mint a new unresolved promise with a zero refcount.
    pub fn create_promise(&mut self, decider: Option<VatId>) -> Kref
    {
        let kref = Kref::promise(self.next_id);
        self.next_id += 1;
        let state = PromiseState::Unresolved{
            decider,
            subscribers: BTreeSet::new(),
            queue: VecDeque::new(),
        };
        self.promises.insert(kref, KernelPromise{state, refcount: 0});
        kref
    }

    #[allow(missing_docs)]
    pub fn get(&self, kref: Kref) -> Option<&KernelPromise>
    {
        self.promises.get(&kref)
    }

    #[allow(missing_docs)]
    pub fn contains(&self, kref: Kref) -> bool
    {
        self.promises.contains_key(&kref)
    }

    /// Look up a promise that must exist.
    pub fn promise(&self, kref: Kref) -> Result<&KernelPromise>
    {
        self.promises.get(&kref).ok_or(KernelError::UnknownKref(kref))
    }

    #[allow(missing_docs)]
    pub fn inc_refcount(&mut self, kref: Kref) -> Result<u32>
    {
        let promise = self.promise_mut(kref)?;
        promise.refcount = promise.refcount.checked_add(1)
            .ok_or(KernelError::Overflow{kref, counter: Counter::Refcount})?;
        Ok(promise.refcount)
    }

    #[allow(missing_docs)]
    pub fn dec_refcount(&mut self, kref: Kref) -> Result<u32>
    {
        let promise = self.promise_mut(kref)?;
        promise.refcount = promise.refcount.checked_sub(1)
            .ok_or(KernelError::Underflow{kref, counter: Counter::Refcount})?;
        Ok(promise.refcount)
    }

    /// Hand the decision of an unresolved promise to another party.
    pub fn set_decider(&mut self, kref: Kref, new: Option<VatId>) -> Result<()>
    {
        match &mut self.promise_mut(kref)?.state {
            PromiseState::Unresolved{decider, ..} => { *decider = new; Ok(()) },
            _ => Err(KernelError::PromiseState(kref)),
        }
    }

    /// Add a subscriber to an unresolved promise.
    pub fn subscribe(&mut self, kref: Kref, vat: VatId) -> Result<()>
    {
        match &mut self.promise_mut(kref)?.state {
            PromiseState::Unresolved{subscribers, ..} => {
                subscribers.insert(vat);
                Ok(())
            },
            _ => Err(KernelError::PromiseState(kref)),
        }
    }

    /// Remove a vat from the subscribers of every unresolved promise.
    pub fn unsubscribe_all(&mut self, vat: VatId)
    {
        for promise in self.promises.values_mut() {
            if let PromiseState::Unresolved{subscribers, ..} = &mut promise.state {
                subscribers.remove(&vat);
            }
        }
    }

    /// Append a message to the queue of an unresolved promise.
    pub fn enqueue(&mut self, kref: Kref, message: KernelMessage) -> Result<()>
    {
        match &mut self.promise_mut(kref)?.state {
            PromiseState::Unresolved{queue, ..} => {
                queue.push_back(message);
                Ok(())
            },
            _ => Err(KernelError::PromiseState(kref)),
        }
    }

    /// Move an unresolved promise to its final state.
    ///
    /// Returns the subscribers and queued messages,
    /// which the caller must now deal with.
    pub fn settle(&mut self, kref: Kref, rejected: bool, data: CapData<Kref>)
        -> Result<Settled>
    {
        let promise = self.promise_mut(kref)?;
        let state = if rejected {
            PromiseState::Rejected{data}
        } else {
            PromiseState::Fulfilled{data}
        };
        match std::mem::replace(&mut promise.state, state) {
            PromiseState::Unresolved{subscribers, queue, ..} =>
                Ok(Settled{subscribers, queue}),
            previous => {
                promise.state = previous;
                Err(KernelError::PromiseState(kref))
            },
        }
    }

    /// Unresolved promises decided by the given vat.
    pub fn decided_by(&self, vat: VatId) -> Vec<Kref>
    {
        self.promises.iter()
            .filter(|(_, p)| p.decider() == Some(vat))
            .map(|(&k, _)| k)
            .collect()
    }

    /// Remove a promise from the table.
    pub fn delete(&mut self, kref: Kref) -> Result<KernelPromise>
    {
        self.promises.remove(&kref).ok_or(KernelError::UnknownKref(kref))
    }

    /// All promises, in kref order.
    pub fn iter(&self) -> impl Iterator<Item=(Kref, &KernelPromise)>
    {
        self.promises.iter().map(|(&k, p)| (k, p))
    }

    fn promise_mut(&mut self, kref: Kref) -> Result<&mut KernelPromise>
    {
        self.promises.get_mut(&kref).ok_or(KernelError::UnknownKref(kref))
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, crate::delivery::Message};

    #[test]
    fn settle_hands_back_queue_and_subscribers()
    {
        let mut table = PromiseTable::new(40);
        let kp = table.create_promise(Some(VatId(1)));
        assert_eq!(kp, Kref::promise(40));

        table.subscribe(kp, VatId(2)).unwrap();
        table.enqueue(kp, Message::new("a", CapData::new("[]", []))).unwrap();
        table.enqueue(kp, Message::new("b", CapData::new("[]", []))).unwrap();

        let settled = table.settle(kp, false, CapData::new("1", [])).unwrap();
        assert_eq!(settled.subscribers.into_iter().collect::<Vec<_>>(), [VatId(2)]);
        let methods: Vec<_> = settled.queue.iter().map(|m| &m.method[..]).collect();
        assert_eq!(methods, ["a", "b"]);

        let promise = table.promise(kp).unwrap();
        assert!(promise.is_resolved());
        assert_eq!(promise.decider(), None);
        assert_eq!(promise.resolution().map(|r| r.0), Some(false));
    }

    #[test]
    fn settle_is_terminal()
    {
        let mut table = PromiseTable::new(40);
        let kp = table.create_promise(None);
        table.settle(kp, true, CapData::error("first")).unwrap();
        assert!(matches!(
            table.settle(kp, false, CapData::new("2", [])),
            Err(KernelError::PromiseState(_)),
        ));
        assert_eq!(table.promise(kp).unwrap().resolution().map(|r| r.0), Some(true));
        assert!(table.enqueue(kp, Message::new("x", CapData::new("[]", []))).is_err());
    }

    #[test]
    fn decided_by()
    {
        let mut table = PromiseTable::new(40);
        let a = table.create_promise(Some(VatId(1)));
        let _ = table.create_promise(Some(VatId(2)));
        let c = table.create_promise(Some(VatId(1)));
        table.settle(c, false, CapData::new("0", [])).unwrap();
        assert_eq!(table.decided_by(VatId(1)), [a]);
    }

    #[test]
    fn refcount_underflow()
    {
        let mut table = PromiseTable::new(40);
        let kp = table.create_promise(None);
        assert_eq!(table.inc_refcount(kp), Ok(1));
        assert_eq!(table.dec_refcount(kp), Ok(0));
        assert_eq!(
            table.dec_refcount(kp),
            Err(KernelError::Underflow{kref: kp, counter: Counter::Refcount}),
        );
    }
}
