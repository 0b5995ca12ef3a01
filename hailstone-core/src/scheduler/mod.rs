//! The run-queue and promise resolution.

use {
    crate::{
        delivery::{CapData, KernelMessage},
        error::Result,
        kref::{Kref, VatId},
        state::{Holder, KernelState},
    },
    serde::{Deserialize, Serialize},
    std::collections::VecDeque,
    tracing::debug,
};

/// Pending unit of message traffic.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum RunQueueEntry
{
    /// Deliver a message to an object or promise.
    Send{target: Kref, message: KernelMessage},

    /// Tell a subscriber that a promise was resolved.
    Notify{vat: VatId, promise: Kref},
}

impl RunQueueEntry
{
    /// Every reference the entry holds.
    pub fn references(&self) -> Vec<Kref>
    {
        match self {
            Self::Send{target, message} =>
                Some(target).into_iter().chain(message.references())
                    .copied().collect(),
            Self::Notify{promise, ..} =>
                vec![*promise],
        }
    }
}

/// First-in first-out queue of message traffic.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RunQueue(VecDeque<RunQueueEntry>);

impl RunQueue
{
    #[allow(missing_docs)]
    pub fn push_back(&mut self, entry: RunQueueEntry)
    {
        self.0.push_back(entry);
    }

    #[allow(missing_docs)]
    pub fn pop_front(&mut self) -> Option<RunQueueEntry>
    {
        self.0.pop_front()
    }

    /// Entries, from first to last.
    pub fn iter(&self) -> impl Iterator<Item=&RunQueueEntry>
    {
        self.0.iter()
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize
    {
        self.0.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool
    {
        self.0.is_empty()
    }
}

impl KernelState
{
    /// Send a message to an object or promise.
    ///
    /// A message for an unresolved promise waits in the promise's queue;
    /// anything else goes on the run-queue and is routed when delivered.
    pub (crate) fn send(&mut self, target: Kref, message: KernelMessage)
        -> Result<()>
    {
        let unresolved = target.is_promise()
            && !self.promises.promise(target)?.is_resolved();
        if unresolved {
            self.retain_message(&message, Holder::PromiseQueue(target))?;
            self.promises.enqueue(target, message)?;
        } else {
            self.check_exists(target)?;
            self.retain(target, Holder::RunQueue)?;
            self.retain_message(&message, Holder::RunQueue)?;
            self.run_queue.push_back(RunQueueEntry::Send{target, message});
        }
        Ok(())
    }

    /// Ask for a notification when the promise is resolved.
    ///
    /// If it already is, the notification is queued right away.
    pub (crate) fn subscribe(&mut self, vat: VatId, promise: Kref) -> Result<()>
    {
        if self.promises.promise(promise)?.is_resolved() {
            self.queue_notify(vat, promise)
        } else {
            self.promises.subscribe(promise, vat)
        }
    }

    /// Resolve an unresolved promise.
    ///
    /// The resolution data becomes a holder of its slots.
    /// Each subscriber gets a notification,
    /// and each queued message goes to the run-queue,
    /// aimed at the object the promise was fulfilled to, if any.
    pub (crate) fn resolve_promise(&mut self, promise: Kref, rejected: bool,
                                   data: CapData<Kref>)
        -> Result<()>
    {
        self.retain_slots(&data, Holder::PromiseData(promise))?;
        let target = match data.presence() {
            Some(&object) if !rejected && object.is_object() => object,
            _ => promise,
        };
        let settled = self.promises.settle(promise, rejected, data)?;
        debug!(promise = %promise, rejected, "resolved");

        for vat in settled.subscribers {
            if self.is_alive(vat) {
                self.queue_notify(vat, promise)?;
            }
        }

        for message in settled.queue {
            // The message keeps its holds on its arguments and result;
            // only the target is newly held.
            self.retain(target, Holder::RunQueue)?;
            self.run_queue.push_back(RunQueueEntry::Send{target, message});
        }

        Ok(())
    }

    fn queue_notify(&mut self, vat: VatId, promise: Kref) -> Result<()>
    {
        self.retain(promise, Holder::RunQueue)?;
        self.run_queue.push_back(RunQueueEntry::Notify{vat, promise});
        Ok(())
    }
}
