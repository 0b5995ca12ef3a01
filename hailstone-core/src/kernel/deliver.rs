//! Turning queued work into deliveries.

use {
    crate::{
        delivery::{CapData, KernelMessage, Message, Resolution, VatDelivery},
        error::{KernelError, Result},
        gc::GcAction,
        kref::{Kref, VatId},
        promise::PromiseState,
        scheduler::RunQueueEntry,
        state::{Holder, KernelState},
    },
    tracing::debug,
};

/// Unit of work for one crank.
#[derive(Clone, Debug)]
pub (crate) enum Work
{
    Run(RunQueueEntry),
    Gc(GcAction),
}

/// Where a message ends up.
enum Route
{
    /// To an object owned by a live vat.
    Deliver(VatId, Kref),

    /// Onto the queue of an unresolved promise.
    Park(Kref),

    /// Nowhere; its result promise is rejected with this data.
    Reject(CapData<Kref>),
}

impl KernelState
{
    /// Take the next unit of work.
    ///
    /// Message traffic comes first;
    /// GC actions are only considered once the run-queue is empty.
    pub (crate) fn take_work(&mut self) -> Option<Work>
    {
        if let Some(entry) = self.run_queue.pop_front() {
            return Some(Work::Run(entry));
        }
        self.next_gc_action().map(Work::Gc)
    }

    /// Whether preparing the work will yield a delivery to a vat.
    pub (crate) fn reaches_vat(&self, work: &Work) -> Result<bool>
    {
        match work {
            Work::Run(RunQueueEntry::Send{target, ..}) =>
                Ok(matches!(self.route(*target)?, Route::Deliver(..))),
            Work::Run(RunQueueEntry::Notify{vat, ..}) =>
                Ok(self.is_alive(*vat)),
            Work::Gc(_) =>
                Ok(true),
        }
    }

    /// Apply the kernel side of a unit of work.
    ///
    /// Returns the delivery to make, if any.
    /// Work that the kernel can finish on its own returns [`None`].
    pub (crate) fn prepare(&mut self, work: Work)
        -> Result<Option<(VatId, VatDelivery)>>
    {
        match work {
            Work::Run(RunQueueEntry::Send{target, message}) =>
                self.prepare_send(target, message),
            Work::Run(RunQueueEntry::Notify{vat, promise}) =>
                self.prepare_notify(vat, promise),
            Work::Gc(action) => {
                let delivery = self.prepare_gc_action(action)?;
                Ok(Some((action.vat, delivery)))
            },
        }
    }

    /// Consume a unit of work without delivering it.
    ///
    /// This is what happens to the work of a crank that failed.
    pub (crate) fn abandon(&mut self, work: Work, reason: &str) -> Result<()>
    {
        match work {
            Work::Run(RunQueueEntry::Send{target, message}) => {
                self.release(target, Holder::RunQueue)?;
                self.drop_message(message, CapData::error(reason))
            },
            Work::Run(RunQueueEntry::Notify{promise, ..}) =>
                self.release(promise, Holder::RunQueue),
            Work::Gc(_) =>
                Ok(()),
        }
    }

    fn route(&self, target: Kref) -> Result<Route>
    {
        let mut target = target;
        loop {
            if target.is_object() {
                let route = match self.objects.owner(target)? {
                    Some(owner) => Route::Deliver(owner, target),
                    None => Route::Reject(CapData::error("Object has no owner")),
                };
                return Ok(route);
            }
            match &self.promises.promise(target)?.state {
                PromiseState::Unresolved{..} =>
                    return Ok(Route::Park(target)),
                PromiseState::Rejected{data} =>
                    return Ok(Route::Reject(data.clone())),
                PromiseState::Fulfilled{data} =>
                    match data.presence() {
                        Some(&object) if object.is_object() => target = object,
                        _ => return Ok(Route::Reject(
                            CapData::error("Promise was fulfilled to a non-object"),
                        )),
                    },
            }
        }
    }

    fn prepare_send(&mut self, target: Kref, message: KernelMessage)
        -> Result<Option<(VatId, VatDelivery)>>
    {
        match self.route(target)? {
            Route::Deliver(vat, object) => {
                // Translate first, so that the vat's new claims are in place
                // before the run-queue lets go of the references.
                let target_vref = self.kref_to_vref(vat, object)?;
                let args = message.args.map_slots(|&k| self.kref_to_vref(vat, k))?;
                let result = match message.result {
                    Some(promise) => {
                        self.promises.set_decider(promise, Some(vat))?;
                        Some(self.kref_to_vref(vat, promise)?)
                    },
                    None => None,
                };
                self.release(target, Holder::RunQueue)?;
                self.release_message(&message, Holder::RunQueue)?;
                let message = Message{method: message.method, args, result};
                Ok(Some((vat, VatDelivery::Message{target: target_vref, message})))
            },

            Route::Park(promise) => {
                debug!(promise = %promise, method = %message.method, "parked message");
                self.release(target, Holder::RunQueue)?;
                self.promises.enqueue(promise, message)?;
                Ok(None)
            },

            Route::Reject(data) => {
                debug!(kref = %target, method = %message.method, "undeliverable message");
                self.release(target, Holder::RunQueue)?;
                self.drop_message(message, data)?;
                Ok(None)
            },
        }
    }

    fn prepare_notify(&mut self, vat: VatId, promise: Kref)
        -> Result<Option<(VatId, VatDelivery)>>
    {
        if !self.is_alive(vat) {
            debug!(vat = %vat, promise = %promise, "notify for terminated vat");
            self.release(promise, Holder::RunQueue)?;
            return Ok(None);
        }

        let (rejected, data) = match self.promises.promise(promise)?.resolution() {
            Some((rejected, data)) => (rejected, data.clone()),
            None => return Err(KernelError::PromiseState(promise)),
        };

        let vpid = self.kref_to_vref(vat, promise)?;
        let data = data.map_slots(|&k| self.kref_to_vref(vat, k))?;

        // The subscriber is done with the promise once told;
        // the slots of the data now live on in its c-list.
        self.forget_promise(vat, promise)?;
        self.release(promise, Holder::RunQueue)?;

        let resolution = Resolution{promise: vpid, rejected, data};
        Ok(Some((vat, VatDelivery::Notify{resolutions: vec![resolution]})))
    }

    /// Release a message taken off the run-queue that will not be delivered,
    /// rejecting its result promise.
    fn drop_message(&mut self, message: KernelMessage, rejection: CapData<Kref>)
        -> Result<()>
    {
        self.release_slots(&message.args, Holder::RunQueue)?;
        if let Some(result) = message.result {
            if !self.promises.promise(result)?.is_resolved() {
                self.resolve_promise(result, true, rejection)?;
            }
            self.release(result, Holder::RunQueue)?;
        }
        Ok(())
    }
}
