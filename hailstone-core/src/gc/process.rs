use {
    super::{GcAction, GcActionKind},
    crate::{
        delivery::VatDelivery,
        error::{KernelError, Result},
        kref::{Kref, RefKind},
        promise::PromiseState,
        state::{Holder, KernelState, vat_mut, vat_ref},
    },
    tracing::debug,
};

impl KernelState
{
    /// Deal with every kref whose counters fell during the crank.
    ///
    /// Objects nobody can reach get their owner scheduled for `dropExport`;
    /// objects nobody can recognize get `retireExport`, or are deleted
    /// outright when they have no owner.
    /// Promises with no holders are deleted, which releases whatever
    /// their queue or resolution data held; this repeats until nothing
    /// more can be freed.
    pub (crate) fn process_refcounts(&mut self) -> Result<()>
    {
        while let Some(kref) = self.maybe_free.pop_first() {
            match kref.kind {
                RefKind::Object  => self.process_object(kref)?,
                RefKind::Promise => self.process_promise(kref)?,
            }
        }
        Ok(())
    }

    fn process_object(&mut self, kref: Kref) -> Result<()>
    {
        let Some(object) = self.objects.get(kref) else { return Ok(()) };
        if object.reachable > 0 {
            return Ok(());
        }
        let (owner, recognizable) = (object.owner, object.recognizable);

        match owner {
            Some(owner) => {
                let clist = &vat_ref(&self.vats, owner)?.clist;
                let entry = clist.entry(kref)
                    .ok_or(KernelError::OwnerWithoutExport{vat: owner, kref})?;
                if entry.reachable {
                    let action = GcAction{vat: owner, kind: GcActionKind::DropExport, kref};
                    if self.gc_actions.insert(action) {
                        debug!(action = %action, "scheduled");
                    }
                }
                if recognizable == 0 {
                    let action = GcAction{vat: owner, kind: GcActionKind::RetireExport, kref};
                    if self.gc_actions.insert(action) {
                        debug!(action = %action, "scheduled");
                    }
                }
            },
            None =>
                if recognizable == 0 {
                    self.objects.delete(kref)?;
                    debug!(kref = %kref, "deleted object");
                },
        }

        Ok(())
    }

    fn process_promise(&mut self, kref: Kref) -> Result<()>
    {
        match self.promises.get(kref) {
            Some(promise) if promise.refcount == 0 => (),
            _ => return Ok(()),
        }

        let promise = self.promises.delete(kref)?;
        debug!(kref = %kref, "deleted promise");
        match promise.state {
            PromiseState::Unresolved{queue, ..} =>
                for message in &queue {
                    self.release_message(message, Holder::PromiseQueue(kref))?;
                },
            PromiseState::Fulfilled{data} | PromiseState::Rejected{data} =>
                self.release_slots(&data, Holder::PromiseData(kref))?,
        }
        Ok(())
    }

    /// Whether the precondition of a GC action still holds.
    ///
    /// Actions for which this is false are negated.
    pub (crate) fn gc_action_applies(&self, action: &GcAction) -> bool
    {
        let GcAction{vat, kind, kref} = *action;
        let Some(record) = self.vats.get(&vat) else { return false };
        let Some(entry) = record.clist.entry(kref) else { return false };
        let object = self.objects.get(kref);
        let owned = object.map_or(false, |o| o.owner == Some(vat));
        match kind {
            GcActionKind::DropExport =>
                owned && entry.reachable
                    && object.map_or(false, |o| o.reachable == 0),
            GcActionKind::RetireExport =>
                owned && object.map_or(false, |o| o.recognizable == 0),
            GcActionKind::RetireImport =>
                entry.vref.is_import()
                    && object.map_or(true, |o| o.owner.is_none()),
        }
    }

    /// Take the next GC action to deliver, negating stale ones on the way.
    pub (crate) fn next_gc_action(&mut self) -> Option<GcAction>
    {
        while let Some(action) = self.gc_actions.pop_first() {
            if self.gc_action_applies(&action) {
                return Some(action);
            }
            debug!(action = %action, "negated");
        }
        None
    }

    /// Apply the kernel side of a GC action and describe it for the vat.
    pub (crate) fn prepare_gc_action(&mut self, action: GcAction)
        -> Result<VatDelivery>
    {
        let GcAction{vat, kind, kref} = action;
        let clist = &mut vat_mut(&mut self.vats, vat)?.clist;
        let vref = clist.entry(kref)
            .ok_or(KernelError::MissingClistEntry(vat, kref))?
            .vref;

        let delivery = match kind {
            GcActionKind::DropExport => {
                clist.set_reachable(kref, false);
                VatDelivery::DropExports{vrefs: vec![vref]}
            },
            GcActionKind::RetireExport => {
                clist.remove(kref);
                self.objects.set_owner(kref, None)?;
                self.maybe_free.insert(kref);
                VatDelivery::RetireExports{vrefs: vec![vref]}
            },
            GcActionKind::RetireImport => {
                let entry = clist.remove(kref)
                    .ok_or(KernelError::MissingClistEntry(vat, kref))?;
                self.release_entry(vat, kref, entry.reachable)?;
                VatDelivery::RetireImports{vrefs: vec![vref]}
            },
        };

        Ok(delivery)
    }
}
