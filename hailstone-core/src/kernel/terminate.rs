use {
    crate::{
        delivery::CapData,
        error::{KernelError, Result},
        kref::VatId,
        state::KernelState,
    },
    tracing::warn,
};

impl KernelState
{
    /// Discard a vat and everything it held.
    ///
    /// Promises it decided are rejected.
    /// Objects it exported live on without an owner
    /// for as long as anybody can recognize them.
    /// Its imports are released as if dropped and retired.
    pub (crate) fn terminate_vat(&mut self, vat: VatId, reason: &str) -> Result<()>
    {
        let record = self.vats.remove(&vat).ok_or(KernelError::UnknownVat(vat))?;
        self.terminated.insert(vat);
        self.gc_actions.remove_vat(vat);
        self.promises.unsubscribe_all(vat);

        for promise in self.promises.decided_by(vat) {
            self.resolve_promise(promise, true, CapData::error(reason))?;
        }

        let orphans = self.objects.orphan_all(vat);
        for (kref, entry) in record.clist.into_entries() {
            // The owner's own export claim is not counted.
            if kref.is_object() && entry.vref.is_export() {
                continue;
            }
            self.release_entry(vat, kref, entry.reachable)?;
        }

        warn!(vat = %vat, vat_name = %record.name, orphans = orphans.len(), reason,
              "terminated vat");
        self.maybe_free.extend(orphans);
        Ok(())
    }
}
