use {
    super::KernelState,
    crate::{
        error::{KernelError, Result},
        kref::{Kref, RefKind},
        promise::PromiseState,
    },
    std::collections::BTreeMap,
};

impl KernelState
{
    /// Recompute every counter from its holders and compare.
    ///
    /// Between cranks, this also checks that everything unreferenced
    /// was collected and that every owner still exports its objects.
    pub fn audit(&self) -> Result<()>
    {
        let mut objects: BTreeMap<Kref, (u32, u32)> = BTreeMap::new();
        let mut promises: BTreeMap<Kref, u32> = BTreeMap::new();
        let mut hold = |kref: Kref, reachable: bool| match kref.kind {
            RefKind::Object => {
                let counts = objects.entry(kref).or_default();
                counts.0 += u32::from(reachable);
                counts.1 += 1;
            },
            RefKind::Promise =>
                *promises.entry(kref).or_default() += 1,
        };

        for (&vat, record) in &self.vats {
            for (kref, entry) in record.clist.iter() {
                if kref.is_object() && entry.vref.is_export() {
                    let owner = self.objects.get(kref).and_then(|o| o.owner);
                    if owner != Some(vat) {
                        return Err(KernelError::ExportWithoutOwnership{vat, kref});
                    }
                    continue;
                }
                hold(kref, entry.reachable);
            }
        }

        for entry in self.run_queue.iter() {
            for kref in entry.references() {
                hold(kref, true);
            }
        }

        for (_, promise) in self.promises.iter() {
            match &promise.state {
                PromiseState::Unresolved{queue, ..} =>
                    for message in queue {
                        message.references().for_each(|&kref| hold(kref, true));
                    },
                PromiseState::Fulfilled{data} | PromiseState::Rejected{data} =>
                    data.slots.iter().for_each(|&kref| hold(kref, true)),
            }
        }

        for (&kref, &count) in &self.pins {
            for _ in 0 .. count {
                hold(kref, true);
            }
        }

        // Nothing may be held that is not in the tables.
        for &kref in objects.keys().chain(promises.keys()) {
            self.check_exists(kref).map_err(|_| KernelError::DanglingKref(kref))?;
        }

        for (kref, object) in self.objects.iter() {
            let expected = objects.get(&kref).copied().unwrap_or_default();
            let recorded = (object.reachable, object.recognizable);
            if recorded != expected {
                return Err(KernelError::AuditMismatch{
                    kref,
                    recorded: format!("{recorded:?}"),
                    expected: format!("{expected:?}"),
                });
            }
            match object.owner {
                Some(owner) => {
                    let exported = self.vats.get(&owner)
                        .and_then(|r| r.clist.entry(kref))
                        .map_or(false, |e| e.vref.is_export());
                    if !exported {
                        return Err(KernelError::OwnerWithoutExport{vat: owner, kref});
                    }
                },
                None =>
                    if object.recognizable == 0 {
                        return Err(KernelError::Uncollected(kref));
                    },
            }
        }

        for (kref, promise) in self.promises.iter() {
            let expected = promises.get(&kref).copied().unwrap_or(0);
            if promise.refcount != expected {
                return Err(KernelError::AuditMismatch{
                    kref,
                    recorded: promise.refcount.to_string(),
                    expected: expected.to_string(),
                });
            }
            if promise.refcount == 0 {
                return Err(KernelError::Uncollected(kref));
            }
        }

        Ok(())
    }
}
