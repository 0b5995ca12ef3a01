//! Translating references across the vat boundary.
//!
//! Each operation here keeps the c-lists and the reference table in step:
//! a c-list entry for an imported object is exactly one recognizable claim,
//! plus one reachable claim while its flag is set.

use {
    crate::{
        error::{Fault, KernelError, Result, SyscallError},
        gc::{GcAction, GcActionKind},
        kref::{Kref, RefKind, VatId, Vref},
        state::{Holder, KernelState, vat_mut, vat_ref},
    },
    tracing::debug,
};

impl KernelState
{
    /// Translate a vref mentioned by a vat into a kref.
    ///
    /// A vref the vat has not used before must be an export;
    /// it mints a new object owned by the vat,
    /// or a new promise decided by the vat.
    /// Promise exports are never minted twice.
    pub (crate) fn vref_to_kref(&mut self, vat: VatId, vref: Vref)
        -> std::result::Result<Kref, Fault>
    {
        let clist = &mut vat_mut(&mut self.vats, vat)?.clist;

        if let Some(kref) = clist.kref(vref) {
            if vref.is_object() {
                if vref.is_export() {
                    // The owner mentions the object again,
                    // so it is reachable from its point of view.
                    clist.set_reachable(kref, true);
                } else if !clist.is_reachable(kref) {
                    return Err(SyscallError::UnreachableImport(vref).into());
                }
            }
            return Ok(kref);
        }

        if vref.is_import() {
            return Err(SyscallError::UnknownVref(vref).into());
        }
        if clist.is_spent(vref) {
            return Err(SyscallError::AlreadyResolved(vref).into());
        }

        let kref = match vref.kind {
            RefKind::Object  => self.objects.create_object(vat),
            RefKind::Promise => self.promises.create_promise(Some(vat)),
        };
        clist.insert(vref, kref, true)?;
        if kref.is_promise() {
            self.retain(kref, Holder::Clist(vat))?;
        }
        debug!(vat = %vat, vref = %vref, kref = %kref, "new export");
        Ok(kref)
    }

    /// Translate a kref into the namespace of a vat.
    ///
    /// A kref the vat has not seen before gets a fresh import vref,
    /// and the new c-list entry holds a reachable claim on it.
    pub (crate) fn kref_to_vref(&mut self, vat: VatId, kref: Kref) -> Result<Vref>
    {
        let clist = &mut vat_mut(&mut self.vats, vat)?.clist;

        if let Some(entry) = clist.entry(kref).copied() {
            if kref.is_object() && !entry.reachable {
                clist.set_reachable(kref, true);
                if entry.vref.is_import() {
                    self.objects.inc_reachable(kref, 1)?;
                }
            }
            return Ok(entry.vref);
        }

        match kref.kind {
            RefKind::Object =>
                if self.objects.owner(kref)? == Some(vat) {
                    return Err(KernelError::OwnerWithoutExport{vat, kref});
                },
            RefKind::Promise => {
                self.promises.promise(kref)?;
            },
        }

        let vref = clist.allocate_import(kref.kind);
        clist.insert(vref, kref, true)?;
        self.retain(kref, Holder::Clist(vat))?;
        Ok(vref)
    }

    /// The vat gives up its reachable claim on an import.
    pub (crate) fn drop_import(&mut self, vat: VatId, vref: Vref)
        -> std::result::Result<(), Fault>
    {
        let kref = self.import_kref(vat, vref)?;
        let clist = &mut vat_mut(&mut self.vats, vat)?.clist;
        if clist.set_reachable(kref, false) != Some(true) {
            return Err(SyscallError::AlreadyDropped(vref).into());
        }
        self.objects.dec_reachable(kref, 1)?;
        self.maybe_free.insert(kref);
        debug!(vat = %vat, vref = %vref, kref = %kref, "dropped import");
        Ok(())
    }

    /// The vat gives up its recognizable claim on an import.
    pub (crate) fn retire_import(&mut self, vat: VatId, vref: Vref)
        -> std::result::Result<(), Fault>
    {
        let kref = self.import_kref(vat, vref)?;
        let clist = &mut vat_mut(&mut self.vats, vat)?.clist;
        if clist.is_reachable(kref) {
            return Err(SyscallError::RetireBeforeDrop(vref).into());
        }
        clist.remove(kref);
        self.objects.dec_recognizable(kref, 1)?;
        self.maybe_free.insert(kref);
        debug!(vat = %vat, vref = %vref, kref = %kref, "retired import");
        Ok(())
    }

    /// The owner gives up an export that nobody can reach.
    ///
    /// Every other vat that can still recognize the object
    /// is scheduled to be told to retire its import.
    pub (crate) fn retire_export(&mut self, vat: VatId, vref: Vref)
        -> std::result::Result<(), Fault>
    {
        if !vref.is_object() {
            return Err(SyscallError::NotAnObject(vref).into());
        }
        if !vref.is_export() {
            return Err(SyscallError::NotAnExport(vref).into());
        }
        let clist = &mut vat_mut(&mut self.vats, vat)?.clist;
        let kref = clist.kref(vref).ok_or(SyscallError::UnknownVref(vref))?;

        let object = self.objects.get(kref).ok_or(KernelError::UnknownKref(kref))?;
        if object.owner != Some(vat) {
            return Err(KernelError::ExportWithoutOwnership{vat, kref}.into());
        }
        if object.reachable > 0 {
            return Err(SyscallError::RetireReachableExport(vref).into());
        }

        clist.remove(kref);
        self.objects.set_owner(kref, None)?;
        let importers: Vec<VatId> =
            self.vats.iter()
            .filter(|(_, r)| r.clist.contains(kref))
            .map(|(&id, _)| id)
            .collect();
        for importer in importers {
            let action = GcAction{vat: importer, kind: GcActionKind::RetireImport, kref};
            self.gc_actions.insert(action);
        }
        self.maybe_free.insert(kref);
        debug!(vat = %vat, vref = %vref, kref = %kref, "retired export");
        Ok(())
    }

    /// Remove the entry of a promise from a vat's c-list, if any.
    pub (crate) fn forget_promise(&mut self, vat: VatId, kref: Kref) -> Result<()>
    {
        let entry = self.vats.get_mut(&vat).and_then(|r| r.clist.remove(kref));
        match entry {
            Some(_) => self.release(kref, Holder::Clist(vat)),
            None => Ok(()),
        }
    }

    /// The kref of an object import.
    fn import_kref(&self, vat: VatId, vref: Vref)
        -> std::result::Result<Kref, Fault>
    {
        if !vref.is_object() {
            return Err(SyscallError::NotAnObject(vref).into());
        }
        if !vref.is_import() {
            return Err(SyscallError::NotAnImport(vref).into());
        }
        let kref = vat_ref(&self.vats, vat)?.clist.kref(vref)
            .ok_or(SyscallError::UnknownVref(vref))?;
        Ok(kref)
    }
}
