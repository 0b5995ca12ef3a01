use {
    super::KernelState,
    crate::{
        delivery::{CapData, KernelMessage},
        error::{KernelError, Result},
        kref::{Kref, RefKind, VatId},
    },
    std::fmt,
    tracing::trace,
};

/// Something that holds references.
///
/// Every counter change in the kernel is attributed to a holder.
/// The [audit] recomputes all counters by asking each holder
/// which references it holds.
///
/// [audit]: `KernelState::audit`
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Holder
{
    /// An import entry in the c-list of the vat,
    /// or for promises, any entry.
    Clist(VatId),

    /// A message or notification on the run-queue.
    RunQueue,

    /// A message queued on an unresolved promise.
    PromiseQueue(Kref),

    /// The resolution data of a promise.
    PromiseData(Kref),

    /// The host, through [`Kernel::pin`].
    ///
    /// [`Kernel::pin`]: `crate::kernel::Kernel::pin`
    Host,
}

impl fmt::Display for Holder
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self {
            Self::Clist(vat)            => write!(f, "clist {vat}"),
            Self::RunQueue              => write!(f, "run-queue"),
            Self::PromiseQueue(promise) => write!(f, "queue of {promise}"),
            Self::PromiseData(promise)  => write!(f, "data of {promise}"),
            Self::Host                  => write!(f, "host"),
        }
    }
}

impl KernelState
{
    /// Add a reachable claim on an object, or a reference to a promise.
    pub (crate) fn retain(&mut self, kref: Kref, holder: Holder) -> Result<()>
    {
        match kref.kind {
            RefKind::Object => {
                self.objects.inc_recognizable(kref, 1)?;
                self.objects.inc_reachable(kref, 1)?;
            },
            RefKind::Promise => {
                self.promises.inc_refcount(kref)?;
            },
        }
        trace!(kref = %kref, holder = %holder, "retain");
        Ok(())
    }

    /// Undo [`retain`][`Self::retain`].
    ///
    /// The kref is considered for collection at the end of the crank.
    pub (crate) fn release(&mut self, kref: Kref, holder: Holder) -> Result<()>
    {
        match kref.kind {
            RefKind::Object => {
                self.objects.dec_reachable(kref, 1)?;
                self.objects.dec_recognizable(kref, 1)?;
            },
            RefKind::Promise => {
                self.promises.dec_refcount(kref)?;
            },
        }
        trace!(kref = %kref, holder = %holder, "release");
        self.maybe_free.insert(kref);
        Ok(())
    }

    /// Release the claim of a c-list entry that is being discarded.
    ///
    /// Object imports whose reachable claim was already dropped
    /// only hold a recognizable claim.
    pub (crate) fn release_entry(&mut self, vat: VatId, kref: Kref, reachable: bool)
        -> Result<()>
    {
        if kref.is_object() && !reachable {
            self.objects.dec_recognizable(kref, 1)?;
            trace!(kref = %kref, holder = %Holder::Clist(vat), "release recognizable");
            self.maybe_free.insert(kref);
            Ok(())
        } else {
            self.release(kref, Holder::Clist(vat))
        }
    }

    /// Retain every slot of the capability data.
    pub (crate) fn retain_slots(&mut self, data: &CapData<Kref>, holder: Holder)
        -> Result<()>
    {
        data.slots.iter().try_for_each(|&kref| self.retain(kref, holder))
    }

    /// Release every slot of the capability data.
    pub (crate) fn release_slots(&mut self, data: &CapData<Kref>, holder: Holder)
        -> Result<()>
    {
        data.slots.iter().try_for_each(|&kref| self.release(kref, holder))
    }

    /// Retain the arguments and result of a message.
    pub (crate) fn retain_message(&mut self, message: &KernelMessage, holder: Holder)
        -> Result<()>
    {
        message.references().try_for_each(|&kref| self.retain(kref, holder))
    }

    /// Release the arguments and result of a message.
    pub (crate) fn release_message(&mut self, message: &KernelMessage, holder: Holder)
        -> Result<()>
    {
        message.references().try_for_each(|&kref| self.release(kref, holder))
    }

    /// Hold a reference on behalf of the host.
    pub fn pin(&mut self, kref: Kref) -> Result<()>
    {
        self.check_exists(kref)?;
        self.retain(kref, Holder::Host)?;
        *self.pins.entry(kref).or_insert(0) += 1;
        Ok(())
    }

    /// Release a reference held by [`pin`][`Self::pin`].
    ///
    /// Collection happens at the end of the next crank,
    /// or immediately when called through the kernel.
    pub fn unpin(&mut self, kref: Kref) -> Result<()>
    {
        let count = self.pins.get_mut(&kref).ok_or(KernelError::UnknownKref(kref))?;
        *count -= 1;
        if *count == 0 {
            self.pins.remove(&kref);
        }
        self.release(kref, Holder::Host)
    }

    /// Fail unless the kref is in the object or promise table.
    pub (crate) fn check_exists(&self, kref: Kref) -> Result<()>
    {
        let exists = match kref.kind {
            RefKind::Object  => self.objects.contains(kref),
            RefKind::Promise => self.promises.contains(kref),
        };
        if exists { Ok(()) } else { Err(KernelError::UnknownKref(kref)) }
    }
}
