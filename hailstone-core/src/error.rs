//! Errors raised by vats and by the kernel itself.
//!
//! A [`SyscallError`] is a protocol violation by one vat;
//! the kernel terminates that vat and carries on.
//! A [`KernelError`] means the kernel's own bookkeeping is inconsistent
//! (or the host misused the kernel API);
//! when raised during a crank the kernel halts.

use {
    crate::kref::{Kref, VatId, Vref},
    std::fmt,
    thiserror::Error,
};

/// Result type for kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;

/// Protocol violation committed by a vat during a syscall.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum SyscallError
{
    #[error("Vref `{0}` is not in the c-list")]
    UnknownVref(Vref),

    #[error("Vref `{0}` is not an export of the vat")]
    NotAnExport(Vref),

    #[error("Vref `{0}` is not an import of the vat")]
    NotAnImport(Vref),

    #[error("Vref `{0}` does not designate an object")]
    NotAnObject(Vref),

    #[error("Vref `{0}` does not designate a promise")]
    NotAPromise(Vref),

    #[error("Import `{0}` was dropped and is no longer reachable")]
    UnreachableImport(Vref),

    #[error("Import `{0}` was already dropped")]
    AlreadyDropped(Vref),

    #[error("Import `{0}` must be dropped before it is retired")]
    RetireBeforeDrop(Vref),

    #[error("Export `{0}` is still reachable and cannot be retired")]
    RetireReachableExport(Vref),

    #[error("Vat is not the decider of promise `{0}`")]
    NotDecider(Vref),

    #[error("Promise `{0}` is already resolved")]
    AlreadyResolved(Vref),

    #[error("Vat is being terminated after an earlier syscall failed")]
    Terminating,
}

/// Reason a vat failed to complete a delivery.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum VatFailure
{
    #[error("Syscall failed: {0}")]
    Syscall(#[from] SyscallError),

    #[error("Unexpected error: {0}")]
    Unexpected(#[from] anyhow::Error),
}

/// Which counter of a kref an error is about.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Counter
{
    Reachable,
    Recognizable,
    Refcount,
}

impl fmt::Display for Counter
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self {
            Self::Reachable    => write!(f, "reachable"),
            Self::Recognizable => write!(f, "recognizable"),
            Self::Refcount     => write!(f, "refcount"),
        }
    }
}

/// Inconsistency in the kernel tables, or misuse of the kernel API.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum KernelError
{
    #[error("Kernel is halted after an earlier internal error")]
    Halted,

    #[error("No such kref: `{0}`")]
    UnknownKref(Kref),

    #[error("No such vat: `{0}`")]
    UnknownVat(VatId),

    #[error("No vat is named `{0}`")]
    UnknownVatName(String),

    #[error("Vat name `{0}` is already in use")]
    DuplicateVatName(String),

    #[error("Vat `{0}` is already attached")]
    VatAlreadyAttached(VatId),

    #[error("Vat `{0}` has no implementation attached")]
    VatNotAttached(VatId),

    #[error("Delivery to `{0}` was prepared without a checkpoint")]
    MissingCheckpoint(VatId),

    #[error("Vref `{1}` is already in the c-list of `{0}`")]
    DuplicateVref(VatId, Vref),

    #[error("Kref `{1}` is already in the c-list of `{0}`")]
    DuplicateKref(VatId, Kref),

    #[error("Kref `{1}` is missing from the c-list of `{0}`")]
    MissingClistEntry(VatId, Kref),

    #[error("Vref `{0}` cannot be registered as an export")]
    NotAnExport(Vref),

    #[error("The {counter} count of `{kref}` would go negative")]
    Underflow{kref: Kref, counter: Counter},

    #[error("The {counter} count of `{kref}` would overflow")]
    Overflow{kref: Kref, counter: Counter},

    #[error("Reachable count of `{kref}` exceeds its recognizable count \
             ({reachable} > {recognizable})")]
    ReachableExceedsRecognizable{kref: Kref, reachable: u32, recognizable: u32},

    #[error("Cannot delete `{0}` while its owner `{1}` still holds it")]
    DeleteOwnedObject(Kref, VatId),

    #[error("Cannot delete `{0}` while it is still recognizable")]
    DeleteRecognizedObject(Kref),

    #[error("Promise `{0}` is not in the expected state")]
    PromiseState(Kref),

    #[error("Vat `{vat}` owns `{kref}` but does not export it")]
    OwnerWithoutExport{vat: VatId, kref: Kref},

    #[error("Vat `{vat}` exports `{kref}` but does not own it")]
    ExportWithoutOwnership{vat: VatId, kref: Kref},

    #[error("Refcount audit of `{kref}`: recorded {recorded}, expected {expected}")]
    AuditMismatch{kref: Kref, recorded: String, expected: String},

    #[error("Kref `{0}` is referenced but not in the table")]
    DanglingKref(Kref),

    #[error("Kref `{0}` is unreferenced but was not collected")]
    Uncollected(Kref),
}

/// Failure inside a syscall, attributed either to the vat or the kernel.
#[derive(Debug)]
pub (crate) enum Fault
{
    Vat(SyscallError),
    Kernel(KernelError),
}

impl From<SyscallError> for Fault
{
    fn from(other: SyscallError) -> Self
    {
        Self::Vat(other)
    }
}

impl From<KernelError> for Fault
{
    fn from(other: KernelError) -> Self
    {
        Self::Kernel(other)
    }
}
