//! Requests vats make of the kernel during a delivery.

use {
    crate::{
        delivery::{CapData, Message, Resolution},
        error::{Fault, KernelError, SyscallError},
        kref::{Kref, VatId, Vref},
        state::KernelState,
    },
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

/// A request from a vat to the kernel.
#[allow(missing_docs)]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum VatSyscall
{
    /// Send a message to an object or promise.
    ///
    /// A result promise must be decided by the sender;
    /// the decision passes along with the message.
    Send{target: Vref, message: Message<Vref>},

    /// Ask to be notified when a promise is resolved.
    Subscribe{promise: Vref},

    /// Resolve promises the vat decides.
    Resolve{resolutions: Vec<Resolution<Vref>>},

    /// Give up reachable claims on imports.
    DropImports{vrefs: Vec<Vref>},

    /// Give up recognizable claims on dropped imports.
    RetireImports{vrefs: Vec<Vref>},

    /// Give up exports nobody can reach.
    RetireExports{vrefs: Vec<Vref>},
}

impl VatSyscall
{
    /// Short name of the syscall kind, as used in logs.
    pub fn kind(&self) -> &'static str
    {
        match self {
            Self::Send{..}          => "send",
            Self::Subscribe{..}     => "subscribe",
            Self::Resolve{..}       => "resolve",
            Self::DropImports{..}   => "dropImports",
            Self::RetireImports{..} => "retireImports",
            Self::RetireExports{..} => "retireExports",
        }
    }
}

/// Syscall interface handed to a vat for the duration of one delivery.
///
/// Syscalls take effect immediately.
/// The first failing syscall dooms the vat:
/// every later syscall fails with [`SyscallError::Terminating`],
/// and once the delivery returns, the crank is rolled back
/// and the vat is terminated.
pub struct Syscalls<'a>
{
    state: &'a mut KernelState,
    vat: VatId,
    violation: Option<SyscallError>,
    fatal: Option<KernelError>,
    count: usize,
}

/// What happened during the syscalls of one delivery.
pub (crate) struct SyscallsOutcome
{
    /// First protocol violation.
    pub violation: Option<SyscallError>,

    /// Internal error, which halts the kernel.
    pub fatal: Option<KernelError>,

    /// Number of syscalls made.
    pub count: usize,
}

impl<'a> Syscalls<'a>
{
    pub (crate) fn new(state: &'a mut KernelState, vat: VatId) -> Self
    {
        Self{state, vat, violation: None, fatal: None, count: 0}
    }

    pub (crate) fn finish(self) -> SyscallsOutcome
    {
        SyscallsOutcome{
            violation: self.violation,
            fatal: self.fatal,
            count: self.count,
        }
    }

    /// The vat making the syscalls.
    pub fn vat(&self) -> VatId
    {
        self.vat
    }

    /// Perform a syscall.
    pub fn invoke(&mut self, syscall: VatSyscall) -> Result<(), SyscallError>
    {
        if self.violation.is_some() || self.fatal.is_some() {
            return Err(SyscallError::Terminating);
        }
        self.count += 1;
        debug!(vat = %self.vat, syscall = syscall.kind(), "syscall");

        match self.apply(syscall) {
            Ok(()) => Ok(()),
            Err(Fault::Vat(err)) => {
                warn!(vat = %self.vat, error = %err, "syscall failed");
                self.violation = Some(err.clone());
                Err(err)
            },
            Err(Fault::Kernel(err)) => {
                self.fatal = Some(err);
                Err(SyscallError::Terminating)
            },
        }
    }

    /// Send a message, optionally with a result promise.
    pub fn send(&mut self, target: Vref, method: &str, args: CapData<Vref>,
                result: Option<Vref>)
        -> Result<(), SyscallError>
    {
        let message = Message{method: method.to_owned(), args, result};
        self.invoke(VatSyscall::Send{target, message})
    }

    #[allow(missing_docs)]
    pub fn subscribe(&mut self, promise: Vref) -> Result<(), SyscallError>
    {
        self.invoke(VatSyscall::Subscribe{promise})
    }

    #[allow(missing_docs)]
    pub fn resolve(&mut self, resolutions: Vec<Resolution<Vref>>)
        -> Result<(), SyscallError>
    {
        self.invoke(VatSyscall::Resolve{resolutions})
    }

    #[allow(missing_docs)]
    pub fn drop_imports(&mut self, vrefs: &[Vref]) -> Result<(), SyscallError>
    {
        self.invoke(VatSyscall::DropImports{vrefs: vrefs.to_vec()})
    }

    #[allow(missing_docs)]
    pub fn retire_imports(&mut self, vrefs: &[Vref]) -> Result<(), SyscallError>
    {
        self.invoke(VatSyscall::RetireImports{vrefs: vrefs.to_vec()})
    }

    #[allow(missing_docs)]
    pub fn retire_exports(&mut self, vrefs: &[Vref]) -> Result<(), SyscallError>
    {
        self.invoke(VatSyscall::RetireExports{vrefs: vrefs.to_vec()})
    }

    fn apply(&mut self, syscall: VatSyscall) -> Result<(), Fault>
    {
        let vat = self.vat;
        let state = &mut *self.state;
        match syscall {
            VatSyscall::Send{target, message} => {
                let target = state.vref_to_kref(vat, target)?;
                let args = message.args.map_slots(|&v| state.vref_to_kref(vat, v))?;
                let result = match message.result {
                    Some(vref) => {
                        let kref = state.decided_promise(vat, vref)?;
                        state.promises.set_decider(kref, None)?;
                        Some(kref)
                    },
                    None => None,
                };
                let message = Message{method: message.method, args, result};
                state.send(target, message)?;
            },

            VatSyscall::Subscribe{promise} => {
                if !promise.is_promise() {
                    return Err(SyscallError::NotAPromise(promise).into());
                }
                let kref = state.vref_to_kref(vat, promise)?;
                state.subscribe(vat, kref)?;
            },

            VatSyscall::Resolve{resolutions} => {
                // Translate the whole batch before settling anything,
                // so data may mention promises resolved alongside it.
                let mut settled = Vec::with_capacity(resolutions.len());
                for Resolution{promise, rejected, data} in resolutions {
                    let kref = state.decided_promise(vat, promise)?;
                    if settled.iter().any(|&(k, _, _)| k == kref) {
                        return Err(SyscallError::AlreadyResolved(promise).into());
                    }
                    let data = data.map_slots(|&v| state.vref_to_kref(vat, v))?;
                    settled.push((kref, rejected, data));
                }
                let krefs: Vec<Kref> = settled.iter().map(|&(k, _, _)| k).collect();
                for (kref, rejected, data) in settled {
                    state.resolve_promise(kref, rejected, data)?;
                }
                for kref in krefs {
                    state.forget_promise(vat, kref)?;
                }
            },

            VatSyscall::DropImports{vrefs} =>
                for vref in vrefs {
                    state.drop_import(vat, vref)?;
                },

            VatSyscall::RetireImports{vrefs} =>
                for vref in vrefs {
                    state.retire_import(vat, vref)?;
                },

            VatSyscall::RetireExports{vrefs} =>
                for vref in vrefs {
                    state.retire_export(vat, vref)?;
                },
        }
        Ok(())
    }
}

impl KernelState
{
    /// Translate a promise vref the vat must currently decide.
    fn decided_promise(&mut self, vat: VatId, vref: Vref)
        -> Result<Kref, Fault>
    {
        if !vref.is_promise() {
            return Err(SyscallError::NotAPromise(vref).into());
        }
        let kref = self.vref_to_kref(vat, vref)?;
        let promise = self.promises.promise(kref)?;
        if promise.is_resolved() {
            return Err(SyscallError::AlreadyResolved(vref).into());
        }
        if promise.decider() != Some(vat) {
            return Err(SyscallError::NotDecider(vref).into());
        }
        Ok(kref)
    }
}
