//! Running cranks.
//!
//! A crank is one unit of work: one run-queue entry, or one GC action.
//! The kernel prepares the delivery, hands it to the vat,
//! applies the vat's syscalls as they come,
//! and then lets the GC engine deal with whatever became unreferenced.
//! A crank in which the vat misbehaves is rolled back as a whole,
//! and the vat is terminated.

use {
    crate::{
        config::KernelConfig,
        delivery::{CapData, Message, VatDelivery},
        error::{KernelError, Result, VatFailure},
        kref::{Kref, VatId, Vref},
        state::{KernelDump, KernelState},
        syscall::{Syscalls, SyscallsOutcome},
        vat::Vat,
    },
    serde::Serialize,
    std::collections::BTreeMap,
    self::deliver::Work,
    tracing::{debug, debug_span, error, info, warn},
};

mod deliver;
mod terminate;


/// What a crank did.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum CrankOutcome
{
    /// The vat handled the delivery.
    Delivered{vat: VatId, delivery: VatDelivery, syscalls: usize},

    /// The vat failed; its crank was rolled back and it was terminated.
    Terminated{vat: VatId, delivery: VatDelivery, reason: String},

    /// The kernel did the work on its own.
    Internal,
}

/// State to go back to when a delivery fails,
/// and the work to abandon instead.
struct Checkpoint
{
    state: KernelState,
    work: Work,
}

/// Kernel with its vats.
pub struct Kernel
{
    config: KernelConfig,
    state: KernelState,
    vats: BTreeMap<VatId, Box<dyn Vat>>,
    cranks: u64,
    halted: bool,
}

impl Kernel
{
    /// Create a kernel without vats.
    pub fn new(config: KernelConfig) -> Self
    {
        let state = KernelState::new(&config);
        Self::resume(config, state)
    }

    /// Create a kernel from saved tables.
    ///
    /// The live vats of the tables must be given implementations
    /// with [`attach_vat`][`Self::attach_vat`] before they receive deliveries.
    pub fn resume(config: KernelConfig, state: KernelState) -> Self
    {
        Self{config, state, vats: BTreeMap::new(), cranks: 0, halted: false}
    }

    #[allow(missing_docs)]
    pub fn config(&self) -> &KernelConfig
    {
        &self.config
    }

    /// The kernel tables.
    pub fn state(&self) -> &KernelState
    {
        &self.state
    }

    /// Snapshot of the kernel tables, for [`resume`][`Self::resume`].
    pub fn dump(&self) -> KernelDump
    {
        self.state.dump()
    }

    /// Number of cranks run so far.
    pub fn cranks(&self) -> u64
    {
        self.cranks
    }

    /// Whether an internal error stopped the kernel.
    pub fn is_halted(&self) -> bool
    {
        self.halted
    }

    /// Add a vat with an empty c-list.
    pub fn add_vat(&mut self, name: &str, vat: Box<dyn Vat>) -> Result<VatId>
    {
        let id = self.state.add_vat(name)?;
        self.vats.insert(id, vat);
        info!(vat = %id, vat_name = name, "added vat");
        Ok(id)
    }

    /// Give an implementation to a vat of resumed tables.
    pub fn attach_vat(&mut self, id: VatId, vat: Box<dyn Vat>) -> Result<()>
    {
        if !self.state.is_alive(id) {
            return Err(KernelError::UnknownVat(id));
        }
        if self.vats.contains_key(&id) {
            return Err(KernelError::VatAlreadyAttached(id));
        }
        self.vats.insert(id, vat);
        Ok(())
    }

    /// Id of the live vat with the given name.
    pub fn vat_id(&self, name: &str) -> Result<VatId>
    {
        self.state.vat_id(name)
            .ok_or_else(|| KernelError::UnknownVatName(name.to_owned()))
    }

    /// Register an object the vat exports, before any delivery mentions it.
    pub fn add_export(&mut self, vat: VatId, vref: Vref) -> Result<Kref>
    {
        self.state.add_export(vat, vref)
    }

    /// The kref a vat's vref stands for.
    pub fn kref(&self, vat: VatId, vref: Vref) -> Option<Kref>
    {
        self.state.vat(vat)?.clist.kref(vref)
    }

    /// The vref a vat uses for a kref.
    pub fn vref(&self, vat: VatId, kref: Kref) -> Option<Vref>
    {
        Some(self.state.vat(vat)?.clist.entry(kref)?.vref)
    }

    /// Send a message on behalf of the host.
    ///
    /// With `want_result`, a result promise is created, decided by the kernel
    /// until delivery, and pinned so the host can inspect its resolution.
    pub fn queue_to_kref(&mut self, target: Kref, method: &str,
                         args: CapData<Kref>, want_result: bool)
        -> Result<Option<Kref>>
    {
        self.check_running()?;
        self.state.check_exists(target)?;
        for &slot in &args.slots {
            self.state.check_exists(slot)?;
        }
        let result = if want_result {
            let promise = self.state.promises.create_promise(None);
            self.state.pin(promise)?;
            Some(promise)
        } else {
            None
        };
        let message = Message{method: method.to_owned(), args, result};
        debug!(kref = %target, method, "queued from host");
        self.state.send(target, message)?;
        Ok(result)
    }

    /// Hold a reference on behalf of the host.
    pub fn pin(&mut self, kref: Kref) -> Result<()>
    {
        self.check_running()?;
        self.state.pin(kref)
    }

    /// Release a reference held on behalf of the host.
    ///
    /// Whatever becomes unreferenced is dealt with immediately.
    pub fn unpin(&mut self, kref: Kref) -> Result<()>
    {
        self.check_running()?;
        self.state.unpin(kref)?;
        self.halt_on_error(|state| state.process_refcounts())
    }

    /// Terminate a vat on behalf of the host.
    pub fn terminate_vat(&mut self, vat: VatId, reason: &str) -> Result<()>
    {
        self.check_running()?;
        if !self.state.is_alive(vat) {
            return Err(KernelError::UnknownVat(vat));
        }
        self.vats.remove(&vat);
        self.halt_on_error(|state| {
            state.terminate_vat(vat, reason)?;
            state.process_refcounts()
        })
    }

    /// Check the refcounts of every kref.
    pub fn audit(&self) -> Result<()>
    {
        self.state.audit()
    }

    /// Run one crank.
    ///
    /// Returns [`None`] if there was nothing to do.
    /// An error means the kernel tables are inconsistent;
    /// the kernel halts and every later call fails.
    pub fn step(&mut self) -> Result<Option<CrankOutcome>>
    {
        self.check_running()?;
        let result = self.crank();
        if let Err(err) = &result {
            error!(error = %err, crank = self.cranks, "kernel halted");
            self.halted = true;
        }
        result
    }

    /// Run cranks until there is nothing left to do.
    ///
    /// Stops early after [`KernelConfig::max_cranks_per_run`] cranks.
    /// Returns the number of cranks run.
    pub fn run(&mut self) -> Result<u64>
    {
        let mut count = 0;
        while self.config.max_cranks_per_run.map_or(true, |max| count < max) {
            match self.step()? {
                Some(_) => count += 1,
                None => break,
            }
        }
        Ok(count)
    }

    fn crank(&mut self) -> Result<Option<CrankOutcome>>
    {
        let Some(work) = self.state.take_work() else { return Ok(None) };
        self.cranks += 1;
        let _span = debug_span!("crank", number = self.cranks).entered();

        // Work the kernel finishes on its own cannot fail on behalf of a vat.
        let checkpoint = match self.state.reaches_vat(&work)? {
            true => Some(Checkpoint{state: self.state.clone(), work: work.clone()}),
            false => None,
        };

        let outcome = match self.state.prepare(work)? {
            None => CrankOutcome::Internal,
            Some((vat, delivery)) => {
                let checkpoint = checkpoint.ok_or(KernelError::MissingCheckpoint(vat))?;
                self.deliver(vat, delivery, checkpoint)?
            },
        };

        self.state.process_refcounts()?;
        if self.config.audit_every_crank {
            self.state.audit()?;
        }
        Ok(Some(outcome))
    }

    fn deliver(&mut self, vat: VatId, delivery: VatDelivery,
               checkpoint: Checkpoint)
        -> Result<CrankOutcome>
    {
        debug!(vat = %vat, delivery = delivery.kind(), "delivering");
        let implementation = self.vats.get_mut(&vat)
            .ok_or(KernelError::VatNotAttached(vat))?;

        let mut syscalls = Syscalls::new(&mut self.state, vat);
        let dispatched = implementation.dispatch(&delivery, &mut syscalls);
        let SyscallsOutcome{violation, fatal, count} = syscalls.finish();

        if let Some(err) = fatal {
            return Err(err);
        }
        let failure = match (violation, dispatched) {
            (Some(violation), _) => VatFailure::Syscall(violation),
            (None, Err(failure)) => failure,
            (None, Ok(())) =>
                return Ok(CrankOutcome::Delivered{vat, delivery, syscalls: count}),
        };

        // Roll back everything the crank did,
        // consume its work without delivering it,
        // and get rid of the vat.
        let reason = failure.to_string();
        warn!(vat = %vat, reason = %reason, "delivery failed");
        self.state = checkpoint.state;
        self.state.abandon(checkpoint.work, &reason)?;
        self.vats.remove(&vat);
        self.state.terminate_vat(vat, &reason)?;
        Ok(CrankOutcome::Terminated{vat, delivery, reason})
    }

    fn check_running(&self) -> Result<()>
    {
        if self.halted { Err(KernelError::Halted) } else { Ok(()) }
    }

    fn halt_on_error<F>(&mut self, f: F) -> Result<()>
        where F: FnOnce(&mut KernelState) -> Result<()>
    {
        let result = f(&mut self.state);
        if let Err(err) = &result {
            error!(error = %err, "kernel halted");
            self.halted = true;
        }
        result
    }
}
