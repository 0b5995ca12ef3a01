//! The code running inside a vat, as seen by the kernel.

use crate::{delivery::VatDelivery, error::VatFailure, syscall::Syscalls};

/// Object-safe trait for vats.
///
/// The kernel calls [`dispatch`][`Self::dispatch`] once per delivery.
/// The vat reacts by making syscalls, which take effect immediately.
/// Returning an error, or making a syscall that fails,
/// rolls back the crank and terminates the vat.
pub trait Vat
{
    /// Handle a delivery.
    fn dispatch(&mut self, delivery: &VatDelivery, syscalls: &mut Syscalls)
        -> Result<(), VatFailure>;
}

impl<F> Vat for F
    where F: FnMut(&VatDelivery, &mut Syscalls) -> Result<(), VatFailure>
{
    fn dispatch(&mut self, delivery: &VatDelivery, syscalls: &mut Syscalls)
        -> Result<(), VatFailure>
    {
        self(delivery, syscalls)
    }
}

/// Make a vat out of a closure.
///
/// Unlike boxing the closure directly,
/// this lets the compiler infer the closure's signature.
pub fn from_fn<F>(f: F) -> Box<dyn Vat>
    where F: FnMut(&VatDelivery, &mut Syscalls) -> Result<(), VatFailure>
           + 'static
{
    Box::new(f)
}
