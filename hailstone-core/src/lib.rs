//! Hailstone object-capability kernel.
//!
//! The kernel mediates all communication between vats.
//! Vats refer to objects and promises through vrefs,
//! which the kernel translates to krefs using per-vat c-lists.
//! The kernel counts who can still reach or recognize each object,
//! and tells exporters when their objects are no longer needed.

#![warn(missing_docs)]

pub mod clist;
pub mod config;
pub mod delivery;
pub mod error;
pub mod gc;
pub mod kernel;
pub mod kref;
pub mod promise;
pub mod scheduler;
pub mod state;
pub mod syscall;
pub mod table;
pub mod vat;

pub use self::{
    config::KernelConfig,
    error::{KernelError, SyscallError, VatFailure},
    kernel::{CrankOutcome, Kernel},
    kref::{Kref, VatId, Vref},
};
