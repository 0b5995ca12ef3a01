//! Kernel configuration.

use {
    serde::{Deserialize, Serialize},
    std::io::Read,
};

/// Tunables of a kernel.
///
/// Every field has a default, so a configuration file
/// only needs to mention the fields it changes.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct KernelConfig
{
    /// Number of the first object kref (`ko20`).
    pub first_object_id: u64,

    /// Number of the first promise kref (`kp40`).
    pub first_promise_id: u64,

    /// Number of the first object import in each c-list (`o-50`).
    pub first_import_object_id: u64,

    /// Number of the first promise import in each c-list (`p-60`).
    pub first_import_promise_id: u64,

    /// Recompute every refcount from scratch after each crank
    /// and halt if any recorded count disagrees.
    pub audit_every_crank: bool,

    /// Upper bound on the number of cranks in one call to
    /// [`Kernel::run`][`crate::kernel::Kernel::run`].
    pub max_cranks_per_run: Option<u64>,
}

impl Default for KernelConfig
{
    fn default() -> Self
    {
        Self{
            first_object_id:         20,
            first_promise_id:        40,
            first_import_object_id:  50,
            first_import_promise_id: 60,
            audit_every_crank:       false,
            max_cranks_per_run:      None,
        }
    }
}

impl KernelConfig
{
    /// Read a configuration from JSON.
    pub fn from_reader<R>(reader: R) -> serde_json::Result<Self>
        where R: Read
    {
        serde_json::from_reader(reader)
    }
}
