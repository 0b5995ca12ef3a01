//! Identifying objects, promises, and vats.
//!
//! The kernel names every object and promise with a [`Kref`].
//! Vats never see krefs; each vat has its own namespace of [`Vref`]s,
//! which its c-list translates to and from krefs.

use thiserror::Error;

mod display;

/// Whether a reference designates an object or a promise.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum RefKind
{
    Object,
    Promise,
}

/// Kernel-wide identifier of an object or promise.
///
/// Krefs are minted from kernel-wide counters and are never reused.
/// They are ordered first by kind, then by number.
#[allow(missing_docs)]
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Kref
{
    pub kind: RefKind,
    pub id: u64,
}

impl Kref
{
    /// The kref `ko<id>`.
    pub fn object(id: u64) -> Self
    {
        Self{kind: RefKind::Object, id}
    }

    /// The kref `kp<id>`.
    pub fn promise(id: u64) -> Self
    {
        Self{kind: RefKind::Promise, id}
    }

    #[allow(missing_docs)]
    pub fn is_object(self) -> bool
    {
        self.kind == RefKind::Object
    }

    #[allow(missing_docs)]
    pub fn is_promise(self) -> bool
    {
        self.kind == RefKind::Promise
    }
}

/// Which side of a c-list allocated a vref.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Allocator
{
    /// Allocated by the vat; the vref is an export (`o+N`, `p+N`).
    Vat,

    /// Allocated by the kernel; the vref is an import (`o-N`, `p-N`).
    Kernel,
}

/// Vat-local reference.
#[allow(missing_docs)]
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Vref
{
    pub kind: RefKind,
    pub allocator: Allocator,
    pub id: u64,
}

impl Vref
{
    /// The vref `o+<id>`.
    pub fn object_export(id: u64) -> Self
    {
        Self{kind: RefKind::Object, allocator: Allocator::Vat, id}
    }

    /// The vref `o-<id>`.
    pub fn object_import(id: u64) -> Self
    {
        Self{kind: RefKind::Object, allocator: Allocator::Kernel, id}
    }

    /// The vref `p+<id>`.
    pub fn promise_export(id: u64) -> Self
    {
        Self{kind: RefKind::Promise, allocator: Allocator::Vat, id}
    }

    /// The vref `p-<id>`.
    pub fn promise_import(id: u64) -> Self
    {
        Self{kind: RefKind::Promise, allocator: Allocator::Kernel, id}
    }

    #[allow(missing_docs)]
    pub fn is_object(self) -> bool
    {
        self.kind == RefKind::Object
    }

    #[allow(missing_docs)]
    pub fn is_promise(self) -> bool
    {
        self.kind == RefKind::Promise
    }

    /// Whether the vat allocated this vref.
    pub fn is_export(self) -> bool
    {
        self.allocator == Allocator::Vat
    }

    /// Whether the kernel allocated this vref.
    pub fn is_import(self) -> bool
    {
        self.allocator == Allocator::Kernel
    }
}

/// Identifies a vat.
///
/// Vat ids are allocated in order and never reused,
/// not even after the vat is terminated.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VatId(pub u32);

/// Error returned when parsing a reference from a string.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ParseRefError
{
    #[error("Malformed kref: `{0}`")]
    Kref(String),

    #[error("Malformed vref: `{0}`")]
    Vref(String),

    #[error("Malformed vat id: `{0}`")]
    VatId(String),
}
