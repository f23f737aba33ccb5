//! Opaque host references
//!
//! An [`OpaqueRef`] is an unmanaged external handle: the engine never
//! dereferences it, never traverses it and never frees it. When a value is
//! copied between states it crosses by raw identity, so the destination
//! receives a value that compares equal to the source's.

use std::fmt;

/// Unmanaged handle passed through by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpaqueRef(usize);

impl OpaqueRef {
    /// Wrap a raw address.
    pub fn new(address: usize) -> Self {
        OpaqueRef(address)
    }

    /// Wrap a pointer. The pointee is never accessed through the handle.
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        OpaqueRef(ptr as usize)
    }

    /// Get the raw address
    pub fn address(&self) -> usize {
        self.0
    }

    /// Recover the pointer the handle was made from.
    pub fn as_ptr<T>(&self) -> *const T {
        self.0 as *const T
    }
}

impl fmt::Display for OpaqueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "userdata: {:#010x}", self.0)
    }
}
