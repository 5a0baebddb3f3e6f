#![no_std]

// Shared data structures between eBPF and userspace

/// Maximum number of stack frames decoded from a captured stack trace
pub const MAX_STACK_DEPTH: usize = 20;

/// Byte offset of `goid` inside `runtime.g` for Go 1.23 binaries.
///
/// `pahole -C runtime.g /path/to/gobinary` reports the offset; it is stable
/// across the Go 1.23 release branch, which is why userspace gates on the
/// target's Go version before attaching.
pub const GOID_OFFSET: u64 = 152;

/// Goroutine lifecycle event sent from eBPF to userspace
#[repr(C)]
#[derive(Clone, Copy)]
pub struct GoroutineEvent {
    pub goroutine_id: i64, // Runtime-assigned goroutine id
    pub stack_id: i32,     // Stack trace id (from the STACK_ADDRESSES map)
    pub exit: u8,          // 0 = created, 1 = exited
    #[allow(clippy::pub_underscore_fields)]
    pub _padding: [u8; 3], // Padding for alignment
}

#[cfg(feature = "user")]
use aya::Pod;

// Required for eBPF <-> userspace communication; the type is plain bytes.
#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for GoroutineEvent {}
