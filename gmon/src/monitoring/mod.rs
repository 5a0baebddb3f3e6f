//! Monitoring core modules
//!
//! The live pipeline, kernel side to metrics:
//! - eBPF program loading and uprobe attachment
//! - Ring buffer reading and event decoding
//! - Stack trace resolution with kernel-map garbage collection
//! - Lifecycle correlation and uptime reporting

pub mod ebpf_setup;
pub mod event_reader;
pub mod reporter;
pub mod stack_cache;
pub mod stack_resolver;

pub use ebpf_setup::{attach_goroutine_uprobes, detach_goroutine_uprobes, load_ebpf_program};
pub use event_reader::{EventReader, EVENT_QUEUE_CAPACITY};
pub use reporter::{Reporter, REPORT_INTERVAL};
pub use stack_cache::StackIdCache;
pub use stack_resolver::StackResolver;
