//! # gmon - eBPF-based Goroutine Lifecycle Monitor
//!
//! gmon watches goroutine creation and termination in a running Go binary by
//! attaching uprobes to two runtime entry points, and turns the resulting
//! kernel events into structured logs and Prometheus metrics.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Target Go Binary                         │
//! │        runtime.newproc1 / runtime.goexit1                   │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │ uprobes
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 eBPF Programs (Kernel)                      │
//! │   EVENTS ring buffer  •  STACK_ADDRESSES stack map          │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │ lifecycle events
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     gmon (This Crate)                       │
//! │                                                             │
//! │  ┌────────────┐   bounded    ┌────────────┐   ┌──────────┐  │
//! │  │   Event    │───channel───▶│  Reporter  │──▶│ Metrics  │  │
//! │  │   Reader   │              │ (in-flight │   │ registry │  │
//! │  └─────┬──────┘              │    map)    │   └────┬─────┘  │
//! │        │                     └────────────┘        │        │
//! │        ▼                                           ▼        │
//! │  ┌────────────┐                              ┌──────────┐   │
//! │  │ Symbol     │                              │ /metrics │   │
//! │  │ Table      │                              │  (HTTP)  │   │
//! │  └────────────┘                              └──────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`monitoring`]: the live pipeline
//!   - `ebpf_setup`: load the eBPF object, attach/detach the two uprobes
//!   - `event_reader`: poll the ring buffer, decode, resolve, forward
//!   - `stack_resolver`: stack id -> symbolic frames, kernel-map GC
//!   - `reporter`: pair create/exit by goroutine id, uptime and expiry
//!
//! - [`symbolization`]: program counter -> function/file/line
//!   - `.gopclntab` fast path, DWARF + ELF symbol fallback
//!
//! - [`metrics`]: Prometheus counter/histogram families with stack labels
//!
//! - [`server`]: the `/metrics` HTTP endpoint
//!
//! - [`cli`], [`domain`], [`preflight`], [`trace_pipe`]: arguments, core
//!   types and errors, startup checks, kernel trace-pipe mirroring
//!
//! ## Shutdown
//!
//! SIGINT/SIGTERM flips a shared flag; the reader stops polling and drops
//! its channel end, the reporter drains and stops, then the uprobes are
//! detached before the eBPF object unloads.

// Expose modules for testing
pub mod cli;
pub mod domain;
pub mod metrics;
pub mod monitoring;
pub mod preflight;
pub mod server;
pub mod symbolization;
pub mod trace_pipe;
