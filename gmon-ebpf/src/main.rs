//! Kernel-side instrumentation of the Go runtime's goroutine lifecycle.
//!
//! Two uprobes cover the full lifecycle:
//!
//! - `runtime_newproc1` fires on return from `runtime.newproc1`, whose return
//!   value is the freshly allocated `*runtime.g`. The goroutine id is read
//!   from that struct at [`GOID_OFFSET`].
//! - `runtime_goexit1` fires on entry to `runtime.goexit1`, which runs on the
//!   goroutine that is terminating. On amd64 the Go register ABI pins the
//!   current `g` in R14, so the id is read through the saved register.
//!
//! Each hook captures the user-space call stack into `STACK_ADDRESSES` and
//! pushes a fixed-size [`GoroutineEvent`] into the `EVENTS` ring buffer.
//! Failure paths emit `bpf_printk` lines tagged `gmon` so they can be mirrored
//! from the trace pipe at debug level.

#![no_std]
#![no_main]
#![allow(unused_unsafe)]

use aya_ebpf::{
    bindings::BPF_F_USER_STACK,
    bpf_printk,
    helpers::bpf_probe_read_user,
    macros::{map, uprobe, uretprobe},
    maps::{RingBuf, StackTrace},
    programs::{ProbeContext, RetProbeContext},
};
use gmon_common::{GoroutineEvent, GOID_OFFSET};

/// Ring buffer carrying goroutine lifecycle events to userspace
#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(256 * 1024, 0); // 256KB buffer

/// Stack trace map: stack id -> packed array of instruction pointers
#[map]
static STACK_ADDRESSES: StackTrace = StackTrace::with_max_entries(1024, 0);

/// Hook: return of runtime.newproc1 (goroutine creation)
#[uretprobe]
pub fn runtime_newproc1(ctx: RetProbeContext) -> u32 {
    match try_newproc1(&ctx) {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

fn try_newproc1(ctx: &RetProbeContext) -> Result<(), i64> {
    // runtime.newproc1 returns the new *runtime.g
    let newg: u64 = ctx.ret().ok_or(1i64)?;
    if newg == 0 {
        unsafe { bpf_printk!(b"gmon: newproc1 returned a nil goroutine pointer") };
        return Err(1);
    }

    let goroutine_id = read_goroutine_id(newg)?;

    let stack_id = unsafe { STACK_ADDRESSES.get_stackid(ctx, BPF_F_USER_STACK.into()) }
        .map_err(|_| {
            unsafe { bpf_printk!(b"gmon: newproc1 failed to read stack id") };
            1i64
        })?;

    output_event(goroutine_id, stack_id as i32, 0)
}

/// Hook: entry of runtime.goexit1 (goroutine termination)
#[uprobe]
pub fn runtime_goexit1(ctx: ProbeContext) -> u32 {
    match try_goexit1(&ctx) {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

fn try_goexit1(ctx: &ProbeContext) -> Result<(), i64> {
    // goexit1 runs on the dying goroutine; the amd64 register ABI keeps the
    // current g in R14.
    let g: u64 = unsafe { (*ctx.regs).r14 };
    if g == 0 {
        unsafe { bpf_printk!(b"gmon: goexit1 found no current goroutine") };
        return Err(1);
    }

    let goroutine_id = read_goroutine_id(g)?;

    let stack_id = unsafe { STACK_ADDRESSES.get_stackid(ctx, BPF_F_USER_STACK.into()) }
        .map_err(|_| {
            unsafe { bpf_printk!(b"gmon: goexit1 failed to read stack id") };
            1i64
        })?;

    output_event(goroutine_id, stack_id as i32, 1)
}

/// Read `goid` from a user-space `*runtime.g`. Zero ids are produced while
/// the runtime is still wiring the g up and carry no information.
fn read_goroutine_id(g: u64) -> Result<i64, i64> {
    let goroutine_id: i64 =
        unsafe { bpf_probe_read_user((g + GOID_OFFSET) as *const i64) }.map_err(|_| {
            unsafe { bpf_printk!(b"gmon: failed to read goroutine id from g") };
            1i64
        })?;
    if goroutine_id == 0 {
        return Err(1);
    }
    Ok(goroutine_id)
}

fn output_event(goroutine_id: i64, stack_id: i32, exit: u8) -> Result<(), i64> {
    let event = GoroutineEvent { goroutine_id, stack_id, exit, _padding: [0u8; 3] };
    EVENTS.output(&event, 0).map_err(|_| 1i64)
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
