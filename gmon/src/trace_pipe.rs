//! Debug mirror of the kernel trace pipe
//!
//! The eBPF programs report failure paths through `bpf_printk`, which lands
//! in `/sys/kernel/debug/tracing/trace_pipe`. At debug log level this
//! thread tails the pipe and re-logs lines mentioning gmon.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::{debug, error};

const TRACE_PIPE_PATH: &str = "/sys/kernel/debug/tracing/trace_pipe";

/// Spawn the mirror thread. It blocks in reads, so it is deliberately not
/// joined on shutdown; the pipe dies with the process.
pub fn spawn_mirror(shutdown: Arc<AtomicBool>) {
    let spawned = thread::Builder::new().name("trace-pipe".to_string()).spawn(move || {
        let pipe = match File::open(TRACE_PIPE_PATH) {
            Ok(pipe) => pipe,
            Err(e) => {
                error!("open trace_pipe: {e}");
                return;
            }
        };
        let mut reader = BufReader::new(pipe);
        let mut line = String::new();
        while !shutdown.load(Ordering::Relaxed) {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    let msg = line.trim();
                    if msg.contains("gmon") {
                        debug!("{msg}");
                    }
                }
                Err(e) => {
                    error!("read trace_pipe: {e}");
                    break;
                }
            }
        }
    });
    if let Err(e) = spawned {
        error!("failed to spawn trace_pipe mirror: {e}");
    }
}
