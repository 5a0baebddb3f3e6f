//! Pre-flight checks for gmon
//!
//! Validates system requirements before attempting to load eBPF programs.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() and setrlimit() require unsafe

use anyhow::{bail, Context, Result};
use log::debug;
use std::path::Path;

use crate::symbolization::buildinfo;

/// Run all pre-flight checks before eBPF loading
pub fn run_preflight_checks(target_path: &str) -> Result<()> {
    check_platform()?;
    check_privileges()?;
    check_binary_exists(target_path)?;
    check_go_version(target_path)?;
    raise_memlock_rlimit()?;
    Ok(())
}

/// Goroutine-id extraction relies on the amd64 register ABI and the Linux
/// uprobe layer; refuse to start anywhere else.
pub fn check_platform() -> Result<()> {
    if cfg!(all(target_arch = "x86_64", target_os = "linux")) {
        return Ok(());
    }
    bail!(
        "gmon only works on x86-64 Linux (this build targets {}/{})",
        std::env::consts::ARCH,
        std::env::consts::OS
    );
}

/// Check if running with sufficient privileges for eBPF
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }
    bail!(
        "Permission denied: gmon requires root privileges to load eBPF programs.\n\n\
         Run with: sudo gmon ..."
    );
}

/// Check if the target binary exists and is readable
fn check_binary_exists(target_path: &str) -> Result<()> {
    let path = Path::new(target_path);
    if !path.exists() {
        bail!(
            "Binary not found: {}\n\n\
             Make sure the path is correct and the binary exists.",
            target_path
        );
    }
    if !path.is_file() {
        bail!(
            "Not a file: {}\n\n\
             --path must point to an executable file, not a directory.",
            target_path
        );
    }
    Ok(())
}

/// The goroutine-id offset baked into the probes matches the Go 1.23
/// `runtime.g` layout; refuse older targets up front.
fn check_go_version(target_path: &str) -> Result<()> {
    let data = std::fs::read(target_path)
        .with_context(|| format!("Failed to read binary: {target_path}"))?;
    let obj = object::File::parse(&*data).context("Failed to parse target as ELF")?;
    let version = buildinfo::check_go_version(&obj)?;
    debug!("target built with {version}");
    Ok(())
}

/// Lift the memlock rlimit so eBPF maps can be created on kernels that
/// still account them against it
fn raise_memlock_rlimit() -> Result<()> {
    let rlim = libc::rlimit { rlim_cur: libc::RLIM_INFINITY, rlim_max: libc::RLIM_INFINITY };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error()).context("Failed to raise memlock rlimit");
    }
    Ok(())
}

/// Check if the target process exists
pub fn check_process_exists(pid: i32) -> Result<()> {
    let proc_path = format!("/proc/{pid}");
    if !Path::new(&proc_path).exists() {
        bail!(
            "Process {pid} not found.\n\n\
             Is the process still running? Check with: ps -p {pid}"
        );
    }
    Ok(())
}
