//! Structured error types for gmon
//!
//! Using thiserror for automatic Display implementation and error chaining.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Could not attach any goroutine uprobe to {binary}")]
    CannotAttach { binary: String },

    #[error("{program} program not found in the eBPF object")]
    ProgramNotFound { program: &'static str },

    #[error("Invalid stack trace ID: {0}")]
    InvalidStackId(i32),

    #[error("Failed to look up stack addresses for stack_id={stack_id}: {error}")]
    StackLookupFailed { stack_id: i32, error: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Ebpf(#[from] aya::EbpfError),

    #[error(transparent)]
    Program(#[from] aya::programs::ProgramError),

    #[error(transparent)]
    Map(#[from] aya::maps::MapError),
}

#[derive(Error, Debug)]
pub enum SymbolError {
    #[error("Failed to read {path}: {error}")]
    Unreadable { path: String, error: std::io::Error },

    #[error("Failed to parse ELF: {0}")]
    Elf(#[from] object::Error),

    #[error("No usable symbol source in {path}")]
    NoSymbols { path: String },

    #[error("Malformed Go line table: {0}")]
    MalformedGoLineTable(&'static str),

    #[error("Failed to load DWARF debug information: {0}")]
    Dwarf(String),

    #[error("Target has no Go build information: {0}")]
    BuildInfoMissing(&'static str),

    #[error("gmon requires Go 1.23 or higher, but the target was built with {version}")]
    GoVersionTooOld { version: String },
}
