//! # Symbol Resolution
//!
//! Converts raw program counters from eBPF stack traces into function names
//! and source locations using the target's own debug metadata.
//!
//! ## Sources, tried in order
//!
//! 1. **`.gopclntab`** — the Go runtime's embedded PC/line table. When
//!    present and parseable it is the sole symbol source.
//! 2. **DWARF + ELF symbols** — line programs give (file, line); `STT_FUNC`
//!    symbols, rebased through the executable program headers, give names.
//!
//! The by-name side of the ELF index also backs probe attachment when the
//! kernel rejects attach-by-symbol (stripped binaries).

pub mod buildinfo;
pub mod dwarf;
pub mod elf_symbols;
pub mod gopclntab;
pub mod symbolizer;

pub use elf_symbols::{ElfSymbolIndex, FuncSym};
pub use gopclntab::GoLineTable;
pub use symbolizer::SymbolTable;
