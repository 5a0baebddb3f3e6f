//! The symbol table facade: one immutable lookup structure per target binary
//!
//! Build policy, in order:
//!
//! 1. If the binary carries a parseable `.gopclntab`, it becomes the sole
//!    line source; the runtime's own table already knows every function.
//! 2. Otherwise DWARF line programs provide (file, line) and the ELF symbol
//!    index provides function names.
//!
//! The ELF symbol index is always built: probe attachment needs
//! [`SymbolTable::lookup_address`] even on the fast path.

use std::fs;
use std::path::Path;

use log::debug;
use object::{Object, ObjectSection};

use super::dwarf::DwarfLineInfo;
use super::elf_symbols::ElfSymbolIndex;
use super::gopclntab::GoLineTable;
use crate::domain::errors::SymbolError;
use crate::domain::Frame;

/// Mask applied before retrying an unresolved pc. Some stripped production
/// binaries (dockerd, containerd among them) deliver stack addresses whose
/// upper bytes are garbage while the low three bytes still fall inside the
/// text mapping.
const PC_RETRY_MASK: u64 = 0x00FF_FFFF;

enum LineSource {
    GoTable(GoLineTable),
    Dwarf(DwarfLineInfo),
    None,
}

pub struct SymbolTable {
    index: ElfSymbolIndex,
    lines: LineSource,
}

impl SymbolTable {
    /// Load the symbol table for the target executable
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SymbolError> {
        let path = path.as_ref();
        let data = fs::read(path)
            .map_err(|error| SymbolError::Unreadable { path: path.display().to_string(), error })?;
        let obj = object::File::parse(&*data)?;
        Self::from_object(&obj, &path.display().to_string())
    }

    fn from_object(obj: &object::File<'_>, path: &str) -> Result<Self, SymbolError> {
        let index = ElfSymbolIndex::build(obj);

        let lines = if let Some(table) = go_line_table(obj) {
            debug!("load symbols from .gopclntab");
            LineSource::GoTable(table)
        } else if let Some(dwarf) = dwarf_lines(obj) {
            debug!("load symbols from DWARF");
            LineSource::Dwarf(dwarf)
        } else {
            LineSource::None
        };

        if matches!(lines, LineSource::None) && index.is_empty() {
            return Err(SymbolError::NoSymbols { path: path.to_string() });
        }

        Ok(Self { index, lines })
    }

    /// Adjusted entry address of a named function, or 0 if unknown
    pub fn lookup_address(&self, symbol: &str) -> u64 {
        self.index.address(symbol)
    }

    /// Resolve a program counter to a frame. Unresolvable addresses come
    /// back as a bare-pc frame after the masked retry.
    pub fn lookup_pc(&self, pc: u64) -> Frame {
        self.resolve(pc)
            .or_else(|| self.resolve(pc & PC_RETRY_MASK).map(|frame| Frame { pc, ..frame }))
            .unwrap_or_else(|| Frame::unresolved(pc))
    }

    fn resolve(&self, pc: u64) -> Option<Frame> {
        match &self.lines {
            LineSource::GoTable(table) => table.lookup_pc(pc),
            LineSource::Dwarf(dwarf) => {
                let function = self.index.pc_to_func(pc).map(|f| f.name.clone());
                let location = dwarf.find_location(pc);
                if function.is_none() && location.is_none() {
                    return None;
                }
                let (file, line) = match location {
                    Some((file, line)) => (Some(file), Some(line)),
                    None => (None, None),
                };
                Some(Frame { function, file, line, pc })
            }
            LineSource::None => {
                let func = self.index.pc_to_func(pc)?;
                Some(Frame { function: Some(func.name.clone()), file: None, line: None, pc })
            }
        }
    }
}

fn go_line_table(obj: &object::File<'_>) -> Option<GoLineTable> {
    let pclntab = obj.section_by_name(".gopclntab")?;
    let text = obj.section_by_name(".text")?;
    let data = pclntab.uncompressed_data().ok()?.into_owned();
    match GoLineTable::parse(data, text.address()) {
        Ok(table) => Some(table),
        Err(e) => {
            debug!("failed to parse .gopclntab: {e}");
            None
        }
    }
}

fn dwarf_lines(obj: &object::File<'_>) -> Option<DwarfLineInfo> {
    let has_debug_info = obj.section_by_name(".debug_info").is_some_and(|s| s.size() > 0);
    if !has_debug_info {
        return None;
    }
    match DwarfLineInfo::new(obj) {
        Ok(dwarf) => Some(dwarf),
        Err(e) => {
            debug!("failed to load DWARF: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symtab_only() -> SymbolTable {
        let index = ElfSymbolIndex::from_entries(vec![
            ("main.main".to_string(), 0x1000),
            ("main.worker".to_string(), 0x2000),
        ]);
        SymbolTable { index, lines: LineSource::None }
    }

    #[test]
    fn test_lookup_pc_by_symbol_index() {
        let table = symtab_only();
        let frame = table.lookup_pc(0x1234);
        assert_eq!(frame.function.as_deref(), Some("main.main"));
        assert_eq!(frame.file, None);
        assert_eq!(frame.pc, 0x1234);
    }

    #[test]
    fn test_lookup_pc_masked_retry() {
        let table = symtab_only();
        // Upper bytes are junk; the low three bytes land inside main.main
        let frame = table.lookup_pc(0xAA00_0000_0000_1234);
        assert_eq!(frame.function.as_deref(), Some("main.main"));
        assert_eq!(frame.pc, 0xAA00_0000_0000_1234);
    }

    #[test]
    fn test_lookup_pc_unresolved() {
        let table = symtab_only();
        let frame = table.lookup_pc(0xDEAD_BEEF);
        assert_eq!(frame.function, None);
        assert_eq!(frame.to_string(), "0xdeadbeef");
    }

    #[test]
    fn test_lookup_pc_is_pure() {
        let table = symtab_only();
        assert_eq!(table.lookup_pc(0x2001), table.lookup_pc(0x2001));
    }

    #[test]
    fn test_lookup_address() {
        let table = symtab_only();
        assert_eq!(table.lookup_address("main.worker"), 0x2000);
        assert_eq!(table.lookup_address("runtime.missing"), 0);
    }
}
