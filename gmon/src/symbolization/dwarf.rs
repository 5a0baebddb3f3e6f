//! DWARF line information, used when the target has no Go line table
//!
//! Only (file, line) comes from DWARF; function names come from the ELF
//! symbol index, which survives even when line programs are damaged.

use std::borrow::Cow;
use std::sync::Arc;

use addr2line::Context;
use gimli::{EndianArcSlice, RunTimeEndian};
use object::{Object, ObjectSection};

use crate::domain::errors::SymbolError;

pub struct DwarfLineInfo {
    ctx: Context<EndianArcSlice<RunTimeEndian>>,
}

impl DwarfLineInfo {
    /// Load DWARF sections from the object file. The section data is copied
    /// into `Arc` slices so the context can move into the reader thread.
    pub fn new(obj: &object::File<'_>) -> Result<Self, SymbolError> {
        let endian =
            if obj.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

        let load_section =
            |id: gimli::SectionId| -> Result<EndianArcSlice<RunTimeEndian>, gimli::Error> {
                let data = obj
                    .section_by_name(id.name())
                    .and_then(|section| section.uncompressed_data().ok())
                    .unwrap_or(Cow::Borrowed(&[][..]));
                Ok(EndianArcSlice::new(Arc::from(&*data), endian))
            };

        let dwarf = gimli::Dwarf::load(&load_section)
            .map_err(|e| SymbolError::Dwarf(e.to_string()))?;
        let ctx =
            Context::from_dwarf(dwarf).map_err(|e| SymbolError::Dwarf(e.to_string()))?;

        Ok(Self { ctx })
    }

    /// Source location for a program counter, when the line programs cover it
    pub fn find_location(&self, pc: u64) -> Option<(String, u32)> {
        let location = self.ctx.find_location(pc).ok()??;
        let file = location.file?.to_string();
        let line = location.line?;
        Some((file, line))
    }
}
