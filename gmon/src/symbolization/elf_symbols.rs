//! Function symbol index built from the ELF symbol tables
//!
//! Collects `STT_FUNC` symbols from both the static and dynamic symbol
//! tables, rebases their addresses through the executable `PT_LOAD` program
//! headers, and keeps them sorted by entry address so a program counter can
//! be mapped back to its function with a binary search. This is the same
//! adjustment the kernel's uprobe layer performs, which makes the addresses
//! usable both for attach-by-address and for stack resolution.

use std::collections::HashMap;

use object::{Object, ObjectSegment, ObjectSymbol, SegmentFlags};

/// A function symbol with its adjusted entry address and computed end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncSym {
    pub name: String,
    pub entry: u64,
    pub end: u64,
}

/// Executable `PT_LOAD` segment bounds used for address rebasing
#[derive(Debug, Clone, Copy)]
struct ExecSegment {
    vaddr: u64,
    memsz: u64,
    offset: u64,
}

#[derive(Default)]
pub struct ElfSymbolIndex {
    by_name: HashMap<String, u64>,
    functions: Vec<FuncSym>,
}

impl ElfSymbolIndex {
    pub fn build(obj: &object::File<'_>) -> Self {
        let segments: Vec<ExecSegment> = obj
            .segments()
            .filter(|segment| {
                // Only executable PT_LOAD segments participate in rebasing
                match segment.flags() {
                    SegmentFlags::Elf { p_flags } => p_flags & object::elf::PF_X != 0,
                    _ => false,
                }
            })
            .map(|segment| ExecSegment {
                vaddr: segment.address(),
                memsz: segment.size(),
                offset: segment.file_range().0,
            })
            .collect();

        let entries = obj
            .symbols()
            .chain(obj.dynamic_symbols())
            .filter(|symbol| symbol.kind() == object::SymbolKind::Text)
            .filter_map(|symbol| {
                let name = symbol.name().ok()?;
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), rebase(symbol.address(), &segments)))
            })
            .collect();

        Self::from_entries(entries)
    }

    /// Build the sorted function array and by-name map from (name, adjusted
    /// address) pairs. Each function's end is the next function's entry; the
    /// last one only covers its own entry point since its extent is unknown.
    pub(crate) fn from_entries(entries: Vec<(String, u64)>) -> Self {
        let mut by_name = HashMap::with_capacity(entries.len());
        let mut functions: Vec<FuncSym> = Vec::with_capacity(entries.len());
        for (name, entry) in entries {
            by_name.insert(name.clone(), entry);
            let index = functions.partition_point(|f| f.entry < entry);
            functions.insert(index, FuncSym { name, entry, end: 0 });
        }
        for i in 0..functions.len() {
            functions[i].end =
                if i + 1 < functions.len() { functions[i + 1].entry } else { functions[i].entry };
        }
        Self { by_name, functions }
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Adjusted entry address of a named function, or 0 if unknown
    pub fn address(&self, symbol: &str) -> u64 {
        self.by_name.get(symbol).copied().unwrap_or(0)
    }

    /// Find the function covering `pc` (entry <= pc <= end)
    pub fn pc_to_func(&self, pc: u64) -> Option<&FuncSym> {
        let mut low = 0isize;
        let mut high = self.functions.len() as isize - 1;
        while low <= high {
            let mid = (low + (high - low) / 2) as usize;
            let f = &self.functions[mid];
            if pc < f.entry {
                high = mid as isize - 1;
            } else if pc > f.end {
                low = mid as isize + 1;
            } else {
                return Some(f);
            }
        }
        None
    }
}

/// Rebase a symbol value to its file offset when it falls inside a loadable
/// executable segment (`value - vaddr + offset`); otherwise keep it as-is.
fn rebase(value: u64, segments: &[ExecSegment]) -> u64 {
    for segment in segments {
        if segment.vaddr <= value && value < segment.vaddr + segment.memsz {
            return value - segment.vaddr + segment.offset;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> ElfSymbolIndex {
        ElfSymbolIndex::from_entries(vec![
            ("runtime.goexit1".to_string(), 0x3000),
            ("main.main".to_string(), 0x1000),
            ("runtime.newproc1".to_string(), 0x2000),
        ])
    }

    #[test]
    fn test_address_lookup() {
        let index = index();
        assert_eq!(index.address("runtime.newproc1"), 0x2000);
        assert_eq!(index.address("main.main"), 0x1000);
        assert_eq!(index.address("does.not.exist"), 0);
    }

    #[test]
    fn test_functions_sorted_with_computed_ends() {
        let index = index();
        let entries: Vec<u64> = index.functions.iter().map(|f| f.entry).collect();
        assert_eq!(entries, vec![0x1000, 0x2000, 0x3000]);
        assert_eq!(index.functions[0].end, 0x2000);
        assert_eq!(index.functions[1].end, 0x3000);
        assert_eq!(index.functions[2].end, 0x3000);
    }

    #[test]
    fn test_pc_to_func() {
        let index = index();
        assert_eq!(index.pc_to_func(0x1000).map(|f| f.name.as_str()), Some("main.main"));
        assert_eq!(index.pc_to_func(0x1FFF).map(|f| f.name.as_str()), Some("main.main"));
        assert_eq!(index.pc_to_func(0x2500).map(|f| f.name.as_str()), Some("runtime.newproc1"));
        assert_eq!(index.pc_to_func(0x0FFF), None);
        // The last function's extent is unknown; only its entry matches
        assert_eq!(index.pc_to_func(0x3000).map(|f| f.name.as_str()), Some("runtime.goexit1"));
        assert_eq!(index.pc_to_func(0x9000), None);
    }

    #[test]
    fn test_pc_to_func_empty_index() {
        let index = ElfSymbolIndex::from_entries(vec![]);
        assert!(index.is_empty());
        assert_eq!(index.pc_to_func(0x1000), None);
    }

    #[test]
    fn test_rebase_inside_exec_segment() {
        let segments = [ExecSegment { vaddr: 0x40_0000, memsz: 0x1_0000, offset: 0x1000 }];
        assert_eq!(rebase(0x40_2000, &segments), 0x3000);
        // Outside any executable segment the value is untouched
        assert_eq!(rebase(0x50_0000, &segments), 0x50_0000);
    }
}
