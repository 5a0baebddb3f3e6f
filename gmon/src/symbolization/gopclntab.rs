//! Parser for the Go runtime's embedded PC/line table (`.gopclntab`)
//!
//! The table maps any program counter in the text segment to its function
//! name, source file and line, which makes it sufficient as the sole symbol
//! source when present. Only the layout emitted by Go 1.18 and newer is
//! supported (little-endian, 8-byte pointers); the loader separately gates on
//! Go 1.23, so older layouts never reach this code.
//!
//! Layout reference: the header carries a magic word, the instruction-size
//! quantum and the pointer size, followed by eight offset words locating the
//! function name table, the compilation-unit table, the file table, the
//! pc-value table and the function table. Per-function line and file numbers
//! are delta-encoded varint sequences in the pc-value table.

use crate::domain::Frame;
use crate::domain::errors::SymbolError;

const GO118_MAGIC: u32 = 0xFFFF_FFF0;
const GO120_MAGIC: u32 = 0xFFFF_FFF1;

/// Size of a function-table field (entry offset or func offset)
const FUNCTAB_FIELD: usize = 4;

/// `_func` field indexes (u32 words) used for resolution
const FUNC_NAME_OFF: usize = 1;
const FUNC_PCFILE: usize = 5;
const FUNC_PCLN: usize = 6;
const FUNC_CU_OFFSET: usize = 8;

pub struct GoLineTable {
    data: Vec<u8>,
    text_start: u64,
    quantum: u32,
    nfunctab: usize,
    funcnametab: usize,
    cutab: usize,
    filetab: usize,
    pctab: usize,
    functab: usize,
}

impl GoLineTable {
    /// Parse a `.gopclntab` section. `text_start` is the address of the
    /// `.text` section, used to rebase the relative function entries.
    pub fn parse(data: Vec<u8>, text_start: u64) -> Result<Self, SymbolError> {
        use SymbolError::MalformedGoLineTable as Malformed;

        if data.len() < 8 + 8 * 8 {
            return Err(Malformed("table shorter than its header"));
        }
        let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if magic != GO118_MAGIC && magic != GO120_MAGIC {
            return Err(Malformed("unsupported magic (Go < 1.18 layout?)"));
        }
        if data[4] != 0 || data[5] != 0 {
            return Err(Malformed("nonzero header padding"));
        }
        let quantum = u32::from(data[6]);
        if quantum == 0 {
            return Err(Malformed("zero instruction quantum"));
        }
        if data[7] != 8 {
            return Err(Malformed("pointer size is not 8"));
        }

        let word = |i: usize| -> u64 {
            let off = 8 + i * 8;
            u64::from_le_bytes(data[off..off + 8].try_into().unwrap())
        };
        let region = |i: usize| -> Result<usize, SymbolError> {
            let off = word(i) as usize;
            if off >= data.len() {
                return Err(Malformed("region offset past end of table"));
            }
            Ok(off)
        };

        let nfunctab = word(0) as usize;
        let funcnametab = region(3)?;
        let cutab = region(4)?;
        let filetab = region(5)?;
        let pctab = region(6)?;
        let functab = region(7)?;

        // nfunctab entry pairs plus the trailing end-PC sentinel
        let functab_size = (nfunctab * 2 + 1) * FUNCTAB_FIELD;
        if functab + functab_size > data.len() {
            return Err(Malformed("function table truncated"));
        }

        Ok(Self { data, text_start, quantum, nfunctab, funcnametab, cutab, filetab, pctab, functab })
    }

    /// Resolve a program counter to a frame, or None when the pc falls
    /// outside the table or the table is damaged at the relevant entry.
    pub fn lookup_pc(&self, pc: u64) -> Option<Frame> {
        let index = self.find_func(pc)?;
        let func_off = self.u32_at(self.functab + index * 2 * FUNCTAB_FIELD + FUNCTAB_FIELD)?;
        let func = self.functab + func_off as usize;

        let name_off = self.func_field(func, FUNC_NAME_OFF)?;
        let function = self.cstr(self.funcnametab + name_off as usize)?;

        let entry_off = self.func_field(func, 0)?;
        let entry = self.text_start + u64::from(entry_off);

        let line = match self.pcvalue(self.func_field(func, FUNC_PCLN)?, entry, pc) {
            Some(line) if line >= 0 => Some(line as u32),
            _ => None,
        };

        let file = self
            .pcvalue(self.func_field(func, FUNC_PCFILE)?, entry, pc)
            .filter(|&fileno| fileno >= 0)
            .and_then(|fileno| {
                let cu_offset = self.func_field(func, FUNC_CU_OFFSET)?;
                let cu_index = (cu_offset as usize).checked_add(fileno as usize)?;
                let file_off = self.u32_at(self.cutab + cu_index * 4)?;
                if file_off == u32::MAX {
                    return None;
                }
                self.cstr(self.filetab + file_off as usize)
            });

        Some(Frame { function: Some(function), file, line, pc })
    }

    /// Binary search the function table for the entry covering `pc`
    fn find_func(&self, pc: u64) -> Option<usize> {
        if self.nfunctab == 0 {
            return None;
        }
        let entry = |i: usize| -> Option<u64> {
            Some(self.text_start + u64::from(self.u32_at(self.functab + i * 2 * FUNCTAB_FIELD)?))
        };
        let end = self.text_start
            + u64::from(self.u32_at(self.functab + self.nfunctab * 2 * FUNCTAB_FIELD)?);
        if pc < entry(0)? || pc >= end {
            return None;
        }

        let (mut lo, mut hi) = (0usize, self.nfunctab);
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if pc >= entry(mid)? {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Some(lo)
    }

    /// Evaluate a delta-encoded pc-value sequence at `target`. Returns None
    /// when the sequence is missing, damaged, or does not cover the target.
    fn pcvalue(&self, off: u32, entry: u64, target: u64) -> Option<i32> {
        if off == 0 {
            return None;
        }
        let mut pos = self.pctab.checked_add(off as usize)?;
        let mut val: i32 = -1;
        let mut pc = entry;
        let mut first = true;
        loop {
            let uvdelta = self.varint(&mut pos)?;
            if uvdelta == 0 && !first {
                return None;
            }
            // Zig-zag encoding: odd means a negative value delta
            let vdelta = (if uvdelta & 1 != 0 { !(uvdelta >> 1) } else { uvdelta >> 1 }) as i32;
            let pcdelta = self.varint(&mut pos)?;
            pc = pc.wrapping_add(u64::from(pcdelta) * u64::from(self.quantum));
            val = val.wrapping_add(vdelta);
            if target < pc {
                return Some(val);
            }
            first = false;
        }
    }

    fn func_field(&self, func: usize, index: usize) -> Option<u32> {
        self.u32_at(func + index * 4)
    }

    fn u32_at(&self, off: usize) -> Option<u32> {
        let bytes = self.data.get(off..off + 4)?;
        Some(u32::from_le_bytes(bytes.try_into().ok()?))
    }

    fn varint(&self, pos: &mut usize) -> Option<u32> {
        let mut value: u32 = 0;
        let mut shift = 0u32;
        loop {
            let byte = *self.data.get(*pos)?;
            *pos += 1;
            value |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Some(value);
            }
            shift += 7;
            if shift > 28 {
                return None;
            }
        }
    }

    fn cstr(&self, off: usize) -> Option<String> {
        let tail = self.data.get(off..)?;
        let len = tail.iter().position(|&b| b == 0)?;
        Some(String::from_utf8_lossy(&tail[..len]).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT_START: u64 = 0x40_1000;

    /// Assemble a two-function table:
    /// `main.alpha` at [text, text+0x20) on main.go line 10, and
    /// `main.beta` at [text+0x20, text+0x40) on main.go line 20.
    fn build_table() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&GO120_MAGIC.to_le_bytes());
        data.extend_from_slice(&[0, 0]); // pad
        data.push(1); // quantum
        data.push(8); // ptrsize
        let header_words = data.len();
        data.extend_from_slice(&[0u8; 64]); // eight offset words, patched below

        let funcnametab = data.len();
        data.extend_from_slice(b"main.alpha\0");
        let beta_name = 11u32;
        data.extend_from_slice(b"main.beta\0");

        let cutab = data.len();
        data.extend_from_slice(&1u32.to_le_bytes()); // CU 0, file 0 -> filetab offset 1

        let filetab = data.len();
        data.extend_from_slice(b"\0main.go\0");

        let pctab = data.len();
        data.push(0); // offset 0 means "missing"
        let pcfile = (data.len() - pctab) as u32;
        data.extend_from_slice(&[0x02, 0x40, 0x00]); // file number 0 for 0x40 bytes
        let pcln_alpha = (data.len() - pctab) as u32;
        data.extend_from_slice(&[22, 0x40, 0x00]); // line 10 for 0x40 bytes
        let pcln_beta = (data.len() - pctab) as u32;
        data.extend_from_slice(&[42, 0x40, 0x00]); // line 20 for 0x40 bytes

        let functab = data.len();
        let entries = 2 * 2 * FUNCTAB_FIELD + FUNCTAB_FIELD; // two pairs + sentinel
        let func_a = entries as u32;
        let func_b = func_a + 40; // ten u32 fields per _func
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&func_a.to_le_bytes());
        data.extend_from_slice(&0x20u32.to_le_bytes());
        data.extend_from_slice(&func_b.to_le_bytes());
        data.extend_from_slice(&0x40u32.to_le_bytes()); // end sentinel

        let mut push_func = |entry_off: u32, name_off: u32, pcln: u32| {
            let fields =
                [entry_off, name_off, 0, 0, 0, pcfile, pcln, 0, /* cuOffset */ 0, 1];
            for field in fields {
                data.extend_from_slice(&field.to_le_bytes());
            }
        };
        push_func(0, 0, pcln_alpha);
        push_func(0x20, beta_name, pcln_beta);

        // Patch the header offset words
        let words: [u64; 8] = [
            2, // nfunctab
            1, // nfiletab
            TEXT_START,
            funcnametab as u64,
            cutab as u64,
            filetab as u64,
            pctab as u64,
            functab as u64,
        ];
        for (i, word) in words.iter().enumerate() {
            let off = header_words + i * 8;
            data[off..off + 8].copy_from_slice(&word.to_le_bytes());
        }
        data
    }

    #[test]
    fn test_lookup_inside_first_function() {
        let table = GoLineTable::parse(build_table(), TEXT_START).unwrap();
        let frame = table.lookup_pc(TEXT_START + 0x08).unwrap();
        assert_eq!(frame.function.as_deref(), Some("main.alpha"));
        assert_eq!(frame.file.as_deref(), Some("main.go"));
        assert_eq!(frame.line, Some(10));
        assert_eq!(frame.pc, TEXT_START + 0x08);
    }

    #[test]
    fn test_lookup_at_entry_boundary() {
        let table = GoLineTable::parse(build_table(), TEXT_START).unwrap();
        let frame = table.lookup_pc(TEXT_START + 0x20).unwrap();
        assert_eq!(frame.function.as_deref(), Some("main.beta"));
        assert_eq!(frame.line, Some(20));
    }

    #[test]
    fn test_lookup_last_byte_of_text() {
        let table = GoLineTable::parse(build_table(), TEXT_START).unwrap();
        let frame = table.lookup_pc(TEXT_START + 0x3F).unwrap();
        assert_eq!(frame.function.as_deref(), Some("main.beta"));
    }

    #[test]
    fn test_lookup_outside_table() {
        let table = GoLineTable::parse(build_table(), TEXT_START).unwrap();
        assert!(table.lookup_pc(TEXT_START + 0x40).is_none());
        assert!(table.lookup_pc(TEXT_START - 1).is_none());
        assert!(table.lookup_pc(0).is_none());
    }

    #[test]
    fn test_lookup_is_deterministic() {
        let table = GoLineTable::parse(build_table(), TEXT_START).unwrap();
        let a = table.lookup_pc(TEXT_START + 0x21).unwrap();
        let b = table.lookup_pc(TEXT_START + 0x21).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_reject_bad_magic() {
        let mut data = build_table();
        data[0..4].copy_from_slice(&0xFFFF_FFFBu32.to_le_bytes()); // Go 1.2 magic
        assert!(GoLineTable::parse(data, TEXT_START).is_err());
    }

    #[test]
    fn test_reject_bad_pointer_size() {
        let mut data = build_table();
        data[7] = 4;
        assert!(GoLineTable::parse(data, TEXT_START).is_err());
    }

    #[test]
    fn test_reject_truncated_table() {
        let data = build_table();
        assert!(GoLineTable::parse(data[..40].to_vec(), TEXT_START).is_err());
    }
}
