//! Go build-information reader
//!
//! Extracts the Go toolchain version from the target's `.go.buildinfo`
//! section and enforces the minimum supported release. The goroutine-id
//! offset baked into the probes matches the Go 1.23 `runtime.g` layout, so
//! older targets are rejected up front instead of producing garbage ids.

use object::{Object, ObjectSection};

use crate::domain::errors::SymbolError;

const BUILDINFO_SECTION: &str = ".go.buildinfo";
const BUILDINFO_MAGIC: &[u8; 14] = b"\xff Go buildinf:";

/// Offset of the inline version string within the section
const INLINE_DATA_OFFSET: usize = 32;

/// Flag bit: version and modinfo are stored inline (Go >= 1.18)
const FLAG_INLINE_STRINGS: u8 = 0x2;

/// Check that the target was built with a supported Go toolchain
pub fn check_go_version(obj: &object::File<'_>) -> Result<String, SymbolError> {
    let section = obj
        .section_by_name(BUILDINFO_SECTION)
        .ok_or(SymbolError::BuildInfoMissing("no .go.buildinfo section (not a Go binary?)"))?;
    let data = section
        .uncompressed_data()
        .map_err(|_| SymbolError::BuildInfoMissing("unreadable .go.buildinfo section"))?;

    let version = parse_version(&data)?;
    if !is_supported_version(&version) {
        return Err(SymbolError::GoVersionTooOld { version });
    }
    Ok(version)
}

/// Parse the toolchain version string out of `.go.buildinfo` contents
fn parse_version(data: &[u8]) -> Result<String, SymbolError> {
    use SymbolError::BuildInfoMissing as Missing;

    if data.len() < INLINE_DATA_OFFSET || &data[..14] != BUILDINFO_MAGIC {
        return Err(Missing("bad .go.buildinfo header"));
    }
    let flags = data[15];
    if flags & FLAG_INLINE_STRINGS == 0 {
        // Pointer-indirect strings went away in Go 1.18; anything this old
        // fails the version gate anyway.
        return Err(Missing("pre-1.18 pointer-indirect build info"));
    }

    let tail = &data[INLINE_DATA_OFFSET..];
    let (len, prefix) = uvarint(tail).ok_or(Missing("bad version length"))?;
    let version = tail
        .get(prefix..prefix + len as usize)
        .ok_or(Missing("version string truncated"))?;
    String::from_utf8(version.to_vec()).map_err(|_| Missing("version string is not UTF-8"))
}

/// Whether the reported toolchain is Go 1.23 or newer
fn is_supported_version(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() != 3 {
        return false;
    }
    if parts[0] != "go1" {
        return false;
    }
    match parts[1].parse::<u32>() {
        Ok(minor) => minor >= 23,
        Err(_) => false,
    }
}

fn uvarint(data: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in data.iter().enumerate() {
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
        shift += 7;
        if shift > 63 {
            return None;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_section(version: &str, flags: u8) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(BUILDINFO_MAGIC);
        data.push(8); // ptr size
        data.push(flags);
        data.resize(INLINE_DATA_OFFSET, 0);
        data.push(version.len() as u8); // single-byte uvarint is enough here
        data.extend_from_slice(version.as_bytes());
        data
    }

    #[test]
    fn test_parse_inline_version() {
        let data = build_section("go1.23.4", FLAG_INLINE_STRINGS);
        assert_eq!(parse_version(&data).unwrap(), "go1.23.4");
    }

    #[test]
    fn test_reject_pointer_indirect_layout() {
        let data = build_section("go1.17.1", 0);
        assert!(parse_version(&data).is_err());
    }

    #[test]
    fn test_reject_bad_magic() {
        let mut data = build_section("go1.23.4", FLAG_INLINE_STRINGS);
        data[1] = b'X';
        assert!(parse_version(&data).is_err());
    }

    #[test]
    fn test_version_gate() {
        assert!(is_supported_version("go1.23.0"));
        assert!(is_supported_version("go1.24.2"));
        assert!(!is_supported_version("go1.22.9"));
        assert!(!is_supported_version("go1.23")); // two components only
        assert!(!is_supported_version("devel +abcdef"));
        assert!(!is_supported_version("go2.0.1"));
    }
}
