//! Stack trace resolution
//!
//! Turns a kernel stack id into a sequence of symbolic frames: fetch the
//! packed instruction pointers from the `STACK_ADDRESSES` map, stop at the
//! first zero or [`MAX_STACK_DEPTH`], and resolve each pc through the symbol
//! table. Also owns the TTL LRU that garbage-collects stale kernel entries.

use std::time::Instant;

use aya::maps::{MapData, StackTraceMap};
use gmon_common::MAX_STACK_DEPTH;
use log::debug;

use super::stack_cache::{StackIdCache, STACK_CACHE_CAPACITY, STACK_CACHE_TTL};
use crate::domain::{MonitorError, Stack, StackId};
use crate::symbolization::SymbolTable;

pub struct StackResolver {
    symbols: SymbolTable,
    stack_traces: StackTraceMap<MapData>,
    cache: StackIdCache,
}

impl StackResolver {
    #[must_use]
    pub fn new(symbols: SymbolTable, stack_traces: StackTraceMap<MapData>) -> Self {
        Self {
            symbols,
            stack_traces,
            cache: StackIdCache::new(STACK_CACHE_CAPACITY, STACK_CACHE_TTL),
        }
    }

    /// Resolve a stack id into symbolic frames, innermost first
    ///
    /// # Errors
    /// Returns an error when the id is invalid or the kernel map has no
    /// entry for it (already evicted, or never captured).
    pub fn resolve(&self, stack_id: StackId) -> Result<Stack, MonitorError> {
        if !stack_id.is_valid() {
            return Err(MonitorError::InvalidStackId(stack_id.0));
        }

        let stack_trace =
            self.stack_traces.get(&stack_id.as_map_key(), 0).map_err(|e| {
                MonitorError::StackLookupFailed { stack_id: stack_id.0, error: e.to_string() }
            })?;

        let mut frames = Vec::new();
        for stack_frame in stack_trace.frames().iter().take(MAX_STACK_DEPTH) {
            if stack_frame.ip == 0 {
                break;
            }
            frames.push(self.symbols.lookup_pc(stack_frame.ip));
        }
        Ok(Stack::new(frames))
    }

    /// Track a recently seen stack id. Ids that fall out of the LRU (by
    /// capacity or TTL) have their kernel map entries deleted one by one;
    /// this map kind does not support batch delete.
    pub fn admit(&mut self, stack_id: StackId) {
        for evicted in self.cache.admit(stack_id.0, Instant::now()) {
            match self.stack_traces.remove(&(evicted as u32)) {
                Ok(()) => debug!("deleted stack_addresses entry stack_id={evicted}"),
                Err(e) => debug!("failed to delete stack_addresses entry stack_id={evicted}: {e}"),
            }
        }
    }
}
