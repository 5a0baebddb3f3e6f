//! Ring buffer reader
//!
//! Polls the `EVENTS` ring buffer, decodes raw records, resolves their stack
//! traces and forwards typed lifecycle events over the bounded channel to
//! the reporter. Decode and stack-lookup failures are logged and skipped;
//! the loop only ends when shutdown is flagged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use aya::maps::{MapData, RingBuf};
use crossbeam_channel::{Sender, TrySendError};
use gmon_common::GoroutineEvent;
use log::{debug, info, warn};

use super::stack_resolver::StackResolver;
use crate::domain::{EventKind, GoroutineId, LifecycleEvent, StackId};

/// Capacity of the reader -> reporter channel
pub const EVENT_QUEUE_CAPACITY: usize = 100;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const SEND_RETRIES: u32 = 3;
const SEND_RETRY_INTERVAL: Duration = Duration::from_millis(10);

pub struct EventReader {
    ring: RingBuf<MapData>,
    resolver: StackResolver,
    events: Sender<LifecycleEvent>,
    shutdown: Arc<AtomicBool>,
}

impl EventReader {
    #[must_use]
    pub fn new(
        ring: RingBuf<MapData>,
        resolver: StackResolver,
        events: Sender<LifecycleEvent>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self { ring, resolver, events, shutdown }
    }

    /// Poll until shutdown. Dropping `self` afterwards closes the channel,
    /// which is what tells the reporter to drain and stop.
    pub fn run(mut self) {
        while !self.shutdown.load(Ordering::Relaxed) {
            let mut drained_any = false;

            while let Some(item) = self.ring.next() {
                drained_any = true;
                let bytes: &[u8] = &item;
                let Some(raw) = decode_event(bytes) else {
                    warn!("received truncated ring buffer record len={}", bytes.len());
                    continue;
                };

                let stack_id = StackId(raw.stack_id);
                let stack = match self.resolver.resolve(stack_id) {
                    Ok(stack) => stack,
                    Err(e) => {
                        warn!(
                            "failed to resolve stack goroutine_id={} stack_id={}: {e}",
                            raw.goroutine_id, raw.stack_id
                        );
                        continue;
                    }
                };

                let event = LifecycleEvent {
                    id: GoroutineId(raw.goroutine_id),
                    kind: if raw.exit != 0 { EventKind::Exited } else { EventKind::Created },
                    observed_at: Instant::now(),
                    stack,
                };
                send_with_retry(&self.events, event);
                self.resolver.admit(stack_id);
            }

            if !drained_any {
                thread::sleep(POLL_INTERVAL);
            }
        }
        debug!("event reader stops");
    }
}

pub(crate) fn decode_event(bytes: &[u8]) -> Option<GoroutineEvent> {
    if bytes.len() < std::mem::size_of::<GoroutineEvent>() {
        return None;
    }
    // SAFETY: the length was checked and the eBPF program writes valid
    // little-endian GoroutineEvent records
    #[allow(unsafe_code)]
    let event = unsafe { std::ptr::read_unaligned(bytes.as_ptr().cast::<GoroutineEvent>()) };
    Some(event)
}

/// Try-send with bounded retries, preferring freshness over queue latency:
/// a full channel after the final retry drops the event with a warning.
pub(crate) fn send_with_retry(tx: &Sender<LifecycleEvent>, event: LifecycleEvent) -> bool {
    let mut event = event;
    for attempt in 1..=SEND_RETRIES {
        match tx.try_send(event) {
            Ok(()) => {
                if attempt > 1 {
                    info!("goroutine event sent successfully after retries retry={attempt}");
                }
                return true;
            }
            Err(TrySendError::Full(returned)) => {
                event = returned;
                if attempt < SEND_RETRIES {
                    thread::sleep(SEND_RETRY_INTERVAL);
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("event channel disconnected");
                return false;
            }
        }
    }
    warn!(
        "goroutine queue is full, dropping event goroutine_id={} exit={} {}",
        event.id,
        matches!(event.kind, EventKind::Exited),
        event.stack.log_fields()
    );
    false
}
