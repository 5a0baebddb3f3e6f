//! Correlates lifecycle events and reports births, deaths and uptime
//!
//! The reporter is the single writer of the in-flight map. Creation events
//! insert a record; exit events remove it and report uptime against the
//! creation-site stack (the exit-site stack is uninformative). A 500 ms
//! ticker feeds uptime observations for everything still in flight and
//! applies the optional expiry threshold. The ticker is multiplexed into
//! the same loop, so the map never needs a lock.
//!
//! Ordering note: within one goroutine id, creation precedes exit in wall
//! time but not necessarily in delivery order. Discarding exits without a
//! stored creation makes out-of-order delivery safe, and a creation for an
//! id already in flight is a no-op (the stored record wins).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, tick, Receiver};
use log::{debug, info};

use crate::domain::{EventKind, GoroutineRecord, LifecycleEvent};
use crate::metrics::{Metrics, MetricsEvent};

pub const REPORT_INTERVAL: Duration = Duration::from_millis(500);

pub struct Reporter {
    events: Receiver<LifecycleEvent>,
    metrics: Arc<Metrics>,
    expiry_threshold: Option<Duration>,
    inflight: HashMap<i64, GoroutineRecord>,
}

impl Reporter {
    #[must_use]
    pub fn new(
        events: Receiver<LifecycleEvent>,
        metrics: Arc<Metrics>,
        expiry_threshold: Option<Duration>,
    ) -> Self {
        Self { events, metrics, expiry_threshold, inflight: HashMap::new() }
    }

    /// Run until the event channel disconnects. Buffered events are drained
    /// before the disconnect is observed, so shutdown loses nothing that
    /// already reached the queue.
    pub fn run(mut self) {
        let events = self.events.clone();
        let ticker = tick(REPORT_INTERVAL);
        loop {
            select! {
                recv(events) -> event => match event {
                    Ok(event) => self.handle_event(event),
                    Err(_) => {
                        debug!("event channel closed, reporter stops");
                        return;
                    }
                },
                recv(ticker) -> _ => self.report_uptime(Instant::now()),
            }
        }
    }

    fn handle_event(&mut self, event: LifecycleEvent) {
        match event.kind {
            EventKind::Created => {
                if self.inflight.contains_key(&event.id.0) {
                    // The stored record wins; never overwrite
                    debug!("duplicate creation event discarded goroutine_id={}", event.id);
                    return;
                }
                info!(
                    "goroutine is created goroutine_id={} {}",
                    event.id,
                    event.stack.log_fields()
                );
                self.metrics.record(MetricsEvent::CreateObserved { stack: &event.stack });
                self.inflight.insert(
                    event.id.0,
                    GoroutineRecord {
                        id: event.id,
                        observed_at: event.observed_at,
                        stack: event.stack,
                    },
                );
            }
            EventKind::Exited => {
                let Some(record) = self.inflight.remove(&event.id.0) else {
                    // No stored creation pair; exits are terminal and never stored
                    debug!(
                        "exit event without a stored creation discarded goroutine_id={}",
                        event.id
                    );
                    return;
                };
                let uptime = record.observed_at.elapsed();
                info!(
                    "goroutine is terminated goroutine_id={} uptime_seconds={:.3} {}",
                    event.id,
                    uptime.as_secs_f64(),
                    record.stack.log_fields()
                );
                self.metrics.record(MetricsEvent::ExitObserved { stack: &record.stack });
                self.metrics.record(MetricsEvent::UptimeSample {
                    stack: &record.stack,
                    seconds: uptime.as_secs_f64(),
                });
            }
        }
    }

    fn report_uptime(&mut self, now: Instant) {
        for record in self.inflight.values() {
            let uptime = now.saturating_duration_since(record.observed_at);
            self.metrics.record(MetricsEvent::UptimeSample {
                stack: &record.stack,
                seconds: uptime.as_secs_f64(),
            });
        }

        let Some(threshold) = self.expiry_threshold else { return };
        let expired: Vec<i64> = self
            .inflight
            .values()
            .filter(|record| now.saturating_duration_since(record.observed_at) > threshold)
            .map(|record| record.id.0)
            .collect();
        for id in expired {
            if let Some(record) = self.inflight.remove(&id) {
                info!(
                    "goroutine is still running, drop it from monitoring goroutine_id={} uptime_seconds={:.3} {}",
                    record.id,
                    now.saturating_duration_since(record.observed_at).as_secs_f64(),
                    record.stack.log_fields()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Frame, GoroutineId, Stack};
    use crossbeam_channel::bounded;

    fn stack(names: &[&str]) -> Stack {
        Stack::new(
            names
                .iter()
                .map(|name| Frame {
                    function: Some((*name).to_string()),
                    file: None,
                    line: None,
                    pc: 0x1000,
                })
                .collect(),
        )
    }

    fn reporter(expiry: Option<Duration>) -> (Reporter, Arc<Metrics>) {
        let (_tx, rx) = bounded(1);
        let metrics = Arc::new(Metrics::new().unwrap());
        (Reporter::new(rx, metrics.clone(), expiry), metrics)
    }

    fn created_at(id: i64, names: &[&str], observed_at: Instant) -> LifecycleEvent {
        LifecycleEvent { id: GoroutineId(id), kind: EventKind::Created, observed_at, stack: stack(names) }
    }

    fn exited(id: i64) -> LifecycleEvent {
        LifecycleEvent {
            id: GoroutineId(id),
            kind: EventKind::Exited,
            observed_at: Instant::now(),
            stack: stack(&["runtime.goexit1"]),
        }
    }

    #[test]
    fn test_duplicate_creation_is_noop() {
        let (mut reporter, metrics) = reporter(None);
        let site = stack(&["main.worker", "main.main"]);

        for _ in 0..3 {
            reporter.handle_event(created_at(7, &["main.worker", "main.main"], Instant::now()));
        }

        assert_eq!(reporter.inflight.len(), 1);
        assert_eq!(metrics.creation_count(&site), 1);
    }

    #[test]
    fn test_exit_without_creation_is_discarded() {
        let (mut reporter, metrics) = reporter(None);

        reporter.handle_event(exited(999));

        assert!(reporter.inflight.is_empty());
        assert_eq!(metrics.exit_count(&stack(&["runtime.goexit1"])), 0);
    }

    #[test]
    fn test_create_then_exit_counts_once_each() {
        let (mut reporter, metrics) = reporter(None);
        let site = stack(&["main.worker", "main.main"]);

        reporter.handle_event(created_at(3, &["main.worker", "main.main"], Instant::now()));
        reporter.handle_event(exited(3));

        assert!(reporter.inflight.is_empty());
        assert_eq!(metrics.creation_count(&site), 1);
        // The exit is labeled with the creation-site stack, not the exit site
        assert_eq!(metrics.exit_count(&site), 1);
        assert_eq!(metrics.uptime_samples(&site), 1);
    }

    #[test]
    fn test_uptime_reporting_observes_inflight() {
        let (mut reporter, metrics) = reporter(None);
        let site = stack(&["main.main"]);

        reporter.handle_event(created_at(1, &["main.main"], Instant::now()));
        reporter.report_uptime(Instant::now());
        reporter.report_uptime(Instant::now());

        assert_eq!(reporter.inflight.len(), 1);
        assert_eq!(metrics.uptime_samples(&site), 2);
    }

    #[test]
    fn test_expiry_removes_long_running_goroutines() {
        let (mut reporter, _metrics) = reporter(Some(Duration::from_millis(100)));
        let now = Instant::now();

        reporter.handle_event(created_at(7, &["main.main"], now - Duration::from_millis(250)));
        reporter.handle_event(created_at(8, &["main.main"], now));
        reporter.report_uptime(now);

        assert!(!reporter.inflight.contains_key(&7));
        assert!(reporter.inflight.contains_key(&8));
    }

    #[test]
    fn test_expiry_disabled_keeps_records() {
        let (mut reporter, _metrics) = reporter(None);
        let now = Instant::now();

        reporter.handle_event(created_at(7, &["main.main"], now - Duration::from_secs(3600)));
        reporter.report_uptime(now);

        assert!(reporter.inflight.contains_key(&7));
    }
}
