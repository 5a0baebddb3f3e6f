use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::bounded;
use gmon::domain::{EventKind, Frame, GoroutineId, LifecycleEvent, Stack};
use gmon::metrics::Metrics;
use gmon::monitoring::{Reporter, EVENT_QUEUE_CAPACITY};

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

fn event(id: i64, kind: EventKind, names: &[&str]) -> LifecycleEvent {
    LifecycleEvent { id: GoroutineId(id), kind, observed_at: Instant::now(), stack: stack(names) }
}

/// First sample value of a metric family in the encoded exposition text
fn sample_value(body: &str, family: &str) -> Option<f64> {
    body.lines()
        .find(|line| line.starts_with(&format!("{family}{{")))
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}

#[test]
fn test_create_exit_roundtrip_through_reporter() {
    let (tx, rx) = bounded(EVENT_QUEUE_CAPACITY);
    let metrics = Arc::new(Metrics::new().unwrap());
    let reporter = Reporter::new(rx, metrics.clone(), None);
    let handle = std::thread::spawn(move || reporter.run());

    let site = ["main.worker", "main.main"];
    tx.send(event(1, EventKind::Created, &site)).unwrap();
    tx.send(event(2, EventKind::Created, &site)).unwrap();
    tx.send(event(1, EventKind::Exited, &["runtime.goexit1"])).unwrap();
    // No prior creation: must not move any counter
    tx.send(event(999, EventKind::Exited, &["runtime.goexit1"])).unwrap();

    // Closing the channel stops the reporter after it drained everything
    drop(tx);
    handle.join().unwrap();

    let body = metrics.encode().unwrap();
    assert_eq!(sample_value(&body, "gmon_goroutine_creation"), Some(2.0));
    assert_eq!(sample_value(&body, "gmon_goroutine_exit"), Some(1.0));
    // At least the exit observation; the 500ms ticker may add more
    assert!(sample_value(&body, "gmon_goroutine_uptime_count").unwrap() >= 1.0);

    // Exit samples carry the creation-site labels
    assert!(body.contains("gmon_goroutine_exit{stack_0=\"main.main\",stack_1=\"main.worker\""));
    assert!(!body.contains("stack_0=\"runtime.goexit1\""));
}

#[test]
fn test_repeated_creations_count_once() {
    let (tx, rx) = bounded(EVENT_QUEUE_CAPACITY);
    let metrics = Arc::new(Metrics::new().unwrap());
    let reporter = Reporter::new(rx, metrics.clone(), None);
    let handle = std::thread::spawn(move || reporter.run());

    for _ in 0..5 {
        tx.send(event(7, EventKind::Created, &["main.main"])).unwrap();
    }
    drop(tx);
    handle.join().unwrap();

    let body = metrics.encode().unwrap();
    assert_eq!(sample_value(&body, "gmon_goroutine_creation"), Some(1.0));
}
