//! Prometheus metric families describing goroutine births, deaths and uptime
//!
//! Every sample carries five stack labels filled outermost-first from the
//! creation-site stack; positions past the stack depth hold the literal
//! `"none"`. The registry is owned here and served by the HTTP endpoint in
//! [`crate::server`].

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::domain::Stack;

const NAMESPACE: &str = "gmon";
const STACK_LABEL_KEYS: [&str; 5] = ["stack_0", "stack_1", "stack_2", "stack_3", "stack_4"]; // 0 is the top
const NONE_LABEL: &str = "none";
const UPTIME_BUCKETS: [f64; 8] = [1.0, 3.0, 5.0, 10.0, 30.0, 60.0, 120.0, 180.0];

/// The GC write-barrier helpers (`runtime.gcWriteBarrier`,
/// `runtime.gcWriteBarrier1` ...) show up as the outermost creation frame
/// and carry no caller context worth labeling.
const WRITE_BARRIER_PREFIX: &str = "runtime.gcWriteBarrier";

/// Everything the pipeline can ask the recorder to count
pub enum MetricsEvent<'a> {
    CreateObserved { stack: &'a Stack },
    ExitObserved { stack: &'a Stack },
    UptimeSample { stack: &'a Stack, seconds: f64 },
}

pub struct Metrics {
    registry: Registry,
    creation: IntCounterVec,
    exit: IntCounterVec,
    uptime: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let creation = IntCounterVec::new(
            Opts::new("goroutine_creation", "The number of goroutines that have been created")
                .namespace(NAMESPACE),
            &STACK_LABEL_KEYS,
        )?;
        registry.register(Box::new(creation.clone()))?;

        let exit = IntCounterVec::new(
            Opts::new("goroutine_exit", "The number of goroutines that have been exited")
                .namespace(NAMESPACE),
            &STACK_LABEL_KEYS,
        )?;
        registry.register(Box::new(exit.clone()))?;

        let uptime = HistogramVec::new(
            HistogramOpts::new("goroutine_uptime", "Uptime of goroutines in seconds")
                .namespace(NAMESPACE)
                .buckets(UPTIME_BUCKETS.to_vec()),
            &STACK_LABEL_KEYS,
        )?;
        registry.register(Box::new(uptime.clone()))?;

        Ok(Self { registry, creation, exit, uptime })
    }

    pub fn record(&self, event: MetricsEvent<'_>) {
        match event {
            MetricsEvent::CreateObserved { stack } => {
                self.creation.with_label_values(&label_refs(&stack_labels(stack))).inc();
            }
            MetricsEvent::ExitObserved { stack } => {
                self.exit.with_label_values(&label_refs(&stack_labels(stack))).inc();
            }
            MetricsEvent::UptimeSample { stack, seconds } => {
                self.uptime.with_label_values(&label_refs(&stack_labels(stack))).observe(seconds);
            }
        }
    }

    /// Render the registry in Prometheus text exposition format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    #[cfg(test)]
    pub(crate) fn creation_count(&self, stack: &Stack) -> u64 {
        self.creation.with_label_values(&label_refs(&stack_labels(stack))).get()
    }

    #[cfg(test)]
    pub(crate) fn exit_count(&self, stack: &Stack) -> u64 {
        self.exit.with_label_values(&label_refs(&stack_labels(stack))).get()
    }

    #[cfg(test)]
    pub(crate) fn uptime_samples(&self, stack: &Stack) -> u64 {
        self.uptime.with_label_values(&label_refs(&stack_labels(stack))).get_sample_count()
    }
}

/// Label values for a creation-site stack: outermost frame first, padded
/// with `"none"`. When the outermost frame is the GC write barrier and the
/// stack is deep enough to have real callers behind it, labeling starts at
/// the next frame instead.
pub fn stack_labels(stack: &Stack) -> [String; 5] {
    let frames = stack.frames();
    let mut names: Vec<String> = frames.iter().rev().map(|frame| frame.label_name()).collect();
    if frames.len() >= 3 && names[0].starts_with(WRITE_BARRIER_PREFIX) {
        names.remove(0);
    }
    std::array::from_fn(|i| names.get(i).cloned().unwrap_or_else(|| NONE_LABEL.to_string()))
}

fn label_refs(labels: &[String; 5]) -> [&str; 5] {
    std::array::from_fn(|i| labels[i].as_str())
}
