//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent common bugs like passing a stack id where a
//! goroutine id is expected, and make function signatures more expressive.

use std::fmt;
use std::time::Instant;

/// Goroutine id, as assigned monotonically by the target's runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GoroutineId(pub i64);

impl fmt::Display for GoroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub i32);

impl Pid {
    /// A positive PID restricts probes to that process; zero means "all"
    #[must_use]
    pub fn filter(self) -> Option<i32> {
        (self.0 > 0).then_some(self.0)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

/// Stack trace ID from eBPF
///
/// Negative values mean the kernel failed to capture a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackId(pub i32);

impl StackId {
    /// Returns true if this stack ID is valid (non-negative)
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// Convert to u32 for eBPF map lookup (panics if invalid)
    #[must_use]
    pub fn as_map_key(self) -> u32 {
        assert!(self.is_valid(), "Cannot convert invalid StackId to map key");
        self.0 as u32
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resolved stack frame
///
/// Either a symbolic identity (`function` and/or `file`/`line` set) or, when
/// nothing resolved, just the raw program counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub function: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub pc: u64,
}

impl Frame {
    #[must_use]
    pub fn unresolved(pc: u64) -> Self {
        Self { function: None, file: None, line: None, pc }
    }

    /// Name used for metric labels: the function name, or the hex address
    /// when nothing resolved.
    #[must_use]
    pub fn label_name(&self) -> String {
        match &self.function {
            Some(function) => function.clone(),
            None => format!("{:#x}", self.pc),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.function, &self.file) {
            (None, None) => write!(f, "{:#x}", self.pc),
            (None, Some(file)) => write!(f, "{}:{}", file, self.line.unwrap_or(0)),
            (Some(function), None) => write!(f, "{function}"),
            (Some(function), Some(file)) => {
                write!(f, "{function} at {file}:{}", self.line.unwrap_or(0))
            }
        }
    }
}

/// An ordered sequence of frames, innermost-first (index 0 is the deepest
/// callee).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stack(Vec<Frame>);

impl Stack {
    #[must_use]
    pub fn new(frames: Vec<Frame>) -> Self {
        Self(frames)
    }

    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.0
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Render the stack as `stack.0=... stack.1=...` log fields, innermost
    /// first. Values containing whitespace are quoted.
    #[must_use]
    pub fn log_fields(&self) -> String {
        let mut out = String::new();
        for (i, frame) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let rendered = frame.to_string();
            if rendered.contains(char::is_whitespace) {
                out.push_str(&format!("stack.{i}=\"{rendered}\""));
            } else {
                out.push_str(&format!("stack.{i}={rendered}"));
            }
        }
        out
    }
}

impl From<Vec<Frame>> for Stack {
    fn from(frames: Vec<Frame>) -> Self {
        Self(frames)
    }
}

/// Which lifecycle edge an event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Exited,
}

/// A decoded goroutine lifecycle event, stamped on the reader side
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub id: GoroutineId,
    pub kind: EventKind,
    pub observed_at: Instant,
    pub stack: Stack,
}

/// The tracked state of an in-flight goroutine
#[derive(Debug, Clone)]
pub struct GoroutineRecord {
    pub id: GoroutineId,
    pub observed_at: Instant,
    pub stack: Stack,
}
