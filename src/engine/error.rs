use ulid::Ulid;

use crate::model::{ConflictRecord, Minutes};

#[derive(Debug)]
pub enum EngineError {
    /// Degenerate or out-of-range time range on input — a caller bug, never
    /// retried and never treated as a conflict.
    InvalidInterval { start: Minutes, end: Minutes },
    TemplateNotFound(Ulid),
    /// Blocking conflicts under the `fail` strategy. Carries the full
    /// conflict list; nothing was written.
    ConflictDetected(Vec<ConflictRecord>),
    LimitExceeded(&'static str),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInterval { start, end } => {
                write!(f, "invalid interval [{start}, {end})")
            }
            EngineError::TemplateNotFound(id) => write!(f, "template not found: {id}"),
            EngineError::ConflictDetected(conflicts) => {
                write!(f, "{} scheduling conflict(s) detected", conflicts.len())
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
