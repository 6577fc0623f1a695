use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minutes from midnight — the only wall-clock type.
pub type Minutes = i32;

pub const MINUTES_PER_DAY: Minutes = 24 * 60;

/// Half-open wall-clock range `[start, end)` at minute resolution.
/// `end < start` means the shift runs past midnight (overnight).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Minutes,
    pub end: Minutes,
}

impl TimeRange {
    pub fn new(start: Minutes, end: Minutes) -> Self {
        Self { start, end }
    }

    pub fn is_overnight(&self) -> bool {
        self.end < self.start
    }

    /// End with overnight wraparound applied: `[start, normalized_end)` is a
    /// plain ordered interval on a single timeline.
    pub fn normalized_end(&self) -> Minutes {
        if self.is_overnight() {
            self.end + MINUTES_PER_DAY
        } else {
            self.end
        }
    }

    pub fn duration_minutes(&self) -> Minutes {
        self.normalized_end() - self.start
    }

    /// Half-open overlap on the normalized timeline. Touching endpoints do
    /// not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.normalized_end() && other.start < self.normalized_end()
    }

    /// True when one range ends exactly where the other starts.
    pub fn touches(&self, other: &TimeRange) -> bool {
        self.normalized_end() == other.start || other.normalized_end() == self.start
    }
}

/// A not-yet-persisted shift produced by expansion. Immutable once built;
/// consumed exactly once by the batch processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftCandidate {
    pub employee_id: Ulid,
    pub date: NaiveDate,
    pub range: TimeRange,
    pub notes: Option<String>,
    pub template_id: Option<Ulid>,
}

/// An already-persisted shift, as returned by the lookup collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingShift {
    pub id: Ulid,
    pub employee_id: Ulid,
    pub date: NaiveDate,
    pub range: TimeRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    Overlap,
    Adjacent,
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks the candidate under `fail`/`skip` strategies.
    Blocking,
    /// Reported but never blocks (adjacency).
    Info,
}

/// What a candidate conflicts with: a persisted shift, or another candidate
/// in the same expansion (by index into the candidate list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSource {
    Existing(Ulid),
    Sibling(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub employee_id: Ulid,
    pub date: NaiveDate,
    pub kind: ConflictKind,
    pub with: ConflictSource,
    pub severity: Severity,
    /// Same-duration range starting after the conflicting shift, when one
    /// still fits in the (overnight-extended) day.
    pub suggested: Option<TimeRange>,
}

impl ConflictRecord {
    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}

/// How detected conflicts affect a bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Any blocking conflict aborts the whole operation before any write.
    Fail,
    /// Blocked candidates are dropped and reported; the rest proceed.
    Skip,
    /// Conflicting existing shifts are displaced by the candidate.
    Overwrite,
}

/// The unit handed to the external mutation executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShiftMutation {
    Create(ShiftCandidate),
    /// Write the candidate after deleting the displaced shifts (overwrite
    /// strategy). Displacement itself is the executor's job.
    Replace {
        candidate: ShiftCandidate,
        displaced: Vec<Ulid>,
    },
}

impl ShiftMutation {
    pub fn candidate(&self) -> &ShiftCandidate {
        match self {
            ShiftMutation::Create(c) => c,
            ShiftMutation::Replace { candidate, .. } => candidate,
        }
    }
}

/// Executor output for a committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedShift {
    pub id: Ulid,
    pub candidate: ShiftCandidate,
}

/// Opaque per-item error from the mutation executor. Retried blindly; the
/// executor's own taxonomy decides what is retryable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError(pub String);

impl std::fmt::Display for ItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ItemError {}

/// Knobs for the batch processor. Zero `batch_size`/`max_concurrency` are
/// clamped to 1 at use; `retry_attempts` counts retries beyond the first try.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_concurrency: 5,
            retry_attempts: 2,
            retry_backoff: Duration::from_millis(25),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem<T> {
    pub item: T,
    pub error: ItemError,
    /// Total tries made, including the first.
    pub attempts: u32,
}

/// Aggregated outcome of one batch run. Every input item lands in exactly
/// one of the two lists.
#[derive(Debug, Clone)]
pub struct BatchResult<T, R> {
    pub successful: Vec<(T, R)>,
    pub failed: Vec<FailedItem<T>>,
}

impl<T, R> BatchResult<T, R> {
    pub fn total(&self) -> usize {
        self.successful.len() + self.failed.len()
    }
}

/// A reusable shift template, owned by the persistence collaborator and
/// cached per (tenant, query shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftTemplate {
    pub id: Ulid,
    pub tenant_id: String,
    pub name: String,
    pub range: TimeRange,
    pub department: Option<String>,
}

/// The query-shape half of a template cache key. Fingerprinted via JSON, so
/// field order here is the canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateQuery {
    pub department: Option<String>,
    pub location: Option<String>,
    pub include_inactive: bool,
}

/// Where a bulk-create request takes its time range from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftTime {
    Explicit(TimeRange),
    Template {
        template_id: Ulid,
        query: TemplateQuery,
    },
}

/// Bulk-create: employees × dates, one time range (explicit or from a
/// template).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkShiftRequest {
    pub tenant_id: String,
    pub employees: Vec<Ulid>,
    pub dates: Vec<NaiveDate>,
    pub time: ShiftTime,
    pub notes: Option<String>,
    pub strategy: ConflictStrategy,
}

/// The shift a duplication request copies from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceShift {
    pub id: Ulid,
    pub employee_id: Ulid,
    pub date: NaiveDate,
    pub range: TimeRange,
    pub notes: Option<String>,
    pub template_id: Option<Ulid>,
}

/// Duplication: source × target dates × target employees. Empty
/// `target_employees` means "same employee as the source".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateRequest {
    pub tenant_id: String,
    pub source: SourceShift,
    pub target_dates: Vec<NaiveDate>,
    pub target_employees: Vec<Ulid>,
    pub strategy: ConflictStrategy,
}

/// What a bulk run would do — the same expansion and conflict list the real
/// run produces, with nothing dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkPreview {
    pub total_shifts: usize,
    pub shifts: Vec<ShiftCandidate>,
    pub conflicts: Vec<ConflictRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedShift {
    pub candidate: ShiftCandidate,
    pub conflict: ConflictRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Every candidate was written.
    Completed,
    /// Some candidates failed or were skipped.
    Partial,
    /// Pre-flight conflict under the `fail` strategy; nothing dispatched.
    Aborted,
}

/// Structured result of an executed bulk/duplication run.
#[derive(Debug, Clone)]
pub struct BulkOutcome {
    pub status: OutcomeStatus,
    pub created: Vec<PersistedShift>,
    pub failed: Vec<FailedItem<ShiftMutation>>,
    pub skipped: Vec<SkippedShift>,
    pub conflicts: Vec<ConflictRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_basics() {
        let r = TimeRange::new(9 * 60, 17 * 60);
        assert_eq!(r.duration_minutes(), 8 * 60);
        assert!(!r.is_overnight());
        assert_eq!(r.normalized_end(), 17 * 60);
    }

    #[test]
    fn range_overlap() {
        let a = TimeRange::new(540, 1020); // 09:00–17:00
        let b = TimeRange::new(900, 1140); // 15:00–19:00
        let c = TimeRange::new(1020, 1260); // 17:00–21:00
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(a.touches(&c));
    }

    #[test]
    fn overnight_normalization() {
        let night = TimeRange::new(22 * 60, 6 * 60); // 22:00–06:00
        assert!(night.is_overnight());
        assert_eq!(night.normalized_end(), 30 * 60);
        assert_eq!(night.duration_minutes(), 8 * 60);
    }

    #[test]
    fn overnight_overlaps_late_evening() {
        let night = TimeRange::new(22 * 60, 6 * 60); // 22:00–06:00
        let evening = TimeRange::new(20 * 60, 23 * 60); // 20:00–23:00
        assert!(night.overlaps(&evening));
        assert!(evening.overlaps(&night)); // symmetric
    }

    #[test]
    fn single_minute_overlap() {
        let a = TimeRange::new(540, 601);
        let b = TimeRange::new(600, 700);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn batch_config_defaults() {
        let cfg = BatchConfig::default();
        assert_eq!(cfg.batch_size, 50);
        assert_eq!(cfg.max_concurrency, 5);
        assert_eq!(cfg.retry_attempts, 2);
    }

    #[test]
    fn mutation_candidate_accessor() {
        let c = ShiftCandidate {
            employee_id: Ulid::new(),
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            range: TimeRange::new(540, 1020),
            notes: None,
            template_id: None,
        };
        let m = ShiftMutation::Replace {
            candidate: c.clone(),
            displaced: vec![Ulid::new()],
        };
        assert_eq!(m.candidate(), &c);
    }

    #[test]
    fn strategy_serialization() {
        assert_eq!(serde_json::to_string(&ConflictStrategy::Fail).unwrap(), "\"fail\"");
        assert_eq!(serde_json::to_string(&ConflictStrategy::Skip).unwrap(), "\"skip\"");
        assert_eq!(
            serde_json::to_string(&ConflictStrategy::Overwrite).unwrap(),
            "\"overwrite\""
        );
    }

    #[test]
    fn candidate_serialization_roundtrip() {
        let c = ShiftCandidate {
            employee_id: Ulid::new(),
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            range: TimeRange::new(540, 1020),
            notes: Some("front desk".into()),
            template_id: None,
        };
        let json = serde_json::to_string(&c).unwrap();
        let decoded: ShiftCandidate = serde_json::from_str(&json).unwrap();
        assert_eq!(c, decoded);
    }
}
