use std::collections::HashMap;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::EngineError;

/// Reject degenerate or out-of-range time ranges. `start == end` is not a
/// schedulable shift; a shift ending at midnight uses `end = 0` (overnight
/// form), so both bounds live in `[0, 1440)`.
pub fn validate_range(range: &TimeRange) -> Result<(), EngineError> {
    let out_of_range = range.start < 0
        || range.start >= MINUTES_PER_DAY
        || range.end < 0
        || range.end >= MINUTES_PER_DAY;
    if out_of_range || range.start == range.end {
        return Err(EngineError::InvalidInterval {
            start: range.start,
            end: range.end,
        });
    }
    Ok(())
}

fn classify(a: &TimeRange, b: &TimeRange) -> Option<(ConflictKind, Severity)> {
    if a == b {
        Some((ConflictKind::Duplicate, Severity::Blocking))
    } else if a.overlaps(b) {
        Some((ConflictKind::Overlap, Severity::Blocking))
    } else if a.touches(b) {
        Some((ConflictKind::Adjacent, Severity::Info))
    } else {
        None
    }
}

/// Same-duration range starting where the conflicting one ends, if it still
/// fits within the overnight-extended day.
fn suggest_after(after: &TimeRange, duration: Minutes) -> Option<TimeRange> {
    let start = after.normalized_end();
    if start >= MINUTES_PER_DAY {
        return None;
    }
    let end = start + duration;
    if end > 2 * MINUTES_PER_DAY {
        return None;
    }
    let end = if end >= MINUTES_PER_DAY { end - MINUTES_PER_DAY } else { end };
    Some(TimeRange::new(start, end))
}

/// Compare one candidate against the employee's persisted shifts for its
/// date. Pure, O(existing); all conflicting shifts are reported, in their
/// original sequence.
pub fn detect(existing: &[ExistingShift], candidate: &ShiftCandidate) -> Vec<ConflictRecord> {
    let mut records = Vec::new();
    for shift in existing {
        if shift.employee_id != candidate.employee_id || shift.date != candidate.date {
            continue;
        }
        if let Some((kind, severity)) = classify(&candidate.range, &shift.range) {
            let suggested = match kind {
                ConflictKind::Overlap => {
                    suggest_after(&shift.range, candidate.range.duration_minutes())
                }
                _ => None,
            };
            records.push(ConflictRecord {
                employee_id: candidate.employee_id,
                date: candidate.date,
                kind,
                with: ConflictSource::Existing(shift.id),
                severity,
                suggested,
            });
        }
    }
    records
}

/// Pairwise conflicts among candidates of one expansion that target the same
/// (employee, date). Each conflicting pair yields exactly one record,
/// attributed to the later candidate (first tuple field) and pointing back
/// at the earlier one.
pub fn detect_siblings(candidates: &[ShiftCandidate]) -> Vec<(usize, ConflictRecord)> {
    let mut by_key: HashMap<(Ulid, NaiveDate), Vec<usize>> = HashMap::new();
    for (idx, c) in candidates.iter().enumerate() {
        by_key.entry((c.employee_id, c.date)).or_default().push(idx);
    }

    let mut records = Vec::new();
    for (idx, c) in candidates.iter().enumerate() {
        let group = &by_key[&(c.employee_id, c.date)];
        for &earlier in group.iter().filter(|&&i| i < idx) {
            if let Some((kind, severity)) = classify(&c.range, &candidates[earlier].range) {
                records.push((
                    idx,
                    ConflictRecord {
                        employee_id: c.employee_id,
                        date: c.date,
                        kind,
                        with: ConflictSource::Sibling(earlier),
                        severity,
                        suggested: None,
                    },
                ));
            }
        }
    }
    records
}
