use std::collections::HashMap;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::audit::AuditEvent;
use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::batch::process_batch;
use super::conflict::{detect, detect_siblings, validate_range};
use super::{Engine, EngineError};

/// Expansion + conflict detection output shared by preview and execute, so
/// a preview always shows exactly the candidate set and conflict list the
/// real run would act on.
struct BulkPlan {
    candidates: Vec<ShiftCandidate>,
    /// Conflict records tagged with the owning candidate index, grouped per
    /// candidate in expansion order.
    conflicts: Vec<(usize, ConflictRecord)>,
}

impl BulkPlan {
    fn records(&self) -> Vec<ConflictRecord> {
        self.conflicts.iter().map(|(_, r)| r.clone()).collect()
    }

    /// First blocking conflict per candidate index.
    fn blocking_by_candidate(&self) -> HashMap<usize, ConflictRecord> {
        let mut map = HashMap::new();
        for (idx, record) in &self.conflicts {
            if record.is_blocking() {
                map.entry(*idx).or_insert_with(|| record.clone());
            }
        }
        map
    }
}

/// Pre-flight gate for the `fail` strategy: any blocking conflict anywhere
/// aborts before a single write is dispatched.
fn conflict_gate(conflicts: &[(usize, ConflictRecord)]) -> Result<(), EngineError> {
    let blocking: Vec<ConflictRecord> = conflicts
        .iter()
        .filter(|(_, r)| r.is_blocking())
        .map(|(_, r)| r.clone())
        .collect();
    if blocking.is_empty() {
        Ok(())
    } else {
        Err(EngineError::ConflictDetected(blocking))
    }
}

fn validate_config(config: &BatchConfig) -> Result<(), EngineError> {
    if config.batch_size > MAX_BATCH_SIZE {
        return Err(EngineError::LimitExceeded("batch size too large"));
    }
    if config.max_concurrency > MAX_CONCURRENCY {
        return Err(EngineError::LimitExceeded("concurrency too high"));
    }
    if config.retry_attempts > MAX_RETRY_ATTEMPTS {
        return Err(EngineError::LimitExceeded("too many retry attempts"));
    }
    Ok(())
}

fn validate_tenant(tenant_id: &str) -> Result<(), EngineError> {
    if tenant_id.is_empty() {
        return Err(EngineError::LimitExceeded("empty tenant id"));
    }
    if tenant_id.len() > MAX_TENANT_NAME_LEN {
        return Err(EngineError::LimitExceeded("tenant id too long"));
    }
    Ok(())
}

impl Engine {
    /// Expand a bulk-create request and report what it would do, without
    /// dispatching anything. Produces the same candidate set and conflict
    /// list as [`Engine::bulk_create_shifts`] on the same state.
    pub async fn preview_bulk_shifts(
        &self,
        req: &BulkShiftRequest,
    ) -> Result<BulkPreview, EngineError> {
        let op_id = Ulid::new().to_string();
        self.monitor.start_timer(&op_id);
        let planned = self.plan_bulk(req).await;
        self.monitor.end_timer(&op_id, "preview_bulk_shifts");
        let plan = planned?;
        Ok(BulkPreview {
            total_shifts: plan.candidates.len(),
            conflicts: plan.records(),
            shifts: plan.candidates,
        })
    }

    /// Preview counterpart of [`Engine::duplicate_shifts`].
    pub async fn preview_duplicate_shifts(
        &self,
        req: &DuplicateRequest,
    ) -> Result<BulkPreview, EngineError> {
        let op_id = Ulid::new().to_string();
        self.monitor.start_timer(&op_id);
        let planned = self.plan_duplicate(req).await;
        self.monitor.end_timer(&op_id, "preview_duplicate_shifts");
        let plan = planned?;
        Ok(BulkPreview {
            total_shifts: plan.candidates.len(),
            conflicts: plan.records(),
            shifts: plan.candidates,
        })
    }

    /// Create employees × dates shifts under the request's conflict
    /// strategy.
    pub async fn bulk_create_shifts(
        &self,
        req: &BulkShiftRequest,
        config: &BatchConfig,
    ) -> Result<BulkOutcome, EngineError> {
        validate_config(config)?;
        let plan = self.plan_bulk(req).await?;
        self.execute_plan(&req.tenant_id, "bulk_create_shifts", plan, req.strategy, config)
            .await
    }

    /// Copy a source shift onto target dates × target employees under the
    /// request's conflict strategy. The candidate identical to the source is
    /// never produced.
    pub async fn duplicate_shifts(
        &self,
        req: &DuplicateRequest,
        config: &BatchConfig,
    ) -> Result<BulkOutcome, EngineError> {
        validate_config(config)?;
        let plan = self.plan_duplicate(req).await?;
        self.execute_plan(&req.tenant_id, "duplicate_shifts", plan, req.strategy, config)
            .await
    }

    async fn plan_bulk(&self, req: &BulkShiftRequest) -> Result<BulkPlan, EngineError> {
        validate_tenant(&req.tenant_id)?;
        if req.employees.len().saturating_mul(req.dates.len()) > MAX_CANDIDATES_PER_REQUEST {
            return Err(EngineError::LimitExceeded("too many candidates in request"));
        }
        let (range, template_id) = self.resolve_time(&req.tenant_id, &req.time).await?;

        let mut candidates = Vec::with_capacity(req.employees.len() * req.dates.len());
        for &employee_id in &req.employees {
            for &date in &req.dates {
                candidates.push(ShiftCandidate {
                    employee_id,
                    date,
                    range,
                    notes: req.notes.clone(),
                    template_id,
                });
            }
        }
        self.plan_candidates(candidates).await
    }

    async fn plan_duplicate(&self, req: &DuplicateRequest) -> Result<BulkPlan, EngineError> {
        validate_tenant(&req.tenant_id)?;
        let source = &req.source;
        let employees: Vec<Ulid> = if req.target_employees.is_empty() {
            vec![source.employee_id]
        } else {
            req.target_employees.clone()
        };
        if employees.len().saturating_mul(req.target_dates.len()) > MAX_CANDIDATES_PER_REQUEST {
            return Err(EngineError::LimitExceeded("too many candidates in request"));
        }

        let mut candidates = Vec::new();
        for &employee_id in &employees {
            for &date in &req.target_dates {
                // No self-duplication.
                if employee_id == source.employee_id && date == source.date {
                    continue;
                }
                candidates.push(ShiftCandidate {
                    employee_id,
                    date,
                    range: source.range,
                    notes: source.notes.clone(),
                    template_id: source.template_id,
                });
            }
        }
        self.plan_candidates(candidates).await
    }

    /// Validate every candidate, fetch existing shifts once per
    /// (employee, date) group, and collect conflicts against both persisted
    /// shifts and same-expansion siblings.
    async fn plan_candidates(
        &self,
        candidates: Vec<ShiftCandidate>,
    ) -> Result<BulkPlan, EngineError> {
        if candidates.len() > MAX_CANDIDATES_PER_REQUEST {
            return Err(EngineError::LimitExceeded("too many candidates in request"));
        }
        for c in &candidates {
            validate_range(&c.range)?;
            if let Some(ref notes) = c.notes
                && notes.len() > MAX_NOTES_LEN
            {
                return Err(EngineError::LimitExceeded("notes too long"));
            }
        }

        let mut existing: HashMap<(Ulid, NaiveDate), Vec<ExistingShift>> = HashMap::new();
        for c in &candidates {
            let key = (c.employee_id, c.date);
            if !existing.contains_key(&key) {
                let shifts = self.lookup.existing_shifts(c.employee_id, c.date).await;
                existing.insert(key, shifts);
            }
        }

        let mut siblings: HashMap<usize, Vec<ConflictRecord>> = HashMap::new();
        for (idx, record) in detect_siblings(&candidates) {
            siblings.entry(idx).or_default().push(record);
        }

        let mut conflicts = Vec::new();
        for (idx, c) in candidates.iter().enumerate() {
            for record in detect(&existing[&(c.employee_id, c.date)], c) {
                conflicts.push((idx, record));
            }
            if let Some(records) = siblings.remove(&idx) {
                for record in records {
                    conflicts.push((idx, record));
                }
            }
        }

        Ok(BulkPlan { candidates, conflicts })
    }

    async fn resolve_time(
        &self,
        tenant_id: &str,
        time: &ShiftTime,
    ) -> Result<(TimeRange, Option<Ulid>), EngineError> {
        match time {
            ShiftTime::Explicit(range) => {
                validate_range(range)?;
                Ok((*range, None))
            }
            ShiftTime::Template { template_id, query } => {
                let templates = self.resolve_templates(tenant_id, query).await;
                let template = templates
                    .iter()
                    .find(|t| t.id == *template_id)
                    .ok_or(EngineError::TemplateNotFound(*template_id))?;
                validate_range(&template.range)?;
                Ok((template.range, Some(template.id)))
            }
        }
    }

    async fn execute_plan(
        &self,
        tenant_id: &str,
        op_name: &str,
        plan: BulkPlan,
        strategy: ConflictStrategy,
        config: &BatchConfig,
    ) -> Result<BulkOutcome, EngineError> {
        let conflicts = plan.records();
        let total = plan.candidates.len();

        if strategy == ConflictStrategy::Fail
            && let Err(err) = conflict_gate(&plan.conflicts)
        {
            tracing::info!(tenant_id, op = op_name, %err, "bulk operation aborted pre-dispatch");
            let outcome = BulkOutcome {
                status: OutcomeStatus::Aborted,
                created: Vec::new(),
                failed: Vec::new(),
                skipped: Vec::new(),
                conflicts,
            };
            self.emit_audit(tenant_id, op_name, total, &outcome);
            return Ok(outcome);
        }

        let blocking = plan.blocking_by_candidate();
        let mut mutations = Vec::with_capacity(total);
        let mut skipped = Vec::new();
        for (idx, candidate) in plan.candidates.iter().enumerate() {
            match strategy {
                ConflictStrategy::Skip => {
                    if let Some(conflict) = blocking.get(&idx) {
                        skipped.push(SkippedShift {
                            candidate: candidate.clone(),
                            conflict: conflict.clone(),
                        });
                        continue;
                    }
                    mutations.push(ShiftMutation::Create(candidate.clone()));
                }
                ConflictStrategy::Overwrite => {
                    // Conflicting persisted shifts ride along for the
                    // executor to displace; sibling conflicts don't block.
                    let displaced: Vec<Ulid> = plan
                        .conflicts
                        .iter()
                        .filter(|(i, r)| *i == idx && r.is_blocking())
                        .filter_map(|(_, r)| match r.with {
                            ConflictSource::Existing(id) => Some(id),
                            ConflictSource::Sibling(_) => None,
                        })
                        .collect();
                    if displaced.is_empty() {
                        mutations.push(ShiftMutation::Create(candidate.clone()));
                    } else {
                        mutations.push(ShiftMutation::Replace {
                            candidate: candidate.clone(),
                            displaced,
                        });
                    }
                }
                ConflictStrategy::Fail => {
                    mutations.push(ShiftMutation::Create(candidate.clone()));
                }
            }
        }
        if !skipped.is_empty() {
            metrics::counter!(observability::ITEMS_SKIPPED_TOTAL).increment(skipped.len() as u64);
        }

        let executor = self.executor.clone();
        let result = process_batch(
            mutations,
            move |mutation: ShiftMutation| {
                let executor = executor.clone();
                async move { executor.execute(&mutation).await }
            },
            config,
            &self.monitor,
            op_name,
        )
        .await;

        let created: Vec<PersistedShift> =
            result.successful.into_iter().map(|(_, shift)| shift).collect();
        let status = if result.failed.is_empty() && skipped.is_empty() {
            OutcomeStatus::Completed
        } else {
            OutcomeStatus::Partial
        };
        let outcome = BulkOutcome {
            status,
            created,
            failed: result.failed,
            skipped,
            conflicts,
        };
        self.emit_audit(tenant_id, op_name, total, &outcome);
        Ok(outcome)
    }

    /// Fire-and-forget: the audit collaborator can never block or fail a
    /// batch result.
    fn emit_audit(&self, tenant_id: &str, op_name: &str, total: usize, outcome: &BulkOutcome) {
        self.audit.send(AuditEvent {
            tenant_id: tenant_id.to_string(),
            operation: op_name.to_string(),
            status: outcome.status,
            total,
            succeeded: outcome.created.len(),
            failed: outcome.failed.len(),
            skipped: outcome.skipped.len(),
        });
    }
}
