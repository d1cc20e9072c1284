//! Orchestration of a validation run: apply every registered rule to
//! every loaded scope and consecutive-period pair, then assemble the
//! report document.
//!
//! The runner owns no storage. Callers query scopes and pairs out of the
//! store and hand them in; the runner is deterministic over its inputs
//! except for the stamped timestamps and report id.

use time::OffsetDateTime;

use crate::rules::{GROUP_RULES, PAIR_RULES};
use crate::{
    K1Record, ReportId, RunSummary, ScopeDescriptor, ValidationReport, ValidationResult,
};

/// Everything loaded for one `(issuer, period)` group: the live records
/// plus any superseded prior versions retained for amendment auditing.
#[derive(Debug, Clone, Default)]
pub struct ScopeRecords {
    pub issuer_id: String,
    pub period: String,
    pub records: Vec<K1Record>,
    pub superseded: Vec<K1Record>,
}

impl ScopeRecords {
    #[must_use]
    pub fn descriptor(&self) -> ScopeDescriptor {
        ScopeDescriptor {
            issuer_id: self.issuer_id.clone(),
            period: self.period.clone(),
            recipient_count: self.records.len(),
            issuer_name: self
                .records
                .iter()
                .find_map(|record| record.issuer_name.clone()),
        }
    }
}

/// Apply every group rule to one scope. Rules below their record-count
/// threshold are skipped entirely, so a single-document scope yields only
/// the rules that are meaningful for it.
#[must_use]
pub fn run_scope_rules(scope: &ScopeRecords) -> Vec<ValidationResult> {
    let mut combined: Vec<K1Record> = Vec::new();
    let mut results = Vec::new();

    for rule in GROUP_RULES {
        let records: &[K1Record] = if rule.includes_history {
            if combined.is_empty() && !scope.superseded.is_empty() {
                combined.reserve(scope.records.len() + scope.superseded.len());
                combined.extend(scope.records.iter().cloned());
                combined.extend(scope.superseded.iter().cloned());
            }
            if combined.is_empty() { &scope.records } else { &combined }
        } else {
            &scope.records
        };

        if records.len() < rule.min_records {
            continue;
        }
        results.extend((rule.run)(records));
    }
    results
}

/// Apply every pair rule to one consecutive-period pair (`prior` first).
#[must_use]
pub fn run_pair_rules(prior: &K1Record, current: &K1Record) -> Vec<ValidationResult> {
    let mut results = Vec::new();
    for rule in PAIR_RULES {
        results.extend((rule.run)(prior, current));
    }
    results
}

/// Run the full rule library and assemble the report.
///
/// `triggering_run_id`, when present, is stamped onto every result so a
/// report can be traced back to the ingestion run that prompted it.
#[must_use]
pub fn run_validation(
    scopes: &[ScopeRecords],
    pairs: &[(K1Record, K1Record)],
    triggering_run_id: Option<&str>,
) -> ValidationReport {
    let mut results = Vec::new();
    let mut scopes_validated = Vec::with_capacity(scopes.len());

    for scope in scopes {
        scopes_validated.push(scope.descriptor());
        results.extend(run_scope_rules(scope));
    }
    for (prior, current) in pairs {
        results.extend(run_pair_rules(prior, current));
    }

    if let Some(run_id) = triggering_run_id {
        for result in &mut results {
            result.triggering_run_id = Some(run_id.to_string());
        }
    }

    ValidationReport {
        report_id: ReportId::new(),
        generated_at: OffsetDateTime::now_utc(),
        summary: RunSummary::from_results(&results),
        scopes_validated,
        continuity_pairs_checked: pairs.len(),
        results,
    }
}
