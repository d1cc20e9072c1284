//! The cross-record rule library.
//!
//! Every rule is a pure function over already-queried records: group
//! rules take one `(issuer, period)` slice, pair rules take one
//! consecutive-period pair for the same issuer/recipient. Rules are
//! registered in the flat [`GROUP_RULES`] and [`PAIR_RULES`] tables that
//! the runner iterates; nothing dispatches through trait objects.
//!
//! Missing data is the expected common case, never an error: a rule
//! whose inputs are absent returns an empty list or a trivially-passing
//! result, as documented per rule.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use time::OffsetDateTime;

use crate::{K1Record, RuleCategory, Severity, ValidationResult};

/// Threshold for cent-level monetary equality. Never compare money with
/// exact float equality.
pub const MONEY_EPSILON: f64 = 0.01;

/// Relative deviation tolerated between an income allocation and the
/// recipient's share percentage.
pub const INCOME_PROPORTIONALITY_TOLERANCE: f64 = 0.10;

/// Absolute deviation (in share-fraction points) tolerated between a
/// capital-account share and the recipient's share percentage.
pub const CAPITAL_SHARE_TOLERANCE: f64 = 0.15;

/// Acceptance threshold for bigram-Jaccard name similarity.
pub const NAME_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Distributions beyond this multiple of pooled income are flagged.
pub const DISTRIBUTION_INCOME_MULTIPLE: f64 = 3.0;

pub type GroupRuleFn = fn(&[K1Record]) -> Vec<ValidationResult>;
pub type PairRuleFn = fn(&K1Record, &K1Record) -> Vec<ValidationResult>;

/// A rule over one `(issuer, period)` group.
pub struct GroupRule {
    pub id: &'static str,
    pub category: RuleCategory,
    pub severity: Severity,
    /// Minimum records for the rule to be meaningful; the runner skips
    /// the rule (no result at all) below this, so the threshold is
    /// explicit per rule rather than inferred.
    pub min_records: usize,
    /// Whether the rule consumes superseded rows for its keys in
    /// addition to the live ones.
    pub includes_history: bool,
    pub run: GroupRuleFn,
}

/// A rule over one consecutive-period pair for the same
/// issuer/recipient.
pub struct PairRule {
    pub id: &'static str,
    pub category: RuleCategory,
    pub severity: Severity,
    pub run: PairRuleFn,
}

pub const GROUP_RULES: &[GroupRule] = &[
    GroupRule {
        id: "A1_SHARE_SUM",
        category: RuleCategory::CrossSectional,
        severity: Severity::Critical,
        min_records: 2,
        includes_history: false,
        run: check_share_sum,
    },
    GroupRule {
        id: "A2_SHARE_SUM_INCOMPLETE",
        category: RuleCategory::CrossSectional,
        severity: Severity::Advisory,
        min_records: 1,
        includes_history: false,
        run: check_share_sum_incomplete,
    },
    GroupRule {
        id: "A3_INCOME_PROPORTIONALITY",
        category: RuleCategory::CrossSectional,
        severity: Severity::Warning,
        min_records: 2,
        includes_history: false,
        run: check_income_proportionality,
    },
    GroupRule {
        id: "A4_CAPITAL_CONSISTENCY",
        category: RuleCategory::CrossSectional,
        severity: Severity::Warning,
        min_records: 2,
        includes_history: false,
        run: check_capital_consistency,
    },
    GroupRule {
        id: "A5_ISSUER_IDENTITY",
        category: RuleCategory::CrossSectional,
        severity: Severity::Warning,
        min_records: 2,
        includes_history: false,
        run: check_issuer_identity,
    },
    GroupRule {
        id: "C1_EXACT_DUPLICATE",
        category: RuleCategory::Amendment,
        severity: Severity::Critical,
        min_records: 2,
        includes_history: true,
        run: check_exact_duplicate,
    },
    GroupRule {
        id: "C2_AMENDED_RECORD",
        category: RuleCategory::Amendment,
        severity: Severity::Warning,
        min_records: 2,
        includes_history: true,
        run: check_amended_record,
    },
    GroupRule {
        id: "D1_DISTRIBUTION_RATIO",
        category: RuleCategory::Reasonableness,
        severity: Severity::Warning,
        min_records: 2,
        includes_history: false,
        run: check_distribution_ratio,
    },
    GroupRule {
        id: "D4_SELF_EMPLOYMENT_CONSISTENCY",
        category: RuleCategory::Reasonableness,
        severity: Severity::Warning,
        min_records: 2,
        includes_history: false,
        run: check_self_employment_consistency,
    },
];

pub const PAIR_RULES: &[PairRule] = &[
    PairRule {
        id: "B1_CAPITAL_CONTINUITY",
        category: RuleCategory::Continuity,
        severity: Severity::Critical,
        run: check_capital_continuity,
    },
    PairRule {
        id: "B3_ISSUER_IDENTITY_MULTIPERIOD",
        category: RuleCategory::Continuity,
        severity: Severity::Warning,
        run: check_issuer_name_continuity,
    },
    PairRule {
        id: "B4_ROLE_CONTINUITY",
        category: RuleCategory::Continuity,
        severity: Severity::Warning,
        run: check_role_continuity,
    },
];

// -- Shared helpers ---------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn result(
    rule_id: &str,
    category: RuleCategory,
    severity: Severity,
    passed: bool,
    message: String,
    issuer_id: &str,
    period: &str,
    recipient_id: Option<&str>,
) -> ValidationResult {
    ValidationResult {
        rule_id: rule_id.to_string(),
        category,
        severity,
        passed,
        message,
        issuer_id: issuer_id.to_string(),
        period: period.to_string(),
        recipient_id: recipient_id.map(ToString::to_string),
        validated_at: OffsetDateTime::now_utc(),
        triggering_run_id: None,
    }
}

/// Mask a recipient identifier for report messages; only the leading
/// digits survive.
fn mask_id(recipient_id: &str) -> String {
    let prefix: String = recipient_id.chars().take(4).collect();
    format!("{prefix}***")
}

/// Relative deviation when the expectation is non-zero, absolute
/// deviation otherwise.
fn deviation_from(actual: f64, expected: f64) -> f64 {
    if expected.abs() > f64::EPSILON {
        ((actual - expected) / expected).abs()
    } else {
        (actual - expected).abs()
    }
}

fn bigrams(value: &str) -> BTreeSet<String> {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() < 2 {
        return std::iter::once(value.to_string()).collect();
    }
    chars.windows(2).map(|pair| pair.iter().collect::<String>()).collect()
}

/// Bigram-set Jaccard similarity in `[0.0, 1.0]`, case-insensitive.
#[must_use]
pub fn bigram_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    if a_lower == b_lower {
        return 1.0;
    }

    let a_bigrams = bigrams(&a_lower);
    let b_bigrams = bigrams(&b_lower);
    let intersection = a_bigrams.intersection(&b_bigrams).count();
    let union = a_bigrams.union(&b_bigrams).count();
    if union == 0 {
        return 0.0;
    }
    f64::from(u32::try_from(intersection).unwrap_or(u32::MAX))
        / f64::from(u32::try_from(union).unwrap_or(u32::MAX))
}

/// Whether a free-text role marks a general partner / member-manager.
#[must_use]
pub fn is_general_role(role: &str) -> bool {
    let role = role.to_lowercase();
    role.contains("general") || role.contains("member-manager")
}

/// Whether a free-text role marks a limited partner / other LLC member.
#[must_use]
pub fn is_limited_role(role: &str) -> bool {
    let role = role.to_lowercase();
    role.contains("limited") || role.contains("other llc")
}

fn group_by_recipient(records: &[K1Record]) -> BTreeMap<&str, Vec<&K1Record>> {
    let mut by_recipient: BTreeMap<&str, Vec<&K1Record>> = BTreeMap::new();
    for record in records {
        by_recipient.entry(record.recipient_id.as_str()).or_default().push(record);
    }
    by_recipient
}

fn amounts_equal(lhs: Option<f64>, rhs: Option<f64>) -> bool {
    match (lhs, rhs) {
        (None, None) => true,
        (Some(a), Some(b)) => (a - b).abs() < MONEY_EPSILON,
        _ => false,
    }
}

// -- Category A: cross-sectional --------------------------------------------

/// A1: share percentages across the group must not sum above 100%.
/// Returns nothing when no record carries a percentage.
fn check_share_sum(records: &[K1Record]) -> Vec<ValidationResult> {
    let Some(first) = records.first() else {
        return Vec::new();
    };
    let percentages: Vec<f64> = records.iter().filter_map(|r| r.share_percentage).collect();
    if percentages.is_empty() {
        return Vec::new();
    }

    let total: f64 = percentages.iter().sum();
    if total > 100.0 {
        let listed =
            percentages.iter().map(|p| format!("{p:.2}%")).collect::<Vec<_>>().join(", ");
        return vec![result(
            "A1_SHARE_SUM",
            RuleCategory::CrossSectional,
            Severity::Critical,
            false,
            format!(
                "Recipient share percentages sum to {total:.2}%, exceeding 100%. \
                 Recipients: {}, percentages: [{listed}]",
                percentages.len()
            ),
            &first.issuer_id,
            &first.period,
            None,
        )];
    }

    vec![result(
        "A1_SHARE_SUM",
        RuleCategory::CrossSectional,
        Severity::Critical,
        true,
        format!(
            "Recipient share percentages sum to {total:.2}% ({} recipients)",
            percentages.len()
        ),
        &first.issuer_id,
        &first.period,
        None,
    )]
}

/// A2: share percentages below 100% suggest not every recipient's
/// document has arrived yet. Advisory, and the only rule that runs for a
/// single-record group.
fn check_share_sum_incomplete(records: &[K1Record]) -> Vec<ValidationResult> {
    let Some(first) = records.first() else {
        return Vec::new();
    };
    let percentages: Vec<f64> = records.iter().filter_map(|r| r.share_percentage).collect();
    if percentages.is_empty() {
        return Vec::new();
    }

    let total: f64 = percentages.iter().sum();
    if total < 100.0 {
        let missing = 100.0 - total;
        return vec![result(
            "A2_SHARE_SUM_INCOMPLETE",
            RuleCategory::CrossSectional,
            Severity::Advisory,
            false,
            format!(
                "Recipient share percentages sum to {total:.2}% (< 100%). \
                 {missing:.2}% of recipients may not yet be ingested."
            ),
            &first.issuer_id,
            &first.period,
            None,
        )];
    }

    vec![result(
        "A2_SHARE_SUM_INCOMPLETE",
        RuleCategory::CrossSectional,
        Severity::Advisory,
        true,
        format!("Recipient share percentages sum to {total:.2}%"),
        &first.issuer_id,
        &first.period,
        None,
    )]
}

/// A3: each recipient's slice of every pooled income field should track
/// their share percentage within 10% relative deviation. Skips fields
/// with fewer than two reported values or a zero pool.
fn check_income_proportionality(records: &[K1Record]) -> Vec<ValidationResult> {
    let Some(first) = records.first() else {
        return Vec::new();
    };
    let issuer_id = first.issuer_id.clone();
    let period = first.period.clone();

    let valid: Vec<&K1Record> = records
        .iter()
        .filter(|r| r.share_percentage.is_some_and(|pct| pct > 0.0))
        .collect();
    if valid.len() < 2 {
        return Vec::new();
    }

    let total_pct: f64 = valid.iter().filter_map(|r| r.share_percentage).sum();
    let mut results = Vec::new();

    for field_index in 0..first.income_fields().len() {
        let values: Vec<(&K1Record, &'static str, f64)> = valid
            .iter()
            .filter_map(|record| {
                let (name, value) = record.income_fields()[field_index];
                value.map(|v| (*record, name, v))
            })
            .collect();
        if values.len() < 2 {
            continue;
        }

        let field_total: f64 = values.iter().map(|(_, _, v)| v).sum();
        if field_total.abs() < f64::EPSILON {
            continue;
        }

        for (record, field_name, value) in values {
            let Some(pct) = record.share_percentage else {
                continue;
            };
            let expected_share = pct / total_pct;
            let actual_share = value / field_total;
            if expected_share <= 0.0 {
                continue;
            }
            let deviation = deviation_from(actual_share, expected_share);
            if deviation > INCOME_PROPORTIONALITY_TOLERANCE {
                results.push(result(
                    "A3_INCOME_PROPORTIONALITY",
                    RuleCategory::CrossSectional,
                    Severity::Warning,
                    false,
                    format!(
                        "Recipient {}'s {field_name} allocation deviates {:.1}% from the \
                         expected pro-rata share (expected {:.1}%, actual {:.1}%)",
                        mask_id(&record.recipient_id),
                        deviation * 100.0,
                        expected_share * 100.0,
                        actual_share * 100.0
                    ),
                    &issuer_id,
                    &period,
                    Some(&record.recipient_id),
                ));
            }
        }
    }

    if results.is_empty() {
        results.push(result(
            "A3_INCOME_PROPORTIONALITY",
            RuleCategory::CrossSectional,
            Severity::Warning,
            true,
            "Income allocations are proportional to share percentages".to_string(),
            &issuer_id,
            &period,
            None,
        ));
    }
    results
}

/// A4: ending capital-account shares should track share percentages
/// within 15 percentage points.
fn check_capital_consistency(records: &[K1Record]) -> Vec<ValidationResult> {
    let Some(first) = records.first() else {
        return Vec::new();
    };
    let issuer_id = first.issuer_id.clone();
    let period = first.period.clone();

    let valid: Vec<&K1Record> = records
        .iter()
        .filter(|r| {
            r.share_percentage.is_some_and(|pct| pct > 0.0) && r.capital_account_ending.is_some()
        })
        .collect();
    if valid.len() < 2 {
        return Vec::new();
    }

    let total_pct: f64 = valid.iter().filter_map(|r| r.share_percentage).sum();
    let total_ending: f64 = valid.iter().filter_map(|r| r.capital_account_ending).sum();
    if total_ending.abs() < f64::EPSILON || total_pct.abs() < f64::EPSILON {
        return Vec::new();
    }

    let mut results = Vec::new();
    for record in valid {
        let (Some(pct), Some(ending)) = (record.share_percentage, record.capital_account_ending)
        else {
            continue;
        };
        let expected_share = pct / total_pct;
        let actual_share = ending / total_ending;
        let deviation = (actual_share - expected_share).abs();
        if deviation > CAPITAL_SHARE_TOLERANCE {
            results.push(result(
                "A4_CAPITAL_CONSISTENCY",
                RuleCategory::CrossSectional,
                Severity::Warning,
                false,
                format!(
                    "Recipient {}'s capital account share ({:.1}%) deviates from their \
                     share percentage ({:.1}%)",
                    mask_id(&record.recipient_id),
                    actual_share * 100.0,
                    expected_share * 100.0
                ),
                &issuer_id,
                &period,
                Some(&record.recipient_id),
            ));
        }
    }

    if results.is_empty() {
        results.push(result(
            "A4_CAPITAL_CONSISTENCY",
            RuleCategory::CrossSectional,
            Severity::Warning,
            true,
            "Capital accounts are proportional to share percentages".to_string(),
            &issuer_id,
            &period,
            None,
        ));
    }
    results
}

/// A5: every record for an issuer should carry the same display name, or
/// at least a close fuzzy match.
fn check_issuer_identity(records: &[K1Record]) -> Vec<ValidationResult> {
    let Some(first) = records.first() else {
        return Vec::new();
    };

    let names: BTreeSet<String> = records
        .iter()
        .filter_map(|r| r.issuer_name.as_deref())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .collect();

    if names.len() <= 1 {
        return vec![result(
            "A5_ISSUER_IDENTITY",
            RuleCategory::CrossSectional,
            Severity::Warning,
            true,
            "Issuer name is consistent across all records".to_string(),
            &first.issuer_id,
            &first.period,
            None,
        )];
    }

    let name_list: Vec<&String> = names.iter().collect();
    let mut mismatches = Vec::new();
    for (index, a) in name_list.iter().enumerate() {
        for b in &name_list[index + 1..] {
            let similarity = bigram_similarity(a, b);
            if similarity < NAME_SIMILARITY_THRESHOLD {
                mismatches.push(format!("'{a}' vs '{b}' ({:.0}% similar)", similarity * 100.0));
            }
        }
    }

    if mismatches.is_empty() {
        return vec![result(
            "A5_ISSUER_IDENTITY",
            RuleCategory::CrossSectional,
            Severity::Warning,
            true,
            format!("Issuer names are consistent (minor variations): {name_list:?}"),
            &first.issuer_id,
            &first.period,
            None,
        )];
    }

    vec![result(
        "A5_ISSUER_IDENTITY",
        RuleCategory::CrossSectional,
        Severity::Warning,
        false,
        format!(
            "Inconsistent issuer names for {}: {}",
            first.issuer_id,
            mismatches.join("; ")
        ),
        &first.issuer_id,
        &first.period,
        None,
    )]
}

// -- Category B: temporal continuity -----------------------------------------

/// B1: prior period's ending capital must equal the current period's
/// beginning capital to the cent. Trivially passes when either side is
/// unreported.
fn check_capital_continuity(prior: &K1Record, current: &K1Record) -> Vec<ValidationResult> {
    let (Some(ending), Some(beginning)) =
        (prior.capital_account_ending, current.capital_account_beginning)
    else {
        return vec![result(
            "B1_CAPITAL_CONTINUITY",
            RuleCategory::Continuity,
            Severity::Critical,
            true,
            format!(
                "Capital account data unavailable for continuity check ({}->{})",
                prior.period, current.period
            ),
            &prior.issuer_id,
            &current.period,
            Some(&prior.recipient_id),
        )];
    };

    if (ending - beginning).abs() < MONEY_EPSILON {
        return vec![result(
            "B1_CAPITAL_CONTINUITY",
            RuleCategory::Continuity,
            Severity::Critical,
            true,
            format!(
                "Capital continuity verified: {} ending (${ending:.2}) = {} beginning \
                 (${beginning:.2})",
                prior.period, current.period
            ),
            &prior.issuer_id,
            &current.period,
            Some(&prior.recipient_id),
        )];
    }

    let difference = (ending - beginning).abs();
    let magnitude = ending.abs().max(beginning.abs()).max(1.0);
    let pct_diff = difference / magnitude * 100.0;

    vec![result(
        "B1_CAPITAL_CONTINUITY",
        RuleCategory::Continuity,
        Severity::Critical,
        false,
        format!(
            "Capital account discontinuity: {} ending (${ending:.2}) != {} beginning \
             (${beginning:.2}). Difference: ${difference:.2} ({pct_diff:.1}%)",
            prior.period, current.period
        ),
        &prior.issuer_id,
        &current.period,
        Some(&prior.recipient_id),
    )]
}

/// B3: the issuer's display name should persist across periods, allowing
/// close fuzzy matches. Returns nothing when either period lacks a name.
fn check_issuer_name_continuity(prior: &K1Record, current: &K1Record) -> Vec<ValidationResult> {
    let name_prior = prior.issuer_name.as_deref().unwrap_or("").trim();
    let name_current = current.issuer_name.as_deref().unwrap_or("").trim();
    if name_prior.is_empty() || name_current.is_empty() {
        return Vec::new();
    }

    if name_prior == name_current {
        return vec![result(
            "B3_ISSUER_IDENTITY_MULTIPERIOD",
            RuleCategory::Continuity,
            Severity::Warning,
            true,
            format!("Issuer name consistent across periods: '{name_current}'"),
            &prior.issuer_id,
            &current.period,
            None,
        )];
    }

    let similarity = bigram_similarity(name_prior, name_current);
    if similarity >= NAME_SIMILARITY_THRESHOLD {
        return vec![result(
            "B3_ISSUER_IDENTITY_MULTIPERIOD",
            RuleCategory::Continuity,
            Severity::Warning,
            true,
            format!(
                "Issuer name minor variation: '{name_prior}' -> '{name_current}' \
                 ({:.0}% similar)",
                similarity * 100.0
            ),
            &prior.issuer_id,
            &current.period,
            None,
        )];
    }

    vec![result(
        "B3_ISSUER_IDENTITY_MULTIPERIOD",
        RuleCategory::Continuity,
        Severity::Warning,
        false,
        format!(
            "Issuer name changed across periods for {}: '{name_prior}' ({}) -> \
             '{name_current}' ({})",
            prior.issuer_id, prior.period, current.period
        ),
        &prior.issuer_id,
        &current.period,
        None,
    )]
}

/// B4: the general/limited classification must not flip between adjacent
/// periods. Returns nothing when either period lacks a role.
fn check_role_continuity(prior: &K1Record, current: &K1Record) -> Vec<ValidationResult> {
    let role_prior = prior.recipient_role.as_deref().unwrap_or("").trim();
    let role_current = current.recipient_role.as_deref().unwrap_or("").trim();
    if role_prior.is_empty() || role_current.is_empty() {
        return Vec::new();
    }

    let prior_general = is_general_role(role_prior);
    let current_general = is_general_role(role_current);
    let prior_limited = is_limited_role(role_prior);
    let current_limited = is_limited_role(role_current);

    if (prior_general && current_limited) || (prior_limited && current_general) {
        let prior_label = if prior_general { "general" } else { "limited" };
        let current_label = if current_general { "general" } else { "limited" };
        return vec![result(
            "B4_ROLE_CONTINUITY",
            RuleCategory::Continuity,
            Severity::Warning,
            false,
            format!(
                "Recipient role changed from {prior_label} ({}) to {current_label} ({}) \
                 for recipient {} at {}",
                prior.period,
                current.period,
                mask_id(&prior.recipient_id),
                prior.issuer_id
            ),
            &prior.issuer_id,
            &current.period,
            Some(&prior.recipient_id),
        )];
    }

    vec![result(
        "B4_ROLE_CONTINUITY",
        RuleCategory::Continuity,
        Severity::Warning,
        true,
        format!("Recipient role consistent across periods ({}->{})", prior.period, current.period),
        &prior.issuer_id,
        &current.period,
        Some(&prior.recipient_id),
    )]
}

// -- Category C: duplicate / amendment detection ------------------------------

/// C1: the same key ingested more than once with byte-identical amount
/// fields. The upsert already merged the rows; this audits the retained
/// history.
fn check_exact_duplicate(records: &[K1Record]) -> Vec<ValidationResult> {
    let Some(first_record) = records.first() else {
        return Vec::new();
    };
    let issuer_id = first_record.issuer_id.clone();
    let period = first_record.period.clone();

    let mut results = Vec::new();
    for (recipient_id, versions) in group_by_recipient(records) {
        if versions.len() < 2 {
            continue;
        }
        let first = versions[0];
        for other in &versions[1..] {
            let all_match = first
                .amount_fields()
                .iter()
                .zip(other.amount_fields().iter())
                .all(|((_, lhs), (_, rhs))| amounts_equal(*lhs, *rhs));
            if all_match {
                results.push(result(
                    "C1_EXACT_DUPLICATE",
                    RuleCategory::Amendment,
                    Severity::Critical,
                    false,
                    format!(
                        "Exact duplicate record detected for recipient {} at {issuer_id}, \
                         period {period}. Run IDs: {} and {}",
                        mask_id(recipient_id),
                        first.source_run_id,
                        other.source_run_id
                    ),
                    &issuer_id,
                    &period,
                    Some(recipient_id),
                ));
            }
        }
    }

    if results.is_empty() {
        results.push(result(
            "C1_EXACT_DUPLICATE",
            RuleCategory::Amendment,
            Severity::Critical,
            true,
            "No exact duplicates detected".to_string(),
            &issuer_id,
            &period,
            None,
        ));
    }
    results
}

/// C2: the same key ingested more than once with differing amount
/// fields, i.e. a possible amended filing. Names the changed fields.
fn check_amended_record(records: &[K1Record]) -> Vec<ValidationResult> {
    let Some(first_record) = records.first() else {
        return Vec::new();
    };
    let issuer_id = first_record.issuer_id.clone();
    let period = first_record.period.clone();

    let mut results = Vec::new();
    for (recipient_id, versions) in group_by_recipient(records) {
        if versions.len() < 2 {
            continue;
        }
        let first = versions[0];
        for other in &versions[1..] {
            let differing: Vec<&'static str> = first
                .amount_fields()
                .iter()
                .zip(other.amount_fields().iter())
                .filter(|((_, lhs), (_, rhs))| !amounts_equal(*lhs, *rhs))
                .map(|((name, _), _)| *name)
                .collect();
            if !differing.is_empty() {
                results.push(result(
                    "C2_AMENDED_RECORD",
                    RuleCategory::Amendment,
                    Severity::Warning,
                    false,
                    format!(
                        "Possible amended record for recipient {} at {issuer_id}, \
                         period {period}. Differing fields: [{}]",
                        mask_id(recipient_id),
                        differing.join(", ")
                    ),
                    &issuer_id,
                    &period,
                    Some(recipient_id),
                ));
            }
        }
    }

    if results.is_empty() {
        results.push(result(
            "C2_AMENDED_RECORD",
            RuleCategory::Amendment,
            Severity::Warning,
            true,
            "No amended records detected".to_string(),
            &issuer_id,
            &period,
            None,
        ));
    }
    results
}

// -- Category D: reasonableness ----------------------------------------------

/// D1: total cash distributions beyond 3x total pooled income usually
/// mean a liquidation or an extraction error.
fn check_distribution_ratio(records: &[K1Record]) -> Vec<ValidationResult> {
    let Some(first) = records.first() else {
        return Vec::new();
    };

    let total_distributions: f64 = records.iter().filter_map(|r| r.distributions).sum();
    let total_income: f64 = records
        .iter()
        .map(|r| r.income_fields().iter().filter_map(|(_, v)| *v).sum::<f64>())
        .sum();

    if total_income > 0.0 && total_distributions > total_income * DISTRIBUTION_INCOME_MULTIPLE {
        return vec![result(
            "D1_DISTRIBUTION_RATIO",
            RuleCategory::Reasonableness,
            Severity::Warning,
            false,
            format!(
                "Total distributions (${total_distributions:.2}) exceed 3x total income \
                 (${total_income:.2}) for issuer {}. May indicate liquidation or data error.",
                first.issuer_id
            ),
            &first.issuer_id,
            &first.period,
            None,
        )];
    }

    vec![result(
        "D1_DISTRIBUTION_RATIO",
        RuleCategory::Reasonableness,
        Severity::Warning,
        true,
        format!(
            "Distribution ratio is reasonable: ${total_distributions:.2} distributions vs \
             ${total_income:.2} income"
        ),
        &first.issuer_id,
        &first.period,
        None,
    )]
}

/// D4: a general partner with positive ordinary income should report
/// self-employment earnings; a limited partner reporting them should
/// have guaranteed payments.
fn check_self_employment_consistency(records: &[K1Record]) -> Vec<ValidationResult> {
    let Some(first) = records.first() else {
        return Vec::new();
    };
    let issuer_id = first.issuer_id.clone();
    let period = first.period.clone();

    let mut results = Vec::new();
    for record in records {
        let role = record.recipient_role.as_deref().unwrap_or("");
        let se = record.self_employment_earnings;
        let guaranteed = record.guaranteed_payments;
        let income = record.ordinary_business_income;

        if is_general_role(role) && income.is_some_and(|v| v > 0.0) && se.is_none() {
            results.push(result(
                "D4_SELF_EMPLOYMENT_CONSISTENCY",
                RuleCategory::Reasonableness,
                Severity::Warning,
                false,
                format!(
                    "General partner {} has ordinary income (${:.2}) but no \
                     self-employment earnings reported",
                    mask_id(&record.recipient_id),
                    income.unwrap_or(0.0)
                ),
                &issuer_id,
                &period,
                Some(&record.recipient_id),
            ));
        }

        if is_limited_role(role)
            && se.is_some_and(|v| v > 0.0)
            && !guaranteed.is_some_and(|v| v.abs() > f64::EPSILON)
        {
            results.push(result(
                "D4_SELF_EMPLOYMENT_CONSISTENCY",
                RuleCategory::Reasonableness,
                Severity::Warning,
                false,
                format!(
                    "Limited partner {} has self-employment earnings (${:.2}) but no \
                     guaranteed payments",
                    mask_id(&record.recipient_id),
                    se.unwrap_or(0.0)
                ),
                &issuer_id,
                &period,
                Some(&record.recipient_id),
            ));
        }
    }

    if results.is_empty() {
        results.push(result(
            "D4_SELF_EMPLOYMENT_CONSISTENCY",
            RuleCategory::Reasonableness,
            Severity::Warning,
            true,
            "Self-employment earnings are consistent with recipient roles".to_string(),
            &issuer_id,
            &period,
            None,
        ));
    }
    results
}
