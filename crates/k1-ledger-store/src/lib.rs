//! Durable snapshot store for K-1 records, plus the JSON report sink.
//!
//! Persistence is one NDJSON snapshot file: a header row carrying a
//! schema version and a SHA-256 digest over the record rows, then the
//! live rows, then any superseded prior versions retained for amendment
//! auditing. Every mutation is load, mutate in memory, serialize the
//! whole snapshot to a sibling temp file, and `fs::rename` over the old
//! one, so readers never observe a torn write. A process-wide mutex
//! serializes writers.
//!
//! A missing or unreadable snapshot loads as empty with a warning;
//! ingestion availability wins over strictness there. Export failures
//! are hard errors.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use k1_ledger_core::{
    K1Record, LedgerError, ReportSink, RunRef, ScopeRecords, ValidationReport,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

const SNAPSHOT_SCHEMA_VERSION: i64 = 1;

static WRITE_LOCK: Mutex<()> = Mutex::new(());

fn acquire_write_lock() -> MutexGuard<'static, ()> {
    // The guarded state lives on disk, not in the mutex, so a poisoned
    // lock carries nothing worth abandoning.
    WRITE_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotHeader {
    schema_version: i64,
    #[serde(with = "time::serde::rfc3339")]
    exported_at: OffsetDateTime,
    live_rows: usize,
    superseded_rows: usize,
    rows_sha256: String,
}

/// One line of the snapshot file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "row", content = "data", rename_all = "snake_case")]
enum SnapshotRow {
    Header(SnapshotHeader),
    Live(K1Record),
    Superseded(K1Record),
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    live: Vec<K1Record>,
    superseded: Vec<K1Record>,
}

impl Snapshot {
    fn find_content_hash(&self, content_hash: &str) -> Option<&K1Record> {
        self.live
            .iter()
            .chain(self.superseded.iter())
            .find(|record| record.source_content_hash == content_hash)
    }
}

/// Outcome of one [`SnapshotStore::upsert`] call.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UpsertOutcome {
    /// Whether the record entered the live set.
    pub stored: bool,
    /// Live record count after the call.
    pub record_count: usize,
    /// Set when the document's content hash was already in the snapshot;
    /// points at the run that first stored it.
    pub duplicate_of: Option<RunRef>,
}

/// File-backed record store keyed by `(issuer_id, recipient_id, period)`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Open a store over the given snapshot path. The file is created on
    /// first write; opening never touches the filesystem.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or replace the record with its key.
    ///
    /// A content hash already present anywhere in the snapshot means the
    /// same document bytes were ingested before; the record is not stored
    /// again and the prior run is reported. Replacing a live row with
    /// different content retains the old row in the superseded section.
    ///
    /// # Errors
    /// Fails when the record is invalid or the snapshot cannot be
    /// rewritten.
    pub fn upsert(&self, record: &K1Record) -> Result<UpsertOutcome> {
        record.validate()?;
        let _guard = acquire_write_lock();
        let mut snapshot = self.load();

        if let Some(existing) = snapshot.find_content_hash(&record.source_content_hash) {
            tracing::info!(
                document = %record.source_document_name,
                prior_run = %existing.source_run_id,
                "duplicate document content, skipping store"
            );
            return Ok(UpsertOutcome {
                stored: false,
                record_count: snapshot.live.len(),
                duplicate_of: Some(RunRef {
                    source_run_id: existing.source_run_id.clone(),
                    source_document_name: existing.source_document_name.clone(),
                    ingested_at: existing.ingested_at,
                }),
            });
        }

        if let Some(position) =
            snapshot.live.iter().position(|existing| existing.key() == record.key())
        {
            let replaced = snapshot.live.remove(position);
            tracing::info!(
                issuer = %record.issuer_id,
                period = %record.period,
                replaced_run = %replaced.source_run_id,
                "replacing live record, prior version retained"
            );
            snapshot.superseded.push(replaced);
        }
        snapshot.live.push(record.clone());

        self.export(&mut snapshot)?;
        Ok(UpsertOutcome {
            stored: true,
            record_count: snapshot.live.len(),
            duplicate_of: None,
        })
    }

    /// All live records for one `(issuer, period)` group.
    #[must_use]
    pub fn query(&self, issuer_id: &str, period: &str) -> Vec<K1Record> {
        self.load()
            .live
            .into_iter()
            .filter(|record| record.issuer_id == issuer_id && record.period == period)
            .collect()
    }

    /// One scope with its live and superseded rows, ready for the rule
    /// runner.
    #[must_use]
    pub fn scope_records(&self, issuer_id: &str, period: &str) -> ScopeRecords {
        let snapshot = self.load();
        let in_scope = |record: &K1Record| {
            record.issuer_id == issuer_id && record.period == period
        };
        ScopeRecords {
            issuer_id: issuer_id.to_string(),
            period: period.to_string(),
            records: snapshot.live.iter().filter(|r| in_scope(r)).cloned().collect(),
            superseded: snapshot.superseded.iter().filter(|r| in_scope(r)).cloned().collect(),
        }
    }

    /// Every `(issuer, period)` scope in the snapshot, in key order.
    #[must_use]
    pub fn all_scope_records(&self) -> Vec<ScopeRecords> {
        let snapshot = self.load();
        let mut scopes: BTreeMap<(String, String), ScopeRecords> = BTreeMap::new();
        for record in &snapshot.live {
            scopes
                .entry((record.issuer_id.clone(), record.period.clone()))
                .or_insert_with(|| ScopeRecords {
                    issuer_id: record.issuer_id.clone(),
                    period: record.period.clone(),
                    records: Vec::new(),
                    superseded: Vec::new(),
                })
                .records
                .push(record.clone());
        }
        for record in &snapshot.superseded {
            if let Some(scope) =
                scopes.get_mut(&(record.issuer_id.clone(), record.period.clone()))
            {
                scope.superseded.push(record.clone());
            }
        }
        scopes.into_values().collect()
    }

    /// All `(prior, current)` live-record pairs where the same
    /// issuer/recipient appears in numerically consecutive periods.
    #[must_use]
    pub fn consecutive_period_pairs(&self) -> Vec<(K1Record, K1Record)> {
        let snapshot = self.load();
        let mut by_identity: BTreeMap<(&str, &str), Vec<(i64, &K1Record)>> = BTreeMap::new();
        for record in &snapshot.live {
            let Ok(year) = record.period.parse::<i64>() else {
                continue;
            };
            by_identity
                .entry((record.issuer_id.as_str(), record.recipient_id.as_str()))
                .or_default()
                .push((year, record));
        }

        let mut pairs = Vec::new();
        for periods in by_identity.values_mut() {
            periods.sort_by_key(|(year, _)| *year);
            for window in periods.windows(2) {
                let [(prior_year, prior), (current_year, current)] = window else {
                    continue;
                };
                if current_year - prior_year == 1 {
                    pairs.push(((*prior).clone(), (*current).clone()));
                }
            }
        }
        pairs
    }

    /// Number of live records in the snapshot.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.load().live.len()
    }

    /// Remove every record (live and superseded) for one scope. Returns
    /// the number of live rows removed.
    ///
    /// # Errors
    /// Fails when the snapshot cannot be rewritten.
    pub fn purge_scope(&self, issuer_id: &str, period: &str) -> Result<usize> {
        let _guard = acquire_write_lock();
        let mut snapshot = self.load();
        let before = snapshot.live.len();
        snapshot
            .live
            .retain(|record| !(record.issuer_id == issuer_id && record.period == period));
        snapshot
            .superseded
            .retain(|record| !(record.issuer_id == issuer_id && record.period == period));
        let removed = before - snapshot.live.len();
        self.export(&mut snapshot)?;
        Ok(removed)
    }

    /// Remove every record in the snapshot. Returns the number of live
    /// rows removed.
    ///
    /// # Errors
    /// Fails when the snapshot cannot be rewritten.
    pub fn purge_all(&self) -> Result<usize> {
        let _guard = acquire_write_lock();
        let snapshot = self.load();
        let removed = snapshot.live.len();
        self.export(&mut Snapshot::default())?;
        Ok(removed)
    }

    fn load(&self) -> Snapshot {
        if !self.path.exists() {
            return Snapshot::default();
        }
        match self.read_snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %format!("{err:#}"),
                    "unreadable snapshot, treating as empty"
                );
                Snapshot::default()
            }
        }
    }

    fn read_snapshot(&self) -> Result<Snapshot> {
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open snapshot {}", self.path.display()))?;
        let reader = BufReader::new(file);

        let mut header: Option<SnapshotHeader> = None;
        let mut snapshot = Snapshot::default();
        let mut hasher = Sha256::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line.with_context(|| {
                format!("failed to read line {} from {}", index + 1, self.path.display())
            })?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let row: SnapshotRow = serde_json::from_str(trimmed).with_context(|| {
                format!("failed to parse snapshot row {} from {}", index + 1, self.path.display())
            })?;
            match row {
                SnapshotRow::Header(parsed) => {
                    if parsed.schema_version != SNAPSHOT_SCHEMA_VERSION {
                        anyhow::bail!(
                            "unsupported snapshot schema version {}",
                            parsed.schema_version
                        );
                    }
                    header = Some(parsed);
                }
                SnapshotRow::Live(record) => {
                    hasher.update(trimmed.as_bytes());
                    hasher.update(b"\n");
                    snapshot.live.push(record);
                }
                SnapshotRow::Superseded(record) => {
                    hasher.update(trimmed.as_bytes());
                    hasher.update(b"\n");
                    snapshot.superseded.push(record);
                }
            }
        }

        let Some(header) = header else {
            anyhow::bail!("snapshot {} has no header row", self.path.display());
        };
        let actual_digest = format!("{:x}", hasher.finalize());
        if actual_digest != header.rows_sha256 {
            tracing::warn!(
                path = %self.path.display(),
                expected = %header.rows_sha256,
                actual = %actual_digest,
                "snapshot row digest mismatch"
            );
        }
        if header.live_rows != snapshot.live.len()
            || header.superseded_rows != snapshot.superseded.len()
        {
            tracing::warn!(
                path = %self.path.display(),
                "snapshot row counts disagree with header"
            );
        }

        Ok(snapshot)
    }

    fn export(&self, snapshot: &mut Snapshot) -> Result<()> {
        snapshot.live.sort_by(|a, b| a.key().cmp(&b.key()));
        snapshot
            .superseded
            .sort_by(|a, b| (a.key(), a.ingested_at).cmp(&(b.key(), b.ingested_at)));

        let mut lines: Vec<String> = Vec::with_capacity(
            snapshot.live.len() + snapshot.superseded.len(),
        );
        let mut hasher = Sha256::new();
        for row in snapshot
            .live
            .iter()
            .map(|record| SnapshotRow::Live(record.clone()))
            .chain(snapshot.superseded.iter().map(|record| SnapshotRow::Superseded(record.clone())))
        {
            let line =
                serde_json::to_string(&row).context("failed to serialize snapshot row")?;
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
            lines.push(line);
        }

        let header = SnapshotRow::Header(SnapshotHeader {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            exported_at: OffsetDateTime::now_utc(),
            live_rows: snapshot.live.len(),
            superseded_rows: snapshot.superseded.len(),
            rows_sha256: format!("{:x}", hasher.finalize()),
        });

        let temp_path = self.path.with_extension("ndjson.tmp");
        let file = File::create(&temp_path)
            .with_context(|| format!("failed to create snapshot file {}", temp_path.display()))?;
        let mut writer = BufWriter::new(file);
        let header_line =
            serde_json::to_string(&header).context("failed to serialize snapshot header")?;
        for line in std::iter::once(&header_line).chain(lines.iter()) {
            writer
                .write_all(line.as_bytes())
                .with_context(|| format!("failed to write snapshot {}", temp_path.display()))?;
            writer
                .write_all(b"\n")
                .with_context(|| format!("failed to write snapshot {}", temp_path.display()))?;
        }
        writer
            .flush()
            .with_context(|| format!("failed to flush snapshot {}", temp_path.display()))?;

        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "failed to move snapshot {} into place at {}",
                temp_path.display(),
                self.path.display()
            )
        })?;
        Ok(())
    }
}

/// Writes each validation report as one pretty-printed JSON document,
/// with the same temp-file-then-rename discipline as the snapshot.
#[derive(Debug, Clone)]
pub struct JsonReportSink {
    path: PathBuf,
}

impl JsonReportSink {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReportSink for JsonReportSink {
    fn write_report(&mut self, report: &ValidationReport) -> Result<(), LedgerError> {
        let body = serde_json::to_vec_pretty(report)
            .map_err(|err| LedgerError::Report(format!("failed to serialize report: {err}")))?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, body).map_err(|err| {
            LedgerError::Report(format!(
                "failed to write report {}: {err}",
                temp_path.display()
            ))
        })?;
        fs::rename(&temp_path, &self.path).map_err(|err| {
            LedgerError::Report(format!(
                "failed to move report into place at {}: {err}",
                self.path.display()
            ))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use time::Duration;

    use super::*;

    fn unique_temp_dir(prefix: &str) -> PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("{prefix}-{now}"));
        fs::create_dir_all(&dir)
            .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
        dir
    }

    fn fixture_time() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(1_700_000_000)
    }

    fn mk_record(recipient_id: &str, period: &str, hash_seed: u8) -> K1Record {
        K1Record {
            issuer_id: "12-3456789".to_string(),
            recipient_id: recipient_id.to_string(),
            period: period.to_string(),
            source_run_id: format!("run_{recipient_id}_{period}_{hash_seed}"),
            source_document_name: format!("k1_{recipient_id}_{period}.pdf"),
            source_content_hash: format!("{hash_seed:02x}").repeat(32),
            ingested_at: fixture_time() + Duration::seconds(i64::from(hash_seed)),
            issuer_name: Some("Alpha Ventures LP".to_string()),
            recipient_role: Some("Limited partner".to_string()),
            share_percentage: Some(50.0),
            ordinary_business_income: Some(10_000.0),
            rental_real_estate_income: None,
            guaranteed_payments: None,
            interest_income: None,
            ordinary_dividends: None,
            qualified_dividends: None,
            short_term_capital_gains: None,
            long_term_capital_gains: None,
            section_179_deduction: None,
            distributions: None,
            capital_account_beginning: None,
            capital_account_ending: None,
            self_employment_earnings: None,
            foreign_taxes_paid: None,
            qbi_deduction: None,
            precheck_passed: Some(true),
            precheck_critical_count: 0,
            precheck_warning_count: 0,
            coherence_score: None,
            ocr_confidence: None,
        }
    }

    fn store_in(dir: &Path) -> SnapshotStore {
        SnapshotStore::open(dir.join("ledger.ndjson"))
    }

    fn must_upsert(store: &SnapshotStore, record: &K1Record) -> UpsertOutcome {
        store
            .upsert(record)
            .unwrap_or_else(|err| panic!("upsert should succeed: {err:#}"))
    }

    #[test]
    fn missing_snapshot_loads_empty() {
        let dir = unique_temp_dir("k1-store-missing");
        let store = store_in(&dir);
        assert_eq!(store.record_count(), 0);
        assert!(store.all_scope_records().is_empty());
    }

    #[test]
    fn upsert_then_query_round_trips() {
        let dir = unique_temp_dir("k1-store-roundtrip");
        let store = store_in(&dir);
        let record = mk_record("111-11-1111", "2023", 1);

        let outcome = must_upsert(&store, &record);
        assert!(outcome.stored);
        assert_eq!(outcome.record_count, 1);
        assert_eq!(outcome.duplicate_of, None);

        let loaded = store.query("12-3456789", "2023");
        assert_eq!(loaded, vec![record]);
    }

    #[test]
    fn same_content_hash_is_reported_not_restored() {
        let dir = unique_temp_dir("k1-store-dup");
        let store = store_in(&dir);
        let record = mk_record("111-11-1111", "2023", 1);
        must_upsert(&store, &record);

        let mut resubmitted = record.clone();
        resubmitted.source_run_id = "run_later".to_string();
        let outcome = must_upsert(&store, &resubmitted);

        assert!(!outcome.stored);
        assert_eq!(outcome.record_count, 1);
        let duplicate = outcome.duplicate_of.unwrap_or_else(|| panic!("expected duplicate ref"));
        assert_eq!(duplicate.source_run_id, record.source_run_id);
    }

    #[test]
    fn same_key_different_content_supersedes_prior_version() {
        let dir = unique_temp_dir("k1-store-amend");
        let store = store_in(&dir);
        let original = mk_record("111-11-1111", "2023", 1);
        must_upsert(&store, &original);

        let mut amended = mk_record("111-11-1111", "2023", 2);
        amended.ordinary_business_income = Some(12_000.0);
        let outcome = must_upsert(&store, &amended);
        assert!(outcome.stored);
        assert_eq!(outcome.record_count, 1, "key uniqueness must hold");

        let scope = store.scope_records("12-3456789", "2023");
        assert_eq!(scope.records, vec![amended]);
        assert_eq!(scope.superseded, vec![original]);
    }

    #[test]
    fn corrupt_snapshot_degrades_to_empty() {
        let dir = unique_temp_dir("k1-store-corrupt");
        let store = store_in(&dir);
        must_upsert(&store, &mk_record("111-11-1111", "2023", 1));

        fs::write(store.path(), b"{ this is not a snapshot\n")
            .unwrap_or_else(|err| panic!("failed to corrupt snapshot: {err}"));

        assert_eq!(store.record_count(), 0);
        // And the store recovers on the next write.
        let outcome = must_upsert(&store, &mk_record("222-22-2222", "2023", 3));
        assert!(outcome.stored);
        assert_eq!(store.record_count(), 1);
    }

    #[test]
    fn truncated_snapshot_without_header_degrades_to_empty() {
        let dir = unique_temp_dir("k1-store-headerless");
        let store = store_in(&dir);
        must_upsert(&store, &mk_record("111-11-1111", "2023", 1));

        let body = fs::read_to_string(store.path())
            .unwrap_or_else(|err| panic!("failed to read snapshot: {err}"));
        let without_header: String =
            body.lines().skip(1).map(|line| format!("{line}\n")).collect();
        fs::write(store.path(), without_header)
            .unwrap_or_else(|err| panic!("failed to rewrite snapshot: {err}"));

        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn consecutive_period_pairs_skip_gaps() {
        let dir = unique_temp_dir("k1-store-pairs");
        let store = store_in(&dir);
        must_upsert(&store, &mk_record("111-11-1111", "2021", 1));
        must_upsert(&store, &mk_record("111-11-1111", "2022", 2));
        must_upsert(&store, &mk_record("111-11-1111", "2024", 3));
        // A different recipient never pairs with the first.
        must_upsert(&store, &mk_record("222-22-2222", "2023", 4));

        let pairs = store.consecutive_period_pairs();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0.period, "2021");
        assert_eq!(pairs[0].1.period, "2022");
    }

    #[test]
    fn all_scope_records_groups_by_issuer_and_period() {
        let dir = unique_temp_dir("k1-store-scopes");
        let store = store_in(&dir);
        must_upsert(&store, &mk_record("111-11-1111", "2023", 1));
        must_upsert(&store, &mk_record("222-22-2222", "2023", 2));
        must_upsert(&store, &mk_record("111-11-1111", "2024", 3));

        let scopes = store.all_scope_records();
        assert_eq!(scopes.len(), 2);
        assert_eq!(scopes[0].period, "2023");
        assert_eq!(scopes[0].records.len(), 2);
        assert_eq!(scopes[1].period, "2024");
        assert_eq!(scopes[1].records.len(), 1);
    }

    #[test]
    fn purge_scope_removes_live_and_superseded_rows() {
        let dir = unique_temp_dir("k1-store-purge");
        let store = store_in(&dir);
        must_upsert(&store, &mk_record("111-11-1111", "2023", 1));
        must_upsert(&store, &mk_record("111-11-1111", "2023", 2));
        must_upsert(&store, &mk_record("111-11-1111", "2024", 3));

        let removed = store
            .purge_scope("12-3456789", "2023")
            .unwrap_or_else(|err| panic!("purge should succeed: {err:#}"));
        assert_eq!(removed, 1);
        assert_eq!(store.record_count(), 1);
        assert!(store.scope_records("12-3456789", "2023").superseded.is_empty());

        let removed_all = store
            .purge_all()
            .unwrap_or_else(|err| panic!("purge should succeed: {err:#}"));
        assert_eq!(removed_all, 1);
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn invalid_record_is_rejected_before_touching_disk() {
        let dir = unique_temp_dir("k1-store-invalid");
        let store = store_in(&dir);
        let mut record = mk_record("111-11-1111", "2023", 1);
        record.source_content_hash = "nope".to_string();

        let err = match store.upsert(&record) {
            Ok(outcome) => panic!("expected validation failure, got {outcome:?}"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("64 lowercase hex"));
        assert!(!store.path().exists());
    }

    #[test]
    fn key_uniqueness_holds_across_generated_upsert_sequences() {
        let dir = unique_temp_dir("k1-store-sequence");
        let store = store_in(&dir);

        // Cycle a handful of keys with fresh content every time; the
        // live set must never grow past the number of distinct keys.
        let recipients = ["111-11-1111", "222-22-2222", "333-33-3333"];
        let periods = ["2022", "2023"];
        for seed in 1_u8..=30 {
            let recipient = recipients[usize::from(seed) % recipients.len()];
            let period = periods[usize::from(seed) % periods.len()];
            must_upsert(&store, &mk_record(recipient, period, seed));
        }

        let snapshot = store.all_scope_records();
        let mut keys = std::collections::BTreeSet::new();
        let mut live_total = 0_usize;
        for scope in &snapshot {
            for record in &scope.records {
                live_total += 1;
                assert!(
                    keys.insert((
                        record.issuer_id.clone(),
                        record.recipient_id.clone(),
                        record.period.clone()
                    )),
                    "duplicate live key for {record:?}"
                );
            }
        }
        assert!(live_total <= recipients.len() * periods.len());
        assert_eq!(store.record_count(), live_total);
    }

    #[test]
    fn report_sink_writes_pretty_json() {
        let dir = unique_temp_dir("k1-report-sink");
        let path = dir.join("report.json");
        let mut sink = JsonReportSink::new(&path);

        let report = k1_ledger_core::run_validation(&[], &[], None);
        match sink.write_report(&report) {
            Ok(()) => {}
            Err(err) => panic!("sink should write: {err}"),
        }

        let body = fs::read_to_string(&path)
            .unwrap_or_else(|err| panic!("failed to read report: {err}"));
        let parsed: serde_json::Value = serde_json::from_str(&body)
            .unwrap_or_else(|err| panic!("report should be valid JSON: {err}"));
        assert_eq!(parsed["summary"]["total_checks"], 0);
    }
}
