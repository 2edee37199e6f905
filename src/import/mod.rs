//! The import engine (C9): batch upserts from tabular records — deep-merge,
//! delete-field and array operations, with per-record failure isolation and
//! a shared, thread-safe accumulator feeding a trailing report page (spec
//! §4.9).

mod csv_source;

pub use csv_source::parse_records;

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::errors::Result;
use crate::page::{FrontMatter, PageStore, Value};
use crate::queue::Job;

pub const IMPORT_REPORT_ID: &str = "page_import_report";
const INV_ITEM_TEMPLATE: &str = "inv_item";

/// A single array mutation requested against a dotted path.
#[derive(Debug, Clone)]
pub enum ArrayOp {
    /// Append `value` unless already present (string equality).
    EnsureExists { path: String, value: String },
    /// Remove every occurrence of `value` (string equality).
    DeleteValue { path: String, value: String },
}

/// One row of parsed tabular input, already validated at the parsing layer.
#[derive(Debug, Clone)]
pub struct ParsedRecord {
    pub row_number: usize,
    pub identifier: String,
    pub template: Option<String>,
    pub front_matter: FrontMatter,
    pub fields_to_delete: Vec<String>,
    pub array_ops: Vec<ArrayOp>,
    pub validation_errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RecordFailure {
    pub row_number: usize,
    pub identifier: String,
    pub reason: String,
}

/// Shared across the per-record jobs and the trailing report job; guarded by
/// a single mutex since imports are processed serially but the accumulator
/// must still be safe to share across threads (spec §4.9).
#[derive(Debug, Default)]
pub struct ImportAccumulator {
    inner: Mutex<AccumulatorState>,
}

#[derive(Debug, Default)]
struct AccumulatorState {
    created: Vec<String>,
    updated: Vec<String>,
    failed: Vec<RecordFailure>,
}

impl ImportAccumulator {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record_created(&self, id: &str) {
        self.inner.lock().created.push(id.to_string());
    }

    fn record_updated(&self, id: &str) {
        self.inner.lock().updated.push(id.to_string());
    }

    fn record_failure(&self, row_number: usize, identifier: &str, reason: String) {
        self.inner.lock().failed.push(RecordFailure { row_number, identifier: identifier.to_string(), reason });
    }

    #[must_use]
    pub fn snapshot(&self) -> (Vec<String>, Vec<String>, Vec<RecordFailure>) {
        let state = self.inner.lock();
        (state.created.clone(), state.updated.clone(), state.failed.clone())
    }
}

/// Processes a single [`ParsedRecord`] against the page store.
pub struct ImportRecordJob {
    store: Arc<PageStore>,
    accumulator: Arc<ImportAccumulator>,
    record: ParsedRecord,
}

impl ImportRecordJob {
    #[must_use]
    pub fn new(store: Arc<PageStore>, accumulator: Arc<ImportAccumulator>, record: ParsedRecord) -> Self {
        Self { store, accumulator, record }
    }
}

impl Job for ImportRecordJob {
    fn name(&self) -> String {
        "import".to_string()
    }

    fn execute(&self) -> Result<()> {
        let record = &self.record;
        if !record.validation_errors.is_empty() {
            self.accumulator.record_failure(record.row_number, &record.identifier, record.validation_errors.join("; "));
            return Ok(());
        }

        let mut page = match self.store.open(&record.identifier) {
            Ok(page) => page,
            Err(e) => {
                self.accumulator.record_failure(record.row_number, &record.identifier, e.to_string());
                return Ok(());
            }
        };
        let was_new = page.is_new;
        if was_new {
            page.front_matter.set_top("identifier", Value::from(record.identifier.clone()));
        }

        if record.template.as_deref() == Some(INV_ITEM_TEMPLATE) {
            ensure_inventory_skeleton(&mut page.front_matter);
        }

        deep_merge(&mut page.front_matter, &record.front_matter);

        for path in &record.fields_to_delete {
            page.front_matter.delete_path(path);
        }

        for op in &record.array_ops {
            if let Err(e) = apply_array_op(&mut page.front_matter, op) {
                self.accumulator.record_failure(record.row_number, &record.identifier, e);
                return Ok(());
            }
        }

        if was_new && record.template.as_deref() == Some(INV_ITEM_TEMPLATE) && page.versioned_text.current.is_empty() {
            page.set_body(format!("# {}", record.identifier), Utc::now());
        }

        match self.store.save(page) {
            Ok(()) => {
                if was_new {
                    self.accumulator.record_created(&record.identifier);
                } else {
                    self.accumulator.record_updated(&record.identifier);
                }
                Ok(())
            }
            Err(e) => {
                self.accumulator.record_failure(record.row_number, &record.identifier, e.to_string());
                Ok(())
            }
        }
    }
}

/// The trailing report job: writes `page_import_report` with counts and
/// per-row failures. Enqueued once, after every per-record job.
pub struct ImportReportJob {
    store: Arc<PageStore>,
    accumulator: Arc<ImportAccumulator>,
}

impl ImportReportJob {
    #[must_use]
    pub fn new(store: Arc<PageStore>, accumulator: Arc<ImportAccumulator>) -> Self {
        Self { store, accumulator }
    }
}

impl Job for ImportReportJob {
    fn name(&self) -> String {
        "import-report".to_string()
    }

    fn execute(&self) -> Result<()> {
        let (created, updated, failed) = self.accumulator.snapshot();
        let mut body = format!(
            "# Page Import Report\n\ncreated: {}\nupdated: {}\nfailed: {}\n\n",
            created.len(),
            updated.len(),
            failed.len()
        );
        if !failed.is_empty() {
            body.push_str("## Failures\n\n");
            for failure in &failed {
                body.push_str(&format!("- row {} (`{}`): {}\n", failure.row_number, failure.identifier, failure.reason));
            }
        }
        let mut page = self.store.open(IMPORT_REPORT_ID)?;
        page.set_body(body, Utc::now());
        self.store.save(page)
    }
}

fn ensure_inventory_skeleton(fm: &mut FrontMatter) {
    if fm.get_top("inventory").is_none() {
        let mut inventory = FrontMatter::new();
        inventory.set_top("container", Value::from(""));
        fm.set_top("inventory", Value::Map(inventory));
    }
}

/// Deep-merge `source` into `target`: scalar source overwrites any target;
/// map source descends into (or creates) a map target; a map target hit by
/// a scalar source is replaced wholesale, and vice versa.
fn deep_merge(target: &mut FrontMatter, source: &FrontMatter) {
    for (key, source_value) in &source.0 {
        match source_value {
            Value::Map(source_map) => match target.0.get_mut(key) {
                Some(Value::Map(target_map)) => deep_merge(target_map, source_map),
                _ => target.0.insert(key.clone(), Value::Map(source_map.clone())),
            },
            scalar => {
                target.0.insert(key.clone(), scalar.clone());
            }
        };
    }
}

fn apply_array_op(fm: &mut FrontMatter, op: &ArrayOp) -> std::result::Result<(), String> {
    match op {
        ArrayOp::EnsureExists { path, value } => {
            let mut parts: Vec<&str> = path.split('.').collect();
            let last = parts.pop().ok_or_else(|| "empty path".to_string())?;
            let mut cur = fm;
            for part in parts {
                let entry = cur.0.entry(part.to_string()).or_insert_with(|| Value::Map(FrontMatter::new()));
                cur = entry.as_map_mut().ok_or_else(|| format!("'{part}' in '{path}' is not a map"))?;
            }
            match cur.0.get_mut(last) {
                None => {
                    cur.0.insert(last.to_string(), Value::Array(vec![Value::from(value.clone())]));
                }
                Some(Value::Array(items)) => {
                    if !items.iter().any(|v| v.to_display_string() == *value) {
                        items.push(Value::from(value.clone()));
                    }
                }
                Some(_) => return Err(format!("'{path}' is not an array")),
            }
            Ok(())
        }
        ArrayOp::DeleteValue { path, value } => {
            let mut parts: Vec<&str> = path.split('.').collect();
            let last = parts.pop().ok_or_else(|| "empty path".to_string())?;
            let mut cur = fm;
            for part in parts {
                match cur.0.get_mut(part) {
                    Some(Value::Map(next)) => cur = next,
                    None => return Ok(()),
                    Some(_) => return Err(format!("'{part}' in '{path}' is not a map")),
                }
            }
            match cur.0.get_mut(last) {
                None => Ok(()),
                Some(Value::Array(items)) => {
                    items.retain(|v| v.to_display_string() != *value);
                    Ok(())
                }
                Some(_) => Err(format!("'{path}' is not an array")),
            }
        }
    }
}
