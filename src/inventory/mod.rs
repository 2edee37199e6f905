//! The inventory normalizer (C8): reconciles the container/item dual
//! representation, creates missing item pages, detects anomalies, and
//! writes an audit report (spec §4.8). Runs as a scheduled full sweep and
//! as a lightweight per-page job fired by save.

use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::errors::Result;
use crate::events::{EventSink, PageEvent};
use crate::identifier::{self, Identifier};
use crate::page::{FrontMatter, Page, PageStore, Value};
use crate::queue::{Coordinator, Job};

pub const INVENTORY_QUEUE: &str = "inventory";
pub const AUDIT_REPORT_ID: &str = "inventory_audit_report";

/// An [`EventSink`] that enqueues the lighter per-page job on every upsert.
pub struct InventorySink {
    store: Arc<PageStore>,
    coordinator: Coordinator,
}

impl InventorySink {
    #[must_use]
    pub fn new(store: Arc<PageStore>, coordinator: Coordinator) -> Self {
        coordinator.register_queue(INVENTORY_QUEUE);
        Self { store, coordinator }
    }
}

impl EventSink for InventorySink {
    fn emit(&self, event: PageEvent) {
        if let PageEvent::Upsert(id) = event {
            let job = PerPageJob::new(self.store.clone(), id);
            if let Err(e) = self.coordinator.enqueue(INVENTORY_QUEUE, Box::new(job)) {
                log::error!("inventory sink could not enqueue per-page job: {e}");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    None,
    Warning,
    Error,
}

impl Severity {
    #[must_use]
    pub fn glyph(self) -> &'static str {
        match self {
            Severity::None => "✅",
            Severity::Warning => "⚠️",
            Severity::Error => "❌",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Anomaly {
    pub kind: &'static str,
    pub severity: Severity,
    pub id: String,
    pub detail: String,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub created: Vec<String>,
    pub anomalies: Vec<Anomaly>,
}

/// The scheduled full-sweep job: reconciles the whole corpus in one pass.
pub struct FullSweepJob {
    store: Arc<PageStore>,
}

impl FullSweepJob {
    #[must_use]
    pub fn new(store: Arc<PageStore>) -> Self {
        Self { store }
    }
}

impl Job for FullSweepJob {
    fn name(&self) -> String {
        INVENTORY_QUEUE.to_string()
    }

    fn execute(&self) -> Result<()> {
        let report = run_full_sweep(&self.store)?;
        write_audit_report(&self.store, &report)?;
        Ok(())
    }
}

/// The lighter per-page job fired by save: ensures `is_container` is set on
/// the just-saved page when it owns items, and creates missing item pages
/// for that container only.
pub struct PerPageJob {
    store: Arc<PageStore>,
    id: Identifier,
}

impl PerPageJob {
    #[must_use]
    pub fn new(store: Arc<PageStore>, id: Identifier) -> Self {
        Self { store, id }
    }
}

impl Job for PerPageJob {
    fn name(&self) -> String {
        format!("inventory-page:{}", self.id)
    }

    fn execute(&self) -> Result<()> {
        let mut page = self.store.open(self.id.as_str())?;
        if page.is_new {
            return Ok(());
        }
        let items = items_list(&page.front_matter);
        if items.is_empty() {
            return Ok(());
        }
        let container_id = page.identifier.as_str().to_string();
        if migrate_container_flag(&mut page) {
            self.store.save(page)?;
        }
        for item_raw in items {
            if let Value::String(s) = &item_raw {
                if let Ok(item_id) = identifier::munge(s) {
                    if let Err(e) = create_missing_item(&self.store, item_id.as_str(), &container_id) {
                        log::warn!("inventory per-page job could not create item for '{container_id}': {e}");
                    }
                }
            }
        }
        Ok(())
    }
}

fn create_missing_item(store: &PageStore, item_id: &str, container_id: &str) -> Result<()> {
    let existing = store.open(item_id)?;
    if !existing.is_new {
        return Ok(());
    }
    let mut page = existing;
    seed_item_page(&mut page, container_id);
    store.save(page)
}

fn seed_item_page(page: &mut Page, container_id: &str) {
    page.front_matter.set_top("identifier", Value::from(page.identifier.as_str().to_string()));
    page.front_matter.set_top("title", Value::from(title_case_snake(page.identifier.as_str())));
    let mut inventory = FrontMatter::new();
    inventory.set_top("container", Value::from(container_id.to_string()));
    page.front_matter.set_top("inventory", Value::Map(inventory));
    if page.versioned_text.current.is_empty() {
        page.set_body(format!("# {}", title_case_snake(page.identifier.as_str())), Utc::now());
    }
}

fn run_full_sweep(store: &PageStore) -> Result<SweepReport> {
    let ids = store.list()?;
    let mut pages: BTreeMap<String, Page> = BTreeMap::new();
    for id in &ids {
        let page = store.open(id.as_str())?;
        pages.insert(id.as_str().to_string(), page);
    }

    let mut report = SweepReport::default();

    let mut referenced_as_container: HashSet<String> = HashSet::new();
    let mut items_owners: HashSet<String> = HashSet::new();
    for page in pages.values() {
        if let Some(container) = container_field(&page.front_matter) {
            referenced_as_container.insert(container);
        }
        if !items_list(&page.front_matter).is_empty() {
            items_owners.insert(page.identifier.as_str().to_string());
        }
    }

    // Step 1: container migration.
    let mut to_migrate: HashSet<String> = HashSet::new();
    to_migrate.extend(referenced_as_container.iter().cloned());
    to_migrate.extend(items_owners.iter().cloned());
    for id in &to_migrate {
        if let Some(page) = pages.get_mut(id)
            && migrate_container_flag(page)
        {
            store.save(page.clone())?;
        }
    }

    // Step 2: container enumeration.
    let mut containers: Vec<String> =
        pages.values().filter(|p| is_container_true(&p.front_matter)).map(|p| p.identifier.as_str().to_string()).collect();
    for id in items_owners.iter().chain(referenced_as_container.iter()) {
        if !containers.contains(id) {
            containers.push(id.clone());
        }
    }
    containers.sort();
    containers.dedup();

    // Step 3: missing-item creation.
    for container_id in &containers {
        let Some(container_page) = pages.get(container_id) else { continue };
        for item_raw in items_list(&container_page.front_matter) {
            let Value::String(item_raw_str) = &item_raw else { continue };
            let Ok(item_id) = identifier::munge(item_raw_str) else { continue };
            let key = item_id.as_str().to_string();
            if pages.contains_key(&key) {
                continue;
            }
            let mut new_page = Page::new_empty(item_id.clone());
            seed_item_page(&mut new_page, container_id);
            let for_map = new_page.clone();
            match store.save(new_page) {
                Ok(()) => {
                    report.created.push(key.clone());
                    pages.insert(key, for_map);
                }
                Err(e) => report.anomalies.push(Anomaly {
                    kind: "page_creation_failed",
                    severity: Severity::Error,
                    id: key,
                    detail: e.to_string(),
                }),
            }
        }
    }

    // Step 4: anomaly detection.
    report.anomalies.extend(detect_multiple_containers(&pages, &containers));
    report.anomalies.extend(detect_orphans(&pages));
    report.anomalies.extend(detect_cycles(&pages));

    // Step 5: items-array pruning.
    for container_id in &containers {
        let Some(container_page) = pages.get(container_id) else { continue };
        let items = items_list(&container_page.front_matter);
        let mut pruned = Vec::with_capacity(items.len());
        let mut changed = false;
        for item_val in items {
            if let Value::String(s) = &item_val
                && let Ok(item_id) = identifier::munge(s)
                && !report.created.iter().any(|c| c == item_id.as_str())
                && let Some(item_page) = pages.get(item_id.as_str())
                && let Some(item_container) = container_field(&item_page.front_matter)
                && item_container == *container_id
            {
                changed = true;
                continue;
            }
            pruned.push(item_val);
        }
        if changed
            && let Some(page) = pages.get(container_id).cloned()
        {
            let mut page = page;
            set_items_list(&mut page.front_matter, pruned);
            store.save(page.clone())?;
            pages.insert(container_id.clone(), page);
        }
    }

    Ok(report)
}

fn detect_multiple_containers(pages: &BTreeMap<String, Page>, containers: &[String]) -> Vec<Anomaly> {
    let mut claims: BTreeMap<String, HashSet<String>> = BTreeMap::new();
    for page in pages.values() {
        if let Some(container) = container_field(&page.front_matter) {
            claims.entry(page.identifier.as_str().to_string()).or_default().insert(container);
        }
    }
    for container_id in containers {
        let Some(container_page) = pages.get(container_id) else { continue };
        for item_raw in items_list(&container_page.front_matter) {
            if let Value::String(s) = &item_raw
                && let Ok(item_id) = identifier::munge(s)
            {
                claims.entry(item_id.as_str().to_string()).or_default().insert(container_id.clone());
            }
        }
    }
    claims
        .into_iter()
        .filter(|(_, containers)| containers.len() > 1)
        .map(|(item_id, containers)| {
            let mut names: Vec<String> = containers.into_iter().collect();
            names.sort();
            Anomaly { kind: "multiple_containers", severity: Severity::Warning, id: item_id, detail: format!("claimed by: {}", names.join(", ")) }
        })
        .collect()
}

fn detect_orphans(pages: &BTreeMap<String, Page>) -> Vec<Anomaly> {
    pages
        .values()
        .filter_map(|page| {
            let container = container_field(&page.front_matter)?;
            if pages.contains_key(&container) {
                return None;
            }
            Some(Anomaly {
                kind: "orphan",
                severity: Severity::Warning,
                id: page.identifier.as_str().to_string(),
                detail: format!("inventory.container references nonexistent '{container}'"),
            })
        })
        .collect()
}

/// DFS over the child→parent (`inventory.container`) graph. Each recursive
/// call receives its own owned copy of the path so far, so frames never
/// share backing storage; a cycle is reported once, keyed to its
/// lexicographically first member.
fn detect_cycles(pages: &BTreeMap<String, Page>) -> Vec<Anomaly> {
    let mut reported: HashSet<Vec<String>> = HashSet::new();
    let mut anomalies = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();

    for start in pages.keys() {
        if !visited.contains(start) {
            visit_for_cycle(start, pages, Vec::new(), &mut visited, &mut reported, &mut anomalies);
        }
    }
    anomalies
}

fn visit_for_cycle(
    node: &str,
    pages: &BTreeMap<String, Page>,
    path: Vec<String>,
    visited: &mut HashSet<String>,
    reported: &mut HashSet<Vec<String>>,
    anomalies: &mut Vec<Anomaly>,
) {
    if let Some(pos) = path.iter().position(|n| n == node) {
        let cycle: Vec<String> = path[pos..].to_vec();
        let mut key: Vec<String> = cycle.clone();
        key.sort();
        if reported.insert(key) {
            let keyed_to = cycle.iter().min().cloned().unwrap_or_default();
            let mut display = cycle.clone();
            display.push(node.to_string());
            anomalies.push(Anomaly { kind: "circular_reference", severity: Severity::Error, id: keyed_to, detail: format!("cycle: {}", display.join(" -> ")) });
        }
        return;
    }
    if visited.contains(node) {
        return;
    }
    visited.insert(node.to_string());
    let Some(page) = pages.get(node) else { return };
    let Some(parent) = container_field(&page.front_matter) else { return };
    if !pages.contains_key(&parent) {
        return;
    }
    let mut next_path = path.clone();
    next_path.push(node.to_string());
    visit_for_cycle(&parent, pages, next_path, visited, reported, anomalies);
}

fn migrate_container_flag(page: &mut Page) -> bool {
    let is_set = match page.front_matter.get_path("inventory.is_container").and_then(Value::as_bool_loose) {
        Some(flag) => flag,
        None => {
            if page.front_matter.get_path("inventory.is_container").is_some() {
                log::warn!("UnexpectedIsContainerType for page '{}'", page.identifier);
            }
            false
        }
    };
    if is_set {
        return false;
    }
    let _ = page.front_matter.set_path("inventory.is_container", Value::Bool(true));
    true
}

fn is_container_true(fm: &FrontMatter) -> bool {
    fm.get_path("inventory.is_container").and_then(Value::as_bool_loose).unwrap_or(false)
}

fn container_field(fm: &FrontMatter) -> Option<String> {
    let raw = fm.get_path("inventory.container")?.as_str()?;
    identifier::munge(raw).ok().map(|id| id.as_str().to_string())
}

fn items_list(fm: &FrontMatter) -> Vec<Value> {
    fm.get_path("inventory.items").and_then(Value::as_array).map(<[Value]>::to_vec).unwrap_or_default()
}

fn set_items_list(fm: &mut FrontMatter, items: Vec<Value>) {
    let _ = fm.set_path("inventory.items", Value::Array(items));
}

fn title_case_snake(id: &str) -> String {
    id.split('_')
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| first.to_uppercase().collect::<String>() + chars.as_str())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn write_audit_report(store: &PageStore, report: &SweepReport) -> Result<()> {
    let mut body = String::from("# Inventory Audit Report\n\n## Created pages\n\n");
    if report.created.is_empty() {
        body.push_str("_none_\n\n");
    } else {
        for id in &report.created {
            body.push_str(&format!("- {id}\n"));
        }
        body.push('\n');
    }

    body.push_str("## Anomalies\n\n");
    if report.anomalies.is_empty() {
        body.push_str(&format!("{} none\n", Severity::None.glyph()));
    } else {
        let mut grouped: BTreeMap<&str, Vec<&Anomaly>> = BTreeMap::new();
        for anomaly in &report.anomalies {
            grouped.entry(anomaly.kind).or_default().push(anomaly);
        }
        for (kind, items) in grouped {
            body.push_str(&format!("### {kind}\n\n"));
            for anomaly in items {
                body.push_str(&format!("- {} `{}`: {}\n", anomaly.severity.glyph(), anomaly.id, anomaly.detail));
            }
            body.push('\n');
        }
    }

    let mut page = store.open(AUDIT_REPORT_ID)?;
    page.set_body(body, Utc::now());
    store.save(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn save_with_inventory(store: &PageStore, id: &str, inventory: FrontMatter) {
        let mut page = store.open(id).unwrap();
        page.set_body(format!("# {id}"), Utc::now());
        page.front_matter.set_top("inventory", Value::Map(inventory));
        store.save(page).unwrap();
    }

    #[test]
    fn full_sweep_creates_missing_items_and_marks_container() {
        let dir = tempdir().unwrap();
        let store = PageStore::without_events(dir.path());
        let mut inv = FrontMatter::new();
        inv.set_top("items", Value::Array(vec![Value::from("hammer"), Value::from("screwdriver")]));
        save_with_inventory(&store, "tool_box", inv);

        let report = run_full_sweep(&store).unwrap();
        assert_eq!(report.created.len(), 2);

        let container = store.open("tool_box").unwrap();
        assert_eq!(container.front_matter.get_path("inventory.is_container").unwrap().as_bool_loose(), Some(true));
        let hammer = store.open("hammer").unwrap();
        assert_eq!(hammer.front_matter.get_path("inventory.container").unwrap().as_str(), Some("tool_box"));
    }

    #[test]
    fn circular_reference_is_reported_once_keyed_to_first_node() {
        let dir = tempdir().unwrap();
        let store = PageStore::without_events(dir.path());
        for (id, parent) in [("a", "b"), ("b", "c"), ("c", "a")] {
            let mut inv = FrontMatter::new();
            inv.set_top("container", Value::from(parent));
            save_with_inventory(&store, id, inv);
        }
        let report = run_full_sweep(&store).unwrap();
        let cycles: Vec<_> = report.anomalies.iter().filter(|a| a.kind == "circular_reference").collect();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].id, "a");
    }

    #[test]
    fn orphan_container_reference_is_a_warning() {
        let dir = tempdir().unwrap();
        let store = PageStore::without_events(dir.path());
        let mut inv = FrontMatter::new();
        inv.set_top("container", Value::from("nonexistent_box"));
        save_with_inventory(&store, "lost_item", inv);

        let report = run_full_sweep(&store).unwrap();
        let orphans: Vec<_> = report.anomalies.iter().filter(|a| a.kind == "orphan").collect();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].severity, Severity::Warning);
    }

    #[test]
    fn items_array_is_pruned_once_item_matches_its_container() {
        let dir = tempdir().unwrap();
        let store = PageStore::without_events(dir.path());
        let mut container_inv = FrontMatter::new();
        container_inv.set_top("items", Value::Array(vec![Value::from("Big Hammer"), Value::from("Small Screwdriver")]));
        save_with_inventory(&store, "tool_box", container_inv);
        let mut item_inv = FrontMatter::new();
        item_inv.set_top("container", Value::from("tool_box"));
        save_with_inventory(&store, "big_hammer", item_inv);

        run_full_sweep(&store).unwrap();
        let container = store.open("tool_box").unwrap();
        let items = items_list(&container.front_matter);
        let remaining: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
        assert_eq!(remaining, vec!["Small Screwdriver"]);
    }

    #[test]
    fn empty_items_array_does_not_mark_container() {
        let dir = tempdir().unwrap();
        let store = PageStore::without_events(dir.path());
        let inv = FrontMatter::new();
        save_with_inventory(&store, "empty_box", inv);
        run_full_sweep(&store).unwrap();
        let page = store.open("empty_box").unwrap();
        assert!(page.front_matter.get_path("inventory.is_container").is_none());
    }
}
