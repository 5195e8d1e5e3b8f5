//! Persisted state: reports with their sections, review task records, and
//! prior per-rule results for history comparison.
//!
//! Engines depend only on the two traits. `MemoryStore` backs tests and
//! one-shot runs; `JsonStore` persists JSON collections with atomic saves
//! (write tmp + fsync + rename) under an exclusive file lock.

use std::collections::HashMap;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{Error, Result};

pub fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Analyzing,
    Generating,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Completed | ReportStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Analyzing => "analyzing",
            ReportStatus::Generating => "generating",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub id: String,
    pub repo_url: String,
    pub git_ref: String,
    pub report_type: String,
    pub status: ReportStatus,
    /// Phase 1 structure as JSON; empty until analysis completes.
    #[serde(default)]
    pub structure: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub content: String,
    /// Leaf count; parents are not generated and do not count.
    #[serde(default)]
    pub total_sections: u32,
    #[serde(default)]
    pub current_section: u32,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub started_at: u64,
    #[serde(default)]
    pub completed_at: u64,
}

impl Report {
    pub fn new(id: &str, repo_url: &str, git_ref: &str, report_type: &str) -> Self {
        Self {
            id: id.to_string(),
            repo_url: repo_url.to_string(),
            git_ref: git_ref.to_string(),
            report_type: report_type.to_string(),
            status: ReportStatus::Pending,
            structure: String::new(),
            title: String::new(),
            summary: String::new(),
            content: String::new(),
            total_sections: 0,
            current_section: 0,
            error: String::new(),
            created_at: now_epoch(),
            started_at: 0,
            completed_at: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportSection {
    pub report_id: String,
    /// Position in depth-first structural order, parents included.
    pub section_index: u32,
    pub section_id: String,
    #[serde(default)]
    pub parent_section_id: Option<String>,
    pub is_leaf: bool,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub summary: String,
    pub status: SectionStatus,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub duration_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl ReviewStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReviewStatus::Completed | ReviewStatus::Failed)
    }
}

/// Task-level review record, enough to re-enqueue after a restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReviewRecord {
    pub review_id: String,
    pub status: ReviewStatus,
    #[serde(default)]
    pub repo_path: String,
    #[serde(default)]
    pub rules_path: String,
    #[serde(default)]
    pub repo_url: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub git_ref: String,
    #[serde(default)]
    pub commit_sha: String,
    #[serde(default)]
    pub pr_number: u64,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub created_at: u64,
}

/// Most recent per-rule result text, keyed by `(pr_id, rule_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleResultRecord {
    pub pr_id: String,
    pub rule_id: String,
    pub text: String,
    pub updated_at: u64,
}

pub trait ReportStore: Send + Sync {
    fn create_report(&self, report: &Report) -> Result<()>;
    /// Upsert.
    fn save_report(&self, report: &Report) -> Result<()>;
    fn get_report(&self, id: &str) -> Result<Option<Report>>;
    fn list_reports_by_status(&self, status: ReportStatus) -> Result<Vec<Report>>;

    fn create_section(&self, section: &ReportSection) -> Result<()>;
    fn update_section(&self, section: &ReportSection) -> Result<()>;
    /// All sections of a report in structural order.
    fn sections_by_report(&self, report_id: &str) -> Result<Vec<ReportSection>>;
    /// Leaves only, in structural order.
    fn leaf_sections_by_report(&self, report_id: &str) -> Result<Vec<ReportSection>>;
}

pub trait ReviewStore: Send + Sync {
    fn save_review(&self, record: &ReviewRecord) -> Result<()>;
    fn get_review(&self, review_id: &str) -> Result<Option<ReviewRecord>>;
    fn list_reviews_by_status(&self, status: ReviewStatus) -> Result<Vec<ReviewRecord>>;

    fn save_rule_result(&self, pr_id: &str, rule_id: &str, text: &str) -> Result<()>;
    fn previous_rule_result(&self, pr_id: &str, rule_id: &str) -> Result<Option<String>>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    reports: HashMap<String, Report>,
    sections: Vec<ReportSection>,
    reviews: HashMap<String, ReviewRecord>,
    rule_results: HashMap<(String, String), RuleResultRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().expect("memory store lock")
    }
}

impl ReportStore for MemoryStore {
    fn create_report(&self, report: &Report) -> Result<()> {
        let mut inner = self.lock();
        if inner.reports.contains_key(&report.id) {
            return Err(Error::Store(format!("report '{}' already exists", report.id)));
        }
        inner.reports.insert(report.id.clone(), report.clone());
        Ok(())
    }

    fn save_report(&self, report: &Report) -> Result<()> {
        self.lock().reports.insert(report.id.clone(), report.clone());
        Ok(())
    }

    fn get_report(&self, id: &str) -> Result<Option<Report>> {
        Ok(self.lock().reports.get(id).cloned())
    }

    fn list_reports_by_status(&self, status: ReportStatus) -> Result<Vec<Report>> {
        let mut reports: Vec<Report> = self
            .lock()
            .reports
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        reports.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(reports)
    }

    fn create_section(&self, section: &ReportSection) -> Result<()> {
        self.lock().sections.push(section.clone());
        Ok(())
    }

    fn update_section(&self, section: &ReportSection) -> Result<()> {
        let mut inner = self.lock();
        let found = inner
            .sections
            .iter_mut()
            .find(|s| s.report_id == section.report_id && s.section_index == section.section_index);
        match found {
            Some(slot) => {
                *slot = section.clone();
                Ok(())
            }
            None => Err(Error::Store(format!(
                "section {}/{} not found",
                section.report_id, section.section_index
            ))),
        }
    }

    fn sections_by_report(&self, report_id: &str) -> Result<Vec<ReportSection>> {
        let mut sections: Vec<ReportSection> = self
            .lock()
            .sections
            .iter()
            .filter(|s| s.report_id == report_id)
            .cloned()
            .collect();
        sections.sort_by_key(|s| s.section_index);
        Ok(sections)
    }

    fn leaf_sections_by_report(&self, report_id: &str) -> Result<Vec<ReportSection>> {
        Ok(self
            .sections_by_report(report_id)?
            .into_iter()
            .filter(|s| s.is_leaf)
            .collect())
    }
}

impl ReviewStore for MemoryStore {
    fn save_review(&self, record: &ReviewRecord) -> Result<()> {
        self.lock().reviews.insert(record.review_id.clone(), record.clone());
        Ok(())
    }

    fn get_review(&self, review_id: &str) -> Result<Option<ReviewRecord>> {
        Ok(self.lock().reviews.get(review_id).cloned())
    }

    fn list_reviews_by_status(&self, status: ReviewStatus) -> Result<Vec<ReviewRecord>> {
        let mut reviews: Vec<ReviewRecord> = self
            .lock()
            .reviews
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| a.review_id.cmp(&b.review_id));
        Ok(reviews)
    }

    fn save_rule_result(&self, pr_id: &str, rule_id: &str, text: &str) -> Result<()> {
        self.lock().rule_results.insert(
            (pr_id.to_string(), rule_id.to_string()),
            RuleResultRecord {
                pr_id: pr_id.to_string(),
                rule_id: rule_id.to_string(),
                text: text.to_string(),
                updated_at: now_epoch(),
            },
        );
        Ok(())
    }

    fn previous_rule_result(&self, pr_id: &str, rule_id: &str) -> Result<Option<String>> {
        Ok(self
            .lock()
            .rule_results
            .get(&(pr_id.to_string(), rule_id.to_string()))
            .map(|r| r.text.clone()))
    }
}

// ---------------------------------------------------------------------------
// JsonStore
// ---------------------------------------------------------------------------

/// File-backed store: one JSON document per collection under a state
/// directory. Mutations run load-modify-save under an exclusive flock so
/// concurrent processes cannot interleave.
pub struct JsonStore {
    state_dir: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ReportsDoc {
    #[serde(default)]
    reports: Vec<Report>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SectionsDoc {
    #[serde(default)]
    sections: Vec<ReportSection>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ReviewsDoc {
    #[serde(default)]
    reviews: Vec<ReviewRecord>,
    #[serde(default)]
    rule_results: Vec<RuleResultRecord>,
}

impl JsonStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    fn file(&self, name: &str) -> PathBuf {
        self.state_dir.join(name)
    }

    /// Load a collection. A missing or corrupted file resets to default
    /// with a warning rather than wedging the engine.
    fn load<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        let path = self.file(name);
        if !path.exists() {
            return T::default();
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!("corrupted store file {}: {e}, resetting", path.display());
                    T::default()
                }
            },
            Err(e) => {
                warn!("failed to read store file {}: {e}, resetting", path.display());
                T::default()
            }
        }
    }

    /// Save atomically: write tmp, fsync, rename.
    fn save<T: Serialize>(&self, name: &str, doc: &T) -> Result<()> {
        use std::io::Write;

        std::fs::create_dir_all(&self.state_dir)
            .map_err(|e| Error::Store(format!("failed to create state dir: {e}")))?;

        let content = serde_json::to_string_pretty(doc)
            .map_err(|e| Error::Store(format!("failed to serialize {name}: {e}")))?;

        let dest = self.file(name);
        let tmp = self.file(&format!(".{name}.tmp"));

        let mut file = std::fs::File::create(&tmp)
            .map_err(|e| Error::Store(format!("failed to create {}: {e}", tmp.display())))?;
        file.write_all(content.as_bytes())
            .map_err(|e| Error::Store(format!("failed to write {}: {e}", tmp.display())))?;
        file.sync_all()
            .map_err(|e| Error::Store(format!("failed to fsync {}: {e}", tmp.display())))?;

        std::fs::rename(&tmp, &dest)
            .map_err(|e| Error::Store(format!("failed to rename {}: {e}", tmp.display())))?;
        Ok(())
    }

    /// Load-modify-save under an exclusive lock file.
    fn modify<T: DeserializeOwned + Serialize + Default>(
        &self,
        name: &str,
        f: impl FnOnce(&mut T) -> Result<()>,
    ) -> Result<()> {
        std::fs::create_dir_all(&self.state_dir)
            .map_err(|e| Error::Store(format!("failed to create state dir: {e}")))?;

        let lock = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.file(".store.lock"))
            .map_err(|e| Error::Store(format!("failed to open lock file: {e}")))?;

        let ret = unsafe { libc::flock(lock.as_raw_fd(), libc::LOCK_EX) };
        if ret != 0 {
            return Err(Error::Store(format!(
                "failed to acquire store lock: {}",
                std::io::Error::last_os_error()
            )));
        }

        let mut doc: T = self.load(name);
        f(&mut doc)?;
        self.save(name, &doc)
        // Lock released when `lock` is dropped (fd closed)
    }
}

const REPORTS_FILE: &str = "reports.json";
const SECTIONS_FILE: &str = "sections.json";
const REVIEWS_FILE: &str = "reviews.json";

impl ReportStore for JsonStore {
    fn create_report(&self, report: &Report) -> Result<()> {
        self.modify(REPORTS_FILE, |doc: &mut ReportsDoc| {
            if doc.reports.iter().any(|r| r.id == report.id) {
                return Err(Error::Store(format!("report '{}' already exists", report.id)));
            }
            doc.reports.push(report.clone());
            Ok(())
        })
    }

    fn save_report(&self, report: &Report) -> Result<()> {
        self.modify(REPORTS_FILE, |doc: &mut ReportsDoc| {
            match doc.reports.iter_mut().find(|r| r.id == report.id) {
                Some(slot) => *slot = report.clone(),
                None => doc.reports.push(report.clone()),
            }
            Ok(())
        })
    }

    fn get_report(&self, id: &str) -> Result<Option<Report>> {
        let doc: ReportsDoc = self.load(REPORTS_FILE);
        Ok(doc.reports.into_iter().find(|r| r.id == id))
    }

    fn list_reports_by_status(&self, status: ReportStatus) -> Result<Vec<Report>> {
        let doc: ReportsDoc = self.load(REPORTS_FILE);
        let mut reports: Vec<Report> = doc
            .reports
            .into_iter()
            .filter(|r| r.status == status)
            .collect();
        reports.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(reports)
    }

    fn create_section(&self, section: &ReportSection) -> Result<()> {
        self.modify(SECTIONS_FILE, |doc: &mut SectionsDoc| {
            doc.sections.push(section.clone());
            Ok(())
        })
    }

    fn update_section(&self, section: &ReportSection) -> Result<()> {
        self.modify(SECTIONS_FILE, |doc: &mut SectionsDoc| {
            let found = doc.sections.iter_mut().find(|s| {
                s.report_id == section.report_id && s.section_index == section.section_index
            });
            match found {
                Some(slot) => {
                    *slot = section.clone();
                    Ok(())
                }
                None => Err(Error::Store(format!(
                    "section {}/{} not found",
                    section.report_id, section.section_index
                ))),
            }
        })
    }

    fn sections_by_report(&self, report_id: &str) -> Result<Vec<ReportSection>> {
        let doc: SectionsDoc = self.load(SECTIONS_FILE);
        let mut sections: Vec<ReportSection> = doc
            .sections
            .into_iter()
            .filter(|s| s.report_id == report_id)
            .collect();
        sections.sort_by_key(|s| s.section_index);
        Ok(sections)
    }

    fn leaf_sections_by_report(&self, report_id: &str) -> Result<Vec<ReportSection>> {
        Ok(self
            .sections_by_report(report_id)?
            .into_iter()
            .filter(|s| s.is_leaf)
            .collect())
    }
}

impl ReviewStore for JsonStore {
    fn save_review(&self, record: &ReviewRecord) -> Result<()> {
        self.modify(REVIEWS_FILE, |doc: &mut ReviewsDoc| {
            match doc.reviews.iter_mut().find(|r| r.review_id == record.review_id) {
                Some(slot) => *slot = record.clone(),
                None => doc.reviews.push(record.clone()),
            }
            Ok(())
        })
    }

    fn get_review(&self, review_id: &str) -> Result<Option<ReviewRecord>> {
        let doc: ReviewsDoc = self.load(REVIEWS_FILE);
        Ok(doc.reviews.into_iter().find(|r| r.review_id == review_id))
    }

    fn list_reviews_by_status(&self, status: ReviewStatus) -> Result<Vec<ReviewRecord>> {
        let doc: ReviewsDoc = self.load(REVIEWS_FILE);
        let mut reviews: Vec<ReviewRecord> = doc
            .reviews
            .into_iter()
            .filter(|r| r.status == status)
            .collect();
        reviews.sort_by(|a, b| a.review_id.cmp(&b.review_id));
        Ok(reviews)
    }

    fn save_rule_result(&self, pr_id: &str, rule_id: &str, text: &str) -> Result<()> {
        self.modify(REVIEWS_FILE, |doc: &mut ReviewsDoc| {
            let found = doc
                .rule_results
                .iter_mut()
                .find(|r| r.pr_id == pr_id && r.rule_id == rule_id);
            let record = RuleResultRecord {
                pr_id: pr_id.to_string(),
                rule_id: rule_id.to_string(),
                text: text.to_string(),
                updated_at: now_epoch(),
            };
            match found {
                Some(slot) => *slot = record,
                None => doc.rule_results.push(record),
            }
            Ok(())
        })
    }

    fn previous_rule_result(&self, pr_id: &str, rule_id: &str) -> Result<Option<String>> {
        let doc: ReviewsDoc = self.load(REVIEWS_FILE);
        Ok(doc
            .rule_results
            .into_iter()
            .find(|r| r.pr_id == pr_id && r.rule_id == rule_id)
            .map(|r| r.text))
    }
}
