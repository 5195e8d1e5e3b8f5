//! The three-phase report orchestrator.
//!
//! ```text
//!   pending ──start──▶ analyzing ──structure ok──▶ generating
//!                                                     │
//!                                                     ├─ all leaves done ──▶ completed
//!                                                     └─ unrecoverable error ──▶ failed
//! ```
//!
//! Phase ordering is strict per report; section completion order within
//! Phase 2 is whatever the store hands back. Per-section failures are
//! isolated; phase-level failures are recorded as `"{phase}: {cause}"` and
//! halt the pipeline.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::{AgentRegistry, AnyRunner, ExecuteRequest, execute_with_retry};
use crate::config::ConfigProvider;
use crate::dsl::ReportConfigSet;
use crate::dsl::report::ReportConfig;
use crate::error::{Error, Result};
use crate::repo::{RepoRequest, RepositoryManager};
use crate::store::{Report, ReportStatus, ReportStore, SectionStatus, now_epoch};

use super::content;
use super::prompts::ReportPromptEngine;
use super::structure;
use super::{Notifier, ReportTask};

pub const QUEUE_CAPACITY: usize = 100;

pub struct EngineInner {
    pub provider: Arc<dyn ConfigProvider>,
    pub registry: Arc<AgentRegistry>,
    pub store: Arc<dyn ReportStore>,
    pub repos: Arc<dyn RepositoryManager>,
    pub configs: ReportConfigSet,
    pub notifier: Arc<dyn Notifier>,
    pub prompts: ReportPromptEngine,
}

pub struct ReportEngine {
    tx: mpsc::Sender<ReportTask>,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    inner: Arc<EngineInner>,
}

impl ReportEngine {
    /// Start the engine with its worker pool.
    pub fn start(inner: EngineInner) -> Self {
        let inner = Arc::new(inner);
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel::<ReportTask>(QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));

        let worker_count = inner.provider.report().workers;
        let workers = (0..worker_count)
            .map(|worker| {
                let inner = inner.clone();
                let cancel = cancel.clone();
                let rx = rx.clone();
                tokio::spawn(async move {
                    loop {
                        let task = { rx.lock().await.recv().await };
                        let Some(task) = task else { break };
                        info!(worker, report = %task.report_id, "report task picked up");
                        run_task(&inner, &cancel, &task).await;
                    }
                })
            })
            .collect();

        Self {
            tx,
            cancel,
            workers,
            inner,
        }
    }

    /// Non-blocking submit; a full queue is an error, not a wait.
    pub fn submit(&self, task: ReportTask) -> Result<()> {
        self.tx.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::QueueFull,
            mpsc::error::TrySendError::Closed(_) => Error::Cancelled,
        })
    }

    /// Validate and enqueue a resumption for a stored report.
    pub fn resume(&self, report_id: &str) -> Result<()> {
        let report = self
            .inner
            .store
            .get_report(report_id)?
            .ok_or_else(|| Error::Store(format!("report '{report_id}' not found")))?;
        if report.status == ReportStatus::Completed {
            return Err(Error::ConfigValidation(format!(
                "report '{report_id}' is already completed"
            )));
        }
        self.submit(ReportTask {
            report_id: report.id,
            repo_url: report.repo_url,
            git_ref: report.git_ref,
            report_type: report.report_type,
        })
    }

    /// Cancel the shared signal, close the queue, and wait for in-flight
    /// tasks to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        drop(self.tx);
        for worker in self.workers {
            let _ = worker.await;
        }
    }

    /// Close the queue without cancelling; workers drain what is queued.
    pub async fn drain(self) {
        drop(self.tx);
        for worker in self.workers {
            let _ = worker.await;
        }
    }

    pub fn inner(&self) -> &Arc<EngineInner> {
        &self.inner
    }
}

/// Extract `(owner, repo)` from a repository URL.
pub fn parse_repo_url(url: &str) -> Result<(String, String)> {
    let trimmed = url.trim_end_matches('/').trim_end_matches(".git");
    let mut segments = trimmed.rsplit(['/', ':']).filter(|s| !s.is_empty());
    let repo = segments.next();
    let owner = segments.next();
    match (owner, repo) {
        (Some(owner), Some(repo)) if !owner.contains("//") => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(Error::ConfigValidation(format!("cannot parse repository url '{url}'"))),
    }
}

async fn run_task(inner: &EngineInner, cancel: &CancellationToken, task: &ReportTask) {
    let mut report = match load_or_create(inner, task) {
        Ok(report) => report,
        Err(e) => {
            warn!(report = %task.report_id, error = %e, "report task rejected");
            return;
        }
    };

    if report.status == ReportStatus::Completed {
        info!(report = %report.id, "already completed, nothing to do");
        return;
    }

    match run_pipeline(inner, cancel, &mut report).await {
        Ok(()) => {
            report.status = ReportStatus::Completed;
            report.error.clear();
            report.completed_at = now_epoch();
            if let Err(e) = inner.store.save_report(&report) {
                warn!(report = %report.id, error = %e, "failed to persist completion");
            }
            inner.notifier.report_completed(&report);
        }
        Err(failure) => {
            report.status = ReportStatus::Failed;
            report.error = failure.message();
            report.completed_at = now_epoch();
            if let Err(e) = inner.store.save_report(&report) {
                warn!(report = %report.id, error = %e, "failed to persist failure");
            }
            inner.notifier.report_failed(&report);
        }
    }
}

/// A phase-level failure recorded on the report as `"{phase}: {cause}"`.
struct PhaseFailure {
    phase: &'static str,
    error: Error,
}

impl PhaseFailure {
    fn message(&self) -> String {
        format!("{}: {}", self.phase, self.error)
    }
}

fn in_phase<T>(phase: &'static str, result: Result<T>) -> std::result::Result<T, PhaseFailure> {
    result.map_err(|error| PhaseFailure { phase, error })
}

fn load_or_create(inner: &EngineInner, task: &ReportTask) -> Result<Report> {
    if let Some(report) = inner.store.get_report(&task.report_id)? {
        return Ok(report);
    }
    let report = Report::new(&task.report_id, &task.repo_url, &task.git_ref, &task.report_type);
    inner.store.create_report(&report)?;
    Ok(report)
}

async fn run_pipeline(
    inner: &EngineInner,
    cancel: &CancellationToken,
    report: &mut Report,
) -> std::result::Result<(), PhaseFailure> {
    let config = in_phase(
        "prepare",
        inner
            .configs
            .get(&report.report_type)
            .cloned()
            .ok_or_else(|| {
                Error::ConfigValidation(format!("unknown report type '{}'", report.report_type))
            }),
    )?;

    // Phase 0: prepare the repository.
    let repo_path = in_phase("prepare", prepare_repository(inner, report))?;
    let repo_path = repo_path.to_string_lossy().into_owned();

    // Phase 1: structure (skipped entirely on resume).
    if report.structure.is_empty() {
        in_phase(
            "structure",
            run_structure_phase(inner, cancel, report, &config, &repo_path).await,
        )?;
    } else {
        report.status = ReportStatus::Generating;
        in_phase("structure", inner.store.save_report(report))?;
    }

    // Phase 2: leaves only; completed ones are skipped.
    in_phase(
        "sections",
        run_section_phase(inner, cancel, report, &config, &repo_path).await,
    )?;

    // Phase 3: merge and summarize.
    in_phase(
        "summary",
        run_summary_phase(inner, cancel, report, &config, &repo_path).await,
    )?;

    Ok(())
}

fn prepare_repository(inner: &EngineInner, report: &Report) -> Result<std::path::PathBuf> {
    let (owner, repo) = parse_repo_url(&report.repo_url)?;
    let settings = inner.provider.report();
    inner.repos.ensure_repository(&RepoRequest {
        provider: "git".to_string(),
        owner,
        repo,
        git_ref: report.git_ref.clone(),
        workspace: settings.workspace_dir.into(),
    })
}

fn create_runner(inner: &EngineInner, config: &ReportConfig) -> Result<AnyRunner> {
    inner.registry.create(&config.agent.agent_type)
}

fn agent_request(prompt: String, repo_path: &str, model: &str) -> ExecuteRequest {
    ExecuteRequest {
        prompt,
        work_dir: repo_path.into(),
        model: if model.is_empty() { None } else { Some(model.to_string()) },
        timeout: None,
        metadata: Default::default(),
    }
}

async fn run_structure_phase(
    inner: &EngineInner,
    cancel: &CancellationToken,
    report: &mut Report,
    config: &ReportConfig,
    repo_path: &str,
) -> Result<()> {
    report.status = ReportStatus::Analyzing;
    report.started_at = now_epoch();
    inner.store.save_report(report)?;

    let runner = create_runner(inner, config)?;
    let prompt = inner.prompts.structure_prompt(config, repo_path)?;
    let policy = inner.provider.report().retry;
    let response = execute_with_retry(
        &runner,
        cancel,
        &agent_request(prompt, repo_path, &config.agent.model),
        policy,
    )
    .await?;

    let parsed = structure::parse_structure(&response.content)?;
    structure::validate_structure(
        &parsed,
        config.structure.nested && config.structure.require_nested,
    )?;
    if config.structure.nested
        && parsed.sections.iter().all(|s| s.subsections.is_none())
    {
        // Accepted: a flat reply downgrades every top-level section to a leaf.
        warn!(report = %report.id, "nested structure requested but agent returned a flat one");
    }

    report.structure = serde_json::to_string(&parsed)
        .map_err(|e| Error::SchemaViolation(format!("structure serialize failed: {e}")))?;
    report.title = parsed.title.clone();
    report.total_sections = structure::leaf_count(&parsed);
    report.status = ReportStatus::Generating;
    inner.store.save_report(report)?;

    for row in structure::build_section_rows(&report.id, &parsed) {
        inner.store.create_section(&row)?;
    }

    info!(
        report = %report.id,
        leaves = report.total_sections,
        "structure persisted"
    );
    Ok(())
}

async fn run_section_phase(
    inner: &EngineInner,
    cancel: &CancellationToken,
    report: &mut Report,
    config: &ReportConfig,
    repo_path: &str,
) -> Result<()> {
    let runner = create_runner(inner, config)?;
    let extra_patterns = content::compile_extra_patterns(&config.output.style.extra_trailing_patterns);
    let leaves = inner.store.leaf_sections_by_report(&report.id)?;

    for mut section in leaves {
        if section.status == SectionStatus::Completed {
            continue;
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        section.status = SectionStatus::Running;
        section.error.clear();
        inner.store.update_section(&section)?;

        // Settings are re-read per section so live retry changes apply.
        let policy = inner.provider.report().retry;
        let prompt = inner
            .prompts
            .section_prompt(config, &report.title, &section, repo_path)?;
        let started = Instant::now();
        let outcome = execute_with_retry(
            &runner,
            cancel,
            &agent_request(prompt, repo_path, &config.agent.model),
            policy,
        )
        .await;

        match outcome {
            Ok(response) => {
                let (body, summary) = postprocess_section(&response.content, config, &extra_patterns);
                section.content = body;
                section.summary = summary;
                section.status = SectionStatus::Completed;
                section.duration_secs = started.elapsed().as_secs();
                inner.store.update_section(&section)?;

                report.current_section += 1;
                inner.store.save_report(report)?;
                info!(report = %report.id, section = %section.section_id, "section completed");
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                section.status = SectionStatus::Failed;
                section.error = e.to_string();
                section.duration_secs = started.elapsed().as_secs();
                inner.store.update_section(&section)?;
                warn!(
                    report = %report.id,
                    section = %section.section_id,
                    error = %e,
                    "section failed, continuing with the rest"
                );
            }
        }
    }

    Ok(())
}

/// Post-process a phase 2 response into `(content, summary)`.
fn postprocess_section(
    raw: &str,
    config: &ReportConfig,
    extra_patterns: &[regex::Regex],
) -> (String, String) {
    let body = content::parse_section_response(raw);

    let mut text = content::strip_fence_wrapper(&body.content);
    text = content::strip_leading_until_heading(&text);
    text = content::strip_trailing_meta(&text, extra_patterns);

    let summary = if body.summary_from_marker {
        body.summary
    } else {
        content::fallback_summary(&text)
    };
    let summary = content::truncate_summary(&summary, config.summary_max_length());

    (text, summary)
}

async fn run_summary_phase(
    inner: &EngineInner,
    cancel: &CancellationToken,
    report: &mut Report,
    config: &ReportConfig,
    repo_path: &str,
) -> Result<()> {
    let sections = inner.store.sections_by_report(&report.id)?;

    // Merge leaf contents in structural order.
    let body: Vec<&str> = sections
        .iter()
        .filter(|s| s.is_leaf && !s.content.is_empty())
        .map(|s| s.content.as_str())
        .collect();
    report.content = body.join("\n\n");
    inner.store.save_report(report)?;

    let runner = create_runner(inner, config)?;
    let prompt = inner.prompts.summary_prompt(config, &report.title, &sections)?;
    let policy = inner.provider.report().retry;
    let response = execute_with_retry(
        &runner,
        cancel,
        &agent_request(prompt, repo_path, &config.agent.model),
        policy,
    )
    .await?;

    let mut summary = content::strip_fence_wrapper(&response.content);
    summary = content::strip_leading_meta(&summary);
    summary = content::strip_trailing_meta(&summary, &[]);
    report.summary = summary.trim().to_string();
    inner.store.save_report(report)?;

    Ok(())
}
