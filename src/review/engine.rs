//! The review engine: a bounded worker pool running one execution per
//! rule, with optional multi-run merging, history-aware comparison, a
//! severity floor, and multi-channel publication.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::{
    AgentRegistry, AnyRunner, ExecuteRequest, ExecuteResponse, RetryPolicy, execute_with_retry,
};
use crate::channel::{GitProvider, PublishOptions, Publisher, build_channels, effective_format};
use crate::channel::ChannelFormat;
use crate::config::ConfigProvider;
use crate::dsl::ReviewRule;
use crate::dsl::schema::{build_json_schema, severity_rank};
use crate::error::{Error, Result};
use crate::prompt::format::format_instructions;
use crate::prompt::{BuildContext, build_spec, render};
use crate::report::structure::extract_json_object;
use crate::store::{ReviewRecord, ReviewStatus, ReviewStore, now_epoch};

use super::{ReviewResult, ReviewTask};

pub const QUEUE_CAPACITY: usize = 100;

pub struct EngineInner {
    pub provider: Arc<dyn ConfigProvider>,
    pub registry: Arc<AgentRegistry>,
    pub store: Arc<dyn ReviewStore>,
    pub git: Arc<dyn GitProvider>,
}

pub struct ReviewEngine {
    tx: mpsc::Sender<ReviewTask>,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    inner: Arc<EngineInner>,
}

impl ReviewEngine {
    pub fn start(inner: EngineInner) -> Self {
        let inner = Arc::new(inner);
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel::<ReviewTask>(QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));

        let worker_count = inner.provider.review().workers;
        let workers = (0..worker_count)
            .map(|worker| {
                let inner = inner.clone();
                let cancel = cancel.clone();
                let rx = rx.clone();
                tokio::spawn(async move {
                    loop {
                        let task = { rx.lock().await.recv().await };
                        let Some(task) = task else { break };
                        info!(worker, review = %task.review_id, "review task picked up");
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
    pub fn submit(&self, task: ReviewTask) -> Result<()> {
        self.tx.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::QueueFull,
            mpsc::error::TrySendError::Closed(_) => Error::Cancelled,
        })
    }

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

async fn run_task(inner: &EngineInner, cancel: &CancellationToken, task: &ReviewTask) {
    let mut record = ReviewRecord {
        review_id: task.review_id.clone(),
        status: ReviewStatus::Running,
        repo_path: task.repo_path.display().to_string(),
        rules_path: task.rules_path.clone(),
        repo_url: task.repo_url.clone(),
        owner: task.owner.clone(),
        name: task.name.clone(),
        git_ref: task.git_ref.clone(),
        commit_sha: task.commit_sha.clone(),
        pr_number: task.pr.as_ref().map(|p| p.number).unwrap_or(0),
        error: String::new(),
        created_at: task.submitted_at,
    };
    if let Err(e) = inner.store.save_review(&record) {
        warn!(review = %task.review_id, error = %e, "failed to persist review start");
    }

    // Rules run sequentially; one rule's failure never aborts the rest.
    let mut failures = Vec::new();
    for rule in &task.rules.rules {
        if cancel.is_cancelled() {
            failures.push("cancelled".to_string());
            break;
        }
        if let Err(e) = run_rule(inner, cancel, task, rule).await {
            warn!(review = %task.review_id, rule = %rule.id, error = %e, "rule failed");
            failures.push(format!("{}: {e}", rule.id));
        }
    }

    record.status = if failures.iter().any(|f| f == "cancelled") {
        ReviewStatus::Failed
    } else {
        ReviewStatus::Completed
    };
    record.error = failures.join("; ");
    if let Err(e) = inner.store.save_review(&record) {
        warn!(review = %task.review_id, error = %e, "failed to persist review end");
    }
}

/// Prompt format: the first configured channel decides which instructions
/// are appended; rules without channels default to Markdown.
fn prompt_format(rule: &ReviewRule) -> ChannelFormat {
    rule.output
        .channels
        .first()
        .map(effective_format)
        .unwrap_or(ChannelFormat::Markdown)
}

fn build_context(task: &ReviewTask, previous_review: String) -> BuildContext {
    let pr = task.pr.clone().unwrap_or_default();
    BuildContext {
        repo_url: task.repo_url.clone(),
        repo_name: if task.owner.is_empty() {
            task.name.clone()
        } else {
            format!("{}/{}", task.owner, task.name)
        },
        git_ref: task.git_ref.clone(),
        base_sha: pr.base_sha,
        commit_sha: task.commit_sha.clone(),
        pr_number: pr.number,
        pr_title: pr.title,
        pr_description: pr.body,
        changed_files: pr.changed_files,
        output_language: task.output_language.clone(),
        previous_review,
    }
}

async fn run_rule(
    inner: &EngineInner,
    cancel: &CancellationToken,
    task: &ReviewTask,
    rule: &ReviewRule,
) -> Result<()> {
    let history_enabled = rule.history_compare_enabled();
    let pr_id = task.pr_id();

    let previous = if history_enabled && !pr_id.is_empty() {
        inner.store.previous_rule_result(&pr_id, &rule.id)?.unwrap_or_default()
    } else {
        String::new()
    };

    let spec = build_spec(rule, &build_context(task, previous));
    let schema = build_json_schema(rule.extra_fields(), history_enabled);
    let format = prompt_format(rule);
    let mut prompt = render(&spec);
    prompt.push_str(&format_instructions(format, &schema, &spec.constraints.language));

    let runner = inner.registry.create(&rule.agent.agent_type)?;
    let policy = inner.provider.review().retry;

    let outcome = if rule.multi_run_active() {
        run_multi(&runner, cancel, rule, &prompt, task, policy).await
    } else {
        execute_with_retry(&runner, cancel, &request(task, &prompt, &rule.agent.model), policy)
            .await
    };

    let result = match outcome {
        Ok(response) => build_result(rule, &runner, response),
        Err(Error::Cancelled) => return Err(Error::Cancelled),
        Err(e) => {
            // Exhausted or fatal: an error result still goes through
            // publication so every channel sees the failure.
            ReviewResult::failed(&rule.id, &rule.agent.agent_type, e.to_string())
        }
    };

    let published = publish(inner, task, rule, &result);

    // Channel failures never block persistence: the next run's history
    // comparison needs this result either way.
    if result.error.is_none() && !pr_id.is_empty() {
        inner.store.save_rule_result(&pr_id, &rule.id, &result.text)?;
    }

    published?;
    match &result.error {
        Some(e) => Err(Error::AgentExecution(e.clone())),
        None => Ok(()),
    }
}

fn request(task: &ReviewTask, prompt: &str, model: &str) -> ExecuteRequest {
    ExecuteRequest {
        prompt: prompt.to_string(),
        work_dir: task.repo_path.clone(),
        model: if model.is_empty() { None } else { Some(model.to_string()) },
        timeout: None,
        metadata: HashMap::new(),
    }
}

/// Execute the rule N times with the per-run model list cycled, then merge
/// with `merge_model` (or the rule's model). The merged output is an
/// ordinary result subject to the normal publication path.
async fn run_multi(
    runner: &AnyRunner,
    cancel: &CancellationToken,
    rule: &ReviewRule,
    prompt: &str,
    task: &ReviewTask,
    policy: RetryPolicy,
) -> Result<ExecuteResponse> {
    let multi = rule.multi_run.as_ref().expect("multi_run checked by caller");

    let mut outputs = Vec::with_capacity(multi.runs as usize);
    for run in 0..multi.runs as usize {
        let model = if multi.models.is_empty() {
            rule.agent.model.clone()
        } else {
            multi.models[run % multi.models.len()].clone()
        };
        let response =
            execute_with_retry(runner, cancel, &request(task, prompt, &model), policy).await?;
        outputs.push(response);
    }

    let merge_model = if multi.merge_model.is_empty() {
        rule.agent.model.clone()
    } else {
        multi.merge_model.clone()
    };
    let merge = merge_prompt(prompt, &outputs);
    execute_with_retry(runner, cancel, &request(task, &merge, &merge_model), policy).await
}

/// Merge prompt: the original instructions followed by each run's raw
/// output, asking for one deduplicated result in the same format.
fn merge_prompt(original_prompt: &str, outputs: &[ExecuteResponse]) -> String {
    let mut prompt = format!(
        "You are merging {} independent review results produced for the same \
         change request by the instructions below. Combine them into a single \
         review in the same output format: keep the union of distinct findings, \
         deduplicate findings that share a title and location, and keep the \
         most severe duplicate.\n\n---\n\nOriginal instructions:\n\n{}\n",
        outputs.len(),
        original_prompt,
    );
    for (i, output) in outputs.iter().enumerate() {
        prompt.push_str(&format!("\n## Run {}\n\n{}\n", i + 1, output.content));
    }
    prompt
}

/// Turn a successful agent response into a result: parse a structured body
/// when one is present and apply the severity floor to its findings.
fn build_result(rule: &ReviewRule, runner: &AnyRunner, response: ExecuteResponse) -> ReviewResult {
    use crate::agent::ModelRunner;

    let mut data = parse_data(&response.content);
    apply_severity_floor(&mut data, &rule.constraints.min_report);

    ReviewResult {
        reviewer_id: rule.id.clone(),
        data,
        text: response.content,
        agent_name: runner.name().to_string(),
        model_name: response.model,
        error: None,
    }
}

/// Best-effort structured parse: the first balanced JSON object, if any.
/// Markdown responses legitimately yield no data.
fn parse_data(content: &str) -> HashMap<String, Value> {
    let Ok(json) = extract_json_object(content) else {
        return HashMap::new();
    };
    match serde_json::from_str::<serde_json::Map<String, Value>>(json) {
        Ok(map) => map.into_iter().collect(),
        Err(_) => HashMap::new(),
    }
}

/// Drop findings below the configured floor. Findings whose severity is
/// missing or unknown are kept.
fn apply_severity_floor(data: &mut HashMap<String, Value>, min_report: &str) {
    let Some(min_rank) = severity_rank(min_report) else {
        return;
    };
    if let Some(Value::Array(findings)) = data.get_mut("findings") {
        findings.retain(|finding| {
            finding
                .get("severity")
                .and_then(Value::as_str)
                .and_then(severity_rank)
                .map(|rank| rank >= min_rank)
                .unwrap_or(true)
        });
    }
}

fn publish(
    inner: &EngineInner,
    task: &ReviewTask,
    rule: &ReviewRule,
    result: &ReviewResult,
) -> Result<()> {
    let channels = build_channels(&rule.output.channels, inner.git.clone())?;
    let publisher = Publisher::new(channels);

    let output_dir = if task.output_dir.is_empty() {
        inner.provider.review().output_dir
    } else {
        task.output_dir.clone()
    };
    let pr = task.pr.clone().unwrap_or_default();
    let opts = PublishOptions {
        review_id: task.review_id.clone(),
        repo_url: task.repo_url.clone(),
        repo_ref: task.git_ref.clone(),
        repo_path: task.repo_path.display().to_string(),
        pr_number: pr.number,
        pr_title: pr.title,
        agent_name: result.agent_name.clone(),
        model_name: result.model_name.clone(),
        output_dir,
        overwrite: false,
        marker_prefix: String::new(),
    };

    publisher.publish(result, &opts)
}
