//! Startup recovery: re-enqueue work that was in flight when the process
//! last stopped. Enqueue failures are logged, never fatal — a full queue
//! just means the work waits for the next restart or manual resume.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::dsl::loader::load_rules_file;
use crate::report::{ReportEngine, ReportTask};
use crate::review::engine::ReviewEngine;
use crate::review::{PrInfo, ReviewTask};
use crate::store::{
    ReportStatus, ReportStore, ReviewRecord, ReviewStatus, ReviewStore, now_epoch,
};

/// Re-enqueue every non-terminal report. Returns how many were enqueued.
pub fn recover_reports(store: &dyn ReportStore, engine: &ReportEngine) -> usize {
    let mut enqueued = 0;
    for status in [
        ReportStatus::Pending,
        ReportStatus::Analyzing,
        ReportStatus::Generating,
    ] {
        let reports = match store.list_reports_by_status(status) {
            Ok(reports) => reports,
            Err(e) => {
                warn!(?status, error = %e, "failed to scan reports for recovery");
                continue;
            }
        };
        for report in reports {
            let task = ReportTask {
                report_id: report.id.clone(),
                repo_url: report.repo_url,
                git_ref: report.git_ref,
                report_type: report.report_type,
            };
            match engine.submit(task) {
                Ok(()) => {
                    info!(report = %report.id, ?status, "re-enqueued report");
                    enqueued += 1;
                }
                Err(e) => warn!(report = %report.id, error = %e, "could not re-enqueue report"),
            }
        }
    }
    enqueued
}

/// Re-enqueue pending and in-flight reviews by reloading their rules
/// config. Reviews whose config is gone are marked failed.
pub fn recover_reviews(store: &Arc<dyn ReviewStore>, engine: &ReviewEngine) -> usize {
    let mut enqueued = 0;
    for status in [ReviewStatus::Pending, ReviewStatus::Running] {
        let reviews = match store.list_reviews_by_status(status) {
            Ok(reviews) => reviews,
            Err(e) => {
                warn!(?status, error = %e, "failed to scan reviews for recovery");
                continue;
            }
        };
        for record in reviews {
            match rebuild_task(&record) {
                Ok(task) => match engine.submit(task) {
                    Ok(()) => {
                        info!(review = %record.review_id, ?status, "re-enqueued review");
                        enqueued += 1;
                    }
                    Err(e) => {
                        warn!(review = %record.review_id, error = %e, "could not re-enqueue review")
                    }
                },
                Err(e) => {
                    warn!(review = %record.review_id, error = %e, "marking unrecoverable review failed");
                    let mut failed = record.clone();
                    failed.status = ReviewStatus::Failed;
                    failed.error = format!("unrecoverable after restart: {e}");
                    if let Err(e) = store.save_review(&failed) {
                        warn!(review = %record.review_id, error = %e, "failed to persist review failure");
                    }
                }
            }
        }
    }
    enqueued
}

fn rebuild_task(record: &ReviewRecord) -> crate::error::Result<ReviewTask> {
    let rules = load_rules_file(Path::new(&record.rules_path), false)?;
    Ok(ReviewTask {
        review_id: record.review_id.clone(),
        repo_path: PathBuf::from(&record.repo_path),
        repo_url: record.repo_url.clone(),
        owner: record.owner.clone(),
        name: record.name.clone(),
        git_ref: record.git_ref.clone(),
        commit_sha: record.commit_sha.clone(),
        pr: (record.pr_number > 0).then(|| PrInfo {
            number: record.pr_number,
            ..Default::default()
        }),
        rules,
        rules_path: record.rules_path.clone(),
        output_dir: String::new(),
        output_language: String::new(),
        submitted_at: now_epoch(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentRegistry;
    use crate::agent::registry::StaticAgentConfig;
    use crate::channel::{GitProvider, ProviderComment};
    use crate::config::{ConfigProvider, Settings, SharedProvider};
    use crate::dsl::ReportConfigSet;
    use crate::report::engine::EngineInner as ReportInner;
    use crate::report::{LogNotifier, prompts::ReportPromptEngine};
    use crate::repo::LocalRepositoryManager;
    use crate::review::engine::EngineInner as ReviewInner;
    use crate::store::{MemoryStore, Report};

    struct NoopGit;
    impl GitProvider for NoopGit {
        fn list_comments(&self, _pr: u64) -> crate::error::Result<Vec<ProviderComment>> {
            Ok(vec![])
        }
        fn post_comment(&self, _pr: u64, _body: &str) -> crate::error::Result<()> {
            Ok(())
        }
        fn delete_comment(&self, _id: u64) -> crate::error::Result<()> {
            Ok(())
        }
    }

    fn provider() -> Arc<dyn ConfigProvider> {
        SharedProvider::new(Settings::default())
    }

    fn report_engine(store: Arc<MemoryStore>, tmp: &tempfile::TempDir) -> ReportEngine {
        ReportEngine::start(ReportInner {
            provider: provider(),
            registry: Arc::new(AgentRegistry::new(Arc::new(StaticAgentConfig::default()))),
            store,
            repos: Arc::new(LocalRepositoryManager::new(tmp.path())),
            configs: ReportConfigSet::default(),
            notifier: Arc::new(LogNotifier),
            prompts: ReportPromptEngine::new(None),
        })
    }

    fn review_engine(store: Arc<MemoryStore>) -> ReviewEngine {
        ReviewEngine::start(ReviewInner {
            provider: provider(),
            registry: Arc::new(AgentRegistry::new(Arc::new(StaticAgentConfig::default()))),
            store,
            git: Arc::new(NoopGit),
        })
    }

    #[tokio::test]
    async fn test_recover_reports_enqueues_non_terminal_only() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());

        for (id, status) in [
            ("p", ReportStatus::Pending),
            ("a", ReportStatus::Analyzing),
            ("g", ReportStatus::Generating),
            ("c", ReportStatus::Completed),
            ("f", ReportStatus::Failed),
        ] {
            let mut report = Report::new(id, "https://github.com/acme/app", "main", "wiki");
            report.status = status;
            store.create_report(&report).unwrap();
        }

        let engine = report_engine(store.clone(), &tmp);
        let enqueued = recover_reports(store.as_ref(), &engine);
        assert_eq!(enqueued, 3);
        engine.stop().await;
    }

    #[tokio::test]
    async fn test_recover_reviews_reloads_rules_or_fails_record() {
        let tmp = tempfile::tempdir().unwrap();
        let rules_path = tmp.path().join("rules.yaml");
        std::fs::write(
            &rules_path,
            "version: \"1\"\nrules:\n  - id: sec\n    agent:\n      type: mock\n    goals:\n      areas: [security-vulnerabilities]\n",
        )
        .unwrap();

        let store = Arc::new(MemoryStore::new());
        let recoverable = ReviewRecord {
            review_id: "ok".into(),
            status: ReviewStatus::Pending,
            repo_path: tmp.path().display().to_string(),
            rules_path: rules_path.display().to_string(),
            pr_number: 4,
            ..Default::default()
        };
        let unrecoverable = ReviewRecord {
            review_id: "gone".into(),
            status: ReviewStatus::Running,
            rules_path: "/nonexistent/rules.yaml".into(),
            ..Default::default()
        };
        let terminal = ReviewRecord {
            review_id: "done".into(),
            status: ReviewStatus::Completed,
            ..Default::default()
        };
        store.save_review(&recoverable).unwrap();
        store.save_review(&unrecoverable).unwrap();
        store.save_review(&terminal).unwrap();

        let engine = review_engine(store.clone());
        let dyn_store: Arc<dyn ReviewStore> = store.clone();
        let enqueued = recover_reviews(&dyn_store, &engine);
        assert_eq!(enqueued, 1);
        engine.stop().await;

        let gone = store.get_review("gone").unwrap().unwrap();
        assert_eq!(gone.status, ReviewStatus::Failed);
        assert!(gone.error.contains("unrecoverable after restart"));
        // Terminal records are untouched.
        assert_eq!(
            store.get_review("done").unwrap().unwrap().status,
            ReviewStatus::Completed
        );
    }
}
