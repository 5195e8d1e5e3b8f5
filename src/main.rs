use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use scopeview::agent::AgentRegistry;
use scopeview::channel::comment::GitHubProvider;
use scopeview::cli::{Cli, Command};
use scopeview::config::{Settings, SharedProvider};
use scopeview::dsl::loader::{
    REPORT_CONFIG_DIR, REVIEW_CONFIG_FILE, ReportConfigSet, find_review_config,
    load_report_configs_dir, load_rules_file,
};
use scopeview::error::{Error, Result};
use scopeview::recovery::{recover_reports, recover_reviews};
use scopeview::repo::{GitRepositoryManager, slugify};
use scopeview::report::engine::{EngineInner as ReportInner, parse_repo_url};
use scopeview::report::prompts::ReportPromptEngine;
use scopeview::report::{LogNotifier, ReportEngine, ReportTask};
use scopeview::review::engine::{EngineInner as ReviewInner, ReviewEngine};
use scopeview::review::{PrInfo, ReviewTask};
use scopeview::store::{JsonStore, ReportStore, now_epoch};

fn init_logging() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    let settings = match Settings::load(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli, settings).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, settings: Settings) -> Result<()> {
    let provider = SharedProvider::new(settings.clone());
    let registry = Arc::new(AgentRegistry::new(provider.clone()));
    let store = Arc::new(JsonStore::new(&settings.state_dir));

    match cli.command {
        Command::Validate {
            rules,
            repo,
            reports_dir,
            strict,
        } => validate(rules, &repo, reports_dir, strict),
        Command::Review {
            repo,
            rules,
            owner,
            name,
            git_ref,
            commit_sha,
            pr,
            pr_title,
            base_sha,
            language,
        } => {
            let repo_path = PathBuf::from(&repo);
            let rules_path = match rules {
                Some(path) => PathBuf::from(path),
                None => find_review_config(&repo_path)
                    .ok_or_else(|| Error::ConfigNotFound(repo_path.join(REVIEW_CONFIG_FILE)))?,
            };
            let rules = load_rules_file(&rules_path, false)?;

            let engine = ReviewEngine::start(ReviewInner {
                provider: provider.clone(),
                registry,
                store: store.clone(),
                git: Arc::new(GitHubProvider::new(&owner, &name)),
            });
            recover_reviews(&(store.clone() as Arc<dyn scopeview::store::ReviewStore>), &engine);

            let task = ReviewTask {
                review_id: format!("review-{}-{}", slugify(&repo), now_epoch()),
                repo_path,
                repo_url: String::new(),
                owner,
                name,
                git_ref,
                commit_sha,
                pr: (pr > 0).then(|| PrInfo {
                    number: pr,
                    title: pr_title,
                    body: String::new(),
                    base_sha,
                    changed_files: vec![],
                }),
                rules,
                rules_path: rules_path.display().to_string(),
                output_dir: String::new(),
                output_language: language,
                submitted_at: now_epoch(),
            };
            let review_id = task.review_id.clone();
            engine.submit(task)?;
            engine.drain().await;
            info!(review = %review_id, "review finished");
            Ok(())
        }
        Command::Report {
            repo_url,
            report_type,
            git_ref,
            id,
            reports_dir,
        } => {
            let configs = load_configs(reports_dir)?;
            let (owner, repo) = parse_repo_url(&repo_url)?;
            let report_id = id.unwrap_or_else(|| {
                format!("{}-{}-{report_type}", slugify(&owner), slugify(&repo))
            });

            let engine = start_report_engine(&provider, registry, store.clone(), configs, &repo_url)?;
            recover_reports(store.as_ref(), &engine);
            engine.submit(ReportTask {
                report_id: report_id.clone(),
                repo_url,
                git_ref,
                report_type,
            })?;
            engine.drain().await;

            print_report_outcome(store.as_ref(), &report_id)
        }
        Command::Resume {
            report_id,
            reports_dir,
        } => {
            let configs = load_configs(reports_dir)?;
            let report = store
                .get_report(&report_id)?
                .ok_or_else(|| Error::Store(format!("report '{report_id}' not found")))?;

            let engine =
                start_report_engine(&provider, registry, store.clone(), configs, &report.repo_url)?;
            engine.resume(&report_id)?;
            engine.drain().await;

            print_report_outcome(store.as_ref(), &report_id)
        }
    }
}

fn validate(
    rules: Option<String>,
    repo: &str,
    reports_dir: Option<String>,
    strict: bool,
) -> Result<()> {
    let repo_path = Path::new(repo);
    let rules_path = rules
        .map(PathBuf::from)
        .or_else(|| find_review_config(repo_path));
    match rules_path {
        Some(path) => {
            let config = load_rules_file(&path, strict)?;
            println!("rules ok: {} ({} rules)", path.display(), config.rules.len());
        }
        None => println!("no review rules found in {repo}"),
    }

    let reports_path = reports_dir
        .map(PathBuf::from)
        .unwrap_or_else(|| repo_path.join(REPORT_CONFIG_DIR));
    if reports_path.is_dir() {
        let configs = load_report_configs_dir(&reports_path)?;
        println!(
            "report configs ok: {} ({})",
            reports_path.display(),
            configs.ids().join(", ")
        );
    } else {
        println!("no report configs found in {}", reports_path.display());
    }
    Ok(())
}

fn load_configs(reports_dir: Option<String>) -> Result<ReportConfigSet> {
    let dir = reports_dir.unwrap_or_else(|| REPORT_CONFIG_DIR.to_string());
    load_report_configs_dir(Path::new(&dir))
}

fn start_report_engine(
    provider: &Arc<SharedProvider>,
    registry: Arc<AgentRegistry>,
    store: Arc<JsonStore>,
    configs: ReportConfigSet,
    repo_url: &str,
) -> Result<ReportEngine> {
    let (owner, repo) = parse_repo_url(repo_url)?;
    let base_url = repo_url
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .trim_end_matches(&format!("/{owner}/{repo}"))
        .trim_end_matches(&format!(":{owner}/{repo}"))
        .to_string();

    Ok(ReportEngine::start(ReportInner {
        provider: provider.clone(),
        registry,
        store,
        repos: Arc::new(GitRepositoryManager::new(&base_url)),
        configs,
        notifier: Arc::new(LogNotifier),
        prompts: ReportPromptEngine::new(None),
    }))
}

fn print_report_outcome(store: &dyn ReportStore, report_id: &str) -> Result<()> {
    match store.get_report(report_id)? {
        Some(report) => {
            println!(
                "report {report_id}: {} ({}/{} sections)",
                report.status.as_str(),
                report.current_section,
                report.total_sections
            );
            if !report.error.is_empty() {
                return Err(Error::Store(report.error));
            }
            Ok(())
        }
        None => Err(Error::Store(format!("report '{report_id}' not found"))),
    }
}
