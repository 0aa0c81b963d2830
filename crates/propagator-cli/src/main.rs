//! spec-propagator CLI
//!
//! The `propagate` command applies a specification document to every enabled
//! site in a registry, one commit per site, and prints a per-site summary.
//! The exit status is non-zero when any site failed.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};

use propagator_core::{
    ChangeValidator, Credentials, EditEngine, EditEngineConfig, JsonFileRegistry,
    PropagatorError, RemoteLocator, RepoId, RunConfiguration, SiteOrchestrator, SiteRegistry,
    ValidationPolicy, WorkspaceManager, DEFAULT_MAX_CONCURRENCY,
};
use propagator_llm::{AnthropicConfig, AnthropicProvider, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};

#[derive(Parser, Debug)]
#[command(name = "propagate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Apply a specification document to many site repositories", long_about = None)]
struct Cli {
    /// Compute and report changes without committing or pushing
    #[arg(long, env = "DRY_RUN", value_parser = clap::builder::FalseyValueParser::new())]
    dry_run: bool,

    /// Only process this repository (owner/name)
    #[arg(long, env = "SPECIFIC_SITE")]
    site: Option<String>,

    /// Site registry document
    #[arg(long, default_value = "sites.json")]
    sites: PathBuf,

    /// Specification document
    #[arg(long, default_value = "prd.md")]
    spec: PathBuf,

    /// Sites processed at once
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENCY)]
    max_concurrency: usize,

    /// Model used for edit passes
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Output token budget per edit pass
    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    /// GitHub token with repository read/write access
    #[arg(long, env = "GH_PAT", hide_env_values = true)]
    github_token: Option<String>,

    /// Anthropic API key
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: Option<String>,

    /// Directory for per-run log files
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Do not write a per-run log file
    #[arg(long)]
    no_log_file: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let log_file = (!cli.no_log_file)
        .then(|| propagator_core::run_log_path(&cli.log_dir, chrono::Local::now()));
    propagator_core::init_tracing(cli.json, level, log_file.as_deref())
        .with_context(|| format!("Failed to open log file in {}", cli.log_dir.display()))?;
    if let Some(path) = &log_file {
        info!(path = %path.display(), "Writing run log");
    }

    let config = build_run_configuration(&cli)?;
    let specification = load_specification(&cli.spec)?;
    let sites = JsonFileRegistry::new(&cli.sites)
        .load()
        .context("Failed to load site registry")?;
    let orchestrator = build_orchestrator(&cli, &config)?;

    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Stop requested, letting in-flight sites finish");
            stop.stop();
        }
    });

    let report = orchestrator
        .run(&sites, Arc::new(config), Arc::from(specification))
        .await
        .context("Propagation run could not start")?;

    println!("{}", report.render_summary());

    if report.has_failures() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Turn flags and environment into a validated [`RunConfiguration`].
fn build_run_configuration(cli: &Cli) -> Result<RunConfiguration> {
    let token = non_empty(&cli.github_token).ok_or_else(|| {
        PropagatorError::Configuration("a GitHub token is required (--github-token or GH_PAT)".into())
    })?;
    let api_key = non_empty(&cli.anthropic_api_key).ok_or_else(|| {
        PropagatorError::Configuration(
            "an Anthropic API key is required (--anthropic-api-key or ANTHROPIC_API_KEY)".into(),
        )
    })?;
    let site_filter = non_empty(&cli.site).map(RepoId::parse).transpose()?;

    let config = RunConfiguration::new(Credentials::new(token, api_key))
        .with_dry_run(cli.dry_run)
        .with_site_filter(site_filter)
        .with_max_concurrency(cli.max_concurrency);
    config.validate()?;
    Ok(config)
}

fn load_specification(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        PropagatorError::Configuration(format!(
            "cannot read specification {}: {e}",
            path.display()
        ))
    })?;
    if text.trim().is_empty() {
        return Err(PropagatorError::Configuration(format!(
            "specification {} is empty",
            path.display()
        ))
        .into());
    }
    Ok(text)
}

fn build_orchestrator(cli: &Cli, config: &RunConfiguration) -> Result<SiteOrchestrator> {
    let provider = AnthropicProvider::new(AnthropicConfig::new(
        config.credentials.model_api_key.clone(),
    ))
    .context("Failed to build model provider client")?;
    let engine = EditEngine::new(
        Arc::new(provider),
        EditEngineConfig {
            model: cli.model.clone(),
            max_tokens: cli.max_tokens,
        },
    );
    let validator = ChangeValidator::new(ValidationPolicy::default())?;
    let workspaces = WorkspaceManager::new(RemoteLocator::github(
        config.credentials.vcs_token.clone(),
    ));
    Ok(SiteOrchestrator::new(workspaces, engine, validator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["propagate"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_build_configuration() {
        let cli = parse(&[
            "--dry-run",
            "--site",
            "acme/site",
            "--max-concurrency",
            "5",
            "--github-token",
            "ghp_x",
            "--anthropic-api-key",
            "sk-x",
        ]);
        let config = build_run_configuration(&cli).unwrap();
        assert!(config.dry_run);
        assert_eq!(config.site_filter.unwrap().as_str(), "acme/site");
        assert_eq!(config.max_concurrency, 5);
        assert_eq!(config.credentials.vcs_token, "ghp_x");
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let cli = parse(&[
            "--max-concurrency",
            "0",
            "--github-token",
            "t",
            "--anthropic-api-key",
            "k",
        ]);
        assert!(build_run_configuration(&cli).is_err());
    }

    #[test]
    fn test_malformed_site_filter_is_rejected() {
        let cli = parse(&[
            "--site",
            "not-a-repo",
            "--github-token",
            "t",
            "--anthropic-api-key",
            "k",
        ]);
        assert!(build_run_configuration(&cli).is_err());
    }

    #[test]
    fn test_missing_or_empty_spec_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_specification(&dir.path().join("prd.md")).unwrap_err();
        assert!(missing.to_string().contains("configuration error"));

        let empty = dir.path().join("empty.md");
        std::fs::write(&empty, "  \n").unwrap();
        assert!(load_specification(&empty).is_err());

        let spec = dir.path().join("spec.md");
        std::fs::write(&spec, "# Spec\n").unwrap();
        assert_eq!(load_specification(&spec).unwrap(), "# Spec\n");
    }
}
