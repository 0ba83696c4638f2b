// src/lib.rs

pub mod api;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod errors;
pub mod kernel;
pub mod logging;
pub mod progress;
pub mod relay;
pub mod scoring;
pub mod service;
pub mod session;
pub mod types;

use std::future::Future;

use anyhow::{Result, bail};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::api::ApiResponse;
use crate::catalog::Catalog;
use crate::cli::{CliArgs, Command};
use crate::config::{ConfigFile, default_config_path, load_or_default};
use crate::relay::stdio::serve_stdio;
use crate::service::Backend;

/// High-level entry point used by `main.rs`.
///
/// Loads the config, builds the [`Backend`] for commands that need one, and
/// runs the chosen subcommand. Ctrl-C cancels scoring jobs and stops all
/// sessions before returning.
pub async fn run(args: CliArgs) -> Result<()> {
    let (config_path, required) = match &args.config {
        Some(path) => (path.clone(), true),
        None => (default_config_path(), false),
    };
    let cfg = load_or_default(&config_path, required)?;
    debug!(path = %config_path.display(), "configuration loaded");

    match args.command {
        Command::Check => {
            let catalog = Catalog::load_or_empty(&cfg.storage.catalog)?;
            print_check(&cfg, &catalog);
            Ok(())
        }
        Command::Repl { session } => {
            let backend = Backend::from_config(&cfg)?;
            let repl = {
                let backend = backend.clone();
                async move {
                    let id = backend.sessions.start(session).await?;
                    info!(session = %id, "session ready; reading JSON lines from stdin");
                    let relay = backend.connect(&id).await?;
                    let reason = serve_stdio(relay).await?;
                    debug!(?reason, "relay finished");
                    Ok::<(), anyhow::Error>(())
                }
            };
            with_shutdown(&backend, repl).await
        }
        Command::Score {
            problem,
            question,
            kind,
            answers,
            job_key,
        } => {
            let backend = Backend::from_config(&cfg)?;
            let body = json!({
                "questionId": question,
                "kind": kind,
                "submittedAnswers": answers,
                "jobKey": job_key,
            });
            let scoring = {
                let backend = backend.clone();
                async move { print_response(api::score(&backend, &problem, &body).await) }
            };
            with_shutdown(&backend, scoring).await
        }
        Command::Progress { problem } => {
            let backend = Backend::from_config(&cfg)?;
            print_response(api::get_progress(&backend, &problem))
        }
    }
}

/// Drive `work` until it finishes or Ctrl-C arrives, then shut the backend
/// down either way.
async fn with_shutdown<F>(backend: &Backend, work: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let result = tokio::select! {
        result = work => result,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Ctrl-C received"),
                Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
            }
            Ok(())
        }
    };
    backend.shutdown().await;
    result
}

fn print_response(response: ApiResponse) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&response.body)?);
    if !response.is_success() {
        bail!("request failed with status {}", response.status);
    }
    Ok(())
}

/// Dry-run summary of config and catalog.
fn print_check(cfg: &ConfigFile, catalog: &Catalog) {
    println!("kernelgate check");
    println!(
        "  kernel: {:?} via `{}` (interrupt {})",
        cfg.kernel.dialect,
        cfg.kernel.effective_program(),
        cfg.interrupt_signal
    );
    println!(
        "  relay: grace_period = {:?}, teardown_on = {:?}",
        cfg.grace_period, cfg.relay.teardown_on
    );
    println!(
        "  scoring: `{}` {:?}, search path var = {:?}",
        cfg.scoring.program, cfg.scoring.args, cfg.scoring.search_path_var
    );
    println!("  progress db: {}", cfg.storage.progress_db);
    println!();

    println!(
        "problems ({}) from {}:",
        catalog.problem.len(),
        cfg.storage.catalog.display()
    );
    for (p_id, problem) in &catalog.problem {
        match &problem.title {
            Some(title) => println!("  - {p_id}: {title}"),
            None => println!("  - {p_id}"),
        }
        for (q_id, question) in &problem.question {
            let explained = if question.explanation.is_some() {
                ", explained"
            } else {
                ""
            };
            println!("      {q_id}: {} answer line(s){explained}", question.answers.len());
        }
    }

    debug!("check complete (nothing executed)");
}
