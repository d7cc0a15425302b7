/// # blog-history CLI
///
/// Command-line glue around [`blog_history_core`]: load configuration, check
/// the target repository is vacant, prompt for credentials, log in, then run
/// the export and print its report.
///
/// All pipeline logic lives in `blog-history-core`; this module only wires
/// it to a terminal.
use crate::auth::{login, Credentials};
use crate::load_config::load_config;
use anyhow::{Context, Result};
use blog_history_core::client::ContentClient;
use blog_history_core::reconstruct::export_to_git;
use blog_history_core::sink::GitSink;
use clap::Parser;
use dialoguer::{Input, Password};
use std::path::PathBuf;

/// Replay a hosted blog's editorial history as a git repository.
#[derive(Parser, Debug)]
#[clap(
    name = "blog-history",
    version,
    about = "Rebuild every post and page revision of your blogs as dated git commits"
)]
pub struct Cli {
    /// Optional YAML config file; built-in defaults apply when omitted
    #[clap(long)]
    pub config: Option<PathBuf>,
}

/// Async entrypoint shared by `main` and the integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    let config = load_config(cli.config.as_deref())?;
    config.history.trace_loaded();

    // Fail before asking for anything if the run could never complete.
    GitSink::ensure_vacant(&config.history.repo_dir)
        .context("Refusing to overwrite an existing repository")?;

    let credentials = prompt_credentials()?;
    let session = login(&config.history.token_url, &config.oauth, &credentials)
        .await
        .context("Login failed")?;

    let client = ContentClient::from_config(&config.history)
        .context("Could not build the content client")?
        .with_session(session);

    println!("Export starting...");
    match export_to_git(&config.history, &client).await {
        Ok(report) => {
            tracing::info!(?report, "Export complete");
            println!(
                "Export complete: {} sites, {} posts, {} revisions, {} commits, {} attachments written to {}",
                report.sites,
                report.posts,
                report.revisions,
                report.commits,
                report.attachment_writes,
                config.history.repo_dir.display()
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Export failed");
            Err(anyhow::Error::new(e).context("Export failed"))
        }
    }
}

fn prompt_credentials() -> Result<Credentials> {
    let username: String = Input::new()
        .with_prompt("Username")
        .interact_text()
        .context("Could not read username")?;
    let password = Password::new()
        .with_prompt("Password")
        .interact()
        .context("Could not read password")?;
    Ok(Credentials { username, password })
}
