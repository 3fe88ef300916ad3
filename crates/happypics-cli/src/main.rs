use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

mod client;
mod render;

use client::{Client, Outcome, Page, SessionCache, Toggles};

#[derive(Parser)]
#[command(name = "happypics", about = "HappyPics emotion detection CLI")]
struct Cli {
    /// Base URL of happypicsd
    #[arg(long, env = "HAPPYPICS_SERVER", default_value = "http://127.0.0.1:8501")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the dominant emotion in a JPEG or PNG photo
    Analyze {
        path: PathBuf,
    },
    /// List analyzed photos
    History,
    /// Choose which charts to show, then print them
    ///
    /// Without flags, prints the charts currently enabled. The flags given
    /// replace the whole selection; `--none` turns every chart off.
    Charts {
        #[arg(long)]
        confidence: bool,
        #[arg(long)]
        proportions: bool,
        #[arg(long)]
        trends: bool,
        #[arg(long, conflicts_with_all = ["confidence", "proportions", "trends"])]
        none: bool,
    },
    /// Delete every record in the current history
    Clear,
    /// Create an account (durable mode)
    Signup {
        email: String,
    },
    /// Log in (durable mode)
    Login {
        email: String,
    },
    /// Log out and reset this session
    Logout,
    /// Show service and session status
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let client = Client::new(&cli.server);
    let cache = SessionCache::default_location();
    let mut out = io::stdout().lock();

    match cli.command {
        Commands::Analyze { path } => {
            let upload =
                std::fs::read(&path).with_context(|| format!("cannot read {}", path.display()))?;
            let session = client.session(&cache)?;
            let reply = session.analyze(&upload)?;

            writeln!(out, "{}", reply.message)?;
            match &reply.outcome {
                Outcome::Detected { emotion, score, stored } => {
                    tracing::debug!(%emotion, score, stored, "analysis complete");
                    if !stored && reply.warning.is_none() {
                        writeln!(out, "(same photo as the last upload, not added to history)")?;
                    }
                }
                Outcome::NoFace => {}
                Outcome::Failed { reason } => tracing::debug!(%reason, "analysis failed"),
            }
            if let Some(warning) = &reply.warning {
                eprintln!("warning: {warning}");
            }
            print_page(&mut out, &reply.page)?;
        }
        Commands::History => {
            let page = client.session(&cache)?.page()?;
            render::history(&mut out, &page.history)?;
        }
        Commands::Charts {
            confidence,
            proportions,
            trends,
            none,
        } => {
            let session = client.session(&cache)?;
            let page = match requested_toggles(confidence, proportions, trends, none) {
                Some(toggles) => session.set_charts(toggles)?,
                None => session.page()?,
            };
            render::charts(&mut out, &page.charts)?;
        }
        Commands::Clear => {
            let cleared = client.session(&cache)?.clear()?;
            writeln!(out, "Removed {} record(s).", cleared.removed)?;
        }
        Commands::Signup { email } => {
            let password = read_password()?;
            let message = client.session(&cache)?.signup(&email, &password)?;
            writeln!(out, "{message}")?;
        }
        Commands::Login { email } => {
            let password = read_password()?;
            let page = client.session(&cache)?.login(&email, &password)?;
            let identity = page.identity.as_deref().unwrap_or(&email);
            writeln!(out, "Logged in as {identity}")?;
        }
        Commands::Logout => {
            client.session(&cache)?.logout()?;
            writeln!(out, "Logged out.")?;
        }
        Commands::Status => {
            let health = client.health()?;
            writeln!(out, "happypicsd {} ({} mode) at {}", health.version, health.mode, cli.server)?;
            if !health.models_loaded {
                writeln!(out, "emotion engine: not running")?;
            }
            writeln!(out, "active sessions: {}", health.sessions)?;
            match cache.load() {
                Some(id) => writeln!(out, "session: {id}")?,
                None => writeln!(out, "session: none")?,
            }
            if let Ok(page) = client.session(&cache)?.page() {
                match page.identity {
                    Some(identity) => writeln!(out, "logged in as {identity}")?,
                    None if page.mode == "durable" => writeln!(out, "not logged in")?,
                    None => {}
                }
                writeln!(out, "history: {} record(s)", page.history.len())?;
                writeln!(out, "charts: {}", enabled_charts(page.toggles))?;
            } else {
                writeln!(out, "not logged in")?;
            }
        }
    }

    Ok(())
}

fn print_page(out: &mut impl Write, page: &Page) -> Result<()> {
    render::history(out, &page.history)?;
    render::charts(out, &page.charts)?;
    Ok(())
}

/// The selection to send, or `None` to leave the current one alone.
fn requested_toggles(confidence: bool, proportions: bool, trends: bool, none: bool) -> Option<Toggles> {
    (none || confidence || proportions || trends).then_some(Toggles {
        confidence,
        proportions,
        trends,
    })
}

fn enabled_charts(toggles: Toggles) -> String {
    let names: Vec<&str> = [
        (toggles.confidence, "confidence"),
        (toggles.proportions, "proportions"),
        (toggles.trends, "trends"),
    ]
    .into_iter()
    .filter_map(|(on, name)| on.then_some(name))
    .collect();
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

/// `HAPPYPICS_PASSWORD` when set, otherwise a hidden prompt.
fn read_password() -> Result<String> {
    let password = match std::env::var("HAPPYPICS_PASSWORD") {
        Ok(p) => p,
        Err(_) => rpassword::prompt_password("Password: ").context("cannot read password")?,
    };
    if password.is_empty() {
        bail!("password must not be empty");
    }
    Ok(password)
}
