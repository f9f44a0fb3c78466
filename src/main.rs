use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use rapport_lib::state::AppState;
use rapport_lib::types::JobId;

#[derive(Parser, Debug)]
#[command(name = "rapport", version)]
#[command(about = "Relationship reminders, recurring events and streaks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until interrupted (default)
    Serve,
    /// Create reminders for due contacts and send digests
    ScanReminders,
    /// Advance event statuses to match the clock
    UpdateStatuses,
    /// Notify participants of events starting soon
    EventReminders,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let state = Arc::new(AppState::initialize().context("Failed to initialize Rapport")?);

    let job = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            return rapport_lib::serve(state)
                .await
                .context("Scheduler stopped with an error");
        }
        Command::ScanReminders => JobId::ReminderScan,
        Command::UpdateStatuses => JobId::StatusUpdate,
        Command::EventReminders => JobId::EventReminders,
    };

    let summary = rapport_lib::run_job(state, job)
        .await
        .with_context(|| format!("Job {} failed", job))?;
    println!("{}: {}", job, summary);
    Ok(())
}
