//! rfidstub - simulated RFID readers for race timing clients
//!
//! Creates one virtual serial link per reader and reports tag reads on all of
//! them, either picked by the operator from the race roster or generated.

mod cli;
mod dump;
mod interactive;
mod settings;

use std::future::Future;
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use clap::Parser;
use rfid_sim::{
    GeneratorTrigger, InteractiveTrigger, RunSummary, Selector, Session, TagGenerator,
    TriggerSource,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::settings::Settings;

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so the menu owns stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rfidstub=info,rfid_protocol=info,rfid_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.apply(&mut settings).map_err(|e| anyhow!(e))?;

    // Installed before startup so Ctrl+C while links come up still cleans up
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    match cli.command.clone().unwrap_or_default() {
        Command::Run { race_id, .. } => {
            let Some(mut session) = start_session(&settings, race_id, shutdown.as_mut()).await?
            else {
                return Ok(());
            };
            let roster = session.roster().clone();
            let selector = if settings.track_sent {
                Selector::new(roster)
            } else {
                Selector::without_sent_tracking(roster)
            };
            let mut trigger =
                InteractiveTrigger::new(selector, interactive::spawn_stdin_reader())
                    .with_renderer(Box::new(interactive::render));
            drive(&mut session, &mut trigger, shutdown).await
        }
        Command::Generate { race_id, .. } => {
            let Some(mut session) = start_session(&settings, race_id, shutdown.as_mut()).await?
            else {
                return Ok(());
            };
            let generator = TagGenerator::new(settings.generator.discriminator);
            let mut trigger = GeneratorTrigger::new(generator, settings.generator.interval());
            info!(
                "Generating tags every {}ms",
                settings.generator.interval().as_millis()
            );
            drive(&mut session, &mut trigger, shutdown).await
        }
        Command::Dump { .. } => {
            dump::run(
                settings.dump_paths.clone(),
                settings.session.link.baud_rate,
                shutdown,
            )
            .await;
            Ok(())
        }
    }
}

/// Bring up the readers; `None` if interrupted first
async fn start_session<F>(
    settings: &Settings,
    race_id: u32,
    shutdown: F,
) -> anyhow::Result<Option<Session>>
where
    F: Future<Output = ()>,
{
    let source = settings.roster.clone().into_source();
    let session = Session::start_until(&settings.session, source.as_ref(), race_id, shutdown)
        .await
        .context("failed to start readers")?;

    for path in session.iter().flat_map(|s| s.client_paths()) {
        info!("Reader available at {}", path.display());
    }
    Ok(session)
}

/// Run until the trigger finishes or Ctrl+C, then close every reader
async fn drive<T, F>(session: &mut Session, trigger: &mut T, shutdown: F) -> anyhow::Result<()>
where
    T: TriggerSource,
    F: Future<Output = ()>,
{
    let summary = session.run(trigger, shutdown).await;
    session.close().await;
    report(&summary);

    if summary.failed_writes > 0 && summary.frames_written == 0 {
        return Err(anyhow!("no frame reached any reader"));
    }
    Ok(())
}

fn report(summary: &RunSummary) {
    info!(
        "Sent {} batch(es): {} frame(s) written, {} write failure(s), {} rejected",
        summary.batches, summary.frames_written, summary.failed_writes, summary.rejected
    );
    if summary.failed_writes > 0 {
        warn!("Some readers missed frames");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Ctrl+C handler unavailable: {}", e);
        std::future::pending::<()>().await;
    }
}
