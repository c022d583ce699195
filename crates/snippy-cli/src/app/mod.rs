pub mod config;
pub mod demo;
pub mod generate;
pub mod telemetry;

use config::{AppConfig, Command};
use snippy::{Assignment, IdentityConfig, Observer, ServiceContext, SystemClock, ThreadRandom};
use std::{
    io::{self, Write},
    sync::Arc,
};

/// Runs the selected command, writing its output to stdout.
pub async fn run(config: AppConfig, observer: Arc<dyn Observer>) -> anyhow::Result<()> {
    match config.command {
        Command::ShortId { count } => {
            let context = production_context(&config.identity, observer)?;
            print_assignments(&generate::short_ids(&context, count).await?)
        }
        Command::Username {
            display_name,
            count,
        } => {
            let context = production_context(&config.identity, observer)?;
            let names = generate::usernames(&context, display_name.as_deref(), count).await?;
            print_assignments(&names)
        }
        Command::Demo {
            users,
            snippets,
            rounds,
        } => {
            let (context, counts) = demo::context(&config.identity, observer)?;
            let plan = demo::DemoPlan {
                users,
                snippets,
                rounds,
            };
            let report = demo::run(context, counts, plan).await?;
            let mut out = io::stdout().lock();
            serde_json::to_writer_pretty(&mut out, &report)?;
            writeln!(out)?;
            Ok(())
        }
    }
}

fn production_context(
    identity: &IdentityConfig,
    observer: Arc<dyn Observer>,
) -> snippy::Result<ServiceContext> {
    ServiceContext::with_components(identity, ThreadRandom, SystemClock, observer)
}

fn print_assignments(assignments: &[Assignment]) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    for assignment in assignments {
        writeln!(out, "{}", assignment.value)?;
    }
    let fallbacks = assignments.iter().filter(|a| a.is_fallback()).count();
    if fallbacks > 0 {
        #[cfg(feature = "tracing")]
        tracing::warn!(fallbacks, "some identifiers came from the fallback");
    }
    Ok(())
}
