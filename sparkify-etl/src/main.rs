//! sparkify-etl - Sparkify star-schema ETL
//!
//! - `run`: load the song and event-log directories into the configured backend
//! - `reset`: drop and recreate the target
//! - `stats`: print per-entity row counts of the target
//!
//! Exits non-zero when a run does not commit every unit.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sparkify_common::{Backend, EtlConfig};
use sparkify_etl::loaders::open_loader;
use sparkify_etl::models::{Entity, PipelineReport, UnitStatus};
use tracing::{info, warn};
use tracing_subscriber::{
    fmt::MakeWriter, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Command-line arguments for sparkify-etl
#[derive(Parser, Debug)]
#[command(name = "sparkify-etl")]
#[command(about = "Load Sparkify song metadata and user activity logs into a star schema")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline
    Run(RunArgs),
    /// Drop and recreate the target tables
    Reset(TargetArgs),
    /// Print per-entity row counts of the target
    Stats(TargetArgs),
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Config file (TOML); falls back to SPARKIFY_CONFIG, then the user config dir
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Target backend: transactional, warehouse or lake
    #[arg(short, long)]
    backend: Option<Backend>,

    /// SQLite database file (transactional, warehouse)
    #[arg(long, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Output directory (lake)
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Root directory of song-metadata JSON files
    #[arg(long, value_name = "DIR")]
    song_data: Option<PathBuf>,

    /// Root directory of event-log JSON files
    #[arg(long, value_name = "DIR")]
    log_data: Option<PathBuf>,

    /// Stop at the first failed unit
    #[arg(long)]
    fail_fast: bool,

    /// Source files per unit (one commit per unit)
    #[arg(long, value_name = "N")]
    files_per_unit: Option<usize>,
}

impl TargetArgs {
    fn resolve(&self) -> Result<EtlConfig> {
        let mut config =
            EtlConfig::resolve(self.config.as_deref()).context("Failed to load configuration")?;

        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(database) = &self.database {
            config.database = database.clone();
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        Ok(config)
    }
}

impl RunArgs {
    fn resolve(&self) -> Result<EtlConfig> {
        let mut config = self.target.resolve()?;

        if let Some(song_data) = &self.song_data {
            config.song_data = song_data.clone();
        }
        if let Some(log_data) = &self.log_data {
            config.log_data = log_data.clone();
        }
        if self.fail_fast {
            config.load.fail_fast = true;
        }
        if let Some(n) = self.files_per_unit {
            config.load.files_per_unit = n;
        }
        Ok(config)
    }
}

fn level_filter(level: &str) -> EnvFilter {
    format!("sparkify_etl={0},sparkify_common={0}", level).into()
}

/// Subscriber with a reloadable filter
///
/// The handle applies the configured level once it is known; it is `None`
/// when RUST_LOG already decides the filter.
fn build_subscriber<W>(
    writer: W,
) -> (impl tracing::Subscriber + Send + Sync + 'static, Option<FilterHandle>)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let from_env = EnvFilter::try_from_default_env().ok();
    let pinned = from_env.is_some();
    let (filter, handle) = reload::Layer::new(from_env.unwrap_or_else(|| level_filter("info")));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(writer));

    (subscriber, (!pinned).then_some(handle))
}

fn apply_level(filter: Option<&FilterHandle>, level: &str) {
    if let Some(filter) = filter {
        if let Err(e) = filter.reload(level_filter(level)) {
            warn!("Could not apply configured log level: {}", e);
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Before config resolution, which logs where the config came from
    let (subscriber, filter) = build_subscriber(std::io::stdout);
    subscriber.init();

    let config = match &cli.command {
        Command::Run(args) => args.resolve()?,
        Command::Reset(args) | Command::Stats(args) => args.resolve()?,
    };
    apply_level(filter.as_ref(), &config.logging.level);

    info!("Starting sparkify-etl {}", env!("CARGO_PKG_VERSION"));
    info!("Backend: {}", config.backend);

    match cli.command {
        Command::Run(_) => {
            let report = sparkify_etl::run_pipeline(&config)
                .await
                .context("Pipeline run failed")?;
            print_report(&report);

            if report.is_fully_committed() {
                Ok(ExitCode::SUCCESS)
            } else {
                warn!(
                    failed = report.failed_units().len(),
                    "Run is partial; rerun to retry the failed units"
                );
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Reset(_) => {
            let loader = open_loader(&config).await.context("Failed to open target")?;
            loader.reset().await.context("Reset failed")?;
            info!("Target reset");
            Ok(ExitCode::SUCCESS)
        }
        Command::Stats(_) => {
            let loader = open_loader(&config).await.context("Failed to open target")?;
            let counts = loader.counts().await.context("Failed to count rows")?;
            for entity in Entity::ALL {
                println!("{:<10} {:>10}", entity.table_name(), counts.get(entity));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_report(report: &PipelineReport) {
    println!("state: {:?}", report.state);
    println!(
        "{:<10} {:>10} {:>10} {:>10} {:>10}",
        "table", "emitted", "inserted", "updated", "duplicate"
    );
    for entity in Entity::ALL {
        println!(
            "{:<10} {:>10} {:>10} {:>10} {:>10}",
            entity.table_name(),
            report.emitted.get(entity),
            report.loaded.inserted.get(entity),
            report.loaded.updated.get(entity),
            report.loaded.duplicates.get(entity),
        );
    }
    println!("skipped records: {}", report.skipped);
    println!(
        "song plays: {} resolved, {} unresolved",
        report.resolved_songplays, report.unresolved_songplays
    );

    for unit in &report.units {
        match &unit.status {
            UnitStatus::Committed => {}
            UnitStatus::Failed { reason } => {
                println!("FAILED {} ({}): {}", unit.unit, unit.items.join(", "), reason)
            }
            UnitStatus::NotAttempted => {
                println!("NOT ATTEMPTED {} ({})", unit.unit, unit.items.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    /// In-memory log output
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_config_resolution_is_logged_then_level_applies() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("etl.toml");
        std::fs::write(&path, "[logging]\nlevel = \"warn\"\n").unwrap();

        let captured = Captured::default();
        let (subscriber, filter) = build_subscriber(captured.clone());

        tracing::subscriber::with_default(subscriber, || {
            let config = TargetArgs {
                config: Some(path.clone()),
                backend: None,
                database: None,
                output: None,
            }
            .resolve()
            .unwrap();
            apply_level(filter.as_ref(), &config.logging.level);
            info!("Visible only below warn");
        });

        // RUST_LOG set for the test run decides the filter on its own
        if filter.is_some() {
            let output = captured.text();
            assert!(output.contains("Loading configuration from"), "{}", output);
            assert!(!output.contains("Visible only below warn"), "{}", output);
        }
    }

    #[test]
    fn test_level_filter_covers_both_crates() {
        let filter = level_filter("debug").to_string();
        assert!(filter.contains("sparkify_etl=debug"));
        assert!(filter.contains("sparkify_common=debug"));
    }
}
