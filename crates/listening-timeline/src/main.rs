mod bootstrap;

use anyhow::{Context, Result};
use clap::Parser;
use timeline_core::settings::Settings;
use timeline_core::time_utils::TimezoneHandler;
use timeline_data::projector::project_in;
use timeline_data::reader::{ingest_with, FileErrorPolicy, IngestOptions, PathFile};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::parse();

    bootstrap::setup_logging(settings.effective_log_level())?;

    tracing::info!("Listening timeline v{} starting", env!("CARGO_PKG_VERSION"));

    let tz = settings.resolve_timezone()?;
    tracing::info!("Using timezone {}", tz.name());

    let paths = bootstrap::collect_input_files(&settings.paths);
    if paths.is_empty() {
        tracing::warn!("No export files found");
    }
    let files: Vec<PathFile> = paths.into_iter().map(PathFile::new).collect();

    let options = IngestOptions {
        timezone: TimezoneHandler::with_tz(tz),
        read_timeout: settings.read_timeout(),
        on_file_error: if settings.skip_invalid_files {
            FileErrorPolicy::Skip
        } else {
            FileErrorPolicy::Abort
        },
    };

    let plays = ingest_with(files, &options)
        .await
        .context("failed to ingest listening history")?;

    let projection = project_in(&plays, tz);
    tracing::info!(
        "Projected {} plays across {} days",
        projection.points.len(),
        projection.x1 + 1
    );

    bootstrap::write_projection(&projection, settings.output.as_deref(), settings.pretty)?;

    Ok(())
}
