use std::cmp::Reverse;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::Utc;
use once_cell::sync::OnceCell;
use tracing::Subscriber;
use tracing::subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt};

use crate::config::{TelemetrySettings, TraceSettings, project_dirs};

const TRACE_SUFFIX: &str = ".trace.jsonl";

static TRACE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static ACTIVE_TRACE_FILE: OnceCell<PathBuf> = OnceCell::new();
static TRACING_INITIALIZED: OnceCell<()> = OnceCell::new();

fn install_subscriber<S>(subscriber: S) -> Result<()>
where
    S: Subscriber + Send + Sync + 'static,
{
    if TRACING_INITIALIZED.get().is_some() {
        return Ok(());
    }

    subscriber::set_global_default(subscriber)?;
    let _ = TRACING_INITIALIZED.set(());
    Ok(())
}

/// Install the console subscriber, plus a JSON trace file when enabled.
pub fn init_tracing(service: &str, verbose: bool, telemetry: &TelemetrySettings) -> Result<()> {
    let default_level = if verbose {
        "sitepulse=debug"
    } else {
        "sitepulse=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let console = fmt::layer().with_target(false);

    match build_trace_file_layer(service, &telemetry.traces)? {
        Some((writer, guard, path)) => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(console)
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_writer(writer)
                        .with_filter(LevelFilter::DEBUG),
                );
            let _ = TRACE_GUARD.set(guard);
            let _ = ACTIVE_TRACE_FILE.set(path);
            install_subscriber(subscriber)
        }
        None => install_subscriber(tracing_subscriber::registry().with(env_filter).with(console)),
    }
}

/// Trace file written by this process, if trace export is enabled.
pub fn current_trace_file() -> Option<&'static PathBuf> {
    ACTIVE_TRACE_FILE.get()
}

fn build_trace_file_layer(
    service: &str,
    settings: &TraceSettings,
) -> Result<Option<(NonBlocking, WorkerGuard, PathBuf)>> {
    if !settings.enabled {
        return Ok(None);
    }

    let directory = resolve_trace_directory(settings)?;
    fs::create_dir_all(&directory)
        .with_context(|| format!("Failed to create trace directory {}", directory.display()))?;

    let (file, path) = create_trace_file(service, &directory)?;
    prune_old_traces(&directory, settings.max_files, &path)?;

    let (writer, guard) = tracing_appender::non_blocking(file);
    Ok(Some((writer, guard, path)))
}

fn resolve_trace_directory(settings: &TraceSettings) -> Result<PathBuf> {
    if let Some(dir) = &settings.directory {
        return Ok(dir.clone());
    }
    Ok(project_dirs()?.cache_dir().join("traces"))
}

fn create_trace_file(service: &str, directory: &Path) -> Result<(File, PathBuf)> {
    let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let mut candidate = directory.join(format!("{service}-{timestamp}{TRACE_SUFFIX}"));
    let mut counter = 0;
    while candidate.exists() {
        counter += 1;
        candidate = directory.join(format!("{service}-{timestamp}-{counter}{TRACE_SUFFIX}"));
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&candidate)
        .with_context(|| format!("Failed to open trace file {}", candidate.display()))?;
    Ok((file, candidate))
}

/// Keep at most `max_files` traces, counting `keep`.
fn prune_old_traces(directory: &Path, max_files: usize, keep: &Path) -> Result<()> {
    if max_files == 0 {
        return Ok(());
    }

    let mut entries: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in fs::read_dir(directory)
        .with_context(|| format!("Failed to read trace directory {}", directory.display()))?
    {
        let path = entry?.path();
        if path == keep || !path.is_file() {
            continue;
        }
        let is_trace = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(TRACE_SUFFIX));
        if !is_trace {
            continue;
        }
        let Ok(modified) = fs::metadata(&path).and_then(|meta| meta.modified()) else {
            continue;
        };
        entries.push((modified, path));
    }

    entries.sort_by_key(|(modified, _)| Reverse(*modified));
    for (_, path) in entries.into_iter().skip(max_files.saturating_sub(1)) {
        let _ = fs::remove_file(&path);
    }
    Ok(())
}
