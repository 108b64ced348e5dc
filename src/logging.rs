use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::{Duration, SystemTime},
};

use anyhow::{Context, Result, anyhow};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{self, RollingFileAppender},
};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};
use uuid::Uuid;

use crate::config::{LoggingConfig, LoggingRotation};

const LOG_FILE_PREFIX: &str = "spl.log";
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Component name accepted in `logging.components`, with the event target it logs under and
/// the module path its spans carry.
const COMPONENTS: &[(&str, &str)] = &[
    ("validator", "spl::validation"),
    ("matcher", "spl::matcher"),
    ("deliberator", "spl::deliberator"),
    ("orchestrator", "spl::orchestrator"),
    ("server", "spl::server"),
    ("observability", "spl::observability"),
    ("logging", "spl::logging"),
];

/// Keeps the non-blocking writer alive; dropping it flushes pending log lines.
pub struct LoggingGuard {
    _worker_guard: WorkerGuard,
    run_id: String,
}

impl LoggingGuard {
    /// UUID v7 stamped on the startup line so one process's log lines can be grouped.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

pub fn init_tracing(logging_config: &LoggingConfig) -> Result<LoggingGuard> {
    if logging_config.dir.as_os_str().is_empty() {
        return Err(anyhow!("logging.dir cannot be empty"));
    }
    let env_filter = build_env_filter(&logging_config.filter, &logging_config.components)?;

    let log_dir = absolute_log_dir(&logging_config.dir)?;
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create logging directory {}", log_dir.display()))?;
    let sweep = sweep_expired_logs(
        &log_dir,
        LOG_FILE_PREFIX,
        logging_config.retention_days,
        SystemTime::now(),
    );

    let (writer, worker_guard) =
        tracing_appender::non_blocking(rolling_appender(&log_dir, &logging_config.rotation));
    let file_layer = fmt::layer()
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_current_span(true)
        .with_span_list(true)
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(env_filter);
    let stderr_layer = logging_config.stderr_warn_enabled.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(LevelFilter::WARN)
    });

    tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    let run_id = Uuid::now_v7().to_string();
    tracing::info!(
        target: "logging",
        run_id = %run_id,
        dir = %log_dir.display(),
        filter = %logging_config.filter,
        components = ?logging_config.components,
        rotation = ?logging_config.rotation,
        retention_days = logging_config.retention_days,
        "logging_initialized"
    );
    sweep.report();

    Ok(LoggingGuard {
        _worker_guard: worker_guard,
        run_id,
    })
}

/// `filter` is the base directive set; each component override adds directives for both the
/// component's event target and its module path.
fn build_env_filter(filter: &str, components: &BTreeMap<String, String>) -> Result<EnvFilter> {
    let base = filter.trim();
    if base.is_empty() {
        return Err(anyhow!("logging.filter cannot be empty"));
    }

    let mut directives = vec![base.to_string()];
    directives.extend(component_directives(components)?);
    let directives = directives.join(",");
    EnvFilter::try_new(&directives)
        .with_context(|| format!("failed to parse logging filter '{directives}'"))
}

fn component_directives(components: &BTreeMap<String, String>) -> Result<Vec<String>> {
    let mut directives = Vec::with_capacity(components.len() * 2);
    for (component, level) in components {
        let (target, module) = COMPONENTS
            .iter()
            .find(|(name, _)| *name == component.as_str())
            .ok_or_else(|| anyhow!("logging.components has unknown component '{component}'"))?;
        let level = LevelFilter::from_str(level.trim()).map_err(|_| {
            anyhow!("logging.components.{component} has invalid level '{level}'")
        })?;
        let level = level.to_string().to_lowercase();
        directives.push(format!("{target}={level}"));
        directives.push(format!("{module}={level}"));
    }
    Ok(directives)
}

fn rolling_appender(log_dir: &Path, rotation: &LoggingRotation) -> RollingFileAppender {
    match rotation {
        LoggingRotation::Daily => rolling::daily(log_dir, LOG_FILE_PREFIX),
        LoggingRotation::Hourly => rolling::hourly(log_dir, LOG_FILE_PREFIX),
    }
}

fn absolute_log_dir(dir: &Path) -> Result<PathBuf> {
    if dir.is_absolute() {
        return Ok(dir.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .context("failed to read current working directory for logging.dir")?;
    Ok(cwd.join(dir))
}

/// Result of one retention pass. Logged after the subscriber is installed.
#[derive(Debug, Default)]
struct RetentionSweep {
    removed: Vec<PathBuf>,
    warnings: Vec<String>,
}

impl RetentionSweep {
    fn report(&self) {
        if !self.removed.is_empty() {
            tracing::info!(
                target: "logging",
                removed = self.removed.len(),
                "expired_logs_removed"
            );
        }
        for warning in &self.warnings {
            tracing::warn!(target: "logging", warning = %warning, "logging_retention_warning");
        }
    }
}

/// Rolled files are `<prefix>.<date>`; anything else in the directory is left alone.
fn sweep_expired_logs(
    log_dir: &Path,
    prefix: &str,
    retention_days: usize,
    now: SystemTime,
) -> RetentionSweep {
    let retention = Duration::from_secs((retention_days as u64).saturating_mul(SECONDS_PER_DAY));
    let cutoff = now.checked_sub(retention).unwrap_or(SystemTime::UNIX_EPOCH);

    let mut sweep = RetentionSweep::default();
    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(err) => {
            sweep
                .warnings
                .push(format!("failed to scan {}: {err}", log_dir.display()));
            return sweep;
        }
    };

    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().starts_with(prefix) {
            continue;
        }
        let path = entry.path();
        match expired_file(&entry, cutoff) {
            Ok(false) => {}
            Ok(true) => match fs::remove_file(&path) {
                Ok(()) => sweep.removed.push(path),
                Err(err) => sweep
                    .warnings
                    .push(format!("failed to remove expired {}: {err}", path.display())),
            },
            Err(err) => sweep
                .warnings
                .push(format!("failed to stat {}: {err}", path.display())),
        }
    }
    sweep
}

fn expired_file(entry: &fs::DirEntry, cutoff: SystemTime) -> std::io::Result<bool> {
    let metadata = entry.metadata()?;
    Ok(metadata.is_file() && metadata.modified()? <= cutoff)
}
