//! Streaming content comparison of two directories
//!
//! Used by the `mfcmp` binary to find which files of a directory differ from the same-named
//! files of another directory. Files are never loaded whole: each pair is read chunk by chunk,
//! comparing the current chunk while the next one is being read.
//!
//! # Layers
//!
//! - [`bufcmp`] - compares two byte regions
//! - [`streamcmp`] - double-buffered comparison of two byte streams
//! - [`filecmp`] - one file pair: size pre-check, opening, failure capture
//! - [`cmp`](mod@cmp) - one task per file of the source directory, joined into a [`cmp::Report`]
//!
//! A file pair never fails the whole run: missing or unreadable files are reported as errors
//! next to the mismatching ones. Only a source directory that cannot be listed is fatal.
//!
//! # Resource limits
//!
//! By default every file of the directory is compared at the same time. [`ThrottleConfig`]
//! bounds the number of open files and the rate of comparisons and reads, see the `throttle`
//! crate.

use std::io::IsTerminal;

use anyhow::{Context, anyhow};
use tracing::instrument;

pub mod bufcmp;
pub mod cmp;
pub mod config;
pub mod filecmp;
pub mod progress;
pub mod streamcmp;

#[cfg(test)]
mod testutils;

pub use config::{OutputConfig, RuntimeConfig, ThrottleConfig, TracingConfig};

static PROGRESS: std::sync::LazyLock<progress::Progress> =
    std::sync::LazyLock::new(progress::Progress::new);

#[must_use]
pub fn get_progress() -> &'static progress::Progress {
    &PROGRESS
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ProgressType {
    /// Progress bar on an interactive terminal, text updates otherwise
    #[default]
    Auto,
    ProgressBar,
    TextUpdates,
}

#[derive(Debug, Clone)]
pub struct ProgressSettings {
    pub progress_type: ProgressType,
    /// Human readable duration, e.g. "200ms" or "10s"
    pub progress_delay: Option<String>,
}

impl ProgressSettings {
    fn resolve(&self) -> anyhow::Result<(ProgressType, std::time::Duration)> {
        let progress_type = match self.progress_type {
            ProgressType::Auto => {
                if std::io::stderr().is_terminal() {
                    ProgressType::ProgressBar
                } else {
                    ProgressType::TextUpdates
                }
            }
            other => other,
        };
        let delay = match &self.progress_delay {
            Some(delay) => humantime::parse_duration(delay)
                .with_context(|| format!("invalid progress delay: {delay:?}"))?,
            None if progress_type == ProgressType::ProgressBar => {
                std::time::Duration::from_millis(200)
            }
            None => std::time::Duration::from_secs(10),
        };
        Ok((progress_type, delay))
    }
}

/// Compares two directories using the process-wide progress counters.
pub async fn cmp(
    src_dir: &std::path::Path,
    dst_dir: &std::path::Path,
    settings: &cmp::Settings,
    cancel: &streamcmp::CancelFlag,
) -> anyhow::Result<cmp::Report> {
    cmp::cmp(get_progress(), src_dir, dst_dir, settings, cancel).await
}

fn init_tracing(output: &OutputConfig, tracing_config: &TracingConfig) -> anyhow::Result<()> {
    let level = match (output.quiet, output.verbose) {
        (true, _) => "off",
        (false, 0) => "error",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    // stdout carries the report, logs never go there
    let res = match &tracing_config.debug_log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to create debug log file {path:?}"))?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    res.map_err(|err| anyhow!("failed to initialize logging: {err}"))
}

/// Refill schedule for a per-second limit; refills 10 times a second when the rate allows it.
fn replenish_schedule(per_second: usize) -> (usize, std::time::Duration) {
    if per_second >= 10 {
        (per_second / 10, std::time::Duration::from_millis(100))
    } else {
        (per_second, std::time::Duration::from_secs(1))
    }
}

fn setup_throttle(throttle_config: &ThrottleConfig) {
    if let Some(max_open_files) = throttle_config.max_open_files {
        throttle::set_max_open_files(max_open_files);
    }
    if throttle_config.ops_throttle > 0 {
        let (tokens, interval) = replenish_schedule(throttle_config.ops_throttle);
        throttle::init_ops_tokens(tokens);
        tokio::spawn(throttle::run_ops_replenish_thread(tokens, interval));
    }
    if throttle_config.iops_throttle > 0 {
        let (tokens, interval) = replenish_schedule(throttle_config.iops_throttle);
        throttle::init_iops_tokens(tokens);
        tokio::spawn(throttle::run_iops_replenish_thread(tokens, interval));
    }
}

#[instrument(skip(stop))]
async fn show_progress(
    progress_type: ProgressType,
    delay: std::time::Duration,
    mut stop: tokio::sync::oneshot::Receiver<()>,
) {
    let mut printer = progress::ProgressPrinter::new(get_progress());
    let bar = (progress_type == ProgressType::ProgressBar)
        .then(indicatif::ProgressBar::new_spinner);
    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut stop => break,
        }
        let status = printer.print();
        match &bar {
            Some(bar) => bar.set_message(status),
            None => eprintln!("{status}"),
        }
    }
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
}

/// Sets up logging, throttling and the tokio runtime, then runs `func` to completion.
///
/// Returns `None` if setup failed or `func` returned an error; the error has already been
/// reported on stderr unless `output.quiet` is set.
pub fn run<Fut, Summary, Error>(
    progress: Option<ProgressSettings>,
    output: OutputConfig,
    runtime: RuntimeConfig,
    throttle_config: ThrottleConfig,
    tracing_config: TracingConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Summary: std::fmt::Display,
    Error: std::fmt::Display,
    Fut: std::future::Future<Output = Result<Summary, Error>>,
{
    let setup = || -> anyhow::Result<_> {
        init_tracing(&output, &tracing_config)?;
        throttle_config.validate().map_err(|err| anyhow!(err))?;
        let progress = progress.as_ref().map(ProgressSettings::resolve).transpose()?;
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all();
        if runtime.max_workers > 0 {
            builder.worker_threads(runtime.max_workers);
        }
        if runtime.max_blocking_threads > 0 {
            builder.max_blocking_threads(runtime.max_blocking_threads);
        }
        let rt = builder.build().context("failed to start tokio runtime")?;
        Ok((rt, progress))
    };
    let (rt, progress) = match setup() {
        Ok(setup) => setup,
        Err(error) => {
            if !output.quiet {
                eprintln!("{error:#}");
            }
            return None;
        }
    };
    let res = rt.block_on(async move {
        setup_throttle(&throttle_config);
        let progress_task = progress.map(|(progress_type, delay)| {
            let (stop, stop_rx) = tokio::sync::oneshot::channel();
            let task = tokio::spawn(show_progress(progress_type, delay, stop_rx));
            (stop, task)
        });
        let res = func().await;
        if let Some((stop, task)) = progress_task {
            // the receiver only goes away if the progress task is already gone
            stop.send(()).ok();
            if let Err(error) = task.await {
                tracing::debug!("progress task failed: {}", &error);
            }
        }
        res
    });
    match res {
        Ok(summary) => {
            if output.print_summary || output.verbose > 0 {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            tracing::debug!("run failed: {:#}", &error);
            if !output.quiet {
                eprintln!("{error:#}");
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replenish_rates() {
        assert_eq!(
            replenish_schedule(1000),
            (100, std::time::Duration::from_millis(100))
        );
        assert_eq!(replenish_schedule(5), (5, std::time::Duration::from_secs(1)));
    }

    #[test]
    fn progress_delay_parsing() {
        let settings = ProgressSettings {
            progress_type: ProgressType::TextUpdates,
            progress_delay: Some("250ms".to_string()),
        };
        let (progress_type, delay) = settings.resolve().unwrap();
        assert_eq!(progress_type, ProgressType::TextUpdates);
        assert_eq!(delay, std::time::Duration::from_millis(250));
        let default_bar = ProgressSettings {
            progress_type: ProgressType::ProgressBar,
            progress_delay: None,
        };
        assert_eq!(
            default_bar.resolve().unwrap().1,
            std::time::Duration::from_millis(200)
        );
        let invalid = ProgressSettings {
            progress_type: ProgressType::TextUpdates,
            progress_delay: Some("soon".to_string()),
        };
        assert!(invalid.resolve().is_err());
    }
}
