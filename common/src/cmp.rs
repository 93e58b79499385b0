use std::path::Path;

use anyhow::{Context, Result};
use enum_map::{Enum, EnumMap};
use tokio::io::AsyncWriteExt;
use tracing::{Level, event, instrument};

use crate::filecmp::{self, FilePairJob, MismatchReason, Outcome};
use crate::progress;
use crate::streamcmp::CancelFlag;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// One task per file, all started at once
    #[default]
    Concurrent,
    /// One file at a time, in directory order
    Sequential,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct Settings {
    pub file: filecmp::Settings,
    pub mode: Mode,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Enum)]
pub enum CompareResult {
    Same,
    SizeDifferent,
    ContentDifferent,
    Failed,
}

impl From<&Outcome> for CompareResult {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Match => CompareResult::Same,
            Outcome::Mismatch {
                reason: MismatchReason::Size,
                ..
            } => CompareResult::SizeDifferent,
            Outcome::Mismatch {
                reason: MismatchReason::Content,
                ..
            } => CompareResult::ContentDifferent,
            Outcome::Error { .. } => CompareResult::Failed,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub results: EnumMap<CompareResult, u64>,
}

impl Summary {
    /// Number of file pairs compared, whatever their outcome.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.results.values().sum()
    }

    #[must_use]
    pub fn differences(&self) -> u64 {
        self.results[CompareResult::SizeDifferent] + self.results[CompareResult::ContentDifferent]
    }

    #[must_use]
    pub fn failures(&self) -> u64 {
        self.results[CompareResult::Failed]
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for (result, &count) in &self.results {
            writeln!(f, "{:?}: {}", result, count)?;
        }
        Ok(())
    }
}

/// Files that differ or could not be compared, plus counts over every compared file.
#[derive(Clone, Debug, Default)]
pub struct Report {
    pub entries: Vec<Outcome>,
    pub summary: Summary,
}

impl Report {
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        outcomes
            .into_iter()
            .fold(Report::default(), |mut report, outcome| {
                report.summary.results[CompareResult::from(&outcome)] += 1;
                if !outcome.is_match() {
                    report.entries.push(outcome);
                }
                report
            })
    }

    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.entries.iter().filter_map(Outcome::report_line)
    }
}

#[derive(Clone)]
pub struct LogWriter {
    log_opt: Option<
        std::sync::Arc<
            tokio::sync::Mutex<tokio::io::BufWriter<Box<dyn tokio::io::AsyncWrite + Send + Unpin>>>,
        >,
    >,
}

impl LogWriter {
    /// Writes to `log_path_opt` if given (the file must not exist yet), otherwise to stdout
    /// when `use_stdout` is set, otherwise nowhere.
    pub async fn new(log_path_opt: Option<&Path>, use_stdout: bool) -> Result<Self> {
        let sink: Box<dyn tokio::io::AsyncWrite + Send + Unpin> = if let Some(log_path) =
            log_path_opt
        {
            let log_file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(log_path)
                .await
                .with_context(|| format!("Failed to open log file: {:?}", log_path))?;
            Box::new(log_file)
        } else if use_stdout {
            Box::new(tokio::io::stdout())
        } else {
            return Ok(Self { log_opt: None });
        };
        let log = std::sync::Arc::new(tokio::sync::Mutex::new(tokio::io::BufWriter::new(sink)));
        Ok(Self { log_opt: Some(log) })
    }

    pub async fn log_report(&self, report: &Report) -> Result<()> {
        for line in report.lines() {
            self.write(&format!("{line}\n")).await?;
        }
        Ok(())
    }

    async fn write(&self, msg: &str) -> Result<()> {
        if let Some(log) = &self.log_opt {
            let mut log = log.lock().await;
            log.write_all(msg.as_bytes())
                .await
                .context("Failed to write to log file")?;
        }
        Ok(())
    }

    pub async fn flush(&self) -> Result<()> {
        if let Some(log) = &self.log_opt {
            let mut log = log.lock().await;
            log.flush().await.context("Failed to flush log file")?;
        }
        Ok(())
    }
}

/// Pairs every entry of `src_dir` (non-recursively) with the same name under `dst_dir`.
#[instrument]
pub async fn list_jobs(src_dir: &Path, dst_dir: &Path) -> Result<Vec<FilePairJob>> {
    let mut entries = tokio::fs::read_dir(src_dir)
        .await
        .with_context(|| format!("cannot open directory {:?} for reading", src_dir))?;
    let mut jobs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed traversing directory {:?}", src_dir))?
    {
        jobs.push(FilePairJob::new(src_dir, dst_dir, &entry.file_name()));
    }
    Ok(jobs)
}

async fn cmp_sequential(
    prog_track: &progress::Progress,
    jobs: &[FilePairJob],
    settings: &filecmp::Settings,
    cancel: &CancelFlag,
) -> Vec<Outcome> {
    let mut outcomes = Vec::with_capacity(jobs.len());
    for job in jobs {
        outcomes.push(filecmp::cmp_file(prog_track, job, settings, cancel).await);
    }
    outcomes
}

/// Runs `worker` on every job as its own task and waits for all of them.
///
/// Each job keeps the slot of its task handle, so a task that panics or is aborted turns into
/// an error outcome for that job only.
async fn fork_join<W, Fut>(jobs: &[FilePairJob], worker: W) -> Vec<Outcome>
where
    W: Fn(FilePairJob) -> Fut,
    Fut: std::future::Future<Output = Outcome> + Send + 'static,
{
    let handles: Vec<_> = jobs
        .iter()
        .map(|job| tokio::spawn(worker(job.clone())))
        .collect();
    let mut outcomes = Vec::with_capacity(jobs.len());
    for (handle, job) in handles.into_iter().zip(jobs) {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(error) => {
                event!(
                    Level::ERROR,
                    "comparing {:?} did not complete: {}",
                    &job.src,
                    &error
                );
                Outcome::Error {
                    path: job.src.clone(),
                    message: format!("comparison task failed: {error}"),
                }
            }
        };
        outcomes.push(outcome);
    }
    outcomes
}

async fn cmp_concurrent(
    prog_track: &'static progress::Progress,
    jobs: &[FilePairJob],
    settings: &filecmp::Settings,
    cancel: &CancelFlag,
) -> Vec<Outcome> {
    let settings = *settings;
    fork_join(jobs, |job| {
        let cancel = cancel.clone();
        async move { filecmp::cmp_file(prog_track, &job, &settings, &cancel).await }
    })
    .await
}

/// Compares every file of `src_dir` with the same-named file of `dst_dir`.
///
/// Only failing to list `src_dir` is an error; anything going wrong with a single file is
/// reported in the returned [`Report`].
#[instrument(skip(prog_track, cancel))]
pub async fn cmp(
    prog_track: &'static progress::Progress,
    src_dir: &Path,
    dst_dir: &Path,
    settings: &Settings,
    cancel: &CancelFlag,
) -> Result<Report> {
    let jobs = list_jobs(src_dir, dst_dir).await?;
    event!(Level::DEBUG, "comparing {} files", jobs.len());
    let outcomes = match settings.mode {
        Mode::Sequential => cmp_sequential(prog_track, &jobs, &settings.file, cancel).await,
        Mode::Concurrent => cmp_concurrent(prog_track, &jobs, &settings.file, cancel).await,
    };
    let report = Report::from_outcomes(outcomes);
    event!(
        Level::DEBUG,
        "{} of {} files differ or failed",
        report.entries.len(),
        report.summary.total()
    );
    Ok(report)
}

#[cfg(test)]
mod cmp_tests {
    use std::collections::BTreeSet;
    use std::sync::LazyLock;

    use enum_map::enum_map;
    use tracing_test::traced_test;

    use super::*;
    use crate::testutils;

    static PROGRESS: LazyLock<progress::Progress> = LazyLock::new(progress::Progress::new);

    const CHUNK: usize = 64;

    fn settings(mode: Mode) -> Settings {
        Settings {
            file: filecmp::Settings {
                chunk_size: CHUNK,
                ..Default::default()
            },
            mode,
        }
    }

    fn names(report: &Report) -> BTreeSet<String> {
        report
            .entries
            .iter()
            .map(|outcome| match outcome {
                Outcome::Mismatch { path, .. } | Outcome::Error { path, .. } => path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                Outcome::Match => panic!("matches are not reported"),
            })
            .collect()
    }

    fn expected_names() -> BTreeSet<String> {
        [
            "diff_size",
            "diff_first",
            "diff_boundary",
            "missing0",
            "missing1",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    async fn run(tmp_dir: &Path, mode: Mode) -> Result<Report> {
        cmp(
            &PROGRESS,
            &tmp_dir.join("foo"),
            &tmp_dir.join("bar"),
            &settings(mode),
            &CancelFlag::new(),
        )
        .await
    }

    #[tokio::test]
    #[traced_test]
    async fn check_basic_cmp() -> Result<()> {
        let tmp_dir = testutils::setup_test_dirs(CHUNK).await?;
        let report = run(&tmp_dir, Mode::Concurrent).await?;
        assert_eq!(names(&report), expected_names());
        let results: EnumMap<CompareResult, u64> = enum_map! {
            CompareResult::Same => 10,
            CompareResult::SizeDifferent => 1,
            CompareResult::ContentDifferent => 2,
            CompareResult::Failed => 2,
        };
        assert_eq!(report.summary.results, results);
        assert_eq!(report.summary.total(), 15);
        Ok(())
    }

    #[tokio::test]
    async fn sequential_reports_the_same_files() -> Result<()> {
        let tmp_dir = testutils::setup_test_dirs(CHUNK).await?;
        let concurrent = run(&tmp_dir, Mode::Concurrent).await?;
        let sequential = run(&tmp_dir, Mode::Sequential).await?;
        assert_eq!(names(&sequential), names(&concurrent));
        assert_eq!(sequential.summary, concurrent.summary);
        Ok(())
    }

    #[tokio::test]
    async fn repeated_runs_agree() -> Result<()> {
        let tmp_dir = testutils::setup_test_dirs(CHUNK).await?;
        let first = run(&tmp_dir, Mode::Concurrent).await?;
        let second = run(&tmp_dir, Mode::Concurrent).await?;
        assert_eq!(names(&first), names(&second));
        assert_eq!(first.summary, second.summary);
        Ok(())
    }

    #[tokio::test]
    async fn errors_keep_their_description() -> Result<()> {
        let tmp_dir = testutils::setup_test_dirs(CHUNK).await?;
        let report = run(&tmp_dir, Mode::Concurrent).await?;
        let missing = tmp_dir.join("foo").join("missing0");
        let line = report
            .lines()
            .find(|line| line.ends_with(&format!(": {}", missing.display())));
        assert!(line.is_some_and(|line| line.starts_with("path invalid")));
        let mismatch = tmp_dir.join("foo").join("diff_first");
        assert!(report.lines().any(|line| line == mismatch.display().to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn trailing_separator_is_not_doubled() -> Result<()> {
        let tmp_dir = testutils::setup_test_dirs(CHUNK).await?;
        let src_dir = std::path::PathBuf::from(format!("{}/", tmp_dir.join("foo").display()));
        let jobs = list_jobs(&src_dir, &tmp_dir.join("bar")).await?;
        assert_eq!(jobs.len(), 15);
        for job in &jobs {
            assert!(!job.src.to_string_lossy().contains("//"), "{:?}", job.src);
            assert_eq!(job.src.parent(), Some(tmp_dir.join("foo").as_path()));
            assert_eq!(job.dst.file_name(), job.src.file_name());
        }
        Ok(())
    }

    #[tokio::test]
    async fn missing_source_directory_is_fatal() -> Result<()> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let res = run(&tmp_dir, Mode::Concurrent).await;
        assert!(res.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn cancellation_still_joins_every_worker() -> Result<()> {
        let tmp_dir = testutils::setup_test_dirs(CHUNK).await?;
        let cancel = CancelFlag::new();
        cancel.cancel();
        let report = cmp(
            &PROGRESS,
            &tmp_dir.join("foo"),
            &tmp_dir.join("bar"),
            &settings(Mode::Concurrent),
            &cancel,
        )
        .await?;
        assert_eq!(report.summary.total(), 15);
        assert_eq!(report.summary.results[CompareResult::SizeDifferent], 1);
        assert_eq!(report.summary.failures(), 14);
        Ok(())
    }

    #[tokio::test]
    async fn log_writer_writes_report_lines() -> Result<()> {
        let tmp_dir = testutils::setup_test_dirs(CHUNK).await?;
        let report = run(&tmp_dir, Mode::Sequential).await?;
        let log_path = tmp_dir.join("cmp.log");
        let log = LogWriter::new(Some(&log_path), false).await?;
        log.log_report(&report).await?;
        log.flush().await?;
        let contents = tokio::fs::read_to_string(&log_path).await?;
        assert_eq!(contents.lines().count(), 5);
        // the log file is never overwritten
        assert!(LogWriter::new(Some(&log_path), false).await.is_err());
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn panicking_worker_only_fails_its_own_file() -> Result<()> {
        let tmp_dir = testutils::setup_test_dirs(CHUNK).await?;
        let jobs = list_jobs(&tmp_dir.join("foo"), &tmp_dir.join("bar")).await?;
        let file_settings = settings(Mode::Concurrent).file;
        let cancel = CancelFlag::new();
        let outcomes = fork_join(&jobs, |job| {
            let cancel = cancel.clone();
            async move {
                if job.src.ends_with("same3") {
                    panic!("worker blew up");
                }
                filecmp::cmp_file(&PROGRESS, &job, &file_settings, &cancel).await
            }
        })
        .await;
        assert_eq!(outcomes.len(), jobs.len());
        let report = Report::from_outcomes(outcomes);
        assert_eq!(report.summary.total(), 15);
        let results: EnumMap<CompareResult, u64> = enum_map! {
            CompareResult::Same => 9,
            CompareResult::SizeDifferent => 1,
            CompareResult::ContentDifferent => 2,
            CompareResult::Failed => 3,
        };
        assert_eq!(report.summary.results, results);
        let mut expected = expected_names();
        expected.insert("same3".to_string());
        assert_eq!(names(&report), expected);
        let same3 = tmp_dir.join("foo").join("same3");
        let line = report
            .lines()
            .find(|line| line.ends_with(&format!(": {}", same3.display())));
        assert!(line.is_some_and(|line| line.starts_with("comparison task failed")));
        assert!(logs_contain("did not complete"));
        Ok(())
    }
}
