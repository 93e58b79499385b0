use std::path::{Path, PathBuf};

use tracing::instrument;

use crate::progress;
use crate::streamcmp::{self, CancelFlag};

/// One file present in the source directory, paired with its namesake in the destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePairJob {
    pub src: PathBuf,
    pub dst: PathBuf,
}

impl FilePairJob {
    pub fn new(src_dir: &Path, dst_dir: &Path, name: &std::ffi::OsStr) -> Self {
        Self {
            src: src_dir.join(name),
            dst: dst_dir.join(name),
        }
    }
}

/// How sizes are checked before any content is read.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SizeCheck {
    /// Files of different sizes are reported without reading them
    #[default]
    Exact,
    /// Only a source larger than the destination is reported up-front; a shorter source is
    /// still streamed and reported once it runs out of data
    SrcNotLarger,
}

#[derive(Copy, Clone, Debug)]
pub struct Settings {
    pub chunk_size: usize,
    pub size_check: SizeCheck,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: streamcmp::DEFAULT_CHUNK_SIZE,
            size_check: SizeCheck::default(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MismatchReason {
    Size,
    Content,
}

/// Terminal result of comparing one file pair; paths always refer to the source side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Match,
    Mismatch { path: PathBuf, reason: MismatchReason },
    Error { path: PathBuf, message: String },
}

impl Outcome {
    #[must_use]
    pub fn is_match(&self) -> bool {
        matches!(self, Outcome::Match)
    }

    /// Line printed for this outcome in the final report, none for a match.
    #[must_use]
    pub fn report_line(&self) -> Option<String> {
        match self {
            Outcome::Match => None,
            Outcome::Mismatch { path, .. } => Some(path.display().to_string()),
            Outcome::Error { path, message } => Some(format!("{}: {}", message, path.display())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("path invalid: {path:?}")]
    InvalidPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("not a regular file: {path:?}")]
    NotAFile { path: PathBuf },
    #[error(transparent)]
    Stream(#[from] streamcmp::Error),
}

async fn file_size(path: &Path) -> Result<u64, Error> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|source| Error::InvalidPath {
            path: path.to_owned(),
            source,
        })?;
    if !metadata.is_file() {
        return Err(Error::NotAFile {
            path: path.to_owned(),
        });
    }
    Ok(metadata.len())
}

async fn open(path: &Path) -> Result<tokio::fs::File, Error> {
    tokio::fs::File::open(path)
        .await
        .map_err(|source| Error::InvalidPath {
            path: path.to_owned(),
            source,
        })
}

async fn try_cmp_file(
    prog_track: &progress::Progress,
    job: &FilePairJob,
    settings: &Settings,
    cancel: &CancelFlag,
) -> Result<Option<MismatchReason>, Error> {
    let src_size = file_size(&job.src).await?;
    let dst_size = file_size(&job.dst).await?;
    let size_differs = match settings.size_check {
        SizeCheck::Exact => src_size != dst_size,
        SizeCheck::SrcNotLarger => src_size > dst_size,
    };
    if size_differs {
        tracing::debug!("sizes differ: {} vs {}", src_size, dst_size);
        return Ok(Some(MismatchReason::Size));
    }
    if cancel.is_cancelled() {
        return Err(streamcmp::Error::Cancelled.into());
    }
    let _open_files_guard = throttle::open_files_permit(2).await;
    let chunk_size = settings.chunk_size as u64;
    throttle::get_file_iops_tokens(chunk_size, src_size).await;
    throttle::get_file_iops_tokens(chunk_size, dst_size).await;
    tracing::debug!("opening both files for reading");
    let mut src = open(&job.src).await?;
    let mut dst = open(&job.dst).await?;
    let same =
        streamcmp::compare_streams(&mut src, &mut dst, settings.chunk_size, prog_track, cancel)
            .await?;
    Ok((!same).then_some(MismatchReason::Content))
}

/// Compares one file pair. Every failure is turned into [`Outcome::Error`].
#[instrument(skip(prog_track, cancel))]
pub async fn cmp_file(
    prog_track: &progress::Progress,
    job: &FilePairJob,
    settings: &Settings,
    cancel: &CancelFlag,
) -> Outcome {
    throttle::get_ops_token().await;
    let _ops_guard = prog_track.ops.guard();
    match try_cmp_file(prog_track, job, settings, cancel).await {
        Ok(None) => {
            prog_track.files_same.inc();
            Outcome::Match
        }
        Ok(Some(reason)) => {
            tracing::info!("{:?} differs ({:?})", &job.src, reason);
            prog_track.files_different.inc();
            Outcome::Mismatch {
                path: job.src.clone(),
                reason,
            }
        }
        Err(error) => {
            let error = anyhow::Error::new(error);
            tracing::warn!("{:?} vs {:?} failed with: {:#}", &job.src, &job.dst, &error);
            prog_track.files_failed.inc();
            Outcome::Error {
                path: job.src.clone(),
                message: format!("{error:#}"),
            }
        }
    }
}
