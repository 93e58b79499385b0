//! Process-wide resource limits for file comparisons
//!
//! Three independent limits are provided, each disabled until configured with a non-zero value:
//!
//! 1. **Open files** - bounds how many file descriptors comparisons hold at once. A file pair
//!    comparison holds two permits (one per side) for as long as both files are open.
//! 2. **Operations** - bounds how many file pair comparisons start per second.
//! 3. **I/O operations** - bounds how many chunk reads are issued per second, computed from
//!    the file size and the chunk size.
//!
//! Operations and I/O operations are token buckets refilled by a background task, see
//! [`run_ops_replenish_thread`] and [`run_iops_replenish_thread`].
//!
//! ```rust,no_run
//! # async fn example() {
//! throttle::set_max_open_files(512);
//! let _guard = throttle::open_files_permit(2).await;
//! // open both sides of the pair here, permits are released when the guard is dropped
//! # }
//! ```
//!
//! Token count for a file of `size` bytes read in `chunk_size` chunks:
//!
//! ```text
//! tokens = ⌈size / chunk_size⌉   (at least 1)
//! ```

mod semaphore;

static OPEN_FILES_LIMIT: semaphore::Semaphore = semaphore::Semaphore::new();
static OPS_THROTTLE: semaphore::Semaphore = semaphore::Semaphore::new();
static IOPS_THROTTLE: semaphore::Semaphore = semaphore::Semaphore::new();

/// Limits the number of simultaneously open files, 0 means no limit.
pub fn set_max_open_files(max_open_files: usize) {
    OPEN_FILES_LIMIT.setup(max_open_files);
}

pub struct OpenFileGuard {
    _permit: Option<tokio::sync::SemaphorePermit<'static>>,
}

/// Waits until `files` more files may be opened.
pub async fn open_files_permit(files: u32) -> OpenFileGuard {
    OpenFileGuard {
        _permit: OPEN_FILES_LIMIT.acquire_many(files).await,
    }
}

pub fn init_ops_tokens(ops_tokens: usize) {
    OPS_THROTTLE.setup(ops_tokens);
}

pub fn init_iops_tokens(iops_tokens: usize) {
    IOPS_THROTTLE.setup(iops_tokens);
}

pub async fn get_ops_token() {
    OPS_THROTTLE.consume_many(1).await;
}

/// Number of chunk reads needed for a file, never less than one.
#[must_use]
pub fn file_iops(chunk_size: u64, file_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    1 + (std::cmp::max(1, file_size) - 1) / chunk_size
}

pub async fn get_file_iops_tokens(chunk_size: u64, file_size: u64) {
    let tokens = file_iops(chunk_size, file_size);
    if tokens == 0 {
        return;
    }
    match u32::try_from(tokens) {
        Ok(tokens) => IOPS_THROTTLE.consume_many(tokens).await,
        Err(_) => tracing::error!(
            "chunk size: {} is too small to limit throughput for files this big, size: {}",
            chunk_size,
            file_size,
        ),
    }
}

pub async fn run_ops_replenish_thread(replenish: usize, interval: std::time::Duration) {
    OPS_THROTTLE.run_replenish_thread(replenish, interval).await;
}

pub async fn run_iops_replenish_thread(replenish: usize, interval: std::time::Duration) {
    IOPS_THROTTLE
        .run_replenish_thread(replenish, interval)
        .await;
}
