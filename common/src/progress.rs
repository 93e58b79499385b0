use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{Level, event, instrument};

/// Counter with one slot per thread, summed on read.
#[derive(Debug, Default)]
pub struct TlsCounter {
    count: thread_local::ThreadLocal<AtomicU64>,
}

impl TlsCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, value: u64) {
        self.count
            .get_or(|| AtomicU64::new(0))
            .fetch_add(value, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn get(&self) -> u64 {
        self.count
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .sum()
    }
}

#[derive(Debug, Default)]
pub struct ProgressCounter {
    started: TlsCounter,
    finished: TlsCounter,
}

pub struct ProgressGuard<'a> {
    progress: &'a ProgressCounter,
}

impl<'a> ProgressGuard<'a> {
    pub fn new(progress: &'a ProgressCounter) -> Self {
        progress.started.inc();
        Self { progress }
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.progress.finished.inc();
    }
}

pub struct Status {
    pub started: u64,
    pub finished: u64,
}

impl ProgressCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard(&self) -> ProgressGuard<'_> {
        ProgressGuard::new(self)
    }

    #[instrument]
    pub fn get(&self) -> Status {
        // read finished first, a comparison may finish between the two reads
        let finished = self.finished.get();
        let started = self.started.get();
        if finished > started {
            event!(
                Level::DEBUG,
                "Progress inversion - started: {}, finished {}",
                started,
                finished
            );
            return Status {
                started: finished,
                finished,
            };
        }
        Status { started, finished }
    }
}

/// Live counters of a comparison run.
#[derive(Debug)]
pub struct Progress {
    pub ops: ProgressCounter,
    pub bytes_compared: TlsCounter,
    pub files_same: TlsCounter,
    pub files_different: TlsCounter,
    pub files_failed: TlsCounter,
    start_time: std::time::Instant,
}

impl Progress {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ops: Default::default(),
            bytes_compared: Default::default(),
            files_same: Default::default(),
            files_different: Default::default(),
            files_failed: Default::default(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn get_duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ProgressPrinter<'a> {
    progress: &'a Progress,
    last_ops: u64,
    last_bytes: u64,
    last_update: std::time::Instant,
}

impl<'a> ProgressPrinter<'a> {
    pub fn new(progress: &'a Progress) -> Self {
        Self {
            progress,
            last_ops: progress.ops.get().finished,
            last_bytes: progress.bytes_compared.get(),
            last_update: std::time::Instant::now(),
        }
    }

    pub fn print(&mut self) -> String {
        let time_now = std::time::Instant::now();
        let ops = self.progress.ops.get();
        let total_secs = self.progress.get_duration().as_secs_f64().max(f64::EPSILON);
        let curr_secs = (time_now - self.last_update).as_secs_f64().max(f64::EPSILON);
        let bytes = self.progress.bytes_compared.get();
        let average_ops_rate = ops.finished as f64 / total_secs;
        let current_ops_rate = (ops.finished - self.last_ops) as f64 / curr_secs;
        let average_bytes_rate = bytes as f64 / total_secs;
        let current_bytes_rate = (bytes - self.last_bytes) as f64 / curr_secs;
        self.last_ops = ops.finished;
        self.last_bytes = bytes;
        self.last_update = time_now;
        format!(
            "---------------------\n\
            FILES:\n\
            pending: {:>10}\n\
            average: {:>10.2} files/s\n\
            current: {:>10.2} files/s\n\
            ---------------------\n\
            COMPARED:\n\
            average: {:>10}/s\n\
            current: {:>10}/s\n\
            total:   {:>10}\n\
            ---------------------\n\
            same:      {:>10}\n\
            different: {:>10}\n\
            failed:    {:>10}",
            ops.started - ops.finished,
            average_ops_rate,
            current_ops_rate,
            bytesize::ByteSize(average_bytes_rate as u64),
            bytesize::ByteSize(current_bytes_rate as u64),
            bytesize::ByteSize(bytes),
            self.progress.files_same.get(),
            self.progress.files_different.get(),
            self.progress.files_failed.get(),
        )
    }
}
