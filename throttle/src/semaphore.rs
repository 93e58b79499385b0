use std::sync::atomic::{AtomicBool, Ordering};

/// Semaphore that can be switched off, in which case every acquisition succeeds immediately.
pub struct Semaphore {
    enabled: AtomicBool,
    sem: tokio::sync::Semaphore,
}

impl Semaphore {
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            sem: tokio::sync::Semaphore::const_new(0),
        }
    }

    /// Resets the number of available permits; 0 disables the semaphore.
    pub fn setup(&self, value: usize) {
        self.enabled.store(value > 0, Ordering::Release);
        if value == 0 {
            return;
        }
        self.sem.forget_permits(self.sem.available_permits());
        self.sem.add_permits(value);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub async fn acquire_many(&self, count: u32) -> Option<tokio::sync::SemaphorePermit<'_>> {
        if !self.is_enabled() {
            return None;
        }
        // the semaphore is never closed, an error here would only mean nothing to hold
        self.sem.acquire_many(count).await.ok()
    }

    pub async fn consume_many(&self, count: u32) {
        if let Some(permit) = self.acquire_many(count).await {
            permit.forget();
        }
    }

    pub async fn run_replenish_thread(&self, replenish: usize, interval: std::time::Duration) {
        if !self.is_enabled() {
            return;
        }
        loop {
            tokio::time::sleep(interval).await;
            let available = self.sem.available_permits();
            if available < replenish {
                self.sem.add_permits(replenish - available);
            }
        }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}
