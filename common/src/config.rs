//! Configuration types for runtime and execution settings

/// Runtime configuration for tokio and thread pools
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub max_workers: usize,
    /// Number of blocking threads (0 = tokio default of 512)
    pub max_blocking_threads: usize,
}

/// Throttling configuration for resource control
#[derive(Debug, Clone, Copy, Default)]
pub struct ThrottleConfig {
    /// Maximum number of open files (None or 0 = no limit)
    pub max_open_files: Option<usize>,
    /// File comparisons started per second (0 = no throttle)
    pub ops_throttle: usize,
    /// Chunk reads per second (0 = no throttle)
    pub iops_throttle: usize,
    /// Chunk size for I/O operations (bytes)
    pub chunk_size: u64,
}

impl ThrottleConfig {
    /// Validate configuration and return errors if invalid
    pub fn validate(&self) -> Result<(), String> {
        if self.iops_throttle > 0 && self.chunk_size == 0 {
            return Err("chunk_size must be specified when using iops_throttle".to_string());
        }
        if self.max_open_files == Some(1) {
            // a comparison keeps both of its files open at the same time
            return Err("max_open_files must be 0 (no limit) or at least 2".to_string());
        }
        Ok(())
    }
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress error output
    pub quiet: bool,
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE
    pub verbose: u8,
    /// Print summary statistics at the end
    pub print_summary: bool,
}

/// Tracing configuration for debugging
#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    /// Write logs to this file instead of stderr
    pub debug_log_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_validation() {
        assert!(ThrottleConfig::default().validate().is_ok());
        let iops_without_chunk = ThrottleConfig {
            iops_throttle: 10,
            ..Default::default()
        };
        assert!(iops_without_chunk.validate().is_err());
        let single_file = ThrottleConfig {
            max_open_files: Some(1),
            ..Default::default()
        };
        assert!(single_file.validate().is_err());
        let pair = ThrottleConfig {
            max_open_files: Some(2),
            ..Default::default()
        };
        assert!(pair.validate().is_ok());
    }
}
