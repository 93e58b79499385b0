use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "mfcmp",
    version,
    about = "Find which files of a directory differ in content from another directory",
    long_about = "`mfcmp` compares every file of SRC_DIR with the same-named file of DST_DIR, byte by byte.

Files are streamed in chunks rather than loaded whole, and all files of the directory are
compared at the same time unless --sequential or --max-open-files is given. Only the top level
of SRC_DIR is compared; files present only in DST_DIR are not reported.

Each differing file is printed on its own line as its SRC_DIR path. Files that could not be
compared are printed as \"<error description>: <path>\".

EXIT CODES:
    0 - All files identical
    1 - Differences found
    2 - Some files could not be compared, or the comparison could not run

EXAMPLES:
    # Compare two directories (differences printed to stdout)
    mfcmp /foo /bar --summary

    # Compare one file at a time, logging differences to a file
    mfcmp /foo /bar --sequential --log compare.log"
)]
struct Args {
    // Comparison options
    /// Compare one file at a time instead of all files at once
    #[arg(long, help_heading = "Comparison options")]
    sequential: bool,

    /// How file sizes are checked before any content is read
    #[arg(
        long,
        value_enum,
        default_value_t = common::filecmp::SizeCheck::Exact,
        value_name = "CHECK",
        help_heading = "Comparison options"
    )]
    size_check: common::filecmp::SizeCheck,

    /// Number of bytes read from each file at a time
    #[arg(
        long,
        default_value_t = common::streamcmp::DEFAULT_CHUNK_SIZE,
        value_parser = parse_chunk_size,
        value_name = "BYTES",
        help_heading = "Comparison options"
    )]
    chunk_size: usize,

    /// Return non-zero exit code only if the comparison could not run
    #[arg(long, help_heading = "Comparison options")]
    no_check: bool,

    /// File to store comparison output (instead of stdout)
    #[arg(long, value_name = "PATH", help_heading = "Comparison options")]
    log: Option<std::path::PathBuf>,

    // Progress & output
    /// Show progress
    #[arg(long, help_heading = "Progress & output")]
    progress: bool,

    /// Set the type of progress display
    ///
    /// If specified, --progress flag is implied.
    #[arg(long, value_name = "TYPE", help_heading = "Progress & output")]
    progress_type: Option<common::ProgressType>,

    /// Sets the delay between progress updates
    ///
    /// - For the interactive (--progress-type=progress-bar), the default is 200ms.
    /// - For the non-interactive (--progress-type=text-updates), the default is 10s.
    ///
    /// If specified, --progress flag is implied.
    ///
    /// This option accepts a human readable duration, e.g. "200ms", "10s", "5min" etc.
    #[arg(long, value_name = "DELAY", help_heading = "Progress & output")]
    progress_delay: Option<String>,

    /// Verbose level (implies "summary"): -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help_heading = "Progress & output"
    )]
    verbose: u8,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Quiet mode, suppress stdout output (errors and differences)
    ///
    /// Without --log, differences are printed to stdout. This flag suppresses that.
    /// When used with --log, differences are still written to the log file.
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH", help_heading = "Progress & output")]
    debug_log_file: Option<String>,

    // Performance & throttling
    /// Maximum number of open files, each comparison holds two; unspecified or 0 means no limit
    #[arg(long, value_name = "N", help_heading = "Performance & throttling")]
    max_open_files: Option<usize>,

    /// Throttle the number of file comparisons started per second, 0 means no throttle
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Performance & throttling"
    )]
    ops_throttle: usize,

    /// Throttle the number of chunk reads per second, 0 means no throttle
    ///
    /// Number of reads for a file is calculated as: ((file size - 1) / chunk size) + 1
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Performance & throttling"
    )]
    iops_throttle: usize,

    // Advanced settings
    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,

    // ARGUMENTS
    /// Directory whose files are compared
    #[arg()]
    src_dir: std::path::PathBuf,

    /// Directory holding the same-named files to compare against
    #[arg()]
    dst_dir: std::path::PathBuf,
}

fn parse_chunk_size(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("chunk size must be greater than 0".to_string()),
        Ok(size) => Ok(size),
        Err(err) => Err(err.to_string()),
    }
}

async fn async_main(args: Args) -> Result<common::cmp::Summary> {
    // output to stdout if no log file and not quiet
    let use_stdout = args.log.is_none() && !args.quiet;
    let log_handle = common::cmp::LogWriter::new(args.log.as_deref(), use_stdout).await?;
    let cancel = common::streamcmp::CancelFlag::new();
    let on_interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, stopping comparisons in flight");
                cancel.cancel();
            }
        })
    };
    let report = common::cmp(
        &args.src_dir,
        &args.dst_dir,
        &common::cmp::Settings {
            file: common::filecmp::Settings {
                chunk_size: args.chunk_size,
                size_check: args.size_check,
            },
            mode: if args.sequential {
                common::cmp::Mode::Sequential
            } else {
                common::cmp::Mode::Concurrent
            },
        },
        &cancel,
    )
    .await?;
    on_interrupt.abort();
    log_handle.log_report(&report).await?;
    log_handle.flush().await?;
    Ok(report.summary)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let throttle = common::ThrottleConfig {
        max_open_files: args.max_open_files,
        ops_throttle: args.ops_throttle,
        iops_throttle: args.iops_throttle,
        chunk_size: args.chunk_size as u64,
    };
    let tracing = common::TracingConfig {
        debug_log_file: args.debug_log_file.clone(),
    };
    let res = common::run(
        if args.progress || args.progress_type.is_some() || args.progress_delay.is_some() {
            Some(common::ProgressSettings {
                progress_type: args.progress_type.unwrap_or_default(),
                progress_delay: args.progress_delay.clone(),
            })
        } else {
            None
        },
        output,
        runtime,
        throttle,
        tracing,
        func,
    );
    match res {
        Some(summary) => {
            if args.no_check {
                std::process::exit(0);
            }
            if summary.failures() > 0 {
                std::process::exit(2);
            }
            if summary.differences() > 0 {
                std::process::exit(1);
            }
            std::process::exit(0);
        }
        None => std::process::exit(2),
    }
}
