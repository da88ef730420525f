//! Read-ahead scan CLI
//!
//! Hashes a file window by window, either with background prefetch (default)
//! or with plain mapped reads, and reports the elapsed time.
//!
//! # Output Format
//!
//! ```text
//! STATUS: Found file '<path>', <N> bytes.
//! XXXXXXXX XXXXXXXX XXXXXXXX XXXXXXXX
//! STATUS: Finished run in <S> seconds (<B> bytes/sec).
//! ```
//!
//! With `--trace`, one line per trace marker is written to stderr.
//!
//! # Exit Codes
//!
//! - `0`: Success
//! - `1`: The scan failed (open, map, worker)
//! - `2`: Invalid arguments or configuration error

use readahead_rs::{
    scan_file, NoopSink, ScanConfig, ScanError, ScanMode, TraceSink, WindowHash, WriterSink,
};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_ROUNDS: usize = 100;

fn print_usage(exe: &std::ffi::OsStr) {
    eprintln!(
        "usage: {} [OPTIONS] <path>

OPTIONS:
    --mode=<prefetch|direct>  Scan strategy (default: prefetch)
    --window-size=<N>         Bytes per mapped window (default: 2097152)
    --chunk-size=<N>          Bytes per prefetch read (default: 1048576)
    --rounds=<N>              Hash passes per window (default: {DEFAULT_ROUNDS})
    --trace                   Write trace markers to stderr
    --help, -h                Show this help message",
        exe.to_string_lossy()
    );
}

fn parse_size(flag: &str, value: &str) -> usize {
    value.parse().unwrap_or_else(|_| {
        eprintln!("invalid {flag} value: {value}");
        std::process::exit(2);
    })
}

fn main() -> ExitCode {
    let mut args = env::args_os();
    let exe = args.next().unwrap_or_else(|| "readahead-rs".into());
    let mut path: Option<PathBuf> = None;
    let mut config = ScanConfig::default();
    let mut rounds = DEFAULT_ROUNDS;
    let mut trace = false;

    for arg in args {
        if let Some(flag) = arg.to_str() {
            if let Some(value) = flag.strip_prefix("--mode=") {
                config.mode = ScanMode::parse(value).unwrap_or_else(|| {
                    eprintln!("invalid --mode value: {value}");
                    std::process::exit(2);
                });
                continue;
            }
            if let Some(value) = flag.strip_prefix("--window-size=") {
                config.window_size = parse_size("--window-size", value);
                continue;
            }
            if let Some(value) = flag.strip_prefix("--chunk-size=") {
                config.chunk_size = parse_size("--chunk-size", value);
                continue;
            }
            if let Some(value) = flag.strip_prefix("--rounds=") {
                rounds = parse_size("--rounds", value);
                continue;
            }
            match flag {
                "--trace" => {
                    trace = true;
                    continue;
                }
                "--help" | "-h" => {
                    print_usage(&exe);
                    return ExitCode::SUCCESS;
                }
                _ if flag.starts_with("--") => {
                    eprintln!("unknown flag: {flag}");
                    print_usage(&exe);
                    return ExitCode::from(2);
                }
                _ => {}
            }
        }

        if path.is_some() {
            print_usage(&exe);
            return ExitCode::from(2);
        }
        path = Some(PathBuf::from(arg));
    }

    let Some(path) = path else {
        eprintln!("ERROR: Missing argument INFILE.");
        print_usage(&exe);
        return ExitCode::from(2);
    };

    if let Err(err) = config.validate() {
        eprintln!("ERROR: {err}");
        return ExitCode::from(2);
    }

    let file_size = match std::fs::metadata(&path) {
        Ok(meta) => meta.len(),
        Err(err) => {
            eprintln!("ERROR: Unable to stat input file '{}': {err}", path.display());
            return ExitCode::FAILURE;
        }
    };
    println!(
        "STATUS: Found file '{}', {file_size} bytes.",
        path.display()
    );

    let sink: Arc<dyn TraceSink> = if trace {
        Arc::new(WriterSink::stderr())
    } else {
        Arc::new(NoopSink)
    };

    let start = Instant::now();
    let mut hash = WindowHash::new(0);
    let result = scan_file(&path, &config, Arc::clone(&sink), |bytes| {
        for _ in 0..rounds {
            hash.update(bytes);
        }
    });
    sink.flush();

    let report = match result {
        Ok(report) => report,
        Err(err @ ScanError::InvalidConfig { .. }) => {
            eprintln!("ERROR: {err}");
            return ExitCode::from(2);
        }
        Err(err) => {
            eprintln!("ERROR: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!("{}", hash.finish(report.file_size));

    let elapsed_s = start.elapsed().as_secs_f64();
    let rate = if elapsed_s > 0.0 {
        report.file_size as f64 / elapsed_s
    } else {
        0.0
    };
    println!("STATUS: Finished run in {elapsed_s:.6} seconds ({rate:.3} bytes/sec).");

    if trace {
        let p = report.prefetch;
        eprintln!(
            "mode={} windows={} bytes={} requests={} rejected={} cancels={} started={} completed={} cancelled={} read_errors={} warmed={}",
            config.mode.as_str(),
            report.windows,
            report.bytes_scanned,
            report.requests_submitted,
            report.requests_rejected,
            report.cancels_submitted,
            p.requests_started,
            p.requests_completed,
            p.requests_cancelled,
            p.read_errors,
            p.bytes_warmed,
        );
    }

    ExitCode::SUCCESS
}
