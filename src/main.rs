mod cli;
mod pipe;
mod ui;
mod watch;

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use ratewatch::replay::{self, RateRow, ReplayError};
use ratewatch::{float_speed, SpeedElement, TrackerConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ReplayFormat};
use crate::pipe::run_pipe;
use crate::watch::run_watch;

fn run_replay(file: &Path, format: ReplayFormat, config: TrackerConfig) -> Result<()> {
    let reader = File::open(file).with_context(|| format!("Opening recording {}", file.display()))?;
    let records = replay::parse_records(BufReader::new(reader))
        .with_context(|| format!("Reading recording {}", file.display()))?;
    let rows = replay::run(&records, config);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    print_rows(&mut out, &rows, format)?;
    Ok(())
}

fn print_rows<W: Write>(out: &mut W, rows: &[RateRow], format: ReplayFormat) -> Result<()> {
    match format {
        ReplayFormat::Text => {
            let element = SpeedElement::default();
            for row in rows {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}\t{}",
                    row.id,
                    row.t_ms,
                    row.value,
                    float_speed(row.rate, 3),
                    element.render(row.rate)
                )?;
            }
        }
        ReplayFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(rows)?)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = TrackerConfig::from(&cli.tracker);
    debug!(config = %serde_json::to_string(&config).unwrap_or_default(), "Tracker config");
    let result: Result<()> = match cli.command {
        Some(Commands::Pipe(pipe)) => run_pipe(pipe, config),
        Some(Commands::Watch(watch)) => run_watch(watch, config),
        Some(Commands::Replay { file, format }) => run_replay(&file, format, config),
        None => {
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(err) = result {
        // Map to stable exit codes
        let code = exit_code_for_error(&err);
        eprintln!("error: {err:?}");
        std::process::exit(code);
    }
}

pub(crate) fn exit_code_for_error(err: &anyhow::Error) -> i32 {
    // 2: input not found, 3: bad recording, 4: broken pipe, 1: other
    for cause in err.chain() {
        if let Some(ReplayError::Parse { .. }) = cause.downcast_ref::<ReplayError>() {
            return 3;
        }
        if let Some(ioe) = cause.downcast_ref::<std::io::Error>() {
            use std::io::ErrorKind::*;
            return match ioe.kind() {
                NotFound => 2,
                BrokenPipe => 4,
                _ => 1,
            };
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_not_found() {
        let err = anyhow::Error::from(std::io::Error::from(std::io::ErrorKind::NotFound))
            .context("Opening recording x");
        assert_eq!(exit_code_for_error(&err), 2);
    }

    #[test]
    fn exit_code_parse_error() {
        let source = serde_json::from_str::<serde_json::Value>("nope").unwrap_err();
        let err = anyhow::Error::from(ReplayError::Parse { line: 4, source });
        assert_eq!(exit_code_for_error(&err), 3);
    }

    #[test]
    fn exit_code_broken_pipe() {
        let err = anyhow::Error::from(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert_eq!(exit_code_for_error(&err), 4);
    }

    #[test]
    fn exit_code_io_inside_replay_error() {
        let inner = std::io::Error::from(std::io::ErrorKind::NotFound);
        let err = anyhow::Error::from(ReplayError::Io(inner));
        assert_eq!(exit_code_for_error(&err), 2);
    }

    #[test]
    fn exit_code_other() {
        let err = anyhow::anyhow!("other");
        assert_eq!(exit_code_for_error(&err), 1);
    }

    #[test]
    fn replay_missing_file_is_not_found() {
        let err = run_replay(Path::new("/definitely/not/here.jsonl"), ReplayFormat::Text, TrackerConfig::default())
            .unwrap_err();
        assert_eq!(exit_code_for_error(&err), 2);
    }

    #[test]
    fn print_rows_text_and_json() {
        let rows = vec![
            RateRow { id: 1, t_ms: 0, value: 0, rate: 0.0 },
            RateRow { id: 2, t_ms: 1000, value: 100, rate: 100.0 },
        ];
        let mut text = Vec::new();
        print_rows(&mut text, &rows, ReplayFormat::Text).unwrap();
        let text = String::from_utf8(text).unwrap();
        assert_eq!(text, "1\t0\t0\t0.000\t?/s\n2\t1000\t100\t100.000\t100/s\n");

        let mut json = Vec::new();
        print_rows(&mut json, &rows, ReplayFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(parsed[1]["rate"], 100.0);
    }

    #[test]
    fn replay_file_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.jsonl");
        std::fs::write(
            &path,
            "{\"id\":1,\"t_ms\":0,\"value\":0,\"first\":true}\n{\"id\":2,\"t_ms\":2000,\"value\":400,\"finished\":true}\n",
        )
        .unwrap();
        let recs = replay::parse_records(BufReader::new(File::open(&path).unwrap())).unwrap();
        let rows = replay::run(&recs, TrackerConfig::default());
        assert_eq!(rows[1].rate, 200.0);

        std::fs::write(&path, "{\"id\":1}\n").unwrap();
        let err = run_replay(&path, ReplayFormat::Json, TrackerConfig::default()).unwrap_err();
        assert_eq!(exit_code_for_error(&err), 3);
    }
}
