mod api_client;
mod batch;
mod config;
mod data;
mod error;
mod paginator;
mod report_sink;
mod runner;
mod transform;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use config::Config;
use error::Error;
use log::{error, info, warn};
use report_sink::WriteMode;
use runner::RunSpec;

#[derive(Parser)]
struct Args {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest the report for an explicit date range.
    Fetch {
        #[arg(help = "Date should be in the form YYYY-MM-DD", value_parser = validate_date)]
        start: NaiveDate,

        #[arg(help = "Date should be in the form YYYY-MM-DD", value_parser = validate_date)]
        end: NaiveDate,

        #[arg(long, value_enum, default_value_t = WriteMode::Append)]
        write_mode: WriteMode,
    },
    /// Ingest the last N months up to today.
    Backfill {
        months: u32,

        #[arg(long, value_enum, default_value_t = WriteMode::Append)]
        write_mode: WriteMode,
    },
}

fn validate_date(s: &str) -> Result<NaiveDate, String> {
    let error_message = "Invalid date, expected YYYY-MM-DD";

    let parts = s
        .split("-")
        .map(|part| part.parse::<u16>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| error_message)?;

    match parts.as_slice() {
        &[year, month, day] if month <= 12 && day <= 31 => {
            Ok(
                NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                    .ok_or(error_message)?,
            )
        }
        _ => Err(error_message.to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    env_logger::init();

    let (spec, write_mode) = match args.command {
        Command::Fetch {
            start,
            end,
            write_mode,
        } => (RunSpec::Range { start, end }, write_mode),
        Command::Backfill { months, write_mode } => (RunSpec::Backfill { months }, write_mode),
    };

    match runner::run_report_pipeline(&args.config, spec, write_mode).await {
        Ok(result) => {
            info!(
                "run complete: {} rows loaded across {} windows ({} failed)",
                result.rows_loaded, result.windows_attempted, result.windows_failed
            );
            for failure in &result.errors {
                warn!("window {} failed: {}", failure.window, failure.error);
            }
            if result.windows_failed > 0 {
                std::process::exit(1);
            }
        }
        Err(err) => {
            error!("run aborted: {}", err);
            std::process::exit(1);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_date_accepts_iso_dates() {
        assert_eq!(
            validate_date("2025-10-07").unwrap(),
            NaiveDate::from_ymd_opt(2025, 10, 7).unwrap()
        );
    }

    #[test]
    fn test_validate_date_rejects_garbage() {
        assert!(validate_date("next tuesday").is_err());
        assert!(validate_date("2025-13-01").is_err());
        assert!(validate_date("2025-02-30").is_err());
        assert!(validate_date("07-10-2025").is_err());
    }
}
