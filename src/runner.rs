use crate::api_client::{ApiClient, DateWindow, ReportApi};
use crate::batch::assemble;
use crate::config::Config;
use crate::error::Error;
use crate::paginator::Paginator;
use crate::report_sink::{ParquetReportSink, ReportSink, WriteMode};
use crate::transform::transform_record;
use chrono::{Days, Months, NaiveDate, Utc};
use log::{error, info};
use std::time::Duration;

/// What the caller asked to ingest: an explicit date range, or the last
/// N months up to today (backfill).
#[derive(Debug, Clone, Copy)]
pub enum RunSpec {
    Range { start: NaiveDate, end: NaiveDate },
    Backfill { months: u32 },
}

#[derive(Debug)]
pub struct WindowFailure {
    pub window: DateWindow,
    pub error: String,
}

/// Outcome of one orchestrator invocation. Immutable once returned; the
/// only persisted state of a run is the destination table itself.
#[derive(Debug, Default)]
pub struct RunResult {
    pub rows_loaded: usize,
    pub windows_attempted: usize,
    pub windows_failed: usize,
    pub errors: Vec<WindowFailure>,
}

/// Resolves a run spec into the sub-windows to process.
///
/// The window end is clamped to `today - freshness_delay_days` since
/// upstream data for more recent days is not available yet. A range that
/// becomes empty after clamping is a valid no-op plan, not an error; an
/// inverted range as supplied by the caller is a configuration error.
/// Long ranges are split into chunks of at most `max_window_days` so a
/// single failure spoils at most one chunk.
pub fn plan_windows(
    spec: &RunSpec,
    today: NaiveDate,
    freshness_delay_days: u32,
    max_window_days: u32,
) -> Result<Vec<DateWindow>, Error> {
    if max_window_days == 0 {
        return Err(Error::Configuration {
            message: "max_window_days must be at least 1".to_string(),
        });
    }

    let (start, end) = match *spec {
        RunSpec::Range { start, end } => {
            if start > end {
                return Err(Error::StartDateAfterEndDate {
                    start_date: start.to_string(),
                    end_date: end.to_string(),
                });
            }
            (start, end)
        }
        RunSpec::Backfill { months } => {
            if months == 0 {
                return Err(Error::Configuration {
                    message: "backfill must cover at least one month".to_string(),
                });
            }
            let start = today
                .checked_sub_months(Months::new(months))
                .ok_or(Error::InvalidDate {
                    date: today.to_string(),
                })?;
            (start, today)
        }
    };

    let freshest = today - Days::new(freshness_delay_days as u64);
    let end = end.min(freshest);
    if start > end {
        return Ok(vec![]);
    }

    let mut windows = vec![];
    let mut cursor = start;
    while cursor <= end {
        let chunk_end = (cursor + Days::new(max_window_days as u64 - 1)).min(end);
        windows.push(DateWindow::new(cursor, chunk_end)?);
        cursor = chunk_end + Days::new(1);
    }
    Ok(windows)
}

async fn process_window(
    api: &dyn ReportApi,
    sink: &dyn ReportSink,
    paginator: &Paginator,
    advertiser_id: &str,
    window: &DateWindow,
    mode: WriteMode,
) -> Result<usize, Error> {
    let pages = paginator.collect_pages(api, window).await?;

    let raw_records: Vec<serde_json::Value> = pages
        .into_iter()
        .flat_map(|page| page.records)
        .collect();
    if raw_records.is_empty() {
        info!("window {window}: no data available");
        return Ok(0);
    }

    let mut ad_ids: Vec<String> = raw_records
        .iter()
        .filter_map(|r| r.get("dimensions")?.get("ad_id"))
        .filter_map(|id| match id {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect();
    ad_ids.sort();
    ad_ids.dedup();

    let details = api.fetch_ad_details(&ad_ids).await?;

    // One malformed record fails its whole window rather than being
    // silently dropped; the orchestrator records the window failure and
    // the run moves on.
    let transformed = raw_records
        .iter()
        .map(|raw| transform_record(raw, &details))
        .collect::<Result<Vec<_>, _>>()?;

    let deduplicated = assemble(transformed, advertiser_id);
    sink.write(&deduplicated, mode).await
}

/// Runs the pipeline over the planned windows sequentially.
///
/// Per-window failures are recorded and the run continues; an auth
/// rejection aborts the whole run since no later window can succeed.
/// Under Truncate, only the first non-empty write replaces the table;
/// later windows append to it.
pub async fn execute(
    api: &dyn ReportApi,
    sink: &dyn ReportSink,
    paginator: &Paginator,
    advertiser_id: &str,
    windows: &[DateWindow],
    mode: WriteMode,
) -> Result<RunResult, Error> {
    let mut result = RunResult::default();
    let mut next_mode = mode;

    for window in windows {
        result.windows_attempted += 1;
        info!("processing window {window}");

        match process_window(api, sink, paginator, advertiser_id, window, next_mode).await {
            Ok(rows) => {
                result.rows_loaded += rows;
                if rows > 0 {
                    next_mode = WriteMode::Append;
                }
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                error!("window {window} failed: {err}");
                result.windows_failed += 1;
                result.errors.push(WindowFailure {
                    window: *window,
                    error: err.to_string(),
                });
            }
        }
    }

    Ok(result)
}

/// Entry point used by the CLI: wires the real API client and parquet
/// sink together and runs the spec.
pub async fn run_report_pipeline(
    config: &Config,
    spec: RunSpec,
    mode: WriteMode,
) -> Result<RunResult, Error> {
    let credentials = config.credentials();
    let advertiser_id = credentials.advertiser_id.clone();

    let api = ApiClient::new(&config.api_url, credentials, config.page_size);
    let sink = ParquetReportSink::new(&config.table_path);
    let paginator = Paginator::new(
        config.max_pages,
        config.max_attempts,
        Duration::from_millis(config.base_backoff_ms),
        Duration::from_millis(config.max_backoff_ms),
    );

    let today = Utc::now().date_naive();
    let windows = plan_windows(
        &spec,
        today,
        config.freshness_delay_days,
        config.max_window_days,
    )?;
    if windows.is_empty() {
        info!("nothing to do: requested range is entirely within the upstream freshness delay");
        return Ok(RunResult::default());
    }

    execute(&api, &sink, &paginator, &advertiser_id, &windows, mode).await
}
