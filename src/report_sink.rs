use crate::data::{records_to_batch, validate_batch};
use crate::error::Error;
use crate::transform::CanonicalRecord;
use clap::ValueEnum;
use datafusion::dataframe::DataFrameWriteOptions;
use datafusion::prelude::SessionContext;
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Destination commit strategy. A closed enum so an unrecognized mode is
/// a parse-time configuration error, not a string compared at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WriteMode {
    /// Add the batch to the existing table contents.
    Append,
    /// Replace the table contents with the batch.
    Truncate,
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteMode::Append => write!(f, "append"),
            WriteMode::Truncate => write!(f, "truncate"),
        }
    }
}

impl FromStr for WriteMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "append" | "write_append" => Ok(WriteMode::Append),
            "truncate" | "write_truncate" | "overwrite" => Ok(WriteMode::Truncate),
            other => Err(Error::Configuration {
                message: format!("unrecognized write mode '{other}'"),
            }),
        }
    }
}

#[async_trait::async_trait]
pub trait ReportSink: Send + Sync + 'static {
    /// Writes one validated batch to the destination table.
    ///
    /// The entire batch is schema-checked before the first row is
    /// emitted, so a validation failure never leaves a partial write.
    /// Returns the number of rows written.
    async fn write(&self, records: &[CanonicalRecord], mode: WriteMode)
        -> Result<usize, Error>;
}

/// Parquet-backed report table: a directory of `part-NNNNN.parquet`
/// files written through DataFusion.
#[derive(Clone)]
pub struct ParquetReportSink {
    table_path: String,
}

impl ParquetReportSink {
    pub fn new(table_path: &str) -> Self {
        ParquetReportSink {
            table_path: table_path.to_string(),
        }
    }

    fn part_files(&self) -> Result<Vec<PathBuf>, Error> {
        if !Path::new(&self.table_path).exists() {
            return Ok(vec![]);
        }

        let mut parts = vec![];
        for entry in fs::read_dir(&self.table_path)? {
            let path = entry?.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.starts_with("part-") && name.ends_with(".parquet") {
                parts.push(path);
            }
        }
        parts.sort();
        Ok(parts)
    }

    fn next_part_path(&self, existing: &[PathBuf]) -> String {
        let next = existing
            .iter()
            .filter_map(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_prefix("part-"))
                    .and_then(|n| n.strip_suffix(".parquet"))
                    .and_then(|n| n.parse::<u64>().ok())
            })
            .max()
            .map_or(0, |max| max + 1);
        format!("{}/part-{:05}.parquet", self.table_path, next)
    }
}

#[async_trait::async_trait]
impl ReportSink for ParquetReportSink {
    async fn write(
        &self,
        records: &[CanonicalRecord],
        mode: WriteMode,
    ) -> Result<usize, Error> {
        if records.is_empty() {
            warn!("no rows in batch, leaving table untouched");
            return Ok(0);
        }

        // Validate everything before touching the destination.
        let batch = records_to_batch(records)?;
        validate_batch(&batch)?;

        fs::create_dir_all(&self.table_path)?;

        let mut existing = self.part_files()?;
        if mode == WriteMode::Truncate {
            for part in existing.drain(..) {
                fs::remove_file(part)?;
            }
        }

        let path = self.next_part_path(&existing);
        let ctx = SessionContext::new();
        let df = ctx.read_batch(batch)?;
        df.write_parquet(&path, DataFrameWriteOptions::default(), None)
            .await?;

        info!("wrote {} rows to {}", records.len(), path);
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::transform_record;
    use datafusion::prelude::ParquetReadOptions;
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn sample_records(n: usize) -> Vec<CanonicalRecord> {
        (0..n)
            .map(|i| {
                let raw = json!({
                    "dimensions": {"ad_id": format!("ad-{i}"), "stat_time_day": "2025-10-07"},
                    "metrics": {"spend": 2.0, "impressions": 10, "clicks": 1}
                });
                transform_record(&raw, &HashMap::new()).unwrap()
            })
            .collect()
    }

    async fn table_row_count(sink: &ParquetReportSink) -> usize {
        let ctx = SessionContext::new();
        let mut rows = 0;
        for part in sink.part_files().unwrap() {
            let df = ctx
                .read_parquet(part.to_str().unwrap(), ParquetReadOptions::default())
                .await
                .unwrap();
            rows += df.count().await.unwrap();
        }
        rows
    }

    #[test]
    fn test_write_mode_parses_known_values() {
        assert_eq!(
            <WriteMode as FromStr>::from_str("append").unwrap(),
            WriteMode::Append
        );
        assert_eq!(
            <WriteMode as FromStr>::from_str("WRITE_APPEND").unwrap(),
            WriteMode::Append
        );
        assert_eq!(
            <WriteMode as FromStr>::from_str("truncate").unwrap(),
            WriteMode::Truncate
        );
        assert_eq!(
            <WriteMode as FromStr>::from_str("WRITE_TRUNCATE").unwrap(),
            WriteMode::Truncate
        );
        assert_eq!(
            <WriteMode as FromStr>::from_str("overwrite").unwrap(),
            WriteMode::Truncate
        );
    }

    #[test]
    fn test_write_mode_rejects_unknown_value() {
        assert!(matches!(
            <WriteMode as FromStr>::from_str("upsert").unwrap_err(),
            Error::Configuration { .. }
        ));
    }

    #[tokio::test]
    async fn test_append_twice_doubles_rows() {
        let dir = TempDir::new().unwrap();
        let sink = ParquetReportSink::new(dir.path().to_str().unwrap());
        let records = sample_records(3);

        assert_eq!(sink.write(&records, WriteMode::Append).await.unwrap(), 3);
        assert_eq!(sink.write(&records, WriteMode::Append).await.unwrap(), 3);
        assert_eq!(table_row_count(&sink).await, 6);
    }

    #[tokio::test]
    async fn test_truncate_twice_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let sink = ParquetReportSink::new(dir.path().to_str().unwrap());
        let records = sample_records(4);

        sink.write(&records, WriteMode::Truncate).await.unwrap();
        let first = table_row_count(&sink).await;
        sink.write(&records, WriteMode::Truncate).await.unwrap();

        assert_eq!(first, 4);
        assert_eq!(table_row_count(&sink).await, 4);
    }

    #[tokio::test]
    async fn test_truncate_replaces_appended_rows() {
        let dir = TempDir::new().unwrap();
        let sink = ParquetReportSink::new(dir.path().to_str().unwrap());

        sink.write(&sample_records(5), WriteMode::Append).await.unwrap();
        sink.write(&sample_records(2), WriteMode::Truncate).await.unwrap();

        assert_eq!(table_row_count(&sink).await, 2);
    }

    #[tokio::test]
    async fn test_empty_batch_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let sink = ParquetReportSink::new(dir.path().to_str().unwrap());

        assert_eq!(sink.write(&[], WriteMode::Append).await.unwrap(), 0);
        assert!(sink.part_files().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_part_files_get_sequential_names() {
        let dir = TempDir::new().unwrap();
        let sink = ParquetReportSink::new(dir.path().to_str().unwrap());

        sink.write(&sample_records(1), WriteMode::Append).await.unwrap();
        sink.write(&sample_records(1), WriteMode::Append).await.unwrap();

        let names: Vec<String> = sink
            .part_files()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["part-00000.parquet", "part-00001.parquet"]);
    }
}
