use chrono::{DateTime, Utc};
use log::{debug, info};
use nano_common::{
    network::Network,
    time::{nanos_to_seconds, TimestampNanos},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs;

use crate::{
    broadcast::BroadcastReport, cache::write_atomic, config::BlockKind, error::BenchmarkError,
    tracker::TrackingReport,
};

/// One benchmark run, as appended to the results log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    pub num_accounts: usize,
    // Broadcast end, run clock nanoseconds
    pub start_time: TimestampNanos,
    // Last counted confirmation, run clock nanoseconds
    pub end_time: TimestampNanos,
    pub total_duration_seconds: f64,
    pub confirmations_per_second: f64,
    pub run_timestamp: DateTime<Utc>,

    pub broadcast_start: TimestampNanos,
    pub broadcast_duration_seconds: f64,
    pub published: usize,
    pub publish_failures: usize,
    pub peers: usize,
    pub dropped_elections: usize,
    pub duplicates: usize,
    pub network: Network,
    pub block_kind: BlockKind,
}

/// Throughput between the end of the broadcast and the last confirmation.
/// The elapsed time is at least one nanosecond so the rate stays finite.
pub fn measure(
    num_accounts: usize,
    broadcast: &BroadcastReport,
    tracking: &TrackingReport,
    network: Network,
    block_kind: BlockKind,
) -> MeasurementResult {
    let elapsed = tracking.completed_at.saturating_sub(broadcast.end).max(1);
    let total_duration_seconds = nanos_to_seconds(elapsed);

    MeasurementResult {
        num_accounts,
        start_time: broadcast.end,
        end_time: tracking.completed_at,
        total_duration_seconds,
        confirmations_per_second: num_accounts as f64 / total_duration_seconds,
        run_timestamp: Utc::now(),
        broadcast_start: broadcast.start,
        broadcast_duration_seconds: nanos_to_seconds(broadcast.end.saturating_sub(broadcast.start)),
        published: broadcast.published,
        publish_failures: broadcast.failures,
        peers: broadcast.peers,
        dropped_elections: tracking.dropped_elections,
        duplicates: tracking.duplicates,
        network,
        block_kind,
    }
}

#[derive(Default, Serialize, Deserialize)]
struct ResultsFile {
    #[serde(default)]
    data: Vec<Value>,
}

/// JSON results log, newest entry first. Earlier entries are kept as they
/// are, even when written by another version.
pub struct ResultLog {
    path: PathBuf,
}

impl ResultLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Prepend the result. A log that cannot be parsed is left untouched.
    pub async fn append(&self, result: &MeasurementResult) -> Result<(), BenchmarkError> {
        let mut file = self.read().await?;
        let entry = serde_json::to_value(result).map_err(|e| BenchmarkError::storage(&self.path, e))?;
        file.data.insert(0, entry);

        let content =
            serde_json::to_string_pretty(&file).map_err(|e| BenchmarkError::storage(&self.path, e))?;
        write_atomic(&self.path, content.as_bytes()).await?;
        info!(
            "Result #{} written to {}",
            file.data.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn read(&self) -> Result<ResultsFile, BenchmarkError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                BenchmarkError::storage(&self.path, format!("unreadable results log: {}", e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Starting a new results log at {}", self.path.display());
                Ok(ResultsFile::default())
            }
            Err(e) => Err(BenchmarkError::storage(&self.path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    async fn entries(log: &ResultLog) -> Vec<Value> {
        log.read().await.unwrap().data
    }

    fn broadcast(start: TimestampNanos, end: TimestampNanos) -> BroadcastReport {
        BroadcastReport {
            start,
            end,
            published: 4,
            delivered: 8,
            failures: 0,
            peers: 2,
        }
    }

    fn tracking(completed_at: TimestampNanos) -> TrackingReport {
        TrackingReport {
            subscribed_at: 0,
            first_confirmation_at: Some(completed_at),
            completed_at,
            confirmed: 4,
            duplicates: 1,
            unexpected: 0,
            dropped_elections: 2,
            confirmed_hashes: HashSet::new(),
        }
    }

    #[test]
    fn test_measure() {
        let result = measure(
            4,
            &broadcast(1_000_000_000, 1_500_000_000),
            &tracking(3_500_000_000),
            Network::Beta,
            BlockKind::Change,
        );
        assert_eq!(result.start_time, 1_500_000_000);
        assert_eq!(result.end_time, 3_500_000_000);
        assert_eq!(result.total_duration_seconds, 2.0);
        assert_eq!(result.confirmations_per_second, 2.0);
        assert_eq!(result.broadcast_duration_seconds, 0.5);
        assert_eq!(result.dropped_elections, 2);
        assert_eq!(result.duplicates, 1);
    }

    #[test]
    fn test_measure_completion_before_broadcast_end() {
        let result = measure(
            4,
            &broadcast(10, 100),
            &tracking(90),
            Network::Beta,
            BlockKind::Change,
        );
        assert_eq!(result.total_duration_seconds, 1e-9);
        assert!(result.confirmations_per_second.is_finite());
        assert!(result.confirmations_per_second > 0.0);
    }

    #[tokio::test]
    async fn test_append_newest_first() {
        let dir = TempDir::new().unwrap();
        let log = ResultLog::new(dir.path().join("results.json"));
        let first = measure(1, &broadcast(0, 1), &tracking(2), Network::Beta, BlockKind::Change);
        let second = measure(2, &broadcast(0, 1), &tracking(3), Network::Dev, BlockKind::Send);

        log.append(&first).await.unwrap();
        log.append(&second).await.unwrap();

        let entries = entries(&log).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["num_accounts"], 2);
        assert_eq!(entries[0]["network"], "dev");
        assert_eq!(entries[0]["block_kind"], "send");
        assert_eq!(entries[1]["num_accounts"], 1);
        let parsed: MeasurementResult = serde_json::from_value(entries[1].clone()).unwrap();
        assert_eq!(parsed.end_time, first.end_time);
        assert_eq!(parsed.network, Network::Beta);
        assert_eq!(parsed.run_timestamp, first.run_timestamp);
    }

    #[tokio::test]
    async fn test_foreign_entries_are_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, r#"{"data":[{"numAccounts":10,"note":"older run"}]}"#).unwrap();

        let log = ResultLog::new(&path);
        log.append(&measure(1, &broadcast(0, 1), &tracking(2), Network::Beta, BlockKind::Change))
            .await
            .unwrap();
        let entries = entries(&log).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1]["note"], "older run");
    }

    #[tokio::test]
    async fn test_corrupt_log_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let log = ResultLog::new(&path);
        let err = log
            .append(&measure(1, &broadcast(0, 1), &tracking(2), Network::Beta, BlockKind::Change))
            .await
            .unwrap_err();
        assert!(matches!(err, BenchmarkError::Storage { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1, 2");
    }
}
