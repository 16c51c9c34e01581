// Append-only JSONL telemetry log and snapshot export
use crate::domain::connection::ConnectionTarget;
use crate::domain::error::LogError;
use crate::domain::telemetry::TelemetryRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// An open log file. Dropping it releases the handle; `close` also syncs.
#[derive(Debug)]
pub struct SessionLog {
    path: PathBuf,
    file: File,
    samples_written: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogLine<'a> {
    sample_index: u64,
    device: &'a str,
    #[serde(flatten)]
    record: &'a TelemetryRecord,
}

impl SessionLog {
    /// Open `path` for append, creating parent directories.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, LogError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| LogError::new("create directory for", &path, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| LogError::new("open", &path, e))?;

        tracing::info!("Telemetry log opened: {}", path.display());
        Ok(Self {
            path,
            file,
            samples_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Write one self-contained line and flush it before returning.
    pub async fn append(
        &mut self,
        record: &TelemetryRecord,
        sample_index: u64,
        device: &str,
    ) -> Result<(), LogError> {
        let line = LogLine {
            sample_index,
            device,
            record,
        };
        let mut bytes = serde_json::to_vec(&line).map_err(|e| {
            LogError::new("serialize sample for", &self.path, std::io::Error::other(e))
        })?;
        bytes.push(b'\n');

        self.file
            .write_all(&bytes)
            .await
            .map_err(|e| LogError::new("append to", &self.path, e))?;
        self.file
            .flush()
            .await
            .map_err(|e| LogError::new("flush", &self.path, e))?;

        self.samples_written += 1;
        Ok(())
    }

    pub async fn close(mut self) -> Result<u64, LogError> {
        self.file
            .flush()
            .await
            .map_err(|e| LogError::new("flush", &self.path, e))?;
        self.file
            .sync_all()
            .await
            .map_err(|e| LogError::new("sync", &self.path, e))?;
        tracing::info!(
            "Telemetry log closed: {} ({} samples)",
            self.path.display(),
            self.samples_written
        );
        Ok(self.samples_written)
    }
}

/// Metadata stamped onto an export document
#[derive(Debug, Clone)]
pub struct ExportMetadata {
    pub exported_at: DateTime<Utc>,
    pub target: Option<ConnectionTarget>,
    pub samples_collected: u64,
}

/// Build the export document for `history`. Pure: touches no files.
pub fn export_snapshot(
    history: &[Arc<TelemetryRecord>],
    metadata: &ExportMetadata,
) -> serde_json::Value {
    json!({
        "exportedAt": metadata.exported_at,
        "target": metadata.target.as_ref().map(|t| json!({
            "address": t.to_string(),
            "host": t.host,
            "port": t.port,
            "refreshIntervalSeconds": t.refresh_interval_seconds,
        })),
        "sampleCount": history.len(),
        "samplesCollected": metadata.samples_collected,
        "samples": history,
    })
}

pub async fn write_export(path: &Path, document: &serde_json::Value) -> Result<(), LogError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| LogError::new("create directory for", path, e))?;
    }
    let text = serde_json::to_vec_pretty(document)
        .map_err(|e| LogError::new("serialize export for", path, std::io::Error::other(e)))?;
    fs::write(path, text)
        .await
        .map_err(|e| LogError::new("write", path, e))
}

/// `<directory>/tlm_<yyyymmddTHHMMSSZ>_<host>_<port>.<extension>`
pub fn default_file_path(
    directory: &Path,
    target: Option<&ConnectionTarget>,
    at: DateTime<Utc>,
    extension: &str,
) -> PathBuf {
    let stamp = at.format("%Y%m%dT%H%M%SZ");
    let name = match target {
        Some(target) => format!("tlm_{}_{}.{}", stamp, target.file_stem(), extension),
        None => format!("tlm_{}.{}", stamp, extension),
    };
    directory.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::collections::BTreeSet;

    fn record(i: u64) -> TelemetryRecord {
        TelemetryRecord {
            timestamp_utc: Utc::now() + chrono::Duration::milliseconds(i as i64),
            mode: "RUN".to_string(),
            temperature: 35.0 + i as f64 * 0.1,
            voltage: 12.1,
            current: 1.5,
            uptime_seconds: i,
            latency_ms: 3.25,
            faults: BTreeSet::from(["TEMP_WARN".to_string()]),
            raw: json!({"st": "RUN", "tmp1": 35.0 + i as f64 * 0.1}),
        }
    }

    #[tokio::test]
    async fn test_append_writes_one_parseable_line_per_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/session.jsonl");

        let mut log = SessionLog::open(&path).await.unwrap();
        for i in 1..=5 {
            log.append(&record(i), i, "127.0.0.1:8001").await.unwrap();
        }
        assert_eq!(log.close().await.unwrap(), 5);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(text.ends_with('\n'));
        for (i, line) in lines.iter().enumerate() {
            let value: Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["sampleIndex"], json!(i as u64 + 1));
            assert_eq!(value["device"], json!("127.0.0.1:8001"));
            assert_eq!(value["mode"], json!("RUN"));
            assert_eq!(value["faults"], json!(["TEMP_WARN"]));
        }
    }

    #[tokio::test]
    async fn test_reopen_appends_without_touching_previous_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.jsonl");

        let mut log = SessionLog::open(&path).await.unwrap();
        log.append(&record(1), 1, "dev").await.unwrap();
        drop(log);
        let before = std::fs::read_to_string(&path).unwrap();

        let mut log = SessionLog::open(&path).await.unwrap();
        log.append(&record(2), 2, "dev").await.unwrap();
        log.close().await.unwrap();

        let after = std::fs::read_to_string(&path).unwrap();
        assert!(after.starts_with(&before));
        assert_eq!(after.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_open_unwritable_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as an append-only file
        let err = SessionLog::open(dir.path()).await.unwrap_err();
        assert_eq!(err.action, "open");
    }

    #[test]
    fn test_export_snapshot_round_trips_history() {
        let history: Vec<Arc<TelemetryRecord>> = (1..=4).map(record).map(Arc::new).collect();
        let metadata = ExportMetadata {
            exported_at: Utc::now(),
            target: Some(ConnectionTarget::new("127.0.0.1", 8001, 1.0).unwrap()),
            samples_collected: 9,
        };

        let document = export_snapshot(&history, &metadata);
        let text = serde_json::to_string(&document).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(parsed["sampleCount"], json!(4));
        assert_eq!(parsed["samplesCollected"], json!(9));
        assert_eq!(parsed["target"]["address"], json!("127.0.0.1:8001"));
        let samples: Vec<TelemetryRecord> =
            serde_json::from_value(parsed["samples"].clone()).unwrap();
        assert_eq!(samples.len(), 4);
        assert!(samples.iter().zip(&history).all(|(a, b)| a == b.as_ref()));
    }

    #[tokio::test]
    async fn test_write_export_is_a_single_json_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exports/session.json");
        let metadata = ExportMetadata {
            exported_at: Utc::now(),
            target: None,
            samples_collected: 1,
        };
        let document = export_snapshot(&[Arc::new(record(1))], &metadata);

        write_export(&path, &document).await.unwrap();

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, document);
        assert!(parsed["target"].is_null());
    }

    #[test]
    fn test_default_file_path() {
        let at = DateTime::parse_from_rfc3339("2026-02-23T19:30:12Z")
            .unwrap()
            .with_timezone(&Utc);
        let target = ConnectionTarget::new("127.0.0.1", 8001, 1.0).unwrap();
        let path = default_file_path(Path::new("logs"), Some(&target), at, "jsonl");
        assert_eq!(path, PathBuf::from("logs/tlm_20260223T193012Z_127_0_0_1_8001.jsonl"));
    }
}
