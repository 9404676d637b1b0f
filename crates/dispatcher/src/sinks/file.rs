//! FileSink - 以 JSON lines 格式写出事件
//!
//! 每行一个事件，带序号与 sink 名称：
//!
//! ```text
//! {"seq":0,"sink":"events","kind":"sync_found","index":16,"video_ts":5000000000,"audio_ts":5000050000}
//! ```

use contracts::{ContractError, EventSink, SyncEvent};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, error, instrument};

/// FileSink 配置
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// 输出文件
    pub path: PathBuf,
    /// 追加写入，否则截断
    pub append: bool,
    /// 只写配对事件
    pub sync_only: bool,
}

impl FileSinkConfig {
    /// 从 params 构造
    ///
    /// `path` 必填；`append` 与 `sync_only` 取 "true"/"false"。
    pub fn from_params(params: &HashMap<String, String>) -> std::io::Result<Self> {
        let path = params.get("path").map(PathBuf::from).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "missing 'path' param")
        })?;
        Ok(Self {
            path,
            append: flag(params, "append")?,
            sync_only: flag(params, "sync_only")?,
        })
    }
}

fn flag(params: &HashMap<String, String>, key: &str) -> std::io::Result<bool> {
    match params.get(key).map(String::as_str) {
        None => Ok(false),
        Some(value) => value.parse().map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("'{key}' must be true or false, got '{value}'"),
            )
        }),
    }
}

#[derive(Serialize)]
struct Line<'a> {
    seq: u64,
    sink: &'a str,
    #[serde(flatten)]
    event: &'a SyncEvent,
}

/// 写 JSON lines 的 sink
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    writer: BufWriter<File>,
    seq: u64,
}

impl FileSink {
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(config.append)
            .truncate(!config.append)
            .open(&config.path)?;

        Ok(Self {
            name: name.into(),
            config,
            writer: BufWriter::new(file),
            seq: 0,
        })
    }

    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileSinkConfig::from_params(params)?;
        Self::new(name, config)
    }

    pub fn path(&self) -> &PathBuf {
        &self.config.path
    }

    fn write_line(&mut self, event: &SyncEvent) -> std::io::Result<()> {
        let line = Line {
            seq: self.seq,
            sink: &self.name,
            event,
        };
        serde_json::to_writer(&mut self.writer, &line)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        self.writer.write_all(b"\n")?;
        self.seq += 1;
        Ok(())
    }

    fn to_contract_error(&self, e: std::io::Error) -> ContractError {
        error!(sink = %self.name, path = %self.config.path.display(), error = %e, "Write failed");
        ContractError::sink_write(&self.name, e.to_string())
    }
}

impl EventSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, event),
        fields(sink = %self.name, kind = event.kind())
    )]
    async fn write(&mut self, event: &SyncEvent) -> Result<(), ContractError> {
        if self.config.sync_only && !matches!(event, SyncEvent::SyncFound(_)) {
            return Ok(());
        }
        self.write_line(event).map_err(|e| self.to_contract_error(e))
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        self.writer.flush().map_err(|e| self.to_contract_error(e))
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.writer.flush().map_err(|e| self.to_contract_error(e))?;
        debug!(sink = %self.name, lines = self.seq, "FileSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{AudioMarkerEvent, SyncFoundEvent};
    use tempfile::tempdir;

    fn params(path: &std::path::Path, extra: &[(&str, &str)]) -> HashMap<String, String> {
        let mut params = HashMap::new();
        params.insert("path".to_string(), path.display().to_string());
        for (k, v) in extra {
            params.insert(k.to_string(), v.to_string());
        }
        params
    }

    fn events() -> Vec<SyncEvent> {
        vec![
            SyncEvent::AudioMarker(AudioMarkerEvent {
                timestamp: 5_000_050_000,
                index: 16,
                score: 0.3,
                channel: 0,
                index_modulus: 256,
            }),
            SyncEvent::SyncFound(SyncFoundEvent {
                index: 16,
                video_ts: 5_000_000_000,
                audio_ts: 5_000_050_000,
            }),
        ]
    }

    #[tokio::test]
    async fn test_file_sink_writes_json_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out/events.jsonl");

        let mut sink = FileSink::from_params("events", &params(&path, &[])).unwrap();
        for event in events() {
            sink.write(&event).await.unwrap();
        }
        sink.close().await.unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["seq"], 0);
        assert_eq!(lines[0]["kind"], "audio_marker");
        assert_eq!(lines[1]["kind"], "sync_found");
        assert_eq!(lines[1]["sink"], "events");
        assert_eq!(lines[1]["audio_ts"], 5_000_050_000u64);

        let back: SyncEvent = serde_json::from_str(text.lines().nth(1).unwrap()).unwrap();
        assert_eq!(back, events()[1]);
    }

    #[tokio::test]
    async fn test_file_sink_sync_only_and_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let p = params(&path, &[("sync_only", "true"), ("append", "true")]);

        for _ in 0..2 {
            let mut sink = FileSink::from_params("events", &p).unwrap();
            for event in events() {
                sink.write(&event).await.unwrap();
            }
            sink.close().await.unwrap();
        }

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().all(|l| l.contains("\"sync_found\"")));
    }

    #[test]
    fn test_config_requires_path() {
        assert!(FileSinkConfig::from_params(&HashMap::new()).is_err());

        let dir = tempdir().unwrap();
        let bad = params(&dir.path().join("x"), &[("append", "yes")]);
        assert!(FileSinkConfig::from_params(&bad).is_err());
    }
}
