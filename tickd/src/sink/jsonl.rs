//! File-per-day JSONL sink: one file per `(symbol, kind, date)` under the
//! data root, optionally gzip-compressed.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use tickd_core::sink::{EventSink, SinkError};
use tickd_types::{Event, StorageConfig};

enum FileWriter {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl FileWriter {
    fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Plain(w) => {
                w.write_all(line)?;
                w.write_all(b"\n")
            }
            Self::Gzip(w) => {
                w.write_all(line)?;
                w.write_all(b"\n")
            }
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Gzip(w) => w.flush(),
        }
    }

    fn finish(self) -> std::io::Result<()> {
        match self {
            Self::Plain(mut w) => w.flush(),
            Self::Gzip(w) => w.finish().map(|mut inner| {
                let _ = inner.flush();
            }),
        }
    }
}

/// Durable JSONL sink writing `data_root/<symbol>/<kind>/<YYYY-MM-DD>.jsonl`
/// (`.jsonl.gz` when compression is on). Batch order is preserved; open
/// files are kept until [`EventSink::close`].
pub struct JsonlSink {
    cfg: StorageConfig,
    open: HashMap<PathBuf, FileWriter>,
}

impl JsonlSink {
    /// Sink rooted at the configured data directory.
    #[must_use]
    pub fn new(cfg: StorageConfig) -> Self {
        Self {
            cfg,
            open: HashMap::new(),
        }
    }

    fn path_for(&self, event: &Event) -> PathBuf {
        let date = event.timestamp.date_naive();
        let extension = if self.cfg.compress { "jsonl.gz" } else { "jsonl" };
        self.cfg
            .data_root
            .join(event.effective_symbol())
            .join(event.kind.as_str())
            .join(format!("{date}.{extension}"))
    }

    fn writer_for(&mut self, path: PathBuf) -> Result<&mut FileWriter, SinkError> {
        if !self.open.contains_key(&path) {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(classify_io)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(classify_io)?;
            let buffered = BufWriter::new(file);
            let writer = if self.cfg.compress {
                FileWriter::Gzip(GzEncoder::new(buffered, Compression::default()))
            } else {
                FileWriter::Plain(buffered)
            };
            self.open.insert(path.clone(), writer);
        }
        Ok(self.open.get_mut(&path).expect("inserted above"))
    }
}

fn classify_io(e: std::io::Error) -> SinkError {
    match e.kind() {
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => {
            SinkError::Retryable(e.to_string())
        }
        _ => SinkError::Terminal(e.to_string()),
    }
}

#[async_trait]
impl EventSink for JsonlSink {
    async fn write(&mut self, batch: &[Event]) -> Result<(), SinkError> {
        for event in batch {
            let line = serde_json::to_vec(event)
                .map_err(|e| SinkError::Terminal(format!("serialize event: {e}")))?;
            let path = self.path_for(event);
            self.writer_for(path)?.write_line(&line).map_err(classify_io)?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        for writer in self.open.values_mut() {
            writer.flush().map_err(classify_io)?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        for (_, writer) in self.open.drain() {
            writer.finish().map_err(classify_io)?;
        }
        Ok(())
    }
}
