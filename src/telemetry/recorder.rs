//! # Telemetry Recorder
//!
//! Appends telemetry updates to JSONL files with rotation.
//!
//! Each line is `{"received_at": ..., "kind": ..., "snapshot": ...}`. A file
//! is closed after `max_records_per_file` lines and only the newest
//! `max_files_to_keep` files are retained.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::presentation::DashboardEvent;

const FILE_PREFIX: &str = "telemetry_";
const FILE_SUFFIX: &str = ".jsonl";

/// Rotating JSONL writer for telemetry updates
pub struct TelemetryRecorder {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    run_stamp: String,
    file_seq: u32,
    records_in_file: usize,
    writer: Option<BufWriter<File>>,
}

impl TelemetryRecorder {
    /// Create the recorder, making the log directory if needed
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory cannot be created
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        Self::with_limits(
            &config.log_dir,
            config.max_records_per_file,
            config.max_files_to_keep,
        )
    }

    pub fn with_limits<P: AsRef<Path>>(
        dir: P,
        max_records_per_file: usize,
        max_files_to_keep: usize,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!("Recording telemetry to {}", dir.display());

        Ok(Self {
            dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            run_stamp: Utc::now().format("%Y%m%dT%H%M%S").to_string(),
            file_seq: 0,
            records_in_file: 0,
            writer: None,
        })
    }

    /// Record a dashboard event
    ///
    /// Only telemetry, raw status and LED updates are written; other events
    /// are ignored.
    pub fn record(&mut self, event: &DashboardEvent) -> Result<()> {
        match event {
            DashboardEvent::TelemetryUpdated {
                snapshot,
                received_at,
            } => self.write_line("status", snapshot, *received_at),
            DashboardEvent::RawStatus { text } => self.write_line("raw_status", text, Utc::now()),
            DashboardEvent::LedUpdated { snapshot } => self.write_line("led", snapshot, Utc::now()),
            _ => Ok(()),
        }
    }

    fn write_line<T: Serialize>(
        &mut self,
        kind: &str,
        snapshot: &T,
        received_at: DateTime<Utc>,
    ) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let line = json!({
            "received_at": received_at,
            "kind": kind,
            "snapshot": snapshot,
        });

        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, &line)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            self.records_in_file += 1;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        self.file_seq += 1;
        let path = self.dir.join(format!(
            "{}{}_{:06}{}",
            FILE_PREFIX, self.run_stamp, self.file_seq, FILE_SUFFIX
        ));
        debug!("Opening telemetry file {}", path.display());

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;

        self.prune()
    }

    fn prune(&self) -> Result<()> {
        let mut files = self.log_files()?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for old in files.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&old) {
                warn!("Failed to remove old telemetry file {}: {}", old.display(), e);
            }
        }
        Ok(())
    }

    /// Telemetry files currently present in the log directory
    pub fn log_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_log = path
                .file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| {
                    name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX)
                });
            if is_log {
                files.push(path);
            }
        }
        Ok(files)
    }
}
