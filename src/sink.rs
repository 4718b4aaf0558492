use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde_json::Value;

use crate::archive::ArchiveSource;
use crate::config::OutputLayout;
use crate::domain::{Artifact, ArtifactPayload, ContractId, ErrorInfo};
use crate::error::HarvestError;

#[derive(Debug, Clone, Serialize)]
pub struct RecordEntry {
    pub id: ContractId,
    pub data: Value,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stored {
    Document(Utf8PathBuf),
    Buffered { pending: usize },
    Batch(Utf8PathBuf),
}

/// Durable home for everything a run produces.
///
/// Documents are written as soon as they arrive. Records are buffered and
/// written in numbered batches once `record_batch_size` is reached, with the
/// remainder written by [`PersistenceSink::flush`].
#[derive(Debug)]
pub struct PersistenceSink {
    layout: OutputLayout,
    buffer: Vec<RecordEntry>,
    next_batch: usize,
}

impl PersistenceSink {
    pub fn new(layout: OutputLayout) -> Result<Self, HarvestError> {
        for dir in [&layout.root, &layout.downloads_dir, &layout.data_dir] {
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| HarvestError::Filesystem(format!("create {dir}: {err}")))?;
        }
        Ok(Self {
            layout,
            buffer: Vec::new(),
            next_batch: 1,
        })
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn document_path(&self, id: &ContractId) -> Utf8PathBuf {
        self.layout
            .downloads_dir
            .join(format!("{id}.{}", self.layout.document_extension))
    }

    pub fn batch_path(&self, batch: usize) -> Utf8PathBuf {
        self.layout.data_dir.join(format!("data_batch_{batch}.json"))
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn store(&mut self, artifact: &Artifact) -> Result<Stored, HarvestError> {
        match &artifact.payload {
            ArtifactPayload::Document(bytes) => {
                let path = self.document_path(&artifact.id);
                write_bytes_atomic(&path, bytes)?;
                Ok(Stored::Document(path))
            }
            ArtifactPayload::Record(data) => {
                self.buffer.push(RecordEntry {
                    id: artifact.id.clone(),
                    data: data.clone(),
                    timestamp: artifact.captured_at.clone(),
                });
                if self.buffer.len() >= self.layout.record_batch_size {
                    return match self.write_batch() {
                        Ok(path) => Ok(Stored::Batch(path)),
                        Err(err) => {
                            // A record whose attempt failed never reaches a later batch.
                            self.buffer.pop();
                            Err(err)
                        }
                    };
                }
                Ok(Stored::Buffered {
                    pending: self.buffer.len(),
                })
            }
        }
    }

    /// Writes any buffered records as a final batch.
    pub fn flush(&mut self) -> Result<Option<Utf8PathBuf>, HarvestError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        self.write_batch().map(Some)
    }

    pub fn write_failure_log(
        &self,
        failures: &[ErrorInfo],
    ) -> Result<Option<Utf8PathBuf>, HarvestError> {
        if failures.is_empty() {
            return Ok(None);
        }
        write_json_atomic(&self.layout.failure_log, failures)?;
        Ok(Some(self.layout.failure_log.clone()))
    }

    pub fn archive_sources(&self) -> Vec<ArchiveSource> {
        vec![
            ArchiveSource::new("downloads", self.layout.downloads_dir.clone()),
            ArchiveSource::new("data", self.layout.data_dir.clone()),
        ]
    }

    fn write_batch(&mut self) -> Result<Utf8PathBuf, HarvestError> {
        let path = self.batch_path(self.next_batch);
        // Buffer is kept on failure so a later write can try again.
        write_json_atomic(&path, &self.buffer)?;
        self.buffer.clear();
        self.next_batch += 1;
        Ok(path)
    }
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), HarvestError> {
    let parent = path
        .parent()
        .ok_or_else(|| HarvestError::Filesystem(format!("invalid destination path {path}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| HarvestError::Filesystem(format!("create {parent}: {err}")))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".harvest-write")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|err| HarvestError::Filesystem(format!("write {path}: {err}")))?;
    temp.persist(path.as_std_path())
        .map_err(|err| HarvestError::Filesystem(format!("persist {path}: {}", err.error)))?;
    Ok(())
}

pub fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Utf8Path,
    value: &T,
) -> Result<(), HarvestError> {
    let content =
        serde_json::to_vec_pretty(value).map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    write_bytes_atomic(path, &content)
}
