//! Discovery-call transcript ingestion.
//!
//! An uploaded `.txt` file is validated, normalized to plain ASCII, stored in
//! the transcript bucket and linked from the lead. Either every step lands or
//! nothing is left behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{StorageError, TranscriptError};
use crate::leads::record::{Lead, LeadPatch};
use crate::store::{LeadStore, ObjectStorage};

/// Upper bound on an uploaded transcript, in bytes.
pub const MAX_TRANSCRIPT_BYTES: u64 = 10 * 1024 * 1024;

const CONTENT_TYPE: &str = "text/plain";
const PATH_ATTEMPTS: i64 = 3;

/// Clean transcript text: normalize line endings to `\n`, drop everything
/// outside printable ASCII except `\n` and `\t`, and trim.
pub fn normalize_transcript(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let kept: String = unified
        .chars()
        .filter(|c| matches!(c, ' '..='~' | '\n' | '\t'))
        .collect();
    kept.trim().to_string()
}

/// A transcript file picked for upload.
#[derive(Debug, Clone)]
pub struct TranscriptFile {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Case-sensitive: `notes.TXT` is refused.
fn check_extension(file_name: &str) -> Result<(), TranscriptError> {
    if !file_name.ends_with(".txt") {
        return Err(TranscriptError::UnsupportedFormat {
            file_name: file_name.to_string(),
        });
    }
    Ok(())
}

fn check_size(size: u64) -> Result<(), TranscriptError> {
    if size > MAX_TRANSCRIPT_BYTES {
        return Err(TranscriptError::FileTooLarge { size });
    }
    Ok(())
}

impl TranscriptFile {
    /// Validate an in-memory file.
    pub fn new(
        file_name: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Result<Self, TranscriptError> {
        let file_name = file_name.into();
        let bytes = bytes.into();
        check_extension(&file_name)?;
        check_size(bytes.len() as u64)?;
        Ok(Self { file_name, bytes })
    }

    /// Validate and read a file from disk. Name and size are checked before
    /// the contents are read.
    pub async fn read(path: &Path) -> Result<Self, TranscriptError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        check_extension(&file_name)?;
        check_size(tokio::fs::metadata(path).await?.len())?;
        let bytes = tokio::fs::read(path).await?;
        Self::new(file_name, bytes)
    }

    pub fn normalized_text(&self) -> String {
        normalize_transcript(&String::from_utf8_lossy(&self.bytes))
    }
}

/// Result of a successful ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedTranscript {
    pub url: String,
    pub transcript_text: String,
    /// The lead as stored after the transcript was attached.
    pub lead: Lead,
}

/// Object path for a transcript uploaded at `at`.
pub fn object_path(lead_id: &str, at: DateTime<Utc>) -> String {
    format!("{}/{}-transcript.txt", lead_id, at.timestamp_millis())
}

/// Patch for a hand-edited transcript, or `None` when the cleaned text equals
/// what is already stored. Blank text clears the transcript.
pub fn transcript_text_patch(lead: &Lead, edited: &str) -> Option<LeadPatch> {
    let next = normalize_transcript(edited);
    let stored = lead
        .discovery_call
        .call_transcript
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();
    if next == stored {
        return None;
    }
    Some(LeadPatch {
        dc_call_transcript: Some((!next.is_empty()).then_some(next)),
        ..LeadPatch::default()
    })
}

/// A stored transcript prepared for saving to a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptExport {
    pub file_name: String,
    pub text: String,
}

impl TranscriptExport {
    /// `None` when the lead has no transcript text.
    ///
    /// The file is named `transcript-<contact>-<YYYY-MM-DD>.txt`, with each
    /// whitespace run in the contact name replaced by `-`.
    pub fn for_lead(lead: &Lead, on: NaiveDate) -> Option<Self> {
        let raw = lead
            .discovery_call
            .call_transcript
            .as_deref()
            .filter(|t| !t.is_empty())?;
        let mut contact = String::with_capacity(lead.contact.name.len());
        let mut in_space = false;
        for c in lead.contact.name.chars() {
            if !c.is_whitespace() {
                contact.push(c);
            } else if !in_space {
                contact.push('-');
            }
            in_space = c.is_whitespace();
        }
        Some(Self {
            file_name: format!("transcript-{}-{}.txt", contact, on.format("%Y-%m-%d")),
            text: normalize_transcript(raw),
        })
    }

    /// Write into `dir` and return the full path.
    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf, TranscriptError> {
        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, self.text.as_bytes())
            .await
            .map_err(TranscriptError::Write)?;
        Ok(path)
    }
}

#[derive(Clone)]
pub struct TranscriptIngestor {
    store: Arc<dyn LeadStore>,
    storage: Arc<dyn ObjectStorage>,
}

impl TranscriptIngestor {
    pub fn new(store: Arc<dyn LeadStore>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { store, storage }
    }

    /// Store `file` and attach it to `lead_id`.
    pub async fn ingest(
        &self,
        lead_id: &str,
        file: TranscriptFile,
        now: DateTime<Utc>,
    ) -> Result<IngestedTranscript, TranscriptError> {
        let transcript_text = file.normalized_text();
        let path = self.upload(lead_id, file.bytes, now).await?;
        let url = self.storage.public_url(&path);

        let patch = LeadPatch {
            dc_call_transcript: Some(Some(transcript_text.clone())),
            dc_call_transcript_url: Some(Some(url.clone())),
            ..LeadPatch::default()
        };
        let stored = match self.store.update_lead(lead_id, &patch).await {
            Ok(Some(lead)) => lead,
            Ok(None) => {
                self.discard(&path).await;
                return Err(TranscriptError::LeadMissing(lead_id.to_string()));
            }
            Err(e) => {
                tracing::error!(lead_id, "Saving transcript on lead failed: {}", e);
                self.discard(&path).await;
                return Err(e.into());
            }
        };

        tracing::info!(lead_id, path = %path, "Transcript ingested");
        Ok(IngestedTranscript {
            url,
            transcript_text,
            lead: stored,
        })
    }

    /// Upload without overwriting. Same-millisecond collisions move to the
    /// next free millisecond.
    async fn upload(
        &self,
        lead_id: &str,
        bytes: Bytes,
        now: DateTime<Utc>,
    ) -> Result<String, TranscriptError> {
        let mut last = None;
        for offset in 0..PATH_ATTEMPTS {
            let path = object_path(lead_id, now + chrono::Duration::milliseconds(offset));
            match self
                .storage
                .upload(&path, bytes.clone(), CONTENT_TYPE, false)
                .await
            {
                Ok(()) => return Ok(path),
                Err(e @ StorageError::AlreadyExists { .. }) => {
                    tracing::debug!("{}, trying next timestamp", e);
                    last = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last
            .unwrap_or_else(|| StorageError::AlreadyExists {
                path: object_path(lead_id, now),
            })
            .into())
    }

    async fn discard(&self, path: &str) {
        if let Err(e) = self.storage.remove(path).await {
            tracing::warn!(path, "Could not remove orphaned transcript: {}", e);
        }
    }
}
