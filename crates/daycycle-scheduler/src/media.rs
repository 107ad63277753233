//! Participant media on disk: `<root>/<participant>/<date>_<kind>_<HHMMSS>.<ext>`.

use chrono::DateTime;
use chrono_tz::Tz;
use daycycle_core::{AttachmentKind, DaycycleError, ParticipantId, Result};
use std::path::{Path, PathBuf};

/// Extensions listed as media.
const MEDIA_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "mp4", "mov"];

/// Media directory tree, one subdirectory per participant.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for one participant.
    pub fn participant_dir(&self, participant: ParticipantId) -> PathBuf {
        self.root.join(participant.to_string())
    }

    /// Store downloaded bytes and return the file path.
    pub fn save(
        &self,
        participant: ParticipantId,
        kind: AttachmentKind,
        bytes: &[u8],
        at: DateTime<Tz>,
    ) -> Result<PathBuf> {
        let ext = kind.extension().ok_or_else(|| {
            DaycycleError::Validation(format!("{kind} attachments are not stored"))
        })?;
        let dir = self.participant_dir(participant);
        std::fs::create_dir_all(&dir)?;
        let name = format!(
            "{}_{}_{}.{}",
            at.format("%Y-%m-%d"),
            kind,
            at.format("%H%M%S"),
            ext
        );
        let path = dir.join(name);
        std::fs::write(&path, bytes)?;
        tracing::info!("📎 Saved {kind} for {participant} to {}", path.display());
        Ok(path)
    }

    /// Media files of one participant, sorted by name (oldest first).
    pub fn list_files(&self, participant: ParticipantId) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(self.participant_dir(participant)) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_media(p))
            .collect();
        files.sort();
        files
    }

    /// Participants with at least one media file, with their file counts.
    /// Sorted by count, highest first.
    pub fn participants_with_media(&self) -> Vec<(ParticipantId, usize)> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut found: Vec<(ParticipantId, usize)> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str()?.parse::<ParticipantId>().ok())
            .map(|id| (id, self.list_files(id).len()))
            .filter(|(_, count)| *count > 0)
            .collect();
        found.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        found
    }
}

/// Kind of a stored file, judged by extension.
pub fn kind_of(path: &Path) -> Option<AttachmentKind> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" | "png" => Some(AttachmentKind::Photo),
        "mp4" | "mov" => Some(AttachmentKind::Video),
        _ => None,
    }
}

fn is_media(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| MEDIA_EXTENSIONS.contains(&e.to_lowercase().as_str()))
}
