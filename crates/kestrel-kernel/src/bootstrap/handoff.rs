//! The handoff file a terminating child leaves for its supervisor.

use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use kestrel_core::KernelId;
use kestrel_events::TerminationOperation;

use crate::error::KernelResult;
use crate::restart::Termination;

/// How the supervisor should relaunch.
///
/// ```toml
/// operation = "restart"
/// location = "/opt/kestrel/0.2.0"
/// kernel = "kernel-3f2a..."
/// written_at = "2026-01-01T00:00:00Z"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handoff {
    /// Requested operation.
    pub operation: TerminationOperation,
    /// Updated kernel artifact location, for restarts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Kernel that wrote the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<String>,
    /// When the file was written.
    pub written_at: DateTime<Utc>,
}

impl Handoff {
    /// Describe `termination`, written by `kernel`.
    #[must_use]
    pub fn new(termination: &Termination, kernel: Option<KernelId>) -> Self {
        Self {
            operation: termination.operation(),
            location: termination.location().map(str::to_string),
            kernel: kernel.map(|id| id.to_string()),
            written_at: Utc::now(),
        }
    }

    /// The termination this handoff describes.
    #[must_use]
    pub fn termination(&self) -> Termination {
        match self.operation {
            TerminationOperation::Restart => Termination::Restart {
                location: self.location.clone(),
            },
            TerminationOperation::Clean => Termination::Clean,
        }
    }

    /// Write to `path`, replacing any previous file.
    ///
    /// The document is written next to `path` and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or any filesystem step fails.
    pub fn write(&self, path: &Path) -> KernelResult<()> {
        let content = toml::to_string(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let staging = path.with_extension("toml.tmp");
        std::fs::write(&staging, content)?;
        std::fs::rename(&staging, path)?;
        debug!(path = %path.display(), operation = %self.operation, "handoff written");
        Ok(())
    }

    /// Read from `path`. A missing file is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or decoded.
    pub fn read(path: &Path) -> KernelResult<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(toml::from_str(&content)?))
    }

    /// Delete the file at `path`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove(path: &Path) -> io::Result<bool> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handoff.toml");
        let handoff = Handoff::new(
            &Termination::Restart {
                location: Some("/opt/kestrel/next".into()),
            },
            Some(KernelId::new()),
        );

        handoff.write(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("operation = \"restart\""));
        assert!(content.contains("location = \"/opt/kestrel/next\""));

        let read = Handoff::read(&path).unwrap().unwrap();
        assert_eq!(read, handoff);
        assert_eq!(read.termination(), Termination::Restart {
            location: Some("/opt/kestrel/next".into())
        });
        assert!(!dir.path().join("handoff.toml.tmp").exists());
    }

    #[test]
    fn test_clean_has_no_location() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("handoff.toml");
        Handoff::new(&Termination::Clean, None).write(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("operation = \"clean\""));
        assert!(!content.contains("location"));
    }

    #[test]
    fn test_read_accepts_minimal_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handoff.toml");
        std::fs::write(
            &path,
            "operation = \"clean\"\nwritten_at = \"2026-01-01T00:00:00Z\"\n",
        )
        .unwrap();
        assert_eq!(
            Handoff::read(&path).unwrap().unwrap().termination(),
            Termination::Clean
        );
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handoff.toml");
        assert!(Handoff::read(&path).unwrap().is_none());
        assert!(!Handoff::remove(&path).unwrap());
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handoff.toml");
        std::fs::write(&path, "operation = \"explode\"").unwrap();
        assert!(matches!(
            Handoff::read(&path),
            Err(crate::error::KernelError::HandoffDecode(_))
        ));
    }
}
