//! Artifact fixtures on disk.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use kestrel_core::Coordinate;

/// A throwaway repository plus cache directory.
///
/// Artifacts are laid out at their canonical repository paths, so a
/// `RepositorySource` over [`repository`](Self::repository) finds them.
#[derive(Debug)]
pub struct ArtifactFixture {
    dir: TempDir,
}

impl ArtifactFixture {
    /// Create an empty fixture.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> io::Result<Self> {
        let dir = TempDir::new()?;
        std::fs::create_dir_all(dir.path().join("repository"))?;
        Ok(Self { dir })
    }

    /// Fixture root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Repository root artifacts are written under.
    #[must_use]
    pub fn repository(&self) -> PathBuf {
        self.dir.path().join("repository")
    }

    /// Cache directory. Not created until a kernel starts.
    #[must_use]
    pub fn cache(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    /// Handoff file path.
    #[must_use]
    pub fn handoff(&self) -> PathBuf {
        self.dir.path().join("handoff.toml")
    }

    /// Write an unpacked artifact directory holding `symbols`.
    ///
    /// # Errors
    ///
    /// Returns an error if `coordinate` is malformed or unversioned, or if
    /// a file cannot be written.
    pub fn directory(&self, coordinate: &str, symbols: &[(&str, &[u8])]) -> io::Result<Coordinate> {
        let coordinate = parse(coordinate)?;
        let relative = coordinate
            .unpacked_path()
            .ok_or_else(|| unversioned(&coordinate))?;
        let root = self.repository().join(relative);
        std::fs::create_dir_all(&root)?;
        for (symbol, bytes) in symbols {
            let path = root.join(symbol);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, bytes)?;
        }
        Ok(coordinate)
    }

    /// Write a tar archive holding `symbols`.
    ///
    /// # Errors
    ///
    /// Returns an error if `coordinate` is malformed or unversioned, or if
    /// the archive cannot be written.
    pub fn archive(&self, coordinate: &str, symbols: &[(&str, &[u8])]) -> io::Result<Coordinate> {
        let coordinate = parse(coordinate)?;
        let relative = coordinate
            .archive_path()
            .ok_or_else(|| unversioned(&coordinate))?;
        let path = self.repository().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut builder = tar::Builder::new(std::fs::File::create(&path)?);
        for (symbol, bytes) in symbols {
            let mut header = tar::Header::new_gnu();
            header.set_size(u64::try_from(bytes.len()).unwrap_or(u64::MAX));
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, symbol, *bytes)?;
        }
        builder.finish()?;
        Ok(coordinate)
    }
}

fn parse(coordinate: &str) -> io::Result<Coordinate> {
    Coordinate::parse(coordinate).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

fn unversioned(coordinate: &Coordinate) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("{coordinate} has no version"),
    )
}
