//! Artifact sources: where a coordinate's resource comes from.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, info};
use walkdir::WalkDir;

use kestrel_core::Coordinate;

use crate::error::{SourceError, SourceResult};

/// Supplies a local handle (file or directory) for a coordinate.
pub trait ArtifactSource: Send + Sync {
    /// Local path of the coordinate's resource.
    ///
    /// # Errors
    ///
    /// [`SourceError::ResourceUnavailable`] when nothing provides the
    /// coordinate, [`SourceError::TransferFailed`] when it was found but
    /// could not be made available locally.
    fn get(&self, coordinate: &Coordinate) -> SourceResult<PathBuf>;

    /// Name used in logs.
    fn name(&self) -> &str;
}

/// A local directory laid out by coordinate path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// Repository id.
    pub id: String,
    /// Root directory.
    pub root: PathBuf,
    /// Disabled repositories are skipped.
    pub enabled: bool,
}

impl Repository {
    /// An enabled repository.
    #[must_use]
    pub fn new(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
            enabled: true,
        }
    }

    /// Set the enabled flag.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Name prefix of in-flight copies inside the cache.
const STAGING_PREFIX: &str = ".staging-";

/// Cache-first source over an ordered list of local repositories.
///
/// A hit in a repository is copied into the cache and the cached path is
/// returned, so later lookups never touch the repository again. Only
/// versioned coordinates are served.
///
/// A versioned coordinate is treated as immutable: once cached, it is served
/// from the cache even if a repository earlier in the search order now holds
/// different content under the same coordinate. Publishing new content means
/// publishing a new version, or clearing the cache.
///
/// Copies are staged next to their final path and renamed into place, so a
/// failed copy never leaves a partial artifact behind.
#[derive(Debug)]
pub struct RepositorySource {
    repositories: Vec<Repository>,
    cache_dir: PathBuf,
}

impl RepositorySource {
    /// Source with no repositories, caching into `cache_dir`.
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            repositories: Vec::new(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Append a repository to the search order.
    #[must_use]
    pub fn with_repository(mut self, repository: Repository) -> Self {
        self.repositories.push(repository);
        self
    }

    /// Repositories in search order.
    #[must_use]
    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    /// Cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Create the cache directory if missing.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from directory creation.
    pub fn ensure_cache(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.cache_dir)
    }

    /// Delete the cache directory and everything in it.
    ///
    /// Returns `false` if there was no cache to delete.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from removal.
    pub fn clear_cache(&self) -> io::Result<bool> {
        match std::fs::remove_dir_all(&self.cache_dir) {
            Ok(()) => {
                info!(path = %self.cache_dir.display(), "artifact cache cleared");
                Ok(true)
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn lookup(root: &Path, archive: &str, unpacked: &str) -> Option<PathBuf> {
        let archive = root.join(archive);
        if archive.is_file() {
            return Some(archive);
        }
        let unpacked = root.join(unpacked);
        if unpacked.is_dir() {
            return Some(unpacked);
        }
        None
    }

    fn copy_into_cache(
        &self,
        coordinate: &Coordinate,
        found: &Path,
        relative: &str,
    ) -> SourceResult<PathBuf> {
        let target = self.cache_dir.join(relative.trim_end_matches('/'));
        let parent = target.parent().unwrap_or(self.cache_dir.as_path());
        std::fs::create_dir_all(parent).map_err(|e| SourceError::transfer(coordinate, e))?;

        install(found, parent, &target).map_err(|e| SourceError::transfer(coordinate, e))?;
        Ok(target)
    }
}

impl ArtifactSource for RepositorySource {
    fn get(&self, coordinate: &Coordinate) -> SourceResult<PathBuf> {
        let (Some(archive), Some(unpacked)) =
            (coordinate.archive_path(), coordinate.unpacked_path())
        else {
            return Err(SourceError::unavailable(
                coordinate,
                "coordinate has no version",
            ));
        };

        if let Some(cached) = Self::lookup(&self.cache_dir, &archive, &unpacked) {
            debug!(coordinate = %coordinate, path = %cached.display(), "cache hit");
            return Ok(cached);
        }

        for repo in self.repositories.iter().filter(|r| r.enabled) {
            let Some(found) = Self::lookup(&repo.root, &archive, &unpacked) else {
                continue;
            };
            let relative = if found.is_dir() { &unpacked } else { &archive };
            let cached = self.copy_into_cache(coordinate, &found, relative)?;
            info!(
                coordinate = %coordinate,
                repository = %repo.id,
                path = %cached.display(),
                "artifact copied into cache"
            );
            return Ok(cached);
        }

        Err(SourceError::unavailable(
            coordinate,
            format!("not found in cache or {} repositories", self.repositories.len()),
        ))
    }

    fn name(&self) -> &str {
        "repository"
    }
}

/// Copy `found` to a staging entry in `staging_dir`, then rename it to
/// `target`. The staging entry is removed on every path.
fn install(found: &Path, staging_dir: &Path, target: &Path) -> io::Result<()> {
    if found.is_dir() {
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(staging_dir)?;
        let staged = staging.path().join("artifact");
        copy_dir(found, &staged)?;
        match std::fs::rename(&staged, target) {
            Ok(()) => Ok(()),
            // A concurrent copy of the same coordinate won.
            Err(_) if target.is_dir() => Ok(()),
            Err(e) => Err(e),
        }
    } else {
        let mut staged = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(staging_dir)?;
        let mut source = File::open(found)?;
        io::copy(&mut source, staged.as_file_mut())?;
        staged.as_file().sync_all()?;
        staged.persist(target).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Copy a directory tree. Anything but directories and regular files fails
/// the copy.
fn copy_dir(from: &Path, to: &Path) -> io::Result<()> {
    for entry in WalkDir::new(from).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| io::Error::other(e.to_string()))?;
        let target = to.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &target)?;
        } else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is not a regular file", entry.path().display()),
            ));
        }
    }
    Ok(())
}

/// In-memory coordinate → path map.
#[derive(Debug, Default)]
pub struct MemorySource {
    entries: RwLock<HashMap<Coordinate, PathBuf>>,
}

impl MemorySource {
    /// Empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `coordinate` to `path`, replacing any previous mapping.
    pub fn insert(&self, coordinate: Coordinate, path: impl Into<PathBuf>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(coordinate, path.into());
    }

    /// Remove a mapping.
    pub fn remove(&self, coordinate: &Coordinate) -> Option<PathBuf> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(coordinate)
    }
}

impl ArtifactSource for MemorySource {
    fn get(&self, coordinate: &Coordinate) -> SourceResult<PathBuf> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(coordinate)
            .cloned()
            .ok_or_else(|| SourceError::unavailable(coordinate, "no entry in memory source"))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord() -> Coordinate {
        Coordinate::parse("org.example:widgets:1.0").unwrap()
    }

    #[test]
    fn test_unversioned_is_unavailable() {
        let cache = tempfile::tempdir().unwrap();
        let source = RepositorySource::new(cache.path());
        let c = Coordinate::parse("org.example:widgets").unwrap();
        assert!(matches!(
            source.get(&c),
            Err(SourceError::ResourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_repository_hit_is_cached() {
        let repo = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let c = coord();
        let archive = repo.path().join(c.archive_path().unwrap());
        std::fs::create_dir_all(archive.parent().unwrap()).unwrap();
        std::fs::write(&archive, b"not really a tar").unwrap();

        let source = RepositorySource::new(cache.path())
            .with_repository(Repository::new("local", repo.path()));
        let path = source.get(&c).unwrap();

        assert!(path.starts_with(cache.path()));
        assert_eq!(std::fs::read(&path).unwrap(), b"not really a tar");

        // Second lookup is served from the cache even without the repository.
        std::fs::remove_file(&archive).unwrap();
        assert_eq!(source.get(&c).unwrap(), path);
    }

    #[test]
    fn test_unpacked_directory_is_copied() {
        let repo = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let c = coord();
        let dir = repo.path().join(c.unpacked_path().unwrap());
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("nested/a.txt"), b"a").unwrap();

        let source = RepositorySource::new(cache.path())
            .with_repository(Repository::new("local", repo.path()));
        let path = source.get(&c).unwrap();

        assert!(path.is_dir());
        assert_eq!(std::fs::read(path.join("nested/a.txt")).unwrap(), b"a");
    }

    #[test]
    fn test_disabled_repository_is_skipped() {
        let repo = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let c = coord();
        let archive = repo.path().join(c.archive_path().unwrap());
        std::fs::create_dir_all(archive.parent().unwrap()).unwrap();
        std::fs::write(&archive, b"x").unwrap();

        let source = RepositorySource::new(cache.path())
            .with_repository(Repository::new("local", repo.path()).enabled(false));
        assert!(matches!(
            source.get(&c),
            Err(SourceError::ResourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_clear_cache() {
        let root = tempfile::tempdir().unwrap();
        let source = RepositorySource::new(root.path().join("cache"));
        assert!(!source.clear_cache().unwrap());
        source.ensure_cache().unwrap();
        assert!(source.clear_cache().unwrap());
        assert!(!source.cache_dir().exists());
    }

    #[test]
    fn test_memory_source() {
        let source = MemorySource::new();
        let c = coord();
        assert!(source.get(&c).is_err());
        source.insert(c.clone(), "/tmp/widgets");
        assert_eq!(source.get(&c).unwrap(), PathBuf::from("/tmp/widgets"));
        assert!(source.remove(&c).is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_copy_leaves_no_cache_entry() {
        let repo = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let c = coord();
        let dir = repo.path().join(c.unpacked_path().unwrap());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.txt"), b"a").unwrap();
        // Copied after a.txt, and refused.
        std::os::unix::fs::symlink("/etc/hostname", dir.join("b-link")).unwrap();

        let source = RepositorySource::new(cache.path())
            .with_repository(Repository::new("local", repo.path()));
        assert!(matches!(
            source.get(&c),
            Err(SourceError::TransferFailed { .. })
        ));

        let cached = cache.path().join(c.unpacked_path().unwrap());
        assert!(!cached.exists());
        let parent = cached.parent().unwrap();
        assert_eq!(std::fs::read_dir(parent).unwrap().count(), 0);

        // The retry copies again instead of serving a partial directory.
        assert!(matches!(
            source.get(&c),
            Err(SourceError::TransferFailed { .. })
        ));
        std::fs::remove_file(dir.join("b-link")).unwrap();
        let path = source.get(&c).unwrap();
        assert_eq!(path, cached);
        assert_eq!(std::fs::read(path.join("a.txt")).unwrap(), b"a");
    }

    #[test]
    fn test_archive_copy_leaves_no_staging_file() {
        let repo = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let c = coord();
        let archive = repo.path().join(c.archive_path().unwrap());
        std::fs::create_dir_all(archive.parent().unwrap()).unwrap();
        std::fs::write(&archive, b"tar bytes").unwrap();

        let source = RepositorySource::new(cache.path())
            .with_repository(Repository::new("local", repo.path()));
        let path = source.get(&c).unwrap();

        let names: Vec<String> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["widgets-1.0.tar".to_string()]);
    }

    #[test]
    fn test_cached_coordinate_is_not_replaced() {
        let old = tempfile::tempdir().unwrap();
        let new = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let c = coord();
        for (repo, body) in [(&old, &b"old"[..]), (&new, &b"new"[..])] {
            let archive = repo.path().join(c.archive_path().unwrap());
            std::fs::create_dir_all(archive.parent().unwrap()).unwrap();
            std::fs::write(&archive, body).unwrap();
        }

        let first = RepositorySource::new(cache.path())
            .with_repository(Repository::new("old", old.path()));
        first.get(&c).unwrap();

        // A new location first in the search order does not shadow the cache.
        let second = RepositorySource::new(cache.path())
            .with_repository(Repository::new("location", new.path()))
            .with_repository(Repository::new("old", old.path()));
        assert_eq!(std::fs::read(second.get(&c).unwrap()).unwrap(), b"old");

        second.clear_cache().unwrap();
        assert_eq!(std::fs::read(second.get(&c).unwrap()).unwrap(), b"new");
    }
}
