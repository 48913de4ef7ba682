//! Reading an artifact resource into a symbol table.
//!
//! A resource is a directory, a `.tar` archive, or a gzip-compressed tar.
//! Symbols are `/`-separated paths relative to the resource root. Archives
//! are read in memory and never extracted, with these guards:
//! - entries with `..`, absolute or prefix components are rejected
//! - symlinks, hardlinks, device nodes and sparse entries are rejected
//! - entry count and total size are bounded
//! - names must be UTF-8 and map to distinct symbols

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path};

use bytes::Bytes;
use flate2::read::GzDecoder;
use tar::Archive;
use walkdir::WalkDir;

use crate::error::{ArchiveError, ArchiveResult};

/// Maximum number of entries in one artifact.
pub const MAX_ENTRY_COUNT: usize = 10_000;

/// Maximum total size of all symbols in one artifact (500 MB).
pub const MAX_TOTAL_SIZE: u64 = 500_000_000;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Read every symbol under `path`.
///
/// # Errors
///
/// Returns an [`ArchiveError`] on I/O failure, unsafe entries, or limit
/// violations.
pub fn read_symbols(path: &Path) -> ArchiveResult<HashMap<String, Bytes>> {
    let metadata = std::fs::metadata(path).map_err(|e| io_err(path, e))?;
    if metadata.is_dir() {
        read_directory(path)
    } else if is_gzip(path)? {
        let file = File::open(path).map_err(|e| io_err(path, e))?;
        read_tar(path, GzDecoder::new(BufReader::new(file)))
    } else {
        let file = File::open(path).map_err(|e| io_err(path, e))?;
        read_tar(path, BufReader::new(file))
    }
}

fn io_err(path: &Path, source: std::io::Error) -> ArchiveError {
    ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn is_gzip(path: &Path) -> ArchiveResult<bool> {
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut magic = [0u8; 2];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == GZIP_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Running entry-count and size totals.
#[derive(Default)]
struct Budget {
    entries: usize,
    bytes: u64,
}

impl Budget {
    fn charge(&mut self, size: u64) -> ArchiveResult<()> {
        self.entries = self.entries.saturating_add(1);
        if self.entries > MAX_ENTRY_COUNT {
            return Err(ArchiveError::LimitExceeded {
                message: format!("more than {MAX_ENTRY_COUNT} entries"),
            });
        }
        self.bytes = self.bytes.saturating_add(size);
        if self.bytes > MAX_TOTAL_SIZE {
            return Err(ArchiveError::LimitExceeded {
                message: format!("more than {MAX_TOTAL_SIZE} bytes"),
            });
        }
        Ok(())
    }
}

fn read_tar<R: Read>(origin: &Path, reader: R) -> ArchiveResult<HashMap<String, Bytes>> {
    let mut archive = Archive::new(reader);
    let mut symbols = HashMap::new();
    let mut budget = Budget::default();

    for entry_result in archive.entries().map_err(|e| io_err(origin, e))? {
        let mut entry = entry_result.map_err(|e| io_err(origin, e))?;

        let entry_path = entry
            .path()
            .map_err(|e| io_err(origin, e))?
            .into_owned();
        let entry_type = entry.header().entry_type();
        if !is_safe_entry_type(entry_type) {
            return Err(ArchiveError::UnsafeEntryType {
                entry_type: format!("{entry_type:?}"),
                path: entry_path.display().to_string(),
            });
        }

        let size = entry.header().size().map_err(|e| io_err(origin, e))?;
        budget.charge(size)?;

        if !entry_type.is_file() {
            continue;
        }

        let symbol = symbol_name(&entry_path)?;
        if symbol.is_empty() {
            continue;
        }
        let capacity = usize::try_from(size).unwrap_or(0);
        let mut data = Vec::with_capacity(capacity);
        entry
            .read_to_end(&mut data)
            .map_err(|e| io_err(origin, e))?;
        insert_symbol(&mut symbols, symbol, data)?;
    }

    Ok(symbols)
}

fn read_directory(root: &Path) -> ArchiveResult<HashMap<String, Bytes>> {
    let mut symbols = HashMap::new();
    let mut budget = Budget::default();

    for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            ArchiveError::Io {
                path,
                source: e.into(),
            }
        })?;
        let file_type = entry.file_type();
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| ArchiveError::PathTraversal {
                path: entry.path().display().to_string(),
            })?;

        if file_type.is_symlink() {
            return Err(ArchiveError::UnsafeEntryType {
                entry_type: "symlink".to_string(),
                path: relative.display().to_string(),
            });
        }
        if file_type.is_dir() {
            continue;
        }
        if !file_type.is_file() {
            return Err(ArchiveError::UnsafeEntryType {
                entry_type: "special file".to_string(),
                path: relative.display().to_string(),
            });
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        budget.charge(size)?;

        let symbol = symbol_name(relative)?;
        let data = std::fs::read(entry.path()).map_err(|e| io_err(entry.path(), e))?;
        insert_symbol(&mut symbols, symbol, data)?;
    }

    Ok(symbols)
}

/// Allows regular files, directories and metadata headers.
fn is_safe_entry_type(entry_type: tar::EntryType) -> bool {
    matches!(
        entry_type,
        tar::EntryType::Regular
            | tar::EntryType::Directory
            | tar::EntryType::GNULongName
            | tar::EntryType::XHeader
            | tar::EntryType::XGlobalHeader
    )
}

fn insert_symbol(
    symbols: &mut HashMap<String, Bytes>,
    symbol: String,
    data: Vec<u8>,
) -> ArchiveResult<()> {
    match symbols.entry(symbol) {
        Entry::Occupied(taken) => Err(ArchiveError::DuplicateEntry {
            symbol: taken.key().clone(),
        }),
        Entry::Vacant(slot) => {
            slot.insert(Bytes::from(data));
            Ok(())
        },
    }
}

/// Normalise an entry path to a `/`-separated symbol name.
fn symbol_name(path: &Path) -> ArchiveResult<String> {
    let mut segments = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => {
                let segment = segment.to_str().ok_or_else(|| ArchiveError::InvalidName {
                    path: path.display().to_string(),
                })?;
                segments.push(segment);
            },
            Component::CurDir => {},
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::PathTraversal {
                    path: path.display().to_string(),
                });
            },
        }
    }
    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_reads_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("com/example")).unwrap();
        std::fs::write(dir.path().join("com/example/Widget.class"), b"widget").unwrap();
        std::fs::write(dir.path().join("README"), b"readme").unwrap();

        let symbols = read_symbols(dir.path()).unwrap();
        assert_eq!(symbols.len(), 2);
        assert_eq!(
            symbols.get("com/example/Widget.class").map(Bytes::as_ref),
            Some(&b"widget"[..])
        );
    }

    #[test]
    fn test_reads_plain_tar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a-1.0.tar");
        std::fs::write(&path, tar_bytes(&[("./x/y.txt", b"y"), ("z.txt", b"z")])).unwrap();

        let symbols = read_symbols(&path).unwrap();
        assert_eq!(symbols.get("x/y.txt").map(Bytes::as_ref), Some(&b"y"[..]));
        assert_eq!(symbols.get("z.txt").map(Bytes::as_ref), Some(&b"z"[..]));
    }

    #[test]
    fn test_reads_gzip_tar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a-1.0.tar");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes(&[("lib.so", b"elf")])).unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        let symbols = read_symbols(&path).unwrap();
        assert_eq!(symbols.get("lib.so").map(Bytes::as_ref), Some(&b"elf"[..]));
    }

    #[test]
    fn test_symbol_name_rejects_traversal() {
        assert!(matches!(
            symbol_name(Path::new("../etc/passwd")),
            Err(ArchiveError::PathTraversal { .. })
        ));
        assert!(matches!(
            symbol_name(Path::new("/etc/passwd")),
            Err(ArchiveError::PathTraversal { .. })
        ));
        assert_eq!(symbol_name(Path::new("./a/b")).unwrap(), "a/b");
    }

    #[test]
    fn test_rejects_symlink_entry() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        builder
            .append_link(&mut header, "evil", "/etc/passwd")
            .unwrap();
        let data = builder.into_inner().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evil.tar");
        std::fs::write(&path, data).unwrap();

        assert!(matches!(
            read_symbols(&path),
            Err(ArchiveError::UnsafeEntryType { .. })
        ));
    }

    #[test]
    fn test_budget_limits_entry_count() {
        let mut budget = Budget::default();
        for _ in 0..MAX_ENTRY_COUNT {
            budget.charge(0).unwrap();
        }
        assert!(matches!(
            budget.charge(0),
            Err(ArchiveError::LimitExceeded { .. })
        ));
    }

    #[test]
    fn test_missing_path_is_io_error() {
        assert!(matches!(
            read_symbols(Path::new("/nonexistent/kestrel/artifact.tar")),
            Err(ArchiveError::Io { .. })
        ));
    }

    #[test]
    fn test_rejects_entries_with_the_same_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup-1.0.tar");
        std::fs::write(&path, tar_bytes(&[("a.txt", b"first"), ("./a.txt", b"second")])).unwrap();

        assert!(matches!(
            read_symbols(&path),
            Err(ArchiveError::DuplicateEntry { symbol }) if symbol == "a.txt"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let bad = Path::new(OsStr::from_bytes(b"bad\xff.txt"));
        assert!(matches!(
            symbol_name(bad),
            Err(ArchiveError::InvalidName { .. })
        ));

        let mut builder = tar::Builder::new(Vec::new());
        for name in [&b"bad\xfe.txt"[..], &b"bad\xff.txt"[..]] {
            let mut header = tar::Header::new_gnu();
            header.set_size(1);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, Path::new(OsStr::from_bytes(name)), &b"x"[..])
                .unwrap();
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("names-1.0.tar");
        std::fs::write(&path, builder.into_inner().unwrap()).unwrap();

        assert!(matches!(
            read_symbols(&path),
            Err(ArchiveError::InvalidName { .. })
        ));
    }
}
