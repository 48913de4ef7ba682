//! `kestrel path`: show where a coordinate lives in a repository.

use anyhow::Result;
use kestrel_core::Coordinate;

use crate::theme::Theme;

/// Print every path derived from `coordinate`.
pub(crate) fn run(coordinate: &str) -> Result<()> {
    let coordinate = Coordinate::parse(coordinate)?;
    println!("{}", Theme::header(&coordinate.to_string()));
    println!("{}", Theme::field("path", &coordinate.path()));
    println!("{}", Theme::field("metadata", &coordinate.metadata_path()));
    for (key, value) in [
        ("manifest", coordinate.manifest_path()),
        ("archive", coordinate.archive_path()),
        ("unpacked", coordinate.unpacked_path()),
    ] {
        if let Some(value) = value {
            println!("{}", Theme::field(key, &value));
        }
    }
    Ok(())
}
