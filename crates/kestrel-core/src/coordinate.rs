//! Group/artifact/version coordinates and the canonical paths derived from them.
//!
//! A coordinate is rendered as `group:artifact[:version]`. Repository layout
//! follows the group segments, so `org.example:widgets:1.0` lives under
//! `org/example/widgets/1.0/`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoordinateError, CoordinateResult};

/// Separator used in every derived path, independent of the host platform.
pub const PATH_SEPARATOR: char = '/';

/// Metadata file kept next to the version directories of an artifact.
pub const METADATA_FILE_NAME: &str = "kestrel-metadata.toml";

/// Extension of the per-version manifest file.
pub const MANIFEST_EXTENSION: &str = "manifest";

/// Extension of the per-version archive file.
pub const ARCHIVE_EXTENSION: &str = "tar";

/// Identifies a loadable unit.
///
/// The version may be absent when referring to "latest" or to metadata-only
/// lookups. Equality, hashing and ordering cover all three fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub struct Coordinate {
    group: String,
    artifact: String,
    version: Option<String>,
}

impl Coordinate {
    /// Create a versioned coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError::Malformed`] if any component is invalid or
    /// the artifact name is empty.
    pub fn new(
        group: impl Into<String>,
        artifact: impl Into<String>,
        version: impl Into<String>,
    ) -> CoordinateResult<Self> {
        Self::build(group.into(), artifact.into(), Some(version.into()))
    }

    /// Create a coordinate without a version.
    ///
    /// An empty artifact name is accepted here and addresses the group as a
    /// whole (metadata-only lookups).
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError::Malformed`] if the group or artifact is invalid.
    pub fn unversioned(
        group: impl Into<String>,
        artifact: impl Into<String>,
    ) -> CoordinateResult<Self> {
        Self::build(group.into(), artifact.into(), None)
    }

    /// Parse `group:artifact` or `group:artifact:version`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError::Malformed`] for any other shape.
    pub fn parse(input: &str) -> CoordinateResult<Self> {
        let parts: Vec<&str> = input.trim().split(':').collect();
        match parts.as_slice() {
            [group, artifact] => Self::build((*group).into(), (*artifact).into(), None),
            [group, artifact, version] => {
                Self::build((*group).into(), (*artifact).into(), Some((*version).into()))
            },
            _ => Err(CoordinateError::malformed(
                input,
                "expected group:artifact or group:artifact:version",
            )),
        }
    }

    fn build(group: String, artifact: String, version: Option<String>) -> CoordinateResult<Self> {
        let rendered = || render(&group, &artifact, version.as_deref());

        if group.is_empty() {
            return Err(CoordinateError::malformed(rendered(), "group must not be empty"));
        }
        if group.split('.').any(str::is_empty) {
            return Err(CoordinateError::malformed(
                rendered(),
                "group must not contain empty segments",
            ));
        }
        check_component(&group, "group").map_err(|r| CoordinateError::malformed(rendered(), r))?;
        check_component(&artifact, "artifact")
            .map_err(|r| CoordinateError::malformed(rendered(), r))?;

        if let Some(v) = &version {
            if artifact.is_empty() {
                return Err(CoordinateError::malformed(
                    rendered(),
                    "artifact name is required when a version is given",
                ));
            }
            if v.is_empty() {
                return Err(CoordinateError::malformed(rendered(), "version must not be empty"));
            }
            check_component(v, "version").map_err(|r| CoordinateError::malformed(rendered(), r))?;
        }

        Ok(Self {
            group,
            artifact,
            version,
        })
    }

    /// The dotted group.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The artifact name. Empty for group-level coordinates.
    #[must_use]
    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    /// The version, if any.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Whether the coordinate pins a version.
    #[must_use]
    pub fn is_versioned(&self) -> bool {
        self.version.is_some()
    }

    /// Same group and artifact, different version.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError::Malformed`] if the version is invalid.
    pub fn with_version(&self, version: impl Into<String>) -> CoordinateResult<Self> {
        Self::build(
            self.group.clone(),
            self.artifact.clone(),
            Some(version.into()),
        )
    }

    /// Same group and artifact without a version.
    #[must_use]
    pub fn without_version(&self) -> Self {
        Self {
            group: self.group.clone(),
            artifact: self.artifact.clone(),
            version: None,
        }
    }

    /// Canonical relative directory of this coordinate.
    ///
    /// Group segments, then the artifact, then (when present) the version
    /// with a trailing separator: `org/example/widgets/1.0/`.
    #[must_use]
    pub fn path(&self) -> String {
        let mut path = self.artifact_dir();
        if let Some(version) = &self.version {
            path.push_str(version);
            path.push(PATH_SEPARATOR);
        }
        path
    }

    /// Path of the metadata file, which sits beside the version directories.
    #[must_use]
    pub fn metadata_path(&self) -> String {
        let mut path = self.artifact_dir();
        path.push_str(METADATA_FILE_NAME);
        path
    }

    /// Path of the manifest inside the version directory.
    ///
    /// `None` for unversioned coordinates.
    #[must_use]
    pub fn manifest_path(&self) -> Option<String> {
        self.version.as_ref()?;
        Some(format!(
            "{}{}.{MANIFEST_EXTENSION}",
            self.path(),
            self.artifact
        ))
    }

    /// Path of the archive inside the version directory
    /// (`org/example/widgets/1.0/widgets-1.0.tar`).
    ///
    /// `None` for unversioned coordinates.
    #[must_use]
    pub fn archive_path(&self) -> Option<String> {
        let version = self.version.as_ref()?;
        Some(format!(
            "{}{}-{version}.{ARCHIVE_EXTENSION}",
            self.path(),
            self.artifact
        ))
    }

    /// Path of an unpacked artifact directory inside the version directory
    /// (`org/example/widgets/1.0/widgets-1.0/`).
    ///
    /// `None` for unversioned coordinates.
    #[must_use]
    pub fn unpacked_path(&self) -> Option<String> {
        let version = self.version.as_ref()?;
        Some(format!(
            "{}{}-{version}{PATH_SEPARATOR}",
            self.path(),
            self.artifact
        ))
    }

    fn artifact_dir(&self) -> String {
        let mut path = String::with_capacity(
            self.group
                .len()
                .saturating_add(self.artifact.len())
                .saturating_add(2),
        );
        for segment in self.group.split('.') {
            path.push_str(segment);
            path.push(PATH_SEPARATOR);
        }
        if !self.artifact.is_empty() {
            path.push_str(&self.artifact);
            path.push(PATH_SEPARATOR);
        }
        path
    }
}

fn render(group: &str, artifact: &str, version: Option<&str>) -> String {
    match version {
        Some(v) => format!("{group}:{artifact}:{v}"),
        None => format!("{group}:{artifact}"),
    }
}

fn check_component(value: &str, field: &str) -> Result<(), String> {
    if value == ".." || value == "." {
        return Err(format!("{field} must not be a relative path component"));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| matches!(c, '/' | '\\' | ':') || c.is_whitespace() || c.is_control())
    {
        return Err(format!("{field} contains invalid character {bad:?}"));
    }
    Ok(())
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(&self.group, &self.artifact, self.version.as_deref()))
    }
}

impl From<Coordinate> for String {
    fn from(c: Coordinate) -> Self {
        c.to_string()
    }
}

impl std::str::FromStr for Coordinate {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for Coordinate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
