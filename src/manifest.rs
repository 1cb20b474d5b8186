//! Manifest handling for package.json and .uproject files
//!
//! # Examples
//!
//! ```no_run
//! use gpm::PackageManifest;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manifest = PackageManifest::load(".")?;
//! manifest.validate()?;
//! println!("{}@{}", manifest.name, manifest.version);
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const PACKAGE_MANIFEST_NAME: &str = "package.json";

/// Source-side package manifest (`package.json`)
///
/// Only the fields the packager and publisher need are typed; everything else
/// is carried through `extra` untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Package name (reverse-DNS like `com.acme.widget`, or npm-style)
    pub name: String,

    /// Semantic version string
    pub version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Unity display name
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Minimum Unity editor version (e.g. "2021.3")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unity: Option<String>,

    /// Exclusive list of glob patterns to package, when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PackageManifest {
    /// Load `package.json` from the given directory
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let manifest_path = dir.as_ref().join(PACKAGE_MANIFEST_NAME);

        if !manifest_path.exists() {
            return Err(Error::InvalidManifest(format!(
                "{} not found in {}",
                PACKAGE_MANIFEST_NAME,
                dir.as_ref().display()
            )));
        }

        let content = fs::read_to_string(&manifest_path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::InvalidManifest(format!("{}: {}", PACKAGE_MANIFEST_NAME, e)))
    }

    /// Check that name and version are usable for packaging
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidManifest("package name is empty".to_string()));
        }
        semver::Version::parse(&self.version).map_err(|e| {
            Error::InvalidManifest(format!("version '{}' is not valid semver: {}", self.version, e))
        })?;
        Ok(())
    }

    /// Declared `files` patterns, ignoring an empty list
    pub fn declared_files(&self) -> Option<&[String]> {
        self.files.as_deref().filter(|f| !f.is_empty())
    }

    /// Registry scope: the first two reverse-DNS labels (`com.acme` for `com.acme.widget`)
    pub fn scope(&self) -> Option<String> {
        package_scope(&self.name)
    }
}

/// Registry scope of a package name, if it has at least two dot-separated labels
pub fn package_scope(name: &str) -> Option<String> {
    let mut labels = name.split('.');
    match (labels.next(), labels.next()) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => Some(format!("{}.{}", a, b)),
        _ => None,
    }
}

/// Unreal Engine project file (.uproject)
///
/// Only the engine association is interesting here; other fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UProject {
    #[serde(rename = "FileVersion", default)]
    pub file_version: Option<i32>,

    #[serde(rename = "EngineAssociation", default)]
    pub engine_association: Option<String>,
}

impl UProject {
    /// Find the first .uproject file in the given directory
    pub fn find<P: AsRef<Path>>(dir: P) -> Result<Option<PathBuf>> {
        let mut found: Vec<PathBuf> = fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("uproject")
            })
            .collect();
        found.sort();
        Ok(found.into_iter().next())
    }

    /// Load .uproject file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let uproject: UProject = serde_json::from_str(&content)?;
        Ok(uproject)
    }
}
