//! Package registry client and metadata types
//!
//! Metadata documents follow the npm registry shape (`dist-tags`, a map of
//! versions, per-version `dist` block) so gpm can talk to npm-compatible
//! registries such as Verdaccio as well as its own.
//!
//! # Examples
//!
//! ```no_run
//! use gpm::{Config, RegistryClient};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let registry = RegistryClient::from_config(&config)?;
//!
//! let metadata = registry.get_metadata("com.acme.widget")?;
//! if let Some(latest) = metadata.latest() {
//!     println!("Latest version: {}", latest);
//! }
//! # Ok(())
//! # }
//! ```

use crate::packager::check_filename_safe;
use crate::registry_http::HttpRegistryClient;
use crate::{Config, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Package metadata document returned by the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// `None` when the registry sent no dist-tags object at all
    #[serde(rename = "dist-tags", default, skip_serializing_if = "Option::is_none")]
    pub dist_tags: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub versions: BTreeMap<String, VersionEntry>,
}

impl PackageMetadata {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            dist_tags: None,
            versions: BTreeMap::new(),
        }
    }

    pub fn latest(&self) -> Option<&str> {
        self.dist_tags
            .as_ref()
            .and_then(|tags| tags.get("latest"))
            .map(String::as_str)
    }

    pub fn has_version(&self, version: &str) -> bool {
        self.versions.contains_key(version)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default)]
    pub dist: Dist,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dist {
    #[serde(default)]
    pub tarball: String,

    /// Hex SHA-1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,

    /// `sha512-<base64>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
}

/// Metadata sent alongside a tarball when publishing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub shasum: String,
    pub integrity: String,
    pub size: u64,
    pub unpacked_size: u64,
    pub file_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishResponse {
    pub success: bool,
    #[serde(default)]
    pub package_id: String,
    #[serde(default)]
    pub version_id: String,
    #[serde(default)]
    pub download_url: String,
}

pub enum RegistryClient {
    File(FileRegistryClient),
    Http(HttpRegistryClient),
}

impl RegistryClient {
    /// Create a registry client from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        match config.registry.registry_type.as_str() {
            "file" => {
                let path = config.registry.path.clone().ok_or_else(|| {
                    Error::Other(
                        "registry.path must be set when registry_type = \"file\"".to_string(),
                    )
                })?;
                Ok(RegistryClient::File(FileRegistryClient::new(path)))
            }
            "http" => Ok(RegistryClient::Http(HttpRegistryClient::new(
                config.registry.url.clone(),
                config.auth.token.clone(),
            )?)),
            other => Err(Error::Other(format!(
                "Unknown registry type '{}' (expected \"http\" or \"file\")",
                other
            ))),
        }
    }

    /// Fetch the metadata document for a package
    pub fn get_metadata(&self, name: &str) -> Result<PackageMetadata> {
        match self {
            RegistryClient::File(client) => client.get_metadata(name),
            RegistryClient::Http(client) => client.get_metadata(name),
        }
    }

    /// Upload a packaged tarball
    pub fn publish(&self, request: &PublishRequest, tarball: &Path) -> Result<PublishResponse> {
        match self {
            RegistryClient::File(client) => client.publish(request, tarball),
            RegistryClient::Http(client) => client.publish(request, tarball),
        }
    }

    pub fn url(&self) -> String {
        match self {
            RegistryClient::File(client) => client.url(),
            RegistryClient::Http(client) => client.base_url().to_string(),
        }
    }

    /// Registry location engines can fetch from; `None` for local file registries
    pub fn scoped_registry_url(&self) -> Option<String> {
        match self {
            RegistryClient::File(_) => None,
            RegistryClient::Http(client) => Some(client.base_url().to_string()),
        }
    }
}

/// Registry backed by a local directory (offline mirrors, tests)
///
/// Layout: `packages/<name>.json` and `tarballs/<name>-<version>.tgz`.
pub struct FileRegistryClient {
    registry_path: PathBuf,
}

impl FileRegistryClient {
    pub fn new<P: AsRef<Path>>(registry_path: P) -> Self {
        Self {
            registry_path: registry_path.as_ref().to_path_buf(),
        }
    }

    pub fn url(&self) -> String {
        url::Url::from_directory_path(&self.registry_path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("file://{}", self.registry_path.display()))
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.registry_path.join("packages")
    }

    pub fn tarballs_dir(&self) -> PathBuf {
        self.registry_path.join("tarballs")
    }

    pub fn tarball_path(&self, name: &str, version: &str) -> PathBuf {
        self.tarballs_dir()
            .join(format!("{}-{}.tgz", name, version))
    }

    pub fn get_metadata(&self, name: &str) -> Result<PackageMetadata> {
        check_filename_safe("name", name)?;
        let package_file = self.packages_dir().join(format!("{}.json", name));

        if !package_file.exists() {
            let similar = self.find_similar_packages(name);

            let mut error_msg = format!("Package '{}' not found in registry", name);
            if !similar.is_empty() {
                error_msg.push_str("\n\nDid you mean one of these?\n  ");
                error_msg.push_str(&similar.join("\n  "));
            }

            return Err(Error::PackageNotFound(error_msg));
        }

        let content = fs::read_to_string(&package_file)?;
        let metadata: PackageMetadata = serde_json::from_str(&content)?;
        Ok(metadata)
    }

    /// Store the tarball and record the version, moving `latest` to it
    pub fn publish(&self, request: &PublishRequest, tarball: &Path) -> Result<PublishResponse> {
        check_filename_safe("name", &request.name)?;
        check_filename_safe("version", &request.version)?;
        fs::create_dir_all(self.packages_dir())?;
        fs::create_dir_all(self.tarballs_dir())?;

        let mut metadata = match self.get_metadata(&request.name) {
            Ok(existing) => existing,
            Err(Error::PackageNotFound(_)) => PackageMetadata::new(&request.name),
            Err(e) => return Err(e),
        };

        if metadata.has_version(&request.version) {
            return Err(Error::Registry(format!(
                "{}@{} is already published",
                request.name, request.version
            )));
        }

        let dest = self.tarball_path(&request.name, &request.version);
        fs::copy(tarball, &dest)?;
        let download_url = url::Url::from_file_path(&dest)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| dest.display().to_string());

        metadata.versions.insert(
            request.version.clone(),
            VersionEntry {
                version: Some(request.version.clone()),
                dist: Dist {
                    tarball: download_url.clone(),
                    shasum: Some(request.shasum.clone()),
                    integrity: Some(request.integrity.clone()),
                },
                description: request.description.clone(),
            },
        );
        if request.description.is_some() {
            metadata.description = request.description.clone();
        }
        metadata
            .dist_tags
            .get_or_insert_with(BTreeMap::new)
            .insert("latest".to_string(), request.version.clone());

        let package_file = self.packages_dir().join(format!("{}.json", request.name));
        fs::write(&package_file, serde_json::to_string_pretty(&metadata)?)?;

        info!(name = %request.name, version = %request.version, "published to file registry");

        Ok(PublishResponse {
            success: true,
            package_id: request.name.clone(),
            version_id: format!("{}@{}", request.name, request.version),
            download_url,
        })
    }

    /// Find packages with similar names using simple edit distance
    fn find_similar_packages(&self, query: &str) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.packages_dir()) else {
            return Vec::new();
        };

        let mut similar: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|s| s.to_str()) != Some("json") {
                    return None;
                }
                path.file_stem().and_then(|s| s.to_str()).map(String::from)
            })
            .filter(|name| {
                name.contains(query) || query.contains(name.as_str()) || levenshtein(query, name) <= 3
            })
            .collect();

        similar.sort();
        similar.truncate(5);
        similar
    }
}

fn levenshtein(s1: &str, s2: &str) -> usize {
    let b: Vec<char> = s2.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();

    for (i, c1) in s1.chars().enumerate() {
        let mut row = vec![i + 1; b.len() + 1];
        for (j, c2) in b.iter().enumerate() {
            let cost = usize::from(c1 != *c2);
            row[j + 1] = (prev[j + 1] + 1).min(row[j] + 1).min(prev[j] + cost);
        }
        prev = row;
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(version: &str) -> PublishRequest {
        PublishRequest {
            name: "com.acme.widget".to_string(),
            version: version.to_string(),
            description: Some("Widgets".to_string()),
            shasum: "da39a3ee5e6b4b0d3255bfef95601890afd80709".to_string(),
            integrity: "sha512-abc".to_string(),
            size: 10,
            unpacked_size: 20,
            file_count: 1,
        }
    }

    #[test]
    fn test_metadata_parse_npm_shape() {
        let json = r#"{
            "name": "com.acme.widget",
            "dist-tags": {"latest": "1.2.3"},
            "versions": {
                "1.2.3": {
                    "name": "com.acme.widget",
                    "version": "1.2.3",
                    "dist": {
                        "tarball": "https://registry.example.com/com.acme.widget/-/com.acme.widget-1.2.3.tgz",
                        "shasum": "abc",
                        "integrity": "sha512-xyz"
                    }
                }
            }
        }"#;

        let metadata: PackageMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.latest(), Some("1.2.3"));
        assert!(metadata.has_version("1.2.3"));
        assert!(metadata.versions["1.2.3"].dist.tarball.ends_with(".tgz"));
    }

    #[test]
    fn test_missing_dist_tags_is_none() {
        let metadata: PackageMetadata =
            serde_json::from_str(r#"{"name": "x", "versions": {}}"#).unwrap();
        assert!(metadata.dist_tags.is_none());
        assert!(metadata.latest().is_none());
    }

    #[test]
    fn test_file_registry_publish_and_fetch() {
        let dir = TempDir::new().unwrap();
        let client = FileRegistryClient::new(dir.path().join("registry"));
        let tarball = dir.path().join("widget.tgz");
        fs::write(&tarball, b"tarball").unwrap();

        let response = client.publish(&request("1.0.0"), &tarball).unwrap();
        assert!(response.success);
        assert_eq!(response.version_id, "com.acme.widget@1.0.0");
        client.publish(&request("1.1.0"), &tarball).unwrap();

        let metadata = client.get_metadata("com.acme.widget").unwrap();
        assert_eq!(metadata.latest(), Some("1.1.0"));
        assert_eq!(metadata.versions.len(), 2);
        assert!(client.tarball_path("com.acme.widget", "1.0.0").exists());
    }

    #[test]
    fn test_file_registry_rejects_duplicate_version() {
        let dir = TempDir::new().unwrap();
        let client = FileRegistryClient::new(dir.path());
        let tarball = dir.path().join("widget.tgz");
        fs::write(&tarball, b"tarball").unwrap();

        client.publish(&request("1.0.0"), &tarball).unwrap();
        assert!(matches!(
            client.publish(&request("1.0.0"), &tarball),
            Err(Error::Registry(_))
        ));
    }

    #[test]
    fn test_file_registry_rejects_path_names() {
        let dir = TempDir::new().unwrap();
        let registry = dir.path().join("registry");
        let client = FileRegistryClient::new(&registry);
        fs::create_dir_all(client.packages_dir()).unwrap();
        fs::write(dir.path().join("outside.json"), r#"{"name": "evil", "versions": {}}"#).unwrap();
        fs::write(registry.join("outside.json"), r#"{"name": "evil", "versions": {}}"#).unwrap();

        for name in ["../outside", "../../outside", "..", "a\\b", ""] {
            assert!(
                matches!(client.get_metadata(name), Err(Error::UnsafeFilename(_))),
                "{:?} should be rejected",
                name
            );
        }

        let tarball = dir.path().join("widget.tgz");
        fs::write(&tarball, b"tarball").unwrap();
        let mut escaping = request("1.0.0");
        escaping.name = "../outside".to_string();
        assert!(matches!(
            client.publish(&escaping, &tarball),
            Err(Error::UnsafeFilename(_))
        ));
        let mut escaping = request("../1.0.0");
        escaping.name = "com.acme.widget".to_string();
        assert!(matches!(
            client.publish(&escaping, &tarball),
            Err(Error::UnsafeFilename(_))
        ));
        assert!(!client.tarballs_dir().exists());
    }

    #[test]
    fn test_file_registry_not_found_suggests() {
        let dir = TempDir::new().unwrap();
        let client = FileRegistryClient::new(dir.path());
        let tarball = dir.path().join("widget.tgz");
        fs::write(&tarball, b"tarball").unwrap();
        client.publish(&request("1.0.0"), &tarball).unwrap();

        match client.get_metadata("com.acme.widgte") {
            Err(Error::PackageNotFound(msg)) => assert!(msg.contains("com.acme.widget")),
            other => panic!("expected PackageNotFound, got {:?}", other.map(|m| m.name)),
        }
    }

    #[test]
    fn test_from_config_file_requires_path() {
        let mut config = Config::default();
        config.registry.registry_type = "file".to_string();
        assert!(RegistryClient::from_config(&config).is_err());

        config.registry.registry_type = "ftp".to_string();
        assert!(RegistryClient::from_config(&config).is_err());
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }
}
