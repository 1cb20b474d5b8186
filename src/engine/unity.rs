//! Unity package manifest (`Packages/manifest.json`) editing
//!
//! The manifest is edited as an ordered JSON object so keys gpm does not know
//! about (`testables`, `enableLockFile`, ...) and their order survive a rewrite.

use super::{EngineAdapter, EngineType, InstallResult, InstalledPackage, PackageRef};
use crate::manifest::package_scope;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Unity's own package registry; packages from here need no scoped registry
pub const UNITY_REGISTRY: &str = "https://packages.unity.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedRegistry {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Typed view over a Unity manifest document
#[derive(Debug, Clone, Default)]
pub struct UnityManifest {
    doc: Map<String, Value>,
}

impl UnityManifest {
    pub fn path(project: &Path) -> PathBuf {
        project.join("Packages").join("manifest.json")
    }

    /// Load the manifest, or an empty one if the file does not exist
    pub fn load_or_default(project: &Path) -> Result<Self> {
        let path = Self::path(project);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::parse(&fs::read_to_string(&path)?)
    }

    pub fn parse(content: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(content)? {
            Value::Object(doc) => Ok(Self { doc }),
            _ => Err(Error::InvalidManifest(
                "Packages/manifest.json is not a JSON object".to_string(),
            )),
        }
    }

    pub fn save(&self, project: &Path) -> Result<()> {
        let path = Self::path(project);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, self.to_json()?)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        let mut out = serde_json::to_string_pretty(&self.doc)?;
        out.push('\n');
        Ok(out)
    }

    pub fn dependency(&self, name: &str) -> Option<&str> {
        self.doc
            .get("dependencies")
            .and_then(Value::as_object)
            .and_then(|deps| deps.get(name))
            .and_then(Value::as_str)
    }

    pub fn dependencies(&self) -> Vec<(String, String)> {
        self.doc
            .get("dependencies")
            .and_then(Value::as_object)
            .map(|deps| {
                deps.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_dependency(&mut self, name: &str, version: &str) -> Result<()> {
        let deps = self
            .doc
            .entry("dependencies")
            .or_insert_with(|| Value::Object(Map::new()));
        let deps = deps.as_object_mut().ok_or_else(|| {
            Error::InvalidManifest("\"dependencies\" is not a JSON object".to_string())
        })?;
        deps.insert(name.to_string(), Value::String(version.to_string()));
        Ok(())
    }

    pub fn scoped_registries(&self) -> Result<Vec<ScopedRegistry>> {
        match self.doc.get("scopedRegistries") {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Ok(Vec::new()),
        }
    }

    /// Add `scopes` to the entry for `url`, creating the entry if needed
    ///
    /// Returns whether anything changed.
    pub fn ensure_scoped_registry(&mut self, url: &str, scopes: &[String]) -> Result<bool> {
        let mut registries = self.scoped_registries()?;
        let mut changed = false;

        let index = match registries.iter().position(|r| same_registry(&r.url, url)) {
            Some(index) => index,
            None => {
                registries.push(ScopedRegistry {
                    name: registry_display_name(url),
                    url: url.to_string(),
                    scopes: Vec::new(),
                });
                changed = true;
                registries.len() - 1
            }
        };

        let entry = &mut registries[index];
        for scope in scopes {
            if !entry.scopes.iter().any(|s| s == scope) {
                entry.scopes.push(scope.clone());
                changed = true;
            }
        }

        if changed {
            self.doc
                .insert("scopedRegistries".to_string(), serde_json::to_value(&registries)?);
        }
        Ok(changed)
    }
}

/// Compare registry URLs ignoring case of the host and a trailing slash
pub fn same_registry(a: &str, b: &str) -> bool {
    match (url::Url::parse(a), url::Url::parse(b)) {
        (Ok(a), Ok(b)) => {
            a.scheme() == b.scheme()
                && a.host_str() == b.host_str()
                && a.port_or_known_default() == b.port_or_known_default()
                && a.path().trim_end_matches('/') == b.path().trim_end_matches('/')
        }
        _ => a.trim_end_matches('/') == b.trim_end_matches('/'),
    }
}

fn registry_display_name(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
        .unwrap_or_else(|| "gpm".to_string())
}

#[derive(Debug, Default)]
pub struct UnityAdapter;

impl UnityAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl EngineAdapter for UnityAdapter {
    fn engine(&self) -> EngineType {
        EngineType::Unity
    }

    fn validate_project(&self, project: &Path) -> Result<()> {
        let missing: Vec<&str> = ["Assets", "ProjectSettings"]
            .into_iter()
            .filter(|dir| !project.join(dir).is_dir())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::ProjectValidation(format!(
                "{} is not a Unity project (missing {})",
                project.display(),
                missing.join(", ")
            )))
        }
    }

    fn manifest_paths(&self, project: &Path) -> Vec<PathBuf> {
        vec![UnityManifest::path(project)]
    }

    fn install_package(&self, project: &Path, package: &PackageRef) -> Result<InstallResult> {
        let mut manifest = UnityManifest::load_or_default(project)?;
        manifest.set_dependency(&package.name, &package.version)?;

        if let Some(registry) = package
            .registry
            .as_deref()
            .filter(|url| !same_registry(url, UNITY_REGISTRY))
        {
            if let Some(scope) = package_scope(&package.name) {
                if manifest.ensure_scoped_registry(registry, &[scope])? {
                    debug!(registry, "updated scoped registries");
                }
            }
        }

        manifest.save(project)?;
        info!(name = %package.name, version = %package.version, "updated Packages/manifest.json");

        Ok(InstallResult {
            success: true,
            message: format!("Added {}@{} to Packages/manifest.json", package.name, package.version),
        })
    }

    fn get_package_info(&self, project: &Path, name: &str) -> Result<Option<InstalledPackage>> {
        let manifest = UnityManifest::load_or_default(project)?;
        Ok(manifest.dependency(name).map(|version| InstalledPackage {
            version: version.to_string(),
        }))
    }

    fn configure_registry(&self, project: &Path, url: &str, scopes: &[String]) -> Result<()> {
        let mut manifest = UnityManifest::load_or_default(project)?;
        if manifest.ensure_scoped_registry(url, scopes)? {
            manifest.save(project)?;
        }
        Ok(())
    }
}
