//! Engine adapters
//!
//! Each supported engine gets one [`EngineAdapter`] implementation that knows
//! how to validate a project and edit that engine's package manifest. The
//! install transaction picks one through [`adapter_for`].

pub mod unity;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use unity::UnityAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    Unity,
    Unreal,
    Godot,
    Cocos,
}

impl EngineType {
    pub const ALL: [EngineType; 4] = [
        EngineType::Unity,
        EngineType::Unreal,
        EngineType::Godot,
        EngineType::Cocos,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineType::Unity => "unity",
            EngineType::Unreal => "unreal",
            EngineType::Godot => "godot",
            EngineType::Cocos => "cocos",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EngineType::Unity => "Unity",
            EngineType::Unreal => "Unreal Engine",
            EngineType::Godot => "Godot",
            EngineType::Cocos => "Cocos Creator",
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unity" => Ok(EngineType::Unity),
            "unreal" | "ue" | "unreal-engine" => Ok(EngineType::Unreal),
            "godot" => Ok(EngineType::Godot),
            "cocos" | "cocos-creator" => Ok(EngineType::Cocos),
            other => Err(Error::Other(format!(
                "Unknown engine '{}' (expected one of: unity, unreal, godot, cocos)",
                other
            ))),
        }
    }
}

/// What to install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRef {
    pub name: String,
    pub version: String,
    /// Registry the package comes from; `None` means the engine's default registry
    pub registry: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallResult {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub version: String,
}

/// Per-engine project operations used by the install transaction
pub trait EngineAdapter {
    fn engine(&self) -> EngineType;

    /// Confirm the directory is a project of this engine
    fn validate_project(&self, project: &Path) -> Result<()>;

    /// Files `install_package` and `configure_registry` may write
    fn manifest_paths(&self, project: &Path) -> Vec<PathBuf>;

    fn install_package(&self, project: &Path, package: &PackageRef) -> Result<InstallResult>;

    /// Declared version of `name`, or `None` when it is not installed
    fn get_package_info(&self, project: &Path, name: &str) -> Result<Option<InstalledPackage>>;

    fn configure_registry(&self, project: &Path, url: &str, scopes: &[String]) -> Result<()>;
}

/// Adapter for engines whose package manifests gpm cannot edit yet
pub struct UnsupportedAdapter {
    engine: EngineType,
}

impl UnsupportedAdapter {
    pub fn new(engine: EngineType) -> Self {
        Self { engine }
    }

    fn not_implemented<T>(&self, what: &str) -> Result<T> {
        Err(Error::NotImplemented(format!(
            "{} for {}",
            what,
            self.engine.display_name()
        )))
    }
}

impl EngineAdapter for UnsupportedAdapter {
    fn engine(&self) -> EngineType {
        self.engine
    }

    fn validate_project(&self, _project: &Path) -> Result<()> {
        self.not_implemented("Project validation")
    }

    fn manifest_paths(&self, _project: &Path) -> Vec<PathBuf> {
        Vec::new()
    }

    fn install_package(&self, _project: &Path, _package: &PackageRef) -> Result<InstallResult> {
        self.not_implemented("Package installation")
    }

    fn get_package_info(&self, _project: &Path, _name: &str) -> Result<Option<InstalledPackage>> {
        self.not_implemented("Package lookup")
    }

    fn configure_registry(&self, _project: &Path, _url: &str, _scopes: &[String]) -> Result<()> {
        self.not_implemented("Registry configuration")
    }
}

/// Adapter for an engine type
pub fn adapter_for(engine: EngineType) -> Box<dyn EngineAdapter> {
    match engine {
        EngineType::Unity => Box::new(UnityAdapter::new()),
        other => Box::new(UnsupportedAdapter::new(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_type_parse_and_display() {
        for engine in EngineType::ALL {
            assert_eq!(engine.as_str().parse::<EngineType>().unwrap(), engine);
        }
        assert_eq!("Unity".parse::<EngineType>().unwrap(), EngineType::Unity);
        assert_eq!("cocos-creator".parse::<EngineType>().unwrap(), EngineType::Cocos);
        assert!("gamemaker".parse::<EngineType>().is_err());
        assert_eq!(EngineType::Godot.to_string(), "godot");
    }

    #[test]
    fn test_engine_type_serde() {
        assert_eq!(serde_json::to_string(&EngineType::Unreal).unwrap(), "\"unreal\"");
        let parsed: EngineType = serde_json::from_str("\"cocos\"").unwrap();
        assert_eq!(parsed, EngineType::Cocos);
    }

    #[test]
    fn test_factory() {
        assert_eq!(adapter_for(EngineType::Unity).engine(), EngineType::Unity);

        let godot = adapter_for(EngineType::Godot);
        assert_eq!(godot.engine(), EngineType::Godot);
        let err = godot
            .install_package(
                Path::new("."),
                &PackageRef {
                    name: "a".to_string(),
                    version: "1.0.0".to_string(),
                    registry: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::NotImplemented(_)));
        assert!(err.to_string().contains("Godot"));
        assert!(godot.manifest_paths(Path::new(".")).is_empty());
    }
}
