//! gpm - a package manager client for game engine projects
//!
//! gpm speaks the npm registry dialect and installs packages into engine
//! project manifests. It provides:
//!
//! - File selection for packages (`files`, `.gpmignore`/`.npmignore`/`.gitignore`)
//! - Deterministic `.tgz` artifacts with SHA-1 and SHA-512 integrity digests
//! - Version resolution for exact versions, dist-tags and simple ranges
//! - Engine detection for Unity, Unreal, Godot and Cocos Creator projects
//! - Manifest installs that restore the original bytes on failure
//!
//! # Examples
//!
//! ```no_run
//! use gpm::transaction::{InstallRequest, InstallTransaction};
//! use gpm::{Config, RegistryClient};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let registry = RegistryClient::from_config(&config)?;
//!
//! let request = InstallRequest::parse("com.acme.widget@latest", None);
//! let outcome = InstallTransaction::new(&config, &registry).run(Path::new("."), &request)?;
//!
//! println!("Installed {}@{}", outcome.name, outcome.version);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`pattern`] - Glob-style ignore patterns compiled to regexes
//! - [`filter`] - Decide which files belong in a package
//! - [`packager`] - Build and re-read `.tgz` artifacts
//! - [`resolver`] - Resolve a requested version against registry metadata
//! - [`detect`] - Identify the engine a project directory belongs to
//! - [`engine`] - Per-engine manifest adapters
//! - [`transaction`] - Install with snapshot and rollback
//! - [`registry`] - File and HTTP registry clients
//! - [`config`] - User configuration
//! - [`error`] - Error types and result handling

pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod filter;
pub mod logging;
pub mod manifest;
pub mod packager;
pub mod pattern;
pub mod registry;
pub mod registry_http;
pub mod resolver;
pub mod transaction;

pub use config::Config;
pub use detect::{detect, Detection, EngineCandidate};
pub use engine::{adapter_for, EngineAdapter, EngineType};
pub use error::{Error, Result};
pub use filter::{FileFilter, FilterResult};
pub use manifest::{PackageManifest, UProject};
pub use packager::{pack, repack, PackagedArtifact};
pub use registry::{PackageMetadata, RegistryClient};
pub use resolver::{parse_package_spec, resolve_version};
pub use transaction::{InstallOutcome, InstallRequest, InstallTransaction};
