//! Install transaction
//!
//! One install runs as a fixed sequence of states:
//!
//! ```text
//! Start -> EngineResolved -> ProjectValidated -> VersionResolved
//!       -> NoOp
//!       |  Snapshotted -> Mutated -> Committed
//!       |  Snapshotted -> RolledBack
//! ```
//!
//! Before the adapter touches anything, every file it may write is copied
//! byte-for-byte next to the original. If the mutation or its verification
//! fails, those copies are written back and the original error is returned
//! wrapped in [`Error::InstallRolledBack`]. A failed restore is reported as
//! [`Error::RollbackFailed`] carrying both errors.
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
//! let request = InstallRequest::parse("com.acme.widget@^1.2.0", None);
//! let outcome = InstallTransaction::new(&config, &registry).run(Path::new("."), &request)?;
//! println!("{}@{} (changed: {})", outcome.name, outcome.version, outcome.changed);
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::detect::{detect, Confidence};
use crate::engine::{adapter_for, EngineAdapter, EngineType, PackageRef};
use crate::registry::RegistryClient;
use crate::resolver::{parse_package_spec, resolve_version};
use crate::{Error, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Suffix for the byte copies taken before mutation
pub const BACKUP_SUFFIX: &str = ".gpm-backup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Start,
    EngineResolved,
    ProjectValidated,
    VersionResolved,
    NoOp,
    Snapshotted,
    Mutated,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub name: String,
    /// Exact version, dist-tag or range
    pub version: String,
    /// Skip detection and use this engine
    pub engine: Option<EngineType>,
}

impl InstallRequest {
    /// Build a request from `name[@version]`
    pub fn parse(spec: &str, engine: Option<EngineType>) -> Self {
        let (name, version) = parse_package_spec(spec);
        Self {
            name,
            version,
            engine,
        }
    }

    /// Reject names that could not be a registry package or a manifest key
    ///
    /// `@scope/name` is the only form allowed to contain a `/`.
    pub fn validate(&self) -> Result<()> {
        let bare = match self.name.strip_prefix('@') {
            Some(scoped) => match scoped.split_once('/') {
                Some((scope, name)) if !scope.is_empty() => name,
                _ => "",
            },
            None => self.name.as_str(),
        };
        let bad = bare.is_empty()
            || bare.starts_with('.')
            || bare.contains(['/', '\\', '\0'])
            || self.name.contains("..")
            || self.name.chars().any(char::is_whitespace);
        if bad {
            return Err(Error::InvalidPackageName(self.name.escape_debug().to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallOutcome {
    pub engine: EngineType,
    pub name: String,
    pub version: String,
    /// False when the manifest already declared this exact version
    pub changed: bool,
    pub trail: Vec<TransactionState>,
}

/// Byte copies of the adapter's manifest files
///
/// Consumed by exactly one of [`ManifestSnapshot::discard`] or
/// [`ManifestSnapshot::restore`].
#[derive(Debug)]
struct ManifestSnapshot {
    entries: Vec<SnapshotEntry>,
}

#[derive(Debug)]
struct SnapshotEntry {
    path: PathBuf,
    /// `None` when the file did not exist before the install
    backup: Option<PathBuf>,
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

impl ManifestSnapshot {
    fn take(paths: &[PathBuf]) -> Result<Self> {
        let mut snapshot = Self {
            entries: Vec::with_capacity(paths.len()),
        };

        for path in paths {
            if !path.is_file() {
                snapshot.entries.push(SnapshotEntry {
                    path: path.clone(),
                    backup: None,
                });
                continue;
            }

            let backup = backup_path(path);
            if let Err(e) = fs::copy(path, &backup) {
                snapshot.discard();
                return Err(e.into());
            }
            debug!(path = %path.display(), backup = %backup.display(), "snapshot");
            snapshot.entries.push(SnapshotEntry {
                path: path.clone(),
                backup: Some(backup),
            });
        }

        Ok(snapshot)
    }

    fn discard(self) {
        for backup in self.entries.iter().filter_map(|e| e.backup.as_ref()) {
            if let Err(e) = fs::remove_file(backup) {
                warn!(path = %backup.display(), error = %e, "could not remove manifest backup");
            }
        }
    }

    /// Put every file back exactly as it was; files that did not exist are removed
    fn restore(self) -> Result<()> {
        for entry in &self.entries {
            match &entry.backup {
                Some(backup) => {
                    fs::copy(backup, &entry.path)?;
                    fs::remove_file(backup)?;
                }
                None if entry.path.exists() => fs::remove_file(&entry.path)?,
                None => {}
            }
            debug!(path = %entry.path.display(), "restored");
        }
        Ok(())
    }
}

pub struct InstallTransaction<'a> {
    config: &'a Config,
    registry: &'a RegistryClient,
    adapter: Option<Box<dyn EngineAdapter>>,
}

impl<'a> InstallTransaction<'a> {
    pub fn new(config: &'a Config, registry: &'a RegistryClient) -> Self {
        Self {
            config,
            registry,
            adapter: None,
        }
    }

    /// Use `adapter` instead of the one registered for the resolved engine
    pub fn with_adapter(mut self, adapter: Box<dyn EngineAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn run(&self, project: &Path, request: &InstallRequest) -> Result<InstallOutcome> {
        request.validate()?;
        let mut trail = vec![TransactionState::Start];
        let mut enter = |state: TransactionState| {
            debug!(?state, package = %request.name, "install transaction");
            trail.push(state);
        };

        let engine = self.resolve_engine(project, request)?;
        enter(TransactionState::EngineResolved);

        let registered;
        let adapter: &dyn EngineAdapter = match &self.adapter {
            Some(adapter) => adapter.as_ref(),
            None => {
                registered = adapter_for(engine);
                registered.as_ref()
            }
        };

        adapter.validate_project(project)?;
        enter(TransactionState::ProjectValidated);

        let metadata = self.registry.get_metadata(&request.name)?;
        let version = resolve_version(&metadata, &request.version)?;
        enter(TransactionState::VersionResolved);

        let installed = adapter.get_package_info(project, &request.name)?;
        if installed.is_some_and(|p| p.version == version) {
            enter(TransactionState::NoOp);
            info!(name = %request.name, %version, "already installed");
            return Ok(InstallOutcome {
                engine,
                name: request.name.clone(),
                version,
                changed: false,
                trail,
            });
        }

        let snapshot = ManifestSnapshot::take(&adapter.manifest_paths(project))?;
        enter(TransactionState::Snapshotted);

        let package = PackageRef {
            name: request.name.clone(),
            version: version.clone(),
            registry: self.registry.scoped_registry_url(),
        };

        match mutate(adapter, project, &package) {
            Ok(()) => {
                enter(TransactionState::Mutated);
                snapshot.discard();
                enter(TransactionState::Committed);
                info!(name = %package.name, version = %package.version, %engine, "installed");
                Ok(InstallOutcome {
                    engine,
                    name: package.name,
                    version,
                    changed: true,
                    trail,
                })
            }
            Err(original) => {
                warn!(error = %original, "install failed, restoring manifest");
                match snapshot.restore() {
                    Ok(()) => {
                        enter(TransactionState::RolledBack);
                        Err(Error::InstallRolledBack(Box::new(original)))
                    }
                    Err(restore) => Err(Error::RollbackFailed {
                        original: Box::new(original),
                        restore: Box::new(restore),
                    }),
                }
            }
        }
    }

    fn resolve_engine(&self, project: &Path, request: &InstallRequest) -> Result<EngineType> {
        if let Some(engine) = request.engine {
            return Ok(engine);
        }
        if let Some(engine) = self.config.install.default_engine {
            debug!(%engine, "using configured default engine");
            return Ok(engine);
        }

        let detection = detect(project);
        if detection.has_ambiguous() {
            let engines = detection
                .candidates
                .iter()
                .filter(|c| c.is_at_least(Confidence::High))
                .map(|c| format!("{} ({}%)", c.engine.display_name(), c.confidence))
                .collect();
            return Err(Error::AmbiguousEngine(engines));
        }

        match detection.best() {
            Some(best) if best.is_at_least(Confidence::Medium) => Ok(best.engine),
            _ => Err(Error::NoEngineDetected(project.display().to_string())),
        }
    }
}

/// Apply the change and confirm the manifest now declares it
fn mutate(adapter: &dyn EngineAdapter, project: &Path, package: &PackageRef) -> Result<()> {
    let result = adapter.install_package(project, package)?;
    if !result.success {
        return Err(Error::Other(result.message));
    }

    match adapter.get_package_info(project, &package.name)? {
        Some(installed) if installed.version == package.version => Ok(()),
        found => Err(Error::Other(format!(
            "manifest declares {} after install, expected {}",
            found.map_or_else(|| "nothing".to_string(), |p| p.version),
            package.version
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::unity::{UnityAdapter, UnityManifest};
    use crate::engine::{InstallResult, InstalledPackage};
    use crate::registry::FileRegistryClient;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"{
  "dependencies": {
    "com.unity.textmeshpro": "3.0.6"
  }
}
"#;

    fn unity_project(manifest: Option<&str>) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Assets")).unwrap();
        fs::create_dir_all(dir.path().join("ProjectSettings")).unwrap();
        if let Some(content) = manifest {
            fs::create_dir_all(dir.path().join("Packages")).unwrap();
            fs::write(dir.path().join("Packages/manifest.json"), content).unwrap();
        }
        dir
    }

    fn file_registry() -> (TempDir, Config, RegistryClient) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("packages")).unwrap();
        fs::write(
            dir.path().join("packages/com.acme.widget.json"),
            r#"{
  "name": "com.acme.widget",
  "dist-tags": {"latest": "1.2.0"},
  "versions": {
    "1.0.0": {"dist": {"tarball": "file:///tmp/com.acme.widget-1.0.0.tgz"}},
    "1.2.0": {"dist": {"tarball": "file:///tmp/com.acme.widget-1.2.0.tgz"}}
  }
}"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.registry.registry_type = "file".to_string();
        config.registry.path = Some(dir.path().to_path_buf());
        let registry = RegistryClient::File(FileRegistryClient::new(dir.path()));
        (dir, config, registry)
    }

    fn manifest_bytes(project: &Path) -> Option<Vec<u8>> {
        fs::read(project.join("Packages/manifest.json")).ok()
    }

    fn no_backups_left(project: &Path) -> bool {
        !project
            .join(format!("Packages/manifest.json{}", BACKUP_SUFFIX))
            .exists()
    }

    enum Fault {
        CorruptThenFail,
        ReportSuccessWithoutWriting,
        BreakRestore,
    }

    struct FaultyAdapter {
        inner: UnityAdapter,
        fault: Fault,
    }

    impl FaultyAdapter {
        fn boxed(fault: Fault) -> Box<dyn EngineAdapter> {
            Box::new(Self {
                inner: UnityAdapter::new(),
                fault,
            })
        }
    }

    impl EngineAdapter for FaultyAdapter {
        fn engine(&self) -> EngineType {
            EngineType::Unity
        }

        fn validate_project(&self, project: &Path) -> Result<()> {
            self.inner.validate_project(project)
        }

        fn manifest_paths(&self, project: &Path) -> Vec<PathBuf> {
            self.inner.manifest_paths(project)
        }

        fn install_package(&self, project: &Path, _package: &PackageRef) -> Result<InstallResult> {
            let path = UnityManifest::path(project);
            match self.fault {
                Fault::CorruptThenFail => {
                    fs::create_dir_all(path.parent().unwrap())?;
                    fs::write(&path, "{ \"dependencies\": ")?;
                    Err(Error::Other("disk full".to_string()))
                }
                Fault::ReportSuccessWithoutWriting => Ok(InstallResult {
                    success: true,
                    message: String::new(),
                }),
                Fault::BreakRestore => {
                    fs::remove_file(&path)?;
                    fs::create_dir(&path)?;
                    Err(Error::Other("disk full".to_string()))
                }
            }
        }

        fn get_package_info(&self, project: &Path, name: &str) -> Result<Option<InstalledPackage>> {
            self.inner.get_package_info(project, name)
        }

        fn configure_registry(&self, project: &Path, url: &str, scopes: &[String]) -> Result<()> {
            self.inner.configure_registry(project, url, scopes)
        }
    }

    #[test]
    fn test_install_resolves_and_writes_manifest() {
        let project = unity_project(Some(MANIFEST));
        let (_reg, config, registry) = file_registry();

        let request = InstallRequest::parse("com.acme.widget@^1.0.0", None);
        let outcome = InstallTransaction::new(&config, &registry)
            .run(project.path(), &request)
            .unwrap();

        assert_eq!(outcome.engine, EngineType::Unity);
        assert_eq!(outcome.version, "1.2.0");
        assert!(outcome.changed);
        assert_eq!(
            outcome.trail,
            vec![
                TransactionState::Start,
                TransactionState::EngineResolved,
                TransactionState::ProjectValidated,
                TransactionState::VersionResolved,
                TransactionState::Snapshotted,
                TransactionState::Mutated,
                TransactionState::Committed,
            ]
        );

        let manifest = UnityManifest::load_or_default(project.path()).unwrap();
        assert_eq!(manifest.dependency("com.acme.widget"), Some("1.2.0"));
        assert_eq!(manifest.dependency("com.unity.textmeshpro"), Some("3.0.6"));
        assert!(no_backups_left(project.path()));
    }

    #[test]
    fn test_second_install_is_noop() {
        let project = unity_project(Some(MANIFEST));
        let (_reg, config, registry) = file_registry();
        let transaction = InstallTransaction::new(&config, &registry);
        let request = InstallRequest::parse("com.acme.widget@1.0.0", None);

        assert!(transaction.run(project.path(), &request).unwrap().changed);
        let before = manifest_bytes(project.path());

        let again = transaction.run(project.path(), &request).unwrap();
        assert!(!again.changed);
        assert_eq!(again.trail.last(), Some(&TransactionState::NoOp));
        assert!(!again.trail.contains(&TransactionState::Snapshotted));
        assert_eq!(manifest_bytes(project.path()), before);
    }

    #[test]
    fn test_failed_mutation_restores_exact_bytes() {
        let original = "{\n    \"dependencies\": {\"com.unity.ugui\": \"1.0.0\"}   \n}";
        let project = unity_project(Some(original));
        let (_reg, config, registry) = file_registry();

        let err = InstallTransaction::new(&config, &registry)
            .with_adapter(FaultyAdapter::boxed(Fault::CorruptThenFail))
            .run(project.path(), &InstallRequest::parse("com.acme.widget", None))
            .unwrap_err();

        assert!(matches!(err, Error::InstallRolledBack(_)));
        assert!(err.to_string().contains("disk full"));
        assert_eq!(manifest_bytes(project.path()).unwrap(), original.as_bytes());
        assert!(no_backups_left(project.path()));
    }

    #[test]
    fn test_rollback_removes_manifest_that_did_not_exist() {
        let project = unity_project(None);
        let (_reg, config, registry) = file_registry();

        let err = InstallTransaction::new(&config, &registry)
            .with_adapter(FaultyAdapter::boxed(Fault::CorruptThenFail))
            .run(project.path(), &InstallRequest::parse("com.acme.widget", None))
            .unwrap_err();

        assert!(matches!(err, Error::InstallRolledBack(_)));
        assert!(manifest_bytes(project.path()).is_none());
    }

    #[test]
    fn test_unverified_mutation_rolls_back() {
        let project = unity_project(Some(MANIFEST));
        let (_reg, config, registry) = file_registry();

        let err = InstallTransaction::new(&config, &registry)
            .with_adapter(FaultyAdapter::boxed(Fault::ReportSuccessWithoutWriting))
            .run(project.path(), &InstallRequest::parse("com.acme.widget", None))
            .unwrap_err();

        assert!(matches!(err, Error::InstallRolledBack(_)));
        assert_eq!(manifest_bytes(project.path()).unwrap(), MANIFEST.as_bytes());
    }

    #[test]
    fn test_restore_failure_reports_both_errors() {
        let project = unity_project(Some(MANIFEST));
        let (_reg, config, registry) = file_registry();

        let err = InstallTransaction::new(&config, &registry)
            .with_adapter(FaultyAdapter::boxed(Fault::BreakRestore))
            .run(project.path(), &InstallRequest::parse("com.acme.widget", None))
            .unwrap_err();

        match err {
            Error::RollbackFailed { original, restore } => {
                assert!(original.to_string().contains("disk full"));
                assert!(matches!(*restore, Error::Io(_)));
            }
            other => panic!("expected RollbackFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_failure_takes_no_snapshot() {
        let project = TempDir::new().unwrap();
        fs::create_dir_all(project.path().join("Packages")).unwrap();
        fs::write(project.path().join("Packages/manifest.json"), MANIFEST).unwrap();
        let (_reg, config, registry) = file_registry();

        let request = InstallRequest::parse("com.acme.widget", Some(EngineType::Unity));
        let err = InstallTransaction::new(&config, &registry)
            .run(project.path(), &request)
            .unwrap_err();

        assert!(matches!(err, Error::ProjectValidation(_)));
        assert!(no_backups_left(project.path()));
        assert_eq!(manifest_bytes(project.path()).unwrap(), MANIFEST.as_bytes());
    }

    #[test]
    fn test_no_engine_detected() {
        let project = TempDir::new().unwrap();
        let (_reg, config, registry) = file_registry();

        let err = InstallTransaction::new(&config, &registry)
            .run(project.path(), &InstallRequest::parse("com.acme.widget", None))
            .unwrap_err();
        assert!(matches!(err, Error::NoEngineDetected(_)));
    }

    #[test]
    fn test_ambiguous_engine_refused() {
        let project = unity_project(Some(MANIFEST));
        fs::write(project.path().join("project.json"), "{}").unwrap();
        fs::create_dir_all(project.path().join("assets")).unwrap();
        let (_reg, config, registry) = file_registry();

        let err = InstallTransaction::new(&config, &registry)
            .run(project.path(), &InstallRequest::parse("com.acme.widget", None))
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousEngine(ref engines) if engines.len() == 2));
        assert_eq!(manifest_bytes(project.path()).unwrap(), MANIFEST.as_bytes());
    }

    #[test]
    fn test_forced_engine_skips_detection() {
        let project = unity_project(Some(MANIFEST));
        fs::write(project.path().join("project.json"), "{}").unwrap();
        fs::create_dir_all(project.path().join("assets")).unwrap();
        let (_reg, config, registry) = file_registry();

        let request = InstallRequest::parse("com.acme.widget", Some(EngineType::Unity));
        let outcome = InstallTransaction::new(&config, &registry)
            .run(project.path(), &request)
            .unwrap();
        assert_eq!(outcome.engine, EngineType::Unity);
    }

    #[test]
    fn test_unsupported_engine_not_implemented() {
        let project = TempDir::new().unwrap();
        fs::write(project.path().join("project.godot"), "config_version=5\n").unwrap();
        let (_reg, config, registry) = file_registry();

        let err = InstallTransaction::new(&config, &registry)
            .run(project.path(), &InstallRequest::parse("com.acme.widget", None))
            .unwrap_err();
        assert!(matches!(err, Error::NotImplemented(_)));
    }

    #[test]
    fn test_registry_errors_are_distinct() {
        let project = unity_project(Some(MANIFEST));
        let (_reg, config, registry) = file_registry();
        let transaction = InstallTransaction::new(&config, &registry);

        let missing = transaction
            .run(project.path(), &InstallRequest::parse("com.acme.gadget", None))
            .unwrap_err();
        assert!(matches!(missing, Error::PackageNotFound(_)));

        let unavailable = transaction
            .run(project.path(), &InstallRequest::parse("com.acme.widget@9.9.9", None))
            .unwrap_err();
        assert!(matches!(unavailable, Error::VersionNotAvailable { .. }));

        assert_eq!(manifest_bytes(project.path()).unwrap(), MANIFEST.as_bytes());
    }

    #[test]
    fn test_request_names_are_validated() {
        for name in ["com.acme.widget", "@acme/widget", "left-pad"] {
            assert!(InstallRequest::parse(name, None).validate().is_ok(), "{}", name);
        }
        for name in ["", "../../outside", "..", ".hidden", "a/b", "@acme/", "@/x", "a\\b", "a b"] {
            assert!(
                matches!(
                    InstallRequest::parse(name, None).validate(),
                    Err(Error::InvalidPackageName(_))
                ),
                "{:?} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_path_like_name_never_reaches_registry() {
        let project = unity_project(Some(MANIFEST));
        let (reg, config, registry) = file_registry();
        fs::write(
            reg.path().join("outside.json"),
            r#"{"name": "outside", "dist-tags": {"latest": "1.0.0"}, "versions": {"1.0.0": {"dist": {"tarball": "x"}}}}"#,
        )
        .unwrap();

        let err = InstallTransaction::new(&config, &registry)
            .run(project.path(), &InstallRequest::parse("../outside", None))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPackageName(_)));
        assert_eq!(manifest_bytes(project.path()).unwrap(), MANIFEST.as_bytes());
    }

    #[test]
    fn test_file_registry_adds_no_scoped_registry() {
        let project = unity_project(Some(MANIFEST));
        let (_reg, config, registry) = file_registry();

        InstallTransaction::new(&config, &registry)
            .run(project.path(), &InstallRequest::parse("com.acme.widget", None))
            .unwrap();

        let manifest = String::from_utf8(manifest_bytes(project.path()).unwrap()).unwrap();
        assert!(manifest.contains("\"com.acme.widget\": \"1.2.0\""));
        assert!(!manifest.contains("scopedRegistries"));
        assert!(!manifest.contains("file://"));
    }

    #[test]
    fn test_configured_default_engine() {
        let project = unity_project(Some(MANIFEST));
        fs::write(project.path().join("project.json"), "{}").unwrap();
        fs::create_dir_all(project.path().join("assets")).unwrap();
        let (_reg, mut config, registry) = file_registry();
        config.install.default_engine = Some(EngineType::Unity);

        let outcome = InstallTransaction::new(&config, &registry)
            .run(project.path(), &InstallRequest::parse("com.acme.widget", None))
            .unwrap();
        assert!(outcome.changed);
    }
}
