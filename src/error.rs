use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Version parsing error: {0}")]
    SemVer(#[from] semver::Error),

    #[error("Unsafe archive filename: {0}")]
    UnsafeFilename(String),

    #[error("Invalid package name: {0}")]
    InvalidPackageName(String),

    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("Package '{0}' has no dist-tags")]
    NoDistTags(String),

    #[error("Package '{0}' has no 'latest' dist-tag")]
    NoLatestTag(String),

    #[error("Version '{version}' not available for package '{package}'")]
    VersionNotAvailable { package: String, version: String },

    #[error("No {operator} match for {operand} in package '{package}'")]
    NoRangeMatch {
        package: String,
        operator: String,
        operand: String,
    },

    #[error("Unsupported range operator in '{spec}' for package '{package}'\n\n\
             Hint: supported forms are an exact version, a dist-tag, or one of\n\
             ^X.Y.Z, ~X.Y.Z, >=X.Y.Z, >X.Y.Z, <=X.Y.Z, <X.Y.Z")]
    UnsupportedRange { package: String, spec: String },

    #[error("No supported engine detected in {0}\n\n\
             Hint: gpm looks for Unity (Assets/ + ProjectSettings/), Unreal (*.uproject),\n\
             Godot (project.godot) and Cocos Creator (project.json + assets/).\n\
             Run from the project root, or pass --engine explicitly.")]
    NoEngineDetected(String),

    #[error("Ambiguous engine detection: {}\n\n\
             Hint: more than one engine matched with high confidence.\n\
             Pass --engine to choose one.",
             .0.join(", "))]
    AmbiguousEngine(Vec<String>),

    #[error("Project validation failed: {0}")]
    ProjectValidation(String),

    #[error("Install failed, manifest rolled back: {0}")]
    InstallRolledBack(Box<Error>),

    #[error("Install failed: {original}\nRollback also failed: {restore}")]
    RollbackFailed {
        original: Box<Error>,
        restore: Box<Error>,
    },

    #[error("{0} is not implemented yet")]
    NotImplemented(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("{0}")]
    Other(String),
}
