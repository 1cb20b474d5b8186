//! Decide which files belong in a package
//!
//! A [`FileFilter`] compiles its rule sets once and then classifies every
//! entry under the package root. Decision order, first match wins:
//!
//! 1. builtin always-include (package.json, README, LICENSE, CHANGELOG)
//! 2. builtin always-exclude (.git/, node_modules/, *.tgz, lockfiles, ignore files)
//! 3. the manifest's `files` list when declared, and nothing else; the last
//!    matching entry wins so `!pattern` can drop a file again
//! 4. otherwise the first ignore file found (`.gpmignore` > `.npmignore` > `.gitignore`),
//!    last matching rule wins so `!pattern` can re-include
//! 5. include
//!
//! Symlinks are always excluded. Directories are walked regardless of their
//! own status; each descendant is decided on its own.
//!
//! # Examples
//!
//! ```no_run
//! use gpm::FileFilter;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let filter = FileFilter::new("./my-package")?;
//! let result = filter.filter_files()?;
//! println!("{} files, {} bytes", result.file_count, result.total_size);
//! # Ok(())
//! # }
//! ```

use crate::manifest::{PackageManifest, PACKAGE_MANIFEST_NAME};
use crate::pattern::Pattern;
use crate::Result;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Ignore files in priority order; only the first one found is read
pub const IGNORE_FILES: [&str; 3] = [".gpmignore", ".npmignore", ".gitignore"];

const BUILTIN_INCLUDE: &[&str] = &[
    PACKAGE_MANIFEST_NAME,
    "README",
    "README.*",
    "LICENSE",
    "LICENSE.*",
    "LICENCE",
    "LICENCE.*",
    "CHANGELOG",
    "CHANGELOG.*",
];

const BUILTIN_EXCLUDE: &[&str] = &[
    ".git/",
    "**/.git/",
    "node_modules/",
    "**/node_modules/",
    "**/*.tgz",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "npm-shrinkwrap.json",
    "**/.gpmignore",
    "**/.npmignore",
    "**/.gitignore",
];

/// An entry selected for packaging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredFile {
    /// `/`-separated path relative to the package root
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
}

/// Why an entry was left out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    Symlink,
    BuiltinExclude(String),
    NotInFiles,
    IgnoreRule(String),
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::Symlink => write!(f, "symlink"),
            ExclusionReason::BuiltinExclude(p) => write!(f, "builtin-exclude {}", p),
            ExclusionReason::NotInFiles => write!(f, "not-in-files"),
            ExclusionReason::IgnoreRule(p) => write!(f, "ignore-rule {}", p),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedFile {
    pub relative_path: String,
    pub is_dir: bool,
    pub reason: ExclusionReason,
}

/// Output of one filtering run, in walk order
#[derive(Debug, Clone, Default)]
pub struct FilterResult {
    pub files: Vec<FilteredFile>,
    pub excluded: Vec<ExcludedFile>,
    /// Bytes over included non-directory entries
    pub total_size: u64,
    /// Count of included non-directory entries
    pub file_count: usize,
}

impl FilterResult {
    /// Included regular files only
    pub fn regular_files(&self) -> impl Iterator<Item = &FilteredFile> {
        self.files.iter().filter(|f| !f.is_dir)
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.files.iter().any(|f| f.relative_path == relative_path)
    }

    fn push_included(&mut self, file: FilteredFile) {
        if !file.is_dir {
            self.total_size += file.size;
            self.file_count += 1;
        }
        self.files.push(file);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Decision {
    Include,
    Exclude(ExclusionReason),
}

/// Compiled rule sets for one packaging root
#[derive(Debug)]
pub struct FileFilter {
    root: PathBuf,
    always_include: Vec<Pattern>,
    always_exclude: Vec<Pattern>,
    declared_files: Vec<Pattern>,
    ignore_rules: Vec<Pattern>,
    ignore_source: Option<String>,
    has_files_field: bool,
}

impl FileFilter {
    /// Build a filter for `root`, reading `package.json` there if present
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let manifest = if root.join(PACKAGE_MANIFEST_NAME).exists() {
            Some(PackageManifest::load(root)?)
        } else {
            None
        };
        Self::with_manifest(root, manifest.as_ref())
    }

    /// Build a filter from an already-loaded manifest
    pub fn with_manifest<P: AsRef<Path>>(
        root: P,
        manifest: Option<&PackageManifest>,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        let always_include = compile_all(BUILTIN_INCLUDE.iter().copied(), true);
        let always_exclude = compile_all(BUILTIN_EXCLUDE.iter().copied(), false);

        let declared: Vec<&str> = manifest
            .and_then(|m| m.declared_files())
            .map(|files| files.iter().map(String::as_str).collect())
            .unwrap_or_default();
        let has_files_field = !declared.is_empty();
        let declared_files = compile_all(declared.into_iter(), false);

        let (ignore_rules, ignore_source) = if has_files_field {
            debug!("package.json declares files; ignore files are not consulted");
            (Vec::new(), None)
        } else {
            load_ignore_rules(&root)?
        };

        Ok(Self {
            root,
            always_include,
            always_exclude,
            declared_files,
            ignore_rules,
            ignore_source,
            has_files_field,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn has_files_field(&self) -> bool {
        self.has_files_field
    }

    /// Name of the ignore file in effect, if any
    pub fn ignore_source(&self) -> Option<&str> {
        self.ignore_source.as_deref()
    }

    /// Walk the root and classify every entry
    pub fn filter_files(&self) -> Result<FilterResult> {
        let mut result = FilterResult::default();

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .min_depth(1)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry?;
            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|e| crate::Error::Other(format!("path outside package root: {}", e)))?;
            let relative_path = normalize(rel);
            let is_dir = entry.file_type().is_dir();

            if entry.path_is_symlink() {
                debug!(path = %relative_path, "excluded symlink");
                result.excluded.push(ExcludedFile {
                    relative_path,
                    is_dir,
                    reason: ExclusionReason::Symlink,
                });
                continue;
            }

            match self.decide(&relative_path, is_dir) {
                Decision::Include => {
                    let size = if is_dir { 0 } else { entry.metadata()?.len() };
                    result.push_included(FilteredFile {
                        relative_path,
                        absolute_path: entry.path().to_path_buf(),
                        is_dir,
                        size,
                    });
                }
                Decision::Exclude(reason) => {
                    debug!(path = %relative_path, %reason, "excluded");
                    result.excluded.push(ExcludedFile {
                        relative_path,
                        is_dir,
                        reason,
                    });
                }
            }
        }

        Ok(result)
    }

    fn decide(&self, rel: &str, is_dir: bool) -> Decision {
        if self
            .always_include
            .iter()
            .any(|p| p.matches_entry(rel, is_dir))
        {
            return Decision::Include;
        }

        if let Some(p) = self
            .always_exclude
            .iter()
            .find(|p| p.matches_entry(rel, is_dir) || p.matches_ancestor(rel))
        {
            return Decision::Exclude(ExclusionReason::BuiltinExclude(p.source().to_string()));
        }

        if self.has_files_field {
            let last = self.declared_files.iter().rev().find(|p| {
                if p.is_dir_only() {
                    p.matches_entry(rel, is_dir) || p.matches_ancestor(rel)
                } else {
                    !is_dir && p.is_match(rel)
                }
            });
            return match last {
                Some(p) if !p.is_negated() => Decision::Include,
                _ => Decision::Exclude(ExclusionReason::NotInFiles),
            };
        }

        let last = self
            .ignore_rules
            .iter()
            .rev()
            .find(|p| p.matches_entry(rel, is_dir) || p.matches_ancestor(rel));

        match last {
            Some(p) if !p.is_negated() => {
                Decision::Exclude(ExclusionReason::IgnoreRule(p.source().to_string()))
            }
            _ => Decision::Include,
        }
    }
}

fn compile_all<'a, I>(patterns: I, case_insensitive: bool) -> Vec<Pattern>
where
    I: Iterator<Item = &'a str>,
{
    patterns
        .filter_map(|raw| {
            let (body, negated) = match raw.strip_prefix('!') {
                Some(rest) => (rest, true),
                None => (raw, false),
            };
            match Pattern::compile_with(body, negated, case_insensitive) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!("skipping {}", e);
                    None
                }
            }
        })
        .collect()
}

fn load_ignore_rules(root: &Path) -> Result<(Vec<Pattern>, Option<String>)> {
    for name in IGNORE_FILES {
        let path = root.join(name);
        if !path.is_file() {
            continue;
        }
        let content = fs::read_to_string(&path)?;
        let lines = content
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty() && !line.starts_with('#'));
        let rules = compile_all(lines, false);
        debug!(file = name, rules = rules.len(), "loaded ignore rules");
        return Ok((rules, Some(name.to_string())));
    }
    Ok((Vec::new(), None))
}

fn normalize(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
