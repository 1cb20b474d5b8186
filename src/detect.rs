//! Engine detection by project structure
//!
//! Every engine has an independent, read-only probe that scores the project
//! directory from 0 to 100. The detector never guesses: callers use
//! [`Detection::best`] together with [`Detection::has_ambiguous`] and refuse
//! to pick when two engines both look certain.
//!
//! # Examples
//!
//! ```no_run
//! use gpm::detect::detect;
//!
//! let detection = detect(".");
//! if let Some(best) = detection.best() {
//!     println!("{} ({}%)", best.engine, best.confidence);
//! }
//! ```

use crate::engine::EngineType;
use crate::manifest::UProject;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Coarse confidence bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    None = 0,
    Low = 25,
    Medium = 50,
    High = 75,
    Maximum = 100,
}

impl Confidence {
    pub fn score(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineCandidate {
    pub engine: EngineType,
    /// 0-100
    pub confidence: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub details: BTreeMap<String, String>,
}

impl EngineCandidate {
    fn new(engine: EngineType) -> Self {
        Self {
            engine,
            confidence: Confidence::None.score(),
            version: None,
            details: BTreeMap::new(),
        }
    }

    fn detail(&mut self, key: &str, value: impl ToString) {
        self.details.insert(key.to_string(), value.to_string());
    }

    pub fn is_at_least(&self, level: Confidence) -> bool {
        self.confidence >= level.score()
    }
}

/// Ranked probe results, highest confidence first
#[derive(Debug, Clone, Default, Serialize)]
pub struct Detection {
    pub candidates: Vec<EngineCandidate>,
}

impl Detection {
    fn from_probes(probes: Vec<EngineCandidate>) -> Self {
        let mut candidates: Vec<EngineCandidate> =
            probes.into_iter().filter(|c| c.confidence > 0).collect();
        // stable: equal scores keep probe order
        candidates.sort_by(|a, b| b.confidence.cmp(&a.confidence));
        Self { candidates }
    }

    /// Highest-confidence candidate; ties go to the first probe
    pub fn best(&self) -> Option<&EngineCandidate> {
        self.candidates.first()
    }

    /// True when at least two candidates reach [`Confidence::High`]
    pub fn has_ambiguous(&self) -> bool {
        self.candidates
            .iter()
            .filter(|c| c.is_at_least(Confidence::High))
            .count()
            >= 2
    }

    pub fn get(&self, engine: EngineType) -> Option<&EngineCandidate> {
        self.candidates.iter().find(|c| c.engine == engine)
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Probe `project` for every known engine
pub fn detect<P: AsRef<Path>>(project: P) -> Detection {
    let project = project.as_ref();

    let probes = vec![
        probe_unity(project),
        probe_unreal(project),
        probe_godot(project),
        probe_cocos(project),
    ];

    for probe in &probes {
        debug!(engine = %probe.engine, confidence = probe.confidence, "engine probe");
    }

    Detection::from_probes(probes)
}

fn probe_unity(project: &Path) -> EngineCandidate {
    let mut candidate = EngineCandidate::new(EngineType::Unity);

    if !(project.join("Assets").is_dir() && project.join("ProjectSettings").is_dir()) {
        return candidate;
    }
    candidate.confidence = Confidence::Medium.score();

    if project.join("Packages").join("manifest.json").is_file() {
        candidate.confidence = Confidence::High.score();
        candidate.detail("packages_manifest", "Packages/manifest.json");
    }

    let version_file = project.join("ProjectSettings").join("ProjectVersion.txt");
    if let Ok(content) = fs::read_to_string(&version_file) {
        candidate.version = content
            .lines()
            .find_map(|line| line.trim().strip_prefix("m_EditorVersion:"))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
    }

    candidate
}

fn probe_unreal(project: &Path) -> EngineCandidate {
    let mut candidate = EngineCandidate::new(EngineType::Unreal);

    // an unreadable directory has nothing to probe
    let Ok(Some(uproject)) = UProject::find(project) else {
        return candidate;
    };

    candidate.confidence = Confidence::Maximum.score();
    if let Some(name) = uproject.file_name().and_then(|n| n.to_str()) {
        candidate.detail("uproject", name);
    }

    // a malformed .uproject still identifies the engine, just without a version
    if let Ok(parsed) = UProject::load(&uproject) {
        candidate.version = parsed.engine_association.filter(|a| !a.is_empty());
    }

    for dir in ["Content", "Config"] {
        if project.join(dir).is_dir() {
            candidate.detail(&format!("has_{}", dir.to_lowercase()), true);
        }
    }

    candidate
}

fn probe_godot(project: &Path) -> EngineCandidate {
    let mut candidate = EngineCandidate::new(EngineType::Godot);

    let path = project.join("project.godot");
    if !path.is_file() {
        return candidate;
    }
    candidate.confidence = Confidence::Medium.score();

    let config_version = fs::read_to_string(&path).ok().and_then(|content| {
        content.lines().find_map(|line| {
            let (key, value) = line.split_once('=')?;
            (key.trim() == "config_version").then(|| value.trim().to_string())
        })
    });

    let version = match config_version.as_deref() {
        Some("3") => "3.x",
        Some("4") => "4.x",
        _ => "unknown",
    };
    if let Some(raw) = config_version {
        candidate.detail("config_version", raw);
    }
    candidate.version = Some(version.to_string());

    candidate
}

fn probe_cocos(project: &Path) -> EngineCandidate {
    let mut candidate = EngineCandidate::new(EngineType::Cocos);

    let project_json = project.join("project.json");
    if !(project_json.is_file() && project.join("assets").is_dir()) {
        return candidate;
    }
    candidate.confidence = Confidence::High.score();

    if let Ok(content) = fs::read_to_string(&project_json) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&content) {
            if let Some(engine) = value.get("engine").and_then(|e| e.as_str()) {
                candidate.detail("engine", engine);
            }
            candidate.version = value
                .get("version")
                .and_then(|v| v.as_str())
                .map(String::from);
        }
    }

    candidate
}
