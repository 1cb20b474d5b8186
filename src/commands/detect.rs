use anyhow::Result;
use gpm::detect::detect;
use std::env;
use std::path::PathBuf;

pub fn run(dir: Option<PathBuf>, json: bool) -> Result<()> {
    let dir = match dir {
        Some(d) => d,
        None => env::current_dir()?,
    };

    let detection = detect(&dir);

    if json {
        println!("{}", serde_json::to_string_pretty(&detection)?);
        return Ok(());
    }

    if detection.is_empty() {
        println!("No supported engine detected in {}", dir.display());
        return Ok(());
    }

    for candidate in &detection.candidates {
        let version = candidate.version.as_deref().unwrap_or("unknown version");
        println!(
            "{:<14} {:>3}%  {}",
            candidate.engine.display_name(),
            candidate.confidence,
            version
        );
        for (key, value) in &candidate.details {
            println!("    {}: {}", key, value);
        }
    }

    if detection.has_ambiguous() {
        println!();
        println!("Warning: more than one engine matched with high confidence; pass --engine to install.");
    }

    Ok(())
}
