use super::spinner;
use anyhow::Result;
use gpm::engine::EngineType;
use gpm::transaction::{InstallRequest, InstallTransaction};
use gpm::{Config, RegistryClient};
use std::env;
use std::path::PathBuf;

pub fn run(
    package: String,
    project: Option<PathBuf>,
    engine: Option<EngineType>,
    json: bool,
) -> Result<()> {
    let project = match project {
        Some(p) => p,
        None => env::current_dir()?,
    };

    if !project.is_dir() {
        anyhow::bail!("Project directory does not exist: {}", project.display());
    }

    let config = Config::load()?;
    let registry = RegistryClient::from_config(&config)?;
    let request = InstallRequest::parse(&package, engine);

    let progress = spinner(&format!("Installing {}...", package));
    let result = InstallTransaction::new(&config, &registry).run(&project, &request);
    progress.finish_and_clear();
    let outcome = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if outcome.changed {
        println!(
            "✓ Added {}@{} ({})",
            outcome.name,
            outcome.version,
            outcome.engine.display_name()
        );
    } else {
        println!("✓ {}@{} is already installed", outcome.name, outcome.version);
    }

    Ok(())
}
