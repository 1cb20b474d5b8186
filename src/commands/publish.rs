//! Publish command - pack (or re-read) a package and upload it

use super::spinner;
use anyhow::Result;
use gpm::packager::{self, format_size, PackagedArtifact};
use gpm::registry::PublishRequest;
use gpm::{Config, FileFilter, PackageManifest, RegistryClient};
use serde_json::json;
use std::env;
use std::path::{Path, PathBuf};

pub fn run(path: Option<PathBuf>, dry_run: bool, json: bool) -> Result<()> {
    let target = match path {
        Some(p) => p,
        None => env::current_dir()?,
    };

    let (artifact, description) = if is_tarball(&target) {
        (packager::repack(&target)?, None)
    } else if target.is_dir() {
        let manifest = PackageManifest::load(&target)?;
        manifest.validate()?;
        let filter = FileFilter::with_manifest(&target, Some(&manifest))?;
        let result = filter.filter_files()?;

        if dry_run {
            return report_dry_run(&manifest, result.file_count, result.total_size, json);
        }
        (packager::pack(&manifest, &result, &target)?, manifest.description)
    } else {
        anyhow::bail!(
            "Nothing to publish at {} (expected a package directory or a .tgz file)",
            target.display()
        );
    };

    if dry_run {
        return report_artifact(&artifact, json, None);
    }

    let config = Config::load()?;
    let registry = RegistryClient::from_config(&config)?;

    let request = PublishRequest {
        name: artifact.name.clone(),
        version: artifact.version.clone(),
        description,
        shasum: artifact.shasum.clone(),
        integrity: artifact.integrity.clone(),
        size: artifact.size,
        unpacked_size: artifact.unpacked_size,
        file_count: artifact.file_count(),
    };

    let progress = spinner(&format!("Publishing {}@{}...", request.name, request.version));
    let published = registry.publish(&request, &artifact.output_path);
    progress.finish_and_clear();
    let response = published?;

    report_artifact(&artifact, json, Some(&response.download_url))?;
    if !json {
        println!();
        println!("Published to {}", registry.url());
    }
    Ok(())
}

fn is_tarball(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".tgz") || n.ends_with(".tar.gz"))
}

fn report_dry_run(manifest: &PackageManifest, files: usize, size: u64, json: bool) -> Result<()> {
    if json {
        let report = json!({
            "name": manifest.name,
            "version": manifest.version,
            "entryCount": files,
            "unpackedSize": size,
            "dryRun": true,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("[DRY RUN] Would publish {}@{}", manifest.name, manifest.version);
        println!("  Files: {}", files);
        println!("  Unpacked size: {}", format_size(size));
    }
    Ok(())
}

fn report_artifact(artifact: &PackagedArtifact, json: bool, download_url: Option<&str>) -> Result<()> {
    if json {
        let mut report = serde_json::to_value(artifact)?;
        if let Some(url) = download_url {
            report["download_url"] = json!(url);
        }
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if download_url.is_none() {
        print!("[DRY RUN] ");
    }
    println!("{}@{}", artifact.name, artifact.version);
    println!("  Tarball: {}", artifact.output_path.display());
    println!("  Files: {}", artifact.file_count());
    println!("  Package size: {}", format_size(artifact.size));
    println!("  Integrity: {}", artifact.integrity);
    if let Some(url) = download_url.filter(|u| !u.is_empty()) {
        println!("  Download: {}", url);
    }
    Ok(())
}
