//! Pack command - create a package tarball without publishing

use anyhow::Result;
use gpm::packager::{self, format_size};
use gpm::{FileFilter, PackageManifest};
use serde_json::json;
use std::env;
use std::path::PathBuf;

pub fn run(path: Option<PathBuf>, out_dir: Option<PathBuf>, dry_run: bool, json: bool) -> Result<()> {
    let root = match path {
        Some(p) => p,
        None => env::current_dir()?,
    };

    if !root.is_dir() {
        anyhow::bail!("Package directory does not exist: {}", root.display());
    }

    let manifest = PackageManifest::load(&root)?;
    manifest.validate()?;

    let filter = FileFilter::with_manifest(&root, Some(&manifest))?;
    let result = filter.filter_files()?;

    if dry_run {
        let file_name = packager::artifact_file_name(&manifest.name, &manifest.version)?;
        let target = out_dir.unwrap_or_else(|| root.clone()).join(file_name);

        if json {
            let files: Vec<_> = result
                .regular_files()
                .map(|f| json!({ "path": f.relative_path, "size": f.size }))
                .collect();
            let excluded: Vec<_> = result
                .excluded
                .iter()
                .map(|e| json!({ "path": e.relative_path, "reason": e.reason.to_string() }))
                .collect();
            let report = json!({
                "name": manifest.name,
                "version": manifest.version,
                "filename": target,
                "files": files,
                "excluded": excluded,
                "entryCount": result.file_count,
                "unpackedSize": result.total_size,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!("Package: {}@{}", manifest.name, manifest.version);
        if let Some(source) = filter.ignore_source() {
            println!("Ignore rules: {}", source);
        } else if filter.has_files_field() {
            println!("Using \"files\" from package.json");
        }
        println!();
        println!("Contents:");
        for file in result.regular_files() {
            println!("  {:>10}  {}", format_size(file.size), file.relative_path);
        }
        if !result.excluded.is_empty() {
            println!();
            println!("Excluded:");
            for entry in &result.excluded {
                println!("  {}  ({})", entry.relative_path, entry.reason);
            }
        }
        println!();
        println!("  Files: {}", result.file_count);
        println!("  Unpacked size: {}", format_size(result.total_size));
        println!();
        println!("[DRY RUN] Would create: {}", target.display());
        return Ok(());
    }

    let out_dir = out_dir.unwrap_or_else(|| root.clone());
    let artifact = packager::pack(&manifest, &result, &out_dir)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&artifact)?);
        return Ok(());
    }

    println!("Packed {}@{}", artifact.name, artifact.version);
    println!();
    println!("  Output: {}", artifact.output_path.display());
    println!("  Files: {}", artifact.file_count());
    println!("  Package size: {}", format_size(artifact.size));
    println!("  Unpacked size: {}", format_size(artifact.unpacked_size));
    println!("  Shasum: {}", artifact.shasum);
    println!("  Integrity: {}", artifact.integrity);

    Ok(())
}
