//! Build `.tgz` package artifacts
//!
//! Archives follow the npm tarball convention: gzip-compressed tar, every
//! entry under a `package/` prefix, `package/package.json` always present.
//! Digests are computed over file contents as they are streamed into the
//! archive, not over the tar framing.
//!
//! # Examples
//!
//! ```no_run
//! use gpm::packager::pack_directory;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let artifact = pack_directory("./my-package", "./dist")?;
//! println!("{} ({})", artifact.output_path.display(), artifact.integrity);
//! # Ok(())
//! # }
//! ```

use crate::filter::{FileFilter, FilterResult};
use crate::manifest::{PackageManifest, PACKAGE_MANIFEST_NAME};
use crate::{Error, Result};
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use sha1::Sha1;
use sha2::{Digest, Sha512};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Entry prefix inside every package tarball
pub const ARCHIVE_PREFIX: &str = "package/";

/// Fixed entry mtime (1985-10-26T08:15:00Z, as npm uses) so identical inputs
/// produce identical archives
const ENTRY_MTIME: u64 = 499_162_500;

#[derive(Debug, Clone, Serialize)]
pub struct PackagedArtifact {
    pub output_path: PathBuf,
    pub name: String,
    pub version: String,
    /// Relative paths of archived files, in archive order
    pub files: Vec<String>,
    pub unpacked_size: u64,
    pub size: u64,
    /// Hex SHA-1 over file contents
    pub shasum: String,
    /// Hex SHA-512 over file contents
    pub sha512: String,
    /// `sha512-<base64>`
    pub integrity: String,
}

impl PackagedArtifact {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// Human-readable byte count
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} kB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Running SHA-1 and SHA-512 over everything written to it
#[derive(Default)]
struct ContentDigests {
    sha1: Sha1,
    sha512: Sha512,
    bytes: u64,
}

impl ContentDigests {
    fn update(&mut self, data: &[u8]) {
        self.sha1.update(data);
        self.sha512.update(data);
        self.bytes += data.len() as u64;
    }

    fn finish(self) -> (String, String, String, u64) {
        let sha1 = self.sha1.finalize();
        let sha512 = self.sha512.finalize();
        let integrity = format!(
            "sha512-{}",
            base64::engine::general_purpose::STANDARD.encode(sha512)
        );
        (hex::encode(sha1), hex::encode(sha512), integrity, self.bytes)
    }
}

impl Write for ContentDigests {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reader that feeds every byte it yields into the digests
struct DigestReader<'a, R> {
    inner: R,
    digests: &'a mut ContentDigests,
}

impl<R: Read> Read for DigestReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.digests.update(&buf[..n]);
        Ok(n)
    }
}

/// Reject names that could place the artifact outside its directory
pub fn check_filename_safe(kind: &str, value: &str) -> Result<()> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0']);
    if bad {
        return Err(Error::UnsafeFilename(format!(
            "package {} '{}' cannot be used in a file name",
            kind,
            value.escape_debug()
        )));
    }
    Ok(())
}

pub fn artifact_file_name(name: &str, version: &str) -> Result<String> {
    check_filename_safe("name", name)?;
    check_filename_safe("version", version)?;
    Ok(format!("{}-{}.tgz", name, version))
}

/// Filter `root` and pack the result into `out_dir`
pub fn pack_directory<P: AsRef<Path>, Q: AsRef<Path>>(
    root: P,
    out_dir: Q,
) -> Result<PackagedArtifact> {
    let root = root.as_ref();
    let manifest = PackageManifest::load(root)?;
    let filter = FileFilter::with_manifest(root, Some(&manifest))?;
    let result = filter.filter_files()?;
    pack(&manifest, &result, out_dir)
}

/// Write the filtered files to `<out_dir>/<name>-<version>.tgz`
///
/// `manifest` is the one the filter was built from; it is validated here but
/// not re-read. On any I/O error the partial tarball is removed.
pub fn pack<Q: AsRef<Path>>(
    manifest: &PackageManifest,
    filtered: &FilterResult,
    out_dir: Q,
) -> Result<PackagedArtifact> {
    manifest.validate()?;

    let file_name = artifact_file_name(&manifest.name, &manifest.version)?;
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir)?;
    let output_path = out_dir.join(file_name);

    let written = write_archive(&output_path, filtered);
    let (files, digests) = match written {
        Ok(done) => done,
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&output_path) {
                warn!(path = %output_path.display(), error = %cleanup, "could not remove partial tarball");
            }
            return Err(e);
        }
    };

    let size = fs::metadata(&output_path)?.len();
    let (shasum, sha512, integrity, unpacked_size) = digests.finish();

    info!(
        name = %manifest.name,
        version = %manifest.version,
        files = files.len(),
        size,
        "packed"
    );

    Ok(PackagedArtifact {
        output_path,
        name: manifest.name.clone(),
        version: manifest.version.clone(),
        files,
        unpacked_size,
        size,
        shasum,
        sha512,
        integrity,
    })
}

fn write_archive(
    output_path: &Path,
    filtered: &FilterResult,
) -> Result<(Vec<String>, ContentDigests)> {
    let file = File::create(output_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut tar = tar::Builder::new(encoder);
    let mut digests = ContentDigests::default();
    let mut files = Vec::with_capacity(filtered.file_count);

    for entry in filtered.regular_files() {
        let source = File::open(&entry.absolute_path)?;
        let metadata = source.metadata()?;

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(metadata.len());
        header.set_mode(file_mode(&metadata));
        header.set_mtime(ENTRY_MTIME);

        let archive_path = format!("{}{}", ARCHIVE_PREFIX, entry.relative_path);
        debug!(path = %archive_path, size = metadata.len(), "adding entry");

        let reader = DigestReader {
            inner: source.take(metadata.len()),
            digests: &mut digests,
        };
        tar.append_data(&mut header, &archive_path, reader)?;
        files.push(entry.relative_path.clone());
    }

    // tar trailer, then gzip footer, then the file itself
    let encoder = tar.into_inner()?;
    let mut file = encoder.finish()?;
    file.flush()?;
    drop(file);

    Ok((files, digests))
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata) -> u32 {
    0o644
}

/// Re-read an existing tarball and report it as a freshly packed artifact
///
/// Name and version come from the embedded `package/package.json`; nothing is
/// re-filtered.
pub fn repack<P: AsRef<Path>>(tarball: P) -> Result<PackagedArtifact> {
    let tarball = tarball.as_ref();
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(tarball)?));

    let mut digests = ContentDigests::default();
    let mut files = Vec::new();
    let mut manifest: Option<PackageManifest> = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry.path()?.into_owned();
        let relative = archive_relative_path(&path)?;

        if relative == PACKAGE_MANIFEST_NAME {
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            digests.update(&content);
            let text = String::from_utf8_lossy(&content);
            manifest = Some(PackageManifest::from_json(&text)?);
        } else {
            io::copy(&mut entry, &mut digests)?;
        }
        files.push(relative);
    }

    let manifest = manifest.ok_or_else(|| {
        Error::InvalidManifest(format!(
            "{} does not contain {}{}",
            tarball.display(),
            ARCHIVE_PREFIX,
            PACKAGE_MANIFEST_NAME
        ))
    })?;
    artifact_file_name(&manifest.name, &manifest.version)?;

    let size = fs::metadata(tarball)?.len();
    let (shasum, sha512, integrity, unpacked_size) = digests.finish();

    Ok(PackagedArtifact {
        output_path: tarball.to_path_buf(),
        name: manifest.name,
        version: manifest.version,
        files,
        unpacked_size,
        size,
        shasum,
        sha512,
        integrity,
    })
}

/// Strip the `package/` prefix, refusing anything that could escape it
fn archive_relative_path(path: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => {
                return Err(Error::UnsafeFilename(format!(
                    "archive entry '{}' escapes the package root",
                    path.display()
                )))
            }
        }
    }

    let prefix = ARCHIVE_PREFIX.trim_end_matches('/');
    match parts.split_first() {
        Some((first, rest)) if first == prefix && !rest.is_empty() => Ok(rest.join("/")),
        _ => Err(Error::InvalidManifest(format!(
            "archive entry '{}' is outside {}",
            path.display(),
            ARCHIVE_PREFIX
        ))),
    }
}
