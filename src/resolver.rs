//! Pick one concrete version of a package from a registry response
//!
//! Supported requests:
//!
//! - `""`, `"latest"`, `"*"`: the `latest` dist-tag
//! - an exact version present in the catalog
//! - `^X.Y.Z` (same major), `~X.Y.Z` (same major and minor)
//! - `>=`, `>`, `<=`, `<` against the operand
//! - the name of another dist-tag (`beta`, `next`)
//!
//! Versions are compared on up to three leading numeric components; missing
//! components count as 0 and pre-release suffixes do not affect range
//! membership. Among the survivors of a range filter the greatest version
//! wins, with semver precedence deciding between equal components
//! (`2.0.0-beta.2` over `2.0.0-beta.1`, `2.0.0` over both).
//!
//! # Examples
//!
//! ```
//! use gpm::resolver::resolve;
//! use std::collections::BTreeMap;
//!
//! let available: BTreeMap<String, ()> = ["1.0.0", "1.2.3", "1.9.0", "2.0.0"]
//!     .into_iter()
//!     .map(|v| (v.to_string(), ()))
//!     .collect();
//!
//! let picked = resolve("com.acme.widget", "^1.0.0", None, &available).unwrap();
//! assert_eq!(picked, "1.9.0");
//! ```

use crate::registry::PackageMetadata;
use crate::{Error, Result};
use semver::Version;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

/// Range operators understood by the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    Caret,
    Tilde,
    GreaterEq,
    Greater,
    LessEq,
    Less,
}

impl RangeOp {
    fn as_str(&self) -> &'static str {
        match self {
            RangeOp::Caret => "^",
            RangeOp::Tilde => "~",
            RangeOp::GreaterEq => ">=",
            RangeOp::Greater => ">",
            RangeOp::LessEq => "<=",
            RangeOp::Less => "<",
        }
    }

    /// Split a request like `>=1.2.0` into operator and operand
    fn split(spec: &str) -> Option<(RangeOp, &str)> {
        // two-character operators first so ">=" is not read as ">"
        const OPS: [(&str, RangeOp); 6] = [
            (">=", RangeOp::GreaterEq),
            ("<=", RangeOp::LessEq),
            ("^", RangeOp::Caret),
            ("~", RangeOp::Tilde),
            (">", RangeOp::Greater),
            ("<", RangeOp::Less),
        ];
        OPS.iter().find_map(|(prefix, op)| {
            spec.strip_prefix(*prefix)
                .map(|operand| (*op, operand.trim_start()))
        })
    }

    fn accepts(&self, candidate: &[u64; 3], operand: &[u64; 3]) -> bool {
        let ord = candidate.cmp(operand);
        match self {
            RangeOp::Caret => candidate[0] == operand[0],
            RangeOp::Tilde => candidate[0] == operand[0] && candidate[1] == operand[1],
            RangeOp::GreaterEq => ord != Ordering::Less,
            RangeOp::Greater => ord == Ordering::Greater,
            RangeOp::LessEq => ord != Ordering::Greater,
            RangeOp::Less => ord == Ordering::Less,
        }
    }
}

/// Resolve `requested` against a registry metadata document
pub fn resolve_version(metadata: &PackageMetadata, requested: &str) -> Result<String> {
    resolve(
        &metadata.name,
        requested,
        metadata.dist_tags.as_ref(),
        &metadata.versions,
    )
}

/// Resolve `requested` against dist-tags and the set of available versions
///
/// `dist_tags` is `None` when the registry sent no dist-tags object at all.
pub fn resolve<V>(
    package: &str,
    requested: &str,
    dist_tags: Option<&BTreeMap<String, String>>,
    available: &BTreeMap<String, V>,
) -> Result<String> {
    let requested = requested.trim();

    if is_latest(requested) {
        let tags = dist_tags
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::NoDistTags(package.to_string()))?;
        let latest = tags
            .get("latest")
            .ok_or_else(|| Error::NoLatestTag(package.to_string()))?;
        debug!(package, version = %latest, "resolved latest dist-tag");
        return Ok(latest.clone());
    }

    if available.contains_key(requested) {
        return Ok(requested.to_string());
    }

    if let Some((op, operand)) = RangeOp::split(requested) {
        if !looks_like_version(operand) {
            return Err(Error::UnsupportedRange {
                package: package.to_string(),
                spec: requested.to_string(),
            });
        }
        return resolve_range(package, op, operand, available);
    }

    if is_unsupported_range(requested) {
        return Err(Error::UnsupportedRange {
            package: package.to_string(),
            spec: requested.to_string(),
        });
    }

    if let Some(tagged) = dist_tags.and_then(|t| t.get(requested)) {
        debug!(package, tag = requested, version = %tagged, "resolved dist-tag");
        return Ok(tagged.clone());
    }

    Err(Error::VersionNotAvailable {
        package: package.to_string(),
        version: requested.to_string(),
    })
}

fn resolve_range<V>(
    package: &str,
    op: RangeOp,
    operand: &str,
    available: &BTreeMap<String, V>,
) -> Result<String> {
    let target = parse_components(operand);

    let best = available
        .keys()
        .map(|v| (parse_components(v), v))
        .filter(|(components, _)| op.accepts(components, &target))
        .map(|(components, v)| ((components, strict_version(v)), v))
        .fold(None::<(VersionKey, &String)>, |best, candidate| match best {
            Some(current) if current.0 >= candidate.0 => Some(current),
            _ => Some(candidate),
        });

    match best {
        Some((_, version)) => {
            debug!(package, op = op.as_str(), operand, version = %version, "resolved range");
            Ok(version.clone())
        }
        None => Err(Error::NoRangeMatch {
            package: package.to_string(),
            operator: op.as_str().to_string(),
            operand: operand.to_string(),
        }),
    }
}

fn is_latest(requested: &str) -> bool {
    matches!(requested, "" | "latest" | "*")
}

/// Range syntax we recognise but deliberately do not evaluate
fn is_unsupported_range(requested: &str) -> bool {
    requested.contains(" - ")
        || requested.contains("||")
        || requested.split_whitespace().count() > 1
        || requested
            .split('.')
            .any(|segment| matches!(segment, "x" | "X" | "*"))
}

fn looks_like_version(operand: &str) -> bool {
    operand
        .chars()
        .next()
        .map(|c| c.is_ascii_digit())
        .unwrap_or(false)
        && !operand.contains(char::is_whitespace)
}

/// Numeric components first; full semver precedence breaks ties between
/// pre-releases of the same version
type VersionKey = ([u64; 3], Option<Version>);

fn strict_version(version: &str) -> Option<Version> {
    Version::parse(version.trim().trim_start_matches(['v', '='])).ok()
}

/// Up to three leading numeric components; `1.2.3-beta.1` reads as `[1, 2, 3]`
pub fn parse_components(version: &str) -> [u64; 3] {
    let version = version.trim().trim_start_matches(['v', '=']);
    let mut out = [0u64; 3];
    for (slot, segment) in out.iter_mut().zip(version.split('.')) {
        let digits: String = segment.chars().take_while(|c| c.is_ascii_digit()).collect();
        *slot = digits.parse().unwrap_or(0);
    }
    out
}

/// Split `name@version` into its parts; a bare name requests latest
///
/// A leading `@` (npm scope) is part of the name.
pub fn parse_package_spec(spec: &str) -> (String, String) {
    let search_from = usize::from(spec.starts_with('@'));
    match spec[search_from..].find('@') {
        Some(pos) => {
            let at = pos + search_from;
            (spec[..at].to_string(), spec[at + 1..].to_string())
        }
        None => (spec.to_string(), String::new()),
    }
}
