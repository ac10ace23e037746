//! Key path grammar.
//!
//! A key path has the shape `{root}/{alias}[/public][@{version}]`. The root is
//! a namespace chosen by the provider and is never inferred from the string.

use crate::error::KeyPathError;
use std::fmt;

pub const VERSION_SEPARATOR: char = '@';
pub const PATH_SEPARATOR: char = '/';
pub const PUBLIC_SEGMENT: &str = "public";

/// Structured view over a parsed key path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPathComponents {
    root: String,
    alias: String,
    path: String,
    version_path: String,
    version: u32,
    public: bool,
    version_alias: String,
}

impl KeyPathComponents {
    /// Parse `key_path` relative to `root`.
    ///
    /// Only the version segment can fail to parse; every other shape is
    /// accepted as-is.
    pub fn parse(root: &str, key_path: &str) -> Result<Self, KeyPathError> {
        let (unversioned, version_suffix) = split_version(key_path);
        let version = match version_suffix {
            Some(suffix) => parse_version(key_path, &suffix[VERSION_SEPARATOR.len_utf8()..])?,
            None => 0,
        };

        let public = is_public(unversioned);
        let alias = strip_public(strip_segment_prefix(unversioned, root)).to_string();
        let version_alias = format!("{}{}", strip_public(&alias), version_suffix.unwrap_or(""));
        let path = join(Some(root), Some(&alias)).unwrap_or_default();

        Ok(Self {
            root: root.to_string(),
            alias,
            path,
            version_path: key_path.to_string(),
            version,
            public,
            version_alias,
        })
    }

    /// Configured namespace root.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Identifier relative to the root, without `/public`.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Root and alias joined, without visibility or version.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The original string this value was parsed from.
    pub fn version_path(&self) -> &str {
        &self.version_path
    }

    /// Requested version, `0` meaning "latest".
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_latest(&self) -> bool {
        self.version == 0
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    /// Alias with the original version suffix re-attached.
    pub fn version_alias(&self) -> &str {
        &self.version_alias
    }

    /// Format the components back into a canonical key path.
    pub fn to_key_path(&self) -> String {
        let mut out = self.path.clone();
        if self.public {
            out = add_suffix(Some(&out), Some(PUBLIC_SEGMENT)).unwrap_or_default();
        }
        if self.version > 0 {
            out.push(VERSION_SEPARATOR);
            out.push_str(&self.version.to_string());
        }
        out
    }

    /// Same key at a specific version, keeping root and visibility.
    pub fn with_version(&self, version: u32) -> Self {
        let mut next = self.clone();
        next.version = version;
        let suffix = if version > 0 {
            format!("{VERSION_SEPARATOR}{version}")
        } else {
            String::new()
        };
        next.version_alias = format!("{}{suffix}", self.alias);
        next.version_path = next.to_key_path();
        next
    }
}

impl fmt::Display for KeyPathComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.version_path)
    }
}

/// Join two path fragments with a single separator.
///
/// An absent or empty operand yields the other one unchanged. A version
/// suffix on the left operand is moved to the end of the result unless the
/// right operand carries its own.
pub fn join(left: Option<&str>, right: Option<&str>) -> Option<String> {
    match (left, right) {
        (None, None) => None,
        (Some(left), None) => Some(left.to_string()),
        (None, Some(right)) => Some(right.to_string()),
        (Some(left), Some(right)) if left.is_empty() => Some(right.to_string()),
        (Some(left), Some(right)) if right.is_empty() => Some(left.to_string()),
        (Some(left), Some(right)) => {
            let (left_base, left_version) = split_version(left);
            let (_, right_version) = split_version(right);
            let mut out = format!(
                "{}{PATH_SEPARATOR}{}",
                left_base.trim_end_matches(PATH_SEPARATOR),
                right.trim_start_matches(PATH_SEPARATOR)
            );
            if right_version.is_none() {
                if let Some(version) = left_version {
                    out.push_str(version);
                }
            }
            Some(out)
        }
    }
}

/// Append `suffix` as a trailing segment of the unversioned part of `path`.
///
/// Adding a suffix that is already present is a no-op.
pub fn add_suffix(path: Option<&str>, suffix: Option<&str>) -> Option<String> {
    let path = path?;
    let suffix = match suffix.map(|s| s.trim_matches(PATH_SEPARATOR)) {
        Some(suffix) if !suffix.is_empty() => suffix,
        _ => return Some(path.to_string()),
    };
    let (base, version) = split_version(path);
    let mut out = if ends_with_segment(base, suffix) {
        base.to_string()
    } else {
        join(Some(base), Some(suffix)).unwrap_or_default()
    };
    out.push_str(version.unwrap_or(""));
    Some(out)
}

/// Remove a trailing `suffix` segment from the unversioned part of `path`.
pub fn remove_suffix(path: Option<&str>, suffix: Option<&str>) -> Option<String> {
    let path = path?;
    let suffix = match suffix.map(|s| s.trim_matches(PATH_SEPARATOR)) {
        Some(suffix) if !suffix.is_empty() => suffix,
        _ => return Some(path.to_string()),
    };
    let (base, version) = split_version(path);
    let mut out = strip_segment_suffix(base, suffix).to_string();
    out.push_str(version.unwrap_or(""));
    Some(out)
}

/// Remove a leading `prefix` segment (and the separator after it) from `path`.
pub fn remove_prefix(path: Option<&str>, prefix: Option<&str>) -> Option<String> {
    let path = path?;
    match prefix {
        Some(prefix) => Some(strip_segment_prefix(path, prefix).to_string()),
        None => Some(path.to_string()),
    }
}

/// Split `path` into the unversioned part and the `@…` suffix, if any.
pub fn split_version(path: &str) -> (&str, Option<&str>) {
    match path.find(VERSION_SEPARATOR) {
        Some(idx) => (&path[..idx], Some(&path[idx..])),
        None => (path, None),
    }
}

fn parse_version(key_path: &str, raw: &str) -> Result<u32, KeyPathError> {
    raw.parse::<u32>()
        .map_err(|_| KeyPathError::MalformedVersion {
            path: key_path.to_string(),
            version: raw.to_string(),
        })
}

fn is_public(unversioned: &str) -> bool {
    unversioned
        .strip_suffix(PUBLIC_SEGMENT)
        .is_some_and(|rest| rest.ends_with(PATH_SEPARATOR))
}

fn strip_public(value: &str) -> &str {
    strip_segment_suffix(value, PUBLIC_SEGMENT)
}

fn ends_with_segment(value: &str, segment: &str) -> bool {
    value == segment
        || value
            .strip_suffix(segment)
            .is_some_and(|rest| rest.ends_with(PATH_SEPARATOR))
}

fn strip_segment_suffix<'a>(value: &'a str, segment: &str) -> &'a str {
    match value.strip_suffix(segment) {
        Some("") => "",
        Some(rest) if rest.ends_with(PATH_SEPARATOR) => &rest[..rest.len() - 1],
        _ => value,
    }
}

fn strip_segment_prefix<'a>(value: &'a str, prefix: &str) -> &'a str {
    let prefix = prefix.trim_end_matches(PATH_SEPARATOR);
    if prefix.is_empty() {
        return value;
    }
    match value.strip_prefix(prefix) {
        Some("") => "",
        Some(rest) if rest.starts_with(PATH_SEPARATOR) => rest.trim_start_matches(PATH_SEPARATOR),
        _ => value,
    }
}
