use crate::distribution::DistributionError;
use crate::types::PlatformId;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the default template every chain ends in.
pub const DEFAULT_TEMPLATE: &str = "";

pub const MANIFEST_FILE: &str = "versions.json";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("manifest root must be an object (old versions.json format?)")]
    NotAnObject,
    #[error("unsupported manifest format: {0}, expected 2 or 3")]
    UnsupportedFormat(String),
    #[error("distribution name mismatch: directory '{expected}' <=> manifest '{found}'")]
    NameMismatch { expected: String, found: String },
    #[error("unsupported value for platforms: {0}, expected a list or an object of strings")]
    InvalidPlatforms(String),
    #[error("template '{0}' must be an object")]
    InvalidTemplate(String),
    #[error("versions entry #{index}: {source}")]
    Entry {
        index: usize,
        #[source]
        source: DistributionError,
    },
}

/// Host-platform to distribution-platform mapping, in document order.
///
/// A `platforms` list becomes an identity map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformMap {
    entries: Vec<(PlatformId, PlatformId)>,
}

impl PlatformMap {
    pub fn identity<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: ids
                .into_iter()
                .map(|id| {
                    let id = PlatformId::new(id);
                    (id.clone(), id)
                })
                .collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (PlatformId::new(k), PlatformId::new(v)))
                .collect(),
        }
    }

    fn from_value(value: &Value) -> Result<Self, ManifestError> {
        let invalid = || ManifestError::InvalidPlatforms(value.to_string());
        match value {
            Value::Array(items) => items
                .iter()
                .map(|v| v.as_str().map(str::to_owned))
                .collect::<Option<Vec<_>>>()
                .map(Self::identity)
                .ok_or_else(invalid),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_owned())))
                .collect::<Option<Vec<_>>>()
                .map(Self::from_pairs)
                .ok_or_else(invalid),
            _ => Err(invalid()),
        }
    }

    pub fn contains_host(&self, host: &str) -> bool {
        self.entries.iter().any(|(h, _)| h == host)
    }

    /// Distribution platform id for a host platform.
    pub fn get(&self, host: &str) -> Option<&PlatformId> {
        self.entries.iter().find(|(h, _)| h == host).map(|(_, d)| d)
    }

    /// Host platform id a distribution platform id was mapped from. When
    /// several hosts share it, the last one mapped wins.
    pub fn reverse(&self, dist_platform: &str) -> Option<&PlatformId> {
        self.entries
            .iter()
            .rev()
            .find(|(_, d)| d == dist_platform)
            .map(|(h, _)| h)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &PlatformId> {
        self.entries.iter().map(|(h, _)| h)
    }

    /// Distribution platform ids, deduplicated, in document order.
    pub fn dist_platforms(&self) -> Vec<PlatformId> {
        let mut out: Vec<PlatformId> = Vec::new();
        for (_, d) in &self.entries {
            if !out.contains(d) {
                out.push(d.clone());
            }
        }
        out
    }
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    platforms: Option<Value>,
    #[serde(default)]
    common: Option<Map<String, Value>>,
    #[serde(default)]
    templates: Option<Map<String, Value>>,
    versions: Vec<Map<String, Value>>,
}

/// A parsed `versions.json` document (format 2 or 3).
#[derive(Debug, Clone)]
pub struct ManifestDocument {
    pub format: u64,
    pub name: String,
    pub platforms: Option<PlatformMap>,
    pub templates: BTreeMap<String, Map<String, Value>>,
    pub versions: Vec<Map<String, Value>>,
}

impl ManifestDocument {
    /// Ensure the document belongs to the install root it is loaded for.
    pub fn check_name(&self, dist_root: &Path) -> Result<(), ManifestError> {
        let expected = dist_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.name == expected {
            Ok(())
        } else {
            Err(ManifestError::NameMismatch {
                expected,
                found: self.name.clone(),
            })
        }
    }

    pub fn template(&self, name: &str) -> Option<&Map<String, Value>> {
        self.templates.get(name)
    }
}

pub fn parse_manifest_value(value: Value) -> Result<ManifestDocument, ManifestError> {
    let Value::Object(ref root) = value else {
        return Err(ManifestError::NotAnObject);
    };
    let format = match root.get("format") {
        None => 2,
        Some(v) => match v.as_u64() {
            Some(f @ (2 | 3)) => f,
            _ => return Err(ManifestError::UnsupportedFormat(v.to_string())),
        },
    };

    let raw: RawDocument = serde_json::from_value(value)?;
    let platforms = raw
        .platforms
        .as_ref()
        .map(PlatformMap::from_value)
        .transpose()?;

    let mut templates = BTreeMap::new();
    if format == 2 {
        templates.insert(DEFAULT_TEMPLATE.to_owned(), raw.common.unwrap_or_default());
    } else {
        for (name, template) in raw.templates.unwrap_or_default() {
            let Value::Object(fields) = template else {
                return Err(ManifestError::InvalidTemplate(name));
            };
            templates.insert(name, fields);
        }
        templates.entry(DEFAULT_TEMPLATE.to_owned()).or_default();
    }

    Ok(ManifestDocument {
        format,
        name: raw.name,
        platforms,
        templates,
        versions: raw.versions,
    })
}

pub fn parse_manifest_str(input: &str) -> Result<ManifestDocument, ManifestError> {
    parse_manifest_value(serde_json::from_str(input)?)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<ManifestDocument, ManifestError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_manifest_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_format_2_manifest() {
        let input = r#"{
            "format": 2,
            "name": "nwjs",
            "platforms": {"linux-x86_64": "linux-x64", "windows-x86_64": "win-x64"},
            "common": {"url": "https://dl.nwjs.io/v{version!v}/nwjs-v{version!v}-{platform}.tar.gz"},
            "versions": [{"version": [0, 72, 0]}, {"version": [0, 12, 3]}]
        }"#;
        let doc = parse_manifest_str(input).expect("should parse");
        assert_eq!(doc.format, 2);
        assert_eq!(doc.name, "nwjs");
        assert_eq!(doc.versions.len(), 2);
        assert_eq!(doc.templates.len(), 1);
        assert!(doc.template(DEFAULT_TEMPLATE).unwrap().contains_key("url"));
        let map = doc.platforms.unwrap();
        assert_eq!(map.get("linux-x86_64").unwrap(), "linux-x64");
        assert_eq!(map.reverse("win-x64").unwrap(), "windows-x86_64");
    }

    #[test]
    fn reverse_lookup_prefers_last_host() {
        let map = PlatformMap::from_pairs([
            ("linux-x86", "linux-ia32"),
            ("linux-i686", "linux-ia32"),
            ("linux-x86_64", "linux-x64"),
        ]);
        assert_eq!(map.reverse("linux-ia32").unwrap(), "linux-i686");
        assert_eq!(map.reverse("linux-x64").unwrap(), "linux-x86_64");
        assert!(map.reverse("win-x64").is_none());
        assert_eq!(map.dist_platforms().len(), 2);
    }

    #[test]
    fn format_defaults_to_2() {
        let doc = parse_manifest_str(r#"{"name": "x", "versions": []}"#).expect("should parse");
        assert_eq!(doc.format, 2);
        assert!(doc.template(DEFAULT_TEMPLATE).unwrap().is_empty());
        assert!(doc.platforms.is_none());
    }

    #[test]
    fn format_3_synthesizes_default_template() {
        let input = r#"{
            "format": 3,
            "name": "godot",
            "templates": {"base": {"binary": "godot"}},
            "versions": [{"version": [3, 5], "template": "base"}]
        }"#;
        let doc = parse_manifest_str(input).expect("should parse");
        assert_eq!(doc.templates.len(), 2);
        assert!(doc.template(DEFAULT_TEMPLATE).unwrap().is_empty());
        assert_eq!(doc.template("base").unwrap()["binary"], "godot");
    }

    #[test]
    fn rejects_unknown_format() {
        for format in ["1", "4", "\"3\"", "2.5"] {
            let input = format!(r#"{{"format": {format}, "name": "x", "versions": []}}"#);
            assert!(
                matches!(
                    parse_manifest_str(&input),
                    Err(ManifestError::UnsupportedFormat(_))
                ),
                "format {format} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_non_object_root() {
        assert!(matches!(
            parse_manifest_str("[]"),
            Err(ManifestError::NotAnObject)
        ));
    }

    #[test]
    fn rejects_invalid_platforms() {
        for platforms in ["\"linux\"", "[1, 2]", "{\"linux\": 3}"] {
            let input = format!(r#"{{"name": "x", "platforms": {platforms}, "versions": []}}"#);
            assert!(matches!(
                parse_manifest_str(&input),
                Err(ManifestError::InvalidPlatforms(_))
            ));
        }
    }

    #[test]
    fn rejects_missing_versions() {
        assert!(matches!(
            parse_manifest_str(r#"{"name": "x"}"#),
            Err(ManifestError::Parse(_))
        ));
    }

    #[test]
    fn name_must_match_directory() {
        let doc = parse_manifest_str(r#"{"name": "nwjs", "versions": []}"#).expect("should parse");
        assert!(doc.check_name(Path::new("/app/dist/nwjs")).is_ok());
        match doc.check_name(Path::new("/app/dist/godot")) {
            Err(ManifestError::NameMismatch { expected, found }) => {
                assert_eq!(expected, "godot");
                assert_eq!(found, "nwjs");
            }
            other => panic!("expected NameMismatch, got {other:?}"),
        }
    }

    #[test]
    fn platform_list_is_identity_map() {
        let map = PlatformMap::identity(["linux64", "win64", "linux64"]);
        assert_eq!(map.get("win64").unwrap(), "win64");
        assert!(map.contains_host("linux64"));
        assert!(!map.contains_host("osx64"));
        assert_eq!(map.dist_platforms().len(), 2);
    }

    #[test]
    fn reads_manifest_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        fs::write(&path, r#"{"name": "renpy", "versions": [{"version": "8.1.3"}]}"#).unwrap();
        let doc = parse_manifest_file(&path).expect("should parse");
        assert_eq!(doc.name, "renpy");
        assert!(matches!(
            parse_manifest_file(dir.path().join("missing.json")),
            Err(ManifestError::Io { .. })
        ));
    }
}
