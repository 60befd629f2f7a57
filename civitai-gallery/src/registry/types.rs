//! Registry data types.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Opaque identifier of one immutable published model version.
///
/// The id doubles as a cache directory name, so it must be a single normal
/// path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionId(String);

impl VersionId {
    /// Validate and wrap a version id.
    pub fn new(id: impl Into<String>) -> Result<Self, FetchError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() || trimmed.contains(['/', '\\', '\0']) {
            return Err(FetchError::InvalidVersionId(id));
        }
        let mut components = Path::new(trimmed).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(Self(trimmed.to_string())),
            _ => Err(FetchError::InvalidVersionId(id)),
        }
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VersionId {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for VersionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Registry description of a model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMetadata {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    pub model: ModelInfo,
    #[serde(default)]
    pub files: Vec<RegistryFile>,
    pub download_url: String,
    #[serde(default)]
    pub images: Vec<PreviewImage>,
}

impl VersionMetadata {
    /// Declared model type, e.g. `Checkpoint` or `LORA`.
    pub fn model_type(&self) -> &str {
        &self.model.model_type
    }

    /// File variants in server order.
    pub fn variants(&self) -> impl Iterator<Item = &FileVariant> {
        self.files.iter().map(|f| &f.metadata)
    }

    /// URL of the first preview image, if any.
    pub fn first_image_url(&self) -> Option<&str> {
        self.images.first().map(|i| i.url.as_str())
    }
}

/// The parent model of a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(rename = "type")]
    pub model_type: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// One downloadable file of a version.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "sizeKB")]
    pub size_kb: Option<f64>,
    #[serde(default)]
    pub primary: Option<bool>,
    #[serde(default)]
    pub metadata: FileVariant,
    #[serde(default)]
    pub hashes: HashMap<String, String>,
}

impl RegistryFile {
    /// SHA-256 digest published by the registry, if any.
    pub fn sha256(&self) -> Option<&str> {
        self.hashes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("sha256"))
            .map(|(_, v)| v.as_str())
    }
}

/// Encoding attributes of a file. Missing attributes never match a preference.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileVariant {
    #[serde(default)]
    pub fp: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

impl FileVariant {
    /// Convenience constructor for fully specified variants.
    pub fn new(fp: &str, size: &str, format: &str) -> Self {
        Self {
            fp: Some(fp.to_string()),
            size: Some(size.to_string()),
            format: Some(format.to_string()),
        }
    }
}

/// A preview image of a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewImage {
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "id": 128713,
        "name": "v1.0",
        "model": { "name": "Dreamy", "type": "Checkpoint", "nsfw": false },
        "files": [
            {
                "name": "dreamy_v1.safetensors",
                "sizeKB": 2082642.5,
                "primary": true,
                "metadata": { "fp": "fp16", "size": "pruned", "format": "SafeTensor" },
                "hashes": { "SHA256": "ABCDEF" }
            },
            {
                "name": "dreamy_v1.ckpt",
                "metadata": { "fp": null, "size": "full", "format": "PickleTensor" }
            }
        ],
        "downloadUrl": "https://civitai.com/api/download/models/128713",
        "images": [ { "url": "https://image.example/1.png", "width": 512 } ]
    }"#;

    #[test]
    fn test_parse_registry_json() {
        let meta: VersionMetadata = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(meta.model_type(), "Checkpoint");
        assert_eq!(meta.files.len(), 2);
        assert_eq!(
            meta.files[0].metadata,
            FileVariant::new("fp16", "pruned", "SafeTensor")
        );
        assert_eq!(meta.files[1].metadata.fp, None);
        assert_eq!(meta.files[0].sha256(), Some("ABCDEF"));
        assert_eq!(meta.first_image_url(), Some("https://image.example/1.png"));
        assert_eq!(
            meta.download_url,
            "https://civitai.com/api/download/models/128713"
        );
    }

    #[test]
    fn test_parse_minimal_json() {
        let meta: VersionMetadata = serde_json::from_str(
            r#"{"model": {"type": "LORA"}, "downloadUrl": "https://x/d"}"#,
        )
        .unwrap();
        assert!(meta.files.is_empty());
        assert!(meta.images.is_empty());
        assert_eq!(meta.first_image_url(), None);
    }

    #[test]
    fn test_version_id_accepts_plain_ids() {
        assert_eq!(VersionId::new("128713").unwrap().as_str(), "128713");
        assert_eq!(VersionId::new(" 42 ").unwrap().as_str(), "42");
        assert_eq!("abc-1".parse::<VersionId>().unwrap().to_string(), "abc-1");
    }

    #[test]
    fn test_version_id_rejects_path_like_ids() {
        for bad in ["", "  ", ".", "..", "../etc", "a/b", "a\\b", "/abs"] {
            assert!(VersionId::new(bad).is_err(), "{:?} should be rejected", bad);
        }
    }
}
