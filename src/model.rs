//! Image references, chapter manifests and per-reference outcomes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::format::FormatConfig;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Derive the logical name for a zero-based ordinal, e.g. `page-003`
pub fn logical_name(ordinal: usize) -> String {
    format!("page-{:03}", ordinal)
}

/// One image to fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub url: String,
    pub ordinal: usize,
    pub logical_name: String,
    /// Failed attempts so far; only the scheduler mutates this
    #[serde(default)]
    pub retry_count: u32,
}

impl ImageReference {
    pub fn new(url: impl Into<String>, ordinal: usize) -> Self {
        Self {
            url: url.into(),
            ordinal,
            logical_name: logical_name(ordinal),
            retry_count: 0,
        }
    }

    /// Only http(s) sources are fetchable; anything else is excluded up front.
    pub fn has_http_scheme(&self) -> bool {
        let url = self.url.trim_start();
        let scheme_end = url.find("://");
        match scheme_end.map(|i| url[..i].to_ascii_lowercase()) {
            Some(scheme) => scheme == "http" || scheme == "https",
            None => false,
        }
    }

    /// Final output file name (`page-003.webp`)
    pub fn file_name(&self, format: &FormatConfig) -> String {
        format!("{}.{}", self.logical_name, format.extension())
    }

    pub fn destination(&self, dir: &Path, format: &FormatConfig) -> PathBuf {
        dir.join(self.file_name(format))
    }
}

/// Build references from an ordered URL list; ordinals follow list position.
pub fn references_from_urls<I, S>(urls: I) -> Vec<ImageReference>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    urls.into_iter()
        .enumerate()
        .map(|(ordinal, url)| ImageReference::new(url, ordinal))
        .collect()
}

/// Output of the content discoverer for one chapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterManifest {
    #[serde(default)]
    pub chapter: Option<String>,
    pub images: Vec<String>,
}

impl ChapterManifest {
    /// Accepts `{"chapter": .., "images": [..]}` or a bare array of URLs.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Full(ChapterManifest),
            Bare(Vec<String>),
        }

        Ok(match serde_json::from_str(raw)? {
            Shape::Full(manifest) => manifest,
            Shape::Bare(images) => ChapterManifest {
                chapter: None,
                images,
            },
        })
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn references(&self) -> Vec<ImageReference> {
        references_from_urls(self.images.iter().cloned())
    }
}

/// Pipeline stage a unit failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Transcode,
    Write,
    /// The unit task itself died (panic or abort)
    Unit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Fetch => "fetch",
            Stage::Transcode => "transcode",
            Stage::Write => "write",
            Stage::Unit => "unit",
        };
        f.write_str(s)
    }
}

/// Materialized output of one reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Success {
    pub reference: ImageReference,
    pub filename: String,
    /// True when the file already existed and no fetch happened
    pub skipped: bool,
}

/// Reference that exhausted its retries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub reference: ImageReference,
    pub stage: Stage,
    pub error: String,
}

impl Failure {
    pub fn attempts(&self) -> u32 {
        self.reference.retry_count + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Encoder;

    #[test]
    fn test_logical_name_is_zero_padded() {
        assert_eq!(logical_name(0), "page-000");
        assert_eq!(logical_name(3), "page-003");
        assert_eq!(logical_name(1234), "page-1234");
    }

    #[test]
    fn test_destination_is_deterministic() {
        let format = FormatConfig::new(Encoder::Jpeg, 90);
        let a = ImageReference::new("https://cdn.example.com/a.png", 7);
        let mut b = a.clone();
        b.retry_count = 2;

        let dir = Path::new("/tmp/chapter-1");
        assert_eq!(a.destination(dir, &format), dir.join("page-007.jpeg"));
        assert_eq!(a.destination(dir, &format), b.destination(dir, &format));
    }

    #[test]
    fn test_http_scheme_detection() {
        assert!(ImageReference::new("https://example.com/x.png", 0).has_http_scheme());
        assert!(ImageReference::new("HTTP://example.com/x.png", 0).has_http_scheme());
        assert!(!ImageReference::new("ftp://example.com/x.png", 0).has_http_scheme());
        assert!(!ImageReference::new("data:image/png;base64,AAAA", 0).has_http_scheme());
        assert!(!ImageReference::new("/relative/x.png", 0).has_http_scheme());
    }

    #[test]
    fn test_references_follow_list_order() {
        let refs = references_from_urls(["https://a/1", "https://a/2", "https://a/3"]);
        let ordinals: Vec<_> = refs.iter().map(|r| r.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        assert_eq!(refs[2].logical_name, "page-002");
        assert!(refs.iter().all(|r| r.retry_count == 0));
    }

    #[test]
    fn test_manifest_shapes() {
        let full = ChapterManifest::from_json(
            r#"{"chapter": "Chapter 1", "images": ["https://a/1.png", "https://a/2.png"]}"#,
        )
        .unwrap();
        assert_eq!(full.chapter.as_deref(), Some("Chapter 1"));
        assert_eq!(full.references().len(), 2);

        let bare = ChapterManifest::from_json(r#"["https://a/1.png"]"#).unwrap();
        assert_eq!(bare.chapter, None);
        assert_eq!(bare.images, vec!["https://a/1.png"]);

        assert!(ChapterManifest::from_json(r#"{"chapter": "x"}"#).is_err());
    }

    #[test]
    fn test_manifest_load_missing_file() {
        let result = ChapterManifest::load(Path::new("/definitely/not/here.json"));
        assert!(matches!(result, Err(ManifestError::Read { .. })));
    }
}
