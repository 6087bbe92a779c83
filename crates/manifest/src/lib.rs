//! Manifest codec: a `---` separated YAML stream to and from ordered documents.

#![forbid(unsafe_code)]

use mapkubeapis_core::{Document, DocumentSequence};
use serde::Deserialize;
use serde_yaml::Value as Yaml;
use thiserror::Error;
use tracing::debug;

/// Stream header. Always emitted, even for a single document.
pub const DOCUMENT_SEPARATOR: &str = "---\n";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest too large ({bytes} bytes, max {max})")]
    TooLarge { bytes: usize, max: usize },
    #[error("failed to decode manifest document #{index}")]
    Decode {
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("manifest document #{index} is not a mapping")]
    NotAMapping { index: usize },
    #[error("failed to encode manifest document #{index}")]
    Encode {
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },
}

fn max_manifest_bytes() -> usize {
    std::env::var("MAPKUBEAPIS_MAX_MANIFEST_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(32 * 1024 * 1024)
}

/// Decode a manifest stream into documents, in stream order.
///
/// Documents that are empty (stray separators, comment-only sections, `{}`) are skipped.
/// Anything else that is not a mapping, and any YAML error, fails the whole decode.
pub fn decode(text: &str) -> Result<DocumentSequence, ManifestError> {
    decode_with_limit(text, max_manifest_bytes())
}

fn decode_with_limit(text: &str, max: usize) -> Result<DocumentSequence, ManifestError> {
    if text.len() > max {
        return Err(ManifestError::TooLarge { bytes: text.len(), max });
    }
    let mut docs = DocumentSequence::new();
    for (index, de) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let value = Yaml::deserialize(de).map_err(|source| ManifestError::Decode { index, source })?;
        match value {
            Yaml::Null => continue,
            Yaml::Mapping(m) if m.is_empty() => continue,
            Yaml::Mapping(m) => docs.push(m),
            _ => return Err(ManifestError::NotAMapping { index }),
        }
    }
    debug!(documents = docs.len(), "decoded manifest");
    Ok(docs)
}

/// Encode documents as a single `---` prefixed stream.
pub fn encode(docs: &[Document]) -> Result<String, ManifestError> {
    // ~1 KiB per document is typical for rendered chart output
    let mut out = String::with_capacity(DOCUMENT_SEPARATOR.len() + 1024 * docs.len());
    out.push_str(DOCUMENT_SEPARATOR);
    for (index, doc) in docs.iter().enumerate() {
        if index > 0 {
            out.push_str(DOCUMENT_SEPARATOR);
        }
        let rendered = serde_yaml::to_string(doc).map_err(|source| ManifestError::Encode { index, source })?;
        out.push_str(&rendered);
    }
    Ok(out)
}
