//! Deprecated/removed Kubernetes API mapping: rule model, version gate, rule engine and
//! change detection over decoded manifest documents.

#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use mapkubeapis_core::{ApiIdentifier, Document, DocumentSequence, MapEvent, Reporter, API_VERSION_FIELD};
use metrics::counter;
use serde_yaml::Value as Yaml;
use thiserror::Error;

mod mapfile;
mod version;

pub use mapfile::{load_mapfile, parse_mapfile, MappingMetadata, MappingRule};
pub use version::{is_applicable, KubeVersion};

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("invalid semantic version '{value}'")]
    InvalidVersion { value: String },
    #[error("failed to get the deprecated or removed Kubernetes version for API '{api}': '{value}' is not a valid semantic version")]
    InvalidThreshold { api: ApiIdentifier, value: String },
    #[error("failed to load mapping file: {}", path.display())]
    MapFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse mapping file")]
    MapFileParse {
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid mapping rule #{index}: {reason}")]
    InvalidRule { index: usize, reason: String },
    #[error("invalid mapping file: {}", path.display())]
    InvalidMapFile {
        path: PathBuf,
        #[source]
        source: Box<MappingError>,
    },
}

impl MappingError {
    fn in_file(self, path: &Path) -> Self {
        MappingError::InvalidMapFile { path: path.to_path_buf(), source: Box::new(self) }
    }
}

/// Apply `rules` in order to `docs`.
///
/// Rules that are not yet in force on `cluster` are skipped. For the rest, every document whose
/// `apiVersion` and `kind` equal the deprecated API is either rewritten to the successor
/// `apiVersion` or, when the rule has no successor, dropped. Survivors keep their relative order.
pub fn apply_rules(
    rules: &MappingMetadata,
    mut docs: DocumentSequence,
    cluster: &KubeVersion,
    reporter: &dyn Reporter,
) -> Result<DocumentSequence, MappingError> {
    for rule in &rules.mappings {
        let api = &rule.deprecated_api;
        if !is_applicable(rule, cluster)? {
            counter!("mapkubeapis_rules_skipped_total", 1u64);
            reporter.report(MapEvent::RuleSkipped { api: api.clone(), threshold: rule.threshold().to_string() });
            continue;
        }
        match rule.successor() {
            None => {
                let count = remove_matching(&mut docs, api);
                if count > 0 {
                    counter!("mapkubeapis_documents_removed_total", count as u64);
                    reporter.report(MapEvent::Removed { api: api.clone(), count });
                }
            }
            Some(new_api) => {
                let count = rewrite_matching(&mut docs, api, new_api);
                if count > 0 {
                    counter!("mapkubeapis_documents_rewritten_total", count as u64);
                    reporter.report(MapEvent::Rewritten { api: api.clone(), new_api: new_api.clone(), count });
                }
            }
        }
    }
    Ok(docs)
}

fn remove_matching(docs: &mut DocumentSequence, api: &ApiIdentifier) -> usize {
    let before = docs.len();
    docs.retain(|doc| !api.matches(doc));
    before - docs.len()
}

fn rewrite_matching(docs: &mut [Document], api: &ApiIdentifier, new_api: &ApiIdentifier) -> usize {
    let new_version = Yaml::String(new_api.api_version());
    let mut count = 0;
    for doc in docs.iter_mut().filter(|doc| api.matches(doc)) {
        doc.insert(Yaml::String(API_VERSION_FIELD.to_string()), new_version.clone());
        count += 1;
    }
    count
}

/// True when `modified` differs from `original` in length, order or any document field.
pub fn has_changed(original: &[Document], modified: &[Document]) -> bool {
    original != modified
}
