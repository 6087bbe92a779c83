use std::path::Path;

use mapkubeapis_core::ApiIdentifier;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::MappingError;

/// One mapping instruction from the map file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MappingRule {
    #[serde(rename = "deprecatedAPI")]
    pub deprecated_api: ApiIdentifier,
    #[serde(rename = "newAPI", default, skip_serializing_if = "Option::is_none")]
    pub new_api: Option<ApiIdentifier>,
    #[serde(rename = "deprecatedInVersion", default, skip_serializing_if = "Option::is_none")]
    pub deprecated_in_version: Option<String>,
    #[serde(rename = "removedInVersion", default, skip_serializing_if = "Option::is_none")]
    pub removed_in_version: Option<String>,
}

impl MappingRule {
    /// The successor API, or `None` when matching documents should be dropped.
    pub fn successor(&self) -> Option<&ApiIdentifier> {
        self.new_api.as_ref().filter(|api| !api.is_unset())
    }

    /// Raw cluster version from which this rule is in force.
    pub fn threshold(&self) -> &str {
        match self.deprecated_in_version.as_deref() {
            Some(v) if !v.is_empty() => v,
            _ => self.removed_in_version.as_deref().unwrap_or(""),
        }
    }
}

/// Ordered mapping rules. Order matters: later rules see the effect of earlier ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MappingMetadata {
    #[serde(default)]
    pub mappings: Vec<MappingRule>,
}

/// Parse map file contents.
pub fn parse_mapfile(text: &str) -> Result<MappingMetadata, MappingError> {
    let meta: MappingMetadata = serde_yaml::from_str(text).map_err(|source| MappingError::MapFileParse { source })?;
    for (index, rule) in meta.mappings.iter().enumerate() {
        let api = &rule.deprecated_api;
        if api.version.is_empty() || api.kind.is_empty() {
            return Err(MappingError::InvalidRule {
                index,
                reason: format!("deprecatedAPI '{}' needs both version and kind", api),
            });
        }
    }
    Ok(meta)
}

/// Read and parse the map file at `path`.
pub fn load_mapfile(path: impl AsRef<Path>) -> Result<MappingMetadata, MappingError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| MappingError::MapFile { path: path.to_path_buf(), source })?;
    let meta = parse_mapfile(&text).map_err(|e| e.in_file(path))?;
    debug!(path = %path.display(), rules = meta.mappings.len(), "loaded mapping file");
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_structured_rules_in_file_order() {
        let meta = parse_mapfile(
            r#"
mappings:
  - deprecatedAPI: { group: extensions, version: v1beta1, kind: Deployment }
    newAPI: { group: apps, version: v1, kind: Deployment }
    deprecatedInVersion: v1.9
    removedInVersion: v1.16
  - deprecatedAPI:
      group: policy
      version: v1beta1
      kind: PodSecurityPolicy
    removedInVersion: v1.25
"#,
        )
        .unwrap();
        assert_eq!(meta.mappings.len(), 2);
        let first = &meta.mappings[0];
        assert_eq!(first.threshold(), "v1.9");
        assert_eq!(first.successor().map(|a| a.api_version()), Some("apps/v1".to_string()));
        let second = &meta.mappings[1];
        assert_eq!(second.threshold(), "v1.25");
        assert!(second.successor().is_none());
    }

    #[test]
    fn empty_new_api_is_a_removal() {
        let meta = parse_mapfile(
            "mappings:\n  - deprecatedAPI: { group: batch, version: v2alpha1, kind: CronJob }\n    newAPI: { group: '', version: '', kind: '' }\n    removedInVersion: v1.21\n",
        )
        .unwrap();
        assert!(meta.mappings[0].successor().is_none());
    }

    #[test]
    fn rule_without_kind_is_rejected() {
        let err = parse_mapfile("mappings:\n  - deprecatedAPI: { group: apps, version: v1beta1 }\n    removedInVersion: v1.16\n").unwrap_err();
        assert!(matches!(err, MappingError::InvalidRule { index: 0, .. }), "err={err}");
    }

    #[test]
    fn empty_file_has_no_rules() {
        assert!(parse_mapfile("mappings: []\n").unwrap().mappings.is_empty());
        assert!(parse_mapfile("{}\n").unwrap().mappings.is_empty());
    }

    #[test]
    fn misspelled_keys_are_rejected() {
        let top = parse_mapfile("mapping:\n  - deprecatedAPI: { group: apps, version: v1beta1, kind: Deployment }\n    removedInVersion: v1.16\n");
        assert!(matches!(top, Err(MappingError::MapFileParse { .. })), "got={top:?}");
        let rule = parse_mapfile("mappings:\n  - deprecatedAPI: { group: apps, version: v1beta1, kind: Deployment }\n    deprecatedInVerison: v1.16\n");
        assert!(matches!(rule, Err(MappingError::MapFileParse { .. })), "got={rule:?}");
    }
}
