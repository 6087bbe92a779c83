//! mapkubeapis core types: manifest documents, API identifiers and the release record.

#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

mod release;
mod report;

pub use release::{ReleaseInfo, ReleaseStatus, ReleaseVersion};
pub use report::{CollectingReporter, MapEvent, Reporter, TracingReporter};

/// Description stamped on every release version created by a mapping run.
pub const UPGRADE_DESCRIPTION: &str = "Kubernetes deprecated API upgrade - DO NOT rollback from this version";

/// Manifest field holding the `group/version` of a resource.
pub const API_VERSION_FIELD: &str = "apiVersion";

/// Manifest field holding the resource kind.
pub const KIND_FIELD: &str = "kind";

/// One resource manifest. Keys keep their stream order.
pub type Document = serde_yaml::Mapping;

/// Documents in original stream order.
pub type DocumentSequence = Vec<Document>;

/// Group/Version/Kind of one Kubernetes API surface. An empty group is the core group.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ApiIdentifier {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
}

impl ApiIdentifier {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { group: group.into(), version: version.into(), kind: kind.into() }
    }

    /// The `apiVersion` string as it appears in a manifest.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// A `newAPI` with neither group nor kind means "no successor".
    pub fn is_unset(&self) -> bool {
        self.group.is_empty() && self.kind.is_empty()
    }

    /// True when `doc` carries exactly this `apiVersion` and `kind`.
    pub fn matches(&self, doc: &Document) -> bool {
        let api_version = doc.get(API_VERSION_FIELD).and_then(|v| v.as_str());
        let kind = doc.get(KIND_FIELD).and_then(|v| v.as_str());
        api_version == Some(self.api_version().as_str()) && kind == Some(self.kind.as_str())
    }
}

impl fmt::Display for ApiIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.kind)
    }
}

pub mod prelude {
    pub use super::{
        ApiIdentifier, Document, DocumentSequence, MapEvent, ReleaseStatus, ReleaseVersion, Reporter,
        API_VERSION_FIELD, KIND_FIELD, UPGRADE_DESCRIPTION,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(yaml: &str) -> Document {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn api_version_renders_core_group_bare() {
        assert_eq!(ApiIdentifier::new("", "v1", "Service").api_version(), "v1");
        assert_eq!(ApiIdentifier::new("apps", "v1", "Deployment").api_version(), "apps/v1");
        assert_eq!(ApiIdentifier::new("apps", "v1", "Deployment").to_string(), "apps/v1/Deployment");
    }

    #[test]
    fn matches_requires_exact_api_version_and_kind() {
        let id = ApiIdentifier::new("extensions", "v1beta1", "Deployment");
        assert!(id.matches(&doc("apiVersion: extensions/v1beta1\nkind: Deployment\n")));
        assert!(!id.matches(&doc("apiVersion: extensions/v1beta1\nkind: Ingress\n")));
        assert!(!id.matches(&doc("apiVersion: extensions/v1beta11\nkind: Deployment\n")));
        assert!(!id.matches(&doc("apiVersion: v1beta1\nkind: Deployment\n")));
        assert!(!id.matches(&doc("kind: Deployment\n")));
    }

    #[test]
    fn unset_means_no_group_and_no_kind() {
        assert!(ApiIdentifier::default().is_unset());
        assert!(ApiIdentifier::new("", "v1", "").is_unset());
        assert!(!ApiIdentifier::new("", "v1", "Service").is_unset());
        assert!(!ApiIdentifier::new("policy", "v1", "").is_unset());
    }
}
