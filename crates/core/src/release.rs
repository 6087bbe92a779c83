use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::UPGRADE_DESCRIPTION;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseStatus {
    #[default]
    Unknown,
    Deployed,
    Uninstalled,
    Superseded,
    Failed,
    Uninstalling,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
}

impl ReleaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseStatus::Unknown => "unknown",
            ReleaseStatus::Deployed => "deployed",
            ReleaseStatus::Uninstalled => "uninstalled",
            ReleaseStatus::Superseded => "superseded",
            ReleaseStatus::Failed => "failed",
            ReleaseStatus::Uninstalling => "uninstalling",
            ReleaseStatus::PendingInstall => "pending-install",
            ReleaseStatus::PendingUpgrade => "pending-upgrade",
            ReleaseStatus::PendingRollback => "pending-rollback",
        }
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Release bookkeeping. Fields not modelled here (first_deployed, notes, ...) ride along in `rest`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReleaseInfo {
    #[serde(default)]
    pub status: ReleaseStatus,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployed: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub rest: Map<String, Json>,
}

/// One stored version of a release.
///
/// Chart, values, hooks and anything else the store keeps are carried opaquely in `rest`
/// so that a record read from a store can be written back without loss.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReleaseVersion {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub version: u32,
    #[serde(default)]
    pub manifest: String,
    #[serde(default)]
    pub info: ReleaseInfo,
    /// User labels kept on the storage object rather than in the payload.
    #[serde(skip)]
    pub labels: BTreeMap<String, String>,
    #[serde(flatten)]
    pub rest: Map<String, Json>,
}

impl ReleaseVersion {
    /// `<name>.v<version>`, used in logs and diagnostics.
    pub fn version_name(&self) -> String {
        format!("{}.v{}", self.name, self.version)
    }

    pub fn status(&self) -> ReleaseStatus {
        self.info.status
    }

    /// A copy of this record with a different status.
    pub fn with_status(&self, status: ReleaseStatus) -> Self {
        let mut out = self.clone();
        out.info.status = status;
        out
    }

    /// Build the next version of this release carrying `manifest`.
    ///
    /// The successor is assembled field by field; `self` is never touched.
    pub fn successor(&self, manifest: String, now: DateTime<Utc>) -> Self {
        Self {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            version: self.version + 1,
            manifest,
            info: ReleaseInfo {
                status: ReleaseStatus::Deployed,
                description: UPGRADE_DESCRIPTION.to_string(),
                last_deployed: Some(now),
                rest: self.info.rest.clone(),
            },
            labels: self.labels.clone(),
            rest: self.rest.clone(),
        }
    }
}
