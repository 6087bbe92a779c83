use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::{BuildMetadata, Version};

use crate::{MappingError, MappingRule};

/// A Kubernetes-style semantic version (`v1.16`, `v1.18.0`, `v1.20.4-gke.100`).
///
/// The leading `v` is required. `vMAJOR` and `vMAJOR.MINOR` are shorthand for the `.0`
/// completions and may not carry a pre-release or build suffix. Build metadata is dropped,
/// so it never takes part in ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KubeVersion(Version);

impl KubeVersion {
    pub fn parse(raw: &str) -> Result<Self, MappingError> {
        let invalid = || MappingError::InvalidVersion { value: raw.to_string() };
        let rest = raw.strip_prefix('v').ok_or_else(invalid)?;
        let core_end = rest.find(|c: char| c == '-' || c == '+').unwrap_or(rest.len());
        let (core, suffix) = rest.split_at(core_end);
        let dots = core.matches('.').count();
        let full = match dots {
            2 => rest.to_string(),
            0 | 1 if suffix.is_empty() => format!("{}{}", core, ".0".repeat(2 - dots)),
            _ => return Err(invalid()),
        };
        let mut version = Version::parse(&full).map_err(|_| invalid())?;
        version.build = BuildMetadata::EMPTY;
        Ok(Self(version))
    }
}

impl FromStr for KubeVersion {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for KubeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Whether `rule` applies on a cluster running `cluster`.
///
/// The threshold is `deprecatedInVersion` when set, otherwise `removedInVersion`.
/// A threshold above the cluster version means the old API is still served.
pub fn is_applicable(rule: &MappingRule, cluster: &KubeVersion) -> Result<bool, MappingError> {
    let raw = rule.threshold();
    let threshold = KubeVersion::parse(raw).map_err(|_| MappingError::InvalidThreshold {
        api: rule.deprecated_api.clone(),
        value: raw.to_string(),
    })?;
    Ok(threshold.cmp(cluster) != Ordering::Greater)
}
