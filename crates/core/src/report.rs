use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::{ApiIdentifier, ReleaseStatus};

/// Progress and diagnostics emitted while mapping a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapEvent {
    FetchingRelease { release: String },
    CheckingRelease { release: String },
    CheckFinished { release: String },
    /// Rule threshold is above the cluster version; the API is still served.
    RuleSkipped { api: ApiIdentifier, threshold: String },
    Removed { api: ApiIdentifier, count: usize },
    Rewritten { api: ApiIdentifier, new_api: ApiIdentifier, count: usize },
    NoDeprecatedApis { release: String },
    DeprecatedApisFound { release: String, dry_run: bool },
    Superseding { version_name: String },
    Superseded { version_name: String },
    Creating { version_name: String },
    Created { version_name: String },
    ReleaseUpdated { release: String },
    Restored { version_name: String },
    NothingToReconcile { version_name: String, status: ReleaseStatus },
}

/// Sink for [`MapEvent`]s. Passed explicitly to every component that reports.
pub trait Reporter: Send + Sync {
    fn report(&self, event: MapEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: MapEvent) {
        match event {
            MapEvent::FetchingRelease { release } => info!(release = %release, "get release latest version"),
            MapEvent::CheckingRelease { release } => info!(release = %release, "check release for deprecated or removed APIs"),
            MapEvent::CheckFinished { release } => info!(release = %release, "finished checking release for deprecated or removed APIs"),
            MapEvent::RuleSkipped { api, threshold } => {
                debug!(api = %api, threshold = %threshold, "API does not require mapping; not deprecated or removed in this cluster version")
            }
            MapEvent::Removed { api, count } => info!(api = %api, count, "found instances of removed Kubernetes API; dropping them"),
            MapEvent::Rewritten { api, new_api, count } => {
                info!(api = %api, supported = %new_api, count, "found instances of deprecated or removed Kubernetes API")
            }
            MapEvent::NoDeprecatedApis { release } => info!(release = %release, "release has no deprecated or removed APIs"),
            MapEvent::DeprecatedApisFound { release, dry_run: true } => {
                info!(release = %release, "deprecated or removed APIs exist (dry run, release not updated)")
            }
            MapEvent::DeprecatedApisFound { release, dry_run: false } => {
                info!(release = %release, "deprecated or removed APIs exist, updating release")
            }
            MapEvent::Superseding { version_name } => info!(version = %version_name, "set status of release version to 'superseded'"),
            MapEvent::Superseded { version_name } => info!(version = %version_name, "release version updated successfully"),
            MapEvent::Creating { version_name } => info!(version = %version_name, "add release version with updated supported APIs"),
            MapEvent::Created { version_name } => info!(version = %version_name, "release version added successfully"),
            MapEvent::ReleaseUpdated { release } => {
                info!(release = %release, "release with deprecated or removed APIs updated successfully to new version")
            }
            MapEvent::Restored { version_name } => warn!(version = %version_name, "restored release version to 'deployed'"),
            MapEvent::NothingToReconcile { version_name, status } => {
                info!(version = %version_name, status = %status, "latest release version needs no reconciliation")
            }
        }
    }
}

/// Keeps every event in memory. Handy in tests and for callers that render their own summary.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<MapEvent>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MapEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Reporter for CollectingReporter {
    fn report(&self, event: MapEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
