//! Release storage interface and the superseded -> deployed version transition.
//!
//! A transition is two independent store writes: the current version is marked
//! `superseded`, then the successor is created as `deployed`. Nothing makes the pair atomic.
//! If the create fails the release has no deployed version until [`reconcile`] restores the
//! superseded one (or another actor writes a newer version).

#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use mapkubeapis_core::{MapEvent, ReleaseStatus, ReleaseVersion, Reporter};
use metrics::counter;
use thiserror::Error;

mod memory;

pub use memory::{FailPoint, MemoryStore, OperationCounts};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("release '{name}' not found")]
    NotFound { name: String },
    #[error("release version '{version_name}' already exists")]
    AlreadyExists { version_name: String },
    #[error("release record could not be encoded or decoded")]
    Codec(#[source] BoxError),
    #[error("release storage backend error")]
    Backend(#[source] BoxError),
}

/// Where release versions live (Secrets, ConfigMaps, memory, ...).
#[async_trait::async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Highest stored version of `name`.
    async fn last(&self, name: &str) -> Result<ReleaseVersion, StoreError>;

    /// Overwrite the stored record for `release.name` / `release.version`.
    async fn update(&self, release: &ReleaseVersion) -> Result<(), StoreError>;

    /// Store a record that must not exist yet.
    async fn create(&self, release: &ReleaseVersion) -> Result<(), StoreError>;

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("failed to update release version '{version}'")]
    Supersede {
        version: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to create new release version '{version}'; '{superseded}' stays superseded and the release has no deployed version until it is reconciled")]
    Create {
        superseded: String,
        version: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to get release '{name}' latest version")]
    Fetch {
        name: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to restore release version '{version}' to deployed")]
    Restore {
        version: String,
        #[source]
        source: StoreError,
    },
}

/// Supersede `current` and store its successor carrying `manifest`. Returns the new version.
///
/// `current` itself is never mutated; the superseded copy is what gets written.
pub async fn transition<S>(
    store: &S,
    current: &ReleaseVersion,
    manifest: String,
    reporter: &dyn Reporter,
) -> Result<ReleaseVersion, ReleaseError>
where
    S: ReleaseStore + ?Sized,
{
    let current_name = current.version_name();
    reporter.report(MapEvent::Superseding { version_name: current_name.clone() });
    let superseded = current.with_status(ReleaseStatus::Superseded);
    if let Err(source) = store.update(&superseded).await {
        counter!("mapkubeapis_release_transition_errors_total", 1u64);
        return Err(ReleaseError::Supersede { version: current_name, source });
    }
    reporter.report(MapEvent::Superseded { version_name: current_name.clone() });

    let next = current.successor(manifest, store.now());
    let next_name = next.version_name();
    reporter.report(MapEvent::Creating { version_name: next_name.clone() });
    if let Err(source) = store.create(&next).await {
        counter!("mapkubeapis_release_transition_errors_total", 1u64);
        return Err(ReleaseError::Create { superseded: current_name, version: next_name, source });
    }
    reporter.report(MapEvent::Created { version_name: next_name });
    counter!("mapkubeapis_release_transitions_total", 1u64);
    Ok(next)
}

/// Repair the state a failed [`transition`] leaves behind.
///
/// When the latest version of `name` is `superseded` it is written back as `deployed` and
/// returned. Any other status is left alone and `None` is returned.
pub async fn reconcile<S>(store: &S, name: &str, reporter: &dyn Reporter) -> Result<Option<ReleaseVersion>, ReleaseError>
where
    S: ReleaseStore + ?Sized,
{
    let latest = store
        .last(name)
        .await
        .map_err(|source| ReleaseError::Fetch { name: name.to_string(), source })?;
    let version_name = latest.version_name();
    if latest.status() != ReleaseStatus::Superseded {
        reporter.report(MapEvent::NothingToReconcile { version_name, status: latest.status() });
        return Ok(None);
    }
    let restored = latest.with_status(ReleaseStatus::Deployed);
    store
        .update(&restored)
        .await
        .map_err(|source| ReleaseError::Restore { version: version_name.clone(), source })?;
    reporter.report(MapEvent::Restored { version_name });
    Ok(Some(restored))
}
