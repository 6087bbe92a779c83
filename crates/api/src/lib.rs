//! mapkubeapis façade: map a release's deprecated or removed Kubernetes APIs to supported ones
//! and record the result as a new release version.
//!
//! [`map_release`] is the store-agnostic pipeline. [`run`] and [`run_reconcile`] wire it to a
//! live cluster and a Helm storage driver.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use mapkubeapis_core::{MapEvent, ReleaseVersion, Reporter};
use mapkubeapis_kubehub::{Driver, KubeConfig};
use mapkubeapis_manifest::ManifestError;
use mapkubeapis_mapping::{apply_rules, has_changed, KubeVersion, MappingError, MappingMetadata};
use mapkubeapis_release::{transition, ReleaseError, ReleaseStore, StoreError};
use thiserror::Error;
use tracing::debug;

/// Options for one mapping run.
#[derive(Debug, Clone, Default)]
pub struct MapOptions {
    pub dry_run: bool,
    pub kube_config: KubeConfig,
    pub map_file: PathBuf,
    pub release_name: String,
    pub release_namespace: String,
    pub driver: Driver,
}

/// What a mapping run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapOutcome {
    /// No rule matched; nothing was written.
    Unchanged,
    /// Deprecated or removed APIs were found but not written back.
    DryRun { rewritten: usize, removed: usize },
    /// `superseded` was marked superseded and `created` stored as the deployed version.
    Updated { superseded: String, created: String },
}

#[derive(Debug, Error)]
pub enum MapError {
    #[error("failed to get release '{release}' latest version")]
    Fetch {
        release: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to unmarshal manifests")]
    Decode(#[source] ManifestError),
    #[error("failed to map deprecated or removed APIs for release '{release}'")]
    Mapping {
        release: String,
        #[source]
        source: MappingError,
    },
    #[error("failed to encode manifests")]
    Encode(#[source] ManifestError),
    #[error("failed to update release '{release}'")]
    Update {
        release: String,
        #[source]
        source: ReleaseError,
    },
}

/// Forwards events and counts affected documents.
struct Tally<'a> {
    inner: &'a dyn Reporter,
    rewritten: AtomicUsize,
    removed: AtomicUsize,
}

impl<'a> Tally<'a> {
    fn new(inner: &'a dyn Reporter) -> Self {
        Self { inner, rewritten: AtomicUsize::new(0), removed: AtomicUsize::new(0) }
    }
}

impl Reporter for Tally<'_> {
    fn report(&self, event: MapEvent) {
        match &event {
            MapEvent::Rewritten { count, .. } => {
                self.rewritten.fetch_add(*count, Ordering::Relaxed);
            }
            MapEvent::Removed { count, .. } => {
                self.removed.fetch_add(*count, Ordering::Relaxed);
            }
            _ => {}
        }
        self.inner.report(event);
    }
}

/// Check the latest version of `release` against `rules` and, unless `dry_run`, store the
/// mapped manifest as a new deployed version.
pub async fn map_release<S>(
    store: &S,
    release: &str,
    rules: &MappingMetadata,
    cluster: &KubeVersion,
    dry_run: bool,
    reporter: &dyn Reporter,
) -> Result<MapOutcome, MapError>
where
    S: ReleaseStore + ?Sized,
{
    reporter.report(MapEvent::FetchingRelease { release: release.to_string() });
    let current = store
        .last(release)
        .await
        .map_err(|source| MapError::Fetch { release: release.to_string(), source })?;
    debug!(version = %current.version_name(), status = %current.status(), "latest release version");

    reporter.report(MapEvent::CheckingRelease { release: release.to_string() });
    let original = mapkubeapis_manifest::decode(&current.manifest).map_err(MapError::Decode)?;
    let tally = Tally::new(reporter);
    let modified = apply_rules(rules, original.clone(), cluster, &tally)
        .map_err(|source| MapError::Mapping { release: release.to_string(), source })?;
    reporter.report(MapEvent::CheckFinished { release: release.to_string() });

    if !has_changed(&original, &modified) {
        reporter.report(MapEvent::NoDeprecatedApis { release: release.to_string() });
        return Ok(MapOutcome::Unchanged);
    }

    reporter.report(MapEvent::DeprecatedApisFound { release: release.to_string(), dry_run });
    if dry_run {
        return Ok(MapOutcome::DryRun {
            rewritten: tally.rewritten.load(Ordering::Relaxed),
            removed: tally.removed.load(Ordering::Relaxed),
        });
    }

    let manifest = mapkubeapis_manifest::encode(&modified).map_err(MapError::Encode)?;
    let created = transition(store, &current, manifest, reporter)
        .await
        .map_err(|source| MapError::Update { release: release.to_string(), source })?;
    reporter.report(MapEvent::ReleaseUpdated { release: release.to_string() });
    Ok(MapOutcome::Updated { superseded: current.version_name(), created: created.version_name() })
}

/// Connect to the cluster, load the map file and map the release named in `opts`.
pub async fn run(opts: &MapOptions, reporter: &dyn Reporter) -> anyhow::Result<MapOutcome> {
    let client = mapkubeapis_kubehub::client(&opts.kube_config).await?;
    let raw_version = mapkubeapis_kubehub::server_version(&client).await?;
    let cluster = KubeVersion::parse(&raw_version).context("failed to get Kubernetes server version")?;
    let rules = mapkubeapis_mapping::load_mapfile(&opts.map_file)?;
    let store = mapkubeapis_kubehub::open_store(client, &opts.release_namespace, opts.driver);
    let outcome = map_release(store.as_ref(), &opts.release_name, &rules, &cluster, opts.dry_run, reporter).await?;
    Ok(outcome)
}

/// Restore the latest version of the release to `deployed` if a previous run left it superseded.
pub async fn run_reconcile(opts: &MapOptions, reporter: &dyn Reporter) -> anyhow::Result<Option<ReleaseVersion>> {
    let client = mapkubeapis_kubehub::client(&opts.kube_config).await?;
    let store = mapkubeapis_kubehub::open_store(client, &opts.release_namespace, opts.driver);
    let restored = mapkubeapis_release::reconcile(store.as_ref(), &opts.release_name, reporter).await?;
    Ok(restored)
}
