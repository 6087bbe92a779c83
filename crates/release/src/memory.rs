use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use mapkubeapis_core::ReleaseVersion;

use crate::{ReleaseStore, StoreError};

/// Store operation to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Last,
    Update,
    Create,
}

/// Calls made against a [`MemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationCounts {
    pub lasts: usize,
    pub updates: usize,
    pub creates: usize,
}

#[derive(Debug, Default)]
struct Inner {
    releases: BTreeMap<(String, u32), ReleaseVersion>,
    counts: OperationCounts,
    fail: Option<FailPoint>,
}

/// In-memory release store. Backs the `memory` driver and the tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    clock: Option<DateTime<Utc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin `now()` to a fixed instant.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Insert a record directly, bypassing counters and failure injection.
    pub fn seed(&self, release: ReleaseVersion) {
        self.lock().releases.insert((release.name.clone(), release.version), release);
    }

    pub fn get(&self, name: &str, version: u32) -> Option<ReleaseVersion> {
        self.lock().releases.get(&(name.to_string(), version)).cloned()
    }

    pub fn history(&self, name: &str) -> Vec<ReleaseVersion> {
        self.lock().releases.values().filter(|r| r.name == name).cloned().collect()
    }

    pub fn counts(&self) -> OperationCounts {
        self.lock().counts
    }

    pub fn fail_on(&self, point: FailPoint) {
        self.lock().fail = Some(point);
    }

    pub fn clear_failure(&self) {
        self.lock().fail = None;
    }
}

fn injected(point: FailPoint) -> StoreError {
    StoreError::Backend(format!("injected {:?} failure", point).into())
}

#[async_trait::async_trait]
impl ReleaseStore for MemoryStore {
    async fn last(&self, name: &str) -> Result<ReleaseVersion, StoreError> {
        let mut inner = self.lock();
        inner.counts.lasts += 1;
        if inner.fail == Some(FailPoint::Last) {
            return Err(injected(FailPoint::Last));
        }
        inner
            .releases
            .values()
            .filter(|r| r.name == name)
            .max_by_key(|r| r.version)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { name: name.to_string() })
    }

    async fn update(&self, release: &ReleaseVersion) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.counts.updates += 1;
        if inner.fail == Some(FailPoint::Update) {
            return Err(injected(FailPoint::Update));
        }
        match inner.releases.get_mut(&(release.name.clone(), release.version)) {
            Some(slot) => {
                *slot = release.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound { name: release.version_name() }),
        }
    }

    async fn create(&self, release: &ReleaseVersion) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.counts.creates += 1;
        if inner.fail == Some(FailPoint::Create) {
            return Err(injected(FailPoint::Create));
        }
        let key = (release.name.clone(), release.version);
        if inner.releases.contains_key(&key) {
            return Err(StoreError::AlreadyExists { version_name: release.version_name() });
        }
        inner.releases.insert(key, release.clone());
        Ok(())
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }
}
