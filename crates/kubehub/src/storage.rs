//! Helm v3 storage drivers backed by Secrets or ConfigMaps.
//! One object per release version, named `sh.helm.release.v1.<name>.v<version>`.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, ListParams, PostParams};
use chrono::{DateTime, Utc};
use kube::Client;
use mapkubeapis_core::ReleaseVersion;
use mapkubeapis_release::{ReleaseStore, StoreError};
use tracing::{debug, warn};

use crate::codec::{decode_release, encode_release};

const RELEASE_KEY: &str = "release";
const SECRET_TYPE: &str = "helm.sh/release.v1";

/// Labels Helm manages itself; everything else on a storage object belongs to the user.
const SYSTEM_LABELS: [&str; 6] = ["name", "owner", "status", "version", "createdAt", "modifiedAt"];

pub fn release_object_name(name: &str, version: u32) -> String {
    format!("sh.helm.release.v1.{}.v{}", name, version)
}

enum Backend {
    Secrets(Api<Secret>),
    ConfigMaps(Api<ConfigMap>),
}

/// Release store over the Helm storage objects of one namespace.
pub struct KubeReleaseStore {
    backend: Backend,
    namespace: String,
}

#[derive(Clone, Copy)]
enum WriteKind {
    Create,
    Update,
}

fn kube_err(e: kube::Error) -> StoreError {
    StoreError::Backend(Box::new(e))
}

fn user_labels(object: Option<&BTreeMap<String, String>>) -> BTreeMap<String, String> {
    object
        .into_iter()
        .flatten()
        .filter(|(k, _)| !SYSTEM_LABELS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// User labels first, then the system labels on top.
fn labels(release: &ReleaseVersion, write: WriteKind, now: DateTime<Utc>) -> BTreeMap<String, String> {
    let mut out = user_labels(Some(&release.labels));
    out.insert("name".to_string(), release.name.clone());
    out.insert("owner".to_string(), "helm".to_string());
    out.insert("status".to_string(), release.status().to_string());
    out.insert("version".to_string(), release.version.to_string());
    let stamp = now.timestamp().to_string();
    match write {
        WriteKind::Create => out.insert("createdAt".to_string(), stamp),
        WriteKind::Update => out.insert("modifiedAt".to_string(), stamp),
    };
    out
}

fn is_conflict(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(resp) if resp.code == 409)
}

fn is_not_found(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(resp) if resp.code == 404)
}

impl KubeReleaseStore {
    pub fn secrets(client: Client, namespace: &str) -> Self {
        Self { backend: Backend::Secrets(Api::namespaced(client, namespace)), namespace: namespace.to_string() }
    }

    pub fn config_maps(client: Client, namespace: &str) -> Self {
        Self { backend: Backend::ConfigMaps(Api::namespaced(client, namespace)), namespace: namespace.to_string() }
    }

    fn meta(&self, release: &ReleaseVersion, write: WriteKind, now: DateTime<Utc>) -> ObjectMeta {
        ObjectMeta {
            name: Some(release_object_name(&release.name, release.version)),
            namespace: Some(self.namespace.clone()),
            labels: Some(labels(release, write, now)),
            ..Default::default()
        }
    }

    fn secret(&self, release: &ReleaseVersion, write: WriteKind, now: DateTime<Utc>) -> Result<Secret, StoreError> {
        let payload = encode_release(release)?;
        let mut data = BTreeMap::new();
        data.insert(RELEASE_KEY.to_string(), ByteString(payload.into_bytes()));
        Ok(Secret {
            metadata: self.meta(release, write, now),
            type_: Some(SECRET_TYPE.to_string()),
            data: Some(data),
            ..Default::default()
        })
    }

    fn config_map(&self, release: &ReleaseVersion, write: WriteKind, now: DateTime<Utc>) -> Result<ConfigMap, StoreError> {
        let payload = encode_release(release)?;
        let mut data = BTreeMap::new();
        data.insert(RELEASE_KEY.to_string(), payload);
        Ok(ConfigMap { metadata: self.meta(release, write, now), data: Some(data), ..Default::default() })
    }

    /// Decode every stored payload, skipping objects that do not hold a readable release.
    /// User labels on the object are attached to the decoded record.
    fn collect<'a>(objects: impl Iterator<Item = (&'a ObjectMeta, Option<String>)>) -> Vec<ReleaseVersion> {
        let mut out = Vec::new();
        for (meta, payload) in objects {
            let object = meta.name.as_deref();
            let Some(payload) = payload else {
                warn!(object = ?object, "release object without payload; skipping");
                continue;
            };
            match decode_release(&payload) {
                Ok(mut r) => {
                    r.labels = user_labels(meta.labels.as_ref());
                    out.push(r)
                }
                Err(e) => warn!(object = ?object, error = %e, "undecodable release object; skipping"),
            }
        }
        out
    }
}

#[async_trait::async_trait]
impl ReleaseStore for KubeReleaseStore {
    async fn last(&self, name: &str) -> Result<ReleaseVersion, StoreError> {
        let lp = ListParams::default().labels(&format!("owner=helm,name={}", name));
        let releases = match &self.backend {
            Backend::Secrets(api) => {
                let list = api.list(&lp).await.map_err(kube_err)?;
                Self::collect(list.items.iter().map(|s| {
                    let payload = s
                        .data
                        .as_ref()
                        .and_then(|d| d.get(RELEASE_KEY))
                        .map(|b| String::from_utf8_lossy(&b.0).into_owned());
                    (&s.metadata, payload)
                }))
            }
            Backend::ConfigMaps(api) => {
                let list = api.list(&lp).await.map_err(kube_err)?;
                Self::collect(list.items.iter().map(|c| {
                    let payload = c.data.as_ref().and_then(|d| d.get(RELEASE_KEY)).cloned();
                    (&c.metadata, payload)
                }))
            }
        };
        debug!(release = %name, versions = releases.len(), namespace = %self.namespace, "listed release versions");
        releases
            .into_iter()
            .max_by_key(|r| r.version)
            .ok_or_else(|| StoreError::NotFound { name: name.to_string() })
    }

    async fn update(&self, release: &ReleaseVersion) -> Result<(), StoreError> {
        let object_name = release_object_name(&release.name, release.version);
        let pp = PostParams::default();
        let now = self.now();
        let res = match &self.backend {
            Backend::Secrets(api) => api.replace(&object_name, &pp, &self.secret(release, WriteKind::Update, now)?).await.map(|_| ()),
            Backend::ConfigMaps(api) => {
                api.replace(&object_name, &pp, &self.config_map(release, WriteKind::Update, now)?).await.map(|_| ())
            }
        };
        res.map_err(|e| {
            if is_not_found(&e) {
                StoreError::NotFound { name: release.version_name() }
            } else {
                kube_err(e)
            }
        })
    }

    async fn create(&self, release: &ReleaseVersion) -> Result<(), StoreError> {
        let pp = PostParams::default();
        let now = self.now();
        let res = match &self.backend {
            Backend::Secrets(api) => api.create(&pp, &self.secret(release, WriteKind::Create, now)?).await.map(|_| ()),
            Backend::ConfigMaps(api) => api.create(&pp, &self.config_map(release, WriteKind::Create, now)?).await.map(|_| ()),
        };
        res.map_err(|e| {
            if is_conflict(&e) {
                StoreError::AlreadyExists { version_name: release.version_name() }
            } else {
                kube_err(e)
            }
        })
    }
}
