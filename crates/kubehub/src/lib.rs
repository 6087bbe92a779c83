//! mapkubeapis kubehub – cluster connection, server version and release storage drivers

#![forbid(unsafe_code)]

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use mapkubeapis_release::ReleaseStore;
use tracing::{debug, info};

mod codec;
mod storage;

pub use codec::{decode_release, encode_release};
pub use storage::{release_object_name, KubeReleaseStore};

/// Kubeconfig file and context to connect with. Both fall back to the usual discovery chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KubeConfig {
    pub context: Option<String>,
    pub file: Option<PathBuf>,
}

/// Build a client for the configured cluster.
pub async fn client(cfg: &KubeConfig) -> Result<Client> {
    let options = KubeConfigOptions { context: cfg.context.clone(), ..Default::default() };
    let config = match (&cfg.file, &cfg.context) {
        (Some(path), _) => {
            let kubeconfig = Kubeconfig::read_from(path).with_context(|| format!("reading kubeconfig {}", path.display()))?;
            Config::from_custom_kubeconfig(kubeconfig, &options).await.context("loading kubeconfig")?
        }
        (None, Some(_)) => Config::from_kubeconfig(&options).await.context("loading kubeconfig")?,
        (None, None) => Config::infer().await.context("inferring kubernetes configuration")?,
    };
    debug!(cluster_url = %config.cluster_url, context = ?cfg.context, "kube config resolved");
    Client::try_from(config).context("kubernetes cluster unreachable")
}

/// API server `gitVersion`, e.g. `v1.27.3` or `v1.26.5-gke.1200`.
pub async fn server_version(client: &Client) -> Result<String> {
    let info = client.apiserver_version().await.context("kubernetes cluster unreachable")?;
    info!(version = %info.git_version, "kubernetes server version");
    Ok(info.git_version)
}

/// Release storage backend, named the way `HELM_DRIVER` names them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Driver {
    #[default]
    Secrets,
    ConfigMaps,
}

impl FromStr for Driver {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "secret" | "secrets" => Ok(Driver::Secrets),
            "configmap" | "configmaps" => Ok(Driver::ConfigMaps),
            "memory" => Err(anyhow!("release storage driver 'memory' keeps no releases between runs; use secret or configmap")),
            other => Err(anyhow!("unknown release storage driver '{}' (expect secret or configmap)", other)),
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Driver::Secrets => "secret",
            Driver::ConfigMaps => "configmap",
        })
    }
}

/// Open the release store for `namespace` using `driver`.
pub fn open_store(client: Client, namespace: &str, driver: Driver) -> Box<dyn ReleaseStore> {
    debug!(namespace, driver = %driver, "opening release store");
    match driver {
        Driver::Secrets => Box::new(KubeReleaseStore::secrets(client, namespace)),
        Driver::ConfigMaps => Box::new(KubeReleaseStore::config_maps(client, namespace)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_names_follow_helm() {
        assert_eq!("secret".parse::<Driver>().unwrap(), Driver::Secrets);
        assert_eq!("Secrets".parse::<Driver>().unwrap(), Driver::Secrets);
        assert_eq!("".parse::<Driver>().unwrap(), Driver::Secrets);
        assert_eq!("configmaps".parse::<Driver>().unwrap(), Driver::ConfigMaps);
        let err = "memory".parse::<Driver>().unwrap_err().to_string();
        assert!(err.contains("keeps no releases"), "err={}", err);
        let err = "sql".parse::<Driver>().unwrap_err().to_string();
        assert!(err.contains("unknown release storage driver 'sql'"), "err={}", err);
    }
}
