#![forbid(unsafe_code)]

use std::io::Write;

use mapkubeapis_core::{CollectingReporter, Document, MapEvent};
use mapkubeapis_mapping::{apply_rules, has_changed, load_mapfile, parse_mapfile, KubeVersion, MappingError, MappingMetadata};
use mapkubeapis_manifest::{decode, encode};

const MAP: &str = r#"
mappings:
  - deprecatedAPI: { group: extensions, version: v1beta1, kind: Deployment }
    newAPI: { group: apps, version: v1, kind: Deployment }
    deprecatedInVersion: v1.16
  - deprecatedAPI: { group: extensions, version: v1beta1, kind: Ingress }
    newAPI: { group: networking.k8s.io, version: v1beta1, kind: Ingress }
    deprecatedInVersion: v1.14
    removedInVersion: v1.22
  - deprecatedAPI: { group: policy, version: v1beta1, kind: PodSecurityPolicy }
    removedInVersion: v1.25
"#;

const RELEASE: &str = r#"---
apiVersion: extensions/v1beta1
kind: Deployment
metadata:
  name: web
spec:
  replicas: 3
  selector:
    matchLabels: { app: web }
  template:
    metadata:
      labels: { app: web }
    spec:
      containers:
        - name: web
          image: nginx:1.19
---
apiVersion: v1
kind: Service
metadata:
  name: web
spec:
  ports: [{ port: 80 }]
"#;

fn rules() -> MappingMetadata {
    parse_mapfile(MAP).unwrap()
}

fn v(s: &str) -> KubeVersion {
    KubeVersion::parse(s).unwrap()
}

fn field<'a>(d: &'a Document, key: &str) -> Option<&'a str> {
    d.get(key).and_then(|v| v.as_str())
}

#[test]
fn deployment_maps_to_apps_v1_on_newer_cluster() {
    let docs = decode(RELEASE).unwrap();
    let out = apply_rules(&rules(), docs.clone(), &v("v1.18.0"), &CollectingReporter::new()).unwrap();
    assert!(has_changed(&docs, &out));
    assert_eq!(field(&out[0], "apiVersion"), Some("apps/v1"));
    assert_eq!(out[0].get("spec"), docs[0].get("spec"));
    assert_eq!(out[0].get("metadata"), docs[0].get("metadata"));
    assert_eq!(out[1], docs[1]);
}

#[test]
fn deployment_untouched_on_older_cluster() {
    let docs = decode(RELEASE).unwrap();
    let reporter = CollectingReporter::new();
    let out = apply_rules(&rules(), docs.clone(), &v("v1.14.0"), &reporter).unwrap();
    assert!(!has_changed(&docs, &out));
    let skipped = reporter.events().iter().filter(|e| matches!(e, MapEvent::RuleSkipped { .. })).count();
    assert_eq!(skipped, 2);
}

#[test]
fn removal_keeps_survivors_in_order() {
    let text = [
        "apiVersion: v1\nkind: ConfigMap\nmetadata: {name: one}\n",
        "apiVersion: policy/v1beta1\nkind: PodSecurityPolicy\nmetadata: {name: two}\n",
        "apiVersion: v1\nkind: Secret\nmetadata: {name: three}\n",
        "apiVersion: policy/v1beta1\nkind: PodSecurityPolicy\nmetadata: {name: four}\n",
        "apiVersion: v1\nkind: ServiceAccount\nmetadata: {name: five}\n",
    ]
    .join("---\n");
    let docs = decode(&text).unwrap();
    assert_eq!(docs.len(), 5);
    let out = apply_rules(&rules(), docs.clone(), &v("v1.25.3"), &CollectingReporter::new()).unwrap();
    assert_eq!(out.len(), 3);
    assert_eq!(out, vec![docs[0].clone(), docs[2].clone(), docs[4].clone()]);
}

#[test]
fn second_pass_changes_nothing() {
    let docs = decode(RELEASE).unwrap();
    let once = apply_rules(&rules(), docs, &v("v1.25.0"), &CollectingReporter::new()).unwrap();
    let reporter = CollectingReporter::new();
    let twice = apply_rules(&rules(), once.clone(), &v("v1.25.0"), &reporter).unwrap();
    assert!(!has_changed(&once, &twice));
    assert!(reporter.events().is_empty());
}

#[test]
fn mapped_manifest_survives_reencoding() {
    let docs = decode(RELEASE).unwrap();
    let out = apply_rules(&rules(), docs, &v("v1.18.0"), &CollectingReporter::new()).unwrap();
    let text = encode(&out).unwrap();
    assert!(text.starts_with("---\napiVersion: apps/v1\nkind: Deployment\n"));
    assert_eq!(decode(&text).unwrap(), out);
}

#[test]
fn loads_map_file_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(MAP.as_bytes()).unwrap();
    let meta = load_mapfile(file.path()).unwrap();
    assert_eq!(meta, rules());
}

#[test]
fn missing_or_malformed_map_file_is_a_data_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("Map.yaml");
    let err = load_mapfile(&missing).unwrap_err();
    assert!(matches!(err, MappingError::MapFile { .. }));
    assert!(err.to_string().contains("Map.yaml"), "err={err}");

    std::fs::write(&missing, "mappings:\n  - deprecatedAPI: [not, a, mapping]\n").unwrap();
    let err = load_mapfile(&missing).unwrap_err();
    assert!(matches!(err, MappingError::InvalidMapFile { .. }), "err={err}");
}
