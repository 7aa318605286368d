//! Renders a project's resources into a Deployment Manager configuration.

use crate::config::{Config, DatasetRef, LogsBucket, Project, Resource};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeploymentConfig {
    pub resources: Vec<DmResource>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DmResource {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: Mapping,
}

impl DeploymentConfig {
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("serialize deployment config")
    }
}

/// Builds the deployment for `project`. `conf` is consulted for audit logs
/// datasets that other projects route into this one.
pub fn render(conf: &Config, project: &Project) -> DeploymentConfig {
    let mut resources = Vec::new();

    if let (Some(bucket), Some(spec)) = (
        &project.generated.logs_bucket,
        &project.audit_logs.logs_gcs_bucket,
    ) {
        resources.push(logs_bucket(bucket, spec));
    }
    let mut datasets = BTreeSet::new();
    for other in conf.all_projects() {
        let dataset = &other.generated.logs_dataset;
        if dataset.project_id == project.project_id && datasets.insert(dataset.name.as_str()) {
            resources.push(logs_dataset(project, dataset));
        }
    }

    for r in &project.resources.gcs_buckets {
        resources.push(gcs_bucket(project, r));
    }
    for r in &project.resources.bq_datasets {
        resources.push(bq_dataset(project, r));
    }
    for r in &project.resources.pubsub_topics {
        resources.push(pubsub_topic(r));
    }

    DeploymentConfig { resources }
}

fn gcs_bucket(project: &Project, r: &Resource) -> DmResource {
    let name = r.name().unwrap_or_default().to_string();
    let mut props = r.properties.clone();
    set_default(&mut props, "versioning", mapping([("enabled", Value::Bool(true))]));
    if let Some(logs) = &project.generated.logs_bucket {
        set_default(
            &mut props,
            "logging",
            mapping([("logBucket", Value::String(logs.clone()))]),
        );
    }
    DmResource {
        name,
        kind: "storage.v1.bucket".to_string(),
        properties: props,
    }
}

fn bq_dataset(project: &Project, r: &Resource) -> DmResource {
    let name = r.name().unwrap_or_default().to_string();
    let mut props = r.properties.clone();
    props.remove("name");
    props.insert(
        "datasetReference".into(),
        mapping([("datasetId", Value::String(name.clone()))]),
    );

    let mut access = vec![access_entry("OWNER", &project.owners_group)];
    access.extend(project.data_readwrite_groups.iter().map(|g| access_entry("WRITER", g)));
    access.extend(project.data_readonly_groups.iter().map(|g| access_entry("READER", g)));
    set_default(&mut props, "access", Value::Sequence(access));

    DmResource {
        name,
        kind: "bigquery.v2.dataset".to_string(),
        properties: props,
    }
}

fn pubsub_topic(r: &Resource) -> DmResource {
    let name = r.name().unwrap_or_default().to_string();
    let mut props = r.properties.clone();
    props.remove("name");
    props.insert("topic".into(), Value::String(name.clone()));
    DmResource {
        name,
        kind: "pubsub.v1.topic".to_string(),
        properties: props,
    }
}

fn logs_bucket(name: &str, spec: &LogsBucket) -> DmResource {
    let mut props = map([
        ("name", Value::String(name.to_string())),
        ("location", Value::String(spec.location.clone())),
        ("storageClass", Value::String(spec.storage_class.clone())),
        ("versioning", mapping([("enabled", Value::Bool(true))])),
    ]);
    if let Some(days) = spec.ttl_days {
        let rule = mapping([
            ("action", mapping([("type", Value::String("Delete".to_string()))])),
            (
                "condition",
                mapping([
                    ("age", Value::Number(u64::from(days).into())),
                    ("isLive", Value::Bool(true)),
                ]),
            ),
        ]);
        props.insert(
            "lifecycle".into(),
            mapping([("rule", Value::Sequence(vec![rule]))]),
        );
    }

    DmResource {
        name: name.to_string(),
        kind: "storage.v1.bucket".to_string(),
        properties: props,
    }
}

fn logs_dataset(host: &Project, dataset: &DatasetRef) -> DmResource {
    let access = vec![
        access_entry("OWNER", &host.owners_group),
        access_entry("READER", &host.auditors_group),
    ];
    DmResource {
        name: dataset.name.clone(),
        kind: "bigquery.v2.dataset".to_string(),
        properties: map([
            (
                "datasetReference",
                mapping([("datasetId", Value::String(dataset.name.clone()))]),
            ),
            ("location", Value::String(dataset.location.clone())),
            ("access", Value::Sequence(access)),
        ]),
    }
}

fn access_entry(role: &str, group: &str) -> Value {
    mapping([
        ("role", Value::String(role.to_string())),
        ("groupByEmail", Value::String(group.to_string())),
    ])
}

fn map<const N: usize>(entries: [(&str, Value); N]) -> Mapping {
    entries
        .into_iter()
        .map(|(k, v)| (Value::String(k.to_string()), v))
        .collect()
}

fn mapping<const N: usize>(entries: [(&str, Value); N]) -> Value {
    Value::Mapping(map(entries))
}

fn set_default(props: &mut Mapping, key: &str, value: Value) {
    if !props.contains_key(key) {
        props.insert(key.into(), value);
    }
}
