use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::warn;

/// API every deployed project needs before resources can be created.
pub const DEPLOYMENT_MANAGER_API: &str = "deploymentmanager.googleapis.com";

const DEFAULT_LOCATION: &str = "US";
const LOCAL_AUDIT_LOGS_DATASET: &str = "audit_logs";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("project {project:?}: {message}")]
    Project { project: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub overall: Overall,

    /// Central project that receives the audit logs of every other project.
    #[serde(default)]
    pub audit_logs_project: Option<Project>,

    #[serde(default)]
    pub forseti: Option<Forseti>,

    #[serde(default)]
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Overall {
    #[serde(default)]
    pub billing_account: Option<String>,

    #[serde(default)]
    pub organization_id: Option<String>,

    #[serde(default)]
    pub folder_id: Option<String>,

    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default)]
    pub allowed_apis: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Forseti {
    pub project: Project,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Project {
    pub project_id: String,

    #[serde(default)]
    pub owners_group: String,

    #[serde(default)]
    pub auditors_group: String,

    #[serde(default)]
    pub data_readwrite_groups: Vec<String>,

    #[serde(default)]
    pub data_readonly_groups: Vec<String>,

    #[serde(default)]
    pub billing_account: Option<String>,

    #[serde(default)]
    pub folder_id: Option<String>,

    #[serde(default)]
    pub enabled_apis: Vec<String>,

    #[serde(default)]
    pub audit_logs: AuditLogs,

    #[serde(default)]
    pub resources: Resources,

    /// Filled in by `Config::init`, never read from YAML.
    #[serde(skip)]
    pub generated: GeneratedFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuditLogs {
    #[serde(default)]
    pub logs_gcs_bucket: Option<LogsBucket>,

    #[serde(default)]
    pub logs_bq_dataset: Option<LogsDataset>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LogsBucket {
    #[serde(default = "default_location")]
    pub location: String,

    #[serde(default = "default_storage_class")]
    pub storage_class: String,

    /// Age in days after which log objects are deleted.
    #[serde(default)]
    pub ttl_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LogsDataset {
    #[serde(default = "default_location")]
    pub location: String,
}

fn default_location() -> String {
    DEFAULT_LOCATION.to_string()
}

fn default_storage_class() -> String {
    "MULTI_REGIONAL".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Resources {
    #[serde(default)]
    pub gcs_buckets: Vec<Resource>,

    #[serde(default)]
    pub bq_datasets: Vec<Resource>,

    #[serde(default)]
    pub pubsub_topics: Vec<Resource>,
}

/// A user-declared resource; `properties` are passed through to Deployment Manager.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Resource {
    #[serde(default)]
    pub properties: Mapping,
}

impl Resource {
    pub fn name(&self) -> Option<&str> {
        self.properties.get("name").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parent {
    Folder(String),
    Organization(String),
}

impl Parent {
    pub fn flag(&self) -> String {
        match self {
            Parent::Folder(id) => format!("--folder={id}"),
            Parent::Organization(id) => format!("--organization={id}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetRef {
    pub project_id: String,
    pub name: String,
    pub location: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedFields {
    pub billing_account: String,
    pub parent: Option<Parent>,
    pub apis: Vec<String>,
    pub logs_dataset: DatasetRef,
    pub logs_bucket: Option<String>,
}

impl Config {
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_slice(bytes)
    }

    /// Validates every project and derives the fields the deployer relies on.
    pub fn init(&mut self) -> Result<(), ConfigError> {
        let overall = self.overall.clone();
        let audit_project_id = self
            .audit_logs_project
            .as_ref()
            .map(|p| p.project_id.clone());

        for project in self.all_projects_mut() {
            project.init(&overall, audit_project_id.as_deref())?;
        }

        let mut seen = BTreeSet::new();
        for project in self.all_projects() {
            if !seen.insert(project.project_id.as_str()) {
                warn!(
                    project = %project.project_id,
                    "project id appears more than once; the first entry is used"
                );
            }
        }

        if let Some(audit) = &self.audit_logs_project {
            self.check_routed_datasets(audit)?;
        }
        Ok(())
    }

    /// Datasets routed into the audit logs project share its deployment, so
    /// their names must not collide with its own resources or each other.
    fn check_routed_datasets(&self, audit: &Project) -> Result<(), ConfigError> {
        let mut owners: BTreeMap<String, &str> = audit
            .local_names()
            .into_iter()
            .map(|name| (name, audit.project_id.as_str()))
            .collect();

        for project in self.all_projects() {
            let dataset = &project.generated.logs_dataset;
            if project.project_id == audit.project_id || dataset.project_id != audit.project_id {
                continue;
            }
            match owners.get(&dataset.name) {
                // repeated project entry
                Some(owner) if *owner == project.project_id => {}
                Some(owner) => {
                    return Err(project.error(format!(
                        "audit logs dataset {:?} clashes with a resource of {owner:?} in audit logs project {:?}",
                        dataset.name, audit.project_id
                    )));
                }
                None => {
                    owners.insert(dataset.name.clone(), project.project_id.as_str());
                }
            }
        }
        Ok(())
    }

    /// Audit logs project, then the Forseti project, then `projects` in order.
    pub fn all_projects(&self) -> Vec<&Project> {
        let mut out = Vec::new();
        if let Some(p) = &self.audit_logs_project {
            out.push(p);
        }
        if let Some(f) = &self.forseti {
            out.push(&f.project);
        }
        out.extend(self.projects.iter());
        out
    }

    fn all_projects_mut(&mut self) -> Vec<&mut Project> {
        let mut out = Vec::new();
        if let Some(p) = self.audit_logs_project.as_mut() {
            out.push(p);
        }
        if let Some(f) = self.forseti.as_mut() {
            out.push(&mut f.project);
        }
        out.extend(self.projects.iter_mut());
        out
    }
}

impl Project {
    /// Names this project's own deployment will hold. Valid after `init`.
    fn local_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.generated.logs_bucket.iter().cloned().collect();
        if self.generated.logs_dataset.project_id == self.project_id {
            names.push(self.generated.logs_dataset.name.clone());
        }
        let resources = &self.resources;
        names.extend(
            resources
                .gcs_buckets
                .iter()
                .chain(&resources.bq_datasets)
                .chain(&resources.pubsub_topics)
                .filter_map(Resource::name)
                .map(str::to_string),
        );
        names
    }

    fn error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::Project {
            project: self.project_id.clone(),
            message: message.into(),
        }
    }

    fn init(&mut self, overall: &Overall, audit_project_id: Option<&str>) -> Result<(), ConfigError> {
        if let Err(reason) = validate_project_id(&self.project_id) {
            return Err(self.error(format!("invalid project_id: {reason}")));
        }

        if self.owners_group.is_empty() {
            return Err(self.error("owners_group must be set"));
        }
        if self.auditors_group.is_empty() {
            return Err(self.error("auditors_group must be set"));
        }
        for group in [&self.owners_group, &self.auditors_group]
            .into_iter()
            .chain(&self.data_readwrite_groups)
            .chain(&self.data_readonly_groups)
        {
            if !looks_like_email(group) {
                return Err(self.error(format!("group {group:?} is not an email address")));
            }
            if let Some(domain) = &overall.domain {
                if !group.ends_with(&format!("@{domain}")) {
                    warn!(project = %self.project_id, %group, %domain, "group is outside the configured domain");
                }
            }
        }

        let billing_account = self
            .billing_account
            .clone()
            .or_else(|| overall.billing_account.clone())
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                self.error("billing_account must be set on the project or in overall")
            })?;

        let parent = match (
            self.folder_id.as_ref().or(overall.folder_id.as_ref()),
            overall.organization_id.as_ref(),
        ) {
            (Some(folder), _) => Some(Parent::Folder(folder.clone())),
            (None, Some(org)) => Some(Parent::Organization(org.clone())),
            (None, None) => None,
        };

        let mut apis = vec![DEPLOYMENT_MANAGER_API.to_string()];
        for api in overall.allowed_apis.iter().chain(&self.enabled_apis) {
            if !apis.contains(api) {
                apis.push(api.clone());
            }
        }

        let dataset_location = self
            .audit_logs
            .logs_bq_dataset
            .as_ref()
            .map_or_else(default_location, |d| d.location.clone());
        let logs_dataset = match audit_project_id {
            Some(audit) if audit != self.project_id => DatasetRef {
                project_id: audit.to_string(),
                name: self.project_id.replace('-', "_"),
                location: dataset_location,
            },
            _ => DatasetRef {
                project_id: self.project_id.clone(),
                name: LOCAL_AUDIT_LOGS_DATASET.to_string(),
                location: dataset_location,
            },
        };

        let logs_bucket = self
            .audit_logs
            .logs_gcs_bucket
            .as_ref()
            .map(|_| format!("{}-logs", self.project_id));

        let mut names = BTreeSet::new();
        if let Some(bucket) = &logs_bucket {
            names.insert(bucket.clone());
        }
        if logs_dataset.project_id == self.project_id {
            names.insert(logs_dataset.name.clone());
        }
        for (kind, resources) in [
            ("gcs_buckets", &self.resources.gcs_buckets),
            ("bq_datasets", &self.resources.bq_datasets),
            ("pubsub_topics", &self.resources.pubsub_topics),
        ] {
            for resource in resources {
                let name = resource
                    .name()
                    .ok_or_else(|| self.error(format!("{kind}: every resource needs properties.name")))?;
                if !names.insert(name.to_string()) {
                    return Err(self.error(format!("{kind}: duplicate resource name {name:?}")));
                }
            }
        }

        self.generated = GeneratedFields {
            billing_account,
            parent,
            apis,
            logs_dataset,
            logs_bucket,
        };
        Ok(())
    }
}

fn validate_project_id(id: &str) -> Result<(), &'static str> {
    if !(6..=30).contains(&id.len()) {
        return Err("must be 6 to 30 characters");
    }
    if !id.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err("must start with a lowercase letter");
    }
    if id.ends_with('-') {
        return Err("must not end with a hyphen");
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("may only contain lowercase letters, digits and hyphens");
    }
    Ok(())
}

fn looks_like_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    }
}
