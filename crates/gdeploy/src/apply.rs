use crate::config::{Config, Project};
use crate::deployment;
use crate::gcloud::CommandRunner;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::Write;
use time::format_description::well_known::Rfc3339;
use tracing::info;

/// Name of the Deployment Manager deployment holding a project's resources.
pub const DEPLOYMENT_NAME: &str = "gdeploy";

const AUDIT_LOGS_SINK: &str = "audit-logs-to-bigquery";
const AUDIT_LOGS_FILTER: &str = r#"logName:"logs/cloudaudit.googleapis.com""#;

/// Provisions a single project's cloud resources.
pub trait Deployer {
    fn apply(&self, conf: &Config, project: &Project) -> Result<()>;
}

pub struct GcloudDeployer<R> {
    runner: R,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

impl<R: CommandRunner> GcloudDeployer<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    fn ensure_project(&self, project: &Project) -> Result<()> {
        let id = project.project_id.as_str();
        let filter = format!("projectId:{id}");
        let out = self
            .runner
            .run(&["projects", "list", "--filter", filter.as_str(), "--format=json"])?;
        let found: Vec<serde_json::Value> =
            serde_json::from_str(&out).context("parse `gcloud projects list` output")?;
        if !found.is_empty() {
            info!(project = id, "project exists");
            return Ok(());
        }

        info!(project = id, "creating project");
        let parent = project.generated.parent.as_ref().map(|p| p.flag());
        let mut args = vec!["projects", "create", id];
        if let Some(flag) = &parent {
            args.push(flag.as_str());
        }
        self.runner.run(&args)?;
        Ok(())
    }

    fn link_billing(&self, project: &Project) -> Result<()> {
        self.runner.run(&[
            "beta",
            "billing",
            "projects",
            "link",
            project.project_id.as_str(),
            "--billing-account",
            project.generated.billing_account.as_str(),
        ])?;
        Ok(())
    }

    fn enable_apis(&self, project: &Project) -> Result<()> {
        let mut args = vec!["services", "enable"];
        args.extend(project.generated.apis.iter().map(String::as_str));
        args.extend(["--project", project.project_id.as_str()]);
        self.runner.run(&args)?;
        Ok(())
    }

    fn grant_groups(&self, project: &Project) -> Result<()> {
        for (group, role) in [
            (&project.owners_group, "roles/owner"),
            (&project.auditors_group, "roles/iam.securityReviewer"),
        ] {
            let member = format!("group:{group}");
            self.runner.run(&[
                "projects",
                "add-iam-policy-binding",
                project.project_id.as_str(),
                "--member",
                member.as_str(),
                "--role",
                role,
            ])?;
        }
        Ok(())
    }

    fn deploy_resources(&self, conf: &Config, project: &Project) -> Result<()> {
        let id = project.project_id.as_str();
        let yaml = deployment::render(conf, project).to_yaml()?;

        let mut file = tempfile::Builder::new()
            .prefix("gdeploy-")
            .suffix(".yaml")
            .tempfile()
            .context("create deployment config file")?;
        file.write_all(yaml.as_bytes())
            .context("write deployment config file")?;
        let path = file
            .path()
            .to_str()
            .context("deployment config path is not valid UTF-8")?
            .to_string();

        let out = self.runner.run(&[
            "deployment-manager",
            "deployments",
            "list",
            "--project",
            id,
            "--format=json",
        ])?;
        let existing: Vec<Named> =
            serde_json::from_str(&out).context("parse `gcloud deployment-manager deployments list` output")?;
        let verb = if existing.iter().any(|d| d.name == DEPLOYMENT_NAME) {
            "update"
        } else {
            "create"
        };

        let now = time::OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .context("format timestamp")?;
        let description = format!("Managed by gdeploy, applied {now}");

        info!(project = id, deployment = DEPLOYMENT_NAME, action = verb, "deploying resources");
        self.runner.run(&[
            "deployment-manager",
            "deployments",
            verb,
            DEPLOYMENT_NAME,
            "--config",
            path.as_str(),
            "--description",
            description.as_str(),
            "--project",
            id,
        ])?;
        Ok(())
    }

    fn ensure_audit_logs_sink(&self, project: &Project) -> Result<()> {
        let id = project.project_id.as_str();
        let dataset = &project.generated.logs_dataset;
        let destination = format!(
            "bigquery.googleapis.com/projects/{}/datasets/{}",
            dataset.project_id, dataset.name
        );

        let out = self
            .runner
            .run(&["logging", "sinks", "list", "--project", id, "--format=json"])?;
        let sinks: Vec<Named> =
            serde_json::from_str(&out).context("parse `gcloud logging sinks list` output")?;
        let verb = if sinks.iter().any(|s| s.name == AUDIT_LOGS_SINK) {
            "update"
        } else {
            "create"
        };

        info!(project = id, %destination, "exporting audit logs");
        self.runner.run(&[
            "logging",
            "sinks",
            verb,
            AUDIT_LOGS_SINK,
            destination.as_str(),
            "--log-filter",
            AUDIT_LOGS_FILTER,
            "--project",
            id,
        ])?;
        Ok(())
    }
}

impl<R: CommandRunner> Deployer for GcloudDeployer<R> {
    fn apply(&self, conf: &Config, project: &Project) -> Result<()> {
        self.ensure_project(project).context("ensure project exists")?;
        self.link_billing(project).context("link billing account")?;
        self.enable_apis(project).context("enable APIs")?;
        self.grant_groups(project).context("grant group roles")?;
        self.deploy_resources(conf, project)
            .context("deploy resources")?;
        self.ensure_audit_logs_sink(project)
            .context("export audit logs")?;
        Ok(())
    }
}
