use clap::Parser;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::apply::{Deployer, GcloudDeployer};
use crate::config::{Config, Project};
use crate::error::ApplyError;
use crate::gcloud::{DryRun, Gcloud};

#[derive(Debug, Parser)]
#[command(
    name = "gdeploy",
    version,
    about = "Deploy a project's config resources to Google Cloud"
)]
pub struct Args {
    /// Path to project yaml file
    #[arg(long = "project_yaml_path", default_value = "")]
    pub project_yaml_path: String,

    /// Project within the project yaml file to deploy config resources for
    #[arg(long = "project", default_value = "")]
    pub project: String,

    /// Print the gcloud commands instead of running them
    #[arg(long = "dry_run")]
    pub dry_run: bool,
}

pub fn run(args: Args) -> Result<(), ApplyError> {
    if args.dry_run {
        run_with(&args, &GcloudDeployer::new(DryRun))
    } else {
        run_with(&args, &GcloudDeployer::new(Gcloud::default()))
    }
}

/// Read, decode, initialize, look up, apply. Stops at the first failing stage.
pub fn run_with<D: Deployer>(args: &Args, deployer: &D) -> Result<(), ApplyError> {
    if args.project_yaml_path.is_empty() {
        return Err(ApplyError::Usage("--project_yaml_path"));
    }
    if args.project.is_empty() {
        return Err(ApplyError::Usage("--project"));
    }

    let path = Path::new(&args.project_yaml_path);
    let bytes = fs::read(path).map_err(|source| ApplyError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut conf = Config::decode(&bytes).map_err(ApplyError::Decode)?;
    conf.init().map_err(ApplyError::Init)?;

    let project = find_project(&args.project, &conf)?;
    info!(project = %project.project_id, dry_run = args.dry_run, "deploying");

    deployer
        .apply(&conf, project)
        .map_err(|cause| ApplyError::Deploy {
            project: args.project.clone(),
            cause,
        })
}

pub fn find_project<'a>(id: &str, conf: &'a Config) -> Result<&'a Project, ApplyError> {
    conf.all_projects()
        .into_iter()
        .find(|p| p.project_id == id)
        .ok_or_else(|| ApplyError::ProjectNotFound(id.to_string()))
}
