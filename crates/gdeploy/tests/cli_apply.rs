use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const PROJECTS_YAML: &str = r#"overall:
  billing_account: 000000-000000-000000
  organization_id: "12345678"

projects:
  - project_id: proj-a
    owners_group: proj-a-owners@example.com
    auditors_group: auditors@example.com
    audit_logs:
      logs_gcs_bucket:
        location: US
    resources:
      gcs_buckets:
        - properties: { name: proj-a-data, location: US }
"#;

fn gdeploy_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("gdeploy"));
    cmd.env_remove("RUST_LOG");
    cmd
}

fn write_projects(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("projects.yaml");
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn missing_path_flag_is_a_usage_error() {
    gdeploy_cmd()
        .arg("--project=proj-a")
        .assert()
        .failure()
        .code(64)
        .stderr(predicate::str::contains("--project_yaml_path must be set"));
}

#[test]
fn empty_project_flag_is_a_usage_error() {
    let tmp = TempDir::new().unwrap();
    let path = write_projects(tmp.path(), PROJECTS_YAML);

    gdeploy_cmd()
        .arg("--project_yaml_path")
        .arg(&path)
        .arg("--project=")
        .assert()
        .failure()
        .code(64)
        .stderr(predicate::str::contains("--project must be set"));
}

#[test]
fn unreadable_file_names_the_path() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("missing.yaml");

    gdeploy_cmd()
        .arg("--project_yaml_path")
        .arg(&path)
        .arg("--project=proj-a")
        .assert()
        .failure()
        .code(66)
        .stderr(predicate::str::contains("failed to read input projects yaml file"))
        .stderr(predicate::str::contains("missing.yaml"));
}

#[test]
fn malformed_yaml_fails_to_unmarshal() {
    let tmp = TempDir::new().unwrap();
    let path = write_projects(tmp.path(), "projects: [unterminated");

    gdeploy_cmd()
        .arg("--project_yaml_path")
        .arg(&path)
        .arg("--project=proj-a")
        .assert()
        .failure()
        .code(65)
        .stderr(predicate::str::contains("failed to unmarshal config"));
}

#[test]
fn invalid_config_fails_to_initialize() {
    let tmp = TempDir::new().unwrap();
    let path = write_projects(
        tmp.path(),
        &PROJECTS_YAML.replace("auditors_group: auditors@example.com", "auditors_group: nobody"),
    );

    gdeploy_cmd()
        .arg("--project_yaml_path")
        .arg(&path)
        .arg("--project=proj-a")
        .assert()
        .failure()
        .code(78)
        .stderr(predicate::str::contains("failed to initialize config"));
}

#[test]
fn unknown_project_is_reported() {
    let tmp = TempDir::new().unwrap();
    let path = write_projects(tmp.path(), PROJECTS_YAML);

    gdeploy_cmd()
        .arg("--project_yaml_path")
        .arg(&path)
        .arg("--project=does-not-exist")
        .arg("--dry_run")
        .assert()
        .failure()
        .code(78)
        .stdout(predicate::str::contains("DRY RUN").not())
        .stderr(predicate::str::contains(r#"failed to find project "does-not-exist""#));
}

#[test]
fn dry_run_prints_the_gcloud_plan() {
    let tmp = TempDir::new().unwrap();
    let path = write_projects(tmp.path(), PROJECTS_YAML);

    gdeploy_cmd()
        .arg("--project_yaml_path")
        .arg(&path)
        .arg("--project=proj-a")
        .arg("--dry_run")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "[DRY RUN] gcloud projects create proj-a --organization=12345678",
        ))
        .stdout(predicate::str::contains(
            "[DRY RUN] gcloud deployment-manager deployments create gdeploy --config",
        ))
        .stdout(predicate::str::contains("[DRY RUN] gcloud logging sinks create audit-logs-to-bigquery"))
        .stderr(predicate::str::contains("Config deployed successfully"));
}

#[test]
fn group_outside_domain_is_warned_about() {
    let tmp = TempDir::new().unwrap();
    let path = write_projects(
        tmp.path(),
        &PROJECTS_YAML.replace("overall:\n", "overall:\n  domain: corp.example.org\n"),
    );

    gdeploy_cmd()
        .env("RUST_LOG", "warn")
        .arg("--project_yaml_path")
        .arg(&path)
        .arg("--project=proj-a")
        .arg("--dry_run")
        .assert()
        .success()
        .stderr(predicate::str::contains("WARN"))
        .stderr(predicate::str::contains("group is outside the configured domain"))
        .stderr(predicate::str::contains("proj-a-owners@example.com"));
}

#[test]
fn repeated_project_id_is_warned_about() {
    let tmp = TempDir::new().unwrap();
    let path = write_projects(
        tmp.path(),
        &format!(
            "{PROJECTS_YAML}  - project_id: proj-a\n    owners_group: second@example.com\n    auditors_group: auditors@example.com\n"
        ),
    );

    gdeploy_cmd()
        .env("RUST_LOG", "warn")
        .arg("--project_yaml_path")
        .arg(&path)
        .arg("--project=proj-a")
        .arg("--dry_run")
        .assert()
        .success()
        .stderr(predicate::str::contains(
            "project id appears more than once; the first entry is used",
        ))
        .stderr(predicate::str::contains("Config deployed successfully").not());
}
