use anyhow::{Context, Result};
use std::process::Command;
use tracing::debug;

/// Runs one `gcloud` invocation and returns its stdout.
pub trait CommandRunner {
    fn run(&self, args: &[&str]) -> Result<String>;
}

/// Spawns the Google Cloud SDK.
#[derive(Debug, Clone)]
pub struct Gcloud {
    bin: String,
}

impl Default for Gcloud {
    fn default() -> Self {
        Self {
            bin: "gcloud".to_string(),
        }
    }
}

impl Gcloud {
    #[cfg(test)]
    fn with_bin(bin: &str) -> Self {
        Self {
            bin: bin.to_string(),
        }
    }
}

impl CommandRunner for Gcloud {
    fn run(&self, args: &[&str]) -> Result<String> {
        let line = command_line(&self.bin, args);
        debug!(command = %line, "running");

        let out = Command::new(&self.bin)
            .args(args)
            .output()
            .with_context(|| format!("failed to run `{}` (is the Google Cloud SDK installed?)", self.bin))?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            anyhow::bail!("`{line}` failed with {}: {}", out.status, stderr.trim());
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

/// Prints every command instead of running it. Listing commands see no existing resources.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRun;

impl CommandRunner for DryRun {
    fn run(&self, args: &[&str]) -> Result<String> {
        println!("  [DRY RUN] {}", command_line("gcloud", args));
        Ok("[]".to_string())
    }
}

pub fn command_line(bin: &str, args: &[&str]) -> String {
    let mut text = bin.to_string();
    for a in args {
        text.push(' ');
        if a.is_empty() || a.contains(|c: char| matches!(c, ' ' | '"' | '\'')) {
            text.push('\'');
            text.push_str(&a.replace('\'', r"'\''"));
            text.push('\'');
        } else {
            text.push_str(a);
        }
    }
    text
}
