//! Control over the pods backing the services under test

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use std::env;
use tokio::process::Command;

pub const COMPONENT_SELECTOR: &str = "app.kubernetes.io/component in (stac,raster,vector)";

/// Label selector for chaos candidates, narrowed to `RELEASE_NAME` when set.
pub fn default_selector() -> String {
    match env::var("RELEASE_NAME") {
        Ok(release) if !release.trim().is_empty() => {
            format!("app.kubernetes.io/instance={},{}", release.trim(), COMPONENT_SELECTOR)
        }
        _ => COMPONENT_SELECTOR.to_string(),
    }
}

/// Enumerate and destroy compute units (pods).
#[async_trait]
pub trait ClusterControl: Send + Sync {
    async fn list_units(&self, namespace: &str, selector: &str) -> Result<Vec<String>>;

    async fn destroy_unit(&self, namespace: &str, name: &str) -> Result<()>;
}

/// `kubectl` on the local PATH, using the ambient kubeconfig.
#[derive(Debug, Clone)]
pub struct Kubectl {
    binary: String,
}

impl Default for Kubectl {
    fn default() -> Self {
        Self {
            binary: "kubectl".to_string(),
        }
    }
}

impl Kubectl {
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!("Running {} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.binary))?;

        if !output.status.success() {
            return Err(anyhow!(
                "{} failed: {}",
                self.binary,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl ClusterControl for Kubectl {
    async fn list_units(&self, namespace: &str, selector: &str) -> Result<Vec<String>> {
        let stdout = self
            .run(&[
                "get",
                "pods",
                "-n",
                namespace,
                "-l",
                selector,
                "-o",
                "jsonpath={.items[*].metadata.name}",
            ])
            .await?;

        Ok(stdout.split_whitespace().map(str::to_string).collect())
    }

    async fn destroy_unit(&self, namespace: &str, name: &str) -> Result<()> {
        self.run(&["delete", "pod", name, "-n", namespace]).await?;
        Ok(())
    }
}
