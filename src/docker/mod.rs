use std::collections::HashMap;

use bollard::container::{
    ListContainersOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::models::ContainerSummary;
use bollard::Docker;
use log::debug;

use crate::core::{DevenvError, Result};
use crate::devcontainer::LABEL_NAMESPACE;

/// Filter selecting every container managed by this tool.
pub const MANAGED_LABEL: &str = "com.devenv.managed=true";

const STOP_TIMEOUT_SECS: i64 = 10;

/// Capability-checked client over the Docker daemon. All lookups go through
/// exact-match label filters; container names are never pattern-matched.
pub struct DockerClient {
    client: Docker,
}

impl DockerClient {
    /// Connect and ping the daemon. An unreachable daemon is a distinct,
    /// user-actionable error.
    pub async fn connect() -> Result<Self> {
        let client = Docker::connect_with_local_defaults()
            .map_err(|e| DevenvError::DockerUnavailable(e.to_string()))?;

        client
            .ping()
            .await
            .map_err(|e| DevenvError::DockerUnavailable(e.to_string()))?;

        Ok(Self { client })
    }

    /// All managed containers, running or not.
    pub async fn list_managed(&self) -> Result<Vec<ContainerSummary>> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![MANAGED_LABEL.to_string()]);

        let containers = self
            .client
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;

        debug!("Found {} managed container(s)", containers.len());
        Ok(containers)
    }

    /// The managed container for a (branch, repo) pair, if any. The label
    /// filter is the application-level uniqueness check; a race between two
    /// concurrent creates is a documented limitation.
    pub async fn find_by_branch(
        &self,
        branch: &str,
        repo: &str,
    ) -> Result<Option<ContainerSummary>> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            vec![
                MANAGED_LABEL.to_string(),
                format!("{}.branch={}", LABEL_NAMESPACE, branch),
                format!("{}.repo={}", LABEL_NAMESPACE, repo),
            ],
        );

        let mut containers = self
            .client
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;

        if containers.is_empty() {
            Ok(None)
        } else {
            Ok(Some(containers.remove(0)))
        }
    }

    pub async fn start_container(&self, id: &str) -> Result<()> {
        self.client
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    pub async fn stop_container(&self, id: &str) -> Result<()> {
        self.client
            .stop_container(
                id,
                Some(StopContainerOptions {
                    t: STOP_TIMEOUT_SECS,
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn remove_container(&self, id: &str, volumes: bool) -> Result<()> {
        self.client
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    v: volumes,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }
}

/// Tool-specific labels of a container, with the namespace prefix stripped.
pub fn devenv_labels(container: &ContainerSummary) -> HashMap<String, String> {
    let prefix = format!("{}.", LABEL_NAMESPACE);

    container
        .labels
        .as_ref()
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(key, value)| {
                    key.strip_prefix(&prefix)
                        .map(|short| (short.to_string(), value.clone()))
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn is_running(container: &ContainerSummary) -> bool {
    container.state.as_deref() == Some("running")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn summary_with_labels(labels: &[(&str, &str)]) -> ContainerSummary {
        ContainerSummary {
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_devenv_labels_strips_namespace() {
        let container = summary_with_labels(&[
            ("com.devenv.managed", "true"),
            ("com.devenv.branch", "main"),
            ("com.devenv.editor", "vscode"),
            ("org.opencontainers.image.source", "ignored"),
        ]);

        let labels = devenv_labels(&container);
        assert_eq!(labels.get("branch").map(String::as_str), Some("main"));
        assert_eq!(labels.get("editor").map(String::as_str), Some("vscode"));
        assert!(!labels.contains_key("org.opencontainers.image.source"));
    }

    #[test]
    fn test_devenv_labels_without_labels() {
        let container = ContainerSummary::default();
        assert!(devenv_labels(&container).is_empty());
    }

    #[test]
    fn test_is_running() {
        let mut container = ContainerSummary {
            state: Some("running".to_string()),
            ..Default::default()
        };
        assert!(is_running(&container));

        container.state = Some("exited".to_string());
        assert!(!is_running(&container));

        container.state = None;
        assert!(!is_running(&container));
    }
}
