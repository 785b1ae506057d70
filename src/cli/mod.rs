use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bollard::models::ContainerSummary;
use chrono::Utc;
use dialoguer::Confirm;
use log::info;

use crate::config::{self, CONFIG_RELATIVE_PATH};
use crate::core::DevenvError;
use crate::devcontainer::{self, CreateContext, Editor, SpecFile};
use crate::docker::{self, DockerClient};
use crate::modules;

fn project_root() -> Result<PathBuf> {
    env::current_dir().context("Failed to determine current directory")
}

/// Repository identity derived from the project directory: (name, absolute path).
fn repo_identity(project_path: &Path) -> (String, PathBuf) {
    let repo_path = project_path
        .canonicalize()
        .unwrap_or_else(|_| project_path.to_path_buf());
    let repo = repo_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (repo, repo_path)
}

pub fn run_init(force: bool, ports: Vec<String>) -> Result<()> {
    let project_path = project_root()?;
    let config_path = project_path.join(CONFIG_RELATIVE_PATH);

    if config::config_exists(&config_path) && !force {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", CONFIG_RELATIVE_PATH))
            .default(false)
            .interact()?;
        if !overwrite {
            println!("Aborted. Existing configuration left untouched.");
            return Ok(());
        }
    }

    let ports = if ports.is_empty() { None } else { Some(ports) };
    let default_config = config::generate_default_config(&project_path, ports);
    config::write_config_file(&default_config, &config_path)?;

    println!("Wrote {}", config_path.display());
    Ok(())
}

pub async fn run_create(
    branch: String,
    module_names: Vec<String>,
    editor: Editor,
    ports: Vec<String>,
) -> Result<()> {
    let project_path = project_root()?;
    let config_path = project_path.join(CONFIG_RELATIVE_PATH);
    if !config::config_exists(&config_path) {
        return Err(DevenvError::ConfigNotFound.into());
    }

    // Reject unknown modules before any file, process or label mutation.
    modules::validate_modules(&module_names)?;

    let mut merged = config::load_and_merge_config(&project_path, None)?;
    if !ports.is_empty() {
        merged.ports = Some(ports);
    }

    let (repo, repo_path) = repo_identity(&project_path);

    let docker = DockerClient::connect().await?;
    if docker.find_by_branch(&branch, &repo).await?.is_some() {
        return Err(DevenvError::ContainerExists { branch }.into());
    }

    let ctx = CreateContext {
        branch,
        repo,
        repo_path: repo_path.clone(),
        editor,
        modules: module_names,
        created: Utc::now(),
        home_override: None,
    };

    let spec = devcontainer::generate(&merged, &ctx)?;
    let spec_file = SpecFile::write(&spec)?;
    devcontainer::launch(spec_file.path(), &repo_path)?;

    println!("Container {} is ready.", spec.name);
    print_connection_hint(editor, &spec.name);
    Ok(())
}

pub async fn run_switch(branch: String, editor: Option<Editor>) -> Result<()> {
    let project_path = project_root()?;
    let (repo, _) = repo_identity(&project_path);

    let docker = DockerClient::connect().await?;
    let container = docker
        .find_by_branch(&branch, &repo)
        .await?
        .with_context(|| {
            format!(
                "No container found for branch '{}'. Create one with: devenv create {}",
                branch, branch
            )
        })?;

    let id = container.id.clone().unwrap_or_default();
    if !docker::is_running(&container) {
        info!("Starting stopped container for branch '{}'", branch);
        docker.start_container(&id).await?;
    }

    let labels = docker::devenv_labels(&container);
    let editor = editor
        .or_else(|| match labels.get("editor").map(String::as_str) {
            Some("jetbrains") => Some(Editor::Jetbrains),
            Some("vscode") => Some(Editor::Vscode),
            _ => None,
        })
        .unwrap_or(Editor::Vscode);

    let name = container_display_name(&container);
    println!("Container {} is running.", name);
    print_connection_hint(editor, &name);
    Ok(())
}

pub async fn run_list() -> Result<()> {
    let docker = DockerClient::connect().await?;
    let containers = docker.list_managed().await?;

    if containers.is_empty() {
        println!("No managed containers found.");
        return Ok(());
    }

    println!(
        "{:<24} {:<14} {:<20} {:<10} {}",
        "BRANCH", "CONTAINER ID", "STATUS", "EDITOR", "PORTS"
    );
    for container in containers {
        let labels = docker::devenv_labels(&container);
        let branch = labels.get("branch").cloned().unwrap_or_else(|| "-".into());
        let editor = labels.get("editor").cloned().unwrap_or_else(|| "-".into());
        let id: String = container
            .id
            .as_deref()
            .unwrap_or("")
            .chars()
            .take(12)
            .collect();
        let status = container
            .status
            .clone()
            .or_else(|| container.state.clone())
            .unwrap_or_else(|| "-".into());

        println!(
            "{:<24} {:<14} {:<20} {:<10} {}",
            branch,
            id,
            status,
            editor,
            format_ports(&container)
        );
    }

    Ok(())
}

pub async fn run_rm(branch: String, volumes: bool, force: bool) -> Result<()> {
    let project_path = project_root()?;
    let (repo, _) = repo_identity(&project_path);

    let docker = DockerClient::connect().await?;
    let container = docker
        .find_by_branch(&branch, &repo)
        .await?
        .with_context(|| format!("No container found for branch '{}'", branch))?;

    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!("Remove container for branch '{}'?", branch))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let id = container.id.clone().unwrap_or_default();
    if docker::is_running(&container) {
        docker.stop_container(&id).await?;
    }
    docker.remove_container(&id, volumes).await?;

    println!("Removed container for branch '{}'.", branch);
    Ok(())
}

pub fn run_modules() -> Result<()> {
    println!("Available built-in modules:");
    println!();
    for (name, description) in modules::list_modules() {
        println!("  {}", name);
        println!("    {}", description);
        println!();
    }
    Ok(())
}

fn container_display_name(container: &ContainerSummary) -> String {
    container
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|name| name.trim_start_matches('/').to_string())
        .or_else(|| container.id.clone())
        .unwrap_or_default()
}

fn format_ports(container: &ContainerSummary) -> String {
    let Some(ports) = &container.ports else {
        return String::new();
    };

    let mut rendered: Vec<String> = ports
        .iter()
        .map(|port| match port.public_port {
            Some(public) => format!("{}->{}", public, port.private_port),
            None => port.private_port.to_string(),
        })
        .collect();
    rendered.sort();
    rendered.dedup();
    rendered.join(", ")
}

fn print_connection_hint(editor: Editor, container_name: &str) {
    match editor {
        Editor::Vscode => println!(
            "Connect with VS Code: use the Dev Containers extension to attach to '{}'.",
            container_name
        ),
        Editor::Jetbrains => println!(
            "Connect with JetBrains Gateway and attach to '{}'.",
            container_name
        ),
    }
}
