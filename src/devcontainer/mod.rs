use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::config::{MergedConfig, Mount};
use crate::core::{DevenvError, Result};
use crate::hooks;
use crate::modules;

/// Prefix for container names and label keys.
pub const TOOL_PREFIX: &str = "devenv";
pub const LABEL_NAMESPACE: &str = "com.devenv";

/// The external orchestration CLI invoked with the generated specification.
pub const DEVCONTAINER_CLI: &str = "devcontainer";

const COMMAND_SEPARATOR: &str = " && ";
const MISE_CACHE_SOURCE: &str = "${localEnv:HOME}/.local/share/mise";
const MISE_CACHE_TARGET: &str = "/home/vscode/.local/share/mise";
const DOTFILES_TARGET: &str = "/tmp/devenv-dotfiles";

/// Supported IDE kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Editor {
    Vscode,
    Jetbrains,
}

impl Editor {
    pub fn kind(&self) -> &'static str {
        match self {
            Editor::Vscode => "vscode",
            Editor::Jetbrains => "jetbrains",
        }
    }
}

impl fmt::Display for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// Everything a `create` invocation contributes beyond the merged config.
///
/// `created` is passed in rather than sampled internally so generation is a
/// pure function of its inputs.
#[derive(Debug, Clone)]
pub struct CreateContext {
    pub branch: String,
    pub repo: String,
    pub repo_path: PathBuf,
    pub editor: Editor,
    pub modules: Vec<String>,
    pub created: DateTime<Utc>,
    pub home_override: Option<PathBuf>,
}

/// The generated devcontainer.json document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerSpec {
    #[serde(rename = "name")]
    pub name: String,

    #[serde(rename = "image")]
    pub image: String,

    #[serde(rename = "forwardPorts", skip_serializing_if = "Option::is_none")]
    pub forward_ports: Option<Vec<u16>>,

    #[serde(rename = "remoteEnv", skip_serializing_if = "Option::is_none")]
    pub remote_env: Option<BTreeMap<String, String>>,

    #[serde(rename = "features", skip_serializing_if = "Option::is_none")]
    pub features: Option<BTreeMap<String, serde_json::Value>>,

    #[serde(rename = "mounts")]
    pub mounts: Vec<Mount>,

    #[serde(rename = "customizations", skip_serializing_if = "Option::is_none")]
    pub customizations: Option<Customizations>,

    #[serde(rename = "postCreateCommand")]
    pub post_create_command: String,

    #[serde(rename = "postStartCommand", skip_serializing_if = "Option::is_none")]
    pub post_start_command: Option<String>,

    #[serde(rename = "runArgs")]
    pub run_args: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Customizations {
    #[serde(rename = "vscode", skip_serializing_if = "Option::is_none")]
    pub vscode: Option<VsCodeCustomization>,

    #[serde(rename = "jetbrains", skip_serializing_if = "Option::is_none")]
    pub jetbrains: Option<JetBrainsCustomization>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VsCodeCustomization {
    #[serde(rename = "extensions")]
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JetBrainsCustomization {
    #[serde(rename = "plugins")]
    pub plugins: Vec<String>,
}

/// Standardized container name: `devenv-<repo>-<branch>-<editor>`.
pub fn container_name(repo: &str, branch: &str, editor: Editor) -> String {
    format!("{}-{}-{}-{}", TOOL_PREFIX, repo, branch, editor)
}

/// Extract host-side port numbers from `"host[:container]"` mappings.
///
/// Malformed entries are dropped silently; a bad port must not abort
/// generation.
pub fn extract_forward_ports(ports: Option<&[String]>) -> Vec<u16> {
    let Some(ports) = ports else {
        return Vec::new();
    };

    ports
        .iter()
        .filter_map(|entry| {
            let host = entry.split(':').next().unwrap_or(entry);
            host.trim().parse::<u16>().ok()
        })
        .collect()
}

/// Identification labels attached as literal `--label=` run arguments.
/// These are the only lookup keys the runtime client uses.
pub fn generate_labels(ctx: &CreateContext) -> Vec<String> {
    vec![
        format!("--label={}.managed=true", LABEL_NAMESPACE),
        format!("--label={}.repo={}", LABEL_NAMESPACE, ctx.repo),
        format!(
            "--label={}.repo-path={}",
            LABEL_NAMESPACE,
            ctx.repo_path.display()
        ),
        format!("--label={}.branch={}", LABEL_NAMESPACE, ctx.branch),
        format!("--label={}.editor={}", LABEL_NAMESPACE, ctx.editor),
        format!(
            "--label={}.created={}Z",
            LABEL_NAMESPACE,
            ctx.created.format("%Y-%m-%dT%H:%M:%S%.6f")
        ),
        format!("--label={}.tainted=false", LABEL_NAMESPACE),
        format!("--label={}.modules={}", LABEL_NAMESPACE, ctx.modules.join(",")),
    ]
}

/// Generate the full specification from the merged configuration.
///
/// Modules are re-validated and applied last, in caller-supplied order.
/// Any failure aborts generation; no partial specification is returned.
pub fn generate(config: &MergedConfig, ctx: &CreateContext) -> Result<ContainerSpec> {
    let forward_ports = extract_forward_ports(config.ports.as_deref());

    // The mise cache mount always comes first, then config-declared mounts,
    // then the dotfiles mount.
    let mut mounts = vec![Mount::bind(MISE_CACHE_SOURCE, MISE_CACHE_TARGET)];
    if let Some(declared) = &config.mounts {
        mounts.extend(declared.iter().cloned());
    }
    if let Some(dotfiles_dir) = &config.dotfiles_dir {
        mounts.push(Mount::bind(
            dotfiles_dir.display().to_string(),
            DOTFILES_TARGET,
        ));
    }

    let mut spec = ContainerSpec {
        name: container_name(&ctx.repo, &ctx.branch, ctx.editor),
        image: config.image.clone(),
        forward_ports: if forward_ports.is_empty() {
            None
        } else {
            Some(forward_ports)
        },
        remote_env: config.environment.clone(),
        features: config.features.clone(),
        mounts,
        customizations: build_customizations(config, ctx.editor),
        post_create_command: build_post_create_command(config, ctx),
        post_start_command: build_post_start_command(config, ctx),
        run_args: generate_labels(ctx),
    };

    modules::apply_modules(&mut spec, &ctx.modules)?;

    debug!("Generated specification for container '{}'", spec.name);
    Ok(spec)
}

/// Attach the plugin list for the active editor only.
fn build_customizations(config: &MergedConfig, editor: Editor) -> Option<Customizations> {
    let plugins = config.plugins.get(editor.kind())?;

    match editor {
        Editor::Vscode => Some(Customizations {
            vscode: Some(VsCodeCustomization {
                extensions: plugins.clone(),
            }),
            jetbrains: None,
        }),
        Editor::Jetbrains => Some(Customizations {
            vscode: None,
            jetbrains: Some(JetBrainsCustomization {
                plugins: plugins.clone(),
            }),
        }),
    }
}

/// Ordered post-create pipeline: mise bootstrap, shell activation, tool
/// install, dotfiles copy, lifecycle hooks, then the user's own command.
fn build_post_create_command(config: &MergedConfig, ctx: &CreateContext) -> String {
    let mut commands: Vec<String> = vec![
        "mkdir -p ~/.local/bin".to_string(),
        "curl -fsSL https://mise.run | sh".to_string(),
        "echo 'eval \"$(~/.local/bin/mise activate bash)\"' >> ~/.bashrc".to_string(),
        "echo 'eval \"$(~/.local/bin/mise activate zsh)\"' >> ~/.zshrc".to_string(),
        "~/.local/bin/mise install || true".to_string(),
    ];

    if config.dotfiles_dir.is_some() {
        commands.push(format!("cp -r {}/. ~/", DOTFILES_TARGET));
    }

    if let Some(hook_command) = hooks::build_hook_command(
        hooks::POST_CREATE_EVENT,
        &ctx.repo_path,
        ctx.home_override.as_deref(),
    ) {
        commands.push(hook_command);
    }

    if let Some(user_command) = &config.post_create_command {
        commands.push(format!("source ~/.bashrc && {}", user_command));
    }

    commands.join(COMMAND_SEPARATOR)
}

/// Post-start pipeline: lifecycle hooks then the user's own command.
/// `None` when both are absent.
fn build_post_start_command(config: &MergedConfig, ctx: &CreateContext) -> Option<String> {
    let mut commands = Vec::new();

    if let Some(hook_command) = hooks::build_hook_command(
        hooks::POST_START_EVENT,
        &ctx.repo_path,
        ctx.home_override.as_deref(),
    ) {
        commands.push(hook_command);
    }

    if let Some(user_command) = &config.post_start_command {
        commands.push(format!("source ~/.bashrc && {}", user_command));
    }

    if commands.is_empty() {
        None
    } else {
        Some(commands.join(COMMAND_SEPARATOR))
    }
}

/// A specification written to a scoped temporary location. The backing
/// directory is removed when this is dropped, on every exit path.
pub struct SpecFile {
    path: PathBuf,
    _dir: TempDir,
}

impl SpecFile {
    pub fn write(spec: &ContainerSpec) -> Result<Self> {
        let dir = TempDir::new()?;
        let path = dir.path().join("devcontainer.json");
        let body = serde_json::to_string_pretty(spec)?;
        fs::write(&path, body)?;

        Ok(Self { path, _dir: dir })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Invoke the external `devcontainer` CLI in the foreground.
///
/// The subprocess inherits stdio; its output is user-visible build progress.
/// A non-zero exit is surfaced as-is, without retry.
pub fn launch(spec_path: &Path, workspace: &Path) -> Result<()> {
    which::which(DEVCONTAINER_CLI).map_err(|_| DevenvError::ExternalToolMissing)?;

    info!(
        "Launching devcontainer for workspace {}",
        workspace.display()
    );

    // An interrupt reaches the child through the terminal's process group;
    // we keep running so the scoped spec file still gets cleaned up.
    let _ = ctrlc::set_handler(|| {});

    let status = Command::new(DEVCONTAINER_CLI)
        .arg("up")
        .arg("--workspace-folder")
        .arg(workspace)
        .arg("--config")
        .arg(spec_path)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()?;

    if !status.success() {
        return Err(DevenvError::Subprocess {
            command: format!("{} up", DEVCONTAINER_CLI),
            code: status.code().unwrap_or(-1),
        });
    }

    Ok(())
}
