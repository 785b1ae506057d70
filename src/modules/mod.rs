use std::collections::BTreeMap;

use lazy_static::lazy_static;
use serde_json::json;

use crate::config::Mount;
use crate::core::{DevenvError, Result};
use crate::devcontainer::ContainerSpec;

const COMMAND_SEPARATOR: &str = " && ";

/// A named, composable configuration fragment. Modules are read-only
/// templates; applying one copies its pieces into the specification.
#[derive(Debug, Clone)]
pub struct Module {
    pub description: &'static str,
    pub mounts: Vec<Mount>,
    pub environment: Vec<(String, String)>,
    pub features: Vec<(String, serde_json::Value)>,
    pub run_args: Vec<String>,
    pub post_create_commands: Vec<String>,
}

lazy_static! {
    static ref BUILTIN_MODULES: BTreeMap<&'static str, Module> = {
        let mut catalog = BTreeMap::new();

        catalog.insert(
            "claude-code",
            Module {
                description: "Integrates Claude Code for AI-assisted development",
                mounts: vec![Mount::bind(
                    "${localEnv:HOME}/.claude",
                    "/home/vscode/.claude",
                )],
                environment: vec![("CLAUDE_CODE_ENABLED".to_string(), "true".to_string())],
                features: Vec::new(),
                run_args: Vec::new(),
                post_create_commands: vec![
                    "npm install -g @anthropic/claude-code".to_string(),
                ],
            },
        );

        catalog.insert(
            "docker-in-docker",
            Module {
                description: "Allows running Docker commands inside the container",
                mounts: vec![Mount::bind(
                    "/var/run/docker.sock",
                    "/var/run/docker-host.sock",
                )],
                environment: Vec::new(),
                features: vec![(
                    "ghcr.io/devcontainers/features/docker-in-docker:2".to_string(),
                    json!({"moby": true, "dockerDashComposeVersion": "v2"}),
                )],
                run_args: Vec::new(),
                post_create_commands: Vec::new(),
            },
        );

        catalog
    };
}

/// All modules as (name, description), in name order.
pub fn list_modules() -> Vec<(&'static str, &'static str)> {
    BUILTIN_MODULES
        .iter()
        .map(|(name, module)| (*name, module.description))
        .collect()
}

fn available_names() -> Vec<String> {
    BUILTIN_MODULES.keys().map(|k| k.to_string()).collect()
}

/// Look up a single module by name.
pub fn get_module(name: &str) -> Result<Module> {
    BUILTIN_MODULES
        .get(name)
        .cloned()
        .ok_or_else(|| DevenvError::UnknownModules {
            requested: vec![name.to_string()],
            available: available_names(),
        })
}

/// Check every requested module exists; the error names all unknown entries,
/// not just the first.
pub fn validate_modules(names: &[String]) -> Result<()> {
    let unknown: Vec<String> = names
        .iter()
        .filter(|name| !BUILTIN_MODULES.contains_key(name.as_str()))
        .cloned()
        .collect();

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(DevenvError::UnknownModules {
            requested: unknown,
            available: available_names(),
        })
    }
}

/// Apply modules to a specification in caller-supplied order.
///
/// Re-validates before touching the specification: applying an unknown
/// module is a fatal error, never a no-op.
pub fn apply_modules(spec: &mut ContainerSpec, names: &[String]) -> Result<()> {
    if names.is_empty() {
        return Ok(());
    }

    validate_modules(names)?;

    for name in names {
        let module = get_module(name)?;
        apply_module(spec, &module);
    }

    Ok(())
}

fn apply_module(spec: &mut ContainerSpec, module: &Module) {
    spec.run_args.extend(module.run_args.iter().cloned());
    spec.mounts.extend(module.mounts.iter().cloned());

    if !module.environment.is_empty() {
        let env = spec.remote_env.get_or_insert_with(BTreeMap::new);
        for (key, value) in &module.environment {
            env.insert(key.clone(), value.clone());
        }
    }

    if !module.features.is_empty() {
        let features = spec.features.get_or_insert_with(BTreeMap::new);
        for (key, value) in &module.features {
            features.insert(key.clone(), value.clone());
        }
    }

    if !module.post_create_commands.is_empty() {
        let module_command = module.post_create_commands.join(COMMAND_SEPARATOR);
        if spec.post_create_command.is_empty() {
            spec.post_create_command = module_command;
        } else {
            spec.post_create_command =
                format!("{}{}{}", spec.post_create_command, COMMAND_SEPARATOR, module_command);
        }
    }
}
