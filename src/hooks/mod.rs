use std::fmt;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use log::debug;

use crate::config::USER_CONFIG_SUBDIR;

pub const POST_CREATE_EVENT: &str = "post_create";
pub const POST_START_EVENT: &str = "post_start";

const HOOK_SEPARATOR: &str = " && ";
const SHELL_RC: &str = "~/.bashrc";

/// Precedence level a hook was discovered at. User hooks run before project
/// hooks so the project can override or extend them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookTier {
    User,
    Project,
}

impl fmt::Display for HookTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookTier::User => write!(f, "user"),
            HookTier::Project => write!(f, "project"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookReference {
    pub tier: HookTier,
    pub path: PathBuf,
}

/// Discover hook scripts for a lifecycle event, in execution order.
///
/// Checks `<home>/.config/devenv/hooks/<event>` then
/// `<project>/.devenv/hooks/<event>`. A candidate is included only when it
/// is a regular file with the owner-executable bit set; anything else is
/// silently skipped.
pub fn find_hooks(
    event: &str,
    project_path: &Path,
    home_override: Option<&Path>,
) -> Vec<HookReference> {
    let mut hooks = Vec::new();

    let home = home_override.map(Path::to_path_buf).or_else(dirs::home_dir);
    if let Some(home) = home {
        let user_hook = home.join(USER_CONFIG_SUBDIR).join("hooks").join(event);
        if is_executable_file(&user_hook) {
            hooks.push(HookReference {
                tier: HookTier::User,
                path: user_hook,
            });
        }
    }

    let project_hook = project_path.join(".devenv").join("hooks").join(event);
    if is_executable_file(&project_hook) {
        hooks.push(HookReference {
            tier: HookTier::Project,
            path: project_hook,
        });
    }

    debug!("Found {} hook(s) for event '{}'", hooks.len(), event);
    hooks
}

fn is_executable_file(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o100 != 0,
        Err(_) => false,
    }
}

/// Build the shell command executing all discovered hooks for an event.
///
/// Hooks run with the shell rc sourced first so the mise-managed toolchain
/// is on PATH. Returns `None` when no hooks were found.
pub fn build_hook_command(
    event: &str,
    project_path: &Path,
    home_override: Option<&Path>,
) -> Option<String> {
    let hooks = find_hooks(event, project_path, home_override);
    if hooks.is_empty() {
        return None;
    }

    let segments: Vec<String> = hooks
        .iter()
        .map(|hook| {
            format!(
                "echo \"Executing {} {} hook...\" && source {} && {}",
                hook.tier,
                event,
                SHELL_RC,
                hook.path.display()
            )
        })
        .collect();

    Some(segments.join(HOOK_SEPARATOR))
}
