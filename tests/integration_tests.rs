//! End-to-end tests for the resolution and generation pipeline: fixture
//! project and home directories in, devcontainer.json out.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use devenv::config::{self, USER_CONFIG_SUBDIR};
use devenv::devcontainer::{self, ContainerSpec, CreateContext, Editor, SpecFile};

fn fixed_created() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap()
}

fn write_project_config(project: &Path, body: &str) {
    let devenv_dir = project.join(".devenv");
    fs::create_dir_all(&devenv_dir).unwrap();
    fs::write(devenv_dir.join("config.yml"), body).unwrap();
}

fn write_executable_hook(hooks_dir: &Path, event: &str) -> PathBuf {
    fs::create_dir_all(hooks_dir).unwrap();
    let path = hooks_dir.join(event);
    fs::write(&path, "#!/bin/sh\necho hook\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn repo_name(project: &TempDir) -> String {
    project
        .path()
        .canonicalize()
        .unwrap()
        .file_name()
        .unwrap()
        .to_string_lossy()
        .into_owned()
}

fn context(project: &TempDir, home: &TempDir, editor: Editor) -> CreateContext {
    CreateContext {
        branch: "feature-test".to_string(),
        repo: repo_name(project),
        repo_path: project.path().canonicalize().unwrap(),
        editor,
        modules: Vec::new(),
        created: fixed_created(),
        home_override: Some(home.path().to_path_buf()),
    }
}

#[test]
fn full_pipeline_project_and_user_layers() {
    let project = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();

    write_project_config(
        project.path(),
        concat!(
            "name: my-web-app\n",
            "image: node:20\n",
            "ports:\n",
            "  - \"3000:3000\"\n",
            "  - \"5432:5432\"\n",
            "environment:\n",
            "  NODE_ENV: development\n",
            "plugins:\n",
            "  vscode:\n",
            "    - ms-python.python\n",
        ),
    );

    let user_dir = home.path().join(USER_CONFIG_SUBDIR);
    fs::create_dir_all(&user_dir).unwrap();
    fs::write(
        user_dir.join("plugins.vscode.txt"),
        "ms-python.python\nesbenp.prettier-vscode\n",
    )
    .unwrap();

    let user_hook = write_executable_hook(&user_dir.join("hooks"), "post_create");
    let project_hook = write_executable_hook(
        &project.path().join(".devenv").join("hooks"),
        "post_create",
    );

    let merged = config::load_and_merge_config(project.path(), Some(home.path())).unwrap();
    assert_eq!(merged.name, "my-web-app");
    assert_eq!(merged.image, "node:20");
    assert_eq!(
        merged.environment.as_ref().unwrap().get("NODE_ENV"),
        Some(&"development".to_string())
    );
    assert_eq!(
        merged.plugins.get("vscode").unwrap(),
        &vec![
            "ms-python.python".to_string(),
            "esbenp.prettier-vscode".to_string(),
        ]
    );

    let ctx = context(&project, &home, Editor::Vscode);
    let spec = devcontainer::generate(&merged, &ctx).unwrap();

    assert_eq!(
        spec.name,
        format!("devenv-{}-feature-test-vscode", ctx.repo)
    );
    assert_eq!(spec.forward_ports, Some(vec![3000, 5432]));
    assert_eq!(
        spec.customizations.as_ref().unwrap().vscode.as_ref().unwrap().extensions,
        vec!["ms-python.python", "esbenp.prettier-vscode"]
    );

    // Hooks appear in user-then-project order, each sourcing the shell rc.
    let user_segment = format!(
        "echo \"Executing user post_create hook...\" && source ~/.bashrc && {}",
        user_hook.display()
    );
    let project_segment = format!(
        "echo \"Executing project post_create hook...\" && source ~/.bashrc && {}",
        project_hook.display()
    );
    let command = &spec.post_create_command;
    let user_at = command.find(&user_segment).unwrap();
    let project_at = command.find(&project_segment).unwrap();
    assert!(user_at < project_at);
}

#[test]
fn generation_is_byte_identical_for_identical_inputs() {
    let project = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();

    write_project_config(
        project.path(),
        concat!(
            "name: my-web-app\n",
            "image: node:20\n",
            "ports:\n",
            "  - \"3000:3000\"\n",
        ),
    );

    let ctx = CreateContext {
        modules: vec!["claude-code".to_string(), "docker-in-docker".to_string()],
        ..context(&project, &home, Editor::Vscode)
    };

    let render = || {
        let merged = config::load_and_merge_config(project.path(), Some(home.path())).unwrap();
        let spec = devcontainer::generate(&merged, &ctx).unwrap();
        serde_json::to_string_pretty(&spec).unwrap()
    };

    assert_eq!(render(), render());
}

#[test]
fn written_document_round_trips_all_fields() {
    let project = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();

    write_project_config(
        project.path(),
        concat!(
            "name: my-web-app\n",
            "image: node:20\n",
            "ports:\n",
            "  - \"3000:3000\"\n",
            "  - \"abc\"\n",
            "  - \"5432:5432\"\n",
            "mounts:\n",
            "  - source: /data\n",
            "    target: /mnt/data\n",
            "    type: bind\n",
            "post_create_command: npm install\n",
        ),
    );

    let merged = config::load_and_merge_config(project.path(), Some(home.path())).unwrap();
    let ctx = context(&project, &home, Editor::Vscode);
    let spec = devcontainer::generate(&merged, &ctx).unwrap();

    // Malformed port entry is dropped, valid entries keep their order.
    assert_eq!(spec.forward_ports, Some(vec![3000, 5432]));

    let spec_path;
    {
        let spec_file = SpecFile::write(&spec).unwrap();
        spec_path = spec_file.path().to_path_buf();

        let body = fs::read_to_string(&spec_path).unwrap();
        let reparsed: ContainerSpec = serde_json::from_str(&body).unwrap();
        assert_eq!(reparsed, spec);
        assert_eq!(reparsed.mounts.len(), 2);
        assert_eq!(reparsed.mounts[1].source, "/data");
        assert!(reparsed.post_create_command.ends_with("npm install"));
    }

    // The scoped temporary directory is gone once the handle is dropped.
    assert!(!spec_path.exists());
}

#[test]
fn absent_user_layer_leaves_no_preference_fields() {
    let project = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();

    write_project_config(project.path(), "name: my-web-app\nimage: node:20\n");

    let merged = config::load_and_merge_config(project.path(), Some(home.path())).unwrap();
    assert!(merged.hooks_dir.is_none());
    assert!(merged.dotfiles_dir.is_none());
    assert!(merged.plugins.is_empty());
}

#[test]
fn invalid_project_name_aborts_resolution() {
    let project = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();

    write_project_config(project.path(), "name: \"my app!\"\nimage: node:20\n");

    let err = config::load_and_merge_config(project.path(), Some(home.path())).unwrap_err();
    assert!(err.to_string().contains("contains invalid characters"));
}

#[test]
fn dotfiles_directory_flows_into_mounts_and_commands() {
    let project = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();

    write_project_config(project.path(), "name: my-web-app\nimage: node:20\n");

    let dotfiles_dir = home.path().join(USER_CONFIG_SUBDIR).join("dotfiles");
    fs::create_dir_all(&dotfiles_dir).unwrap();
    fs::write(dotfiles_dir.join(".bashrc"), "# personal\n").unwrap();

    let merged = config::load_and_merge_config(project.path(), Some(home.path())).unwrap();
    assert_eq!(merged.dotfiles_dir.as_ref(), Some(&dotfiles_dir));

    let ctx = context(&project, &home, Editor::Vscode);
    let spec = devcontainer::generate(&merged, &ctx).unwrap();

    let dotfiles_mount = spec.mounts.last().unwrap();
    assert_eq!(dotfiles_mount.source, dotfiles_dir.display().to_string());
    assert_eq!(dotfiles_mount.target, "/tmp/devenv-dotfiles");
    assert!(spec
        .post_create_command
        .contains("cp -r /tmp/devenv-dotfiles/. ~/"));
}
