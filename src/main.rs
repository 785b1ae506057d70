use clap::{Parser, Subcommand};

use devenv::cli;
use devenv::devcontainer::Editor;

#[derive(Parser)]
#[command(author, version, about = "Manage ephemeral, branch-scoped Dev Container environments")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new devenv project configuration
    Init {
        /// Overwrite an existing configuration without asking
        #[arg(long)]
        force: bool,

        /// Port mapping to expose, e.g. 3000:3000 (repeatable)
        #[arg(long = "port", value_name = "PORT")]
        ports: Vec<String>,
    },
    /// Create a dev container for the given branch
    Create {
        /// Git branch the container is scoped to
        branch: String,

        /// Comma-separated list of modules to enable
        #[arg(long, value_delimiter = ',')]
        modules: Vec<String>,

        /// IDE to prepare the container for
        #[arg(long, value_enum, default_value_t = Editor::Vscode)]
        editor: Editor,

        /// Override the configured port mappings for this container
        #[arg(long, value_delimiter = ',')]
        ports: Vec<String>,
    },
    /// Connect to the existing container for the given branch
    Switch {
        branch: String,

        /// IDE to print connection instructions for (defaults to the
        /// editor the container was created with)
        #[arg(long, value_enum)]
        editor: Option<Editor>,
    },
    /// List all managed containers
    List,
    /// Stop and remove the container for the given branch
    Rm {
        branch: String,

        /// Also remove anonymous volumes
        #[arg(long)]
        volumes: bool,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
    /// List the available module catalog
    Modules,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Cli::parse();

    let result = match args.command {
        Commands::Init { force, ports } => cli::run_init(force, ports),
        Commands::Create {
            branch,
            modules,
            editor,
            ports,
        } => cli::run_create(branch, modules, editor, ports).await,
        Commands::Switch { branch, editor } => cli::run_switch(branch, editor).await,
        Commands::List => cli::run_list().await,
        Commands::Rm {
            branch,
            volumes,
            force,
        } => cli::run_rm(branch, volumes, force).await,
        Commands::Modules => cli::run_modules(),
    };

    if let Err(error) = result {
        eprintln!("Error: {}", error);
        std::process::exit(1);
    }
}
