use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use gpm::engine::EngineType;
use std::path::PathBuf;

mod commands;

/// gpm - npm-style packages for game engine projects
#[derive(Parser)]
#[command(name = "gpm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging (GPM_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a package tarball without publishing
    Pack {
        /// Package directory (defaults to current directory)
        path: Option<PathBuf>,

        /// Directory to write the tarball to (defaults to the package directory)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// List what would be packed without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Print machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Publish a package directory or tarball to the registry
    Publish {
        /// Package directory or .tgz file (defaults to current directory)
        path: Option<PathBuf>,

        /// Pack and validate without uploading
        #[arg(long)]
        dry_run: bool,

        /// Print machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Add a package to the project's engine manifest
    #[command(visible_alias = "add")]
    Install {
        /// Package name, optionally with a version or range (e.g., com.acme.widget@^1.2.0)
        package: String,

        /// Project directory (defaults to current directory)
        #[arg(short, long)]
        project: Option<PathBuf>,

        /// Skip detection and use this engine (unity, unreal, godot, cocos)
        #[arg(short, long)]
        engine: Option<EngineType>,

        /// Print machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Report which game engine a directory belongs to
    Detect {
        /// Project directory (defaults to current directory)
        dir: Option<PathBuf>,

        /// Print machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = gpm::logging::init_logging(cli.verbose) {
        eprintln!("Warning: {}", e);
    }

    let result = match cli.command {
        Commands::Pack {
            path,
            out_dir,
            dry_run,
            json,
        } => commands::pack::run(path, out_dir, dry_run, json),
        Commands::Publish {
            path,
            dry_run,
            json,
        } => commands::publish::run(path, dry_run, json),
        Commands::Install {
            package,
            project,
            engine,
            json,
        } => commands::install::run(package, project, engine, json),
        Commands::Detect { dir, json } => commands::detect::run(dir, json),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "gpm", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
