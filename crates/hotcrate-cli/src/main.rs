use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

/// Build Rust source files and crates into loadable dynamic libraries.
///
/// Units opt in with a `// hotcrate` first line (single files) or a
/// `.hotcrate` marker file (crates). Artifacts are written next to the unit
/// and only rebuilt when a tracked source changes.
///
/// EXAMPLES:
///     hotcrate build                  Build every opted-in unit below `.`
///     hotcrate build fast.rs -r       Build one file with the release profile
///     hotcrate new fast_math.rs       Create a single-file pyo3 extension
///     hotcrate new native             Create a crate
///
/// ENVIRONMENT VARIABLES:
///     HOTCRATE_FORCE_REBUILD       Rebuild even when up to date
///     HOTCRATE_RELEASE_MODE        Hosts load existing artifacts without building
///     HOTCRATE_PROFILE             Cargo profile to build with
///     HOTCRATE_RELEASE_BINARIES    Shorthand for HOTCRATE_PROFILE=release
///     HOTCRATE_CACHE_DIR           Where staging crates are kept
///     HOTCRATE_CARGO_EXECUTABLE    Cargo binary to run
///     HOTCRATE_EXTENSION_SUFFIX    Suffix of built artifacts
///     RUST_LOG                     Log filter (overrides -v/-q)
#[derive(Parser)]
#[command(name = "hotcrate")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Debug logging
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Errors only
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build source files and crates
    ///
    /// Directories are walked recursively for opted-in units; files named
    /// explicitly are built even without a marker.
    #[command(visible_alias = "b")]
    Build {
        /// Files or directories to build (default: current directory)
        paths: Vec<PathBuf>,
        /// Build with cargo's release profile
        #[arg(long, short = 'r', conflicts_with = "profile")]
        release: bool,
        /// Cargo profile to build with
        #[arg(long, short = 'p')]
        profile: Option<String>,
        /// Rebuild even if the artifact is up to date
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Create a new unit
    ///
    /// A name ending in `.rs` creates a single-file extension, anything else
    /// a crate directory.
    New {
        /// Name of the file or crate to create
        name: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Build {
            paths,
            release,
            profile,
            force,
        } => {
            let args = commands::build::BuildArgs {
                paths,
                release,
                profile,
                force,
            };
            if !commands::build::run(args)? {
                std::process::exit(1);
            }
        }
        Commands::New { name } => {
            let cwd = std::env::current_dir()?;
            let created = commands::new::run(&name, &cwd)?;
            println!("Created {}", created.display());
        }
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `-v`/`-q` pick the level
fn init_tracing(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
