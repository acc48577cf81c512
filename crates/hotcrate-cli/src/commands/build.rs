//! Build command - bring every unit under the given paths up to date

use anyhow::{Context, Result};
use hotcrate_build::{scan_and_build, BuildConfig, BuildCoordinator, BuildSettings, BuildState};
use hotcrate_config::ConfigLoader;
use std::path::PathBuf;
use tracing::debug;

/// Build command arguments
#[derive(Debug, Default)]
pub struct BuildArgs {
    /// Files or directories; empty means the current directory
    pub paths: Vec<PathBuf>,
    /// Shorthand for `--profile release`
    pub release: bool,
    /// Cargo profile
    pub profile: Option<String>,
    /// Ignore up-to-date artifacts
    pub force: bool,
}

/// Run the build command. Returns whether every unit succeeded.
pub fn run(args: BuildArgs) -> Result<bool> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let config = ConfigLoader::new()
        .load_from_directory(&cwd)
        .context("Failed to load configuration")?;

    let settings = apply_flags(config.build, &args);
    settings.validate().context("Invalid build options")?;

    // release mode only governs loading
    let build_config = BuildConfig::from_settings(&settings).with_release_mode(false);
    debug!("Build configuration: {:?}", build_config);
    let coordinator = BuildCoordinator::new(build_config);

    let roots: Vec<PathBuf> = if args.paths.is_empty() {
        vec![cwd.clone()]
    } else {
        args.paths.iter().map(|p| cwd.join(p)).collect()
    };

    let report = scan_and_build(&roots, &coordinator);

    for entry in report.entries() {
        let path = entry.path.strip_prefix(&cwd).unwrap_or(&entry.path);
        match &entry.result {
            Ok(outcome) if outcome.state == BuildState::Built => {
                if !outcome.diagnostics.is_empty() {
                    eprint!("{}", outcome.diagnostics);
                }
                println!(
                    "{:>8} {} ({:.2}s)",
                    "Built",
                    path.display(),
                    outcome.elapsed.as_secs_f64()
                );
            }
            Ok(_) => println!("{:>8} {}", "Fresh", path.display()),
            Err(e) => eprintln!("{:>8} {}: {}", "Failed", path.display(), e),
        }
    }

    if report.entries().is_empty() {
        println!("No opted-in units found");
    }

    Ok(report.is_success())
}

/// CLI flags override configuration
fn apply_flags(mut settings: BuildSettings, args: &BuildArgs) -> BuildSettings {
    if args.force {
        settings.force_rebuild = Some(true);
    }
    if args.release {
        settings.profile = Some("release".to_string());
    } else if let Some(profile) = &args.profile {
        settings.profile = Some(profile.clone());
    }
    settings
}
