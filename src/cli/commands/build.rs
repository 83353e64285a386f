//! The build command: discover targets, run the pipeline

use crate::cli::args::BuildArgs;
use crate::compile::absolutize;
use crate::error::{ProtopinError, ProtopinResult};
use crate::fsx;
use crate::pipeline::{BuildOptions, Pipeline};
use crate::store::ArtifactStore;
use console::style;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Execute the build command
pub async fn execute(args: BuildArgs, store: ArtifactStore) -> ProtopinResult<()> {
    let targets = discover_targets(&args.target, args.recursive)?;
    if targets.is_empty() {
        warn!(target = %args.target.display(), "no proto files found");
        return Ok(());
    }
    info!(count = targets.len(), "discovered proto files");

    if args.dry_run {
        warn!("running in dry-run mode; external commands are logged, not executed");
    }

    let options = BuildOptions {
        jobs: args.jobs.max(1),
        run_post_steps: args.post_scripts,
        dry_run: args.dry_run,
    };
    Pipeline::new(store, options).run(&targets).await?;

    println!("{} compiled {} proto file(s)", style("✓").green(), targets.len());
    Ok(())
}

/// Expand a dir-or-file target into the list of proto files to compile,
/// as absolute paths
pub(crate) fn discover_targets(target: &Path, recursive: bool) -> ProtopinResult<Vec<PathBuf>> {
    let cwd = std::env::current_dir()
        .map_err(|e| ProtopinError::io("getting current directory", e))?;
    let target = absolutize(target, &cwd);
    let meta = std::fs::metadata(&target)
        .map_err(|e| ProtopinError::io(format!("stat {}", target.display()), e))?;
    if !meta.is_dir() {
        return Ok(vec![target]);
    }
    if recursive {
        fsx::files_with_ext_recursive(&target, "proto")
    } else {
        fsx::files_with_ext(&target, "proto")
    }
}
