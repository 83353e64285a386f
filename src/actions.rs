//! Post-build actions and the post shell
//!
//! Actions run after a successful compile, once per matched configuration.
//! All action paths are relative to the configuration's directory; absolute
//! arguments are rejected.

use crate::config::ConfigItem;
use crate::error::{ProtopinError, ProtopinResult};
use crate::exec::{CommandRequest, Executor};
use crate::fsx;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Execute every declared post action of `item`, in order
pub fn execute_post_actions(item: &ConfigItem, dry_run: bool) -> ProtopinResult<()> {
    for action in &item.config().post_actions {
        run_action(item, &action.name, &action.args, dry_run).map_err(|e| match e {
            err @ (ProtopinError::UnknownAction(_) | ProtopinError::AbsoluteActionPath { .. }) => err,
            other => ProtopinError::ActionFailed {
                name: action.name.clone(),
                config: item.path().to_path_buf(),
                reason: other.to_string(),
            },
        })?;
    }
    Ok(())
}

/// Execute the post shell of `item`, if any, in the configuration's directory
pub async fn execute_post_shell(item: &ConfigItem, executor: &dyn Executor) -> ProtopinResult<()> {
    let script = &item.config().post_shell;
    if script.is_empty() {
        return Ok(());
    }
    info!(config = %item.path().display(), "running post shell");
    executor
        .execute(CommandRequest::new("sh", ["-c", script.as_str()]).dir(item.dir()))
        .await?;
    Ok(())
}

fn run_action(item: &ConfigItem, name: &str, args: &[String], dry_run: bool) -> ProtopinResult<()> {
    match name {
        "move" => action_move(item, args, dry_run, true),
        "copy" => action_move(item, args, dry_run, false),
        "remove" => action_remove(item, args, dry_run),
        "replace" => action_replace(item, args, dry_run),
        other => Err(ProtopinError::UnknownAction(other.to_string())),
    }
}

/// `move`/`copy`: (source, destination), both relative to the config dir
fn action_move(
    item: &ConfigItem,
    args: &[String],
    dry_run: bool,
    remove_source: bool,
) -> ProtopinResult<()> {
    let action = if remove_source { "move" } else { "copy" };
    let [source, destination] = require_args::<2>(action, args)?;
    let from = relative_to_config(action, item, source)?;
    let to = relative_to_config(action, item, destination)?;

    if dry_run {
        info!(action, from = %from.display(), to = %to.display(), "dry run");
        return Ok(());
    }
    debug!(action, from = %from.display(), to = %to.display(), "executing action");

    if fsx::is_dir(&from) {
        fsx::copy_dir_merge(&from, &to)?;
    } else {
        fsx::copy_file(&from, &to)?;
    }
    if remove_source {
        std::fs::remove_dir_all(&from)
            .or_else(|_| std::fs::remove_file(&from))
            .map_err(|e| ProtopinError::io(format!("removing {}", from.display()), e))?;
    }
    Ok(())
}

/// `remove`: (path...), each relative to the config dir
fn action_remove(item: &ConfigItem, args: &[String], dry_run: bool) -> ProtopinResult<()> {
    for arg in args {
        let target = relative_to_config("remove", item, arg)?;
        if dry_run {
            info!(action = "remove", target = %target.display(), "dry run");
            continue;
        }
        debug!(action = "remove", target = %target.display(), "executing action");
        if target.exists() {
            std::fs::remove_dir_all(&target)
                .or_else(|_| std::fs::remove_file(&target))
                .map_err(|e| ProtopinError::io(format!("removing {}", target.display()), e))?;
        }
    }
    Ok(())
}

/// `replace`: (pattern, from, to) — glob-matched text replacement under the
/// config dir
fn action_replace(item: &ConfigItem, args: &[String], dry_run: bool) -> ProtopinResult<()> {
    let [pattern, from, to] = require_args::<3>("replace", args)?;
    if pattern.is_empty() || from.is_empty() {
        return Err(ProtopinError::Internal(
            "replace pattern and from must not be empty".to_string(),
        ));
    }
    let full_pattern = relative_to_config("replace", item, pattern)?;
    let matcher = glob::Pattern::new(&full_pattern.display().to_string())
        .map_err(|e| ProtopinError::Internal(format!("bad replace pattern: {e}")))?;

    for file in fsx::all_files_recursive(item.dir())? {
        if !matcher.matches_path(&file) {
            continue;
        }
        if dry_run {
            info!(action = "replace", file = %file.display(), "dry run");
            continue;
        }
        debug!(action = "replace", file = %file.display(), "executing action");
        let content = std::fs::read_to_string(&file)
            .map_err(|e| ProtopinError::io(format!("reading {}", file.display()), e))?;
        std::fs::write(&file, content.replace(from, to))
            .map_err(|e| ProtopinError::io(format!("writing {}", file.display()), e))?;
    }
    Ok(())
}

fn require_args<'a, const N: usize>(
    action: &str,
    args: &'a [String],
) -> ProtopinResult<[&'a str; N]> {
    if args.len() != N || args.iter().any(|a| a.is_empty()) {
        return Err(ProtopinError::Internal(format!(
            "action {action} expects {N} non-empty arguments, got {}",
            args.len()
        )));
    }
    let mut out = [""; N];
    for (slot, arg) in out.iter_mut().zip(args) {
        *slot = arg.as_str();
    }
    Ok(out)
}

fn relative_to_config(action: &str, item: &ConfigItem, arg: &str) -> ProtopinResult<PathBuf> {
    if Path::new(arg).is_absolute() {
        return Err(ProtopinError::AbsoluteActionPath {
            action: action.to_string(),
            path: arg.to_string(),
        });
    }
    Ok(fsx::clean_path(&item.dir().join(arg)))
}
