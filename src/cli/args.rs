//! CLI argument definitions using clap derive

use crate::pipeline::DEFAULT_COMPILE_JOBS;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// protopin - version-pinned protoc builds
///
/// Resolves the configuration governing each proto file, installs the exact
/// protoc/plugin/repository versions it pins, and compiles.
#[derive(Parser, Debug)]
#[command(name = "protopin")]
#[command(author, version, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Artifact store directory
    #[arg(long, global = true, env = "PROTOPIN_HOME")]
    pub store: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile proto files
    Build(BuildArgs),

    /// Pin symbolic "latest" versions in configurations to concrete ones
    Tidy(TidyArgs),
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Proto file, or directory of proto files, to compile
    pub target: PathBuf,

    /// Recurse into sub directories when the target is a directory
    #[arg(short, long)]
    pub recursive: bool,

    /// Run post actions and the post shell after a successful compile
    #[arg(short = 'a', long = "post-scripts")]
    pub post_scripts: bool,

    /// Log external commands instead of executing them
    #[arg(long)]
    pub dry_run: bool,

    /// Concurrent compiler invocations
    #[arg(short, long, default_value_t = DEFAULT_COMPILE_JOBS)]
    pub jobs: usize,
}

/// Arguments for the tidy command
#[derive(Parser, Debug)]
pub struct TidyArgs {
    /// Proto file, or directory of proto files, whose configurations to pin
    pub target: PathBuf,

    /// Recurse into sub directories when the target is a directory
    #[arg(short, long)]
    pub recursive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_build_flags() {
        let cli = Cli::try_parse_from(["protopin", "build", "-r", "-a", "-j", "4", "protos"]).unwrap();
        match cli.command {
            Commands::Build(args) => {
                assert!(args.recursive);
                assert!(args.post_scripts);
                assert!(!args.dry_run);
                assert_eq!(args.jobs, 4);
                assert_eq!(args.target, PathBuf::from("protos"));
            }
            other => panic!("expected build, got {:?}", other),
        }
    }

    #[test]
    fn jobs_defaults_to_pool_width() {
        let cli = Cli::try_parse_from(["protopin", "build", "x.proto"]).unwrap();
        match cli.command {
            Commands::Build(args) => assert_eq!(args.jobs, DEFAULT_COMPILE_JOBS),
            other => panic!("expected build, got {:?}", other),
        }
    }

    #[test]
    fn parses_tidy() {
        let cli = Cli::try_parse_from(["protopin", "-v", "tidy", "-r", "."]).unwrap();
        assert_eq!(cli.verbose, 1);
        assert!(matches!(cli.command, Commands::Tidy(_)));
    }
}
