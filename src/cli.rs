//! CLI argument parsing for wendeploy

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use wendeploy::builder::BUILD_CONFIG_FILE;
use wendeploy::core::Os;

#[derive(Parser)]
#[command(name = "wendeploy")]
#[command(author = "wen")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Manifest-driven content deployment", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy a package manifest into an install directory
    #[command(visible_alias = "d")]
    Deploy {
        /// Manifest location (http(s) URL, file:// URL or local path)
        manifest: String,

        /// Install directory (overrides install_dir from the config)
        #[arg(short, long)]
        dest: Option<PathBuf>,

        /// Select an optional component (repeatable)
        #[arg(short, long = "component", value_name = "ID")]
        components: Vec<String>,

        /// Deselect a component (repeatable)
        #[arg(short, long, value_name = "ID")]
        without: Vec<String>,

        /// Deploy as if running on this OS
        #[arg(long)]
        os: Option<Os>,

        /// Keep files of artifacts that left the manifest
        #[arg(long)]
        keep_orphans: bool,
    },

    /// Build a package from a source directory
    #[command(visible_alias = "b")]
    Build {
        /// Build configuration file
        #[arg(short, long, default_value = BUILD_CONFIG_FILE)]
        file: PathBuf,

        /// Source directory (defaults to the directory of the build file)
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = "dist")]
        out: PathBuf,
    },

    /// Print the content signature of files
    #[command(visible_alias = "sig")]
    Signature {
        /// Files to sign
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Remove every deployed file and the deployment state
    Clean {
        /// Install directory
        #[arg(short, long)]
        dest: Option<PathBuf>,

        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Show the deployment state of an install directory
    #[command(visible_alias = "st")]
    Status {
        /// Install directory
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },

    /// Create a default configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_deploy() {
        let cli = Cli::try_parse_from([
            "wendeploy",
            "deploy",
            "https://cdn.example.com/demo/manifest.json",
            "--dest",
            "/opt/demo",
            "-c",
            "hd",
            "--without",
            "music",
            "--os",
            "windows",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Deploy {
                manifest,
                dest,
                components,
                without,
                os,
                keep_orphans,
            } => {
                assert_eq!(manifest, "https://cdn.example.com/demo/manifest.json");
                assert_eq!(dest, Some(PathBuf::from("/opt/demo")));
                assert_eq!(components, vec!["hd"]);
                assert_eq!(without, vec!["music"]);
                assert_eq!(os, Some(Os::Windows));
                assert!(!keep_orphans);
            }
            _ => panic!("expected deploy"),
        }
    }

    #[test]
    fn test_build_defaults() {
        let cli = Cli::try_parse_from(["wendeploy", "build"]).unwrap();
        match cli.command {
            Commands::Build { file, source, out } => {
                assert_eq!(file, PathBuf::from(BUILD_CONFIG_FILE));
                assert!(source.is_none());
                assert_eq!(out, PathBuf::from("dist"));
            }
            _ => panic!("expected build"),
        }
    }
}
