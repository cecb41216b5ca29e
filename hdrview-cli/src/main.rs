//! hdrview CLI - inspect HDR and multi-layer images
//!
//! ```text
//! hdrview inspect render.exr beauty.pfm -c R,G,B
//! hdrview groups render.exr
//! ```

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;

use commands::common::GlobalArgs;
use commands::{groups, inspect};
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "hdrview", version, about = "Inspect HDR and multi-layer images")]
struct Cli {
    /// Path to the configuration file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log at debug level (overrides the configured level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load images in the background and describe each one in request order
    Inspect {
        /// Image files to load
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Comma-separated channel selector, e.g. "R,G,B" or "diffuse"
        #[arg(short, long, default_value = "")]
        channels: String,

        /// Interpret the selector as regular expressions
        #[arg(long)]
        regex: bool,

        /// Worker threads (0 = one per core; defaults to the config file)
        #[arg(short = 'j', long)]
        threads: Option<usize>,
    },

    /// Print the channel groups inferred for an image
    Groups {
        /// Image file to load
        file: PathBuf,

        /// Comma-separated channel selector
        #[arg(short, long, default_value = "")]
        channels: String,

        /// Interpret the selector as regular expressions
        #[arg(long)]
        regex: bool,
    },
}

fn run(cli: Cli) -> Result<(), CliError> {
    let global = GlobalArgs {
        config: cli.config,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Inspect {
            files,
            channels,
            regex,
            threads,
        } => inspect::run(
            &global,
            inspect::InspectArgs {
                files,
                channels,
                regex,
                threads,
            },
        ),
        Commands::Groups {
            file,
            channels,
            regex,
        } => groups::run(
            &global,
            groups::GroupsArgs {
                file,
                channels,
                regex,
            },
        ),
    }
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_inspect() {
        let cli = Cli::try_parse_from([
            "hdrview", "inspect", "a.pfm", "b.png", "-c", "R,G", "--regex", "-j", "3", "--verbose",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Inspect {
                files,
                channels,
                regex,
                threads,
            } => {
                assert_eq!(files.len(), 2);
                assert_eq!(channels, "R,G");
                assert!(regex);
                assert_eq!(threads, Some(3));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_inspect_requires_files() {
        assert!(Cli::try_parse_from(["hdrview", "inspect"]).is_err());
    }
}
