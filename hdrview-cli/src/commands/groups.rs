//! Groups command - print the channel groups inferred for an image.

use std::path::PathBuf;

use console::style;
use hdrview::executor::{Priority, ThreadPool};
use hdrview::loader::ImageLoaders;

use super::common::{resolve_selector_mode, GlobalArgs, Session};
use crate::error::CliError;

/// Arguments for the groups command.
pub struct GroupsArgs {
    pub file: PathBuf,
    pub channels: String,
    pub regex: bool,
}

/// Run the groups command.
pub fn run(global: &GlobalArgs, args: GroupsArgs) -> Result<(), CliError> {
    let session = Session::start(global)?;
    let config = &session.config;

    let pool = ThreadPool::with_config(config.executor.pool_config());
    let loaders =
        ImageLoaders::new().with_selector_mode(resolve_selector_mode(args.regex, config));

    let images = loaders.try_load_path(
        &pool.scheduler(),
        &args.file,
        &args.channels,
        Priority::FOREGROUND,
    );
    if images.is_empty() {
        return Err(CliError::LoadFailed {
            failed: 1,
            total: 1,
        });
    }

    for image in &images {
        println!("{}", style(image.name()).bold());
        for group in image.channel_groups() {
            println!(
                "  {:<24} {}",
                style(&group.name).cyan(),
                group.channels.join(", ")
            );
        }
    }

    Ok(())
}
