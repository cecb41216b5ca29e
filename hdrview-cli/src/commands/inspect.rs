//! Inspect command - load files in the background and describe them.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use console::style;
use hdrview::background::BackgroundLoader;
use hdrview::executor::ThreadPool;
use hdrview::loader::ImageLoaders;
use tracing::warn;

use super::common::{resolve_selector_mode, GlobalArgs, Session};
use crate::error::CliError;

/// How long to wait for a load before re-checking for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Arguments for the inspect command.
pub struct InspectArgs {
    pub files: Vec<PathBuf>,
    pub channels: String,
    pub regex: bool,
    pub threads: Option<usize>,
}

/// Run the inspect command.
pub fn run(global: &GlobalArgs, args: InspectArgs) -> Result<(), CliError> {
    let session = Session::start(global)?;
    let config = &session.config;

    let mut pool_config = config.executor.pool_config();
    if let Some(threads) = args.threads {
        pool_config = pool_config.with_num_threads(threads);
    }
    let pool = ThreadPool::with_config(pool_config);

    let loaders =
        ImageLoaders::new().with_selector_mode(resolve_selector_mode(args.regex, config));
    let loader = BackgroundLoader::new(pool.scheduler(), loaders);

    // The first file becomes the selection, as a viewer would show it first
    let mut outstanding: BTreeSet<u64> = args
        .files
        .iter()
        .enumerate()
        .map(|(i, file)| loader.enqueue(file, &args.channels, i == 0))
        .collect();

    loop {
        if let Some(load) = loader.pop_timeout(POLL_INTERVAL) {
            outstanding.remove(&load.load_id);
            for image in &load.images {
                println!("{}", style(format!("[{}]", load.load_id)).dim());
                println!("{}", image);
                println!();
            }
        } else if loader.is_idle() && loader.num_ready() == 0 {
            break;
        }
    }

    for load_id in &outstanding {
        if let Some(file) = args.files.get(*load_id as usize) {
            warn!(load_id, path = %file.display(), "Load failed");
            eprintln!("{} {}", style("failed:").yellow().bold(), file.display());
        }
    }

    if outstanding.is_empty() {
        Ok(())
    } else {
        Err(CliError::LoadFailed {
            failed: outstanding.len(),
            total: args.files.len(),
        })
    }
}
