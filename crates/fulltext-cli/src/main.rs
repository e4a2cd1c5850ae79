mod args;

use args::{CliArgs, Command};
use clap::Parser;
use fulltext_core::{
    DbHealthChecker, Error, FullTextSearcher, IndexStore, SearchConfig, SearchEvent, log,
};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use tracing::info;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let mut config = match &args.config {
        Some(path) => SearchConfig::load(path)?,
        None => SearchConfig::default(),
    };
    if let Some(index_dir) = args.index_dir {
        config.index_dir = index_dir;
    }

    let _log_guard = match &args.log_file {
        Some(path) => Some(log::init_tracing(path, &args.log_level)?),
        None => None,
    };

    match args.command {
        Command::Index { root, if_missing } => index(&config, &root, if_missing),
        Command::Search { target, keyword } => search(&config, target, keyword.join(" ")),
        Command::Stats => stats(&config),
    }
}

/// Ctrl-C stops the running operation at its next checkpoint.
fn stop_on_interrupt(searcher: &Arc<FullTextSearcher>) -> Result<(), ctrlc::Error> {
    let searcher = Arc::clone(searcher);
    ctrlc::set_handler(move || {
        eprintln!("Interrupted, stopping...");
        searcher.stop();
    })
}

fn index(
    config: &SearchConfig,
    root: &str,
    if_missing: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let searcher = Arc::new(FullTextSearcher::open(config)?);
    stop_on_interrupt(&searcher)?;

    let stats = if if_missing {
        searcher.ensure_index(root)?
    } else {
        Some(searcher.create_index(root)?)
    };

    let dir = searcher.store().dir().display();
    match stats {
        Some(stats) => println!(
            "indexed {} files ({} added, {} failed) into {dir}",
            stats.visited, stats.added, stats.failed
        ),
        None => println!("index already exists at {dir}"),
    }
    Ok(())
}

fn search(
    config: &SearchConfig,
    target: String,
    keyword: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, rx) = mpsc::channel();
    let searcher = Arc::new(FullTextSearcher::open(config)?.with_notifier(tx));
    stop_on_interrupt(&searcher)?;

    info!(search_target = %target, %keyword, "Searching");
    let handle = searcher.spawn_search(target, keyword);

    let mut printed = 0usize;
    let mut print_available = || {
        for url in searcher.take_all() {
            println!("{url}");
            printed += 1;
        }
    };

    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(SearchEvent::Finished) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(SearchEvent::ResultsAvailable) => print_available(),
            // rejected requests end without `Finished`
            Err(RecvTimeoutError::Timeout) if handle.is_finished() => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    handle.join().map_err(|_| Error::ThreadPanic)??;
    print_available();

    eprintln!("{printed} results ({:?})", searcher.status());
    Ok(())
}

fn stats(config: &SearchConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = IndexStore::open(&config.index_dir, config.map_size)?;
    print!("{}", store.get_health()?);
    Ok(())
}
