//! `tunebox` — query a music library and hand the results to a player.
//!
//! Subcommands:
//! - `import`: scan directories into the library database
//! - `ls`: list matching tracks or albums
//! - `play`: send matches to the configured player
//! - `config`: show the effective configuration

mod cli;
mod commands;
mod config;
mod error;
mod format;
mod play;
mod ui;

use std::io::Write;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tunebox_library::{Library, Sort};

use crate::cli::{Args, Commands};
use crate::commands::ListStyle;
use crate::config::{Config, LoadedConfig};
use crate::play::{PlayOptions, Player, ProcessLauncher};
use crate::ui::{ColorName, Term};

fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "warn,tunebox=debug,tunebox_library=debug"
    } else {
        "warn,tunebox=info,tunebox_library=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let msg = match error::as_user_error(&err) {
                Some(user) => format!("error: {user}"),
                None => format!("error: {err:#}"),
            };
            eprintln!("{}", Term::new(true).colorize(ColorName::TextError, &msg));
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let loaded = Config::resolve(args.config.as_deref())?;
    let term = Term::new(loaded.config.ui.color);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match args.command {
        Commands::Config { path } => commands::show_config(&loaded, path, &mut out),
        Commands::Import { paths } => {
            let lib = open_library(&loaded, args.library.as_deref())?;
            commands::import(&lib, &loaded.config, &paths, &term, &mut out)?;
            Ok(())
        }
        Commands::List {
            album,
            format,
            path,
            query,
        } => {
            let lib = open_library(&loaded, args.library.as_deref())?;
            let style = match (path, format.as_deref()) {
                (true, _) => ListStyle::Path,
                (false, Some(template)) => ListStyle::Template(template),
                (false, None) if album => ListStyle::Template(&loaded.config.format_album),
                (false, None) => ListStyle::Template(&loaded.config.format_item),
            };
            commands::list(&lib, &query, album, style, &mut out)?;
            Ok(())
        }
        Commands::Play {
            album,
            args: extra,
            yes,
            query,
        } => {
            let lib = open_library(&loaded, args.library.as_deref())?;
            let opts = PlayOptions {
                query: &query,
                album,
                args: extra.as_deref(),
                yes,
            };
            let stdin = std::io::stdin();
            let mut input = stdin.lock();
            let mut player = Player::new(&loaded.config.play, term, ProcessLauncher);
            let outcome = player.play_query(&lib, &opts, &mut input, &mut out)?;
            tracing::debug!(?outcome, "play finished");
            out.flush()?;
            Ok(())
        }
    }
}

fn open_library(loaded: &LoadedConfig, explicit: Option<&std::path::Path>) -> Result<Library> {
    let path = match explicit {
        Some(path) => config::expand_home(path),
        None => loaded.config.library_path()?,
    };
    let lib = Library::open(&path)?.with_default_sorts(
        Sort::parse(&loaded.config.sort_item),
        Sort::parse(&loaded.config.sort_album),
    );
    Ok(lib)
}
