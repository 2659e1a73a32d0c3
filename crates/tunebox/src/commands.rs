//! Subcommand implementations other than `play`.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tunebox_library::queryparse::parse_sorted_query;
use tunebox_library::scan::{ImportSummary, import_directory};
use tunebox_library::{Album, Item, Library};

use crate::config::{Config, LoadedConfig};
use crate::error::{UserError, invalid_query};
use crate::format::render;
use crate::ui::{ColorName, Term};

/// Import each directory in `paths`, or the configured music directory.
pub fn import<W: Write>(
    lib: &Library,
    config: &Config,
    paths: &[PathBuf],
    term: &Term,
    out: &mut W,
) -> Result<ImportSummary> {
    let roots = if paths.is_empty() {
        match config.music_directory() {
            Some(dir) => vec![dir],
            None => {
                return Err(UserError::new(
                    "no directory given and no `directory` set in the config",
                )
                .into());
            }
        }
    } else {
        paths.to_vec()
    };

    let mut total = ImportSummary::default();
    for root in &roots {
        if !root.is_dir() {
            return Err(UserError::new(format!("not a directory: {}", root.display())).into());
        }
        let summary = import_directory(lib, root)
            .with_context(|| format!("import {}", root.display()))?;
        total.added += summary.added;
        total.updated += summary.updated;
        total.albums_created += summary.albums_created;
    }

    let msg = format!(
        "Imported {} tracks ({} new albums).",
        total.tracks(),
        total.albums_created
    );
    writeln!(out, "{}", term.colorize(ColorName::TextSuccess, &msg))?;
    Ok(total)
}

/// How `list` prints each match.
#[derive(Clone, Copy, Debug)]
pub enum ListStyle<'a> {
    Template(&'a str),
    Path,
}

/// Print tracks or albums matching `query`; returns the number printed.
pub fn list<W: Write>(
    lib: &Library,
    query: &[String],
    album: bool,
    style: ListStyle<'_>,
    out: &mut W,
) -> Result<usize> {
    if album {
        let (query, sort) = parse_sorted_query(&Album::SCHEMA, query).map_err(invalid_query)?;
        let albums = lib.albums(&query, sort.as_ref())?;
        for album in &albums {
            match style {
                ListStyle::Template(template) => writeln!(out, "{}", render(template, album))?,
                ListStyle::Path => {
                    if let Some(dir) = album.item_dir(lib)? {
                        writeln!(out, "{}", dir.display())?;
                    }
                }
            }
        }
        Ok(albums.len())
    } else {
        let (query, sort) = parse_sorted_query(&Item::SCHEMA, query).map_err(invalid_query)?;
        let items = lib.items(&query, sort.as_ref())?;
        for item in &items {
            match style {
                ListStyle::Template(template) => writeln!(out, "{}", render(template, item))?,
                ListStyle::Path => writeln!(out, "{}", item.path.display())?,
            }
        }
        Ok(items.len())
    }
}

/// Print the config file location, or the effective configuration as TOML.
pub fn show_config<W: Write>(loaded: &LoadedConfig, path_only: bool, out: &mut W) -> Result<()> {
    if path_only {
        match loaded.path.as_deref() {
            Some(path) => writeln!(out, "{}", path.display())?,
            None => return Err(UserError::new("cannot determine a config file location").into()),
        }
        return Ok(());
    }
    match (&loaded.path, loaded.from_file) {
        (Some(path), true) => writeln!(out, "# {}", path.display())?,
        _ => writeln!(out, "# defaults (no config file)")?,
    }
    write!(out, "{}", loaded.config.to_toml()?)?;
    Ok(())
}
