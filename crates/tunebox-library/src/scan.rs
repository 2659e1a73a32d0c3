//! Directory scanning and import.
//!
//! Walks a music directory, probes tags with Symphonia, and records items and
//! albums in the library.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::Hint;

use crate::db::{Library, UpsertOutcome};
use crate::model::{Album, Item};

/// Album artist recorded for compilations.
pub const VARIOUS_ARTISTS: &str = "Various Artists";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackMeta {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub year: Option<i32>,
    pub compilation: bool,
    /// Duration in seconds.
    pub length: Option<f64>,
    pub format: Option<String>,
}

/// Counts reported by [`import_directory`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: usize,
    pub updated: usize,
    pub albums_created: usize,
}

impl ImportSummary {
    pub fn tracks(&self) -> usize {
        self.added + self.updated
    }
}

pub fn is_supported_extension(ext: &str) -> bool {
    matches!(
        ext,
        "flac" | "wav" | "aiff" | "aif" | "mp3" | "m4a" | "aac" | "alac" | "ogg" | "oga" | "opus"
    )
}

/// Walk `root` recursively and call `on_track` for every audio file, in name order.
///
/// Returns the number of tracks visited.
pub fn scan_directory<F>(root: &Path, mut on_track: F) -> Result<usize>
where
    F: FnMut(&Path, &TrackMeta, &fs::Metadata) -> Result<()>,
{
    let root = root
        .canonicalize()
        .with_context(|| format!("canonicalize root {:?}", root))?;
    if !root.is_dir() {
        return Err(anyhow::anyhow!("root is not a directory: {:?}", root));
    }

    tracing::info!(root = %root.display(), "scanning directory");
    let mut count = 0;
    let mut visited = HashSet::from([root.clone()]);
    scan_dir(&root, &root, &mut on_track, &mut visited, &mut count)?;
    tracing::info!(root = %root.display(), tracks = count, "scan complete");
    Ok(count)
}

fn scan_dir<F>(
    root: &Path,
    dir: &Path,
    on_track: &mut F,
    visited: &mut HashSet<PathBuf>,
    count: &mut usize,
) -> Result<()>
where
    F: FnMut(&Path, &TrackMeta, &fs::Metadata) -> Result<()>,
{
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("read_dir {:?}", dir))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .context("read_dir entry")?;
    entries.sort_by_key(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
    });

    for path in entries {
        if path.is_dir() {
            let canon = path
                .canonicalize()
                .with_context(|| format!("canonicalize {:?}", path))?;
            // Symlinks leading outside the root are not followed.
            if !canon.starts_with(root) {
                continue;
            }
            if !visited.insert(canon.clone()) {
                tracing::debug!(path = %path.display(), "directory already scanned");
                continue;
            }
            scan_dir(root, &canon, on_track, visited, count)?;
            continue;
        }
        if !path.is_file() {
            continue;
        }
        let ext = extension_of(&path);
        if !is_supported_extension(&ext) {
            continue;
        }
        let fs_meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable file");
                continue;
            }
        };
        let meta = probe_track_meta(&path, &ext);
        on_track(&path, &meta, &fs_meta)?;
        *count += 1;
    }
    Ok(())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(OsStr::to_str)
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Probe a single file's tags; unsupported extensions are an error.
pub fn probe_track(path: &Path) -> Result<TrackMeta> {
    let ext = extension_of(path);
    if !is_supported_extension(&ext) {
        return Err(anyhow::anyhow!("unsupported extension: {:?}", path));
    }
    Ok(probe_track_meta(path, &ext))
}

/// Read tags and duration. Files Symphonia cannot open still get a format and title.
fn probe_track_meta(path: &Path, ext_hint: &str) -> TrackMeta {
    let mut meta = TrackMeta {
        format: (!ext_hint.is_empty()).then(|| ext_hint.to_ascii_uppercase()),
        ..TrackMeta::default()
    };
    read_tags(path, ext_hint, &mut meta);
    fill_defaults(path, &mut meta);
    meta
}

fn fill_defaults(path: &Path, meta: &mut TrackMeta) {
    if meta.title.is_none() {
        meta.title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());
    }
    if meta.compilation {
        meta.album_artist = Some(VARIOUS_ARTISTS.to_string());
    } else if meta.album_artist.is_none() {
        meta.album_artist = meta.artist.clone();
    }
}

fn read_tags(path: &Path, ext_hint: &str, meta: &mut TrackMeta) {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return,
    };
    let mut hint = Hint::new();
    if !ext_hint.is_empty() {
        hint.with_extension(ext_hint);
    }

    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut probed = match symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    ) {
        Ok(probed) => probed,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "no readable tags");
            return;
        }
    };

    if let Some(track) = probed.format.default_track() {
        let params = &track.codec_params;
        if let (Some(frames), Some(rate)) = (params.n_frames, params.sample_rate) {
            if rate > 0 {
                meta.length = Some(frames as f64 / rate as f64);
            }
        }
    }

    if let Some(rev) = probed.format.metadata().current() {
        apply_revision(rev, meta);
    }
    // Some formats (ID3v2 on MP3) surface their tags during probing instead.
    if let Some(probe_meta) = probed.metadata.get() {
        if let Some(rev) = probe_meta.current() {
            apply_revision(rev, meta);
        }
    }
}

fn apply_revision(rev: &MetadataRevision, meta: &mut TrackMeta) {
    for tag in rev.tags() {
        let value = tag.value.to_string();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match tag.std_key {
            Some(StandardTagKey::TrackTitle) => set_once(&mut meta.title, value),
            Some(StandardTagKey::Artist) => set_once(&mut meta.artist, value),
            Some(StandardTagKey::AlbumArtist) => set_once(&mut meta.album_artist, value),
            Some(StandardTagKey::Album) => set_once(&mut meta.album, value),
            Some(StandardTagKey::Genre) => set_once(&mut meta.genre, value),
            Some(StandardTagKey::TrackNumber) => {
                if meta.track_number.is_none() {
                    meta.track_number = parse_u32_tag(value);
                }
            }
            Some(StandardTagKey::DiscNumber) => {
                if meta.disc_number.is_none() {
                    meta.disc_number = parse_u32_tag(value);
                }
            }
            Some(StandardTagKey::Date) | Some(StandardTagKey::OriginalDate) => {
                if meta.year.is_none() {
                    meta.year = parse_year_tag(value);
                }
            }
            Some(StandardTagKey::Compilation) => {
                meta.compilation |= parse_bool_tag(value);
            }
            _ => {}
        }
    }
}

fn set_once(slot: &mut Option<String>, value: &str) {
    if slot.is_none() {
        *slot = Some(value.to_string());
    }
}

/// `"3/12"` -> 3.
fn parse_u32_tag(raw: &str) -> Option<u32> {
    raw.split('/')
        .next()
        .and_then(|s| s.trim().parse::<u32>().ok())
}

/// `"1969-09-26"` -> 1969.
fn parse_year_tag(raw: &str) -> Option<i32> {
    raw.split('-')
        .next()
        .and_then(|s| s.trim().parse::<i32>().ok())
}

fn parse_bool_tag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y"
    )
}

fn mtime_ms(fs_meta: &fs::Metadata) -> i64 {
    fs_meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Build the library item for a scanned file.
pub fn item_from_meta(path: &Path, meta: &TrackMeta, mtime: i64) -> Item {
    Item {
        id: None,
        path: path.to_path_buf(),
        title: meta.title.clone().unwrap_or_default(),
        artist: meta.artist.clone().unwrap_or_default(),
        albumartist: meta.album_artist.clone().unwrap_or_default(),
        album: meta.album.clone().unwrap_or_default(),
        genre: meta.genre.clone().unwrap_or_default(),
        year: meta.year,
        track: meta.track_number,
        disc: meta.disc_number,
        length: meta.length,
        format: meta.format.clone().unwrap_or_default(),
        comp: meta.compilation,
        album_id: None,
        mtime,
    }
}

/// Attach `item` to its album, creating the album on first sight.
///
/// Items without an album title stay singletons. Returns true if an album was created.
fn attach_album(lib: &Library, item: &mut Item) -> Result<bool> {
    if item.album.is_empty() {
        return Ok(false);
    }
    if let Some(album) = lib.find_album(&item.albumartist, &item.album)? {
        item.album_id = album.id;
        return Ok(false);
    }
    let mut album = Album {
        id: None,
        album: item.album.clone(),
        albumartist: item.albumartist.clone(),
        genre: item.genre.clone(),
        year: item.year,
        comp: item.comp,
    };
    let id = lib.add_album(&mut album)?;
    tracing::debug!(album = %album.album, albumartist = %album.albumartist, id, "created album");
    item.album_id = Some(id);
    Ok(true)
}

/// Scan `root` and add or refresh every track in the library.
pub fn import_directory(lib: &Library, root: &Path) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    scan_directory(root, |path, meta, fs_meta| {
        let mut item = item_from_meta(path, meta, mtime_ms(fs_meta));
        if attach_album(lib, &mut item)? {
            summary.albums_created += 1;
        }
        match lib.upsert_item(&mut item)? {
            UpsertOutcome::Added => summary.added += 1,
            UpsertOutcome::Updated => summary.updated += 1,
        }
        Ok(())
    })?;
    tracing::info!(
        root = %root.display(),
        added = summary.added,
        updated = summary.updated,
        albums = summary.albums_created,
        "import complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(tag: &str) -> std::path::PathBuf {
        let root = std::env::temp_dir().join(format!(
            "tunebox-scan-{}-{}",
            tag,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&root).unwrap();
        root
    }

    #[test]
    fn is_supported_extension_accepts_known() {
        assert!(is_supported_extension("flac"));
        assert!(is_supported_extension("mp3"));
        assert!(is_supported_extension("opus"));
        assert!(!is_supported_extension("txt"));
        assert!(!is_supported_extension("m3u"));
    }

    #[test]
    fn tag_parsers() {
        assert_eq!(parse_u32_tag("3/12"), Some(3));
        assert_eq!(parse_u32_tag("x"), None);
        assert_eq!(parse_year_tag("1969-09-26"), Some(1969));
        assert_eq!(parse_year_tag("2001"), Some(2001));
        assert!(parse_bool_tag("1"));
        assert!(!parse_bool_tag("0"));
    }

    #[test]
    fn unreadable_file_falls_back_to_stem_and_format() {
        let root = temp_root("meta");
        let track = root.join("01 Intro.flac");
        std::fs::write(&track, b"not really flac").unwrap();

        let meta = probe_track(&track).unwrap();
        assert_eq!(meta.format.as_deref(), Some("FLAC"));
        assert_eq!(meta.title.as_deref(), Some("01 Intro"));
        assert!(probe_track(&root.join("cover.jpg")).is_err());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn scan_directory_visits_audio_files_recursively() {
        let root = temp_root("walk");
        let nested = root.join("Artist").join("Album");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("b.mp3"), b"x").unwrap();
        std::fs::write(nested.join("a.flac"), b"x").unwrap();
        std::fs::write(nested.join("cover.jpg"), b"x").unwrap();
        std::fs::write(root.join("notes.txt"), b"x").unwrap();

        let mut seen = Vec::new();
        let count = scan_directory(&root, |path, _meta, _fs| {
            seen.push(path.file_name().unwrap().to_string_lossy().into_owned());
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 2);
        assert_eq!(seen, vec!["a.flac", "b.mp3"]);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn scan_directory_rejects_missing_root() {
        let root = temp_root("missing").join("nope");
        assert!(scan_directory(&root, |_, _, _| Ok(())).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn scan_directory_survives_symlink_cycle() {
        let root = temp_root("cycle");
        let sub = root.join("Artist");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("song.flac"), b"x").unwrap();
        std::os::unix::fs::symlink(&root, sub.join("loop")).unwrap();

        let count = scan_directory(&root, |_, _, _| Ok(())).unwrap();
        assert_eq!(count, 1);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn import_directory_groups_albums_and_is_idempotent() {
        let root = temp_root("import");
        std::fs::write(root.join("one.flac"), b"x").unwrap();
        std::fs::write(root.join("two.flac"), b"x").unwrap();

        let lib = Library::open_in_memory().unwrap();
        let first = import_directory(&lib, &root).unwrap();
        assert_eq!(first.added, 2);
        assert_eq!(first.updated, 0);
        // Untagged files carry no album title, so no albums are created.
        assert_eq!(first.albums_created, 0);

        let second = import_directory(&lib, &root).unwrap();
        assert_eq!(second.added, 0);
        assert_eq!(second.updated, 2);
        assert_eq!(lib.item_count().unwrap(), 2);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn attach_album_reuses_existing_album() {
        let lib = Library::open_in_memory().unwrap();
        let meta = TrackMeta {
            artist: Some("Nina Simone".into()),
            album_artist: Some("Nina Simone".into()),
            album: Some("Pastel Blues".into()),
            ..TrackMeta::default()
        };
        let mut first = item_from_meta(Path::new("/m/a.flac"), &meta, 0);
        let mut second = item_from_meta(Path::new("/m/b.flac"), &meta, 0);
        assert!(attach_album(&lib, &mut first).unwrap());
        assert!(!attach_album(&lib, &mut second).unwrap());
        assert_eq!(first.album_id, second.album_id);
        assert_eq!(lib.album_count().unwrap(), 1);
    }

    #[test]
    fn fill_defaults_derives_album_artist() {
        let mut comp = TrackMeta {
            artist: Some("Someone".into()),
            compilation: true,
            ..TrackMeta::default()
        };
        fill_defaults(Path::new("/m/x.mp3"), &mut comp);
        assert_eq!(comp.album_artist.as_deref(), Some(VARIOUS_ARTISTS));
        assert_eq!(comp.title.as_deref(), Some("x"));

        let mut solo = TrackMeta {
            artist: Some("Someone".into()),
            title: Some("Tagged".into()),
            ..TrackMeta::default()
        };
        fill_defaults(Path::new("/m/y.mp3"), &mut solo);
        assert_eq!(solo.album_artist.as_deref(), Some("Someone"));
        assert_eq!(solo.title.as_deref(), Some("Tagged"));
    }
}
