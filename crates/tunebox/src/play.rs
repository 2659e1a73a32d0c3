//! The `play` command: hand query results to an external media player.
//!
//! Matching tracks (or albums, or album folders) are written to a temporary
//! m3u playlist, or passed straight through as arguments in raw mode, and the
//! configured player command is launched on them.

use std::ffi::OsString;
use std::io::{BufRead, Write};
use std::path::{Component, Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use tunebox_library::queryparse::{parse_sorted_query, split_words};
use tunebox_library::{Album, Item, Library};

use crate::config::PlayConfig;
use crate::error::{UserError, invalid_query};
use crate::ui::{ColorName, Term};

/// Placeholder for the `--args` text in the player command.
pub const ARGS_MARKER: &str = "$args";
/// Placeholder for the playlist or file paths in the player command.
pub const TARGETS_MARKER: &str = "{}";

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemType {
    Track,
    Album,
}

impl ItemType {
    pub fn noun(self, count: usize) -> &'static str {
        match (self, count == 1) {
            (ItemType::Track, true) => "track",
            (ItemType::Track, false) => "tracks",
            (ItemType::Album, true) => "album",
            (ItemType::Album, false) => "albums",
        }
    }
}

/// What a query selected for playback.
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub item_type: ItemType,
    /// Number of matched tracks or albums.
    pub count: usize,
    pub paths: Vec<PathBuf>,
}

/// Run the query and collect the paths to play.
///
/// In album mode each album contributes its folder (`use_folders`) or its
/// tracks in disc/track order.
pub fn select(lib: &Library, query: &[String], album: bool, use_folders: bool) -> Result<Selection> {
    if album {
        let (query, sort) = parse_sorted_query(&Album::SCHEMA, query).map_err(invalid_query)?;
        let albums = lib.albums(&query, sort.as_ref())?;
        let mut paths = Vec::new();
        for album in &albums {
            if use_folders {
                if let Some(dir) = album.item_dir(lib)? {
                    paths.push(dir);
                }
            } else {
                paths.extend(album.items(lib)?.into_iter().map(|item| item.path));
            }
        }
        Ok(Selection {
            item_type: ItemType::Album,
            count: albums.len(),
            paths,
        })
    } else {
        let (query, sort) = parse_sorted_query(&Item::SCHEMA, query).map_err(invalid_query)?;
        let items = lib.items(&query, sort.as_ref())?;
        Ok(Selection {
            item_type: ItemType::Track,
            count: items.len(),
            paths: items.into_iter().map(|item| item.path).collect(),
        })
    }
}

/// Player used when none is configured.
pub fn default_command() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(windows) {
        "cmd /C start \"\""
    } else {
        "xdg-open"
    }
}

/// Resolve the command line, inserting `--args` text at `$args` or at the end.
pub fn command_str(configured: Option<&str>, args: Option<&str>) -> String {
    let command = configured
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| default_command());
    match args.filter(|a| !a.trim().is_empty()) {
        Some(args) if command.contains(ARGS_MARKER) => command.replace(ARGS_MARKER, args),
        Some(args) => format!("{command} {args}"),
        None => command
            .replace(&format!(" {ARGS_MARKER}"), "")
            .replace(ARGS_MARKER, ""),
    }
}

/// Split `command` into argv and place `targets` at each `{}` word, or append them.
///
/// A word containing `{}` is repeated once per target. A command with
/// unbalanced quotes is treated as a single program name.
pub fn build_argv(command: &str, targets: &[PathBuf]) -> Vec<OsString> {
    let words = split_words(command).unwrap_or_else(|| vec![command.to_string()]);
    let has_marker = words.iter().any(|w| w.contains(TARGETS_MARKER));

    let mut argv = Vec::with_capacity(words.len() + targets.len());
    for word in words {
        if !word.contains(TARGETS_MARKER) {
            argv.push(OsString::from(word));
            continue;
        }
        for target in targets {
            if word == TARGETS_MARKER {
                argv.push(target.as_os_str().to_owned());
            } else {
                let expanded = word.replace(TARGETS_MARKER, &target.to_string_lossy());
                argv.push(OsString::from(expanded));
            }
        }
    }
    if !has_marker {
        argv.extend(targets.iter().map(|t| t.as_os_str().to_owned()));
    }
    argv
}

/// Lexical relative path from `base` to `path`, using `..` where needed.
pub fn relpath(path: &Path, base: &Path) -> PathBuf {
    let path = absolute_lexical(path);
    let base = absolute_lexical(base);
    let path_parts = path.components().collect::<Vec<_>>();
    let base_parts = base.components().collect::<Vec<_>>();
    let common = path_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &path_parts[common..] {
        out.push(part.as_os_str());
    }
    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

fn absolute_lexical(path: &Path) -> PathBuf {
    let abs = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for part in abs.components() {
        match part {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Write `paths` to a new `tunebox-*.m3u` file in `dir` and keep it on disk.
pub fn create_tmp_playlist(paths: &[PathBuf], bom: bool, dir: &Path) -> Result<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix("tunebox-")
        .suffix(".m3u")
        .tempfile_in(dir)
        .with_context(|| format!("create playlist in {:?}", dir))?;
    if bom {
        file.write_all(UTF8_BOM).context("write playlist")?;
    }
    for path in paths {
        file.write_all(&path_bytes(path)).context("write playlist")?;
        file.write_all(b"\n").context("write playlist")?;
    }
    file.flush().context("flush playlist")?;
    let (_, path) = file.keep().context("keep playlist")?;
    tracing::debug!(playlist = %path.display(), entries = paths.len(), "wrote playlist");
    Ok(path)
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

/// Starts the player process.
pub trait Launcher {
    fn launch(&mut self, argv: &[OsString]) -> Result<()>;
}

/// Runs the player for real. On Unix the player replaces this process.
#[derive(Debug, Default)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(&mut self, argv: &[OsString]) -> Result<()> {
        let Some((program, args)) = argv.split_first() else {
            return Err(UserError::new("the player command is empty").into());
        };
        let mut command = Command::new(program);
        command.args(args);
        run_player(command)
    }
}

#[cfg(unix)]
fn run_player(mut command: Command) -> Result<()> {
    use std::os::unix::process::CommandExt;
    // exec only returns on failure.
    let err = command.exec();
    Err(UserError::new(format!("Could not play the query: {err}")).into())
}

#[cfg(not(unix))]
fn run_player(mut command: Command) -> Result<()> {
    let status = command
        .status()
        .map_err(|err| UserError::new(format!("Could not play the query: {err}")))?;
    if !status.success() {
        tracing::warn!(status = %status, "player exited with an error");
    }
    Ok(())
}

/// Command-line options of a `play` invocation.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlayOptions<'a> {
    pub query: &'a [String],
    /// Query albums instead of tracks.
    pub album: bool,
    /// Extra player arguments.
    pub args: Option<&'a str>,
    /// Skip the warning threshold prompt.
    pub yes: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayOutcome {
    NothingToPlay,
    Cancelled,
    Launched,
}

pub struct Player<'a, L: Launcher> {
    config: &'a PlayConfig,
    term: Term,
    playlist_dir: PathBuf,
    launcher: L,
}

impl<'a, L: Launcher> Player<'a, L> {
    pub fn new(config: &'a PlayConfig, term: Term, launcher: L) -> Self {
        Self {
            config,
            term,
            playlist_dir: std::env::temp_dir(),
            launcher,
        }
    }

    /// Write playlists somewhere other than the system temp directory.
    #[cfg(test)]
    pub fn with_playlist_dir(mut self, dir: PathBuf) -> Self {
        self.playlist_dir = dir;
        self
    }

    #[cfg(test)]
    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn play_query<R, W>(
        &mut self,
        lib: &Library,
        opts: &PlayOptions<'_>,
        input: &mut R,
        out: &mut W,
    ) -> Result<PlayOutcome>
    where
        R: BufRead,
        W: Write,
    {
        let mut selection = select(lib, opts.query, opts.album, self.config.use_folders)?;
        if let Some(base) = self.config.relative_to() {
            selection.paths = selection
                .paths
                .iter()
                .map(|path| relpath(path, &base))
                .collect();
        }

        if selection.count == 0 {
            let msg = format!("No {} to play.", selection.item_type.noun(1));
            writeln!(out, "{}", self.term.colorize(ColorName::TextWarning, &msg))?;
            return Ok(PlayOutcome::NothingToPlay);
        }

        let command = command_str(self.config.command.as_deref(), opts.args);
        if !opts.yes && self.exceeds_threshold(&selection, input, out)? {
            tracing::debug!(count = selection.count, "play cancelled at threshold prompt");
            return Ok(PlayOutcome::Cancelled);
        }

        let open_args = self.playlist_or_paths(&selection.paths)?;
        self.play(&command, &selection, &open_args, out)?;
        Ok(PlayOutcome::Launched)
    }

    /// Warn about a large selection and ask whether to continue.
    /// Returns true if the user aborted.
    fn exceeds_threshold<R, W>(&self, selection: &Selection, input: &mut R, out: &mut W) -> Result<bool>
    where
        R: BufRead,
        W: Write,
    {
        if !self.config.warning_threshold.exceeded_by(selection.count) {
            return Ok(false);
        }
        let msg = format!(
            "You are about to queue {} {}.",
            selection.count,
            selection.item_type.noun(selection.count)
        );
        writeln!(out, "{}", self.term.colorize(ColorName::TextWarning, &msg))?;
        let choice = self.term.input_options(&["Continue", "Abort"], input, out)?;
        Ok(choice == 'a')
    }

    fn playlist_or_paths(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        if self.config.raw {
            return Ok(paths.to_vec());
        }
        let playlist = create_tmp_playlist(paths, self.config.bom, &self.playlist_dir)?;
        Ok(vec![playlist])
    }

    fn play<W: Write>(
        &mut self,
        command: &str,
        selection: &Selection,
        open_args: &[PathBuf],
        out: &mut W,
    ) -> Result<()> {
        writeln!(
            out,
            "Playing {} {}.",
            selection.count,
            selection.item_type.noun(selection.count)
        )?;
        out.flush()?;
        tracing::debug!(command = %command, args = ?open_args, "executing command");
        let argv = build_argv(command, open_args);
        self.launcher.launch(&argv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WarningThreshold;
    use std::io::Cursor;

    #[derive(Default)]
    struct RecordingLauncher {
        calls: Vec<Vec<OsString>>,
    }

    impl Launcher for RecordingLauncher {
        fn launch(&mut self, argv: &[OsString]) -> Result<()> {
            self.calls.push(argv.to_vec());
            Ok(())
        }
    }

    fn add_album(lib: &Library, artist: &str, title: &str, tracks: &[&str]) {
        let mut album = Album {
            album: title.to_string(),
            albumartist: artist.to_string(),
            ..Album::default()
        };
        lib.add_album(&mut album).unwrap();
        // Insert in reverse so track order has to come from sorting.
        for (idx, name) in tracks.iter().enumerate().rev() {
            let mut item = Item {
                path: PathBuf::from(format!("/music/{artist}/{title}/{name}.flac")),
                title: name.to_string(),
                artist: artist.to_string(),
                albumartist: artist.to_string(),
                album: title.to_string(),
                track: Some(idx as u32 + 1),
                disc: Some(1),
                album_id: album.id,
                ..Item::default()
            };
            lib.add_item(&mut item).unwrap();
        }
    }

    fn library() -> Library {
        let lib = Library::open_in_memory().unwrap();
        add_album(&lib, "Air", "Moon Safari", &["La Femme d'Argent", "Sexy Boy"]);
        add_album(&lib, "Portishead", "Dummy", &["Mysterons", "Sour Times", "Strangers"]);
        lib
    }

    fn temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[allow(clippy::too_many_arguments)]
    fn run(
        config: &PlayConfig,
        lib: &Library,
        query: &[&str],
        album: bool,
        args: Option<&str>,
        yes: bool,
        answers: &str,
        dir: &Path,
    ) -> (PlayOutcome, Vec<Vec<OsString>>, String) {
        let query = query.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let opts = PlayOptions {
            query: &query,
            album,
            args,
            yes,
        };
        let mut player = Player::new(config, Term::plain(), RecordingLauncher::default())
            .with_playlist_dir(dir.to_path_buf());
        let mut input = Cursor::new(answers.as_bytes().to_vec());
        let mut out = Vec::new();
        let outcome = player.play_query(lib, &opts, &mut input, &mut out).unwrap();
        (
            outcome,
            player.launcher().calls.clone(),
            String::from_utf8(out).unwrap(),
        )
    }

    fn raw_config() -> PlayConfig {
        PlayConfig {
            command: Some("mpv".to_string()),
            raw: true,
            ..PlayConfig::default()
        }
    }

    fn strings(argv: &[OsString]) -> Vec<String> {
        argv.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn command_str_inserts_args() {
        assert_eq!(
            command_str(Some("vlc $args --fullscreen"), Some("--loop")),
            "vlc --loop --fullscreen"
        );
        assert_eq!(command_str(Some("vlc"), Some("--loop")), "vlc --loop");
        assert_eq!(command_str(Some("vlc $args"), None), "vlc");
        assert_eq!(command_str(Some("vlc"), None), "vlc");
        assert_eq!(command_str(None, None), default_command());
        assert_eq!(command_str(Some("  "), None), default_command());
    }

    #[test]
    fn build_argv_appends_or_substitutes_targets() {
        let targets = vec![PathBuf::from("/tmp/a b.m3u")];
        assert_eq!(
            strings(&build_argv("mpv --shuffle", &targets)),
            vec!["mpv", "--shuffle", "/tmp/a b.m3u"]
        );
        assert_eq!(
            strings(&build_argv("mpv --playlist={} --shuffle", &targets)),
            vec!["mpv", "--playlist=/tmp/a b.m3u", "--shuffle"]
        );
        let many = vec![PathBuf::from("/a.mp3"), PathBuf::from("/b.mp3")];
        assert_eq!(
            strings(&build_argv("player {} --now", &many)),
            vec!["player", "/a.mp3", "/b.mp3", "--now"]
        );
        assert_eq!(
            strings(&build_argv("\"My Player\" -q", &many)),
            vec!["My Player", "-q", "/a.mp3", "/b.mp3"]
        );
    }

    #[test]
    fn build_argv_keeps_malformed_command_whole() {
        let argv = build_argv("it's broken", &[PathBuf::from("/x.m3u")]);
        assert_eq!(strings(&argv), vec!["it's broken", "/x.m3u"]);
    }

    #[test]
    fn relpath_walks_up_and_down() {
        assert_eq!(
            relpath(Path::new("/music/Air/x.flac"), Path::new("/music")),
            PathBuf::from("Air/x.flac")
        );
        assert_eq!(
            relpath(Path::new("/music/Air/x.flac"), Path::new("/music/Portishead")),
            PathBuf::from("../Air/x.flac")
        );
        assert_eq!(relpath(Path::new("/music"), Path::new("/music/")), PathBuf::from("."));
        assert_eq!(
            relpath(Path::new("/music/./Air/../Air/x.flac"), Path::new("/music")),
            PathBuf::from("Air/x.flac")
        );
    }

    #[test]
    fn item_type_nouns() {
        assert_eq!(ItemType::Track.noun(1), "track");
        assert_eq!(ItemType::Track.noun(0), "tracks");
        assert_eq!(ItemType::Album.noun(2), "albums");
    }

    #[test]
    fn empty_selection_plays_nothing() {
        let lib = library();
        let dir = temp_dir();
        let (outcome, calls, out) =
            run(&raw_config(), &lib, &["nomatch"], false, None, false, "", dir.path());
        assert_eq!(outcome, PlayOutcome::NothingToPlay);
        assert!(calls.is_empty());
        assert_eq!(out, "No track to play.\n");

        let (_, _, out) = run(&raw_config(), &lib, &["nomatch"], true, None, false, "", dir.path());
        assert_eq!(out, "No album to play.\n");
    }

    #[test]
    fn raw_mode_passes_track_paths() {
        let lib = library();
        let dir = temp_dir();
        let (outcome, calls, out) =
            run(&raw_config(), &lib, &["air"], false, None, false, "", dir.path());
        assert_eq!(outcome, PlayOutcome::Launched);
        assert_eq!(out, "Playing 2 tracks.\n");
        assert_eq!(
            strings(&calls[0]),
            vec![
                "mpv",
                "/music/Air/Moon Safari/La Femme d'Argent.flac",
                "/music/Air/Moon Safari/Sexy Boy.flac",
            ]
        );
    }

    #[test]
    fn playlist_mode_writes_m3u() {
        let lib = library();
        let dir = temp_dir();
        let config = PlayConfig {
            command: Some("mpv --playlist={}".to_string()),
            ..PlayConfig::default()
        };
        let (_, calls, _) = run(&config, &lib, &["title:sour"], false, None, false, "", dir.path());
        let argv = strings(&calls[0]);
        assert_eq!(argv.len(), 2);
        let playlist = PathBuf::from(argv[1].strip_prefix("--playlist=").unwrap());
        assert!(playlist.starts_with(dir.path()));
        assert_eq!(playlist.extension().and_then(|e| e.to_str()), Some("m3u"));
        let content = std::fs::read_to_string(&playlist).unwrap();
        assert_eq!(content, "/music/Portishead/Dummy/Sour Times.flac\n");
    }

    #[test]
    fn bom_prefixes_playlist() {
        let paths = vec![PathBuf::from("/a.flac")];
        let dir = temp_dir();
        let playlist = create_tmp_playlist(&paths, true, dir.path()).unwrap();
        let bytes = std::fs::read(&playlist).unwrap();
        assert_eq!(bytes, b"\xef\xbb\xbf/a.flac\n");
        let name = playlist.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("tunebox-"));
    }

    #[test]
    fn album_mode_plays_tracks_in_order() {
        let lib = library();
        let dir = temp_dir();
        let (_, calls, out) = run(&raw_config(), &lib, &["dummy"], true, None, false, "", dir.path());
        assert_eq!(out, "Playing 1 album.\n");
        assert_eq!(
            strings(&calls[0]),
            vec![
                "mpv",
                "/music/Portishead/Dummy/Mysterons.flac",
                "/music/Portishead/Dummy/Sour Times.flac",
                "/music/Portishead/Dummy/Strangers.flac",
            ]
        );
    }

    #[test]
    fn use_folders_passes_album_directories() {
        let lib = library();
        let dir = temp_dir();
        let config = PlayConfig {
            use_folders: true,
            ..raw_config()
        };
        let (_, calls, out) = run(&config, &lib, &[], true, None, false, "", dir.path());
        assert_eq!(out, "Playing 2 albums.\n");
        assert_eq!(
            strings(&calls[0]),
            vec!["mpv", "/music/Air/Moon Safari", "/music/Portishead/Dummy"]
        );
    }

    #[test]
    fn relative_to_rewrites_paths() {
        let lib = library();
        let dir = temp_dir();
        let config = PlayConfig {
            relative_to: Some(PathBuf::from("/music/Portishead")),
            ..raw_config()
        };
        let (_, calls, _) = run(&config, &lib, &["moon"], false, None, false, "", dir.path());
        assert_eq!(
            strings(&calls[0])[1..],
            [
                "../Air/Moon Safari/La Femme d'Argent.flac",
                "../Air/Moon Safari/Sexy Boy.flac",
            ]
        );
    }

    #[test]
    fn extra_args_reach_the_player() {
        let lib = library();
        let dir = temp_dir();
        let config = PlayConfig {
            command: Some("mpv $args --quiet".to_string()),
            ..raw_config()
        };
        let (_, calls, _) =
            run(&config, &lib, &["strangers"], false, Some("--shuffle"), false, "", dir.path());
        assert_eq!(
            strings(&calls[0]),
            vec!["mpv", "--shuffle", "--quiet", "/music/Portishead/Dummy/Strangers.flac"]
        );
    }

    #[test]
    fn threshold_prompt_can_abort() {
        let lib = library();
        let dir = temp_dir();
        let config = PlayConfig {
            warning_threshold: WarningThreshold::new(3),
            ..raw_config()
        };
        let (outcome, calls, out) = run(&config, &lib, &[], false, None, false, "a\n", dir.path());
        assert_eq!(outcome, PlayOutcome::Cancelled);
        assert!(calls.is_empty());
        assert!(out.starts_with("You are about to queue 5 tracks.\n"));

        let (outcome, calls, _) = run(&config, &lib, &[], false, None, false, "\n", dir.path());
        assert_eq!(outcome, PlayOutcome::Launched);
        assert_eq!(calls[0].len(), 6);
    }

    #[test]
    fn threshold_is_skipped_with_yes_or_when_disabled() {
        let lib = library();
        let dir = temp_dir();
        let config = PlayConfig {
            warning_threshold: WarningThreshold::new(1),
            ..raw_config()
        };
        let (outcome, _, out) = run(&config, &lib, &[], false, None, true, "a\n", dir.path());
        assert_eq!(outcome, PlayOutcome::Launched);
        assert!(!out.contains("about to queue"));

        let config = PlayConfig {
            warning_threshold: WarningThreshold::DISABLED,
            ..raw_config()
        };
        let (outcome, _, _) = run(&config, &lib, &[], false, None, false, "a\n", dir.path());
        assert_eq!(outcome, PlayOutcome::Launched);
    }

    #[test]
    fn invalid_regex_is_a_user_error() {
        let lib = library();
        let err = select(&lib, &["title::(".to_string()], false, false).unwrap_err();
        assert!(crate::error::as_user_error(&err).is_some());
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = ProcessLauncher.launch(&[]).unwrap_err();
        assert!(crate::error::as_user_error(&err).is_some());
    }

    #[cfg(unix)]
    #[test]
    fn missing_player_is_a_user_error() {
        let argv = [OsString::from("/nonexistent/tunebox-player")];
        let err = ProcessLauncher.launch(&argv).unwrap_err();
        let user = crate::error::as_user_error(&err).unwrap();
        assert!(user.0.starts_with("Could not play the query: "), "{}", user.0);
    }

    #[test]
    fn album_threshold_counts_albums_not_tracks() {
        let lib = library();
        let dir = temp_dir();
        let config = PlayConfig {
            warning_threshold: WarningThreshold::new(3),
            ..raw_config()
        };
        let (outcome, calls, out) = run(&config, &lib, &[], true, None, false, "a\n", dir.path());
        assert_eq!(outcome, PlayOutcome::Launched);
        assert!(!out.contains("about to queue"));
        assert_eq!(out, "Playing 2 albums.\n");
        assert_eq!(calls[0].len(), 6);
    }
}
