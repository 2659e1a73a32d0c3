//! SQLite store for items and albums.
//!
//! Provides pooled connections, schema bootstrap and query helpers. Queries
//! are evaluated in memory over the loaded rows so every query kind (regex,
//! numeric ranges, negation) behaves the same regardless of field storage.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};

use crate::model::{Album, Item};
use crate::query::Query;
use crate::queryparse::{parse_sorted_query, split_words};
use crate::sort::Sort;

const SCHEMA_VERSION: i32 = 1;

/// Default item order when a query carries no sort parts.
pub const DEFAULT_ITEM_SORT: &str = "artist+ album+ disc+ track+";
/// Default album order when a query carries no sort parts.
pub const DEFAULT_ALBUM_SORT: &str = "albumartist+ album+";

const ITEM_COLUMNS: &str = "id, path, title, artist, albumartist, album, genre, year, track, \
                            disc, length, format, comp, album_id, mtime";
const ALBUM_COLUMNS: &str = "id, album, albumartist, genre, year, comp";

/// Whether an upsert created a new row or refreshed an existing one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Added,
    Updated,
}

#[derive(Clone)]
pub struct Library {
    pool: Pool<SqliteConnectionManager>,
    item_sort: Sort,
    album_sort: Sort,
}

fn map_item_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
    let path: String = row.get(1)?;
    Ok(Item {
        id: row.get(0)?,
        path: PathBuf::from(path),
        title: row.get(2)?,
        artist: row.get(3)?,
        albumartist: row.get(4)?,
        album: row.get(5)?,
        genre: row.get(6)?,
        year: row.get(7)?,
        track: row.get(8)?,
        disc: row.get(9)?,
        length: row.get(10)?,
        format: row.get(11)?,
        comp: row.get(12)?,
        album_id: row.get(13)?,
        mtime: row.get(14)?,
    })
}

fn map_album_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Album> {
    Ok(Album {
        id: row.get(0)?,
        album: row.get(1)?,
        albumartist: row.get(2)?,
        genre: row.get(3)?,
        year: row.get(4)?,
        comp: row.get(5)?,
    })
}

impl Library {
    /// Open (or create) the library database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create library dir {:?}", parent))?;
        }
        tracing::debug!(path = %db_path.display(), "opening library");
        let manager = SqliteConnectionManager::file(db_path);
        Self::from_manager(manager, 4)
    }

    /// Private in-memory database; a single connection keeps one shared database.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_manager(SqliteConnectionManager::memory(), 1)
    }

    fn from_manager(manager: SqliteConnectionManager, max_size: u32) -> Result<Self> {
        let manager = manager.with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });
        let pool = Pool::builder()
            .max_size(max_size)
            .build(manager)
            .context("create library db pool")?;
        {
            let conn = pool.get().context("open library db")?;
            init_schema(&conn)?;
        }
        Ok(Self {
            pool,
            item_sort: Sort::parse(DEFAULT_ITEM_SORT),
            album_sort: Sort::parse(DEFAULT_ALBUM_SORT),
        })
    }

    /// Override the orders applied when a query has no sort parts.
    pub fn with_default_sorts(mut self, item_sort: Sort, album_sort: Sort) -> Self {
        self.item_sort = item_sort;
        self.album_sort = album_sort;
        self
    }

    pub fn default_item_sort(&self) -> &Sort {
        &self.item_sort
    }

    pub fn default_album_sort(&self) -> &Sort {
        &self.album_sort
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().context("open library db")
    }

    pub fn add_album(&self, album: &mut Album) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO albums (album, albumartist, genre, year, comp) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![album.album, album.albumartist, album.genre, album.year, album.comp],
        )
        .with_context(|| format!("insert album {:?}", album.album))?;
        let id = conn.last_insert_rowid();
        album.id = Some(id);
        Ok(id)
    }

    pub fn add_item(&self, item: &mut Item) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO items (path, title, artist, albumartist, album, genre, year, track,
                               disc, length, format, comp, album_id, mtime)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                item.path.to_string_lossy(),
                item.title,
                item.artist,
                item.albumartist,
                item.album,
                item.genre,
                item.year,
                item.track,
                item.disc,
                item.length,
                item.format,
                item.comp,
                item.album_id,
                item.mtime,
            ],
        )
        .with_context(|| format!("insert item {:?}", item.path))?;
        let id = conn.last_insert_rowid();
        item.id = Some(id);
        Ok(id)
    }

    /// Insert the item, or refresh the existing row with the same path.
    pub fn upsert_item(&self, item: &mut Item) -> Result<UpsertOutcome> {
        let path = item.path.to_string_lossy().into_owned();
        let existing: Option<i64> = {
            let conn = self.conn()?;
            conn.query_row("SELECT id FROM items WHERE path = ?1", params![path], |row| {
                row.get(0)
            })
            .optional()
            .context("lookup existing item")?
        };
        let Some(id) = existing else {
            self.add_item(item)?;
            return Ok(UpsertOutcome::Added);
        };

        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE items
            SET title = ?2, artist = ?3, albumartist = ?4, album = ?5, genre = ?6, year = ?7,
                track = ?8, disc = ?9, length = ?10, format = ?11, comp = ?12, album_id = ?13,
                mtime = ?14
            WHERE id = ?1
            "#,
            params![
                id,
                item.title,
                item.artist,
                item.albumartist,
                item.album,
                item.genre,
                item.year,
                item.track,
                item.disc,
                item.length,
                item.format,
                item.comp,
                item.album_id,
                item.mtime,
            ],
        )
        .with_context(|| format!("update item {:?}", item.path))?;
        item.id = Some(id);
        Ok(UpsertOutcome::Updated)
    }

    pub fn find_album(&self, albumartist: &str, album: &str) -> Result<Option<Album>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE albumartist = ?1 AND album = ?2");
        conn.query_row(&sql, params![albumartist, album], map_album_row)
            .optional()
            .context("find album")
    }

    pub fn get_album(&self, id: i64) -> Result<Option<Album>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE id = ?1");
        conn.query_row(&sql, params![id], map_album_row)
            .optional()
            .context("get album")
    }

    pub fn get_item(&self, id: i64) -> Result<Option<Item>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1");
        conn.query_row(&sql, params![id], map_item_row)
            .optional()
            .context("get item")
    }

    fn load_items(&self, where_clause: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Item>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items {where_clause}");
        let mut stmt = conn.prepare(&sql).context("prepare items query")?;
        let rows = stmt
            .query_map(args, map_item_row)
            .context("query items")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("read item rows")?;
        Ok(rows)
    }

    fn load_albums(&self) -> Result<Vec<Album>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {ALBUM_COLUMNS} FROM albums ORDER BY id");
        let mut stmt = conn.prepare(&sql).context("prepare albums query")?;
        let rows = stmt
            .query_map([], map_album_row)
            .context("query albums")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("read album rows")?;
        Ok(rows)
    }

    /// Items matching `query`, ordered by `sort` or the default item sort.
    pub fn items(&self, query: &Query, sort: Option<&Sort>) -> Result<Vec<Item>> {
        let mut items = self.load_items("ORDER BY id", &[])?;
        items.retain(|item| query.matches(item));
        sort.unwrap_or(&self.item_sort).sort(&mut items);
        tracing::debug!(count = items.len(), "item query");
        Ok(items)
    }

    /// Albums matching `query`, ordered by `sort` or the default album sort.
    pub fn albums(&self, query: &Query, sort: Option<&Sort>) -> Result<Vec<Album>> {
        let mut albums = self.load_albums()?;
        albums.retain(|album| query.matches(album));
        sort.unwrap_or(&self.album_sort).sort(&mut albums);
        tracing::debug!(count = albums.len(), "album query");
        Ok(albums)
    }

    /// Parse a query string and return matching items.
    pub fn items_matching(&self, query: &str) -> Result<Vec<Item>> {
        let parts = split_query(query)?;
        let (query, sort) = parse_sorted_query(&Item::SCHEMA, &parts)?;
        self.items(&query, sort.as_ref())
    }

    /// Parse a query string and return matching albums.
    pub fn albums_matching(&self, query: &str) -> Result<Vec<Album>> {
        let parts = split_query(query)?;
        let (query, sort) = parse_sorted_query(&Album::SCHEMA, &parts)?;
        self.albums(&query, sort.as_ref())
    }

    /// An album's items in disc/track order.
    pub fn album_items(&self, album_id: i64) -> Result<Vec<Item>> {
        self.load_items(
            "WHERE album_id = ?1 ORDER BY disc, track, path",
            &[&album_id as &dyn rusqlite::ToSql],
        )
    }

    pub fn remove_item(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn
            .execute("DELETE FROM items WHERE id = ?1", params![id])
            .context("delete item")?;
        Ok(changed > 0)
    }

    pub fn item_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))
            .context("count items")
    }

    pub fn album_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        conn.query_row("SELECT COUNT(*) FROM albums", [], |row| row.get(0))
            .context("count albums")
    }
}

impl Album {
    /// The album's items in disc/track order.
    pub fn items(&self, lib: &Library) -> Result<Vec<Item>> {
        match self.id {
            Some(id) => lib.album_items(id),
            None => Ok(Vec::new()),
        }
    }

    /// Directory holding the album's first item.
    pub fn item_dir(&self, lib: &Library) -> Result<Option<PathBuf>> {
        let items = self.items(lib)?;
        Ok(items
            .first()
            .and_then(|item| item.dir())
            .map(Path::to_path_buf))
    }
}

fn split_query(query: &str) -> Result<Vec<String>> {
    split_words(query).ok_or_else(|| anyhow::anyhow!("unbalanced quotes in query {query:?}"))
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS albums (
            id INTEGER PRIMARY KEY,
            album TEXT NOT NULL,
            albumartist TEXT NOT NULL,
            genre TEXT NOT NULL DEFAULT '',
            year INTEGER,
            comp INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS items (
            id INTEGER PRIMARY KEY,
            path TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL DEFAULT '',
            artist TEXT NOT NULL DEFAULT '',
            albumartist TEXT NOT NULL DEFAULT '',
            album TEXT NOT NULL DEFAULT '',
            genre TEXT NOT NULL DEFAULT '',
            year INTEGER,
            track INTEGER,
            disc INTEGER,
            length REAL,
            format TEXT NOT NULL DEFAULT '',
            comp INTEGER NOT NULL DEFAULT 0,
            album_id INTEGER,
            mtime INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(album_id) REFERENCES albums(id) ON DELETE SET NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_albums_artist_title ON albums(albumartist, album);
        CREATE INDEX IF NOT EXISTS idx_items_album_id ON items(album_id);
        "#,
    )
    .context("create library schema")?;

    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    match version.as_deref().and_then(|v| v.parse::<i32>().ok()) {
        None => {
            conn.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?1)",
                params![SCHEMA_VERSION.to_string()],
            )
            .context("insert schema version")?;
        }
        Some(v) if v > SCHEMA_VERSION => {
            return Err(anyhow::anyhow!(
                "library schema version {v} is newer than supported version {SCHEMA_VERSION}"
            ));
        }
        Some(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryKind;

    fn add_album(lib: &Library, albumartist: &str, album: &str, year: i32) -> Album {
        let mut album = Album {
            album: album.to_string(),
            albumartist: albumartist.to_string(),
            year: Some(year),
            ..Album::default()
        };
        lib.add_album(&mut album).expect("add album");
        album
    }

    fn add_item(lib: &Library, album: &Album, title: &str, track: u32) -> Item {
        let mut item = Item {
            path: PathBuf::from(format!(
                "/music/{}/{}/{:02} {}.flac",
                album.albumartist, album.album, track, title
            )),
            title: title.to_string(),
            artist: album.albumartist.clone(),
            albumartist: album.albumartist.clone(),
            album: album.album.clone(),
            year: album.year,
            track: Some(track),
            disc: Some(1),
            album_id: album.id,
            ..Item::default()
        };
        lib.add_item(&mut item).expect("add item");
        item
    }

    fn fixture() -> Library {
        let lib = Library::open_in_memory().expect("open library");
        let abbey = add_album(&lib, "The Beatles", "Abbey Road", 1969);
        add_item(&lib, &abbey, "Something", 2);
        add_item(&lib, &abbey, "Come Together", 1);
        let sticky = add_album(&lib, "The Rolling Stones", "Sticky Fingers", 1971);
        add_item(&lib, &sticky, "Brown Sugar", 1);
        lib
    }

    #[test]
    fn add_assigns_ids_and_counts() {
        let lib = fixture();
        assert_eq!(lib.item_count().unwrap(), 3);
        assert_eq!(lib.album_count().unwrap(), 2);
        let item = lib.get_item(1).unwrap().expect("item 1");
        assert_eq!(item.title, "Something");
    }

    #[test]
    fn items_use_default_sort() {
        let lib = fixture();
        let titles = lib
            .items(&Query::True, None)
            .unwrap()
            .into_iter()
            .map(|i| i.title)
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["Come Together", "Something", "Brown Sugar"]);
    }

    #[test]
    fn items_matching_parses_terms_and_sort() {
        let lib = fixture();
        let items = lib.items_matching("beatles title-").unwrap();
        let titles = items.into_iter().map(|i| i.title).collect::<Vec<_>>();
        assert_eq!(titles, vec!["Something", "Come Together"]);

        let items = lib.items_matching("year:1970..").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Brown Sugar");
    }

    #[test]
    fn albums_matching_filters_and_sorts() {
        let lib = fixture();
        let albums = lib.albums_matching("year-").unwrap();
        let names = albums.into_iter().map(|a| a.album).collect::<Vec<_>>();
        assert_eq!(names, vec!["Sticky Fingers", "Abbey Road"]);

        let albums = lib.albums_matching("stones").unwrap();
        assert_eq!(albums.len(), 1);
    }

    #[test]
    fn album_items_are_in_track_order() {
        let lib = fixture();
        let album = lib.find_album("The Beatles", "Abbey Road").unwrap().expect("album");
        let titles = album
            .items(&lib)
            .unwrap()
            .into_iter()
            .map(|i| i.title)
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["Come Together", "Something"]);
        assert_eq!(
            album.item_dir(&lib).unwrap(),
            Some(PathBuf::from("/music/The Beatles/Abbey Road"))
        );
    }

    #[test]
    fn item_dir_is_none_for_empty_album() {
        let lib = Library::open_in_memory().unwrap();
        let album = add_album(&lib, "Nobody", "Empty", 2000);
        assert_eq!(album.item_dir(&lib).unwrap(), None);
    }

    #[test]
    fn upsert_updates_by_path() {
        let lib = fixture();
        let mut item = lib.get_item(3).unwrap().expect("item");
        item.id = None;
        item.title = "Brown Sugar (Remastered)".to_string();
        assert_eq!(lib.upsert_item(&mut item).unwrap(), UpsertOutcome::Updated);
        assert_eq!(item.id, Some(3));
        assert_eq!(lib.item_count().unwrap(), 3);
        assert_eq!(lib.get_item(3).unwrap().unwrap().title, "Brown Sugar (Remastered)");

        let mut fresh = Item {
            path: PathBuf::from("/music/new.mp3"),
            ..Item::default()
        };
        assert_eq!(lib.upsert_item(&mut fresh).unwrap(), UpsertOutcome::Added);
        assert_eq!(lib.item_count().unwrap(), 4);
    }

    #[test]
    fn remove_item_deletes_row() {
        let lib = fixture();
        assert!(lib.remove_item(1).unwrap());
        assert!(!lib.remove_item(1).unwrap());
        assert_eq!(lib.item_count().unwrap(), 2);
    }

    #[test]
    fn explicit_query_objects_work() {
        let lib = fixture();
        let query = Query::field(QueryKind::Numeric, "track", "2").unwrap();
        let items = lib.items(&query, None).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Something");
    }

    #[test]
    fn open_creates_file_database() {
        let root = std::env::temp_dir().join(format!(
            "tunebox-db-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let path = root.join("nested").join("library.sqlite");
        {
            let lib = Library::open(&path).expect("open");
            add_album(&lib, "A", "B", 1999);
        }
        let lib = Library::open(&path).expect("reopen");
        assert_eq!(lib.album_count().unwrap(), 1);
        let _ = std::fs::remove_dir_all(&root);
    }
}
