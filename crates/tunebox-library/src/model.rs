//! Library records and their field schemas.
//!
//! Every record exposes its fields by name so that queries, sorts and
//! format templates can address them uniformly.

use std::path::{Path, PathBuf};

use crate::query::QueryKind;

/// Storage and query behaviour of a named field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    /// Row id or foreign key.
    Id,
    Text,
    Integer,
    Float,
    Boolean,
    /// Filesystem path.
    Path,
}

impl FieldType {
    /// Query kind used for an unprefixed term on a field of this type.
    pub fn query_kind(self) -> QueryKind {
        match self {
            FieldType::Id | FieldType::Integer | FieldType::Float => QueryKind::Numeric,
            FieldType::Boolean => QueryKind::Boolean,
            FieldType::Path => QueryKind::Path,
            FieldType::Text => QueryKind::Substring,
        }
    }

    /// SQLite column type.
    pub fn sql(self) -> &'static str {
        match self {
            FieldType::Id | FieldType::Integer | FieldType::Boolean => "INTEGER",
            FieldType::Float => "REAL",
            FieldType::Text | FieldType::Path => "TEXT",
        }
    }

    /// Render a value the way templates and text queries see it.
    pub fn format(self, value: &Value) -> String {
        match (self, value) {
            (FieldType::Integer, Value::Null) => "0".to_string(),
            (FieldType::Float, Value::Null) => "0.0".to_string(),
            (FieldType::Boolean, Value::Null) => "False".to_string(),
            (FieldType::Float, Value::Float(v)) => format!("{v:.1}"),
            (FieldType::Float, Value::Integer(v)) => format!("{:.1}", *v as f64),
            _ => value.to_string(),
        }
    }
}

/// A field value read from a record.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Text(v) => v.trim().parse().ok(),
            Value::Null => None,
        }
    }

    fn from_opt<T: Into<i64>>(value: Option<T>) -> Self {
        value.map_or(Value::Null, |v| Value::Integer(v.into()))
    }

    fn from_path(path: &Path) -> Self {
        Value::Text(path.to_string_lossy().into_owned())
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(v) => f.write_str(v),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Boolean(true) => f.write_str("True"),
            Value::Boolean(false) => f.write_str("False"),
        }
    }
}

/// Field layout of a record type.
#[derive(Debug)]
pub struct Schema {
    /// Every named field and its type.
    pub fields: &'static [(&'static str, FieldType)],
    /// Fields matched by query terms that carry no `field:` key.
    pub search_fields: &'static [&'static str],
}

impl Schema {
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, ty)| *ty)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_type(name).is_some()
    }
}

/// A record that queries, sorts and templates can inspect.
pub trait Model {
    fn schema(&self) -> &'static Schema;

    /// Raw value of `field`, or `None` if the record has no such field.
    fn get(&self, field: &str) -> Option<Value>;

    /// Value of `field` rendered as text; unknown fields render empty.
    fn formatted(&self, field: &str) -> String {
        match (self.schema().field_type(field), self.get(field)) {
            (Some(ty), Some(value)) => ty.format(&value),
            _ => String::new(),
        }
    }
}

/// A single track in the library.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Item {
    pub id: Option<i64>,
    pub path: PathBuf,
    pub title: String,
    pub artist: String,
    pub albumartist: String,
    pub album: String,
    pub genre: String,
    pub year: Option<i32>,
    pub track: Option<u32>,
    pub disc: Option<u32>,
    /// Duration in seconds.
    pub length: Option<f64>,
    pub format: String,
    /// Part of a compilation.
    pub comp: bool,
    pub album_id: Option<i64>,
    /// File modification time (ms since epoch) when last imported.
    pub mtime: i64,
}

impl Item {
    pub const SCHEMA: Schema = Schema {
        fields: &[
            ("id", FieldType::Id),
            ("path", FieldType::Path),
            ("title", FieldType::Text),
            ("artist", FieldType::Text),
            ("albumartist", FieldType::Text),
            ("album", FieldType::Text),
            ("genre", FieldType::Text),
            ("year", FieldType::Integer),
            ("track", FieldType::Integer),
            ("disc", FieldType::Integer),
            ("length", FieldType::Float),
            ("format", FieldType::Text),
            ("comp", FieldType::Boolean),
            ("album_id", FieldType::Id),
            ("mtime", FieldType::Integer),
        ],
        search_fields: &["artist", "title", "album", "genre", "path"],
    };

    /// Directory that contains the item's file.
    pub fn dir(&self) -> Option<&Path> {
        self.path.parent()
    }
}

impl Model for Item {
    fn schema(&self) -> &'static Schema {
        &Self::SCHEMA
    }

    fn get(&self, field: &str) -> Option<Value> {
        let value = match field {
            "id" => Value::from_opt(self.id),
            "path" => Value::from_path(&self.path),
            "title" => Value::Text(self.title.clone()),
            "artist" => Value::Text(self.artist.clone()),
            "albumartist" => Value::Text(self.albumartist.clone()),
            "album" => Value::Text(self.album.clone()),
            "genre" => Value::Text(self.genre.clone()),
            "year" => Value::from_opt(self.year),
            "track" => Value::from_opt(self.track),
            "disc" => Value::from_opt(self.disc),
            "length" => self.length.map_or(Value::Null, Value::Float),
            "format" => Value::Text(self.format.clone()),
            "comp" => Value::Boolean(self.comp),
            "album_id" => Value::from_opt(self.album_id),
            "mtime" => Value::Integer(self.mtime),
            _ => return None,
        };
        Some(value)
    }
}

/// A group of items sharing album artist and album title.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Album {
    pub id: Option<i64>,
    pub album: String,
    pub albumartist: String,
    pub genre: String,
    pub year: Option<i32>,
    pub comp: bool,
}

impl Album {
    pub const SCHEMA: Schema = Schema {
        fields: &[
            ("id", FieldType::Id),
            ("album", FieldType::Text),
            ("albumartist", FieldType::Text),
            ("genre", FieldType::Text),
            ("year", FieldType::Integer),
            ("comp", FieldType::Boolean),
        ],
        search_fields: &["albumartist", "album", "genre"],
    };
}

impl Model for Album {
    fn schema(&self) -> &'static Schema {
        &Self::SCHEMA
    }

    fn get(&self, field: &str) -> Option<Value> {
        let value = match field {
            "id" => Value::from_opt(self.id),
            "album" => Value::Text(self.album.clone()),
            "albumartist" => Value::Text(self.albumartist.clone()),
            "genre" => Value::Text(self.genre.clone()),
            "year" => Value::from_opt(self.year),
            "comp" => Value::Boolean(self.comp),
            _ => return None,
        };
        Some(value)
    }
}
