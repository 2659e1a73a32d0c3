//! Core of the tunebox music library.
//!
//! Items (tracks) and albums live in a SQLite database. Queries are written
//! as a list of `field:term` parts, parsed by [`queryparse`] into a
//! [`query::Query`] and evaluated against the loaded rows, then ordered by a
//! [`sort::Sort`].

pub mod db;
pub mod model;
pub mod query;
pub mod queryparse;
pub mod scan;
pub mod sort;

pub use db::Library;
pub use model::{Album, FieldType, Item, Model, Schema, Value};
pub use query::Query;
pub use sort::Sort;
