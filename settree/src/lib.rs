//! `settree` keeps a nested settings tree in sync with a file on disk and finds
//! items deep inside it with a compact path language.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Settings file (.lua / .json)
//!   → Format dispatch (by file extension)
//!   → Table-literal codec, or the line-based fallback when it fails / JSON codec
//!   → SettingsStore (reloads when the file's modification time moves, writes back on every change)
//!   → PathSpec + query (lazy depth-first walk over literal keys, wildcards and predicates)
//!   → Expression evaluator (interpolates `{field}` references, then evaluates)
//! ```
//!
//! ## Modules
//!
//! - [`table`]: the `name = { ... }` table-literal codec.
//! - [`fallback`]: the line-based recovery parser for table literals the codec rejects.
//! - [`expression`]: the bounded expression language behind `$` predicates and values.
//!
//! ## Key Types
//!
//! - [`SettingsStore`]: a settings tree bound to one file, kept fresh on every access.
//! - [`Value`] and [`Mapping`]: the dynamic node type every file is parsed into.
//! - [`PathSpec`]: a parsed slash-delimited path such as `missions/*/name`.
//! - [`Query`]: the lazy iterator returned by [`query`].
//! - [`Context`]: the fields visible to [`interpolate`] and [`evaluate`].
//!
//! ## Path Queries
//!
//! Every segment of a path is either a literal key, `*` for every element of a
//! sequence, or a `$`-prefixed predicate that keeps only the elements for which
//! it holds:
//!
//! ```rust
//! use settree::PathSpec;
//! use settree::Value;
//!
//! let tree: Value = serde_json::from_str(
//! 	r#"{"players": [{"ucid": "abc", "name": "X"}, {"ucid": "zzz", "name": "Y"}]}"#,
//! )
//! .unwrap();
//! let path: PathSpec = "players/$ucid == 'abc'/name".parse().unwrap();
//!
//! let names: Vec<&Value> = tree.query(&path).collect();
//! assert_eq!(names, [&Value::from("X")]);
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use settree::SettingsStore;
//! use settree::StoreOptions;
//!
//! let options = StoreOptions::new().with_list_key("missionList");
//! let mut store = SettingsStore::open_with("serverSettings.lua", options).unwrap();
//!
//! // Re-reads the file first if it was edited since the last access.
//! let name = store.get("name").unwrap().cloned();
//!
//! // Writes the whole tree back to disk.
//! store.set("port", 10308).unwrap();
//! ```

pub use context::*;
pub use error::*;
pub use expression::*;
pub use fallback::*;
pub use format::*;
pub use interpolate::*;
pub use path::*;
pub use query::*;
pub use store::*;
pub use table::*;
pub use value::*;

mod context;
#[allow(unused_assignments)]
mod error;
pub mod expression;
pub mod fallback;
mod format;
mod interpolate;
mod path;
mod query;
mod store;
pub mod table;
mod value;

#[cfg(test)]
mod __tests;
