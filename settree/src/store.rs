use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use tracing::debug;
use tracing::error;

use crate::DEFAULT_ROOT_NAME;
use crate::Format;
use crate::Mapping;
use crate::PathSpec;
use crate::Query;
use crate::SettingsError;
use crate::SettingsResult;
use crate::Value;
use crate::decode;
use crate::encode;
use crate::query;

/// Options for a [`SettingsStore`].
///
/// Deserializable so a host application can embed it in its own config file:
///
/// ```toml
/// [settings]
/// root = "cfg"
/// list_keys = ["missionList"]
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreOptions {
	/// Left-hand name used when writing table literals. Defaults to the name
	/// found in the file, then to `cfg`.
	pub root: Option<String>,
	/// Top-level keys whose empty table `{}` denotes an empty list rather than
	/// an empty map.
	pub list_keys: Vec<String>,
}

impl StoreOptions {
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with_root(mut self, root: impl Into<String>) -> Self {
		self.root = Some(root.into());
		self
	}

	#[must_use]
	pub fn with_list_key(mut self, key: impl Into<String>) -> Self {
		self.list_keys.push(key.into());
		self
	}
}

/// A settings tree kept in sync with one file on disk.
///
/// Every access first compares the file's modification time with the time of
/// the last read and reloads the whole tree when the file is newer. Every
/// mutation is written straight back to disk.
///
/// The store is not synchronized. Sharing one store between threads requires
/// external locking, since the check-mutate-write sequence is not atomic.
#[derive(Debug)]
pub struct SettingsStore {
	path: PathBuf,
	format: Format,
	options: StoreOptions,
	/// Assignment name found in the file on the last load.
	file_root: Option<String>,
	/// Always a `Value::Mapping`.
	tree: Value,
	modified: Option<SystemTime>,
	reloads: usize,
}

impl SettingsStore {
	/// Open the settings file at `path` with default options.
	pub fn open(path: impl Into<PathBuf>) -> SettingsResult<Self> {
		Self::open_with(path, StoreOptions::default())
	}

	/// Open the settings file at `path`. The format is taken from the file
	/// extension and the file is loaded immediately.
	pub fn open_with(path: impl Into<PathBuf>, options: StoreOptions) -> SettingsResult<Self> {
		let path = path.into();
		let format = Format::from_path(&path)?;
		let mut store = Self {
			path,
			format,
			options,
			file_root: None,
			tree: Value::Mapping(Mapping::new()),
			modified: None,
			reloads: 0,
		};

		store.reload()?;

		Ok(store)
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn format(&self) -> Format {
		self.format
	}

	pub fn options(&self) -> &StoreOptions {
		&self.options
	}

	/// Number of times the file has been read and parsed.
	pub fn reloads(&self) -> usize {
		self.reloads
	}

	/// The assignment name used when writing table literals.
	pub fn root_name(&self) -> &str {
		self.options
			.root
			.as_deref()
			.or(self.file_root.as_deref())
			.unwrap_or(DEFAULT_ROOT_NAME)
	}

	/// Returns `true` when the file changed after it was last read.
	pub fn is_stale(&self) -> SettingsResult<bool> {
		let modified = modified_time(&self.path)?;
		Ok(self.modified.is_none_or(|last| modified > last))
	}

	/// Read and parse the file unconditionally.
	///
	/// The modification time is recorded before parsing, so a broken file is
	/// reported once and the previous tree keeps being served until the file
	/// changes again. A file that parses to an empty tree also leaves the
	/// previous tree in place.
	pub fn reload(&mut self) -> SettingsResult<()> {
		self.modified = Some(modified_time(&self.path)?);
		let content = fs::read_to_string(&self.path)?;
		let document = decode(
			&content,
			self.format,
			&self.options.list_keys,
			&self.path.display().to_string(),
		)?;
		self.reloads += 1;

		if document.name.is_some() {
			self.file_root = document.name;
		}

		if document.root.is_empty() {
			debug!("{} is empty, keeping the current settings", self.path.display());
		} else {
			self.tree = Value::Mapping(document.root);
		}

		Ok(())
	}

	/// The single entry point for every read and write: reload when stale,
	/// then hand out the root.
	fn refresh(&mut self) -> SettingsResult<&mut Mapping> {
		if self.is_stale()? {
			debug!("{} changed, re-reading from disk", self.path.display());
			self.reload()?;
		}

		Ok(self.root_mut())
	}

	fn root(&self) -> &Mapping {
		let Value::Mapping(map) = &self.tree else {
			unreachable!("the settings root is always a mapping");
		};
		map
	}

	fn root_mut(&mut self) -> &mut Mapping {
		let Value::Mapping(map) = &mut self.tree else {
			unreachable!("the settings root is always a mapping");
		};
		map
	}

	pub fn get(&mut self, key: &str) -> SettingsResult<Option<&Value>> {
		Ok(self.refresh()?.get(key))
	}

	pub fn contains_key(&mut self, key: &str) -> SettingsResult<bool> {
		Ok(self.refresh()?.contains_key(key))
	}

	/// The whole, freshly checked settings tree.
	pub fn tree(&mut self) -> SettingsResult<&Mapping> {
		let root: &Mapping = self.refresh()?;
		Ok(root)
	}

	/// Run a path query over the freshly checked settings tree.
	pub fn query<'a>(&'a mut self, path: &'a PathSpec) -> SettingsResult<Query<'a>> {
		self.refresh()?;
		Ok(query(&self.tree, path))
	}

	/// Assign `value` to the top-level `key` and write the file.
	pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> SettingsResult<()> {
		let key = key.into();
		let value = value.into();
		self.update(|root| {
			root.insert(key, value);
		})
	}

	/// Remove the top-level `key` and write the file.
	pub fn remove(&mut self, key: &str) -> SettingsResult<Option<Value>> {
		self.update(|root| root.remove(key))
	}

	/// Apply an arbitrary mutation to the tree and write the file.
	///
	/// When the mutation leaves the tree empty, the change stays in memory but
	/// the file is not touched and [`SettingsError::EmptyWriteRefused`] is
	/// returned.
	pub fn update<R>(&mut self, mutate: impl FnOnce(&mut Mapping) -> R) -> SettingsResult<R> {
		let result = mutate(self.refresh()?);
		self.persist()?;

		Ok(result)
	}

	fn persist(&mut self) -> SettingsResult<()> {
		let root = self.root();

		if root.is_empty() {
			let name = self.path.file_name().map_or_else(
				|| self.path.display().to_string(),
				|name| name.to_string_lossy().into_owned(),
			);
			error!("writing of {name} aborted due to empty settings");

			return Err(SettingsError::EmptyWriteRefused {
				path: self.path.display().to_string(),
			});
		}

		let content = encode(root, self.format, self.root_name())?;
		write_atomic(&self.path, content.as_bytes())?;
		self.modified = Some(modified_time(&self.path)?);

		Ok(())
	}
}

fn modified_time(path: &Path) -> SettingsResult<SystemTime> {
	Ok(fs::metadata(path)?.modified()?)
}

/// Write through a sibling temporary file so readers never observe a
/// half-written settings file.
fn write_atomic(path: &Path, payload: &[u8]) -> SettingsResult<()> {
	let extension = path
		.extension()
		.and_then(|e| e.to_str())
		.unwrap_or_default();
	let temp_path = path.with_extension(format!(
		"{extension}.tmp-{}-{}",
		std::process::id(),
		SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map_or(0, |duration| duration.as_nanos())
	));

	fs::write(&temp_path, payload)?;

	if let Err(e) = fs::rename(&temp_path, path) {
		let _ = fs::remove_file(&temp_path);
		return Err(e.into());
	}

	Ok(())
}
