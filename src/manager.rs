//! Registry of loaded resource files and cross-file queries.
//!
//! A [`Manager`] is an ordinary value; create one and pass it to whatever
//! needs cross-file lookups.  For callers that want a single implicit
//! registry, [`with_shared`] gives access to a default instance.  Blocks are
//! reference counted without atomics, so that default is per thread.
//!
//! Files are searched most-recently-imported first, so a resource in a newer
//! file shadows one with the same type code and id in an older file.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::attribute::{self, Attributes};
use crate::error::Result;
use crate::file::{File, ReadOptions};
use crate::hashing;
use crate::instance::Instance;
use crate::resource_type::ResourceType;
use crate::result::QueryResult;

#[derive(Debug, Default)]
pub struct Manager {
    files:     HashMap<u64, File>,
    /// File hashes, most recent first.
    order:     Vec<u64>,
    anonymous: u64,
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Loading ──────────────────────────────────────────────────────────────

    pub fn import_file<P: AsRef<Path>>(&mut self, path: P) -> Result<u64> {
        self.import_file_with(path, &ReadOptions::default())
    }

    pub fn import_file_with<P: AsRef<Path>>(&mut self, path: P, options: &ReadOptions) -> Result<u64> {
        let file = File::open_with(path, options)?;
        Ok(self.import(file))
    }

    /// Register an already loaded file and return its hash.  Re-importing a
    /// path replaces the earlier file and moves it to the front.  Files
    /// without a path get a fresh key every time.
    pub fn import(&mut self, file: File) -> u64 {
        let hash = match file.path() {
            Some(path) => File::hash_for_path(path),
            None => {
                self.anonymous += 1;
                hashing::hash_str(&format!("<memory:{}>", self.anonymous))
            }
        };
        tracing::debug!(
            hash = format_args!("{hash:016x}"),
            path = ?file.path(),
            format = file.format().name(),
            "imported resource file"
        );
        self.files.insert(hash, file);
        self.order.retain(|&h| h != hash);
        self.order.insert(0, hash);
        hash
    }

    pub fn unload_file(&mut self, hash: u64) -> Option<File> {
        let file = self.files.remove(&hash)?;
        self.order.retain(|&h| h != hash);
        Some(file)
    }

    pub fn unload_path<P: AsRef<Path>>(&mut self, path: P) -> Option<File> {
        self.unload_file(File::hash_for_path(path))
    }

    /// Drop every loaded file.
    pub fn tear_down(&mut self) {
        self.files.clear();
        self.order.clear();
    }

    // ── Access ───────────────────────────────────────────────────────────────

    pub fn file(&self, hash: u64) -> Option<&File> {
        self.files.get(&hash)
    }

    pub fn file_mut(&mut self, hash: u64) -> Option<&mut File> {
        self.files.get_mut(&hash)
    }

    pub fn file_for_path<P: AsRef<Path>>(&self, path: P) -> Option<&File> {
        self.file(File::hash_for_path(path))
    }

    /// Loaded files, most recently imported first.
    pub fn files(&self) -> impl Iterator<Item = &File> + '_ {
        self.order.iter().filter_map(|h| self.files.get(h))
    }

    pub fn len(&self) -> usize { self.order.len() }

    pub fn is_empty(&self) -> bool { self.order.is_empty() }

    /// Every distinct type code across all files, sorted.
    pub fn type_codes(&self) -> Vec<String> {
        self.files()
            .flat_map(|f| f.types().iter().map(|t| t.code().to_owned()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Every type with `code` whose attributes satisfy `attributes`, in file
    /// load order.
    fn matching_types<'a: 'q, 'q>(
        &'a self,
        code:       &'q str,
        attributes: &'q Attributes,
    ) -> impl Iterator<Item = &'a ResourceType> + 'q {
        self.files()
            .flat_map(|f| f.types())
            .filter(move |t| t.code() == code && attribute::matches(attributes, t.attributes()))
    }

    /// All instances of `code` across files, one per id, sorted by id.
    pub fn find_all(&self, code: &str, attributes: &Attributes) -> QueryResult<'_> {
        QueryResult::from_instances(self.matching_types(code, attributes).flat_map(|t| t.instances()))
    }

    /// The instance of `code` with `id` from the most recent file that has
    /// one.
    pub fn find(&self, code: &str, id: i64, attributes: &Attributes) -> Option<&Instance> {
        self.matching_types(code, attributes).find_map(|t| t.resource_with_id(id))
    }

    /// Instances of `code` whose name starts with `prefix`.
    pub fn find_named(&self, code: &str, prefix: &str, attributes: &Attributes) -> QueryResult<'_> {
        let named: Vec<&Instance> = self
            .matching_types(code, attributes)
            .flat_map(|t| t.resources_with_name_prefix(prefix))
            .collect();
        QueryResult::from_instances(named)
    }
}

// ── Shared default ───────────────────────────────────────────────────────────

thread_local! {
    static SHARED: RefCell<Manager> = RefCell::new(Manager::new());
}

/// Run `f` against this thread's default manager.
///
/// # Panics
/// Panics if called re-entrantly from inside `f`.
pub fn with_shared<T>(f: impl FnOnce(&mut Manager) -> T) -> T {
    SHARED.with(|manager| f(&mut manager.borrow_mut()))
}
