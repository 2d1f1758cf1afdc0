//! An in-memory resource file and its on-disk round trip.
//!
//! A [`File`] owns its types in insertion order plus a hash index keyed by
//! [`ResourceType::hash_for_code`].  When loaded from disk it also keeps the
//! file's backing [`Block`] alive; with zero-copy reads every instance
//! payload is a view into it.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::attribute::Attributes;
use crate::data::{Block, ByteOrder};
use crate::error::{ResourceError, Result};
use crate::format::{self, Format, SNIFF_ORDER};
use crate::hashing;
use crate::instance::Instance;
use crate::resource_type::ResourceType;

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Formats to try, in order.
    pub formats:   Vec<Format>,
    /// Hand out payloads as views of the file buffer instead of copies.
    pub zero_copy: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            formats:   SNIFF_ORDER.to_vec(),
            zero_copy: true,
        }
    }
}

// ── File ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct File {
    path:    Option<PathBuf>,
    format:  Format,
    types:   Vec<ResourceType>,
    index:   HashMap<u64, usize>,
    backing: Option<Block>,
}

impl File {
    /// An empty file that will be written as `format`.
    pub fn new(format: Format) -> Self {
        Self {
            path: None,
            format,
            types: Vec::new(),
            index: HashMap::new(),
            backing: None,
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, &ReadOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<Self> {
        let path = path.as_ref();
        let block = Block::from_file(path, ByteOrder::Msb)?;
        let mut file = Self::from_block(block, options).ok_or_else(|| ResourceError::UnrecognisedFormat {
            path: path.to_owned(),
        })?;
        file.path = Some(path.to_owned());
        tracing::debug!(
            path = %path.display(),
            format = file.format.name(),
            types = file.types.len(),
            instances = file.instance_count(),
            "opened resource file"
        );
        Ok(file)
    }

    /// Parse an in-memory image.  `None` when no format in `options`
    /// accepts it.
    pub fn from_block(block: Block, options: &ReadOptions) -> Option<Self> {
        let (format, types) = format::sniff(&block, &options.formats, options.zero_copy)?;
        let mut file = Self::new(format);
        for ty in types {
            file.add_type(ty);
        }
        if options.zero_copy {
            file.backing = Some(block);
        }
        Some(file)
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    /// Detected or declared format; used by writes that do not override it.
    pub fn format(&self) -> Format { self.format }

    pub fn set_format(&mut self, format: Format) {
        self.format = format;
    }

    /// Whole-file buffer backing zero-copy payloads, if any.
    pub fn backing(&self) -> Option<&Block> {
        self.backing.as_ref()
    }

    pub fn types(&self) -> &[ResourceType] { &self.types }

    /// Distinct type codes in first-seen order.
    pub fn type_codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = Vec::new();
        for ty in &self.types {
            if !codes.contains(&ty.code()) {
                codes.push(ty.code());
            }
        }
        codes
    }

    pub fn instance_count(&self) -> usize {
        self.types.iter().map(ResourceType::len).sum()
    }

    /// Hash under which a manager registers the file at `path`.
    pub fn hash_for_path<P: AsRef<Path>>(path: P) -> u64 {
        hashing::hash_str(&path.as_ref().to_string_lossy())
    }

    // ── Types ────────────────────────────────────────────────────────────────

    pub fn type_for(&self, code: &str, attributes: &Attributes) -> Option<&ResourceType> {
        let index = *self.index.get(&ResourceType::hash_for_code(code, attributes))?;
        self.types.get(index)
    }

    pub fn type_for_mut(&mut self, code: &str, attributes: &Attributes) -> Option<&mut ResourceType> {
        let index = *self.index.get(&ResourceType::hash_for_code(code, attributes))?;
        self.types.get_mut(index)
    }

    /// Insert `ty`.  A type with the same code and attributes absorbs its
    /// instances instead.
    pub fn add_type(&mut self, ty: ResourceType) -> &mut ResourceType {
        let hash = ty.hash();
        match self.index.get(&hash) {
            Some(&index) => {
                let existing = &mut self.types[index];
                for instance in ty.instances() {
                    existing.push(instance.clone());
                }
                existing
            }
            None => {
                let index = self.types.len();
                self.index.insert(hash, index);
                self.types.push(ty);
                &mut self.types[index]
            }
        }
    }

    pub fn remove_type(&mut self, code: &str, attributes: &Attributes) -> Option<ResourceType> {
        let index = self.index.remove(&ResourceType::hash_for_code(code, attributes))?;
        let removed = self.types.remove(index);
        for slot in self.index.values_mut() {
            if *slot > index {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    /// Find or create the type for `code`/`attributes` and append an
    /// instance to it.
    pub fn add_resource(
        &mut self,
        code:       &str,
        id:         i64,
        name:       &str,
        data:       Block,
        attributes: &Attributes,
    ) -> &mut Instance {
        let hash = ResourceType::hash_for_code(code, attributes);
        let index = match self.index.get(&hash) {
            Some(&index) => index,
            None => {
                self.types.push(ResourceType::new(code, attributes.clone()));
                self.index.insert(hash, self.types.len() - 1);
                self.types.len() - 1
            }
        };
        self.types[index].add_resource(id, name, data)
    }

    // ── Writing ──────────────────────────────────────────────────────────────

    /// Encode as `format`, or the file's own format when `None`.
    pub fn to_block(&self, format: Option<Format>) -> Result<Block> {
        format.unwrap_or(self.format).write(&self.types)
    }

    /// Encode and write to `path`.  The image is built completely in memory
    /// first, so a failed encode never touches the destination.
    pub fn write<P: AsRef<Path>>(&self, path: P, format: Option<Format>) -> Result<()> {
        let block = self.to_block(format)?;
        block.save(path.as_ref())?;
        Ok(())
    }

    /// Write back to the path the file was opened from (or last assigned).
    pub fn save(&self) -> Result<()> {
        let path = self.path.as_deref().ok_or_else(|| ResourceError::Io {
            path:   PathBuf::new(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "resource file has no path"),
        })?;
        self.write(path, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::namespace;

    #[test]
    fn add_resource_reuses_types_by_hash() {
        let mut file = File::new(Format::Extended);
        file.add_resource("snd ", 1, "a", Block::empty(), &Attributes::new());
        file.add_resource("snd ", 2, "b", Block::empty(), &Attributes::new());
        file.add_resource("snd ", 3, "c", Block::empty(), &namespace("custom"));
        assert_eq!(file.types().len(), 2);
        assert_eq!(file.type_codes(), ["snd "]);
        assert_eq!(file.instance_count(), 3);
        assert_eq!(file.type_for("snd ", &Attributes::new()).unwrap().len(), 2);
    }

    #[test]
    fn add_type_merges_same_identity() {
        let mut file = File::new(Format::Classic);
        let mut a = ResourceType::new("TEXT", Attributes::new());
        a.add_resource(1, "", Block::empty());
        let mut b = ResourceType::new("TEXT", Attributes::new());
        b.add_resource(2, "", Block::empty());
        file.add_type(a);
        file.add_type(b);
        assert_eq!(file.types().len(), 1);
        assert_eq!(file.types()[0].len(), 2);
    }

    #[test]
    fn remove_type_keeps_index_consistent() {
        let mut file = File::new(Format::Extended);
        file.add_resource("AAAA", 1, "", Block::empty(), &Attributes::new());
        file.add_resource("BBBB", 1, "", Block::empty(), &Attributes::new());
        file.add_resource("CCCC", 1, "", Block::empty(), &Attributes::new());
        assert!(file.remove_type("AAAA", &Attributes::new()).is_some());
        assert_eq!(file.type_for("CCCC", &Attributes::new()).unwrap().code(), "CCCC");
        assert!(file.type_for("AAAA", &Attributes::new()).is_none());
    }

    #[test]
    fn from_block_detects_format_and_keeps_backing() {
        let mut file = File::new(Format::Rez);
        file.add_resource("PICT", 7, "x", Block::from(&b"abc"[..]), &Attributes::new());
        let image = file.to_block(None).unwrap();

        let parsed = File::from_block(image, &ReadOptions::default()).unwrap();
        assert_eq!(parsed.format(), Format::Rez);
        let backing = parsed.backing().unwrap();
        let ty = parsed.type_for("PICT", &Attributes::new()).unwrap();
        assert!(ty.resource_with_id(7).unwrap().data().shares_storage_with(backing));

        let copied = File::from_block(
            parsed.to_block(None).unwrap(),
            &ReadOptions { zero_copy: false, ..Default::default() },
        )
        .unwrap();
        assert!(copied.backing().is_none());
    }

    #[test]
    fn restricted_format_list() {
        let mut file = File::new(Format::Classic);
        file.add_resource("TEXT", 1, "", Block::empty(), &Attributes::new());
        let image = file.to_block(None).unwrap();
        let options = ReadOptions { formats: vec![Format::Extended, Format::Rez], ..Default::default() };
        assert!(File::from_block(image, &options).is_none());
    }

    #[test]
    fn save_without_path_fails() {
        assert!(matches!(File::new(Format::Classic).save(), Err(ResourceError::Io { .. })));
    }
}
