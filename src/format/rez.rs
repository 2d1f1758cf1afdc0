//! `BRGR` rez archive.
//!
//! The header and entry table are little-endian; the map that follows the
//! resource data is big-endian.
//!
//! ```text
//! 0      signature      "BRGR"
//! 4      header (LE)    version u32 (=1), header_length u32, unknown u32 (=1),
//!                       first_index u32 (=1), entry_count u32
//! 24     entries (LE)   per entry: offset u32, size u32, unknown u32 (=0)
//!        token          "resource.map\0"
//!        data           resource payloads, back to back
//!        map (BE)       header_length u32 (=8), type_count u32,
//!                       per type: code[4], offset u32, count u32       (12 bytes)
//!                       per resource: index u32, code[4], id i16,
//!                       name[256]                                      (266 bytes)
//! ```
//!
//! Entry offsets are absolute.  The last entry describes the map itself.
//! Type offsets are relative to the start of the map.  Type attributes are
//! not representable.

use crate::attribute::Attributes;
use crate::data::{Block, ByteOrder, DataResult, Reader, Writer};
use crate::error::{ResourceError, Result};
use crate::instance::Instance;
use crate::resource_type::ResourceType;

use super::{check_code, ensure, fit, take_data, Format, OrReject, ParseResult, Rejection, Stage};

const FORMAT: Format = Format::Rez;

const SIGNATURE: u32 = u32::from_be_bytes(*b"BRGR");
const VERSION:   u32 = 1;
const MAP_NAME:  &[u8; 13] = b"resource.map\0";

const HEADER_FIELDS_SIZE: usize = 24;
const ENTRY_SIZE:         usize = 12;
const MAP_HEADER_LENGTH:  u32 = 8;
const MAP_TYPE_SIZE:      usize = 12;
const MAP_RESOURCE_SIZE:  usize = 266;
const NAME_FIELD_SIZE:    usize = 256;

/// `header_length` counts everything after the first 12 bytes of the file up
/// to the end of the map name token.
fn header_length(entry_count: usize) -> usize {
    12 + ENTRY_SIZE * entry_count + MAP_NAME.len()
}

// ── Parsing ──────────────────────────────────────────────────────────────────

struct Header {
    version:       u32,
    header_length: u32,
    first_index:   u32,
    entries:       Vec<(usize, usize)>,
}

pub fn parse(data: &Block, zero_copy: bool) -> ParseResult<Vec<ResourceType>> {
    let mut r = Reader::new(data);
    r.change_byte_order(ByteOrder::Msb);
    let size = r.size();

    ensure(size >= HEADER_FIELDS_SIZE, FORMAT, Stage::Preamble, "file shorter than the header")?;
    let signature = r.read_u32().or_reject(FORMAT, Stage::Preamble)?;
    ensure(signature == SIGNATURE, FORMAT, Stage::Preamble, "missing BRGR signature")?;

    let header = r
        .with_byte_order(ByteOrder::Lsb, |r| read_header(r, size))
        .or_reject(FORMAT, Stage::Preamble)?
        .ok_or_else(|| Rejection::new(FORMAT, Stage::Preamble, "entry table exceeds the file"))?;
    ensure(header.version == VERSION, FORMAT, Stage::Preamble, "unsupported version")?;
    ensure(!header.entries.is_empty(), FORMAT, Stage::Preamble, "no map entry")?;
    ensure(
        header.header_length as usize == header_length(header.entries.len()),
        FORMAT, Stage::Preamble, "header length does not match the entry count",
    )?;
    let token = r.read_bytes(MAP_NAME.len()).or_reject(FORMAT, Stage::Preamble)?;
    ensure(token == MAP_NAME, FORMAT, Stage::Preamble, "missing resource.map token")?;
    ensure(
        header
            .entries
            .iter()
            .all(|&(offset, length)| offset.checked_add(length).is_some_and(|end| end <= size)),
        FORMAT, Stage::Preamble, "entry outside the file",
    )?;

    let (resources, map) = header.entries.split_at(header.entries.len() - 1);
    let (map_offset, map_length) = map[0];
    ensure(map_length >= 8, FORMAT, Stage::Preamble, "map shorter than its header")?;

    r.set_position(map_offset);
    let entries = read_type_table(&mut r, map_length).or_reject(FORMAT, Stage::Types)?;
    ensure(
        entries.iter().all(|&(_, _, count)| count <= map_length / MAP_RESOURCE_SIZE),
        FORMAT, Stage::Types, "type counts exceed the map",
    )?;

    let mut types = Vec::with_capacity(entries.len());
    for (code, offset, count) in entries {
        let mut ty = ResourceType::new(code, Attributes::new());
        r.set_position(map_offset.saturating_add(offset));
        for _ in 0..count {
            let (index, id, name) = read_resource(&mut r).or_reject(FORMAT, Stage::Instances)?;
            let &(data_offset, data_length) = index
                .checked_sub(header.first_index)
                .and_then(|i| resources.get(i as usize))
                .ok_or_else(|| Rejection::new(FORMAT, Stage::Instances, "resource index out of range"))?;

            r.save_position();
            r.set_position(data_offset);
            let payload = take_data(&mut r, data_length, zero_copy).or_reject(FORMAT, Stage::Instances)?;
            r.restore_position().or_reject(FORMAT, Stage::Instances)?;
            ty.add_resource(i64::from(id), name, payload);
        }
        types.push(ty);
    }
    Ok(types)
}

/// Little-endian header fields and entry table.  `None` when the declared
/// entry count cannot fit in a file of `size` bytes.
fn read_header(r: &mut Reader, size: usize) -> DataResult<Option<Header>> {
    let version = r.read_u32()?;
    let header_length = r.read_u32()?;
    let _unknown = r.read_u32()?;
    let first_index = r.read_u32()?;
    let count = r.read_u32()? as usize;
    if count > size / ENTRY_SIZE {
        return Ok(None);
    }

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let offset = r.read_u32()? as usize;
        let length = r.read_u32()? as usize;
        let _unknown = r.read_u32()?;
        entries.push((offset, length));
    }
    Ok(Some(Header { version, header_length, first_index, entries }))
}

/// `(code, offset from map start, resource count)` per type.
fn read_type_table(r: &mut Reader, map_length: usize) -> DataResult<Vec<(String, usize, usize)>> {
    let _header_length = r.read_u32()?;
    let count = (r.read_u32()? as usize).min(map_length / MAP_TYPE_SIZE);
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let code = r.read_code()?;
        let offset = r.read_u32()? as usize;
        let resources = r.read_u32()? as usize;
        entries.push((code, offset, resources));
    }
    Ok(entries)
}

fn read_resource(r: &mut Reader) -> DataResult<(u32, i16, String)> {
    let index = r.read_u32()?;
    let _code = r.read_code()?;
    let id = r.read_i16()?;
    let name = r.read_cstr(Some(NAME_FIELD_SIZE))?;
    Ok((index, id, name))
}

// ── Writing ──────────────────────────────────────────────────────────────────

/// Refuse anything the format cannot hold before a single byte is produced.
fn validate(types: &[ResourceType]) -> Result<Vec<[u8; 4]>> {
    types
        .iter()
        .map(|ty| {
            let code = check_code(ty.code())?;
            if !ty.attributes().is_empty() {
                return Err(ResourceError::AttributesUnsupported {
                    format: FORMAT,
                    code:   ty.code().to_owned(),
                });
            }
            if let Some(bad) = ty.instances().iter().find(|i| i16::try_from(i.id()).is_err()) {
                return Err(ResourceError::IdOutOfRange {
                    format: FORMAT,
                    code:   ty.code().to_owned(),
                    id:     bad.id(),
                });
            }
            Ok(code)
        })
        .collect()
}

pub fn write(types: &[ResourceType]) -> Result<Block> {
    let codes = validate(types)?;
    let resources: Vec<(&[u8; 4], &Instance)> = types
        .iter()
        .zip(&codes)
        .flat_map(|(ty, code)| ty.instances().iter().map(move |i| (code, i)))
        .collect();

    let entry_count = resources.len() + 1;
    let header_length = header_length(entry_count);
    let data_start = 12 + header_length;
    let map_length = 8 + MAP_TYPE_SIZE * types.len() + MAP_RESOURCE_SIZE * resources.len();

    let mut entries = Vec::with_capacity(entry_count);
    let mut offset = data_start;
    for (_, instance) in &resources {
        entries.push((offset, instance.size()));
        offset += instance.size();
    }
    entries.push((offset, map_length));
    fit::<u32>(offset + map_length, FORMAT, "file size")?;
    let type_count: u32 = fit(types.len(), FORMAT, "type count")?;

    let mut w = Writer::with_capacity(offset + map_length, ByteOrder::Msb);
    w.write_u32(SIGNATURE);
    w.with_byte_order(ByteOrder::Lsb, |w| {
        w.write_u32(VERSION);
        w.write_u32(header_length as u32);
        w.write_u32(1);
        w.write_u32(1);
        w.write_u32(entry_count as u32);
        for &(offset, length) in &entries {
            w.write_u32(offset as u32);
            w.write_u32(length as u32);
            w.write_u32(0);
        }
    });
    w.write_bytes(MAP_NAME);

    for (_, instance) in &resources {
        w.write_data(instance.data());
    }

    w.write_u32(MAP_HEADER_LENGTH);
    w.write_u32(type_count);
    let mut record = 0;
    for (ty, code) in types.iter().zip(&codes) {
        w.write_bytes(code);
        w.write_u32((8 + MAP_TYPE_SIZE * types.len() + MAP_RESOURCE_SIZE * record) as u32);
        w.write_u32(ty.len() as u32);
        record += ty.len();
    }
    for (index, (code, instance)) in resources.iter().enumerate() {
        w.write_u32(index as u32 + 1);
        w.write_bytes(*code);
        w.write_i16(instance.id() as i16);
        w.write_cstr(instance.name(), Some(NAME_FIELD_SIZE));
    }

    Ok(w.into_block())
}
