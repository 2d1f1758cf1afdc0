//! Classic 32-bit resource fork.
//!
//! ```text
//! 0      header     data_offset u32, map_offset u32, data_length u32, map_length u32
//! 16     reserved   zero padding up to 256
//! 256    data       per resource: length u32, bytes
//! map    header     preamble copy (16), next_map u32, file_ref u16, flags u16,
//!                   type_list_offset u16, name_list_offset u16            (28 bytes)
//!        type list  count-1 u16, per type: code[4], count-1 u16, ref_offset u16
//!        refs       per resource: id i16, name_offset u16, flags u8,
//!                   data_offset u24, handle u32                           (12 bytes)
//!        names      Pascal strings
//! ```
//!
//! All fields are big-endian.  Type list and name list offsets are relative
//! to the map; reference list offsets are relative to the type list; data
//! offsets are relative to the data section.  Type attributes cannot be
//! represented and are dropped on write.

use crate::attribute::Attributes;
use crate::data::{Block, ByteOrder, DataResult, Reader, Writer};
use crate::error::{ResourceError, Result};
use crate::instance::Instance;
use crate::resource_type::ResourceType;

use super::{check_code, ensure, fit, pstr_len, take_data, Format, OrReject, ParseResult, Stage};

const FORMAT: Format = Format::Classic;

const HEADER_SIZE:     usize = 256;
const PREAMBLE_SIZE:   usize = 16;
const MAP_HEADER_SIZE: usize = 28;
const TYPE_ENTRY_SIZE: usize = 8;
const REF_ENTRY_SIZE:  usize = 12;

const NO_NAME:         u16 = 0xFFFF;
const MAX_DATA_OFFSET: usize = 0xFF_FFFF;

// ── Parsing ──────────────────────────────────────────────────────────────────

pub fn parse(data: &Block, zero_copy: bool) -> ParseResult<Vec<ResourceType>> {
    let mut r = Reader::new(data);
    r.change_byte_order(ByteOrder::Msb);
    let size = r.size();
    let within = |offset: usize, length: usize| offset.checked_add(length).is_some_and(|end| end <= size);

    ensure(size >= PREAMBLE_SIZE, FORMAT, Stage::Preamble, "file shorter than the preamble")?;
    let preamble = read_preamble(&mut r).or_reject(FORMAT, Stage::Preamble)?;
    let [data_offset, map_offset, data_length, map_length] = preamble.map(|v| v as usize);

    ensure(
        data_offset >= PREAMBLE_SIZE && map_offset >= PREAMBLE_SIZE,
        FORMAT, Stage::Preamble, "sections overlap the preamble",
    )?;
    ensure(within(data_offset, data_length), FORMAT, Stage::Preamble, "data section out of bounds")?;
    ensure(
        map_length >= MAP_HEADER_SIZE && within(map_offset, map_length),
        FORMAT, Stage::Preamble, "map section out of bounds",
    )?;

    r.set_position(map_offset);
    let copy = read_preamble(&mut r).or_reject(FORMAT, Stage::Preamble)?;
    ensure(
        copy == preamble || copy == [0; 4],
        FORMAT, Stage::Preamble, "map preamble does not match the header",
    )?;

    // next_map, file_ref, flags
    r.move_by(8);
    let type_list_offset = r.read_u16().or_reject(FORMAT, Stage::Preamble)? as usize;
    let name_list_offset = r.read_u16().or_reject(FORMAT, Stage::Preamble)? as usize;
    ensure(
        type_list_offset < map_length && name_list_offset <= map_length,
        FORMAT, Stage::Preamble, "list offsets outside the map",
    )?;
    let type_list = map_offset + type_list_offset;
    let name_list = map_offset + name_list_offset;

    r.set_position(type_list);
    let entries = read_type_list(&mut r).or_reject(FORMAT, Stage::Types)?;

    let mut types = Vec::with_capacity(entries.len());
    for (code, count, ref_offset) in entries {
        let mut ty = ResourceType::new(code, Attributes::new());
        r.set_position(type_list + ref_offset);
        for _ in 0..count {
            let (id, name, payload) = read_reference(&mut r, name_list, data_offset, zero_copy)
                .or_reject(FORMAT, Stage::Instances)?;
            ty.add_resource(id, name, payload);
        }
        types.push(ty);
    }
    Ok(types)
}

fn read_preamble(r: &mut Reader) -> DataResult<[u32; 4]> {
    Ok([r.read_u32()?, r.read_u32()?, r.read_u32()?, r.read_u32()?])
}

/// `(code, instance count, reference list offset)` per type.
fn read_type_list(r: &mut Reader) -> DataResult<Vec<(String, usize, usize)>> {
    let count = r.read_u16()?.wrapping_add(1) as usize;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let code = r.read_code()?;
        let instances = r.read_u16()? as usize + 1;
        let ref_offset = r.read_u16()? as usize;
        entries.push((code, instances, ref_offset));
    }
    Ok(entries)
}

fn read_reference(
    r:           &mut Reader,
    name_list:   usize,
    data_offset: usize,
    zero_copy:   bool,
) -> DataResult<(i64, String, Block)> {
    let id = r.read_i16()?;
    let name_offset = r.read_u16()?;
    let _flags = r.read_u8()?;
    let data_at = r.read_triple()? as usize;
    let _handle = r.read_u32()?;

    r.save_position();
    let name = if name_offset == NO_NAME {
        String::new()
    } else {
        r.set_position(name_list + name_offset as usize);
        r.read_pstr()?
    };
    r.set_position(data_offset + data_at);
    let length = r.read_u32()? as usize;
    let payload = take_data(r, length, zero_copy)?;
    r.restore_position()?;

    Ok((i64::from(id), name, payload))
}

// ── Writing ──────────────────────────────────────────────────────────────────

struct Group<'a> {
    code:      [u8; 4],
    instances: Vec<&'a Instance>,
}

/// Validate every type and merge same-code types, which become
/// indistinguishable once their attributes are dropped.  Empty types have no
/// classic representation and are skipped.
fn group_by_code(types: &[ResourceType]) -> Result<Vec<Group<'_>>> {
    let mut groups: Vec<Group<'_>> = Vec::new();
    for ty in types {
        let code = check_code(ty.code())?;
        if ty.is_empty() {
            continue;
        }
        if !ty.attributes().is_empty() {
            tracing::warn!(
                code = ty.code(),
                attributes = %ty.attribute_string(),
                "classic format cannot store type attributes, dropping them"
            );
        }
        for instance in ty.instances() {
            i16::try_from(instance.id()).map_err(|_| ResourceError::IdOutOfRange {
                format: FORMAT,
                code:   ty.code().to_owned(),
                id:     instance.id(),
            })?;
        }
        match groups.iter_mut().find(|g| g.code == code) {
            Some(group) => group.instances.extend(ty.instances()),
            None => groups.push(Group { code, instances: ty.instances().iter().collect() }),
        }
    }
    if groups.len() > u16::MAX as usize {
        return Err(ResourceError::LimitExceeded { format: FORMAT, what: "type count" });
    }
    Ok(groups)
}

pub fn write(types: &[ResourceType]) -> Result<Block> {
    let groups = group_by_code(types)?;
    let instances = || groups.iter().flat_map(|g| g.instances.iter().copied());

    let mut w = Writer::new(ByteOrder::Msb);
    w.pad_to_size(HEADER_SIZE);

    let mut data_offsets = Vec::new();
    for instance in instances() {
        let offset = w.position() - HEADER_SIZE;
        if offset > MAX_DATA_OFFSET {
            return Err(ResourceError::LimitExceeded { format: FORMAT, what: "data section beyond 24-bit offsets" });
        }
        data_offsets.push(offset as u32);
        w.write_u32(fit(instance.size(), FORMAT, "resource size")?);
        w.write_data(instance.data());
    }
    let data_length = w.position() - HEADER_SIZE;
    let map_offset = w.position();

    let total = data_offsets.len();
    let type_list_size = 2 + TYPE_ENTRY_SIZE * groups.len();
    let name_list_offset: u16 = fit(
        MAP_HEADER_SIZE + type_list_size + REF_ENTRY_SIZE * total,
        FORMAT,
        "name list offset",
    )?;

    // Preamble copy is back-filled below.
    w.write_bytes(&[0u8; PREAMBLE_SIZE]);
    w.write_u32(0);
    w.write_u16(0);
    w.write_u16(0);
    w.write_u16(MAP_HEADER_SIZE as u16);
    w.write_u16(name_list_offset);

    w.write_u16((groups.len() as u16).wrapping_sub(1));
    let mut ref_offset = type_list_size;
    for group in &groups {
        w.write_bytes(&group.code);
        w.write_u16(fit(group.instances.len() - 1, FORMAT, "resources per type")?);
        w.write_u16(fit(ref_offset, FORMAT, "reference list offset")?);
        ref_offset += REF_ENTRY_SIZE * group.instances.len();
    }

    let mut name_offset = 0usize;
    for (instance, &data_offset) in instances().zip(&data_offsets) {
        w.write_i16(instance.id() as i16);
        if instance.name().is_empty() {
            w.write_u16(NO_NAME);
        } else {
            let offset: u16 = fit(name_offset, FORMAT, "name list size")?;
            if offset == NO_NAME {
                return Err(ResourceError::LimitExceeded { format: FORMAT, what: "name list size" });
            }
            w.write_u16(offset);
            name_offset += pstr_len(instance.name());
        }
        w.write_u8(0);
        w.write_triple(data_offset);
        w.write_u32(0);
    }
    for instance in instances().filter(|i| !i.name().is_empty()) {
        w.write_pstr(instance.name());
    }

    let map_length = w.size() - map_offset;
    let preamble: [u32; 4] = [
        HEADER_SIZE as u32,
        fit(map_offset, FORMAT, "map offset")?,
        fit(data_length, FORMAT, "data length")?,
        fit(map_length, FORMAT, "map length")?,
    ];
    for at in [0, map_offset] {
        w.patch(at, |w| preamble.iter().for_each(|&v| w.write_u32(v)));
    }
    Ok(w.into_block())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::namespace;

    fn text_type() -> ResourceType {
        let mut ty = ResourceType::new("TEXT", Attributes::new());
        ty.add_resource(128, "", Block::from(&b"hello"[..]));
        ty
    }

    #[test]
    fn layout_of_single_resource() {
        let block = write(&[text_type()]).unwrap();
        let r = Reader::new(&block);
        // 256 header + (4 + 5) data + 28 map header + 10 type list + 12 ref
        assert_eq!(block.size(), 256 + 9 + 28 + 10 + 12);
        assert_eq!(r.peek_u32(0).unwrap(), 256);
        assert_eq!(r.peek_u32(4).unwrap(), 265);
        assert_eq!(r.peek_u32(8).unwrap(), 9);
        assert_eq!(r.peek_u32(12).unwrap(), 50);
        assert_eq!(r.peek_bytes(265, 16).unwrap(), r.peek_bytes(0, 16).unwrap());
        // type list: one type, one resource
        assert_eq!(r.peek_u16(265 + 28).unwrap(), 0);
        assert_eq!(r.peek_bytes(265 + 30, 4).unwrap(), b"TEXT");
        assert_eq!(r.peek_u16(265 + 34).unwrap(), 0);
        // reference: id 128, unnamed, data offset 0
        assert_eq!(r.peek_i16(265 + 38).unwrap(), 128);
        assert_eq!(r.peek_u16(265 + 40).unwrap(), NO_NAME);
        assert_eq!(r.peek_triple(265 + 43).unwrap(), 0);
    }

    #[test]
    fn parse_round_trip() {
        let mut ty = text_type();
        ty.add_resource(-5, "Café", Block::from(&b""[..]));
        let block = write(&[ty]).unwrap();

        let types = parse(&block, true).unwrap();
        assert_eq!(types.len(), 1);
        let ty = &types[0];
        assert_eq!(ty.code(), "TEXT");
        assert_eq!(ty.resource_with_id(128).unwrap().data().to_vec(), b"hello");
        assert_eq!(ty.resource_with_id(128).unwrap().name(), "");
        assert_eq!(ty.resource_with_id(-5).unwrap().name(), "Café");
        assert!(ty.resource_with_id(128).unwrap().data().shares_storage_with(&block));
    }

    #[test]
    fn copying_parse_detaches_payloads() {
        let block = write(&[text_type()]).unwrap();
        let types = parse(&block, false).unwrap();
        assert!(!types[0].instances()[0].data().shares_storage_with(&block));
    }

    #[test]
    fn zeroed_map_preamble_is_accepted() {
        let mut block = write(&[text_type()]).unwrap();
        block.fill(0, PREAMBLE_SIZE, 265);
        assert!(parse(&block, true).is_ok());

        block.fill(1, 1, 265);
        let rejection = parse(&block, true).unwrap_err();
        assert_eq!(rejection.stage, Stage::Preamble);
    }

    #[test]
    fn empty_file_round_trips() {
        let block = write(&[]).unwrap();
        assert!(parse(&block, true).unwrap().is_empty());
    }

    #[test]
    fn attributes_are_dropped_and_types_merged() {
        let mut a = ResourceType::new("snd ", namespace("one"));
        a.add_resource(1, "a", Block::from(&b"1"[..]));
        let mut b = ResourceType::new("snd ", namespace("two"));
        b.add_resource(2, "b", Block::from(&b"2"[..]));

        let types = parse(&write(&[a, b]).unwrap(), true).unwrap();
        assert_eq!(types.len(), 1);
        assert!(types[0].attributes().is_empty());
        assert_eq!(types[0].len(), 2);
    }

    #[test]
    fn wide_ids_are_refused() {
        let mut ty = ResourceType::new("TEXT", Attributes::new());
        ty.add_resource(40_000, "", Block::empty());
        assert!(matches!(write(&[ty]), Err(ResourceError::IdOutOfRange { id: 40_000, .. })));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let block = write(&[text_type()]).unwrap();
        let short = block.slice(0, block.size() - 1, true).unwrap();
        assert!(parse(&short, true).is_err());
    }
}
