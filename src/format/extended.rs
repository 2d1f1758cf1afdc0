//! Extended 64-bit resource file.
//!
//! Same shape as the classic fork with every offset, length and count
//! widened to 64 bits, plus a per-type attribute list so that one code can
//! exist in several namespaces.
//!
//! ```text
//! 0      header     version u64 (=1), data_offset u64, map_offset u64,
//!                   data_length u64, map_length u64
//! 40     reserved   zero padding up to 256
//! 256    data       per resource: length u64, bytes
//! map    header     preamble copy (32), next_map u64, file_ref u16, flags u16,
//!                   type_list_offset u64, name_list_offset u64,
//!                   attribute_list_offset u64                          (68 bytes)
//!        type list  count-1 u64, per type: code[4], count-1 u64, ref_offset u64,
//!                   attribute_count u64, attribute_offset u64           (36 bytes)
//!        refs       per resource: id i64, name_offset u64, flags u8,
//!                   data_offset u64, handle u32                         (29 bytes)
//!        names      Pascal strings
//!        attributes per attribute: key cstr, value cstr
//! ```
//!
//! All fields are big-endian.  The file is accepted only when the version is
//! 1, the map directly follows the data, the map ends the file and the
//! in-map preamble equals the header.

use crate::attribute::Attributes;
use crate::data::{macroman, Block, ByteOrder, DataResult, Reader, Writer};
use crate::error::Result;
use crate::resource_type::ResourceType;

use super::{check_code, ensure, pstr_len, take_data, Format, OrReject, ParseResult, Stage};

const FORMAT: Format = Format::Extended;

const VERSION:         u64 = 1;
const HEADER_SIZE:     usize = 256;
const PREAMBLE_SIZE:   usize = 32;
const MAP_HEADER_SIZE: usize = 68;
const TYPE_ENTRY_SIZE: usize = 36;
const REF_ENTRY_SIZE:  usize = 29;

/// Position of `attribute_list_offset` inside the map header.
const ATTRIBUTE_LIST_FIELD: usize = 60;

const NO_NAME: u64 = u64::MAX;

#[inline]
fn wide(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

// ── Parsing ──────────────────────────────────────────────────────────────────

struct TypeEntry {
    code:             String,
    count:            u64,
    ref_offset:       u64,
    attribute_count:  u64,
    attribute_offset: u64,
}

pub fn parse(data: &Block, zero_copy: bool) -> ParseResult<Vec<ResourceType>> {
    let mut r = Reader::new(data);
    r.change_byte_order(ByteOrder::Msb);
    let size = r.size() as u64;

    ensure(size >= 8 + PREAMBLE_SIZE as u64, FORMAT, Stage::Preamble, "file shorter than the header")?;
    let version = r.read_u64().or_reject(FORMAT, Stage::Preamble)?;
    ensure(version == VERSION, FORMAT, Stage::Preamble, "unsupported version")?;

    let preamble = read_preamble(&mut r).or_reject(FORMAT, Stage::Preamble)?;
    let [data_offset, map_offset, data_length, map_length] = preamble;
    ensure(
        data_offset.checked_add(data_length) == Some(map_offset),
        FORMAT, Stage::Preamble, "map does not follow the data section",
    )?;
    ensure(
        map_offset.checked_add(map_length) == Some(size),
        FORMAT, Stage::Preamble, "map does not end the file",
    )?;
    ensure(
        map_length >= MAP_HEADER_SIZE as u64,
        FORMAT, Stage::Preamble, "map shorter than its header",
    )?;

    // Everything below is bounded by the file size, so fits a usize.
    let (data_offset, map_offset, map_length) = (wide(data_offset), wide(map_offset), wide(map_length));

    r.set_position(map_offset);
    let copy = read_preamble(&mut r).or_reject(FORMAT, Stage::Preamble)?;
    ensure(copy == preamble, FORMAT, Stage::Preamble, "map preamble does not match the header")?;

    // next_map, file_ref, flags
    r.move_by(12);
    let lists = [
        r.read_u64().or_reject(FORMAT, Stage::Preamble)?,
        r.read_u64().or_reject(FORMAT, Stage::Preamble)?,
        r.read_u64().or_reject(FORMAT, Stage::Preamble)?,
    ];
    ensure(
        lists.iter().all(|&offset| offset <= map_length as u64),
        FORMAT, Stage::Preamble, "list offsets outside the map",
    )?;
    let [type_list, name_list, attribute_list] = lists.map(|offset| map_offset + wide(offset));

    r.set_position(type_list);
    let entries = read_type_list(&mut r, map_length)?;

    let mut types = Vec::with_capacity(entries.len());
    for entry in entries {
        r.set_position(attribute_list.saturating_add(wide(entry.attribute_offset)));
        let attributes = read_attributes(&mut r, entry.attribute_count).or_reject(FORMAT, Stage::Types)?;
        let mut ty = ResourceType::new(entry.code, attributes);

        r.set_position(type_list.saturating_add(wide(entry.ref_offset)));
        for _ in 0..entry.count {
            let (id, name, payload) = read_reference(&mut r, name_list, data_offset, zero_copy)
                .or_reject(FORMAT, Stage::Instances)?;
            ty.add_resource(id, name, payload);
        }
        types.push(ty);
    }
    Ok(types)
}

fn read_preamble(r: &mut Reader) -> DataResult<[u64; 4]> {
    Ok([r.read_u64()?, r.read_u64()?, r.read_u64()?, r.read_u64()?])
}

fn read_type_list(r: &mut Reader, map_length: usize) -> ParseResult<Vec<TypeEntry>> {
    let count = r.read_u64().or_reject(FORMAT, Stage::Types)?.wrapping_add(1);
    ensure(
        count <= (map_length / TYPE_ENTRY_SIZE) as u64,
        FORMAT, Stage::Types, "type count exceeds the map",
    )?;

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let entry = read_type_entry(r).or_reject(FORMAT, Stage::Types)?;
        ensure(
            entry.count <= (map_length / REF_ENTRY_SIZE) as u64
                && entry.attribute_count <= (map_length / 2) as u64,
            FORMAT, Stage::Types, "type entry counts exceed the map",
        )?;
        entries.push(entry);
    }
    Ok(entries)
}

fn read_type_entry(r: &mut Reader) -> DataResult<TypeEntry> {
    Ok(TypeEntry {
        code:             r.read_code()?,
        count:            r.read_u64()?.wrapping_add(1),
        ref_offset:       r.read_u64()?,
        attribute_count:  r.read_u64()?,
        attribute_offset: r.read_u64()?,
    })
}

fn read_attributes(r: &mut Reader, count: u64) -> DataResult<Attributes> {
    let mut attributes = Attributes::new();
    for _ in 0..count {
        let key = r.read_cstr(None)?;
        let value = r.read_cstr(None)?;
        attributes.insert(key, value);
    }
    Ok(attributes)
}

fn read_reference(
    r:           &mut Reader,
    name_list:   usize,
    data_offset: usize,
    zero_copy:   bool,
) -> DataResult<(i64, String, Block)> {
    let id = r.read_i64()?;
    let name_offset = r.read_u64()?;
    let _flags = r.read_u8()?;
    let data_at = r.read_u64()?;
    let _handle = r.read_u32()?;

    r.save_position();
    let name = if name_offset == NO_NAME {
        String::new()
    } else {
        r.set_position(name_list.saturating_add(wide(name_offset)));
        r.read_pstr()?
    };
    r.set_position(data_offset.saturating_add(wide(data_at)));
    let length = wide(r.read_u64()?);
    let payload = take_data(r, length, zero_copy)?;
    r.restore_position()?;

    Ok((id, name, payload))
}

// ── Writing ──────────────────────────────────────────────────────────────────

fn attribute_list_len(attributes: &Attributes) -> usize {
    attributes
        .iter()
        .map(|(k, v)| macroman::encode(k).len() + macroman::encode(v).len() + 2)
        .sum()
}

pub fn write(types: &[ResourceType]) -> Result<Block> {
    let codes = types
        .iter()
        .map(|ty| check_code(ty.code()))
        .collect::<Result<Vec<_>>>()?;
    let instances = || types.iter().flat_map(|ty| ty.instances());

    let mut w = Writer::new(ByteOrder::Msb);
    w.pad_to_size(HEADER_SIZE);

    let mut data_offsets = Vec::new();
    for instance in instances() {
        data_offsets.push((w.position() - HEADER_SIZE) as u64);
        w.write_u64(instance.size() as u64);
        w.write_data(instance.data());
    }
    let data_length = w.position() - HEADER_SIZE;
    let map_offset = w.position();

    let type_list_size = 8 + TYPE_ENTRY_SIZE * types.len();
    let name_list_offset = MAP_HEADER_SIZE + type_list_size + REF_ENTRY_SIZE * data_offsets.len();

    // Preamble copy and attribute list offset are back-filled below.
    w.write_bytes(&[0u8; PREAMBLE_SIZE]);
    w.write_u64(0);
    w.write_u16(0);
    w.write_u16(0);
    w.write_u64(MAP_HEADER_SIZE as u64);
    w.write_u64(name_list_offset as u64);
    w.write_u64(0);

    w.write_u64((types.len() as u64).wrapping_sub(1));
    let mut ref_offset = type_list_size;
    let mut attribute_offset = 0;
    for (ty, code) in types.iter().zip(&codes) {
        w.write_bytes(code);
        w.write_u64((ty.len() as u64).wrapping_sub(1));
        w.write_u64(ref_offset as u64);
        w.write_u64(ty.attributes().len() as u64);
        w.write_u64(attribute_offset as u64);
        ref_offset += REF_ENTRY_SIZE * ty.len();
        attribute_offset += attribute_list_len(ty.attributes());
    }

    let mut name_offset = 0;
    for (instance, &data_offset) in instances().zip(&data_offsets) {
        w.write_i64(instance.id());
        if instance.name().is_empty() {
            w.write_u64(NO_NAME);
        } else {
            w.write_u64(name_offset as u64);
            name_offset += pstr_len(instance.name());
        }
        w.write_u8(0);
        w.write_u64(data_offset);
        w.write_u32(0);
    }
    for instance in instances().filter(|i| !i.name().is_empty()) {
        w.write_pstr(instance.name());
    }

    let attribute_list_offset = (w.position() - map_offset) as u64;
    w.patch(map_offset + ATTRIBUTE_LIST_FIELD, |w| w.write_u64(attribute_list_offset));
    for (key, value) in types.iter().flat_map(|ty| ty.attributes()) {
        w.write_cstr(key, None);
        w.write_cstr(value, None);
    }

    let map_length = w.size() - map_offset;
    let preamble = [HEADER_SIZE, map_offset, data_length, map_length].map(|v| v as u64);
    w.patch(0, |w| {
        w.write_u64(VERSION);
        preamble.iter().for_each(|&v| w.write_u64(v));
    });
    w.patch(map_offset, |w| preamble.iter().for_each(|&v| w.write_u64(v)));

    Ok(w.into_block())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{from_pairs, namespace};

    fn sample() -> Vec<ResourceType> {
        let mut snd = ResourceType::new("snd ", namespace("custom"));
        snd.add_resource(1, "Beep", Block::from(&b"\x00\x01\x02"[..]));
        let mut pict = ResourceType::new("PICT", Attributes::new());
        pict.add_resource(1_000_000, "", Block::from(vec![0xAB; 300]));
        pict.add_resource(-70_000, "wide", Block::empty());
        vec![snd, pict]
    }

    #[test]
    fn header_and_map_preamble_agree() {
        let block = write(&sample()).unwrap();
        let r = Reader::new(&block);
        assert_eq!(r.peek_u64(0).unwrap(), VERSION);
        assert_eq!(r.peek_u64(8).unwrap(), HEADER_SIZE as u64);
        let map_offset = r.peek_u64(16).unwrap() as usize;
        let data_length = r.peek_u64(24).unwrap() as usize;
        let map_length = r.peek_u64(32).unwrap() as usize;
        assert_eq!(map_offset, HEADER_SIZE + data_length);
        assert_eq!(map_offset + map_length, block.size());
        assert_eq!(r.peek_bytes(map_offset, 32).unwrap(), r.peek_bytes(8, 32).unwrap());
    }

    #[test]
    fn round_trip_keeps_attributes_and_wide_ids() {
        let block = write(&sample()).unwrap();
        let types = parse(&block, true).unwrap();
        assert_eq!(types.len(), 2);

        assert_eq!(types[0].code(), "snd ");
        assert_eq!(types[0].attributes(), &namespace("custom"));
        assert_eq!(types[0].resource_with_name("Beep").unwrap().data().to_vec(), [0, 1, 2]);

        assert!(types[1].attributes().is_empty());
        assert_eq!(types[1].resource_with_id(1_000_000).unwrap().size(), 300);
        assert_eq!(types[1].resource_with_id(-70_000).unwrap().name(), "wide");
    }

    #[test]
    fn several_attributes_and_empty_types() {
        let ty = ResourceType::new("STR#", from_pairs([("namespace", "ui"), ("lang", "fr")]));
        let types = parse(&write(&[ty]).unwrap(), true).unwrap();
        assert_eq!(types.len(), 1);
        assert!(types[0].is_empty());
        assert_eq!(types[0].attribute_string(), "<lang:fr><namespace:ui>");
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let block = write(&sample()).unwrap();
        let mut bytes = block.to_vec();
        bytes.push(0);
        let rejection = parse(&Block::from(bytes), true).unwrap_err();
        assert_eq!(rejection.stage, Stage::Preamble);
    }

    #[test]
    fn mismatched_map_preamble_is_rejected() {
        let block = write(&sample()).unwrap();
        let map_offset = Reader::new(&block).peek_u64(16).unwrap() as usize;
        let mut bytes = block.to_vec();
        bytes[map_offset + PREAMBLE_SIZE - 1] ^= 0x01;

        let rejection = parse(&Block::from(bytes), true).unwrap_err();
        assert_eq!(rejection.stage, Stage::Preamble);
        assert_eq!(rejection.reason, "map preamble does not match the header");
    }

    #[test]
    fn map_must_follow_the_data() {
        let block = write(&sample()).unwrap();
        let mut bytes = block.to_vec();
        // data_length in the header
        bytes[31] = bytes[31].wrapping_add(1);

        let rejection = parse(&Block::from(bytes), true).unwrap_err();
        assert_eq!(rejection.stage, Stage::Preamble);
        assert_eq!(rejection.reason, "map does not follow the data section");
    }

    #[test]
    fn classic_files_are_not_extended() {
        let mut ty = ResourceType::new("TEXT", Attributes::new());
        ty.add_resource(128, "", Block::from(&b"hello"[..]));
        let classic = super::super::classic::write(&[ty]).unwrap();
        assert!(parse(&classic, true).is_err());
    }

    #[test]
    fn bad_code_fails_before_output() {
        let ty = ResourceType::new("LONGER", Attributes::new());
        assert!(write(&[ty]).is_err());
    }
}
