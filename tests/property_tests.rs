//! Property-based tests for buffer, cursor and format invariants
//!
//! Uses proptest to check round trips and clamping across random inputs

use proptest::prelude::*;
use resource_core::data::{ByteOrder, WORD_SIZE};
use resource_core::attribute::namespace;
use resource_core::{Attributes, Block, File, Format, ReadOptions, Reader, ResourceType};
use std::collections::BTreeMap;

type Catalogue = BTreeMap<String, BTreeMap<i16, (String, Vec<u8>)>>;

fn catalogue() -> impl Strategy<Value = Catalogue> {
    let instance = ("[a-zA-Z0-9 éüß©•]{0,40}", prop::collection::vec(any::<u8>(), 0..200));
    let instances = prop::collection::btree_map(any::<i16>(), instance, 1..8);
    prop::collection::btree_map("[A-Za-z#][A-Za-z0-9 ]{3}", instances, 0..6)
}

fn build(format: Format, catalogue: &Catalogue) -> File {
    let mut file = File::new(format);
    for (code, instances) in catalogue {
        for (&id, (name, payload)) in instances {
            file.add_resource(code, i64::from(id), name, Block::from(payload.clone()), &Attributes::new());
        }
    }
    file
}

fn assert_matches(file: &File, catalogue: &Catalogue) -> Result<(), TestCaseError> {
    prop_assert_eq!(file.types().len(), catalogue.len());
    for (code, instances) in catalogue {
        let ty = file.type_for(code, &Attributes::new());
        prop_assert!(ty.is_some(), "missing type {:?}", code);
        let ty = ty.unwrap();
        prop_assert_eq!(ty.len(), instances.len());
        for (&id, (name, payload)) in instances {
            let instance = ty.resource_with_id(i64::from(id));
            prop_assert!(instance.is_some(), "missing {:?} #{}", code, id);
            let instance = instance.unwrap();
            prop_assert_eq!(instance.name(), name.as_str());
            prop_assert_eq!(&instance.data().to_vec(), payload);
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_round_trip_every_format(catalogue in catalogue()) {
        for format in [Format::Classic, Format::Extended, Format::Rez] {
            let image = build(format, &catalogue).to_block(None).unwrap();
            let parsed = File::from_block(image, &ReadOptions::default());
            prop_assert!(parsed.is_some(), "{} image not recognised", format);
            let parsed = parsed.unwrap();
            prop_assert_eq!(parsed.format(), format);
            assert_matches(&parsed, &catalogue)?;
        }
    }

    #[test]
    fn prop_extended_keeps_attributes(
        namespaces in prop::collection::btree_set("[a-z]{1,12}", 1..5),
        payload in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut file = File::new(Format::Extended);
        for (id, ns) in namespaces.iter().enumerate() {
            file.add_resource("snd ", id as i64, ns, Block::from(payload.clone()), &namespace(ns));
        }
        let parsed = File::from_block(file.to_block(None).unwrap(), &ReadOptions::default()).unwrap();
        prop_assert_eq!(parsed.types().len(), namespaces.len());
        for (id, ns) in namespaces.iter().enumerate() {
            let ty = parsed.type_for("snd ", &namespace(ns)).unwrap();
            prop_assert_eq!(ty.resource_with_id(id as i64).unwrap().name(), ns.as_str());
        }
    }

    #[test]
    fn prop_allocation_is_smallest_word_multiple(capacity in 0usize..100_000) {
        let block = Block::new(capacity, ByteOrder::Msb);
        prop_assert_eq!(block.size(), capacity);
        prop_assert_eq!(block.raw_size() % WORD_SIZE, 0);
        prop_assert!(block.raw_size() >= capacity);
        prop_assert!(block.raw_size() < capacity + WORD_SIZE);
    }

    #[test]
    fn prop_position_stays_clamped(
        size in 0usize..512,
        moves in prop::collection::vec(any::<i64>(), 0..32),
        jump in any::<usize>(),
    ) {
        let block = Block::new(size, ByteOrder::Msb);
        let mut reader = Reader::new(&block);
        reader.set_position(jump);
        prop_assert!(reader.position() <= size + 1);
        for delta in moves {
            reader.move_by(delta);
            prop_assert!(reader.position() <= size + 1);
        }
    }

    #[test]
    fn prop_zero_copy_slices_share_writes(
        bytes in prop::collection::vec(any::<u8>(), 1..256),
        start in any::<prop::sample::Index>(),
        value in any::<u8>(),
    ) {
        let mut owner = Block::from(bytes.clone());
        let offset = start.index(bytes.len());
        let view = owner.slice(offset, bytes.len() - offset, false).unwrap();
        prop_assert!(view.shares_storage_with(&owner));

        owner.fill(value, 1, offset);
        prop_assert_eq!(view.bytes()[0], value);

        let copy = owner.slice(offset, bytes.len() - offset, true).unwrap();
        owner.fill(value.wrapping_add(1), 1, offset);
        prop_assert_eq!(copy.bytes()[0], value);
    }

    #[test]
    fn prop_type_hash_ignores_attribute_order(
        attributes in prop::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,6}", 0..6),
    ) {
        let mut reversed = Attributes::new();
        for (k, v) in attributes.iter().rev() {
            reversed.insert(k.clone(), v.clone());
        }
        prop_assert_eq!(
            ResourceType::hash_for_code("PICT", &attributes),
            ResourceType::hash_for_code("PICT", &reversed)
        );
        if !attributes.is_empty() {
            prop_assert_ne!(
                ResourceType::hash_for_code("PICT", &attributes),
                ResourceType::hash_for_code("PICT", &Attributes::new())
            );
        }
    }
}
