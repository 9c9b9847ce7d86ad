//! End-to-end scenarios for the device-image builder.

use std::collections::BTreeMap;

use flagset::FlagSet;
use knxcore::address::{GroupAddress, IndividualAddress, KnxAddress};
use knxcore::builder::tables::{
    address_size_for_mask, AssociationTable, ComObjectTable, ComObjectTableEntry,
};
use knxcore::builder::{ImageBuilder, ADDRESS_TABLE_PTR_OFFSET, ASSOCIATION_TABLE_PTR_OFFSET, COM_OBJECT_TABLE_PTR_OFFSET};
use knxcore::program::{ComObjectFlag, ProgramContext};
use knxcore::telegram::Priority;

#[test]
fn address_table_header_and_entries_match_the_documented_scenario() {
    let mut table = knxcore::builder::tables::AddressTable::new(256);
    table.add(KnxAddress::Individual(IndividualAddress::new(1, 1, 1))).unwrap();
    table.add(KnxAddress::Group(GroupAddress::new(0, 0, 1))).unwrap();
    table.add(KnxAddress::Group(GroupAddress::new(0, 0, 2))).unwrap();
    let bytes = table.bytes();
    assert_eq!(bytes[0], 0x03);
    assert_eq!(&bytes[1..3], &[0x11, 0x01]);
    assert_eq!(&bytes[3..5], &[0x00, 0x01]);
    assert_eq!(&bytes[5..7], &[0x00, 0x02]);
}

#[test]
fn association_entries_exist_only_for_bound_com_objects() {
    let mut table = AssociationTable::new(16);
    table.add(1, vec![(0, true)]).unwrap();
    let bytes = table.bytes();
    assert_eq!(bytes[0], 1);
    assert_eq!(&bytes[1..3], &[1, 0]);
}

#[test]
fn com_object_table_pointers_are_monotone_and_aligned() {
    let mut candidates = BTreeMap::new();
    candidates.insert(
        0u32,
        vec![ComObjectTableEntry { number: 0, flags: FlagSet::default(), priority: Priority::Low, size_bits: 1 }],
    );
    candidates.insert(
        1u32,
        vec![ComObjectTableEntry {
            number: 1,
            flags: ComObjectFlag::Read | ComObjectFlag::Communication | ComObjectFlag::Transmit,
            priority: Priority::Low,
            size_bits: 16,
        }],
    );
    let address_size = address_size_for_mask("MV-0010").unwrap();
    assert_eq!(address_size, 1);
    let mut table = ComObjectTable::build(&candidates, &BTreeMap::new(), "MV-0010", 0x0100, 1024).unwrap();
    let bytes = table.bytes().unwrap();
    assert_eq!(bytes[0], 2);
    assert!(table.len() == 2);
    let _ = bytes;
}

#[test]
fn choose_branch_not_taken_forces_its_parameter_to_default() {
    use knxcore::program::{Access, DynamicNode, Parameter, ParameterMemory, ParameterRef, WhenBranch};

    let mut ctx = ProgramContext::default();
    ctx.parameters.insert(
        "p_mode".to_string(),
        Parameter {
            id: "p_mode".into(),
            type_id: "t".into(),
            default_value: 0,
            access: Access::ReadWrite,
            segment_id: None,
            memory: Some(ParameterMemory { offset: 0, bit_offset: 0, size: 8 }),
        },
    );
    ctx.parameters.insert(
        "p_active".to_string(),
        Parameter {
            id: "p_active".into(),
            type_id: "t".into(),
            default_value: 0,
            access: Access::ReadWrite,
            segment_id: None,
            memory: Some(ParameterMemory { offset: 0, bit_offset: 0, size: 8 }),
        },
    );
    ctx.parameters.insert(
        "p_inactive".to_string(),
        Parameter {
            id: "p_inactive".into(),
            type_id: "t".into(),
            default_value: 0x55,
            access: Access::ReadWrite,
            segment_id: None,
            memory: Some(ParameterMemory { offset: 0, bit_offset: 0, size: 8 }),
        },
    );
    ctx.parameter_refs.insert(
        "mode_ref".to_string(),
        ParameterRef { id: "mode_ref".into(), parameter_id: "p_mode".into(), value: 1 },
    );
    ctx.parameter_refs.insert(
        "active_ref".to_string(),
        ParameterRef { id: "active_ref".into(), parameter_id: "p_active".into(), value: 0x11 },
    );
    ctx.parameter_refs.insert(
        "inactive_ref".to_string(),
        ParameterRef { id: "inactive_ref".into(), parameter_id: "p_inactive".into(), value: 0x99 },
    );
    ctx.dynamic_tree = vec![DynamicNode::Choose {
        param_ref_id: "mode_ref".into(),
        whens: vec![
            WhenBranch { test: 0, children: vec![DynamicNode::ParameterRefRef("inactive_ref".into())] },
            WhenBranch { test: 1, children: vec![DynamicNode::ParameterRefRef("active_ref".into())] },
        ],
    }];

    let mut parameter_values = BTreeMap::new();
    parameter_values.insert("p_active".to_string(), (10u32, 0x11i64));
    parameter_values.insert("p_inactive".to_string(), (11u32, 0x99i64));

    let builder = ImageBuilder::new("MV-0010", 0x0100);
    let image = builder
        .build(vec![0u8; 20], &[], &BTreeMap::new(), &BTreeMap::new(), &BTreeMap::new(), &ctx, &parameter_values)
        .unwrap();

    assert_eq!(image[10], 0x11, "active branch keeps the supplied value");
    assert_eq!(image[11], 0x55, "not-taken branch's parameter falls back to its default");
}

#[test]
fn image_builder_patches_table_pointers_and_preserves_lead_bytes() {
    let builder = ImageBuilder::new("MV-0010", 0x0100);
    let addresses = vec![
        KnxAddress::Individual(IndividualAddress::new(1, 1, 1)),
        KnxAddress::Group(GroupAddress::new(0, 0, 1)),
        KnxAddress::Group(GroupAddress::new(0, 0, 2)),
    ];
    let mut associations = BTreeMap::new();
    associations.insert(1u8, vec![(0u8, true)]);
    associations.insert(2u8, vec![(0u8, true)]);
    let mut candidates = BTreeMap::new();
    candidates.insert(
        0u32,
        vec![ComObjectTableEntry {
            number: 0,
            flags: ComObjectFlag::Communication | ComObjectFlag::Read | ComObjectFlag::Transmit,
            priority: Priority::Low,
            size_bits: 1,
        }],
    );
    let ctx = ProgramContext::default();
    let lead_bytes = vec![0u8; 0x280];
    let image = builder
        .build(lead_bytes, &addresses, &associations, &candidates, &BTreeMap::new(), &ctx, &BTreeMap::new())
        .unwrap();

    let address_ptr = u16::from_le_bytes([image[ADDRESS_TABLE_PTR_OFFSET], image[ADDRESS_TABLE_PTR_OFFSET + 1]]) as usize;
    let association_ptr =
        u16::from_le_bytes([image[ASSOCIATION_TABLE_PTR_OFFSET], image[ASSOCIATION_TABLE_PTR_OFFSET + 1]]) as usize;
    let com_object_ptr =
        u16::from_le_bytes([image[COM_OBJECT_TABLE_PTR_OFFSET], image[COM_OBJECT_TABLE_PTR_OFFSET + 1]]) as usize;

    assert_eq!(image[address_ptr], 0x03);
    assert_eq!(image[association_ptr], 0x02);
    assert_eq!(image[com_object_ptr], 0x01);
    assert!(address_ptr < association_ptr);
    assert!(association_ptr < com_object_ptr);
}
