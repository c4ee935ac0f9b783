use proptest::prelude::*;
use secs_codec::{decode, encode, parse_item, to_sml};
use secs_core::Item;

fn scalar() -> impl Strategy<Value = Item> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..300).prop_map(Item::Binary),
        prop::collection::vec(any::<bool>(), 0..8).prop_map(Item::Boolean),
        "[ -~\t\r\n]{0,40}".prop_map(Item::Ascii),
        prop::collection::vec(any::<i8>(), 0..6).prop_map(Item::I1),
        prop::collection::vec(any::<i16>(), 0..6).prop_map(Item::I2),
        prop::collection::vec(any::<i32>(), 0..6).prop_map(Item::I4),
        prop::collection::vec(any::<i64>(), 0..6).prop_map(Item::I8),
        prop::collection::vec(any::<u8>(), 0..6).prop_map(Item::U1),
        prop::collection::vec(any::<u16>(), 0..6).prop_map(Item::U2),
        prop::collection::vec(any::<u32>(), 0..6).prop_map(Item::U4),
        prop::collection::vec(any::<u64>(), 0..6).prop_map(Item::U8),
        prop::collection::vec(prop::num::f32::NORMAL | prop::num::f32::ZERO, 0..6).prop_map(Item::F4),
        prop::collection::vec(prop::num::f64::NORMAL | prop::num::f64::ZERO, 0..6).prop_map(Item::F8),
    ]
}

fn item() -> impl Strategy<Value = Item> {
    scalar().prop_recursive(4, 64, 6, |inner| {
        prop::collection::vec(inner, 0..6).prop_map(Item::List)
    })
}

proptest! {
    #[test]
    fn binary_round_trip(item in item()) {
        let bytes = encode(&item).unwrap();
        let (decoded, consumed) = decode(&bytes).unwrap();
        prop_assert_eq!(consumed, bytes.len());
        prop_assert_eq!(decoded, item);
    }

    #[test]
    fn sml_matches_binary(item in item()) {
        let (decoded, _) = decode(&encode(&item).unwrap()).unwrap();
        prop_assert_eq!(parse_item(&to_sml(&item)).unwrap(), decoded);
    }
}

#[test]
fn deep_nesting_round_trip() {
    let mut item = Item::U4(vec![42]);
    for depth in 0..5 {
        item = Item::List(vec![item, Item::Ascii(format!("level {}", depth))]);
    }
    let (decoded, _) = decode(&encode(&item).unwrap()).unwrap();
    assert_eq!(decoded, item);
}

#[test]
fn length_width_selection() {
    let bytes = encode(&Item::Binary(vec![0xAA; 255])).unwrap();
    assert_eq!(bytes[0] & 0x03, 1);
    let bytes = encode(&Item::Binary(vec![0xAA; 256])).unwrap();
    assert_eq!(bytes[0] & 0x03, 2);
    let bytes = encode(&Item::Binary(vec![0xAA; 0x10000])).unwrap();
    assert_eq!(bytes[0] & 0x03, 3);
}
