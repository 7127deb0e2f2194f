//! Round-trip law: decoding an encoded value yields an equivalent value for
//! both wire transformers.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use twinrpc_core::{CompactMetaTransformer, PathMapTransformer, Transformer, Value};

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z.\\\\]{0,8}".prop_map(Value::from),
        (0_i64..4_102_444_800_000_000_000).prop_map(|ns| Value::from(Utc.timestamp_nanos(ns))),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::vec(("[a-z.]{0,6}", inner.clone()), 0..6).prop_map(Value::object),
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::set),
            prop::collection::vec((inner.clone(), inner), 0..6).prop_map(Value::map),
        ]
    })
}

fn assert_round_trip(transformer: &dyn Transformer, original: &Value) {
    let encoded = transformer.encode(original);
    let wire = serde_json::to_string(&encoded).unwrap();
    let decoded = transformer
        .decode(serde_json::from_str(&wire).unwrap())
        .unwrap_or_else(|e| panic!("{} failed to decode {wire}: {e}", transformer.name()));
    assert_eq!(&decoded, original, "{} round trip of {wire}", transformer.name());
}

proptest! {
    #[test]
    fn path_map_round_trips(original in value()) {
        assert_round_trip(&PathMapTransformer::new(), &original);
    }

    #[test]
    fn compact_meta_round_trips(original in value()) {
        assert_round_trip(&CompactMetaTransformer::new(), &original);
    }
}

#[test]
fn post_shaped_record_round_trips() {
    let published = Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap();
    let record = Value::object([
        ("id", Value::from(1_i64)),
        ("publishedAt", Value::from(published)),
        ("tags", Value::set(["typescript", "trpc", "tutorial"])),
        ("likes", Value::set([1_i64, 2, 3, 4, 5])),
        (
            "metadata",
            Value::map([
                ("readingTime", Value::from(5_i64)),
                ("difficulty", Value::from("beginner")),
                ("featured", Value::from(true)),
            ]),
        ),
    ]);

    assert_round_trip(&PathMapTransformer::new(), &record);
    assert_round_trip(&CompactMetaTransformer::new(), &record);
}

#[test]
fn sub_millisecond_dates_round_trip() {
    let record = Value::object([
        ("micros", Value::from(Utc.timestamp_nanos(1_700_000_000_123_456_000))),
        ("nanos", Value::from(Utc.timestamp_nanos(1_700_000_000_123_456_789))),
    ]);

    assert_round_trip(&PathMapTransformer::new(), &record);
    assert_round_trip(&CompactMetaTransformer::new(), &record);
}

#[test]
fn empty_key_date_round_trips() {
    let at = Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap();
    let record = Value::object([("", Value::from(at))]);

    assert_round_trip(&PathMapTransformer::new(), &record);
    assert_round_trip(&CompactMetaTransformer::new(), &record);
}
