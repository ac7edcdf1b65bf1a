use engram_core::{
    FlatPayloadCodec, IdentityCodec, Payload, PayloadCodec, VectorStoreError, JSON_TAG, LIST_TAG,
    MEMBER_TAG, NESTED_KEYS_FIELD,
};
use serde_json::{json, Value};

fn payload(v: Value) -> Payload {
    v.as_object().cloned().unwrap()
}

fn roundtrip(codec: &dyn PayloadCodec, p: &Payload) -> Payload {
    let encoded = codec.encode(p).unwrap();
    codec.decode(&encoded).unwrap()
}

#[test]
fn scalars_pass_through() {
    let codec = FlatPayloadCodec::new();
    let p = payload(json!({"kind": "fact", "importance": 0.75, "count": 3, "pinned": true}));
    let encoded = codec.encode(&p).unwrap();
    assert_eq!(encoded, p);
}

#[test]
fn string_arrays_join_with_delimiter() {
    let codec = FlatPayloadCodec::new();
    let p = payload(json!({"tags": ["rust", "memory"]}));
    let encoded = codec.encode(&p).unwrap();
    assert_eq!(
        encoded.get("tags"),
        Some(&json!(format!("{LIST_TAG}rust|memory")))
    );
    assert_eq!(roundtrip(&codec, &p), p);
}

#[test]
fn nested_objects_flatten_with_separator() {
    let codec = FlatPayloadCodec::new();
    let p = payload(json!({"nested": {"key": "v", "n": 2}, "top": 1}));
    let encoded = codec.encode(&p).unwrap();
    assert_eq!(encoded.get("nested_key"), Some(&json!("v")));
    assert_eq!(encoded.get("nested_n"), Some(&json!(2)));
    assert!(encoded.contains_key(NESTED_KEYS_FIELD));
    assert!(!encoded.contains_key("nested"));
    assert_eq!(roundtrip(&codec, &p), p);
}

#[test]
fn plain_underscore_keys_are_not_unflattened() {
    let codec = FlatPayloadCodec::new();
    let p = payload(json!({"user_id": "u1", "session_started": 12}));
    assert_eq!(roundtrip(&codec, &p), p);
}

#[test]
fn deep_structures_fall_back_to_tagged_json() {
    let codec = FlatPayloadCodec::new();
    let p = payload(json!({
        "history": [{"role": "user"}, {"role": "assistant"}],
        "deep": {"a": {"b": 1}},
        "scores": [1, 2.5, 3],
        "none": null,
        "empty": [],
    }));
    let encoded = codec.encode(&p).unwrap();
    for key in ["history", "deep", "scores", "none", "empty"] {
        let stored = encoded.get(key).and_then(Value::as_str).unwrap();
        assert!(stored.starts_with(JSON_TAG), "{key} stored as {stored}");
    }
    assert_eq!(roundtrip(&codec, &p), p);
}

#[test]
fn sibling_key_collision_disables_flattening() {
    let codec = FlatPayloadCodec::new();
    let p = payload(json!({"a": {"b": 1}, "a_c": 2}));
    let encoded = codec.encode(&p).unwrap();
    assert!(encoded.get("a").and_then(Value::as_str).unwrap().starts_with(JSON_TAG));
    assert_eq!(roundtrip(&codec, &p), p);
}

#[test]
fn strings_that_look_tagged_survive() {
    let codec = FlatPayloadCodec::new();
    let p = payload(json!({"note": format!("{LIST_TAG}not|a|list")}));
    assert_eq!(roundtrip(&codec, &p), p);
}

#[test]
fn strings_containing_delimiter_use_json() {
    let codec = FlatPayloadCodec::new();
    let p = payload(json!({"paths": ["a|b", "c"]}));
    assert_eq!(roundtrip(&codec, &p), p);
}

#[test]
fn native_string_lists_kept_as_arrays() {
    let codec = FlatPayloadCodec::new().with_native_string_lists(true);
    let p = payload(json!({"tags": ["x", "y"], "meta": {"labels": ["l1"]}}));
    let encoded = codec.encode(&p).unwrap();
    assert_eq!(encoded.get("tags"), Some(&json!(["x", "y"])));
    assert_eq!(encoded.get("meta_labels"), Some(&json!(["l1"])));
    assert_eq!(roundtrip(&codec, &p), p);
}

#[test]
fn reserved_key_is_rejected() {
    let codec = FlatPayloadCodec::new();
    let p = payload(json!({ NESTED_KEYS_FIELD: "x" }));
    assert!(codec.encode(&p).is_err());
}

#[test]
fn malformed_tagged_field_fails_decode() {
    let codec = FlatPayloadCodec::new();
    let metadata = payload(json!({"broken": format!("{JSON_TAG}{{not json")}));
    assert!(codec.decode(&metadata).is_err());
}

#[test]
fn custom_separator_drives_field_names() {
    let codec = FlatPayloadCodec::new().with_separator("__");
    assert_eq!(codec.field_name("user.name"), "user__name");
    let p = payload(json!({"user": {"name": "ada"}}));
    let encoded = codec.encode(&p).unwrap();
    assert_eq!(encoded.get("user__name"), Some(&json!("ada")));
    assert_eq!(roundtrip(&codec, &p), p);
}

#[test]
fn identity_codec_is_lossless() {
    let p = payload(json!({"deep": {"a": {"b": [1, {"c": null}]}}}));
    assert_eq!(roundtrip(&IdentityCodec, &p), p);
    assert_eq!(IdentityCodec.field_name("deep.a"), "deep.a");
}

#[test]
fn membership_markers_name_every_scalar_element() {
    let codec = FlatPayloadCodec::new().with_membership_markers(true);
    let p = payload(json!({
        "tags": ["rust", "memory"],
        "scores": [1, 2.5],
        "user": {"roles": ["admin"]}
    }));
    let encoded = codec.encode(&p).unwrap();
    assert_eq!(encoded["tags"], json!(format!("{LIST_TAG}rust|memory")));
    assert_eq!(encoded[&format!("tags{MEMBER_TAG}\"rust\"")], json!(true));
    assert_eq!(encoded[&format!("tags{MEMBER_TAG}\"memory\"")], json!(true));
    assert_eq!(encoded[&format!("scores{MEMBER_TAG}1")], json!(true));
    assert_eq!(encoded[&format!("scores{MEMBER_TAG}2.5")], json!(true));
    assert_eq!(encoded[&format!("user_roles{MEMBER_TAG}\"admin\"")], json!(true));
    assert_eq!(roundtrip(&codec, &p), p);

    assert_eq!(
        codec.member_field("user.roles", &json!("admin")).as_deref(),
        Some("user_roles__has__\"admin\"")
    );
    // 1 and 1.0 compare equal in filters, so they share a marker.
    assert_eq!(
        codec.member_field("scores", &json!(1.0)),
        codec.member_field("scores", &json!(1))
    );
    assert!(FlatPayloadCodec::new().member_field("tags", &json!("rust")).is_none());
}

#[test]
fn membership_marker_tag_is_reserved_in_keys() {
    let codec = FlatPayloadCodec::new().with_membership_markers(true);
    let err = codec.encode(&payload(json!({"x__has__y": 1}))).unwrap_err();
    assert!(matches!(err, VectorStoreError::Codec(_)));
}
