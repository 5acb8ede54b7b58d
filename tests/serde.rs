#![cfg(feature = "serde")]

use splinter::HashMap;

#[test]
fn map_round_trip() {
    let map: HashMap<String, u32> = (0..16).map(|i| (format!("key{}", i), i)).collect();

    let serialized = serde_json::to_string(&map).unwrap();
    let restored: HashMap<String, u32> = serde_json::from_str(&serialized).unwrap();

    assert_eq!(map, restored);
    assert_eq!(restored.pin().verify(), Ok(()));
}

#[test]
fn pinned_reference_serializes_like_the_map() {
    let map = HashMap::new();
    map.pin().insert("k".to_owned(), 7u32);

    let through_map = serde_json::to_string(&map).unwrap();
    let through_ref = serde_json::to_string(&map.pin()).unwrap();
    assert_eq!(through_map, through_ref);
    assert_eq!(through_map, r#"{"k":7}"#);
}

#[test]
fn duplicate_keys_degrade_to_overwrite() {
    let restored: HashMap<String, u32> = serde_json::from_str(r#"{"k":1,"k":2}"#).unwrap();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored.pin().get(&"k".to_owned()), Some(&2));
}
