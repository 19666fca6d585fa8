use docmesh_types::Value;

#[test]
fn from_conversions() {
    assert_eq!(Value::from("hi"), Value::Str("hi".into()));
    assert_eq!(Value::from(String::from("hi")), Value::Str("hi".into()));
    assert_eq!(Value::from(7i64), Value::Int(7));
    assert_eq!(Value::from(7u64), Value::Uint(7));
    assert_eq!(Value::from(true), Value::Bool(true));
    assert_eq!(Value::from(vec![1u8, 2]), Value::Bytes(vec![1, 2]));
}

#[test]
fn accessors() {
    assert_eq!(Value::from("x").as_str(), Some("x"));
    assert_eq!(Value::Int(3).as_str(), None);
    assert_eq!(Value::Uint(3).as_i64(), Some(3));
    assert_eq!(Value::Uint(u64::MAX).as_i64(), None);
    assert_eq!(Value::Bool(false).as_bool(), Some(false));
}

#[test]
fn display() {
    assert_eq!(Value::from("hello").to_string(), "hello");
    assert_eq!(Value::Null.to_string(), "null");
    assert_eq!(Value::Bytes(vec![0; 4]).to_string(), "<4 bytes>");
}

#[test]
fn serde_roundtrip_keeps_variant() {
    for v in [Value::Int(1), Value::Uint(1), Value::F64(1.5), Value::Null] {
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
