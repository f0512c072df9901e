use anyhow::Result;
use iolite::*;
use serde::ser::{Error as _, Serializer};
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;

struct Unencodable;

impl Serialize for Unencodable {
    fn serialize<S: Serializer>(&self, _s: S) -> std::result::Result<S::Ok, S::Error> {
        Err(S::Error::custom("cannot encode"))
    }
}

#[test]
fn json_roundtrip() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("doc.json");
    let doc = json!({"name": "Zoë", "tags": ["a", "b"], "n": 3, "nested": {"ok": true}});

    write_json(&path, &doc, &JsonWriteOptions::default())?;
    let text = fs::read_to_string(&path)?;
    assert!(text.is_ascii());
    assert_eq!(read_json(&path, &JsonReadOptions::default())?, doc);
    Ok(())
}

#[test]
fn json_indent_and_raw_unicode() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("doc.json");

    let opts = JsonWriteOptions {
        ensure_ascii: false,
        indent: Some(2),
        ..Default::default()
    };
    write_json(&path, &json!({"k": ["é"]}), &opts)?;
    assert_eq!(fs::read_to_string(&path)?, "{\n  \"k\": [\n    \"é\"\n  ]\n}");
    Ok(())
}

#[test]
fn invalid_json_strict_fails() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("bad.json");
    fs::write(&path, "{not json")?;

    let err = read_json(&path, &JsonReadOptions::default()).unwrap_err();
    assert_eq!(IoliteError::kind_of(&err), Some(ErrorKind::Decode));
    Ok(())
}

#[test]
fn invalid_json_lenient_falls_back_to_empty_object() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("bad.json");
    fs::write(&path, "{not json")?;

    let opts = JsonReadOptions {
        policy: ErrorPolicy::LENIENT,
        ..Default::default()
    };
    assert_eq!(read_json(&path, &opts)?, Value::Object(Default::default()));
    Ok(())
}

#[test]
fn read_missing_json_always_fails() {
    let opts = JsonReadOptions {
        policy: ErrorPolicy::QUIET,
        ..Default::default()
    };
    let err = read_json("/no/such/doc.json", &opts).unwrap_err();
    assert_eq!(IoliteError::kind_of(&err), Some(ErrorKind::NotFound));
}

#[test]
fn encode_failure_follows_policy() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("out.json");

    let err = write_json(&path, &Unencodable, &JsonWriteOptions::default()).unwrap_err();
    assert_eq!(IoliteError::kind_of(&err), Some(ErrorKind::Encode));

    let opts = JsonWriteOptions {
        policy: ErrorPolicy::QUIET,
        ..Default::default()
    };
    write_json(&path, &Unencodable, &opts)?;
    assert_eq!(fs::read_to_string(&path)?, "");
    Ok(())
}
