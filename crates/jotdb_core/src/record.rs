//! Record wire format.
//!
//! A record is one JSON object per line, newline-terminated. Every emitted
//! line carries the reserved fields `id`, `_oid`, `_rid`, `_seq` alongside
//! the user fields. All size accounting over record text is UTF-8 byte
//! length (`str::len` of the encoded line), never character count.

use crate::error::{EngineError, EngineResult};
use crate::types::{Key, OpTag, Rid, SeqNo};
use serde_json::{Map, Value};

/// Reserved field: record id.
pub const FIELD_ID: &str = "id";
/// Reserved field: operation tag.
pub const FIELD_OID: &str = "_oid";
/// Reserved field: stable record identity.
pub const FIELD_RID: &str = "_rid";
/// Reserved field: sequence number.
pub const FIELD_SEQ: &str = "_seq";

/// The reserved field names, in wire order.
pub const RESERVED_FIELDS: [&str; 4] = [FIELD_ID, FIELD_OID, FIELD_RID, FIELD_SEQ];

/// A decoded record: user fields plus the reserved metadata overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Record id.
    pub key: Key,
    /// Operation tag.
    pub op: OpTag,
    /// Stable record identity.
    pub rid: Rid,
    /// Sequence number of the mutation that produced this record.
    pub seq: SeqNo,
    /// User fields, reserved names excluded.
    pub fields: Map<String, Value>,
}

impl Record {
    /// Creates a set record from user fields, stripping any reserved names
    /// the caller may have left in.
    #[must_use]
    pub fn set(key: Key, mut fields: Map<String, Value>, rid: Rid, seq: SeqNo) -> Self {
        for name in RESERVED_FIELDS {
            fields.remove(name);
        }
        Self {
            key,
            op: OpTag::SET,
            rid,
            seq,
            fields,
        }
    }

    /// Creates a delete tombstone. Tombstones carry no user fields.
    #[must_use]
    pub fn tombstone(key: Key, rid: Rid, seq: SeqNo) -> Self {
        Self {
            key,
            op: OpTag::DELETE,
            rid,
            seq,
            fields: Map::new(),
        }
    }

    /// Whether this record is a delete tombstone.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.op.is_delete()
    }

    /// The full JSON object, reserved fields included.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut obj = self.fields.clone();
        obj.insert(FIELD_ID.to_string(), self.key.to_value());
        obj.insert(FIELD_OID.to_string(), Value::from(self.op.as_raw()));
        obj.insert(FIELD_RID.to_string(), Value::from(self.rid.as_u64()));
        obj.insert(FIELD_SEQ.to_string(), Value::from(self.seq.as_u64()));
        Value::Object(obj)
    }

    /// Serializes to a single JSON line, without the trailing newline.
    ///
    /// Key order within the object is the map's deterministic order, so the
    /// engine can retain the exact text it appended for in-memory reads.
    #[must_use]
    pub fn encode_line(&self) -> String {
        self.to_value().to_string()
    }

    /// Parses one block line back into a record.
    ///
    /// `bid` and `line_no` only contextualize errors.
    pub fn decode_line(bid: &str, line_no: u64, line: &str) -> EngineResult<Self> {
        if line.is_empty() {
            return Err(EngineError::invalid_record(bid, line_no, "empty line"));
        }

        let value: Value = serde_json::from_str(line)
            .map_err(|e| EngineError::invalid_record(bid, line_no, e.to_string()))?;
        let Value::Object(mut obj) = value else {
            return Err(EngineError::invalid_record(
                bid,
                line_no,
                "line is not a JSON object",
            ));
        };

        let key = match obj.remove(FIELD_ID) {
            Some(v) => Key::from_value(&v).ok_or_else(|| {
                EngineError::invalid_record(
                    bid,
                    line_no,
                    "field `id` must be a string or integer",
                )
            })?,
            None => {
                return Err(EngineError::invalid_record(bid, line_no, "missing field `id`"));
            }
        };

        let oid = take_u64(&mut obj, FIELD_OID, bid, line_no)?;
        let raw_op = u8::try_from(oid).map_err(|_| {
            EngineError::invalid_record(bid, line_no, format!("field `_oid` out of range: {oid}"))
        })?;
        let rid = take_u64(&mut obj, FIELD_RID, bid, line_no)?;
        let seq = take_u64(&mut obj, FIELD_SEQ, bid, line_no)?;

        Ok(Self {
            key,
            op: OpTag::from_raw(raw_op),
            rid: Rid::new(rid),
            seq: SeqNo::new(seq),
            fields: obj,
        })
    }

    /// Projects the configured cache fields out of this record's user
    /// fields. Missing fields are omitted silently.
    #[must_use]
    pub fn project(&self, cached_fields: &[String]) -> Map<String, Value> {
        let mut cache = Map::new();
        for name in cached_fields {
            if let Some(v) = self.fields.get(name) {
                cache.insert(name.clone(), v.clone());
            }
        }
        cache
    }
}

fn take_u64(
    obj: &mut Map<String, Value>,
    field: &str,
    bid: &str,
    line_no: u64,
) -> EngineResult<u64> {
    match obj.remove(field) {
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| {
            EngineError::invalid_record(
                bid,
                line_no,
                format!("field `{field}` must be an unsigned integer"),
            )
        }),
        Some(_) => Err(EngineError::invalid_record(
            bid,
            line_no,
            format!("field `{field}` must be an unsigned integer"),
        )),
        None => Err(EngineError::invalid_record(
            bid,
            line_no,
            format!("missing field `{field}`"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_fields(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn encode_includes_reserved_fields() {
        let record = Record::set(
            Key::from("1"),
            user_fields(&[("name", json!("lemon"))]),
            Rid::new(1),
            SeqNo::new(1),
        );
        let line = record.encode_line();
        let obj: Value = serde_json::from_str(&line).unwrap();

        assert_eq!(obj["id"], json!("1"));
        assert_eq!(obj["_oid"], json!(1));
        assert_eq!(obj["_rid"], json!(1));
        assert_eq!(obj["_seq"], json!(1));
        assert_eq!(obj["name"], json!("lemon"));
    }

    #[test]
    fn round_trip() {
        let record = Record::set(
            Key::Int(42),
            user_fields(&[("count", json!(3)), ("tags", json!(["a", "b"]))]),
            Rid::new(7),
            SeqNo::new(19),
        );
        let decoded = Record::decode_line("x.block", 1, &record.encode_line()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn tombstone_carries_only_id() {
        let record = Record::tombstone(Key::from("k"), Rid::new(3), SeqNo::new(8));
        assert!(record.is_tombstone());

        let obj: Value = serde_json::from_str(&record.encode_line()).unwrap();
        assert_eq!(obj.as_object().unwrap().len(), 4);
        assert_eq!(obj["_oid"], json!(2));
    }

    #[test]
    fn reserved_names_in_user_fields_are_overlaid() {
        let record = Record::set(
            Key::from("k"),
            user_fields(&[("_seq", json!(999)), ("v", json!(1))]),
            Rid::new(1),
            SeqNo::new(2),
        );
        let decoded = Record::decode_line("x.block", 1, &record.encode_line()).unwrap();
        assert_eq!(decoded.seq, SeqNo::new(2));
        assert!(!decoded.fields.contains_key("_seq"));
    }

    #[test]
    fn reserved_op_values_round_trip_untouched() {
        let line = r#"{"_oid":3,"_rid":5,"_seq":11,"id":"rel"}"#;
        let decoded = Record::decode_line("x.block", 1, line).unwrap();
        assert_eq!(decoded.op.as_raw(), 3);
        assert_eq!(decoded.encode_line(), line);
    }

    #[test]
    fn rejects_empty_line() {
        let err = Record::decode_line("x.block", 4, "").unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidRecord { line_no: 4, .. }
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = Record::decode_line("x.block", 1, "{not json").unwrap_err();
        assert!(matches!(err, EngineError::InvalidRecord { .. }));
    }

    #[test]
    fn rejects_missing_or_mistyped_reserved_fields() {
        for line in [
            r#"{"_oid":1,"_rid":1,"_seq":1}"#,
            r#"{"id":true,"_oid":1,"_rid":1,"_seq":1}"#,
            r#"{"id":"k","_rid":1,"_seq":1}"#,
            r#"{"id":"k","_oid":"set","_rid":1,"_seq":1}"#,
            r#"{"id":"k","_oid":1,"_rid":-2,"_seq":1}"#,
            r#"{"id":"k","_oid":1,"_rid":1,"_seq":1.5}"#,
            r#"[1,2,3]"#,
        ] {
            let err = Record::decode_line("x.block", 1, line).unwrap_err();
            assert!(
                matches!(err, EngineError::InvalidRecord { .. }),
                "expected InvalidRecord for {line}"
            );
        }
    }

    #[test]
    fn projection_omits_missing_fields() {
        let record = Record::set(
            Key::from("k"),
            user_fields(&[("name", json!("a")), ("age", json!(3))]),
            Rid::new(1),
            SeqNo::new(1),
        );
        let cache = record.project(&["name".to_string(), "absent".to_string()]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache["name"], json!("a"));
    }

    #[test]
    fn line_length_is_utf8_bytes() {
        let record = Record::set(
            Key::from("к"),
            user_fields(&[("name", json!("🍋"))]),
            Rid::new(1),
            SeqNo::new(1),
        );
        let line = record.encode_line();
        assert!(line.len() > line.chars().count());
        let decoded = Record::decode_line("x.block", 1, &line).unwrap();
        assert_eq!(decoded, record);
    }
}
