//! A minimal, hand-rolled Pickle writer covering exactly the opcodes
//! `/render/` and `/metrics/find/` need (§4.J, §6 "Response-body
//! contracts for the pickle encoder"). No general-purpose pickle crate
//! exists in the ecosystem for this, so this follows the teacher's
//! `fmt.rs` precedent: a small formatter lives next to the thing it
//! encodes instead of pulling in an external dependency.

use crate::glob::Match;
use crate::types::PointVector;

const PROTO: u8 = 0x80;
const PROTOCOL_VERSION: u8 = 2;
const NONE: u8 = b'N';
const NEWTRUE: u8 = 0x88;
const NEWFALSE: u8 = 0x89;
const BININT: u8 = b'J';
const BININT1: u8 = b'K';
const BININT2: u8 = b'M';
const LONG1: u8 = 0x8a;
const BINFLOAT: u8 = b'G';
const SHORT_BINUNICODE: u8 = 0x8c;
const BINUNICODE: u8 = b'X';
const EMPTY_DICT: u8 = b'}';
const EMPTY_LIST: u8 = b']';
const MARK: u8 = b'(';
const SETITEMS: u8 = b'u';
const APPENDS: u8 = b'e';
const STOP: u8 = b'.';

/// A small tree matching exactly the shapes `find`/`render` need to
/// produce; not a general pickle value.
enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Dict(Vec<(&'static str, Value)>),
}

fn write_header(buf: &mut Vec<u8>) {
    buf.push(PROTO);
    buf.push(PROTOCOL_VERSION);
}

fn write_int(buf: &mut Vec<u8>, v: i64) {
    if (0..256).contains(&v) {
        buf.push(BININT1);
        buf.push(v as u8);
    } else if (0..65536).contains(&v) {
        buf.push(BININT2);
        buf.extend_from_slice(&(v as u16).to_le_bytes());
    } else if i64::from(i32::MIN) <= v && v <= i64::from(i32::MAX) {
        buf.push(BININT);
        buf.extend_from_slice(&(v as i32).to_le_bytes());
    } else {
        let bytes = minimal_twos_complement_le(v);
        buf.push(LONG1);
        buf.push(bytes.len() as u8);
        buf.extend_from_slice(&bytes);
    }
}

/// Smallest little-endian two's-complement encoding of `v` (at least one
/// byte), matching pickle's `LONG1` convention.
fn minimal_twos_complement_le(v: i64) -> Vec<u8> {
    let mut bytes = v.to_le_bytes().to_vec();
    while bytes.len() > 1 {
        let last = bytes[bytes.len() - 1];
        let prev_sign_bit = bytes[bytes.len() - 2] & 0x80 != 0;
        if (last == 0x00 && !prev_sign_bit) || (last == 0xff && prev_sign_bit) {
            bytes.pop();
        } else {
            break;
        }
    }
    bytes
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    if bytes.len() < 256 {
        buf.push(SHORT_BINUNICODE);
        buf.push(bytes.len() as u8);
    } else {
        buf.push(BINUNICODE);
        buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    }
    buf.extend_from_slice(bytes);
}

fn write_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::None => buf.push(NONE),
        Value::Bool(true) => buf.push(NEWTRUE),
        Value::Bool(false) => buf.push(NEWFALSE),
        Value::Int(v) => write_int(buf, *v),
        Value::Float(v) => {
            buf.push(BINFLOAT);
            buf.extend_from_slice(&v.to_be_bytes());
        }
        Value::Str(s) => write_str(buf, s),
        Value::List(items) => {
            buf.push(EMPTY_LIST);
            if !items.is_empty() {
                buf.push(MARK);
                for item in items {
                    write_value(buf, item);
                }
                buf.push(APPENDS);
            }
        }
        Value::Dict(pairs) => {
            buf.push(EMPTY_DICT);
            if !pairs.is_empty() {
                buf.push(MARK);
                for (key, val) in pairs {
                    write_str(buf, key);
                    write_value(buf, val);
                }
                buf.push(SETITEMS);
            }
        }
    }
}

fn write_document(root: Value) -> Vec<u8> {
    let mut buf = Vec::new();
    write_header(&mut buf);
    write_value(&mut buf, &root);
    buf.push(STOP);
    buf
}

/// `find`: list of mappings with keys `metric_path`, `path`, `isLeaf`,
/// `is_leaf`, `intervals` (§6).
pub fn encode_find(now: i64, matches: &[Match]) -> Vec<u8> {
    let interval_end = now + 60;
    let items = matches
        .iter()
        .map(|m| {
            Value::Dict(vec![
                ("metric_path", Value::Str(m.path.clone())),
                ("path", Value::Str(m.path.clone())),
                ("isLeaf", Value::Bool(m.is_leaf)),
                ("is_leaf", Value::Bool(m.is_leaf)),
                (
                    "intervals",
                    Value::Dict(vec![("start", Value::Int(0)), ("end", Value::Int(interval_end))]),
                ),
            ])
        })
        .collect();
    write_document(Value::List(items))
}

/// `render`: list of mappings with keys `name`, `start`, `step`, `end`,
/// `values`, where an absent sample encodes as `None` (§6).
pub fn encode_render(vectors: &[PointVector]) -> Vec<u8> {
    let items = vectors
        .iter()
        .map(|pv| {
            let values = pv
                .values
                .iter()
                .zip(&pv.is_absent)
                .map(|(&v, &absent)| if absent { Value::None } else { Value::Float(v) })
                .collect();
            Value::Dict(vec![
                ("name", Value::Str(pv.name.clone())),
                ("start", Value::Int(pv.start_time)),
                ("step", Value::Int(i64::from(pv.step_time))),
                ("end", Value::Int(pv.stop_time)),
                ("values", Value::List(values)),
            ])
        })
        .collect();
    write_document(Value::List(items))
}
