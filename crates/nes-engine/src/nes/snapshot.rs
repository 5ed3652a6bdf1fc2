//! Self-describing key/value container used for save states.
//!
//! Every stateful component writes an explicit list of named fields into a
//! [`Snapshot`] and reads them back by name. Missing keys (or keys holding a
//! different type) read back as the type's default, so fields can be appended
//! to a component without invalidating older states.
//!
//! Binary layout (little endian):
//! ```text
//! u32 entry_count
//! entry_count * { u16 key_len, key bytes (utf-8), u8 tag, payload }
//! ```
//! Strings, arrays and nested snapshots carry a u32 length prefix.

use log::warn;

const MAX_NESTING: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
    U16Array(Vec<u16>),
    U32Array(Vec<u32>),
    I32Array(Vec<i32>),
    BoolArray(Vec<bool>),
    Nested(Snapshot),
}

impl Value {
    fn tag(&self) -> u8 {
        match self {
            Value::Bool(_) => 1,
            Value::U8(_) => 2,
            Value::I8(_) => 3,
            Value::U16(_) => 4,
            Value::I16(_) => 5,
            Value::U32(_) => 6,
            Value::I32(_) => 7,
            Value::U64(_) => 8,
            Value::I64(_) => 9,
            Value::F32(_) => 10,
            Value::F64(_) => 11,
            Value::Str(_) => 12,
            Value::Bytes(_) => 13,
            Value::U16Array(_) => 14,
            Value::U32Array(_) => 15,
            Value::I32Array(_) => 16,
            Value::BoolArray(_) => 17,
            Value::Nested(_) => 18,
        }
    }
}

/// Conversion between a Rust value and a [`Value`] cell.
pub trait SnapshotValue: Sized {
    fn into_value(self) -> Value;
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! snapshot_value {
    ($ty:ty, $variant:ident) => {
        impl SnapshotValue for $ty {
            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

snapshot_value!(bool, Bool);
snapshot_value!(u8, U8);
snapshot_value!(i8, I8);
snapshot_value!(u16, U16);
snapshot_value!(i16, I16);
snapshot_value!(u32, U32);
snapshot_value!(i32, I32);
snapshot_value!(u64, U64);
snapshot_value!(i64, I64);
snapshot_value!(f32, F32);
snapshot_value!(f64, F64);
snapshot_value!(String, Str);
snapshot_value!(Vec<u8>, Bytes);
snapshot_value!(Vec<u16>, U16Array);
snapshot_value!(Vec<u32>, U32Array);
snapshot_value!(Vec<i32>, I32Array);
snapshot_value!(Vec<bool>, BoolArray);
snapshot_value!(Snapshot, Nested);

/// Enums stored by ordinal.
pub trait Ordinal: Sized {
    fn ordinal(&self) -> u8;
    fn from_ordinal(ordinal: u8) -> Option<Self>;
}

/// A component that can capture and restore its state.
pub trait Snapshotable {
    fn save(&self, snapshot: &mut Snapshot);
    fn restore(&mut self, snapshot: &Snapshot);

    fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        self.save(&mut snapshot);
        snapshot
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    entries: Vec<(String, Value)>,
}

impl Snapshot {
    pub fn new() -> Self {
        Snapshot::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Writes a field. Writing an existing key replaces its value in place.
    pub fn write<T: SnapshotValue>(&mut self, key: &str, value: T) {
        let value = value.into_value();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn write_bytes(&mut self, key: &str, value: &[u8]) {
        self.write(key, value.to_vec());
    }

    pub fn write_enum<E: Ordinal>(&mut self, key: &str, value: E) {
        self.write(key, value.ordinal());
    }

    pub fn write_snapshot(&mut self, key: &str, component: &dyn Snapshotable) {
        self.write(key, component.snapshot());
    }

    /// Reads a field, falling back to `T::default()` when the key is absent or
    /// holds a different type.
    pub fn read<T: SnapshotValue + Default>(&self, key: &str) -> T {
        self.read_opt(key).unwrap_or_default()
    }

    pub fn read_or<T: SnapshotValue>(&self, key: &str, default: T) -> T {
        self.read_opt(key).unwrap_or(default)
    }

    pub fn read_opt<T: SnapshotValue>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(T::from_value)
    }

    pub fn read_enum<E: Ordinal>(&self, key: &str, default: E) -> E {
        self.read_opt::<u8>(key)
            .and_then(E::from_ordinal)
            .unwrap_or(default)
    }

    /// Nested snapshot, `None` when absent.
    pub fn nested(&self, key: &str) -> Option<&Snapshot> {
        match self.get(key) {
            Some(Value::Nested(s)) => Some(s),
            _ => None,
        }
    }

    /// Restores `component` from the nested snapshot under `key`. An absent
    /// key restores from an empty snapshot, i.e. every field takes its default.
    pub fn restore_nested(&self, key: &str, component: &mut dyn Snapshotable) {
        match self.nested(key) {
            Some(s) => component.restore(s),
            None => component.restore(&Snapshot::new()),
        }
    }

    /// Copies a byte array into `dest`. Missing or short arrays leave the
    /// remaining bytes zeroed.
    pub fn read_bytes_into(&self, key: &str, dest: &mut [u8]) {
        dest.fill(0);
        if let Some(Value::Bytes(src)) = self.get(key) {
            let n = src.len().min(dest.len());
            dest[..n].copy_from_slice(&src[..n]);
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }

    /// Parses a blob produced by [`Snapshot::to_bytes`]. Any malformed input
    /// yields an empty snapshot.
    pub fn from_bytes(bytes: &[u8]) -> Snapshot {
        let mut reader = Reader { bytes, pos: 0 };
        match Snapshot::decode(&mut reader, 0) {
            Some(s) if reader.pos == bytes.len() => s,
            Some(_) => {
                warn!("snapshot has {} trailing bytes, ignoring it", bytes.len() - reader.pos);
                Snapshot::new()
            }
            None => {
                warn!("corrupt snapshot ({} bytes), nothing restored", bytes.len());
                Snapshot::new()
            }
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for (key, value) in &self.entries {
            let key = key.as_bytes();
            let key_len = key.len().min(u16::MAX as usize);
            out.extend_from_slice(&(key_len as u16).to_le_bytes());
            out.extend_from_slice(&key[..key_len]);
            out.push(value.tag());
            match value {
                Value::Bool(v) => out.push(*v as u8),
                Value::U8(v) => out.push(*v),
                Value::I8(v) => out.push(*v as u8),
                Value::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
                Value::I16(v) => out.extend_from_slice(&v.to_le_bytes()),
                Value::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
                Value::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
                Value::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
                Value::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
                Value::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
                Value::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
                Value::Str(v) => {
                    out.extend_from_slice(&(v.len() as u32).to_le_bytes());
                    out.extend_from_slice(v.as_bytes());
                }
                Value::Bytes(v) => {
                    out.extend_from_slice(&(v.len() as u32).to_le_bytes());
                    out.extend_from_slice(v);
                }
                Value::U16Array(v) => {
                    out.extend_from_slice(&(v.len() as u32).to_le_bytes());
                    v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes()));
                }
                Value::U32Array(v) => {
                    out.extend_from_slice(&(v.len() as u32).to_le_bytes());
                    v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes()));
                }
                Value::I32Array(v) => {
                    out.extend_from_slice(&(v.len() as u32).to_le_bytes());
                    v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes()));
                }
                Value::BoolArray(v) => {
                    out.extend_from_slice(&(v.len() as u32).to_le_bytes());
                    v.iter().for_each(|x| out.push(*x as u8));
                }
                Value::Nested(v) => {
                    let inner = v.to_bytes();
                    out.extend_from_slice(&(inner.len() as u32).to_le_bytes());
                    out.extend_from_slice(&inner);
                }
            }
        }
    }

    fn decode(reader: &mut Reader, depth: usize) -> Option<Snapshot> {
        if depth > MAX_NESTING {
            return None;
        }
        let count = reader.u32()? as usize;
        // Every entry needs at least 3 bytes (key length + tag).
        if count > reader.remaining() / 3 {
            return None;
        }

        let mut snapshot = Snapshot { entries: Vec::with_capacity(count) };
        for _ in 0..count {
            let key_len = reader.u16()? as usize;
            let key = String::from_utf8(reader.take(key_len)?.to_vec()).ok()?;
            let tag = reader.u8()?;
            let value = match tag {
                1 => Value::Bool(reader.u8()? != 0),
                2 => Value::U8(reader.u8()?),
                3 => Value::I8(reader.u8()? as i8),
                4 => Value::U16(reader.u16()?),
                5 => Value::I16(reader.u16()? as i16),
                6 => Value::U32(reader.u32()?),
                7 => Value::I32(reader.u32()? as i32),
                8 => Value::U64(reader.u64()?),
                9 => Value::I64(reader.u64()? as i64),
                10 => Value::F32(f32::from_bits(reader.u32()?)),
                11 => Value::F64(f64::from_bits(reader.u64()?)),
                12 => {
                    let len = reader.u32()? as usize;
                    Value::Str(String::from_utf8(reader.take(len)?.to_vec()).ok()?)
                }
                13 => {
                    let len = reader.u32()? as usize;
                    Value::Bytes(reader.take(len)?.to_vec())
                }
                14 => Value::U16Array(reader.array(2, |b| u16::from_le_bytes([b[0], b[1]]))?),
                15 => Value::U32Array(
                    reader.array(4, |b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))?,
                ),
                16 => Value::I32Array(
                    reader.array(4, |b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))?,
                ),
                17 => Value::BoolArray(reader.array(1, |b| b[0] != 0)?),
                18 => {
                    let len = reader.u32()? as usize;
                    let inner = reader.take(len)?;
                    let mut nested = Reader { bytes: inner, pos: 0 };
                    let value = Snapshot::decode(&mut nested, depth + 1)?;
                    if nested.pos != inner.len() {
                        return None;
                    }
                    Value::Nested(value)
                }
                _ => return None,
            };
            snapshot.entries.push((key, value));
        }
        Some(snapshot)
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        if len > self.remaining() {
            return None;
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Some(slice)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Option<u64> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Some(u64::from_le_bytes(raw))
    }

    fn array<T>(&mut self, width: usize, f: impl Fn(&[u8]) -> T) -> Option<Vec<T>> {
        let len = self.u32()? as usize;
        let bytes = self.take(len.checked_mul(width)?)?;
        Some(bytes.chunks_exact(width).map(f).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Mode {
        A,
        B,
    }

    impl Ordinal for Mode {
        fn ordinal(&self) -> u8 {
            *self as u8
        }

        fn from_ordinal(ordinal: u8) -> Option<Self> {
            match ordinal {
                0 => Some(Mode::A),
                1 => Some(Mode::B),
                _ => None,
            }
        }
    }

    fn sample() -> Snapshot {
        let mut s = Snapshot::new();
        s.write("flag", true);
        s.write("a", 0x42u8);
        s.write("pc", 0xC000u16);
        s.write("cycles", 123_456_789u64);
        s.write("delta", -5i32);
        s.write("ratio", 0.25f64);
        s.write("name", "nestest".to_string());
        s.write_bytes("ram", &[1, 2, 3, 4]);
        s.write("banks", vec![0u32, 7, 9]);
        s.write_enum("mode", Mode::B);
        let mut inner = Snapshot::new();
        inner.write("x", 7u8);
        s.write("inner", inner);
        s
    }

    #[test]
    fn test_typed_round_trip_in_memory() {
        let s = sample();
        assert!(s.read::<bool>("flag"));
        assert_eq!(s.read::<u8>("a"), 0x42);
        assert_eq!(s.read::<u16>("pc"), 0xC000);
        assert_eq!(s.read::<u64>("cycles"), 123_456_789);
        assert_eq!(s.read::<i32>("delta"), -5);
        assert_eq!(s.read::<f64>("ratio"), 0.25);
        assert_eq!(s.read::<String>("name"), "nestest");
        assert_eq!(s.read::<Vec<u8>>("ram"), vec![1, 2, 3, 4]);
        assert_eq!(s.read::<Vec<u32>>("banks"), vec![0, 7, 9]);
        assert_eq!(s.read_enum("mode", Mode::A), Mode::B);
        assert_eq!(s.nested("inner").map(|i| i.read::<u8>("x")), Some(7));
    }

    #[test]
    fn test_round_trip_through_bytes() {
        let s = sample();
        let restored = Snapshot::from_bytes(&s.to_bytes());
        assert_eq!(restored, s);
        assert_eq!(restored.read::<String>("name"), "nestest");
        assert_eq!(restored.nested("inner").map(|i| i.read::<u8>("x")), Some(7));
    }

    #[test]
    fn test_absent_keys_return_defaults() {
        let s = Snapshot::new();
        assert!(!s.read::<bool>("missing"));
        assert_eq!(s.read::<u32>("missing"), 0);
        assert_eq!(s.read::<String>("missing"), "");
        assert!(s.read::<Vec<u8>>("missing").is_empty());
        assert!(s.nested("missing").is_none());
        assert_eq!(s.read_enum("missing", Mode::A), Mode::A);
    }

    #[test]
    fn test_type_mismatch_returns_default() {
        let mut s = Snapshot::new();
        s.write("value", 300u16);
        assert_eq!(s.read::<u8>("value"), 0);
        assert_eq!(s.read_or::<u8>("value", 9), 9);
        assert_eq!(s.read::<u16>("value"), 300);
    }

    #[test]
    fn test_rewrite_replaces_value() {
        let mut s = Snapshot::new();
        s.write("a", 1u8);
        s.write("a", 2u8);
        assert_eq!(s.len(), 1);
        assert_eq!(s.read::<u8>("a"), 2);
    }

    #[test]
    fn test_read_bytes_into_pads_short_arrays() {
        let mut s = Snapshot::new();
        s.write_bytes("ram", &[9, 9]);
        let mut dest = [0xFFu8; 4];
        s.read_bytes_into("ram", &mut dest);
        assert_eq!(dest, [9, 9, 0, 0]);
    }

    #[test]
    fn test_truncated_bytes_restore_nothing() {
        let bytes = sample().to_bytes();
        for len in 0..bytes.len() {
            let s = Snapshot::from_bytes(&bytes[..len]);
            assert!(s.is_empty(), "prefix of {len} bytes should not parse");
        }
    }

    #[test]
    fn test_garbage_never_panics() {
        let mut rng = StdRng::seed_from_u64(0x1234_5678);
        for len in 0..512 {
            let mut bytes = vec![0u8; len];
            rng.fill_bytes(&mut bytes);
            let _ = Snapshot::from_bytes(&bytes);
        }
        // Huge declared lengths must not allocate or panic.
        let s = Snapshot::from_bytes(&[0xFF, 0xFF, 0xFF, 0xFF, 0, 0]);
        assert!(s.is_empty());
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut bytes = sample().to_bytes();
        bytes.push(0);
        assert!(Snapshot::from_bytes(&bytes).is_empty());
    }
}
