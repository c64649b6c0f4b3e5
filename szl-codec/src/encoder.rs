use core::mem;

use szl_types::Kind;

use crate::tags;
use crate::CodecError;

/// Encoding format version. `V2` is the current order-preserving layout;
/// `V1` reproduces the legacy fixed-width layouts for bool, int, float,
/// fingerprint and time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Version {
    V1,
    #[default]
    V2,
}

/// Appends self-delimited tagged encodings to a growing byte string.
///
/// Every `put_*` call appends exactly one encoding. Sequences of values are
/// normally encoded without structural markers; `start`/`end` bracket
/// arrays, maps, and tuples nested inside arrays.
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    version: Version,
    data: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(version: Version) -> Self {
        Self {
            version,
            data: Vec::new(),
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Drop the accumulated bytes but keep the version.
    pub fn reset(&mut self) {
        self.data.clear();
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn take(&mut self) -> Vec<u8> {
        mem::take(&mut self.data)
    }

    /// Append bytes that are already a valid encoding.
    pub fn append_encoding(&mut self, encoded: &[u8]) {
        self.data.extend_from_slice(encoded);
    }

    pub fn put_bool(&mut self, b: bool) {
        match self.version {
            Version::V1 => {
                self.data.push(tags::V1_BOOL);
                self.data.push(b as u8);
            }
            Version::V2 => self
                .data
                .push(if b { tags::BOOL_TRUE } else { tags::BOOL_FALSE }),
        }
    }

    pub fn put_bytes(&mut self, p: &[u8]) {
        match self.version {
            Version::V1 => {
                self.data.push(tags::V1_BYTES);
                self.data.extend_from_slice(&(p.len() as u32).to_be_bytes());
                self.data.extend_from_slice(p);
            }
            Version::V2 => {
                self.data.push(tags::BYTES);
                for &b in p {
                    self.data.push(b);
                    if b == tags::BYTES_TERM {
                        self.data.push(b);
                    }
                }
                self.data.push(tags::BYTES_TERM);
                self.data.push(0x00);
            }
        }
    }

    pub fn put_int(&mut self, i: i64) {
        match self.version {
            Version::V1 => {
                self.data.push(tags::V1_INT);
                self.data
                    .extend_from_slice(&((i as u64) ^ (1 << 63)).to_be_bytes());
            }
            Version::V2 => {
                if i >= 0 {
                    let raw = (i as u64).to_be_bytes();
                    let n = payload_len(i as u64);
                    self.data.push(tags::INT_POS1 + (n - 1) as u8);
                    self.data.extend_from_slice(&raw[8 - n..]);
                } else {
                    // Strip leading sign-extension bytes; the tag restores them.
                    let raw = (i as u64).to_be_bytes();
                    let mut start = 0;
                    while start < 7 && raw[start] == 0xff {
                        start += 1;
                    }
                    let n = 8 - start;
                    self.data.push(tags::INT_NEG8 + (8 - n) as u8);
                    self.data.extend_from_slice(&raw[start..]);
                }
            }
        }
    }

    pub fn put_uint(&mut self, u: u64) {
        self.put_varlen(tags::UINT1, u);
    }

    pub fn put_float(&mut self, f: f64) {
        match self.version {
            Version::V1 => {
                let bits = f.to_bits();
                self.data.push(tags::V1_FLOAT);
                self.data.push((bits >> 63 == 0) as u8);
                self.data
                    .extend_from_slice(&(bits & !(1 << 63)).to_be_bytes());
            }
            Version::V2 => {
                // Flip the sign bit of positives, all bits of negatives, so
                // IEEE order matches byte order.
                let bits = f.to_bits();
                let key = if bits >> 63 == 0 {
                    bits | (1 << 63)
                } else {
                    !bits
                };
                self.data.push(tags::FLOAT);
                self.data.extend_from_slice(&key.to_be_bytes());
            }
        }
    }

    pub fn put_fingerprint(&mut self, fp: u64) {
        match self.version {
            Version::V1 => {
                self.data.push(tags::V1_FINGERPRINT);
                self.data.extend_from_slice(&fp.to_be_bytes());
            }
            Version::V2 => self.put_varlen(tags::FINGERPRINT1, fp),
        }
    }

    /// Strings are NUL-terminated; an embedded NUL cannot be represented.
    pub fn put_string(&mut self, s: &str) -> Result<(), CodecError> {
        if s.bytes().any(|b| b == 0) {
            return Err(CodecError::InvalidValue("embedded NUL in string"));
        }
        self.data.push(tags::STRING);
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0x00);
        Ok(())
    }

    pub fn put_time(&mut self, t: u64) {
        match self.version {
            Version::V1 => {
                self.data.push(tags::V1_TIME);
                self.data.extend_from_slice(&t.to_be_bytes());
            }
            Version::V2 => self.put_varlen(tags::TIME1, t),
        }
    }

    /// Emit the start marker of an array, map, or tuple group.
    pub fn start(&mut self, kind: Kind) {
        match kind {
            Kind::Array => self.data.push(tags::ARRAY_START),
            Kind::Tuple => self.data.push(tags::TUPLE_START),
            Kind::Map => self.data.push(tags::MAP_START),
            _ => debug_assert!(false, "no start marker for {kind}"),
        }
    }

    /// Emit the end marker of an array, map, or tuple group.
    pub fn end(&mut self, kind: Kind) {
        match kind {
            Kind::Array => self.data.push(tags::ARRAY_END),
            Kind::Tuple => self.data.push(tags::TUPLE_END),
            Kind::Map => self.data.push(tags::MAP_END),
            _ => debug_assert!(false, "no end marker for {kind}"),
        }
    }

    fn put_varlen(&mut self, base_tag: u8, v: u64) {
        let raw = v.to_be_bytes();
        let n = payload_len(v);
        self.data.push(base_tag + (n - 1) as u8);
        self.data.extend_from_slice(&raw[8 - n..]);
    }
}

/// Big-endian payload length with leading zero bytes stripped, at least 1.
fn payload_len(v: u64) -> usize {
    ((71 - v.leading_zeros() as usize) / 8).max(1)
}
