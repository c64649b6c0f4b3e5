//! Tag bytes of the canonical encoding.
//!
//! Tags ascend so that byte order between kinds is fixed, and within a kind
//! the tag carries whatever the ordering needs: sign and payload length for
//! ints (negative tags below positive, longer negatives below shorter),
//! payload length for fingerprints, times and uints. 0x00 is never a tag.

/// The two bool tags; false sorts below true.
pub const BOOL_FALSE: u8 = 0x01;
pub const BOOL_TRUE: u8 = 0x02;

pub const BYTES: u8 = 0x03;
pub const STRING: u8 = 0x04;

/// Negative int with 8 payload bytes; `INT_NEG8 + (8 - n)` has `n` bytes.
pub const INT_NEG8: u8 = 0x05;
pub const INT_NEG1: u8 = 0x0c;
/// Positive int with 1 payload byte; `INT_POS1 + (n - 1)` has `n` bytes.
pub const INT_POS1: u8 = 0x0d;
pub const INT_POS8: u8 = 0x14;

pub const FLOAT: u8 = 0x15;

/// `FINGERPRINT1 + (n - 1)` carries `n` big-endian payload bytes.
pub const FINGERPRINT1: u8 = 0x16;
pub const FINGERPRINT8: u8 = 0x1d;
pub const TIME1: u8 = 0x1e;
pub const TIME8: u8 = 0x25;
pub const UINT1: u8 = 0x26;
pub const UINT8: u8 = 0x2d;

pub const ARRAY_START: u8 = 0x2e;
pub const ARRAY_END: u8 = 0x2f;
pub const TUPLE_START: u8 = 0x30;
pub const TUPLE_END: u8 = 0x31;
pub const MAP_START: u8 = 0x32;
pub const MAP_END: u8 = 0x33;

/// v1 legacy layouts keep their own tags so a decoder accepts either
/// version without being told which one wrote the data.
pub const V1_BOOL: u8 = 0x34;
pub const V1_BYTES: u8 = 0x35;
pub const V1_INT: u8 = 0x36;
pub const V1_FLOAT: u8 = 0x37;
pub const V1_FINGERPRINT: u8 = 0x38;
pub const V1_TIME: u8 = 0x39;

/// Bytes payload terminator. A literal 0x01 is escaped by doubling; the
/// payload ends with `0x01 0x00`.
pub const BYTES_TERM: u8 = 0x01;
