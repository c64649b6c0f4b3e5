use szl_types::Kind;

use crate::tags;
use crate::CodecError;

/// What the cursor is looking at, as reported by [`Decoder::peek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Bool,
    Bytes,
    Int,
    Uint,
    Float,
    Fingerprint,
    String,
    Time,
    Start(Kind),
    End(Kind),
}

/// Cursor over a canonical encoding; the exact inverse of
/// [`crate::Encoder`]. Accepts both the current and the v1 legacy layouts.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// True exactly when the cursor is at the end of the input.
    pub fn done(&self) -> bool {
        self.pos == self.buf.len()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Rewind to the start of the input.
    pub fn restart(&mut self) {
        self.pos = 0;
    }

    /// Classify the next encoding without advancing.
    pub fn peek(&self) -> Result<Token, CodecError> {
        let tag = *self.buf.get(self.pos).ok_or(CodecError::UnexpectedEnd)?;
        Ok(match tag {
            tags::BOOL_FALSE | tags::BOOL_TRUE | tags::V1_BOOL => Token::Bool,
            tags::BYTES | tags::V1_BYTES => Token::Bytes,
            tags::INT_NEG8..=tags::INT_POS8 | tags::V1_INT => Token::Int,
            tags::FLOAT | tags::V1_FLOAT => Token::Float,
            tags::FINGERPRINT1..=tags::FINGERPRINT8 | tags::V1_FINGERPRINT => Token::Fingerprint,
            tags::STRING => Token::String,
            tags::TIME1..=tags::TIME8 | tags::V1_TIME => Token::Time,
            tags::UINT1..=tags::UINT8 => Token::Uint,
            tags::ARRAY_START => Token::Start(Kind::Array),
            tags::ARRAY_END => Token::End(Kind::Array),
            tags::TUPLE_START => Token::Start(Kind::Tuple),
            tags::TUPLE_END => Token::End(Kind::Tuple),
            tags::MAP_START => Token::Start(Kind::Map),
            tags::MAP_END => Token::End(Kind::Map),
            _ => return Err(CodecError::InvalidValue("unknown tag")),
        })
    }

    pub fn get_bool(&mut self) -> Result<bool, CodecError> {
        match self.take_tag()? {
            tags::BOOL_FALSE => Ok(false),
            tags::BOOL_TRUE => Ok(true),
            tags::V1_BOOL => Ok(self.take_byte()? != 0),
            _ => Err(CodecError::InvalidValue("expected bool")),
        }
    }

    pub fn get_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        match self.take_tag()? {
            tags::BYTES => {
                let mut out = Vec::new();
                loop {
                    let b = self.take_byte()?;
                    if b != tags::BYTES_TERM {
                        out.push(b);
                        continue;
                    }
                    match self.take_byte()? {
                        tags::BYTES_TERM => out.push(tags::BYTES_TERM),
                        0x00 => return Ok(out),
                        _ => return Err(CodecError::InvalidValue("bad bytes terminator")),
                    }
                }
            }
            tags::V1_BYTES => {
                let len = u32::from_be_bytes(self.take_array::<4>()?) as usize;
                let out = self
                    .buf
                    .get(self.pos..self.pos + len)
                    .ok_or(CodecError::UnexpectedEnd)?
                    .to_vec();
                self.pos += len;
                Ok(out)
            }
            _ => Err(CodecError::InvalidValue("expected bytes")),
        }
    }

    pub fn get_int(&mut self) -> Result<i64, CodecError> {
        let tag = self.take_tag()?;
        match tag {
            tags::INT_POS1..=tags::INT_POS8 => {
                let n = (tag - tags::INT_POS1 + 1) as usize;
                let v = self.take_be(n)?;
                if v > i64::MAX as u64 {
                    return Err(CodecError::InvalidValue("positive int out of range"));
                }
                Ok(v as i64)
            }
            tags::INT_NEG8..=tags::INT_NEG1 => {
                let n = 8 - (tag - tags::INT_NEG8) as usize;
                let v = self.take_be(n)?;
                if n == 8 {
                    if v >> 63 == 0 {
                        return Err(CodecError::InvalidValue("negative int out of range"));
                    }
                    Ok(v as i64)
                } else {
                    Ok(((u64::MAX << (n * 8)) | v) as i64)
                }
            }
            tags::V1_INT => Ok((u64::from_be_bytes(self.take_array::<8>()?) ^ (1 << 63)) as i64),
            _ => Err(CodecError::InvalidValue("expected int")),
        }
    }

    pub fn get_uint(&mut self) -> Result<u64, CodecError> {
        let tag = self.take_tag()?;
        match tag {
            tags::UINT1..=tags::UINT8 => self.take_be((tag - tags::UINT1 + 1) as usize),
            _ => Err(CodecError::InvalidValue("expected uint")),
        }
    }

    pub fn get_float(&mut self) -> Result<f64, CodecError> {
        match self.take_tag()? {
            tags::FLOAT => {
                let key = u64::from_be_bytes(self.take_array::<8>()?);
                let bits = if key >> 63 == 1 { key ^ (1 << 63) } else { !key };
                Ok(f64::from_bits(bits))
            }
            tags::V1_FLOAT => {
                let positive = self.take_byte()? != 0;
                let magnitude = u64::from_be_bytes(self.take_array::<8>()?);
                let bits = if positive {
                    magnitude
                } else {
                    magnitude | (1 << 63)
                };
                Ok(f64::from_bits(bits))
            }
            _ => Err(CodecError::InvalidValue("expected float")),
        }
    }

    pub fn get_fingerprint(&mut self) -> Result<u64, CodecError> {
        let tag = self.take_tag()?;
        match tag {
            tags::FINGERPRINT1..=tags::FINGERPRINT8 => {
                self.take_be((tag - tags::FINGERPRINT1 + 1) as usize)
            }
            tags::V1_FINGERPRINT => Ok(u64::from_be_bytes(self.take_array::<8>()?)),
            _ => Err(CodecError::InvalidValue("expected fingerprint")),
        }
    }

    pub fn get_string(&mut self) -> Result<String, CodecError> {
        match self.take_tag()? {
            tags::STRING => {
                let start = self.pos;
                let nul = self.buf[start..]
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(CodecError::UnexpectedEnd)?;
                let raw = self.buf[start..start + nul].to_vec();
                self.pos = start + nul + 1;
                String::from_utf8(raw).map_err(|_| CodecError::InvalidValue("invalid UTF-8"))
            }
            _ => Err(CodecError::InvalidValue("expected string")),
        }
    }

    pub fn get_time(&mut self) -> Result<u64, CodecError> {
        let tag = self.take_tag()?;
        match tag {
            tags::TIME1..=tags::TIME8 => self.take_be((tag - tags::TIME1 + 1) as usize),
            tags::V1_TIME => Ok(u64::from_be_bytes(self.take_array::<8>()?)),
            _ => Err(CodecError::InvalidValue("expected time")),
        }
    }

    /// Consume the start marker of `kind`.
    pub fn get_start(&mut self, kind: Kind) -> Result<(), CodecError> {
        if self.peek()? == Token::Start(kind) {
            self.pos += 1;
            Ok(())
        } else {
            Err(CodecError::InvalidValue("expected start marker"))
        }
    }

    /// Consume the end marker of `kind`.
    pub fn get_end(&mut self, kind: Kind) -> Result<(), CodecError> {
        if self.peek()? == Token::End(kind) {
            self.pos += 1;
            Ok(())
        } else {
            Err(CodecError::InvalidValue("expected end marker"))
        }
    }

    /// Validate one encoding of `kind` and advance past it without
    /// materializing. Composite kinds skip their whole marker group.
    pub fn skip(&mut self, kind: Kind) -> Result<(), CodecError> {
        match kind {
            Kind::Bool => self.get_bool().map(drop),
            Kind::Bytes => self.skip_bytes(),
            Kind::Int => self.get_int().map(drop),
            Kind::Uint => self.get_uint().map(drop),
            Kind::Float => self.get_float().map(drop),
            Kind::Fingerprint => self.get_fingerprint().map(drop),
            Kind::String => self.get_string().map(drop),
            Kind::Time => self.get_time().map(drop),
            Kind::Array | Kind::Tuple | Kind::Map => {
                self.get_start(kind)?;
                while self.peek()? != Token::End(kind) {
                    self.skip_any()?;
                }
                self.get_end(kind)
            }
            _ => Err(CodecError::InvalidValue("kind cannot be skipped")),
        }
    }

    /// Skip whatever encoding comes next.
    pub fn skip_any(&mut self) -> Result<(), CodecError> {
        match self.peek()? {
            Token::Bool => self.skip(Kind::Bool),
            Token::Bytes => self.skip(Kind::Bytes),
            Token::Int => self.skip(Kind::Int),
            Token::Uint => self.skip(Kind::Uint),
            Token::Float => self.skip(Kind::Float),
            Token::Fingerprint => self.skip(Kind::Fingerprint),
            Token::String => self.skip(Kind::String),
            Token::Time => self.skip(Kind::Time),
            Token::Start(kind) => self.skip(kind),
            Token::End(_) => Err(CodecError::InvalidValue("unexpected end marker")),
        }
    }

    fn skip_bytes(&mut self) -> Result<(), CodecError> {
        match self.take_tag()? {
            tags::BYTES => loop {
                if self.take_byte()? != tags::BYTES_TERM {
                    continue;
                }
                match self.take_byte()? {
                    tags::BYTES_TERM => {}
                    0x00 => return Ok(()),
                    _ => return Err(CodecError::InvalidValue("bad bytes terminator")),
                }
            },
            tags::V1_BYTES => {
                let len = u32::from_be_bytes(self.take_array::<4>()?) as usize;
                if self.pos + len > self.buf.len() {
                    return Err(CodecError::UnexpectedEnd);
                }
                self.pos += len;
                Ok(())
            }
            _ => Err(CodecError::InvalidValue("expected bytes")),
        }
    }

    fn take_tag(&mut self) -> Result<u8, CodecError> {
        self.take_byte()
    }

    fn take_byte(&mut self) -> Result<u8, CodecError> {
        let b = *self.buf.get(self.pos).ok_or(CodecError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(b)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let slice = self
            .buf
            .get(self.pos..self.pos + N)
            .ok_or(CodecError::UnexpectedEnd)?;
        self.pos += N;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn take_be(&mut self, n: usize) -> Result<u64, CodecError> {
        debug_assert!(n >= 1 && n <= 8);
        let slice = self
            .buf
            .get(self.pos..self.pos + n)
            .ok_or(CodecError::UnexpectedEnd)?;
        self.pos += n;
        Ok(slice.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }
}
