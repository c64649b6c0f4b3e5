use core::fmt::Write;

use szl_types::Kind;

use crate::decoder::{Decoder, Token};
use crate::CodecError;

impl Decoder<'_> {
    /// Render the remaining encodings as display text, comma-separated.
    ///
    /// Arrays print as `[..]`, tuples as `(..)`, maps as `{k: v, ..}` with
    /// `{:}` for the empty map.
    pub fn pretty_print(&mut self) -> Result<String, CodecError> {
        let mut out = String::new();
        let mut first = true;
        while !self.done() {
            if !first {
                out.push_str(", ");
            }
            first = false;
            self.pretty_value(&mut out)?;
        }
        Ok(out)
    }

    fn pretty_value(&mut self, out: &mut String) -> Result<(), CodecError> {
        match self.peek()? {
            Token::Bool => {
                let b = self.get_bool()?;
                out.push_str(if b { "true" } else { "false" });
            }
            Token::Int => {
                let _ = write!(out, "{}", self.get_int()?);
            }
            Token::Uint => {
                let _ = write!(out, "{}", self.get_uint()?);
            }
            Token::Float => {
                let _ = write!(out, "{}", self.get_float()?);
            }
            Token::Fingerprint => {
                let _ = write!(out, "0x{:x}p", self.get_fingerprint()?);
            }
            Token::Time => {
                let _ = write!(out, "{}t", self.get_time()?);
            }
            Token::String => {
                let _ = write!(out, "{:?}", self.get_string()?);
            }
            Token::Bytes => {
                let _ = write!(out, "X\"{}\"", hex::encode(self.get_bytes()?));
            }
            Token::Start(Kind::Array) => {
                self.get_start(Kind::Array)?;
                out.push('[');
                self.pretty_group(out, Kind::Array)?;
                out.push(']');
            }
            Token::Start(Kind::Tuple) => {
                self.get_start(Kind::Tuple)?;
                out.push('(');
                self.pretty_group(out, Kind::Tuple)?;
                out.push(')');
            }
            Token::Start(Kind::Map) => self.pretty_map(out)?,
            Token::Start(_) | Token::End(_) => {
                return Err(CodecError::InvalidValue("unexpected marker"))
            }
        }
        Ok(())
    }

    fn pretty_group(&mut self, out: &mut String, kind: Kind) -> Result<(), CodecError> {
        let mut first = true;
        while self.peek()? != Token::End(kind) {
            if !first {
                out.push_str(", ");
            }
            first = false;
            self.pretty_value(out)?;
        }
        self.get_end(kind)
    }

    fn pretty_map(&mut self, out: &mut String) -> Result<(), CodecError> {
        self.get_start(Kind::Map)?;
        // The pair count follows the start marker.
        let pairs = self.get_int()?;
        out.push('{');
        if pairs == 0 {
            out.push(':');
        }
        for i in 0..pairs {
            if i > 0 {
                out.push_str(", ");
            }
            self.pretty_value(out)?;
            out.push_str(": ");
            self.pretty_value(out)?;
        }
        out.push('}');
        self.get_end(Kind::Map)
    }
}
