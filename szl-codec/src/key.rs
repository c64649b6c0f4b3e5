use szl_types::{Kind, SzlType};

use crate::{CodecError, Encoder};

/// Encode a textual key for string-prefix scans over stored table output.
///
/// Only works when the first index component of the table is a string or an
/// int; other index types cannot express a textual prefix.
pub fn encode_key_from_string(ty: &SzlType, key: &str) -> Result<Vec<u8>, CodecError> {
    let first = ty
        .indices()
        .first()
        .ok_or(CodecError::InvalidValue("table has no indices"))?;
    let mut enc = Encoder::new();
    match first.ty().kind() {
        Kind::String => enc.put_string(key)?,
        Kind::Int => enc.put_int(
            key.parse::<i64>()
                .map_err(|_| CodecError::InvalidValue("key is not an int"))?,
        ),
        _ => {
            return Err(CodecError::InvalidValue(
                "key prefix requires a string or int index",
            ))
        }
    }
    Ok(enc.take())
}
