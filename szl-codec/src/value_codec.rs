use szl_types::{Kind, SzlType, TypedValue, ValueOps};

use crate::{CodecError, Decoder, Encoder};

/// Wire bridge for [`ValueOps`]-typed values.
///
/// Flat types (base types and tuples of base types) are encoded as their
/// bare leaf sequence, with no composite markers — the layout every kernel
/// uses for weights and sums inside flush payloads. `skip_value` also
/// handles composite element types, whose encodings carry markers.
pub trait ValueCodec {
    fn encode_value(&self, v: &TypedValue, enc: &mut Encoder) -> Result<(), CodecError>;
    fn decode_value(&self, dec: &mut Decoder<'_>) -> Result<TypedValue, CodecError>;
    fn skip_value(&self, dec: &mut Decoder<'_>) -> Result<(), CodecError>;
}

impl ValueCodec for ValueOps {
    fn encode_value(&self, v: &TypedValue, enc: &mut Encoder) -> Result<(), CodecError> {
        encode_flat(v, enc)
    }

    fn decode_value(&self, dec: &mut Decoder<'_>) -> Result<TypedValue, CodecError> {
        decode_by_type(self.ty(), dec)
    }

    fn skip_value(&self, dec: &mut Decoder<'_>) -> Result<(), CodecError> {
        skip_by_type(self.ty(), dec)
    }
}

fn encode_flat(v: &TypedValue, enc: &mut Encoder) -> Result<(), CodecError> {
    match v {
        TypedValue::Bool(b) => enc.put_bool(*b),
        TypedValue::Int(i) => enc.put_int(*i),
        TypedValue::Uint(u) => enc.put_uint(*u),
        TypedValue::Float(f) => enc.put_float(*f),
        TypedValue::Fingerprint(fp) => enc.put_fingerprint(*fp),
        TypedValue::Time(t) => enc.put_time(*t),
        TypedValue::Bytes(b) => enc.put_bytes(b),
        TypedValue::Str(s) => enc.put_string(s)?,
        TypedValue::Tuple(fields) => {
            for field in fields {
                encode_flat(field, enc)?;
            }
        }
        _ => return Err(CodecError::InvalidValue("value type has no flat encoding")),
    }
    Ok(())
}

fn decode_by_type(ty: &SzlType, dec: &mut Decoder<'_>) -> Result<TypedValue, CodecError> {
    Ok(match ty.kind() {
        Kind::Bool => TypedValue::Bool(dec.get_bool()?),
        Kind::Int => TypedValue::Int(dec.get_int()?),
        Kind::Uint => TypedValue::Uint(dec.get_uint()?),
        Kind::Float => TypedValue::Float(dec.get_float()?),
        Kind::Fingerprint => TypedValue::Fingerprint(dec.get_fingerprint()?),
        Kind::Time => TypedValue::Time(dec.get_time()?),
        Kind::Bytes => TypedValue::Bytes(dec.get_bytes()?),
        Kind::String => TypedValue::Str(dec.get_string()?),
        Kind::Tuple => TypedValue::Tuple(
            ty.fields()
                .iter()
                .map(|f| decode_by_type(f.ty(), dec))
                .collect::<Result<_, _>>()?,
        ),
        _ => return Err(CodecError::InvalidValue("type has no flat decoding")),
    })
}

fn skip_by_type(ty: &SzlType, dec: &mut Decoder<'_>) -> Result<(), CodecError> {
    match ty.kind() {
        kind if kind.is_base() => dec.skip(kind),
        // Flat tuples are encoded markerless; skip field by field.
        Kind::Tuple => ty
            .fields()
            .iter()
            .try_for_each(|f| skip_by_type(f.ty(), dec)),
        Kind::Array | Kind::Map => dec.skip(ty.kind()),
        _ => Err(CodecError::InvalidValue("kind cannot be skipped")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use szl_types::SzlField;

    fn pair_ops() -> ValueOps {
        ValueOps::new(&SzlType::tuple_of(vec![
            SzlField::new("n", SzlType::int()),
            SzlField::new("w", SzlType::float()),
        ]))
    }

    #[test]
    fn flat_tuple_round_trip() {
        let ops = pair_ops();
        let v = TypedValue::Tuple(vec![TypedValue::Int(-3), TypedValue::Float(0.25)]);

        let mut enc = Encoder::new();
        ops.encode_value(&v, &mut enc).unwrap();
        let data = enc.take();

        let mut dec = Decoder::new(&data);
        assert_eq!(ops.decode_value(&mut dec).unwrap(), v);
        assert!(dec.done());

        let mut dec = Decoder::new(&data);
        ops.skip_value(&mut dec).unwrap();
        assert!(dec.done());
    }

    #[test]
    fn skip_handles_composite_element_types() {
        let ops = ValueOps::new(&SzlType::array_of(SzlType::int()));
        let mut enc = Encoder::new();
        enc.start(Kind::Array);
        enc.put_int(1);
        enc.put_int(2);
        enc.end(Kind::Array);
        let data = enc.take();

        let mut dec = Decoder::new(&data);
        ops.skip_value(&mut dec).unwrap();
        assert!(dec.done());
    }

    #[test]
    fn decode_of_truncated_tuple_fails() {
        let ops = pair_ops();
        let mut enc = Encoder::new();
        enc.put_int(1);
        let data = enc.take();
        let mut dec = Decoder::new(&data);
        assert!(ops.decode_value(&mut dec).is_err());
    }
}
