//! Canonical length-prefixed serialization.
//!
//! Integers are unsigned big-endian with a fixed width. Variable-length
//! fields carry an explicit byte-length prefix whose width is declared at the
//! field site. Vectors encode the byte length of the concatenated element
//! encodings, not the element count. Signatures and transcript hashes cover
//! these bytes, so encoding must be canonical: `decode(encode(v)) == v` and
//! `encode(decode(b)) == b` for well-formed `b`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::utilities::error::{Error, Result};

/// Reads a big-endian unsigned integer of `width` bytes, `width <= 8`.
pub fn read_uint<B: Buf>(buf: &mut B, width: usize) -> Result<u64> {
    if buf.remaining() < width {
        return Err(Error::TruncatedInput);
    }
    let mut value = 0u64;
    for _ in 0..width {
        value = (value << 8) | u64::from(buf.get_u8());
    }
    Ok(value)
}

/// Writes a big-endian unsigned integer of `width` bytes, `width <= 8`.
pub fn write_uint<B: BufMut>(value: u64, width: usize, buf: &mut B) -> Result<()> {
    if width < 8 && value >> (8 * width) != 0 {
        return Err(Error::OversizedField);
    }
    for i in (0..width).rev() {
        buf.put_u8((value >> (8 * i)) as u8);
    }
    Ok(())
}

pub fn read_u8<B: Buf>(buf: &mut B) -> Result<u8> {
    Ok(read_uint(buf, 1)? as u8)
}

pub fn read_u16<B: Buf>(buf: &mut B) -> Result<u16> {
    Ok(read_uint(buf, 2)? as u16)
}

pub fn read_u32<B: Buf>(buf: &mut B) -> Result<u32> {
    Ok(read_uint(buf, 4)? as u32)
}

/// Reads an opaque byte string with a length prefix of `width` bytes.
pub fn deserialize_opaque<B: Buf>(buf: &mut B, width: usize) -> Result<Bytes> {
    let len = read_uint(buf, width)? as usize;
    if buf.remaining() < len {
        return Err(Error::LengthOverflow);
    }
    Ok(buf.copy_to_bytes(len))
}

/// Writes an opaque byte string with a length prefix of `width` bytes.
pub fn serialize_opaque<B: BufMut>(v: &[u8], width: usize, buf: &mut B) -> Result<()> {
    write_uint(v.len() as u64, width, buf)?;
    buf.put(v);
    Ok(())
}

/// Reads a variable vector: a `width`-byte length prefix followed by that
/// many bytes of concatenated element encodings. `f` is called once per
/// element until the sub-buffer is exhausted; an element that reads past the
/// declared length fails with `TruncatedInput`.
pub fn deserialize_vector<B: Buf>(
    buf: &mut B,
    width: usize,
    mut f: impl FnMut(&mut Bytes) -> Result<()>,
) -> Result<()> {
    let n = read_uint(buf, width)? as usize;
    if buf.remaining() < n {
        return Err(Error::LengthOverflow);
    }

    let mut v = buf.copy_to_bytes(n);
    let ss = &mut v;
    while ss.has_remaining() {
        f(ss)?;
    }
    Ok(())
}

/// Writes a variable vector of `n` elements through `f`, prefixed with the
/// total byte length in `width` bytes.
pub fn serialize_vector<B: BufMut>(
    n: usize,
    width: usize,
    buf: &mut B,
    mut f: impl FnMut(usize, &mut BytesMut) -> Result<()>,
) -> Result<()> {
    // The byte length is only known after encoding the elements, so they go
    // through a temporary buffer first.
    let mut child = BytesMut::new();
    for i in 0..n {
        f(i, &mut child)?;
    }

    let raw = child.freeze();
    serialize_opaque(&raw, width, buf)
}

/// Reads an optional's presence octet. Any value other than 0 or 1 is
/// rejected so that every value has exactly one encoding.
pub fn deserialize_optional<B: Buf>(buf: &mut B) -> Result<bool> {
    match read_u8(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(Error::UnknownVariant("optional")),
    }
}

pub fn serialize_optional<B: BufMut>(present: bool, buf: &mut B) -> Result<()> {
    buf.put_u8(u8::from(present));
    Ok(())
}

pub trait Deserializer {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf;

    /// Decodes from a complete byte string, demanding that every byte is
    /// consumed.
    fn deserialize_exact(buf: impl AsRef<[u8]>) -> Result<Self>
    where
        Self: Sized,
    {
        let mut buf = buf.as_ref();
        let value = Self::deserialize(&mut buf)?;
        if buf.has_remaining() {
            return Err(Error::TrailingBytes);
        }
        Ok(value)
    }
}

pub trait Serializer {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut;

    fn serialize_detached(&self) -> Result<Bytes>
    where
        Self: Sized,
    {
        let mut buf = BytesMut::new();
        self.serialize(&mut buf)?;
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod serde_test {
    use bytes::{Buf, BufMut, Bytes, BytesMut};

    use super::*;

    #[test]
    fn uint_round_trip() {
        for (value, width, expected) in [
            (0u64, 1, vec![0u8]),
            (0xab, 1, vec![0xab]),
            (0x0102, 2, vec![0x01, 0x02]),
            (0x01020304, 4, vec![0x01, 0x02, 0x03, 0x04]),
            (1, 8, vec![0, 0, 0, 0, 0, 0, 0, 1]),
        ] {
            let mut buf = BytesMut::new();
            write_uint(value, width, &mut buf).unwrap();
            assert_eq!(&buf[..], &expected[..]);
            let mut rd = buf.freeze();
            assert_eq!(read_uint(&mut rd, width).unwrap(), value);
            assert!(!rd.has_remaining());
        }
    }

    #[test]
    fn uint_overflow_rejected() {
        let mut buf = BytesMut::new();
        assert_eq!(
            write_uint(0x100, 1, &mut buf),
            Err(Error::OversizedField)
        );
        assert_eq!(
            write_uint(0x1_0000_0000, 4, &mut buf),
            Err(Error::OversizedField)
        );
    }

    #[test]
    fn uint_truncated() {
        let mut short: &[u8] = &[0x01];
        assert_eq!(read_uint(&mut short, 2), Err(Error::TruncatedInput));
    }

    #[test]
    fn opaque_round_trip_all_widths() {
        for width in 1..=4usize {
            let mut buf = BytesMut::new();
            serialize_opaque(b"hello", width, &mut buf).unwrap();
            assert_eq!(buf.len(), width + 5);
            let mut rd = buf.freeze();
            let out = deserialize_opaque(&mut rd, width).unwrap();
            assert_eq!(&out[..], b"hello");
            assert!(!rd.has_remaining());
        }
    }

    #[test]
    fn opaque_length_overflow() {
        // Prefix claims 5 bytes but only 2 follow.
        let mut rd: &[u8] = &[0x05, 0xaa, 0xbb];
        assert_eq!(deserialize_opaque(&mut rd, 1), Err(Error::LengthOverflow));
    }

    #[test]
    fn vector_encodes_byte_length_not_count() {
        // Two u16 elements: byte length prefix must read 4, not 2.
        let mut buf = BytesMut::new();
        serialize_vector(2, 2, &mut buf, |i, b| {
            b.put_u16(i as u16 + 1);
            Ok(())
        })
        .unwrap();
        assert_eq!(&buf[..], &[0x00, 0x04, 0x00, 0x01, 0x00, 0x02]);

        let mut rd = buf.freeze();
        let mut out = vec![];
        deserialize_vector(&mut rd, 2, |b: &mut Bytes| {
            out.push(read_u16(b)?);
            Ok(())
        })
        .unwrap();
        assert_eq!(out, vec![1, 2]);
    }

    #[test]
    fn vector_element_overrun_is_truncated_input() {
        // Declared 3 bytes of u16 elements: second element underflows.
        let mut rd: &[u8] = &[0x03, 0x00, 0x01, 0xff];
        let result = deserialize_vector(&mut rd, 1, |b: &mut Bytes| {
            read_u16(b)?;
            Ok(())
        });
        assert_eq!(result, Err(Error::TruncatedInput));
    }

    #[test]
    fn optional_rejects_non_boolean_octet() {
        let mut rd: &[u8] = &[0x02];
        assert_eq!(
            deserialize_optional(&mut rd),
            Err(Error::UnknownVariant("optional"))
        );
    }

    struct Sample {
        id: Bytes,
        tag: u16,
    }

    impl Serializer for Sample {
        fn serialize<B>(&self, buf: &mut B) -> Result<()>
        where
            B: BufMut,
        {
            serialize_opaque(&self.id, 1, buf)?;
            write_uint(u64::from(self.tag), 2, buf)
        }
    }

    impl Deserializer for Sample {
        fn deserialize<B>(buf: &mut B) -> Result<Self>
        where
            B: Buf,
        {
            let id = deserialize_opaque(buf, 1)?;
            let tag = read_u16(buf)?;
            Ok(Self { id, tag })
        }
    }

    #[test]
    fn exact_decode_rejects_trailing_bytes() {
        let sample = Sample {
            id: Bytes::from_static(b"id"),
            tag: 7,
        };
        let mut encoded = sample.serialize_detached().unwrap().to_vec();
        assert!(Sample::deserialize_exact(&encoded).is_ok());

        encoded.push(0x00);
        assert_eq!(
            Sample::deserialize_exact(&encoded).map(|_| ()),
            Err(Error::TrailingBytes)
        );
    }

    #[test]
    fn canonical_both_directions() {
        let sample = Sample {
            id: Bytes::from_static(b"abc"),
            tag: 0xbeef,
        };
        let encoded = sample.serialize_detached().unwrap();
        let decoded = Sample::deserialize_exact(&encoded).unwrap();
        assert_eq!(decoded.id, sample.id);
        assert_eq!(decoded.tag, sample.tag);
        assert_eq!(decoded.serialize_detached().unwrap(), encoded);
    }
}
