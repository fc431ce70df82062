//! Serializer and Deserializer
//!
//! TLS-presentation wire format: big-endian fixed-width integers, opaque
//! byte strings and vectors prefixed by their encoded byte length, where
//! the width of each length prefix (1 to 4 bytes) is fixed per field.
//! Marshalling is deterministic; unmarshalling is strict.


use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::utilities::error::{Error, Result};

#[inline]
fn read_length<B: Buf>(buf: &mut B, width: usize) -> Result<usize> {
    if buf.remaining() < width {
        return Err(Error::BufferTooSmall);
    }
    let mut n = 0u64;
    for _ in 0..width {
        n = (n << 8) | u64::from(buf.get_u8());
    }
    Ok(n as usize)
}

#[inline]
fn write_length<B: BufMut>(len: usize, width: usize, buf: &mut B) -> Result<()> {
    let max = (1u64 << (8 * width)) - 1;
    if len as u64 > max {
        return Err(Error::LengthOverflow(width as u8));
    }
    for i in (0..width).rev() {
        buf.put_u8(((len as u64) >> (8 * i)) as u8);
    }
    Ok(())
}

#[inline]
pub fn deserialize_opaque<B: Buf>(buf: &mut B, width: usize) -> Result<Bytes> {
    let n = read_length(buf, width)?;
    if buf.remaining() < n {
        return Err(Error::BufferTooSmall);
    }
    Ok(buf.copy_to_bytes(n))
}

#[inline]
pub fn serialize_opaque<B: BufMut>(v: &[u8], width: usize, buf: &mut B) -> Result<()> {
    write_length(v.len(), width, buf)?;
    buf.put(v);
    Ok(())
}

/// Reads a length-prefixed vector, handing the framed body to `f` once per
/// element until it is exhausted. An element that reads past the declared
/// byte length fails inside `f` with a short read.
#[inline]
pub fn deserialize_vector<B: Buf>(
    buf: &mut B,
    width: usize,
    mut f: impl FnMut(&mut Bytes) -> Result<()>,
) -> Result<()> {
    let n = read_length(buf, width)?;
    if buf.remaining() < n {
        return Err(Error::BufferTooSmall);
    }

    let mut body = buf.copy_to_bytes(n);
    let ss = &mut body;
    while ss.has_remaining() {
        f(ss)?;
    }
    Ok(())
}

#[inline]
pub fn serialize_vector<B: BufMut>(
    n: usize,
    width: usize,
    buf: &mut B,
    mut f: impl FnMut(usize, &mut BytesMut) -> Result<()>,
) -> Result<()> {
    // The prefix counts encoded bytes, not elements, so the elements have
    // to be serialized into a temporary buffer first
    let mut child = BytesMut::new();
    for i in 0..n {
        f(i, &mut child)?;
    }

    serialize_opaque(&child, width, buf)
}

#[inline]
pub fn deserialize_optional<B: Buf>(buf: &mut B) -> Result<bool> {
    if !buf.has_remaining() {
        return Err(Error::BufferTooSmall);
    }
    let b = buf.get_u8();

    match b {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(Error::InvalidOptionalValue),
    }
}

#[inline]
pub fn serialize_optional<B: BufMut>(present: bool, buf: &mut B) -> Result<()> {
    buf.put_u8(u8::from(present));
    Ok(())
}

pub trait Deserializer {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf;

    /// Strict whole-message parse: trailing bytes are an error.
    fn deserialize_exact(buf: impl AsRef<[u8]>) -> Result<Self>
    where
        Self: Sized,
    {
        let mut buf = buf.as_ref();
        let v = Self::deserialize(&mut buf)?;
        if !buf.is_empty() {
            return Err(Error::TrailingBytes);
        }
        Ok(v)
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
