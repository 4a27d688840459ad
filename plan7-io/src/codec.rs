//! Byte-order aware primitive codec.
//!
//! Every scalar is four bytes: `u32`, `i32` or IEEE-754 `f32`. Files are
//! written in the writer's host byte order; a reader bound to
//! [`ByteOrder::Swapped`] reverses each scalar as it is decoded.
//!
//! Strings are length-prefixed: an `i32` holding the byte count plus one for
//! a NUL terminator, then the bytes and the terminator. An absent string is a
//! bare length of zero, so `None` and `Some("")` stay distinct.

use std::io::{self, Read, Write};

use plan7_core::{Plan7Error, Result};

/// Byte order of a file relative to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Same order as the host; scalars are used as read.
    #[default]
    Native,
    /// Opposite order; every scalar is byte-reversed.
    Swapped,
}

impl ByteOrder {
    fn apply(self, word: u32) -> u32 {
        match self {
            ByteOrder::Native => word,
            ByteOrder::Swapped => word.swap_bytes(),
        }
    }
}

/// Map a failed read to `TruncatedInput` when the stream simply ran out.
fn read_error(e: io::Error, field: &str) -> Plan7Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Plan7Error::TruncatedInput(field.to_string())
    } else {
        Plan7Error::Io(e)
    }
}

fn reserve<T>(n: usize, what: &str) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(n)
        .map_err(|_| Plan7Error::OutOfMemory(format!("{} ({} values)", what, n)))?;
    Ok(v)
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Decodes scalars, arrays and strings from a byte stream.
#[derive(Debug)]
pub struct BinReader<R> {
    inner: R,
    order: ByteOrder,
}

impl<R: Read> BinReader<R> {
    pub fn new(inner: R, order: ByteOrder) -> Self {
        Self { inner, order }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read the four magic bytes of the next record, without byte-order
    /// correction.
    ///
    /// Returns `Ok(None)` if the stream ends before the first byte.
    ///
    /// # Errors
    ///
    /// `TruncatedInput` if the stream ends after one to three bytes.
    pub fn read_magic(&mut self) -> Result<Option<u32>> {
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Plan7Error::Io(e)),
            }
        }
        match filled {
            0 => Ok(None),
            4 => Ok(Some(u32::from_ne_bytes(buf))),
            _ => Err(Plan7Error::TruncatedInput("magic number".into())),
        }
    }

    fn read_word(&mut self, field: &str) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| read_error(e, field))?;
        Ok(self.order.apply(u32::from_ne_bytes(buf)))
    }

    pub fn read_u32(&mut self, field: &str) -> Result<u32> {
        self.read_word(field)
    }

    pub fn read_i32(&mut self, field: &str) -> Result<i32> {
        Ok(self.read_word(field)? as i32)
    }

    pub fn read_f32(&mut self, field: &str) -> Result<f32> {
        Ok(f32::from_bits(self.read_word(field)?))
    }

    /// Fill `out` with consecutive floats.
    pub fn read_f32_into(&mut self, out: &mut [f32], field: &str) -> Result<()> {
        for x in out.iter_mut() {
            *x = self.read_f32(field)?;
        }
        Ok(())
    }

    /// Read `n` consecutive `i32`s.
    pub fn read_i32_array(&mut self, n: usize, field: &str) -> Result<Vec<i32>> {
        let mut v = reserve(n, field)?;
        for _ in 0..n {
            v.push(self.read_i32(field)?);
        }
        Ok(v)
    }

    /// Read exactly `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize, field: &str) -> Result<Vec<u8>> {
        let mut v = reserve(n, field)?;
        let got = (&mut self.inner)
            .take(n as u64)
            .read_to_end(&mut v)
            .map_err(|e| read_error(e, field))?;
        if got < n {
            return Err(Plan7Error::TruncatedInput(field.to_string()));
        }
        Ok(v)
    }

    /// Read a length-prefixed, NUL-terminated string.
    ///
    /// A length of zero is an absent string.
    ///
    /// # Errors
    ///
    /// `InvalidRecord` for a negative length, a missing terminator or
    /// non-UTF-8 bytes; `OutOfMemory` if the buffer cannot be reserved;
    /// `TruncatedInput` if fewer bytes follow than declared.
    pub fn read_string(&mut self, field: &str) -> Result<Option<String>> {
        let len = self.read_i32(field)?;
        if len == 0 {
            return Ok(None);
        }
        if len < 0 {
            return Err(Plan7Error::InvalidRecord(format!(
                "{}: negative string length {}",
                field, len
            )));
        }
        let mut bytes = self.read_bytes(len as usize, field)?;
        if bytes.pop() != Some(0) {
            return Err(Plan7Error::InvalidRecord(format!(
                "{}: string is not NUL-terminated",
                field
            )));
        }
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| Plan7Error::InvalidRecord(format!("{}: invalid UTF-8", field)))
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Encodes scalars, arrays and strings to a byte stream.
#[derive(Debug)]
pub struct BinWriter<W> {
    inner: W,
    order: ByteOrder,
}

impl<W: Write> BinWriter<W> {
    /// Writer in host byte order.
    pub fn new(inner: W) -> Self {
        Self::with_order(inner, ByteOrder::Native)
    }

    /// Writer in an explicit byte order. `Swapped` produces the files an
    /// opposite-endian host would write.
    pub fn with_order(inner: W, order: ByteOrder) -> Self {
        Self { inner, order }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        self.inner.write_all(&self.order.apply(v).to_ne_bytes())?;
        Ok(())
    }

    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        self.write_u32(v as u32)
    }

    pub fn write_f32(&mut self, v: f32) -> Result<()> {
        self.write_u32(v.to_bits())
    }

    pub fn write_f32_slice(&mut self, values: &[f32]) -> Result<()> {
        values.iter().try_for_each(|&v| self.write_f32(v))
    }

    pub fn write_i32_slice(&mut self, values: &[i32]) -> Result<()> {
        values.iter().try_for_each(|&v| self.write_i32(v))
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        Ok(())
    }

    /// Write a length-prefixed string; `None` is written as a zero length.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the string is too long for an `i32` length prefix.
    pub fn write_string(&mut self, s: Option<&str>) -> Result<()> {
        let Some(s) = s else {
            return self.write_i32(0);
        };
        let len = i32::try_from(s.len() + 1).map_err(|_| {
            Plan7Error::InvalidInput(format!("string of {} bytes is too long", s.len()))
        })?;
        self.write_i32(len)?;
        self.write_bytes(s.as_bytes())?;
        self.write_bytes(&[0])
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn order() -> impl Strategy<Value = ByteOrder> {
        prop_oneof![Just(ByteOrder::Native), Just(ByteOrder::Swapped)]
    }

    proptest! {
        #[test]
        fn optional_strings_survive(s in proptest::option::of("[^\u{0}]{0,40}"), order in order()) {
            let mut w = BinWriter::with_order(Vec::new(), order);
            w.write_string(s.as_deref()).unwrap();
            let mut r = BinReader::new(Cursor::new(w.into_inner()), order);
            prop_assert_eq!(r.read_string("s").unwrap(), s);
        }

        #[test]
        fn floats_keep_their_bits(v in proptest::collection::vec(any::<f32>(), 0..16), order in order()) {
            let mut w = BinWriter::with_order(Vec::new(), order);
            w.write_f32_slice(&v).unwrap();
            let mut r = BinReader::new(Cursor::new(w.into_inner()), order);
            let mut out = vec![0.0f32; v.len()];
            r.read_f32_into(&mut out, "v").unwrap();
            let bits = |xs: &[f32]| xs.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
            prop_assert_eq!(bits(&out), bits(&v));
        }
    }
}
