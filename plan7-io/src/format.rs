//! Format versions and the record-level read/write entry points.
//!
//! Six binary versions exist, each identified by a magic number: the ASCII
//! text "hmm1".."hmm6" with the high bit of every byte set. A magic read in
//! reversed byte order marks a file written on an opposite-endian host.
//! Only the current version is ever written.

use std::fmt;
use std::io::{Read, Write};

use plan7_core::{Plan7Error, Result};
use plan7_hmm::{Alphabet, Plan7Hmm};

use crate::codec::{BinReader, BinWriter, ByteOrder};
use crate::layout;

/// A binary format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FormatVersion {
    V1_0,
    V1_1,
    V1_7,
    V1_9,
    V2_0,
    V3_0,
}

impl FormatVersion {
    /// Every version, oldest first.
    pub const ALL: [FormatVersion; 6] = [
        FormatVersion::V1_0,
        FormatVersion::V1_1,
        FormatVersion::V1_7,
        FormatVersion::V1_9,
        FormatVersion::V2_0,
        FormatVersion::V3_0,
    ];

    /// The version every writer emits.
    pub const CURRENT: FormatVersion = FormatVersion::V3_0;

    /// Magic number in the writer's byte order.
    pub const fn magic(self) -> u32 {
        match self {
            FormatVersion::V1_0 => 0xe8ed_edb1,
            FormatVersion::V1_1 => 0xe8ed_edb2,
            FormatVersion::V1_7 => 0xe8ed_edb3,
            FormatVersion::V1_9 => 0xe8ed_edb4,
            FormatVersion::V2_0 => 0xe8ed_edb5,
            FormatVersion::V3_0 => 0xe8ed_edb6,
        }
    }

    /// Identify a magic number read in host byte order.
    pub fn detect(magic: u32) -> Option<(FormatVersion, ByteOrder)> {
        Self::ALL.into_iter().find_map(|v| {
            if magic == v.magic() {
                Some((v, ByteOrder::Native))
            } else if magic == v.magic().swap_bytes() {
                Some((v, ByteOrder::Swapped))
            } else {
                None
            }
        })
    }

    pub fn is_current(self) -> bool {
        self == Self::CURRENT
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FormatVersion::V1_0 => "1.0",
            FormatVersion::V1_1 => "1.1",
            FormatVersion::V1_7 => "1.7",
            FormatVersion::V1_9 => "1.9",
            FormatVersion::V2_0 => "2.0",
            FormatVersion::V3_0 => "3.0",
        };
        f.write_str(s)
    }
}

/// Write one model in the current format, in host byte order.
///
/// # Errors
///
/// `InvalidRecord` if the model fails [`Plan7Hmm::validate`]; `Io` if the
/// sink fails.
pub fn write_hmm<W: Write>(sink: W, hmm: &Plan7Hmm) -> Result<()> {
    let mut w = BinWriter::new(sink);
    layout::write_layout(&mut w, FormatVersion::CURRENT, hmm)
}

/// Read one model from a reader bound to `version`.
///
/// `alphabet` is reconciled with the file: `None` adopts the file's alphabet,
/// `Some(a)` must match it.
///
/// # Errors
///
/// - `EndOfData` if the stream ends cleanly before the record
/// - `UnsupportedFormat` if the magic is unknown, or belongs to a different
///   version or byte order than the reader is bound to
/// - `IncompatibleAlphabet` if the file disagrees with `alphabet`
/// - `TruncatedInput`, `InvalidRecord` or `OutOfMemory` for a bad record body
pub fn read_hmm<R: Read>(
    reader: &mut BinReader<R>,
    version: FormatVersion,
    alphabet: &mut Option<Alphabet>,
) -> Result<Plan7Hmm> {
    let magic = reader.read_magic()?.ok_or(Plan7Error::EndOfData)?;
    match FormatVersion::detect(magic) {
        Some((found, order)) if found == version && order == reader.byte_order() => {}
        _ => return Err(Plan7Error::UnsupportedFormat { magic }),
    }
    layout::read_layout(reader, version, alphabet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magics_spell_hmm_with_high_bits() {
        for (i, v) in FormatVersion::ALL.iter().enumerate() {
            let expected = u32::from_be_bytes(*b"hmm1") + i as u32;
            assert_eq!(v.magic(), expected | 0x8080_8080);
        }
    }

    #[test]
    fn detect_recognizes_both_orders() {
        for v in FormatVersion::ALL {
            assert_eq!(FormatVersion::detect(v.magic()), Some((v, ByteOrder::Native)));
            assert_eq!(
                FormatVersion::detect(v.magic().swap_bytes()),
                Some((v, ByteOrder::Swapped))
            );
        }
        assert_eq!(FormatVersion::detect(0xdead_beef), None);
        assert_eq!(FormatVersion::detect(0), None);
    }

    #[test]
    fn only_three_point_oh_is_current() {
        let current: Vec<_> = FormatVersion::ALL
            .into_iter()
            .filter(|v| v.is_current())
            .collect();
        assert_eq!(current, vec![FormatVersion::V3_0]);
        assert_eq!(FormatVersion::V1_9.to_string(), "1.9");
    }

    #[test]
    fn read_rejects_other_version_than_bound() {
        let mut hmm = Plan7Hmm::new(2, Alphabet::Dna).unwrap();
        hmm.name = "m".into();
        let mut buf = Vec::new();
        write_hmm(&mut buf, &hmm).unwrap();

        let mut r = BinReader::new(buf.as_slice(), ByteOrder::Native);
        let err = read_hmm(&mut r, FormatVersion::V2_0, &mut None).unwrap_err();
        assert!(matches!(
            err,
            Plan7Error::UnsupportedFormat { magic } if magic == FormatVersion::V3_0.magic()
        ));
    }

    #[test]
    fn read_at_end_is_end_of_data() {
        let mut r = BinReader::new(&[0u8; 0][..], ByteOrder::Native);
        let err = read_hmm(&mut r, FormatVersion::CURRENT, &mut None).unwrap_err();
        assert!(matches!(err, Plan7Error::EndOfData));
    }

    #[test]
    fn unknown_magic_is_unsupported() {
        let bytes = 0x1234_5678u32.to_ne_bytes();
        let mut r = BinReader::new(&bytes[..], ByteOrder::Native);
        let err = read_hmm(&mut r, FormatVersion::CURRENT, &mut None).unwrap_err();
        assert!(matches!(err, Plan7Error::UnsupportedFormat { magic: 0x1234_5678 }));
    }
}
