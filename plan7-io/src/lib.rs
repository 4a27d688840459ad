//! Binary model files for the plan7 toolkit.
//!
//! - **Codec** — [`BinReader`] / [`BinWriter`], byte-order aware scalars and
//!   length-prefixed strings
//! - **Format** — [`FormatVersion`], [`write_hmm`] (current version only) and
//!   [`read_hmm`] (every historical version)
//! - **Session** — [`HmmFile`], open-with-search-path and sequential reads
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use plan7_hmm::{Alphabet, Plan7Hmm};
//! use plan7_io::{write_hmm, HmmFile};
//!
//! let mut hmm = Plan7Hmm::new(2, Alphabet::Dna).unwrap();
//! hmm.name = "tiny".into();
//!
//! let mut buf = Vec::new();
//! write_hmm(&mut buf, &hmm).unwrap();
//!
//! let mut file = HmmFile::from_reader(Cursor::new(buf)).unwrap();
//! let mut alphabet = None;
//! let back = file.read_next(&mut alphabet).unwrap().unwrap();
//! assert_eq!(back, hmm);
//! assert_eq!(alphabet, Some(Alphabet::Dna));
//! assert!(file.read_next(&mut alphabet).unwrap().is_none());
//! ```

pub mod codec;
pub mod format;
pub mod hmmfile;
mod layout;

pub use codec::{BinReader, BinWriter, ByteOrder};
pub use format::{read_hmm, write_hmm, FormatVersion};
pub use hmmfile::HmmFile;

#[doc(hidden)]
pub use layout::write_layout;
