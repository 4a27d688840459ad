//! Model file sessions.
//!
//! An [`HmmFile`] owns a buffered reader and the format version and byte
//! order detected from the first magic number. Every record in the file is
//! expected to share them.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::debug;
use plan7_core::{Plan7Error, Result};
use plan7_hmm::{Alphabet, Plan7Hmm};

use crate::codec::{BinReader, ByteOrder};
use crate::format::{read_hmm, FormatVersion};

/// An open model file.
#[derive(Debug)]
pub struct HmmFile<R = BufReader<File>> {
    reader: Option<BinReader<R>>,
    version: FormatVersion,
    order: ByteOrder,
    path: Option<PathBuf>,
}

impl HmmFile<BufReader<File>> {
    /// Open a model file and detect its format.
    ///
    /// `path` is tried as given first. If that fails and `env` names an
    /// environment variable, each directory in its colon-separated value is
    /// tried in order.
    ///
    /// # Errors
    ///
    /// `NotFound` if no candidate can be opened; `UnsupportedFormat` if the
    /// file starts with an unknown magic number.
    pub fn open(path: impl AsRef<Path>, env: Option<&str>) -> Result<Self> {
        let (file, resolved) = resolve(path.as_ref(), env)?;
        Self::bind(BufReader::new(file), Some(resolved))
    }
}

fn resolve(path: &Path, env: Option<&str>) -> Result<(File, PathBuf)> {
    if let Ok(file) = File::open(path) {
        return Ok((file, path.to_path_buf()));
    }
    if let Some(var) = env {
        if let Ok(dirs) = std::env::var(var) {
            for dir in dirs.split(':').filter(|d| !d.is_empty()) {
                let candidate = Path::new(dir).join(path);
                if let Ok(file) = File::open(&candidate) {
                    debug!("found {} via ${}", candidate.display(), var);
                    return Ok((file, candidate));
                }
            }
        }
    }
    Err(Plan7Error::NotFound(path.display().to_string()))
}

impl<R: BufRead> HmmFile<R> {
    /// Wrap an already-open reader and detect its format.
    pub fn from_reader(reader: R) -> Result<Self> {
        Self::bind(reader, None)
    }

    fn bind(mut reader: R, path: Option<PathBuf>) -> Result<Self> {
        let head = reader.fill_buf()?;
        let (version, order) = match head.get(..4) {
            Some(bytes) => {
                let magic = u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                FormatVersion::detect(magic).ok_or(Plan7Error::UnsupportedFormat { magic })?
            }
            // Empty or short input; the first read reports why.
            None => (FormatVersion::CURRENT, ByteOrder::Native),
        };
        debug!(
            "{}: format {}, {:?} byte order",
            path.as_deref().map_or("<reader>".into(), |p| p.display().to_string()),
            version,
            order
        );
        Ok(Self {
            reader: Some(BinReader::new(reader, order)),
            version,
            order,
            path,
        })
    }

    /// Read the next model, or `Ok(None)` at a clean end of file.
    ///
    /// `alphabet` is reconciled with each record; see [`read_hmm`].
    ///
    /// # Errors
    ///
    /// Any record-level error from [`read_hmm`] other than `EndOfData`, or
    /// `InvalidInput` if the file has been closed.
    pub fn read_next(&mut self, alphabet: &mut Option<Alphabet>) -> Result<Option<Plan7Hmm>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| Plan7Error::InvalidInput("model file is closed".into()))?;
        match read_hmm(reader, self.version, alphabet) {
            Ok(hmm) => Ok(Some(hmm)),
            Err(Plan7Error::EndOfData) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Release the reader. Calling this more than once is harmless.
    pub fn close(&mut self) {
        self.reader = None;
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Format version bound at open time.
    pub fn format(&self) -> FormatVersion {
        self.version
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Path the file was actually opened from, after any search-path lookup.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
