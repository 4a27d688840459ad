//! Symbol alphabets a profile HMM can be defined over.
//!
//! Each alphabet carries the integer type code used in binary model files.
//! Codes are part of the file format and must never be renumbered.

use plan7_core::{Plan7Error, Result};

/// Sequence alphabet for a profile HMM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alphabet {
    /// RNA alphabet: A, C, G, U
    Rna,
    /// DNA alphabet: A, C, G, T
    Dna,
    /// Protein alphabet: 20 standard amino acids
    Amino,
    /// Two-sided coin: H, T
    Coins,
    /// Six-sided die: 1..6
    Dice,
}

impl Alphabet {
    /// Every supported alphabet, in type-code order.
    pub const ALL: [Alphabet; 5] = [
        Alphabet::Rna,
        Alphabet::Dna,
        Alphabet::Amino,
        Alphabet::Coins,
        Alphabet::Dice,
    ];

    /// Type code stored in model files.
    pub fn code(self) -> i32 {
        match self {
            Alphabet::Rna => 1,
            Alphabet::Dna => 2,
            Alphabet::Amino => 3,
            Alphabet::Coins => 4,
            Alphabet::Dice => 5,
        }
    }

    /// Look up an alphabet by its file type code.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.code() == code)
    }

    /// Canonical symbols, in digital index order.
    pub fn symbols(self) -> &'static [u8] {
        match self {
            Alphabet::Rna => b"ACGU",
            Alphabet::Dna => b"ACGT",
            Alphabet::Amino => b"ACDEFGHIKLMNPQRSTVWY",
            Alphabet::Coins => b"HT",
            Alphabet::Dice => b"123456",
        }
    }

    /// Number of symbols in the alphabet (K).
    pub fn size(self) -> usize {
        self.symbols().len()
    }

    /// Encode a byte to its index in the alphabet, or `None` if invalid.
    pub fn encode(self, b: u8) -> Option<usize> {
        let upper = b.to_ascii_uppercase();
        self.symbols().iter().position(|&s| s == upper)
    }

    /// Digitize a text sequence into symbol indices.
    ///
    /// # Errors
    ///
    /// Returns an error on the first byte that is not in the alphabet.
    pub fn digitize(self, seq: &[u8]) -> Result<Vec<u8>> {
        seq.iter()
            .enumerate()
            .map(|(i, &b)| {
                self.encode(b).map(|x| x as u8).ok_or_else(|| {
                    Plan7Error::InvalidInput(format!(
                        "invalid character '{}' at position {} for {:?} alphabet",
                        b as char, i, self
                    ))
                })
            })
            .collect()
    }

    /// Uniform background distribution for this alphabet.
    pub fn uniform_background(self) -> Vec<f32> {
        let k = self.size();
        vec![1.0 / k as f32; k]
    }

    /// Whether this is a nucleic acid alphabet.
    pub fn is_nucleic(self) -> bool {
        matches!(self, Alphabet::Rna | Alphabet::Dna)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for abc in Alphabet::ALL {
            assert_eq!(Alphabet::from_code(abc.code()), Some(abc));
        }
        assert_eq!(Alphabet::from_code(0), None);
        assert_eq!(Alphabet::from_code(6), None);
        assert_eq!(Alphabet::from_code(-1), None);
    }

    #[test]
    fn sizes() {
        assert_eq!(Alphabet::Rna.size(), 4);
        assert_eq!(Alphabet::Dna.size(), 4);
        assert_eq!(Alphabet::Amino.size(), 20);
        assert_eq!(Alphabet::Coins.size(), 2);
        assert_eq!(Alphabet::Dice.size(), 6);
    }

    #[test]
    fn encode_dna() {
        assert_eq!(Alphabet::Dna.encode(b'A'), Some(0));
        assert_eq!(Alphabet::Dna.encode(b'T'), Some(3));
        assert_eq!(Alphabet::Dna.encode(b'g'), Some(2)); // case-insensitive
        assert_eq!(Alphabet::Dna.encode(b'U'), None); // U is RNA
    }

    #[test]
    fn encode_amino() {
        assert_eq!(Alphabet::Amino.encode(b'A'), Some(0));
        assert_eq!(Alphabet::Amino.encode(b'Y'), Some(19));
        assert_eq!(Alphabet::Amino.encode(b'w'), Some(18));
        assert_eq!(Alphabet::Amino.encode(b'X'), None);
    }

    #[test]
    fn digitize_is_case_insensitive() {
        let dsq = Alphabet::Rna.digitize(b"acgU").unwrap();
        assert_eq!(dsq, vec![0, 1, 2, 3]);
    }

    #[test]
    fn digitize_rejects_foreign_symbols() {
        let err = Alphabet::Dna.digitize(b"ACXT").unwrap_err();
        assert!(err.to_string().contains("position 2"));
    }

    #[test]
    fn uniform_background_sums_to_one() {
        for abc in Alphabet::ALL {
            let bg = abc.uniform_background();
            assert_eq!(bg.len(), abc.size());
            assert!((bg.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        }
    }
}
