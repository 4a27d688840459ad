//! The Plan 7 profile HMM record.
//!
//! A model of length M has match states 1..M and insert states 1..M-1.
//! Probabilities are stored in flat arrays:
//!
//! - Match emissions: `M * K` values, indexed as `(k-1)*K + sym` for k=1..M
//! - Insert emissions: `(M-1) * K` values, indexed as `(k-1)*K + sym` for k=1..M-1
//! - Transitions: `(M-1) * 7` values, indexed as `(k-1)*7 + TR_*` for k=1..M-1
//!
//! Optional annotations are `Option` fields. The binary flag word is derived
//! from which of them are present; see [`Plan7Hmm::flags`].

use plan7_core::{Annotated, Plan7Error, Result};

use crate::alphabet::Alphabet;

// ---------------------------------------------------------------------------
// Transition index constants
// ---------------------------------------------------------------------------

pub const TR_MM: usize = 0;
pub const TR_MI: usize = 1;
pub const TR_MD: usize = 2;
pub const TR_IM: usize = 3;
pub const TR_II: usize = 4;
pub const TR_DM: usize = 5;
pub const TR_DD: usize = 6;
pub const NUM_TRANSITIONS: usize = 7;

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

/// An optional part of a model record that is gated by a flag bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HmmFlag {
    /// Free-text description.
    Description,
    /// Reference annotation line (M+1 bytes).
    Reference,
    /// Consensus structure line (M+1 bytes).
    ConsensusStructure,
    /// Fitted EVD statistics (mu, lambda).
    Stats,
    /// Alignment column map (M+1 integers).
    Map,
    /// Accession string.
    Accession,
    /// Gathering cutoff pair.
    Ga,
    /// Trusted cutoff pair.
    Tc,
    /// Noise cutoff pair.
    Nc,
    /// Consensus annotation line (M+1 bytes).
    ConsensusAnnotation,
}

impl HmmFlag {
    /// Every flag, in bit order.
    pub const ALL: [HmmFlag; 10] = [
        HmmFlag::Description,
        HmmFlag::Reference,
        HmmFlag::ConsensusStructure,
        HmmFlag::Stats,
        HmmFlag::Map,
        HmmFlag::Accession,
        HmmFlag::Ga,
        HmmFlag::Tc,
        HmmFlag::Nc,
        HmmFlag::ConsensusAnnotation,
    ];

    /// Bit in the on-disk flag word. Part of the file format.
    pub const fn bit(self) -> u32 {
        match self {
            HmmFlag::Description => 1 << 1,
            HmmFlag::Reference => 1 << 2,
            HmmFlag::ConsensusStructure => 1 << 3,
            HmmFlag::Stats => 1 << 7,
            HmmFlag::Map => 1 << 8,
            HmmFlag::Accession => 1 << 9,
            HmmFlag::Ga => 1 << 10,
            HmmFlag::Tc => 1 << 11,
            HmmFlag::Nc => 1 << 12,
            HmmFlag::ConsensusAnnotation => 1 << 13,
        }
    }

    /// Mask of every bit that gates a field.
    pub const fn known_bits() -> u32 {
        let mut mask = 0;
        let mut i = 0;
        while i < Self::ALL.len() {
            mask |= Self::ALL[i].bit();
            i += 1;
        }
        mask
    }
}

/// A set of [`HmmFlag`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagSet {
    bits: u32,
}

impl FlagSet {
    /// The empty set.
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    /// Decode a flag word, keeping only bits that gate a field.
    ///
    /// Use [`FlagSet::unknown_bits`] to see what was dropped.
    pub fn from_word(word: u32) -> Self {
        Self {
            bits: word & HmmFlag::known_bits(),
        }
    }

    /// Bits of `word` that no [`HmmFlag`] claims.
    pub fn unknown_bits(word: u32) -> u32 {
        word & !HmmFlag::known_bits()
    }

    /// Encode as an on-disk flag word.
    pub fn word(self) -> u32 {
        self.bits
    }

    pub fn contains(self, flag: HmmFlag) -> bool {
        self.bits & flag.bit() != 0
    }

    pub fn insert(&mut self, flag: HmmFlag) {
        self.bits |= flag.bit();
    }

    /// Set `flag` when `present` is true.
    pub fn set_if(&mut self, flag: HmmFlag, present: bool) {
        if present {
            self.insert(flag);
        }
    }

    pub fn is_empty(self) -> bool {
        self.bits == 0
    }

    /// Flags in the set, in bit order.
    pub fn iter(self) -> impl Iterator<Item = HmmFlag> {
        HmmFlag::ALL.into_iter().filter(move |&f| self.contains(f))
    }
}

impl FromIterator<HmmFlag> for FlagSet {
    fn from_iter<I: IntoIterator<Item = HmmFlag>>(iter: I) -> Self {
        let mut set = FlagSet::empty();
        for flag in iter {
            set.insert(flag);
        }
        set
    }
}

// ---------------------------------------------------------------------------
// Small value types
// ---------------------------------------------------------------------------

/// A pair of per-sequence / per-domain score cutoffs (GA, TC or NC).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CutoffPair {
    pub sequence: f32,
    pub domain: f32,
}

impl CutoffPair {
    pub fn new(sequence: f32, domain: f32) -> Self {
        Self { sequence, domain }
    }
}

/// Extreme value distribution parameters stored with a calibrated model.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EvdParams {
    /// Location parameter.
    pub mu: f32,
    /// Scale parameter.
    pub lambda: f32,
}

// ---------------------------------------------------------------------------
// Model record
// ---------------------------------------------------------------------------

/// Plan 7 profile hidden Markov model.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan7Hmm {
    m: usize,
    alphabet: Alphabet,
    /// Match emission probabilities: M * K.
    mat: Vec<f32>,
    /// Insert emission probabilities: (M-1) * K.
    ins: Vec<f32>,
    /// Transition probabilities: (M-1) * 7.
    t: Vec<f32>,

    /// Model name. Required and non-empty in files.
    pub name: String,
    pub accession: Option<String>,
    pub description: Option<String>,
    /// Reference line, M+1 bytes (index 0 unused).
    pub reference: Option<Vec<u8>>,
    /// Consensus structure line, M+1 bytes (index 0 unused).
    pub consensus_structure: Option<Vec<u8>>,
    /// Consensus annotation line, M+1 bytes (index 0 unused).
    pub consensus_annotation: Option<Vec<u8>>,
    /// Newline-separated log of commands that built or modified the model.
    pub command_log: Option<String>,
    /// Number of sequences the model was trained on.
    pub nseq: i32,
    pub creation_time: Option<String>,
    /// Map of match states to alignment columns, M+1 entries (index 0 unused).
    pub map: Option<Vec<i32>>,
    /// Checksum of the training alignment.
    pub checksum: i32,
    pub ga: Option<CutoffPair>,
    pub tc: Option<CutoffPair>,
    pub nc: Option<CutoffPair>,
    /// Fitted EVD parameters, set by calibration.
    pub stats: Option<EvdParams>,
}

/// Allocate a zeroed vector without aborting on allocation failure.
fn try_zeroed<T: Copy + Default>(n: usize, what: &str) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(n)
        .map_err(|_| Plan7Error::OutOfMemory(format!("{} ({} values)", what, n)))?;
    v.resize(n, T::default());
    Ok(v)
}

impl Plan7Hmm {
    /// Allocate a model of length `m` over `alphabet` with zeroed probabilities
    /// and no annotations.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `m` is zero, or `OutOfMemory` if the
    /// probability arrays cannot be allocated.
    pub fn new(m: usize, alphabet: Alphabet) -> Result<Self> {
        if m == 0 {
            return Err(Plan7Error::InvalidInput(
                "model length must be > 0".into(),
            ));
        }
        let k = alphabet.size();
        let mat = try_zeroed(
            m.checked_mul(k).ok_or_else(|| overflow("match emissions"))?,
            "match emissions",
        )?;
        let ins = try_zeroed((m - 1) * k, "insert emissions")?;
        let t = try_zeroed((m - 1) * NUM_TRANSITIONS, "transitions")?;

        Ok(Self {
            m,
            alphabet,
            mat,
            ins,
            t,
            name: String::new(),
            accession: None,
            description: None,
            reference: None,
            consensus_structure: None,
            consensus_annotation: None,
            command_log: None,
            nseq: 0,
            creation_time: None,
            map: None,
            checksum: 0,
            ga: None,
            tc: None,
            nc: None,
            stats: None,
        })
    }

    /// Number of match states (M).
    pub fn profile_len(&self) -> usize {
        self.m
    }

    pub fn alphabet(&self) -> Alphabet {
        self.alphabet
    }

    /// Alphabet size (K).
    pub fn alphabet_size(&self) -> usize {
        self.alphabet.size()
    }

    // -----------------------------------------------------------------------
    // Per-position views
    // -----------------------------------------------------------------------

    /// Match emissions at position k (1..=M).
    pub fn mat(&self, k: usize) -> &[f32] {
        let kk = self.alphabet_size();
        &self.mat[(k - 1) * kk..k * kk]
    }

    pub fn mat_mut(&mut self, k: usize) -> &mut [f32] {
        let kk = self.alphabet_size();
        &mut self.mat[(k - 1) * kk..k * kk]
    }

    /// Insert emissions at position k (1..M).
    pub fn ins(&self, k: usize) -> &[f32] {
        let kk = self.alphabet_size();
        &self.ins[(k - 1) * kk..k * kk]
    }

    pub fn ins_mut(&mut self, k: usize) -> &mut [f32] {
        let kk = self.alphabet_size();
        &mut self.ins[(k - 1) * kk..k * kk]
    }

    /// The seven transitions out of position k (1..M).
    pub fn t(&self, k: usize) -> &[f32] {
        &self.t[(k - 1) * NUM_TRANSITIONS..k * NUM_TRANSITIONS]
    }

    pub fn t_mut(&mut self, k: usize) -> &mut [f32] {
        &mut self.t[(k - 1) * NUM_TRANSITIONS..k * NUM_TRANSITIONS]
    }

    // -----------------------------------------------------------------------
    // Flat views, in file order
    // -----------------------------------------------------------------------

    pub fn match_emissions(&self) -> &[f32] {
        &self.mat
    }

    pub fn match_emissions_mut(&mut self) -> &mut [f32] {
        &mut self.mat
    }

    pub fn insert_emissions(&self) -> &[f32] {
        &self.ins
    }

    pub fn insert_emissions_mut(&mut self) -> &mut [f32] {
        &mut self.ins
    }

    pub fn transitions(&self) -> &[f32] {
        &self.t
    }

    pub fn transitions_mut(&mut self) -> &mut [f32] {
        &mut self.t
    }

    // -----------------------------------------------------------------------
    // Annotation helpers
    // -----------------------------------------------------------------------

    /// Flag word contents implied by which optional fields are present.
    pub fn flags(&self) -> FlagSet {
        let mut flags = FlagSet::empty();
        flags.set_if(HmmFlag::Description, self.description.is_some());
        flags.set_if(HmmFlag::Reference, self.reference.is_some());
        flags.set_if(HmmFlag::ConsensusStructure, self.consensus_structure.is_some());
        flags.set_if(HmmFlag::Stats, self.stats.is_some());
        flags.set_if(HmmFlag::Map, self.map.is_some());
        flags.set_if(HmmFlag::Accession, self.accession.is_some());
        flags.set_if(HmmFlag::Ga, self.ga.is_some());
        flags.set_if(HmmFlag::Tc, self.tc.is_some());
        flags.set_if(HmmFlag::Nc, self.nc.is_some());
        flags.set_if(
            HmmFlag::ConsensusAnnotation,
            self.consensus_annotation.is_some(),
        );
        flags
    }

    /// Append one line to the command log, starting the log if there is none.
    pub fn append_command_log(&mut self, line: &str) {
        match &mut self.command_log {
            Some(log) => {
                log.push('\n');
                log.push_str(line);
            }
            None => self.command_log = Some(line.to_string()),
        }
    }

    /// Check the invariants a record must satisfy before it is written.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecord` if the name is empty or a per-position
    /// annotation does not have exactly M+1 entries.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Plan7Error::InvalidRecord("model name is required".into()));
        }
        let expected = self.m + 1;
        let lines: [(&str, Option<usize>); 4] = [
            ("reference", self.reference.as_ref().map(Vec::len)),
            ("consensus structure", self.consensus_structure.as_ref().map(Vec::len)),
            ("consensus annotation", self.consensus_annotation.as_ref().map(Vec::len)),
            ("map", self.map.as_ref().map(Vec::len)),
        ];
        for (what, len) in lines {
            if let Some(len) = len {
                if len != expected {
                    return Err(Plan7Error::InvalidRecord(format!(
                        "{} has {} entries, model of length {} needs {}",
                        what, len, self.m, expected
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Annotated for Plan7Hmm {
    fn name(&self) -> &str {
        &self.name
    }

    fn accession(&self) -> Option<&str> {
        self.accession.as_deref()
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

fn overflow(what: &str) -> Plan7Error {
    Plan7Error::OutOfMemory(format!("{} (size overflows usize)", what))
}
