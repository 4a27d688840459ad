//! Field layouts of every format version.
//!
//! A layout is the ordered list of fields that follow the magic number.
//! Reading and writing both walk the same list, so the two sides cannot
//! disagree about order. Fields gated by a flag are skipped when the flag is
//! clear. Array sizes are derived from the model length and alphabet, which
//! every layout places before the arrays.

use std::io::{Read, Write};

use log::warn;
use plan7_core::{Plan7Error, Result};
use plan7_hmm::{Alphabet, CutoffPair, EvdParams, FlagSet, HmmFlag, Plan7Hmm};

use crate::codec::{BinReader, BinWriter};
use crate::format::FormatVersion;

/// Upper bound on a plausible model length. Larger values come from corrupt
/// headers and would otherwise trigger multi-gigabyte allocations.
const MAX_PROFILE_LEN: i32 = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Field {
    Flags,
    Length,
    AlphabetType,
    MatchEmissions,
    InsertEmissions,
    Transitions,
    Name,
    Accession,
    Description,
    Reference,
    ConsensusStructure,
    ConsensusAnnotation,
    CommandLog,
    SequenceCount,
    CreationTime,
    Map,
    Checksum,
    Ga,
    Tc,
    Nc,
    Stats,
}

impl Field {
    /// The flag that must be set for this field to be present.
    fn gate(self) -> Option<HmmFlag> {
        match self {
            Field::Accession => Some(HmmFlag::Accession),
            Field::Description => Some(HmmFlag::Description),
            Field::Reference => Some(HmmFlag::Reference),
            Field::ConsensusStructure => Some(HmmFlag::ConsensusStructure),
            Field::ConsensusAnnotation => Some(HmmFlag::ConsensusAnnotation),
            Field::Map => Some(HmmFlag::Map),
            Field::Ga => Some(HmmFlag::Ga),
            Field::Tc => Some(HmmFlag::Tc),
            Field::Nc => Some(HmmFlag::Nc),
            Field::Stats => Some(HmmFlag::Stats),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Field::Flags => "flags",
            Field::Length => "model length",
            Field::AlphabetType => "alphabet type",
            Field::MatchEmissions => "match emissions",
            Field::InsertEmissions => "insert emissions",
            Field::Transitions => "transitions",
            Field::Name => "name",
            Field::Accession => "accession",
            Field::Description => "description",
            Field::Reference => "reference line",
            Field::ConsensusStructure => "consensus structure",
            Field::ConsensusAnnotation => "consensus annotation",
            Field::CommandLog => "command log",
            Field::SequenceCount => "sequence count",
            Field::CreationTime => "creation time",
            Field::Map => "map",
            Field::Checksum => "checksum",
            Field::Ga => "GA cutoffs",
            Field::Tc => "TC cutoffs",
            Field::Nc => "NC cutoffs",
            Field::Stats => "EVD parameters",
        }
    }
}

use Field::*;

const LAYOUT_1_0: &[Field] = &[
    Length,
    AlphabetType,
    Transitions,
    MatchEmissions,
    InsertEmissions,
    Name,
];

const LAYOUT_1_1: &[Field] = &[
    Flags,
    Length,
    AlphabetType,
    Transitions,
    MatchEmissions,
    InsertEmissions,
    Name,
    Reference,
    ConsensusStructure,
];

const LAYOUT_1_7: &[Field] = &[
    Flags,
    Length,
    AlphabetType,
    Transitions,
    MatchEmissions,
    InsertEmissions,
    Name,
    Reference,
    ConsensusStructure,
    CommandLog,
    SequenceCount,
];

const LAYOUT_1_9: &[Field] = &[
    Flags,
    Name,
    Description,
    Length,
    AlphabetType,
    Reference,
    ConsensusStructure,
    Map,
    CommandLog,
    SequenceCount,
    CreationTime,
    Checksum,
    Transitions,
    MatchEmissions,
    InsertEmissions,
    Stats,
];

const LAYOUT_2_0: &[Field] = &[
    Flags,
    Name,
    Accession,
    Description,
    Length,
    AlphabetType,
    Reference,
    ConsensusStructure,
    Map,
    CommandLog,
    SequenceCount,
    CreationTime,
    Checksum,
    Ga,
    Tc,
    Nc,
    Transitions,
    MatchEmissions,
    InsertEmissions,
    Stats,
];

const LAYOUT_3_0: &[Field] = &[
    Flags,
    Length,
    AlphabetType,
    MatchEmissions,
    InsertEmissions,
    Transitions,
    Name,
    Accession,
    Description,
    Reference,
    ConsensusStructure,
    ConsensusAnnotation,
    CommandLog,
    SequenceCount,
    CreationTime,
    Map,
    Checksum,
    Ga,
    Tc,
    Nc,
    Stats,
];

pub(crate) fn fields(version: FormatVersion) -> &'static [Field] {
    match version {
        FormatVersion::V1_0 => LAYOUT_1_0,
        FormatVersion::V1_1 => LAYOUT_1_1,
        FormatVersion::V1_7 => LAYOUT_1_7,
        FormatVersion::V1_9 => LAYOUT_1_9,
        FormatVersion::V2_0 => LAYOUT_2_0,
        FormatVersion::V3_0 => LAYOUT_3_0,
    }
}

/// Flag bits that gate some field of `version`.
pub(crate) fn carried_flags(version: FormatVersion) -> u32 {
    fields(version)
        .iter()
        .filter_map(|f| f.gate())
        .fold(0, |mask, flag| mask | flag.bit())
}

fn is_present(field: Field, flags: FlagSet) -> bool {
    field.gate().map_or(true, |flag| flags.contains(flag))
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write `hmm` as a `version` record, magic number included.
///
/// Production code only writes [`FormatVersion::CURRENT`]; older layouts
/// are reachable here to produce fixtures.
///
/// # Errors
///
/// `InvalidRecord` if the model fails validation, `InvalidInput` if it
/// carries an optional field `version` has no room for.
pub fn write_layout<W: Write>(
    w: &mut BinWriter<W>,
    version: FormatVersion,
    hmm: &Plan7Hmm,
) -> Result<()> {
    hmm.validate()?;
    let flags = hmm.flags();
    let uncarried = flags.word() & !carried_flags(version);
    if uncarried != 0 {
        return Err(Plan7Error::InvalidInput(format!(
            "format {} cannot store flag bits {:#x}",
            version, uncarried
        )));
    }
    let m = i32::try_from(hmm.profile_len()).map_err(|_| {
        Plan7Error::InvalidInput(format!("model length {} is too large", hmm.profile_len()))
    })?;

    w.write_u32(version.magic())?;
    for &field in fields(version) {
        if !is_present(field, flags) {
            continue;
        }
        match field {
            Flags => w.write_u32(flags.word())?,
            Length => w.write_i32(m)?,
            AlphabetType => w.write_i32(hmm.alphabet().code())?,
            MatchEmissions => w.write_f32_slice(hmm.match_emissions())?,
            InsertEmissions => w.write_f32_slice(hmm.insert_emissions())?,
            Transitions => w.write_f32_slice(hmm.transitions())?,
            Name => w.write_string(Some(&hmm.name))?,
            Accession => w.write_string(hmm.accession.as_deref())?,
            Description => w.write_string(hmm.description.as_deref())?,
            Reference => w.write_bytes(hmm.reference.as_deref().unwrap_or_default())?,
            ConsensusStructure => {
                w.write_bytes(hmm.consensus_structure.as_deref().unwrap_or_default())?
            }
            ConsensusAnnotation => {
                w.write_bytes(hmm.consensus_annotation.as_deref().unwrap_or_default())?
            }
            CommandLog => w.write_string(hmm.command_log.as_deref())?,
            SequenceCount => w.write_i32(hmm.nseq)?,
            CreationTime => w.write_string(hmm.creation_time.as_deref())?,
            Map => w.write_i32_slice(hmm.map.as_deref().unwrap_or_default())?,
            Checksum => w.write_i32(hmm.checksum)?,
            Ga => write_pair(w, hmm.ga)?,
            Tc => write_pair(w, hmm.tc)?,
            Nc => write_pair(w, hmm.nc)?,
            Stats => {
                let stats = hmm.stats.unwrap_or_default();
                w.write_f32(stats.mu)?;
                w.write_f32(stats.lambda)?;
            }
        }
    }
    Ok(())
}

fn write_pair<W: Write>(w: &mut BinWriter<W>, pair: Option<CutoffPair>) -> Result<()> {
    let pair = pair.unwrap_or_default();
    w.write_f32(pair.sequence)?;
    w.write_f32(pair.domain)
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// A record under construction. Dropped on any error, so callers never see
/// a partial model.
#[derive(Default)]
struct Draft {
    flags: FlagSet,
    m: Option<usize>,
    alphabet: Option<Alphabet>,
    hmm: Option<Plan7Hmm>,
    name: Option<String>,
    accession: Option<String>,
    description: Option<String>,
    reference: Option<Vec<u8>>,
    consensus_structure: Option<Vec<u8>>,
    consensus_annotation: Option<Vec<u8>>,
    command_log: Option<String>,
    nseq: i32,
    creation_time: Option<String>,
    map: Option<Vec<i32>>,
    checksum: i32,
    ga: Option<CutoffPair>,
    tc: Option<CutoffPair>,
    nc: Option<CutoffPair>,
    stats: Option<EvdParams>,
}

impl Draft {
    fn length(&self, field: Field) -> Result<usize> {
        self.m.ok_or_else(|| out_of_order(field))
    }

    fn model(&mut self, field: Field) -> Result<&mut Plan7Hmm> {
        self.hmm.as_mut().ok_or_else(|| out_of_order(field))
    }

    fn finish(self) -> Result<(Plan7Hmm, Alphabet)> {
        let (Some(mut hmm), Some(alphabet)) = (self.hmm, self.alphabet) else {
            return Err(Plan7Error::InvalidRecord("record has no model body".into()));
        };
        hmm.name = match self.name {
            Some(name) if !name.is_empty() => name,
            _ => return Err(Plan7Error::InvalidRecord("model has no name".into())),
        };
        hmm.accession = self.accession;
        hmm.description = self.description;
        hmm.reference = self.reference;
        hmm.consensus_structure = self.consensus_structure;
        hmm.consensus_annotation = self.consensus_annotation;
        hmm.command_log = self.command_log;
        hmm.nseq = self.nseq;
        hmm.creation_time = self.creation_time;
        hmm.map = self.map;
        hmm.checksum = self.checksum;
        hmm.ga = self.ga;
        hmm.tc = self.tc;
        hmm.nc = self.nc;
        hmm.stats = self.stats;
        Ok((hmm, alphabet))
    }
}

fn out_of_order(field: Field) -> Plan7Error {
    Plan7Error::InvalidRecord(format!("{} precedes the model dimensions", field.label()))
}

fn read_pair<R: Read>(r: &mut BinReader<R>, label: &str) -> Result<CutoffPair> {
    let sequence = r.read_f32(label)?;
    let domain = r.read_f32(label)?;
    Ok(CutoffPair::new(sequence, domain))
}

/// Read the body of a `version` record; the magic has already been consumed.
pub(crate) fn read_layout<R: Read>(
    r: &mut BinReader<R>,
    version: FormatVersion,
    alphabet: &mut Option<Alphabet>,
) -> Result<Plan7Hmm> {
    let mut d = Draft::default();
    for &field in fields(version) {
        if !is_present(field, d.flags) {
            continue;
        }
        read_field(r, version, field, &mut d, *alphabet)?;
    }
    let (hmm, found) = d.finish()?;
    *alphabet = Some(found);
    Ok(hmm)
}

fn read_field<R: Read>(
    r: &mut BinReader<R>,
    version: FormatVersion,
    field: Field,
    d: &mut Draft,
    expected: Option<Alphabet>,
) -> Result<()> {
    let label = field.label();
    match field {
        Flags => {
            let word = r.read_u32(label)?;
            let unknown = FlagSet::unknown_bits(word);
            if unknown != 0 {
                warn!("ignoring unknown flag bits {:#x}", unknown);
            }
            let flags = FlagSet::from_word(word);
            let uncarried = flags.word() & !carried_flags(version);
            if uncarried != 0 {
                return Err(Plan7Error::InvalidRecord(format!(
                    "flag bits {:#x} are not valid in format {}",
                    uncarried, version
                )));
            }
            d.flags = flags;
        }
        Length => {
            let m = r.read_i32(label)?;
            if !(1..=MAX_PROFILE_LEN).contains(&m) {
                return Err(Plan7Error::InvalidRecord(format!("model length {}", m)));
            }
            d.m = Some(m as usize);
        }
        AlphabetType => {
            let code = r.read_i32(label)?;
            let found = Alphabet::from_code(code).ok_or_else(|| {
                Plan7Error::InvalidRecord(format!("unknown alphabet type {}", code))
            })?;
            if let Some(expected) = expected {
                if expected != found {
                    return Err(Plan7Error::IncompatibleAlphabet {
                        expected: expected.code(),
                        found: code,
                    });
                }
            }
            d.hmm = Some(Plan7Hmm::new(d.length(field)?, found)?);
            d.alphabet = Some(found);
        }
        MatchEmissions => r.read_f32_into(d.model(field)?.match_emissions_mut(), label)?,
        InsertEmissions => r.read_f32_into(d.model(field)?.insert_emissions_mut(), label)?,
        Transitions => r.read_f32_into(d.model(field)?.transitions_mut(), label)?,
        Name => d.name = r.read_string(label)?,
        Accession => d.accession = r.read_string(label)?,
        Description => d.description = r.read_string(label)?,
        Reference => d.reference = Some(r.read_bytes(d.length(field)? + 1, label)?),
        ConsensusStructure => {
            d.consensus_structure = Some(r.read_bytes(d.length(field)? + 1, label)?)
        }
        ConsensusAnnotation => {
            d.consensus_annotation = Some(r.read_bytes(d.length(field)? + 1, label)?)
        }
        CommandLog => d.command_log = r.read_string(label)?,
        SequenceCount => d.nseq = r.read_i32(label)?,
        CreationTime => d.creation_time = r.read_string(label)?,
        Map => d.map = Some(r.read_i32_array(d.length(field)? + 1, label)?),
        Checksum => d.checksum = r.read_i32(label)?,
        Ga => d.ga = Some(read_pair(r, label)?),
        Tc => d.tc = Some(read_pair(r, label)?),
        Nc => d.nc = Some(read_pair(r, label)?),
        Stats => {
            let mu = r.read_f32(label)?;
            let lambda = r.read_f32(label)?;
            d.stats = Some(EvdParams { mu, lambda });
        }
    }
    Ok(())
}
