//! Local Viterbi scoring of digitized sequences against a Plan 7 model.
//!
//! [`ViterbiScorer`] converts a model's probabilities to log-odds against a
//! null model once, then scores any number of sequences. Alignments are local
//! in both the model (uniform Begin→Mk entry and Mk→End exit, as in HMMER3-style
//! local mode) and the sequence (unaligned flanks score zero).
//!
//! Two equivalent implementations are provided: a full dynamic-programming
//! matrix, and a two-row variant whose memory does not grow with sequence
//! length. [`viterbi_size`] estimates the full matrix cost; the scorer picks
//! the small-memory variant when that estimate exceeds its RAM limit.

use std::f32::consts::LN_2;
use std::mem::size_of;

use plan7_core::SequenceScorer;

use crate::model::{
    Plan7Hmm, NUM_TRANSITIONS, TR_DD, TR_DM, TR_II, TR_IM, TR_MD, TR_MI, TR_MM,
};
use crate::null_model::NullModel;

/// Default memory ceiling for the full-matrix Viterbi, in bytes.
pub const DEFAULT_RAM_LIMIT: usize = 32 * 1024 * 1024;

/// Bytes needed by the full-matrix Viterbi for a sequence of length `len`
/// against a model of length `m`.
pub fn viterbi_size(len: usize, m: usize) -> usize {
    3usize
        .saturating_mul(len.saturating_add(1))
        .saturating_mul(m.saturating_add(1))
        .saturating_mul(size_of::<f32>())
}

/// `ln(p / bg)`, with impossible events mapped to negative infinity.
fn log_odds(p: f32, bg: f32) -> f32 {
    if p <= 0.0 || bg <= 0.0 {
        f32::NEG_INFINITY
    } else {
        (p / bg).ln()
    }
}

fn log_prob(p: f32) -> f32 {
    if p <= 0.0 {
        f32::NEG_INFINITY
    } else {
        p.ln()
    }
}

/// One DP row of match, insert and delete scores, indexed by k in 0..=M.
struct Row<'a> {
    m: &'a [f32],
    i: &'a [f32],
    d: &'a [f32],
}

struct RowMut<'a> {
    m: &'a mut [f32],
    i: &'a mut [f32],
    d: &'a mut [f32],
}

/// Log-odds Viterbi scorer for one model.
#[derive(Debug, Clone)]
pub struct ViterbiScorer {
    m: usize,
    k: usize,
    /// Match log-odds: M * K, indexed as (k-1)*K + sym.
    msc: Vec<f32>,
    /// Insert log-odds: (M-1) * K, indexed as (k-1)*K + sym.
    isc: Vec<f32>,
    /// Transition log-probs: (M-1) * 7, indexed as (k-1)*7 + TR_*.
    tsc: Vec<f32>,
    /// Local Begin→Mk log-prob, same for every k.
    entry: f32,
    /// Local Mk→End log-prob, same for every k.
    exit: f32,
    ram_limit: usize,
}

impl ViterbiScorer {
    /// Build log-odds scores for `hmm` against `null`.
    ///
    /// The null model must be over the same alphabet as the model.
    pub fn new(hmm: &Plan7Hmm, null: &NullModel) -> Self {
        debug_assert_eq!(hmm.alphabet(), null.alphabet());
        let bg = null.background();
        let k = hmm.alphabet_size();

        let emission_scores = |probs: &[f32]| -> Vec<f32> {
            probs
                .iter()
                .enumerate()
                .map(|(idx, &p)| log_odds(p, bg[idx % k]))
                .collect()
        };

        let m = hmm.profile_len();
        let uniform = (1.0 / m as f32).ln();

        Self {
            m,
            k,
            msc: emission_scores(hmm.match_emissions()),
            isc: emission_scores(hmm.insert_emissions()),
            tsc: hmm.transitions().iter().map(|&p| log_prob(p)).collect(),
            entry: uniform,
            exit: uniform,
            ram_limit: DEFAULT_RAM_LIMIT,
        }
    }

    /// Set the memory ceiling above which the small-memory variant is used.
    pub fn with_ram_limit(mut self, bytes: usize) -> Self {
        self.ram_limit = bytes;
        self
    }

    /// Model length this scorer was built for.
    pub fn profile_len(&self) -> usize {
        self.m
    }

    /// Whether a sequence of length `len` would be scored with the full matrix.
    pub fn uses_full_matrix(&self, len: usize) -> bool {
        viterbi_size(len, self.m) <= self.ram_limit
    }

    // -----------------------------------------------------------------------
    // Internal indexing helpers
    // -----------------------------------------------------------------------

    fn match_score(&self, k: usize, sym: usize) -> f32 {
        self.msc[(k - 1) * self.k + sym]
    }

    fn insert_score(&self, k: usize, sym: usize) -> f32 {
        self.isc[(k - 1) * self.k + sym]
    }

    fn trans(&self, k: usize, t: usize) -> f32 {
        self.tsc[(k - 1) * NUM_TRANSITIONS + t]
    }

    /// Fill one row from the previous one; returns the best local exit score
    /// reachable in this row.
    fn fill_row(&self, sym: usize, prev: Row<'_>, cur: RowMut<'_>) -> f32 {
        let l = self.m;
        let mut best = f32::NEG_INFINITY;

        // Match states
        for k in 1..=l {
            let mut sc = self.entry;
            if k > 1 {
                sc = sc
                    .max(prev.m[k - 1] + self.trans(k - 1, TR_MM))
                    .max(prev.i[k - 1] + self.trans(k - 1, TR_IM))
                    .max(prev.d[k - 1] + self.trans(k - 1, TR_DM));
            }
            cur.m[k] = self.match_score(k, sym) + sc;
            best = best.max(cur.m[k] + self.exit);
        }

        // Insert states I1..I(M-1)
        cur.i[0] = f32::NEG_INFINITY;
        cur.i[l] = f32::NEG_INFINITY;
        for k in 1..l {
            let sc = (prev.m[k] + self.trans(k, TR_MI)).max(prev.i[k] + self.trans(k, TR_II));
            cur.i[k] = self.insert_score(k, sym) + sc;
        }

        // Delete states D2..D(M-1), same row
        cur.d[0] = f32::NEG_INFINITY;
        cur.d[1] = f32::NEG_INFINITY;
        cur.d[l] = f32::NEG_INFINITY;
        for k in 2..l {
            cur.d[k] = (cur.m[k - 1] + self.trans(k - 1, TR_MD))
                .max(cur.d[k - 1] + self.trans(k - 1, TR_DD));
        }

        best
    }

    /// Full-matrix Viterbi: keeps every row of the DP matrix.
    pub fn score_full(&self, dsq: &[u8]) -> f32 {
        let n = dsq.len();
        let width = self.m + 1;
        let dim = (n + 1) * width;
        let mut vm = vec![f32::NEG_INFINITY; dim];
        let mut vi = vec![f32::NEG_INFINITY; dim];
        let mut vd = vec![f32::NEG_INFINITY; dim];

        let mut best = f32::NEG_INFINITY;
        for i in 1..=n {
            let (m_prev, m_cur) = vm.split_at_mut(i * width);
            let (i_prev, i_cur) = vi.split_at_mut(i * width);
            let (d_prev, d_cur) = vd.split_at_mut(i * width);
            let lo = (i - 1) * width;
            let row_best = self.fill_row(
                dsq[i - 1] as usize,
                Row {
                    m: &m_prev[lo..],
                    i: &i_prev[lo..],
                    d: &d_prev[lo..],
                },
                RowMut {
                    m: &mut m_cur[..width],
                    i: &mut i_cur[..width],
                    d: &mut d_cur[..width],
                },
            );
            best = best.max(row_best);
        }
        best / LN_2
    }

    /// Small-memory Viterbi: two rolling rows.
    pub fn score_small(&self, dsq: &[u8]) -> f32 {
        let width = self.m + 1;
        let mut prev_m = vec![f32::NEG_INFINITY; width];
        let mut prev_i = vec![f32::NEG_INFINITY; width];
        let mut prev_d = vec![f32::NEG_INFINITY; width];
        let mut cur_m = vec![f32::NEG_INFINITY; width];
        let mut cur_i = vec![f32::NEG_INFINITY; width];
        let mut cur_d = vec![f32::NEG_INFINITY; width];

        let mut best = f32::NEG_INFINITY;
        for &sym in dsq {
            let row_best = self.fill_row(
                sym as usize,
                Row {
                    m: &prev_m,
                    i: &prev_i,
                    d: &prev_d,
                },
                RowMut {
                    m: &mut cur_m,
                    i: &mut cur_i,
                    d: &mut cur_d,
                },
            );
            best = best.max(row_best);
            std::mem::swap(&mut prev_m, &mut cur_m);
            std::mem::swap(&mut prev_i, &mut cur_i);
            std::mem::swap(&mut prev_d, &mut cur_d);
        }
        best / LN_2
    }
}

impl SequenceScorer for ViterbiScorer {
    fn score(&self, dsq: &[u8]) -> f32 {
        if self.uses_full_matrix(dsq.len()) {
            self.score_full(dsq)
        } else {
            self.score_small(dsq)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// A DNA model strongly preferring `consensus`.
    fn consensus_hmm(consensus: &[u8]) -> Plan7Hmm {
        let m = consensus.len();
        let mut hmm = Plan7Hmm::new(m, Alphabet::Dna).unwrap();
        hmm.name = "consensus".into();
        for (k, &b) in consensus.iter().enumerate() {
            let sym = Alphabet::Dna.encode(b).unwrap();
            let row = hmm.mat_mut(k + 1);
            row.fill(0.02);
            row[sym] = 0.94;
        }
        for k in 1..m {
            hmm.ins_mut(k).fill(0.25);
            hmm.t_mut(k)
                .copy_from_slice(&[0.90, 0.05, 0.05, 0.60, 0.40, 0.70, 0.30]);
        }
        hmm
    }

    fn scorer_for(hmm: &Plan7Hmm) -> ViterbiScorer {
        ViterbiScorer::new(hmm, &NullModel::default_for(hmm.alphabet()))
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    #[test]
    fn single_state_model_scores_best_residue() {
        let mut hmm = Plan7Hmm::new(1, Alphabet::Dna).unwrap();
        hmm.mat_mut(1).copy_from_slice(&[0.7, 0.1, 0.1, 0.1]);
        let scorer = scorer_for(&hmm);

        let dsq = Alphabet::Dna.digitize(b"CCAC").unwrap();
        let expected = (0.7f32 / 0.25).ln() / LN_2;
        assert!((scorer.score(&dsq) - expected).abs() < 1e-4);
    }

    #[test]
    fn consensus_outscores_mismatches() {
        let hmm = consensus_hmm(b"ACGTACGTAC");
        let scorer = scorer_for(&hmm);

        let hit = scorer.score(&Alphabet::Dna.digitize(b"TTACGTACGTACTT").unwrap());
        let miss = scorer.score(&Alphabet::Dna.digitize(b"GGGGGGGGGGGGGG").unwrap());
        assert!(hit > 5.0, "hit = {}", hit);
        assert!(hit > miss);
    }

    #[test]
    fn deletion_path_is_found() {
        let hmm = consensus_hmm(b"ACGTACGTAC");
        let scorer = scorer_for(&hmm);

        let full = scorer.score(&Alphabet::Dna.digitize(b"ACGTACGTAC").unwrap());
        let with_gap = scorer.score(&Alphabet::Dna.digitize(b"ACGTAGTAC").unwrap());
        assert!(with_gap < full);
        assert!(with_gap > 0.0, "with_gap = {}", with_gap);
    }

    #[test]
    fn full_and_small_variants_agree() {
        let hmm = consensus_hmm(b"ACGTTGCAACGT");
        let scorer = scorer_for(&hmm);
        let null = NullModel::default_for(Alphabet::Dna);
        let mut rng = StdRng::seed_from_u64(42);

        for len in [1usize, 2, 5, 30, 200] {
            let dsq = null.random_sequence(&mut rng, len);
            assert_eq!(scorer.score_full(&dsq), scorer.score_small(&dsq), "len {}", len);
        }
    }

    #[test]
    fn ram_limit_selects_variant() {
        let hmm = consensus_hmm(b"ACGT");
        let scorer = scorer_for(&hmm);
        assert!(scorer.uses_full_matrix(100));

        let small = scorer.clone().with_ram_limit(0);
        assert!(!small.uses_full_matrix(1));

        let dsq = Alphabet::Dna.digitize(b"AACGTT").unwrap();
        assert_eq!(scorer.score(&dsq), small.score(&dsq));
    }

    #[test]
    fn viterbi_size_grows_with_both_dimensions() {
        assert_eq!(viterbi_size(0, 0), 3 * size_of::<f32>());
        assert!(viterbi_size(100, 10) < viterbi_size(200, 10));
        assert!(viterbi_size(100, 10) < viterbi_size(100, 20));
        assert_eq!(viterbi_size(usize::MAX, usize::MAX), usize::MAX);
    }

    #[test]
    fn empty_sequence_scores_negative_infinity() {
        let scorer = scorer_for(&consensus_hmm(b"ACG"));
        assert_eq!(scorer.score(&[]), f32::NEG_INFINITY);
    }

    #[test]
    fn zero_background_symbols_are_impossible() {
        let hmm = consensus_hmm(b"AC");
        let null = NullModel::with_background(Alphabet::Dna, vec![0.0, 0.5, 0.5, 0.0]).unwrap();
        let scorer = ViterbiScorer::new(&hmm, &null);
        let sc = scorer.score(&Alphabet::Dna.digitize(b"AAAA").unwrap());
        assert_eq!(sc, f32::NEG_INFINITY);
        assert!(!sc.is_nan());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::alphabet::Alphabet;
    use proptest::prelude::*;

    /// A DNA model with arbitrary emissions and transitions, zeros included.
    fn arb_model() -> impl Strategy<Value = Plan7Hmm> {
        (1usize..7).prop_flat_map(|m| {
            (
                proptest::collection::vec(0.0f32..1.0, m * 4),
                proptest::collection::vec(0.0f32..1.0, (m - 1) * 4),
                proptest::collection::vec(prop_oneof![Just(0.0f32), 0.0f32..1.0], (m - 1) * 7),
            )
                .prop_map(move |(mat, ins, t)| {
                    let mut hmm = Plan7Hmm::new(m, Alphabet::Dna).unwrap();
                    hmm.match_emissions_mut().copy_from_slice(&mat);
                    hmm.insert_emissions_mut().copy_from_slice(&ins);
                    hmm.transitions_mut().copy_from_slice(&t);
                    hmm
                })
        })
    }

    proptest! {
        #[test]
        fn variants_agree_on_any_model(
            hmm in arb_model(),
            dsq in proptest::collection::vec(0u8..4, 0..40),
        ) {
            let scorer = ViterbiScorer::new(&hmm, &NullModel::default_for(Alphabet::Dna));
            let full = scorer.score_full(&dsq);
            let small = scorer.score_small(&dsq);
            prop_assert!(!full.is_nan());
            prop_assert_eq!(full.to_bits(), small.to_bits());
        }
    }
}
