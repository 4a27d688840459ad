//! Bounded pool of scoring workers.
//!
//! The calling thread generates sequences and hands each to the pool; at most
//! `2 × workers` sequences are in flight at once. Scores come back over a
//! channel in completion order. Generation stays on the calling thread, so a
//! seeded run yields the same set of scores for any worker count.

use std::sync::mpsc;

use log::debug;
use plan7_core::{Plan7Error, Result, SequenceScorer};

/// A fixed-size pool of scoring threads.
pub struct ScoringPool {
    pool: rayon::ThreadPool,
}

impl ScoringPool {
    /// Build a pool with `workers` threads; 0 uses one per available CPU.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the operating system refuses to start the threads.
    pub fn new(workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("plan7-score-{}", i))
            .build()
            .map_err(|e| Plan7Error::InvalidInput(format!("cannot start scoring threads: {}", e)))?;
        debug!("scoring pool with {} workers", pool.current_num_threads());
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Maximum number of sequences handed out but not yet scored.
    pub fn window(&self) -> usize {
        2 * self.workers()
    }

    /// Score `count` sequences drawn from `generate`, calling `sink` with each
    /// score as it arrives.
    ///
    /// `generate` and `sink` run on the calling thread; `generate` is called
    /// exactly `count` times, in order.
    pub fn score_stream<S, G, F>(&self, scorer: &S, count: usize, mut generate: G, mut sink: F)
    where
        S: SequenceScorer + ?Sized,
        G: FnMut() -> Vec<u8>,
        F: FnMut(f32),
    {
        let window = self.window();
        let (tx, rx) = mpsc::channel::<f32>();

        self.pool.in_place_scope(|scope| {
            let mut submit = |tx: &mpsc::Sender<f32>| {
                let dsq = generate();
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let score = scorer.score(&dsq);
                    // The receiver outlives every job.
                    let _ = tx.send(score);
                });
            };

            let mut submitted = 0;
            while submitted < count.min(window) {
                submit(&tx);
                submitted += 1;
            }

            for _ in 0..count {
                let Ok(score) = rx.recv() else { break };
                sink(score);
                if submitted < count {
                    submit(&tx);
                    submitted += 1;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scores a sequence by its length and counts calls.
    struct LengthScorer {
        calls: AtomicUsize,
    }

    impl LengthScorer {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl SequenceScorer for LengthScorer {
        fn score(&self, dsq: &[u8]) -> f32 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            dsq.len() as f32
        }
    }

    fn run(workers: usize, count: usize) -> (usize, Vec<f32>) {
        let pool = ScoringPool::new(workers).unwrap();
        let scorer = LengthScorer::new();
        let mut next = 0usize;
        let mut scores = Vec::new();
        pool.score_stream(
            &scorer,
            count,
            || {
                next += 1;
                vec![0u8; next % 37]
            },
            |s| scores.push(s),
        );
        scores.sort_by(|a, b| a.partial_cmp(b).unwrap());
        (scorer.calls.load(Ordering::SeqCst), scores)
    }

    #[test]
    fn scores_exactly_count_sequences() {
        for workers in [1, 4] {
            let (calls, scores) = run(workers, 500);
            assert_eq!(calls, 500, "workers = {}", workers);
            assert_eq!(scores.len(), 500);
        }
    }

    #[test]
    fn worker_count_does_not_change_results() {
        assert_eq!(run(1, 300).1, run(4, 300).1);
    }

    #[test]
    fn zero_count_does_nothing() {
        let (calls, scores) = run(2, 0);
        assert_eq!(calls, 0);
        assert!(scores.is_empty());
    }

    #[test]
    fn in_flight_work_is_bounded() {
        let pool = ScoringPool::new(3).unwrap();
        assert_eq!(pool.workers(), 3);
        let scorer = LengthScorer::new();
        let generated = Cell::new(0usize);
        let received = Cell::new(0usize);
        let peak = Cell::new(0usize);

        pool.score_stream(
            &scorer,
            200,
            || {
                generated.set(generated.get() + 1);
                peak.set(peak.get().max(generated.get() - received.get()));
                vec![1, 2, 3]
            },
            |_| received.set(received.get() + 1),
        );
        assert_eq!(received.get(), 200);
        assert!(peak.get() <= pool.window(), "peak = {}", peak.get());
    }

    #[test]
    fn default_worker_count_is_positive() {
        assert!(ScoringPool::new(0).unwrap().workers() >= 1);
    }
}
