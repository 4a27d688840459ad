//! Gumbel (type I extreme value) distribution and its maximum likelihood fit.
//!
//! Optimal local alignment scores of random sequences follow a Gumbel
//! distribution with location μ and scale λ:
//!
//! ```text
//! P(S < x) = exp(-exp(-λ (x - μ)))
//! ```
//!
//! [`fit_censored`] estimates μ and λ from weighted observations that lie at
//! or above a censoring point `c`, plus a count of observations known only to
//! lie below `c`.

use rand::Rng;

/// Smallest number of uncensored observations worth fitting.
pub const MIN_FIT_SAMPLES: f64 = 10.0;

/// Largest scale parameter a fit may return. Scores are binned at unit
/// width, so a steeper distribution cannot be told apart from a spike.
pub const MAX_LAMBDA: f64 = 1e3;

const MAX_ITERATIONS: usize = 100;
const TOLERANCE: f64 = 1e-6;

// ── Fitted distribution ────────────────────────────────────────────────────

/// Fitted Gumbel parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvdFit {
    /// Location parameter μ.
    pub mu: f64,
    /// Scale parameter λ, always positive.
    pub lambda: f64,
}

impl EvdFit {
    pub fn new(mu: f64, lambda: f64) -> Self {
        Self { mu, lambda }
    }

    pub fn cdf(&self, x: f64) -> f64 {
        (-(-self.lambda * (x - self.mu)).exp()).exp()
    }

    /// P(S ≥ x), the p-value of score `x`.
    pub fn survival(&self, x: f64) -> f64 {
        // 1 - exp(-t) without cancellation for small t.
        -(-(-self.lambda * (x - self.mu)).exp()).exp_m1()
    }

    pub fn mean(&self) -> f64 {
        const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
        self.mu + EULER_GAMMA / self.lambda
    }

    pub fn variance(&self) -> f64 {
        std::f64::consts::PI.powi(2) / (6.0 * self.lambda * self.lambda)
    }

    /// Draw one value by inversion.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
        self.mu - (-u.ln()).ln() / self.lambda
    }
}

// ── Censored maximum likelihood ────────────────────────────────────────────

/// Weighted sums over the observations for one value of λ.
struct Moments {
    /// Σ y w + z
    s0: f64,
    /// Σ y w x + z c
    s1: f64,
    /// Σ y w x² + z c²
    s2: f64,
}

fn moments(points: &[(f64, f64)], censored: f64, c: f64, lambda: f64) -> Moments {
    let mut m = Moments {
        s0: censored,
        s1: censored * c,
        s2: censored * c * c,
    };
    for &(x, y) in points {
        // x ≥ c, so w ≤ 1 and cannot overflow.
        let w = y * (-lambda * (x - c)).exp();
        m.s0 += w;
        m.s1 += w * x;
        m.s2 += w * x * x;
    }
    m
}

/// Fit a Gumbel distribution by maximum likelihood.
///
/// `points` are `(x, count)` pairs with every `x ≥ c`; `censored` is the
/// number of further observations known only to be below `c`. With
/// `censored == 0` this is the ordinary uncensored fit.
///
/// λ solves
///
/// ```text
/// f(λ) = 1/λ - Σyx/N + (Σ y w x + z c) / (Σ y w + z) = 0,   w = exp(-λ (x - c))
/// ```
///
/// which is strictly decreasing in λ; Newton steps are used inside a
/// bisection bracket. Then `μ = c + ln(N / (Σ y w + z)) / λ`.
///
/// Returns `None` with fewer than [`MIN_FIT_SAMPLES`] observations, when
/// the data have no spread (every observation, censored ones counted at `c`,
/// at a single value), when λ would exceed [`MAX_LAMBDA`], or if the result
/// is not finite.
pub fn fit_censored(points: &[(f64, f64)], censored: f64, c: f64) -> Option<EvdFit> {
    if censored < 0.0 || points.iter().any(|&(x, y)| x < c || y < 0.0) {
        return None;
    }
    let points: Vec<(f64, f64)> = points.iter().copied().filter(|&(_, y)| y > 0.0).collect();
    let n: f64 = points.iter().map(|&(_, y)| y).sum();
    if n < MIN_FIT_SAMPLES {
        return None;
    }
    let first = points[0].0;
    let spread = points.iter().any(|&(x, _)| x != first) || (censored > 0.0 && first != c);
    if !spread {
        return None;
    }
    let mean = points.iter().map(|&(x, y)| x * y).sum::<f64>() / n;

    // Weights are taken relative to the smallest point that carries mass, so
    // at least one weight stays 1 for any λ.
    let c = if censored > 0.0 {
        c
    } else {
        points.iter().map(|&(x, _)| x).fold(f64::INFINITY, f64::min)
    };

    let f = |lambda: f64| {
        let m = moments(&points, censored, c, lambda);
        let wmean = m.s1 / m.s0;
        let value = 1.0 / lambda - mean + wmean;
        let slope = -1.0 / (lambda * lambda) - (m.s2 / m.s0 - wmean * wmean);
        (value, slope)
    };

    // Bracket the root: f(0+) = +inf, so only the upper end needs searching.
    let mut lo = 1e-6;
    let mut hi = 1.0;
    if f(lo).0 <= 0.0 {
        return None;
    }
    while f(hi).0 > 0.0 {
        if hi >= MAX_LAMBDA {
            return None;
        }
        lo = hi;
        hi *= 2.0;
    }

    let mut lambda = 0.5 * (lo + hi);
    for _ in 0..MAX_ITERATIONS {
        let (value, slope) = f(lambda);
        if value.abs() < TOLERANCE {
            break;
        }
        if value > 0.0 {
            lo = lambda;
        } else {
            hi = lambda;
        }
        let newton = lambda - value / slope;
        lambda = if newton > lo && newton < hi && newton.is_finite() {
            newton
        } else {
            0.5 * (lo + hi)
        };
        if hi - lo < TOLERANCE * lambda {
            break;
        }
    }

    let m = moments(&points, censored, c, lambda);
    let mu = c + (n / m.s0).ln() / lambda;
    (mu.is_finite() && lambda.is_finite() && lambda > 0.0 && lambda <= MAX_LAMBDA)
        .then(|| EvdFit::new(mu, lambda))
}
