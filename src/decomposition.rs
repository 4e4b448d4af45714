//! Dual-energy material decomposition: from a (low, high) signal pair to
//! equivalent thicknesses of two basis materials.
//!
//! The forward model is inverted with Newton–Raphson iteration on the
//! logarithms of the signals, in which the system is nearly linear. Each step
//! is shortened by halving until it reduces the residual.

use nalgebra::{Matrix2, Vector2};
use serde::Deserialize;
use ndarray::{Array2, Zip};

use crate::{DesimError, Result};
use crate::imaging::{ForwardModel, ImagePair};
use crate::types::{Cmf64, Index2, Pair, Signalf64, Variancef64};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverSettings {
    /// Converged when max |ln S_predicted − ln S_observed| falls below this
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Jacobians whose normalized determinant |det J| / (|J₁₁J₂₂| + |J₁₂J₂₁|)
    /// is below this are treated as singular
    pub singular_tolerance: f64,
    /// Starting thicknesses, cm
    pub initial_guess: Pair<Cmf64>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self { tolerance: 1e-10, max_iterations: 50, singular_tolerance: 0.025, initial_guess: [0.0, 0.0] }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance > 0.0) {
            return Err(DesimError::parameter("solver.tolerance", format!("must be positive, got {}", self.tolerance)));
        }
        if self.max_iterations == 0 {
            return Err(DesimError::parameter("solver.max_iterations", "must be at least 1"));
        }
        if !(self.singular_tolerance >= 0.0 && self.singular_tolerance < 1.0) {
            return Err(DesimError::parameter("solver.singular_tolerance", format!(
                "must lie in [0, 1), got {}", self.singular_tolerance)));
        }
        if self.initial_guess.iter().any(|t| !t.is_finite()) {
            return Err(DesimError::parameter("solver.initial_guess", "must be finite"));
        }
        Ok(())
    }
}

/// Basis thicknesses reproducing an observed signal pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Solution {
    /// cm of each basis material
    pub thickness: Pair<Cmf64>,
    /// Linearized covariance of `thickness`, cm²
    pub covariance: Matrix2<f64>,
    pub iterations: usize,
}

impl Solution {
    pub fn std_dev(&self) -> Pair<Cmf64> {
        [self.covariance[(0, 0)].sqrt(), self.covariance[(1, 1)].sqrt()]
    }
}

const MAX_STEP_HALVINGS: usize = 40;

fn normalized_determinant(j: &Matrix2<f64>) -> f64 {
    let scale = (j[(0, 0)] * j[(1, 1)]).abs() + (j[(0, 1)] * j[(1, 0)]).abs();
    j.determinant().abs() / scale
}

fn max_abs(r: &Vector2<f64>) -> f64 { r[0].abs().max(r[1].abs()) }

/// Thicknesses for which `model` predicts `observed`. `variance` is the
/// variance of each observed signal; the two channels are independent.
pub fn solve(model: &ForwardModel,
             observed: Pair<Signalf64>,
             variance: Pair<Variancef64>,
             settings: &SolverSettings,
) -> Result<Solution> {
    if observed.iter().any(|&s| !(s > 0.0 && s.is_finite())) {
        return Err(DesimError::DecompositionDidNotConverge { location: None, iterations: 0, residual: f64::INFINITY });
    }
    let target = Vector2::new(observed[0].ln(), observed[1].ln());
    let residual = |t: &Vector2<f64>| {
        let p = model.evaluate([t[0], t[1]]);
        (Vector2::new(p.signal[0].ln(), p.signal[1].ln()) - target, p)
    };

    let mut t = Vector2::new(settings.initial_guess[0], settings.initial_guess[1]);
    let (mut r, mut prediction) = residual(&t);
    for iteration in 0..=settings.max_iterations {
        let j = prediction.jacobian;
        let determinant = normalized_determinant(&j);
        if !(determinant >= settings.singular_tolerance) {
            return Err(DesimError::SingularJacobian { location: None, determinant });
        }
        let inverse = j.try_inverse()
            .ok_or(DesimError::SingularJacobian { location: None, determinant })?;
        if max_abs(&r) < settings.tolerance {
            return Ok(Solution {
                thickness: [t[0], t[1]],
                covariance: covariance(&inverse, prediction.signal, variance),
                iterations: iteration,
            });
        }
        if iteration == settings.max_iterations { break }

        let step = -(inverse * r);
        let mut alpha = 1.0;
        let mut accepted = false;
        for _ in 0..MAX_STEP_HALVINGS {
            let candidate = t + step * alpha;
            let (r_new, p_new) = residual(&candidate);
            if max_abs(&r_new) < max_abs(&r) {
                t = candidate;
                r = r_new;
                prediction = p_new;
                accepted = true;
                break;
            }
            alpha /= 2.0;
        }
        if !accepted {
            return Err(DesimError::DecompositionDidNotConverge {
                location: None, iterations: iteration + 1, residual: max_abs(&r) });
        }
    }
    Err(DesimError::DecompositionDidNotConverge {
        location: None, iterations: settings.max_iterations, residual: max_abs(&r) })
}

/// J⁻¹ Σ J⁻ᵀ, with J the Jacobian of the signals (not their logarithms) and
/// Σ the diagonal signal covariance. `inverse` is the inverse of the
/// Jacobian of the logarithms, so J⁻¹ = inverse · diag(1/S).
fn covariance(inverse: &Matrix2<f64>, signal: Pair<Signalf64>, variance: Pair<Variancef64>) -> Matrix2<f64> {
    let relative = Matrix2::new(variance[0] / (signal[0] * signal[0]), 0.0,
                                0.0, variance[1] / (signal[1] * signal[1]));
    inverse * relative * inverse.transpose()
}

/// Outcome of decomposing one pixel
#[derive(Debug, Clone, PartialEq)]
pub enum Decomposed {
    Valid(Solution),
    Invalid(DesimError),
}

impl Decomposed {
    pub fn solution(&self) -> Option<&Solution> {
        match self { Decomposed::Valid(s) => Some(s), Decomposed::Invalid(_) => None }
    }
}

/// Per-pixel decomposition of an image pair. Pixels where the solver failed
/// are kept, with the reason, rather than dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionResult {
    pub basis: Pair<String>,
    pub entries: Array2<Decomposed>,
}

impl DecompositionResult {

    pub fn get(&self, [row, col]: Index2) -> Option<&Decomposed> { self.entries.get((row, col)) }

    pub fn valid_count(&self) -> usize {
        self.entries.iter().filter(|e| e.solution().is_some()).count()
    }

    pub fn invalid_count(&self) -> usize { self.entries.len() - self.valid_count() }

    pub fn invalid_fraction(&self) -> f64 {
        self.invalid_count() as f64 / self.entries.len() as f64
    }

    /// Thickness of basis material `m` (0 or 1) at each pixel, where valid
    pub fn thickness_map(&self, m: usize) -> Array2<Option<Cmf64>> {
        self.entries.map(|e| e.solution().map(|s| s.thickness[m]))
    }

    /// Number of invalid pixels: (singular Jacobian, other failures)
    pub fn failures(&self) -> (usize, usize) {
        self.entries.iter().fold((0, 0), |(singular, other), e| match e {
            Decomposed::Invalid(DesimError::SingularJacobian { .. }) => (singular + 1, other),
            Decomposed::Invalid(_)                                   => (singular, other + 1),
            Decomposed::Valid(_)                                     => (singular, other),
        })
    }
}

/// Decompose every pixel of `images`, independently and in parallel.
pub fn decompose(model: &ForwardModel, images: &ImagePair, settings: &SolverSettings) -> Result<DecompositionResult> {
    settings.validate()?;
    if images.low.shape() != images.high.shape() {
        return Err(DesimError::parameter("images", format!(
            "low {:?} and high {:?} images differ in shape", images.low.shape(), images.high.shape())));
    }
    let zip = Zip::indexed(&images.low.mean)
        .and(&images.low.variance)
        .and(&images.high.mean)
        .and(&images.high.variance);
    let one_pixel = |(row, col): (usize, usize), &sl: &f64, &vl: &f64, &sh: &f64, &vh: &f64| {
        match solve(model, [sl, sh], [vl, vh], settings) {
            Ok(solution) => Decomposed::Valid(solution),
            Err(e)       => Decomposed::Invalid(e.at_location([row, col])),
        }
    };

    #[cfg    (feature = "serial") ] let entries = zip.    map_collect(one_pixel);
    #[cfg(not(feature = "serial"))] let entries = zip.par_map_collect(one_pixel);

    let [b1, b2] = model.basis();
    Ok(DecompositionResult { basis: [b1.to_string(), b2.to_string()], entries })
}
