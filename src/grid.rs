//! The energy sampling grid shared by every spectral quantity of a run.

use units::{kev, kev_, Energy};

use crate::{DesimError, Result};
use crate::types::KeVf64;

/// Strictly increasing photon energies, together with trapezoidal quadrature
/// weights, so that `Σ weight(i)·f(E_i)` approximates `∫ f(E) dE`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyGrid {
    energies: Vec<KeVf64>,
    weights: Vec<KeVf64>,
}

impl Default for EnergyGrid {
    /// 1 keV steps from 10 to 150 keV
    fn default() -> Self {
        Self::build((10..=150).map(f64::from).collect())
    }
}

impl EnergyGrid {

    /// Uniformly spaced grid including both end points. `max` is rounded to
    /// the nearest whole number of steps above `min`.
    pub fn uniform(min: Energy, max: Energy, step: Energy) -> Result<Self> {
        let (min, max, step) = (kev_(min), kev_(max), kev_(step));
        if !(step > 0.0) {
            return Err(DesimError::parameter("grid.step", format!("must be positive, got {step} keV")));
        }
        if !(max > min) {
            return Err(DesimError::parameter("grid.max", format!("{max} keV is not above grid.min {min} keV")));
        }
        let n = ((max - min) / step).round() as usize + 1;
        Self::from_kev((0..n).map(|i| min + i as f64 * step).collect())
    }

    pub fn from_energies(energies: &[Energy]) -> Result<Self> {
        Self::from_kev(energies.iter().copied().map(kev_).collect())
    }

    /// Construct from energies interpreted as keV
    pub fn from_kev(energies: Vec<KeVf64>) -> Result<Self> {
        if energies.len() < 2 {
            return Err(DesimError::parameter("grid", "needs at least two energies"));
        }
        if let Some(bad) = energies.iter().find(|&&e| !(e > 0.0 && e.is_finite())) {
            return Err(DesimError::parameter("grid", format!("energies must be positive and finite, got {bad} keV")));
        }
        if let Some(w) = energies.windows(2).find(|w| w[1] <= w[0]) {
            return Err(DesimError::parameter("grid", format!("energies not strictly increasing at {} keV, {} keV", w[0], w[1])));
        }
        Ok(Self::build(energies))
    }

    fn build(energies: Vec<KeVf64>) -> Self {
        let n = energies.len();
        let weights = (0..n).map(|i| {
            let lo = if i == 0     { energies[i] } else { energies[i - 1] };
            let hi = if i == n - 1 { energies[i] } else { energies[i + 1] };
            (hi - lo) / 2.0
        }).collect();
        Self { energies, weights }
    }

    pub fn energies(&self) -> &[KeVf64] { &self.energies }
    pub fn weights (&self) -> &[KeVf64] { &self.weights  }
    pub fn len     (&self) -> usize     { self.energies.len() }
    pub fn is_empty(&self) -> bool      { self.energies.is_empty() }

    pub fn min(&self) -> Energy { kev(self.energies[0]) }
    pub fn max(&self) -> Energy { kev(self.energies[self.energies.len() - 1]) }

    /// Trapezoidal integral of values sampled on this grid
    pub fn integrate(&self, values: impl IntoIterator<Item = f64>) -> f64 {
        self.weights.iter().zip(values).map(|(w, v)| w * v).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use rstest::rstest;

    #[test]
    fn default_grid_is_one_kev_from_10_to_150() {
        let g = EnergyGrid::default();
        assert_eq!(g.len(), 141);
        assert_eq!(g.energies()[0], 10.0);
        assert_eq!(g.energies()[140], 150.0);
    }

    #[rstest(/**/ min,  max, step, expected_len,
             case(10.0, 150.0, 1.0, 141),
             case(10.0, 150.0, 0.5, 281),
             case(20.0,  30.0, 3.0,   4), // 20, 23, 26, 29: 30 is rounded away
             case(20.0,  31.0, 3.0,   5),
    )]
    fn uniform_grid_length(min: f64, max: f64, step: f64, expected_len: usize) {
        let g = EnergyGrid::uniform(kev(min), kev(max), kev(step)).unwrap();
        assert_eq!(g.len(), expected_len);
    }

    #[rstest(/**/ energies,
             case(vec![]),
             case(vec![10.0]),
             case(vec![10.0, 10.0]),
             case(vec![10.0, 12.0, 11.0]),
             case(vec![-1.0, 12.0]),
             case(vec![ 0.0, 12.0]),
             case(vec![ 1.0, f64::INFINITY]),
    )]
    fn rejects_bad_energies(energies: Vec<f64>) {
        assert!(EnergyGrid::from_kev(energies).is_err());
    }

    #[test]
    fn trapezoid_integrates_linear_functions_exactly() {
        let g = EnergyGrid::from_kev(vec![10.0, 11.0, 13.0, 17.0, 30.0]).unwrap();
        let integral = g.integrate(g.energies().iter().map(|e| 2.0 * e + 1.0));
        // ∫_10^30 (2E + 1) dE = [E² + E]
        assert_float_eq!(integral, (900.0 + 30.0) - (100.0 + 10.0), r2nd <= 1e-12);
    }

    #[test]
    fn weights_sum_to_grid_width() {
        let g = EnergyGrid::default();
        assert_float_eq!(g.weights().iter().sum::<f64>(), 140.0, r2nd <= 1e-12);
    }
}
