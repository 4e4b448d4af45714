//! The object-free forward model: mean signal pair predicted for given
//! thicknesses of two basis materials.
//!
//! For channel c, with per-energy detector weights kᶜ(E) (spectrum, pixel
//! area, efficiency and gain folded together) and basis attenuation
//! coefficients µ₁(E), µ₂(E),
//!
//! ```text
//!     Sᶜ(t₁, t₂) = Σ kᶜ(E) exp(−µ₁(E) t₁ − µ₂(E) t₂)
//!     ∂ ln Sᶜ / ∂tₘ = −⟨µₘ⟩ᶜ
//! ```
//!
//! where ⟨µₘ⟩ᶜ is µₘ averaged over the spectrum reaching the detector,
//! weighted by its contribution to the signal. This is the same computation
//! as `ImageFormation` performs for a phantom made of the two basis
//! materials only.

use nalgebra::Matrix2;

use crate::Result;
use crate::attenuation::AttenuationModel;
use crate::detector::DetectorResponse;
use crate::spectrum::Spectrum;
use crate::types::{Cmf64, Pair, PerCmf64, Signalf64};

#[derive(Debug, Clone)]
pub struct ForwardModel {
    basis: Pair<String>,
    /// kᶜ(E) for each channel
    weights: Pair<Vec<f64>>,
    /// µₘ(E) for each basis material
    mu: Pair<Vec<PerCmf64>>,
}

/// Predicted signals and the Jacobian of their logarithms with respect to
/// the basis thicknesses: `jacobian[(c, m)] = ∂ ln Sᶜ / ∂tₘ`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub signal: Pair<Signalf64>,
    pub jacobian: Matrix2<f64>,
}

impl ForwardModel {

    /// `spectra` are (low, high); `attenuation` must include both basis
    /// materials.
    pub fn new(basis: Pair<&str>,
               spectra: Pair<&Spectrum>,
               attenuation: &AttenuationModel,
               detector: &DetectorResponse,
    ) -> Result<Self> {
        let mu = [attenuation.mu(basis[0])?.to_vec(), attenuation.mu(basis[1])?.to_vec()];
        let weights = spectra.map(|s| detector.signal_weights(s));
        Ok(Self { basis: basis.map(String::from), weights, mu })
    }

    pub fn basis(&self) -> Pair<&str> { [&self.basis[0], &self.basis[1]] }

    /// Mean signal pair (low, high) behind `thickness` cm of each basis material
    pub fn predict(&self, thickness: Pair<Cmf64>) -> Pair<Signalf64> {
        self.evaluate(thickness).signal
    }

    pub fn evaluate(&self, [t1, t2]: Pair<Cmf64>) -> Prediction {
        let mut signal = [0.0; 2];
        let mut jacobian = Matrix2::zeros();
        for (c, k) in self.weights.iter().enumerate() {
            let (mut s, mut d1, mut d2) = (0.0, 0.0, 0.0);
            for ((k, m1), m2) in k.iter().zip(&self.mu[0]).zip(&self.mu[1]) {
                let contribution = k * (-m1 * t1 - m2 * t2).exp();
                s  += contribution;
                d1 += contribution * m1;
                d2 += contribution * m2;
            }
            signal[c] = s;
            jacobian[(c, 0)] = -d1 / s;
            jacobian[(c, 1)] = -d2 / s;
        }
        Prediction { signal, jacobian }
    }
}
