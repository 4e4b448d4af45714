//! Detector response: from incident spectral fluence at a pixel to the mean
//! and variance of the pixel's signal.
//!
//! With N(E) photons of energy E incident on a pixel, absorption efficiency
//! η(E) and mean gain g(E) per absorbed photon, whose relative spread at fixed
//! energy is `gain_cv`,
//!
//! ```text
//!     mean     = Σ N(E) η(E) g(E)
//!     variance = Σ N(E) η(E) g(E)² (1 + gain_cv²)  +  σₑ²
//! ```
//!
//! The absorbed photon count is Poisson, and each absorbed photon contributes
//! a random gain, so the quantum term is a compound Poisson variance. When g
//! depends on energy the variance is not proportional to the total number of
//! photons, but to a gain-squared-weighted sum; this is the origin of the
//! Swank factor.

use std::f64::consts::PI;

use serde::Deserialize;
use units::{cm_, mm_, Length};

use crate::{DesimError, Result};
use crate::attenuation::AttenuationModel;
use crate::grid::EnergyGrid;
use crate::material::MaterialTable;
use crate::spectrum::Spectrum;
use crate::types::{Countsf64, KeVf64, Signalf64, Variancef64};

#[derive(Debug, Clone, PartialEq)]
pub enum Absorption {
    /// The same fraction of photons absorbed at every energy
    Flat(f64),
    /// Fraction absorbed at the given energies (keV), interpolated linearly
    /// and held constant beyond the ends of the table.
    Tabulated { energies: Vec<KeVf64>, efficiency: Vec<f64> },
    /// Absorption in a layer of scintillator: 1 − exp(−µ(E) t)
    Scintillator { material: String, thickness: Length },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GainModel {
    /// Signal proportional to the energy deposited: g(E) = gain · E
    #[default]
    EnergyIntegrating,
    /// Every absorbed photon contributes the same signal: g(E) = gain
    PhotonCounting,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorParameters {
    pub absorption: Absorption,
    pub gain_model: GainModel,
    /// Signal per keV deposited (energy integrating) or per absorbed photon
    /// (photon counting)
    pub conversion_gain: f64,
    /// Relative standard deviation of the gain of single photons of one energy
    pub gain_cv: f64,
    /// Additive electronic noise, in signal units squared
    pub electronic_noise_variance: Variancef64,
    /// Side of a square pixel aperture
    pub pixel_pitch: Length,
    /// Standard deviation of the Gaussian light spread in the scintillator
    pub blur: Length,
}

impl DetectorParameters {

    /// Ideal energy-integrating detector with flat efficiency and no noise
    /// beyond the quantum noise
    pub fn flat(efficiency: f64, pixel_pitch: Length) -> Self {
        Self {
            absorption: Absorption::Flat(efficiency),
            gain_model: GainModel::EnergyIntegrating,
            conversion_gain: 1.0,
            gain_cv: 0.0,
            electronic_noise_variance: 0.0,
            pixel_pitch,
            blur: units::mm(0.0),
        }
    }

    pub fn materials(&self) -> Vec<&str> {
        match &self.absorption {
            Absorption::Scintillator { material, .. } => vec![material.as_str()],
            _ => vec![],
        }
    }
}

/// Mean and variance of the signal of one pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSignal {
    pub mean: Signalf64,
    pub variance: Variancef64,
    /// Photons incident on the pixel
    pub incident: Countsf64,
}

/// `DetectorParameters` evaluated on an energy grid.
#[derive(Debug, Clone)]
pub struct DetectorResponse {
    grid: EnergyGrid,
    /// Pixel area in mm²
    area: f64,
    efficiency: Vec<f64>,
    gain: Vec<f64>,
    gain_cv: f64,
    electronic_noise_variance: Variancef64,
    pitch_mm: f64,
    blur_mm: f64,
}

impl DetectorResponse {

    pub fn new(params: &DetectorParameters, grid: &EnergyGrid, materials: &MaterialTable) -> Result<Self> {
        let positive = |name: &str, x: f64| {
            if x > 0.0 && x.is_finite() { Ok(x) }
            else { Err(DesimError::parameter(format!("detector.{name}"), format!("must be positive, got {x}"))) }
        };
        let non_negative = |name: &str, x: f64| {
            if x >= 0.0 && x.is_finite() { Ok(x) }
            else { Err(DesimError::parameter(format!("detector.{name}"), format!("must be non-negative, got {x}"))) }
        };
        let pitch_mm = positive("pixel_pitch", mm_(params.pixel_pitch))?;
        let blur_mm  = non_negative("blur", mm_(params.blur))?;
        let gain     = positive("conversion_gain", params.conversion_gain)?;
        let gain_cv  = non_negative("gain_cv", params.gain_cv)?;
        let electronic_noise_variance = non_negative("electronic_noise_variance", params.electronic_noise_variance)?;

        let efficiency = efficiency(&params.absorption, grid, materials)?;
        let gain = grid.energies().iter().map(|&e| match params.gain_model {
            GainModel::EnergyIntegrating => gain * e,
            GainModel::PhotonCounting    => gain,
        }).collect();

        Ok(Self {
            grid: grid.clone(),
            area: pitch_mm * pitch_mm,
            efficiency, gain, gain_cv, electronic_noise_variance, pitch_mm, blur_mm,
        })
    }

    pub fn grid      (&self) -> &EnergyGrid { &self.grid }
    pub fn efficiency(&self) -> &[f64] { &self.efficiency }
    pub fn gain      (&self) -> &[f64] { &self.gain }
    pub fn electronic_noise_variance(&self) -> Variancef64 { self.electronic_noise_variance }

    /// Pixel area in mm²
    pub fn pixel_area(&self) -> f64 { self.area }

    /// Per-energy contributions to the mean signal per unit transmission:
    /// A·w(E)·Φ(E)·η(E)·g(E). The mean signal behind an object with
    /// transmission T(E) is Σ weights(E)·T(E).
    pub fn signal_weights(&self, spectrum: &Spectrum) -> Vec<f64> {
        self.incident_counts(spectrum.fluence()).zip(self.efficiency.iter().zip(&self.gain))
            .map(|(n, (eta, g))| n * eta * g)
            .collect()
    }

    /// Mean and variance of the signal produced by `fluence`, a spectral
    /// fluence in photons/(mm²·keV) on this response's grid.
    pub fn respond(&self, fluence: &[f64]) -> PixelSignal {
        let mut mean = 0.0;
        let mut quantum = 0.0;
        let mut incident = 0.0;
        for (n, (eta, g)) in self.incident_counts(fluence).zip(self.efficiency.iter().zip(&self.gain)) {
            incident += n;
            mean     += n * eta * g;
            quantum  += n * eta * g * g;
        }
        PixelSignal {
            mean,
            variance: quantum * (1.0 + self.gain_cv * self.gain_cv) + self.electronic_noise_variance,
            incident,
        }
    }

    /// Photons incident on one pixel in each energy bin
    fn incident_counts<'a>(&'a self, fluence: &'a [f64]) -> impl Iterator<Item = Countsf64> + 'a {
        fluence.iter().zip(self.grid.weights()).map(move |(f, w)| self.area * w * f)
    }

    /// Swank information factor of the absorbed spectrum, M₁²/(M₀·M₂),
    /// including the single-energy gain spread.
    pub fn swank_factor(&self, fluence: &[f64]) -> f64 {
        let (mut m0, mut m1, mut m2) = (0.0, 0.0, 0.0);
        for (n, (eta, g)) in self.incident_counts(fluence).zip(self.efficiency.iter().zip(&self.gain)) {
            let absorbed = n * eta;
            m0 += absorbed;
            m1 += absorbed * g;
            m2 += absorbed * g * g;
        }
        m1 * m1 / (m0 * m2 * (1.0 + self.gain_cv * self.gain_cv))
    }

    /// Presampling modulation transfer function at `frequency` cycles/mm:
    /// square pixel aperture and Gaussian light spread.
    pub fn mtf(&self, frequency: f64) -> f64 {
        let x = PI * self.pitch_mm * frequency;
        let aperture = if x == 0.0 { 1.0 } else { (x.sin() / x).abs() };
        let s = self.blur_mm;
        aperture * (-2.0 * PI * PI * s * s * frequency * frequency).exp()
    }

    /// Detective quantum efficiency at `frequency` cycles/mm for a pixel
    /// exposed to `fluence`.
    ///
    /// Quantum noise is transferred by the MTF while electronic noise is
    /// white, so DQE(f) = M²T(f)² / (N_in·(Q·T(f)² + σₑ²)), where M is the
    /// mean signal, Q the quantum variance and N_in the incident count.
    pub fn dqe(&self, fluence: &[f64], frequency: f64) -> f64 {
        let PixelSignal { mean, variance, incident } = self.respond(fluence);
        let quantum = variance - self.electronic_noise_variance;
        let t2 = self.mtf(frequency).powi(2);
        mean * mean * t2 / (incident * (quantum * t2 + self.electronic_noise_variance))
    }

    /// DQE(0) for monoenergetic beams delivering `counts` photons per pixel
    /// at each grid energy.
    pub fn monoenergetic_dqe(&self, counts: Countsf64) -> Vec<(KeVf64, f64)> {
        let cv2 = 1.0 + self.gain_cv * self.gain_cv;
        self.grid.energies().iter().zip(self.efficiency.iter().zip(&self.gain))
            .map(|(&e, (&eta, &g))| {
                let mean = counts * eta * g;
                let variance = counts * eta * g * g * cv2 + self.electronic_noise_variance;
                let dqe = if mean == 0.0 { 0.0 } else { mean * mean / (variance * counts) };
                (e, dqe)
            })
            .collect()
    }
}

fn efficiency(absorption: &Absorption, grid: &EnergyGrid, materials: &MaterialTable) -> Result<Vec<f64>> {
    let fraction = |x: f64| x >= 0.0 && x <= 1.0;
    match absorption {
        Absorption::Flat(eta) => {
            if !fraction(*eta) {
                return Err(DesimError::parameter("detector.efficiency", format!("must lie in [0, 1], got {eta}")));
            }
            Ok(vec![*eta; grid.len()])
        },
        Absorption::Tabulated { energies, efficiency } => {
            if energies.len() != efficiency.len() || energies.len() < 2 {
                return Err(DesimError::parameter("detector.efficiency", format!(
                    "needs at least two (energy, efficiency) pairs, got {} energies and {} values",
                    energies.len(), efficiency.len())));
            }
            if let Some(w) = energies.windows(2).find(|w| !(w[1] > w[0])) {
                return Err(DesimError::parameter("detector.efficiency", format!(
                    "energies not strictly increasing at {} keV, {} keV", w[0], w[1])));
            }
            if let Some(bad) = efficiency.iter().find(|&&x| !fraction(x)) {
                return Err(DesimError::parameter("detector.efficiency", format!("must lie in [0, 1], got {bad}")));
            }
            let n = energies.len();
            Ok(grid.energies().iter().map(|&e| {
                if e <= energies[0]     { return efficiency[0] }
                if e >= energies[n - 1] { return efficiency[n - 1] }
                let j = energies.partition_point(|&x| x < e);
                let (e0, e1) = (energies[j - 1], energies[j]);
                efficiency[j - 1] + (efficiency[j] - efficiency[j - 1]) * (e - e0) / (e1 - e0)
            }).collect())
        },
        Absorption::Scintillator { material, thickness } => {
            let t = cm_(*thickness);
            if !(t >= 0.0 && t.is_finite()) {
                return Err(DesimError::parameter("detector.thickness", format!("must be non-negative, got {t} cm")));
            }
            let model = AttenuationModel::new(grid, materials, [material.as_str()])?;
            Ok(model.mu(material)?.iter().map(|mu| 1.0 - (-mu * t).exp()).collect())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use rstest::rstest;
    use units::{mm, um};

    fn grid() -> EnergyGrid { EnergyGrid::from_kev(vec![30.0, 40.0, 50.0, 60.0, 70.0]).unwrap() }

    fn response(params: &DetectorParameters) -> DetectorResponse {
        DetectorResponse::new(params, &grid(), &MaterialTable::builtin()).unwrap()
    }

    fn csi(thickness: Length) -> DetectorParameters {
        DetectorParameters {
            absorption: Absorption::Scintillator { material: "csi".into(), thickness },
            ..DetectorParameters::flat(1.0, mm(0.1))
        }
    }

    #[test]
    fn monoenergetic_beam() {
        // Single non-zero bin at 50 keV, weight 10 keV
        let params = DetectorParameters { conversion_gain: 2.0, ..DetectorParameters::flat(0.8, mm(1.0)) };
        let r = response(&params);
        let fluence = [0.0, 0.0, 100.0, 0.0, 0.0];
        let PixelSignal { mean, variance, incident } = r.respond(&fluence);
        assert_float_eq!(incident, 1000.0, r2nd <= 1e-12);
        assert_float_eq!(mean, 1000.0 * 0.8 * 100.0, r2nd <= 1e-12);
        assert_float_eq!(variance, 1000.0 * 0.8 * 100.0 * 100.0, r2nd <= 1e-12);
    }

    #[test]
    fn electronic_noise_is_additive() {
        let quiet = response(&DetectorParameters::flat(0.8, mm(1.0)));
        let noisy = response(&DetectorParameters { electronic_noise_variance: 42.0, ..DetectorParameters::flat(0.8, mm(1.0)) });
        let fluence = [1.0, 2.0, 3.0, 2.0, 1.0];
        let (q, n) = (quiet.respond(&fluence), noisy.respond(&fluence));
        assert_eq!(q.mean, n.mean);
        assert_float_eq!(n.variance - q.variance, 42.0, abs <= 1e-9);
    }

    #[test]
    fn photon_counting_variance_equals_mean_over_gain() {
        let params = DetectorParameters {
            gain_model: GainModel::PhotonCounting,
            conversion_gain: 3.0,
            ..DetectorParameters::flat(0.5, mm(1.0))
        };
        let s = response(&params).respond(&[1.0, 2.0, 3.0, 2.0, 1.0]);
        assert_float_eq!(s.variance, 3.0 * s.mean, r2nd <= 1e-12);
    }

    #[test]
    fn polyenergetic_variance_is_not_proportional_to_counts() {
        // Energy-weighted gain: variance/mean² exceeds 1/absorbed-count
        let r = response(&DetectorParameters::flat(1.0, mm(1.0)));
        let s = r.respond(&[1.0, 1.0, 1.0, 1.0, 1.0]);
        let absorbed = s.incident;
        assert!(s.variance / (s.mean * s.mean) > 1.0 / absorbed);
        let swank = r.swank_factor(&[1.0, 1.0, 1.0, 1.0, 1.0]);
        assert_float_eq!(s.mean * s.mean / s.variance, swank * absorbed, r2nd <= 1e-12);
    }

    #[test]
    fn swank_factor_of_monoenergetic_beam_is_one() {
        let r = response(&DetectorParameters::flat(0.7, mm(1.0)));
        assert_float_eq!(r.swank_factor(&[0.0, 5.0, 0.0, 0.0, 0.0]), 1.0, r2nd <= 1e-12);
        let r = response(&DetectorParameters { gain_cv: 0.5, ..DetectorParameters::flat(0.7, mm(1.0)) });
        assert_float_eq!(r.swank_factor(&[0.0, 5.0, 0.0, 0.0, 0.0]), 0.8, r2nd <= 1e-12);
    }

    #[test]
    fn thicker_scintillator_absorbs_more() {
        let thin  = response(&csi(um(200.0)));
        let thick = response(&csi(um(600.0)));
        for (a, b) in thin.efficiency().iter().zip(thick.efficiency()) {
            assert!(b > a);
            assert!(*b < 1.0);
        }
    }

    #[test]
    fn scintillator_efficiency_jumps_at_k_edge() {
        let grid = EnergyGrid::from_kev(vec![33.0, 34.0]).unwrap();
        let r = DetectorResponse::new(&csi(um(100.0)), &grid, &MaterialTable::builtin()).unwrap();
        assert!(r.efficiency()[1] > 1.5 * r.efficiency()[0], "{:?}", r.efficiency());
    }

    #[test]
    fn tabulated_efficiency_is_interpolated_and_held() {
        let params = DetectorParameters {
            absorption: Absorption::Tabulated { energies: vec![40.0, 60.0], efficiency: vec![0.8, 0.4] },
            ..DetectorParameters::flat(1.0, mm(1.0))
        };
        let eta = response(&params).efficiency().to_vec();
        for (got, want) in eta.iter().zip([0.8, 0.8, 0.6, 0.4, 0.4]) {
            assert_float_eq!(*got, want, abs <= 1e-12);
        }
    }

    #[test]
    fn mtf_is_one_at_zero_frequency_and_falls() {
        let r = response(&DetectorParameters { blur: mm(0.05), ..DetectorParameters::flat(1.0, mm(0.1)) });
        assert_eq!(r.mtf(0.0), 1.0);
        assert!(r.mtf(2.0) < 1.0);
        assert!(r.mtf(4.0) < r.mtf(2.0));
        // First zero of the aperture at 1/pitch
        assert_float_eq!(r.mtf(10.0), 0.0, abs <= 1e-12);
    }

    #[test]
    fn dqe_of_ideal_detector_equals_swank_times_efficiency() {
        let r = response(&DetectorParameters::flat(0.8, mm(1.0)));
        let fluence = [1.0, 2.0, 3.0, 2.0, 1.0];
        assert_float_eq!(r.dqe(&fluence, 0.0), 0.8 * r.swank_factor(&fluence), r2nd <= 1e-12);
    }

    #[test]
    fn electronic_noise_lowers_dqe_at_high_frequency() {
        let r = response(&DetectorParameters {
            electronic_noise_variance: 1e4,
            ..DetectorParameters::flat(0.8, mm(0.1))
        });
        let fluence = [1e3; 5];
        assert!(r.dqe(&fluence, 3.0) < r.dqe(&fluence, 0.0));
    }

    #[test]
    fn monoenergetic_dqe_is_efficiency_without_noise() {
        let r = response(&csi(um(500.0)));
        for ((_, dqe), eta) in r.monoenergetic_dqe(1e4).iter().zip(r.efficiency()) {
            assert_float_eq!(*dqe, *eta, r2nd <= 1e-12);
        }
    }

    #[rstest(/**/ params,
             case(DetectorParameters::flat(1.5, mm(0.1))),
             case(DetectorParameters::flat(0.5, mm(0.0))),
             case(DetectorParameters { conversion_gain: 0.0, ..DetectorParameters::flat(0.5, mm(0.1)) }),
             case(DetectorParameters { gain_cv: -0.1, ..DetectorParameters::flat(0.5, mm(0.1)) }),
             case(DetectorParameters { electronic_noise_variance: -1.0, ..DetectorParameters::flat(0.5, mm(0.1)) }),
             case(csi(um(-1.0))),
    )]
    fn invalid_parameters_are_rejected(params: DetectorParameters) {
        let result = DetectorResponse::new(&params, &grid(), &MaterialTable::builtin());
        assert!(matches!(result, Err(DesimError::InvalidParameter { .. })), "{result:?}");
    }

    #[test]
    fn unknown_scintillator_is_rejected() {
        let params = DetectorParameters {
            absorption: Absorption::Scintillator { material: "gadox".into(), thickness: um(200.0) },
            ..DetectorParameters::flat(1.0, mm(0.1))
        };
        let result = DetectorResponse::new(&params, &grid(), &MaterialTable::builtin());
        assert!(matches!(result, Err(DesimError::UnknownMaterial { .. })));
    }
}
