//! X-ray source spectra.
//!
//! A `Spectrum` is the photon fluence per unit energy, in photons/(mm²·keV),
//! incident on the object plane, sampled on the run's `EnergyGrid`. It is
//! produced once per channel from a `Source` and never modified afterwards:
//! the operations below return new spectra.

use units::{cm_, degree_, kv_, mm, radian_, Angle, ElectricPotential, Length};

use crate::{DesimError, Result};
use crate::attenuation::{AttenuationModel, Layer};
use crate::grid::EnergyGrid;
use crate::material::MaterialTable;
use crate::types::{Fluencef64, KeVf64, SpectralFluencef64, REFERENCE_SID_CM};

/// Bremsstrahlung yield of a thick target per unit atomic number, in
/// photons/(keV·mAs·mm²) at `REFERENCE_SID_CM`. Calibrated so that an 80 kVp
/// beam behind 2.5 mm Al delivers of the order of 10⁵ photons/(mm²·mAs) at
/// 1 m.
pub const KRAMERS_YIELD: f64 = 40.0;

/// The anode material
pub const TUNGSTEN: &str = "tungsten";
const TUNGSTEN_Z: f64 = 74.0;
const TUNGSTEN_A: f64 = 183.84;
const TUNGSTEN_DENSITY: f64 = 19.3;

#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    grid: EnergyGrid,
    fluence: Vec<SpectralFluencef64>,
}

impl Spectrum {

    pub fn new(grid: EnergyGrid, fluence: Vec<SpectralFluencef64>) -> Result<Self> {
        if fluence.len() != grid.len() {
            return Err(DesimError::spectrum("fluence", format!(
                "{} values for {} grid energies", fluence.len(), grid.len())));
        }
        if let Some(bad) = fluence.iter().find(|&&f| !(f >= 0.0 && f.is_finite())) {
            return Err(DesimError::spectrum("fluence", format!("must be non-negative and finite, got {bad}")));
        }
        if fluence.iter().all(|&f| f == 0.0) {
            return Err(DesimError::spectrum("fluence", "spectrum has no photons on the energy grid"));
        }
        Ok(Self { grid, fluence })
    }

    pub fn grid    (&self) -> &EnergyGrid              { &self.grid }
    pub fn energies(&self) -> &[KeVf64]                { self.grid.energies() }
    pub fn fluence (&self) -> &[SpectralFluencef64]    { &self.fluence }

    /// Photons per mm²
    pub fn total_fluence(&self) -> Fluencef64 {
        self.grid.integrate(self.fluence.iter().copied())
    }

    /// Fluence-weighted mean photon energy
    pub fn mean_energy(&self) -> KeVf64 {
        let e = self.grid.integrate(self.fluence.iter().zip(self.energies()).map(|(f, e)| f * e));
        e / self.total_fluence()
    }

    /// Fluence multiplied by `transmission`, energy by energy. The result may
    /// be entirely zero, so it is not checked like `new`.
    pub fn attenuated(&self, transmission: &[f64]) -> Self {
        let fluence = self.fluence.iter().zip(transmission).map(|(f, t)| f * t).collect();
        Self { grid: self.grid.clone(), fluence }
    }

    /// Same spectral shape, `factor` times the fluence
    pub fn scaled(&self, factor: f64) -> Self {
        Self { grid: self.grid.clone(), fluence: self.fluence.iter().map(|f| f * factor).collect() }
    }

    fn normalized_to(self, total: Fluencef64) -> Self {
        let factor = total / self.total_fluence();
        self.scaled(factor)
    }
}

/// Where the unfiltered spectrum comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceModel {
    /// Kramers' law for a tungsten anode.
    Analytic(Tube),
    /// Spectral fluence in photons/(mm²·keV) at the given energies (keV),
    /// resampled linearly onto the grid and taken as zero outside the table.
    Tabulated { energies: Vec<KeVf64>, fluence: Vec<SpectralFluencef64> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tube {
    pub kvp: ElectricPotential,
    /// Tube current-time product
    pub mas: f64,
    /// Source-to-imager distance
    pub sid: Length,
    /// Angle between the anode surface and the central ray
    pub anode_angle: Angle,
    /// Filtration built into the tube housing
    pub inherent_filtration: Vec<Layer>,
}

impl Tube {
    pub fn new(kvp: ElectricPotential, mas: f64, sid: Length) -> Self {
        Self {
            kvp, mas, sid,
            anode_angle: units::degree(12.0),
            inherent_filtration: vec![Layer::new("aluminum", mm(1.6))],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalization {
    /// Keep the fluence the source model produces
    Absolute,
    /// Rescale to this many photons/mm² after filtration
    TotalFluence(Fluencef64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub model: SourceModel,
    /// Filtration added in front of the tube
    pub filtration: Vec<Layer>,
    pub normalization: Normalization,
}

impl Source {

    pub fn analytic(tube: Tube) -> Self {
        Self { model: SourceModel::Analytic(tube), filtration: vec![], normalization: Normalization::Absolute }
    }

    pub fn tabulated(energies: Vec<KeVf64>, fluence: Vec<SpectralFluencef64>) -> Self {
        Self {
            model: SourceModel::Tabulated { energies, fluence },
            filtration: vec![],
            normalization: Normalization::Absolute,
        }
    }

    pub fn filtered(mut self, layer: Layer) -> Self {
        self.filtration.push(layer);
        self
    }

    pub fn normalized(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Names of all materials needed to produce this spectrum
    pub fn materials(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.filtration.iter().map(|l| l.material.as_str()).collect();
        if let SourceModel::Analytic(tube) = &self.model {
            names.push(TUNGSTEN);
            names.extend(tube.inherent_filtration.iter().map(|l| l.material.as_str()));
        }
        names
    }

    /// The filtered, normalized spectrum of this source on `grid`.
    pub fn spectrum(&self, grid: &EnergyGrid, materials: &MaterialTable) -> Result<Spectrum> {
        let mut filtration = self.filtration.clone();
        let raw = match &self.model {
            SourceModel::Analytic(tube) => {
                tube.validate()?;
                filtration.extend(tube.inherent_filtration.iter().cloned());
                filtration.push(Layer::new(TUNGSTEN, tube.self_filtration()));
                tube.kramers(grid)
            },
            SourceModel::Tabulated { energies, fluence } => resample(energies, fluence, grid)?,
        };
        for layer in &filtration {
            let t = cm_(layer.thickness);
            if !(t >= 0.0 && t.is_finite()) {
                return Err(DesimError::spectrum(
                    format!("filtration ({})", layer.material),
                    format!("thickness must be non-negative, got {t} cm")));
            }
        }
        if let Normalization::TotalFluence(total) = self.normalization {
            if !(total > 0.0 && total.is_finite()) {
                return Err(DesimError::spectrum("total_fluence", format!("must be positive, got {total}")));
            }
        }
        let attenuation = AttenuationModel::new(grid, materials, filtration.iter().map(|l| l.material.as_str()))?;
        let transmission = attenuation.transmission(&filtration)?;
        let fluence = raw.iter().zip(transmission).map(|(f, t)| f * t).collect();
        let spectrum = Spectrum::new(grid.clone(), fluence)?;
        Ok(match self.normalization {
            Normalization::Absolute          => spectrum,
            Normalization::TotalFluence(tot) => spectrum.normalized_to(tot),
        })
    }
}

impl Tube {

    fn validate(&self) -> Result<()> {
        let kvp = kv_(self.kvp);
        if !(kvp > 0.0 && kvp.is_finite()) {
            return Err(DesimError::spectrum("kvp", format!("must be positive, got {kvp} kV")));
        }
        if !(self.mas > 0.0 && self.mas.is_finite()) {
            return Err(DesimError::spectrum("mas", format!("must be positive, got {}", self.mas)));
        }
        let sid = cm_(self.sid);
        if !(sid > 0.0 && sid.is_finite()) {
            return Err(DesimError::spectrum("sid", format!("must be positive, got {sid} cm")));
        }
        let angle = degree_(self.anode_angle);
        if !(angle > 0.0 && angle <= 90.0) {
            return Err(DesimError::spectrum("anode_angle", format!("must lie in (0°, 90°], got {angle}°")));
        }
        Ok(())
    }

    /// Unfiltered Kramers spectrum, K·Z·(E₀−E)/E, scaled by exposure and
    /// inverse square distance.
    fn kramers(&self, grid: &EnergyGrid) -> Vec<SpectralFluencef64> {
        let e0 = kv_(self.kvp);
        let scale = KRAMERS_YIELD * TUNGSTEN_Z * self.mas * (REFERENCE_SID_CM / cm_(self.sid)).powi(2);
        if e0 > grid.energies()[grid.len() - 1] {
            log::warn!("{e0} kVp spectrum truncated at the top of the energy grid");
        }
        grid.energies().iter()
            .map(|&e| if e < e0 { scale * (e0 - e) / e } else { 0.0 })
            .collect()
    }

    /// Mean path of photons through the anode: a third of the Kanaya–Okayama
    /// electron range, seen through the anode angle.
    fn self_filtration(&self) -> Length {
        let e0 = kv_(self.kvp);
        let range_um = 0.0276 * TUNGSTEN_A * e0.powf(1.67) / (TUNGSTEN_Z.powf(0.889) * TUNGSTEN_DENSITY);
        units::um(range_um / 3.0 / radian_(self.anode_angle).sin())
    }
}

fn resample(energies: &[KeVf64], fluence: &[SpectralFluencef64], grid: &EnergyGrid) -> Result<Vec<SpectralFluencef64>> {
    if energies.len() != fluence.len() {
        return Err(DesimError::spectrum("tabulated", format!(
            "{} energies but {} fluence values", energies.len(), fluence.len())));
    }
    if energies.len() < 2 {
        return Err(DesimError::spectrum("tabulated", "needs at least two points"));
    }
    if let Some(w) = energies.windows(2).find(|w| !(w[1] > w[0])) {
        return Err(DesimError::spectrum("tabulated", format!(
            "energies not strictly increasing at {} keV, {} keV", w[0], w[1])));
    }
    if let Some(bad) = fluence.iter().find(|&&f| !(f >= 0.0 && f.is_finite())) {
        return Err(DesimError::spectrum("tabulated", format!("fluence must be non-negative, got {bad}")));
    }
    let n = energies.len();
    Ok(grid.energies().iter().map(|&e| {
        if e < energies[0] || e > energies[n - 1] { return 0.0 }
        let j = energies.partition_point(|&x| x < e).max(1);
        let (e0, e1, f0, f1) = (energies[j - 1], energies[j], fluence[j - 1], fluence[j]);
        f0 + (f1 - f0) * (e - e0) / (e1 - e0)
    }).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use rstest::rstest;
    use units::{cm, degree, kv};

    fn tube(kvp: f64) -> Tube { Tube::new(kv(kvp), 2.5, cm(180.0)) }

    fn build(source: &Source) -> Result<Spectrum> {
        source.spectrum(&EnergyGrid::default(), &MaterialTable::builtin())
    }

    #[test]
    fn analytic_spectrum_ends_at_peak_voltage() {
        let s = build(&Source::analytic(tube(60.0))).unwrap();
        for (e, f) in s.energies().iter().zip(s.fluence()) {
            if *e >= 60.0 { assert_eq!(*f, 0.0, "{e} keV") }
            else          { assert!(*f > 0.0, "{e} keV") }
        }
    }

    #[test]
    fn fluence_is_proportional_to_mas() {
        let one = build(&Source::analytic(Tube { mas: 1.0, ..tube(80.0) })).unwrap();
        let ten = build(&Source::analytic(Tube { mas: 10.0, ..tube(80.0) })).unwrap();
        assert_float_eq!(ten.total_fluence(), 10.0 * one.total_fluence(), r2nd <= 1e-12);
    }

    #[test]
    fn fluence_follows_inverse_square_law() {
        let near = build(&Source::analytic(Tube { sid: cm(100.0), ..tube(80.0) })).unwrap();
        let far  = build(&Source::analytic(Tube { sid: cm(200.0), ..tube(80.0) })).unwrap();
        assert_float_eq!(near.total_fluence(), 4.0 * far.total_fluence(), r2nd <= 1e-12);
    }

    #[test]
    fn fluence_is_of_plausible_magnitude() {
        let s = build(&Source::analytic(Tube { mas: 1.0, sid: cm(100.0), ..tube(80.0) })
                      .filtered(Layer::new("aluminum", mm(0.9)))).unwrap();
        let total = s.total_fluence();
        assert!(total > 1e4 && total < 1e6, "{total}");
    }

    #[test]
    fn filtration_hardens_the_beam() {
        let bare     = build(&Source::analytic(tube(120.0))).unwrap();
        let filtered = build(&Source::analytic(tube(120.0)).filtered(Layer::new("copper", mm(0.2)))).unwrap();
        assert!(filtered.mean_energy() > bare.mean_energy());
        assert!(filtered.total_fluence() < bare.total_fluence());
    }

    #[test]
    fn steeper_anode_angle_filters_less() {
        let shallow = build(&Source::analytic(Tube { anode_angle: degree( 6.0), ..tube(80.0) })).unwrap();
        let steep   = build(&Source::analytic(Tube { anode_angle: degree(20.0), ..tube(80.0) })).unwrap();
        assert!(steep.total_fluence() > shallow.total_fluence());
    }

    #[test]
    fn higher_voltage_gives_harder_spectrum() {
        let low  = build(&Source::analytic(tube( 60.0))).unwrap();
        let high = build(&Source::analytic(tube(120.0))).unwrap();
        assert!(high.mean_energy() > low.mean_energy());
    }

    #[rstest(/**/ source, parameter,
             case(Source::analytic(tube(0.0)), "kvp"),
             case(Source::analytic(tube(-60.0)), "kvp"),
             case(Source::analytic(Tube { mas: 0.0, ..tube(60.0) }), "mas"),
             case(Source::analytic(Tube { sid: cm(0.0), ..tube(60.0) }), "sid"),
             case(Source::analytic(Tube { anode_angle: degree(0.0), ..tube(60.0) }), "anode_angle"),
             case(Source::analytic(Tube { anode_angle: degree(95.0), ..tube(60.0) }), "anode_angle"),
             case(Source::analytic(tube(60.0)).filtered(Layer::new("aluminum", mm(-1.0))), "filtration (aluminum)"),
             case(Source::analytic(tube(60.0)).normalized(Normalization::TotalFluence(0.0)), "total_fluence"),
             case(Source::tabulated(vec![20.0, 40.0, 30.0], vec![1.0, 2.0, 3.0]), "tabulated"),
             case(Source::tabulated(vec![20.0, 20.0], vec![1.0, 2.0]), "tabulated"),
             case(Source::tabulated(vec![20.0, 40.0], vec![1.0]), "tabulated"),
             case(Source::tabulated(vec![20.0, 40.0], vec![1.0, -1.0]), "tabulated"),
             case(Source::analytic(tube(8.0)), "fluence"),
    )]
    fn invalid_parameters_are_rejected(source: Source, parameter: &str) {
        match build(&source) {
            Err(DesimError::InvalidSpectrumParameters { parameter: p, .. }) => assert_eq!(p, parameter),
            other => panic!("expected InvalidSpectrumParameters, got {other:?}"),
        }
    }

    #[test]
    fn tabulated_spectrum_is_resampled_linearly() {
        let s = build(&Source::tabulated(vec![20.0, 40.0], vec![100.0, 300.0])).unwrap();
        let at = |e: f64| s.fluence()[s.energies().iter().position(|&x| x == e).unwrap()];
        assert_eq!(at(19.0), 0.0);
        assert_float_eq!(at(20.0), 100.0, r2nd <= 1e-12);
        assert_float_eq!(at(25.0), 150.0, r2nd <= 1e-12);
        assert_float_eq!(at(40.0), 300.0, r2nd <= 1e-12);
        assert_eq!(at(41.0), 0.0);
    }

    #[test]
    fn normalization_fixes_total_fluence() {
        let s = build(&Source::analytic(tube(90.0)).normalized(Normalization::TotalFluence(1e5))).unwrap();
        assert_float_eq!(s.total_fluence(), 1e5, r2nd <= 1e-12);
    }

    #[test]
    fn spectra_are_reproducible() {
        let source = Source::analytic(tube(70.0)).filtered(Layer::new("copper", mm(0.1)));
        assert_eq!(build(&source).unwrap(), build(&source).unwrap());
    }

    #[test]
    fn missing_filter_material_is_unknown() {
        let result = build(&Source::analytic(tube(70.0)).filtered(Layer::new("lead", mm(0.1))));
        assert!(matches!(result, Err(DesimError::UnknownMaterial { .. })));
    }
}
