//! The parameter set of one simulation run, as read from TOML or built in
//! code, and its translation into the domain types of the pipeline.

use std::ops::Range;

use serde::Deserialize;
use units::{cm, degree, kev, kv, mm, Angle, ElectricPotential, Energy, Length};

use crate::{DesimError, Result};
use crate::attenuation::Layer;
use crate::config::de::{deserialize_uom, deserialize_uom_opt};
use crate::decomposition::SolverSettings;
use crate::detector::{Absorption, DetectorParameters, GainModel};
use crate::fom::{VarianceEstimate, ROI};
use crate::grid::EnergyGrid;
use crate::imaging::Channel;
use crate::material::{Material, MaterialTable};
use crate::phantom::{Phantom, Region, StepWedge, BACKGROUND};
use crate::spectrum::{Normalization, Source, Tube};
use crate::types::{Countsf64, KeVf64, Pair};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpectrumSource {
    #[default]
    AnalyticModel,
    Tabulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoiseMode {
    /// Images carry the modeled mean and variance only
    #[default]
    AnalyticVariance,
    /// Images are replaced by a noisy instance drawn with `seed`
    SeededRealization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Metric {
    Snr,
    Cnr,
    Dqe,
    Decomposition,
    Subtraction,
}

impl Metric {
    pub const ALL: [Metric; 5] = [Metric::Snr, Metric::Cnr, Metric::Dqe, Metric::Decomposition, Metric::Subtraction];
}

fn all_metrics() -> Vec<Metric> { Metric::ALL.to_vec() }

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {

    #[serde(default)]
    pub spectrum_source: SpectrumSource,

    #[serde(default)]
    pub noise_mode: NoiseMode,

    /// Required by `seeded-realization`
    #[serde(default)]
    pub seed: Option<u64>,

    /// Two material names. No decomposition without it.
    #[serde(default)]
    pub decomposition_basis: Option<Pair<String>>,

    #[serde(default = "all_metrics")]
    pub metrics: Vec<Metric>,

    #[serde(default)]
    pub grid: GridConfig,

    pub low: SourceConfig,
    pub high: SourceConfig,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub phantom: PhantomConfig,

    #[serde(default)]
    pub rois: Vec<RoiConfig>,

    #[serde(default)]
    pub roi_variance: VarianceEstimate,

    #[serde(default)]
    pub solver: SolverSettings,

    #[serde(default)]
    pub dqe: DqeConfig,

    /// Materials added to (or replacing) the built-in ones
    #[serde(default)]
    pub materials: Vec<MaterialConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridConfig {
    #[serde(deserialize_with = "deserialize_uom")]
    pub min: Energy,
    #[serde(deserialize_with = "deserialize_uom")]
    pub max: Energy,
    #[serde(deserialize_with = "deserialize_uom")]
    pub step: Energy,
}

impl Default for GridConfig {
    fn default() -> Self { Self { min: kev(10.0), max: kev(150.0), step: kev(1.0) } }
}

/// One X-ray source. Which fields are used depends on `spectrum_source`:
/// `kvp`, `mas`, `sid`, `anode_angle` and `inherent_filtration` for the
/// analytic model, `energies_kev` and `fluence` for tabulated spectra.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {

    #[serde(default)]
    #[serde(deserialize_with = "deserialize_uom_opt")]
    pub kvp: Option<ElectricPotential>,

    #[serde(default = "default_mas")]
    pub mas: f64,

    #[serde(default = "default_sid")]
    #[serde(deserialize_with = "deserialize_uom")]
    pub sid: Length,

    #[serde(default = "default_anode_angle")]
    #[serde(deserialize_with = "deserialize_uom")]
    pub anode_angle: Angle,

    #[serde(default = "default_inherent_filtration")]
    pub inherent_filtration: Vec<Layer>,

    #[serde(default)]
    pub filtration: Vec<Layer>,

    /// Rescale the filtered spectrum to this many photons/mm²
    #[serde(default)]
    pub total_fluence: Option<f64>,

    #[serde(default)]
    pub energies_kev: Vec<KeVf64>,

    /// photons/(mm²·keV) at `energies_kev`
    #[serde(default)]
    pub fluence: Vec<f64>,
}

fn default_mas() -> f64 { 1.0 }
fn default_sid() -> Length { cm(100.0) }
fn default_anode_angle() -> Angle { degree(12.0) }
fn default_inherent_filtration() -> Vec<Layer> { vec![Layer::new("aluminum", mm(1.6))] }

impl SourceConfig {

    /// Analytic tube source with the default geometry
    pub fn tube(kvp: ElectricPotential, mas: f64) -> Self {
        Self {
            kvp: Some(kvp),
            mas,
            sid: default_sid(),
            anode_angle: default_anode_angle(),
            inherent_filtration: default_inherent_filtration(),
            filtration: vec![],
            total_fluence: None,
            energies_kev: vec![],
            fluence: vec![],
        }
    }

    pub fn source(&self, kind: SpectrumSource, channel: Channel) -> Result<Source> {
        let source = match kind {
            SpectrumSource::AnalyticModel => {
                let kvp = self.kvp.ok_or_else(|| DesimError::spectrum(
                    format!("{channel}.kvp"), "required by the analytic model"))?;
                Source::analytic(Tube {
                    kvp,
                    mas: self.mas,
                    sid: self.sid,
                    anode_angle: self.anode_angle,
                    inherent_filtration: self.inherent_filtration.clone(),
                })
            },
            SpectrumSource::Tabulated => {
                if self.energies_kev.is_empty() {
                    return Err(DesimError::spectrum(format!("{channel}.energies_kev"), "required by tabulated spectra"));
                }
                Source::tabulated(self.energies_kev.clone(), self.fluence.clone())
            },
        };
        let source = self.filtration.iter().cloned().fold(source, Source::filtered);
        Ok(match self.total_fluence {
            Some(total) => source.normalized(Normalization::TotalFluence(total)),
            None        => source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EfficiencyTable {
    pub energies_kev: Vec<KeVf64>,
    pub efficiency: Vec<f64>,
}

/// At most one of `efficiency`, `efficiency_table` and `scintillator` may be
/// given. Without any of them the detector is 500 µm of CsI.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectorConfig {

    #[serde(default)]
    pub efficiency: Option<f64>,

    #[serde(default)]
    pub efficiency_table: Option<EfficiencyTable>,

    #[serde(default)]
    pub scintillator: Option<Layer>,

    #[serde(default)]
    pub gain_model: GainModel,

    #[serde(default = "default_conversion_gain")]
    pub conversion_gain: f64,

    #[serde(default)]
    pub gain_cv: f64,

    #[serde(default)]
    pub electronic_noise_variance: f64,

    #[serde(default = "default_pixel_pitch")]
    #[serde(deserialize_with = "deserialize_uom")]
    pub pixel_pitch: Length,

    #[serde(default = "default_blur")]
    #[serde(deserialize_with = "deserialize_uom")]
    pub blur: Length,
}

fn default_conversion_gain() -> f64 { 1.0 }
fn default_pixel_pitch() -> Length { mm(0.1) }
fn default_blur() -> Length { mm(0.0) }
fn default_scintillator() -> Layer { Layer::new("csi", mm(0.5)) }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            efficiency: None,
            efficiency_table: None,
            scintillator: None,
            gain_model: GainModel::default(),
            conversion_gain: default_conversion_gain(),
            gain_cv: 0.0,
            electronic_noise_variance: 0.0,
            pixel_pitch: default_pixel_pitch(),
            blur: default_blur(),
        }
    }
}

impl DetectorConfig {

    pub fn flat(efficiency: f64) -> Self { Self { efficiency: Some(efficiency), ..Self::default() } }

    pub fn parameters(&self) -> Result<DetectorParameters> {
        let absorption = match (self.efficiency, &self.efficiency_table, &self.scintillator) {
            (Some(eta), None, None) => Absorption::Flat(eta),
            (None, Some(table), None) => Absorption::Tabulated {
                energies: table.energies_kev.clone(),
                efficiency: table.efficiency.clone(),
            },
            (None, None, scintillator) => {
                let Layer { material, thickness } = scintillator.clone().unwrap_or_else(default_scintillator);
                Absorption::Scintillator { material, thickness }
            },
            _ => return Err(DesimError::parameter(
                "detector", "give at most one of `efficiency`, `efficiency_table` and `scintillator`")),
        };
        Ok(DetectorParameters {
            absorption,
            gain_model: self.gain_model,
            conversion_gain: self.conversion_gain,
            gain_cv: self.gain_cv,
            electronic_noise_variance: self.electronic_noise_variance,
            pixel_pitch: self.pixel_pitch,
            blur: self.blur,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WedgeConfig {
    pub name: String,
    pub material: String,
    #[serde(deserialize_with = "deserialize_uom")]
    pub step: Length,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionConfig {
    pub name: String,
    #[serde(default)]
    pub layers: Vec<Layer>,
}

/// Either step wedges, or named regions arranged by `layout`, or (with
/// neither) a uniform `block`×`block` slab of the base layers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhantomConfig {

    #[serde(default)]
    pub base: Vec<Layer>,

    /// Pixels along each side of a feature
    #[serde(default = "default_block")]
    pub block: usize,

    #[serde(default)]
    pub wedges: Vec<WedgeConfig>,

    #[serde(default)]
    pub regions: Vec<RegionConfig>,

    #[serde(default)]
    pub layout: Option<Vec<Vec<String>>>,
}

fn default_block() -> usize { 8 }

impl Default for PhantomConfig {
    /// The step-wedge phantom of the reference dashboard settings
    fn default() -> Self {
        Self {
            base: vec![Layer::new("pmma", mm(73.0)), Layer::new("aluminum", mm(4.1))],
            block: default_block(),
            wedges: vec![
                WedgeConfig { name: "soft".into(), material: "pmma"    .into(), step: mm(2.0), count: 5 },
                WedgeConfig { name: "hard".into(), material: "aluminum".into(), step: mm(0.5), count: 5 },
            ],
            regions: vec![],
            layout: None,
        }
    }
}

impl PhantomConfig {

    pub fn uniform(base: Vec<Layer>, block: usize) -> Self {
        Self { base, block, wedges: vec![], regions: vec![], layout: None }
    }

    pub fn phantom(&self) -> Result<Phantom> {
        let base = self.base.clone();
        match (&self.layout, self.wedges.is_empty()) {
            (Some(_), false) => Err(DesimError::parameter("phantom", "give either `wedges` or `layout`, not both")),
            (Some(layout), true) => {
                let mut regions: Vec<Region> = self.regions.iter()
                    .map(|r| Region::new(&r.name, r.layers.clone()))
                    .collect();
                if !regions.iter().any(|r| r.name == BACKGROUND) {
                    regions.insert(0, Region::new(BACKGROUND, vec![]));
                }
                Phantom::from_layout(base, regions, layout, self.block)
            },
            (None, false) => {
                let wedges: Vec<_> = self.wedges.iter()
                    .map(|w| StepWedge::new(&w.name, &w.material, w.step, w.count))
                    .collect();
                Phantom::step_wedges(base, &wedges, self.block)
            },
            (None, true) => {
                if !self.regions.is_empty() {
                    return Err(DesimError::parameter("phantom.regions", "need a `layout`"));
                }
                Phantom::uniform(base, [self.block, self.block])
            },
        }
    }
}

/// Pixels of an ROI: a phantom region, a rectangle or an explicit list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged, deny_unknown_fields)]
pub enum RoiSpec {
    Region {
        region: String,
    },
    Rect {
        rows: [usize; 2],
        cols: [usize; 2],
    },
    Pixels {
        pixels: Vec<[usize; 2]>,
    },
}

impl RoiSpec {
    pub fn region(name: impl Into<String>) -> Self { Self::Region { region: name.into() } }

    pub fn roi(&self) -> ROI {
        let range = |[a, b]: [usize; 2]| -> Range<usize> { a..b };
        match self {
            RoiSpec::Region { region }  => ROI::Region(region.clone()),
            RoiSpec::Rect { rows, cols } => ROI::Rect { rows: range(*rows), cols: range(*cols) },
            RoiSpec::Pixels { pixels }  => ROI::Pixels(pixels.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoiConfig {
    pub name: String,
    pub foreground: RoiSpec,
    /// Needed for CNR
    #[serde(default)]
    pub background: Option<RoiSpec>,
}

impl RoiConfig {
    pub fn against_background(name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            foreground: RoiSpec::region(region),
            background: Some(RoiSpec::region(BACKGROUND)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DqeConfig {
    /// Spatial frequencies, cycles/mm, at which DQE(f) is reported
    #[serde(default = "default_frequencies")]
    pub frequencies: Vec<f64>,
    /// Incident photons per pixel for the monoenergetic DQE curve
    #[serde(default = "default_reference_counts")]
    pub reference_counts: Countsf64,
}

fn default_frequencies() -> Vec<f64> { (0..=10).map(|i| i as f64 * 0.5).collect() }
fn default_reference_counts() -> Countsf64 { 1e4 }

impl Default for DqeConfig {
    fn default() -> Self { Self { frequencies: default_frequencies(), reference_counts: default_reference_counts() } }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaterialConfig {
    pub name: String,
    pub density_g_cm3: f64,
    pub energies_kev: Vec<KeVf64>,
    pub mu_rho_cm2_g: Vec<f64>,
}

impl MaterialConfig {
    pub fn material(&self) -> Result<Material> {
        if self.energies_kev.len() != self.mu_rho_cm2_g.len() {
            return Err(DesimError::material(&self.name, format!(
                "{} energies but {} attenuation coefficients", self.energies_kev.len(), self.mu_rho_cm2_g.len())));
        }
        let points: Vec<_> = self.energies_kev.iter().copied().zip(self.mu_rho_cm2_g.iter().copied()).collect();
        Material::from_points(&self.name, self.density_g_cm3, &points)
    }
}

impl Default for Scenario {
    /// The reference dashboard settings: 60/120 kVp at 2.5 mAs and 180 cm,
    /// CsI detector, PMMA and aluminium step wedges.
    fn default() -> Self {
        let source = |kvp| SourceConfig { sid: cm(180.0), ..SourceConfig::tube(kv(kvp), 2.5) };
        Self {
            spectrum_source: SpectrumSource::default(),
            noise_mode: NoiseMode::default(),
            seed: None,
            decomposition_basis: Some(["pmma".into(), "aluminum".into()]),
            metrics: all_metrics(),
            grid: GridConfig::default(),
            low: source(60.0),
            high: source(120.0),
            detector: DetectorConfig::default(),
            phantom: PhantomConfig::default(),
            rois: vec![
                RoiConfig::against_background("soft[3]", "soft[3]"),
                RoiConfig::against_background("hard[3]", "hard[3]"),
            ],
            roi_variance: VarianceEstimate::default(),
            solver: SolverSettings::default(),
            dqe: DqeConfig::default(),
            materials: vec![],
        }
    }
}

impl Scenario {

    pub fn wants(&self, metric: Metric) -> bool { self.metrics.contains(&metric) }

    pub fn grid(&self) -> Result<EnergyGrid> {
        EnergyGrid::uniform(self.grid.min, self.grid.max, self.grid.step)
    }

    /// (low, high) sources
    pub fn sources(&self) -> Result<Pair<Source>> {
        Ok([self.low .source(self.spectrum_source, Channel::Low )?,
            self.high.source(self.spectrum_source, Channel::High)?])
    }

    /// `builtin` extended with the scenario's own materials
    pub fn material_table(&self, builtin: &MaterialTable) -> Result<MaterialTable> {
        self.materials.iter().try_fold(builtin.clone(), |table, m| Ok(table.with(m.material()?)))
    }

    /// The seed of a realization, if one is requested
    pub fn realization_seed(&self) -> Result<Option<u64>> {
        match (self.noise_mode, self.seed) {
            (NoiseMode::AnalyticVariance , _      ) => Ok(None),
            (NoiseMode::SeededRealization, Some(s)) => Ok(Some(s)),
            (NoiseMode::SeededRealization, None   ) => Err(DesimError::parameter(
                "seed", "required by noise_mode = \"seeded-realization\"")),
        }
    }
}
