//! One simulation run: from a `Scenario` to a `MetricReport`.
//!
//! Every parameter is checked, and every ROI resolved to pixels, before any
//! image is formed. A run keeps no state beyond its own locals, so runs may
//! proceed concurrently and an abandoned run needs no cleanup.

use log::{debug, info, warn};

use crate::{DesimError, Result};
use crate::attenuation::AttenuationModel;
use crate::config::scenario::{Metric, RoiSpec, Scenario};
use crate::decomposition::{decompose, DecompositionResult};
use crate::detector::DetectorResponse;
use crate::fom::{self, DecompositionError, RoiStats, VarianceEstimate};
use crate::imaging::{realize::realize_pair, Channel, ForwardModel, ImageFormation, ImagePair};
use crate::material::MaterialTable;
use crate::spectrum::Spectrum;
use crate::subtraction::{wedge_tables, WedgeTable};
use crate::types::{Index2, KeVf64, Pair};
use crate::utils::group_digits;

/// ROI metrics in one channel. Metrics that were not requested, or that need
/// a background the ROI lacks, are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiChannelReport {
    pub channel: Channel,
    pub foreground: RoiStats,
    pub background: Option<RoiStats>,
    pub snr: Option<f64>,
    pub cnr: Option<f64>,
    pub dqe: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoiReport {
    pub name: String,
    pub channels: Pair<RoiChannelReport>,
    /// Decomposition error over the foreground pixels
    pub decomposition: Option<DecompositionError>,
}

impl RoiReport {
    /// Too few samples in the foreground or background for the metrics to
    /// be trusted
    pub fn low_confidence(&self) -> bool {
        self.channels.iter().any(|c| {
            c.foreground.low_confidence() || c.background.map_or(false, |b| b.low_confidence())
        })
    }
}

/// Detector characterization with the unattenuated beams
#[derive(Debug, Clone, PartialEq)]
pub struct DqeReport {
    /// (cycles/mm, DQE(f) of the (low, high) beams)
    pub frequency: Vec<(f64, Pair<f64>)>,
    pub swank: Pair<f64>,
    /// DQE(0) of monoenergetic beams
    pub monoenergetic: Vec<(KeVf64, f64)>,
}

/// Everything a run produces, together with the scenario that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricReport {
    pub scenario: Scenario,
    /// (low, high) spectra reaching the object
    pub spectra: Pair<Spectrum>,
    pub images: ImagePair,
    pub decomposition: Option<DecompositionResult>,
    /// Over every pixel of the phantom whose composition the basis can express
    pub decomposition_error: Option<DecompositionError>,
    pub rois: Vec<RoiReport>,
    pub dqe: Option<DqeReport>,
    pub subtraction: Vec<WedgeTable>,
}

impl MetricReport {
    pub fn roi(&self, name: &str) -> Option<&RoiReport> {
        self.rois.iter().find(|r| r.name == name)
    }
}

struct ResolvedRoi {
    name: String,
    foreground: Vec<Index2>,
    background: Option<(String, Vec<Index2>)>,
}

/// Run `scenario`, with `materials` as the reference data to which the
/// scenario's own materials are added.
pub fn run(scenario: &Scenario, materials: &MaterialTable) -> Result<MetricReport> {
    // ----- Validate everything before simulating anything -------------------------------
    let materials = scenario.material_table(materials)?;
    let grid = scenario.grid()?;
    let seed = scenario.realization_seed()?;
    let sources = scenario.sources()?;
    let detector_params = scenario.detector.parameters()?;
    let phantom = scenario.phantom.phantom()?;
    scenario.solver.validate()?;
    validate_dqe(scenario)?;

    let basis = scenario.decomposition_basis.as_ref()
        .filter(|_| scenario.wants(Metric::Decomposition))
        .map(|[a, b]| [a.as_str(), b.as_str()]);
    if let Some(basis) = basis {
        if basis[0].eq_ignore_ascii_case(basis[1]) {
            return Err(DesimError::parameter("decomposition_basis", format!("needs two different materials, got `{}` twice", basis[0])));
        }
    }

    let rois = scenario.rois.iter().map(|roi| -> Result<ResolvedRoi> {
        let resolve = |spec: &RoiSpec, name: String| -> Result<(String, Vec<Index2>)> {
            let pixels = spec.roi().pixels(&phantom)?;
            if pixels.is_empty() { return Err(DesimError::EmptyRoi { roi: name }) }
            Ok((name, pixels))
        };
        let (_, foreground) = resolve(&roi.foreground, roi.name.clone())?;
        let background = roi.background.as_ref()
            .map(|spec| resolve(spec, format!("{} background", roi.name)))
            .transpose()?;
        Ok(ResolvedRoi { name: roi.name.clone(), foreground, background })
    }).collect::<Result<Vec<_>>>()?;

    let attenuation = AttenuationModel::new(&grid, &materials, phantom.materials().into_iter().chain(basis.into_iter().flatten()))?;
    let detector = DetectorResponse::new(&detector_params, &grid, &materials)?;
    let [low, high] = sources;
    let spectra = [low.spectrum(&grid, &materials)?, high.spectrum(&grid, &materials)?];

    let [nrows, ncols] = phantom.shape();
    info!("Simulating {} pixels ({nrows} × {ncols}) in {} regions, {} energies from {:.1} to {:.1} keV",
          group_digits(nrows * ncols), phantom.regions().len(), grid.len(),
          grid.energies()[0], grid.energies()[grid.len() - 1]);
    for (channel, spectrum) in Channel::BOTH.iter().zip(&spectra) {
        debug!("{channel} spectrum: {:.4e} photons/mm², mean energy {:.2} keV",
               spectrum.total_fluence(), spectrum.mean_energy());
    }

    // ----- Images -----------------------------------------------------------------------
    let formation = ImageFormation::new(&phantom, &attenuation, &detector);
    let images = formation.form([&spectra[0], &spectra[1]])?;
    let images = match seed {
        Some(seed) => {
            info!("Drawing noisy images with seed {seed}");
            realize_pair(&images, seed)?
        },
        None => images,
    };

    // ----- Decomposition ----------------------------------------------------------------
    let (decomposition, truth) = match basis {
        Some(basis) => {
            let model = ForwardModel::new(basis, [&spectra[0], &spectra[1]], &attenuation, &detector)?;
            let result = decompose(&model, &images, &scenario.solver)?;
            let (singular, other) = result.failures();
            if singular + other > 0 {
                warn!("Decomposition failed in {} of {} pixels ({} singular Jacobian, {} other)",
                      group_digits(singular + other), group_digits(result.entries.len()),
                      group_digits(singular), group_digits(other));
            }
            (Some(result), Some(phantom.truth(basis)))
        },
        None => (None, None),
    };
    let decomposition_error = match (&decomposition, &truth) {
        (Some(result), Some(truth)) if truth.iter().any(Option::is_some) =>
            Some(fom::decomposition_error(result, truth, None)?),
        (Some(_), Some(_)) => {
            warn!("No pixel of the phantom is made of the basis materials only: no decomposition error");
            None
        },
        _ => None,
    };

    // ----- ROI metrics ------------------------------------------------------------------
    let rois = rois.iter().map(|roi| -> Result<RoiReport> {
        let report_for = |channel| channel_report(scenario, &images, roi, channel);
        let report = RoiReport {
            name: roi.name.clone(),
            channels: [report_for(Channel::Low)?, report_for(Channel::High)?],
            decomposition: match (&decomposition, &truth) {
                (Some(result), Some(truth)) if roi.foreground.iter().any(|&[r, c]| truth[[r, c]].is_some()) =>
                    Some(fom::decomposition_error(result, truth, Some(roi.foreground.as_slice()))?),
                _ => None,
            },
        };
        if report.low_confidence() {
            warn!("ROI `{}` has fewer than {} samples: its metrics are low-confidence", roi.name, fom::LOW_CONFIDENCE_SAMPLES);
        }
        Ok(report)
    }).collect::<Result<Vec<_>>>()?;

    // ----- Detector characterization and subtraction ------------------------------------
    let dqe = scenario.wants(Metric::Dqe).then(|| {
        let [low, high] = [spectra[0].fluence(), spectra[1].fluence()];
        DqeReport {
            frequency: scenario.dqe.frequencies.iter()
                .map(|&f| (f, [detector.dqe(low, f), detector.dqe(high, f)]))
                .collect(),
            swank: [detector.swank_factor(low), detector.swank_factor(high)],
            monoenergetic: detector.monoenergetic_dqe(scenario.dqe.reference_counts),
        }
    });

    let subtraction = if scenario.wants(Metric::Subtraction) { wedge_tables(&phantom, &images)? } else { vec![] };

    info!("Run complete: {} ROIs, {} subtraction tables", rois.len(), subtraction.len());
    Ok(MetricReport {
        scenario: scenario.clone(),
        spectra,
        images,
        decomposition,
        decomposition_error,
        rois,
        dqe,
        subtraction,
    })
}

fn channel_report(scenario: &Scenario, images: &ImagePair, roi: &ResolvedRoi, channel: Channel) -> Result<RoiChannelReport> {
    let image = images.channel(channel);
    let stats = |name: &str, pixels: &[Index2]| {
        RoiStats::new(name, &image.mean, &image.variance, pixels, scenario.roi_variance)
    };
    let foreground = stats(roi.name.as_str(), roi.foreground.as_slice())?;
    let background = roi.background.as_ref()
        .map(|(name, pixels)| stats(name.as_str(), pixels.as_slice()).map(|s| (name, s)))
        .transpose()?;
    let cnr = match &background {
        Some((name, bg)) if scenario.wants(Metric::Cnr) => Some(fom::cnr(&foreground, bg, name)?),
        _ => None,
    };
    let dqe = if scenario.wants(Metric::Dqe) {
        // Poisson input: the incident counts are their own variance
        let incident = RoiStats::new(&roi.name, &image.incident, &image.incident, &roi.foreground, VarianceEstimate::Modeled)?;
        Some(fom::dqe(&foreground, incident.mean))
    } else { None };
    Ok(RoiChannelReport {
        channel,
        snr: scenario.wants(Metric::Snr).then(|| fom::snr(&foreground)),
        cnr,
        dqe,
        background: background.map(|(_, s)| s),
        foreground,
    })
}

fn validate_dqe(scenario: &Scenario) -> Result<()> {
    if let Some(bad) = scenario.dqe.frequencies.iter().find(|f| !(**f >= 0.0 && f.is_finite())) {
        return Err(DesimError::parameter("dqe.frequencies", format!("must be non-negative, got {bad}")));
    }
    let counts = scenario.dqe.reference_counts;
    if !(counts > 0.0 && counts.is_finite()) {
        return Err(DesimError::parameter("dqe.reference_counts", format!("must be positive, got {counts}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use units::{cm, mm};
    use crate::attenuation::Layer;
    use crate::config::scenario::{DetectorConfig, NoiseMode, PhantomConfig, RoiConfig};

    fn small() -> Scenario {
        let mut scenario = Scenario::default();
        scenario.phantom.block = 2;
        scenario
    }

    #[test]
    fn reference_scenario() {
        let report = run(&small(), &MaterialTable::builtin()).unwrap();
        assert_eq!(report.rois.len(), 2);
        assert_eq!(report.subtraction.len(), 4);

        let decomposition = report.decomposition.as_ref().unwrap();
        assert_eq!(decomposition.invalid_count(), 0);
        let error = report.decomposition_error.as_ref().unwrap();
        assert_eq!(error.n_invalid, 0);
        for m in &error.materials {
            assert_float_eq!(m.bias.unwrap(), 0.0, abs <= 1e-6);
        }

        let soft = report.roi("soft[3]").unwrap();
        for channel in &soft.channels {
            assert!(channel.snr.unwrap() > 0.0);
            // Extra PMMA darkens the image
            assert!(channel.cnr.unwrap() < 0.0);
            let dqe = channel.dqe.unwrap();
            assert!(dqe > 0.0 && dqe < 1.0, "{dqe}");
        }
        assert!(!soft.low_confidence());

        let dqe = report.dqe.as_ref().unwrap();
        assert_eq!(dqe.frequency.len(), 11);
        assert!(dqe.swank.iter().all(|&s| s > 0.5 && s <= 1.0), "{:?}", dqe.swank);
        assert_eq!(dqe.monoenergetic.len(), 141);
    }

    #[test]
    fn identical_scenarios_give_identical_reports() {
        let materials = MaterialTable::builtin();
        assert_eq!(run(&small(), &materials).unwrap(), run(&small(), &materials).unwrap());
    }

    #[test]
    fn seeded_realizations_are_reproducible() {
        let materials = MaterialTable::builtin();
        let scenario = |seed| Scenario { noise_mode: NoiseMode::SeededRealization, seed: Some(seed), ..small() };
        let a = run(&scenario(5), &materials).unwrap();
        let b = run(&scenario(5), &materials).unwrap();
        let c = run(&scenario(6), &materials).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.images, c.images);
    }

    #[test]
    fn unknown_basis_material_stops_the_run() {
        let scenario = Scenario { decomposition_basis: Some(["pmma".into(), "kryptonite".into()]), ..small() };
        assert!(matches!(run(&scenario, &MaterialTable::builtin()), Err(DesimError::UnknownMaterial { .. })));
    }

    #[test]
    fn empty_roi_stops_the_run() {
        let mut scenario = small();
        scenario.rois.push(RoiConfig {
            name: "outside".into(),
            foreground: RoiSpec::Rect { rows: [100, 110], cols: [0, 4] },
            background: None,
        });
        assert_eq!(run(&scenario, &MaterialTable::builtin()).unwrap_err(), DesimError::EmptyRoi { roi: "outside".into() });
    }

    #[test]
    fn single_pixel_roi_is_low_confidence() {
        let mut scenario = small();
        scenario.rois = vec![RoiConfig {
            name: "pixel".into(),
            foreground: RoiSpec::Pixels { pixels: vec![[0, 0]] },
            background: None,
        }];
        let report = run(&scenario, &MaterialTable::builtin()).unwrap();
        let roi = report.roi("pixel").unwrap();
        assert_eq!(roi.channels[0].foreground.n, 1);
        assert!(roi.low_confidence());
        assert!(roi.channels[0].snr.is_some());
        assert_eq!(roi.channels[0].cnr, None);
    }

    #[test]
    fn blind_detector_gives_degenerate_background() {
        let mut scenario = small();
        scenario.phantom = PhantomConfig::uniform(vec![Layer::new("water", cm(5.0))], 4);
        scenario.detector = DetectorConfig::flat(0.0);
        scenario.rois = vec![RoiConfig {
            name: "left".into(),
            foreground: RoiSpec::Rect { rows: [0, 4], cols: [0, 2] },
            background: Some(RoiSpec::Rect { rows: [0, 4], cols: [2, 4] }),
        }];
        let err = run(&scenario, &MaterialTable::builtin()).unwrap_err();
        assert_eq!(err, DesimError::DegenerateBackground { roi: "left background".into() });
    }

    #[test]
    fn requested_metrics_only() {
        let scenario = Scenario { metrics: vec![Metric::Snr], ..small() };
        let report = run(&scenario, &MaterialTable::builtin()).unwrap();
        assert!(report.decomposition.is_none());
        assert!(report.dqe.is_none());
        assert!(report.subtraction.is_empty());
        let roi = &report.rois[0];
        assert!(roi.channels[1].snr.is_some());
        assert_eq!(roi.channels[1].cnr, None);
        assert_eq!(roi.decomposition, None);
    }

    #[test]
    fn basis_that_cannot_express_the_phantom() {
        let mut scenario = small();
        scenario.phantom = PhantomConfig::uniform(vec![Layer::new("bone", mm(10.0))], 2);
        scenario.rois = vec![];
        let report = run(&scenario, &MaterialTable::builtin()).unwrap();
        assert!(report.decomposition.is_some());
        assert_eq!(report.decomposition_error, None);
    }
}
