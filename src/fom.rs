//! Figures of merit: region-of-interest statistics, SNR, CNR, DQE and
//! decomposition error.

use std::ops::Range;

use ndarray::Array2;
use serde::Deserialize;

use crate::{DesimError, Result};
use crate::decomposition::DecompositionResult;
use crate::phantom::Phantom;
use crate::types::{Cmf64, Countsf64, Index2, Pair, Shape2};

/// ROIs with fewer samples than this yield metrics flagged as low-confidence
pub const LOW_CONFIDENCE_SAMPLES: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum ROI {
    /// Pixels in `rows` × `cols`, clipped to the image
    Rect { rows: Range<usize>, cols: Range<usize> },
    Pixels(Vec<Index2>),
    /// All pixels of a phantom region
    Region(String),
}

impl ROI {

    pub fn pixels(&self, phantom: &Phantom) -> Result<Vec<Index2>> {
        let [nrows, ncols] = phantom.shape();
        Ok(match self {
            ROI::Rect { rows, cols } => {
                let rows = rows.start.min(nrows)..rows.end.min(nrows);
                let cols = cols.start.min(ncols)..cols.end.min(ncols);
                itertools::iproduct!(rows, cols).map(|(r, c)| [r, c]).collect()
            },
            ROI::Pixels(pixels) => pixels.iter().copied().filter(|&p| inside(p, [nrows, ncols])).collect(),
            ROI::Region(name) => phantom.pixels(name).ok_or_else(|| DesimError::parameter(
                "roi", format!("phantom has no region `{name}`")))?,
        })
    }
}

fn inside([r, c]: Index2, [nrows, ncols]: Shape2) -> bool { r < nrows && c < ncols }

/// Where the variance of an ROI comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VarianceEstimate {
    /// Average of the per-pixel modeled variance
    #[default]
    Modeled,
    /// Spread of the pixel values; falls back to `Modeled` below two samples
    Sample,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiStats {
    pub n: usize,
    pub mean: f64,
    pub variance: f64,
}

impl RoiStats {

    /// Statistics of `values` over `pixels`, with per-pixel `variance`.
    /// Pixels outside the image are ignored. Fails with `EmptyRoi` when no
    /// pixel remains.
    pub fn new(roi: &str,
               values: &Array2<f64>,
               variance: &Array2<f64>,
               pixels: &[Index2],
               estimate: VarianceEstimate,
    ) -> Result<Self> {
        let samples: Vec<(f64, f64)> = pixels.iter()
            .filter_map(|&[r, c]| Some((*values.get((r, c))?, *variance.get((r, c))?)))
            .collect();
        let n = samples.len();
        if n == 0 {
            return Err(DesimError::EmptyRoi { roi: roi.into() });
        }
        let mean = samples.iter().map(|s| s.0).sum::<f64>() / n as f64;
        let modeled = samples.iter().map(|s| s.1).sum::<f64>() / n as f64;
        let variance = match estimate {
            VarianceEstimate::Sample if n >= 2 =>
                samples.iter().map(|s| (s.0 - mean).powi(2)).sum::<f64>() / (n - 1) as f64,
            _ => modeled,
        };
        Ok(Self { n, mean, variance })
    }

    pub fn low_confidence(&self) -> bool { self.n < LOW_CONFIDENCE_SAMPLES }
}

/// mean / sqrt(variance)
pub fn snr(stats: &RoiStats) -> f64 {
    stats.mean / stats.variance.sqrt()
}

/// (mean_f − mean_b) / sqrt((var_f + var_b) / 2). Fails with
/// `DegenerateBackground` if the background has no variance.
pub fn cnr(foreground: &RoiStats, background: &RoiStats, background_name: &str) -> Result<f64> {
    if !(background.variance > 0.0) {
        return Err(DesimError::DegenerateBackground { roi: background_name.into() });
    }
    Ok((foreground.mean - background.mean) / (0.5 * (foreground.variance + background.variance)).sqrt())
}

/// SNR²_out / SNR²_in, where the input is Poisson with `incident` photons.
pub fn dqe(output: &RoiStats, incident: Countsf64) -> f64 {
    snr(output).powi(2) / incident
}

/// Bias and spread of (estimated − true) thickness of one basis material,
/// over the valid pixels. `None` when there are too few valid pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialError {
    pub material: String,
    pub bias: Option<Cmf64>,
    pub std_dev: Option<Cmf64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionError {
    pub materials: Pair<MaterialError>,
    /// Pixels with known truth where the decomposition succeeded ...
    pub n_valid: usize,
    /// ... and where it failed
    pub n_invalid: usize,
}

impl DecompositionError {
    pub fn invalid_fraction(&self) -> f64 {
        self.n_invalid as f64 / (self.n_valid + self.n_invalid) as f64
    }
}

/// Error statistics of `result` against `truth`, over `pixels` (all pixels
/// if `None`). Only pixels whose true composition is expressible in the
/// basis take part. Fails with `EmptyRoi` if there are none.
pub fn decomposition_error(result: &DecompositionResult,
                           truth: &Array2<Option<Pair<Cmf64>>>,
                           pixels: Option<&[Index2]>,
) -> Result<DecompositionError> {
    let all: Vec<Index2>;
    let pixels = match pixels {
        Some(p) => p,
        None => {
            all = truth.indexed_iter().map(|((r, c), _)| [r, c]).collect();
            &all
        },
    };
    let mut errors: Vec<Pair<f64>> = vec![];
    let mut n_invalid = 0;
    for &[r, c] in pixels {
        let Some(Some(t)) = truth.get((r, c)) else { continue };
        match result.get([r, c]).and_then(|d| d.solution()) {
            Some(s) => errors.push([s.thickness[0] - t[0], s.thickness[1] - t[1]]),
            None    => n_invalid += 1,
        }
    }
    let n_valid = errors.len();
    if n_valid + n_invalid == 0 {
        return Err(DesimError::EmptyRoi { roi: "decomposition ground truth".into() });
    }
    let material = |m: usize| {
        let bias = (n_valid > 0).then(|| errors.iter().map(|e| e[m]).sum::<f64>() / n_valid as f64);
        let std_dev = bias.filter(|_| n_valid >= 2).map(|b| {
            (errors.iter().map(|e| (e[m] - b).powi(2)).sum::<f64>() / (n_valid - 1) as f64).sqrt()
        });
        MaterialError { material: result.basis[m].clone(), bias, std_dev }
    };
    Ok(DecompositionError { materials: [material(0), material(1)], n_valid, n_invalid })
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use nalgebra::Matrix2;
    use ndarray::array;
    use rstest::rstest;
    use crate::attenuation::Layer;
    use crate::decomposition::{Decomposed, Solution};
    use crate::phantom::StepWedge;
    use units::mm;

    fn stats(mean: f64, variance: f64, n: usize) -> RoiStats { RoiStats { n, mean, variance } }

    #[test]
    fn snr_and_cnr_definitions() {
        let f = stats(120.0, 16.0, 100);
        let b = stats(100.0, 16.0, 100);
        assert_float_eq!(snr(&f), 30.0, r2nd <= 1e-12);
        assert_float_eq!(cnr(&f, &b, "b").unwrap(), 5.0, r2nd <= 1e-12);
        assert_float_eq!(cnr(&b, &f, "f").unwrap(), -5.0, r2nd <= 1e-12);
    }

    #[test]
    fn zero_background_variance_is_degenerate() {
        let result = cnr(&stats(1.0, 1.0, 100), &stats(0.0, 0.0, 100), "bg");
        assert_eq!(result, Err(DesimError::DegenerateBackground { roi: "bg".into() }));
    }

    #[test]
    fn dqe_of_ideal_counter_is_one() {
        // Poisson output: variance = mean = incident
        assert_float_eq!(dqe(&stats(1000.0, 1000.0, 100), 1000.0), 1.0, r2nd <= 1e-12);
    }

    #[rstest(/**/ pixels       , expected,
             case(vec![]        , None   ),
             case(vec![[0, 0]]  , Some(1)),
             case(vec![[5, 5]]  , None   ), // outside the image
             case(vec![[0, 0], [1, 1]], Some(2)),
    )]
    fn sample_counts(pixels: Vec<Index2>, expected: Option<usize>) {
        let values = array![[1.0, 2.0], [3.0, 4.0]];
        let result = RoiStats::new("roi", &values, &values, &pixels, VarianceEstimate::Modeled);
        match expected {
            None    => assert_eq!(result, Err(DesimError::EmptyRoi { roi: "roi".into() })),
            Some(n) => assert_eq!(result.unwrap().n, n),
        }
    }

    #[test]
    fn single_sample_is_defined_but_low_confidence() {
        let values = array![[7.0]];
        let s = RoiStats::new("one", &values, &array![[4.0]], &[[0, 0]], VarianceEstimate::Sample).unwrap();
        assert_eq!(s.mean, 7.0);
        assert_eq!(s.variance, 4.0); // sample variance undefined: modeled used
        assert!(s.low_confidence());
        assert_float_eq!(snr(&s), 3.5, r2nd <= 1e-12);
    }

    #[test]
    fn low_confidence_threshold() {
        assert!( stats(1.0, 1.0, LOW_CONFIDENCE_SAMPLES - 1).low_confidence());
        assert!(!stats(1.0, 1.0, LOW_CONFIDENCE_SAMPLES    ).low_confidence());
    }

    #[test]
    fn sample_variance_uses_pixel_spread() {
        let values = array![[1.0, 2.0, 3.0, 4.0]];
        let modeled = Array2::zeros((1, 4));
        let pixels = [[0, 0], [0, 1], [0, 2], [0, 3]];
        let s = RoiStats::new("r", &values, &modeled, &pixels, VarianceEstimate::Sample).unwrap();
        assert_float_eq!(s.mean, 2.5, r2nd <= 1e-12);
        assert_float_eq!(s.variance, 5.0 / 3.0, r2nd <= 1e-12);
    }

    #[test]
    fn roi_shapes() {
        let phantom = Phantom::step_wedges(vec![], &[StepWedge::new("w", "water", mm(1.0), 2)], 2).unwrap();
        let rect = ROI::Rect { rows: 0..10, cols: 1..3 }.pixels(&phantom).unwrap();
        assert_eq!(rect, vec![[0, 1], [0, 2], [1, 1], [1, 2]]);
        let region = ROI::Region("w[2]".into()).pixels(&phantom).unwrap();
        assert_eq!(region, vec![[0, 4], [0, 5], [1, 4], [1, 5]]);
        assert!(ROI::Region("nope".into()).pixels(&phantom).is_err());
        let listed = ROI::Pixels(vec![[1, 1], [9, 9]]).pixels(&phantom).unwrap();
        assert_eq!(listed, vec![[1, 1]]);
    }

    fn valid(t: Pair<f64>) -> Decomposed {
        Decomposed::Valid(Solution { thickness: t, covariance: Matrix2::zeros(), iterations: 1 })
    }

    #[test]
    fn decomposition_error_only_counts_valid_pixels() {
        let result = DecompositionResult {
            basis: ["water".into(), "aluminum".into()],
            entries: array![[valid([5.1, 0.1]), valid([4.9, 0.12])],
                            [Decomposed::Invalid(DesimError::SingularJacobian { location: Some([1, 0]), determinant: 0.0 }),
                             valid([100.0, 100.0])]],
        };
        let truth = array![[Some([5.0, 0.1]), Some([5.0, 0.1])],
                           [Some([5.0, 0.1]), None]];
        let e = decomposition_error(&result, &truth, None).unwrap();
        assert_eq!((e.n_valid, e.n_invalid), (2, 1));
        assert_float_eq!(e.invalid_fraction(), 1.0 / 3.0, r2nd <= 1e-12);
        assert_float_eq!(e.materials[0].bias.unwrap(), 0.0, abs <= 1e-12);
        assert_float_eq!(e.materials[0].std_dev.unwrap(), 0.1 * 2.0_f64.sqrt(), r2nd <= 1e-9);
        assert_float_eq!(e.materials[1].bias.unwrap(), 0.01, r2nd <= 1e-9);
        assert_eq!(e.materials[1].material, "aluminum");
    }

    #[test]
    fn decomposition_error_without_truth_is_empty() {
        let result = DecompositionResult { basis: ["a".into(), "b".into()], entries: array![[valid([1.0, 1.0])]] };
        let truth = array![[None]];
        assert!(matches!(decomposition_error(&result, &truth, None), Err(DesimError::EmptyRoi { .. })));
    }

    #[test]
    fn all_invalid_is_reported_not_dropped() {
        let invalid = Decomposed::Invalid(DesimError::DecompositionDidNotConverge { location: None, iterations: 50, residual: 1.0 });
        let result = DecompositionResult { basis: ["a".into(), "b".into()], entries: array![[invalid]] };
        let e = decomposition_error(&result, &array![[Some([1.0, 1.0])]], None).unwrap();
        assert_eq!(e.invalid_fraction(), 1.0);
        assert_eq!(e.materials[0].bias, None);
    }

    #[test]
    fn region_roi_of_uniform_phantom() {
        let p = Phantom::uniform(vec![Layer::new("water", mm(1.0))], [3, 3]).unwrap();
        assert_eq!(ROI::Region("background".into()).pixels(&p).unwrap().len(), 9);
    }
}
