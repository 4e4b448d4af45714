//! Weighted logarithmic subtraction of the two channels, and the contrast
//! tables of step-wedge phantoms in the subtracted images.
//!
//! The dual-energy image DE = S_H / S_Lʷ, i.e. ln DE = ln S_H − w ln S_L.
//! With w = ln(S_H(0)/S_H(c)) / ln(S_L(0)/S_L(c)), where 0 is the background
//! and c a feature of one wedge, that wedge's material cancels: all of its
//! features appear (nearly) with the background's signal.

use ndarray::{Array2, Zip};
use units::Length;

use crate::{DesimError, Result};
use crate::imaging::ImagePair;
use crate::phantom::Phantom;
use crate::types::{Signalf64, Variancef64};

/// Weight which makes the step from `background` to `feature` vanish from
/// the subtracted image. Arguments are (low, high) mean signals.
pub fn cancellation_weight(background: [Signalf64; 2], feature: [Signalf64; 2]) -> Result<f64> {
    let [l0, h0] = background;
    let [lc, hc] = feature;
    let w = (h0 / hc).ln() / (l0 / lc).ln();
    if !w.is_finite() {
        return Err(DesimError::parameter("subtraction", format!(
            "cannot cancel a feature with the same low-energy signal as the background ({l0} vs {lc})")));
    }
    Ok(w)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubtractionImage {
    pub weight: f64,
    pub mean: Array2<Signalf64>,
    /// First-order propagation of the channel variances
    pub variance: Array2<Variancef64>,
}

pub fn subtract(images: &ImagePair, weight: f64) -> SubtractionImage {
    let mut mean = Array2::zeros(images.low.mean.dim());
    let mut variance = Array2::zeros(images.low.mean.dim());
    Zip::from(&mut mean)
        .and(&mut variance)
        .and(&images.low.mean)
        .and(&images.low.variance)
        .and(&images.high.mean)
        .and(&images.high.variance)
        .for_each(|m, v, &l, &vl, &h, &vh| {
            let de = h / l.powf(weight);
            *m = de;
            *v = de * de * (vh / (h * h) + weight * weight * vl / (l * l));
        });
    SubtractionImage { weight, mean, variance }
}

/// One feature of a step wedge, seen in a subtracted image
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub feature: usize,
    pub thickness: Length,
    pub signal: Signalf64,
    pub noise: f64,
    /// Signal relative to feature 0
    pub contrast: f64,
    /// |contrast| / sqrt(noise² + noise₀²)
    pub cnr: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WedgeTable {
    /// Wedge whose material was cancelled
    pub cancelled: String,
    /// Wedge whose features are listed
    pub examined: String,
    pub weight: f64,
    pub rows: Vec<FeatureRow>,
}

fn region_average(phantom: &Phantom, image: &Array2<f64>, region: usize) -> f64 {
    let (sum, n) = Zip::from(phantom.map()).and(image)
        .fold((0.0, 0usize), |(sum, n), &r, &x| if r == region { (sum + x, n + 1) } else { (sum, n) });
    sum / n as f64
}

/// Contrast tables of every wedge of `phantom`, in the subtraction images
/// cancelling each wedge in turn. Each wedge is cancelled at its central
/// feature.
pub fn wedge_tables(phantom: &Phantom, images: &ImagePair) -> Result<Vec<WedgeTable>> {
    let mut tables = vec![];
    for cancelled in phantom.wedges() {
        let Some((_, features)) = phantom.wedge_features(&cancelled.name) else { continue };
        if cancelled.count == 0 { continue }
        let background = features[0];
        let central = features[cancelled.central_feature()];
        let signals = |region| [region_average(phantom, &images.low.mean, region),
                                region_average(phantom, &images.high.mean, region)];
        let weight = cancellation_weight(signals(background), signals(central))?;
        let subtracted = subtract(images, weight);

        for examined in phantom.wedges() {
            let Some((_, features)) = phantom.wedge_features(&examined.name) else { continue };
            let stats: Vec<_> = features.iter().map(|&region| (
                region_average(phantom, &subtracted.mean, region),
                region_average(phantom, &subtracted.variance, region).sqrt(),
            )).collect();
            let (signal0, noise0) = stats[0];
            let rows = stats.iter().enumerate().map(|(i, &(signal, noise))| {
                let contrast = signal - signal0;
                FeatureRow {
                    feature: i,
                    thickness: examined.thickness(i),
                    signal, noise, contrast,
                    cnr: contrast.abs() / (noise * noise + noise0 * noise0).sqrt(),
                }
            }).collect();
            tables.push(WedgeTable {
                cancelled: cancelled.name.clone(),
                examined : examined .name.clone(),
                weight, rows,
            });
        }
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use crate::attenuation::{AttenuationModel, Layer};
    use crate::detector::{DetectorParameters, DetectorResponse};
    use crate::grid::EnergyGrid;
    use crate::imaging::{Channel, ImageFormation, SimulatedImage};
    use crate::material::MaterialTable;
    use crate::phantom::StepWedge;
    use crate::spectrum::{Source, Tube};
    use units::{cm, kv, mm};

    fn images() -> (Phantom, ImagePair) {
        let grid = EnergyGrid::default();
        let materials = MaterialTable::builtin();
        let phantom = Phantom::step_wedges(
            vec![Layer::new("pmma", mm(73.0)), Layer::new("aluminum", mm(4.1))],
            &[StepWedge::new("soft", "pmma", mm(2.0), 5),
              StepWedge::new("hard", "aluminum", mm(0.5), 5)],
            2,
        ).unwrap();
        let attenuation = AttenuationModel::new(&grid, &materials, phantom.materials()).unwrap();
        let detector = DetectorResponse::new(&DetectorParameters::flat(0.8, mm(0.1)), &grid, &materials).unwrap();
        let spectrum = |kvp| Source::analytic(Tube::new(kv(kvp), 2.5, cm(180.0))).spectrum(&grid, &materials).unwrap();
        let (low, high) = (spectrum(60.0), spectrum(120.0));
        let images = ImageFormation::new(&phantom, &attenuation, &detector).form([&low, &high]).unwrap();
        (phantom, images)
    }

    #[test]
    fn weight_of_a_pure_exponential() {
        // S = exp(−µ t): w = µ_H / µ_L
        let t: f64 = 2.0;
        let (mu_l, mu_h): (f64, f64) = (0.5, 0.2);
        let w = cancellation_weight([1.0, 1.0], [(-mu_l * t).exp(), (-mu_h * t).exp()]).unwrap();
        assert_float_eq!(w, mu_h / mu_l, r2nd <= 1e-12);
    }

    #[test]
    fn weight_is_undefined_without_contrast() {
        assert!(cancellation_weight([5.0, 5.0], [5.0, 4.0]).is_err());
    }

    #[test]
    fn cancelled_wedge_vanishes_at_its_central_feature() {
        let (phantom, images) = images();
        let tables = wedge_tables(&phantom, &images).unwrap();
        assert_eq!(tables.len(), 4);
        let soft_in_soft = tables.iter().find(|t| t.cancelled == "soft" && t.examined == "soft").unwrap();
        assert_eq!(soft_in_soft.rows.len(), 6);
        assert_float_eq!(soft_in_soft.rows[3].contrast, 0.0, abs <= 1e-9 * soft_in_soft.rows[0].signal);
        // ... and is much fainter than the other wedge
        let hard_in_soft = tables.iter().find(|t| t.cancelled == "soft" && t.examined == "hard").unwrap();
        assert!(hard_in_soft.rows[5].cnr > 10.0 * soft_in_soft.rows[5].cnr);
    }

    #[test]
    fn feature_zero_has_no_contrast() {
        let (phantom, images) = images();
        for table in wedge_tables(&phantom, &images).unwrap() {
            assert_eq!(table.rows[0].contrast, 0.0);
            assert_eq!(table.rows[0].cnr, 0.0);
            assert_eq!(table.rows[0].feature, 0);
        }
    }

    #[test]
    fn zero_weight_is_the_high_energy_image() {
        let (_, images) = images();
        let de = subtract(&images, 0.0);
        assert_eq!(de.mean, images.high.mean);
        for (got, want) in de.variance.iter().zip(&images.high.variance) {
            assert_float_eq!(*got, *want, r2nd <= 1e-12);
        }
    }

    #[test]
    fn variance_propagation() {
        let image = |channel, mean: f64, variance: f64| SimulatedImage {
            channel,
            mean: Array2::from_elem((1, 1), mean),
            variance: Array2::from_elem((1, 1), variance),
            incident: Array2::from_elem((1, 1), mean),
        };
        let pair = ImagePair { low: image(Channel::Low, 100.0, 100.0), high: image(Channel::High, 400.0, 400.0) };
        let de = subtract(&pair, 0.5);
        assert_float_eq!(de.mean[[0, 0]], 40.0, r2nd <= 1e-12);
        // 40² · (400/400² + 0.25 · 100/100²)
        assert_float_eq!(de.variance[[0, 0]], 1600.0 * (1.0 / 400.0 + 0.25 / 100.0), r2nd <= 1e-12);
    }
}
