//! Noisy realizations of simulated images.
//!
//! Each pixel is drawn from a normal distribution with the modeled mean and
//! variance. Every row of every channel gets its own generator, seeded from
//! the run's seed, the channel and the row, so the result does not depend
//! on the order in which rows are processed.

use ndarray::{Array2, Axis};
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rand_isaac::Isaac64Rng;

#[cfg(not(feature = "serial"))]
use rayon::prelude::*;

use crate::{DesimError, Result};
use super::{Channel, ImagePair, SimulatedImage};

/// Distinct `(seed, channel, row)` give distinct generator keys
fn row_seed(seed: u64, channel: Channel, row: usize) -> [u8; 32] {
    let mut key = [0; 32];
    key[ 0.. 8].copy_from_slice(&seed.to_le_bytes());
    key[ 8..16].copy_from_slice(&(channel.index() as u64).to_le_bytes());
    key[16..24].copy_from_slice(&(row as u64).to_le_bytes());
    key
}

/// A noisy instance of `image`. The variance of the result is that of the
/// model: a single realization carries no variance estimate of its own.
pub fn realize(image: &SimulatedImage, seed: u64) -> Result<SimulatedImage> {
    let (nrows, ncols) = image.mean.dim();
    let rows: Vec<_> = image.mean.axis_iter(Axis(0)).zip(image.variance.axis_iter(Axis(0))).collect();

    #[cfg    (feature = "serial") ] let iter = rows.    iter();
    #[cfg(not(feature = "serial"))] let iter = rows.par_iter();

    let sampled = iter.enumerate().map(|(row, (mean, variance))| {
        let mut rng = Isaac64Rng::from_seed(row_seed(seed, image.channel, row));
        mean.iter().zip(variance.iter()).map(|(&m, &v)| {
            let normal = Normal::new(m, v.sqrt()).map_err(|e| DesimError::parameter(
                "variance", format!("cannot sample pixel ({row}) with mean {m} and variance {v}: {e}")))?;
            Ok(normal.sample(&mut rng))
        }).collect::<Result<Vec<_>>>()
    }).collect::<Result<Vec<_>>>()?;

    let mean = Array2::from_shape_vec((nrows, ncols), sampled.concat())
        .map_err(|e| DesimError::parameter("image", e.to_string()))?;
    Ok(SimulatedImage { mean, ..image.clone() })
}

pub fn realize_pair(images: &ImagePair, seed: u64) -> Result<ImagePair> {
    Ok(ImagePair {
        low : realize(&images.low , seed)?,
        high: realize(&images.high, seed)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use ndarray::Array2;

    fn flat(mean: f64, variance: f64, shape: (usize, usize)) -> SimulatedImage {
        SimulatedImage {
            channel: Channel::Low,
            mean: Array2::from_elem(shape, mean),
            variance: Array2::from_elem(shape, variance),
            incident: Array2::from_elem(shape, mean),
        }
    }

    #[test]
    fn same_seed_same_image() {
        let image = flat(1000.0, 1000.0, (20, 30));
        assert_eq!(realize(&image, 7).unwrap(), realize(&image, 7).unwrap());
        assert_ne!(realize(&image, 7).unwrap(), realize(&image, 8).unwrap());
    }

    #[test]
    fn neighbouring_seeds_do_not_share_rows() {
        let image = flat(1000.0, 1000.0, (4, 4));
        let (a, b) = (realize(&image, 5).unwrap(), realize(&image, 6).unwrap());
        for row in 0..3 {
            assert_ne!(a.mean.row(row + 1), b.mean.row(row));
            assert_ne!(b.mean.row(row + 1), a.mean.row(row));
        }
        // Nor does a seed offset reproduce the other channel
        let high = SimulatedImage { channel: Channel::High, ..image.clone() };
        assert_ne!(realize(&image, 5 + (1 << 32)).unwrap().mean, realize(&high, 5).unwrap().mean);
    }

    #[test]
    fn channels_get_different_noise() {
        let low = flat(1000.0, 1000.0, (4, 4));
        let high = SimulatedImage { channel: Channel::High, ..low.clone() };
        assert_ne!(realize(&low, 1).unwrap().mean, realize(&high, 1).unwrap().mean);
    }

    #[test]
    fn sample_statistics_follow_the_model() {
        let image = flat(500.0, 400.0, (100, 100));
        let noisy = realize(&image, 42).unwrap();
        let n = noisy.mean.len() as f64;
        let mean = noisy.mean.sum() / n;
        let var = noisy.mean.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
        assert_float_eq!(mean, 500.0, abs <= 1.0);
        assert_float_eq!(var , 400.0, rmax <= 0.05);
        assert_eq!(noisy.variance, image.variance);
    }

    #[test]
    fn zero_variance_reproduces_the_mean() {
        let image = flat(123.0, 0.0, (3, 3));
        assert_eq!(realize(&image, 0).unwrap(), image);
    }
}
