//! Formation of the low- and high-energy images of a phantom.
//!
//! Every pixel of a region sees the same path, so signals are computed once
//! per region, in parallel, and then scattered to the pixels by region index.

pub mod forward;
pub mod realize;

use ndarray::Array2;

#[cfg(not(feature = "serial"))]
use rayon::prelude::*;

use crate::{DesimError, Result};
use crate::attenuation::AttenuationModel;
use crate::detector::{DetectorResponse, PixelSignal};
use crate::phantom::Phantom;
use crate::spectrum::Spectrum;
use crate::types::{Countsf64, Index2, Pair, Shape2, Signalf64, Variancef64};

pub use forward::ForwardModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel { Low, High }

impl Channel {
    pub const BOTH: Pair<Channel> = [Channel::Low, Channel::High];

    pub fn index(self) -> usize {
        match self { Channel::Low => 0, Channel::High => 1 }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Low  => write!(f, "low"),
            Channel::High => write!(f, "high"),
        }
    }
}

/// Per-pixel signal mean and variance in one energy channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedImage {
    pub channel: Channel,
    pub mean: Array2<Signalf64>,
    pub variance: Array2<Variancef64>,
    /// Photons incident on each pixel
    pub incident: Array2<Countsf64>,
}

impl SimulatedImage {

    pub fn shape(&self) -> Shape2 {
        let (r, c) = self.mean.dim();
        [r, c]
    }

    pub fn at(&self, [row, col]: Index2) -> Option<PixelSignal> {
        Some(PixelSignal {
            mean    : *self.mean    .get((row, col))?,
            variance: *self.variance.get((row, col))?,
            incident: *self.incident.get((row, col))?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImagePair {
    pub low: SimulatedImage,
    pub high: SimulatedImage,
}

impl ImagePair {
    pub fn channel(&self, channel: Channel) -> &SimulatedImage {
        match channel { Channel::Low => &self.low, Channel::High => &self.high }
    }
}

/// Attenuation through a phantom followed by detection.
pub struct ImageFormation<'a> {
    phantom: &'a Phantom,
    attenuation: &'a AttenuationModel,
    detector: &'a DetectorResponse,
}

impl<'a> ImageFormation<'a> {

    pub fn new(phantom: &'a Phantom, attenuation: &'a AttenuationModel, detector: &'a DetectorResponse) -> Self {
        Self { phantom, attenuation, detector }
    }

    /// Signal of each phantom region, indexed like `Phantom::regions`.
    pub fn region_signals(&self, spectrum: &Spectrum) -> Result<Vec<PixelSignal>> {
        if spectrum.grid() != self.detector.grid() {
            return Err(DesimError::parameter("spectrum", "energy grid differs from the detector's"));
        }
        let n = self.phantom.regions().len();

        #[cfg    (feature = "serial") ] let iter = (0..n).into_iter();
        #[cfg(not(feature = "serial"))] let iter = (0..n).into_par_iter();

        iter.map(|region| {
            let transmission = self.attenuation.transmission(&self.phantom.path(region))?;
            Ok(self.detector.respond(spectrum.attenuated(&transmission).fluence()))
        }).collect()
    }

    pub fn image(&self, channel: Channel, spectrum: &Spectrum) -> Result<SimulatedImage> {
        let signals = self.region_signals(spectrum)?;
        let map = self.phantom.map();
        log::debug!("{channel} channel: {} regions, {:?} pixels", signals.len(), map.dim());
        Ok(SimulatedImage {
            channel,
            mean    : map.map(|&r| signals[r].mean),
            variance: map.map(|&r| signals[r].variance),
            incident: map.map(|&r| signals[r].incident),
        })
    }

    /// Images of both channels; `spectra` are (low, high).
    pub fn form(&self, [low, high]: Pair<&Spectrum>) -> Result<ImagePair> {
        Ok(ImagePair {
            low : self.image(Channel::Low , low )?,
            high: self.image(Channel::High, high)?,
        })
    }
}
