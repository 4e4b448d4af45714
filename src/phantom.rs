//! Object descriptions: which stack of material layers the beam traverses at
//! each pixel.
//!
//! Pixels are grouped into regions of identical composition, so that the
//! attenuation of each distinct path is computed only once.

use std::collections::BTreeSet;

use ndarray::Array2;
use units::{cm_, Length};

use crate::{DesimError, Result};
use crate::attenuation::Layer;
use crate::types::{Cmf64, Index2, Pair, Shape2};

/// Name of the region that contains nothing but the base layers
pub const BACKGROUND: &str = "background";

/// A group of pixels sharing the same layers, in addition to the phantom's
/// base layers.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub name: String,
    pub layers: Vec<Layer>,
}

impl Region {
    pub fn new(name: impl Into<String>, layers: Vec<Layer>) -> Self {
        Self { name: name.into(), layers }
    }
}

/// A row of square features of one material, feature `i` being `i` steps
/// thick, for `i` in `0..=count`.
#[derive(Debug, Clone, PartialEq)]
pub struct StepWedge {
    pub name: String,
    pub material: String,
    pub step: Length,
    pub count: usize,
}

impl StepWedge {
    pub fn new(name: impl Into<String>, material: impl Into<String>, step: Length, count: usize) -> Self {
        Self { name: name.into(), material: material.into(), step, count }
    }

    /// Region name of feature `i`. Feature 0 is the shared background.
    pub fn feature_name(&self, i: usize) -> String {
        if i == 0 { BACKGROUND.into() } else { format!("{}[{i}]", self.name) }
    }

    pub fn thickness(&self, i: usize) -> Length { self.step * i as f64 }

    /// The middle feature of the wedge
    pub fn central_feature(&self) -> usize { (self.count + 1) / 2 }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Phantom {
    base: Vec<Layer>,
    regions: Vec<Region>,
    map: Array2<usize>,
    wedges: Vec<(StepWedge, Vec<usize>)>,
}

impl Phantom {

    /// `map` holds, for each pixel, the index of its region in `regions`.
    pub fn new(base: Vec<Layer>, regions: Vec<Region>, map: Array2<usize>) -> Result<Self> {
        if map.is_empty() {
            return Err(DesimError::parameter("phantom", "has no pixels"));
        }
        if let Some(&bad) = map.iter().find(|&&r| r >= regions.len()) {
            return Err(DesimError::parameter("phantom", format!(
                "pixel refers to region {bad}, but only {} regions exist", regions.len())));
        }
        let mut seen = BTreeSet::new();
        for region in &regions {
            if !seen.insert(region.name.as_str()) {
                return Err(DesimError::parameter("phantom.regions", format!("duplicate region `{}`", region.name)));
            }
        }
        for layer in base.iter().chain(regions.iter().flat_map(|r| &r.layers)) {
            let t = cm_(layer.thickness);
            if !(t >= 0.0 && t.is_finite()) {
                return Err(DesimError::parameter(
                    format!("phantom layer ({})", layer.material),
                    format!("thickness must be non-negative, got {t} cm")));
            }
        }
        Ok(Self { base, regions, map, wedges: vec![] })
    }

    /// Every pixel has the same path
    pub fn uniform(layers: Vec<Layer>, shape: Shape2) -> Result<Self> {
        Self::new(layers, vec![Region::new(BACKGROUND, vec![])], Array2::zeros(shape))
    }

    /// One row of `block`×`block` pixel features per wedge, on top of `base`.
    /// Rows of wedges with fewer features are padded with background.
    pub fn step_wedges(base: Vec<Layer>, wedges: &[StepWedge], block: usize) -> Result<Self> {
        if wedges.is_empty() {
            return Err(DesimError::parameter("phantom.wedges", "at least one wedge is needed"));
        }
        if block == 0 {
            return Err(DesimError::parameter("phantom.block", "must be at least one pixel"));
        }
        let mut regions = vec![Region::new(BACKGROUND, vec![])];
        let mut layout = vec![];
        for wedge in wedges {
            let mut row = vec![0];
            for i in 1..=wedge.count {
                row.push(regions.len());
                regions.push(Region::new(wedge.feature_name(i), vec![Layer::new(&wedge.material, wedge.thickness(i))]));
            }
            layout.push(row);
        }
        let features = layout.iter().map(Vec::len).max().unwrap_or(1);
        let map = Array2::from_shape_fn((wedges.len() * block, features * block), |(r, c)| {
            layout[r / block].get(c / block).copied().unwrap_or(0)
        });
        let mut phantom = Self::new(base, regions, map)?;
        phantom.wedges = wedges.iter().zip(layout).map(|(w, row)| (w.clone(), row)).collect();
        Ok(phantom)
    }

    /// Regions arranged according to `layout`, a grid of region names, each
    /// entry expanded to a `block`×`block` square of pixels.
    pub fn from_layout(base: Vec<Layer>, regions: Vec<Region>, layout: &[Vec<String>], block: usize) -> Result<Self> {
        let ncols = layout.first().map_or(0, Vec::len);
        if ncols == 0 || block == 0 {
            return Err(DesimError::parameter("phantom.layout", "has no pixels"));
        }
        if layout.iter().any(|row| row.len() != ncols) {
            return Err(DesimError::parameter("phantom.layout", "rows differ in length"));
        }
        let index = |name: &str| regions.iter().position(|r| r.name == name)
            .ok_or_else(|| DesimError::parameter("phantom.layout", format!("unknown region `{name}`")));
        let cells = layout.iter()
            .map(|row| row.iter().map(|name| index(name.as_str())).collect::<Result<Vec<_>>>())
            .collect::<Result<Vec<_>>>()?;
        let map = Array2::from_shape_fn((layout.len() * block, ncols * block), |(r, c)| cells[r / block][c / block]);
        Self::new(base, regions, map)
    }

    pub fn shape(&self) -> Shape2 {
        let (r, c) = self.map.dim();
        [r, c]
    }

    pub fn base   (&self) -> &[Layer]         { &self.base }
    pub fn regions(&self) -> &[Region]        { &self.regions }
    pub fn map    (&self) -> &Array2<usize>   { &self.map }

    pub fn region_index(&self, name: &str) -> Option<usize> {
        self.regions.iter().position(|r| r.name == name)
    }

    /// Full path through the phantom in region `region`: base layers first
    pub fn path(&self, region: usize) -> Vec<Layer> {
        self.base.iter()
            .chain(self.regions.get(region).map_or(&[][..], |r| r.layers.as_slice()))
            .cloned()
            .collect()
    }

    /// Pixels belonging to the named region. `None` if there is no such region.
    pub fn pixels(&self, name: &str) -> Option<Vec<Index2>> {
        let region = self.region_index(name)?;
        Some(self.map.indexed_iter()
             .filter(|&(_, &r)| r == region)
             .map(|((row, col), _)| [row, col])
             .collect())
    }

    /// Names of all materials appearing anywhere in the phantom
    pub fn materials(&self) -> Vec<&str> {
        self.base.iter()
            .chain(self.regions.iter().flat_map(|r| &r.layers))
            .map(|l| l.material.as_str())
            .collect()
    }

    pub fn wedges(&self) -> impl Iterator<Item = &StepWedge> {
        self.wedges.iter().map(|(w, _)| w)
    }

    /// Region indices of features `0..=count` of the named wedge
    pub fn wedge_features(&self, name: &str) -> Option<(&StepWedge, &[usize])> {
        self.wedges.iter()
            .find(|(w, _)| w.name == name)
            .map(|(w, regions)| (w, regions.as_slice()))
    }

    /// Total thickness (cm) of each of the `basis` materials along the path of
    /// `region`, or `None` if the path contains any other material.
    pub fn region_truth(&self, region: usize, basis: Pair<&str>) -> Option<Pair<Cmf64>> {
        let mut truth = [0.0; 2];
        for layer in self.path(region) {
            let i = basis.iter().position(|b| b.eq_ignore_ascii_case(&layer.material))?;
            truth[i] += cm_(layer.thickness);
        }
        Some(truth)
    }

    /// Per-pixel true basis thicknesses, where the path consists of basis
    /// materials only
    pub fn truth(&self, basis: Pair<&str>) -> Array2<Option<Pair<Cmf64>>> {
        let per_region: Vec<_> = (0..self.regions.len()).map(|r| self.region_truth(r, basis)).collect();
        self.map.map(|&r| per_region[r])
    }
}
