//! Beer–Lambert attenuation through stacks of material layers.

use std::collections::BTreeMap;

use serde::Deserialize;
use units::{cm_, Length};

use crate::{DesimError, Result};
use crate::config::de::deserialize_uom;
use crate::grid::EnergyGrid;
use crate::material::MaterialTable;
use crate::types::PerCmf64;

/// A slab of a single material, traversed perpendicularly.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Layer {
    pub material: String,
    #[serde(deserialize_with = "deserialize_uom")]
    pub thickness: Length,
}

impl Layer {
    pub fn new(material: impl Into<String>, thickness: Length) -> Self {
        Self { material: material.into(), thickness }
    }
}

/// Linear attenuation coefficients of a set of materials, sampled on an
/// energy grid once, so that transmission through any stack of those
/// materials reduces to sums and exponentials.
#[derive(Debug, Clone)]
pub struct AttenuationModel {
    n_energies: usize,
    mu: BTreeMap<String, Vec<PerCmf64>>,
}

impl AttenuationModel {

    /// Fails with `UnknownMaterial` if any of `names` is missing from
    /// `materials` or has no data somewhere on `grid`.
    pub fn new<'a>(grid: &EnergyGrid, materials: &MaterialTable, names: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut mu = BTreeMap::new();
        for name in names {
            let key = name.to_lowercase();
            if mu.contains_key(&key) { continue }
            let material = materials.get(name)?;
            let rho = units::g_cm3_(material.density());
            let values = grid.energies().iter()
                .map(|&e| material.mass_attenuation_kev(e).map(|m| m * rho))
                .collect::<Result<Vec<_>>>()?;
            mu.insert(key, values);
        }
        Ok(Self { n_energies: grid.len(), mu })
    }

    /// µ(E) in 1/cm on the grid
    pub fn mu(&self, material: &str) -> Result<&[PerCmf64]> {
        self.mu.get(&material.to_lowercase())
            .map(Vec::as_slice)
            .ok_or_else(|| DesimError::material(material, "not included in attenuation model"))
    }

    pub fn materials(&self) -> impl Iterator<Item = &str> {
        self.mu.keys().map(String::as_str)
    }

    /// Σ µ_m(E) t_m at each grid energy
    pub fn optical_depth(&self, layers: &[Layer]) -> Result<Vec<f64>> {
        let mut depth = vec![0.0; self.n_energies];
        for layer in layers {
            let t = cm_(layer.thickness);
            if !(t >= 0.0 && t.is_finite()) {
                return Err(DesimError::parameter(
                    format!("{} thickness", layer.material),
                    format!("must be non-negative, got {t} cm")));
            }
            if t == 0.0 { continue }
            for (d, mu) in depth.iter_mut().zip(self.mu(&layer.material)?) {
                *d += mu * t;
            }
        }
        Ok(depth)
    }

    /// exp(−Σ µ_m(E) t_m) at each grid energy. An empty stack transmits
    /// everything.
    pub fn transmission(&self, layers: &[Layer]) -> Result<Vec<f64>> {
        Ok(self.optical_depth(layers)?.into_iter().map(|d| (-d).exp()).collect())
    }
}
