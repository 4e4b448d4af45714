//! Reference attenuation data for the materials of a simulation.
//!
//! Materials are immutable and are looked up through an explicitly passed
//! `MaterialTable`, never through process-wide state, so that concurrent runs
//! can share one table by reference.

mod data;

use std::collections::BTreeMap;

use units::{g_cm3, g_cm3_, cm2_g, kev_, AreaPerMass, Energy, MassDensity};

use crate::{DesimError, Result};
use crate::types::{KeVf64, MassAttenuationf64};

/// How far beyond the ends of its table a material's attenuation may be
/// extrapolated, as a ratio of energies.
pub const EXTRAPOLATION_LIMIT: f64 = 1.25;

/// Mass attenuation coefficient µ/ρ tabulated against photon energy.
///
/// Absorption edges are represented by repeating an energy: the first entry
/// is the value just below the edge, the second the value just above it.
/// Values are interpolated linearly in log(µ/ρ) against log(E) within
/// each edge-free segment. Outside the table, the end segment is
/// extrapolated in the same way, up to `EXTRAPOLATION_LIMIT`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttenuationTable {
    energies: Vec<KeVf64>,
    mu_rho: Vec<MassAttenuationf64>,
}

impl AttenuationTable {

    /// `points` are (energy in keV, µ/ρ in cm²/g)
    pub fn new(name: &str, points: &[(KeVf64, MassAttenuationf64)]) -> Result<Self> {
        let bad = |reason: String| Err(DesimError::material(name, reason));
        if points.len() < 2 {
            return bad("attenuation table needs at least two points".into());
        }
        if let Some((e, m)) = points.iter().find(|(e, m)| !(*e > 0.0 && *m > 0.0 && e.is_finite() && m.is_finite())) {
            return bad(format!("attenuation table entry ({e} keV, {m} cm²/g) is not positive and finite"));
        }
        for w in points.windows(2) {
            if w[1].0 < w[0].0 {
                return bad(format!("attenuation table energies decrease at {} keV", w[1].0));
            }
        }
        for w in points.windows(3) {
            if w[0].0 == w[1].0 && w[1].0 == w[2].0 {
                return bad(format!("energy {} keV appears more than twice", w[0].0));
            }
        }
        let n = points.len();
        if points[0].0 == points[1].0 || points[n - 2].0 == points[n - 1].0 {
            return bad("attenuation table may not begin or end with an edge".into());
        }
        Ok(Self {
            energies: points.iter().map(|p| p.0).collect(),
            mu_rho  : points.iter().map(|p| p.1).collect(),
        })
    }

    /// Energy range covered by the table, without extrapolation
    pub fn range(&self) -> (KeVf64, KeVf64) {
        (self.energies[0], self.energies[self.energies.len() - 1])
    }

    /// µ/ρ at `energy` keV, or `None` if `energy` lies further outside the
    /// table than `EXTRAPOLATION_LIMIT` allows.
    pub fn at_kev(&self, energy: KeVf64) -> Option<MassAttenuationf64> {
        let (lo, hi) = self.range();
        if !(energy >= lo / EXTRAPOLATION_LIMIT && energy <= hi * EXTRAPOLATION_LIMIT) {
            return None
        }
        let n = self.energies.len();
        // First entry strictly above `energy`: at an edge energy this selects
        // the above-edge value as the lower end of the bracket.
        let above = self.energies.partition_point(|&e| e <= energy);
        let (i, j) = match above {
            0              => (0, 1),
            a if a == n    => (n - 2, n - 1),
            a              => (a - 1, a),
        };
        Some(log_log(energy, (self.energies[i], self.mu_rho[i]), (self.energies[j], self.mu_rho[j])))
    }
}

fn log_log(x: f64, (x0, y0): (f64, f64), (x1, y1): (f64, f64)) -> f64 {
    let s = (x.ln() - x0.ln()) / (x1.ln() - x0.ln());
    (y0.ln() + s * (y1.ln() - y0.ln())).exp()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    name: String,
    density: MassDensity,
    table: AttenuationTable,
}

impl Material {

    pub fn new(name: impl Into<String>, density: MassDensity, table: AttenuationTable) -> Result<Self> {
        let name = name.into();
        let rho = g_cm3_(density);
        if !(rho > 0.0 && rho.is_finite()) {
            return Err(DesimError::material(name, format!("density must be positive, got {rho} g/cm³")));
        }
        Ok(Self { name, density, table })
    }

    /// Construct from (keV, cm²/g) points and a density in g/cm³
    pub fn from_points(name: &str, density_g_cm3: f64, points: &[(KeVf64, MassAttenuationf64)]) -> Result<Self> {
        Self::new(name, g_cm3(density_g_cm3), AttenuationTable::new(name, points)?)
    }

    pub fn name   (&self) -> &str             { &self.name }
    pub fn density(&self) -> MassDensity       { self.density }
    pub fn table  (&self) -> &AttenuationTable { &self.table }

    pub fn mass_attenuation(&self, energy: Energy) -> Result<AreaPerMass> {
        self.mass_attenuation_kev(kev_(energy)).map(cm2_g)
    }

    pub fn mass_attenuation_kev(&self, energy: KeVf64) -> Result<MassAttenuationf64> {
        self.table.at_kev(energy).ok_or_else(|| {
            let (lo, hi) = self.table.range();
            DesimError::material(&self.name, format!(
                "no attenuation data at {energy} keV (tabulated {lo}–{hi} keV, extrapolation limited to a factor {EXTRAPOLATION_LIMIT})"))
        })
    }
}

/// Immutable collection of materials, keyed by lower-case name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialTable {
    materials: BTreeMap<String, Material>,
}

impl MaterialTable {

    pub fn empty() -> Self { Self::default() }

    /// Water, PMMA, cortical bone, aluminum, copper, tungsten and cesium
    /// iodide, 8–200 keV.
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        for (name, density, points) in data::BUILTIN {
            match Material::from_points(name, *density, points) {
                Ok(m)  => { table.materials.insert(name.to_string(), m); },
                Err(e) => log::error!("Skipping malformed builtin material: {e}"),
            }
        }
        table
    }

    /// A copy of this table with `material` added, replacing any material
    /// of the same name.
    pub fn with(mut self, material: Material) -> Self {
        self.materials.insert(material.name.to_lowercase(), material);
        self
    }

    pub fn get(&self, name: &str) -> Result<&Material> {
        self.materials.get(&name.to_lowercase())
            .ok_or_else(|| DesimError::material(name, format!(
                "not in material table (known: {})", self.names().collect::<Vec<_>>().join(", "))))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.materials.keys().map(String::as_str)
    }
}
