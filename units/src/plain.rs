/// Units which are simply type aliases for `f64` rather than having an
/// implementation as a `uom` `Quantity`.
///
/// These are the per-pixel and per-energy-bin numbers that flow through the
/// inner loops of the simulation. Keeping them as plain floats avoids
/// conversions in hot code, but the aliases still say what they represent.

/// Photons per mm²
pub type Fluencef64         = f64;
/// Photons per mm² per keV
pub type SpectralFluencef64 = f64;
/// Photons incident on one pixel
pub type Countsf64          = f64;
/// Detector output, in arbitrary signal units (ADU)
pub type Signalf64          = f64;
/// Detector output variance, ADU²
pub type Variancef64        = f64;
/// Mass attenuation coefficient µ/ρ in cm²/g
pub type MassAttenuationf64 = f64;
/// Linear attenuation coefficient µ in 1/cm
pub type PerCmf64           = f64;
/// Photon energy in keV
pub type KeVf64             = f64;
/// Length in cm
pub type Cmf64              = f64;
