//! Physical quantities used by `desim`, built on `uom`.
//!
//! The quantities live in a centimetre-gram-second flavoured system, because
//! attenuation data are conventionally tabulated in cm²/g and densities in
//! g/cm³. Quantity types are used at API and configuration boundaries;
//! numerical kernels extract plain `f64`s with the `*_` accessors below.

pub mod plain;

pub use uom;
pub use uom::si::Quantity;

use uom::si::Dimension;
pub type InvertDimension<D> = uom::si::ISQ<
    <<D as Dimension>::L  as uom::lib::ops::Neg>::Output,
    <<D as Dimension>::M  as uom::lib::ops::Neg>::Output,
    <<D as Dimension>::T  as uom::lib::ops::Neg>::Output,
    <<D as Dimension>::I  as uom::lib::ops::Neg>::Output,
    <<D as Dimension>::Th as uom::lib::ops::Neg>::Output,
    <<D as Dimension>::N  as uom::lib::ops::Neg>::Output,
    <<D as Dimension>::J  as uom::lib::ops::Neg>::Output>;

pub mod cgs {

  use uom::si::{
    length::centimeter,
    mass::gram,
    time::second,
    electric_current::ampere,
    thermodynamic_temperature::kelvin,
    amount_of_substance::mole,
    luminous_intensity::candela,
  };

  // TODO: replace with system! macro, once it has been fixed in uom
  type Units = dyn uom::si::Units<
      f64,
    length                    = centimeter,
    mass                      = gram,
    time                      = second,
    electric_current          = ampere,
    thermodynamic_temperature = kelvin,
    amount_of_substance       = mole,
    luminous_intensity        = candela>;

  pub mod f64 {
    use uom::{ISQ, system, si::Quantity};
    ISQ!(uom::si, f64, (centimeter, gram, second, ampere, kelvin, mole, candela));

    use uom::typenum::{P2, N1, Z0};
    /// Linear attenuation coefficient
    pub type PerLength   = Quantity<super::super::InvertDimension<uom::si::length::Dimension>, super::Units, f64>;
    /// Mass attenuation coefficient
    pub type AreaPerMass = Quantity<uom::si::ISQ<P2, N1, Z0, Z0, Z0, Z0, Z0>                 , super::Units, f64>;
  }

}

pub use cgs::f64::{Length, Energy, ElectricPotential, MassDensity, Ratio, Angle, PerLength, AreaPerMass};

#[macro_export]
macro_rules! in_base_unit {
  ($value:expr) => {
    $crate::Quantity {
      dimension: std::marker::PhantomData,
      units: std::marker::PhantomData,
      value: $value,
    }
  };
}

#[macro_export]
macro_rules! assert_uom_eq {
  ($unit:ident, $lhs:expr, $rhs:expr, $algo:ident <= $tol:expr) => {
    float_eq::assert_float_eq!($lhs.get::<$unit>(), $rhs.get::<$unit>(), $algo <= $tol)
  };
}

mod unit {
  pub use uom::si::{length           ::{micrometer, millimeter, centimeter},
                    energy           ::kiloelectronvolt,
                    electric_potential::kilovolt,
                    mass_density     ::gram_per_cubic_centimeter,
                    ratio            ::ratio,
                    angle            ::{degree, radian},
  };
}

/// Generate a function called NAME which returns QUANTITY by interpreting its
/// argument as UNIT
///
/// wrap!(NAME QUANTITY UNIT);
macro_rules! wrap {
  ($name:ident $quantity:ident $unit:ident ) => {
    pub fn $name(x: f64) -> $quantity { $quantity::new::<unit::$unit>(x) }
  };
}

wrap!(cm     Length                          centimeter);
wrap!(mm     Length                          millimeter);
wrap!(um     Length                          micrometer);
wrap!(kev    Energy                    kiloelectronvolt);
wrap!(kv     ElectricPotential                 kilovolt);
wrap!(g_cm3  MassDensity      gram_per_cubic_centimeter);
wrap!(ratio  Ratio                                ratio);
wrap!(degree Angle                               degree);
wrap!(radian Angle                               radian);

pub fn cm_    (x: Length           ) -> f64 { x.get::<unit::centimeter>() }
pub fn mm_    (x: Length           ) -> f64 { x.get::<unit::millimeter>() }
pub fn um_    (x: Length           ) -> f64 { x.get::<unit::micrometer>() }
pub fn kev_   (x: Energy           ) -> f64 { x.get::<unit::kiloelectronvolt>() }
pub fn kv_    (x: ElectricPotential) -> f64 { x.get::<unit::kilovolt>() }
pub fn g_cm3_ (x: MassDensity      ) -> f64 { x.get::<unit::gram_per_cubic_centimeter>() }
pub fn ratio_ (x: Ratio            ) -> f64 { x.get::<unit::ratio>() }
pub fn degree_(x: Angle            ) -> f64 { x.get::<unit::degree>() }
pub fn radian_(x: Angle            ) -> f64 { x.get::<unit::radian>() }

// The base units of the system are cm and g, so these two are stored as-is.
pub fn per_cm (x: f64) -> PerLength   { in_base_unit!(x) }
pub fn cm2_g  (x: f64) -> AreaPerMass { in_base_unit!(x) }
pub fn per_cm_(x: PerLength  ) -> f64 { x.value }
pub fn cm2_g_ (x: AreaPerMass) -> f64 { x.value }

#[cfg(test)]
mod tests {
  use super::*;
  use float_eq::assert_float_eq;

  #[test]
  fn lengths_in_different_units_add_up() {
    let v = vec![um(500.0), mm(1.0), cm(1.0)];
    let total: Length = v.into_iter().sum();
    use unit::millimeter;
    assert_uom_eq!(millimeter, total, mm(11.5), ulps <= 2);
  }

  #[test]
  fn accessors_invert_constructors() {
    assert_float_eq!(kev_(kev(59.3)), 59.3, r2nd <= 1e-12);
    assert_float_eq!( kv_( kv(120.0)), 120.0, r2nd <= 1e-12);
    assert_float_eq!(g_cm3_(g_cm3(2.699)), 2.699, r2nd <= 1e-12);
    assert_float_eq!(degree_(degree(12.0)), 12.0, r2nd <= 1e-12);
    assert_float_eq!(cm_(mm(73.0)), 7.3, r2nd <= 1e-12);
  }

  #[test]
  fn attenuation_coefficients_are_stored_in_cgs_base_units() {
    let mu_rho = cm2_g(0.2059);
    let rho = g_cm3(1.0);
    let mu: PerLength = mu_rho * rho;
    assert_float_eq!(per_cm_(mu), 0.2059, r2nd <= 1e-12);
    let optical_depth: Ratio = mu * cm(5.0);
    assert_float_eq!(ratio_(optical_depth), 1.0295, r2nd <= 1e-12);
  }

  #[test]
  fn quantities_parse_with_units() -> Result<(), Box<dyn std::error::Error>> {
    let t: Length = "5 cm".parse()?;
    assert_float_eq!(cm_(t), 5.0, r2nd <= 1e-12);
    let e: Energy = "59.3 keV".parse()?;
    assert_float_eq!(kev_(e), 59.3, r2nd <= 1e-12);
    let v: ElectricPotential = "120 kV".parse()?;
    assert_float_eq!(kv_(v), 120.0, r2nd <= 1e-12);
    Ok(())
  }
}
