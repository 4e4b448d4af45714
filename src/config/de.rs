//! Deserializers for `uom` quantities written with explicit units.
//!
//! TOML knows nothing about units, so quantities are written as strings,
//! such as `thickness = "73 mm"` or `kvp = "120 kV"`, which are first read as
//! strings and then parsed with the parsers provided by `uom`. Without these
//! helpers serde would happily accept a bare number and silently interpret it
//! in the base unit of the quantity, which defeats the point of `uom`.
//!
//! Fields using `deserialize_uom_opt` must also be marked `#[serde(default)]`
//! to be truly optional.

use std::str::FromStr;

use serde::{Deserialize, Deserializer, de};

pub fn deserialize_uom<'d, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'d>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    String::deserialize(deserializer)?
        .trim()
        .parse::<T>()
        .map_err(de::Error::custom)
}

pub fn deserialize_uom_opt<'d, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'d>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    Option::<String>::deserialize(deserializer)?
        .map(|s| s.trim().parse::<T>())
        .transpose()
        .map_err(de::Error::custom)
}

pub fn deserialize_uom_vec<'d, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'d>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    Vec::<String>::deserialize(deserializer)?
        .iter()
        .map(|s| s.trim().parse::<T>())
        .collect::<Result<_, _>>()
        .map_err(de::Error::custom)
}
