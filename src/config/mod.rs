//! Scenario files: TOML with quantities written with their units.

pub mod de;
pub mod scenario;

use std::fs;
use std::path::Path;

use crate::{DesimError, Result};
pub use scenario::Scenario;

pub fn read_config_file(path: impl AsRef<Path>) -> Result<Scenario> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| DesimError::Config(format!("couldn't read `{}`: {e}", path.display())))?;
    toml::from_str(&text)
        .map_err(|e| DesimError::Config(format!("`{}`: {e}", path.display())))
}
