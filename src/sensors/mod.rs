use std::fmt::Debug;

mod landsat;
mod sentinel2;
pub use landsat::LandsatC2;
pub use sentinel2::Sentinel2;

use crate::{
    components::{DataArray, Dataset},
    errors::{CubeError, Result},
};

/// Common spectral bands shared across collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Band {
    Blue,
    Green,
    Red,
    Nir,
    Swir1,
    Swir2,
}

impl Band {
    pub fn name(&self) -> &'static str {
        match self {
            Band::Blue => "blue",
            Band::Green => "green",
            Band::Red => "red",
            Band::Nir => "nir",
            Band::Swir1 => "swir_1",
            Band::Swir2 => "swir_2",
        }
    }
}

/// Naming and scaling conventions of a sensor collection.
pub trait Sensor: Debug + Send + Sync {
    /// Collection identifier, e.g. `"s2"`.
    fn collection(&self) -> &'static str;

    /// Measurement names a band may be stored under, preferred first.
    fn aliases(&self, band: Band) -> &'static [&'static str];

    /// Raw value marking pixels without data.
    fn nodata(&self) -> Option<f64> {
        Some(0.0)
    }

    /// Raw digital number to surface reflectance.
    fn scale(&self, value: f64) -> f64;

    /// Scaled reflectance of `band`, nodata pixels missing.
    fn reflectance(&self, dataset: &Dataset, band: Band) -> Result<DataArray> {
        let name = self
            .aliases(band)
            .iter()
            .find(|alias| dataset.variable(alias).is_ok())
            .ok_or_else(|| CubeError::VariableNotFound(band.name().to_string()))?;
        let nodata = self.nodata();
        Ok(dataset.get(name)?.map(|value| {
            if Some(value) == nodata {
                f64::NAN
            } else {
                self.scale(value)
            }
        }))
    }
}

/// Sensor registered under `collection`.
pub fn sensor(collection: &str) -> Result<Box<dyn Sensor>> {
    match collection {
        "s2" => Ok(Box::new(Sentinel2)),
        "c2" => Ok(Box::new(LandsatC2)),
        other => Err(CubeError::InvalidQuery(format!(
            "unknown sensor collection `{other}`"
        ))),
    }
}
