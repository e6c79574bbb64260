use log::debug;

use crate::{
    components::{DataArray, Dataset},
    errors::Result,
    sensors::{Band, Sensor},
};

/// Band ratio indices computed on surface reflectance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SpectralIndex {
    /// Normalised difference vegetation index.
    Ndvi,
    /// Enhanced vegetation index.
    Evi,
    /// Soil adjusted vegetation index.
    Savi,
    /// Normalised difference water index.
    Ndwi,
    /// Normalised difference moisture index.
    Ndmi,
    /// Normalised burn ratio.
    Nbr,
}

impl SpectralIndex {
    pub fn name(&self) -> &'static str {
        match self {
            SpectralIndex::Ndvi => "NDVI",
            SpectralIndex::Evi => "EVI",
            SpectralIndex::Savi => "SAVI",
            SpectralIndex::Ndwi => "NDWI",
            SpectralIndex::Ndmi => "NDMI",
            SpectralIndex::Nbr => "NBR",
        }
    }

    pub fn bands(&self) -> &'static [Band] {
        match self {
            SpectralIndex::Ndvi | SpectralIndex::Savi => &[Band::Nir, Band::Red],
            SpectralIndex::Evi => &[Band::Nir, Band::Red, Band::Blue],
            SpectralIndex::Ndwi => &[Band::Green, Band::Nir],
            SpectralIndex::Ndmi => &[Band::Nir, Band::Swir1],
            SpectralIndex::Nbr => &[Band::Nir, Band::Swir2],
        }
    }

    /// Computes the index of `dataset` as read by `sensor`.
    pub fn compute(&self, dataset: &Dataset, sensor: &dyn Sensor) -> Result<DataArray> {
        let band = |which: Band| sensor.reflectance(dataset, which);
        let index = match self {
            SpectralIndex::Ndvi => normalised_difference(&band(Band::Nir)?, &band(Band::Red)?)?,
            SpectralIndex::Ndwi => normalised_difference(&band(Band::Green)?, &band(Band::Nir)?)?,
            SpectralIndex::Ndmi => normalised_difference(&band(Band::Nir)?, &band(Band::Swir1)?)?,
            SpectralIndex::Nbr => normalised_difference(&band(Band::Nir)?, &band(Band::Swir2)?)?,
            SpectralIndex::Evi => {
                let (nir, red, blue) = (band(Band::Nir)?, band(Band::Red)?, band(Band::Blue)?);
                let numerator = nir.sub(&red)?.map(|value| 2.5 * value);
                let denominator = nir
                    .add(&red.map(|value| 6.0 * value))?
                    .sub(&blue.map(|value| 7.5 * value))?
                    .map(|value| value + 1.0);
                numerator.div(&denominator)?
            }
            SpectralIndex::Savi => {
                let (nir, red) = (band(Band::Nir)?, band(Band::Red)?);
                let numerator = nir.sub(&red)?.map(|value| 1.5 * value);
                numerator.div(&nir.add(&red)?.map(|value| value + 0.5))?
            }
        };
        Ok(index.renamed(self.name()))
    }
}

fn normalised_difference(lhs: &DataArray, rhs: &DataArray) -> Result<DataArray> {
    lhs.sub(rhs)?.div(&lhs.add(rhs)?)
}

/// Adds one variable per index, named like `NDVI`.
pub fn calculate_indices(
    dataset: &Dataset,
    indices: &[SpectralIndex],
    sensor: &dyn Sensor,
) -> Result<Dataset> {
    let mut result = dataset.clone();
    for index in indices {
        debug!("Calculating {} for collection `{}`", index.name(), sensor.collection());
        result.insert_array(index.compute(dataset, sensor)?)?;
    }
    Ok(result)
}

impl Dataset {
    pub fn with_indices(&self, indices: &[SpectralIndex], sensor: &dyn Sensor) -> Result<Self> {
        calculate_indices(self, indices, sensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::CubeError,
        sensors::{LandsatC2, Sentinel2},
        testing::scenes,
    };
    use itertools::Itertools;
    use rstest::rstest;

    #[rstest]
    fn indices_become_variables() {
        let ds = scenes();
        let indexed = calculate_indices(
            &ds,
            &[SpectralIndex::Ndvi, SpectralIndex::Evi, SpectralIndex::Savi],
            &Sentinel2,
        )
        .unwrap();
        assert_eq!(
            indexed.names().collect_vec(),
            ["blue", "green", "red", "nir", "NDVI", "EVI", "SAVI"]
        );
        let (nir, red, blue) = (0.2, 0.06, 0.01);
        let at = |name: &str| indexed.get(name).unwrap().at(&[0, 0, 0]).unwrap();
        assert!((at("NDVI") - (nir - red) / (nir + red)).abs() < 1e-12);
        let evi = 2.5 * (nir - red) / (nir + 6.0 * red - 7.5 * blue + 1.0);
        assert!((at("EVI") - evi).abs() < 1e-12);
        let savi = 1.5 * (nir - red) / (nir + red + 0.5);
        assert!((at("SAVI") - savi).abs() < 1e-12);
    }

    #[rstest]
    fn normalised_indices_ignore_scaling() {
        let ds = scenes();
        let s2 = SpectralIndex::Ndwi.compute(&ds, &Sentinel2).unwrap();
        let expected = (200.0 - 2000.0) / (200.0 + 2000.0);
        assert!((s2.at(&[0, 0, 0]).unwrap() - expected).abs() < 1e-12);
        assert_eq!(s2.name(), "NDWI");

        let c2 = SpectralIndex::Ndwi.compute(&ds, &LandsatC2).unwrap();
        assert!(c2.at(&[0, 0, 0]).unwrap().is_finite());
    }

    #[rstest]
    fn missing_band_is_reported_by_common_name() {
        assert!(matches!(
            calculate_indices(&scenes(), &[SpectralIndex::Nbr], &Sentinel2),
            Err(CubeError::VariableNotFound(name)) if name == "swir_2"
        ));
    }
}
