use super::{Band, Sensor};

/// Sentinel-2 level 2A surface reflectance.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sentinel2;

impl Sensor for Sentinel2 {
    fn collection(&self) -> &'static str {
        "s2"
    }

    fn aliases(&self, band: Band) -> &'static [&'static str] {
        match band {
            Band::Blue => &["blue", "B02"],
            Band::Green => &["green", "B03"],
            Band::Red => &["red", "B04"],
            Band::Nir => &["nir", "nir_1", "B08"],
            Band::Swir1 => &["swir_1", "swir1", "B11"],
            Band::Swir2 => &["swir_2", "swir2", "B12"],
        }
    }

    fn scale(&self, value: f64) -> f64 {
        value / 10_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Band::Nir, "nir_1")]
    #[case(Band::Swir2, "B12")]
    fn band_names(#[case] band: Band, #[case] alias: &str) {
        assert!(Sentinel2.aliases(band).contains(&alias));
    }

    #[rstest]
    fn digital_numbers_scale_to_reflectance() {
        assert_eq!(Sentinel2.scale(2500.0), 0.25);
    }
}
