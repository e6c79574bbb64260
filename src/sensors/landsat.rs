use super::{Band, Sensor};

/// Landsat 8/9 collection 2 level 2 surface reflectance.
#[derive(Debug, Clone, Copy, Default)]
pub struct LandsatC2;

const SCALE: f64 = 2.75e-5;
const OFFSET: f64 = -0.2;

impl Sensor for LandsatC2 {
    fn collection(&self) -> &'static str {
        "c2"
    }

    fn aliases(&self, band: Band) -> &'static [&'static str] {
        match band {
            Band::Blue => &["blue", "SR_B2"],
            Band::Green => &["green", "SR_B3"],
            Band::Red => &["red", "SR_B4"],
            Band::Nir => &["nir", "nir08", "SR_B5"],
            Band::Swir1 => &["swir_1", "swir16", "SR_B6"],
            Band::Swir2 => &["swir_2", "swir22", "SR_B7"],
        }
    }

    fn scale(&self, value: f64) -> f64 {
        value * SCALE + OFFSET
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn offset_applies_after_scale() {
        assert!((LandsatC2.scale(10_000.0) - 0.075).abs() < 1e-12);
    }

    #[rstest]
    fn nir_aliases() {
        assert_eq!(LandsatC2.aliases(Band::Nir), &["nir", "nir08", "SR_B5"]);
    }
}
