//! Interface to a plotting collaborator.
//!
//! Nothing here draws. A [Plotter] receives the array with its options and
//! renders it however it likes; [rgb_composite] prepares true colour images.

use itertools::Itertools;
use log::debug;

use crate::{
    components::{DataArray, Dataset},
    errors::{CubeError, Result},
};

const ROBUST_PERCENTILES: (f64, f64) = (2.0, 98.0);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlotOptions {
    /// Axis holding the red, green and blue channels.
    pub rgb: Option<String>,
    pub cmap: Option<String>,
    /// Colour limits from the 2nd and 98th percentiles instead of the extremes.
    pub robust: bool,
    /// Axis faceted into one panel per label.
    pub col: Option<String>,
}

impl PlotOptions {
    pub fn with_rgb(mut self, axis: &str) -> Self {
        self.rgb = Some(axis.to_string());
        self
    }

    pub fn with_cmap(mut self, cmap: &str) -> Self {
        self.cmap = Some(cmap.to_string());
        self
    }

    pub fn with_robust(mut self, robust: bool) -> Self {
        self.robust = robust;
        self
    }

    pub fn with_col(mut self, axis: &str) -> Self {
        self.col = Some(axis.to_string());
        self
    }
}

pub trait Plotter {
    fn plot(&mut self, array: &DataArray, options: &PlotOptions) -> Result<()>;
}

impl DataArray {
    /// Hands the array to `plotter` once the options fit its axes.
    pub fn plot(&self, plotter: &mut dyn Plotter, options: &PlotOptions) -> Result<()> {
        if let Some(col) = &options.col {
            self.axis(col)?;
        }
        if let Some(rgb) = &options.rgb {
            let channels = self.axis(rgb)?.len();
            if channels != 3 {
                return Err(CubeError::Alignment {
                    axis: rgb.clone(),
                    reason: format!("an rgb axis needs 3 channels, found {channels}"),
                });
            }
        }
        debug!("Plotting `{}` with {options:?}", self.name());
        plotter.plot(self, options)
    }
}

/// Stacks `bands` into a trailing `band` axis scaled to `[0, 1]`.
///
/// The limits come from the value range, or from its 2nd and 98th
/// percentiles when `robust`. Missing values stay missing.
pub fn rgb_composite(dataset: &Dataset, bands: [&str; 3], robust: bool) -> Result<DataArray> {
    let stacked = dataset.subset(&bands)?.to_array("band", "rgb")?;
    let order = stacked
        .dims()
        .names()
        .filter(|dim| *dim != "band")
        .chain(["band"])
        .collect_vec();
    let composite = stacked.transpose(&order)?;

    let valid = composite
        .values()
        .iter()
        .copied()
        .filter(|value| !value.is_nan())
        .sorted_by(f64::total_cmp)
        .collect_vec();
    let (lo, hi) = if robust {
        (
            percentile(&valid, ROBUST_PERCENTILES.0),
            percentile(&valid, ROBUST_PERCENTILES.1),
        )
    } else {
        (percentile(&valid, 0.0), percentile(&valid, 100.0))
    };
    let span = hi - lo;
    Ok(composite.map(|value| {
        if span > 0.0 {
            ((value - lo) / span).clamp(0.0, 1.0)
        } else if value.is_nan() {
            value
        } else {
            0.0
        }
    }))
}

/// Linearly interpolated percentile of sorted values, NaN when there are none.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let Some(last) = sorted.len().checked_sub(1) else {
        return f64::NAN;
    };
    let rank = q / 100.0 * last as f64;
    let below = rank.floor() as usize;
    let above = rank.ceil() as usize;
    sorted[below] + (sorted[above] - sorted[below]) * (rank - below as f64)
}
