mod groupby;
mod resample;

pub use groupby::{GroupBy, GroupKey};
pub use resample::Frequency;

use itertools::Itertools;
use ndarray::{Array2, ArrayD, ArrayView1, Axis as NdAxis, IxDyn};
use rayon::prelude::*;

use crate::{
    components::{DataArray, Dataset, Variable, MISSING},
    errors::Result,
};

/// Statistic computed over the values of a lane, skipping missing ones.
///
/// A lane without valid values gives [MISSING], except for `Sum` and
/// `Count` which give `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Reduction {
    Min,
    Max,
    Mean,
    Median,
    Sum,
    /// Population standard deviation.
    Std,
    Count,
    /// First valid value in lane order.
    First,
}

impl Reduction {
    pub fn apply(&self, lane: ArrayView1<f64>) -> f64 {
        let valid = lane.iter().copied().filter(|value| !value.is_nan()).collect_vec();
        let count = valid.len() as f64;
        match self {
            Reduction::Sum => valid.iter().sum(),
            Reduction::Count => count,
            _ if valid.is_empty() => MISSING,
            Reduction::First => valid[0],
            Reduction::Min => valid.iter().copied().fold(f64::INFINITY, f64::min),
            Reduction::Max => valid.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Reduction::Mean => valid.iter().sum::<f64>() / count,
            Reduction::Median => {
                let sorted = valid.into_iter().sorted_by(f64::total_cmp).collect_vec();
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
            Reduction::Std => {
                let mean = valid.iter().sum::<f64>() / count;
                let var = valid.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / count;
                var.sqrt()
            }
        }
    }
}

/// Reduces `variable` over those of `dims` it has, lanes run in parallel.
pub(crate) fn reduce_variable(
    variable: &Variable,
    dims: &[&str],
    reduction: Reduction,
) -> Result<Variable> {
    let (reduced, kept): (Vec<usize>, Vec<usize>) = (0..variable.dims.len())
        .partition(|idx| dims.contains(&variable.dims[*idx].as_ref()));
    if reduced.is_empty() {
        return Ok(variable.clone());
    }
    let shape = variable.data.shape();
    let kept_shape = kept.iter().map(|idx| shape[*idx]).collect_vec();
    let lane_len = reduced.iter().map(|idx| shape[*idx]).product::<usize>();
    let lanes_count = kept_shape.iter().product::<usize>();

    let order = kept.iter().chain(reduced.iter()).copied().collect_vec();
    let permuted = variable.view().permuted_axes(IxDyn(&order));
    let lanes = Array2::from_shape_vec(
        (lanes_count, lane_len),
        permuted.iter().copied().collect(),
    )?;
    let values = lanes
        .axis_iter(NdAxis(0))
        .into_par_iter()
        .map(|lane| reduction.apply(lane))
        .collect::<Vec<_>>();
    let data = ArrayD::from_shape_vec(IxDyn(&kept_shape), values)?;
    Ok(variable.with_data(variable.dims.without(dims), data))
}

impl Dataset {
    /// Collapses `dims`, dropping them from every variable that has them.
    pub fn reduce(&self, dims: &[&str], reduction: Reduction) -> Result<Self> {
        dims.iter().try_for_each(|dim| self.axis(dim).map(|_| ()))?;
        let variables = self
            .variables()
            .iter()
            .map(|variable| reduce_variable(variable, dims, reduction))
            .collect::<Result<Vec<_>>>()?;
        let axes = self
            .axes()
            .iter()
            .filter(|axis| !dims.contains(&axis.name.as_ref()))
            .cloned()
            .collect();
        Ok(Dataset::from_parts(axes, variables, self.attrs().clone()))
    }

    pub fn reduce_all(&self, reduction: Reduction) -> Result<Self> {
        let dims = self.axes().names().collect_vec();
        self.reduce(&dims, reduction)
    }

    pub fn mean(&self, dims: &[&str]) -> Result<Self> {
        self.reduce(dims, Reduction::Mean)
    }
}

impl DataArray {
    pub fn reduce(&self, dims: &[&str], reduction: Reduction) -> Result<Self> {
        self.via_dataset(|ds| ds.reduce(dims, reduction))
    }

    /// Reduces every axis to a single value.
    pub fn reduce_all(&self, reduction: Reduction) -> Result<f64> {
        self.via_dataset(|ds| ds.reduce_all(reduction))?.at(&[])
    }

    pub fn mean(&self, dims: &[&str]) -> Result<Self> {
        self.reduce(dims, Reduction::Mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{errors::CubeError, testing::scenes};
    use ndarray::array;
    use rstest::rstest;

    #[rstest]
    #[case(Reduction::Min, 1.0)]
    #[case(Reduction::Max, 7.0)]
    #[case(Reduction::Mean, 4.0)]
    #[case(Reduction::Median, 4.0)]
    #[case(Reduction::Sum, 16.0)]
    #[case(Reduction::Std, 5f64.sqrt())]
    #[case(Reduction::Count, 4.0)]
    #[case(Reduction::First, 1.0)]
    fn missing_values_are_skipped(#[case] reduction: Reduction, #[case] expected: f64) {
        let lane = array![1.0, MISSING, 7.0, 3.0, 5.0];
        assert!((reduction.apply(lane.view()) - expected).abs() < 1e-12);
    }

    #[rstest]
    #[case(Reduction::Mean, true)]
    #[case(Reduction::Median, true)]
    #[case(Reduction::First, true)]
    #[case(Reduction::Sum, false)]
    #[case(Reduction::Count, false)]
    fn all_missing_lane(#[case] reduction: Reduction, #[case] missing: bool) {
        let lane = array![MISSING, MISSING];
        let value = reduction.apply(lane.view());
        assert_eq!(value.is_nan(), missing);
        if !missing {
            assert_eq!(value, 0.0);
        }
    }

    #[rstest]
    fn reducing_drops_axes() {
        let ds = scenes();
        let composite = ds.reduce(&["time"], Reduction::Median).unwrap();
        assert!(!composite.axes().contains("time"));
        let blue = composite.get("blue").unwrap();
        assert_eq!(blue.shape(), &[2, 3]);
        // time stride is 6 in the ramp, median of 0,6,..,30 is 15
        assert_eq!(blue.at(&[0, 0]).unwrap(), 115.0);
        assert_eq!(blue.at(&[1, 2]).unwrap(), 120.0);
    }

    #[rstest]
    fn reducing_spatial_axes_keeps_time() {
        let red = scenes().get("red").unwrap();
        let series = red.reduce(&["y", "x"], Reduction::Max).unwrap();
        assert_eq!(series.dims().len(), 1);
        assert_eq!(series.at(&[0]).unwrap(), 600.0 + 5.0 * 5.0);
    }

    #[rstest]
    fn reduce_all_is_a_scalar() {
        let green = scenes().get("green").unwrap();
        assert_eq!(green.reduce_all(Reduction::Count).unwrap(), 36.0);
        assert_eq!(green.reduce_all(Reduction::Min).unwrap(), 200.0);
    }

    #[rstest]
    fn unknown_axis_fails() {
        assert!(matches!(
            scenes().reduce(&["band"], Reduction::Mean),
            Err(CubeError::AxisNotFound(_))
        ));
    }
}
