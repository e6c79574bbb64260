use itertools::Itertools;
use ndarray::{ArrayD, ArrayViewD, Axis as NdAxis, Zip};

use crate::{
    components::{array::broadcast_view, Axes, DataArray, Dataset, Dims, Variable, MISSING},
    errors::{CubeError, Result},
    indexes::Indexes,
};

/// Boolean array over named, labelled axes.
#[derive(Debug, Clone)]
pub struct Mask {
    values: ArrayD<bool>,
    dims: Dims,
    axes: Axes,
}

impl Mask {
    /// Mask whose dims follow the order of `axes`.
    pub fn new(axes: Axes, values: ArrayD<bool>) -> Result<Self> {
        let expected = axes.iter().map(|axis| axis.len()).collect_vec();
        if expected != values.shape() {
            return Err(CubeError::ShapeMismatch {
                variable: "mask".into(),
                expected,
                found: values.shape().to_vec(),
            });
        }
        let dims = axes.names().collect();
        Ok(Self { values, dims, axes })
    }

    pub fn values(&self) -> ArrayViewD<'_, bool> {
        self.values.view()
    }

    pub fn dims(&self) -> &Dims {
        &self.dims
    }

    pub fn axes(&self) -> &Axes {
        &self.axes
    }

    pub fn count(&self) -> usize {
        self.values.iter().filter(|value| **value).count()
    }

    pub fn not(&self) -> Self {
        Self {
            values: self.values.mapv(|value| !value),
            ..self.clone()
        }
    }

    pub fn and(&self, other: &Mask) -> Result<Self> {
        self.combine(other, |lhs, rhs| lhs && rhs)
    }

    pub fn or(&self, other: &Mask) -> Result<Self> {
        self.combine(other, |lhs, rhs| lhs || rhs)
    }

    fn combine(&self, other: &Mask, op: impl Fn(bool, bool) -> bool) -> Result<Self> {
        self.check_axes(&other.axes)?;
        let shape = self.values.shape();
        let other = broadcast_view(other.values.view(), &other.dims, &self.dims, shape)
            .ok_or_else(|| self.misaligned("masks span different dims"))?;
        let values = Zip::from(&self.values)
            .and(&other)
            .map_collect(|&lhs, &rhs| op(lhs, rhs));
        Ok(Self {
            values,
            ..self.clone()
        })
    }

    /// Axes shared with `axes` must carry the same labels.
    fn check_axes(&self, axes: &Axes) -> Result<()> {
        for axis in self.axes.iter() {
            let Some(other) = axes.find(&axis.name) else {
                continue;
            };
            if other.coord != axis.coord {
                return Err(CubeError::Alignment {
                    axis: axis.name.to_string(),
                    reason: "mask labels differ".into(),
                });
            }
        }
        Ok(())
    }

    fn misaligned(&self, reason: &str) -> CubeError {
        CubeError::Alignment {
            axis: self.dims.names().join(", "),
            reason: reason.into(),
        }
    }

    /// Positions of each mask axis with at least one passing value.
    fn passing_positions(&self) -> Vec<(&str, Indexes)> {
        self.dims
            .names()
            .enumerate()
            .map(|(idx, dim)| {
                let positions = self
                    .values
                    .axis_iter(NdAxis(idx))
                    .positions(|lane| lane.iter().any(|value| *value))
                    .collect_vec();
                (dim, Indexes::from(positions))
            })
            .collect()
    }
}

/// Test applied to each value.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Comparison {
    Gt(f64),
    Ge(f64),
    Lt(f64),
    Le(f64),
    Eq(f64),
    Ne(f64),
    IsIn(Vec<f64>),
}

impl Comparison {
    /// Missing values fail every test but `Ne`.
    pub fn test(&self, value: f64) -> bool {
        match self {
            Comparison::Gt(rhs) => value > *rhs,
            Comparison::Ge(rhs) => value >= *rhs,
            Comparison::Lt(rhs) => value < *rhs,
            Comparison::Le(rhs) => value <= *rhs,
            Comparison::Eq(rhs) => value == *rhs,
            Comparison::Ne(rhs) => value != *rhs,
            Comparison::IsIn(set) => set.contains(&value),
        }
    }
}

/// Comparison on a named variable of a dataset.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Predicate {
    pub variable: String,
    pub comparison: Comparison,
}

impl Predicate {
    pub fn new(variable: &str, comparison: Comparison) -> Self {
        Self {
            variable: variable.to_string(),
            comparison,
        }
    }

    pub fn evaluate(&self, dataset: &Dataset) -> Result<Mask> {
        Ok(dataset.get(&self.variable)?.compare(&self.comparison))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MaskOptions {
    /// Written where the mask fails.
    pub fill: f64,
    /// Removes positions of mask axes that fail everywhere.
    pub drop: bool,
}

impl Default for MaskOptions {
    fn default() -> Self {
        Self {
            fill: MISSING,
            drop: false,
        }
    }
}

impl MaskOptions {
    pub fn with_fill(mut self, fill: f64) -> Self {
        self.fill = fill;
        self
    }

    pub fn with_drop(mut self, drop: bool) -> Self {
        self.drop = drop;
        self
    }
}

impl DataArray {
    pub fn compare(&self, comparison: &Comparison) -> Mask {
        Mask {
            values: self.data().mapv(|value| comparison.test(value)),
            dims: self.dims().clone(),
            axes: self.axes().clone(),
        }
    }

    /// Membership of each value in `values`.
    pub fn isin(&self, values: &[f64]) -> Mask {
        self.compare(&Comparison::IsIn(values.to_vec()))
    }

    pub fn where_(&self, mask: &Mask, options: &MaskOptions) -> Result<Self> {
        self.via_dataset(|ds| ds.where_(mask, options))
    }
}

impl Dataset {
    /// Keeps values where `mask` holds, writes the fill value elsewhere.
    ///
    /// Variables lacking one of the mask dims are left as they are.
    pub fn where_(&self, mask: &Mask, options: &MaskOptions) -> Result<Self> {
        for axis in mask.axes.iter() {
            self.axis(&axis.name)?;
        }
        mask.check_axes(self.axes())?;
        let variables = self
            .variables()
            .iter()
            .map(|variable| fill_variable(variable, mask, options.fill))
            .collect::<Result<Vec<_>>>()?;
        let filled = Dataset::from_parts(self.axes().clone(), variables, self.attrs().clone());
        if options.drop {
            filled.isel(&mask.passing_positions())
        } else {
            Ok(filled)
        }
    }
}

fn fill_variable(variable: &Variable, mask: &Mask, fill: f64) -> Result<Variable> {
    if !mask.dims.names().all(|dim| variable.has_dim(dim)) {
        return Ok(variable.clone());
    }
    let keep = broadcast_view(mask.values(), &mask.dims, &variable.dims, variable.data.shape())
        .ok_or_else(|| mask.misaligned("mask cannot be broadcast"))?;
    let data = Zip::from(&variable.data)
        .and(&keep)
        .map_collect(|&value, &keep| if keep { value } else { fill });
    Ok(variable.with_data(variable.dims.clone(), data))
}
