use itertools::Itertools;
use log::debug;
use ndarray::{ArrayD, Zip};

use crate::{
    components::{Axis, Coordinate, DataArray, Dataset, Label, Lookup, Variable},
    errors::{CubeError, Result},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum InterpMethod {
    #[default]
    Linear,
    Nearest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InterpOptions {
    pub method: InterpMethod,
    /// Allows targets outside the covered range of the axis.
    pub extrapolate: bool,
}

impl InterpOptions {
    pub fn with_method(mut self, method: InterpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_extrapolate(mut self, extrapolate: bool) -> Self {
        self.extrapolate = extrapolate;
        self
    }
}

/// Output value is `source[lo] + (source[hi] - source[lo]) * weight`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Stencil {
    lo: usize,
    hi: usize,
    weight: f64,
}

impl Stencil {
    fn exact(position: usize) -> Self {
        Self {
            lo: position,
            hi: position,
            weight: 0.0,
        }
    }
}

fn numeric(axis: &str, label: &Label) -> Result<f64> {
    label
        .as_f64()
        .ok_or_else(|| CubeError::NotNumeric(axis.to_string()))
}

fn stencils(axis: &Axis, targets: &Coordinate, options: &InterpOptions) -> Result<Vec<Stencil>> {
    let name = axis.name.as_ref();
    let source = axis
        .labels()
        .iter()
        .map(|label| numeric(name, label))
        .collect::<Result<Vec<_>>>()?;
    // positions ordered by coordinate value
    let order = (0..source.len())
        .sorted_by(|lhs, rhs| source[*lhs].total_cmp(&source[*rhs]))
        .collect_vec();

    targets
        .labels()
        .iter()
        .map(|label| {
            let target = numeric(name, label)?;
            if let Some(first) = axis.labels().first() {
                if first.compare(label).is_none() {
                    return Err(CubeError::Alignment {
                        axis: name.to_string(),
                        reason: format!("target {label} does not fit its labels"),
                    });
                }
            }
            if let Some(position) = axis.position(label) {
                return Ok(Stencil::exact(position));
            }
            let above = order.partition_point(|idx| source[*idx] < target);
            let inside = above > 0 && above < order.len();
            if !inside && !options.extrapolate {
                return Err(CubeError::Extrapolation {
                    axis: name.to_string(),
                    label: label.clone(),
                });
            }
            let nearest = || {
                axis.nearest(label)
                    .map(Stencil::exact)
                    .ok_or_else(|| CubeError::Extrapolation {
                        axis: name.to_string(),
                        label: label.clone(),
                    })
            };
            if options.method == InterpMethod::Nearest || order.len() < 2 {
                return nearest();
            }
            // outside the range the two closest distinct samples set the slope
            let (lo, hi) = if above == 0 {
                let lo = order[0];
                match order.iter().find(|idx| source[**idx] > source[lo]) {
                    Some(hi) => (lo, *hi),
                    None => return nearest(),
                }
            } else if above == order.len() {
                let hi = order[above - 1];
                match order.iter().rev().find(|idx| source[**idx] < source[hi]) {
                    Some(lo) => (*lo, hi),
                    None => return nearest(),
                }
            } else {
                (order[above - 1], order[above])
            };
            let weight = (target - source[lo]) / (source[hi] - source[lo]);
            Ok(Stencil { lo, hi, weight })
        })
        .collect()
}

fn interp_variable(variable: &Variable, axis: &str, stencils: &[Stencil]) -> Result<Variable> {
    let Some(nd_axis) = variable.axis_of(axis) else {
        return Ok(variable.clone());
    };
    let mut shape = variable.data.shape().to_vec();
    shape[nd_axis.index()] = stencils.len();
    let mut data = ArrayD::zeros(shape);
    for (position, stencil) in stencils.iter().enumerate() {
        let lo = variable.data.index_axis(nd_axis, stencil.lo);
        let hi = variable.data.index_axis(nd_axis, stencil.hi);
        let weight = stencil.weight;
        Zip::from(data.index_axis_mut(nd_axis, position))
            .and(&lo)
            .and(&hi)
            .for_each(|out, &lo, &hi| {
                *out = if weight == 0.0 {
                    lo
                } else {
                    lo + (hi - lo) * weight
                }
            });
    }
    Ok(variable.with_data(variable.dims.clone(), data))
}

impl Dataset {
    /// Values at `targets` along `axis` from the neighbours on either side.
    ///
    /// The output axis holds exactly the target labels.
    pub fn interp(
        &self,
        axis: &str,
        targets: &Coordinate,
        options: &InterpOptions,
    ) -> Result<Self> {
        let source = self.axis(axis)?;
        let stencils = stencils(source, targets, options)?;
        debug!("Interpolating {} targets along `{axis}`", stencils.len());
        let variables = self
            .variables()
            .iter()
            .map(|variable| interp_variable(variable, axis, &stencils))
            .collect::<Result<Vec<_>>>()?;
        let mut axes = self.axes().clone();
        axes.upsert(source.with_coord(targets.clone()));
        Ok(Dataset::from_parts(axes, variables, self.attrs().clone()))
    }
}

impl DataArray {
    pub fn interp(
        &self,
        axis: &str,
        targets: &Coordinate,
        options: &InterpOptions,
    ) -> Result<Self> {
        self.via_dataset(|ds| ds.interp(axis, targets, options))
    }
}
