use itertools::Itertools;
use ndarray::{ArrayD, ArrayViewD, Axis as NdAxis, IxDyn, Zip};
use num_traits::AsPrimitive;
use std::fmt::Display;

use crate::{
    components::{
        dataset::check_against,
        Attrs, Axes, Axis, Dataset, Dims, Variable,
    },
    errors::{CubeError, Result},
};

/// A single variable together with the coordinates of its axes.
#[derive(Debug, Clone)]
pub struct DataArray {
    variable: Variable,
    axes: Axes,
}

impl DataArray {
    /// Array whose dims follow the order of `axes`.
    pub fn new(name: &str, axes: Axes, data: ArrayD<f64>) -> Result<Self> {
        let dims: Dims = axes.names().collect();
        let variable = Variable::new(name, dims, data)?;
        check_against(&axes, &variable)?;
        Ok(Self { variable, axes })
    }

    /// Converts raw sensor values, e.g. `u16` reflectances.
    pub fn from_raw<T>(name: &str, axes: Axes, data: ArrayD<T>) -> Result<Self>
    where
        T: AsPrimitive<f64>,
    {
        Self::new(name, axes, data.mapv(|value| value.as_()))
    }

    pub(crate) fn from_parts(variable: Variable, axes: Axes) -> Self {
        Self { variable, axes }
    }

    pub(crate) fn into_parts(self) -> (Variable, Axes) {
        (self.variable, self.axes)
    }

    pub fn name(&self) -> &str {
        &self.variable.name
    }

    pub fn renamed(mut self, name: &str) -> Self {
        self.variable = self.variable.renamed(name);
        self
    }

    pub fn dims(&self) -> &Dims {
        &self.variable.dims
    }

    pub fn shape(&self) -> &[usize] {
        self.variable.data.shape()
    }

    pub fn data(&self) -> &ndarray::ArcArray<f64, IxDyn> {
        &self.variable.data
    }

    pub fn values(&self) -> ArrayViewD<'_, f64> {
        self.variable.view()
    }

    pub fn variable(&self) -> &Variable {
        &self.variable
    }

    pub fn axes(&self) -> &Axes {
        &self.axes
    }

    pub fn axis(&self, name: &str) -> Result<&Axis> {
        self.axes.get(name)
    }

    pub fn attrs(&self) -> &Attrs {
        &self.variable.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attrs {
        &mut self.variable.attrs
    }

    /// Value at one position per dimension.
    pub fn at(&self, index: &[usize]) -> Result<f64> {
        if index.len() != self.shape().len() {
            return Err(CubeError::ShapeMismatch {
                variable: self.name().to_string(),
                expected: self.shape().to_vec(),
                found: index.to_vec(),
            });
        }
        for (axis, (&idx, &len)) in self.axes.iter().zip(index.iter().zip(self.shape())) {
            if idx >= len {
                return Err(CubeError::IndexOutOfBounds {
                    axis: axis.name.to_string(),
                    index: idx,
                    len,
                });
            }
        }
        Ok(self.variable.data[index])
    }

    pub fn into_dataset(self) -> Dataset {
        let (variable, axes) = self.into_parts();
        Dataset::from_parts(axes, vec![variable], Attrs::new())
    }

    /// Runs a dataset operation on this array and picks the result back out.
    pub(crate) fn via_dataset<F>(&self, op: F) -> Result<Self>
    where
        F: FnOnce(Dataset) -> Result<Dataset>,
    {
        op(self.clone().into_dataset())?.get(self.name())
    }

    /// Splits `axis` into one variable per label.
    pub fn to_dataset(&self, axis: &str) -> Result<Dataset> {
        let split = self.axis(axis)?;
        let nd_axis = self
            .variable
            .axis_of(axis)
            .ok_or_else(|| CubeError::AxisNotFound(axis.to_string()))?;
        let dims = self.variable.dims.without(&[axis]);
        let variables = split
            .coord
            .iter()
            .enumerate()
            .map(|(idx, label)| {
                let data = self.variable.data.index_axis(nd_axis, idx).to_owned();
                Variable::new(&label.to_name(), dims.clone(), data)
            })
            .collect::<Result<Vec<_>>>()?;
        let axes = self
            .axes
            .iter()
            .filter(|other| other.name != split.name)
            .cloned()
            .collect();
        Dataset::new(axes, variables)
    }

    /// Reorders the dimensions, `dims` must name each of them once.
    pub fn transpose(&self, dims: &[&str]) -> Result<Self> {
        let order = dims
            .iter()
            .map(|dim| {
                self.variable
                    .dims
                    .index_of(dim)
                    .ok_or_else(|| CubeError::AxisNotFound(dim.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        if order.len() != self.dims().len() || order.iter().unique().count() != order.len() {
            return Err(CubeError::Alignment {
                axis: dims.join(", "),
                reason: format!("is not an ordering of `{}`", self.dims().names().join(", ")),
            });
        }
        let data = self
            .variable
            .view()
            .permuted_axes(IxDyn(&order))
            .as_standard_layout()
            .into_owned();
        let axes = order.iter().map(|idx| self.axes[*idx].clone()).collect();
        Ok(Self {
            variable: self.variable.with_data(dims.iter().copied().collect(), data),
            axes,
        })
    }

    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(f64) -> f64,
    {
        let data = self.variable.data.mapv(f);
        Self {
            variable: self.variable.with_data(self.variable.dims.clone(), data),
            axes: self.axes.clone(),
        }
    }

    /// Elementwise combination aligned by axis name.
    ///
    /// Shared axes need identical labels; the result spans the dims of both.
    pub fn zip_with<F>(&self, other: &DataArray, f: F) -> Result<Self>
    where
        F: Fn(f64, f64) -> f64,
    {
        for axis in self.axes.iter() {
            if let Some(theirs) = other.axes.find(&axis.name) {
                if theirs.coord != axis.coord {
                    return Err(CubeError::Alignment {
                        axis: axis.name.to_string(),
                        reason: format!(
                            "`{}` and `{}` have different labels",
                            self.name(),
                            other.name()
                        ),
                    });
                }
            }
        }
        let axes: Axes = self
            .axes
            .iter()
            .chain(other.axes.iter().filter(|axis| !self.axes.contains(&axis.name)))
            .cloned()
            .collect();
        let dims: Dims = axes.names().collect();
        let shape = axes.iter().map(Axis::len).collect_vec();
        let lhs = broadcast_to(&self.variable, &dims, &shape)?;
        let rhs = broadcast_to(&other.variable, &dims, &shape)?;
        let data = Zip::from(&lhs).and(&rhs).map_collect(|&x, &y| f(x, y));
        Ok(Self {
            variable: self.variable.with_data(dims, data),
            axes,
        })
    }

    pub fn add(&self, other: &DataArray) -> Result<Self> {
        self.zip_with(other, |x, y| x + y)
    }

    pub fn sub(&self, other: &DataArray) -> Result<Self> {
        self.zip_with(other, |x, y| x - y)
    }

    pub fn mul(&self, other: &DataArray) -> Result<Self> {
        self.zip_with(other, |x, y| x * y)
    }

    pub fn div(&self, other: &DataArray) -> Result<Self> {
        self.zip_with(other, |x, y| x / y)
    }
}

/// Values of `variable` laid out over `dims`, repeated along dims it lacks.
pub(crate) fn broadcast_to(
    variable: &Variable,
    dims: &Dims,
    shape: &[usize],
) -> Result<ArrayD<f64>> {
    broadcast_view(variable.view(), &variable.dims, dims, shape).ok_or_else(|| {
        CubeError::Alignment {
            axis: dims.names().join(", "),
            reason: format!("`{}` cannot be broadcast", variable.name),
        }
    })
}

/// Lays `view` over `to`, `None` when `from` holds dims outside of `to`.
pub(crate) fn broadcast_view<A: Clone>(
    view: ArrayViewD<'_, A>,
    from: &Dims,
    to: &Dims,
    shape: &[usize],
) -> Option<ArrayD<A>> {
    let mut view = view;
    let mut order = from.names().collect_vec();
    for dim in to.names().filter(|dim| !from.contains(dim)) {
        view.insert_axis_inplace(NdAxis(view.ndim()));
        order.push(dim);
    }
    let permutation = to
        .names()
        .map(|dim| order.iter().position(|current| *current == dim))
        .collect::<Option<Vec<_>>>()
        .filter(|permutation| permutation.len() == order.len())?;
    view.permuted_axes(IxDyn(&permutation))
        .broadcast(IxDyn(shape))
        .map(|broadcast| broadcast.to_owned())
}

impl Display for DataArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sizes = self
            .axes
            .iter()
            .map(|axis| format!("{}: {}", axis.name, axis.len()))
            .join(", ");
        writeln!(f, "<rustercube.DataArray '{}' ({sizes})>", self.name())?;
        writeln!(f, "{}", self.variable.data)
    }
}
