use itertools::Itertools;
use log::debug;
use ndarray::{ArrayD, Axis as NdAxis};
use std::{collections::HashSet, fmt::Display};

use crate::{
    components::{
        AttrValue, Attrs, Axes, Axis, Coordinate, DataArray, Dims, Lookup, Variable,
    },
    errors::{CubeError, Result},
};

/// Named variables over shared, labelled axes.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    axes: Axes,
    variables: Vec<Variable>,
    attrs: Attrs,
}

impl Dataset {
    pub fn new(axes: Axes, variables: Vec<Variable>) -> Result<Self> {
        if let Some(name) = axes.names().duplicates().next() {
            return Err(CubeError::Alignment {
                axis: name.to_string(),
                reason: "axis is defined twice".into(),
            });
        }
        if let Some(name) = variables.iter().map(|var| &var.name).duplicates().next() {
            return Err(CubeError::DuplicateVariable(name.to_string()));
        }
        variables
            .iter()
            .try_for_each(|variable| check_against(&axes, variable))?;
        Ok(Self {
            axes,
            variables,
            attrs: Attrs::new(),
        })
    }

    pub fn builder() -> DatasetBuilder {
        DatasetBuilder::default()
    }

    /// Assembles a dataset from parts already known to be consistent.
    pub(crate) fn from_parts(axes: Axes, variables: Vec<Variable>, attrs: Attrs) -> Self {
        debug_assert!(variables
            .iter()
            .all(|variable| check_against(&axes, variable).is_ok()));
        Self {
            axes,
            variables,
            attrs,
        }
    }

    pub fn into_parts(self) -> (Axes, Vec<Variable>, Attrs) {
        (self.axes, self.variables, self.attrs)
    }

    pub fn axes(&self) -> &Axes {
        &self.axes
    }

    pub fn axis(&self, name: &str) -> Result<&Axis> {
        self.axes.get(name)
    }

    pub fn sizes(&self) -> Vec<(&str, usize)> {
        self.axes
            .iter()
            .map(|axis| (axis.name.as_ref(), axis.len()))
            .collect()
    }

    pub fn dims(&self) -> impl Iterator<Item = &str> {
        self.axes.names()
    }

    pub fn coord(&self, name: &str) -> Result<&Coordinate> {
        self.axis(name).map(|axis| &axis.coord)
    }

    pub fn coords(&self) -> impl Iterator<Item = (&str, &Coordinate)> {
        self.axes
            .iter()
            .map(|axis| (axis.name.as_ref(), &axis.coord))
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|var| var.name.as_ref())
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn variable(&self, name: &str) -> Result<&Variable> {
        self.variables
            .iter()
            .find(|var| var.name.as_ref() == name)
            .ok_or_else(|| CubeError::VariableNotFound(name.to_string()))
    }

    /// Looks a variable up by name together with the coordinates of its dims.
    pub fn get(&self, name: &str) -> Result<DataArray> {
        let variable = self.variable(name)?.clone();
        let axes = axes_of(&self.axes, &variable.dims)?;
        Ok(DataArray::from_parts(variable, axes))
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attrs {
        &mut self.attrs
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    pub(crate) fn with_attrs(mut self, attrs: Attrs) -> Self {
        self.attrs = attrs;
        self
    }

    /// Adds a variable over existing axes, replacing one of the same name.
    pub fn insert(&mut self, variable: Variable) -> Result<()> {
        check_against(&self.axes, &variable)?;
        match self
            .variables
            .iter_mut()
            .find(|current| current.name == variable.name)
        {
            Some(current) => *current = variable,
            None => self.variables.push(variable),
        }
        Ok(())
    }

    /// Adds an array, bringing along axes the dataset does not have yet.
    pub fn insert_array(&mut self, array: DataArray) -> Result<()> {
        for axis in array.axes().iter() {
            if let Some(current) = self.axes.find(&axis.name) {
                if current.coord != axis.coord {
                    return Err(CubeError::Alignment {
                        axis: axis.name.to_string(),
                        reason: format!("array `{}` carries different labels", array.name()),
                    });
                }
            }
        }
        let (variable, axes) = array.into_parts();
        axes.iter().for_each(|axis| {
            if !self.axes.contains(&axis.name) {
                self.axes.upsert(axis.clone())
            }
        });
        self.insert(variable)
    }

    pub fn remove(&mut self, name: &str) -> Result<Variable> {
        let idx = self
            .variables
            .iter()
            .position(|var| var.name.as_ref() == name)
            .ok_or_else(|| CubeError::VariableNotFound(name.to_string()))?;
        Ok(self.variables.remove(idx))
    }

    /// Dataset restricted to the named variables, in the requested order.
    pub fn subset(&self, names: &[&str]) -> Result<Self> {
        let variables = names
            .iter()
            .map(|name| self.variable(name).cloned())
            .collect::<Result<Vec<_>>>()?;
        let used: HashSet<&str> = variables
            .iter()
            .flat_map(|var| var.dims.names())
            .collect();
        let axes = self
            .axes
            .iter()
            .filter(|axis| used.contains(axis.name.as_ref()))
            .cloned()
            .collect();
        Ok(Self::from_parts(axes, variables, self.attrs.clone()))
    }

    pub fn map_variables<F>(&self, f: F) -> Result<Self>
    where
        F: Fn(&Variable) -> Result<Variable>,
    {
        let variables = self.variables.iter().map(f).collect::<Result<Vec<_>>>()?;
        Ok(Self::new(self.axes.clone(), variables)?.with_attrs(self.attrs.clone()))
    }

    /// Applies `f` to every value of every variable.
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(f64) -> f64,
    {
        let variables = self
            .variables
            .iter()
            .map(|var| var.with_data(var.dims.clone(), var.data.mapv(&f)))
            .collect();
        Self::from_parts(self.axes.clone(), variables, self.attrs.clone())
    }

    /// Joins `parts` end to end along `axis`.
    ///
    /// Variables without `axis` are taken from the first part.
    pub fn concat(parts: &[Dataset], axis: &str) -> Result<Self> {
        let Some((first, rest)) = parts.split_first() else {
            return Err(CubeError::Alignment {
                axis: axis.to_string(),
                reason: "there is nothing to concatenate".into(),
            });
        };
        let mut coord = first.coord(axis)?.clone();
        for part in rest {
            for other in first.axes.iter().filter(|other| other.name.as_ref() != axis) {
                if part.axis(&other.name)?.coord != other.coord {
                    return Err(CubeError::Alignment {
                        axis: other.name.to_string(),
                        reason: format!("parts differ outside of `{axis}`"),
                    });
                }
            }
            coord = coord.concat(part.coord(axis)?);
        }
        let variables = first
            .variables
            .iter()
            .map(|variable| {
                let Some(nd_axis) = variable.axis_of(axis) else {
                    return Ok(variable.clone());
                };
                let views = parts
                    .iter()
                    .map(|part| part.variable(&variable.name).map(Variable::view))
                    .collect::<Result<Vec<_>>>()?;
                let data = ndarray::concatenate(nd_axis, &views)?;
                Ok(variable.with_data(variable.dims.clone(), data))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut axes = first.axes.clone();
        axes.upsert(first.axis(axis)?.with_coord(coord));
        Ok(Self::new(axes, variables)?.with_attrs(first.attrs.clone()))
    }

    /// Stacks all variables along a new leading axis labelled by their names.
    pub fn to_array(&self, axis: &str, name: &str) -> Result<DataArray> {
        let first = self.variables.first().ok_or_else(|| CubeError::Alignment {
            axis: axis.to_string(),
            reason: "there are no variables to stack".into(),
        })?;
        if let Some(other) = self.variables.iter().find(|var| var.dims != first.dims) {
            return Err(CubeError::Alignment {
                axis: axis.to_string(),
                reason: format!(
                    "`{}` and `{}` have different dimensions",
                    first.name, other.name
                ),
            });
        }
        let views = self.variables.iter().map(Variable::view).collect_vec();
        let data = ndarray::stack(NdAxis(0), &views)?;
        debug!("Stacked {} variables along `{axis}`", views.len());

        let labels: Coordinate = self.names().collect();
        let axes = std::iter::once(Axis::new(axis, labels))
            .chain(axes_of(&self.axes, &first.dims)?.iter().cloned())
            .collect();
        DataArray::new(name, axes, data)
    }
}

/// Axes of `dims`, in the order of `dims`.
pub(crate) fn axes_of(axes: &Axes, dims: &Dims) -> Result<Axes> {
    dims.names().map(|dim| axes.get(dim).cloned()).collect()
}

pub(crate) fn check_against(axes: &Axes, variable: &Variable) -> Result<()> {
    let expected = variable
        .dims
        .names()
        .map(|dim| axes.get(dim).map(Axis::len))
        .collect::<Result<Vec<_>>>()?;
    if expected != variable.data.shape() {
        return Err(CubeError::ShapeMismatch {
            variable: variable.name.to_string(),
            expected,
            found: variable.data.shape().to_vec(),
        });
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct DatasetBuilder {
    axes: Vec<Axis>,
    variables: Vec<(String, Vec<String>, ArrayD<f64>)>,
    attrs: Attrs,
}

impl DatasetBuilder {
    pub fn axis(mut self, name: &str, coord: impl Into<Coordinate>) -> Self {
        self.axes.push(Axis::new(name, coord.into()));
        self
    }

    pub fn variable(mut self, name: &str, dims: &[&str], data: ArrayD<f64>) -> Self {
        let dims = dims.iter().map(|dim| dim.to_string()).collect();
        self.variables.push((name.to_string(), dims, data));
        self
    }

    pub fn attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> Result<Dataset> {
        let variables = self
            .variables
            .into_iter()
            .map(|(name, dims, data)| {
                let dims: Dims = dims.iter().map(String::as_str).collect();
                Variable::new(&name, dims, data)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Dataset::new(self.axes.into_iter().collect(), variables)?.with_attrs(self.attrs))
    }
}

fn preview(coord: &Coordinate) -> String {
    let labels = coord.labels();
    if labels.len() <= 4 {
        return labels.iter().join(" ");
    }
    format!(
        "{} ... {}",
        labels[..3].iter().join(" "),
        labels[labels.len() - 1]
    )
}

impl Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "<rustercube.Dataset>")?;
        let sizes = self
            .sizes()
            .into_iter()
            .map(|(name, len)| format!("{name}: {len}"))
            .join(", ");
        writeln!(f, "Dimensions:  ({sizes})")?;
        writeln!(f, "Coordinates:")?;
        for axis in self.axes.iter() {
            writeln!(
                f,
                "  * {:<8} ({}) {}",
                axis.name,
                axis.name,
                preview(&axis.coord)
            )?;
        }
        writeln!(f, "Data variables:")?;
        for var in &self.variables {
            writeln!(
                f,
                "    {:<8} ({}) f64",
                var.name,
                var.dims.names().join(", ")
            )?;
        }
        if !self.attrs.is_empty() {
            writeln!(f, "Attributes:")?;
            for (key, value) in &self.attrs {
                writeln!(f, "    {key}: {value}")?;
            }
        }
        Ok(())
    }
}

impl From<DataArray> for Dataset {
    fn from(value: DataArray) -> Self {
        value.into_dataset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        indexes::Indexes,
        testing::{ramp, scenes},
    };
    use rstest::rstest;

    #[rstest]
    fn shapes_are_validated() {
        let result = Dataset::builder()
            .axis("y", Coordinate::range(2))
            .axis("x", Coordinate::range(3))
            .variable("red", &["y", "x"], ramp(&[3, 2]))
            .build();
        assert!(matches!(result, Err(CubeError::ShapeMismatch { .. })));
    }

    #[rstest]
    fn unknown_axis_is_distinct_from_unknown_variable() {
        let ds = scenes();
        assert!(matches!(ds.get("swir"), Err(CubeError::VariableNotFound(_))));
        assert!(matches!(ds.axis("band"), Err(CubeError::AxisNotFound(_))));
    }

    #[rstest]
    fn dims_and_coords_follow_axis_order() {
        let ds = scenes();
        assert_eq!(ds.dims().collect_vec(), ["time", "y", "x"]);
        let (name, coord) = ds.coords().nth(2).unwrap();
        assert_eq!(name, "x");
        assert_eq!(coord.len(), 3);
    }

    #[rstest]
    fn get_carries_coordinates_of_its_dims() {
        let ds = scenes();
        let red = ds.get("red").unwrap();
        assert_eq!(red.dims().names().collect_vec(), ["time", "y", "x"]);
        assert_eq!(red.axis("time").unwrap().coord, ds.axis("time").unwrap().coord);
        assert_eq!(red.shape(), &[6, 2, 3]);
    }

    #[rstest]
    fn single_variable_round_trip() {
        let ds = scenes();
        let red = ds.get("red").unwrap();
        let single = red.clone().into_dataset();
        assert_eq!(single.len(), 1);
        let back = single.get("red").unwrap();
        assert_eq!(back.values(), red.values());
        assert_eq!(back.axes(), red.axes());
    }

    #[rstest]
    fn insert_array_rejects_foreign_coordinates() {
        let mut ds = scenes();
        let foreign = DataArray::new(
            "mask",
            [Axis::new("x", Coordinate::range(3))].into_iter().collect(),
            ramp(&[3]),
        )
        .unwrap();
        assert!(matches!(
            ds.insert_array(foreign),
            Err(CubeError::Alignment { .. })
        ));

        let band = DataArray::new(
            "weights",
            [Axis::new("band", Coordinate::from_iter(["a", "b"]))]
                .into_iter()
                .collect(),
            ramp(&[2]),
        )
        .unwrap();
        ds.insert_array(band).unwrap();
        assert!(ds.axes().contains("band"));
    }

    #[rstest]
    fn to_array_stacks_bands() {
        let ds = scenes().subset(&["blue", "red"]).unwrap();
        let stacked = ds.to_array("band", "reflectance").unwrap();
        assert_eq!(stacked.shape(), &[2, 6, 2, 3]);
        assert_eq!(stacked.at(&[1, 0, 0, 0]).unwrap(), 600.0);

        let split = stacked.to_dataset("band").unwrap();
        assert_eq!(split.names().collect_vec(), ["blue", "red"]);
        assert_eq!(
            split.get("blue").unwrap().values(),
            scenes().get("blue").unwrap().values()
        );
    }

    #[rstest]
    fn concat_joins_along_one_axis() {
        let ds = scenes();
        let early = ds.isel(&[("time", Indexes::from(0..2))]).unwrap();
        let late = ds.isel(&[("time", Indexes::from(2..6))]).unwrap();
        let joined = Dataset::concat(&[early, late.clone()], "time").unwrap();
        assert_eq!(joined.axes(), ds.axes());
        assert_eq!(joined.get("red").unwrap().values(), ds.get("red").unwrap().values());

        let narrow = ds.isel(&[("x", Indexes::from(0..2))]).unwrap();
        assert!(matches!(
            Dataset::concat(&[narrow, late], "time"),
            Err(CubeError::Alignment { .. })
        ));
    }

    #[rstest]
    fn display_lists_structure() {
        let text = scenes().with_attr("crs", "EPSG:32632").to_string();
        assert!(text.contains("Dimensions:  (time: 6, y: 2, x: 3)"));
        assert!(text.contains("    red      (time, y, x) f64"));
        assert!(text.contains("    crs: EPSG:32632"));
    }
}
