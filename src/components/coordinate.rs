use itertools::Itertools;
use shrinkwraprs::Shrinkwrap;
use std::{cmp::Ordering, fmt::Debug, sync::Arc};

use crate::{
    components::label::{DatetimeComponent, Label, LabelKind, TimeSpan},
    errors::{CubeError, Result},
};

/// Position lookups over an ordered label sequence.
#[ambassador::delegatable_trait]
pub trait Lookup {
    fn labels(&self) -> &[Label];

    fn size(&self) -> usize {
        self.labels().len()
    }

    /// Exact match.
    fn position(&self, label: &Label) -> Option<usize> {
        self.labels().iter().position(|candidate| candidate == label)
    }

    /// Closest label by numeric distance, ties resolve to the first.
    fn nearest(&self, label: &Label) -> Option<usize> {
        let target = label.as_f64()?;
        self.labels()
            .iter()
            .enumerate()
            .filter_map(|(idx, candidate)| {
                candidate
                    .as_f64()
                    .filter(|_| candidate.compare(label).is_some())
                    .map(|value| (idx, (value - target).abs()))
            })
            .min_by(|lhs, rhs| lhs.1.total_cmp(&rhs.1))
            .map(|(idx, _)| idx)
    }

    fn is_monotonic(&self) -> bool {
        let labels = self.labels();
        labels.iter().tuple_windows().all(|(lhs, rhs)| lhs <= rhs)
            || labels.iter().tuple_windows().all(|(lhs, rhs)| lhs >= rhs)
    }

    /// Positions with `lo <= label <= hi`, both ends included.
    fn positions_between(&self, lo: &Label, hi: &Label) -> Vec<usize> {
        self.labels()
            .iter()
            .positions(|label| {
                lo.compare(label).is_some_and(Ordering::is_le)
                    && label.compare(hi).is_some_and(Ordering::is_le)
            })
            .collect()
    }

    fn positions_within(&self, span: &TimeSpan) -> Vec<usize> {
        self.labels()
            .iter()
            .positions(|label| label.as_time().is_some_and(|time| span.contains(time)))
            .collect()
    }
}

/// Ordered labels of one axis.
///
/// Cloning shares the underlying labels.
#[derive(Shrinkwrap, Clone, PartialEq, Eq)]
pub struct Coordinate(Arc<[Label]>);

impl Lookup for Coordinate {
    fn labels(&self) -> &[Label] {
        &self.0
    }
}

impl Debug for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl<L: Into<Label>> FromIterator<L> for Coordinate {
    fn from_iter<I: IntoIterator<Item = L>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<Label>> for Coordinate {
    fn from(value: Vec<Label>) -> Self {
        Self(Arc::from(value))
    }
}

impl Coordinate {
    /// Parses each value with [Label::time].
    pub fn times<S: AsRef<str>>(values: impl IntoIterator<Item = S>) -> Result<Self> {
        values
            .into_iter()
            .map(|value| Label::time(value.as_ref()))
            .collect::<Result<Vec<_>>>()
            .map(Self::from)
    }

    pub fn range(len: usize) -> Self {
        (0..len as i64).collect()
    }

    /// Kind shared by all labels, `None` when empty or mixed.
    pub fn kind(&self) -> Option<LabelKind> {
        self.0.iter().map(Label::kind).dedup().exactly_one().ok()
    }

    pub fn select(&self, positions: &[usize]) -> Self {
        positions.iter().map(|idx| self.0[*idx].clone()).collect()
    }

    pub fn concat(&self, other: &Coordinate) -> Self {
        self.0.iter().chain(other.0.iter()).cloned().collect()
    }
}

/// Named axis and its coordinate.
#[derive(ambassador::Delegate, Clone, Debug, PartialEq, Eq)]
#[delegate(Lookup, target = "coord")]
pub struct Axis {
    pub name: Arc<str>,
    pub coord: Coordinate,
}

impl Axis {
    pub fn new(name: &str, coord: Coordinate) -> Self {
        Self {
            name: Arc::from(name),
            coord,
        }
    }

    pub fn len(&self) -> usize {
        self.coord.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coord.is_empty()
    }

    /// Derived calendar coordinate, `ds.time.dt.season` in xarray terms.
    pub fn datetime(&self, component: DatetimeComponent) -> Result<Coordinate> {
        self.coord
            .iter()
            .map(|label| {
                component
                    .apply(label)
                    .ok_or_else(|| CubeError::NotTemporal(self.name.to_string()))
            })
            .collect::<Result<Vec<_>>>()
            .map(Coordinate::from)
    }

    pub fn label_at(&self, index: usize) -> Result<&Label> {
        self.coord.get(index).ok_or(CubeError::IndexOutOfBounds {
            axis: self.name.to_string(),
            index,
            len: self.len(),
        })
    }

    pub fn with_coord(&self, coord: Coordinate) -> Self {
        Self {
            name: Arc::clone(&self.name),
            coord,
        }
    }
}

/// Ordered collection of [Axis].
#[derive(Shrinkwrap, Clone, Debug, Default, PartialEq, Eq)]
pub struct Axes(Vec<Axis>);

impl FromIterator<Axis> for Axes {
    fn from_iter<I: IntoIterator<Item = Axis>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Axes {
    pub fn get(&self, name: &str) -> Result<&Axis> {
        self.find(name)
            .ok_or_else(|| CubeError::AxisNotFound(name.to_string()))
    }

    pub fn find(&self, name: &str) -> Option<&Axis> {
        self.0.iter().find(|axis| axis.name.as_ref() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|axis| axis.name.as_ref())
    }

    /// Replaces an axis of the same name or appends it.
    pub fn upsert(&mut self, axis: Axis) {
        match self.0.iter_mut().find(|current| current.name == axis.name) {
            Some(current) => *current = axis,
            None => self.0.push(axis),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Axis> {
        let idx = self.0.iter().position(|axis| axis.name.as_ref() == name)?;
        Some(self.0.remove(idx))
    }

    /// Axes named in `dims`, in this collection's order.
    pub fn subset<'a>(&self, dims: impl Iterator<Item = &'a str> + Clone) -> Self {
        self.0
            .iter()
            .filter(|axis| dims.clone().any(|dim| dim == axis.name.as_ref()))
            .cloned()
            .collect()
    }
}
