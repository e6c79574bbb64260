use itertools::Itertools;
use ndarray::ArrayD;
use std::{collections::HashMap, fmt::Debug, sync::Arc};

use crate::{
    components::{Axis, DataArray, Dataset, DatetimeComponent, Label, Variable},
    errors::Result,
    reduction::{reduce_variable, Reduction},
};

/// Derives the group of each label on the grouped axis.
#[derive(Clone)]
pub enum GroupKey {
    Component(DatetimeComponent),
    Custom {
        name: Arc<str>,
        key: Arc<dyn Fn(&Label) -> Label + Send + Sync>,
    },
}

impl Debug for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupKey::Component(component) => f.debug_tuple("Component").field(component).finish(),
            GroupKey::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
        }
    }
}

impl From<DatetimeComponent> for GroupKey {
    fn from(value: DatetimeComponent) -> Self {
        GroupKey::Component(value)
    }
}

impl GroupKey {
    pub fn custom<F>(name: &str, key: F) -> Self
    where
        F: Fn(&Label) -> Label + Send + Sync + 'static,
    {
        GroupKey::Custom {
            name: Arc::from(name),
            key: Arc::new(key),
        }
    }

    /// Name of the axis holding the groups after a reduction.
    pub fn name(&self) -> &str {
        match self {
            GroupKey::Component(component) => component.name(),
            GroupKey::Custom { name, .. } => name.as_ref(),
        }
    }

    fn keys(&self, axis: &Axis) -> Result<Vec<Label>> {
        match self {
            GroupKey::Component(component) => Ok(axis.datetime(*component)?.to_vec()),
            GroupKey::Custom { key, .. } => Ok(axis.coord.iter().map(|label| key(label)).collect()),
        }
    }
}

/// Positions of an axis partitioned into labelled groups.
#[derive(Debug, Clone)]
pub struct GroupBy {
    dataset: Dataset,
    axis: Arc<str>,
    key: Arc<str>,
    groups: Vec<(Label, Vec<usize>)>,
}

impl GroupBy {
    pub(crate) fn new(
        dataset: Dataset,
        axis: &str,
        key: &str,
        groups: Vec<(Label, Vec<usize>)>,
    ) -> Self {
        Self {
            dataset,
            axis: Arc::from(axis),
            key: Arc::from(key),
            groups,
        }
    }

    pub fn groups(&self) -> &[(Label, Vec<usize>)] {
        &self.groups
    }

    /// Orders the groups by their label instead of by first appearance.
    pub fn sorted(mut self) -> Self {
        self.groups.sort_by(|lhs, rhs| lhs.0.cmp(&rhs.0));
        self
    }

    /// Reduces each group on its own, the grouped axis becomes the key axis.
    pub fn reduce(&self, reduction: Reduction) -> Result<Dataset> {
        let key_axis = Axis::new(
            &self.key,
            self.groups.iter().map(|(label, _)| label.clone()).collect(),
        );
        let axes = self
            .dataset
            .axes()
            .iter()
            .map(|axis| {
                if axis.name == self.axis {
                    key_axis.clone()
                } else {
                    axis.clone()
                }
            })
            .collect();
        let variables = self
            .dataset
            .variables()
            .iter()
            .map(|variable| self.reduce_groups(variable, reduction))
            .collect::<Result<Vec<_>>>()?;
        Ok(Dataset::new(axes, variables)?.with_attrs(self.dataset.attrs().clone()))
    }

    fn reduce_groups(&self, variable: &Variable, reduction: Reduction) -> Result<Variable> {
        let Some(nd_axis) = variable.axis_of(&self.axis) else {
            return Ok(variable.clone());
        };
        let dims = variable.dims.replace(&self.axis, &self.key);
        if self.groups.is_empty() {
            let mut shape = variable.data.shape().to_vec();
            shape[nd_axis.index()] = 0;
            return Ok(variable.with_data(dims, ArrayD::zeros(shape)));
        }
        let parts = self
            .groups
            .iter()
            .map(|(_, positions)| {
                let selected = variable.with_data(
                    variable.dims.clone(),
                    variable.data.select(nd_axis, positions),
                );
                reduce_variable(&selected, &[&self.axis], reduction)
            })
            .collect::<Result<Vec<_>>>()?;
        let views = parts.iter().map(Variable::view).collect_vec();
        let data = ndarray::stack(nd_axis, &views)?;
        Ok(variable.with_data(dims, data))
    }
}

impl Dataset {
    /// Groups positions of `axis` by equal keys, in first-encountered order.
    pub fn groupby(&self, axis: &str, key: impl Into<GroupKey>) -> Result<GroupBy> {
        let key = key.into();
        let keys = key.keys(self.axis(axis)?)?;
        let mut groups: Vec<(Label, Vec<usize>)> = Vec::new();
        let mut slots: HashMap<Label, usize> = HashMap::new();
        for (position, label) in keys.into_iter().enumerate() {
            let slot = *slots.entry(label.clone()).or_insert_with(|| {
                groups.push((label, Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(position);
        }
        Ok(GroupBy::new(self.clone(), axis, key.name(), groups))
    }
}

impl DataArray {
    pub fn groupby(&self, axis: &str, key: impl Into<GroupKey>) -> Result<GroupBy> {
        self.clone().into_dataset().groupby(axis, key)
    }
}
