use itertools::Itertools;
use log::debug;
use ndarray::{ArrayD, Zip};

use crate::{
    components::{array::broadcast_to, Axes, Coordinate, Dataset, Lookup, Variable, MISSING},
    errors::{CubeError, Result},
    intersection::Intersection,
};

/// Labels kept on an axis shared by both sides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Join {
    #[default]
    Inner,
    Outer,
    Left,
    Right,
}

/// Which side wins where a variable exists on both.
///
/// `Left` and `Right` fill missing values from the other side, `NoConflicts`
/// does the same but fails on differing valid values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Precedence {
    #[default]
    Left,
    Right,
    NoConflicts,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MergeOptions {
    pub join: Join,
    pub precedence: Precedence,
}

impl MergeOptions {
    pub fn with_join(mut self, join: Join) -> Self {
        self.join = join;
        self
    }

    pub fn with_precedence(mut self, precedence: Precedence) -> Self {
        self.precedence = precedence;
        self
    }
}

impl Join {
    fn apply(&self, axis: &str, lhs: &Coordinate, rhs: &Coordinate) -> Result<Coordinate> {
        if let (Some(lhs_kind), Some(rhs_kind)) = (lhs.kind(), rhs.kind()) {
            if lhs_kind != rhs_kind {
                return Err(CubeError::Alignment {
                    axis: axis.to_string(),
                    reason: format!("cannot join {lhs_kind:?} labels with {rhs_kind:?} labels"),
                });
            }
        }
        Ok(match self {
            Join::Inner => lhs.intersection(rhs),
            Join::Left => lhs.clone(),
            Join::Right => rhs.clone(),
            Join::Outer => {
                let descending = lhs.len() > 1 && lhs.first() > lhs.last();
                let union = lhs.iter().chain(rhs.iter()).unique().cloned().sorted();
                if descending {
                    union.rev().collect()
                } else {
                    union.collect()
                }
            }
        })
    }
}

impl Dataset {
    /// Lays the dataset over `coord` on `axis`, labels it lacks become missing.
    pub fn reindex(&self, axis: &str, coord: &Coordinate) -> Result<Self> {
        let source = self.axis(axis)?;
        if source.coord == *coord {
            return Ok(self.clone());
        }
        let positions = coord
            .iter()
            .map(|label| source.position(label))
            .collect_vec();
        let variables = self
            .variables()
            .iter()
            .map(|variable| reindex_variable(variable, axis, &positions))
            .collect();
        let mut axes = self.axes().clone();
        axes.upsert(source.with_coord(coord.clone()));
        Ok(Dataset::from_parts(axes, variables, self.attrs().clone()))
    }

    /// Joins shared axes, then takes the union of both variable sets.
    pub fn merge(&self, other: &Dataset, options: &MergeOptions) -> Result<Self> {
        let mut lhs = self.clone();
        let mut rhs = other.clone();
        for axis in self.axes().iter() {
            let Some(theirs) = other.axes().find(&axis.name) else {
                continue;
            };
            let joined = options.join.apply(&axis.name, &axis.coord, &theirs.coord)?;
            debug!(
                "Joined `{}` from {} and {} to {} labels",
                axis.name,
                axis.len(),
                theirs.len(),
                joined.len()
            );
            lhs = lhs.reindex(&axis.name, &joined)?;
            rhs = rhs.reindex(&axis.name, &joined)?;
        }

        let axes: Axes = lhs
            .axes()
            .iter()
            .chain(rhs.axes().iter().filter(|axis| !lhs.axes().contains(&axis.name)))
            .cloned()
            .collect();
        let mut variables = lhs.variables().to_vec();
        for theirs in rhs.variables() {
            match variables.iter_mut().find(|ours| ours.name == theirs.name) {
                Some(ours) => *ours = combine(ours, theirs, options.precedence)?,
                None => variables.push(theirs.clone()),
            }
        }
        let mut attrs = rhs.attrs().clone();
        attrs.extend(lhs.attrs().clone());
        Ok(Dataset::new(axes, variables)?.with_attrs(attrs))
    }
}

fn reindex_variable(variable: &Variable, axis: &str, positions: &[Option<usize>]) -> Variable {
    let Some(nd_axis) = variable.axis_of(axis) else {
        return variable.clone();
    };
    let mut shape = variable.data.shape().to_vec();
    shape[nd_axis.index()] = positions.len();
    let mut data = ArrayD::from_elem(shape, MISSING);
    for (target, source) in positions.iter().enumerate() {
        if let Some(source) = source {
            data.index_axis_mut(nd_axis, target)
                .assign(&variable.data.index_axis(nd_axis, *source));
        }
    }
    variable.with_data(variable.dims.clone(), data)
}

fn combine(ours: &Variable, theirs: &Variable, precedence: Precedence) -> Result<Variable> {
    let same_dims =
        ours.dims.len() == theirs.dims.len() && ours.dims.names().all(|dim| theirs.has_dim(dim));
    if !same_dims {
        return Err(CubeError::MergeConflict(ours.name.to_string()));
    }
    let theirs_data = broadcast_to(theirs, &ours.dims, ours.data.shape())?;
    let (first, second) = match precedence {
        Precedence::Right => (theirs_data.view(), ours.data.view()),
        Precedence::Left | Precedence::NoConflicts => (ours.data.view(), theirs_data.view()),
    };
    if precedence == Precedence::NoConflicts {
        let conflict = Zip::from(&first)
            .and(&second)
            .fold(false, |found, &lhs, &rhs| {
                found || (!lhs.is_nan() && !rhs.is_nan() && lhs != rhs)
            });
        if conflict {
            return Err(CubeError::MergeConflict(ours.name.to_string()));
        }
    }
    let data = Zip::from(&first)
        .and(&second)
        .map_collect(|&lhs, &rhs| if lhs.is_nan() { rhs } else { lhs });
    Ok(ours.with_data(ours.dims.clone(), data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::{Label, MISSING},
        testing::ramp,
    };
    use ndarray::IxDyn;
    use rstest::rstest;

    fn series(name: &str, times: [&str; 2], values: [f64; 2]) -> Dataset {
        Dataset::builder()
            .axis("time", Coordinate::times(times).unwrap())
            .variable(
                name,
                &["time"],
                ArrayD::from_shape_vec(IxDyn(&[2]), values.to_vec()).unwrap(),
            )
            .build()
            .unwrap()
    }

    #[rstest]
    fn inner_join_keeps_shared_labels() {
        let lhs = series("red", ["2020-12-01", "2020-12-10"], [1.0, 2.0]);
        let rhs = series("nir", ["2020-12-10", "2020-12-25"], [3.0, 4.0]);
        let merged = lhs.merge(&rhs, &MergeOptions::default()).unwrap();
        assert_eq!(
            merged.coord("time").unwrap().to_vec(),
            vec![Label::time("2020-12-10").unwrap()]
        );
        assert_eq!(merged.names().collect_vec(), ["red", "nir"]);
        assert_eq!(merged.get("red").unwrap().at(&[0]).unwrap(), 2.0);
        assert_eq!(merged.get("nir").unwrap().at(&[0]).unwrap(), 3.0);
    }

    #[rstest]
    fn outer_join_fills_missing() {
        let lhs = series("red", ["2020-12-10", "2020-12-01"], [2.0, 1.0]);
        let rhs = series("nir", ["2020-12-10", "2020-12-25"], [3.0, 4.0]);
        let merged = lhs
            .merge(&rhs, &MergeOptions::default().with_join(Join::Outer))
            .unwrap();
        // descending like the left side: 12-25, 12-10, 12-01
        assert_eq!(merged.axis("time").unwrap().len(), 3);
        let nir = merged.get("nir").unwrap();
        assert_eq!(nir.at(&[0]).unwrap(), 4.0);
        assert!(nir.at(&[2]).unwrap().is_nan());
        let red = merged.get("red").unwrap();
        assert!(red.at(&[0]).unwrap().is_nan());
        assert_eq!(red.at(&[2]).unwrap(), 1.0);
    }

    #[rstest]
    #[case(Precedence::Left, 1.0)]
    #[case(Precedence::Right, 5.0)]
    fn precedence_resolves_overlap(#[case] precedence: Precedence, #[case] expected: f64) {
        let lhs = series("red", ["2020-12-01", "2020-12-10"], [1.0, MISSING]);
        let rhs = series("red", ["2020-12-01", "2020-12-10"], [5.0, 6.0]);
        let options = MergeOptions::default().with_precedence(precedence);
        let red = lhs.merge(&rhs, &options).unwrap().get("red").unwrap();
        assert_eq!(red.at(&[0]).unwrap(), expected);
        assert_eq!(red.at(&[1]).unwrap(), 6.0);
    }

    #[rstest]
    fn no_conflicts_rejects_disagreement() {
        let lhs = series("red", ["2020-12-01", "2020-12-10"], [1.0, MISSING]);
        let agreeing = series("red", ["2020-12-01", "2020-12-10"], [1.0, 6.0]);
        let options = MergeOptions::default().with_precedence(Precedence::NoConflicts);
        let red = lhs.merge(&agreeing, &options).unwrap().get("red").unwrap();
        assert_eq!(red.at(&[1]).unwrap(), 6.0);

        let disagreeing = series("red", ["2020-12-01", "2020-12-10"], [2.0, 6.0]);
        assert!(matches!(
            lhs.merge(&disagreeing, &options),
            Err(CubeError::MergeConflict(_))
        ));
    }

    #[rstest]
    fn label_kinds_must_match() {
        let lhs = series("red", ["2020-12-01", "2020-12-10"], [1.0, 2.0]);
        let rhs = Dataset::builder()
            .axis("time", Coordinate::range(2))
            .variable("nir", &["time"], ramp(&[2]))
            .build()
            .unwrap();
        assert!(matches!(
            lhs.merge(&rhs, &MergeOptions::default()),
            Err(CubeError::Alignment { .. })
        ));
    }

    #[rstest]
    fn reindex_introduces_missing_labels() {
        let ds = series("red", ["2020-12-01", "2020-12-10"], [1.0, 2.0]);
        let target = Coordinate::times(["2020-12-10", "2020-12-31"]).unwrap();
        let red = ds.reindex("time", &target).unwrap().get("red").unwrap();
        assert_eq!(red.at(&[0]).unwrap(), 2.0);
        assert!(red.at(&[1]).unwrap().is_nan());
    }
}
