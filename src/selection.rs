use either::Either;
use std::{cmp::Ordering, sync::Arc};

use crate::{
    components::{Axes, Axis, DataArray, Dataset, Label, LabelKind, Lookup, TimeSpan, Variable},
    errors::{CubeError, Result},
    indexes::Indexes,
};

/// Label based selector for one axis.
///
/// Ranges include both of their ends, unlike position ranges.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelSelector {
    Label(Label),
    Labels(Vec<Label>),
    Range(Label, Label),
    /// Every datetime inside a partial date such as `"2020-12"`.
    Span(TimeSpan),
    Nearest(Label),
}

impl LabelSelector {
    pub fn range(lo: impl Into<Label>, hi: impl Into<Label>) -> Self {
        LabelSelector::Range(lo.into(), hi.into())
    }

    /// Inclusive datetime range, `hi` extends to the end of its period.
    pub fn time_range(lo: &str, hi: &str) -> Result<Self> {
        let lo = TimeSpan::parse(lo)?;
        let hi = TimeSpan::parse(hi)?;
        Ok(LabelSelector::Range(Label::Time(lo.start), Label::Time(hi.end)))
    }

    pub fn nearest(label: impl Into<Label>) -> Self {
        LabelSelector::Nearest(label.into())
    }

    /// Positions on `axis`, scalar for the single label forms.
    pub fn resolve(&self, axis: &Axis) -> Result<Indexes> {
        let not_found = |label: &Label| CubeError::LabelNotFound {
            axis: axis.name.to_string(),
            label: label.clone(),
        };
        match self {
            LabelSelector::Label(label) => axis
                .position(label)
                .map(Indexes::from)
                .ok_or_else(|| not_found(label)),
            LabelSelector::Labels(labels) => labels
                .iter()
                .map(|label| axis.position(label).ok_or_else(|| not_found(label)))
                .collect::<Result<Vec<_>>>()
                .map(Indexes::from),
            LabelSelector::Range(lo, hi) => {
                if !axis.is_monotonic() {
                    return Err(CubeError::NotMonotonic(axis.name.to_string()));
                }
                if let Some(first) = axis.labels().first() {
                    if first.compare(lo).is_none() || first.compare(hi).is_none() {
                        return Err(CubeError::Alignment {
                            axis: axis.name.to_string(),
                            reason: format!("range {lo} to {hi} does not fit its labels"),
                        });
                    }
                }
                let (lo, hi) = if lo.compare(hi).is_some_and(Ordering::is_le) {
                    (lo, hi)
                } else {
                    (hi, lo)
                };
                Ok(Indexes::from(axis.positions_between(lo, hi)))
            }
            LabelSelector::Span(span) => {
                if axis.coord.kind() != Some(LabelKind::Time) {
                    return Err(CubeError::NotTemporal(axis.name.to_string()));
                }
                let positions = axis.positions_within(span);
                if positions.is_empty() {
                    return Err(not_found(&Label::Time(span.start)));
                }
                Ok(Indexes::from(positions))
            }
            LabelSelector::Nearest(label) => axis
                .nearest(label)
                .map(Indexes::from)
                .ok_or_else(|| not_found(label)),
        }
    }
}

impl From<Label> for LabelSelector {
    fn from(value: Label) -> Self {
        LabelSelector::Label(value)
    }
}

impl From<Vec<Label>> for LabelSelector {
    fn from(value: Vec<Label>) -> Self {
        LabelSelector::Labels(value)
    }
}

impl From<i64> for LabelSelector {
    fn from(value: i64) -> Self {
        LabelSelector::Label(Label::Int(value))
    }
}

impl From<f64> for LabelSelector {
    fn from(value: f64) -> Self {
        LabelSelector::Label(Label::Float(value))
    }
}

/// Datetime strings select their whole period, a full timestamp selects one
/// label. Anything else is a text label.
impl From<&str> for LabelSelector {
    fn from(value: &str) -> Self {
        match TimeSpan::parse(value) {
            Ok(span) if span.is_instant() => LabelSelector::Label(Label::Time(span.start)),
            Ok(span) => LabelSelector::Span(span),
            Err(_) => LabelSelector::Label(Label::from(value)),
        }
    }
}

impl Dataset {
    /// Position based selection, ranges are half open.
    pub fn isel(&self, selectors: &[(&str, Indexes)]) -> Result<Self> {
        let mut axes = self.axes().clone();
        let mut resolved = Vec::with_capacity(selectors.len());
        for (name, indexes) in selectors {
            let axis = axes.get(name)?.clone();
            let positions = indexes.indexes_from(name, axis.len())?;
            match &positions {
                Either::Left(_) => {
                    axes.remove(name);
                }
                Either::Right(positions) => {
                    let axis = axis.with_coord(axis.coord.select(positions));
                    axes.upsert(axis);
                }
            }
            resolved.push((*name, positions));
        }
        let variables = self
            .variables()
            .iter()
            .map(|variable| {
                resolved
                    .iter()
                    .fold(variable.clone(), |variable, (name, positions)| {
                        take(variable, name, positions)
                    })
            })
            .collect();
        Ok(Dataset::from_parts(axes, variables, self.attrs().clone()))
    }

    /// Label based selection, ranges include both ends.
    pub fn sel(&self, selectors: &[(&str, LabelSelector)]) -> Result<Self> {
        let indexes = resolve_all(self.axes(), selectors)?;
        self.isel(&indexes)
    }
}

impl DataArray {
    pub fn isel(&self, selectors: &[(&str, Indexes)]) -> Result<Self> {
        self.via_dataset(|ds| ds.isel(selectors))
    }

    pub fn sel(&self, selectors: &[(&str, LabelSelector)]) -> Result<Self> {
        self.via_dataset(|ds| ds.sel(selectors))
    }
}

pub(crate) fn resolve_all<'a>(
    axes: &Axes,
    selectors: &[(&'a str, LabelSelector)],
) -> Result<Vec<(&'a str, Indexes)>> {
    selectors
        .iter()
        .map(|(name, selector)| Ok((*name, selector.resolve(axes.get(name)?)?)))
        .collect()
}

/// Restricts `variable` along `dim`, removing the dim for a single position.
fn take(variable: Variable, dim: &str, positions: &Either<usize, Arc<[usize]>>) -> Variable {
    let Some(axis) = variable.axis_of(dim) else {
        return variable;
    };
    match positions {
        Either::Left(position) => {
            let data = variable.data.index_axis(axis, *position).to_owned();
            variable.with_data(variable.dims.without(&[dim]), data)
        }
        Either::Right(positions) => {
            let data = variable.data.select(axis, positions);
            variable.with_data(variable.dims.clone(), data)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{components::Coordinate, testing::scenes};
    use itertools::Itertools;
    use rstest::rstest;

    #[rstest]
    fn position_ranges_are_half_open() {
        let ds = scenes();
        let first = ds.isel(&[("time", Indexes::from(0..5))]).unwrap();
        assert_eq!(first.axis("time").unwrap().len(), 5);
        assert_eq!(
            first.get("red").unwrap().at(&[0, 0, 0]).unwrap(),
            ds.get("red").unwrap().at(&[0, 0, 0]).unwrap()
        );
        assert_eq!(first.attrs(), ds.attrs());
    }

    #[rstest]
    fn label_ranges_include_both_ends() {
        let ds = scenes();
        let december = ds
            .sel(&[(
                "time",
                LabelSelector::range(
                    Label::time("2020-12-01").unwrap(),
                    Label::time("2020-12-25").unwrap(),
                ),
            )])
            .unwrap();
        let times = december.coord("time").unwrap();
        assert_eq!(times.len(), 3);
        assert_eq!(times.last(), Some(&Label::time("2020-12-25").unwrap()));
    }

    #[rstest]
    #[case(LabelSelector::range(0, 10), 2)]
    #[case(LabelSelector::range(10, 0), 2)]
    #[case(LabelSelector::range(5.0, 20), 2)]
    #[case(LabelSelector::range(-5, 100), 3)]
    fn numeric_ranges_mix_integers_and_floats(
        #[case] selector: LabelSelector,
        #[case] len: usize,
    ) {
        let selected = scenes().sel(&[("x", selector)]).unwrap();
        assert_eq!(selected.axis("x").unwrap().len(), len);
    }

    #[rstest]
    fn integer_axis_takes_float_bounds() {
        let ds = Dataset::builder()
            .axis("x", Coordinate::range(4))
            .variable("red", &["x"], ndarray::ArrayD::zeros(ndarray::IxDyn(&[4])))
            .build()
            .unwrap();
        let selected = ds.sel(&[("x", LabelSelector::range(0.5, 2.0))]).unwrap();
        assert_eq!(selected.coord("x").unwrap().to_vec(), [Label::Int(1), Label::Int(2)]);
    }

    #[rstest]
    #[case("x", LabelSelector::range(Label::time("2020-12-01").unwrap(), 10.0))]
    #[case("time", LabelSelector::range(0, 10))]
    #[case("y", LabelSelector::range("a", "z"))]
    fn ranges_of_another_kind_fail(#[case] axis: &str, #[case] selector: LabelSelector) {
        assert!(matches!(
            scenes().sel(&[(axis, selector)]),
            Err(CubeError::Alignment { .. })
        ));
    }

    #[rstest]
    fn time_range_extends_to_end_of_period() {
        let ds = scenes();
        let selector = LabelSelector::time_range("2020-12", "2021-01-05").unwrap();
        let selected = ds.sel(&[("time", selector)]).unwrap();
        assert_eq!(selected.axis("time").unwrap().len(), 4);
    }

    #[rstest]
    fn partial_date_selects_its_period() {
        let ds = scenes();
        let december = ds.sel(&[("time", "2020-12".into())]).unwrap();
        assert_eq!(december.axis("time").unwrap().len(), 3);
        assert_eq!(december.get("blue").unwrap().shape(), &[3, 2, 3]);
    }

    #[rstest]
    fn single_label_removes_axis() {
        let ds = scenes();
        let scene = ds.sel(&[("time", "2020-12-25T00:00:00".into())]).unwrap();
        assert!(!scene.axes().contains("time"));
        let red = scene.get("red").unwrap();
        assert_eq!(red.dims().names().collect_vec(), ["y", "x"]);
        assert_eq!(red.at(&[0, 0]).unwrap(), ds.get("red").unwrap().at(&[3, 0, 0]).unwrap());

        let pixel = ds.get("red").unwrap().isel(&[("y", Indexes::from(1usize)), ("x", Indexes::from(2usize))]).unwrap();
        assert_eq!(pixel.shape(), &[6]);
    }

    #[rstest]
    fn descending_axis_accepts_either_order() {
        let ds = scenes();
        let rows = ds.sel(&[("y", LabelSelector::range(95.0, 100.0))]).unwrap();
        assert_eq!(rows.coord("y").unwrap().to_vec(), vec![Label::Float(100.0)]);
    }

    #[rstest]
    fn nearest_snaps_to_closest_label() {
        let ds = scenes();
        let column = ds.sel(&[("x", LabelSelector::nearest(12.0))]).unwrap();
        assert!(!column.axes().contains("x"));
        assert_eq!(column.get("blue").unwrap().at(&[0, 0]).unwrap(), 101.0);
    }

    #[rstest]
    fn lookup_failures_are_distinct() {
        let ds = scenes();
        assert!(matches!(
            ds.sel(&[("time", "2020-12-02T00:00:00".into())]),
            Err(CubeError::LabelNotFound { .. })
        ));
        assert!(matches!(
            ds.isel(&[("time", Indexes::from(35usize))]),
            Err(CubeError::IndexOutOfBounds { .. })
        ));
        assert!(matches!(
            ds.sel(&[("band", "red".into())]),
            Err(CubeError::AxisNotFound(_))
        ));
        assert!(matches!(
            ds.sel(&[("x", "2020".into())]),
            Err(CubeError::NotTemporal(_))
        ));
    }
}
