use itertools::Itertools;
use std::collections::BTreeMap;

use crate::{
    components::Dataset,
    errors::{CubeError, Result},
    indexes::Indexes,
};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ChunkPlanError {
    #[error("Block size of axis `{0}` must be positive")]
    ZeroBlockSize(String),
}

/// Block size per axis name, `{"time": 1, "x": 1000, "y": 1000}`.
///
/// Axes without an entry stay whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "BTreeMap<String, usize>", into = "BTreeMap<String, usize>")]
pub struct ChunkPlan {
    blocks: BTreeMap<String, usize>,
}

impl TryFrom<BTreeMap<String, usize>> for ChunkPlan {
    type Error = ChunkPlanError;

    fn try_from(blocks: BTreeMap<String, usize>) -> std::result::Result<Self, Self::Error> {
        if let Some((axis, _)) = blocks.iter().find(|(_, size)| **size == 0) {
            return Err(ChunkPlanError::ZeroBlockSize(axis.clone()));
        }
        Ok(Self { blocks })
    }
}

impl From<ChunkPlan> for BTreeMap<String, usize> {
    fn from(value: ChunkPlan) -> Self {
        value.blocks
    }
}

impl ChunkPlan {
    pub fn new<'a>(
        blocks: impl IntoIterator<Item = (&'a str, usize)>,
    ) -> std::result::Result<Self, ChunkPlanError> {
        blocks
            .into_iter()
            .map(|(axis, size)| (axis.to_string(), size))
            .collect::<BTreeMap<_, _>>()
            .try_into()
    }

    pub fn block_size(&self, axis: &str) -> Option<usize> {
        self.blocks.get(axis).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Splits `dataset` into a row-major grid of blocks along the chunked
    /// axes, skipping the `pinned` ones.
    pub(crate) fn grid(&self, dataset: &Dataset, pinned: &[String]) -> Grid {
        let split = dataset
            .axes()
            .iter()
            .filter(|axis| !pinned.iter().any(|name| name.as_str() == axis.name.as_ref()))
            .filter_map(|axis| {
                let size = self.block_size(&axis.name)?;
                (axis.len() > size).then(|| {
                    let ranges = (0..axis.len())
                        .step_by(size)
                        .map(|start| (start, size.min(axis.len() - start)))
                        .collect_vec();
                    (axis.name.to_string(), ranges)
                })
            })
            .collect_vec();
        Grid { split }
    }
}

/// Block layout of one operation's input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Grid {
    split: Vec<(String, Vec<(usize, usize)>)>,
}

impl Grid {
    pub(crate) fn len(&self) -> usize {
        self.split.iter().map(|(_, ranges)| ranges.len()).product()
    }

    /// Position selectors of every block, the last axis varying fastest.
    pub(crate) fn blocks(&self) -> Vec<Vec<(&str, Indexes)>> {
        if self.split.is_empty() {
            return vec![Vec::new()];
        }
        self.split
            .iter()
            .map(|(axis, ranges)| {
                ranges
                    .iter()
                    .map(move |(start, len)| (axis.as_str(), Indexes::block(*start, *len)))
            })
            .multi_cartesian_product()
            .collect()
    }

    /// Concatenates block results back along the split axes.
    pub(crate) fn stitch(&self, mut parts: Vec<Dataset>) -> Result<Dataset> {
        for (axis, ranges) in self.split.iter().rev() {
            parts = parts
                .chunks(ranges.len())
                .map(|chunk| Dataset::concat(chunk, axis))
                .collect::<Result<Vec<_>>>()?;
        }
        parts
            .into_iter()
            .exactly_one()
            .map_err(|parts| CubeError::Alignment {
                axis: self.split.iter().map(|(axis, _)| axis).join(", "),
                reason: format!("{} blocks left after stitching", parts.len()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::scenes;
    use rstest::rstest;

    #[rstest]
    fn zero_sized_blocks_are_rejected() {
        assert_eq!(
            ChunkPlan::new([("time", 1), ("x", 0)]),
            Err(ChunkPlanError::ZeroBlockSize("x".into()))
        );
    }

    #[rstest]
    fn plans_deserialize_from_maps() {
        let plan: ChunkPlan = serde_json::from_str(r#"{"time": 1, "x": 1000}"#).unwrap();
        assert_eq!(plan.block_size("time"), Some(1));
        assert_eq!(plan.block_size("y"), None);
        assert!(serde_json::from_str::<ChunkPlan>(r#"{"time": 0}"#).is_err());
    }

    #[rstest]
    #[case(&[("time", 4), ("x", 2)], &[], 4)]
    #[case(&[("time", 4), ("x", 2)], &["time"], 2)]
    #[case(&[("time", 10)], &[], 1)]
    #[case(&[("band", 1)], &[], 1)]
    fn grid_counts_blocks(
        #[case] blocks: &[(&str, usize)],
        #[case] pinned: &[&str],
        #[case] expected: usize,
    ) {
        let plan = ChunkPlan::new(blocks.iter().copied()).unwrap();
        let pinned = pinned.iter().map(|axis| axis.to_string()).collect_vec();
        let grid = plan.grid(&scenes(), &pinned);
        assert_eq!(grid.len(), expected);
        assert_eq!(grid.blocks().len(), expected);
    }

    #[rstest]
    fn stitching_restores_the_input() {
        let ds = scenes();
        let grid = ChunkPlan::new([("time", 4), ("x", 2)]).unwrap().grid(&ds, &[]);
        let parts = grid
            .blocks()
            .iter()
            .map(|selectors| ds.isel(selectors).unwrap())
            .collect_vec();
        assert_eq!(parts[1].sizes(), vec![("time", 4), ("y", 2), ("x", 1)]);
        let stitched = grid.stitch(parts).unwrap();
        assert_eq!(stitched.axes(), ds.axes());
        assert_eq!(stitched.get("nir").unwrap().values(), ds.get("nir").unwrap().values());
    }
}
