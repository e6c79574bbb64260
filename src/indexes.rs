use either::Either;
use std::{collections::HashSet, ops::Range, sync::Arc};

use crate::errors::{CubeError, Result};

/// Position selector for one axis.
///
/// A single position removes the axis, anything else keeps it. With `drop`
/// set the positions are excluded instead of selected.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Indexes {
    selection: Arc<[usize]>,
    drop: bool,
    scalar: bool,
}

impl From<usize> for Indexes {
    fn from(value: usize) -> Self {
        Indexes {
            selection: Arc::from([value]),
            drop: false,
            scalar: true,
        }
    }
}

impl<const N: usize> From<([usize; N], bool)> for Indexes {
    fn from(value: ([usize; N], bool)) -> Self {
        let selection = Arc::from(value.0);
        let drop = value.1;
        Indexes {
            selection,
            drop,
            scalar: false,
        }
    }
}

impl From<(Range<usize>, bool)> for Indexes {
    fn from(value: (Range<usize>, bool)) -> Self {
        let selection = value.0.collect();
        let drop = value.1;
        Indexes {
            selection,
            drop,
            scalar: false,
        }
    }
}

impl<const N: usize> From<[usize; N]> for Indexes {
    fn from(value: [usize; N]) -> Self {
        Indexes::from((value, false))
    }
}

impl From<Range<usize>> for Indexes {
    fn from(value: Range<usize>) -> Self {
        Indexes::from((value, false))
    }
}

impl From<Vec<usize>> for Indexes {
    fn from(value: Vec<usize>) -> Self {
        Indexes {
            selection: Arc::from(value),
            drop: false,
            scalar: false,
        }
    }
}

impl Indexes {
    /// Resolves against an axis of `collection_len`, `Left` for a single
    /// position that removes the axis.
    pub fn indexes_from(
        &self,
        axis: &str,
        collection_len: usize,
    ) -> Result<Either<usize, Arc<[usize]>>> {
        if let Some(&index) = self.selection.iter().find(|idx| **idx >= collection_len) {
            return Err(CubeError::IndexOutOfBounds {
                axis: axis.to_string(),
                index,
                len: collection_len,
            });
        }
        if self.drop {
            let drop_idxs: HashSet<usize> = self.selection.iter().copied().collect();
            Ok(Either::Right(
                (0..collection_len)
                    .filter(|idx| !drop_idxs.contains(idx))
                    .collect(),
            ))
        } else if self.scalar {
            Ok(Either::Left(self.selection[0]))
        } else {
            Ok(Either::Right(Arc::clone(&self.selection)))
        }
    }

    pub fn all() -> Self {
        Self {
            selection: Arc::from([]),
            drop: true,
            scalar: false,
        }
    }

    /// Contiguous positions `start..start + len`, e.g. one chunk.
    pub fn block(start: usize, len: usize) -> Self {
        Self::from(start..start + len)
    }

    pub fn is_scalar(&self) -> bool {
        self.scalar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Indexes::from(0..5), vec![0, 1, 2, 3, 4])]
    #[case(Indexes::from([4, 1]), vec![4, 1])]
    #[case(Indexes::from(([0, 2], true)), vec![1, 3, 4, 5])]
    #[case(Indexes::all(), vec![0, 1, 2, 3, 4, 5])]
    fn keeps_axis(#[case] indexes: Indexes, #[case] expected: Vec<usize>) {
        let resolved = indexes.indexes_from("time", 6).unwrap();
        assert_eq!(resolved.right().unwrap().to_vec(), expected);
    }

    #[rstest]
    fn single_position_drops_axis() {
        assert_eq!(Indexes::from(3).indexes_from("time", 6).unwrap(), Either::Left(3));
    }

    #[rstest]
    #[case(Indexes::from(6))]
    #[case(Indexes::from(4..7))]
    #[case(Indexes::from(([9], true)))]
    fn out_of_range_positions_fail(#[case] indexes: Indexes) {
        assert!(matches!(
            indexes.indexes_from("time", 6),
            Err(CubeError::IndexOutOfBounds { len: 6, .. })
        ));
    }
}
