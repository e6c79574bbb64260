use itertools::Itertools;
use ndarray::{ArcArray, ArrayD, ArrayViewD, Axis as NdAxis, IxDyn};
use shrinkwraprs::Shrinkwrap;
use std::sync::Arc;

use crate::{
    components::Attrs,
    errors::{CubeError, Result},
};

/// Missing value sentinel.
pub const MISSING: f64 = f64::NAN;

pub type Data = ArcArray<f64, IxDyn>;

/// Axis names of a variable, one per array dimension.
#[derive(Shrinkwrap, Clone, Debug, PartialEq, Eq)]
pub struct Dims(Arc<[Arc<str>]>);

impl<'a> FromIterator<&'a str> for Dims {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(Arc::from).collect())
    }
}

impl FromIterator<Arc<str>> for Dims {
    fn from_iter<I: IntoIterator<Item = Arc<str>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[&str; N]> for Dims {
    fn from(value: [&str; N]) -> Self {
        value.into_iter().collect()
    }
}

impl From<&[&str]> for Dims {
    fn from(value: &[&str]) -> Self {
        value.iter().copied().collect()
    }
}

impl Dims {
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|dim| dim.as_ref() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + Clone {
        self.0.iter().map(|dim| dim.as_ref())
    }

    pub fn without(&self, names: &[&str]) -> Self {
        self.0
            .iter()
            .filter(|dim| !names.contains(&dim.as_ref()))
            .cloned()
            .collect()
    }

    pub fn replace(&self, name: &str, with: &str) -> Self {
        self.0
            .iter()
            .map(|dim| {
                if dim.as_ref() == name {
                    Arc::from(with)
                } else {
                    Arc::clone(dim)
                }
            })
            .collect()
    }
}

/// Named block of values over [Dims].
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: Arc<str>,
    pub dims: Dims,
    pub data: Data,
    pub attrs: Attrs,
}

impl Variable {
    pub fn new(name: &str, dims: impl Into<Dims>, data: ArrayD<f64>) -> Result<Self> {
        let dims = dims.into();
        if dims.len() != data.ndim() || dims.names().unique().count() != dims.len() {
            return Err(CubeError::ShapeMismatch {
                variable: name.to_string(),
                expected: vec![0; dims.len()],
                found: data.shape().to_vec(),
            });
        }
        Ok(Self {
            name: Arc::from(name),
            dims,
            data: data.into_shared(),
            attrs: Attrs::new(),
        })
    }

    pub fn axis_of(&self, dim: &str) -> Option<NdAxis> {
        self.dims.index_of(dim).map(NdAxis)
    }

    pub fn has_dim(&self, dim: &str) -> bool {
        self.dims.contains(dim)
    }

    pub fn view(&self) -> ArrayViewD<'_, f64> {
        self.data.view()
    }

    pub fn len_of(&self, dim: &str) -> Option<usize> {
        self.axis_of(dim).map(|axis| self.data.len_of(axis))
    }

    /// Same name and attributes over new values.
    pub fn with_data(&self, dims: Dims, data: ArrayD<f64>) -> Self {
        Self {
            name: Arc::clone(&self.name),
            dims,
            data: data.into_shared(),
            attrs: self.attrs.clone(),
        }
    }

    pub fn renamed(mut self, name: &str) -> Self {
        self.name = Arc::from(name);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;
    use rstest::rstest;

    #[rstest]
    fn dims_must_match_ndim() {
        let data = Array::zeros(IxDyn(&[2, 3]));
        assert!(Variable::new("red", ["y", "x"], data.clone()).is_ok());
        assert!(matches!(
            Variable::new("red", ["time", "y", "x"], data.clone()),
            Err(CubeError::ShapeMismatch { .. })
        ));
        assert!(Variable::new("red", ["x", "x"], data).is_err());
    }

    #[rstest]
    fn dims_replace_and_without() {
        let dims = Dims::from(["time", "y", "x"]);
        assert_eq!(dims.without(&["y"]), Dims::from(["time", "x"]));
        assert_eq!(dims.replace("time", "year"), Dims::from(["year", "y", "x"]));
        assert_eq!(dims.index_of("x"), Some(2));
    }
}
