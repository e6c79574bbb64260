pub mod array;
pub mod attrs;
pub mod coordinate;
pub mod dataset;
pub mod label;
pub mod variable;

pub use array::DataArray;
pub use attrs::{AttrValue, Attrs};
pub use coordinate::{Axes, Axis, Coordinate, Lookup};
pub use dataset::{Dataset, DatasetBuilder};
pub use label::{DatetimeComponent, Label, LabelKind, Resolution, TimeSpan};
pub use variable::{Data, Dims, Variable, MISSING};
