pub mod components;
mod config;
mod datacube;
mod errors;
mod indexes;
mod indices;
mod interpolation;
mod intersection;
pub mod lazy;
mod masking;
mod merge;
mod plot;
mod reduction;
mod selection;
pub mod sensors;
mod session;

#[cfg(test)]
mod testing;

pub use components::{DataArray, Dataset, Label, TimeSpan, MISSING};
pub use config::Config;
pub use datacube::{Datacube, GroupRule, MemoryCube, Product, Progress, Query};
pub use errors::{CubeError, Result};
pub use indexes::Indexes;
pub use indices::{calculate_indices, SpectralIndex};
pub use interpolation::{InterpMethod, InterpOptions};
pub use intersection::{Intersection, IntersectionError};
pub use lazy::{CancelToken, ChunkPlan, Compute, LazyDataset};
pub use masking::{Comparison, Mask, MaskOptions, Predicate};
pub use merge::{Join, MergeOptions, Precedence};
pub use plot::{rgb_composite, PlotOptions, Plotter};
pub use reduction::{Frequency, GroupBy, GroupKey, Reduction};
pub use selection::LabelSelector;
pub use sensors::{sensor, Band, Sensor};
pub use session::Session;
