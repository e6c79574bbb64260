use crate::{components::Label, intersection::IntersectionError, lazy::ChunkPlanError};

pub type Result<T> = std::result::Result<T, CubeError>;

#[derive(thiserror::Error, Debug)]
pub enum CubeError {
    #[error(transparent)]
    NdarrayError(#[from] ndarray::ShapeError),
    #[error(transparent)]
    ConfigError(#[from] serde_json::Error),
    #[error(transparent)]
    ChunkPlanError(#[from] ChunkPlanError),
    #[error(transparent)]
    NoIntersection(#[from] IntersectionError),
    #[error("Variable `{0}` not found")]
    VariableNotFound(String),
    #[error("Variable `{0}` already exists")]
    DuplicateVariable(String),
    #[error("Axis `{0}` not found")]
    AxisNotFound(String),
    #[error("Label {label} not found on axis `{axis}`")]
    LabelNotFound { axis: String, label: Label },
    #[error("Position {index} out of bounds for axis `{axis}` of length {len}")]
    IndexOutOfBounds {
        axis: String,
        index: usize,
        len: usize,
    },
    #[error("Axis `{0}` is not monotonic, label ranges are undefined")]
    NotMonotonic(String),
    #[error("Axis `{0}` does not hold datetime labels")]
    NotTemporal(String),
    #[error("Axis `{0}` does not hold numeric labels")]
    NotNumeric(String),
    #[error("Could not parse `{0}` as a datetime")]
    InvalidDatetime(String),
    #[error("Variable `{variable}` has shape {found:?}, expected {expected:?} from its axes")]
    ShapeMismatch {
        variable: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("Cannot align on axis `{axis}`: {reason}")]
    Alignment { axis: String, reason: String },
    #[error("Invalid resampling frequency: {0}")]
    InvalidFrequency(String),
    #[error("Label {label} lies outside the covered range of axis `{axis}`")]
    Extrapolation { axis: String, label: Label },
    #[error("Conflicting values for variable `{0}` while merging")]
    MergeConflict(String),
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Product `{0}` not found")]
    ProductNotFound(String),
    #[error("Materialization failed on block {block}: {source}")]
    BlockFailed {
        block: usize,
        #[source]
        source: Box<CubeError>,
    },
    #[error("Materialization was cancelled")]
    Cancelled,
    #[error("Worker pool could not be built: {0}")]
    WorkerPool(String),
}
