mod chunking;
pub use chunking::{ChunkPlan, ChunkPlanError};

use itertools::Itertools;
use log::{debug, info};
use rayon::prelude::*;
use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::{
    components::{Coordinate, Dataset},
    errors::{CubeError, Result},
    indexes::Indexes,
    indices::{calculate_indices, SpectralIndex},
    interpolation::InterpOptions,
    masking::{Mask, MaskOptions},
    merge::MergeOptions,
    reduction::{Frequency, GroupKey, Reduction},
    selection::LabelSelector,
    sensors::Sensor,
    session::Session,
};

type Loader = Arc<dyn Fn() -> Result<Dataset> + Send + Sync>;
type ValueMap = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Block local operation on one input.
#[derive(Clone)]
enum Op {
    Isel(Vec<(String, Indexes)>),
    Sel(Vec<(String, LabelSelector)>),
    Reduce {
        dims: Vec<String>,
        reduction: Reduction,
    },
    GroupReduce {
        axis: String,
        key: GroupKey,
        reduction: Reduction,
    },
    ResampleReduce {
        axis: String,
        frequency: Frequency,
        reduction: Reduction,
    },
    Where {
        mask: Mask,
        options: MaskOptions,
    },
    Interp {
        axis: String,
        targets: Coordinate,
        options: InterpOptions,
    },
    Indices {
        indices: Vec<SpectralIndex>,
        sensor: Arc<dyn Sensor>,
    },
    Map {
        name: Arc<str>,
        f: ValueMap,
    },
}

impl Op {
    /// Axes a block must hold in full.
    fn pinned(&self) -> Vec<String> {
        match self {
            Op::Isel(selectors) => selectors.iter().map(|(axis, _)| axis.clone()).collect(),
            Op::Sel(selectors) => selectors.iter().map(|(axis, _)| axis.clone()).collect(),
            Op::Reduce { dims, .. } => dims.clone(),
            Op::GroupReduce { axis, .. }
            | Op::ResampleReduce { axis, .. }
            | Op::Interp { axis, .. } => vec![axis.clone()],
            Op::Where { mask, .. } => mask.axes().names().map(String::from).collect(),
            Op::Indices { .. } | Op::Map { .. } => Vec::new(),
        }
    }

    fn apply(&self, input: &Dataset) -> Result<Dataset> {
        match self {
            Op::Isel(selectors) => {
                let selectors = selectors
                    .iter()
                    .map(|(axis, indexes)| (axis.as_str(), indexes.clone()))
                    .collect_vec();
                input.isel(&selectors)
            }
            Op::Sel(selectors) => {
                let selectors = selectors
                    .iter()
                    .map(|(axis, selector)| (axis.as_str(), selector.clone()))
                    .collect_vec();
                input.sel(&selectors)
            }
            Op::Reduce { dims, reduction } => {
                let dims = dims.iter().map(String::as_str).collect_vec();
                input.reduce(&dims, *reduction)
            }
            Op::GroupReduce {
                axis,
                key,
                reduction,
            } => input.groupby(axis, key.clone())?.reduce(*reduction),
            Op::ResampleReduce {
                axis,
                frequency,
                reduction,
            } => input.resample(axis, *frequency)?.reduce(*reduction),
            Op::Where { mask, options } => input.where_(mask, options),
            Op::Interp {
                axis,
                targets,
                options,
            } => input.interp(axis, targets, options),
            Op::Indices { indices, sensor } => calculate_indices(input, indices, sensor.as_ref()),
            Op::Map { f, .. } => Ok(input.map(|value| f(value))),
        }
    }

    fn label(&self) -> String {
        let reduction_name = |reduction: &Reduction| format!("{reduction:?}").to_lowercase();
        match self {
            Op::Isel(selectors) => format!("isel {}", selectors.iter().map(|(axis, _)| axis).join(", ")),
            Op::Sel(selectors) => format!("sel {}", selectors.iter().map(|(axis, _)| axis).join(", ")),
            Op::Reduce { dims, reduction } => {
                format!("{} over {}", reduction_name(reduction), dims.join(", "))
            }
            Op::GroupReduce {
                axis,
                key,
                reduction,
            } => format!("{} by {} of {axis}", reduction_name(reduction), key.name()),
            Op::ResampleReduce {
                axis,
                frequency,
                reduction,
            } => format!("{} per {frequency:?} of {axis}", reduction_name(reduction)),
            Op::Where { mask, .. } => format!("where over {}", mask.dims().names().join(", ")),
            Op::Interp { axis, targets, .. } => format!("interp {} labels of {axis}", targets.len()),
            Op::Indices { indices, sensor } => format!(
                "{} from {}",
                indices.iter().map(SpectralIndex::name).join(", "),
                sensor.collection()
            ),
            Op::Map { name, .. } => format!("map {name}"),
        }
    }
}

enum Node {
    Source(Dataset),
    Deferred { name: Arc<str>, load: Loader },
    Apply { op: Op, input: Arc<Node> },
    Merge {
        lhs: Arc<Node>,
        rhs: Arc<Node>,
        options: MergeOptions,
    },
}

impl Node {
    fn inputs(&self) -> Vec<&Arc<Node>> {
        match self {
            Node::Source(_) | Node::Deferred { .. } => Vec::new(),
            Node::Apply { input, .. } => vec![input],
            Node::Merge { lhs, rhs, .. } => vec![lhs, rhs],
        }
    }

    fn label(&self) -> String {
        match self {
            Node::Source(dataset) => format!(
                "dataset ({})",
                dataset
                    .sizes()
                    .iter()
                    .map(|(axis, len)| format!("{axis}: {len}"))
                    .join(", ")
            ),
            Node::Deferred { name, .. } => format!("load {name}"),
            Node::Apply { op, .. } => op.label(),
            Node::Merge { options, .. } => format!("merge {:?}", options.join).to_lowercase(),
        }
    }
}

/// Flag shared with a running materialization.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks not started yet are skipped, the run fails with `Cancelled`.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CubeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Deferred dataset, a graph of operations over a source.
///
/// Nothing runs until [LazyDataset::materialize]. The graph never changes
/// once built, so it can be materialized any number of times.
#[derive(Clone)]
pub struct LazyDataset {
    node: Arc<Node>,
    chunks: Option<ChunkPlan>,
}

impl Debug for LazyDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyDataset")
            .field("node", &self.node.label())
            .field("chunks", &self.chunks)
            .finish()
    }
}

impl LazyDataset {
    pub fn from_dataset(dataset: Dataset) -> Self {
        Self {
            node: Arc::new(Node::Source(dataset)),
            chunks: None,
        }
    }

    /// Source produced by `load` at materialization time, e.g. a data cube query.
    pub fn deferred<F>(name: &str, load: F) -> Self
    where
        F: Fn() -> Result<Dataset> + Send + Sync + 'static,
    {
        Self {
            node: Arc::new(Node::Deferred {
                name: Arc::from(name),
                load: Arc::new(load),
            }),
            chunks: None,
        }
    }

    /// Block sizes used when materializing, instead of the session default.
    pub fn with_chunks(mut self, chunks: ChunkPlan) -> Self {
        self.chunks = Some(chunks);
        self
    }

    pub fn chunks(&self) -> Option<&ChunkPlan> {
        self.chunks.as_ref()
    }

    fn apply(&self, op: Op) -> Self {
        Self {
            node: Arc::new(Node::Apply {
                op,
                input: Arc::clone(&self.node),
            }),
            chunks: self.chunks.clone(),
        }
    }

    pub fn isel(&self, selectors: &[(&str, Indexes)]) -> Self {
        self.apply(Op::Isel(
            selectors
                .iter()
                .map(|(axis, indexes)| (axis.to_string(), indexes.clone()))
                .collect(),
        ))
    }

    pub fn sel(&self, selectors: &[(&str, LabelSelector)]) -> Self {
        self.apply(Op::Sel(
            selectors
                .iter()
                .map(|(axis, selector)| (axis.to_string(), selector.clone()))
                .collect(),
        ))
    }

    pub fn reduce(&self, dims: &[&str], reduction: Reduction) -> Self {
        self.apply(Op::Reduce {
            dims: dims.iter().map(|dim| dim.to_string()).collect(),
            reduction,
        })
    }

    pub fn group_reduce(&self, axis: &str, key: impl Into<GroupKey>, reduction: Reduction) -> Self {
        self.apply(Op::GroupReduce {
            axis: axis.to_string(),
            key: key.into(),
            reduction,
        })
    }

    pub fn resample_reduce(&self, axis: &str, frequency: Frequency, reduction: Reduction) -> Self {
        self.apply(Op::ResampleReduce {
            axis: axis.to_string(),
            frequency,
            reduction,
        })
    }

    pub fn where_(&self, mask: &Mask, options: &MaskOptions) -> Self {
        self.apply(Op::Where {
            mask: mask.clone(),
            options: *options,
        })
    }

    pub fn interp(&self, axis: &str, targets: &Coordinate, options: &InterpOptions) -> Self {
        self.apply(Op::Interp {
            axis: axis.to_string(),
            targets: targets.clone(),
            options: *options,
        })
    }

    pub fn with_indices(&self, indices: &[SpectralIndex], sensor: Arc<dyn Sensor>) -> Self {
        self.apply(Op::Indices {
            indices: indices.to_vec(),
            sensor,
        })
    }

    /// Applies `f` to every value, `name` labels the step in the graph.
    pub fn map<F>(&self, name: &str, f: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        self.apply(Op::Map {
            name: Arc::from(name),
            f: Arc::new(f),
        })
    }

    pub fn merge(&self, other: &LazyDataset, options: &MergeOptions) -> Self {
        Self {
            node: Arc::new(Node::Merge {
                lhs: Arc::clone(&self.node),
                rhs: Arc::clone(&other.node),
                options: *options,
            }),
            chunks: self.chunks.clone().or_else(|| other.chunks.clone()),
        }
    }

    pub fn materialize(&self, session: &Session) -> Result<Dataset> {
        self.materialize_with(session, &CancelToken::new())
    }

    /// Runs every node once, block by block on the session's workers.
    pub fn materialize_with(&self, session: &Session, cancel: &CancelToken) -> Result<Dataset> {
        let plan = self
            .chunks
            .clone()
            .or_else(|| session.config().default_chunks.clone())
            .unwrap_or_default();
        info!("Materializing {} nodes", self.nodes().len());
        let mut run = Run {
            session,
            cancel,
            plan,
            done: HashMap::new(),
        };
        run.evaluate(&self.node)
    }

    /// Nodes in dependency order, each once.
    fn nodes(&self) -> Vec<Arc<Node>> {
        fn visit(node: &Arc<Node>, seen: &mut HashSet<*const Node>, order: &mut Vec<Arc<Node>>) {
            if !seen.insert(Arc::as_ptr(node)) {
                return;
            }
            for input in node.inputs() {
                visit(input, seen, order);
            }
            order.push(Arc::clone(node));
        }
        let mut order = Vec::new();
        visit(&self.node, &mut HashSet::new(), &mut order);
        order
    }

    /// Task graph in Graphviz DOT.
    pub fn to_dot(&self) -> String {
        let nodes = self.nodes();
        let ids: HashMap<*const Node, usize> = nodes
            .iter()
            .enumerate()
            .map(|(id, node)| (Arc::as_ptr(node), id))
            .collect();
        let mut dot = String::from("digraph {\n");
        for (id, node) in nodes.iter().enumerate() {
            dot.push_str(&format!(
                "    {id} [label=\"{}\"];\n",
                node.label().replace('"', "\\\"")
            ));
            for input in node.inputs() {
                if let Some(from) = ids.get(&Arc::as_ptr(input)) {
                    dot.push_str(&format!("    {from} -> {id};\n"));
                }
            }
        }
        dot.push_str("}\n");
        dot
    }
}

struct Run<'a> {
    session: &'a Session,
    cancel: &'a CancelToken,
    plan: ChunkPlan,
    done: HashMap<*const Node, Dataset>,
}

impl Run<'_> {
    fn evaluate(&mut self, node: &Arc<Node>) -> Result<Dataset> {
        if let Some(done) = self.done.get(&Arc::as_ptr(node)) {
            return Ok(done.clone());
        }
        self.cancel.check()?;
        let result = match node.as_ref() {
            Node::Source(dataset) => dataset.clone(),
            Node::Deferred { name, load } => {
                info!("Loading `{name}`");
                load()?
            }
            Node::Apply { op, input } => {
                let input = self.evaluate(input)?;
                self.run_blocks(op, &input)?
            }
            Node::Merge { lhs, rhs, options } => {
                let lhs = self.evaluate(lhs)?;
                let rhs = self.evaluate(rhs)?;
                lhs.merge(&rhs, options)
                    .map_err(|source| CubeError::BlockFailed {
                        block: 0,
                        source: Box::new(source),
                    })?
            }
        };
        self.done.insert(Arc::as_ptr(node), result.clone());
        Ok(result)
    }

    fn run_blocks(&self, op: &Op, input: &Dataset) -> Result<Dataset> {
        let grid = self.plan.grid(input, &op.pinned());
        let blocks = grid.blocks();
        debug!("Running `{}` in {} blocks", op.label(), blocks.len());
        let cancel = self.cancel;
        let parts = self.session.pool().install(|| {
            blocks
                .par_iter()
                .enumerate()
                .map(|(block, selectors)| {
                    cancel.check()?;
                    input
                        .isel(selectors)
                        .and_then(|part| op.apply(&part))
                        .map_err(|source| CubeError::BlockFailed {
                            block,
                            source: Box::new(source),
                        })
                })
                .collect::<Result<Vec<_>>>()
        })?;
        grid.stitch(parts)
    }
}

/// Evaluation into an eager [Dataset].
pub trait Compute {
    fn compute(&self, session: &Session) -> Result<Dataset>;
}

impl Compute for Dataset {
    fn compute(&self, _session: &Session) -> Result<Dataset> {
        Ok(self.clone())
    }
}

impl Compute for LazyDataset {
    fn compute(&self, session: &Session) -> Result<Dataset> {
        self.materialize(session)
    }
}
