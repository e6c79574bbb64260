use log::info;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{fmt::Debug, sync::Arc};

use crate::{
    components::Dataset,
    config::Config,
    datacube::{Datacube, Query},
    errors::{CubeError, Result},
    lazy::LazyDataset,
};

/// Context of a working session, the data cube and the worker pool.
///
/// Opened once and passed to whatever needs it, dropped or closed at the end.
pub struct Session {
    config: Config,
    datacube: Arc<dyn Datacube>,
    pool: ThreadPool,
}

impl Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("workers", &self.workers())
            .finish()
    }
}

impl Session {
    pub fn open(config: Config, datacube: Arc<dyn Datacube>) -> Result<Self> {
        let prefix = config.thread_name_prefix.clone();
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers.unwrap_or(0))
            .thread_name(move |idx| format!("{prefix}-{idx}"))
            .build()
            .map_err(|err| CubeError::WorkerPool(err.to_string()))?;
        info!(
            "Opened session with {} workers over {} products",
            pool.current_num_threads(),
            datacube.list_products().len()
        );
        Ok(Self {
            config,
            datacube,
            pool,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn datacube(&self) -> &dyn Datacube {
        self.datacube.as_ref()
    }

    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn load(&self, query: &Query) -> Result<Dataset> {
        info!("Loading {query:?}");
        self.datacube.load(query)
    }

    /// Deferred load, chunked by the query's plan when it has one.
    pub fn load_lazy(&self, query: &Query) -> LazyDataset {
        let datacube = Arc::clone(&self.datacube);
        let deferred = query.clone();
        let lazy = LazyDataset::deferred(&query.product, move || datacube.load(&deferred));
        match &query.chunks {
            Some(chunks) => lazy.with_chunks(chunks.clone()),
            None => lazy,
        }
    }

    pub fn materialize(&self, lazy: &LazyDataset) -> Result<Dataset> {
        lazy.materialize(self)
    }

    /// Ends the session, waiting for the workers to shut down.
    pub fn close(self) {
        info!("Closing session with {} workers", self.workers());
        drop(self.pool);
    }
}
