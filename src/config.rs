use crate::{errors::Result, lazy::ChunkPlan};

const THREAD_NAME_PREFIX: &str = "rustercube-worker";

/// Settings of a [Session](crate::session::Session).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker threads, one per core when unset.
    pub workers: Option<usize>,
    pub thread_name_prefix: String,
    /// Block sizes for lazy datasets that bring none of their own.
    pub default_chunks: Option<ChunkPlan>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: None,
            thread_name_prefix: THREAD_NAME_PREFIX.to_string(),
            default_chunks: None,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: &str) -> Self {
        self.thread_name_prefix = prefix.to_string();
        self
    }

    pub fn with_default_chunks(mut self, chunks: ChunkPlan) -> Self {
        self.default_chunks = Some(chunks);
        self
    }
}
