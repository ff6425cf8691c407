//! Trained models on disk: libtorch weights plus a JSON description.
//!
//! A checkpoint with base path `ppo_cartpole` is stored as `ppo_cartpole.ot`
//! and `ppo_cartpole.json`.

use std::fs;
use std::path::{Path, PathBuf};

use agent::Agent;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::method::AlgorithmConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub algorithm: AlgorithmConfig,
    pub env_id: String,
    pub input_dims: i64,
    pub output_dims: i64,
    /// Environment steps trained so far, across runs.
    pub timesteps: u64,
}

pub fn weights_path(base: &Path) -> PathBuf {
    base.with_extension("ot")
}

pub fn meta_path(base: &Path) -> PathBuf {
    base.with_extension("json")
}

pub fn exists(base: &Path) -> bool {
    weights_path(base).exists() && meta_path(base).exists()
}

impl Checkpoint {
    pub fn save(&self, base: &Path, agent: &dyn Agent) -> Result<()> {
        if let Some(dir) = base.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        agent
            .save(&weights_path(base))
            .with_context(|| format!("saving weights to {}", weights_path(base).display()))?;
        let meta = serde_json::to_string_pretty(self)?;
        fs::write(meta_path(base), meta)
            .with_context(|| format!("writing {}", meta_path(base).display()))?;
        Ok(())
    }

    pub fn read(base: &Path) -> Result<Self> {
        let path = meta_path(base);
        let text =
            fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Reads the description and rebuilds the agent with the saved weights.
    pub fn load(base: &Path, seed: u64) -> Result<(Self, Box<dyn Agent>)> {
        let checkpoint = Self::read(base)?;
        let mut agent = checkpoint
            .algorithm
            .build(checkpoint.input_dims, checkpoint.output_dims, seed)?;
        agent
            .load(&weights_path(base))
            .with_context(|| format!("loading weights from {}", weights_path(base).display()))?;
        Ok((checkpoint, agent))
    }
}
