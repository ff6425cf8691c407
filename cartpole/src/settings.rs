//! Settings loaded from an optional TOML file, overridden by the command line.

use std::fs;
use std::path::{Path, PathBuf};

use agent::{DqnConfig, PolicyGradientConfig, PpoConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::method::{AlgorithmConfig, Method};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvSettings {
    pub id: String,
    /// Seed for the environment, the agent and libtorch. Drawn at random when unset.
    pub seed: Option<u64>,
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self {
            id: "CartPoleWide-v0".to_string(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainSettings {
    pub method: Method,
    pub total_timesteps: usize,
    /// Episodes between two progress reports.
    pub report_freq: usize,
    /// Checkpoint base path, `.ot` and `.json` are appended.
    pub model_path: PathBuf,
    /// Start from scratch even when a checkpoint exists.
    pub fresh: bool,
}

impl Default for TrainSettings {
    fn default() -> Self {
        Self {
            method: Method::Ppo,
            total_timesteps: 100,
            report_freq: 10,
            model_path: PathBuf::from("ppo_cartpole"),
            fresh: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluateSettings {
    pub episodes: usize,
    pub render: bool,
    pub fps: u32,
    pub frames_dir: Option<PathBuf>,
}

impl Default for EvaluateSettings {
    fn default() -> Self {
        Self {
            episodes: 1,
            render: true,
            fps: 30,
            frames_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub env: EnvSettings,
    pub train: TrainSettings,
    pub evaluate: EvaluateSettings,
    pub logging: LoggingSettings,
    pub ppo: PpoConfig,
    pub dqn: DqnConfig,
    pub policy_gradient: PolicyGradientConfig,
}

impl Settings {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid settings")
    }

    /// Reads `path` if given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading settings from {}", path.display()))?;
                Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Hyper-parameters of the configured training method.
    pub fn algorithm(&self) -> AlgorithmConfig {
        match self.train.method {
            Method::Ppo => AlgorithmConfig::Ppo(self.ppo.clone()),
            Method::Dqn => AlgorithmConfig::Dqn(self.dqn.clone()),
            Method::PolicyGradient => AlgorithmConfig::PolicyGradient(self.policy_gradient.clone()),
        }
    }

    pub fn seed(&self) -> u64 {
        self.env.seed.unwrap_or_else(rand::random)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_training_script() {
        let settings = Settings::default();
        assert_eq!(settings.env.id, "CartPoleWide-v0");
        assert_eq!(settings.train.method, Method::Ppo);
        assert_eq!(settings.train.total_timesteps, 100);
        assert_eq!(settings.train.model_path, PathBuf::from("ppo_cartpole"));
        assert!(settings.evaluate.render);
        assert_eq!(settings.evaluate.fps, 30);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let settings = Settings::from_toml(
            r#"
            [env]
            id = "CartPole-v1"
            seed = 7

            [train]
            method = "dqn"
            total_timesteps = 5000

            [dqn]
            batch_size = 32
            "#,
        )
        .unwrap();
        assert_eq!(settings.env.id, "CartPole-v1");
        assert_eq!(settings.seed(), 7);
        assert_eq!(settings.train.report_freq, 10);
        match settings.algorithm() {
            AlgorithmConfig::Dqn(c) => {
                assert_eq!(c.batch_size, 32);
                assert_eq!(c.memory_capacity, DqnConfig::default().memory_capacity);
            }
            other => panic!("unexpected algorithm {:?}", other),
        }
    }

    #[test]
    fn untrainable_dqn_settings_fail_to_build() {
        let text = "[train]\nmethod = \"dqn\"\n[dqn]\ntarget_update_freq = 0\nbatch_size = 2\n";
        let settings = Settings::from_toml(text).unwrap();
        let built = settings.algorithm().build(4, 2, 0);
        assert!(matches!(built, Err(agent::Error::InvalidConfig(_))));
    }

    #[test]
    fn unknown_method_is_an_error() {
        assert!(Settings::from_toml("[train]\nmethod = \"a2c\"\n").is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cartpole.toml");
        fs::write(&path, "[evaluate]\nepisodes = 3\nrender = false\n").unwrap();
        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.evaluate.episodes, 3);
        assert!(!settings.evaluate.render);
        assert!(Settings::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
