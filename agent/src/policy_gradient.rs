use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tch::{nn, nn::OptimizerConfig, Device, Kind, Tensor};
use tracing::info;

use crate::agent::*;
use crate::error::Result;

/// Longest stretch of transitions kept before an update is forced.
const MAX_EVENTS: usize = 5000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyGradientConfig {
    pub learning_rate: f64,
    pub gamma: f64,
    pub hidden_size: i64,
}

impl Default for PolicyGradientConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-2,
            gamma: 0.999,
            hidden_size: 32,
        }
    }
}

#[derive(Debug)]
pub struct SoftmaxNetwork {
    pub input_layer: nn::Linear,
    pub final_layer: nn::Linear,
}

impl SoftmaxNetwork {
    fn new(vs: &nn::Path, input_dims: i64, output_dims: i64, hidden_size: i64) -> SoftmaxNetwork {
        SoftmaxNetwork {
            input_layer: nn::linear(vs / "input", input_dims, hidden_size, Default::default()),
            final_layer: nn::linear(vs / "output", hidden_size, output_dims, Default::default()),
        }
    }
}

impl nn::Module for SoftmaxNetwork {
    fn forward(&self, xs: &Tensor) -> Tensor {
        xs.apply(&self.input_layer).tanh().apply(&self.final_layer)
    }
}

struct Event {
    observation: Tensor,
    reward: f64,
    action: i64,
    is_done: bool,
}

/// REINFORCE: one gradient step per finished episode.
pub struct PolicyGradientAgent {
    pub network: SoftmaxNetwork,
    vs: nn::VarStore,
    events_buf: Vec<Event>,
    optimizer: nn::Optimizer,
    config: PolicyGradientConfig,
    output_dims: i64,
    device: Device,
    rng: StdRng,
}

impl PolicyGradientAgent {
    pub fn new(
        input_dims: i64,
        output_dims: i64,
        config: PolicyGradientConfig,
        seed: u64,
    ) -> Result<Self> {
        let device = Device::cuda_if_available();
        info!(?device, "detected device");
        tch::manual_seed(seed as i64);
        let vs = nn::VarStore::new(device);
        let network = SoftmaxNetwork::new(&vs.root(), input_dims, output_dims, config.hidden_size);
        let optimizer = nn::RmsProp::default().build(&vs, config.learning_rate)?;
        Ok(PolicyGradientAgent {
            network,
            vs,
            events_buf: Vec::new(),
            optimizer,
            config,
            output_dims,
            device,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    fn optimize(&mut self) -> f64 {
        let rewards: Vec<f64> = self.events_buf.iter().map(|e| e.reward).collect();
        let dones: Vec<bool> = self.events_buf.iter().map(|e| e.is_done).collect();
        let values = discounted_returns(&rewards, &dones, self.config.gamma);
        let values = Tensor::of_slice(&values)
            .to_kind(Kind::Float)
            .to_device(self.device);
        let observations: Vec<Tensor> = self
            .events_buf
            .iter()
            .map(|s| s.observation.shallow_clone())
            .collect();
        let observations = Tensor::stack(&observations, 0).to_device(self.device);
        let logits = observations.apply(&self.network);
        let actions: Vec<i64> = self.events_buf.iter().map(|s| s.action).collect();
        let actions = Tensor::of_slice(&actions).unsqueeze(1).to_device(self.device);
        let action_mask = Tensor::zeros(
            &[self.events_buf.len() as i64, self.output_dims],
            (Kind::Float, self.device),
        )
        .scatter_value(1, &actions, 1.0);
        let log_probs = (action_mask * logits.log_softmax(1, Kind::Float)).sum_dim_intlist(
            &[1],
            false,
            Kind::Float,
        );
        let loss = -(values * log_probs).mean(Kind::Float);
        self.optimizer.backward_step(&loss);
        self.events_buf.clear();
        loss.double_value(&[])
    }
}

impl Agent for PolicyGradientAgent {
    fn select_action(&mut self, obs: &Tensor) -> i64 {
        let logits = self.forward(obs);
        sample_from_logits(&mut self.rng, &logits)
    }

    fn predict(&self, obs: &Tensor) -> i64 {
        argmax(&self.forward(obs))
    }

    fn forward(&self, obs: &Tensor) -> Tensor {
        tch::no_grad(|| {
            obs.to_device(self.device)
                .unsqueeze(0)
                .apply(&self.network)
                .squeeze()
        })
    }

    fn consume_event(
        &mut self,
        obs: &Tensor,
        _next_obs: Option<&Tensor>,
        reward: f64,
        action: i64,
        is_done: bool,
    ) -> Option<f64> {
        self.events_buf.push(Event {
            observation: obs.copy(),
            reward,
            action,
            is_done,
        });
        if is_done || self.events_buf.len() >= MAX_EVENTS {
            Some(self.optimize())
        } else {
            None
        }
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.vs.save(path)?;
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        load_var_store(&mut self.vs, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_happens_at_episode_end() {
        let mut agent = PolicyGradientAgent::new(4, 2, Default::default(), 0).unwrap();
        let obs = Tensor::of_slice(&[0.0f32, 0.1, -0.1, 0.0]);
        for _ in 0..5 {
            let action = agent.select_action(&obs);
            assert!(agent.consume_event(&obs, Some(&obs), 1.0, action, false).is_none());
        }
        let loss = agent.consume_event(&obs, None, 0.0, 0, true).unwrap();
        assert!(loss.is_finite());
        assert!(agent.events_buf.is_empty());
    }

    #[test]
    fn rewarded_action_becomes_more_likely() {
        let config = PolicyGradientConfig {
            learning_rate: 1e-2,
            gamma: 0.9,
            hidden_size: 16,
        };
        let mut agent = PolicyGradientAgent::new(4, 2, config, 1).unwrap();
        let obs = Tensor::of_slice(&[0.5f32, -0.5, 0.25, 0.0]);
        let before = agent.forward(&obs).softmax(0, Kind::Float).double_value(&[1]);
        for _ in 0..20 {
            for _ in 0..4 {
                agent.consume_event(&obs, Some(&obs), 1.0, 1, false);
            }
            agent.consume_event(&obs, None, 1.0, 1, true);
        }
        let after = agent.forward(&obs).softmax(0, Kind::Float).double_value(&[1]);
        assert!(after > before);
    }
}
