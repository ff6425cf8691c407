use std::collections::vec_deque::VecDeque;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tch::{nn, nn::ModuleT, nn::OptimizerConfig, Device, Kind, Tensor};
use tracing::{debug, info, warn};

use crate::agent::*;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DqnConfig {
    pub learning_rate: f64,
    pub gamma: f64,
    pub batch_size: usize,
    pub memory_capacity: usize,
    pub target_update_freq: i64,
    pub exploration_decay_steps: i64,
    pub hidden_size: i64,
    pub hidden_layers: usize,
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-2,
            gamma: 0.999,
            batch_size: 128,
            memory_capacity: 10_000,
            target_update_freq: 1_000,
            exploration_decay_steps: 5_000,
            hidden_size: 32,
            hidden_layers: 2,
        }
    }
}

impl DqnConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));
        if self.batch_size == 0 {
            return invalid("dqn batch_size must be positive".into());
        }
        if self.memory_capacity < self.batch_size {
            return invalid(format!(
                "dqn memory_capacity {} is smaller than batch_size {}",
                self.memory_capacity, self.batch_size
            ));
        }
        if self.target_update_freq <= 0 {
            return invalid(format!(
                "dqn target_update_freq must be positive, got {}",
                self.target_update_freq
            ));
        }
        if self.exploration_decay_steps <= 0 {
            return invalid(format!(
                "dqn exploration_decay_steps must be positive, got {}",
                self.exploration_decay_steps
            ));
        }
        if self.hidden_size <= 0 {
            return invalid(format!("dqn hidden_size must be positive, got {}", self.hidden_size));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct DQNNetwork {
    pub input_layer: nn::Linear,
    pub layers: Vec<nn::Linear>,
    pub final_layer: nn::Linear,
}

impl DQNNetwork {
    fn new(
        vs: &nn::Path,
        input_dims: i64,
        output_dims: i64,
        hidden_size: i64,
        hidden_layers: usize,
    ) -> Self {
        let input_layer = nn::linear(vs / "input", input_dims, hidden_size, Default::default());
        let layers = (0..hidden_layers)
            .map(|i| {
                nn::linear(
                    vs / format!("hidden{}", i),
                    hidden_size,
                    hidden_size,
                    Default::default(),
                )
            })
            .collect();
        let final_layer = nn::linear(vs / "output", hidden_size, output_dims, Default::default());
        Self {
            input_layer,
            layers,
            final_layer,
        }
    }
}

impl nn::ModuleT for DQNNetwork {
    fn forward_t(&self, xs: &Tensor, _train: bool) -> Tensor {
        let mut t = xs.apply(&self.input_layer).relu();
        for layer in &self.layers {
            t = t.apply(layer).relu();
        }
        t.apply(&self.final_layer)
    }
}

/// `r + gamma * max_a Q_target(s', a)`, with the bootstrap masked out for terminal `s'`.
fn td_targets(
    next_state_values: Tensor,
    non_terminal: &Tensor,
    rewards: &Tensor,
    gamma: f64,
) -> Tensor {
    next_state_values * non_terminal * gamma + rewards
}

struct TransitionEvent {
    observation: Tensor,
    next_observation: Option<Tensor>,
    reward: f64,
    action: i64,
}

pub struct DQNAgent {
    pub policy_network: DQNNetwork,
    target_network: DQNNetwork,
    policy_vs: nn::VarStore,
    target_vs: nn::VarStore,
    optimizer: nn::Optimizer,
    config: DqnConfig,
    steps: i64,
    target_stale: bool,
    input_dims: i64,
    output_dims: i64,
    device: Device,
    memory: VecDeque<TransitionEvent>,
    rng: StdRng,
}

impl DQNAgent {
    pub fn new(input_dims: i64, output_dims: i64, config: DqnConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        let device = Device::cuda_if_available();
        info!(?device, "detected device");
        tch::manual_seed(seed as i64);
        let policy_vs = nn::VarStore::new(device);
        let mut target_vs = nn::VarStore::new(device);
        let policy_network = DQNNetwork::new(
            &policy_vs.root(),
            input_dims,
            output_dims,
            config.hidden_size,
            config.hidden_layers,
        );
        let target_network = DQNNetwork::new(
            &target_vs.root(),
            input_dims,
            output_dims,
            config.hidden_size,
            config.hidden_layers,
        );
        target_vs.copy(&policy_vs)?;
        let optimizer = nn::RmsProp::default().build(&policy_vs, config.learning_rate)?;
        Ok(Self {
            policy_network,
            target_network,
            policy_vs,
            target_vs,
            optimizer,
            memory: VecDeque::with_capacity(config.memory_capacity),
            config,
            steps: 0,
            target_stale: false,
            input_dims,
            output_dims,
            device,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    fn remember(&mut self, transition: TransitionEvent) {
        if self.memory.len() >= self.config.memory_capacity {
            self.memory.pop_front();
        }
        self.memory.push_back(transition);
    }

    fn optimize(&mut self) -> f64 {
        let batch_size = self.config.batch_size;
        let observations = Tensor::zeros(
            &[batch_size as i64, self.input_dims],
            (Kind::Float, self.device),
        );
        let next_observations = Tensor::zeros(
            &[batch_size as i64, self.input_dims],
            (Kind::Float, self.device),
        );
        let mut actions: Vec<i64> = vec![0; batch_size];
        let mut rewards: Vec<f32> = vec![0.0; batch_size];
        let mut non_terminal: Vec<f32> = vec![0.0; batch_size];
        for i in 0..batch_size {
            let index = self.rng.gen_range(0..self.memory.len());
            let transition = &self.memory[index];
            observations
                .narrow(0, i as i64, 1)
                .copy_(&transition.observation.unsqueeze(0));
            if let Some(next_obs) = &transition.next_observation {
                next_observations
                    .narrow(0, i as i64, 1)
                    .copy_(&next_obs.unsqueeze(0));
                non_terminal[i] = 1.0;
            }
            actions[i] = transition.action;
            rewards[i] = transition.reward as f32;
        }
        let actions_tensor = Tensor::of_slice(&actions).to_device(self.device);
        let rewards_tensor = Tensor::of_slice(&rewards).to_device(self.device);
        let non_terminal_tensor = Tensor::of_slice(&non_terminal).to_device(self.device);
        let next_state_values = tch::no_grad(|| {
            self.target_network
                .forward_t(&next_observations, false)
                .max_dim(1, false)
                .0
        });
        let predicted_values = self
            .policy_network
            .forward_t(&observations, /* train = */ true)
            .gather(1, &actions_tensor.unsqueeze(-1), false)
            .view([-1]);
        let expected_state_action_values = td_targets(
            next_state_values,
            &non_terminal_tensor,
            &rewards_tensor,
            self.config.gamma,
        );
        let diff = &predicted_values - &expected_state_action_values;
        let loss = (&diff * &diff).mean(Kind::Float);
        self.optimizer.backward_step(&loss);
        loss.double_value(&[])
    }
}

impl Agent for DQNAgent {
    fn forward(&self, obs: &Tensor) -> Tensor {
        tch::no_grad(|| {
            self.policy_network
                .forward_t(&obs.to_device(self.device).unsqueeze(0), false)
                .squeeze()
        })
    }

    fn predict(&self, obs: &Tensor) -> i64 {
        argmax(&self.forward(obs))
    }

    fn select_action(&mut self, obs: &Tensor) -> i64 {
        if need_eps_greedy_exploration(
            &mut self.rng,
            self.steps,
            self.config.exploration_decay_steps,
        ) {
            self.rng.gen_range(0..self.output_dims)
        } else {
            self.predict(obs)
        }
    }

    fn consume_event(
        &mut self,
        obs: &Tensor,
        next_obs: Option<&Tensor>,
        reward: f64,
        action: i64,
        _is_done: bool,
    ) -> Option<f64> {
        self.steps += 1;
        self.remember(TransitionEvent {
            observation: obs.to_device(self.device),
            next_observation: next_obs.map(|t| t.to_device(self.device)),
            reward,
            action,
        });
        if self.memory.len() < self.config.batch_size {
            return None;
        }
        let loss = self.optimize();
        if self.steps % self.config.target_update_freq == 0 {
            self.target_stale = true;
        }
        // a failed sync is retried on the next step and that round reports no loss
        if self.target_stale {
            if let Err(e) = self.target_vs.copy(&self.policy_vs) {
                warn!(steps = self.steps, error = %e, "target network sync failed");
                return None;
            }
            self.target_stale = false;
            debug!(steps = self.steps, "target network synced");
        }
        Some(loss)
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.policy_vs.save(path)?;
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        load_var_store(&mut self.policy_vs, path)?;
        self.target_vs.copy(&self.policy_vs)?;
        Ok(())
    }
}
