use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tch::{nn, nn::OptimizerConfig, Device, Kind, Tensor};
use tracing::{debug, info};

use crate::agent::*;
use crate::error::{Error, Result};
use crate::rollout::{minibatches, RolloutBuffer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PpoConfig {
    pub learning_rate: f64,
    /// Transitions collected between two updates.
    pub n_steps: usize,
    pub batch_size: usize,
    pub n_epochs: usize,
    pub gamma: f64,
    pub gae_lambda: f64,
    pub clip_range: f64,
    pub ent_coef: f64,
    pub vf_coef: f64,
    pub max_grad_norm: f64,
    pub normalize_advantage: bool,
    pub hidden_size: i64,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            learning_rate: 3e-4,
            n_steps: 2048,
            batch_size: 64,
            n_epochs: 10,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_range: 0.2,
            ent_coef: 0.0,
            vf_coef: 0.5,
            max_grad_norm: 0.5,
            normalize_advantage: true,
            hidden_size: 64,
        }
    }
}

impl PpoConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("n_steps", self.n_steps),
            ("batch_size", self.batch_size),
            ("n_epochs", self.n_epochs),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(Error::InvalidConfig(format!("ppo {} must be positive", name)));
        }
        if self.hidden_size <= 0 {
            return Err(Error::InvalidConfig(format!(
                "ppo hidden_size must be positive, got {}",
                self.hidden_size
            )));
        }
        Ok(())
    }
}

fn mlp(vs: &nn::Path, input_dims: i64, hidden_size: i64) -> nn::Sequential {
    nn::seq()
        .add(nn::linear(vs / "l1", input_dims, hidden_size, Default::default()))
        .add_fn(|xs| xs.tanh())
        .add(nn::linear(vs / "l2", hidden_size, hidden_size, Default::default()))
        .add_fn(|xs| xs.tanh())
}

/// Separate policy and value towers over the same observation.
#[derive(Debug)]
pub struct ActorCritic {
    policy_net: nn::Sequential,
    action_net: nn::Linear,
    value_net: nn::Sequential,
    value_head: nn::Linear,
}

impl ActorCritic {
    fn new(vs: &nn::Path, input_dims: i64, output_dims: i64, hidden_size: i64) -> Self {
        Self {
            policy_net: mlp(&(vs / "pi"), input_dims, hidden_size),
            action_net: nn::linear(vs / "action", hidden_size, output_dims, Default::default()),
            value_net: mlp(&(vs / "vf"), input_dims, hidden_size),
            value_head: nn::linear(vs / "value", hidden_size, 1, Default::default()),
        }
    }

    /// Action logits, `[batch, actions]`.
    pub fn logits(&self, xs: &Tensor) -> Tensor {
        xs.apply(&self.policy_net).apply(&self.action_net)
    }

    /// State values, `[batch]`.
    pub fn value(&self, xs: &Tensor) -> Tensor {
        xs.apply(&self.value_net).apply(&self.value_head).view([-1])
    }
}

pub struct PpoAgent {
    pub network: ActorCritic,
    vs: nn::VarStore,
    optimizer: nn::Optimizer,
    config: PpoConfig,
    buffer: RolloutBuffer,
    rng: StdRng,
    steps: i64,
    updates: i64,
    device: Device,
}

impl PpoAgent {
    pub fn new(input_dims: i64, output_dims: i64, config: PpoConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        let device = Device::cuda_if_available();
        info!(?device, "detected device");
        tch::manual_seed(seed as i64);
        let vs = nn::VarStore::new(device);
        let network = ActorCritic::new(&vs.root(), input_dims, output_dims, config.hidden_size);
        let optimizer = nn::Adam::default().build(&vs, config.learning_rate)?;
        Ok(Self {
            network,
            vs,
            optimizer,
            buffer: RolloutBuffer::new(config.n_steps),
            config,
            rng: StdRng::seed_from_u64(seed),
            steps: 0,
            updates: 0,
            device,
        })
    }

    fn evaluate_single(&self, obs: &Tensor) -> (Tensor, f64) {
        tch::no_grad(|| {
            let obs = obs.to_device(self.device).unsqueeze(0);
            let logits = self.network.logits(&obs).squeeze();
            let value = self.network.value(&obs).double_value(&[0]);
            (logits, value)
        })
    }

    fn value_of(&self, obs: &Tensor) -> f64 {
        self.evaluate_single(obs).1
    }

    fn train(&mut self, last_value: f64) -> f64 {
        let cfg = self.config.clone();
        let (advantages, returns) =
            self.buffer.advantages_and_returns(last_value, cfg.gamma, cfg.gae_lambda);
        let observations = Tensor::stack(&self.buffer.observations, 0).to_device(self.device);
        let actions = Tensor::of_slice(&self.buffer.actions).to_device(self.device);
        let old_log_probs = Tensor::of_slice(&self.buffer.log_probs)
            .to_kind(Kind::Float)
            .to_device(self.device);
        let returns = Tensor::of_slice(&returns)
            .to_kind(Kind::Float)
            .to_device(self.device);

        let mut losses = Vec::new();
        let mut clipped = 0.0f64;
        let mut seen = 0.0f64;
        for _epoch in 0..cfg.n_epochs {
            for batch in minibatches(&mut self.rng, self.buffer.len(), cfg.batch_size) {
                let mut batch_adv: Vec<f64> =
                    batch.iter().map(|&i| advantages[i as usize]).collect();
                if cfg.normalize_advantage {
                    normalize(&mut batch_adv);
                }
                let idx = Tensor::of_slice(&batch).to_device(self.device);
                let adv = Tensor::of_slice(&batch_adv)
                    .to_kind(Kind::Float)
                    .to_device(self.device);
                let obs_b = observations.index_select(0, &idx);
                let actions_b = actions.index_select(0, &idx);
                let old_log_probs_b = old_log_probs.index_select(0, &idx);
                let returns_b = returns.index_select(0, &idx);

                let log_probs_all = self.network.logits(&obs_b).log_softmax(-1, Kind::Float);
                let log_probs = log_probs_all
                    .gather(1, &actions_b.unsqueeze(-1), false)
                    .view([-1]);
                let entropy = -(log_probs_all.exp() * &log_probs_all).sum_dim_intlist(
                    &[-1],
                    false,
                    Kind::Float,
                );
                let values = self.network.value(&obs_b);

                let ratio = (&log_probs - &old_log_probs_b).exp();
                let surr1 = &ratio * &adv;
                let surr2 = ratio.clamp(1.0 - cfg.clip_range, 1.0 + cfg.clip_range) * &adv;
                let policy_loss = -surr1.min_other(&surr2).mean(Kind::Float);
                let diff = &returns_b - &values;
                let value_loss = (&diff * &diff).mean(Kind::Float);
                let entropy_loss = -entropy.mean(Kind::Float);
                let loss = &policy_loss + &entropy_loss * cfg.ent_coef + &value_loss * cfg.vf_coef;

                tch::no_grad(|| {
                    let out = (&ratio - 1.0).abs().gt(cfg.clip_range).to_kind(Kind::Float);
                    clipped += out.sum(Kind::Float).double_value(&[]);
                    seen += batch.len() as f64;
                });

                self.optimizer.zero_grad();
                loss.backward();
                clip_grad_norm(&self.vs, cfg.max_grad_norm);
                self.optimizer.step();
                losses.push(loss.double_value(&[]));
            }
        }
        self.updates += 1;
        let mean_loss = losses.iter().sum::<f64>() / losses.len().max(1) as f64;
        debug!(
            update = self.updates,
            timesteps = self.steps,
            loss = mean_loss,
            clip_fraction = clipped / seen.max(1.0),
            "ppo update"
        );
        mean_loss
    }
}

impl Agent for PpoAgent {
    fn select_action(&mut self, obs: &Tensor) -> i64 {
        let (logits, _) = self.evaluate_single(obs);
        sample_from_logits(&mut self.rng, &logits)
    }

    fn predict(&self, obs: &Tensor) -> i64 {
        argmax(&self.evaluate_single(obs).0)
    }

    fn forward(&self, obs: &Tensor) -> Tensor {
        self.evaluate_single(obs).0
    }

    fn consume_event(
        &mut self,
        obs: &Tensor,
        next_obs: Option<&Tensor>,
        reward: f64,
        action: i64,
        is_done: bool,
    ) -> Option<f64> {
        self.steps += 1;
        let (logits, value) = self.evaluate_single(obs);
        let log_prob = logits.log_softmax(-1, Kind::Float).double_value(&[action]);
        let mut reward = reward;
        // a truncated episode still has a future, bootstrap it
        if let (true, Some(next)) = (is_done, next_obs) {
            reward += self.config.gamma * self.value_of(next);
        }
        self.buffer.push(obs, action, reward, is_done, value, log_prob);
        if !self.buffer.is_full() {
            return None;
        }
        let last_value = match (is_done, next_obs) {
            (false, Some(next)) => self.value_of(next),
            _ => 0.0,
        };
        let loss = self.train(last_value);
        self.buffer.clear();
        Some(loss)
    }

    fn rollout_len(&self) -> usize {
        self.config.n_steps
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.vs.save(path)?;
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        load_var_store(&mut self.vs, path)
    }
}
