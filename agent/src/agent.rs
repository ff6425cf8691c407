use std::f64::consts;
use std::path::Path;

use rand::Rng;
use tch::{nn, Kind, Tensor};

use crate::error::{Error, Result};

pub const EXPLORATION_START_PROB: f64 = 0.9;
pub const EXPLORATION_END_PROB: f64 = 0.05;

pub trait Agent {
    /// Action to take while training, exploration included.
    fn select_action(&mut self, obs: &Tensor) -> i64;
    /// Greedy action of the current policy.
    fn predict(&self, obs: &Tensor) -> i64;
    /// Feeds one transition. `is_done` marks the last step of an episode,
    /// whether it terminated or was truncated by a step limit. `next_obs` is
    /// `None` only on termination, so `is_done` with `Some(next_obs)` means
    /// truncation and the episode's future can still be bootstrapped.
    /// Returns the loss when an optimization round ran.
    fn consume_event(
        &mut self,
        obs: &Tensor,
        next_obs: Option<&Tensor>,
        reward: f64,
        action: i64,
        is_done: bool,
    ) -> Option<f64>;
    fn forward(&self, obs: &Tensor) -> Tensor;
    /// Number of transitions consumed per optimization round.
    fn rollout_len(&self) -> usize {
        1
    }
    fn save(&self, path: &Path) -> Result<()>;
    fn load(&mut self, path: &Path) -> Result<()>;
}

pub fn need_eps_greedy_exploration<R: Rng>(
    rng: &mut R,
    steps: i64,
    exploration_prob_decay_steps: i64,
) -> bool {
    let explore_prob = EXPLORATION_END_PROB
        + (EXPLORATION_START_PROB - EXPLORATION_END_PROB)
            * (consts::E).powf(-1.0f64 * steps as f64 / exploration_prob_decay_steps as f64);
    rng.gen_range(0.0..1.0) <= explore_prob
}

/// Samples an action index from unnormalized logits of a single observation.
pub fn sample_from_logits<R: Rng>(rng: &mut R, logits: &Tensor) -> i64 {
    let probs = logits.softmax(-1, Kind::Float);
    let n = probs.size()[0];
    let mut u: f64 = rng.gen_range(0.0..1.0);
    for action in 0..n {
        u -= probs.double_value(&[action]);
        if u < 0.0 {
            return action;
        }
    }
    n - 1
}

pub fn argmax(t: &Tensor) -> i64 {
    t.max_dim(0, false).1.int64_value(&[])
}

/// Discounted return of every step, restarting after each episode end.
pub fn discounted_returns(rewards: &[f64], dones: &[bool], gamma: f64) -> Vec<f64> {
    let mut cumreward: f64 = 0.0;
    let mut values: Vec<f64> = vec![0.0; rewards.len()];
    for i in (0..rewards.len()).rev() {
        if dones[i] {
            cumreward = 0.0;
        }
        cumreward = rewards[i] + cumreward * gamma;
        values[i] = cumreward;
    }
    values
}

/// Generalized advantage estimation over a rollout.
///
/// `dones[t]` marks that step `t` ended its episode, so `values[t + 1]`
/// belongs to the next episode and is not bootstrapped from.
/// Returns `(advantages, returns)`.
pub fn gae(
    rewards: &[f64],
    values: &[f64],
    dones: &[bool],
    last_value: f64,
    gamma: f64,
    lambda: f64,
) -> (Vec<f64>, Vec<f64>) {
    let len = rewards.len();
    let mut advantages = vec![0.0; len];
    let mut last_gae = 0.0;
    for t in (0..len).rev() {
        let next_value = if t + 1 < len { values[t + 1] } else { last_value };
        let next_non_terminal = if dones[t] { 0.0 } else { 1.0 };
        let delta = rewards[t] + gamma * next_value * next_non_terminal - values[t];
        last_gae = delta + gamma * lambda * next_non_terminal * last_gae;
        advantages[t] = last_gae;
    }
    let returns = advantages.iter().zip(values).map(|(a, v)| a + v).collect();
    (advantages, returns)
}

/// Zero mean, unit variance; slices shorter than two are left alone.
pub fn normalize(xs: &mut [f64]) {
    if xs.len() < 2 {
        return;
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt() + 1e-8;
    for x in xs.iter_mut() {
        *x = (*x - mean) / std;
    }
}

pub fn load_var_store(vs: &mut nn::VarStore, path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::MissingModel(path.display().to_string()));
    }
    vs.load(path)?;
    Ok(())
}

/// Rescales the gradients of `vs` so that their global L2 norm is at most
/// `max_norm`. Returns the norm before clipping.
pub fn clip_grad_norm(vs: &nn::VarStore, max_norm: f64) -> f64 {
    tch::no_grad(|| {
        let grads: Vec<Tensor> = vs
            .trainable_variables()
            .iter()
            .map(|v| v.grad())
            .filter(|g| g.defined())
            .collect();
        let total = grads
            .iter()
            .map(|g| (g * g).sum(Kind::Double).double_value(&[]))
            .sum::<f64>()
            .sqrt();
        if total > max_norm {
            let scale = max_norm / (total + 1e-6);
            for mut g in grads {
                let scaled = &g * scale;
                g.copy_(&scaled);
            }
        }
        total
    })
}
