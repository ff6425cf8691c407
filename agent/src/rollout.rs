use rand::seq::SliceRandom;
use rand::Rng;
use tch::Tensor;

use crate::agent::gae;

/// On-policy storage for the transitions gathered between two PPO updates.
pub struct RolloutBuffer {
    capacity: usize,
    pub observations: Vec<Tensor>,
    pub actions: Vec<i64>,
    pub rewards: Vec<f64>,
    pub dones: Vec<bool>,
    pub values: Vec<f64>,
    pub log_probs: Vec<f64>,
}

impl RolloutBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            observations: Vec::with_capacity(capacity),
            actions: Vec::with_capacity(capacity),
            rewards: Vec::with_capacity(capacity),
            dones: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            log_probs: Vec::with_capacity(capacity),
        }
    }

    pub fn push(
        &mut self,
        obs: &Tensor,
        action: i64,
        reward: f64,
        done: bool,
        value: f64,
        log_prob: f64,
    ) {
        self.observations.push(obs.copy());
        self.actions.push(action);
        self.rewards.push(reward);
        self.dones.push(done);
        self.values.push(value);
        self.log_probs.push(log_prob);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn clear(&mut self) {
        self.observations.clear();
        self.actions.clear();
        self.rewards.clear();
        self.dones.clear();
        self.values.clear();
        self.log_probs.clear();
    }

    /// `last_value` is the value of the observation following the last stored step.
    pub fn advantages_and_returns(
        &self,
        last_value: f64,
        gamma: f64,
        lambda: f64,
    ) -> (Vec<f64>, Vec<f64>) {
        gae(
            &self.rewards,
            &self.values,
            &self.dones,
            last_value,
            gamma,
            lambda,
        )
    }
}

/// Shuffled indices `0..len` split into chunks of at most `batch_size`.
pub fn minibatches<R: Rng>(rng: &mut R, len: usize, batch_size: usize) -> Vec<Vec<i64>> {
    let mut indices: Vec<i64> = (0..len as i64).collect();
    indices.shuffle(rng);
    indices
        .chunks(batch_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn buffer_fills_and_clears() {
        let mut buffer = RolloutBuffer::new(2);
        let obs = Tensor::of_slice(&[0.0f32, 0.0, 0.0, 0.0]);
        buffer.push(&obs, 1, 1.0, false, 0.5, -0.7);
        assert!(!buffer.is_full());
        buffer.push(&obs, 0, 0.0, true, 0.4, -0.6);
        assert!(buffer.is_full());
        let (adv, returns) = buffer.advantages_and_returns(9.0, 1.0, 1.0);
        assert_eq!(returns, vec![1.0, 0.0]);
        assert!((adv[0] - 0.5).abs() < 1e-12);
        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn minibatches_cover_every_index_once() {
        let mut rng = StdRng::seed_from_u64(11);
        let batches = minibatches(&mut rng, 10, 4);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].len(), 2);
        let mut all: Vec<i64> = batches.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<i64>>());
    }
}
