//! Native environments with a gym-like reset/step/render interface.
use tch::Tensor;

pub mod cartpole;
pub mod checker;
pub mod error;
pub mod render;
pub mod spaces;

pub use cartpole::{CartPoleConfig, CartPoleEnv};
pub use checker::check_env;
pub use error::{Error, Result};
pub use render::{Frame, RenderMode};
pub use spaces::{BoxSpace, Discrete};

/// The return value for a step.
#[derive(Debug)]
pub struct Step<A> {
    pub obs: Tensor,
    pub action: A,
    pub reward: f64,
    /// The environment reached a terminal state.
    pub is_done: bool,
    /// The episode was cut by the step limit.
    pub is_truncated: bool,
}

impl<A> Step<A> {
    /// Either terminated or truncated: the environment needs a reset.
    pub fn is_over(&self) -> bool {
        self.is_done || self.is_truncated
    }
}

pub trait Env {
    fn id(&self) -> &str;

    /// Resets the environment, returning the observation tensor. A seed
    /// reseeds the environment random stream.
    fn reset(&mut self, seed: Option<u64>) -> Result<Tensor>;

    /// Applies an environment step using the specified action.
    fn step(&mut self, action: i64) -> Result<Step<i64>>;

    /// Renders the current state. Only `RenderMode::RgbArray` returns a frame.
    fn render(&mut self, mode: RenderMode) -> Result<Option<Tensor>>;

    fn close(&mut self);

    fn action_space(&self) -> &Discrete;

    fn observation_space(&self) -> &BoxSpace;
}

const REGISTRY: &[(&str, fn() -> CartPoleConfig)] = &[
    ("CartPoleWide-v0", CartPoleConfig::wide),
    ("CartPole-v1", CartPoleConfig::classic),
];

/// Ids accepted by [`make`].
pub fn registered_ids() -> Vec<&'static str> {
    REGISTRY.iter().map(|(id, _)| *id).collect()
}

/// Creates a new session of the specified environment.
pub fn make(id: &str) -> Result<Box<dyn Env>> {
    let (id, config) = REGISTRY
        .iter()
        .find(|(name, _)| *name == id)
        .ok_or_else(|| Error::UnknownEnv(id.to_string()))?;
    tracing::debug!(env = id, "creating environment");
    Ok(Box::new(CartPoleEnv::new(id, config())))
}

/// Copies a 1-d observation tensor into a plain vector.
pub fn observation_to_vec(obs: &Tensor) -> Vec<f32> {
    let len = obs.size().first().copied().unwrap_or(0);
    (0..len).map(|i| obs.double_value(&[i]) as f32).collect()
}
