pub mod agent;
pub mod dqn;
pub mod error;
pub mod policy_gradient;
pub mod ppo;
pub mod rollout;

pub use agent::*;
pub use dqn::*;
pub use error::{Error, Result};
pub use policy_gradient::*;
pub use ppo::*;
pub use rollout::*;
