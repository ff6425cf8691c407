//! Sanity checks run against an environment before training on it.
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::{observation_to_vec, Env};

const CHECK_SEED: u64 = 0;

fn ensure(cond: bool, msg: impl FnOnce() -> String) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(Error::Check(msg()))
    }
}

/// Verifies that `env` honours the reset/step contract agents rely on.
///
/// The environment is left in a freshly reset state.
pub fn check_env(env: &mut dyn Env) -> Result<()> {
    let obs_space = env.observation_space().clone();
    let action_space = *env.action_space();
    ensure(action_space.n > 0, || "action space is empty".to_string())?;

    let obs = env.reset(Some(CHECK_SEED))?;
    ensure(obs.size() == obs_space.shape(), || {
        format!(
            "reset observation has shape {:?}, expected {:?}",
            obs.size(),
            obs_space.shape()
        )
    })?;
    ensure(obs_space.contains(&obs), || {
        format!(
            "reset observation {:?} is outside the observation space",
            observation_to_vec(&obs)
        )
    })?;
    let again = env.reset(Some(CHECK_SEED))?;
    ensure(observation_to_vec(&obs) == observation_to_vec(&again), || {
        "reset is not deterministic for a fixed seed".to_string()
    })?;

    for action in 0..action_space.n {
        env.reset(Some(CHECK_SEED))?;
        let step = env.step(action)?;
        ensure(step.obs.size() == obs_space.shape(), || {
            format!(
                "step observation has shape {:?}, expected {:?}",
                step.obs.size(),
                obs_space.shape()
            )
        })?;
        ensure(step.reward.is_finite(), || {
            format!("step returned a non finite reward {}", step.reward)
        })?;
        if !obs_space.contains(&step.obs) {
            warn!(action, "step observation left the observation space");
        }
    }

    env.reset(Some(CHECK_SEED))?;
    match env.step(action_space.n) {
        Err(Error::InvalidAction { .. }) => {}
        Err(e) => return Err(e),
        Ok(_) => {
            return Err(Error::Check(format!(
                "action {} outside the action space was accepted",
                action_space.n
            )))
        }
    }
    env.reset(None)?;
    debug!(env = env.id(), "environment check passed");
    Ok(())
}
