use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::checkpoint::{self, Checkpoint};
use crate::runner::{self, EvaluateOptions, TrainReport};
use crate::settings::Settings;

fn env_dims(env: &dyn gym::Env) -> (i64, i64) {
    (env.observation_space().shape()[0], env.action_space().n)
}

/// Checks the environment, trains a new or restored model and saves it.
pub fn train(settings: &Settings) -> Result<TrainReport> {
    let mut env = gym::make(&settings.env.id)?;
    gym::check_env(env.as_mut()).context("environment failed its checks")?;
    let seed = settings.seed();
    let (input_dims, output_dims) = env_dims(env.as_ref());
    let base = &settings.train.model_path;

    let (mut checkpoint, mut agent) = if checkpoint::exists(base) && !settings.train.fresh {
        let (checkpoint, agent) = Checkpoint::load(base, seed)?;
        if checkpoint.algorithm.method() != settings.train.method {
            warn!(
                saved = %checkpoint.algorithm.method(),
                configured = %settings.train.method,
                "continuing with the method of the saved model"
            );
        }
        if checkpoint.env_id != settings.env.id {
            warn!(saved = %checkpoint.env_id, "model was trained on another environment");
        }
        if (checkpoint.input_dims, checkpoint.output_dims) != (input_dims, output_dims) {
            bail!(
                "model {} expects {} inputs and {} actions, {} has {} and {}",
                base.display(),
                checkpoint.input_dims,
                checkpoint.output_dims,
                settings.env.id,
                input_dims,
                output_dims
            );
        }
        info!(
            path = %base.display(),
            timesteps = checkpoint.timesteps,
            seed,
            "Loaded existing model"
        );
        (checkpoint, agent)
    } else {
        let algorithm = settings.algorithm();
        let agent = algorithm.build(input_dims, output_dims, seed)?;
        info!(method = %algorithm.method(), seed, "Training new model");
        let checkpoint = Checkpoint {
            algorithm,
            env_id: settings.env.id.clone(),
            input_dims,
            output_dims,
            timesteps: 0,
        };
        (checkpoint, agent)
    };

    let report = runner::train(
        env.as_mut(),
        agent.as_mut(),
        settings.train.total_timesteps,
        settings.train.report_freq,
        Some(seed),
    )?;
    checkpoint.env_id = settings.env.id.clone();
    checkpoint.timesteps += report.timesteps as u64;
    checkpoint.save(base, agent.as_ref())?;
    info!(path = %base.display(), timesteps = checkpoint.timesteps, "model saved");
    Ok(report)
}

/// Loads the trained model and plays it.
pub fn evaluate(settings: &Settings, env_override: bool) -> Result<Vec<runner::EpisodeRecord>> {
    let base = &settings.train.model_path;
    if !checkpoint::exists(base) {
        bail!(
            "no trained model at {}, train the model first",
            base.display()
        );
    }
    let seed = settings.seed();
    let (checkpoint, agent) = Checkpoint::load(base, seed)?;
    info!(
        path = %base.display(),
        method = %checkpoint.algorithm.method(),
        seed,
        "Loaded existing model"
    );
    let env_id = if env_override {
        settings.env.id.clone()
    } else {
        checkpoint.env_id.clone()
    };
    let mut env = gym::make(&env_id)?;
    let options = EvaluateOptions {
        episodes: settings.evaluate.episodes,
        render_fps: settings.evaluate.render.then(|| settings.evaluate.fps),
        frames_dir: settings.evaluate.frames_dir.clone(),
        seed: settings.env.seed,
    };
    runner::evaluate(env.as_mut(), agent.as_ref(), &options)
}

pub fn check(settings: &Settings) -> Result<()> {
    let mut env = gym::make(&settings.env.id)?;
    gym::check_env(env.as_mut())?;
    info!(env = %settings.env.id, "environment check passed");
    Ok(())
}

pub fn list_envs() -> Vec<&'static str> {
    gym::registered_ids()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;

    fn quick_settings(dir: &std::path::Path) -> Settings {
        let mut settings = Settings::default();
        settings.env.seed = Some(5);
        settings.train.model_path = dir.join("ppo_cartpole");
        settings.train.total_timesteps = 64;
        settings.ppo.n_steps = 32;
        settings.ppo.batch_size = 16;
        settings.ppo.n_epochs = 2;
        settings.evaluate.render = false;
        settings
    }

    #[test]
    fn evaluate_without_model_fails() {
        let dir = tempfile::tempdir().unwrap();
        let settings = quick_settings(dir.path());
        let err = evaluate(&settings, false).unwrap_err();
        assert!(err.to_string().contains("train the model first"));
    }

    #[test]
    fn second_training_run_continues_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let settings = quick_settings(dir.path());
        let first = train(&settings).unwrap();
        assert_eq!(first.timesteps, 64);
        let second = train(&settings).unwrap();
        assert_eq!(second.timesteps, 64);
        let saved = Checkpoint::read(&settings.train.model_path).unwrap();
        assert_eq!(saved.timesteps, 128);
        assert_eq!(saved.algorithm.method(), Method::Ppo);

        let records = evaluate(&settings, false).unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].is_empty());
    }

    #[test]
    fn fresh_run_replaces_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = quick_settings(dir.path());
        train(&settings).unwrap();
        settings.train.fresh = true;
        settings.train.method = Method::PolicyGradient;
        train(&settings).unwrap();
        let saved = Checkpoint::read(&settings.train.model_path).unwrap();
        assert_eq!(saved.timesteps, 64);
        assert_eq!(saved.algorithm.method(), Method::PolicyGradient);
    }

    #[test]
    fn checkpoint_for_other_dimensions_is_not_continued() {
        let dir = tempfile::tempdir().unwrap();
        let settings = quick_settings(dir.path());
        let algorithm = settings.algorithm();
        let agent = algorithm.build(3, 2, 0).unwrap();
        let checkpoint = Checkpoint {
            algorithm,
            env_id: settings.env.id.clone(),
            input_dims: 3,
            output_dims: 2,
            timesteps: 10,
        };
        checkpoint.save(&settings.train.model_path, agent.as_ref()).unwrap();

        let err = train(&settings).unwrap_err();
        assert!(err.to_string().contains("expects 3 inputs"), "{}", err);
        let saved = Checkpoint::read(&settings.train.model_path).unwrap();
        assert_eq!(saved.timesteps, 10);
    }

    #[test]
    fn unknown_env_is_reported() {
        let mut settings = Settings::default();
        settings.env.id = "Pendulum-v1".to_string();
        assert!(check(&settings).is_err());
    }
}
