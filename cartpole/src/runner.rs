use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use agent::Agent;
use anyhow::{Context, Result};
use gym::{observation_to_vec, Env, RenderMode};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct TrainReport {
    /// Length of every finished episode.
    pub episodes: Vec<i64>,
    pub total_rewards: Vec<f64>,
    /// Loss of every optimization round.
    pub losses: Vec<f64>,
    pub timesteps: usize,
    pub elapsed: Duration,
}

fn mean<T: Copy + Into<f64>>(xs: &[T]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().map(|x| (*x).into()).sum::<f64>() / xs.len() as f64
}

/// Rounds `total` up to a whole number of `rollout_len` chunks.
pub fn round_to_rollouts(total: usize, rollout_len: usize) -> usize {
    let rollout_len = rollout_len.max(1);
    (total + rollout_len - 1) / rollout_len * rollout_len
}

/// Runs the agent against the environment for `total_timesteps` steps,
/// rounded up to whole rollouts.
pub fn train(
    env: &mut dyn Env,
    agent: &mut dyn Agent,
    total_timesteps: usize,
    report_freq: usize,
    seed: Option<u64>,
) -> Result<TrainReport> {
    let total = round_to_rollouts(total_timesteps, agent.rollout_len());
    if total != total_timesteps {
        info!(
            requested = total_timesteps,
            total, "training length rounded up to whole rollouts"
        );
    }
    let report_freq = report_freq.max(1);
    let mut report = TrainReport::default();
    let start = Instant::now();
    let mut obs = env.reset(seed)?;
    let mut episode_len: i64 = 0;
    let mut episode_reward = 0.0;
    for _ in 0..total {
        let action = agent.select_action(&obs);
        let step = env.step(action)?;
        let next_obs = if step.is_done { None } else { Some(&step.obs) };
        if let Some(loss) =
            agent.consume_event(&obs, next_obs, step.reward, action, step.is_over())
        {
            debug!(loss, "optimization round");
            report.losses.push(loss);
        }
        report.timesteps += 1;
        episode_len += 1;
        episode_reward += step.reward;
        if step.is_over() {
            report.episodes.push(episode_len);
            report.total_rewards.push(episode_reward);
            episode_len = 0;
            episode_reward = 0.0;
            obs = env.reset(None)?;
            if report.episodes.len() % report_freq == 0 {
                log_progress(&report, report_freq);
            }
        } else {
            obs = step.obs;
        }
    }
    report.elapsed = start.elapsed();
    let secs = report.elapsed.as_secs_f64().max(f64::EPSILON);
    info!(
        elapsed_secs = report.elapsed.as_secs_f64(),
        episodes = report.episodes.len(),
        episodes_per_sec = report.episodes.len() as f64 / secs,
        steps_per_sec = report.timesteps as f64 / secs,
        "training finished"
    );
    Ok(report)
}

fn log_progress(report: &TrainReport, window: usize) {
    let window = window.min(report.episodes.len());
    let episodes = &report.episodes[report.episodes.len() - window..];
    let rewards = &report.total_rewards[report.total_rewards.len() - window..];
    let losses = &report.losses[report.losses.len() - window.min(report.losses.len())..];
    let avg_len = episodes.iter().sum::<i64>() as f64 / window.max(1) as f64;
    let max_len = episodes.iter().copied().max().unwrap_or(0);
    info!(
        episode = report.episodes.len(),
        timesteps = report.timesteps,
        avg_len,
        max_len,
        avg_reward = mean(rewards),
        avg_loss = mean(losses),
        "last {} episodes",
        window
    );
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub observation: Vec<f32>,
    pub action: i64,
    pub reward: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeRecord {
    pub transitions: Vec<Transition>,
    pub terminated: bool,
    pub truncated: bool,
}

impl EpisodeRecord {
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn total_reward(&self) -> f64 {
        self.transitions.iter().map(|t| t.reward).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EvaluateOptions {
    pub episodes: usize,
    /// Draw every step in the terminal at this frame rate.
    pub render_fps: Option<u32>,
    /// Save every frame as a PNG file in this directory.
    pub frames_dir: Option<PathBuf>,
    pub seed: Option<u64>,
}

/// Plays `options.episodes` episodes with the greedy policy.
pub fn evaluate(
    env: &mut dyn Env,
    agent: &dyn Agent,
    options: &EvaluateOptions,
) -> Result<Vec<EpisodeRecord>> {
    if let Some(dir) = &options.frames_dir {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let mut records = Vec::with_capacity(options.episodes);
    for episode in 0..options.episodes {
        let seed = if episode == 0 { options.seed } else { None };
        let mut obs = env.reset(seed)?;
        let mut record = EpisodeRecord::default();
        loop {
            show(env, options, episode, record.len())?;
            let action = agent.predict(&obs);
            let step = env.step(action)?;
            record.transitions.push(Transition {
                observation: observation_to_vec(&obs),
                action,
                reward: step.reward,
            });
            if step.is_over() {
                record.terminated = step.is_done;
                record.truncated = step.is_truncated;
                show(env, options, episode, record.len())?;
                break;
            }
            obs = step.obs;
        }
        info!(
            episode,
            len = record.len(),
            total_reward = record.total_reward(),
            terminated = record.terminated,
            "evaluation episode finished"
        );
        records.push(record);
    }
    env.close();
    Ok(records)
}

fn show(env: &mut dyn Env, options: &EvaluateOptions, episode: usize, step: usize) -> Result<()> {
    if let Some(fps) = options.render_fps {
        env.render(RenderMode::Human { fps })?;
    }
    if let Some(dir) = &options.frames_dir {
        if let Some(frame) = env.render(RenderMode::RgbArray)? {
            let path = dir.join(format!("episode{:03}_step{:05}.png", episode, step));
            tch::vision::image::save(&frame, &path)
                .with_context(|| format!("saving frame {}", path.display()))?;
        }
    }
    Ok(())
}
