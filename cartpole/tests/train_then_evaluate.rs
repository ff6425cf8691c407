use std::sync::Mutex;

use agent::PpoConfig;
use cartpole::method::AlgorithmConfig;
use cartpole::runner::{self, EvaluateOptions};

const SEED: u64 = 17;

// libtorch's generator is process wide, seeded runs must not interleave
static TORCH: Mutex<()> = Mutex::new(());

fn small_ppo() -> AlgorithmConfig {
    AlgorithmConfig::Ppo(PpoConfig {
        n_steps: 64,
        batch_size: 32,
        n_epochs: 2,
        ..Default::default()
    })
}

fn run_once(id: &str) -> Vec<runner::EpisodeRecord> {
    let _guard = TORCH.lock().unwrap_or_else(|e| e.into_inner());
    let mut env = gym::make(id).unwrap();
    gym::check_env(env.as_mut()).unwrap();
    let input_dims = env.observation_space().shape()[0];
    let output_dims = env.action_space().n;
    let mut agent = small_ppo().build(input_dims, output_dims, SEED).unwrap();

    let report = runner::train(env.as_mut(), agent.as_mut(), 200, 5, Some(SEED)).unwrap();
    assert_eq!(report.timesteps, 256);
    assert_eq!(report.losses.len(), 4);
    assert!(report.losses.iter().all(|l| l.is_finite()));

    let options = EvaluateOptions {
        episodes: 3,
        seed: Some(SEED),
        ..Default::default()
    };
    runner::evaluate(env.as_mut(), agent.as_ref(), &options).unwrap()
}

#[test]
fn seeded_training_then_evaluation_yields_bounded_episodes() {
    for id in gym::registered_ids() {
        let records = run_once(id);
        assert_eq!(records.len(), 3);
        for record in &records {
            assert!(!record.is_empty());
            assert!(record.len() <= 500, "{} ran {} steps", id, record.len());
            assert!(record.terminated || record.truncated);
            for (i, t) in record.transitions.iter().enumerate() {
                assert_eq!(t.observation.len(), 4);
                assert!(t.observation.iter().all(|v| v.is_finite()));
                assert!(t.action == 0 || t.action == 1);
                assert!(t.reward == 0.0 || t.reward == 1.0);
                // only the step that detects the game over pays nothing
                let last = i + 1 == record.len();
                assert_eq!(t.reward == 0.0, last && record.terminated);
            }
        }
    }
}

#[test]
fn fixed_seed_reproduces_the_evaluation() {
    let first = run_once("CartPole-v1");
    let second = run_once("CartPole-v1");
    assert_eq!(first, second);
}

#[test]
fn frames_are_written_when_requested() {
    let _guard = TORCH.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let mut env = gym::make("CartPole-v1").unwrap();
    let agent = small_ppo().build(4, 2, SEED).unwrap();
    let options = EvaluateOptions {
        episodes: 1,
        frames_dir: Some(dir.path().join("frames")),
        seed: Some(SEED),
        ..Default::default()
    };
    let records = runner::evaluate(env.as_mut(), agent.as_ref(), &options).unwrap();
    let frames = std::fs::read_dir(dir.path().join("frames")).unwrap().count();
    assert_eq!(frames, records[0].len() + 1);
}
