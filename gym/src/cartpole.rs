//! Cart-pole balancing: a pole hinged on a cart moving along a frictionless track.
use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tch::Tensor;

use crate::error::{Error, Result};
use crate::render::{Frame, RenderMode, Viewer, BLACK, RED, WHITE};
use crate::spaces::{BoxSpace, Discrete};
use crate::{Env, Step};

const SCREEN_WIDTH: usize = 600;
const SCREEN_HEIGHT: usize = 400;
const CART_Y: i64 = 300;
const CART_WIDTH: i64 = 50;
const CART_HEIGHT: i64 = 30;
const POLE_WIDTH: f64 = 6.0;

const VIEWER_COLS: usize = 100;
const VIEWER_ROWS: usize = 33;

#[derive(Debug, Clone, PartialEq)]
pub struct CartPoleConfig {
    pub gravity: f64,
    pub mass_cart: f64,
    pub mass_pole: f64,
    /// Distance from the hinge to the pole's centre of mass, half the pole length.
    pub half_length: f64,
    pub force_mag: f64,
    /// Seconds between state updates.
    pub tau: f64,
    pub x_threshold: f64,
    pub theta_threshold: f64,
    pub max_episode_steps: Option<u32>,
}

impl CartPoleConfig {
    /// Half a rotation of slack for the pole and a 10 unit long track.
    pub fn wide() -> Self {
        Self {
            gravity: 9.8,
            mass_cart: 1.0,
            mass_pole: 0.1,
            half_length: 0.5,
            force_mag: 10.0,
            tau: 0.02,
            x_threshold: 5.0,
            theta_threshold: PI,
            max_episode_steps: Some(500),
        }
    }

    /// The usual 12 degree, 2.4 unit benchmark limits.
    pub fn classic() -> Self {
        Self {
            x_threshold: 2.4,
            theta_threshold: 12.0 * 2.0 * PI / 360.0,
            ..Self::wide()
        }
    }

    fn total_mass(&self) -> f64 {
        self.mass_cart + self.mass_pole
    }

    fn pole_mass_length(&self) -> f64 {
        self.mass_pole * self.half_length
    }
}

impl Default for CartPoleConfig {
    fn default() -> Self {
        Self::wide()
    }
}

pub struct CartPoleEnv {
    id: String,
    config: CartPoleConfig,
    action_space: Discrete,
    observation_space: BoxSpace,
    /// x, x_dot, theta, theta_dot
    state: Option<[f64; 4]>,
    steps: u32,
    episode_over: bool,
    rng: StdRng,
    viewer: Option<Viewer>,
}

impl CartPoleEnv {
    pub fn new(id: &str, config: CartPoleConfig) -> Self {
        let high = vec![
            (config.x_threshold * 2.0) as f32,
            f32::MAX,
            (config.theta_threshold * 2.0) as f32,
            f32::MAX,
        ];
        Self {
            id: id.to_string(),
            config,
            action_space: Discrete::new(2),
            observation_space: BoxSpace::symmetric(high),
            state: None,
            steps: 0,
            episode_over: false,
            rng: StdRng::from_entropy(),
            viewer: None,
        }
    }

    pub fn state(&self) -> Option<[f64; 4]> {
        self.state
    }

    /// Overrides the physical state, the episode continues from there.
    pub fn set_state(&mut self, state: [f64; 4]) {
        self.state = Some(state);
        self.episode_over = false;
    }

    fn is_game_over(&self, state: &[f64; 4]) -> bool {
        let [x, _, theta, _] = *state;
        let c = &self.config;
        x < -c.x_threshold
            || x > c.x_threshold
            || theta < -c.theta_threshold
            || theta > c.theta_threshold
    }

    /// One explicit Euler step of the cart-pole equations of motion.
    fn integrate(&self, state: &[f64; 4], force: f64) -> [f64; 4] {
        let [x, x_dot, theta, theta_dot] = *state;
        let c = &self.config;
        let (sin_theta, cos_theta) = theta.sin_cos();
        let temp =
            (force + c.pole_mass_length() * theta_dot * theta_dot * sin_theta) / c.total_mass();
        let theta_acc = (c.gravity * sin_theta - cos_theta * temp)
            / (c.half_length * (4.0 / 3.0 - c.mass_pole * cos_theta * cos_theta / c.total_mass()));
        let x_acc = temp - c.pole_mass_length() * theta_acc * cos_theta / c.total_mass();
        [
            x + x_dot * c.tau,
            x_dot + x_acc * c.tau,
            theta + theta_dot * c.tau,
            theta_dot + theta_acc * c.tau,
        ]
    }

    fn observation(state: &[f64; 4]) -> Tensor {
        Tensor::of_slice(&state.map(|v| v as f32))
    }

    fn draw(&self, state: &[f64; 4]) -> Frame {
        let mut frame = Frame::new(SCREEN_WIDTH, SCREEN_HEIGHT);
        frame.fill(WHITE);
        let scale = SCREEN_WIDTH as f64 / (self.config.x_threshold * 2.0);
        // 0 is the centre of the screen, -x_threshold the left edge
        let cart_x = (state[0] * scale + SCREEN_WIDTH as f64 / 2.0) as i64;
        frame.fill_rect(cart_x - CART_WIDTH / 2, CART_Y, CART_WIDTH, CART_HEIGHT, BLACK);
        let pole_len = scale * 2.0 * self.config.half_length;
        let theta = state[2];
        let base = (cart_x as f64, CART_Y as f64);
        let end = (base.0 + pole_len * theta.sin(), base.1 - pole_len * theta.cos());
        frame.draw_line(base, end, POLE_WIDTH, RED);
        frame
    }
}

impl Env for CartPoleEnv {
    fn id(&self) -> &str {
        &self.id
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<Tensor> {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        let mut state = [0.0; 4];
        for v in state.iter_mut() {
            *v = self.rng.gen_range(-0.05..0.05);
        }
        self.state = Some(state);
        self.steps = 0;
        self.episode_over = false;
        Ok(Self::observation(&state))
    }

    fn step(&mut self, action: i64) -> Result<Step<i64>> {
        let state = self.state.ok_or(Error::NeedsReset)?;
        if self.episode_over {
            return Err(Error::EpisodeOver);
        }
        if !self.action_space.contains(action) {
            return Err(Error::InvalidAction {
                action,
                n: self.action_space.n,
            });
        }
        let force = if action == 1 {
            self.config.force_mag
        } else {
            -self.config.force_mag
        };
        // the game over test looks at the state the action was taken in
        let game_over = self.is_game_over(&state);
        let next = self.integrate(&state, force);
        self.state = Some(next);
        self.steps += 1;
        let is_truncated = !game_over
            && self
                .config
                .max_episode_steps
                .map_or(false, |limit| self.steps >= limit);
        self.episode_over = game_over || is_truncated;
        Ok(Step {
            obs: Self::observation(&next),
            action,
            reward: if game_over { 0.0 } else { 1.0 },
            is_done: game_over,
            is_truncated,
        })
    }

    fn render(&mut self, mode: RenderMode) -> Result<Option<Tensor>> {
        let state = self.state.ok_or(Error::NeedsReset)?;
        let frame = self.draw(&state);
        match mode {
            RenderMode::RgbArray => Ok(Some(frame.to_tensor())),
            RenderMode::Human { fps } => {
                let caption = format!(
                    "{} | step {} | x {:+.3} | theta {:+.3}",
                    self.id, self.steps, state[0], state[2]
                );
                self.viewer
                    .get_or_insert_with(|| Viewer::new(VIEWER_COLS, VIEWER_ROWS))
                    .show(&frame, &caption, fps)?;
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        self.viewer = None;
    }

    fn action_space(&self) -> &Discrete {
        &self.action_space
    }

    fn observation_space(&self) -> &BoxSpace {
        &self.observation_space
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> CartPoleEnv {
        CartPoleEnv::new("CartPoleWide-v0", CartPoleConfig::wide())
    }

    #[test]
    fn reset_draws_small_state() {
        let mut env = env();
        let obs = env.reset(Some(7)).unwrap();
        assert_eq!(obs.size(), vec![4]);
        for v in env.state().unwrap() {
            assert!(v.abs() <= 0.05);
        }
    }

    #[test]
    fn reset_with_same_seed_is_deterministic() {
        let mut env = env();
        env.reset(Some(42)).unwrap();
        let first = env.state().unwrap();
        env.reset(Some(42)).unwrap();
        assert_eq!(env.state().unwrap(), first);
    }

    #[test]
    fn step_before_reset_fails() {
        let mut env = env();
        assert!(matches!(env.step(0), Err(Error::NeedsReset)));
    }

    #[test]
    fn invalid_action_is_rejected() {
        let mut env = env();
        env.reset(Some(0)).unwrap();
        assert!(matches!(
            env.step(2),
            Err(Error::InvalidAction { action: 2, n: 2 })
        ));
    }

    #[test]
    fn push_right_accelerates_cart_right() {
        let mut env = env();
        env.set_state([0.0; 4]);
        env.step(1).unwrap();
        let after_first = env.state().unwrap();
        // position integrates the old velocity, velocity picks up the push
        assert_eq!(after_first[0], 0.0);
        assert!(after_first[1] > 0.0);
        assert!(after_first[3] < 0.0);
    }

    #[test]
    fn integrate_matches_hand_computed_step() {
        let env = env();
        let next = env.integrate(&[0.0, 0.0, 0.0, 0.0], 10.0);
        let temp = 10.0 / 1.1;
        let theta_acc = -temp / (0.5 * (4.0 / 3.0 - 0.1 / 1.1));
        let x_acc = temp - 0.05 * theta_acc / 1.1;
        assert!((next[1] - x_acc * 0.02).abs() < 1e-12);
        assert!((next[3] - theta_acc * 0.02).abs() < 1e-12);
    }

    #[test]
    fn game_over_is_judged_on_previous_state() {
        let mut env = env();
        env.set_state([5.01, 0.0, 0.0, 0.0]);
        let step = env.step(0).unwrap();
        assert!(step.is_done);
        assert!(!step.is_truncated);
        assert_eq!(step.reward, 0.0);
        assert!(matches!(env.step(0), Err(Error::EpisodeOver)));
    }

    #[test]
    fn leaving_bounds_ends_episode_one_step_later() {
        let mut env = env();
        env.set_state([4.99, 10.0, 0.0, 0.0]);
        let step = env.step(1).unwrap();
        assert!(!step.is_done);
        assert_eq!(step.reward, 1.0);
        let step = env.step(1).unwrap();
        assert!(step.is_done);
        assert_eq!(step.reward, 0.0);
    }

    #[test]
    fn step_limit_truncates() {
        let mut config = CartPoleConfig::wide();
        config.max_episode_steps = Some(3);
        let mut env = CartPoleEnv::new("test", config);
        env.reset(Some(1)).unwrap();
        let mut last = None;
        for _ in 0..3 {
            last = Some(env.step(0).unwrap());
        }
        let last = last.unwrap();
        assert!(last.is_truncated);
        assert!(!last.is_done);
        assert_eq!(last.reward, 1.0);
    }

    #[test]
    fn classic_limits_are_tighter() {
        let mut env = CartPoleEnv::new("CartPole-v1", CartPoleConfig::classic());
        env.set_state([0.0, 0.0, 0.25, 0.0]);
        assert!(env.step(0).unwrap().is_done);
    }

    #[test]
    fn rgb_frame_draws_cart_and_pole() {
        let mut env = env();
        env.set_state([0.0; 4]);
        let frame = env.render(RenderMode::RgbArray).unwrap().unwrap();
        assert_eq!(frame.size(), vec![3, 400, 600]);
        // cart body, black
        assert_eq!(frame.int64_value(&[0, 310, 300]), 0);
        // upright pole above the cart, red
        assert_eq!(frame.int64_value(&[0, 250, 300]), 255);
        assert_eq!(frame.int64_value(&[1, 250, 300]), 0);
        // background
        assert_eq!(frame.int64_value(&[1, 50, 50]), 255);
    }
}
