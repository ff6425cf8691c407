use std::path::PathBuf;

use structopt::StructOpt;
use strum::VariantNames;

use crate::method::Method;
use crate::settings::Settings;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "cartpole",
    about = "Trains an agent to balance a pole on a cart and watches it play."
)]
pub struct Opt {
    /// TOML settings file, command line flags override it.
    #[structopt(short = "c", long = "config", parse(from_os_str))]
    pub config: Option<PathBuf>,
    #[structopt(long = "log-level")]
    pub log_level: Option<String>,
    #[structopt(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Trains a model, continuing from an existing checkpoint if there is one.
    Train(TrainOpt),
    /// Plays the trained model and renders it.
    Evaluate(EvaluateOpt),
    /// Runs the environment compliance checks.
    Check(EnvOpt),
    /// Lists the registered environment ids.
    Envs,
}

#[derive(Debug, Default, StructOpt)]
pub struct EnvOpt {
    #[structopt(long = "env")]
    pub env: Option<String>,
    #[structopt(long = "seed")]
    pub seed: Option<u64>,
}

#[derive(Debug, Default, StructOpt)]
pub struct TrainOpt {
    #[structopt(flatten)]
    pub env: EnvOpt,
    #[structopt(short = "m", long = "method", possible_values = Method::VARIANTS)]
    pub method: Option<Method>,
    #[structopt(short = "t", long = "timesteps")]
    pub timesteps: Option<usize>,
    #[structopt(short = "r", long = "report-freq")]
    pub report_freq: Option<usize>,
    #[structopt(long = "model", parse(from_os_str))]
    pub model: Option<PathBuf>,
    /// Ignore an existing checkpoint.
    #[structopt(long = "fresh")]
    pub fresh: bool,
}

#[derive(Debug, Default, StructOpt)]
pub struct EvaluateOpt {
    #[structopt(flatten)]
    pub env: EnvOpt,
    #[structopt(long = "model", parse(from_os_str))]
    pub model: Option<PathBuf>,
    #[structopt(short = "e", long = "episodes")]
    pub episodes: Option<usize>,
    #[structopt(long = "fps")]
    pub fps: Option<u32>,
    /// Do not draw in the terminal.
    #[structopt(long = "no-render")]
    pub no_render: bool,
    /// Save every frame as a PNG into this directory.
    #[structopt(long = "frames-dir", parse(from_os_str))]
    pub frames_dir: Option<PathBuf>,
}

impl EnvOpt {
    fn apply(&self, settings: &mut Settings) {
        if let Some(env) = &self.env {
            settings.env.id = env.clone();
        }
        if self.seed.is_some() {
            settings.env.seed = self.seed;
        }
    }
}

impl Opt {
    /// Folds the command line overrides into `settings`.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(level) = &self.log_level {
            settings.logging.level = level.clone();
        }
        match &self.cmd {
            Command::Train(opt) => {
                opt.env.apply(settings);
                if let Some(method) = opt.method {
                    settings.train.method = method;
                }
                if let Some(timesteps) = opt.timesteps {
                    settings.train.total_timesteps = timesteps;
                }
                if let Some(report_freq) = opt.report_freq {
                    settings.train.report_freq = report_freq;
                }
                if let Some(model) = &opt.model {
                    settings.train.model_path = model.clone();
                }
                settings.train.fresh |= opt.fresh;
            }
            Command::Evaluate(opt) => {
                opt.env.apply(settings);
                if let Some(model) = &opt.model {
                    settings.train.model_path = model.clone();
                }
                if let Some(episodes) = opt.episodes {
                    settings.evaluate.episodes = episodes;
                }
                if let Some(fps) = opt.fps {
                    settings.evaluate.fps = fps;
                }
                if opt.no_render {
                    settings.evaluate.render = false;
                }
                if opt.frames_dir.is_some() {
                    settings.evaluate.frames_dir = opt.frames_dir.clone();
                }
            }
            Command::Check(opt) => opt.env.apply(settings),
            Command::Envs => {}
        }
    }
}
