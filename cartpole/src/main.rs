use anyhow::Result;
use cartpole::cli::{Command, Opt};
use cartpole::settings::Settings;
use cartpole::{commands, telemetry};
use structopt::StructOpt;
use tracing::info;

fn main() -> Result<()> {
    let opt = Opt::from_args();
    let mut settings = Settings::load(opt.config.as_deref())?;
    opt.apply(&mut settings);
    telemetry::init(&settings.logging.level)?;

    match &opt.cmd {
        Command::Train(_) => {
            commands::train(&settings)?;
        }
        Command::Evaluate(eval) => {
            let env_override = eval.env.env.is_some();
            let records = commands::evaluate(&settings, env_override)?;
            let total: f64 = records.iter().map(|r| r.total_reward()).sum();
            info!(
                episodes = records.len(),
                avg_reward = total / records.len().max(1) as f64,
                "evaluation finished"
            );
        }
        Command::Check(_) => commands::check(&settings)?,
        Command::Envs => {
            for id in commands::list_envs() {
                println!("{}", id);
            }
        }
    }
    Ok(())
}
