use agent::{
    Agent, DQNAgent, DqnConfig, PolicyGradientAgent, PolicyGradientConfig, PpoAgent, PpoConfig,
};
use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumVariantNames,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    Ppo,
    Dqn,
    PolicyGradient,
}

/// A training algorithm together with its hyper-parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum AlgorithmConfig {
    Ppo(PpoConfig),
    Dqn(DqnConfig),
    PolicyGradient(PolicyGradientConfig),
}

impl AlgorithmConfig {
    pub fn method(&self) -> Method {
        match self {
            AlgorithmConfig::Ppo(_) => Method::Ppo,
            AlgorithmConfig::Dqn(_) => Method::Dqn,
            AlgorithmConfig::PolicyGradient(_) => Method::PolicyGradient,
        }
    }

    /// Builds a fresh agent for an environment with the given dimensions.
    pub fn build(
        &self,
        input_dims: i64,
        output_dims: i64,
        seed: u64,
    ) -> agent::Result<Box<dyn Agent>> {
        let agent: Box<dyn Agent> = match self {
            AlgorithmConfig::Ppo(c) => {
                Box::new(PpoAgent::new(input_dims, output_dims, c.clone(), seed)?)
            }
            AlgorithmConfig::Dqn(c) => {
                Box::new(DQNAgent::new(input_dims, output_dims, c.clone(), seed)?)
            }
            AlgorithmConfig::PolicyGradient(c) => Box::new(PolicyGradientAgent::new(
                input_dims,
                output_dims,
                c.clone(),
                seed,
            )?),
        };
        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::VariantNames;

    #[test]
    fn methods_parse_from_kebab_case() {
        assert_eq!(Method::from_str("ppo").unwrap(), Method::Ppo);
        assert_eq!(
            Method::from_str("policy-gradient").unwrap(),
            Method::PolicyGradient
        );
        assert_eq!(Method::VARIANTS, &["ppo", "dqn", "policy-gradient"]);
        assert_eq!(Method::Dqn.to_string(), "dqn");
    }

    #[test]
    fn algorithm_config_is_tagged_by_method() {
        let config = AlgorithmConfig::PolicyGradient(PolicyGradientConfig::default());
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["method"], "policy-gradient");
        let back: AlgorithmConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
        assert_eq!(back.method(), Method::PolicyGradient);
    }

    #[test]
    fn build_gives_agent_for_each_method() {
        for config in [
            AlgorithmConfig::Ppo(PpoConfig::default()),
            AlgorithmConfig::Dqn(DqnConfig::default()),
            AlgorithmConfig::PolicyGradient(PolicyGradientConfig::default()),
        ] {
            let agent = config.build(4, 2, 0).unwrap();
            let obs = tch::Tensor::of_slice(&[0.0f32; 4]);
            assert_eq!(agent.forward(&obs).size(), vec![2]);
        }
    }
}
