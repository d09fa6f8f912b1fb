use std::path::Path;
use std::time::Duration;

use agent::HttpClientConfig;
use engine_core::PipelineConfig;
use rpg::{PrePlanningPolicy, RpgOptions};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0} requires a value")]
    MissingValue(&'static str),

    #[error("invalid value for {flag}: {value}")]
    InvalidValue { flag: &'static str, value: String },

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameSection {
    pub scenario: String,
    pub runtime_dir: String,
    /// 0 = play until a player dies or the terminal quits.
    pub max_rounds: u64,
    pub pre_planning: PrePlanningPolicy,
    /// 0 = gathers wait as long as the agents take.
    pub round_deadline_secs: u64,
    pub round_budget_ms: u64,
}

impl Default for GameSection {
    fn default() -> Self {
        Self {
            scenario: "data/scenario.json".to_string(),
            runtime_dir: "data/runtime".to_string(),
            max_rounds: 0,
            pre_planning: PrePlanningPolicy::All,
            round_deadline_secs: 0,
            round_budget_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Answer every request in-process with an empty plan.
    pub offline: bool,
    pub model: String,
    pub temperature: f32,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            offline: false,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerSection {
    /// Empty = the first player in the scenario.
    pub name: String,
    pub queue_capacity: usize,
}

impl Default for PlayerSection {
    fn default() -> Self {
        Self {
            name: String::new(),
            queue_capacity: session::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Top-level terminal game configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub game: GameSection,
    pub agent: AgentSection,
    pub player: PlayerSection,
}

impl GameConfig {
    /// Load configuration from an optional TOML file path.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let config = match config_path {
            Some(path) if Path::new(path).exists() => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_string(),
                    source,
                })?;
                toml::from_str(&content)?
            }
            _ => Self::default(),
        };
        Ok(config)
    }

    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_rounds: self.game.max_rounds,
            round_budget_ms: self.game.round_budget_ms,
        }
    }

    pub fn to_options(&self, about_game: &str) -> RpgOptions {
        RpgOptions {
            about_game: about_game.to_string(),
            pre_planning: self.game.pre_planning,
            round_deadline: (self.game.round_deadline_secs > 0)
                .then(|| Duration::from_secs(self.game.round_deadline_secs)),
        }
    }

    /// The API key is read from the environment, never from the file.
    pub fn to_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            model: self.agent.model.clone(),
            temperature: self.agent.temperature,
            api_key: std::env::var(&self.agent.api_key_env).ok().filter(|k| !k.is_empty()),
            timeout: Duration::from_secs(self.agent.timeout_secs),
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    config: Option<String>,
    scenario: Option<String>,
    rounds: Option<u64>,
    player: Option<String>,
    offline: bool,
}

fn parse_args(args: &[String]) -> Result<CliArgs, ConfigError> {
    let mut cli = CliArgs::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let flag: &'static str = match arg.as_str() {
            "--config" => "--config",
            "--scenario" => "--scenario",
            "--rounds" => "--rounds",
            "--player" => "--player",
            "--offline" => {
                cli.offline = true;
                continue;
            }
            other => return Err(ConfigError::UnknownArgument(other.to_string())),
        };
        let value = iter.next().ok_or(ConfigError::MissingValue(flag))?.clone();
        match flag {
            "--config" => cli.config = Some(value),
            "--scenario" => cli.scenario = Some(value),
            "--player" => cli.player = Some(value),
            _ => {
                let rounds = value
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidValue { flag, value: value.clone() })?;
                cli.rounds = Some(rounds);
            }
        }
    }
    Ok(cli)
}

/// Load the config named by `--config`, then apply the other flags on top.
/// Supports: --config <path> --scenario <path> --rounds <n> --player <name> --offline
pub fn load_with_args(args: &[String]) -> Result<GameConfig, ConfigError> {
    let cli = parse_args(args)?;
    let mut config = GameConfig::load(cli.config.as_deref())?;
    if let Some(scenario) = cli.scenario {
        config.game.scenario = scenario;
    }
    if let Some(rounds) = cli.rounds {
        config.game.max_rounds = rounds;
    }
    if let Some(player) = cli.player {
        config.player.name = player;
    }
    if cli.offline {
        config.agent.offline = true;
    }
    Ok(config)
}

/// Parse the process arguments and load config.
pub fn parse_cli_args() -> Result<GameConfig, ConfigError> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    load_with_args(&args)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn default_config_matches_hardcoded_values() {
        let config = GameConfig::default();
        assert_eq!(config.game.scenario, "data/scenario.json");
        assert_eq!(config.game.max_rounds, 0);
        assert_eq!(config.game.pre_planning, PrePlanningPolicy::All);
        assert!(!config.agent.offline);
        assert_eq!(config.agent.timeout_secs, 60);
        assert_eq!(config.player.queue_capacity, session::DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn load_none_returns_defaults() {
        let config = GameConfig::load(None).unwrap();
        assert_eq!(config.game.runtime_dir, "data/runtime");
    }

    #[test]
    fn load_nonexistent_file_returns_defaults() {
        let config = GameConfig::load(Some("/tmp/nonexistent_rpg_config_12345.toml")).unwrap();
        assert_eq!(config.game.round_budget_ms, 30_000);
    }

    #[test]
    fn load_partial_toml() {
        let mut f = NamedTempFile::new().unwrap();
        write!(
            f,
            r#"
[game]
max_rounds = 5
pre_planning = "only_players_stage"
round_deadline_secs = 20

[agent]
offline = true
"#
        )
        .unwrap();

        let config = GameConfig::load(Some(f.path().to_str().unwrap())).unwrap();
        assert_eq!(config.game.max_rounds, 5);
        assert_eq!(config.game.pre_planning, PrePlanningPolicy::OnlyPlayersStage);
        assert!(config.agent.offline);
        assert_eq!(config.agent.model, "gpt-4o-mini");
        assert_eq!(config.player.name, "");

        let options = config.to_options("about");
        assert_eq!(options.round_deadline, Some(Duration::from_secs(20)));
        assert_eq!(config.to_pipeline_config().max_rounds, 5);
    }

    #[test]
    fn bad_toml_is_an_error() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "[game]\nmax_rounds = \"many\"\n").unwrap();
        assert!(matches!(
            GameConfig::load(Some(f.path().to_str().unwrap())),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn flags_override_file_values() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "[game]\nmax_rounds = 5\nscenario = \"a.json\"\n").unwrap();
        let path = f.path().to_str().unwrap().to_string();

        let config = load_with_args(&args(&["--config", &path, "--rounds", "9", "--player", "Hero", "--offline"])).unwrap();
        assert_eq!(config.game.max_rounds, 9);
        assert_eq!(config.game.scenario, "a.json");
        assert_eq!(config.player.name, "Hero");
        assert!(config.agent.offline);
    }

    #[test]
    fn bad_flags_are_reported() {
        assert!(matches!(
            load_with_args(&args(&["--rounds"])),
            Err(ConfigError::MissingValue("--rounds"))
        ));
        assert!(matches!(
            load_with_args(&args(&["--rounds", "x"])),
            Err(ConfigError::InvalidValue { flag: "--rounds", .. })
        ));
        assert!(matches!(
            load_with_args(&args(&["--verbose"])),
            Err(ConfigError::UnknownArgument(_))
        ));
    }

    #[test]
    fn zero_deadline_means_none() {
        let config = GameConfig::default();
        assert_eq!(config.to_options("").round_deadline, None);
    }
}
