use crate::error::ConfigError;
use crate::mechanics::context::MechanicsSettings;
use crate::mechanics::operations::Spawn;
use crate::world::monsters::MonsterType;
use crate::world::position::Position;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "mechanics.yaml";

#[derive(Debug)]
pub struct AppConfig {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub simulation: SimulationConfig,
}

impl AppConfig {
    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        if args.len() < 2 {
            return Err(ConfigError::Usage);
        }

        let root = Path::new(&args[1]).to_path_buf();
        let config_path = if args.len() > 2 {
            PathBuf::from(&args[2])
        } else {
            root.join(DEFAULT_CONFIG_FILE)
        };
        let mut simulation = if args.len() > 2 || config_path.is_file() {
            SimulationConfig::load(&config_path)?
        } else {
            SimulationConfig::default()
        };
        simulation.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(Self {
            root,
            config_path,
            simulation,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PathfindingConfig {
    pub default_max_steps: u32,
}

impl Default for PathfindingConfig {
    fn default() -> Self {
        Self {
            default_max_steps: crate::pathfinding::astar::DEFAULT_MAX_STEPS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    pub wait_time_ms: u64,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self { wait_time_ms: 1_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub name: String,
    pub width: u16,
    pub height: u16,
    pub floor: u8,
    pub ground_speed: u16,
    pub blocked: Vec<Position>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            name: "arena".to_string(),
            width: 64,
            height: 64,
            floor: 7,
            ground_speed: crate::world::creatures::DEFAULT_GROUND_SPEED,
            blocked: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ItemTypeConfig {
    pub id: u16,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub log_level: String,
    pub idle_wait_ms: u64,
    pub rng_seed: Option<u64>,
    pub run_for_secs: Option<u64>,
    pub known_creature_limit: usize,
    pub in_fight_secs: u64,
    pub pathfinding: PathfindingConfig,
    pub walk: WalkConfig,
    pub map: MapConfig,
    pub item_types: Vec<ItemTypeConfig>,
    pub monster_types: Vec<MonsterType>,
    pub spawns: Vec<Spawn>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            idle_wait_ms: 50,
            rng_seed: None,
            run_for_secs: None,
            known_creature_limit: crate::notifications::known_creatures::DEFAULT_KNOWN_CREATURE_LIMIT,
            in_fight_secs: 60,
            pathfinding: PathfindingConfig::default(),
            walk: WalkConfig::default(),
            map: MapConfig::default(),
            item_types: Vec::new(),
            monster_types: Vec::new(),
            spawns: Vec::new(),
        }
    }
}

impl SimulationConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Applies `TIBIA_*` overrides looked up through `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(level) = non_empty(lookup("TIBIA_LOG_LEVEL")) {
            self.log_level = level;
        }
        if let Some(seed) = non_empty(lookup("TIBIA_RNG_SEED")) {
            self.rng_seed = Some(parse_override("TIBIA_RNG_SEED", &seed)?);
        }
        if let Some(secs) = non_empty(lookup("TIBIA_RUN_FOR_SECS")) {
            self.run_for_secs = Some(parse_override("TIBIA_RUN_FOR_SECS", &secs)?);
        }
        Ok(())
    }

    pub fn mechanics_settings(&self) -> MechanicsSettings {
        MechanicsSettings {
            walk_wait_time: Duration::from_millis(self.walk.wait_time_ms),
            in_fight_duration: Duration::from_secs(self.in_fight_secs),
            default_max_steps: self.pathfinding.default_max_steps,
        }
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms.max(1))
    }

    pub fn run_for(&self) -> Option<Duration> {
        self.run_for_secs.map(Duration::from_secs)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_override(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidOverride {
        name,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_means_defaults() {
        let config = SimulationConfig::parse("  \n").expect("parse");
        assert_eq!(config, SimulationConfig::default());
        assert_eq!(config.mechanics_settings(), MechanicsSettings::default());
    }

    #[test]
    fn yaml_fills_only_what_it_names() {
        let config = SimulationConfig::parse(
            r#"
rng_seed: 7
walk:
  wait_time_ms: 250
map:
  width: 20
  height: 10
  blocked:
    - { x: 3, y: 4, z: 7 }
monster_types:
  - race: rat
    name: Rat
    base_speed: 10
    experience: 5
    corpse: 2813
spawns:
  - race: rat
    location: { x: 10, y: 5, z: 7 }
    radius: 4
    count: 2
    regeneration_secs: 60
"#,
        )
        .expect("parse");
        assert_eq!(config.rng_seed, Some(7));
        assert_eq!(config.walk.wait_time_ms, 250);
        assert_eq!(config.map.floor, 7);
        assert_eq!(config.map.blocked, vec![Position::new(3, 4, 7)]);
        assert_eq!(config.monster_types[0].health, 100);
        assert_eq!(config.spawns[0].regeneration(), Some(Duration::from_secs(60)));
        assert_eq!(config.pathfinding.default_max_steps, 100);
    }

    #[test]
    fn environment_overrides_win_and_are_validated() {
        let env: HashMap<&str, &str> = [("TIBIA_RNG_SEED", "99"), ("TIBIA_LOG_LEVEL", " debug ")].into();
        let mut config = SimulationConfig::default();
        config
            .apply_overrides(|name| env.get(name).map(|value| value.to_string()))
            .expect("overrides");
        assert_eq!(config.rng_seed, Some(99));
        assert_eq!(config.log_level, "debug");

        let bad: HashMap<&str, &str> = [("TIBIA_RUN_FOR_SECS", "soon")].into();
        let error = config
            .apply_overrides(|name| bad.get(name).map(|value| value.to_string()))
            .expect_err("bad override");
        assert!(matches!(error, ConfigError::InvalidOverride { name: "TIBIA_RUN_FOR_SECS", .. }));
    }

    #[test]
    fn missing_root_is_a_usage_error() {
        assert!(matches!(
            AppConfig::from_args(&["tibia-mechanics".to_string()]),
            Err(ConfigError::Usage)
        ));
    }
}
