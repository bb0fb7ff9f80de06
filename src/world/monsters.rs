use crate::world::items::ItemTypeId;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BloodType {
    #[default]
    Blood,
    Slime,
    Bones,
    Fire,
}

pub const BLOOD_POOL: ItemTypeId = ItemTypeId(2886);
pub const SLIME_POOL: ItemTypeId = ItemTypeId(2887);

impl BloodType {
    /// Splash left on the floor when a creature of this blood dies.
    pub fn pool(self) -> Option<ItemTypeId> {
        match self {
            BloodType::Blood => Some(BLOOD_POOL),
            BloodType::Slime => Some(SLIME_POOL),
            BloodType::Bones | BloodType::Fire => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MonsterType {
    pub race: String,
    pub name: String,
    #[serde(default)]
    pub base_speed: u16,
    #[serde(default = "default_health")]
    pub health: u32,
    #[serde(default)]
    pub experience: u32,
    #[serde(default = "default_corpse")]
    pub corpse: ItemTypeId,
    #[serde(default)]
    pub blood: BloodType,
    #[serde(default)]
    pub keeps_distance: bool,
}

fn default_health() -> u32 {
    100
}

fn default_corpse() -> ItemTypeId {
    ItemTypeId(0)
}

impl MonsterType {
    /// Walking speed derived from the race's base speed; zero means immobile.
    pub fn speed(&self) -> u16 {
        if self.base_speed == 0 {
            0
        } else {
            self.base_speed.saturating_mul(2).saturating_add(80)
        }
    }
}

/// Read side of the durable monster definitions.
pub trait MonsterTypeRepository: Send + Sync {
    fn monster_type(&self, race: &str) -> Option<MonsterType>;
}

#[derive(Debug, Default, Clone)]
pub struct MonsterTypeCatalog {
    types: HashMap<String, MonsterType>,
}

impl MonsterTypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_types(types: impl IntoIterator<Item = MonsterType>) -> Self {
        let mut catalog = Self::new();
        for monster_type in types {
            catalog.insert(monster_type);
        }
        catalog
    }

    pub fn insert(&mut self, monster_type: MonsterType) {
        self.types
            .insert(monster_type.race.to_lowercase(), monster_type);
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl MonsterTypeRepository for MonsterTypeCatalog {
    fn monster_type(&self, race: &str) -> Option<MonsterType> {
        self.types.get(&race.trim().to_lowercase()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rat() -> MonsterType {
        MonsterType {
            race: "rat".to_string(),
            name: "Rat".to_string(),
            base_speed: 10,
            health: 20,
            experience: 5,
            corpse: ItemTypeId(2813),
            blood: BloodType::Blood,
            keeps_distance: false,
        }
    }

    #[test]
    fn speed_is_derived_from_base_speed() {
        assert_eq!(rat().speed(), 100);
        let statue = MonsterType {
            base_speed: 0,
            ..rat()
        };
        assert_eq!(statue.speed(), 0);
    }

    #[test]
    fn catalog_lookup_ignores_case_and_whitespace() {
        let catalog = MonsterTypeCatalog::from_types([rat()]);
        assert_eq!(catalog.monster_type(" RAT ").map(|t| t.name), Some("Rat".to_string()));
        assert!(catalog.monster_type("dragon").is_none());
    }

    #[test]
    fn monster_types_parse_from_yaml_with_defaults() {
        let parsed: MonsterType =
            serde_yaml::from_str("race: slime\nname: Slime\nblood: slime\n").expect("yaml");
        assert_eq!(parsed.health, 100);
        assert_eq!(parsed.blood.pool(), Some(SLIME_POOL));
        assert_eq!(parsed.speed(), 0);
    }
}
