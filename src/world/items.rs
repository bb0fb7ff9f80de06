use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ItemId(pub u32);

static NEXT_ITEM_ID: AtomicU32 = AtomicU32::new(1);

impl ItemId {
    pub fn next() -> Self {
        ItemId(NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemTypeId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemAttribute {
    Amount,
    Charges,
    ExpireSeconds,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    pub type_id: ItemTypeId,
    pub name: String,
    pub count: u16,
    pub attributes: Vec<(ItemAttribute, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemCreationArguments {
    pub type_id: Option<ItemTypeId>,
    pub attributes: Vec<(ItemAttribute, u32)>,
}

impl ItemCreationArguments {
    pub fn of_type(type_id: ItemTypeId) -> Self {
        Self {
            type_id: Some(type_id),
            attributes: Vec::new(),
        }
    }
}

/// Content factory consulted by operations that create things.
pub trait ItemFactory: Send + Sync {
    fn create(&self, arguments: &ItemCreationArguments) -> Option<Item>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemTypeDefinition {
    pub type_id: ItemTypeId,
    pub name: String,
}

/// Factory over a fixed set of known item types.
#[derive(Debug, Default, Clone)]
pub struct ItemCatalog {
    types: HashMap<ItemTypeId, ItemTypeDefinition>,
}

impl ItemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, type_id: ItemTypeId, name: &str) -> Self {
        self.insert(ItemTypeDefinition {
            type_id,
            name: name.to_string(),
        });
        self
    }

    pub fn insert(&mut self, definition: ItemTypeDefinition) {
        self.types.insert(definition.type_id, definition);
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl ItemFactory for ItemCatalog {
    fn create(&self, arguments: &ItemCreationArguments) -> Option<Item> {
        let definition = self.types.get(&arguments.type_id?)?;
        let count = arguments
            .attributes
            .iter()
            .find(|(attribute, _)| *attribute == ItemAttribute::Amount)
            .map(|(_, value)| (*value).clamp(1, u32::from(u16::MAX)) as u16)
            .unwrap_or(1);
        Some(Item {
            id: ItemId::next(),
            type_id: definition.type_id,
            name: definition.name.clone(),
            count,
            attributes: arguments.attributes.clone(),
        })
    }
}
