use serde::{Deserialize, Serialize};

use crate::model::ids::EquipmentId;

/// Static equipment catalog entry.
///
/// Unlocking is one-way: once an id is in a profile's unlocked set it stays there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentItem {
    pub id: EquipmentId,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    pub unlock_level: u32,
    pub bonus: u32,
}

impl EquipmentItem {
    #[must_use]
    pub fn new(id: &str, name: &str, icon: &str, unlock_level: u32, bonus: u32) -> Self {
        Self {
            id: EquipmentId::new(id),
            name: name.to_owned(),
            icon: icon.to_owned(),
            unlock_level,
            bonus,
        }
    }
}

/// Ordered collection of equipment items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquipmentCatalog {
    items: Vec<EquipmentItem>,
}

impl EquipmentCatalog {
    #[must_use]
    pub fn new(items: Vec<EquipmentItem>) -> Self {
        Self { items }
    }

    #[must_use]
    pub fn items(&self) -> &[EquipmentItem] {
        &self.items
    }

    #[must_use]
    pub fn get(&self, id: &EquipmentId) -> Option<&EquipmentItem> {
        self.items.iter().find(|item| &item.id == id)
    }
}

impl Default for EquipmentCatalog {
    fn default() -> Self {
        Self::new(vec![
            EquipmentItem::new("pen1", "Wooden Pen", "🖊️", 1, 5),
            EquipmentItem::new("pen2", "Silver Pen", "🖋️", 3, 10),
            EquipmentItem::new("pen3", "Golden Pen", "✒️", 5, 15),
            EquipmentItem::new("book1", "Beginner's Book", "📕", 2, 5),
            EquipmentItem::new("book2", "Expert's Book", "📘", 4, 10),
            EquipmentItem::new("glasses", "Glasses of Wisdom", "👓", 6, 20),
        ])
    }
}
