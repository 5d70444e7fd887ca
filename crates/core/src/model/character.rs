use serde::{Deserialize, Serialize};

use crate::model::ids::CharacterId;

/// A selectable companion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Character {
    pub id: CharacterId,
    pub name: &'static str,
    pub element: &'static str,
    pub color: &'static str,
    pub description: &'static str,
}

/// The built-in companions.
#[must_use]
pub fn character_catalog() -> Vec<Character> {
    vec![
        Character {
            id: CharacterId::new("fire"),
            name: "Flare",
            element: "fire",
            color: "#ff6b6b",
            description: "Passionate and quick to act",
        },
        Character {
            id: CharacterId::new("water"),
            name: "Aqua",
            element: "water",
            color: "#4ecdc4",
            description: "Calm and thoughtful",
        },
        Character {
            id: CharacterId::new("leaf"),
            name: "Leaf",
            element: "grass",
            color: "#51cf66",
            description: "Gentle and creative",
        },
    ]
}

/// Looks up a catalog character by id.
#[must_use]
pub fn find_character(id: &CharacterId) -> Option<Character> {
    character_catalog().into_iter().find(|c| &c.id == id)
}

/// Growth form of the companion, derived from the highest stage level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionForm {
    Egg,
    Hatched,
    Evolved1,
    Evolved2,
    Evolved3,
    Final,
}

impl EvolutionForm {
    #[must_use]
    pub fn for_level(level: u32) -> Self {
        match level {
            0..=4 => Self::Egg,
            5..=24 => Self::Hatched,
            25..=49 => Self::Evolved1,
            50..=74 => Self::Evolved2,
            75..=99 => Self::Evolved3,
            _ => Self::Final,
        }
    }
}
