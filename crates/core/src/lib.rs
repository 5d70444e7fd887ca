#![forbid(unsafe_code)]

pub mod model;
pub mod progression;
pub mod question;
pub mod rules;
pub mod session;
pub mod shuffle;
pub mod time;

pub use rules::{GameRules, GameRulesDraft, RulesError, UnlockPolicy};
pub use time::Clock;
