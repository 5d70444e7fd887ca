mod character;
mod equipment;
mod ids;
mod profile;
mod question;
mod result;
mod stage;

pub use character::{Character, EvolutionForm, character_catalog, find_character};
pub use equipment::{EquipmentCatalog, EquipmentItem};
pub use ids::{CharacterId, EquipmentId, ParseIdError, StageId};
pub use profile::{PlayerProfile, ProfileDraft, ProfileError, aggregate_level};
pub use question::{
    CorrectAnswer, MULTIPLE_CHOICE_TAG, QuestionError, QuestionSpec, SINGLE_CHOICE_TAG,
};
pub use result::{EndReason, SessionResult, SessionResultError};
pub use stage::{DEFAULT_STAGE_IDS, StageInfo, StageProgress};
