//! Collaborator interfaces.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::types::GroupId;

/// Turns an encoded image into a feature vector of the store's dimension.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, image: &[u8]) -> StoreResult<Vec<f32>>;
}

/// Predicts attributes the caller did not supply.
pub trait AttributePredictor: Send + Sync {
    fn predict(&self, image: &[u8]) -> StoreResult<PersonAttributes>;
}

/// Registry of human-readable identity records, keyed by group id.
///
/// Implementations should report their own failures as
/// [`StoreError::Collaborator`](crate::error::StoreError::Collaborator).
pub trait PersonRegistry: Send + Sync {
    fn get_by_group_id(&self, group_id: GroupId) -> StoreResult<Option<Person>>;

    fn add(&self, person: Person) -> StoreResult<()>;

    /// Returns `true` if a record was removed.
    fn delete_by_group_id(&self, group_id: GroupId) -> StoreResult<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonAttributes {
    pub age: u32,
    pub gender: Gender,
}

/// One registry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub group_id: GroupId,
    pub name: String,
    pub age: u32,
    pub gender: Gender,
    pub residence: Option<String>,
}
