//! Orchestration over the store and its external collaborators.
//!
//! The collaborators (feature extractor, person registry, attribute
//! predictor) are traits. Concrete implementations live outside this crate.
//!
//! Feature extraction always runs before the store lock is taken; only the
//! structural mutation or search is serialized.

mod collaborators;
mod face_index;


pub use collaborators::{
    AttributePredictor, FeatureExtractor, Gender, Person, PersonAttributes, PersonRegistry,
};
pub use face_index::{EnrollOutcome, EnrollRequest, FaceIndexService, IdentifiedMatch};
