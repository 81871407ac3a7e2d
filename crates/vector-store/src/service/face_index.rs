//! FaceIndexService: enroll, identify, edit and delete.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::atomic::AtomicVectorStore;
use crate::config::ServiceConfig;
use crate::error::{StoreError, StoreResult};
use crate::optimizer::QueryOptimizer;
use crate::store::VectorStore;
use crate::types::{DeleteOutcome, GroupDeleteOutcome, GroupId, ImageId, SearchMatch, UpdateOutcome};

use super::collaborators::{
    AttributePredictor, FeatureExtractor, Gender, Person, PersonAttributes, PersonRegistry,
};

/// Allocation attempts before giving up on a free image id.
const MAX_ID_ATTEMPTS: usize = 64;

/// Input for [`FaceIndexService::enroll`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollRequest {
    /// Allocated when absent.
    pub image_id: Option<ImageId>,
    /// `image_{id}.jpg` when absent or empty.
    pub path: Option<String>,
    pub group_id: GroupId,
    pub name: String,
    /// Predicted when absent and the group is new.
    pub age: Option<u32>,
    /// Predicted when absent and the group is new.
    pub gender: Option<Gender>,
    pub residence: Option<String>,
}

impl EnrollRequest {
    /// Request for `group_id` with everything else left to the service.
    pub fn new(group_id: GroupId, name: impl Into<String>) -> Self {
        Self {
            image_id: None,
            path: None,
            group_id,
            name: name.into(),
            age: None,
            gender: None,
            residence: None,
        }
    }

    #[must_use]
    pub fn with_image_id(mut self, image_id: ImageId) -> Self {
        self.image_id = Some(image_id);
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_attributes(mut self, age: u32, gender: Gender) -> Self {
        self.age = Some(age);
        self.gender = Some(gender);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollOutcome {
    pub image_id: ImageId,
    pub path: String,
    pub group_id: GroupId,
    /// A registry record was created for a previously unknown group.
    pub person_created: bool,
}

/// A search hit above the match threshold, with its registry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifiedMatch {
    pub hit: SearchMatch,
    /// `None` when the registry has no record or its lookup failed.
    pub person: Option<Person>,
}

/// Wires the store to the extractor, registry and predictor.
///
/// Store and registry are not updated atomically together: store changes
/// commit first, and a registry failure afterwards is reported without
/// undoing them.
pub struct FaceIndexService {
    store: Arc<AtomicVectorStore>,
    optimizer: Arc<QueryOptimizer>,
    extractor: Arc<dyn FeatureExtractor>,
    registry: Arc<dyn PersonRegistry>,
    predictor: Option<Arc<dyn AttributePredictor>>,
    config: ServiceConfig,
}

impl FaceIndexService {
    /// Queries go through `optimizer`; mutations go to the store it wraps.
    pub fn new(
        optimizer: Arc<QueryOptimizer>,
        extractor: Arc<dyn FeatureExtractor>,
        registry: Arc<dyn PersonRegistry>,
        config: ServiceConfig,
    ) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self {
            store: Arc::clone(optimizer.store()),
            optimizer,
            extractor,
            registry,
            predictor: None,
            config,
        })
    }

    #[must_use]
    pub fn with_predictor(mut self, predictor: Arc<dyn AttributePredictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    /// Add one image to the store, creating the registry record for a new
    /// group.
    ///
    /// # Errors
    /// - `StoreError::Duplicate` if the id or path is already stored
    /// - extractor and registry errors as returned by the collaborators
    /// - any store error; the store is rolled back
    pub fn enroll(&self, request: EnrollRequest, image: &[u8]) -> StoreResult<EnrollOutcome> {
        let vector = self.extractor.extract(image)?;

        let group_id = request.group_id;
        let is_new_group = self.registry.get_by_group_id(group_id)?.is_none();
        let attributes = is_new_group.then(|| self.resolve_attributes(&request, image));

        let requested_id = request.image_id;
        let requested_path = request.path.clone().filter(|p| !p.is_empty());
        let (image_id, path) = self.store.transaction(|store| {
            let image_id = match requested_id {
                Some(id) if store.contains_image_id(id) => {
                    return Err(StoreError::Duplicate {
                        field: "image_id",
                        value: id.to_string(),
                    })
                }
                Some(id) => id,
                None => allocate_image_id(store)?,
            };

            let path = requested_path.unwrap_or_else(|| default_path(image_id));
            if store.contains_path(&path) {
                return Err(StoreError::Duplicate {
                    field: "path",
                    value: path,
                });
            }

            store.add_batch(
                &[vector.as_slice()],
                &[image_id],
                std::slice::from_ref(&path),
                &[group_id],
            )?;
            Ok((image_id, path))
        })?;

        let person_created = match attributes {
            Some(attributes) => {
                let person = Person {
                    group_id,
                    name: request.name,
                    age: attributes.age,
                    gender: attributes.gender,
                    residence: request.residence,
                };
                self.registry.add(person).map_err(|e| {
                    error!(%image_id, %group_id, "Registry add failed after store commit: {}", e);
                    e
                })?;
                true
            }
            None => false,
        };

        info!(%image_id, %group_id, person_created, "Enrolled image");
        Ok(EnrollOutcome {
            image_id,
            path,
            group_id,
            person_created,
        })
    }

    /// Caller-supplied attributes first, then the predictor, then defaults.
    fn resolve_attributes(&self, request: &EnrollRequest, image: &[u8]) -> PersonAttributes {
        if let (Some(age), Some(gender)) = (request.age, request.gender) {
            return PersonAttributes { age, gender };
        }

        let predicted = match &self.predictor {
            Some(predictor) => match predictor.predict(image) {
                Ok(attributes) => Some(attributes),
                Err(e) => {
                    warn!("Attribute prediction failed, using defaults: {}", e);
                    None
                }
            },
            None => None,
        };

        PersonAttributes {
            age: request
                .age
                .or(predicted.map(|p| p.age))
                .unwrap_or(self.config.default_age),
            gender: request
                .gender
                .or(predicted.map(|p| p.gender))
                .unwrap_or(Gender::Unknown),
        }
    }

    /// Matches scoring above the threshold, best first, with registry records.
    ///
    /// A registry failure stops further lookups; the remaining matches are
    /// returned without a person.
    pub fn identify(&self, image: &[u8], k: Option<usize>) -> StoreResult<Vec<IdentifiedMatch>> {
        let vector = self.extractor.extract(image)?;
        let k = k.unwrap_or(self.config.default_top_k);
        let hits = self.optimizer.cached_query(&vector, k)?;

        let mut registry_ok = true;
        let mut identified = Vec::new();
        for hit in hits {
            if hit.score <= self.config.match_threshold {
                continue;
            }

            let person = if registry_ok {
                match self.registry.get_by_group_id(hit.group_id) {
                    Ok(person) => person,
                    Err(e) => {
                        warn!(group_id = %hit.group_id, "Registry lookup failed: {}", e);
                        registry_ok = false;
                        None
                    }
                }
            } else {
                None
            };

            identified.push(IdentifiedMatch { hit, person });
        }

        debug!(k, matched = identified.len(), "Identified image");
        Ok(identified)
    }

    /// Replace the image and/or path of a stored record.
    ///
    /// An empty path is ignored. A path held by another record is rejected.
    pub fn edit_image(
        &self,
        image_id: ImageId,
        image: Option<&[u8]>,
        path: Option<String>,
    ) -> StoreResult<UpdateOutcome> {
        let vector = image
            .map(|bytes| self.extractor.extract(bytes))
            .transpose()?;
        let path = path.filter(|p| !p.is_empty());

        self.store.transaction(|store| {
            if let Some(path) = &path {
                let holder = store
                    .paths()
                    .iter()
                    .position(|p| p == path)
                    .and_then(|position| store.image_ids().get(position).copied());
                if holder.is_some_and(|id| id != image_id) {
                    return Err(StoreError::Duplicate {
                        field: "path",
                        value: path.clone(),
                    });
                }
            }
            store.update_record(image_id, vector.as_deref(), path)
        })
    }

    pub fn delete_image(&self, image_id: ImageId) -> StoreResult<DeleteOutcome> {
        self.store.atomic_delete_by_image_id(image_id)
    }

    /// Delete a group from the store, then from the registry.
    ///
    /// The registry is only touched when the store held the group.
    pub fn delete_group(&self, group_id: GroupId) -> StoreResult<GroupDeleteOutcome> {
        let outcome = self.store.atomic_delete_by_group_id(group_id)?;
        if outcome.is_deleted() {
            self.registry.delete_by_group_id(group_id).map_err(|e| {
                error!(
                    %group_id,
                    removed = outcome.removed_count(),
                    "Registry delete failed after store commit: {}",
                    e
                );
                e
            })?;
        }
        Ok(outcome)
    }

    pub fn get_ids_by_group(&self, group_id: GroupId) -> StoreResult<Vec<ImageId>> {
        self.store.with_store(|store| store.get_ids_by_group(group_id))
    }

    #[inline]
    pub fn store(&self) -> &Arc<AtomicVectorStore> {
        &self.store
    }

    #[inline]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

fn default_path(image_id: ImageId) -> String {
    format!("image_{}.jpg", image_id)
}

/// Time-derived prefix plus a random four-digit suffix, retried until unused.
fn allocate_image_id(store: &VectorStore) -> StoreResult<ImageId> {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let prefix = (secs % 1_000_000) as i64 * 10_000;

    let mut rng = rand::thread_rng();
    for _ in 0..MAX_ID_ATTEMPTS {
        let candidate = ImageId(prefix + rng.gen_range(1000..=9999));
        if !store.contains_image_id(candidate) {
            return Ok(candidate);
        }
    }

    Err(StoreError::Duplicate {
        field: "image_id",
        value: format!("no free id after {} attempts", MAX_ID_ATTEMPTS),
    })
}
