use crate::client::UpdateMode;
use crate::core::{Record, RecordKey};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOperation {
    Create,
    Update(UpdateMode),
    /// Partial update writing `status` into `field`, plus the payload.
    StatusTransition { field: String, status: String },
    Delete,
}

/// Operation family used in the single-flight key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    Update,
    StatusTransition,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::StatusTransition => "status_transition",
            Self::Delete => "delete",
        }
    }
}

impl MutationOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Create => OperationKind::Create,
            Self::Update(_) => OperationKind::Update,
            Self::StatusTransition { .. } => OperationKind::StatusTransition,
            Self::Delete => OperationKind::Delete,
        }
    }
}

/// Identity of an in-flight mutation. Creates have no entity yet and share
/// one key per collection unless given a natural key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MutationKey {
    pub collection: String,
    pub entity_id: Option<RecordKey>,
    pub kind: OperationKind,
}

impl fmt::Display for MutationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entity_id {
            Some(id) => write!(f, "{} {}/{}", self.kind.as_str(), self.collection, id),
            None => write!(f, "{} {}", self.kind.as_str(), self.collection),
        }
    }
}

/// A state change to send to the store. Consumed by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    pub request_id: Uuid,
    pub collection: String,
    pub entity_id: Option<RecordKey>,
    pub operation: MutationOperation,
    pub payload: Record,
}

impl MutationRequest {
    fn new(
        collection: &str,
        entity_id: Option<RecordKey>,
        operation: MutationOperation,
        payload: Record,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            collection: collection.to_string(),
            entity_id,
            operation,
            payload,
        }
    }

    pub fn create(collection: &str, payload: Record) -> Self {
        Self::new(collection, None, MutationOperation::Create, payload)
    }

    pub fn update(collection: &str, id: impl Into<RecordKey>, payload: Record, mode: UpdateMode) -> Self {
        Self::new(collection, Some(id.into()), MutationOperation::Update(mode), payload)
    }

    /// `extra` fields are written together with the status.
    pub fn status_transition(
        collection: &str,
        id: impl Into<RecordKey>,
        field: &str,
        status: &str,
        extra: Record,
    ) -> Self {
        Self::new(
            collection,
            Some(id.into()),
            MutationOperation::StatusTransition {
                field: field.to_string(),
                status: status.to_string(),
            },
            extra,
        )
    }

    pub fn delete(collection: &str, id: impl Into<RecordKey>) -> Self {
        Self::new(collection, Some(id.into()), MutationOperation::Delete, Record::new())
    }

    /// Natural key for a create, so two creates of the same thing conflict
    /// while unrelated creates in the same collection do not.
    pub fn keyed(mut self, natural_key: impl Into<RecordKey>) -> Self {
        self.entity_id = Some(natural_key.into());
        self
    }

    pub fn key(&self) -> MutationKey {
        MutationKey {
            collection: self.collection.clone(),
            entity_id: self.entity_id.clone(),
            kind: self.operation.kind(),
        }
    }

    /// Body sent to the store.
    pub fn body(&self) -> Record {
        let mut body = self.payload.clone();
        if let MutationOperation::StatusTransition { field, status } = &self.operation {
            body.insert(field.clone(), JsonValue::String(status.clone()));
        }
        body
    }
}

impl fmt::Display for MutationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.key(), self.request_id)
    }
}
