use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The upload was already soft-deleted; deleting twice is rejected.
    #[error("Already deleted: {entity} with id {id}")]
    AlreadyDeleted { entity: &'static str, id: DbId },

    /// The operation is not valid in the entity's current state, e.g.
    /// rolling back an upload that is still processing.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
