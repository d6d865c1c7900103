use thiserror::Error;
use uuid::Uuid;

use dockline_store::StoreError;

/// Failures surfaced by the communications core.
///
/// Primary user-initiated actions (create, send, delete) surface every
/// variant to the caller. Background listener paths never do — they
/// log and swallow, because a badge update or an alert must not break
/// unrelated UI.
#[derive(Debug, Error)]
pub enum CommsError {
    /// Bad input; nothing was written.
    #[error("validation: {0}")]
    Validation(String),

    /// The persistent layer failed the operation outright.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A multi-step workflow failed after earlier steps committed.
    /// There is no automatic compensation; the id identifies the
    /// entity now sitting in an incomplete state.
    #[error("{step} failed after {entity} {id} was created: {source}")]
    PartialWrite {
        entity: &'static str,
        id: Uuid,
        step: &'static str,
        #[source]
        source: StoreError,
    },

    /// An operation that needs a session was called before login.
    #[error("no user logged in")]
    NotLoggedIn,

    /// A spawned task failed to join.
    #[error("task failed: {0}")]
    Runtime(String),
}
