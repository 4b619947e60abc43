use thiserror::Error;

/// Typed failures raised by the repository layer. These ride inside `anyhow`
/// chains like every other error in the crate; callers that need to react to
/// a specific case (the UI picking a message, tests asserting an invariant
/// held) downcast with `err.downcast_ref::<CatalogError>()`.
///
/// Validation of raw user input is deliberately absent here: required fields,
/// email shape, and date formats are the form layer's job and never reach the
/// repositories.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A delete was blocked because dependent rows still reference the
    /// target. Carries the blocking count for the status-footer message.
    #[error("cannot delete {entity}: {count} {dependents} still reference it")]
    ReferentialIntegrity {
        entity: &'static str,
        count: i64,
        dependents: &'static str,
    },

    /// An update, delete, or return targeted an id that does not exist.
    /// Surfaced instead of silently touching zero rows.
    #[error("{what} not found")]
    NotFound { what: String },

    /// Issuance lost the copy: it was no longer Available when the status
    /// flip ran. The enclosing transaction has been rolled back.
    #[error("copy {copy_id} is not available for loan")]
    CopyNotAvailable { copy_id: i64 },

    /// A return targeted a loan whose return date is already set. The
    /// Active -> Returned transition is one-way.
    #[error("loan {loan_id} is already returned")]
    LoanClosed { loan_id: i64 },
}
