use sea_orm::DbErr;

/// Hard failures surfaced to the caller. Expected results of a scan are
/// values of [`crate::ScanOutcome`], never errors.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),

    /// The atomic consume-and-record commit lost its race twice in a row.
    /// The caller owns any further retry policy.
    #[error("scan conflict persisted after retry")]
    ConflictRetryExhausted,
}
