use chrono::{DateTime, Utc};
use db::models::{attendance_record, attendance_session, qr_token, student};
use log::warn;
use sea_orm::ActiveValue::Set;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, SqlErr, TransactionTrait};
use serde::Serialize;

use crate::service::ServiceError;
use crate::token_issuer::PAYLOAD_TAG;

/// Capture metadata stored alongside an accepted scan. Opaque here; the
/// transport layer fills in whatever it knows about the scanning client.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanMetadata {
    pub ip_address: Option<String>,
    pub device_info: Option<String>,
}

/// Terminal result of one scan attempt. Every expected branch is a value the
/// caller must handle; only storage faults leave through `Err`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ScanOutcome {
    /// Input did not match `ATT:<student>:<token>`.
    Malformed,
    /// Session unknown, switched off, or outside its time window.
    SessionNotLive,
    /// Student number did not resolve.
    UnknownStudent,
    /// No matching token, or the match is stale, superseded, or spent.
    InvalidOrExpiredToken,
    /// The student is already marked for this session. The presented token
    /// is consumed anyway so the same code cannot be replayed while fresh.
    DuplicateAttendance { student: student::Model },
    /// Token consumed and exactly one record written.
    Accepted {
        student: student::Model,
        record: attendance_record::Model,
    },
}

enum ScanAttempt {
    Done(ScanOutcome),
    /// Lost a race against a concurrent scan; state must be re-read.
    Conflict,
}

/// Validate one scan of `raw_input` against the session. Checks run in a
/// fixed order: payload shape, session liveness, student, token, duplicate.
/// Liveness comes before any token lookup so a dead session cannot be used
/// to probe whether a token matches; the token is only consumed once input,
/// session, and token have all checked out.
pub async fn validate(
    db: &DatabaseConnection,
    raw_input: &str,
    session_id: i64,
    metadata: &ScanMetadata,
    now: DateTime<Utc>,
) -> Result<ScanOutcome, ServiceError> {
    let Some((student_number, token_value)) = parse_payload(raw_input) else {
        return Ok(ScanOutcome::Malformed);
    };

    let session = attendance_session::Entity::find_by_id(session_id)
        .one(db)
        .await?;
    if !session.is_some_and(|s| s.is_live(now)) {
        return Ok(ScanOutcome::SessionNotLive);
    }

    let Some(student) = student::Model::find_by_student_number(db, student_number).await? else {
        return Ok(ScanOutcome::UnknownStudent);
    };

    // One attempt plus one re-read after a lost race against a concurrent
    // scan of the same token or the same student/session pair.
    for _ in 0..2 {
        match try_scan(db, &student, session_id, token_value, metadata, now).await? {
            ScanAttempt::Done(outcome) => return Ok(outcome),
            ScanAttempt::Conflict => {
                warn!(
                    "scan conflict for {} in session {session_id}, re-reading",
                    student.student_number
                );
            }
        }
    }
    Err(ServiceError::ConflictRetryExhausted)
}

/// One pass over the token state machine. Returns `Conflict` when a
/// concurrent scan won the commit, in which case the caller re-reads.
async fn try_scan(
    db: &DatabaseConnection,
    student: &student::Model,
    session_id: i64,
    token_value: &str,
    metadata: &ScanMetadata,
    now: DateTime<Utc>,
) -> Result<ScanAttempt, ServiceError> {
    let Some(token) = qr_token::Model::find_by_value(db, student.id, token_value).await? else {
        return Ok(ScanAttempt::Done(ScanOutcome::InvalidOrExpiredToken));
    };

    if now > token.expires_at {
        return Ok(ScanAttempt::Done(ScanOutcome::InvalidOrExpiredToken));
    }

    if token.consumed {
        // A spent token still answers "already marked" when the record for
        // this session exists, so rescanning a student reads as a duplicate
        // rather than a broken code.
        if attendance_record::Model::exists_for(db, session_id, student.id).await? {
            return Ok(ScanAttempt::Done(ScanOutcome::DuplicateAttendance {
                student: student.clone(),
            }));
        }
        return Ok(ScanAttempt::Done(ScanOutcome::InvalidOrExpiredToken));
    }

    // Consume and record as one unit. The CAS on `consumed` and the
    // composite record key decide every race; losers roll back and re-read.
    let txn = db.begin().await?;

    if !qr_token::Model::consume_if_unused(&txn, token.id).await? {
        txn.rollback().await?;
        return Ok(ScanAttempt::Conflict);
    }

    if attendance_record::Model::exists_for(&txn, session_id, student.id).await? {
        // Deliberate: the duplicate scan still burns the token (see the
        // ScanOutcome docs), so the consume commits without a record.
        txn.commit().await?;
        return Ok(ScanAttempt::Done(ScanOutcome::DuplicateAttendance {
            student: student.clone(),
        }));
    }

    let record = attendance_record::ActiveModel {
        session_id: Set(session_id),
        student_id: Set(student.id),
        qr_token_id: Set(Some(token.id)),
        taken_at: Set(now),
        ip_address: Set(metadata.ip_address.clone()),
        device_info: Set(metadata.device_info.clone()),
    };

    match record.insert(&txn).await {
        Ok(record) => {
            txn.commit().await?;
            Ok(ScanAttempt::Done(ScanOutcome::Accepted {
                student: student.clone(),
                record,
            }))
        }
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            txn.rollback().await?;
            Ok(ScanAttempt::Conflict)
        }
        Err(err) => Err(err.into()),
    }
}

/// Split `ATT:<student>:<token>` into its two payload fields: exactly three
/// colon-separated fields, the tag verbatim, both fields non-empty.
fn parse_payload(raw: &str) -> Option<(&str, &str)> {
    let mut parts = raw.split(':');
    let (tag, student, token) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    if tag != PAYLOAD_TAG || student.is_empty() || token.is_empty() {
        return None;
    }
    Some((student, token))
}
