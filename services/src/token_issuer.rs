use chrono::{DateTime, Duration, Utc};
use db::models::{qr_token, student};
use rand::RngCore;
use sea_orm::DatabaseConnection;
use sha2::{Digest, Sha256};

use crate::service::ServiceError;

/// Default validity window for an issued token.
pub const DEFAULT_TOKEN_TTL_SECONDS: i64 = 30;

/// Scan payload tag; the validator rejects anything not carrying it.
pub const PAYLOAD_TAG: &str = "ATT";

/// TTL from configuration (`TOKEN_TTL_SECONDS`), falling back to the default.
pub fn configured_ttl() -> Duration {
    Duration::seconds(common::config::Config::init(".env").token_ttl_seconds)
}

/// Issue a fresh token for `student`, superseding whatever the student's
/// slot held before. The returned row carries the full scan payload (`code`)
/// and `expires_at` for the polling client, which is expected to call again
/// before the window elapses.
pub async fn issue(
    db: &DatabaseConnection,
    student: &student::Model,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<qr_token::Model, ServiceError> {
    let token = generate_token_value(&student.student_number, now);
    let code = format!("{PAYLOAD_TAG}:{}:{token}", student.student_number);

    let row = qr_token::Model::upsert_for_student(
        db,
        student.id,
        &token,
        &code,
        now,
        now + ttl,
    )
    .await?;

    log::debug!(
        "issued token for {} expiring {}",
        student.student_number,
        row.expires_at
    );
    Ok(row)
}

/// Hash of (student number, issue instant, fresh entropy), truncated to ten
/// hex characters. Unique among unexpired tokens and not guessable in a
/// single attempt inside the TTL window; nothing stronger is claimed.
fn generate_token_value(student_number: &str, now: DateTime<Utc>) -> String {
    let mut entropy = [0u8; 16];
    rand::rng().fill_bytes(&mut entropy);

    let mut hasher = Sha256::new();
    hasher.update(student_number.as_bytes());
    hasher.update(now.timestamp_micros().to_be_bytes());
    hasher.update(entropy);
    let digest = hasher.finalize();

    hex::encode(digest)[..10].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::models::qr_token::Entity as QrTokenEntity;
    use db::models::qr_token::Column as QrTokenColumn;
    use db::test_utils::setup_test_db;
    use chrono::TimeZone;
    use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

    async fn seed_student(db: &DatabaseConnection) -> student::Model {
        student::Model::create(
            db,
            Some("STU20250001"),
            "Thandi Mokoena",
            "Computer Science",
            2,
            None,
        )
        .await
        .unwrap()
    }

    fn ttl() -> Duration {
        Duration::seconds(DEFAULT_TOKEN_TTL_SECONDS)
    }

    #[tokio::test]
    async fn issue_fills_the_slot_with_a_well_formed_payload() {
        let db = setup_test_db().await;
        let s = seed_student(&db).await;
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

        let issued = issue(&db, &s, now, ttl()).await.unwrap();

        assert_eq!(issued.student_id, s.id);
        assert_eq!(issued.token.len(), 10);
        assert_eq!(issued.code, format!("ATT:STU20250001:{}", issued.token));
        assert_eq!(issued.expires_at, now + Duration::seconds(30));
        assert!(!issued.consumed);
    }

    #[tokio::test]
    async fn reissue_leaves_one_current_token_per_student() {
        let db = setup_test_db().await;
        let s = seed_student(&db).await;
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

        let first = issue(&db, &s, now, ttl()).await.unwrap();
        let second = issue(&db, &s, now + Duration::seconds(5), ttl())
            .await
            .unwrap();

        assert_ne!(first.token, second.token);

        // One row total, and it is the fresh one.
        let unconsumed = QrTokenEntity::find()
            .filter(QrTokenColumn::StudentId.eq(s.id))
            .filter(QrTokenColumn::Consumed.eq(false))
            .all(&db)
            .await
            .unwrap();
        assert_eq!(unconsumed.len(), 1);
        assert_eq!(unconsumed[0].token, second.token);
        assert_eq!(QrTokenEntity::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reissue_resets_a_consumed_slot() {
        let db = setup_test_db().await;
        let s = seed_student(&db).await;
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

        let first = issue(&db, &s, now, ttl()).await.unwrap();
        assert!(
            qr_token::Model::consume_if_unused(&db, first.id)
                .await
                .unwrap()
        );

        let second = issue(&db, &s, now + Duration::seconds(40), ttl())
            .await
            .unwrap();
        assert!(!second.consumed);
        assert!(second.is_valid(now + Duration::seconds(40)));
    }

    #[tokio::test]
    async fn token_values_do_not_repeat_across_issues() {
        let db = setup_test_db().await;
        let s = seed_student(&db).await;
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

        let mut seen = std::collections::HashSet::new();
        for i in 0..20 {
            let issued = issue(&db, &s, now + Duration::seconds(i), ttl())
                .await
                .unwrap();
            assert!(seen.insert(issued.token), "token value repeated");
        }
    }
}
