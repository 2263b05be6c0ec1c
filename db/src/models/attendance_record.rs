use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, DatabaseConnection, PaginatorTrait, QueryOrder};
use serde::Serialize;

/// One student marked present in one session. The composite key is the
/// storage-level guarantee that a student can never be recorded twice for
/// the same session. Rows are never updated or deleted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "attendance_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub session_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub student_id: i64,

    /// The token the scan consumed; nulled if that slot row is ever removed.
    pub qr_token_id: Option<i64>,
    pub taken_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub device_info: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::attendance_session::Entity",
        from = "Column::SessionId",
        to = "super::attendance_session::Column::Id"
    )]
    Session,
    #[sea_orm(
        belongs_to = "super::student::Entity",
        from = "Column::StudentId",
        to = "super::student::Column::Id"
    )]
    Student,
    #[sea_orm(
        belongs_to = "super::qr_token::Entity",
        from = "Column::QrTokenId",
        to = "super::qr_token::Column::Id"
    )]
    QrToken,
}

impl Related<super::attendance_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
}

impl Related<super::qr_token::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::QrToken.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn exists_for<C>(db: &C, session_id: i64, student_id: i64) -> Result<bool, DbErr>
    where
        C: ConnectionTrait,
    {
        Ok(Entity::find_by_id((session_id, student_id))
            .one(db)
            .await?
            .is_some())
    }

    /// Records for one session in scan order, for the review page.
    pub async fn find_for_session(
        db: &DatabaseConnection,
        session_id: i64,
    ) -> Result<Vec<Self>, DbErr> {
        Entity::find()
            .filter(Column::SessionId.eq(session_id))
            .order_by_asc(Column::TakenAt)
            .all(db)
            .await
    }

    /// One student's history, newest first.
    pub async fn find_for_student(
        db: &DatabaseConnection,
        student_id: i64,
    ) -> Result<Vec<Self>, DbErr> {
        Entity::find()
            .filter(Column::StudentId.eq(student_id))
            .order_by_desc(Column::TakenAt)
            .all(db)
            .await
    }

    /// Head count shown on the scanner page.
    pub async fn count_for_session(db: &DatabaseConnection, session_id: i64) -> Result<u64, DbErr> {
        Entity::find()
            .filter(Column::SessionId.eq(session_id))
            .count(db)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{attendance_session, attendance_session::SessionType, student};
    use crate::test_utils::setup_test_db;
    use chrono::{Duration, TimeZone, Utc};
    use sea_orm::ActiveValue::Set;

    async fn seed(db: &DatabaseConnection) -> (student::Model, attendance_session::Model) {
        let s = student::Model::create(db, Some("STU20250001"), "Ann", "CS", 1, None)
            .await
            .unwrap();
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 8, 30, 0).unwrap();
        let sess = attendance_session::Model::create(
            db,
            "Week 3 Lecture",
            "COS301",
            SessionType::Lecture,
            None,
            start,
            start + Duration::minutes(50),
            true,
        )
        .await
        .unwrap();
        (s, sess)
    }

    #[tokio::test]
    async fn composite_key_rejects_a_second_record() {
        let db = setup_test_db().await;
        let (s, sess) = seed(&db).await;
        let taken_at = Utc.with_ymd_and_hms(2026, 3, 2, 8, 40, 0).unwrap();

        let record = ActiveModel {
            session_id: Set(sess.id),
            student_id: Set(s.id),
            qr_token_id: Set(None),
            taken_at: Set(taken_at),
            ip_address: Set(None),
            device_info: Set(None),
        };
        record.insert(&db).await.unwrap();

        let dup = ActiveModel {
            session_id: Set(sess.id),
            student_id: Set(s.id),
            qr_token_id: Set(None),
            taken_at: Set(taken_at + Duration::minutes(1)),
            ip_address: Set(None),
            device_info: Set(None),
        };
        let err = dup.insert(&db).await.unwrap_err();
        assert!(matches!(
            err.sql_err(),
            Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
        ));

        assert!(Model::exists_for(&db, sess.id, s.id).await.unwrap());
        assert_eq!(Model::count_for_session(&db, sess.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn student_history_is_newest_first() {
        let db = setup_test_db().await;
        let (s, first_sess) = seed(&db).await;
        let start = Utc.with_ymd_and_hms(2026, 3, 9, 8, 30, 0).unwrap();
        let later_sess = attendance_session::Model::create(
            &db,
            "Week 4 Lecture",
            "COS301",
            SessionType::Lecture,
            None,
            start,
            start + Duration::minutes(50),
            true,
        )
        .await
        .unwrap();

        for (sess_id, taken_at) in [
            (first_sess.id, Utc.with_ymd_and_hms(2026, 3, 2, 8, 40, 0).unwrap()),
            (later_sess.id, Utc.with_ymd_and_hms(2026, 3, 9, 8, 35, 0).unwrap()),
        ] {
            let record = ActiveModel {
                session_id: Set(sess_id),
                student_id: Set(s.id),
                qr_token_id: Set(None),
                taken_at: Set(taken_at),
                ip_address: Set(None),
                device_info: Set(None),
            };
            record.insert(&db).await.unwrap();
        }

        let history = Model::find_for_student(&db, s.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].session_id, later_sess.id);
        assert_eq!(history[1].session_id, first_sess.id);
    }
}
