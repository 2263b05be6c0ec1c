use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::entity::prelude::*;
use sea_orm::{DatabaseConnection, QueryOrder};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A scannable attendance window tied to one course meeting.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "attendance_sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub title: String,
    pub course_code: String,
    pub session_type: SessionType,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Administrative kill switch; flipping it off ends scanning immediately
    /// regardless of the time window.
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Kind of meeting a session covers.
#[derive(
    Debug, Clone, PartialEq, EnumIter, DeriveActiveEnum, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "attendance_session_type")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SessionType {
    #[sea_orm(string_value = "lecture")]
    Lecture,

    #[sea_orm(string_value = "lab")]
    Lab,

    #[sea_orm(string_value = "tutorial")]
    Tutorial,

    #[sea_orm(string_value = "exam")]
    Exam,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::attendance_record::Entity")]
    Records,
}

impl Related<super::attendance_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Records.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Live means scannable at `now`: active and inside the time window,
    /// both endpoints inclusive.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active && self.start_time <= now && now <= self.end_time
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        db: &DatabaseConnection,
        title: &str,
        course_code: &str,
        session_type: SessionType,
        location: Option<&str>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        active: bool,
    ) -> Result<Self, DbErr> {
        let active_model = ActiveModel {
            id: NotSet,
            title: Set(title.to_owned()),
            course_code: Set(course_code.to_owned()),
            session_type: Set(session_type),
            location: Set(location.map(|l| l.to_owned())),
            start_time: Set(start_time),
            end_time: Set(end_time),
            active: Set(active),
            created_at: Set(Utc::now()),
        };
        active_model.insert(db).await
    }

    /// Sessions still open for scanning, soonest-ending first. Drives the
    /// dashboards listing where a student can currently be marked.
    pub async fn find_open(db: &DatabaseConnection, now: DateTime<Utc>) -> Result<Vec<Self>, DbErr> {
        Entity::find()
            .filter(Column::Active.eq(true))
            .filter(Column::EndTime.gte(now))
            .order_by_asc(Column::EndTime)
            .all(db)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_db;
    use chrono::{Duration, TimeZone, Utc};

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 8, 30, 0).unwrap();
        (start, start + Duration::minutes(50))
    }

    #[tokio::test]
    async fn liveness_covers_the_window_inclusively() {
        let db = setup_test_db().await;
        let (start, end) = window();
        let sess = Model::create(
            &db,
            "Week 3 Lecture",
            "COS301",
            SessionType::Lecture,
            Some("IT 4-4"),
            start,
            end,
            true,
        )
        .await
        .unwrap();

        assert!(sess.is_live(start));
        assert!(sess.is_live(end));
        assert!(!sess.is_live(start - Duration::seconds(1)));
        assert!(!sess.is_live(end + Duration::seconds(1)));
    }

    #[tokio::test]
    async fn inactive_sessions_are_never_live() {
        let db = setup_test_db().await;
        let (start, end) = window();
        let sess = Model::create(
            &db,
            "Cancelled Lab",
            "COS301",
            SessionType::Lab,
            None,
            start,
            end,
            false,
        )
        .await
        .unwrap();

        assert!(!sess.is_live(start + Duration::minutes(10)));
    }

    #[tokio::test]
    async fn find_open_skips_ended_and_inactive_sessions() {
        let db = setup_test_db().await;
        let (start, end) = window();

        let open = Model::create(
            &db,
            "Open",
            "COS301",
            SessionType::Lecture,
            None,
            start,
            end,
            true,
        )
        .await
        .unwrap();
        Model::create(
            &db,
            "Ended",
            "COS301",
            SessionType::Tutorial,
            None,
            start - Duration::days(1),
            end - Duration::days(1),
            true,
        )
        .await
        .unwrap();
        Model::create(
            &db,
            "Inactive",
            "COS301",
            SessionType::Exam,
            None,
            start,
            end,
            false,
        )
        .await
        .unwrap();

        let listed = Model::find_open(&db, start + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, open.id);
    }
}
