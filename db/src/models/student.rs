use chrono::{DateTime, Datelike, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::entity::prelude::*;
use sea_orm::{DatabaseConnection, QueryOrder};
use serde::Serialize;

/// A registered student able to present QR attendance tokens.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "students")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Unique student number, e.g. `STU20260001`. This is the identity
    /// carried inside scan payloads.
    pub student_number: String,
    pub full_name: String,
    pub department: String,
    pub year: i32,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::qr_token::Entity")]
    QrTokens,
    #[sea_orm(has_many = "super::attendance_record::Entity")]
    AttendanceRecords,
}

impl Related<super::qr_token::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::QrTokens.def()
    }
}

impl Related<super::attendance_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AttendanceRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Create a student. When `student_number` is `None`, the next number in
    /// this year's `STU{year}{seq:04}` sequence is assigned.
    pub async fn create(
        db: &DatabaseConnection,
        student_number: Option<&str>,
        full_name: &str,
        department: &str,
        year: i32,
        phone: Option<&str>,
    ) -> Result<Self, DbErr> {
        let number = match student_number {
            Some(n) => n.to_owned(),
            None => Self::next_student_number(db, Utc::now().year()).await?,
        };

        let active_model = ActiveModel {
            id: NotSet,
            student_number: Set(number),
            full_name: Set(full_name.to_owned()),
            department: Set(department.to_owned()),
            year: Set(year),
            phone: Set(phone.map(|p| p.to_owned())),
            created_at: Set(Utc::now()),
        };
        active_model.insert(db).await
    }

    /// Next free number in the `STU{year}{seq:04}` sequence. The sequence
    /// restarts at 0001 each calendar year.
    pub async fn next_student_number(db: &DatabaseConnection, year: i32) -> Result<String, DbErr> {
        let prefix = format!("STU{year}");
        let last = Entity::find()
            .filter(Column::StudentNumber.starts_with(&prefix))
            .order_by_desc(Column::StudentNumber)
            .one(db)
            .await?;

        let next = match last {
            Some(s) => s.student_number[prefix.len()..].parse::<u32>().unwrap_or(0) + 1,
            None => 1,
        };
        Ok(format!("{prefix}{next:04}"))
    }

    pub async fn find_by_student_number(
        db: &DatabaseConnection,
        student_number: &str,
    ) -> Result<Option<Self>, DbErr> {
        Entity::find()
            .filter(Column::StudentNumber.eq(student_number))
            .one(db)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_db;

    #[tokio::test]
    async fn student_numbers_follow_the_yearly_sequence() {
        let db = setup_test_db().await;

        let first = Model::create(&db, None, "Thandi Mokoena", "Computer Science", 2, None)
            .await
            .unwrap();
        let second = Model::create(&db, None, "Pieter van Wyk", "Informatics", 1, None)
            .await
            .unwrap();

        let year = Utc::now().year();
        assert_eq!(first.student_number, format!("STU{year}0001"));
        assert_eq!(second.student_number, format!("STU{year}0002"));
    }

    #[tokio::test]
    async fn explicit_student_numbers_are_kept_verbatim() {
        let db = setup_test_db().await;

        let s = Model::create(
            &db,
            Some("STU20250001"),
            "Lerato Dlamini",
            "Computer Science",
            3,
            Some("0821234567"),
        )
        .await
        .unwrap();

        assert_eq!(s.student_number, "STU20250001");
        let found = Model::find_by_student_number(&db, "STU20250001")
            .await
            .unwrap();
        assert_eq!(found, Some(s));
    }
}
