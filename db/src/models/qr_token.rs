use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ConnectionTrait, Set};
use serde::Serialize;

/// A student's current scannable token. Each student owns exactly one row
/// (the slot); re-issuing overwrites it in place, so the latest token is the
/// only one the validator can ever match. Rows are never deleted on expiry.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "qr_tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub student_id: i64,
    /// Opaque token value, the third field of the scan payload.
    pub token: String,
    /// Full payload encoded into the QR image, `ATT:<student_number>:<token>`.
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::student::Entity",
        from = "Column::StudentId",
        to = "super::student::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Student,
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A token matches until it is consumed or past its expiry.
    /// `now == expires_at` still matches.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.consumed && now <= self.expires_at
    }

    /// Last-write-wins upsert of the student's token slot, in one statement.
    /// Whatever the slot held before is superseded, consumed or not.
    pub async fn upsert_for_student<C>(
        db: &C,
        student_id: i64,
        token: &str,
        code: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let active_model = ActiveModel {
            student_id: Set(student_id),
            token: Set(token.to_owned()),
            code: Set(code.to_owned()),
            created_at: Set(now),
            expires_at: Set(expires_at),
            consumed: Set(false),
            ..Default::default()
        };

        Entity::insert(active_model)
            .on_conflict(
                OnConflict::column(Column::StudentId)
                    .update_columns([
                        Column::Token,
                        Column::Code,
                        Column::CreatedAt,
                        Column::ExpiresAt,
                        Column::Consumed,
                    ])
                    .to_owned(),
            )
            .exec_with_returning(db)
            .await
    }

    /// The slot row for `(student, token value)`, regardless of consumed or
    /// expiry state. Freshness is the caller's judgement.
    pub async fn find_by_value<C>(
        db: &C,
        student_id: i64,
        token: &str,
    ) -> Result<Option<Self>, DbErr>
    where
        C: ConnectionTrait,
    {
        Entity::find()
            .filter(Column::StudentId.eq(student_id))
            .filter(Column::Token.eq(token))
            .one(db)
            .await
    }

    /// Compare-and-swap consume. Returns `false` when another scan flipped
    /// the flag first.
    pub async fn consume_if_unused<C>(db: &C, id: i64) -> Result<bool, DbErr>
    where
        C: ConnectionTrait,
    {
        let res = Entity::update_many()
            .col_expr(Column::Consumed, Expr::value(true))
            .filter(Column::Id.eq(id))
            .filter(Column::Consumed.eq(false))
            .exec(db)
            .await?;
        Ok(res.rows_affected == 1)
    }
}
