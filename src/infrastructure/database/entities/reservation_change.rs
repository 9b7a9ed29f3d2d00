//! Audit trail entity. Rows are only ever inserted.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reservation_changes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub seq: i32,

    #[sea_orm(unique)]
    pub change_id: Uuid,

    pub reservation_id: Uuid,

    /// CREATE, UPDATE_TIME, UPDATE_PARTY_SIZE, UPDATE_TYPE, CANCEL
    pub change_type: String,

    /// JSON array of field names
    pub changed_fields: String,

    #[sea_orm(unique)]
    pub idempotency_key: String,

    pub request_fingerprint: String,

    #[sea_orm(nullable)]
    pub call_id: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub before_state: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub after_state: String,

    #[sea_orm(nullable)]
    pub prev_hash: Option<String>,

    pub entry_hash: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::reservation::Entity",
        from = "Column::ReservationId",
        to = "super::reservation::Column::ReservationId"
    )]
    Reservation,
}

impl Related<super::reservation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reservation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
