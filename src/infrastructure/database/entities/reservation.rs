//! Reservation entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reservations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub reservation_id: Uuid,

    #[sea_orm(unique)]
    pub confirmation_code: String,

    pub slot_id: Uuid,

    #[sea_orm(nullable)]
    pub customer_id: Option<Uuid>,

    pub party_size: i32,

    /// WALKING or RIDING
    pub round_type: String,

    pub holes: i32,

    /// BOOKED or CANCELLED
    pub status: String,

    pub version: i64,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,

    #[sea_orm(nullable)]
    pub cancelled_at: Option<DateTimeUtc>,

    #[sea_orm(nullable)]
    pub created_by_call_id: Option<String>,

    #[sea_orm(nullable)]
    pub updated_by_call_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::slot::Entity",
        from = "Column::SlotId",
        to = "super::slot::Column::SlotId"
    )]
    Slot,
}

impl Related<super::slot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Slot.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
