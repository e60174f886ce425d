use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum VendorStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "suspended")]
    Suspended,
}

impl fmt::Display for VendorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VendorStatus::Pending => write!(f, "pending"),
            VendorStatus::Approved => write!(f, "approved"),
            VendorStatus::Suspended => write!(f, "suspended"),
        }
    }
}

/// Vendor balances. `total_earnings` and `available_withdrawal` are credited
/// only by the settlement ledger and debited only by withdrawal payment, both
/// through single-statement atomic updates.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vendors")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub display_name: String,
    pub status: VendorStatus,
    pub total_earnings: Decimal,
    pub available_withdrawal: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::line_item::Entity")]
    LineItems,
    #[sea_orm(has_many = "super::withdrawal_request::Entity")]
    WithdrawalRequests,
    #[sea_orm(has_many = "super::settlement_entry::Entity")]
    SettlementEntries,
}

impl Related<super::line_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LineItems.def()
    }
}

impl Related<super::withdrawal_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WithdrawalRequests.def()
    }
}

impl Related<super::settlement_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SettlementEntries.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();
        if insert {
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
        }
        if let ActiveValue::NotSet = active_model.updated_at {
            active_model.updated_at = Set(now);
        }
        Ok(active_model)
    }
}
