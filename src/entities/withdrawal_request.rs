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
pub enum WithdrawalStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "paid")]
    Paid,
}

impl WithdrawalStatus {
    /// A paid request is immutable; a rejected one may be re-approved.
    pub fn can_transition_to(self, next: WithdrawalStatus) -> bool {
        use WithdrawalStatus::*;
        match (self, next) {
            (Pending, Approved) | (Rejected, Approved) => true,
            (Pending, Rejected) | (Approved, Rejected) => true,
            (Approved, Paid) => true,
            _ => false,
        }
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WithdrawalStatus::Pending => write!(f, "pending"),
            WithdrawalStatus::Approved => write!(f, "approved"),
            WithdrawalStatus::Rejected => write!(f, "rejected"),
            WithdrawalStatus::Paid => write!(f, "paid"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "withdrawal_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub bank_reference: String,
    pub amount: Decimal,
    pub status: WithdrawalStatus,
    /// Transaction id supplied by the admin when the payout is made.
    pub settlement_reference: Option<String>,
    pub invoice_image: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::vendor::Entity",
        from = "Column::VendorId",
        to = "super::vendor::Column::Id"
    )]
    Vendor,
}

impl Related<super::vendor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vendor.def()
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

#[cfg(test)]
mod tests {
    use super::WithdrawalStatus::*;

    #[test]
    fn paid_is_immutable() {
        for next in [Pending, Approved, Rejected, Paid] {
            assert!(!Paid.can_transition_to(next));
        }
    }

    #[test]
    fn rejected_can_be_reapproved() {
        assert!(Rejected.can_transition_to(Approved));
        assert!(!Rejected.can_transition_to(Paid));
    }

    #[test]
    fn only_approved_can_be_paid() {
        assert!(Approved.can_transition_to(Paid));
        assert!(!Pending.can_transition_to(Paid));
    }
}
