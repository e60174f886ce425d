use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// Per-vendor line item status, mirroring courier shipment progress.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum LineItemStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "in_transit")]
    InTransit,
    #[sea_orm(string_value = "delivery_failed")]
    DeliveryFailed,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "returned")]
    Returned,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl LineItemStatus {
    /// Goods left the courier network on the recipient side; cancelling the
    /// shipment is no longer possible.
    pub fn is_delivered_terminal(self) -> bool {
        matches!(self, LineItemStatus::Delivered | LineItemStatus::Returned)
    }
}

impl fmt::Display for LineItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineItemStatus::Pending => write!(f, "pending"),
            LineItemStatus::Shipped => write!(f, "shipped"),
            LineItemStatus::InTransit => write!(f, "in_transit"),
            LineItemStatus::DeliveryFailed => write!(f, "delivery_failed"),
            LineItemStatus::Delivered => write!(f, "delivered"),
            LineItemStatus::Returned => write!(f, "returned"),
            LineItemStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "line_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub vendor_id: Uuid,
    pub product_name: String,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    /// Always unit_price * quantity.
    pub line_total: Decimal,
    pub status: LineItemStatus,

    /// Courier correlation reference, set when the vendor group ships.
    pub courier_reference: Option<String>,

    // Shipment audit trail, written unconditionally by courier events.
    pub last_event_desc: Option<String>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub hub_name: Option<String>,
    pub rider_name: Option<String>,
    pub rider_code: Option<String>,
    pub failure_reason: Option<String>,
    pub pod_image: Option<String>,

    /// Set exactly once, by the settlement ledger.
    pub settled: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
    #[sea_orm(
        belongs_to = "super::vendor::Entity",
        from = "Column::VendorId",
        to = "super::vendor::Column::Id"
    )]
    Vendor,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
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
