use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_orders_table::Migration),
            Box::new(m20240101_000002_create_line_items_table::Migration),
            Box::new(m20240101_000003_create_vendors_table::Migration),
            Box::new(m20240101_000004_create_withdrawal_requests_table::Migration),
            Box::new(m20240101_000005_create_webhook_events_table::Migration),
            Box::new(m20240101_000006_create_settlement_entries_table::Migration),
        ]
    }
}

mod m20240101_000001_create_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::PurchaseNumber).string().not_null())
                        .col(ColumnDef::new(Orders::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).text().not_null())
                        .col(ColumnDef::new(Orders::Subtotal).decimal().not_null())
                        .col(ColumnDef::new(Orders::ShippingAmount).decimal().not_null())
                        .col(ColumnDef::new(Orders::TaxAmount).decimal().not_null())
                        .col(ColumnDef::new(Orders::TotalAmount).decimal().not_null())
                        .col(ColumnDef::new(Orders::Currency).string().not_null())
                        .col(ColumnDef::new(Orders::PaymentSessionId).string().null())
                        .col(ColumnDef::new(Orders::ShippingAddress).string().null())
                        .col(ColumnDef::new(Orders::BillingAddress).string().null())
                        .col(ColumnDef::new(Orders::Notes).string().null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_purchase_number")
                        .table(Orders::Table)
                        .col(Orders::PurchaseNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_customer_id")
                        .table(Orders::Table)
                        .col(Orders::CustomerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Orders {
        Table,
        Id,
        PurchaseNumber,
        CustomerId,
        Status,
        Subtotal,
        ShippingAmount,
        TaxAmount,
        TotalAmount,
        Currency,
        PaymentSessionId,
        ShippingAddress,
        BillingAddress,
        Notes,
        CreatedAt,
        UpdatedAt,
        Version,
    }
}

mod m20240101_000002_create_line_items_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_line_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(LineItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(LineItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(LineItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(LineItems::VendorId).uuid().not_null())
                        .col(ColumnDef::new(LineItems::ProductName).string().not_null())
                        .col(ColumnDef::new(LineItems::Sku).string().not_null())
                        .col(ColumnDef::new(LineItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(LineItems::UnitPrice).decimal().not_null())
                        .col(ColumnDef::new(LineItems::LineTotal).decimal().not_null())
                        .col(ColumnDef::new(LineItems::Status).text().not_null())
                        .col(ColumnDef::new(LineItems::CourierReference).string().null())
                        .col(ColumnDef::new(LineItems::LastEventDesc).string().null())
                        .col(
                            ColumnDef::new(LineItems::LastEventAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(LineItems::HubName).string().null())
                        .col(ColumnDef::new(LineItems::RiderName).string().null())
                        .col(ColumnDef::new(LineItems::RiderCode).string().null())
                        .col(ColumnDef::new(LineItems::FailureReason).string().null())
                        .col(ColumnDef::new(LineItems::PodImage).string().null())
                        .col(
                            ColumnDef::new(LineItems::Settled)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(LineItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LineItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_line_items_order_id")
                        .table(LineItems::Table)
                        .col(LineItems::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_line_items_vendor_id")
                        .table(LineItems::Table)
                        .col(LineItems::VendorId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_line_items_courier_reference")
                        .table(LineItems::Table)
                        .col(LineItems::CourierReference)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(LineItems::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum LineItems {
        Table,
        Id,
        OrderId,
        VendorId,
        ProductName,
        Sku,
        Quantity,
        UnitPrice,
        LineTotal,
        Status,
        CourierReference,
        LastEventDesc,
        LastEventAt,
        HubName,
        RiderName,
        RiderCode,
        FailureReason,
        PodImage,
        Settled,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_vendors_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_vendors_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Vendors::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Vendors::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Vendors::DisplayName).string().not_null())
                        .col(ColumnDef::new(Vendors::Status).text().not_null())
                        .col(
                            ColumnDef::new(Vendors::TotalEarnings)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Vendors::AvailableWithdrawal)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Vendors::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Vendors::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Vendors::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Vendors {
        Table,
        Id,
        DisplayName,
        Status,
        TotalEarnings,
        AvailableWithdrawal,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_withdrawal_requests_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_withdrawal_requests_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(WithdrawalRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WithdrawalRequests::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(WithdrawalRequests::VendorId).uuid().not_null())
                        .col(
                            ColumnDef::new(WithdrawalRequests::BankReference)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(WithdrawalRequests::Amount).decimal().not_null())
                        .col(ColumnDef::new(WithdrawalRequests::Status).text().not_null())
                        .col(
                            ColumnDef::new(WithdrawalRequests::SettlementReference)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(WithdrawalRequests::InvoiceImage).string().null())
                        .col(ColumnDef::new(WithdrawalRequests::Note).string().null())
                        .col(
                            ColumnDef::new(WithdrawalRequests::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WithdrawalRequests::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_withdrawal_requests_vendor_id")
                        .table(WithdrawalRequests::Table)
                        .col(WithdrawalRequests::VendorId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WithdrawalRequests::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum WithdrawalRequests {
        Table,
        Id,
        VendorId,
        BankReference,
        Amount,
        Status,
        SettlementReference,
        InvoiceImage,
        Note,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000005_create_webhook_events_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_webhook_events_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(WebhookEvents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WebhookEvents::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(WebhookEvents::EventId).string().not_null())
                        .col(ColumnDef::new(WebhookEvents::Source).string().not_null())
                        .col(
                            ColumnDef::new(WebhookEvents::ReceivedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_webhook_events_event_id")
                        .table(WebhookEvents::Table)
                        .col(WebhookEvents::EventId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WebhookEvents::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum WebhookEvents {
        Table,
        Id,
        EventId,
        Source,
        ReceivedAt,
    }
}

mod m20240101_000006_create_settlement_entries_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_settlement_entries_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SettlementEntries::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SettlementEntries::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SettlementEntries::LineItemId).uuid().not_null())
                        .col(ColumnDef::new(SettlementEntries::OrderId).uuid().not_null())
                        .col(ColumnDef::new(SettlementEntries::VendorId).uuid().not_null())
                        .col(
                            ColumnDef::new(SettlementEntries::GrossAmount)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SettlementEntries::CommissionRate)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SettlementEntries::NetPayout)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SettlementEntries::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_settlement_entries_line_item_id")
                        .table(SettlementEntries::Table)
                        .col(SettlementEntries::LineItemId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_settlement_entries_vendor_id")
                        .table(SettlementEntries::Table)
                        .col(SettlementEntries::VendorId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SettlementEntries::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum SettlementEntries {
        Table,
        Id,
        LineItemId,
        OrderId,
        VendorId,
        GrossAmount,
        CommissionRate,
        NetPayout,
        CreatedAt,
    }
}
