use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20240101_000001_create_orders_table::Migration)]
    }
}

// Migration implementations

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
            // Create orders table aligned with entities::order Model
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::OrderReference).string().not_null())
                        .col(ColumnDef::new(Orders::CustomerName).string().not_null())
                        .col(ColumnDef::new(Orders::CustomerEmail).string().not_null())
                        .col(ColumnDef::new(Orders::CustomerPhone).string().not_null())
                        .col(ColumnDef::new(Orders::UserId).uuid().null())
                        .col(ColumnDef::new(Orders::DeliveryMethod).string().not_null())
                        .col(ColumnDef::new(Orders::DeliveryAddress).json().null())
                        .col(ColumnDef::new(Orders::EventDate).date().not_null())
                        .col(ColumnDef::new(Orders::EventType).string().null())
                        .col(ColumnDef::new(Orders::SpecialInstructions).string().null())
                        .col(ColumnDef::new(Orders::Items).json().not_null())
                        .col(
                            ColumnDef::new(Orders::Subtotal)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::DeliveryFee)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Currency).string().not_null())
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(ColumnDef::new(Orders::PaymentStatus).string().not_null())
                        .col(
                            ColumnDef::new(Orders::PaymentAuthorizationUrl)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(Orders::PaymentAccessCode).string().null())
                        .col(ColumnDef::new(Orders::PaymentRawStatus).string().null())
                        .col(ColumnDef::new(Orders::PaidAt).timestamp().null())
                        .col(ColumnDef::new(Orders::StatusNote).string().null())
                        .col(
                            ColumnDef::new(Orders::ManualSettlement)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(Orders::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Orders::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            // Reference lookups must be unique; everything else is filter support
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_orders_order_reference")
                        .table(Orders::Table)
                        .col(Orders::OrderReference)
                        .unique()
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
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_user_id")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_created_at")
                        .table(Orders::Table)
                        .col(Orders::CreatedAt)
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

    #[derive(DeriveIden)]
    pub(crate) enum Orders {
        Table,
        Id,
        OrderReference,
        CustomerName,
        CustomerEmail,
        CustomerPhone,
        UserId,
        DeliveryMethod,
        DeliveryAddress,
        EventDate,
        EventType,
        SpecialInstructions,
        Items,
        Subtotal,
        DeliveryFee,
        TotalAmount,
        Currency,
        Status,
        PaymentStatus,
        PaymentAuthorizationUrl,
        PaymentAccessCode,
        PaymentRawStatus,
        PaidAt,
        StatusNote,
        ManualSettlement,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}
