use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_users_table::Migration),
            Box::new(m20240101_000002_create_catalog_tables::Migration),
            Box::new(m20240101_000003_create_book_packs_tables::Migration),
            Box::new(m20240101_000004_create_orders_tables::Migration),
            Box::new(m20240101_000005_create_shipping_events_table::Migration),
        ]
    }
}

fn money(col: impl IntoIden) -> ColumnDef {
    ColumnDef::new(col).decimal_len(12, 2).not_null().to_owned()
}

fn audit_columns<T: IntoIden + Copy>(
    table: &mut TableCreateStatement,
    active: T,
    created_by: T,
    created_at: T,
    last_modified_by: T,
    updated_at: T,
) {
    table
        .col(
            ColumnDef::new(active)
                .boolean()
                .not_null()
                .default(true),
        )
        .col(ColumnDef::new(created_by).string_len(50).null())
        .col(
            ColumnDef::new(created_at)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .col(ColumnDef::new(last_modified_by).string_len(50).null())
        .col(
            ColumnDef::new(updated_at)
                .timestamp_with_time_zone()
                .not_null(),
        );
}

mod m20240101_000001_create_users_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Users::Login)
                                .string_len(50)
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Users::Email)
                                .string_len(254)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Users::FirstName).string_len(50).null())
                        .col(ColumnDef::new(Users::LastName).string_len(50).null())
                        .col(ColumnDef::new(Users::Phone).string_len(20).null())
                        .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                        .col(
                            ColumnDef::new(Users::Activated)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Users::Role).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Users::UpdatedAt)
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
                        .name("idx_users_created_at")
                        .table(Users::Table)
                        .col(Users::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Users {
        Table,
        Id,
        Login,
        Email,
        FirstName,
        LastName,
        Phone,
        PasswordHash,
        Activated,
        Role,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_catalog_tables {
    use super::{audit_columns, money};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let mut authors = Table::create();
            authors
                .table(Authors::Table)
                .if_not_exists()
                .col(ColumnDef::new(Authors::Id).uuid().primary_key().not_null())
                .col(ColumnDef::new(Authors::Name).string_len(255).not_null())
                .col(ColumnDef::new(Authors::Biography).text().null())
                .col(ColumnDef::new(Authors::ProfilePictureUrl).string().null());
            audit_columns(
                &mut authors,
                Authors::Active,
                Authors::CreatedBy,
                Authors::CreatedAt,
                Authors::LastModifiedBy,
                Authors::UpdatedAt,
            );
            manager.create_table(authors.to_owned()).await?;

            let mut tags = Table::create();
            tags.table(Tags::Table)
                .if_not_exists()
                .col(ColumnDef::new(Tags::Id).uuid().primary_key().not_null())
                .col(ColumnDef::new(Tags::NameEn).string_len(100).not_null())
                .col(ColumnDef::new(Tags::NameFr).string_len(100).not_null())
                .col(ColumnDef::new(Tags::TagType).string_len(20).not_null())
                .col(ColumnDef::new(Tags::ColorHex).string_len(7).null())
                .col(ColumnDef::new(Tags::ImageUrl).string().null());
            audit_columns(
                &mut tags,
                Tags::Active,
                Tags::CreatedBy,
                Tags::CreatedAt,
                Tags::LastModifiedBy,
                Tags::UpdatedAt,
            );
            manager.create_table(tags.to_owned()).await?;

            let mut books = Table::create();
            books
                .table(Books::Table)
                .if_not_exists()
                .col(ColumnDef::new(Books::Id).uuid().primary_key().not_null())
                .col(ColumnDef::new(Books::Title).string_len(255).not_null())
                .col(ColumnDef::new(Books::Description).text().null())
                .col(ColumnDef::new(Books::AuthorId).uuid().null())
                .col(&mut money(Books::Price))
                .col(ColumnDef::new(Books::OnSalePrice).decimal_len(12, 2).null())
                .col(
                    ColumnDef::new(Books::StockQuantity)
                        .integer()
                        .not_null()
                        .default(0),
                )
                .col(ColumnDef::new(Books::CoverImageUrl).string().null())
                .col(ColumnDef::new(Books::Language).string_len(2).not_null())
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_books_author_id")
                        .from(Books::Table, Books::AuthorId)
                        .to(Authors::Table, Authors::Id)
                        .on_delete(ForeignKeyAction::SetNull),
                );
            audit_columns(
                &mut books,
                Books::Active,
                Books::CreatedBy,
                Books::CreatedAt,
                Books::LastModifiedBy,
                Books::UpdatedAt,
            );
            manager.create_table(books.to_owned()).await?;

            manager
                .create_table(
                    Table::create()
                        .table(BookTags::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(BookTags::BookId).uuid().not_null())
                        .col(ColumnDef::new(BookTags::TagId).uuid().not_null())
                        .primary_key(
                            Index::create()
                                .col(BookTags::BookId)
                                .col(BookTags::TagId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_book_tags_book_id")
                                .from(BookTags::Table, BookTags::BookId)
                                .to(Books::Table, Books::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_book_tags_tag_id")
                                .from(BookTags::Table, BookTags::TagId)
                                .to(Tags::Table, Tags::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_books_author_id")
                        .table(Books::Table)
                        .col(Books::AuthorId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_books_stock_quantity")
                        .table(Books::Table)
                        .col(Books::StockQuantity)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BookTags::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Books::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Tags::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Authors::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden, Clone, Copy)]
    pub(super) enum Authors {
        Table,
        Id,
        Name,
        Biography,
        ProfilePictureUrl,
        Active,
        CreatedBy,
        CreatedAt,
        LastModifiedBy,
        UpdatedAt,
    }

    #[derive(DeriveIden, Clone, Copy)]
    pub(super) enum Tags {
        Table,
        Id,
        NameEn,
        NameFr,
        TagType,
        ColorHex,
        ImageUrl,
        Active,
        CreatedBy,
        CreatedAt,
        LastModifiedBy,
        UpdatedAt,
    }

    #[derive(DeriveIden, Clone, Copy)]
    pub(super) enum Books {
        Table,
        Id,
        Title,
        Description,
        AuthorId,
        Price,
        OnSalePrice,
        StockQuantity,
        CoverImageUrl,
        Language,
        Active,
        CreatedBy,
        CreatedAt,
        LastModifiedBy,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum BookTags {
        Table,
        BookId,
        TagId,
    }
}

mod m20240101_000003_create_book_packs_tables {
    use super::m20240101_000002_create_catalog_tables::Books;
    use super::{audit_columns, money};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_book_packs_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let mut packs = Table::create();
            packs
                .table(BookPacks::Table)
                .if_not_exists()
                .col(ColumnDef::new(BookPacks::Id).uuid().primary_key().not_null())
                .col(ColumnDef::new(BookPacks::Title).string_len(255).not_null())
                .col(ColumnDef::new(BookPacks::Description).text().null())
                .col(&mut money(BookPacks::Price))
                .col(ColumnDef::new(BookPacks::CoverImageUrl).string().null());
            audit_columns(
                &mut packs,
                BookPacks::Active,
                BookPacks::CreatedBy,
                BookPacks::CreatedAt,
                BookPacks::LastModifiedBy,
                BookPacks::UpdatedAt,
            );
            manager.create_table(packs.to_owned()).await?;

            manager
                .create_table(
                    Table::create()
                        .table(BookPackBooks::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(BookPackBooks::BookPackId).uuid().not_null())
                        .col(ColumnDef::new(BookPackBooks::BookId).uuid().not_null())
                        .primary_key(
                            Index::create()
                                .col(BookPackBooks::BookPackId)
                                .col(BookPackBooks::BookId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_book_pack_books_pack_id")
                                .from(BookPackBooks::Table, BookPackBooks::BookPackId)
                                .to(BookPacks::Table, BookPacks::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_book_pack_books_book_id")
                                .from(BookPackBooks::Table, BookPackBooks::BookId)
                                .to(Books::Table, Books::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BookPackBooks::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(BookPacks::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden, Clone, Copy)]
    enum BookPacks {
        Table,
        Id,
        Title,
        Description,
        Price,
        CoverImageUrl,
        Active,
        CreatedBy,
        CreatedAt,
        LastModifiedBy,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum BookPackBooks {
        Table,
        BookPackId,
        BookId,
    }
}

mod m20240101_000004_create_orders_tables {
    use super::m20240101_000001_create_users_table::Users;
    use super::{audit_columns, money};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_orders_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let mut orders = Table::create();
            orders
                .table(Orders::Table)
                .if_not_exists()
                .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                .col(
                    ColumnDef::new(Orders::UniqueId)
                        .string_len(20)
                        .not_null()
                        .unique_key(),
                )
                .col(ColumnDef::new(Orders::UserId).uuid().null())
                .col(ColumnDef::new(Orders::FullName).string_len(255).not_null())
                .col(ColumnDef::new(Orders::Phone).string_len(20).not_null())
                .col(ColumnDef::new(Orders::Email).string_len(254).null())
                .col(ColumnDef::new(Orders::Wilaya).string_len(100).not_null())
                .col(ColumnDef::new(Orders::City).string_len(100).not_null())
                .col(ColumnDef::new(Orders::StreetAddress).string().not_null())
                .col(ColumnDef::new(Orders::ShippingMethod).string_len(20).not_null())
                .col(ColumnDef::new(Orders::StopdeskId).string_len(50).null())
                .col(
                    ColumnDef::new(Orders::ShippingProvider)
                        .string_len(20)
                        .not_null(),
                )
                .col(ColumnDef::new(Orders::TrackingNumber).string_len(100).null())
                .col(&mut money(Orders::DeliveryFee))
                .col(&mut money(Orders::Subtotal))
                .col(&mut money(Orders::TotalAmount))
                .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_orders_user_id")
                        .from(Orders::Table, Orders::UserId)
                        .to(Users::Table, Users::Id)
                        .on_delete(ForeignKeyAction::SetNull),
                );
            audit_columns(
                &mut orders,
                Orders::Active,
                Orders::CreatedBy,
                Orders::CreatedAt,
                Orders::LastModifiedBy,
                Orders::UpdatedAt,
            );
            manager.create_table(orders.to_owned()).await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ItemType).string_len(10).not_null())
                        .col(ColumnDef::new(OrderItems::BookId).uuid().null())
                        .col(ColumnDef::new(OrderItems::BookPackId).uuid().null())
                        .col(ColumnDef::new(OrderItems::Title).string_len(255).not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(&mut money(OrderItems::UnitPrice))
                        .col(&mut money(OrderItems::TotalPrice))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order_id")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            for (name, col) in [
                ("idx_orders_status", Orders::Status),
                ("idx_orders_created_at", Orders::CreatedAt),
                ("idx_orders_user_id", Orders::UserId),
                ("idx_orders_tracking_number", Orders::TrackingNumber),
            ] {
                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name(name)
                            .table(Orders::Table)
                            .col(col)
                            .to_owned(),
                    )
                    .await?;
            }

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden, Clone, Copy)]
    enum Orders {
        Table,
        Id,
        UniqueId,
        UserId,
        FullName,
        Phone,
        Email,
        Wilaya,
        City,
        StreetAddress,
        ShippingMethod,
        StopdeskId,
        ShippingProvider,
        TrackingNumber,
        DeliveryFee,
        Subtotal,
        TotalAmount,
        Status,
        Active,
        CreatedBy,
        CreatedAt,
        LastModifiedBy,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        ItemType,
        BookId,
        BookPackId,
        Title,
        Quantity,
        UnitPrice,
        TotalPrice,
    }
}

mod m20240101_000005_create_shipping_events_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_shipping_events_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ShippingEvents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ShippingEvents::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ShippingEvents::EventId)
                                .string_len(100)
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(ShippingEvents::EventType)
                                .string_len(50)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ShippingEvents::TrackingNumber)
                                .string_len(100)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ShippingEvents::CarrierStatus)
                                .string_len(100)
                                .null(),
                        )
                        .col(ColumnDef::new(ShippingEvents::OrderId).uuid().null())
                        .col(
                            ColumnDef::new(ShippingEvents::Outcome)
                                .string_len(30)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ShippingEvents::OccurredAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ShippingEvents::ReceivedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ShippingEvents::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ShippingEvents {
        Table,
        Id,
        EventId,
        EventType,
        TrackingNumber,
        CarrierStatus,
        OrderId,
        Outcome,
        OccurredAt,
        ReceivedAt,
    }
}
