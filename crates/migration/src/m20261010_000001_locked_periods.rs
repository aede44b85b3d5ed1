use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Users {
    Table,
    Username,
}

#[derive(Iden)]
enum LockedPeriods {
    Table,
    OwnerId,
    Period,
    LockedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LockedPeriods::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(LockedPeriods::OwnerId).string().not_null())
                    .col(ColumnDef::new(LockedPeriods::Period).string().not_null())
                    .col(
                        ColumnDef::new(LockedPeriods::LockedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(LockedPeriods::OwnerId)
                            .col(LockedPeriods::Period),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-locked_periods-owner_id")
                            .from(LockedPeriods::Table, LockedPeriods::OwnerId)
                            .to(Users::Table, Users::Username)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LockedPeriods::Table).to_owned())
            .await?;

        Ok(())
    }
}
