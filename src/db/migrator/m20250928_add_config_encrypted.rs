use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum VpnPeers {
    Table,
    WgConfigEncrypted,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if !manager
            .has_column("vpn_peers", "wg_config_encrypted")
            .await?
        {
            manager
                .alter_table(
                    Table::alter()
                        .table(VpnPeers::Table)
                        .add_column(ColumnDef::new(VpnPeers::WgConfigEncrypted).text().null())
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if manager
            .has_column("vpn_peers", "wg_config_encrypted")
            .await?
        {
            manager
                .alter_table(
                    Table::alter()
                        .table(VpnPeers::Table)
                        .drop_column(VpnPeers::WgConfigEncrypted)
                        .to_owned(),
                )
                .await?;
        }
        Ok(())
    }
}
