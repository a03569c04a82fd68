use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum VpnPeers {
    Table,
    WgClientId,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Databases created after the control-plane integration already have
        // this column from the entity schema.
        if !manager.has_column("vpn_peers", "wg_client_id").await? {
            manager
                .alter_table(
                    Table::alter()
                        .table(VpnPeers::Table)
                        .add_column(ColumnDef::new(VpnPeers::WgClientId).string().null())
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if manager.has_column("vpn_peers", "wg_client_id").await? {
            manager
                .alter_table(
                    Table::alter()
                        .table(VpnPeers::Table)
                        .drop_column(VpnPeers::WgClientId)
                        .to_owned(),
                )
                .await?;
        }
        Ok(())
    }
}
