use sea_orm_migration::prelude::*;

mod m20250912_initial;
mod m20250918_add_wg_client_id;
mod m20250928_add_config_encrypted;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250912_initial::Migration),
            Box::new(m20250918_add_wg_client_id::Migration),
            Box::new(m20250928_add_config_encrypted::Migration),
        ]
    }
}
