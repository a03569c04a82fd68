use std::sync::Arc;

use crate::clients::wg_easy::{ControlPlane, WgEasyClient};
use crate::config::Config;
use crate::db::Store;
use crate::host::HostController;
use crate::services::{DefaultPeerService, PeerService};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub peer_service: Arc<dyn PeerService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let host = Arc::new(HostController::new(&config.wireguard));

        let control_plane: Option<Arc<dyn ControlPlane>> = if config.wg_easy.enabled {
            Some(Arc::new(WgEasyClient::new((&config.wg_easy).into())?))
        } else {
            None
        };

        let peer_service = Arc::new(DefaultPeerService::new(
            store.clone(),
            &config,
            host,
            control_plane,
        ));

        Ok(Self {
            config: Arc::new(config),
            store,
            peer_service,
        })
    }
}
