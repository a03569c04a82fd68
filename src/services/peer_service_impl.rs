//! Default implementation of the [`PeerService`] trait.
//!
//! Provisioning spans the database, the WireGuard host, and optionally the
//! wg-easy control-plane. The database write is the authoritative step:
//! anything after it (host apply, config attach) is best-effort, and a
//! failed write after a control-plane client was created triggers a
//! compensating remote deletion before the error propagates.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clients::wg_easy::ControlPlane;
use crate::config::{Config, KeyPolicy, WireguardConfig};
use crate::crypto::SecretBox;
use crate::db::repositories::peer::is_unique_violation;
use crate::db::{NewPeer, Store};
use crate::host::HostControl;
use crate::services::peer_service::{
    CreatePeerRequest, CurrentUser, KeyMaterial, PeerError, PeerRecord, PeerService,
    UpdatePeerRequest,
};
use crate::wireguard::{allocate_address, build_config, generate_keypair, parse_config};

/// Marker stored when the control-plane manages the private key and the
/// fetched config did not expose it.
const MANAGED_KEY_MARKER: &str = "managed-by-wg-easy";

pub struct DefaultPeerService {
    store: Store,
    wireguard: WireguardConfig,
    host: Arc<dyn HostControl>,
    control_plane: Option<Arc<dyn ControlPlane>>,
    secret_box: Option<SecretBox>,
}

impl DefaultPeerService {
    #[must_use]
    pub fn new(
        store: Store,
        config: &Config,
        host: Arc<dyn HostControl>,
        control_plane: Option<Arc<dyn ControlPlane>>,
    ) -> Self {
        let secret_box = config
            .security
            .config_encryption_key
            .as_deref()
            .and_then(|key| match SecretBox::new(key) {
                Ok(sb) => Some(sb),
                Err(e) => {
                    warn!(error = %e, "Invalid config encryption key; config storage disabled");
                    None
                }
            });

        Self {
            store,
            wireguard: config.wireguard.clone(),
            host,
            control_plane,
            secret_box,
        }
    }

    fn authorize(requester: &CurrentUser, target_user_id: i32) -> Result<(), PeerError> {
        if requester.is_admin || requester.id == target_user_id {
            Ok(())
        } else {
            Err(PeerError::Forbidden)
        }
    }

    async fn require_subscription(&self, user_id: i32) -> Result<(), PeerError> {
        if self.store.users().has_active_subscription(user_id).await? {
            Ok(())
        } else {
            Err(PeerError::SubscriptionRequired)
        }
    }

    fn db_material(supplied_public_key: Option<&str>) -> KeyMaterial {
        let pair = generate_keypair();
        let public_key = supplied_public_key
            .filter(|k| !k.is_empty())
            .map_or(pair.public_key, ToString::to_string);

        KeyMaterial {
            private_key: pair.private_key,
            public_key,
            ..KeyMaterial::default()
        }
    }

    async fn host_material(
        &self,
        target_user_id: i32,
        supplied_public_key: Option<&str>,
    ) -> KeyMaterial {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let base_name = format!("user{target_user_id}-{}", &suffix[..8]);

        match self.host.generate_key_on_host(&base_name).await {
            Some(material) => KeyMaterial {
                // The private key stays on the host; persist its path as an
                // opaque reference.
                private_key: material.private_key_path,
                public_key: material.public_key,
                ..KeyMaterial::default()
            },
            None => {
                warn!("Host key generation unavailable; falling back to local generation");
                Self::db_material(supplied_public_key)
            }
        }
    }

    async fn wg_easy_material(
        &self,
        target_user_id: i32,
        device_name: Option<&str>,
    ) -> Result<KeyMaterial, PeerError> {
        let Some(control_plane) = &self.control_plane else {
            return Err(PeerError::Upstream(
                "wg-easy control plane is not configured".to_string(),
            ));
        };

        let name = device_name
            .filter(|n| !n.is_empty())
            .map_or_else(
                || {
                    let suffix = uuid::Uuid::new_v4().simple().to_string();
                    format!("peer-{target_user_id}-{}", &suffix[..8])
                },
                ToString::to_string,
            );

        // A failed create is fatal: nothing exists remotely, nothing is
        // persisted locally.
        let created = control_plane
            .create_client(&name)
            .await
            .map_err(|e| PeerError::Upstream(format!("{e:#}")))?;

        let Some(public_key) = created.public_key.filter(|k| !k.is_empty()) else {
            warn!(client_id = %created.id, "wg-easy returned no public key; deleting client");
            if let Err(e) = control_plane.delete_client(&created.id).await {
                warn!(error = %e, "Failed to delete half-created wg-easy client");
            }
            return Err(PeerError::Upstream(
                "wg-easy returned no public key for created client".to_string(),
            ));
        };

        let mut material = KeyMaterial {
            private_key: MANAGED_KEY_MARKER.to_string(),
            public_key,
            external_client_id: Some(created.id.clone()),
            ..KeyMaterial::default()
        };

        // Config retrieval is not fatal; the peer keeps the managed-key
        // marker when the document cannot be fetched or parsed.
        match control_plane.get_client_config(&created.id).await {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                let parsed = parse_config(&text);
                if let Some(private_key) = parsed.private_key() {
                    material.private_key = private_key.to_string();
                }
                material.address = parsed.address().map(ToString::to_string);
                material.allowed_ips = parsed.allowed_ips().map(ToString::to_string);
                material.config_text = Some(text);
            }
            Err(e) => {
                warn!(client_id = %created.id, error = %e, "Failed to fetch wg-easy client config");
            }
        }

        Ok(material)
    }

    async fn provision(
        &self,
        target_user_id: i32,
        request: CreatePeerRequest,
    ) -> Result<PeerRecord, PeerError> {
        let material = match self.wireguard.key_policy {
            KeyPolicy::Db => Self::db_material(request.wg_public_key.as_deref()),
            KeyPolicy::Host => {
                self.host_material(target_user_id, request.wg_public_key.as_deref())
                    .await
            }
            KeyPolicy::WgEasy => {
                self.wg_easy_material(target_user_id, request.device_name.as_deref())
                    .await?
            }
        };

        if material.private_key.is_empty() {
            return Err(PeerError::Internal(
                "provisioning produced no private key".to_string(),
            ));
        }

        // Caller-supplied values win over control-plane metadata; the
        // deterministic allocator is the last resort.
        let wg_ip = request
            .wg_ip
            .filter(|ip| !ip.is_empty())
            .or_else(|| material.address.clone())
            .or_else(|| allocate_address(&self.wireguard.subnet, target_user_id))
            .ok_or_else(|| PeerError::Internal("address allocation failed".to_string()))?;

        let allowed_ips = request
            .allowed_ips
            .filter(|ips| !ips.is_empty())
            .or_else(|| material.allowed_ips.clone());

        let new_peer = NewPeer {
            user_id: target_user_id,
            wg_private_key: material.private_key.clone(),
            wg_public_key: material.public_key.clone(),
            wg_client_id: material.external_client_id.clone(),
            wg_ip,
            allowed_ips,
        };

        let model = match self.store.peers().create(new_peer).await {
            Ok(model) => model,
            Err(err) => {
                self.compensate_remote_create(material.external_client_id.as_deref())
                    .await;
                if is_unique_violation(&err) {
                    return Err(PeerError::Conflict(
                        "public key or address already in use".to_string(),
                    ));
                }
                return Err(err.into());
            }
        };

        info!(
            peer_id = model.id,
            user_id = target_user_id,
            policy = ?self.wireguard.key_policy,
            "VPN peer created"
        );

        let applied = self
            .host
            .apply_peer(
                &model.wg_public_key,
                model.allowed_ips.as_deref().unwrap_or(""),
            )
            .await;
        debug!(peer_id = model.id, applied, "Host apply finished");

        if let Err(e) = self.attach_config(&model, material.config_text.as_deref()).await {
            warn!(peer_id = model.id, error = %e, "Failed to attach encrypted config");
        }

        if let Some(control_plane) = &self.control_plane
            && material.external_client_id.is_some()
        {
            control_plane.release().await;
        }

        let private_key =
            (model.wg_private_key != MANAGED_KEY_MARKER).then(|| model.wg_private_key.clone());
        Ok(PeerRecord::with_private_key(model, private_key))
    }

    /// Undo a control-plane client creation after a failed local write.
    /// Best-effort; the persistence error is what the caller sees.
    async fn compensate_remote_create(&self, client_id: Option<&str>) {
        let Some(client_id) = client_id else { return };
        let Some(control_plane) = &self.control_plane else {
            return;
        };

        match control_plane.delete_client(client_id).await {
            Ok(()) => info!(client_id = %client_id, "Compensating wg-easy deletion succeeded"),
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "Compensating wg-easy deletion failed");
            }
        }
        control_plane.release().await;
    }

    /// Encrypt and store the client config on the freshly created row.
    /// Runs as its own write so a failure here never unwinds the peer.
    async fn attach_config(
        &self,
        model: &crate::entities::vpn_peers::Model,
        fetched_config: Option<&str>,
    ) -> anyhow::Result<()> {
        let Some(secret_box) = &self.secret_box else {
            anyhow::bail!("config encryption key not configured");
        };

        let text = fetched_config.map_or_else(
            || {
                build_config(
                    &model.wg_private_key,
                    &model.wg_ip,
                    model.allowed_ips.as_deref().unwrap_or("0.0.0.0/0"),
                    &self.wireguard.server_public_key,
                    &self.wireguard.endpoint,
                    &self.wireguard.dns,
                )
            },
            ToString::to_string,
        );

        let token = secret_box.encrypt(&text)?;
        self.store
            .peers()
            .attach_encrypted_config(model.id, token)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PeerService for DefaultPeerService {
    async fn create_peer(
        &self,
        requester: &CurrentUser,
        request: CreatePeerRequest,
    ) -> Result<PeerRecord, PeerError> {
        let target_user_id = request.user_id.unwrap_or(requester.id);
        Self::authorize(requester, target_user_id)?;
        self.provision(target_user_id, request).await
    }

    async fn create_peer_self(
        &self,
        requester: &CurrentUser,
        mut request: CreatePeerRequest,
    ) -> Result<PeerRecord, PeerError> {
        request.user_id = Some(requester.id);
        self.require_subscription(requester.id).await?;
        self.provision(requester.id, request).await
    }

    async fn list_peers(
        &self,
        requester: &CurrentUser,
        user_id: Option<i32>,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<PeerRecord>, PeerError> {
        let scope = match user_id {
            Some(user_id) => {
                Self::authorize(requester, user_id)?;
                Some(user_id)
            }
            None if requester.is_admin => None,
            None => Some(requester.id),
        };

        let peers = self.store.peers().list(scope, skip, limit).await?;
        Ok(peers.into_iter().map(PeerRecord::scrubbed).collect())
    }

    async fn get_peer(&self, requester: &CurrentUser, id: i32) -> Result<PeerRecord, PeerError> {
        let peer = self.store.peers().get(id).await?.ok_or(PeerError::NotFound)?;
        Self::authorize(requester, peer.user_id)?;
        Ok(PeerRecord::scrubbed(peer))
    }

    async fn update_peer(
        &self,
        requester: &CurrentUser,
        id: i32,
        request: UpdatePeerRequest,
    ) -> Result<PeerRecord, PeerError> {
        let peer = self.store.peers().get(id).await?.ok_or(PeerError::NotFound)?;
        Self::authorize(requester, peer.user_id)?;

        let wg_public_key = request
            .wg_public_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PeerError::Validation("wg_public_key is required".to_string()))?;
        let wg_ip = request
            .wg_ip
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| PeerError::Validation("wg_ip is required".to_string()))?;

        let updated = self
            .store
            .peers()
            .update_fields(id, wg_public_key, wg_ip, request.allowed_ips)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    PeerError::Conflict("public key or address already in use".to_string())
                } else {
                    err.into()
                }
            })?
            .ok_or(PeerError::NotFound)?;

        Ok(PeerRecord::scrubbed(updated))
    }

    async fn delete_peer(&self, requester: &CurrentUser, id: i32) -> Result<(), PeerError> {
        let peer = self.store.peers().get(id).await?.ok_or(PeerError::NotFound)?;
        Self::authorize(requester, peer.user_id)?;

        self.store.peers().delete(id).await?;
        info!(peer_id = id, user_id = peer.user_id, "VPN peer deleted");

        // The row is gone; host and control-plane cleanup are best-effort.
        let removed = self.host.remove_peer(&peer.wg_public_key).await;
        debug!(peer_id = id, removed, "Host remove finished");

        if let Some(client_id) = &peer.wg_client_id {
            if let Some(control_plane) = &self.control_plane {
                if let Err(e) = control_plane.delete_client(client_id).await {
                    warn!(client_id = %client_id, error = %e, "wg-easy client deletion failed");
                }
                control_plane.release().await;
            } else {
                warn!(
                    client_id = %client_id,
                    "Peer has a wg-easy client id but no control plane is configured"
                );
            }
        }

        Ok(())
    }

    async fn self_config(&self, requester: &CurrentUser) -> Result<String, PeerError> {
        // Gate on subscription before touching the peer table.
        self.require_subscription(requester.id).await?;

        let peer = self
            .store
            .peers()
            .latest_active_for_user(requester.id)
            .await?
            .ok_or(PeerError::NotFound)?;

        let token = peer.wg_config_encrypted.ok_or(PeerError::NotFound)?;

        let Some(secret_box) = &self.secret_box else {
            return Err(PeerError::Internal(
                "config encryption key not configured".to_string(),
            ));
        };

        secret_box.decrypt(&token).ok_or(PeerError::Decryption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::wg_easy::CreatedClient;
    use crate::config::Config;
    use crate::host::HostKeyMaterial;
    use sea_orm::{ActiveModelTrait, Set};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockHost {
        applies: Mutex<Vec<String>>,
        removes: Mutex<Vec<String>>,
        key_material: Option<HostKeyMaterial>,
    }

    impl MockHost {
        fn disabled() -> Self {
            Self {
                applies: Mutex::new(vec![]),
                removes: Mutex::new(vec![]),
                key_material: None,
            }
        }

        fn with_key(material: HostKeyMaterial) -> Self {
            Self {
                key_material: Some(material),
                ..Self::disabled()
            }
        }
    }

    #[async_trait::async_trait]
    impl HostControl for MockHost {
        async fn apply_peer(&self, public_key: &str, _allowed_ips: &str) -> bool {
            self.applies.lock().unwrap().push(public_key.to_string());
            false
        }

        async fn remove_peer(&self, public_key: &str) -> bool {
            self.removes.lock().unwrap().push(public_key.to_string());
            false
        }

        async fn generate_key_on_host(&self, _base_name: &str) -> Option<HostKeyMaterial> {
            self.key_material.clone()
        }
    }

    struct MockControlPlane {
        fail_create: bool,
        public_key: Option<String>,
        config_text: Option<String>,
        create_count: AtomicUsize,
        deleted: Mutex<Vec<String>>,
    }

    impl MockControlPlane {
        fn new() -> Self {
            Self {
                fail_create: false,
                public_key: Some("MOCK_PUB".to_string()),
                config_text: None,
                create_count: AtomicUsize::new(0),
                deleted: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait::async_trait]
    impl ControlPlane for MockControlPlane {
        async fn create_client(&self, _name: &str) -> anyhow::Result<CreatedClient> {
            if self.fail_create {
                anyhow::bail!("control plane down");
            }
            let n = self.create_count.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(CreatedClient {
                id: format!("cid-{n}"),
                public_key: self.public_key.clone(),
            })
        }

        async fn delete_client(&self, client_id: &str) -> anyhow::Result<()> {
            self.deleted.lock().unwrap().push(client_id.to_string());
            Ok(())
        }

        async fn get_client_config(&self, _client_id: &str) -> anyhow::Result<Vec<u8>> {
            match &self.config_text {
                Some(text) => Ok(text.clone().into_bytes()),
                None => anyhow::bail!("config not available"),
            }
        }
    }

    struct Harness {
        store: Store,
        service: DefaultPeerService,
        control_plane: Option<Arc<MockControlPlane>>,
        host: Arc<MockHost>,
    }

    async fn harness(policy: KeyPolicy, control_plane: Option<MockControlPlane>) -> Harness {
        harness_with_host(policy, control_plane, MockHost::disabled()).await
    }

    async fn harness_with_host(
        policy: KeyPolicy,
        control_plane: Option<MockControlPlane>,
        host: MockHost,
    ) -> Harness {
        // Single connection so the in-memory database is shared.
        let store = Store::with_pool_options("sqlite::memory:", 1, 1)
            .await
            .expect("in-memory db");

        let mut config = Config::default();
        config.wireguard.key_policy = policy;
        config.security.config_encryption_key = Some(SecretBox::generate_key());

        let host = Arc::new(host);
        let control_plane = control_plane.map(Arc::new);
        let service = DefaultPeerService::new(
            store.clone(),
            &config,
            host.clone(),
            control_plane
                .clone()
                .map(|cp| cp as Arc<dyn ControlPlane>),
        );

        Harness {
            store,
            service,
            control_plane,
            host,
        }
    }

    fn admin() -> CurrentUser {
        CurrentUser {
            id: 1,
            is_admin: true,
        }
    }

    fn user(id: i32) -> CurrentUser {
        CurrentUser {
            id,
            is_admin: false,
        }
    }

    async fn seed_subscription(store: &Store, user_id: i32) {
        let now = chrono::Utc::now();
        let model = crate::entities::user_tariffs::ActiveModel {
            user_id: Set(user_id),
            tariff_name: Set("monthly".to_string()),
            started_at: Set(now.to_rfc3339()),
            expires_at: Set((now + chrono::Duration::days(30)).to_rfc3339()),
            ..Default::default()
        };
        model.insert(&store.conn).await.expect("seed subscription");
    }

    #[tokio::test]
    async fn test_db_policy_generates_key_material_and_address() {
        let h = harness(KeyPolicy::Db, None).await;

        let record = h
            .service
            .create_peer(&user(7), CreatePeerRequest::default())
            .await
            .expect("create");

        assert_eq!(record.user_id, 7);
        assert!(!record.wg_public_key.is_empty());
        assert!(record.wg_private_key.is_some());
        assert!(record.wg_ip.starts_with("10.8.0."));
        assert!(record.wg_ip.ends_with("/32"));
        assert!(record.active);
    }

    #[tokio::test]
    async fn test_db_policy_keeps_supplied_public_key() {
        let h = harness(KeyPolicy::Db, None).await;

        let record = h
            .service
            .create_peer(
                &user(3),
                CreatePeerRequest {
                    wg_public_key: Some("CLIENT_SUPPLIED_PUB".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("create");

        assert_eq!(record.wg_public_key, "CLIENT_SUPPLIED_PUB");
        // A fresh private key is still generated server-side.
        assert!(record.wg_private_key.is_some());
    }

    #[tokio::test]
    async fn test_create_for_other_user_requires_admin() {
        let h = harness(KeyPolicy::Db, None).await;

        let denied = h
            .service
            .create_peer(
                &user(3),
                CreatePeerRequest {
                    user_id: Some(4),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(denied, Err(PeerError::Forbidden)));

        let allowed = h
            .service
            .create_peer(
                &admin(),
                CreatePeerRequest {
                    user_id: Some(4),
                    ..Default::default()
                },
            )
            .await;
        assert!(allowed.is_ok());
    }

    #[tokio::test]
    async fn test_self_create_requires_subscription() {
        let h = harness(KeyPolicy::Db, None).await;

        let denied = h
            .service
            .create_peer_self(&user(9), CreatePeerRequest::default())
            .await;
        assert!(matches!(denied, Err(PeerError::SubscriptionRequired)));

        seed_subscription(&h.store, 9).await;
        let allowed = h
            .service
            .create_peer_self(&user(9), CreatePeerRequest::default())
            .await;
        assert!(allowed.is_ok());
    }

    #[tokio::test]
    async fn test_host_policy_uses_host_key() {
        let host = MockHost::with_key(HostKeyMaterial {
            private_key_path: "/etc/wg-keys/user5.key".to_string(),
            public_key: "PUB_FROM_HOST".to_string(),
        });
        let h = harness_with_host(KeyPolicy::Host, None, host).await;

        let record = h
            .service
            .create_peer(
                &user(5),
                CreatePeerRequest {
                    wg_public_key: Some("ignored".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("create");

        assert_eq!(record.wg_public_key, "PUB_FROM_HOST");
        assert_eq!(
            record.wg_private_key.as_deref(),
            Some("/etc/wg-keys/user5.key")
        );
    }

    #[tokio::test]
    async fn test_host_policy_falls_back_to_local_generation() {
        let h = harness(KeyPolicy::Host, None).await;

        let record = h
            .service
            .create_peer(&user(5), CreatePeerRequest::default())
            .await
            .expect("create");

        assert!(!record.wg_public_key.is_empty());
        assert!(record.wg_private_key.is_some());
    }

    #[tokio::test]
    async fn test_wg_easy_policy_parses_fetched_config() {
        let mut cp = MockControlPlane::new();
        cp.public_key = Some("PUB_WG_123".to_string());
        cp.config_text = Some(
            "[Interface]\nPrivateKey = PRIVATE_ABC\nAddress = 10.10.0.99/32\n\
             [Peer]\nAllowedIPs = 0.0.0.0/0\nEndpoint = vpn.example.com:51820\n"
                .to_string(),
        );
        let h = harness(KeyPolicy::WgEasy, Some(cp)).await;

        let record = h
            .service
            .create_peer(
                &user(2),
                CreatePeerRequest {
                    device_name: Some("phone".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("create");

        assert_eq!(record.wg_public_key, "PUB_WG_123");
        assert_eq!(record.wg_private_key.as_deref(), Some("PRIVATE_ABC"));
        assert_eq!(record.wg_ip, "10.10.0.99/32");
        assert_eq!(record.allowed_ips.as_deref(), Some("0.0.0.0/0"));

        let row = h.store.peers().get(record.id).await.unwrap().unwrap();
        assert_eq!(row.wg_client_id.as_deref(), Some("cid-1"));
    }

    #[tokio::test]
    async fn test_wg_easy_config_fetch_failure_keeps_managed_marker() {
        let cp = MockControlPlane::new();
        let h = harness(KeyPolicy::WgEasy, Some(cp)).await;

        let record = h
            .service
            .create_peer(&user(2), CreatePeerRequest::default())
            .await
            .expect("create");

        // Private key is not known to us, so the response omits it.
        assert_eq!(record.wg_private_key, None);
        let row = h.store.peers().get(record.id).await.unwrap().unwrap();
        assert_eq!(row.wg_private_key, MANAGED_KEY_MARKER);
    }

    #[tokio::test]
    async fn test_wg_easy_create_failure_persists_nothing() {
        let mut cp = MockControlPlane::new();
        cp.fail_create = true;
        let h = harness(KeyPolicy::WgEasy, Some(cp)).await;

        let result = h
            .service
            .create_peer(&user(2), CreatePeerRequest::default())
            .await;
        assert!(matches!(result, Err(PeerError::Upstream(_))));

        let peers = h.store.peers().list(None, 0, 100).await.unwrap();
        assert!(peers.is_empty());
    }

    #[tokio::test]
    async fn test_wg_easy_compensates_on_persist_failure() {
        let cp = MockControlPlane::new();
        let h = harness(KeyPolicy::WgEasy, Some(cp)).await;

        // First create succeeds and takes the mock's public key.
        h.service
            .create_peer(&user(2), CreatePeerRequest::default())
            .await
            .expect("first create");

        // Second create returns the same public key, so the insert hits the
        // unique constraint after the remote client was created.
        let result = h
            .service
            .create_peer(&user(3), CreatePeerRequest::default())
            .await;
        assert!(matches!(result, Err(PeerError::Conflict(_))));

        let deleted = h
            .control_plane
            .as_ref()
            .unwrap()
            .deleted
            .lock()
            .unwrap()
            .clone();
        assert_eq!(deleted, vec!["cid-2".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_triggers_remote_and_host_cleanup() {
        let mut cp = MockControlPlane::new();
        cp.config_text = Some("[Interface]\nPrivateKey = P\nAddress = 10.8.0.77/32\n".to_string());
        let h = harness(KeyPolicy::WgEasy, Some(cp)).await;

        let record = h
            .service
            .create_peer(&user(2), CreatePeerRequest::default())
            .await
            .expect("create");

        h.service.delete_peer(&user(2), record.id).await.expect("delete");

        assert!(h.store.peers().get(record.id).await.unwrap().is_none());
        let deleted = h
            .control_plane
            .as_ref()
            .unwrap()
            .deleted
            .lock()
            .unwrap()
            .clone();
        assert_eq!(deleted, vec!["cid-1".to_string()]);
        assert_eq!(
            h.host.removes.lock().unwrap().clone(),
            vec![record.wg_public_key]
        );
    }

    #[tokio::test]
    async fn test_reads_scrub_private_key() {
        let h = harness(KeyPolicy::Db, None).await;

        let created = h
            .service
            .create_peer(&user(2), CreatePeerRequest::default())
            .await
            .expect("create");
        assert!(created.wg_private_key.is_some());

        let fetched = h.service.get_peer(&user(2), created.id).await.unwrap();
        assert_eq!(fetched.wg_private_key, None);

        let listed = h.service.list_peers(&user(2), None, 0, 100).await.unwrap();
        assert!(listed.iter().all(|p| p.wg_private_key.is_none()));
    }

    #[tokio::test]
    async fn test_list_scoping() {
        let h = harness(KeyPolicy::Db, None).await;

        h.service
            .create_peer(
                &user(2),
                CreatePeerRequest {
                    wg_ip: Some("10.8.0.21/32".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        h.service
            .create_peer(
                &user(3),
                CreatePeerRequest {
                    wg_ip: Some("10.8.0.22/32".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Non-admin sees only their own peers.
        let own = h.service.list_peers(&user(2), None, 0, 100).await.unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].user_id, 2);

        // Non-admin cannot list another user.
        let denied = h.service.list_peers(&user(2), Some(3), 0, 100).await;
        assert!(matches!(denied, Err(PeerError::Forbidden)));

        let all = h.service.list_peers(&admin(), None, 0, 100).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_self_config_round_trip() {
        let h = harness(KeyPolicy::Db, None).await;

        // Gate fires before any peer lookup.
        let denied = h.service.self_config(&user(6)).await;
        assert!(matches!(denied, Err(PeerError::SubscriptionRequired)));

        seed_subscription(&h.store, 6).await;

        let no_peer = h.service.self_config(&user(6)).await;
        assert!(matches!(no_peer, Err(PeerError::NotFound)));

        h.service
            .create_peer_self(&user(6), CreatePeerRequest::default())
            .await
            .expect("create");

        let config_text = h.service.self_config(&user(6)).await.expect("config");
        assert!(config_text.starts_with("[Interface]"));
        assert!(config_text.contains("PersistentKeepalive = 25"));
    }

    #[tokio::test]
    async fn test_self_config_detects_corrupt_token() {
        let h = harness(KeyPolicy::Db, None).await;
        seed_subscription(&h.store, 6).await;

        let record = h
            .service
            .create_peer_self(&user(6), CreatePeerRequest::default())
            .await
            .expect("create");

        h.store
            .peers()
            .attach_encrypted_config(record.id, "garbage-token".to_string())
            .await
            .unwrap();

        let result = h.service.self_config(&user(6)).await;
        assert!(matches!(result, Err(PeerError::Decryption)));
    }

    #[tokio::test]
    async fn test_update_replaces_fields_only() {
        let h = harness(KeyPolicy::Db, None).await;

        let created = h
            .service
            .create_peer(&user(2), CreatePeerRequest::default())
            .await
            .unwrap();

        let updated = h
            .service
            .update_peer(
                &user(2),
                created.id,
                UpdatePeerRequest {
                    wg_public_key: Some("NEW_PUB".to_string()),
                    wg_ip: Some("10.8.0.200/32".to_string()),
                    allowed_ips: Some("10.8.0.0/24".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.wg_public_key, "NEW_PUB");
        assert_eq!(updated.wg_ip, "10.8.0.200/32");
        assert_eq!(updated.wg_private_key, None);

        // The stored private key is untouched.
        let row = h.store.peers().get(created.id).await.unwrap().unwrap();
        assert_eq!(Some(row.wg_private_key), created.wg_private_key);
    }

    #[tokio::test]
    async fn test_duplicate_public_key_conflicts() {
        let h = harness(KeyPolicy::Db, None).await;

        h.service
            .create_peer(
                &user(2),
                CreatePeerRequest {
                    wg_public_key: Some("SAME".to_string()),
                    wg_ip: Some("10.8.0.31/32".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let result = h
            .service
            .create_peer(
                &user(3),
                CreatePeerRequest {
                    wg_public_key: Some("SAME".to_string()),
                    wg_ip: Some("10.8.0.32/32".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(PeerError::Conflict(_))));
    }
}
