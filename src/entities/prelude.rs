pub use super::user_tariffs::Entity as UserTariffs;
pub use super::users::Entity as Users;
pub use super::vpn_peers::Entity as VpnPeers;
