pub mod peer_service;
pub mod peer_service_impl;

pub use peer_service::{
    CreatePeerRequest, CurrentUser, PeerError, PeerRecord, PeerService, UpdatePeerRequest,
};
pub use peer_service_impl::DefaultPeerService;
