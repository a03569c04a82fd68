pub mod address;
pub mod config_file;
pub mod keys;

pub use address::allocate_address;
pub use config_file::{ParsedConfig, build_config, parse_config};
pub use keys::{Keypair, generate_keypair};
