//! Node identities and genesis documents.
//!
//! Pure functions: nothing here touches Docker or the filesystem.

pub mod keys;
pub mod genesis;

pub use keys::{
    credentials_from_private_key, generate_identity, is_valid_address, normalize_address,
    NodeCredentials, ENODE_DISCOVERY_PORT,
};
pub use genesis::{build_genesis, clique_extra_data, GenesisDocument, GenesisParams};
