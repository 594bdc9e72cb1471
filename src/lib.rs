//! Decentralized, privacy-preserving claim-publication store.
//!
//! An owner maintains an append-only hash chain whose blocks commit to an
//! authenticated Merkle tree of encrypted claims and capabilities. Neither
//! the label set nor the set of authorized readers is observable from the
//! published tree: lookup keys are VRF outputs (for claims) or
//! Diffie-Hellman shared secrets (for capabilities). An owner can later
//! prove, to one granted reader, the inclusion of one `label -> content`
//! pair by exporting a small set of tree node hashes.

pub mod chain;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod params;
pub mod staging;
pub mod store;
pub mod tree;
pub mod view;

pub use chain::{Block, Chain, Metadata, Payload, PROTOCOL_VERSION};
pub use error::{ClaimChainError, Result};
pub use params::{LocalParams, PublicParams};
pub use staging::{Evidence, StagingState, verify_evidence};
pub use store::{MemStore, ObjectStore, RedbStore};
pub use tree::SparseTree;
pub use view::View;
