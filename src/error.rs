use thiserror::Error;

use crate::store::StoreError;
use crate::tree::TreeError;

/// Every failure mode the claim-chain core can surface.
///
/// The core never swallows a cryptographic failure; the sole recovered
/// condition (granting a capability for a label with no matching claim)
/// is logged via [`log::warn!`] during commit and does not appear here.
#[derive(Debug, Error)]
pub enum ClaimChainError {
    /// A committed-only accessor was called before the first successful commit.
    #[error("staging state has not been committed yet")]
    NotCommitted,

    /// `StagingState::get` was called for a label with no pending content.
    #[error("label not found in staging state")]
    NotFound,

    /// The viewer holds no capability for the requested label. Deliberately
    /// indistinguishable from the label not existing at all.
    #[error("access denied")]
    AccessDenied,

    /// A capability resolved to a `vrf_val` whose claim entry is absent from
    /// the tree — a chain-consistency error on the owner's side.
    #[error("capability present but claim entry missing")]
    MissingClaim,

    /// VRF verification or AEAD decryption failed while decoding a claim or
    /// capability.
    #[error("decode failed: {0}")]
    DecodeError(&'static str),

    /// A block's signature does not verify against the `sig_pk` declared in
    /// its own metadata.
    #[error("invalid block signature")]
    InvalidSignature,

    /// A caller-supplied tree's root hash disagrees with the block's
    /// `mtr_hash`.
    #[error("supplied tree does not match mtr_hash")]
    TreeMismatch,

    /// The payload declares a protocol major version this crate does not
    /// understand.
    #[error("unsupported protocol version {0}")]
    VersionError(u32),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, ClaimChainError>;
