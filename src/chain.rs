//! Block/payload types and the append-only hash chain (spec §3, §6
//! "Chain"/"Block format"). Hand-rolled for the same reason as `tree` and
//! `store`: the chain is a named collaborator in scope, not a dependency
//! pulled in wholesale.

use std::sync::Arc;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::{self, Hash, SigSecretKey, Signature, sha256};
use crate::error::{ClaimChainError, Result};
use crate::params::{PublicParams, b64, unb64, unb64_vec};
use crate::store::ObjectStore;

/// Current protocol major version; readers reject anything else (spec §6).
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
    pub params: PublicParams,
    pub identity_info: Option<Vec<u8>>,
}

/// Everything a block commits to other than its own signature (spec §3).
#[derive(Clone, Debug, PartialEq)]
pub struct Payload {
    pub version: u32,
    pub timestamp: f64,
    pub nonce: Vec<u8>,
    pub metadata: Metadata,
    pub mtr_hash: Option<Hash>,
}

impl Payload {
    pub fn new(nonce: Vec<u8>, params: PublicParams, identity_info: Option<Vec<u8>>, mtr_hash: Option<Hash>, timestamp: f64) -> Self {
        Payload {
            version: PROTOCOL_VERSION,
            timestamp,
            nonce,
            metadata: Metadata { params, identity_info },
            mtr_hash,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct MetadataWire {
    params: PublicParams,
    identity_info: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct PayloadWire {
    version: u32,
    timestamp: f64,
    nonce: String,
    metadata: MetadataWire,
    mtr_hash: Option<String>,
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        PayloadWire {
            version: self.version,
            timestamp: self.timestamp,
            nonce: b64(&self.nonce),
            metadata: MetadataWire {
                params: self.metadata.params,
                identity_info: self.metadata.identity_info.as_deref().map(b64),
            },
            mtr_hash: self.mtr_hash.as_ref().map(|h| b64(h)),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let wire = PayloadWire::deserialize(deserializer)?;
        let nonce = unb64_vec(&wire.nonce).map_err(DeError::custom)?;
        let identity_info = wire
            .metadata
            .identity_info
            .as_deref()
            .map(unb64_vec)
            .transpose()
            .map_err(DeError::custom)?;
        let mtr_hash = wire
            .mtr_hash
            .as_deref()
            .map(unb64::<32>)
            .transpose()
            .map_err(DeError::custom)?;
        Ok(Payload {
            version: wire.version,
            timestamp: wire.timestamp,
            nonce,
            metadata: Metadata { params: wire.metadata.params, identity_info },
            mtr_hash,
        })
    }
}

/// A block's on-chain representation: the serialized payload plus a
/// detached Ed25519 signature slot. `aux` is always exactly 64 bytes once
/// populated; kept as `Vec<u8>` rather than `[u8; 64]` since serde's
/// built-in array impls stop at length 32 and this crate pulls in no
/// big-array helper for the sake of one field.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub prev_hash: Option<Hash>,
    pub body: Vec<u8>,
    pub aux: Option<Vec<u8>>,
}

/// The hash signed over and verified against: the block with `aux` always
/// treated as absent, whether or not it is actually populated yet (spec §3,
/// §9 "signature placement inside the hashed block").
pub fn content_hash(block: &Block) -> Result<Hash> {
    let canonical = Block { prev_hash: block.prev_hash, body: block.body.clone(), aux: None };
    let bytes = bincode::serialize(&canonical)?;
    Ok(sha256(&[&bytes]))
}

/// Verify a block's `aux` signature against `sig_pk` over its content-hash
/// (spec §3 invariant, §4.5 `validate_head`). An `aux` of the wrong length
/// is treated as a failed verification, not an error.
pub fn verify_block(block: &Block, sig_pk: &crypto::SigPublicKey) -> Result<bool> {
    let Some(aux) = &block.aux else { return Ok(false) };
    let Ok(aux_bytes): std::result::Result<[u8; 64], _> = aux.as_slice().try_into() else {
        return Ok(false);
    };
    let sig = Signature::from_bytes(&aux_bytes);
    let hash = content_hash(block)?;
    Ok(crypto::verify(sig_pk, &hash, &sig))
}

/// Hash-linked append-only log of blocks, backed by a content-addressed
/// [`ObjectStore`]. The store key under which a block is persisted is the
/// hash of its full serialized form (including `aux`), distinct from
/// [`content_hash`], which is only ever used for signing/verifying.
pub struct Chain {
    store: Arc<dyn ObjectStore>,
    head: Option<Hash>,
}

impl Chain {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Chain { store, head: None }
    }

    pub fn from_head(store: Arc<dyn ObjectStore>, head: Option<Hash>) -> Self {
        Chain { store, head }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn head(&self) -> Option<Hash> {
        self.head
    }

    pub fn fetch(&self, hash: &Hash) -> Result<Block> {
        let bytes = self.store.get(hash)?.ok_or(ClaimChainError::NotFound)?;
        Ok(bincode::deserialize(&bytes)?)
    }

    pub fn head_block(&self) -> Result<Option<Block>> {
        match self.head {
            Some(hash) => Ok(Some(self.fetch(&hash)?)),
            None => Ok(None),
        }
    }

    /// Seal `payload` into a block and append it (spec §4.4 steps 6-7).
    /// `sign_block` receives the content-hash to sign; the commit point is
    /// the final `store.put`, matching spec §5's cancellation guidance.
    pub fn append(&mut self, payload: &Payload, sign_block: impl FnOnce(&Hash) -> Signature) -> Result<Hash> {
        let body = bincode::serialize(payload)?;
        let mut block = Block { prev_hash: self.head, body, aux: None };
        let hash_to_sign = content_hash(&block)?;
        let sig = sign_block(&hash_to_sign);
        block.aux = Some(sig.to_bytes().to_vec());

        let bytes = bincode::serialize(&block)?;
        let stored_hash = self.store.put(&bytes)?;
        self.head = Some(stored_hash);
        Ok(stored_hash)
    }
}

/// Convenience for owners: sign with a [`SigSecretKey`] directly.
pub fn sign_block_with(sk: &SigSecretKey) -> impl FnOnce(&Hash) -> Signature + '_ {
    move |hash| crypto::sign(sk, hash)
}
