//! Reader-path resolution over a committed chain head (spec §4.5).

use crate::chain::{self, Block, Chain, PROTOCOL_VERSION, Payload};
use crate::codec::{self, decode_capability, decode_claim, decode_claim_entry, reader_cap_lookup_key};
use crate::crypto::Hash;
use crate::error::{ClaimChainError, Result};
use crate::params::{LocalParams, PublicParams};
use crate::tree::SparseTree;

/// A reader's (or owner's) lens onto a single, immutable chain head.
///
/// Constructed once from a head block; the cached payload and tree handle
/// are never invalidated in place (spec §9 "a View is single-head and
/// immutable after construction") — a new chain head requires a new View.
pub struct View {
    local: LocalParams,
    head: Hash,
    block: Block,
    payload: Payload,
    owner_params: PublicParams,
    tree: SparseTree,
}

impl View {
    /// Construct a View over `chain`'s current head using the viewer's own
    /// `local` params, reconstructing the tree handle from `payload.mtr_hash`
    /// (spec §4.5 steps 1-4).
    pub fn new(chain: &Chain, local: LocalParams) -> Result<Self> {
        let head = chain.head().ok_or(ClaimChainError::NotCommitted)?;
        let block = chain.fetch(&head)?;
        let payload: Payload = bincode::deserialize(&block.body)?;
        if payload.version != PROTOCOL_VERSION {
            return Err(ClaimChainError::VersionError(payload.version));
        }
        let owner_params = payload.metadata.params;
        let tree = SparseTree::from_root(chain.store().clone(), payload.mtr_hash);
        Ok(View { local, head, block, payload, owner_params, tree })
    }

    /// As [`View::new`], but with a caller-supplied tree checked against
    /// `payload.mtr_hash` rather than trusting the object store to supply
    /// the right one (spec §4.5 step 3).
    pub fn with_tree(chain: &Chain, local: LocalParams, tree: SparseTree) -> Result<Self> {
        let view = Self::new(chain, local)?;
        if tree.root_hash() != view.payload.mtr_hash {
            return Err(ClaimChainError::TreeMismatch);
        }
        Ok(View { tree, ..view })
    }

    pub fn head(&self) -> Hash {
        self.head
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn owner_params(&self) -> &PublicParams {
        &self.owner_params
    }

    /// Resolve `label` to its content, transparently using the self-view
    /// path (viewer is the owner) or the capability path (spec §4.5
    /// `lookup`).
    pub fn lookup(&self, label: &[u8]) -> Result<Vec<u8>> {
        let nonce = &self.payload.nonce;
        let is_self_view = self.local.vrf_pk() == self.owner_params.vrf_pk;

        let vrf_val = if is_self_view {
            let vrf_input = [nonce.as_slice(), label].concat();
            let (value, _) = crate::crypto::vrf_eval(&self.local.vrf_sk, &self.local.vrf_pk(), &vrf_input);
            value
        } else {
            let cap_lookup_key =
                reader_cap_lookup_key(&self.local.dh_sk, &self.owner_params.dh_pk, nonce, label);
            let Some(cap_ct) = self.tree.lookup(&cap_lookup_key)? else {
                return Err(ClaimChainError::AccessDenied);
            };
            decode_capability(&self.local.dh_sk, &self.owner_params.dh_pk, nonce, label, &cap_ct)
                .ok_or(ClaimChainError::DecodeError("capability decode failed"))?
        };

        let claim_lookup_key = codec::claim_lookup_key(&vrf_val);
        let Some(entry) = self.tree.lookup(&claim_lookup_key)? else {
            // Self-view: the label was simply never set (spec §8 "empty
            // commit" — indistinguishable from an ungranted reader's miss).
            // Reader-view: the capability resolved but its claim is gone, a
            // chain-consistency fault on the owner's side, not the reader's.
            return Err(if is_self_view {
                ClaimChainError::AccessDenied
            } else {
                ClaimChainError::MissingClaim
            });
        };
        let (proof, enc_claim) =
            decode_claim_entry(&entry).ok_or(ClaimChainError::DecodeError("corrupt claim entry"))?;
        decode_claim(&self.owner_params.vrf_pk, nonce, label, &vrf_val, &proof, enc_claim)
    }

    /// Spec §4.5 `validate()`: does the head block's signature verify
    /// against the `sig_pk` declared in its own metadata? Does not walk
    /// ancestors (see [`View::validate_chain`]).
    pub fn validate_head(&self) -> Result<()> {
        if chain::verify_block(&self.block, &self.owner_params.sig_pk)? {
            Ok(())
        } else {
            Err(ClaimChainError::InvalidSignature)
        }
    }

    /// Walks every block from the head back to genesis via `prev_hash`,
    /// checking each block's signature against *its own* declared `sig_pk`.
    /// Catches tampering in an ancestor block that [`View::validate_head`]
    /// cannot see. Returns the number of blocks validated.
    pub fn validate_chain(&self, on: &Chain) -> Result<usize> {
        let mut count = 0usize;
        let mut current = self.head;
        loop {
            let block = on.fetch(&current)?;
            let payload: Payload = bincode::deserialize(&block.body)?;
            if payload.version != PROTOCOL_VERSION {
                return Err(ClaimChainError::VersionError(payload.version));
            }
            if !chain::verify_block(&block, &payload.metadata.params.sig_pk)? {
                return Err(ClaimChainError::InvalidSignature);
            }
            count += 1;
            match block.prev_hash {
                Some(prev) => current = prev,
                None => break,
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::staging::StagingState;
    use crate::store::MemStore;

    fn fresh_chain() -> Chain {
        Chain::new(Arc::new(MemStore::new()))
    }

    #[test]
    fn self_view_reads_back_committed_claim() {
        let mut chain = fresh_chain();
        let owner = LocalParams::generate();
        let mut staging = StagingState::new(owner.clone());
        staging.set(b"email", b"a@x");
        staging.commit(&mut chain, None, Some(vec![1u8; 16])).unwrap();

        let view = View::new(&chain, owner).unwrap();
        assert_eq!(view.lookup(b"email").unwrap(), b"a@x");
    }

    #[test]
    fn granted_reader_reads_back_committed_claim() {
        let mut chain = fresh_chain();
        let owner = LocalParams::generate();
        let reader = LocalParams::generate();
        let mut staging = StagingState::new(owner);
        staging.set(b"email", b"a@x");
        staging.grant(&reader.dh_pk(), [b"email".to_vec()]);
        staging.commit(&mut chain, None, Some(vec![2u8; 16])).unwrap();

        let view = View::new(&chain, reader).unwrap();
        assert_eq!(view.lookup(b"email").unwrap(), b"a@x");
    }

    #[test]
    fn ungranted_reader_is_denied_indistinguishably_from_missing_label() {
        let mut chain = fresh_chain();
        let owner = LocalParams::generate();
        let reader = LocalParams::generate();
        let mut staging = StagingState::new(owner);
        staging.set(b"phone", b"555");
        staging.commit(&mut chain, None, Some(vec![3u8; 16])).unwrap();

        let view = View::new(&chain, reader).unwrap();
        assert!(matches!(view.lookup(b"phone"), Err(ClaimChainError::AccessDenied)));
        assert!(matches!(view.lookup(b"nonexistent"), Err(ClaimChainError::AccessDenied)));
    }

    #[test]
    fn empty_commit_denies_every_lookup() {
        let mut chain = fresh_chain();
        let owner = LocalParams::generate();
        let mut staging = StagingState::new(owner.clone());
        staging.commit(&mut chain, None, Some(vec![4u8; 16])).unwrap();

        let view = View::new(&chain, owner).unwrap();
        assert!(matches!(view.lookup(b"email"), Err(ClaimChainError::AccessDenied)));
    }

    #[test]
    fn tampered_signature_fails_validate_head() {
        let store = Arc::new(MemStore::new());
        let mut chain = Chain::new(store.clone());
        let owner = LocalParams::generate();
        let mut staging = StagingState::new(owner.clone());
        staging.set(b"email", b"a@x");
        let head = staging.commit(&mut chain, None, Some(vec![5u8; 16])).unwrap();

        let view = View::new(&chain, owner).unwrap();
        view.validate_head().unwrap();

        let mut block = chain.fetch(&head).unwrap();
        let mut aux = block.aux.unwrap();
        aux[0] ^= 1;
        block.aux = Some(aux);
        store.corrupt(&head, bincode::serialize(&block).unwrap());

        let tampered_view = View::new(&chain, LocalParams::generate()).unwrap();
        assert!(matches!(tampered_view.validate_head(), Err(ClaimChainError::InvalidSignature)));
    }

    /// A correct `store` never returns different bytes for the same hash;
    /// this simulates one that does (a compromised or buggy backend) to show
    /// `validate_chain` catches ancestor corruption that `validate_head`,
    /// which only ever looks at the head block, structurally cannot see.
    #[test]
    fn validate_chain_catches_tampering_validate_head_misses() {
        let store = Arc::new(MemStore::new());
        let mut chain = Chain::new(store.clone());
        let owner = LocalParams::generate();
        let mut staging = StagingState::new(owner.clone());
        staging.set(b"email", b"a@x");
        staging.commit(&mut chain, None, Some(vec![6u8; 16])).unwrap();
        let genesis_hash = chain.head().unwrap();

        staging.set(b"phone", b"555");
        staging.commit(&mut chain, None, Some(vec![7u8; 16])).unwrap();

        let mut genesis_block = chain.fetch(&genesis_hash).unwrap();
        let mut aux = genesis_block.aux.unwrap();
        aux[0] ^= 1;
        genesis_block.aux = Some(aux);
        store.corrupt(&genesis_hash, bincode::serialize(&genesis_block).unwrap());

        let view = View::new(&chain, owner).unwrap();
        view.validate_head().unwrap();
        assert!(view.validate_chain(&chain).is_err());
    }
}
