//! The owner's mutable buffer between commits (spec §4.3) and the commit
//! protocol that seals it into a block (spec §4.4).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::chain::{Chain, Payload, sign_block_with};
use crate::codec::{self, decode_claim_entry, encode_capability, encode_claim, encode_claim_entry};
use crate::crypto::{CurvePublicKey, Hash, VrfValue, derive_key, dh, sha256};
use crate::error::{ClaimChainError, Result};
use crate::params::LocalParams;
use crate::store::ObjectStore;
use crate::tree::{Evidence as TreeEvidence, SparseTree};

/// Spec §9: the staging state's post-commit cache modeled as an explicit
/// sum type rather than a bag of optional fields.
enum Committed {
    Uncommitted,
    Committed(CommittedState),
}

struct CommittedState {
    tree: SparseTree,
    payload: Payload,
    nonce: Vec<u8>,
    vrf_index: BTreeMap<Vec<u8>, VrfValue>,
}

/// Inclusion evidence for one `(reader, label)` pair (spec §4.6): sibling
/// paths for both the capability and claim lookups, plus their leaf blobs.
#[derive(Clone)]
pub struct Evidence {
    pub cap_lookup_key: Hash,
    pub cap_evidence: TreeEvidence,
    pub cap_ct: Vec<u8>,
    pub claim_lookup_key: Hash,
    pub claim_evidence: TreeEvidence,
    pub claim_entry: Vec<u8>,
}

impl Evidence {
    /// The union of node hashes from both inclusion proofs (spec §4.6 step 3).
    pub fn node_hashes(&self) -> Vec<Hash> {
        let mut set: BTreeSet<Hash> = BTreeSet::new();
        set.extend(self.cap_evidence.siblings.iter().copied());
        set.extend(self.claim_evidence.siblings.iter().copied());
        set.into_iter().collect()
    }
}

/// Check `evidence` against a published `mtr_hash` without any owner or
/// reader secret — the lookup keys are already bound into `evidence` (spec
/// §4.6, §8 "evidence soundness"). Binds the two carried leaf blobs to the
/// tree by recomputing their hash rather than trusting the `value_hash`
/// embedded in each path, so a caller cannot swap in arbitrary ciphertexts
/// while keeping the sibling path intact.
pub fn verify_evidence(mtr_hash: &Hash, evidence: &Evidence) -> bool {
    sha256(&[&evidence.cap_ct]) == evidence.cap_evidence.value_hash
        && sha256(&[&evidence.claim_entry]) == evidence.claim_evidence.value_hash
        && evidence.cap_evidence.verify(&evidence.cap_lookup_key, mtr_hash)
        && evidence.claim_evidence.verify(&evidence.claim_lookup_key, mtr_hash)
}

pub struct StagingState {
    local: LocalParams,
    identity_info: Option<Vec<u8>>,
    pending_claims: BTreeMap<Vec<u8>, Vec<u8>>,
    pending_grants: BTreeMap<[u8; 32], BTreeSet<Vec<u8>>>,
    committed: Committed,
}

impl StagingState {
    pub fn new(local: LocalParams) -> Self {
        StagingState {
            local,
            identity_info: None,
            pending_claims: BTreeMap::new(),
            pending_grants: BTreeMap::new(),
            committed: Committed::Uncommitted,
        }
    }

    pub fn set_identity_info(&mut self, info: Option<Vec<u8>>) {
        self.identity_info = info;
    }

    /// Insert or overwrite a pending claim; last write wins (spec §4.4 edge
    /// cases).
    pub fn set(&mut self, label: &[u8], content: &[u8]) {
        self.pending_claims.insert(label.to_vec(), content.to_vec());
    }

    pub fn get(&self, label: &[u8]) -> Result<&[u8]> {
        self.pending_claims.get(label).map(Vec::as_slice).ok_or(ClaimChainError::NotFound)
    }

    pub fn grant(&mut self, reader_dh_pk: &CurvePublicKey, labels: impl IntoIterator<Item = Vec<u8>>) {
        self.pending_grants.entry(reader_dh_pk.to_bytes()).or_default().extend(labels);
    }

    pub fn revoke(&mut self, reader_dh_pk: &CurvePublicKey, labels: impl IntoIterator<Item = Vec<u8>>) {
        if let Some(set) = self.pending_grants.get_mut(&reader_dh_pk.to_bytes()) {
            for label in labels {
                set.remove(&label);
            }
        }
    }

    pub fn capabilities(&self, reader_dh_pk: &CurvePublicKey) -> BTreeSet<Vec<u8>> {
        self.pending_grants.get(&reader_dh_pk.to_bytes()).cloned().unwrap_or_default()
    }

    /// Reset pending claims, pending grants, and any committed cache (spec
    /// §4.3).
    pub fn clear(&mut self) {
        self.pending_claims.clear();
        self.pending_grants.clear();
        self.committed = Committed::Uncommitted;
    }

    pub fn tree(&self) -> Result<&SparseTree> {
        self.committed_state().map(|s| &s.tree)
    }

    pub fn payload(&self) -> Result<&Payload> {
        self.committed_state().map(|s| &s.payload)
    }

    pub fn committed_nonce(&self) -> Result<&[u8]> {
        self.committed_state().map(|s| s.nonce.as_slice())
    }

    pub fn vrf_val(&self, label: &[u8]) -> Result<Option<VrfValue>> {
        Ok(self.committed_state()?.vrf_index.get(label).copied())
    }

    fn committed_state(&self) -> Result<&CommittedState> {
        match &self.committed {
            Committed::Committed(state) => Ok(state),
            Committed::Uncommitted => Err(ClaimChainError::NotCommitted),
        }
    }

    /// Seal staged claims and grants into a block and append it to `chain`
    /// (spec §4.4). `store` defaults to the chain's own store; `nonce`
    /// defaults to a freshly sampled one.
    pub fn commit(
        &mut self,
        chain: &mut Chain,
        store: Option<Arc<dyn ObjectStore>>,
        nonce: Option<Vec<u8>>,
    ) -> Result<Hash> {
        let store = store.unwrap_or_else(|| chain.store().clone());
        let nonce = nonce.unwrap_or_else(|| self.local.random_nonce());
        let vrf_pk = self.local.vrf_pk();

        let mut entries: BTreeMap<Hash, Vec<u8>> = BTreeMap::new();
        let mut vrf_index: BTreeMap<Vec<u8>, VrfValue> = BTreeMap::new();

        for (label, content) in &self.pending_claims {
            let encoded = encode_claim(&self.local.vrf_sk, &vrf_pk, &nonce, label, content);
            let blob = encode_claim_entry(&encoded.vrf_proof, &encoded.enc_claim);
            entries.insert(encoded.lookup_key, blob);
            vrf_index.insert(label.clone(), encoded.vrf_val);
        }

        for (reader_pk_bytes, labels) in &self.pending_grants {
            let reader_pk = CurvePublicKey::from_bytes(reader_pk_bytes)
                .expect("grant map keys are always valid curve points, set via grant()");
            for label in labels {
                let Some(vrf_val) = vrf_index.get(label) else {
                    log::warn!(
                        "grant for label with no matching claim in this commit; \
                         skipping remaining grants for this reader"
                    );
                    break;
                };
                let cap = encode_capability(&self.local.dh_sk, &reader_pk, &nonce, label, vrf_val);
                entries.insert(cap.cap_lookup_key, cap.cap_ct);
            }
        }

        let tree = SparseTree::build(store, &entries)?;
        let mtr_hash = tree.root_hash();
        let payload = Payload::new(
            nonce.clone(),
            self.local.public_export(),
            self.identity_info.clone(),
            mtr_hash,
            now_timestamp(),
        );
        let head = chain.append(&payload, sign_block_with(&self.local.sig_sk))?;

        self.committed = Committed::Committed(CommittedState { tree, payload, nonce, vrf_index });
        Ok(head)
    }

    /// Spec §4.6: minimal evidence that `label` is bound to `reader_dh_pk`
    /// in the most recently committed block. `Ok(None)` if the reader holds
    /// no capability for `label` — unknown labels leak nothing (spec §4.6
    /// "unknown label → empty set").
    pub fn compute_evidence(&self, reader_dh_pk: &CurvePublicKey, label: &[u8]) -> Result<Option<Evidence>> {
        let state = self.committed_state()?;
        let shared = dh(&self.local.dh_sk, reader_dh_pk);
        let cap_lookup_key = derive_key("cap-lookup", &[&shared, &state.nonce, label]);

        let Some((cap_evidence, cap_ct)) = state.tree.evidence(&cap_lookup_key)? else {
            return Ok(None);
        };

        let vrf_val = state.vrf_index.get(label).copied().ok_or(ClaimChainError::MissingClaim)?;
        let claim_lookup_key = codec::claim_lookup_key(&vrf_val);
        let Some((claim_evidence, claim_entry)) = state.tree.evidence(&claim_lookup_key)? else {
            return Err(ClaimChainError::MissingClaim);
        };
        debug_assert!(decode_claim_entry(&claim_entry).is_some());

        Ok(Some(Evidence {
            cap_lookup_key,
            cap_evidence,
            cap_ct,
            claim_lookup_key,
            claim_evidence,
            claim_entry,
        }))
    }
}

fn now_timestamp() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    fn fresh_chain() -> Chain {
        Chain::new(Arc::new(MemStore::new()))
    }

    #[test]
    fn empty_commit_has_null_mtr_hash() {
        let mut chain = fresh_chain();
        let mut staging = StagingState::new(LocalParams::generate());
        staging.commit(&mut chain, None, Some(vec![0u8; 16])).unwrap();
        assert_eq!(staging.payload().unwrap().mtr_hash, None);
    }

    #[test]
    fn get_before_set_fails_not_found() {
        let staging = StagingState::new(LocalParams::generate());
        assert!(matches!(staging.get(b"email"), Err(ClaimChainError::NotFound)));
    }

    #[test]
    fn accessors_fail_not_committed_before_first_commit() {
        let staging = StagingState::new(LocalParams::generate());
        assert!(matches!(staging.tree(), Err(ClaimChainError::NotCommitted)));
        assert!(matches!(staging.payload(), Err(ClaimChainError::NotCommitted)));
    }

    #[test]
    fn duplicate_set_is_last_write_wins() {
        let mut chain = fresh_chain();
        let owner = LocalParams::generate();
        let mut staging = StagingState::new(owner);
        staging.set(b"email", b"first");
        staging.set(b"email", b"second");
        staging.commit(&mut chain, None, Some(vec![1u8; 16])).unwrap();
        assert_eq!(staging.vrf_val(b"email").unwrap().is_some(), true);
        assert_eq!(staging.get(b"email").unwrap(), b"second");
    }

    #[test]
    fn grant_without_matching_claim_is_skipped_not_erred() {
        let mut chain = fresh_chain();
        let owner = LocalParams::generate();
        let reader = LocalParams::generate();
        let mut staging = StagingState::new(owner);
        staging.grant(&reader.dh_pk(), [b"ghost".to_vec()]);
        let result = staging.commit(&mut chain, None, Some(vec![2u8; 16]));
        assert!(result.is_ok());
        let evidence = staging.compute_evidence(&reader.dh_pk(), b"ghost").unwrap();
        assert!(evidence.is_none());
    }

    #[test]
    fn revoke_before_commit_removes_the_grant() {
        let mut chain = fresh_chain();
        let owner = LocalParams::generate();
        let reader = LocalParams::generate();
        let mut staging = StagingState::new(owner);
        staging.set(b"email", b"a@x");
        staging.grant(&reader.dh_pk(), [b"email".to_vec()]);
        staging.revoke(&reader.dh_pk(), [b"email".to_vec()]);
        assert!(staging.capabilities(&reader.dh_pk()).is_empty());
        staging.commit(&mut chain, None, Some(vec![3u8; 16])).unwrap();
        assert!(staging.compute_evidence(&reader.dh_pk(), b"email").unwrap().is_none());
    }

    #[test]
    fn evidence_verifies_against_the_committed_mtr_hash() {
        let mut chain = fresh_chain();
        let owner = LocalParams::generate();
        let reader = LocalParams::generate();
        let mut staging = StagingState::new(owner);
        staging.set(b"email", b"a@x");
        staging.grant(&reader.dh_pk(), [b"email".to_vec()]);
        staging.commit(&mut chain, None, Some(vec![4u8; 16])).unwrap();

        let mtr_hash = staging.payload().unwrap().mtr_hash.unwrap();
        let evidence = staging.compute_evidence(&reader.dh_pk(), b"email").unwrap().unwrap();
        assert!(verify_evidence(&mtr_hash, &evidence));

        let mut tampered = evidence;
        tampered.cap_evidence.siblings[0][0] ^= 1;
        assert!(!verify_evidence(&mtr_hash, &tampered));
    }

    #[test]
    fn evidence_with_a_swapped_ciphertext_fails_even_with_an_intact_sibling_path() {
        let mut chain = fresh_chain();
        let owner = LocalParams::generate();
        let reader = LocalParams::generate();
        let mut staging = StagingState::new(owner);
        staging.set(b"email", b"a@x");
        staging.set(b"phone", b"555-0100");
        staging.grant(&reader.dh_pk(), [b"email".to_vec(), b"phone".to_vec()]);
        staging.commit(&mut chain, None, Some(vec![5u8; 16])).unwrap();

        let mtr_hash = staging.payload().unwrap().mtr_hash.unwrap();
        let evidence = staging.compute_evidence(&reader.dh_pk(), b"email").unwrap().unwrap();
        let other = staging.compute_evidence(&reader.dh_pk(), b"phone").unwrap().unwrap();
        assert!(verify_evidence(&mtr_hash, &evidence));

        let mut swapped_cap = evidence.clone();
        swapped_cap.cap_ct = other.cap_ct;
        assert!(!verify_evidence(&mtr_hash, &swapped_cap));

        let mut swapped_claim = evidence;
        swapped_claim.claim_entry = other.claim_entry;
        assert!(!verify_evidence(&mtr_hash, &swapped_claim));
    }
}
