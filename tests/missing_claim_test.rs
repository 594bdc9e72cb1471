use claimchain::chain::sign_block_with;
use claimchain::codec::encode_capability;
use claimchain::{Chain, ClaimChainError, LocalParams, MemStore, Metadata, Payload, SparseTree, View};
use std::collections::BTreeMap;
use std::sync::Arc;

// A correct owner never produces this state (commit() only grants a
// capability for a label it also staged a claim for in the same commit).
// This models a chain-consistency fault: a capability resolves, but the
// claim entry it points to was never written to this block's tree.
#[test]
fn test_capability_without_its_claim_fails_missing_claim_not_access_denied() {
    let store = Arc::new(MemStore::new());
    let owner = LocalParams::generate();
    let reader = LocalParams::generate();
    let nonce = vec![9u8; 16];
    let label = b"email";
    let vrf_val = [42u8; 32];

    let cap = encode_capability(&owner.dh_sk, &reader.dh_pk(), &nonce, label, &vrf_val);
    let mut entries = BTreeMap::new();
    entries.insert(cap.cap_lookup_key, cap.cap_ct);
    let tree = SparseTree::build(store.clone(), &entries).unwrap();

    let payload = Payload {
        version: claimchain::PROTOCOL_VERSION,
        timestamp: 1_700_000_000.0,
        nonce,
        metadata: Metadata { params: owner.public_export(), identity_info: None },
        mtr_hash: tree.root_hash(),
    };

    let mut chain = Chain::new(store);
    chain.append(&payload, sign_block_with(&owner.sig_sk)).unwrap();

    let view = View::new(&chain, reader).unwrap();
    assert!(matches!(view.lookup(label), Err(ClaimChainError::MissingClaim)));
}
