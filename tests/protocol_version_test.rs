use claimchain::{Chain, ClaimChainError, LocalParams, MemStore, Metadata, Payload, View};
use claimchain::chain::sign_block_with;
use std::sync::Arc;

#[test]
fn test_view_rejects_an_unsupported_protocol_version() {
    let store = Arc::new(MemStore::new());
    let mut chain = Chain::new(store);
    let owner = LocalParams::generate();

    let payload = Payload {
        version: claimchain::PROTOCOL_VERSION + 1,
        timestamp: 1_700_000_000.0,
        nonce: vec![0u8; 16],
        metadata: Metadata { params: owner.public_export(), identity_info: None },
        mtr_hash: None,
    };
    chain.append(&payload, sign_block_with(&owner.sig_sk)).unwrap();

    let err = View::new(&chain, owner).unwrap_err();
    assert!(matches!(err, ClaimChainError::VersionError(v) if v == claimchain::PROTOCOL_VERSION + 1));
}
