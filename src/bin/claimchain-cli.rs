//! Thin demo binary: generate owner/reader identities, commit a couple of
//! claims with a grant, read them back from both sides, and dump the
//! evidence for the granted reader. Not a production CLI — just enough to
//! exercise the crate end to end without a test harness.

use std::process::ExitCode;
use std::sync::Arc;

use claimchain::{Chain, ClaimChainError, LocalParams, MemStore, RedbStore, StagingState, View};

fn run() -> Result<(), ClaimChainError> {
    let store: Arc<dyn claimchain::ObjectStore> = match std::env::args().nth(1) {
        Some(path) => Arc::new(RedbStore::open(path)?),
        None => Arc::new(MemStore::new()),
    };

    let owner = LocalParams::generate();
    let reader = LocalParams::generate();

    let mut chain = Chain::new(store);
    let mut staging = StagingState::new(owner.clone());
    staging.set(b"email", b"alice@example.com");
    staging.set(b"phone", b"555-0100");
    staging.grant(&reader.dh_pk(), [b"email".to_vec()]);
    let head = staging.commit(&mut chain, None, None)?;
    log::info!("committed head {}", hex::encode(head));

    let owner_view = View::new(&chain, owner)?;
    owner_view.validate_head()?;
    log::info!("owner self-read email: {}", String::from_utf8_lossy(&owner_view.lookup(b"email")?));

    let reader_view = View::new(&chain, reader.clone())?;
    log::info!("reader read of granted label: {}", String::from_utf8_lossy(&reader_view.lookup(b"email")?));

    match reader_view.lookup(b"phone") {
        Err(ClaimChainError::AccessDenied) => log::info!("reader denied ungranted label, as expected"),
        other => log::warn!("expected AccessDenied for ungranted label, got {other:?}"),
    }

    if let Some(evidence) = staging.compute_evidence(&reader.dh_pk(), b"email")? {
        let mtr_hash = staging.payload()?.mtr_hash.expect("non-empty commit has a tree root");
        let sound = claimchain::verify_evidence(&mtr_hash, &evidence);
        log::info!("evidence for reader/email verifies: {sound}, node hashes: {}", evidence.node_hashes().len());
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("claimchain-cli: {err}");
            ExitCode::FAILURE
        }
    }
}
