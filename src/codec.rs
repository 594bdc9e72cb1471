//! Claim and capability encode/decode (spec §4.2): the pseudonymizing layer
//! between plaintext `(label, content)` pairs and the opaque
//! `(lookup_key, ciphertext)` entries actually stored in the tree.

use crate::crypto::{
    CurvePublicKey, CurveSecretKey, Hash, VrfProof, VrfValue, aead_open, aead_seal, derive_key, dh,
    vrf_eval, vrf_verify,
};
use crate::error::ClaimChainError;

/// `H("lookup" ‖ vrf_val)` (spec §4.2.1 step 2, §4.2.4).
pub fn claim_lookup_key(vrf_val: &VrfValue) -> Hash {
    derive_key("lookup", &[vrf_val])
}

/// A freshly encoded claim, ready to be inserted into the tree under
/// `lookup_key` (spec §4.2.1).
pub struct EncodedClaim {
    pub vrf_val: VrfValue,
    pub vrf_proof: VrfProof,
    pub lookup_key: Hash,
    pub enc_claim: Vec<u8>,
}

/// Steps 1-5 of spec §4.2.1.
pub fn encode_claim(
    vrf_sk: &CurveSecretKey,
    vrf_pk: &CurvePublicKey,
    nonce: &[u8],
    label: &[u8],
    content: &[u8],
) -> EncodedClaim {
    let vrf_input = vrf_input(nonce, label);
    let (vrf_val, vrf_proof) = vrf_eval(vrf_sk, vrf_pk, &vrf_input);
    let lookup_key = claim_lookup_key(&vrf_val);
    let enc_key = derive_key("enc", &[&vrf_val]);
    let enc_claim = aead_seal(&enc_key, nonce, label, content);
    EncodedClaim { vrf_val, vrf_proof, lookup_key, enc_claim }
}

/// Spec §4.2.2: verifies the VRF value against `vrf_pk` and `nonce ‖ label`,
/// then opens the ciphertext. Fails `DecodeError` on either failure.
pub fn decode_claim(
    vrf_pk: &CurvePublicKey,
    nonce: &[u8],
    label: &[u8],
    vrf_val: &VrfValue,
    vrf_proof: &VrfProof,
    enc_claim: &[u8],
) -> Result<Vec<u8>, ClaimChainError> {
    let vrf_input = vrf_input(nonce, label);
    if !vrf_verify(vrf_pk, &vrf_input, vrf_val, vrf_proof) {
        return Err(ClaimChainError::DecodeError("vrf verification failed"));
    }
    let enc_key = derive_key("enc", &[vrf_val]);
    aead_open(&enc_key, nonce, label, enc_claim).ok_or(ClaimChainError::DecodeError("aead open failed"))
}

/// A freshly encoded capability, ready to be inserted into the tree under
/// `cap_lookup_key` (spec §4.2.3).
pub struct EncodedCapability {
    pub cap_lookup_key: Hash,
    pub cap_ct: Vec<u8>,
}

/// Steps 1-5 of spec §4.2.3.
pub fn encode_capability(
    owner_dh_sk: &CurveSecretKey,
    reader_dh_pk: &CurvePublicKey,
    nonce: &[u8],
    label: &[u8],
    vrf_val: &VrfValue,
) -> EncodedCapability {
    let shared = dh(owner_dh_sk, reader_dh_pk);
    let cap_lookup_key = derive_key("cap-lookup", &[&shared, nonce, label]);
    let cap_enc_key = derive_key("cap-enc", &[&shared, nonce, label]);
    let cap_ct = aead_seal(&cap_enc_key, nonce, label, vrf_val);
    EncodedCapability { cap_lookup_key, cap_ct }
}

/// The reader-side half of spec §4.2.3, used to compute the lookup key a
/// granted reader must query without needing to re-derive the ciphertext.
pub fn reader_cap_lookup_key(
    reader_dh_sk: &CurveSecretKey,
    owner_dh_pk: &CurvePublicKey,
    nonce: &[u8],
    label: &[u8],
) -> Hash {
    let shared = dh(reader_dh_sk, owner_dh_pk);
    derive_key("cap-lookup", &[&shared, nonce, label])
}

/// Spec §4.2.4: recovers `vrf_val` from a capability ciphertext using the
/// reader's `dh_sk` and the owner's `dh_pk`.
pub fn decode_capability(
    reader_dh_sk: &CurveSecretKey,
    owner_dh_pk: &CurvePublicKey,
    nonce: &[u8],
    label: &[u8],
    cap_ct: &[u8],
) -> Option<VrfValue> {
    let shared = dh(reader_dh_sk, owner_dh_pk);
    let cap_enc_key = derive_key("cap-enc", &[&shared, nonce, label]);
    let opened = aead_open(&cap_enc_key, nonce, label, cap_ct)?;
    opened.try_into().ok()
}

fn vrf_input(nonce: &[u8], label: &[u8]) -> Vec<u8> {
    [nonce, label].concat()
}

/// The blob actually stored in the tree for a claim entry: the VRF proof
/// (needed by whichever party already knows `vrf_val`, self or reader, to
/// authenticate it) followed by the AEAD ciphertext.
pub fn encode_claim_entry(proof: &VrfProof, enc_claim: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(96 + enc_claim.len());
    buf.extend_from_slice(&proof.to_bytes());
    buf.extend_from_slice(enc_claim);
    buf
}

pub fn decode_claim_entry(blob: &[u8]) -> Option<(VrfProof, &[u8])> {
    if blob.len() < 96 {
        return None;
    }
    let proof_bytes: [u8; 96] = blob[0..96].try_into().ok()?;
    let proof = VrfProof::from_bytes(&proof_bytes)?;
    Some((proof, &blob[96..]))
}
