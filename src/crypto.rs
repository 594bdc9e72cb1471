//! Cryptographic primitives (spec §4.1): signature, VRF, DH and AEAD, all
//! built on Curve25519 (Ed25519 for signatures, Ristretto255 for VRF/DH),
//! plus the domain-separated SHA-256 key derivation used throughout the
//! codec.

use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{ChaCha20Poly1305, KeyInit};
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::{Signature as Ed25519Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256, Sha512};

pub type Hash = [u8; 32];

/// Ed25519 signature keypair.
pub type SigSecretKey = SigningKey;
pub type SigPublicKey = VerifyingKey;
pub type Signature = Ed25519Signature;

pub fn generate_sig_keypair() -> (SigSecretKey, SigPublicKey) {
    let sk = SigningKey::generate(&mut OsRng);
    let pk = sk.verifying_key();
    (sk, pk)
}

pub fn sign(sk: &SigSecretKey, msg: &[u8]) -> Signature {
    sk.sign(msg)
}

pub fn verify(pk: &SigPublicKey, msg: &[u8], sig: &Signature) -> bool {
    pk.verify(msg, sig).is_ok()
}

/// A Ristretto255 scalar/point keypair, shared in shape by VRF and DH keys.
#[derive(Clone)]
pub struct CurveSecretKey(pub Scalar);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CurvePublicKey(pub CompressedRistretto);

impl CurvePublicKey {
    pub fn to_bytes(self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        let c = CompressedRistretto(*bytes);
        c.decompress()?;
        Some(CurvePublicKey(c))
    }

    fn point(&self) -> RistrettoPoint {
        // Constructed only via `from_bytes`/`generate_curve_keypair`, both of
        // which validate decompressibility, so this cannot fail.
        self.0.decompress().expect("public key point was validated at construction")
    }
}

pub fn generate_curve_keypair() -> (CurveSecretKey, CurvePublicKey) {
    let mut bytes = [0u8; 64];
    OsRng.fill_bytes(&mut bytes);
    let sk = Scalar::from_bytes_mod_order_wide(&bytes);
    (CurveSecretKey(sk), curve_public_key(&CurveSecretKey(sk)))
}

pub fn curve_public_key(sk: &CurveSecretKey) -> CurvePublicKey {
    CurvePublicKey((RISTRETTO_BASEPOINT_POINT * sk.0).compress())
}

/// Diffie-Hellman on Ristretto255: `dh(sk, other_pk) = other_pk * sk`.
pub fn dh(sk: &CurveSecretKey, other_pk: &CurvePublicKey) -> [u8; 32] {
    (other_pk.point() * sk.0).compress().to_bytes()
}

/// A VRF value: deterministic, fixed-length pseudonym/key-derivation input.
pub type VrfValue = [u8; 32];

/// Chaum-Pedersen discrete-log-equality proof binding `gamma = H(input)^sk`
/// to `vrf_pk = G^sk`.
#[derive(Clone, Copy, Debug)]
pub struct VrfProof {
    pub gamma: CompressedRistretto,
    pub c: Scalar,
    pub s: Scalar,
}

impl VrfProof {
    pub fn to_bytes(&self) -> [u8; 96] {
        let mut buf = [0u8; 96];
        buf[0..32].copy_from_slice(self.gamma.as_bytes());
        buf[32..64].copy_from_slice(self.c.as_bytes());
        buf[64..96].copy_from_slice(self.s.as_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8; 96]) -> Option<Self> {
        let mut gamma_bytes = [0u8; 32];
        gamma_bytes.copy_from_slice(&bytes[0..32]);
        let gamma = CompressedRistretto(gamma_bytes);
        gamma.decompress()?;

        let mut c_bytes = [0u8; 32];
        c_bytes.copy_from_slice(&bytes[32..64]);
        let c: Option<Scalar> = Scalar::from_canonical_bytes(c_bytes).into();

        let mut s_bytes = [0u8; 32];
        s_bytes.copy_from_slice(&bytes[64..96]);
        let s: Option<Scalar> = Scalar::from_canonical_bytes(s_bytes).into();

        Some(VrfProof { gamma, c: c?, s: s? })
    }
}

fn hash_to_point(input: &[u8]) -> RistrettoPoint {
    RistrettoPoint::hash_from_bytes::<Sha512>(input)
}

fn fiat_shamir_challenge(
    h_point: &RistrettoPoint,
    pk: &CurvePublicKey,
    gamma: &RistrettoPoint,
    u: &RistrettoPoint,
    v: &RistrettoPoint,
) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(b"vrf-challenge");
    hasher.update(RISTRETTO_BASEPOINT_POINT.compress().as_bytes());
    hasher.update(h_point.compress().as_bytes());
    hasher.update(pk.0.as_bytes());
    hasher.update(gamma.compress().as_bytes());
    hasher.update(u.compress().as_bytes());
    hasher.update(v.compress().as_bytes());
    Scalar::from_hash(hasher)
}

/// `vrf_eval(vrf_sk, msg) -> (value, proof)` (spec §4.1).
pub fn vrf_eval(sk: &CurveSecretKey, pk: &CurvePublicKey, input: &[u8]) -> (VrfValue, VrfProof) {
    let h_point = hash_to_point(input);
    let gamma = h_point * sk.0;

    // Deterministic nonce so the same (sk, input) always yields the same
    // proof, without weakening soundness (k is only ever reused if the
    // input is reused, at which point the whole VRF output is identical
    // anyway).
    let mut nonce_hasher = Sha512::new();
    nonce_hasher.update(b"vrf-nonce");
    nonce_hasher.update(sk.0.as_bytes());
    nonce_hasher.update(input);
    let k = Scalar::from_hash(nonce_hasher);

    let u = RISTRETTO_BASEPOINT_POINT * k;
    let v = h_point * k;
    let c = fiat_shamir_challenge(&h_point, pk, &gamma, &u, &v);
    let s = k + c * sk.0;

    let value = sha256(&[gamma.compress().as_bytes()]);
    (value, VrfProof { gamma: gamma.compress(), c, s })
}

/// `vrf_verify(vrf_pk, msg, value, proof) -> bool` (spec §4.1).
pub fn vrf_verify(pk: &CurvePublicKey, input: &[u8], value: &VrfValue, proof: &VrfProof) -> bool {
    let Some(gamma) = proof.gamma.decompress() else {
        return false;
    };
    if sha256(&[proof.gamma.as_bytes()]) != *value {
        return false;
    }

    let h_point = hash_to_point(input);
    let Some(pk_point) = pk.0.decompress() else {
        return false;
    };

    let u = RISTRETTO_BASEPOINT_POINT * proof.s - pk_point * proof.c;
    let v = h_point * proof.s - gamma * proof.c;
    let c_check = fiat_shamir_challenge(&h_point, pk, &gamma, &u, &v);
    c_check == proof.c
}

/// `H(tag ‖ input...)`, domain-separated SHA-256 (spec §4.1).
pub fn sha256(parts: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

pub fn derive_key(tag: &'static str, parts: &[&[u8]]) -> [u8; 32] {
    let mut full = vec![tag.as_bytes()];
    full.extend_from_slice(parts);
    sha256(&full)
}

/// ChaCha20-Poly1305 AEAD nonce is 96 bits; we take the leading 12 bytes of
/// the protocol's 128-bit commit nonce. The commit nonce remains 16 bytes
/// end to end for every *key derivation* use (spec §3, §4.2); only the AEAD
/// call itself sees the truncated form, so lookup-key derivation is
/// unaffected.
fn aead_nonce(nonce: &[u8]) -> chacha20poly1305::Nonce {
    *chacha20poly1305::Nonce::from_slice(&nonce[..12])
}

pub fn aead_seal(key: &[u8; 32], nonce: &[u8], aad: &[u8], pt: &[u8]) -> Vec<u8> {
    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .encrypt(&aead_nonce(nonce), Payload { msg: pt, aad })
        .expect("encryption under a freshly derived key cannot fail")
}

pub fn aead_open(key: &[u8; 32], nonce: &[u8], aad: &[u8], ct: &[u8]) -> Option<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(key.into());
    cipher.decrypt(&aead_nonce(nonce), Payload { msg: ct, aad }).ok()
}
