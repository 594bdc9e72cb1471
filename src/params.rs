//! Owner/reader key bundles (spec §3, §9: "replace process-wide globals with
//! explicit parameter objects threaded through constructors").

use base64::Engine;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::{
    self, CurvePublicKey, CurveSecretKey, SigPublicKey, SigSecretKey,
};

/// Default nonce length in bytes (spec §3, §6).
pub const DEFAULT_NONCE_SIZE: usize = 16;

/// An owner or reader's secret key bundle: signature, VRF and DH keys.
#[derive(Clone)]
pub struct LocalParams {
    pub sig_sk: SigSecretKey,
    pub vrf_sk: CurveSecretKey,
    pub dh_sk: CurveSecretKey,
    pub nonce_size: usize,
}

impl LocalParams {
    /// Generate a fresh keypair bundle with the default nonce size.
    pub fn generate() -> Self {
        let (sig_sk, _) = crypto::generate_sig_keypair();
        let (vrf_sk, _) = crypto::generate_curve_keypair();
        let (dh_sk, _) = crypto::generate_curve_keypair();
        LocalParams { sig_sk, vrf_sk, dh_sk, nonce_size: DEFAULT_NONCE_SIZE }
    }

    pub fn public_export(&self) -> PublicParams {
        PublicParams {
            sig_pk: self.sig_pk(),
            vrf_pk: self.vrf_pk(),
            dh_pk: self.dh_pk(),
            nonce_size: self.nonce_size,
        }
    }

    pub fn sig_pk(&self) -> SigPublicKey {
        self.sig_sk.verifying_key()
    }

    pub fn vrf_pk(&self) -> CurvePublicKey {
        crypto::curve_public_key(&self.vrf_sk)
    }

    pub fn dh_pk(&self) -> CurvePublicKey {
        crypto::curve_public_key(&self.dh_sk)
    }

    /// Sample a fresh commit nonce of this bundle's configured size.
    pub fn random_nonce(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.nonce_size];
        OsRng.fill_bytes(&mut buf);
        buf
    }
}

/// Public key bundle an owner publishes in a block's metadata (spec §3).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PublicParams {
    pub sig_pk: SigPublicKey,
    pub vrf_pk: CurvePublicKey,
    pub dh_pk: CurvePublicKey,
    pub nonce_size: usize,
}

#[derive(Serialize, Deserialize)]
struct PublicParamsWire {
    sig_pk: String,
    vrf_pk: String,
    dh_pk: String,
    nonce_size: usize,
}

pub(crate) fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub(crate) fn unb64<const N: usize>(s: &str) -> std::result::Result<[u8; N], String> {
    let bytes = unb64_vec(s)?;
    bytes.try_into().map_err(|v: Vec<u8>| format!("expected {N} bytes, got {}", v.len()))
}

pub(crate) fn unb64_vec(s: &str) -> std::result::Result<Vec<u8>, String> {
    base64::engine::general_purpose::STANDARD.decode(s).map_err(|e| e.to_string())
}

impl Serialize for PublicParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        PublicParamsWire {
            sig_pk: b64(self.sig_pk.as_bytes()),
            vrf_pk: b64(&self.vrf_pk.to_bytes()),
            dh_pk: b64(&self.dh_pk.to_bytes()),
            nonce_size: self.nonce_size,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PublicParams {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let wire = PublicParamsWire::deserialize(deserializer)?;
        let sig_bytes: [u8; 32] = unb64(&wire.sig_pk).map_err(DeError::custom)?;
        let sig_pk = SigPublicKey::from_bytes(&sig_bytes).map_err(DeError::custom)?;
        let vrf_bytes: [u8; 32] = unb64(&wire.vrf_pk).map_err(DeError::custom)?;
        let vrf_pk = CurvePublicKey::from_bytes(&vrf_bytes)
            .ok_or_else(|| DeError::custom("invalid vrf_pk point"))?;
        let dh_bytes: [u8; 32] = unb64(&wire.dh_pk).map_err(DeError::custom)?;
        let dh_pk = CurvePublicKey::from_bytes(&dh_bytes)
            .ok_or_else(|| DeError::custom("invalid dh_pk point"))?;
        Ok(PublicParams { sig_pk, vrf_pk, dh_pk, nonce_size: wire.nonce_size })
    }
}
