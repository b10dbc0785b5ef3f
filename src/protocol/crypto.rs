//! Key exchange of the online-mode login.
//!
//! The server owns one RSA key pair for its whole lifetime. Each login gets a
//! fresh [`AuthSession`]; the client answers with a random AES secret and the
//! verify token, both encrypted with the public key.

use num_bigint::BigInt;
use rand::{rngs::OsRng, RngCore};
use rsa::{
    pkcs8::{DecodePublicKey, EncodePublicKey},
    Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey,
};
use sha1::{Digest, Sha1};

use crate::error::AuthError;

pub const KEY_BITS: usize = 1024;
pub const VERIFY_TOKEN_LENGTH: usize = 4;

/// Challenge issued to one connection, consumed by [`EncryptionContext::complete_handshake`].
#[derive(Debug)]
pub struct AuthSession {
    pub server_id: String,
    pub verify_token: [u8; VERIFY_TOKEN_LENGTH],
}

pub struct EncryptionContext {
    private_key: RsaPrivateKey,
    public_key_der: Vec<u8>,
}

impl EncryptionContext {
    pub fn generate() -> Result<Self, AuthError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, KEY_BITS)?;
        let public_key_der = RsaPublicKey::from(&private_key)
            .to_public_key_der()?
            .as_bytes()
            .to_vec();

        Ok(Self { private_key, public_key_der })
    }

    /// X.509 SubjectPublicKeyInfo, as sent in the encryption request.
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }

    pub fn challenge(&self) -> AuthSession {
        let mut verify_token = [0; VERIFY_TOKEN_LENGTH];
        OsRng.fill_bytes(&mut verify_token);

        // Servers past 1.7 send an empty id; the hash still covers it.
        AuthSession { server_id: String::new(), verify_token }
    }

    /// Checks the echoed token and recovers the shared secret.
    pub fn complete_handshake(
        &self,
        session: AuthSession,
        encrypted_verify_token: &[u8],
        encrypted_shared_secret: &[u8],
    ) -> Result<[u8; 16], AuthError> {
        let verify_token = self.private_key.decrypt(Pkcs1v15Encrypt, encrypted_verify_token)?;
        if verify_token != session.verify_token {
            return Err(AuthError::VerifyTokenMismatch);
        }

        let secret = self.private_key.decrypt(Pkcs1v15Encrypt, encrypted_shared_secret)?;
        secret
            .as_slice()
            .try_into()
            .map_err(|_| AuthError::InvalidSecret(secret.len()))
    }
}

/// What a client sends back to an encryption request.
pub struct ClientResponse {
    pub secret: [u8; 16],
    pub encrypted_secret: Vec<u8>,
    pub encrypted_verify_token: Vec<u8>,
}

/// Client side of the exchange, used when dialling a backend in online mode.
pub fn encrypt_for(public_key_der: &[u8], verify_token: &[u8]) -> Result<ClientResponse, AuthError> {
    let public_key = RsaPublicKey::from_public_key_der(public_key_der)?;

    let mut secret = [0; 16];
    OsRng.fill_bytes(&mut secret);

    Ok(ClientResponse {
        secret,
        encrypted_secret: public_key.encrypt(&mut OsRng, Pkcs1v15Encrypt, &secret)?,
        encrypted_verify_token: public_key.encrypt(&mut OsRng, Pkcs1v15Encrypt, verify_token)?,
    })
}

/// SHA-1 over id, secret and key, printed as a signed hexadecimal number.
pub fn server_hash(server_id: &str, secret: &[u8], public_key: &[u8]) -> String {
    let hash = Sha1::new()
        .chain_update(server_id.as_bytes())
        .chain_update(secret)
        .chain_update(public_key)
        .finalize();
    BigInt::from_signed_bytes_be(&hash).to_str_radix(16)
}
