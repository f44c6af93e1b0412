use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;

use crate::types::StateNonce;

/// Generates the `state` parameter for an authorization request.
///
/// 32 random bytes from the thread-local CSPRNG, base64url encoded
/// (43 characters).
#[must_use]
pub fn generate_state() -> StateNonce {
    let random_bytes: [u8; 32] = rand::rng().random();
    StateNonce(URL_SAFE_NO_PAD.encode(random_bytes))
}

/// Generates the anti-forgery token embedded in the app shell.
#[must_use]
pub fn generate_csrf_token() -> String {
    let random_bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}
