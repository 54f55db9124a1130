//! Cryptographic primitives for the channel
//!
//! - `suite`: the `CryptoSuite` provider trait and its XChaCha20-Poly1305
//!   implementation
//! - `transport`: `nonce || ciphertext` slot framing
//! - `keys`: channel key schedule and auth key selection

mod error;
pub mod keys;
pub mod suite;
pub mod transport;

pub use error::{CryptoError, CryptoResult};
pub use keys::{AuthKeySource, ChannelKeys};
pub use suite::{CryptoSuite, XChaChaSuite};
pub use transport::{Transport, WIRE_NONCE_LEN};
