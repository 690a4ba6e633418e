// Authenticated API access layer
pub mod client;
pub mod connectivity;
pub mod error;
pub mod signer;

pub use client::{is_invalid_keys_payload, SignedApiClient, INVALID_KEYS_SENTINEL};
pub use connectivity::ConnectivityGate;
pub use error::{ApiError, ApiResult};
pub use signer::RequestSigner;
