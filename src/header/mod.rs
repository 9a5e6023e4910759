//! Per-version file header handlers: passphrase verification, cipher
//! construction, and format discrimination.

pub mod v1;
pub mod v2;
pub mod v3;

pub use v1::HeaderV1;
pub use v2::HeaderV2;
pub use v3::HeaderV3;
