//! Fixed-width 80-byte record exchange with the batch peer

pub mod codec;
pub mod encoding;
pub mod fields;

pub use codec::RecordCodec;
pub use encoding::Encoding;
