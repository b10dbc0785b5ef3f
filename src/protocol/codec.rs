pub mod cipher;
pub mod connection;
pub mod decoder;
pub mod encoder;
pub mod registry;

/// Longest length prefix, which caps frames at 2^21 - 1 bytes.
pub const MAX_HEADER_LENGTH: usize = 3;
pub const MAX_PACKET_SIZE: usize = 2097151;
pub const MAX_UNCOMPRESSED_SIZE: usize = 8 * 1024 * 1024;
