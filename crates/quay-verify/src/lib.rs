//! Streaming digest primitives for transferred artifacts.
//!
//! Remote repositories publish integrity sidecars as hex digests of the
//! main resource, historically SHA-1 with an MD5 fallback. This crate
//! provides the hashing mechanism only: incremental hashers fed once per
//! body chunk, a [`MultiDigester`] that maintains both algorithms in a
//! single pass, and the tolerant hex comparison used against sidecar
//! contents. Verification *policy* (strict/warn/ignore) belongs to the
//! caller.

pub use self::hasher::{Hasher, Md5Hasher, Sha1Hasher};
pub use self::multi::{DigestPair, MultiDigester, hex_eq};

mod hasher;
mod multi;
