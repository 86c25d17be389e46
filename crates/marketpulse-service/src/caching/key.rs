use std::fmt::{self, Write};
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// The identity of a cached resource.
///
/// Two requests that would produce content-identical upstream responses must
/// produce equal cache keys, and any request parameter that affects the
/// response must contribute to the key.
#[derive(Debug, Clone, Eq)]
pub struct CacheKey {
    metadata: Arc<str>,
    hash: [u8; 32],
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fingerprint())
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl std::hash::Hash for CacheKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl CacheKey {
    /// Create a [`CacheKeyBuilder`] scoped to the given resource kind.
    pub fn builder(resource: &str) -> CacheKeyBuilder {
        CacheKeyBuilder {
            metadata: format!("resource: {resource}\n"),
        }
    }

    /// Returns the human-readable metadata that forms the basis of the [`CacheKey`].
    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    /// A short hex fingerprint of the key, suitable for logs and metrics.
    pub fn fingerprint(&self) -> String {
        let mut out = String::with_capacity(16);
        for b in &self.hash[..8] {
            out.write_fmt(format_args!("{b:02x}")).unwrap();
        }
        out
    }

    #[cfg(test)]
    pub fn for_testing(key: impl Into<String>) -> Self {
        CacheKeyBuilder {
            metadata: key.into(),
        }
        .build()
    }
}

/// A builder for [`CacheKey`]s.
///
/// This builder implements the [`Write`](std::fmt::Write) trait, and the intention of it is to
/// accept human readable, but most importantly **stable**, input.
/// This input is then being hashed to form the [`CacheKey`], and is kept around to help debugging.
pub struct CacheKeyBuilder {
    metadata: String,
}

impl CacheKeyBuilder {
    /// Writes a named request parameter into the [`CacheKey`].
    pub fn write_param(&mut self, name: &str, value: impl fmt::Display) -> fmt::Result {
        self.metadata.write_fmt(format_args!("{name}: {value}\n"))
    }

    /// Finalize the [`CacheKey`].
    pub fn build(self) -> CacheKey {
        let hash = Sha256::digest(&self.metadata);
        // FIXME: `sha2` should really adopt const generics, this is such a pain right now
        let hash = <[u8; 32]>::try_from(hash).expect("sha256 outputs 32 bytes");

        CacheKey {
            metadata: self.metadata.into(),
            hash,
        }
    }
}

impl fmt::Write for CacheKeyBuilder {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.metadata.write_str(s)
    }
}
