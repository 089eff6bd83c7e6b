//! Deterministic hashing of allocation keys.
//!
//! Bucket stability is a cross-deployment contract: a visitor must land in the same bucket no
//! matter which service evaluates the allocation. The hash is therefore pinned to 32-bit FNV-1a and
//! must stay bit-exact.

/// 32-bit FNV offset basis.
pub const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
/// 32-bit FNV prime.
pub const FNV_PRIME: u32 = 16_777_619;

/// Streaming 32-bit FNV-1a state.
///
/// Feeding input in several `write` calls produces the same hash as feeding the concatenation in
/// one call, which lets callers hash `visitor:experiment` without building the string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fnv1a(u32);

impl Fnv1a {
    pub const fn new() -> Self {
        Self(FNV_OFFSET_BASIS)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.write_unit(byte as u32);
        }
    }

    /// Mix a single input unit. Units wider than a byte are only produced by
    /// [`Utf16Fnv1aSharder`].
    #[inline]
    fn write_unit(&mut self, unit: u32) {
        self.0 ^= unit;
        self.0 = self.0.wrapping_mul(FNV_PRIME);
    }

    pub const fn finish(&self) -> u32 {
        self.0
    }
}

impl Default for Fnv1a {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash `input` with 32-bit FNV-1a over its bytes.
///
/// ```
/// assert_eq!(hypo::fnv1a_32(""), 2_166_136_261);
/// ```
pub fn fnv1a_32(input: impl AsRef<[u8]>) -> u32 {
    let mut hasher = Fnv1a::new();
    hasher.write(input.as_ref());
    hasher.finish()
}

/// Maps an allocation key to a shard.
///
/// The key is given as segments that are hashed as if they were concatenated.
pub trait Sharder {
    fn hash(&self, key: &[&str]) -> u32;

    fn get_shard(&self, key: &[&str], total_shards: u32) -> u32 {
        self.hash(key) % total_shards
    }
}

/// The default sharder: FNV-1a over the UTF-8 bytes of the key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fnv1aSharder;

impl Sharder for Fnv1aSharder {
    fn hash(&self, key: &[&str]) -> u32 {
        let mut hasher = Fnv1a::new();
        for segment in key {
            hasher.write(segment.as_bytes());
        }
        hasher.finish()
    }
}

/// FNV-1a over UTF-16 code units, as computed by browser-side allocators.
///
/// Agrees with [`Fnv1aSharder`] on ASCII keys. Use it only to reproduce historical buckets of
/// non-ASCII visitor or experiment ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf16Fnv1aSharder;

impl Sharder for Utf16Fnv1aSharder {
    fn hash(&self, key: &[&str]) -> u32 {
        let mut hasher = Fnv1a::new();
        for segment in key {
            for unit in segment.encode_utf16() {
                hasher.write_unit(unit as u32);
            }
        }
        hasher.finish()
    }
}

#[cfg(test)]
pub struct DeterministicSharder(std::collections::HashMap<String, u32>);

#[cfg(test)]
impl DeterministicSharder {
    pub fn new(hashes: impl IntoIterator<Item = (&'static str, u32)>) -> Self {
        Self(
            hashes
                .into_iter()
                .map(|(key, hash)| (key.to_owned(), hash))
                .collect(),
        )
    }
}

#[cfg(test)]
impl Sharder for DeterministicSharder {
    fn hash(&self, key: &[&str]) -> u32 {
        self.0.get(&key.concat()).copied().unwrap_or(0)
    }
}
