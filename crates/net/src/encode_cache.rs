//! Memoised value encodings for components flagged `CACHE_ENCODING`.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use mdcomponents_core::{ComponentId, ComponentValue, ErasedComponentType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    component: ComponentId,
    allocation: usize,
}

struct CachedEncoding {
    // Holding the value pins its allocation, so the address in the key
    // cannot be reused by a different value while the entry is live.
    _value: ComponentValue,
    bytes: Vec<u8>,
}

/// LRU of encoded value bytes keyed by component and value allocation.
pub struct EncodeCache {
    entries: LruCache<CacheKey, CachedEncoding>,
    hits: u64,
    misses: u64,
}

impl EncodeCache {
    /// Create a cache holding up to `capacity` encodings.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Bytes for `value`, running `encode` only on a miss.
    pub fn get_or_encode<E>(
        &mut self,
        ty: ErasedComponentType,
        value: &ComponentValue,
        encode: impl FnOnce(&mut Vec<u8>) -> Result<(), E>,
    ) -> Result<&[u8], E> {
        let key = CacheKey {
            component: ty.id(),
            allocation: Arc::as_ptr(value) as *const () as usize,
        };
        if self.entries.contains(&key) {
            self.hits += 1;
        } else {
            self.misses += 1;
            let mut bytes = Vec::new();
            encode(&mut bytes)?;
            self.entries.put(
                key,
                CachedEncoding {
                    _value: Arc::clone(value),
                    bytes,
                },
            );
        }
        Ok(self
            .entries
            .get(&key)
            .map(|cached| cached.bytes.as_slice())
            .unwrap_or_default())
    }

    /// Number of cached encodings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookups answered from the cache.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Lookups that had to encode.
    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdcomponents_core::{ComponentFlags, ComponentType};
    use std::convert::Infallible;

    #[test]
    fn encodes_once_per_allocation() {
        let ty = ComponentType::<u32>::new(ComponentFlags::CACHE_ENCODING).erased();
        let value: ComponentValue = Arc::new(7u32);
        let mut cache = EncodeCache::new(NonZeroUsize::new(4).unwrap());
        let mut calls = 0;

        for _ in 0..3 {
            let bytes = cache
                .get_or_encode(ty, &value, |out| {
                    calls += 1;
                    out.push(7);
                    Ok::<_, Infallible>(())
                })
                .unwrap();
            assert_eq!(bytes, &[7]);
        }
        assert_eq!(calls, 1);
        assert_eq!((cache.hits(), cache.misses()), (2, 1));
    }

    #[test]
    fn equal_values_in_distinct_allocations_miss() {
        let ty = ComponentType::<u32>::new(ComponentFlags::CACHE_ENCODING).erased();
        let a: ComponentValue = Arc::new(7u32);
        let b: ComponentValue = Arc::new(7u32);
        let mut cache = EncodeCache::new(NonZeroUsize::new(4).unwrap());
        let encode = |out: &mut Vec<u8>| {
            out.push(7);
            Ok::<_, Infallible>(())
        };
        cache.get_or_encode(ty, &a, encode).unwrap();
        cache.get_or_encode(ty, &b, encode).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn evicts_least_recently_used() {
        let ty = ComponentType::<u32>::new(ComponentFlags::CACHE_ENCODING).erased();
        let mut cache = EncodeCache::new(NonZeroUsize::new(1).unwrap());
        let encode = |out: &mut Vec<u8>| {
            out.push(0);
            Ok::<_, Infallible>(())
        };
        let first: ComponentValue = Arc::new(1u32);
        let second: ComponentValue = Arc::new(2u32);
        cache.get_or_encode(ty, &first, encode).unwrap();
        cache.get_or_encode(ty, &second, encode).unwrap();
        cache.get_or_encode(ty, &first, encode).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.misses(), 3);
    }
}
