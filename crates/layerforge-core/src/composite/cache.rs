use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use parking_lot::RwLock;

/// Process-wide cache of decoded trait rasters, bounded by total decoded
/// pixel count. Lookups take the shared lock (recency is stamped through an
/// atomic, so readers never upgrade); inserts take the exclusive lock and
/// evict least-recently-used entries until the newcomer fits.
pub struct DecodeCache {
    max_pixels: u64,
    clock: AtomicU64,
    inner: RwLock<CacheInner>,
}

struct CacheInner {
    entries: HashMap<(usize, usize), CacheEntry>,
    used_pixels: u64,
}

struct CacheEntry {
    image: Arc<RgbaImage>,
    pixels: u64,
    last_used: AtomicU64,
}

impl DecodeCache {
    pub fn new(max_pixels: u64) -> Self {
        Self {
            max_pixels,
            clock: AtomicU64::new(0),
            inner: RwLock::new(CacheInner {
                entries: HashMap::new(),
                used_pixels: 0,
            }),
        }
    }

    pub fn get(&self, key: (usize, usize)) -> Option<Arc<RgbaImage>> {
        let inner = self.inner.read();
        let entry = inner.entries.get(&key)?;
        entry
            .last_used
            .store(self.clock.fetch_add(1, Ordering::Relaxed) + 1, Ordering::Relaxed);
        Some(Arc::clone(&entry.image))
    }

    pub fn insert(&self, key: (usize, usize), image: Arc<RgbaImage>) {
        let pixels = u64::from(image.width()) * u64::from(image.height());
        // Larger than the whole budget: serve it uncached.
        if pixels > self.max_pixels {
            return;
        }

        let mut inner = self.inner.write();
        if inner.entries.contains_key(&key) {
            return;
        }
        while inner.used_pixels + pixels > self.max_pixels {
            let victim = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used.load(Ordering::Relaxed))
                .map(|(k, _)| *k);
            let Some(victim) = victim else { break };
            if let Some(evicted) = inner.entries.remove(&victim) {
                inner.used_pixels -= evicted.pixels;
            }
        }

        inner.used_pixels += pixels;
        inner.entries.insert(
            key,
            CacheEntry {
                image,
                pixels,
                last_used: AtomicU64::new(self.clock.fetch_add(1, Ordering::Relaxed) + 1),
            },
        );
    }

    pub fn used_pixels(&self) -> u64 {
        self.inner.read().used_pixels
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> Arc<RgbaImage> {
        Arc::new(RgbaImage::new(width, height))
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = DecodeCache::new(1024);
        assert!(cache.get((0, 0)).is_none());

        cache.insert((0, 0), frame(4, 4));
        assert!(cache.get((0, 0)).is_some());
        assert_eq!(cache.used_pixels(), 16);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_eviction_order() {
        // Room for exactly two 4x4 frames.
        let cache = DecodeCache::new(32);
        cache.insert((0, 0), frame(4, 4));
        cache.insert((0, 1), frame(4, 4));

        // Touch the older entry so (0, 1) becomes the eviction victim.
        cache.get((0, 0));
        cache.insert((0, 2), frame(4, 4));

        assert!(cache.get((0, 0)).is_some());
        assert!(cache.get((0, 1)).is_none());
        assert!(cache.get((0, 2)).is_some());
        assert_eq!(cache.used_pixels(), 32);
    }

    #[test]
    fn test_oversized_frame_is_not_cached() {
        let cache = DecodeCache::new(8);
        cache.insert((0, 0), frame(4, 4));
        assert!(cache.is_empty());
        assert_eq!(cache.used_pixels(), 0);
    }
}
