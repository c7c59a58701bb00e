//! Conversation → contact id caching.
//!
//! Every widget action starts by resolving the contact behind the open
//! conversation, and the mapping never changes while the page lives. This
//! module provides [`ContactIdCache`], an LRU memo of that mapping built on
//! the [`lru`] crate, and [`CachedGateway`], a [`ContactGateway`] decorator
//! that consults the cache before asking the wrapped gateway. It is gated
//! behind the `cache` feature flag.
//!
//! [`CacheStats`] tracks hits, misses and invalidations so the hit rate can be
//! logged or asserted on.
//!
//! # Examples
//!
//! ```
//! use convo_widgets::cache::ContactIdCache;
//!
//! let mut cache = ContactIdCache::new();
//! cache.insert("C1", "X1");
//!
//! assert_eq!(cache.get("C1").as_deref(), Some("X1"));
//! assert_eq!(cache.stats().hits, 1);
//! ```

use crate::error::WidgetError;
use crate::gateway::{ContactGateway, CustomField};
use crate::{debug_log, trace_log};
use async_trait::async_trait;
use lru::LruCache;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::num::NonZeroUsize;

/// Counters tracking cache hit/miss rates and invalidations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: usize,
    /// Lookups that fell through to the gateway.
    pub misses: usize,
    /// Number of full invalidations (via [`ContactIdCache::clear`]).
    pub invalidations: usize,
}

impl CacheStats {
    /// Hit rate as a value in `0.0..=1.0`, `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU memo of conversation id → contact id.
///
/// Default capacity is 256 conversations.
#[derive(Debug)]
pub struct ContactIdCache {
    entries: LruCache<String, String>,
    stats: CacheStats,
}

impl ContactIdCache {
    const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(256) {
        Some(cap) => cap,
        None => NonZeroUsize::MIN,
    };

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            stats: CacheStats::default(),
        }
    }

    /// Cached contact for `conversation_id`. Updates hit/miss stats.
    pub fn get(&mut self, conversation_id: &str) -> Option<String> {
        if let Some(contact_id) = self.entries.get(conversation_id) {
            self.stats.hits += 1;
            trace_log!("contact cache hit for conversation '{}'", conversation_id);
            Some(contact_id.clone())
        } else {
            self.stats.misses += 1;
            trace_log!("contact cache miss for conversation '{}'", conversation_id);
            None
        }
    }

    pub fn insert(&mut self, conversation_id: impl Into<String>, contact_id: impl Into<String>) {
        self.entries.push(conversation_id.into(), contact_id.into());
    }

    /// Drop one mapping, e.g. after the contact turned out to be gone.
    pub fn forget(&mut self, conversation_id: &str) -> bool {
        self.entries.pop(conversation_id).is_some()
    }

    /// Drop everything and count an invalidation.
    pub fn clear(&mut self) {
        let removed = self.entries.len();
        self.entries.clear();
        self.stats.invalidations += 1;
        debug_log!(
            "contact cache cleared: {} entries removed ({} invalidations, hit rate {:.1}%)",
            removed,
            self.stats.invalidations,
            self.stats.hit_rate() * 100.0
        );
    }

    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ContactIdCache {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// CachedGateway
// ============================================================================

/// [`ContactGateway`] decorator memoising [`resolve_contact_id`](ContactGateway::resolve_contact_id).
///
/// Failed lookups are not cached. All other operations pass straight through.
pub struct CachedGateway<G> {
    inner: G,
    cache: RefCell<ContactIdCache>,
}

impl<G: ContactGateway> CachedGateway<G> {
    pub fn new(inner: G) -> Self {
        Self::with_cache(inner, ContactIdCache::new())
    }

    pub fn with_cache(inner: G, cache: ContactIdCache) -> Self {
        Self {
            inner,
            cache: RefCell::new(cache),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.borrow().stats().clone()
    }

    pub fn clear(&self) {
        self.cache.borrow_mut().clear();
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

#[async_trait(?Send)]
impl<G: ContactGateway> ContactGateway for CachedGateway<G> {
    async fn resolve_contact_id(&self, conversation_id: &str) -> Result<String, WidgetError> {
        let cached = self.cache.borrow_mut().get(conversation_id);
        if let Some(contact_id) = cached {
            return Ok(contact_id);
        }
        let contact_id = self.inner.resolve_contact_id(conversation_id).await?;
        self.cache
            .borrow_mut()
            .insert(conversation_id, contact_id.clone());
        Ok(contact_id)
    }

    async fn get_custom_fields(&self, contact_id: &str) -> Result<Vec<CustomField>, WidgetError> {
        self.inner.get_custom_fields(contact_id).await
    }

    async fn update_custom_fields(
        &self,
        contact_id: &str,
        fields: &[CustomField],
    ) -> Result<(), WidgetError> {
        self.inner.update_custom_fields(contact_id, fields).await
    }

    async fn get_tags(&self, contact_id: &str) -> Result<BTreeSet<String>, WidgetError> {
        self.inner.get_tags(contact_id).await
    }

    async fn add_tag(&self, contact_id: &str, tag: &str) -> Result<(), WidgetError> {
        self.inner.add_tag(contact_id, tag).await
    }

    async fn remove_tag(&self, contact_id: &str, tag: &str) -> Result<(), WidgetError> {
        self.inner.remove_tag(contact_id, tag).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_cache_miss_then_hit() {
        let mut cache = ContactIdCache::new();
        assert!(cache.get("C1").is_none());
        cache.insert("C1", "X1");
        assert_eq!(cache.get("C1").as_deref(), Some("X1"));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
        assert!((cache.stats().hit_rate() - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = ContactIdCache::with_capacity(NonZeroUsize::new(2).unwrap());
        cache.insert("C1", "X1");
        cache.insert("C2", "X2");
        cache.get("C1");
        cache.insert("C3", "X3");
        assert_eq!(cache.len(), 2);
        assert!(cache.get("C2").is_none());
        assert!(cache.get("C1").is_some());
    }

    #[test]
    fn test_clear_and_forget() {
        let mut cache = ContactIdCache::new();
        cache.insert("C1", "X1");
        assert!(cache.forget("C1"));
        assert!(!cache.forget("C1"));
        cache.insert("C2", "X2");
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().invalidations, 1);
        cache.reset_stats();
        assert_eq!(cache.stats(), &CacheStats::default());
    }

    struct CountingGateway {
        lookups: Cell<usize>,
    }

    #[async_trait(?Send)]
    impl ContactGateway for CountingGateway {
        async fn resolve_contact_id(&self, conversation_id: &str) -> Result<String, WidgetError> {
            self.lookups.set(self.lookups.get() + 1);
            if conversation_id == "missing" {
                return Err(WidgetError::NotFound {
                    conversation_id: conversation_id.to_string(),
                });
            }
            Ok(format!("contact-of-{conversation_id}"))
        }

        async fn get_custom_fields(&self, _: &str) -> Result<Vec<CustomField>, WidgetError> {
            Ok(Vec::new())
        }

        async fn update_custom_fields(&self, _: &str, _: &[CustomField]) -> Result<(), WidgetError> {
            Ok(())
        }

        async fn get_tags(&self, _: &str) -> Result<BTreeSet<String>, WidgetError> {
            Ok(BTreeSet::new())
        }

        async fn add_tag(&self, _: &str, _: &str) -> Result<(), WidgetError> {
            Ok(())
        }

        async fn remove_tag(&self, _: &str, _: &str) -> Result<(), WidgetError> {
            Ok(())
        }
    }

    #[test]
    fn test_cached_gateway_memoises_successes_only() {
        let gateway = CachedGateway::new(CountingGateway {
            lookups: Cell::new(0),
        });

        for _ in 0..3 {
            let id = pollster::block_on(gateway.resolve_contact_id("C1")).unwrap();
            assert_eq!(id, "contact-of-C1");
        }
        assert_eq!(gateway.inner().lookups.get(), 1);

        for _ in 0..2 {
            assert!(pollster::block_on(gateway.resolve_contact_id("missing")).is_err());
        }
        assert_eq!(gateway.inner().lookups.get(), 3);
        assert_eq!(gateway.stats().hits, 2);
        assert_eq!(gateway.stats().misses, 3);
    }
}
