//! Bounded answer memo.
//!
//! Keyed by the trimmed query text. An entry is only ever inserted for
//! answers computed from process-local state, so a hit returns exactly what a
//! fresh computation would.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

use crate::pipeline::Answer;

pub struct AnswerCache {
    inner: Option<Mutex<LruCache<String, Answer>>>,
}

impl AnswerCache {
    /// A capacity of `0` disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn get(&self, query: &str) -> Option<Answer> {
        let inner = self.inner.as_ref()?;
        inner.lock().get(query).cloned()
    }

    pub fn insert(&self, query: &str, answer: &Answer) {
        if let Some(inner) = &self.inner {
            inner.lock().put(query.to_string(), answer.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |m| m.lock().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Category;
    use crate::pipeline::AnswerSource;

    fn answer(content: &str) -> Answer {
        Answer {
            content: content.to_string(),
            category: Category::General,
            vector_hits: 0,
            source: AnswerSource::Composed,
            cached: false,
        }
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = AnswerCache::new(4);
        assert!(cache.get("q").is_none());
        cache.insert("q", &answer("a"));
        assert_eq!(cache.get("q").unwrap().content, "a");
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = AnswerCache::new(2);
        cache.insert("a", &answer("1"));
        cache.insert("b", &answer("2"));
        cache.get("a");
        cache.insert("c", &answer("3"));
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_capacity_disables() {
        let cache = AnswerCache::new(0);
        cache.insert("q", &answer("a"));
        assert!(!cache.is_enabled());
        assert!(cache.get("q").is_none());
        assert!(cache.is_empty());
    }
}
