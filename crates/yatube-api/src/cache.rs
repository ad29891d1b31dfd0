use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use yatube_types::api::Page;
use yatube_types::models::Post;

/// Upper bound on cached global-feed pages.
pub const MAX_CACHED_PAGES: usize = 64;

struct CachedPage {
    stored_at: Instant,
    page: Page<Post>,
}

#[derive(Default)]
struct CacheState {
    /// Bumped by every invalidation.
    generation: u64,
    pages: HashMap<u32, CachedPage>,
}

/// Short-lived cache of global-feed pages, keyed by page number.
///
/// Entries expire after `ttl`. Any new post clears every entry, since it
/// shifts the contents of all pages. Edits do not invalidate; they show up
/// once the entry expires.
///
/// A page built before an invalidation must not be stored after it. Readers
/// take `generation()` before querying and hand it back to `put_global`,
/// which drops the page if an invalidation happened in between.
pub struct FeedCache {
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl FeedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn generation(&self) -> u64 {
        self.state().generation
    }

    pub fn get_global(&self, page_number: u32) -> Option<Page<Post>> {
        let mut state = self.state();
        match state.pages.get(&page_number) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                debug!("Global feed cache hit for page {}", page_number);
                Some(entry.page.clone())
            }
            Some(_) => {
                state.pages.remove(&page_number);
                None
            }
            None => None,
        }
    }

    /// Store a page read while the cache was at `generation`.
    pub fn put_global(&self, generation: u64, page_number: u32, page: Page<Post>) {
        if self.ttl.is_zero() {
            return;
        }

        let mut state = self.state();
        if state.generation != generation {
            debug!("Dropping global feed page {} built before an invalidation", page_number);
            return;
        }

        if state.pages.len() >= MAX_CACHED_PAGES && !state.pages.contains_key(&page_number) {
            let oldest = state
                .pages
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(number, _)| *number);
            if let Some(number) = oldest {
                state.pages.remove(&number);
            }
        }

        state.pages.insert(
            page_number,
            CachedPage {
                stored_at: Instant::now(),
                page,
            },
        );
    }

    pub fn invalidate_global(&self) {
        let mut state = self.state();
        state.generation = state.generation.wrapping_add(1);
        if !state.pages.is_empty() {
            debug!("Invalidating {} cached global feed pages", state.pages.len());
            state.pages.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.state().pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the lock cannot leave a half-written entry
    // behind, so a poisoned map is still usable.
    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
