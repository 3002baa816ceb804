//! Memo of volumes already built during this run.
//!
//! Keyed by `uppercase(UiFvName) + "fv"`. Entries are never invalidated
//! within a run. A key is built at most once: a second requester arriving
//! while the first build is in flight waits for it instead of racing.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::Result;

#[derive(Debug, Clone)]
enum Slot {
    Building,
    Ready(PathBuf),
}

/// Outcome of [`ImageCache::get_or_build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cached {
    /// The path was already cached (or built by another caller).
    Hit(PathBuf),
    /// This call ran the build.
    Built(PathBuf),
}

impl Cached {
    pub fn path(&self) -> &PathBuf {
        match self {
            Cached::Hit(p) | Cached::Built(p) => p,
        }
    }

    pub fn into_path(self) -> PathBuf {
        match self {
            Cached::Hit(p) | Cached::Built(p) => p,
        }
    }
}

#[derive(Debug, Default)]
pub struct ImageCache {
    slots: Mutex<HashMap<String, Slot>>,
    settled: Condvar,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for a volume name.
    pub fn key_for(ui_name: &str) -> String {
        format!("{}fv", ui_name.to_uppercase())
    }

    /// Path of a finished build, if any.
    pub fn get(&self, ui_name: &str) -> Option<PathBuf> {
        match self.slots.lock().get(&Self::key_for(ui_name)) {
            Some(Slot::Ready(path)) => Some(path.clone()),
            _ => None,
        }
    }

    /// Whether `ui_name` is built or being built.
    pub fn contains(&self, ui_name: &str) -> bool {
        self.slots.lock().contains_key(&Self::key_for(ui_name))
    }

    /// Record an externally produced image.
    pub fn insert(&self, ui_name: &str, path: PathBuf) {
        self.slots
            .lock()
            .insert(Self::key_for(ui_name), Slot::Ready(path));
        self.settled.notify_all();
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|s| matches!(s, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached path for `ui_name`, running `build` if no caller has
    /// built it yet.
    ///
    /// `build` runs without the lock held. If it fails the slot is cleared
    /// and the error returned to this caller only; waiters then find the key
    /// vacant and run their own build.
    pub fn get_or_build<F>(&self, ui_name: &str, build: F) -> Result<Cached>
    where
        F: FnOnce() -> Result<PathBuf>,
    {
        let key = Self::key_for(ui_name);
        {
            let mut slots = self.slots.lock();
            loop {
                match slots.get(&key) {
                    Some(Slot::Ready(path)) => return Ok(Cached::Hit(path.clone())),
                    Some(Slot::Building) => self.settled.wait(&mut slots),
                    None => {
                        slots.insert(key.clone(), Slot::Building);
                        break;
                    }
                }
            }
        }

        let mut guard = InFlight {
            cache: self,
            key: &key,
            done: false,
        };
        let path = build()?;
        self.slots.lock().insert(key.clone(), Slot::Ready(path.clone()));
        guard.done = true;
        self.settled.notify_all();
        Ok(Cached::Built(path))
    }
}

/// Clears a `Building` slot if the build errors or panics.
struct InFlight<'a> {
    cache: &'a ImageCache,
    key: &'a str,
    done: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.cache.slots.lock().remove(self.key);
            self.cache.settled.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FdsError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn key_is_case_insensitive() {
        assert_eq!(ImageCache::key_for("FvMain"), "FVMAINfv");
        let cache = ImageCache::new();
        cache.insert("fvmain", PathBuf::from("/b/FVMAIN.Fv"));
        assert_eq!(cache.get("FvMain"), Some(PathBuf::from("/b/FVMAIN.Fv")));
        assert!(cache.contains("FVMAIN"));
    }

    #[test]
    fn second_request_is_a_hit() {
        let cache = ImageCache::new();
        let first = cache
            .get_or_build("FvRecovery", || Ok(PathBuf::from("/b/FvRecovery.Fv")))
            .unwrap();
        assert!(matches!(first, Cached::Built(_)));
        let second = cache
            .get_or_build("FVRECOVERY", || panic!("rebuilt a cached volume"))
            .unwrap();
        assert_eq!(second, Cached::Hit(PathBuf::from("/b/FvRecovery.Fv")));
    }

    #[test]
    fn failed_build_is_not_cached() {
        let cache = ImageCache::new();
        let err = cache
            .get_or_build("FvMain", || Err(FdsError::tool("GenFv", "boom")))
            .unwrap_err();
        assert!(matches!(err, FdsError::BuildTool { .. }));
        assert!(!cache.contains("FvMain"));
        assert!(cache
            .get_or_build("FvMain", || Ok(PathBuf::from("/b/FvMain.Fv")))
            .is_ok());
    }

    #[test]
    fn concurrent_requests_build_once() {
        let cache = Arc::new(ImageCache::new());
        let builds = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let builds = Arc::clone(&builds);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_build("FvMain", || {
                            builds.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(50));
                            Ok(PathBuf::from("/b/FvMain.Fv"))
                        })
                        .unwrap()
                        .into_path()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), PathBuf::from("/b/FvMain.Fv"));
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }
}
