//! Lazily produced element sequences with explicit release
//!
//! An [`ElementStream`] owns a [`ReleaseHandle`]. The handle's callback runs
//! exactly once: on [`ElementStream::close`], when the stream is exhausted,
//! when it is dropped, or when the chain engine releases it after a failure.
//! Clones of the handle share the same once-only state.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::domain::element::Element;

type ReleaseFn = Box<dyn FnOnce() + Send>;

struct ReleaseState {
    released: AtomicBool,
    callback: Mutex<Option<ReleaseFn>>,
}

/// Shared once-only release callback
#[derive(Clone)]
pub struct ReleaseHandle(Arc<ReleaseState>);

impl ReleaseHandle {
    /// A handle running `callback` on first release
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Arc::new(ReleaseState {
            released: AtomicBool::new(false),
            callback: Mutex::new(Some(Box::new(callback))),
        }))
    }

    /// A handle with nothing to release
    pub fn noop() -> Self {
        Self(Arc::new(ReleaseState {
            released: AtomicBool::new(false),
            callback: Mutex::new(None),
        }))
    }

    /// Run the callback if no one has yet; returns whether this call did
    pub fn release(&self) -> bool {
        if self.0.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        let callback = self
            .0
            .callback
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(callback) = callback {
            callback();
        }
        true
    }

    /// Whether the handle has been released
    pub fn is_released(&self) -> bool {
        self.0.released.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ReleaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseHandle")
            .field("released", &self.is_released())
            .finish()
    }
}

/// A single-consumer stream of elements
pub struct ElementStream {
    iter: Box<dyn Iterator<Item = Element> + Send>,
    release: ReleaseHandle,
}

impl ElementStream {
    /// Wrap an iterator with a release handle
    pub fn new<I>(iter: I, release: ReleaseHandle) -> Self
    where
        I: Iterator<Item = Element> + Send + 'static,
    {
        Self {
            iter: Box::new(iter),
            release,
        }
    }

    /// A materialised stream with nothing to release
    pub fn from_vec(elements: Vec<Element>) -> Self {
        Self::new(elements.into_iter(), ReleaseHandle::noop())
    }

    /// An empty stream
    pub fn empty() -> Self {
        Self::from_vec(Vec::new())
    }

    /// The shared release handle
    pub fn release_handle(&self) -> ReleaseHandle {
        self.release.clone()
    }

    /// Release the underlying resources now
    pub fn close(self) {
        self.release.release();
    }

    /// Keep elements matching `predicate`
    pub fn filter<P>(self, predicate: P) -> Self
    where
        P: FnMut(&Element) -> bool + Send + 'static,
    {
        let release = self.release.clone();
        ElementStream::new(Iterator::filter(self, predicate), release)
    }

    /// Transform each element
    pub fn map<F>(self, f: F) -> Self
    where
        F: FnMut(Element) -> Element + Send + 'static,
    {
        let release = self.release.clone();
        ElementStream::new(Iterator::map(self, f), release)
    }

    /// Keep at most `limit` elements
    pub fn take(self, limit: usize) -> Self {
        let release = self.release.clone();
        ElementStream::new(Iterator::take(self, limit), release)
    }
}

impl Iterator for ElementStream {
    type Item = Element;

    fn next(&mut self) -> Option<Element> {
        if self.release.is_released() {
            return None;
        }
        let next = self.iter.next();
        if next.is_none() {
            self.release.release();
        }
        next
    }
}

impl Drop for ElementStream {
    fn drop(&mut self) {
        self.release.release();
    }
}

impl fmt::Debug for ElementStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementStream")
            .field("release", &self.release)
            .finish_non_exhaustive()
    }
}
