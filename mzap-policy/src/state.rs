//! Shared policy handle
//!
//! The manager itself is single-threaded: every entry point takes
//! `&mut self`. [`SharedPolicy`] serializes callers from several threads
//! behind one mutex, the way an audio service holds its policy lock for
//! the duration of each call.

use crate::client::AudioPolicyClient;
use crate::policy::AudioPolicyManager;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cloneable, thread-safe handle to one policy manager
pub struct SharedPolicy<C: AudioPolicyClient> {
    inner: Arc<Mutex<AudioPolicyManager<C>>>,
}

impl<C: AudioPolicyClient> SharedPolicy<C> {
    pub fn new(manager: AudioPolicyManager<C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(manager)),
        }
    }

    /// Exclusive access for the lifetime of the guard
    ///
    /// A panic in another holder does not leave the policy unusable; the
    /// state it left behind is taken as is.
    pub fn lock(&self) -> MutexGuard<'_, AudioPolicyManager<C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access to the manager
    pub fn with<R>(&self, f: impl FnOnce(&mut AudioPolicyManager<C>) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }
}

impl<C: AudioPolicyClient> Clone for SharedPolicy<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
