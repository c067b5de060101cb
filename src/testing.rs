// Lockbox - Test helpers shared across module tests

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::policy::{AuthOutcome, AuthRequest, AuthenticationContext};

/// Authentication context that always answers with the same outcome and
/// records how often it was asked.
pub struct FixedAuth {
    outcome: AuthOutcome,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl FixedAuth {
    pub fn new(outcome: AuthOutcome) -> Self {
        Self {
            outcome,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().clone()
    }
}

impl AuthenticationContext for FixedAuth {
    fn evaluate(&self, request: &AuthRequest<'_>) -> AuthOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = request.prompt.map(str::to_string);
        self.outcome
    }
}

/// Authentication context that runs `interleave` while its first prompt is
/// open, as a second writer would, grants that prompt and answers every
/// later one with `then`.
pub struct InterleavedAuth {
    interleave: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    then: AuthOutcome,
    calls: AtomicUsize,
}

impl InterleavedAuth {
    pub fn new(then: AuthOutcome, interleave: impl FnOnce() + Send + 'static) -> Self {
        Self {
            interleave: Mutex::new(Some(Box::new(interleave))),
            then,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AuthenticationContext for InterleavedAuth {
    fn evaluate(&self, _request: &AuthRequest<'_>) -> AuthOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.interleave.lock().take();
        match pending {
            Some(interleave) => {
                interleave();
                AuthOutcome::Granted
            }
            None => self.then,
        }
    }
}
