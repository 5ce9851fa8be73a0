//! Cancellable, parameterized workflows
//!
//! A [`FlowController`] backs every modal-style interaction: "start
//! purchase", "ending soon" notice, "low balance" notice. Async work started
//! on behalf of a flow captures a [`FlowToken`] and checks it after every
//! suspension point.
//!
//! Cancellation is a generation counter. Aborting bumps the counter, and a
//! token whose captured generation differs from the live one reads as
//! aborted forever. Nothing is recycled on a timer.

use crate::atom::Atom;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Cancellation handle captured at the start of a unit of async work.
#[derive(Debug, Clone)]
pub struct FlowToken {
    generation: u64,
    live: Arc<AtomicU64>,
}

impl FlowToken {
    /// True once the owning flow was closed or aborted after this token
    /// was taken.
    pub fn is_aborted(&self) -> bool {
        self.live.load(Ordering::Acquire) != self.generation
    }

    /// Generation this token was issued for.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Open/close state of one parameterized workflow.
pub struct FlowController<P> {
    is_open: Atom<bool>,
    params: Atom<Option<P>>,
    generation: Arc<AtomicU64>,
}

impl<P> Clone for FlowController<P> {
    fn clone(&self) -> Self {
        Self {
            is_open: self.is_open.clone(),
            params: self.params.clone(),
            generation: Arc::clone(&self.generation),
        }
    }
}

impl<P: Clone + Send + Sync + 'static> FlowController<P> {
    /// Create a closed flow.
    pub fn new() -> Self {
        Self {
            is_open: Atom::new(false),
            params: Atom::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Set params, then mark the flow open.
    ///
    /// Opening an open flow replaces the params and stays open. Outstanding
    /// tokens are not touched; use [`abort`](Self::abort) to supersede work.
    pub fn open(&self, params: P) {
        self.params.next(Some(params));
        if !self.is_open.value() {
            self.is_open.next(true);
        }
    }

    /// Mark the flow closed and abort its current token.
    ///
    /// Closing a closed flow is a no-op.
    pub fn close(&self) {
        if !self.is_open.value() {
            return;
        }
        self.abort();
        self.is_open.next(false);
    }

    /// Invalidate every outstanding token without changing `is_open`.
    pub fn abort(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(generation, "flow token aborted");
    }

    /// Token for the current generation.
    pub fn token(&self) -> FlowToken {
        FlowToken {
            generation: self.generation.load(Ordering::Acquire),
            live: Arc::clone(&self.generation),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        self.is_open.value()
    }

    pub fn params(&self) -> Option<P> {
        self.params.value()
    }

    /// Observable open state.
    pub fn is_open_atom(&self) -> &Atom<bool> {
        &self.is_open
    }

    /// Observable params.
    pub fn params_atom(&self) -> &Atom<Option<P>> {
        &self.params
    }
}

impl<P: Clone + Send + Sync + 'static> Default for FlowController<P> {
    fn default() -> Self {
        Self::new()
    }
}
