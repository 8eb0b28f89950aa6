use std::cell::{Cell, RefCell};
use std::fmt;

use tracing::debug;

/// Page state that changes only through messages.
pub trait Reduce {
    type Msg: fmt::Debug;

    fn reduce(&mut self, msg: Self::Msg);
}

/// Single-threaded container for one page's state.
///
/// Async completions dispatch in the order they resolve and nothing orders
/// them further, so when two requests touching the same field race, the one
/// that finishes last decides the local value.
pub struct PageStore<S> {
    page: &'static str,
    state: RefCell<S>,
    revision: Cell<u64>,
}

impl<S: Reduce> PageStore<S> {
    pub fn new(page: &'static str, state: S) -> Self {
        Self {
            page,
            state: RefCell::new(state),
            revision: Cell::new(0),
        }
    }

    pub fn dispatch(&self, msg: S::Msg) {
        let revision = self.revision.get() + 1;
        debug!("{} page r{revision}: {msg:?}", self.page);
        self.state.borrow_mut().reduce(msg);
        self.revision.set(revision);
    }

    /// Runs `f` against the current state. `f` must not dispatch.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.state.borrow())
    }

    /// Number of messages applied so far.
    pub fn revision(&self) -> u64 {
        self.revision.get()
    }
}

impl<S: Reduce + Clone> PageStore<S> {
    pub fn snapshot(&self) -> S {
        self.state.borrow().clone()
    }
}
