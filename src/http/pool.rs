//! Free list of reusable request contexts.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::queue::SegQueue;

use crate::http::context::Context;

/// Lock-free pool of [`Context`] instances.
///
/// Instances are allocated lazily when the pool is empty and never freed
/// while the pool lives.
#[derive(Debug, Default)]
pub struct ContextPool {
    free: SegQueue<Context>,
    allocated: AtomicUsize,
}

impl ContextPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take an idle context, allocating one if none is idle.
    pub fn acquire(&self) -> Context {
        self.free.pop().unwrap_or_else(|| {
            self.allocated.fetch_add(1, Ordering::Relaxed);
            Context::default()
        })
    }

    /// Reset `ctx` and return it to the pool.
    pub fn release(&self, mut ctx: Context) {
        ctx.reset();
        self.free.push(ctx);
    }

    /// Acquire a context that is released when the guard drops.
    ///
    /// Release happens on every exit path, including panic unwind and a
    /// dropped request future.
    pub fn checkout(self: &Arc<Self>) -> PooledContext {
        PooledContext {
            ctx: self.acquire(),
            pool: Arc::clone(self),
        }
    }

    /// Contexts currently idle in the pool.
    pub fn idle(&self) -> usize {
        self.free.len()
    }

    /// Contexts ever allocated by this pool.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

/// Exclusive handle on a pooled [`Context`].
#[derive(Debug)]
pub struct PooledContext {
    ctx: Context,
    pool: Arc<ContextPool>,
}

impl Deref for PooledContext {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.ctx
    }
}

impl DerefMut for PooledContext {
    fn deref_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }
}

impl Drop for PooledContext {
    fn drop(&mut self) {
        let ctx = std::mem::take(&mut self.ctx);
        self.pool.release(ctx);
    }
}
