//! Local futures polled on the unit thread.
//!
//! Futures here are `!Send` and never leave their unit. The queue is
//! polled after each batch of inbox messages, which is when the replies
//! they wait on arrive; wakers are therefore not needed and a no-op waker
//! is used.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use crate::context::UnitContext;
use crate::kind::UnitKind;

/// Work to run on the unit once a spawned future resolves.
pub(crate) type Continuation<U> = Box<dyn FnOnce(&mut UnitContext<U>)>;

type LocalTask<U> = Pin<Box<dyn Future<Output = Continuation<U>>>>;

pub(crate) struct TaskQueue<U: UnitKind> {
    tasks: Vec<LocalTask<U>>,
}

impl<U: UnitKind> Default for TaskQueue<U> {
    fn default() -> Self {
        Self { tasks: Vec::new() }
    }
}

impl<U: UnitKind> TaskQueue<U> {
    pub(crate) fn push<F, T, C>(&mut self, future: F, then: C)
    where
        F: Future<Output = T> + 'static,
        T: 'static,
        C: FnOnce(&mut UnitContext<U>, T) + 'static,
    {
        self.tasks.push(Box::pin(async move {
            let value = future.await;
            Box::new(move |ctx: &mut UnitContext<U>| then(ctx, value)) as Continuation<U>
        }));
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn clear(&mut self) {
        self.tasks.clear();
    }

    /// Poll every task once; return continuations of those that finished.
    pub(crate) fn poll_ready(&mut self) -> Vec<Continuation<U>> {
        let mut cx = Context::from_waker(Waker::noop());
        let mut ready = Vec::new();
        self.tasks.retain_mut(|task| match task.as_mut().poll(&mut cx) {
            Poll::Ready(then) => {
                ready.push(then);
                false
            }
            Poll::Pending => true,
        });
        ready
    }
}

/// Drive `future` to completion, calling `pump` whenever it is pending.
///
/// `pump` returns `false` to give up; the future is then dropped and
/// `None` returned.
pub(crate) fn block_on_with<F: Future>(future: F, mut pump: impl FnMut() -> bool) -> Option<F::Output> {
    let mut future = std::pin::pin!(future);
    let mut cx = Context::from_waker(Waker::noop());
    loop {
        if let Poll::Ready(out) = future.as_mut().poll(&mut cx) {
            return Some(out);
        }
        if !pump() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Pending for `n` polls, then ready.
    struct Countdown(u32);

    impl Future for Countdown {
        type Output = u32;

        fn poll(mut self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<u32> {
            if self.0 == 0 {
                Poll::Ready(7)
            } else {
                self.0 -= 1;
                Poll::Pending
            }
        }
    }

    #[test]
    fn block_on_pumps_until_ready() {
        let pumps = Rc::new(Cell::new(0));
        let counted = Rc::clone(&pumps);
        let out = block_on_with(Countdown(3), || {
            counted.set(counted.get() + 1);
            true
        });
        assert_eq!(out, Some(7));
        assert_eq!(pumps.get(), 3);
    }

    #[test]
    fn block_on_gives_up() {
        assert_eq!(block_on_with(Countdown(10), || false), None);
    }
}
