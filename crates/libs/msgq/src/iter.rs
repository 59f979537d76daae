//! Iteration over queued values.

use std::iter::FusedIterator;

use crate::backend::{BlockingMode, TypeSelector};
use crate::codec::Codec;
use crate::error::{QueueError, ReceiveError};
use crate::queue::Queue;

/// Repeated `get` over one queue.
///
/// `NoMessage` ends the sequence. Any other error is yielded once and ends
/// it afterwards. Forward-only: start a new iterator to read again.
pub struct Iter<'q, C> {
    queue: &'q Queue<C>,
    selector: TypeSelector,
    blocking: BlockingMode,
    done: bool,
}

impl<'q, C: Codec> Iter<'q, C> {
    pub(crate) fn new(queue: &'q Queue<C>, selector: TypeSelector, blocking: BlockingMode) -> Self {
        Self {
            queue,
            selector,
            blocking,
            done: false,
        }
    }
}

impl<C: Codec> Iterator for Iter<'_, C> {
    type Item = Result<C::Item, QueueError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.queue.get_with(self.selector, self.blocking) {
            Ok(item) => Some(Ok(item)),
            Err(QueueError::Receive(ReceiveError::NoMessage)) => {
                self.done = true;
                None
            }
            Err(err) => {
                log::debug!("msgq: iteration on queue {} ended: {err}", self.queue.handle().id());
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<C: Codec> FusedIterator for Iter<'_, C> {}

/// Iteration that turns every error into the end of the sequence.
///
/// Drained, removed and undecodable queues all look the same to the caller.
pub struct CompatIter<'q, C> {
    inner: Iter<'q, C>,
}

impl<'q, C: Codec> CompatIter<'q, C> {
    pub(crate) fn new(inner: Iter<'q, C>) -> Self {
        Self { inner }
    }
}

impl<C: Codec> Iterator for CompatIter<'_, C> {
    type Item = C::Item;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()?.ok()
    }
}

impl<C: Codec> FusedIterator for CompatIter<'_, C> {}
