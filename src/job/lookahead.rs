//! Iterator with one-element lookahead and push-back

use std::collections::VecDeque;

/// Wraps an iterator so elements can be peeked and put back
///
/// The orchestrator peeks a slice and only consumes it once a job was created
/// for it, so a slice that found no budget is picked up again on the next
/// round. Never buffers more than one element from the source, so infinite
/// sources are fine.
pub struct LookaheadIterator<I: Iterator> {
    source: I,
    buffer: VecDeque<I::Item>,
}

impl<I: Iterator> LookaheadIterator<I> {
    pub fn new(source: I) -> Self {
        Self {
            source,
            buffer: VecDeque::new(),
        }
    }

    /// Whether another element is available, buffering it if needed
    pub fn has_next(&mut self) -> bool {
        if !self.buffer.is_empty() {
            return true;
        }
        match self.source.next() {
            Some(item) => {
                self.buffer.push_back(item);
                true
            }
            None => false,
        }
    }

    /// Next element without consuming it
    pub fn peek(&mut self) -> Option<&I::Item> {
        if self.has_next() {
            self.buffer.front()
        } else {
            None
        }
    }

    /// Put an element back in front of everything else
    pub fn push_front(&mut self, item: I::Item) {
        self.buffer.push_front(item);
    }
}

impl<I: Iterator> Iterator for LookaheadIterator<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.pop_front().or_else(|| self.source.next())
    }
}

impl<I: Iterator> std::fmt::Debug for LookaheadIterator<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookaheadIterator")
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}
