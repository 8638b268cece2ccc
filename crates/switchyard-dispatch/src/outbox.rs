//! Outbound buffer shared by every stage handling one event

/// Items written by stages while one inbound event is dispatched, plus the
/// request to close the connection once they are flushed.
#[derive(Debug)]
pub struct Outbox<O> {
    items: Vec<O>,
    close_after_flush: bool,
}

impl<O> Outbox<O> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            close_after_flush: false,
        }
    }

    pub fn push(&mut self, item: O) {
        self.items.push(item);
    }

    /// Ask the transport to close the connection after flushing
    pub fn close_after_flush(&mut self) {
        self.close_after_flush = true;
    }

    pub fn should_close(&self) -> bool {
        self.close_after_flush
    }

    /// Take the buffered items, leaving the close flag as is
    pub fn drain(&mut self) -> Vec<O> {
        std::mem::take(&mut self.items)
    }

    pub fn items(&self) -> &[O] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<O> Default for Outbox<O> {
    fn default() -> Self {
        Self::new()
    }
}
