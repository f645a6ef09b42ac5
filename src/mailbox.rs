//! Per-process mailbox: the only cross-core interface besides the
//! work-stealing deque and the per-core inbox.
//!
//! Receive is selective — a receiver can ask for the first message matching
//! a pattern, leaving non-matching messages in place — so a plain MPSC
//! channel doesn't fit; this is kept as a `Mutex<VecDeque<_>>` instead
//! rather than reaching for a lock-free queue where selective removal
//! would need one anyway.

use std::collections::VecDeque;
use std::sync::Mutex;

/// A pattern a receiver is willing to accept. `Any` matches every message;
/// `Tag` matches messages sent with the same tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Pattern {
    Any,
    Tag(u64),
}

/// A message payload. The payload itself is opaque to the scheduler — it is
/// whatever the embedder's message-passing layer puts there.
#[derive(Clone, Debug)]
pub struct Message {
    pub tag: u64,
    pub payload: Box<[u8]>,
}

impl Message {
    fn matches(&self, pattern: Pattern) -> bool {
        match pattern {
            Pattern::Any => true,
            Pattern::Tag(tag) => self.tag == tag,
        }
    }
}

pub struct Mailbox {
    inner: Mutex<VecDeque<Message>>,
    capacity: Mutex<usize>,
}

impl Mailbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            capacity: Mutex::new(capacity),
        }
    }

    pub(crate) fn reset(&self, capacity: usize) {
        self.inner.lock().unwrap().clear();
        *self.capacity.lock().unwrap() = capacity;
    }

    /// Enqueue `message`. Returns `false` if the mailbox is at capacity
    ///.
    pub fn send(&self, message: Message) -> bool {
        let mut guard = self.inner.lock().unwrap();
        let capacity = *self.capacity.lock().unwrap();
        if capacity != 0 && guard.len() >= capacity {
            return false;
        }
        guard.push_back(message);
        true
    }

    /// Remove and return the first message matching `pattern`, preserving
    /// the relative order of the messages left behind.
    pub fn try_take_matching(&self, pattern: Pattern) -> Option<Message> {
        let mut guard = self.inner.lock().unwrap();
        let position = guard.iter().position(|m| m.matches(pattern))?;
        guard.remove(position)
    }

    pub fn has_matching(&self, pattern: Pattern) -> bool {
        self.inner.lock().unwrap().iter().any(|m| m.matches(pattern))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(tag: u64) -> Message {
        Message { tag, payload: Box::new([]) }
    }

    #[test]
    fn selective_receive_skips_non_matching_messages_in_place() {
        let mailbox = Mailbox::new(8);
        mailbox.send(msg(1));
        mailbox.send(msg(2));
        mailbox.send(msg(1));

        let taken = mailbox.try_take_matching(Pattern::Tag(2)).unwrap();
        assert_eq!(taken.tag, 2);
        assert_eq!(mailbox.len(), 2);

        // The two tag-1 messages are still there, in their original order.
        assert_eq!(mailbox.try_take_matching(Pattern::Tag(1)).unwrap().tag, 1);
        assert_eq!(mailbox.try_take_matching(Pattern::Tag(1)).unwrap().tag, 1);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn send_rejects_past_capacity() {
        let mailbox = Mailbox::new(1);
        assert!(mailbox.send(msg(1)));
        assert!(!mailbox.send(msg(2)));
        assert_eq!(mailbox.len(), 1);
    }

    #[test]
    fn zero_capacity_means_unbounded() {
        let mailbox = Mailbox::new(0);
        for i in 0..100 {
            assert!(mailbox.send(msg(i)));
        }
        assert_eq!(mailbox.len(), 100);
    }

    #[test]
    fn try_take_matching_returns_none_when_nothing_matches() {
        let mailbox = Mailbox::new(4);
        mailbox.send(msg(1));
        assert!(mailbox.try_take_matching(Pattern::Tag(9)).is_none());
        assert!(mailbox.has_matching(Pattern::Tag(1)));
        assert!(!mailbox.has_matching(Pattern::Tag(9)));
    }
}
