//! Bounded FIFO of undelivered messages with oldest-first shedding.

use std::collections::VecDeque;

use crate::sse::SseMessage;

#[derive(Debug)]
pub struct MessageBuffer {
    messages: VecDeque<SseMessage>,
    capacity: usize,
    threshold: usize,
}

impl MessageBuffer {
    /// `threshold` is the length at which the oldest messages start being
    /// shed; `capacity` is the hard cap.
    pub fn new(capacity: usize, threshold: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            threshold,
        }
    }

    /// Append `message`, returning how many older messages were dropped.
    pub fn push(&mut self, message: SseMessage) -> usize {
        let mut dropped = 0;

        if self.messages.len() >= self.threshold {
            let excess = self.messages.len() - self.threshold;
            self.messages.drain(..excess);
            dropped += excess;
        }

        self.messages.push_back(message);

        while self.messages.len() > self.capacity {
            self.messages.pop_front();
            dropped += 1;
        }

        dropped
    }

    pub fn pop_front(&mut self) -> Option<SseMessage> {
        self.messages.pop_front()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn snapshot(&self) -> Vec<SseMessage> {
        self.messages.iter().cloned().collect()
    }
}
