//! Bounded FIFO for unsolicited messages
//!
//! Keeps the newest `capacity` messages; pushing onto a full queue evicts
//! the oldest entry and counts the loss.

use std::collections::VecDeque;

use crate::message::Message;

#[derive(Debug)]
pub struct BufferedQueue {
    messages: VecDeque<Message>,
    capacity: usize,
    /// Messages evicted because the queue was full
    dropped: u64,
}

impl BufferedQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            dropped: 0,
        }
    }
    
    /// Push a message, returning the evicted one if the queue was full
    pub fn push(&mut self, message: Message) -> Option<Message> {
        if self.capacity == 0 {
            self.dropped += 1;
            return Some(message);
        }
        
        let evicted = if self.messages.len() >= self.capacity {
            self.dropped += 1;
            self.messages.pop_front()
        } else {
            None
        };
        
        self.messages.push_back(message);
        evicted
    }
    
    pub fn pop(&mut self) -> Option<Message> {
        self.messages.pop_front()
    }
    
    pub fn len(&self) -> usize {
        self.messages.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
    
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
