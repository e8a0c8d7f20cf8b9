//! Fixed-capacity byte buffer that overwrites its oldest bytes

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct CircularBuffer {
    bytes: VecDeque<u8>,
    max_size: usize,
}

impl CircularBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Append `data`, dropping the oldest bytes to stay within `max_size`
    pub fn write(&mut self, data: &[u8]) {
        if self.max_size == 0 {
            return;
        }
        let data = &data[data.len().saturating_sub(self.max_size)..];
        let overflow = (self.bytes.len() + data.len()).saturating_sub(self.max_size);
        self.bytes.drain(..overflow);
        self.bytes.extend(data);
    }

    /// Buffer contents, oldest byte first
    pub fn contents(&self) -> Vec<u8> {
        self.bytes.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}
