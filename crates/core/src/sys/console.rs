//! Console buffering between the guest and the world outside the emulator.

/// Input/output byte queues for a text console.
#[derive(Default)]
pub struct ConsoleBuffer {
    in_queue: Vec<u8>,
    out_queue: Vec<u8>,
    /// Set when a `read` syscall found the input queue empty; the driver
    /// should prompt for input before resuming.
    pub need_input: bool,
}

impl ConsoleBuffer {
    /// Creates empty buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any input is queued.
    pub fn has_input(&self) -> bool {
        !self.in_queue.is_empty()
    }

    /// Whether any output is queued.
    pub fn has_output(&self) -> bool {
        !self.out_queue.is_empty()
    }

    /// Queues bytes for the guest to read.
    pub fn add_input(&mut self, data: &[u8]) {
        self.in_queue.extend_from_slice(data);
    }

    /// Queues bytes the guest wrote.
    pub fn add_output(&mut self, data: &[u8]) {
        self.out_queue.extend_from_slice(data);
    }

    /// Extracts up to `max` bytes of queued input.
    pub fn read_input(&mut self, max: usize) -> Vec<u8> {
        let n = max.min(self.in_queue.len());
        self.in_queue.drain(..n).collect()
    }

    /// Extracts queued output. Without `flush`, only complete lines are
    /// returned; a trailing partial line stays buffered.
    pub fn extract_output(&mut self, flush: bool) -> Vec<u8> {
        if flush {
            return std::mem::take(&mut self.out_queue);
        }
        match self.out_queue.iter().rposition(|b| *b == b'\n') {
            Some(last_lf) => self.out_queue.drain(..=last_lf).collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_queue() {
        let mut c = ConsoleBuffer::new();
        assert!(!c.has_input());
        c.add_input(b"hello");
        assert_eq!(c.read_input(3), b"hel");
        assert_eq!(c.read_input(10), b"lo");
        assert!(!c.has_input());
    }

    #[test]
    fn test_output_line_buffering() {
        let mut c = ConsoleBuffer::new();
        c.add_output(b"one\ntwo\npart");
        assert_eq!(c.extract_output(false), b"one\ntwo\n");
        assert_eq!(c.extract_output(false), b"");
        assert_eq!(c.extract_output(true), b"part");
        assert!(!c.has_output());
    }
}
