use std::sync::Mutex;

use timber_types::DBSIZE;

/// Reusable pool of decode scratch buffers.
///
/// The read path decodes every block through a `DBSIZE` scratch buffer; the
/// pool keeps a bounded set of them so steady-state reads do not allocate.
/// Buffers move by value: `acquire` transfers ownership out and `release`
/// transfers it back, so a released buffer cannot be used again by the caller.
pub struct BufferPool {
    idle: Mutex<Vec<Vec<u8>>>,
    buf_size: usize,
    max_idle: usize,
}

impl BufferPool {
    /// A pool of `DBSIZE` buffers keeping at most `max_idle` around.
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            buf_size: DBSIZE,
            max_idle,
        }
    }

    /// Take a buffer of length `DBSIZE`. Contents are unspecified.
    pub fn acquire(&self) -> Vec<u8> {
        let pooled = self.idle.lock().expect("pool lock poisoned").pop();
        pooled.unwrap_or_else(|| vec![0u8; self.buf_size])
    }

    /// Return a buffer to the pool. Buffers beyond `max_idle`, or ones the
    /// caller shrank below `DBSIZE` capacity, are dropped instead.
    pub fn release(&self, mut buf: Vec<u8>) {
        if buf.capacity() < self.buf_size {
            return;
        }
        buf.resize(self.buf_size, 0);
        let mut idle = self.idle.lock().expect("pool lock poisoned");
        if idle.len() < self.max_idle {
            idle.push(buf);
        }
    }

    /// Number of buffers currently idle in the pool.
    pub fn idle_len(&self) -> usize {
        self.idle.lock().expect("pool lock poisoned").len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(32)
    }
}
