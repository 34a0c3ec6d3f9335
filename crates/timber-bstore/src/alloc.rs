use tokio::sync::{mpsc, Mutex};

use timber_types::RELOCATION_BASE;

/// How many addresses the generator task keeps buffered ahead of demand.
pub const LOOKAHEAD: usize = 256;

/// Produces the strictly increasing sequence of fresh relocation addresses.
///
/// A dedicated background task owns the counter and feeds a bounded channel,
/// so allocation requests rarely wait on the next value being produced. The
/// counter wraps back to the base on numeric overflow (defensive only; at
/// one allocation per nanosecond the virtual address space lasts centuries).
///
/// Allocation is a pure counter: liveness is not tracked and freed addresses
/// are not reused. Reclamation is an external, offline concern driven by the
/// unreferenced-address lists generations persist at commit.
pub struct AddressAllocator {
    rx: Mutex<mpsc::Receiver<u64>>,
}

impl AddressAllocator {
    /// Spawn the generator task. Must be called from within a tokio runtime.
    pub fn start(base: u64) -> Self {
        let (tx, rx) = mpsc::channel(LOOKAHEAD);
        tokio::spawn(async move {
            let mut next = base;
            loop {
                if tx.send(next).await.is_err() {
                    // Receiver dropped: the block store is gone.
                    break;
                }
                next = next.wrapping_add(1);
                if next < base {
                    next = base;
                }
            }
        });
        Self { rx: Mutex::new(rx) }
    }

    /// The allocator for the standard virtual address range.
    pub fn standard() -> Self {
        Self::start(RELOCATION_BASE)
    }

    /// Take the next fresh address, waiting briefly if the look-ahead buffer
    /// is momentarily empty. A dead generator task is a fatal configuration
    /// error, not a recoverable condition.
    pub async fn next(&self) -> u64 {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .expect("address generator task stopped")
    }
}
