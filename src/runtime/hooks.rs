/// Direction of an object transfer relative to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Fetch,
    Push,
}

impl TransferDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferDirection::Fetch => "fetch",
            TransferDirection::Push => "push",
        }
    }
}

/// Receives progress callbacks while an object is streamed.
///
/// Every method defaults to a no-op so observers only implement what they
/// render. Callbacks run inline on the transfer task and must not block.
pub trait TransferObserver: Send + Sync {
    fn on_start(&self, _direction: TransferDirection, _object: &str, _total_bytes: Option<u64>) {}

    fn on_progress(&self, _object: &str, _transferred: u64) {}

    fn on_finish(&self, _object: &str, _transferred: u64) {}
}
