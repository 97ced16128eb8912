use crate::error::ForgeError;
use crate::rarity::Summary;

pub use crate::metadata::Attribute;

/// One finished composite plus its attribute list. `index` is the 1-based
/// position in the collection; events arrive in completion order, so
/// consumers needing index order must reorder.
#[derive(Debug)]
pub struct GeneratedItem {
    pub index: u32,
    pub png_bytes: Vec<u8>,
    pub attributes: Vec<Attribute>,
}

/// Why a run stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Requested,
    Timeout,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Requested => write!(f, "requested"),
            CancelReason::Timeout => write!(f, "timeout"),
        }
    }
}

/// The engine's output stream. `Error`, `Complete` and `Cancelled` are
/// terminal: exactly one of them closes every stream.
#[derive(Debug)]
pub enum Event {
    Progress {
        completed: u32,
        total: u32,
        memory_used_bytes: u64,
    },
    ItemReady(GeneratedItem),
    Warning {
        message: String,
    },
    Error(ForgeError),
    Complete(Box<Summary>),
    Cancelled {
        completed: u32,
        reason: CancelReason,
    },
}

impl Event {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::Error(_) | Event::Complete(_) | Event::Cancelled { .. }
        )
    }
}
