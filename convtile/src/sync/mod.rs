mod controller;
mod slots;
mod token;

pub use controller::{SlotRef, SyncAction, SyncController, SyncRecord};
pub use slots::{BufferSlot, BufferSlotManager};
pub use token::{Engine, EnginePair, SyncToken, TokenPolicy};
