pub mod batch;
pub mod item;

pub use batch::{ArtifactName, Batch, BatchLine, BatchSummary};
pub use item::ItemRequest;
