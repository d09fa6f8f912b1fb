pub mod model;
pub mod stage_graph;

pub use model::MoveError;
pub use stage_graph::{StageGraphSpace, StageSnapshot};
