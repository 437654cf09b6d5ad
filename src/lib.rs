pub mod arena;
mod compaction;
pub mod device;
pub mod effect;
pub mod error;
pub mod evaluator;
pub mod graph;
mod loader;
pub mod model;
pub mod pool;
pub mod reflection;
pub mod sample;
pub mod so_decl;
pub mod states;
pub mod types;

pub use effect::{CloneFlags, Effect, ScalarValue};
pub use error::EffectError;
