// Library exports for trackops
pub mod alignment;
pub mod cancel;
pub mod cluster;
pub mod collection;
pub mod condition;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod iupac;
pub mod keyed_map;
pub mod motif;
pub mod operand;
pub mod operations;
pub mod profile;
pub mod progress;
pub mod region;
pub mod scheduler;
pub mod store;
pub mod synthetic;
pub mod track;
pub mod value;

pub use cancel::CancellationToken;
pub use config::EngineConfig;
pub use engine::{Engine, OperationReport, Outcome, Transform, TransformRequest};
pub use error::{EngineError, EngineResult, OpError};
pub use store::{DataObject, DataStore};
