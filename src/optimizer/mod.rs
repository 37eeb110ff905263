//! # Optimizer Module
//!
//! Il motore di orchestrazione, separato in sottomoduli:
//! - `batch_optimizer`: coordinatore e `EngineHandle`
//! - `worker_pool`: worker che eseguono le compressioni
//! - `job_tracker`: lista dei job, transizioni di stato e statistiche
//! - `replace_manager`: scrittura su file temporaneo e swap atomico
//! - `path_resolver`: calcolo del path di output

pub mod batch_optimizer;
pub mod job_tracker;
pub mod path_resolver;
pub mod replace_manager;
pub mod worker_pool;

pub use batch_optimizer::{BatchOptimizer, EngineHandle, JobEvent, RunSummary};
pub use job_tracker::{BatchAggregate, JobTracker};
pub use path_resolver::{OutputMode, PathResolver};
pub use replace_manager::{OutputPlan, ReplaceManager};
