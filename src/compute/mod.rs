//! Execution of compiled graphs.
pub mod handler;
pub mod ledger;
pub mod store;
pub mod telemetry;

pub use handler::{ExecutionPlan, Executor, HandlerConfig, MemHandler, PlainHandler, PlanStep, StoreHandler, Strategy};
pub use ledger::{CountedLedger, ExecutionState, PlainLedger};
pub use store::{GroupStore, JsonFileStore, MemoryStore, StoreEntry, StoreGroup, StoreLedger};
pub use telemetry::ExecutionStats;
