//! Monitoring engine
//!
//! The scheduler reconciles the set of live check loops against persisted
//! monitors; each loop probes its endpoint, advances the status state
//! machine, records history and fires notifications on status edges.
pub mod executor;
pub mod runner;
pub mod scheduler;
pub mod throttle;
pub mod transition;
pub mod types;


pub use scheduler::Scheduler;
