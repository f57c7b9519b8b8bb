pub mod audio;
pub mod cancel;
pub mod config;
pub mod dispatch;
pub mod effect;
pub mod error;
pub mod event;
pub mod ledger;
pub mod pacing;
pub mod policy;
pub mod queue;
pub mod reactor;
pub mod scheduler;
pub mod state;
pub mod telemetry;
pub mod time;
pub mod transcript;
