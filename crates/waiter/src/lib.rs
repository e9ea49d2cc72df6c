//! Library entrypoint for the startup waiter so other binaries can block on
//! database availability in-process before they start accepting work.

pub mod pause;
pub mod worker;

pub use pause::{Pause, TokioPause};
pub use worker::{
    describe_interval, unwaited_databases, wait_for_databases, AliasReport, ProbeState,
    WaitError, WaitPlan, WaitReport,
};
