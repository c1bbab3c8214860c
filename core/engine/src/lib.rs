//! Engine of the interactive routine debugger.
//!
//! The crate is the reusable half of the debugger: the framed wire protocol,
//! the blocking and readiness-polling connection driver, the target worker
//! that keeps the debugged call in flight, the control session issuing
//! debugger commands, and the coordinator tying the two halves of an active
//! session together. The console front end lives in its own crate and only
//! consumes what is re-exported here.

pub mod catalog;
pub mod commands;
pub mod control;
pub mod driver;
pub mod error;
pub mod relay;
pub mod session;
pub mod target;
pub mod types;
pub mod wire;

pub use catalog::Routine;
pub use commands::{COMMANDS, CommandAction, CommandSpec, CommandTable};
pub use error::{Error, Result};
pub use session::{CommandOutput, DebugSession, DispatchResult, SessionConfig};
pub use target::TargetState;
pub use types::{Breakpoint, Frame, Variable};
