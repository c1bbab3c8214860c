//! The static command table.
//!
//! One explicit, immutable table maps each console command to a tagged
//! action variant, its prerequisite, and its help line. The table is built
//! once and injected into the coordinator; nothing dispatches through
//! reflection or ambient globals.

use phf::phf_map;

/// What a command does, as a tagged variant the coordinator matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    /// Start a session for a call expression.
    Run,
    /// Abort the target and tear the session down.
    Stop,
    /// Let the target run until the next breakpoint.
    Continue,
    /// Step into the next routine call.
    StepInto,
    /// Step over the next statement.
    StepOver,
    /// Show the variables of the current frame.
    Variables,
    /// Show the current call stack.
    Stack,
    /// Show the source of the routine under debug control.
    Source,
    /// Show every breakpoint currently set.
    ShowBreakpoints,
    /// Set a breakpoint at a line of the current routine.
    SetBreakpoint,
    /// List every debuggable routine.
    ListRoutines,
    /// Show the command overview.
    Help,
}

/// One entry of the command table.
pub struct CommandSpec {
    pub action: CommandAction,
    /// Checked before invocation; an unmet prerequisite is logged and the
    /// command skipped.
    pub needs_session: bool,
    pub help: &'static str,
}

/// Lookup from command name to its spec.
pub type CommandTable = phf::Map<&'static str, CommandSpec>;

/// The default console command set.
pub static COMMANDS: CommandTable = phf_map! {
    "run" => CommandSpec {
        action: CommandAction::Run,
        needs_session: false,
        help: "Run a routine call and attach the debugger",
    },
    "stop" => CommandSpec {
        action: CommandAction::Stop,
        needs_session: false,
        help: "Stop debugging the current target",
    },
    "continue" => CommandSpec {
        action: CommandAction::Continue,
        needs_session: true,
        help: "Continue until the next breakpoint",
    },
    "si" => CommandSpec {
        action: CommandAction::StepInto,
        needs_session: true,
        help: "Step into the next routine or pause at the next statement",
    },
    "so" => CommandSpec {
        action: CommandAction::StepOver,
        needs_session: true,
        help: "Step over the next routine and pause at the next statement",
    },
    "vars" => CommandSpec {
        action: CommandAction::Variables,
        needs_session: true,
        help: "Show variables of the current frame",
    },
    "stack" => CommandSpec {
        action: CommandAction::Stack,
        needs_session: true,
        help: "Show the current call stack",
    },
    "source" => CommandSpec {
        action: CommandAction::Source,
        needs_session: true,
        help: "Show the source of the current target routine",
    },
    "brshow" => CommandSpec {
        action: CommandAction::ShowBreakpoints,
        needs_session: true,
        help: "Show all breakpoints",
    },
    "brset" => CommandSpec {
        action: CommandAction::SetBreakpoint,
        needs_session: true,
        help: "Set a breakpoint at a line of the current target routine",
    },
    "func" => CommandSpec {
        action: CommandAction::ListRoutines,
        needs_session: false,
        help: "Show all debuggable routines",
    },
    "help" => CommandSpec {
        action: CommandAction::Help,
        needs_session: false,
        help: "Show this help",
    },
    "exit" => CommandSpec {
        action: CommandAction::Stop,
        needs_session: false,
        help: "Exit the debugger",
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_commands_require_a_session() {
        for name in ["continue", "si", "so", "vars", "stack", "source", "brshow", "brset"] {
            assert!(COMMANDS.get(name).unwrap().needs_session, "{name}");
        }
    }

    #[test]
    fn lifecycle_commands_do_not() {
        for name in ["run", "stop", "func", "help", "exit"] {
            assert!(!COMMANDS.get(name).unwrap().needs_session, "{name}");
        }
    }
}
