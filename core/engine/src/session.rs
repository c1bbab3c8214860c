//! The session coordinator.
//!
//! [`DebugSession`] owns the one-shot setup connection, the command table,
//! and at most one active session. An active session is always a pair: the
//! target half (worker thread keeping the call in flight) and the control
//! half (blocking connection issuing debugger commands). The two are created
//! together in `start` and torn down together in `stop`; no state exists
//! where one half is live without the other.

use std::time::Duration;

use log::{debug, error, info, warn};

use crate::catalog::{self, Routine};
use crate::commands::{CommandAction, CommandTable};
use crate::control::ControlSession;
use crate::driver::{Connection, Mode};
use crate::error::{Error, Result};
use crate::relay::NotificationRelay;
use crate::target::TargetSession;
use crate::types::{Breakpoint, Frame, Variable};

/// Name of the backend extension the debugger is built on.
pub const EXTENSION: &str = "routine_debug";

/// Immutable session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Backend endpoint, `host:port`.
    pub endpoint: String,
    /// Bound on the wait for the proxy endpoint notification. `None` waits
    /// indefinitely.
    pub startup_timeout: Option<Duration>,
}

/// What a dispatched command produced, for the caller to render.
#[derive(Debug)]
pub enum CommandOutput {
    None,
    Breakpoint(Breakpoint),
    Variables(Vec<Variable>),
    Frames(Vec<Frame>),
    Breakpoints(Vec<Breakpoint>),
    Source(String),
    Routines(Vec<Routine>),
    Help,
}

/// Output of one dispatched command plus the target diagnostics that
/// accumulated while it ran, in arrival order.
#[derive(Debug)]
pub struct DispatchResult {
    pub output: CommandOutput,
    pub notices: Vec<String>,
}

struct ActiveSession {
    target: TargetSession,
    control: ControlSession,
}

/// The interactive debugging session.
pub struct DebugSession {
    config: SessionConfig,
    commands: &'static CommandTable,
    conn: Connection,
    active: Option<ActiveSession>,
}

impl DebugSession {
    /// Connects the setup connection and loads the debugging extension.
    /// Both failures are fatal; there is nothing to do without a backend
    /// that speaks the extension.
    pub fn connect(config: SessionConfig, commands: &'static CommandTable) -> Result<Self> {
        let mut conn = Connection::open(
            &config.endpoint,
            Mode::Blocking,
            NotificationRelay::disabled(),
        )?;
        conn.bootstrap_extension(EXTENSION)?;
        info!("connected to {}", config.endpoint);
        Ok(Self {
            config,
            commands,
            conn,
            active: None,
        })
    }

    /// Whether a target is currently under debug control.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn commands(&self) -> &'static CommandTable {
        self.commands
    }

    /// Parses and runs one console line.
    ///
    /// Unknown commands and unmet prerequisites are logged and skipped, and
    /// recoverable command failures are logged; none of them end the
    /// session. Target diagnostics queued during the command are drained
    /// afterwards and returned alongside the output.
    pub fn dispatch(&mut self, line: &str) -> DispatchResult {
        let (name, args) = parse_line(line);
        let output = match self.commands.get(canonical(name)) {
            None => {
                error!("cannot find a definition for `{name}`");
                CommandOutput::None
            }
            Some(spec) if spec.needs_session && !self.is_active() => {
                warn!("`{name}` needs an active session, skipping");
                CommandOutput::None
            }
            Some(spec) => match self.run_action(spec.action, &args) {
                Ok(output) => output,
                Err(err) => {
                    error!("`{name}` failed: {err}");
                    CommandOutput::None
                }
            },
        };
        let notices = self
            .active
            .as_ref()
            .map(|active| active.target.drain_notices())
            .unwrap_or_default();
        DispatchResult { output, notices }
    }

    /// Starts debugging a call expression. With a session already active the
    /// request is logged and skipped; the existing session stays untouched.
    pub fn start(&mut self, call: &str) -> Result<()> {
        if self.is_active() {
            warn!("a session is already active, `stop` it first");
            return Ok(());
        }

        let target = TargetSession::start(&self.config.endpoint, call, self.config.startup_timeout)?;

        // From here on the target worker is live. A control-side failure
        // leaves no way to cancel it, so the worker is abandoned the same
        // way a failed start abandons it.
        let mut control = match ControlSession::connect(&self.config.endpoint) {
            Ok(control) => control,
            Err(err) => {
                error!("could not open the control connection: {err}");
                return Err(err);
            }
        };
        if let Err(err) = control.attach(target.port()) {
            error!("could not attach to the target proxy: {err}");
            control.cleanup();
            return Err(err);
        }

        info!("debugging session active, target id {}", target.target_id());
        self.active = Some(ActiveSession { target, control });
        Ok(())
    }

    /// Stops the active session: aborts the target call, waits for the
    /// worker to observe the cancellation and exit, then closes both
    /// connections. Without an active session this is a no-op.
    pub fn stop(&mut self) {
        let Some(mut active) = self.active.take() else {
            debug!("no active session to stop");
            return;
        };
        if let Err(err) = active.control.abort() {
            error!("abort request failed: {err}");
        }
        active.target.wait_for_shutdown();
        active.target.cleanup();
        active.control.cleanup();
        info!("session stopped, target state {:?}", active.target.state());
    }

    /// Stops any active session and closes the setup connection.
    pub fn shutdown(&mut self) {
        self.stop();
        self.conn.close();
    }

    fn run_action(&mut self, action: CommandAction, args: &[&str]) -> Result<CommandOutput> {
        match action {
            CommandAction::Run => {
                let call = args.join(" ");
                if call.is_empty() {
                    return Err(Error::MissingArgument("call expression"));
                }
                self.start(&call)?;
                Ok(CommandOutput::None)
            }
            CommandAction::Stop => {
                self.stop();
                Ok(CommandOutput::None)
            }
            CommandAction::Continue => {
                self.active_mut()?.control.cont()?;
                Ok(CommandOutput::None)
            }
            CommandAction::StepInto => {
                let stop = self.active_mut()?.control.step_into()?;
                Ok(CommandOutput::Breakpoint(stop))
            }
            CommandAction::StepOver => {
                let stop = self.active_mut()?.control.step_over()?;
                Ok(CommandOutput::Breakpoint(stop))
            }
            CommandAction::Variables => {
                Ok(CommandOutput::Variables(self.active_mut()?.control.variables()?))
            }
            CommandAction::Stack => Ok(CommandOutput::Frames(self.active_mut()?.control.stack()?)),
            CommandAction::ShowBreakpoints => Ok(CommandOutput::Breakpoints(
                self.active_mut()?.control.breakpoints()?,
            )),
            CommandAction::SetBreakpoint => {
                let line = args
                    .first()
                    .and_then(|arg| arg.parse().ok())
                    .ok_or(Error::MissingArgument("line number"))?;
                let ActiveSession { target, control } = self.active_mut()?;
                let target_id = target.target_id();
                control.set_breakpoint(target_id, line)?;
                Ok(CommandOutput::None)
            }
            CommandAction::Source => {
                let ActiveSession { target, control } = self.active_mut()?;
                let target_id = target.target_id();
                Ok(CommandOutput::Source(control.source(target_id)?))
            }
            CommandAction::ListRoutines => Ok(CommandOutput::Routines(catalog::list_routines(
                &mut self.conn,
            )?)),
            CommandAction::Help => Ok(CommandOutput::Help),
        }
    }

    fn active_mut(&mut self) -> Result<&mut ActiveSession> {
        self.active.as_mut().ok_or(Error::NotAttached)
    }
}

impl Drop for DebugSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Splits a console line into its command name and arguments.
fn parse_line(line: &str) -> (&str, Vec<&str>) {
    let mut parts = line.split_whitespace();
    let name = parts.next().unwrap_or_default();
    (name, parts.collect())
}

/// Maps the teardown aliases onto `stop`.
fn canonical(name: &str) -> &str {
    match name {
        "abort" | "exit" | "quit" => "stop",
        other => other,
    }
}
