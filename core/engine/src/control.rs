//! The control session: a thin typed layer over the blocking control
//! connection.
//!
//! Every operation is a tabular backend-procedure invocation with result
//! fetch enabled, keyed by the session identifier that `attach` obtains
//! once. The connection is blocking and only ever touched by the foreground
//! thread, so there is no locking here and nothing to drain: the
//! interesting notices all arrive on the target connection.

use log::debug;

use crate::driver::{Connection, Mode};
use crate::error::{Error, Result};
use crate::relay::NotificationRelay;
use crate::types::{Breakpoint, Frame, Variable, col_i64, col_str};
use crate::wire::Row;

/// The control half of an active session.
pub struct ControlSession {
    conn: Connection,
    session_id: Option<i64>,
}

impl ControlSession {
    /// Opens the blocking control connection. No commands are valid until
    /// [`ControlSession::attach`] has run.
    pub fn connect(endpoint: &str) -> Result<Self> {
        let conn = Connection::open(endpoint, Mode::Blocking, NotificationRelay::disabled())?;
        Ok(Self {
            conn,
            session_id: None,
        })
    }

    /// Attaches to the proxy port published by the target and stores the
    /// session identifier every later command is keyed by.
    pub fn attach(&mut self, port: u16) -> Result<i64> {
        let rows = self.invoke("attach_to_port", &[port.to_string()])?;
        let session_id = col_i64(single_row(&rows)?, 0)?;
        debug!("attached, session id {session_id}");
        self.session_id = Some(session_id);
        Ok(session_id)
    }

    /// Lets the target run until the next breakpoint.
    pub fn cont(&mut self) -> Result<()> {
        let sid = self.session_id()?;
        let result = self.invoke("continue", &[sid.to_string()])?;
        debug!("continue result: {result:?}");
        Ok(())
    }

    /// Requests cancellation of the statement bound to the target
    /// connection. The target worker observes this as a cancellation-class
    /// failure on its next statement result.
    pub fn abort(&mut self) -> Result<()> {
        let sid = self.session_id.take().ok_or(Error::NotAttached)?;
        let result = self.invoke("abort_target", &[sid.to_string()])?;
        debug!("abort result: {result:?}");
        Ok(())
    }

    /// Steps over the next statement.
    pub fn step_over(&mut self) -> Result<Breakpoint> {
        let sid = self.session_id()?;
        let rows = self.invoke("step_over", &[sid.to_string()])?;
        Breakpoint::decode(single_row(&rows)?)
    }

    /// Steps into the next routine call.
    pub fn step_into(&mut self) -> Result<Breakpoint> {
        let sid = self.session_id()?;
        let rows = self.invoke("step_into", &[sid.to_string()])?;
        Breakpoint::decode(single_row(&rows)?)
    }

    /// Variables of the current frame.
    pub fn variables(&mut self) -> Result<Vec<Variable>> {
        let sid = self.session_id()?;
        let rows = self.invoke("get_variables", &[sid.to_string()])?;
        rows.iter().map(Variable::decode).collect()
    }

    /// The current call stack, outermost frame last.
    pub fn stack(&mut self) -> Result<Vec<Frame>> {
        let sid = self.session_id()?;
        let rows = self.invoke("get_stack", &[sid.to_string()])?;
        rows.iter().map(Frame::decode).collect()
    }

    /// Every breakpoint currently set.
    pub fn breakpoints(&mut self) -> Result<Vec<Breakpoint>> {
        let sid = self.session_id()?;
        let rows = self.invoke("get_breakpoints", &[sid.to_string()])?;
        rows.iter().map(Breakpoint::decode).collect()
    }

    /// Source text of the given routine.
    pub fn source(&mut self, target_id: u32) -> Result<String> {
        let sid = self.session_id()?;
        let rows = self.invoke("get_source", &[sid.to_string(), target_id.to_string()])?;
        col_str(single_row(&rows)?, 0)
    }

    /// Sets a breakpoint at the given line of the given routine.
    pub fn set_breakpoint(&mut self, target_id: u32, line: u32) -> Result<()> {
        let sid = self.session_id()?;
        let result = self.invoke(
            "set_breakpoint",
            &[sid.to_string(), target_id.to_string(), line.to_string()],
        )?;
        debug!("set breakpoint result: {result:?}");
        Ok(())
    }

    /// Closes the control connection.
    pub fn cleanup(&mut self) {
        self.conn.close();
    }

    fn session_id(&self) -> Result<i64> {
        self.session_id.ok_or(Error::NotAttached)
    }

    fn invoke(&mut self, procedure: &str, args: &[String]) -> Result<Vec<Row>> {
        let statement = format!("{procedure}({})", args.join(","));
        self.conn.execute(&statement, true)
    }
}

/// An empty result where exactly one row is mandatory is a violation of the
/// protocol contract, never defaulted.
fn single_row(rows: &[Row]) -> Result<&Row> {
    rows.first()
        .ok_or_else(|| Error::Protocol("expected exactly one row, got none".into()))
}
