//! The target session: the side of the debugger that owns the code under
//! debug control.
//!
//! `start` resolves the call head to a backend routine id, spawns a worker
//! thread that registers the connection as a debug target and then keeps the
//! literal call expression in flight, and blocks until the backend publishes
//! the proxy endpoint through the first notification. From then on the
//! non-blocking connection is touched only by the worker; the foreground
//! reads diagnostics from the notice channel.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, error, info};

use crate::catalog;
use crate::driver::{Connection, Mode};
use crate::error::{Error, Result};
use crate::relay::{NotificationRelay, notice_channel};

/// Worker lifecycle after a successful `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    /// The worker is registered and keeping the call in flight.
    Running,
    /// The worker exited without observing cancellation.
    Stopped,
    /// The worker observed the cooperative cancellation signal.
    Aborted,
}

/// How the worker loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
    Cancelled,
    Failed,
}

/// A call expression such as `f(2)`, split into its head and literal text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallExpr {
    text: String,
    head: String,
}

impl CallExpr {
    /// Parses a call expression. Both argument delimiters and a non-empty
    /// head are required; nothing else about the argument list is checked
    /// here, the backend validates it.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let Some(open) = text.find('(') else {
            return Err(Error::InvalidCallSyntax(text.to_string()));
        };
        if !text.contains(')') {
            return Err(Error::InvalidCallSyntax(text.to_string()));
        }
        let head = text[..open].trim();
        if head.is_empty() {
            return Err(Error::InvalidCallSyntax(text.to_string()));
        }
        Ok(Self {
            text: text.to_string(),
            head: head.to_string(),
        })
    }

    pub fn head(&self) -> &str {
        &self.head
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Extracts the proxy port from the first notification, `<prefix>:<port>`.
fn parse_port(notice: &str) -> Result<u16> {
    notice
        .trim()
        .rsplit(':')
        .next()
        .and_then(|tail| tail.parse().ok())
        .ok_or_else(|| Error::Protocol(format!("malformed endpoint notification: {notice}")))
}

/// The target half of an active session.
pub struct TargetSession {
    target_id: u32,
    port: u16,
    state: TargetState,
    notice_rx: Receiver<String>,
    worker: Option<JoinHandle<(Connection, WorkerExit)>>,
    conn: Option<Connection>,
}

impl TargetSession {
    /// Starts a target session for the given call expression.
    ///
    /// The expression is validated before any connection is opened. With
    /// `startup_timeout` unset the wait for the proxy endpoint is unbounded;
    /// with it set, a timeout abandons the worker and fails the start.
    pub fn start(
        endpoint: &str,
        call: &str,
        startup_timeout: Option<Duration>,
    ) -> Result<Self> {
        let call = CallExpr::parse(call)?;

        let (tx, rx) = notice_channel();
        let mut conn = Connection::open(endpoint, Mode::NonBlocking, NotificationRelay::new(tx))?;

        let routines = catalog::list_routines(&mut conn)?;
        let Some(target_id) = catalog::resolve(&routines, call.head()) else {
            conn.close();
            return Err(Error::UnresolvedTarget(call.head().to_string()));
        };
        debug!("resolved `{}` to target id {target_id}", call.head());

        let text = call.text().to_string();
        let worker = thread::Builder::new()
            .name("rdbg-target".into())
            .spawn(move || run_worker(conn, target_id, text))?;

        debug!("waiting for the proxy endpoint notification");
        let first = match startup_timeout {
            None => rx.recv().map_err(|_| worker_died()),
            Some(limit) => rx.recv_timeout(limit).map_err(|err| match err {
                RecvTimeoutError::Timeout => Error::StartupTimeout,
                RecvTimeoutError::Disconnected => worker_died(),
            }),
        };

        let first = match first {
            Ok(first) => first,
            Err(err) => {
                release_failed_worker(worker, &err);
                return Err(err);
            }
        };

        let port = match parse_port(&first) {
            Ok(port) => port,
            Err(err) => {
                release_failed_worker(worker, &err);
                return Err(err);
            }
        };
        info!("proxy endpoint published on port {port}");

        Ok(Self {
            target_id,
            port,
            state: TargetState::Running,
            notice_rx: rx,
            worker: Some(worker),
            conn: None,
        })
    }

    /// The resolved backend routine id under debug control.
    pub fn target_id(&self) -> u32 {
        self.target_id
    }

    /// The proxy port extracted from the first notification.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    /// Non-blocking drain of every notice currently queued. Reads only from
    /// the channel; the connection itself is the worker's.
    pub fn drain_notices(&self) -> Vec<String> {
        let notices: Vec<String> = self.notice_rx.try_iter().collect();
        if !notices.is_empty() {
            debug!("target notices: {notices:?}");
        }
        notices
    }

    /// Joins the worker. Unbounded by policy: the worker only exits after
    /// observing cancellation or a terminal failure, both of which the
    /// coordinator triggers before calling this. Idempotent.
    pub fn wait_for_shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            debug!("waiting for the target worker to shut down");
            match worker.join() {
                Ok((conn, exit)) => {
                    self.state = match exit {
                        WorkerExit::Cancelled => TargetState::Aborted,
                        WorkerExit::Failed => TargetState::Stopped,
                    };
                    self.conn = Some(conn);
                }
                Err(_) => {
                    error!("target worker panicked");
                    self.state = TargetState::Stopped;
                }
            }
        }
    }

    /// Closes the target connection once the worker has handed it back.
    /// Idempotent no-op otherwise.
    pub fn cleanup(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close();
        }
    }
}

fn worker_died() -> Error {
    Error::Protocol("target worker exited before publishing a proxy endpoint".into())
}

/// On a failed start the worker either already exited (join hands the
/// connection back for closing) or is still blocked inside the call, in
/// which case it is abandoned and reaped at process exit.
fn release_failed_worker(worker: JoinHandle<(Connection, WorkerExit)>, err: &Error) {
    error!("target session start failed: {err}");
    if worker.is_finished() {
        if let Ok((mut conn, _)) = worker.join() {
            conn.close();
        }
    } else {
        debug!("abandoning still-running target worker");
    }
}

fn run_worker(mut conn: Connection, target_id: u32, call: String) -> (Connection, WorkerExit) {
    let exit = worker_loop(&mut conn, target_id, &call);
    // Wakes a start() still blocked on the first notification.
    conn.detach_relay();
    (conn, exit)
}

fn worker_loop(conn: &mut Connection, target_id: u32, call: &str) -> WorkerExit {
    if let Err(err) = conn.execute(&format!("register_target({target_id})"), false) {
        error!("could not register debug target {target_id}: {err}");
        return WorkerExit::Failed;
    }

    loop {
        debug!("invoking target call");
        match conn.execute(call, true) {
            Ok(result) => {
                // The remote side let the call finish instead of suspending
                // it. Re-issuing immediately keeps the registration warm and
                // avoids the proxy's idle disconnect.
                debug!("target call returned {} row(s), re-issuing", result.len());
            }
            Err(err) if err.is_cancellation() => {
                info!("target call cancelled, worker exiting");
                return WorkerExit::Cancelled;
            }
            Err(err) => {
                error!("target worker failed: {err}");
                return WorkerExit::Failed;
            }
        }
    }
}
