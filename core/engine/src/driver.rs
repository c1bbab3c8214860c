//! Connection driver for the backend control channel.
//!
//! A [`Connection`] owns one TCP connection speaking the framed protocol in
//! [`crate::wire`]. Blocking mode reads until the statement's response
//! arrives and is used by the control session on the foreground thread.
//! Non-blocking mode drives an explicit readiness-polling loop and is used
//! by the target worker, whose statements block for as long as the remote
//! side keeps the call suspended; buffered notices are pushed through the
//! relay on every poll iteration so they are observable before the
//! statement's own result.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};

use log::{debug, error, info};

use crate::error::{Error, Result};
use crate::relay::NotificationRelay;
use crate::wire::{ErrorClass, Frame, FrameDecoder, Row, encode};

/// How statement execution waits for the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Blocking,
    NonBlocking,
}

/// Three-state readiness of the non-blocking poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Ready,
    WantRead,
    WantWrite,
}

/// One connection to the backend.
pub struct Connection {
    stream: Option<TcpStream>,
    endpoint: String,
    mode: Mode,
    pid: u32,
    seq: u64,
    decoder: FrameDecoder,
    outgoing: Vec<u8>,
    notices: Vec<String>,
    relay: NotificationRelay,
    pending: Option<(Vec<Row>, Option<crate::wire::StatementError>)>,
}

impl Connection {
    /// Opens a connection and consumes the backend greeting.
    ///
    /// Connection failures are fatal for the session being built: there is
    /// no retry, the error propagates to the caller.
    pub fn open(endpoint: &str, mode: Mode, relay: NotificationRelay) -> Result<Self> {
        let stream = TcpStream::connect(endpoint).map_err(|source| Error::Connect {
            endpoint: endpoint.to_string(),
            source,
        })?;

        let mut conn = Self {
            stream: Some(stream),
            endpoint: endpoint.to_string(),
            mode,
            pid: 0,
            seq: 0,
            decoder: FrameDecoder::new(),
            outgoing: Vec::new(),
            notices: Vec::new(),
            relay,
            pending: None,
        };

        match conn.read_frame_blocking()? {
            Frame::Greeting { pid } => conn.pid = pid,
            other => {
                return Err(Error::Protocol(format!(
                    "expected greeting, got {other:?}"
                )));
            }
        }
        debug!("connected to {endpoint}, backend pid {}", conn.pid);

        if mode == Mode::NonBlocking {
            if let Some(stream) = &conn.stream {
                stream.set_nonblocking(true)?;
            }
        }
        Ok(conn)
    }

    /// Backend process id reported in the greeting.
    pub fn backend_pid(&self) -> u32 {
        self.pid
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Executes one tabular statement.
    ///
    /// Statement-level syntax errors and backend connection loss are
    /// recovered locally: one log line, empty rows. Callers treat "no
    /// result" as a valid outcome for probing statements. Every other
    /// failure propagates.
    pub fn execute(&mut self, statement: &str, fetch_result: bool) -> Result<Vec<Row>> {
        match self.submit(statement) {
            Ok(rows) => Ok(if fetch_result { rows } else { Vec::new() }),
            Err(Error::Backend {
                class: ErrorClass::SyntaxError,
                message,
            }) => {
                error!("statement rejected: {message}");
                Ok(Vec::new())
            }
            Err(Error::Backend {
                class: ErrorClass::ConnectionLost,
                message,
            }) => {
                error!("backend connection failure: {message}");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// Loads the debugging extension, converting the backend's
    /// `undefined_object` failure into the fatal [`Error::ExtensionMissing`]
    /// since nothing downstream is meaningful without it.
    pub fn bootstrap_extension(&mut self, name: &str) -> Result<()> {
        info!("loading extension {name}");
        match self.execute(&format!("load_extension({name})"), false) {
            Err(Error::Backend {
                class: ErrorClass::UndefinedObject,
                message,
            }) => {
                error!("could not load extension `{name}`: {message}");
                Err(Error::ExtensionMissing(name.to_string()))
            }
            other => other.map(|_| ()),
        }
    }

    /// Drops the relay sink so receivers blocked on the notice channel wake
    /// up. Called by the target worker on its way out.
    pub fn detach_relay(&mut self) {
        self.relay.detach();
    }

    /// Closes the connection. Safe to call once; later statements fail with
    /// a transport error.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            debug!("closed connection to {}", self.endpoint);
        }
    }

    fn submit(&mut self, statement: &str) -> Result<Vec<Row>> {
        self.seq += 1;
        let seq = self.seq;
        debug!("executing [{seq}]: {statement}");

        let bytes = encode(&Frame::Request {
            seq,
            statement: statement.to_string(),
        })?;

        match self.mode {
            Mode::Blocking => self.submit_blocking(seq, &bytes),
            Mode::NonBlocking => self.submit_polling(seq, bytes),
        }
    }

    fn submit_blocking(&mut self, seq: u64, bytes: &[u8]) -> Result<Vec<Row>> {
        self.stream()?.write_all(bytes)?;
        loop {
            let frame = self.read_frame_blocking()?;
            if self.accept(seq, frame)? {
                self.relay.forward(&mut self.notices);
                return self.finish();
            }
        }
    }

    fn submit_polling(&mut self, seq: u64, bytes: Vec<u8>) -> Result<Vec<Row>> {
        self.outgoing = bytes;
        loop {
            let readiness = self.poll_step(seq)?;
            // Notices must be observable before the statement's own result,
            // so the relay runs on every iteration, WantRead and WantWrite
            // included.
            self.relay.forward(&mut self.notices);
            match readiness {
                Readiness::Ready => return self.finish(),
                Readiness::WantRead | Readiness::WantWrite => self.wait_for(readiness)?,
            }
        }
    }

    /// One non-blocking step: flush pending output, then drain whatever the
    /// socket has, stopping at the statement's response.
    fn poll_step(&mut self, seq: u64) -> Result<Readiness> {
        while !self.outgoing.is_empty() {
            let Self {
                stream, outgoing, ..
            } = self;
            let stream = stream
                .as_mut()
                .ok_or_else(|| io::Error::from(ErrorKind::NotConnected))?;
            match stream.write(outgoing) {
                Ok(0) => return Err(io::Error::from(ErrorKind::WriteZero).into()),
                Ok(written) => {
                    self.outgoing.drain(..written);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Ok(Readiness::WantWrite);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }

        let mut buf = [0u8; 4096];
        loop {
            while let Some(frame) = self.decoder.next()? {
                if self.accept(seq, frame)? {
                    return Ok(Readiness::Ready);
                }
            }
            match self.stream()?.read(&mut buf) {
                Ok(0) => {
                    return Err(Error::Backend {
                        class: ErrorClass::ConnectionLost,
                        message: "backend closed the connection".into(),
                    });
                }
                Ok(read) => self.decoder.extend(&buf[..read]),
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Ok(Readiness::WantRead);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Files an inbound frame. Returns `true` once the response for the
    /// in-flight statement is held. Any out-of-place frame is a protocol
    /// violation with no local recovery.
    fn accept(&mut self, seq: u64, frame: Frame) -> Result<bool> {
        match frame {
            Frame::Notice { text } => {
                self.notices.push(text);
                Ok(false)
            }
            Frame::Response {
                seq: got,
                rows,
                error,
            } => {
                if got != seq {
                    return Err(Error::Protocol(format!(
                        "response for statement {got} while {seq} is in flight"
                    )));
                }
                self.pending = Some((rows, error));
                Ok(true)
            }
            other => Err(Error::Protocol(format!("unexpected frame: {other:?}"))),
        }
    }

    fn finish(&mut self) -> Result<Vec<Row>> {
        let (rows, error) = self
            .pending
            .take()
            .ok_or_else(|| Error::Protocol("no response held for finished statement".into()))?;
        match error {
            None => Ok(rows),
            Some(err) if err.class == ErrorClass::Cancelled => Err(Error::Cancelled),
            Some(err) => Err(Error::Backend {
                class: err.class,
                message: err.message,
            }),
        }
    }

    fn read_frame_blocking(&mut self) -> Result<Frame> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(frame) = self.decoder.next()? {
                return Ok(frame);
            }
            match self.stream()?.read(&mut buf) {
                Ok(0) => {
                    return Err(Error::Backend {
                        class: ErrorClass::ConnectionLost,
                        message: "backend closed the connection".into(),
                    });
                }
                Ok(read) => self.decoder.extend(&buf[..read]),
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Blocks the calling thread until the socket is ready in the given
    /// direction. Only ever blocks the worker thread: the foreground uses
    /// blocking mode and never reaches the poll loop.
    #[cfg(unix)]
    fn wait_for(&self, readiness: Readiness) -> Result<()> {
        use std::os::fd::AsFd;

        use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

        let direction = match readiness {
            Readiness::WantRead => PollFlags::POLLIN,
            Readiness::WantWrite => PollFlags::POLLOUT,
            Readiness::Ready => return Ok(()),
        };
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| io::Error::from(ErrorKind::NotConnected))?;
        let mut fds = [PollFd::new(stream.as_fd(), direction)];
        poll(&mut fds, PollTimeout::NONE).map_err(io::Error::from)?;
        Ok(())
    }

    /// No `poll(2)` off unix; a short sleep bounds the retry rate instead.
    #[cfg(not(unix))]
    fn wait_for(&self, _readiness: Readiness) -> Result<()> {
        std::thread::sleep(std::time::Duration::from_millis(10));
        Ok(())
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::from(ErrorKind::NotConnected).into())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("mode", &self.mode)
            .field("pid", &self.pid)
            .field("open", &self.stream.is_some())
            .finish()
    }
}
