//! In-process mock backend for session tests.
//!
//! Listens on an ephemeral port and speaks the framed wire protocol: one
//! greeting per connection, then canned responses keyed by the statement
//! head. The connection that issues the debugged call itself becomes the
//! target connection: it publishes the proxy endpoint notice, then parks
//! until a control connection releases it with `continue` diagnostics or an
//! `abort_target` cancellation.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{Sender, unbounded};
use rdbg_engine::wire::{ErrorClass, Frame, FrameDecoder, StatementError, encode};
use serde_json::json;

/// Canned behavior, set once per test.
pub struct Behavior {
    pub routines: Vec<(&'static str, u32)>,
    pub proxy_port: u16,
    /// Emitted on the target connection right after the endpoint notice.
    pub startup_notices: Vec<&'static str>,
    /// Emitted on the target connection for each `continue`.
    pub continue_notices: Vec<&'static str>,
    /// When false, `load_extension` fails with `undefined_object`.
    pub extension_available: bool,
    /// When false, the target call parks without ever publishing the proxy
    /// endpoint notice.
    pub publish_endpoint: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            routines: vec![("f(integer)", 11), ("g()", 20)],
            proxy_port: 7001,
            startup_notices: Vec::new(),
            continue_notices: Vec::new(),
            extension_available: true,
            publish_endpoint: true,
        }
    }
}

enum TargetEvent {
    Notice(String),
    Cancel,
}

struct Shared {
    behavior: Behavior,
    connections: AtomicUsize,
    target: Mutex<Option<Sender<TargetEvent>>>,
}

pub struct MockBackend {
    endpoint: String,
    shared: Arc<Shared>,
}

impl MockBackend {
    pub fn spawn(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        let shared = Arc::new(Shared {
            behavior,
            connections: AtomicUsize::new(0),
            target: Mutex::new(None),
        });

        let accepting = Arc::clone(&shared);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let shared = Arc::clone(&accepting);
                thread::spawn(move || handle(stream, shared));
            }
        });

        Self { endpoint, shared }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// How many connections have been accepted so far. Connections are
    /// counted before the greeting is sent, so a client that has read its
    /// greeting is always counted.
    pub fn connection_count(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }
}

fn handle(mut stream: TcpStream, shared: Arc<Shared>) {
    let index = shared.connections.fetch_add(1, Ordering::SeqCst);
    send(&mut stream, &Frame::Greeting {
        pid: 4000 + index as u32,
    });

    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 4096];
    loop {
        loop {
            match decoder.next() {
                Ok(Some(Frame::Request { seq, statement })) => {
                    respond(&mut stream, &shared, seq, &statement);
                }
                Ok(Some(_)) => return,
                Ok(None) => break,
                Err(_) => return,
            }
        }
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(read) => decoder.extend(&buf[..read]),
        }
    }
}

fn respond(stream: &mut TcpStream, shared: &Arc<Shared>, seq: u64, statement: &str) {
    let behavior = &shared.behavior;
    let head = statement.split('(').next().unwrap_or_default().trim();
    let rows = match head {
        "load_extension" => {
            if !behavior.extension_available {
                send(stream, &Frame::Response {
                    seq,
                    rows: Vec::new(),
                    error: Some(StatementError {
                        class: ErrorClass::UndefinedObject,
                        message: "extension does not exist".into(),
                    }),
                });
                return;
            }
            Vec::new()
        }
        "register_target" => Vec::new(),
        "list_routines" => behavior
            .routines
            .iter()
            .map(|(signature, id)| vec![json!(signature), json!(id)])
            .collect(),
        "attach_to_port" => vec![vec![json!(901)]],
        "continue" => {
            if let Some(tx) = shared.target.lock().unwrap().as_ref() {
                for notice in &behavior.continue_notices {
                    let _ = tx.send(TargetEvent::Notice((*notice).to_string()));
                }
            }
            vec![vec![json!(0)]]
        }
        "abort_target" => {
            if let Some(tx) = shared.target.lock().unwrap().as_ref() {
                let _ = tx.send(TargetEvent::Cancel);
            }
            vec![vec![json!(0)]]
        }
        "step_into" | "step_over" => vec![vec![json!(11), json!(3), json!("f(integer)")]],
        "get_variables" => vec![vec![
            json!("i"),
            json!("local"),
            json!(2),
            json!(false),
            json!(false),
            json!(false),
            json!("integer"),
            json!("2"),
        ]],
        "get_stack" => vec![vec![
            json!(0),
            json!("f(2)"),
            json!(11),
            json!(3),
            json!("i=2"),
        ]],
        "get_breakpoints" => vec![vec![json!(11), json!(3), json!("f(integer)")]],
        "get_source" => vec![vec![json!("BEGIN\n  RETURN i;\nEND;")]],
        "set_breakpoint" => vec![vec![json!(1)]],
        // Anything else is the debugged call itself.
        _ => {
            run_target_call(stream, shared, seq);
            return;
        }
    };
    send(stream, &Frame::Response {
        seq,
        rows,
        error: None,
    });
}

/// Turns this connection into the target: publish the proxy endpoint, then
/// park until a control connection cancels the call.
fn run_target_call(stream: &mut TcpStream, shared: &Arc<Shared>, seq: u64) {
    let (tx, rx) = unbounded();
    *shared.target.lock().unwrap() = Some(tx);

    if shared.behavior.publish_endpoint {
        send(stream, &Frame::Notice {
            text: format!("PLDBG:{}", shared.behavior.proxy_port),
        });
        for notice in &shared.behavior.startup_notices {
            send(stream, &Frame::Notice {
                text: (*notice).to_string(),
            });
        }
    }

    loop {
        match rx.recv() {
            Ok(TargetEvent::Notice(text)) => send(stream, &Frame::Notice { text }),
            Ok(TargetEvent::Cancel) | Err(_) => {
                send(stream, &Frame::Response {
                    seq,
                    rows: Vec::new(),
                    error: Some(StatementError {
                        class: ErrorClass::Cancelled,
                        message: "canceling statement due to user request".into(),
                    }),
                });
                return;
            }
        }
    }
}

fn send(stream: &mut TcpStream, frame: &Frame) {
    let bytes = encode(frame).unwrap();
    let _ = stream.write_all(&bytes);
}
