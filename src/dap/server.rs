use super::protocol::{write_message, DapMessage, DapMessageContent};
use crate::config::{DisconnectPolicy, LaunchArguments};
use crate::debugger::{DebugEvent, DebugSession, Variable};
use crate::error::ProtocolError;
use crate::spec;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

const THREAD_ID: u64 = 1;

type Reply = Result<Option<Value>, ProtocolError>;

/// Sequence counter and writer shared by request handling and the event forwarder.
struct Outbound<W> {
    seq: u64,
    writer: W,
}

impl<W: Write> Outbound<W> {
    fn send(&mut self, content: DapMessageContent) {
        self.seq += 1;
        let msg = DapMessage { seq: self.seq, content };
        if let Err(e) = write_message(&mut self.writer, &msg) {
            warn!(error = %e, "failed to write a protocol message");
        }
    }
}

/// Debug Adapter Protocol front end for one debug session.
pub struct DapServer<W: Write + Send + 'static> {
    outbound: Arc<Mutex<Outbound<W>>>,
    default_policy: DisconnectPolicy,
    session: Option<DebugSession>,
    forwarder: Option<JoinHandle<()>>,
}

impl<W: Write + Send + 'static> DapServer<W> {
    pub fn new(writer: W, default_policy: DisconnectPolicy) -> Self {
        Self {
            outbound: Arc::new(Mutex::new(Outbound { seq: 0, writer })),
            default_policy,
            session: None,
            forwarder: None,
        }
    }

    pub fn send_response(
        &self,
        request_seq: u64,
        command: String,
        success: bool,
        message: Option<String>,
        body: Option<Value>,
    ) {
        self.outbound.lock().send(
            DapMessageContent::Response {
                request_seq,
                success,
                command,
                message,
                body,
            },
        );
    }

    pub fn send_event(&self, event: &str, body: Option<Value>) {
        send_event(&self.outbound, event, body);
    }

    /// Handles one incoming message. Returns false once the client has disconnected.
    pub fn dispatch(&mut self, msg: DapMessage) -> bool {
        let DapMessageContent::Request { command, arguments } = msg.content else {
            debug!(seq = msg.seq, "ignoring non-request message");
            return true;
        };
        debug!(seq = msg.seq, %command, "request");

        let reply = match command.as_str() {
            "initialize" => self.handle_initialize(),
            "launch" => self.handle_launch(arguments),
            "setBreakpoints" => self.handle_set_breakpoints(arguments),
            "configurationDone" => self.handle_configuration_done(),
            "threads" => Ok(Some(json!({
                "threads": [{ "id": THREAD_ID, "name": "evaluator" }]
            }))),
            "stackTrace" => self.handle_stack_trace(),
            "scopes" => self.handle_scopes(arguments),
            "variables" => self.handle_variables(arguments),
            "continue" => self
                .session_mut()
                .and_then(DebugSession::continue_)
                .map(|()| Some(json!({ "allThreadsContinued": true }))),
            "next" => self.session_mut().and_then(DebugSession::step_over).map(|()| None),
            "stepIn" => self.handle_step_in(arguments),
            "stepOut" => self.session_mut().and_then(DebugSession::step_out).map(|()| None),
            "disconnect" => match self.handle_disconnect(arguments) {
                Ok(body) => {
                    self.send_response(msg.seq, command.clone(), true, None, body);
                    self.join_forwarder();
                    return false;
                }
                // The session keeps running; the client may retry.
                Err(err) => Err(err),
            },
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        };

        match reply {
            Ok(body) => self.send_response(msg.seq, command.clone(), true, None, body),
            Err(err) => {
                warn!(%command, error = %err, "request failed");
                self.send_response(
                    msg.seq,
                    command.clone(),
                    false,
                    Some(err.to_string()),
                    Some(json!({ "error": { "id": error_code(&err), "format": err.to_string() } })),
                );
            }
        }

        if command == "initialize" {
            self.send_event("initialized", None);
        }
        true
    }

    fn session(&self) -> Result<&DebugSession, ProtocolError> {
        self.session.as_ref().ok_or(ProtocolError::NoSession)
    }

    fn session_mut(&mut self) -> Result<&mut DebugSession, ProtocolError> {
        self.session.as_mut().ok_or(ProtocolError::NoSession)
    }

    fn handle_initialize(&self) -> Reply {
        Ok(Some(json!({
            "supportsConfigurationDoneRequest": true,
            "supportsStepBack": false,
            "supportsStepInTargetsRequest": false,
            "supportsFunctionBreakpoints": false,
            "supportsConditionalBreakpoints": false,
            "supportsSetVariable": false,
            "supportsTerminateRequest": false,
        })))
    }

    fn handle_launch(&mut self, arguments: Option<Value>) -> Reply {
        let launch: LaunchArguments = parse(arguments)?;
        let spec = spec::load_file(&launch.program)
            .map_err(|e| ProtocolError::InvalidArguments(e.to_string()))?;
        let config = launch.config(self.default_policy);
        info!(program = %launch.program.display(), stop_on_entry = config.stop_on_entry, "launch");
        self.session = Some(DebugSession::new(Arc::new(spec), config));
        Ok(None)
    }

    fn handle_set_breakpoints(&mut self, arguments: Option<Value>) -> Reply {
        let args: SetBreakpointsArguments = parse(arguments)?;
        let module = args.source.module_name().ok_or_else(|| {
            ProtocolError::InvalidArguments("setBreakpoints needs a source path or name".to_string())
        })?;
        let mut lines: Vec<u32> = args.breakpoints.iter().map(|b| b.line).collect();
        lines.extend(args.lines);
        lines.sort_unstable();
        lines.dedup();

        let set = self.session()?.set_breakpoints(&module, &lines)?;
        let breakpoints: Vec<Value> = set
            .iter()
            .map(|b| json!({ "verified": true, "line": b.line }))
            .collect();
        Ok(Some(json!({ "breakpoints": breakpoints })))
    }

    fn handle_configuration_done(&mut self) -> Reply {
        let session = self.session_mut()?;
        let events = session.take_events();
        session.launch()?;
        if let Some(events) = events {
            let outbound = Arc::clone(&self.outbound);
            let forwarder = thread::Builder::new()
                .name("dap-events".to_string())
                .spawn(move || forward_events(events, outbound))
                .map_err(|e| ProtocolError::Launch(e.to_string()))?;
            self.forwarder = Some(forwarder);
        }
        Ok(None)
    }

    fn handle_stack_trace(&self) -> Reply {
        let session = self.session()?;
        let frames: Vec<Value> = session
            .stack_trace()?
            .into_iter()
            .map(|frame| {
                let path = session
                    .spec()
                    .module(&frame.module)
                    .and_then(|m| m.path.as_ref())
                    .map(|p| p.display().to_string());
                json!({
                    "id": frame.id,
                    "name": frame.name,
                    "source": { "name": frame.module, "path": path },
                    "line": frame.begin_line,
                    "column": frame.begin_column,
                    "endLine": frame.end_line,
                    "endColumn": frame.end_column,
                    "kind": frame.kind,
                })
            })
            .collect();
        Ok(Some(json!({ "totalFrames": frames.len(), "stackFrames": frames })))
    }

    fn handle_scopes(&mut self, arguments: Option<Value>) -> Reply {
        let args: ScopesArguments = parse(arguments)?;
        let scopes: Vec<Value> = self
            .session_mut()?
            .scopes(args.frame_id)?
            .into_iter()
            .map(|scope| {
                json!({
                    "name": scope.name,
                    "variablesReference": scope.handle,
                    "namedVariables": scope.count,
                    "expensive": false,
                })
            })
            .collect();
        Ok(Some(json!({ "scopes": scopes })))
    }

    fn handle_variables(&mut self, arguments: Option<Value>) -> Reply {
        let args: VariablesArguments = parse(arguments)?;
        let variables: Vec<Value> = self
            .session_mut()?
            .expand(args.variables_reference)?
            .iter()
            .map(variable_json)
            .collect();
        Ok(Some(json!({ "variables": variables })))
    }

    fn handle_step_in(&mut self, arguments: Option<Value>) -> Reply {
        let count = arguments
            .as_ref()
            .and_then(|v| v.get("count"))
            .and_then(Value::as_u64)
            .unwrap_or(1);
        let count = u32::try_from(count)
            .map_err(|_| ProtocolError::InvalidArguments(format!("step count {} is too large", count)))?;
        self.session_mut()?.step_in(count)?;
        Ok(None)
    }

    fn handle_disconnect(&mut self, arguments: Option<Value>) -> Reply {
        let policy = arguments
            .as_ref()
            .and_then(|v| v.get("disconnectPolicy"))
            .cloned()
            .map(serde_json::from_value::<DisconnectPolicy>)
            .transpose()
            .map_err(|e| ProtocolError::InvalidArguments(e.to_string()))?;
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        let verdict = session.disconnect(policy);
        info!(verdict = ?verdict, "client disconnected");
        Ok(verdict.map(|v| json!({ "verdict": v.to_string(), "success": v.is_success() })))
    }

    /// Transport closed without a `disconnect` request: apply the configured policy.
    pub fn shutdown(&mut self) {
        if let Some(session) = self.session.as_mut() {
            let verdict = session.disconnect(None);
            info!(verdict = ?verdict, "transport closed");
        }
        self.join_forwarder();
    }

    fn join_forwarder(&mut self) {
        // Dropping the session closes the event channel and ends the forwarder.
        self.session = None;
        if let Some(forwarder) = self.forwarder.take() {
            let _ = forwarder.join();
        }
    }
}

fn send_event<W: Write>(outbound: &Mutex<Outbound<W>>, event: &str, body: Option<Value>) {
    outbound.lock().send(
        DapMessageContent::Event {
            event: event.to_string(),
            body,
        },
    );
}

fn forward_events<W: Write>(events: Receiver<DebugEvent>, outbound: Arc<Mutex<Outbound<W>>>) {
    for event in events {
        match event {
            DebugEvent::Stopped { reason, frames } => {
                let description = frames.first().map(|f| format!("{} at {}", f.name, f.location));
                send_event(
                    &outbound,
                    "stopped",
                    Some(json!({
                        "reason": reason.as_str(),
                        "description": description,
                        "threadId": THREAD_ID,
                        "allThreadsStopped": true,
                    })),
                );
            }
            DebugEvent::Terminated { verdict } => {
                send_event(
                    &outbound,
                    "output",
                    Some(json!({ "category": "console", "output": format!("{}\n", verdict) })),
                );
                send_event(&outbound, "terminated", None);
                send_event(
                    &outbound,
                    "exited",
                    Some(json!({ "exitCode": if verdict.is_success() { 0 } else { 1 } })),
                );
                break;
            }
        }
    }
}

fn variable_json(var: &Variable) -> Value {
    json!({
        "name": var.name,
        "value": var.value,
        "type": var.type_tag,
        "variablesReference": var.handle.unwrap_or(0),
    })
}

fn error_code(err: &ProtocolError) -> u32 {
    match err {
        ProtocolError::UnknownCommand(_) => 1001,
        ProtocolError::InvalidBreakpointLocation { .. } => 1002,
        ProtocolError::StaleFrameReference(_) => 1003,
        ProtocolError::UnknownHandle(_) => 1004,
        ProtocolError::NotPaused => 1005,
        ProtocolError::SessionTerminated => 1006,
        ProtocolError::NoSession => 1007,
        ProtocolError::InvalidArguments(_) => 1008,
        ProtocolError::Launch(_) => 1009,
    }
}

fn parse<T: for<'de> Deserialize<'de>>(arguments: Option<Value>) -> Result<T, ProtocolError> {
    serde_json::from_value(arguments.unwrap_or(Value::Null))
        .map_err(|e| ProtocolError::InvalidArguments(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct Source {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

impl Source {
    /// Modules are named after their file stem.
    fn module_name(&self) -> Option<String> {
        self.path
            .as_deref()
            .or(self.name.as_deref())
            .and_then(|p| Path::new(p).file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
    }
}

#[derive(Debug, Deserialize)]
struct SourceBreakpoint {
    line: u32,
}

#[derive(Debug, Deserialize)]
struct SetBreakpointsArguments {
    source: Source,
    #[serde(default)]
    breakpoints: Vec<SourceBreakpoint>,
    #[serde(default)]
    lines: Vec<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScopesArguments {
    frame_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariablesArguments {
    variables_reference: u64,
}
