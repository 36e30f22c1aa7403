use serde_json::{json, Value};
use std::io::{self, Cursor, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tla_debugger::config::DisconnectPolicy;
use tla_debugger::dap::{read_message, DapMessage, DapServer};

/// Writer whose contents stay readable while the server owns a clone.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuffer {
    fn messages(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        let mut reader = Cursor::new(bytes);
        let mut messages = Vec::new();
        while let Some(msg) = read_message(&mut reader).unwrap() {
            messages.push(serde_json::to_value(&msg).unwrap());
        }
        messages
    }

    fn response(&self, request_seq: u64) -> Value {
        self.messages()
            .into_iter()
            .find(|m| m["type"] == "response" && m["request_seq"] == request_seq)
            .unwrap_or_else(|| panic!("no response to request {}", request_seq))
    }

    /// Polls until the `nth` (1-based) event named `event` shows up.
    fn wait_event(&self, event: &str, nth: usize) -> Value {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let found: Vec<Value> = self
                .messages()
                .into_iter()
                .filter(|m| m["type"] == "event" && m["event"] == event)
                .collect();
            if let Some(msg) = found.into_iter().nth(nth - 1) {
                return msg;
            }
            assert!(Instant::now() < deadline, "timed out waiting for {} #{}", event, nth);
            thread::sleep(Duration::from_millis(10));
        }
    }
}

struct Client {
    server: DapServer<SharedBuffer>,
    output: SharedBuffer,
    seq: u64,
}

impl Client {
    fn new() -> Self {
        let output = SharedBuffer::default();
        Self {
            server: DapServer::new(output.clone(), DisconnectPolicy::Release),
            output,
            seq: 0,
        }
    }

    /// Sends a request and returns its response.
    fn request(&mut self, command: &str, arguments: Value) -> Value {
        self.seq += 1;
        let msg: DapMessage = serde_json::from_value(json!({
            "seq": self.seq,
            "type": "request",
            "command": command,
            "arguments": arguments,
        }))
        .unwrap();
        self.server.dispatch(msg);
        self.output.response(self.seq)
    }
}

fn counter_fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/counter.json")
}

#[cfg(test)]
mod dap_tests {
    use super::*;

    #[test]
    fn test_full_debug_session() {
        let mut client = Client::new();

        let init = client.request("initialize", json!({ "adapterID": "tla" }));
        assert_eq!(init["success"], true);
        assert_eq!(init["body"]["supportsConfigurationDoneRequest"], true);
        client.output.wait_event("initialized", 1);

        let launch = client.request(
            "launch",
            json!({ "program": counter_fixture(), "stopOnEntry": true }),
        );
        assert_eq!(launch["success"], true);

        let bps = client.request(
            "setBreakpoints",
            json!({ "source": { "path": "/work/Counter.tla" }, "breakpoints": [{ "line": 7 }] }),
        );
        assert_eq!(bps["body"]["breakpoints"], json!([{ "verified": true, "line": 7 }]));

        client.request("configurationDone", json!({}));
        let stopped = client.output.wait_event("stopped", 1);
        assert_eq!(stopped["body"]["reason"], "entry");

        let trace = client.request("stackTrace", json!({ "threadId": 1 }));
        let frames = trace["body"]["stackFrames"].as_array().unwrap().clone();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["name"], "Init");
        assert_eq!(frames[0]["line"], 3);
        assert_eq!(frames[0]["source"]["name"], "Counter");

        let scopes = client.request("scopes", json!({ "frameId": frames[0]["id"] }));
        let scopes = scopes["body"]["scopes"].as_array().unwrap().clone();
        let state = scopes.iter().find(|s| s["name"] == "State").unwrap();
        let vars = client.request(
            "variables",
            json!({ "variablesReference": state["variablesReference"] }),
        );
        assert_eq!(
            vars["body"]["variables"],
            json!([{ "name": "x", "value": "0", "type": "Int", "variablesReference": 0 }])
        );

        let cont = client.request("continue", json!({ "threadId": 1 }));
        assert_eq!(cont["success"], true);
        let stopped = client.output.wait_event("stopped", 2);
        assert_eq!(stopped["body"]["reason"], "breakpoint");
        let trace = client.request("stackTrace", json!({ "threadId": 1 }));
        assert_eq!(trace["body"]["stackFrames"][0]["line"], 7);

        let disconnect = client.request("disconnect", json!({}));
        assert_eq!(disconnect["body"]["verdict"], "success");
        client.output.wait_event("terminated", 1);
    }

    #[test]
    fn test_requests_fail_with_error_responses() {
        let mut client = Client::new();

        let reply = client.request("stackTrace", json!({ "threadId": 1 }));
        assert_eq!(reply["success"], false);
        assert_eq!(reply["body"]["error"]["id"], 1007);

        let reply = client.request("evaluate", json!({ "expression": "x" }));
        assert_eq!(reply["success"], false);
        assert_eq!(reply["body"]["error"]["id"], 1001);

        client.request("launch", json!({ "program": counter_fixture() }));
        let reply = client.request(
            "setBreakpoints",
            json!({ "source": { "path": "Missing.tla" }, "breakpoints": [{ "line": 1 }] }),
        );
        assert_eq!(reply["success"], false);
        assert_eq!(reply["body"]["error"]["id"], 1002);

        let reply = client.request("continue", json!({ "threadId": 1 }));
        assert_eq!(reply["body"]["error"]["id"], 1005);
    }

    #[test]
    fn test_abort_on_disconnect() {
        let mut client = Client::new();
        client.request("initialize", json!({}));
        client.request(
            "launch",
            json!({ "program": counter_fixture(), "disconnectPolicy": "abort" }),
        );
        client.request("configurationDone", json!({}));
        client.output.wait_event("stopped", 1);

        let disconnect = client.request("disconnect", json!({}));
        assert_eq!(disconnect["body"]["success"], false);
        assert_eq!(disconnect["body"]["verdict"], "evaluation failed: evaluation aborted by the debugger");
    }

    #[test]
    fn test_bad_disconnect_policy_keeps_the_session() {
        let mut client = Client::new();
        client.request("initialize", json!({}));
        client.request(
            "launch",
            json!({ "program": counter_fixture(), "disconnectPolicy": "release" }),
        );
        client.request("configurationDone", json!({}));
        client.output.wait_event("stopped", 1);

        let rejected = client.request("disconnect", json!({ "disconnectPolicy": "bogus" }));
        assert_eq!(rejected["success"], false);
        assert_eq!(rejected["body"]["error"]["id"], 1008);

        let trace = client.request("stackTrace", json!({ "threadId": 1 }));
        assert_eq!(trace["success"], true);
        assert_eq!(trace["body"]["stackFrames"][0]["name"], "Init");

        let disconnect = client.request("disconnect", json!({}));
        assert_eq!(disconnect["success"], true);
        assert_eq!(disconnect["body"]["verdict"], "success");
        let exited = client.output.wait_event("exited", 1);
        assert_eq!(exited["body"]["exitCode"], 0);
    }

    #[test]
    fn test_responses_decode_with_their_fields() {
        let mut client = Client::new();
        let init = client.request("initialize", json!({}));
        assert_eq!(init["type"], "response");
        assert_eq!(init["request_seq"], 1);
        assert_eq!(init["command"], "initialize");
        let initialized = client.output.wait_event("initialized", 1);
        assert!(initialized["seq"].as_u64().unwrap() > init["seq"].as_u64().unwrap());
    }
}
