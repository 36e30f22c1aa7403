use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, BufRead, Read, Write};

#[derive(Debug, Serialize, Deserialize)]
pub struct DapMessage {
    pub seq: u64,
    #[serde(flatten)]
    pub content: DapMessageContent,
}

/// The `type` field selects the variant.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DapMessageContent {
    Request {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arguments: Option<Value>,
    },
    Response {
        request_seq: u64,
        success: bool,
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
    Event {
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
}

/// Reads one `Content-Length` framed message. `Ok(None)` on a clean end of input.
pub fn read_message(reader: &mut impl BufRead) -> io::Result<Option<DapMessage>> {
    let mut content_length = None;
    let mut header = String::new();
    loop {
        header.clear();
        if reader.read_line(&mut header)? == 0 {
            return Ok(None);
        }
        let line = header.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            if content_length.is_some() {
                break;
            }
            continue;
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            let length = value.trim().parse::<usize>().map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, format!("bad Content-Length: {}", e))
            })?;
            content_length = Some(length);
        }
    }

    let mut buffer = vec![0u8; content_length.unwrap_or(0)];
    reader.read_exact(&mut buffer)?;
    let msg = serde_json::from_slice(&buffer)?;
    Ok(Some(msg))
}

pub fn write_message(writer: &mut impl Write, msg: &DapMessage) -> io::Result<()> {
    let json = serde_json::to_string(msg)?;
    write!(writer, "Content-Length: {}\r\n\r\n{}", json.len(), json)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reads_framed_request() {
        let body = r#"{"seq":1,"type":"request","command":"threads"}"#;
        let framed = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
        let mut reader = Cursor::new(framed.into_bytes());
        let msg = read_message(&mut reader).unwrap().unwrap();
        assert_eq!(msg.seq, 1);
        assert!(matches!(
            msg.content,
            DapMessageContent::Request { ref command, arguments: None } if command == "threads"
        ));
        assert!(read_message(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_writes_framed_event() {
        let msg = DapMessage {
            seq: 7,
            content: DapMessageContent::Event {
                event: "initialized".to_string(),
                body: None,
            },
        };
        let mut out = Vec::new();
        write_message(&mut out, &msg).unwrap();
        let text = String::from_utf8(out).unwrap();
        let (header, json) = text.split_once("\r\n\r\n").unwrap();
        assert_eq!(header, format!("Content-Length: {}", json.len()));
        assert_eq!(json, r#"{"seq":7,"type":"event","event":"initialized"}"#);
    }

    #[test]
    fn test_written_response_reads_back_as_response() {
        let msg = DapMessage {
            seq: 4,
            content: DapMessageContent::Response {
                request_seq: 2,
                success: false,
                command: "continue".to_string(),
                message: Some("the evaluator is not paused".to_string()),
                body: Some(serde_json::json!({"error": {"id": 1005}})),
            },
        };
        let mut out = Vec::new();
        write_message(&mut out, &msg).unwrap();
        let back = read_message(&mut Cursor::new(out)).unwrap().unwrap();
        assert_eq!(back.seq, 4);
        match back.content {
            DapMessageContent::Response {
                request_seq,
                success,
                command,
                message,
                body,
            } => {
                assert_eq!(request_seq, 2);
                assert!(!success);
                assert_eq!(command, "continue");
                assert_eq!(message.as_deref(), Some("the evaluator is not paused"));
                assert_eq!(body.unwrap()["error"]["id"], 1005);
            }
            other => panic!("decoded as {:?}", other),
        }
    }

    #[test]
    fn test_unknown_message_type_is_rejected() {
        let body = r#"{"seq":1,"type":"notice","command":"threads"}"#;
        let framed = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
        assert!(read_message(&mut Cursor::new(framed.into_bytes())).is_err());
    }
}
