//! Incremental message framing
//!
//! Bytes from a backend's stdout arrive in arbitrary chunks. `FrameDecoder`
//! accumulates them and yields one JSON body per complete frame:
//!
//! ```text
//! Content-Length: 42\r\n\r\n{...}      JSON-RPC (header ends with a blank line)
//! Content-Length: 42\n{...}\n          tsserver (header ends with one newline)
//! ```
//!
//! The buffer is always advanced past a frame before its body is parsed, so a
//! bad body can never stall the stream.

use serde_json::Value;

use crate::error::FrameError;

const CONTENT_LENGTH: &[u8] = b"Content-Length:";

/// Wire framing variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Headers terminated by `\r\n\r\n`
    ContentLength,
    /// `Content-Length` line terminated by a single `\n`
    LineHeader,
}

impl Framing {
    /// Encode an outbound body with `Content-Length` framing
    pub fn encode(body: &str) -> Vec<u8> {
        let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
        frame.extend_from_slice(body.as_bytes());
        frame
    }
}

#[derive(Debug)]
pub struct FrameDecoder {
    framing: Framing,
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: Vec::new(),
        }
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete frame, `None` when more bytes are needed
    pub fn next_frame(&mut self) -> Option<Result<Value, FrameError>> {
        match self.framing {
            Framing::ContentLength => self.next_content_length(),
            Framing::LineHeader => self.next_line_header(),
        }
    }

    fn next_content_length(&mut self) -> Option<Result<Value, FrameError>> {
        let terminator = find(&self.buffer, b"\r\n\r\n")?;
        let header_end = terminator + 4;

        let length = match parse_length(&self.buffer[..terminator]) {
            Ok(length) => length,
            Err(header) => {
                self.buffer.drain(..header_end);
                return Some(Err(FrameError::MalformedHeader(header)));
            }
        };

        if self.buffer.len() < header_end + length {
            return None;
        }

        let body: Vec<u8> = self.buffer.drain(..header_end + length).skip(header_end).collect();
        Some(parse_body(&body))
    }

    fn next_line_header(&mut self) -> Option<Result<Value, FrameError>> {
        // Discard anything before the marker (trailing newlines of the
        // previous body, stray log output)
        let Some(marker) = find(&self.buffer, CONTENT_LENGTH) else {
            let keep = CONTENT_LENGTH.len().saturating_sub(1).min(self.buffer.len());
            let discard = self.buffer.len() - keep;
            self.buffer.drain(..discard);
            return None;
        };
        self.buffer.drain(..marker);

        let newline = find(&self.buffer, b"\n")?;
        let mut header_end = newline + 1;

        let length = match parse_length(&self.buffer[..newline]) {
            Ok(length) => length,
            Err(header) => {
                self.buffer.drain(..header_end);
                return Some(Err(FrameError::MalformedHeader(header)));
            }
        };

        // Tolerate a blank line between header and body
        loop {
            match self.buffer.get(header_end) {
                Some(b'\r') | Some(b'\n') => header_end += 1,
                Some(_) => break,
                None => return None,
            }
        }

        if self.buffer.len() < header_end + length {
            return None;
        }

        let body: Vec<u8> = self.buffer.drain(..header_end + length).skip(header_end).collect();
        Some(parse_body(&body))
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Extract `Content-Length` from a header block; the raw header on failure
fn parse_length(header: &[u8]) -> Result<usize, String> {
    let text = String::from_utf8_lossy(header);
    text.lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.trim().eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .ok_or_else(|| text.into_owned())
}

fn parse_body(body: &[u8]) -> Result<Value, FrameError> {
    let value = serde_json::from_slice::<Value>(body.trim_ascii())?;
    tracing::trace!("<- {}", value);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lsp_frame(body: &str) -> Vec<u8> {
        Framing::encode(body)
    }

    fn drain(decoder: &mut FrameDecoder) -> Vec<Result<Value, FrameError>> {
        std::iter::from_fn(|| decoder.next_frame()).collect()
    }

    #[test]
    fn test_encode_counts_utf8_bytes() {
        let body = r#"{"s":"héllo"}"#;
        let frame = Framing::encode(body);
        let text = String::from_utf8(frame).unwrap();
        assert!(text.starts_with(&format!("Content-Length: {}\r\n\r\n", body.len())));
        assert_eq!(body.len(), 14);
    }

    #[test]
    fn test_single_frame() {
        let mut decoder = FrameDecoder::new(Framing::ContentLength);
        decoder.extend(&lsp_frame(r#"{"jsonrpc":"2.0","id":1,"result":null}"#));
        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref().unwrap()["id"], json!(1));
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_header_then_body_split_across_writes() {
        let body = r#"{"jsonrpc":"2.0","method":"window/logMessage","params":{"message":"héllo wörld"}}"#;
        let frame = lsp_frame(body);
        let header_len = frame.len() - body.len();

        let mut decoder = FrameDecoder::new(Framing::ContentLength);
        decoder.extend(&frame[..header_len]);
        assert!(decoder.next_frame().is_none());

        // Split inside a multi-byte character
        let split = header_len + body.find('é').unwrap() + 1;
        decoder.extend(&frame[header_len..split]);
        assert!(decoder.next_frame().is_none());

        decoder.extend(&frame[split..]);
        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].as_ref().unwrap()["params"]["message"],
            json!("héllo wörld")
        );
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut stream = lsp_frame(r#"{"id":1}"#);
        stream.extend(lsp_frame(r#"{"id":2}"#));

        let mut decoder = FrameDecoder::new(Framing::ContentLength);
        let mut ids = Vec::new();
        for byte in stream {
            decoder.extend(&[byte]);
            while let Some(frame) = decoder.next_frame() {
                ids.push(frame.unwrap()["id"].as_u64().unwrap());
            }
        }
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_missing_length_is_skipped() {
        let mut stream = b"Content-Type: application/json\r\n\r\n".to_vec();
        stream.extend(lsp_frame(r#"{"id":7}"#));

        let mut decoder = FrameDecoder::new(Framing::ContentLength);
        decoder.extend(&stream);
        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], Err(FrameError::MalformedHeader(_))));
        assert_eq!(frames[1].as_ref().unwrap()["id"], json!(7));
    }

    #[test]
    fn test_invalid_body_does_not_stall() {
        let mut stream = lsp_frame("{not json");
        stream.extend(lsp_frame(r#"{"id":3}"#));

        let mut decoder = FrameDecoder::new(Framing::ContentLength);
        decoder.extend(&stream);
        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], Err(FrameError::InvalidBody(_))));
        assert_eq!(frames[1].as_ref().unwrap()["id"], json!(3));
    }

    #[test]
    fn test_line_header_frames() {
        let first = r#"{"seq":0,"type":"event","event":"typingsInstallerPid","body":{"pid":1}}"#;
        let second = r#"{"seq":0,"type":"response","request_seq":1,"success":true}"#;
        let stream = format!(
            "Content-Length: {}\r\n\r\n{}\nContent-Length: {}\n{}\n",
            first.len() + 1,
            first,
            second.len(),
            second
        );

        let mut decoder = FrameDecoder::new(Framing::LineHeader);
        decoder.extend(stream.as_bytes());
        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref().unwrap()["event"], json!("typingsInstallerPid"));
        assert_eq!(frames[1].as_ref().unwrap()["request_seq"], json!(1));
    }

    #[test]
    fn test_line_header_byte_length_with_multibyte_body() {
        let body = r#"{"type":"event","event":"telemetry","body":{"name":"日本語"}}"#;
        let stream = format!("Content-Length: {}\n{}", body.len(), body);
        let bytes = stream.as_bytes();

        let mut decoder = FrameDecoder::new(Framing::LineHeader);
        let (head, tail) = bytes.split_at(bytes.len() - 3);
        decoder.extend(head);
        assert!(decoder.next_frame().is_none());
        decoder.extend(tail);
        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref().unwrap()["body"]["name"], json!("日本語"));
    }

    #[test]
    fn test_line_header_malformed_length_skips_forward() {
        let good = r#"{"type":"response","request_seq":2,"success":true}"#;
        let stream = format!("Content-Length: abc\nContent-Length: {}\n{}", good.len(), good);

        let mut decoder = FrameDecoder::new(Framing::LineHeader);
        decoder.extend(stream.as_bytes());
        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_err());
        assert_eq!(frames[1].as_ref().unwrap()["request_seq"], json!(2));
    }

    #[test]
    fn test_line_header_discards_noise_before_marker() {
        let body = r#"{"type":"event","event":"projectLoadingStart"}"#;
        let stream = format!("garbage\n\nContent-Length: {}\n{}", body.len(), body);

        let mut decoder = FrameDecoder::new(Framing::LineHeader);
        decoder.extend(stream.as_bytes());
        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_ok());
    }
}
