//! Minimal protocol client driving a real socket end to end.

use std::collections::BTreeMap;
use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use easycluster_wire::{
    CLIENT_LABEL, ErrorMessage, Frame, FrameError, FrameReader, FrameWriter, Goodbye,
    LineSelector, MessageKind, Outcome, PROTOCOL_VERSION, ReleaseMessage, RequestMessage,
    ResponseMessage, SERVER_LABEL, SessionInit, WireValue, decode_payload, encode_payload,
};
use serde::Serialize;

use crate::server::ConnectionStream;

/// How long client reads wait before a test gives up.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// What the server did with the connection once the client stopped
/// reading responses.
#[derive(Debug, Default)]
pub struct Closure {
    /// Message of the ERROR frame, when one was sent.
    pub error: Option<String>,
    /// GOODBYE frames received before the close.
    pub goodbyes: Vec<Goodbye>,
}

/// Client half of a connection, signing with its own key and verifying the
/// server's frames with another so tests can model a peer holding the wrong
/// secret.
pub struct TestClient {
    stream: ConnectionStream,
    writer: FrameWriter,
    reader: FrameReader,
    next_id: u64,
    stashed: Vec<ResponseMessage>,
    keepalives: usize,
}

impl TestClient {
    /// Connects over TCP.
    pub fn connect(address: SocketAddr, key: Option<&[u8]>) -> Self {
        Self::connect_with_keys(address, key, key)
    }

    /// Connects over TCP, signing with `send_key` and verifying with
    /// `receive_key`.
    pub fn connect_with_keys(
        address: SocketAddr,
        send_key: Option<&[u8]>,
        receive_key: Option<&[u8]>,
    ) -> Self {
        let stream = TcpStream::connect(address).expect("connect to server");
        Self::over(stream.into(), send_key, receive_key)
    }

    /// Wraps an already connected stream.
    pub fn over(
        stream: ConnectionStream,
        send_key: Option<&[u8]>,
        receive_key: Option<&[u8]>,
    ) -> Self {
        let writer = send_key.map_or_else(FrameWriter::unkeyed, |key| {
            FrameWriter::keyed(key, CLIENT_LABEL).expect("client signing key")
        });
        let reader = receive_key.map_or_else(FrameReader::unkeyed, |key| {
            FrameReader::keyed(key, SERVER_LABEL).expect("server verification key")
        });
        Self {
            stream,
            writer,
            reader,
            next_id: 1,
            stashed: Vec::new(),
            keepalives: 0,
        }
    }

    /// Answers the challenge when one arrives, waits for INIT and announces
    /// the client's session parameters.
    pub fn handshake(&mut self, keepalive_ms: Option<u64>) -> SessionInit {
        let mut frame = self.expect_frame();
        if frame.kind == MessageKind::Challenge {
            let nonce = frame.payload.clone();
            self.send_raw(MessageKind::ChallengeResponse, &nonce);
            frame = self.expect_frame();
        }
        assert_eq!(frame.kind, MessageKind::Init, "expected INIT from server");
        self.reader.lift_limit();
        let init: SessionInit = decode_payload(&frame.payload).expect("decode INIT");
        self.send(
            MessageKind::Init,
            &SessionInit {
                version: PROTOCOL_VERSION.to_owned(),
                keepalive_interval_ms: keepalive_ms,
            },
        );
        init
    }

    /// Reads the challenge and echoes its nonce without waiting for INIT.
    pub fn answer_challenge(&mut self) {
        let frame = self.expect_frame();
        assert_eq!(frame.kind, MessageKind::Challenge, "expected CHALLENGE");
        self.send_raw(MessageKind::ChallengeResponse, &frame.payload);
    }

    /// Sends a frame with a raw payload.
    pub fn send_raw(&mut self, kind: MessageKind, payload: &[u8]) {
        let bytes = self.writer.encode(kind, payload).expect("encode frame");
        self.stream.write_all(&bytes).expect("write frame");
    }

    /// Serialises and sends a frame.
    pub fn send<T: Serialize>(&mut self, kind: MessageKind, message: &T) {
        let payload = encode_payload(message).expect("encode payload");
        self.send_raw(kind, &payload);
    }

    /// Sends a request and returns its id.
    pub fn call(
        &mut self,
        line: LineSelector,
        target: u64,
        method: &str,
        args: Vec<WireValue>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.send(
            MessageKind::Request,
            &RequestMessage {
                id: Some(id),
                garbage: Vec::new(),
                line,
                target: Some(target),
                method: method.to_owned(),
                args,
                kwargs: BTreeMap::new(),
            },
        );
        id
    }

    /// Calls `method` inline and waits for its response.
    pub fn call_inline(&mut self, target: u64, method: &str, args: Vec<WireValue>) -> Outcome {
        let id = self.call(LineSelector::Inline, target, method, args);
        self.expect_response(id).outcome
    }

    /// Ends a logical line.
    pub fn end_line(&mut self, line: &str) {
        self.send(
            MessageKind::Request,
            &RequestMessage {
                id: None,
                garbage: Vec::new(),
                line: LineSelector::Named(line.to_owned()),
                target: None,
                method: String::new(),
                args: Vec::new(),
                kwargs: BTreeMap::new(),
            },
        );
    }

    /// Reports handles as garbage.
    pub fn release(&mut self, handles: Vec<u64>) {
        self.send(MessageKind::Release, &ReleaseMessage { handles });
    }

    /// Sends GOODBYE.
    pub fn goodbye(&mut self) {
        self.send(
            MessageKind::Goodbye,
            &Goodbye {
                reason: Some("done".to_owned()),
                acknowledge: false,
            },
        );
    }

    /// Waits for the response to `id`, stashing others that arrive first.
    pub fn expect_response(&mut self, id: u64) -> ResponseMessage {
        if let Some(index) = self.stashed.iter().position(|response| response.id == id) {
            return self.stashed.remove(index);
        }
        loop {
            let frame = self.expect_frame();
            match frame.kind {
                MessageKind::Response => {
                    let response: ResponseMessage =
                        decode_payload(&frame.payload).expect("decode RESPONSE");
                    if response.id == id {
                        return response;
                    }
                    self.stashed.push(response);
                }
                MessageKind::Keepalive => self.keepalives += 1,
                other => panic!("expected RESPONSE {id}, got {other}"),
            }
        }
    }

    /// Waits for a KEEPALIVE frame.
    pub fn expect_keepalive(&mut self) {
        if self.keepalives > 0 {
            self.keepalives -= 1;
            return;
        }
        let frame = self.expect_frame();
        assert_eq!(frame.kind, MessageKind::Keepalive, "expected KEEPALIVE");
    }

    /// Reads until the server closes the connection.
    pub fn expect_closed(&mut self) -> Closure {
        let mut closure = Closure::default();
        let deadline = Instant::now() + CLIENT_TIMEOUT;
        loop {
            match self.next_frame(deadline) {
                Ok(Some(frame)) => match frame.kind {
                    MessageKind::Error => {
                        let message: ErrorMessage =
                            decode_payload(&frame.payload).expect("decode ERROR");
                        closure.error = Some(message.message);
                    }
                    MessageKind::Goodbye => {
                        closure
                            .goodbyes
                            .push(decode_payload(&frame.payload).expect("decode GOODBYE"));
                    }
                    _ => {}
                },
                Ok(None) => panic!("server did not close the connection"),
                Err(error) if error.is_disconnect() => return closure,
                Err(error) => panic!("unexpected read failure: {error}"),
            }
        }
    }

    /// Waits for the next frame, failing the test on timeout or close.
    pub fn expect_frame(&mut self) -> Frame {
        let deadline = Instant::now() + CLIENT_TIMEOUT;
        match self.next_frame(deadline) {
            Ok(Some(frame)) => frame,
            Ok(None) => panic!("timed out waiting for a frame"),
            Err(error) => panic!("connection failed while waiting for a frame: {error}"),
        }
    }

    fn next_frame(&mut self, deadline: Instant) -> Result<Option<Frame>, FrameError> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.stream
                .set_read_timeout(Some(remaining.min(Duration::from_millis(100))))?;
            if let Some(frame) = self.reader.poll(&mut self.stream)? {
                return Ok(Some(frame));
            }
        }
    }
}

/// Handle carried by a value-returning outcome.
pub fn remote_handle(outcome: &Outcome) -> u64 {
    match outcome {
        Outcome::Value(WireValue::Remote(reference)) => reference.handle,
        other => panic!("expected a remote reference, got {other:?}"),
    }
}

/// Integer carried by a value-returning outcome.
pub fn int_value(outcome: &Outcome) -> i64 {
    match outcome {
        Outcome::Value(WireValue::Int(value)) => *value,
        other => panic!("expected an integer, got {other:?}"),
    }
}
