//! Streaming JSON output for merged responses.
//!
//! The merge engine never builds the merged document in memory: it writes tokens to a
//! [`JsonWriter`], which tracks the open containers and hands bytes to a [`Sink`].
use std::cmp::min;
use std::io::Write;

use bytes::BufMut;
use bytes::Bytes;
use bytes::BytesMut;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::Receiver;
use tokio::sync::mpsc::Sender;

use crate::error::MergeError;

/// Destination of the serialized bytes.
pub(crate) trait Sink {
    fn write_buf(&mut self, buf: &[u8]) -> Result<(), MergeError>;

    fn flush(&mut self) -> Result<(), MergeError> {
        Ok(())
    }
}

impl Sink for BytesMut {
    fn write_buf(&mut self, buf: &[u8]) -> Result<(), MergeError> {
        self.extend_from_slice(buf);
        Ok(())
    }
}

/// Sends the output as fixed size chunks over a channel.
///
/// Must be driven from a blocking task.
pub(crate) struct BytesChunkWriter {
    sender: Sender<Result<Bytes, MergeError>>,
    buffer: Option<BytesMut>,
    buffer_capacity: usize,
}

impl BytesChunkWriter {
    pub(crate) fn new(
        buffer_capacity: usize,
        channel_capacity: usize,
    ) -> (Self, Receiver<Result<Bytes, MergeError>>) {
        let (sender, receiver) = mpsc::channel(channel_capacity);

        (
            BytesChunkWriter {
                sender,
                buffer: None,
                buffer_capacity,
            },
            receiver,
        )
    }

    /// Another handle on the channel, to report failures of the task driving this writer.
    pub(crate) fn sender(&self) -> Sender<Result<Bytes, MergeError>> {
        self.sender.clone()
    }

    /// Ends the stream with `error`. Buffered bytes are dropped.
    pub(crate) fn fail(mut self, error: MergeError) {
        self.buffer = None;
        if self.sender.blocking_send(Err(error)).is_err() {
            tracing::debug!("response consumer gone before the merge error could be reported");
        }
    }

    fn send(&mut self, chunk: Bytes) -> Result<(), MergeError> {
        self.sender
            .blocking_send(Ok(chunk))
            .map_err(|_| MergeError::Cancelled)
    }
}

impl Sink for BytesChunkWriter {
    fn write_buf(&mut self, mut buf: &[u8]) -> Result<(), MergeError> {
        let mut buffer = match self.buffer.take() {
            Some(buf) => buf,
            None => BytesMut::with_capacity(self.buffer_capacity),
        };

        loop {
            let to_write = min(buf.len(), self.buffer_capacity - buffer.len());
            let mut writer = buffer.writer();

            let sz = writer.write(&buf[..to_write])?;
            buffer = writer.into_inner();

            if buffer.len() < self.buffer_capacity {
                self.buffer = Some(buffer);
                return Ok(());
            }

            self.send(buffer.freeze())?;
            if sz == buf.len() {
                return Ok(());
            }
            buf = &buf[sz..];
            buffer = BytesMut::with_capacity(self.buffer_capacity);
        }
    }

    fn flush(&mut self) -> Result<(), MergeError> {
        if let Some(buffer) = self.buffer.take() {
            if !buffer.is_empty() {
                self.send(buffer.freeze())?;
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

#[derive(Debug)]
struct Frame {
    container: Container,
    has_items: bool,
}

/// Writes JSON tokens, inserting separators.
pub(crate) struct JsonWriter<S> {
    sink: S,
    stack: Vec<Frame>,
}

impl<S: Sink> JsonWriter<S> {
    pub(crate) fn new(sink: S) -> Self {
        Self {
            sink,
            stack: Vec::new(),
        }
    }

    pub(crate) fn begin_object(&mut self) -> Result<(), MergeError> {
        self.open(Container::Object, b"{")
    }

    pub(crate) fn end_object(&mut self) -> Result<(), MergeError> {
        self.close(Container::Object, b"}")
    }

    pub(crate) fn begin_array(&mut self) -> Result<(), MergeError> {
        self.open(Container::Array, b"[")
    }

    pub(crate) fn end_array(&mut self) -> Result<(), MergeError> {
        self.close(Container::Array, b"]")
    }

    /// Writes an object key. The next token written is its value.
    pub(crate) fn key(&mut self, key: &str) -> Result<(), MergeError> {
        let needs_comma = match self.stack.last_mut() {
            Some(frame) if frame.container == Container::Object => {
                std::mem::replace(&mut frame.has_items, true)
            }
            _ => {
                failfast_debug!(key, "object key written outside of an object");
                false
            }
        };
        if needs_comma {
            self.sink.write_buf(b",")?;
        }
        write_string(&mut self.sink, key)?;
        self.sink.write_buf(b":")
    }

    pub(crate) fn null(&mut self) -> Result<(), MergeError> {
        self.before_value()?;
        self.sink.write_buf(b"null")
    }

    /// Writes `value` as is. Arrays and objects are written whole.
    pub(crate) fn value(&mut self, value: &Value) -> Result<(), MergeError> {
        self.before_value()?;
        write_value(&mut self.sink, value)
    }

    /// Number of open containers.
    pub(crate) fn depth(&self) -> usize {
        self.stack.len()
    }

    pub(crate) fn flush(&mut self) -> Result<(), MergeError> {
        self.sink.flush()
    }

    pub(crate) fn into_inner(self) -> S {
        self.sink
    }

    fn open(&mut self, container: Container, token: &[u8]) -> Result<(), MergeError> {
        self.before_value()?;
        self.stack.push(Frame {
            container,
            has_items: false,
        });
        self.sink.write_buf(token)
    }

    fn close(&mut self, container: Container, token: &[u8]) -> Result<(), MergeError> {
        match self.stack.pop() {
            Some(frame) if frame.container == container => {}
            frame => {
                failfast_debug!(?frame, ?container, "mismatched container close");
            }
        }
        self.sink.write_buf(token)
    }

    // values in objects follow their key; values in arrays are comma separated
    fn before_value(&mut self) -> Result<(), MergeError> {
        if let Some(frame) = self.stack.last_mut() {
            if frame.container == Container::Array
                && std::mem::replace(&mut frame.has_items, true)
            {
                self.sink.write_buf(b",")?;
            }
        }
        Ok(())
    }
}

fn write_value<S: Sink>(sink: &mut S, value: &Value) -> Result<(), MergeError> {
    match value {
        Value::Null => sink.write_buf(b"null"),
        Value::Bool(true) => sink.write_buf(b"true"),
        Value::Bool(false) => sink.write_buf(b"false"),
        Value::Number(n) => sink.write_buf(n.to_string().as_bytes()),
        Value::String(s) => write_string(sink, s),
        Value::Array(items) => {
            sink.write_buf(b"[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    sink.write_buf(b",")?;
                }
                write_value(sink, item)?;
            }
            sink.write_buf(b"]")
        }
        Value::Object(fields) => {
            sink.write_buf(b"{")?;
            for (i, (key, item)) in fields.iter().enumerate() {
                if i > 0 {
                    sink.write_buf(b",")?;
                }
                write_string(sink, key)?;
                sink.write_buf(b":")?;
                write_value(sink, item)?;
            }
            sink.write_buf(b"}")
        }
    }
}

fn write_string<S: Sink>(sink: &mut S, s: &str) -> Result<(), MergeError> {
    sink.write_buf(b"\"")?;

    let bytes = s.as_bytes();
    let mut start = 0;

    for (i, &byte) in bytes.iter().enumerate() {
        let escape = ESCAPE[byte as usize];
        if escape == 0 {
            continue;
        }

        if start < i {
            sink.write_buf(&bytes[start..i])?;
        }
        write_escape(sink, escape, byte)?;

        start = i + 1;
    }

    if start != bytes.len() {
        sink.write_buf(&bytes[start..])?;
    }

    sink.write_buf(b"\"")
}

fn write_escape<S: Sink>(sink: &mut S, escape: u8, byte: u8) -> Result<(), MergeError> {
    if escape == UU {
        static HEX_DIGITS: [u8; 16] = *b"0123456789abcdef";
        return sink.write_buf(&[
            b'\\',
            b'u',
            b'0',
            b'0',
            HEX_DIGITS[(byte >> 4) as usize],
            HEX_DIGITS[(byte & 0xF) as usize],
        ]);
    }
    sink.write_buf(&[b'\\', escape])
}

const BB: u8 = b'b'; // \x08
const TT: u8 = b't'; // \x09
const NN: u8 = b'n'; // \x0A
const FF: u8 = b'f'; // \x0C
const RR: u8 = b'r'; // \x0D
const QU: u8 = b'"'; // \x22
const BS: u8 = b'\\'; // \x5C
const UU: u8 = b'u'; // \x00...\x1F except the ones above
const __: u8 = 0;

// Lookup table of escape sequences. A value of b'x' at index i means that byte
// i is escaped as "\x" in JSON. A value of 0 means that byte i is not escaped.
static ESCAPE: [u8; 256] = [
    //   1   2   3   4   5   6   7   8   9   A   B   C   D   E   F
    UU, UU, UU, UU, UU, UU, UU, UU, BB, TT, NN, UU, FF, RR, UU, UU, // 0
    UU, UU, UU, UU, UU, UU, UU, UU, UU, UU, UU, UU, UU, UU, UU, UU, // 1
    __, __, QU, __, __, __, __, __, __, __, __, __, __, __, __, __, // 2
    __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, // 3
    __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, // 4
    __, __, __, __, __, __, __, __, __, __, __, __, BS, __, __, __, // 5
    __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, // 6
    __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, // 7
    __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, // 8
    __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, // 9
    __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, // A
    __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, // B
    __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, // C
    __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, // D
    __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, // E
    __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, __, // F
];
