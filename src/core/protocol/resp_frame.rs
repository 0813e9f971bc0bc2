// src/core/protocol/resp_frame.rs

//! Implements the reply model of the RESP (REdis Serialization Protocol) and the
//! `Decoder`/`Encoder` pair used to read replies off the wire.

use crate::core::ClientError;
use bytes::{Buf, Bytes, BytesMut};
use std::fmt;
use tokio_util::codec::{Decoder, Encoder};

/// The CRLF (Carriage Return, Line Feed) sequence used to terminate lines in RESP.
pub(crate) const CRLF: &[u8] = b"\r\n";
const CRLF_LEN: usize = 2;

// Protocol-level limits so a hostile or broken server cannot exhaust memory or stack.
const MAX_FRAME_ELEMENTS: usize = 1_024 * 1_024; // Max elements in an array.
const MAX_BULK_STRING_SIZE: usize = 512 * 1024 * 1024; // 512MB max bulk string size.
const MAX_RECURSION_DEPTH: usize = 256;

/// A single decoded server reply.
///
/// `Bulk(None)` and `Array(None)` are the protocol's nil values (`$-1` and `*-1`).
/// They are distinct from an empty string (`Bulk(Some(b""))`) and from an empty
/// array (`Array(Some(vec![]))`).
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Status(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Bytes>),
    Array(Option<Vec<Response>>),
}

impl Response {
    /// The nil bulk string.
    pub const NIL: Response = Response::Bulk(None);

    /// Shorthand for a `+OK` reply.
    pub fn ok() -> Self {
        Response::Status("OK".to_string())
    }

    /// Builds a non-nil bulk reply.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Response::Bulk(Some(data.into()))
    }

    /// Builds a non-nil array reply.
    pub fn array(items: Vec<Response>) -> Self {
        Response::Array(Some(items))
    }

    /// True for `$-1` and `*-1`.
    pub fn is_nil(&self) -> bool {
        matches!(self, Response::Bulk(None) | Response::Array(None))
    }

    /// True if this is exactly the status `expected`.
    pub fn is_status(&self, expected: &str) -> bool {
        matches!(self, Response::Status(s) if s == expected)
    }

    /// True for `+OK`.
    pub fn is_ok(&self) -> bool {
        self.is_status("OK")
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    pub fn as_status(&self) -> Option<&str> {
        match self {
            Response::Status(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&str> {
        match self {
            Response::Error(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Response::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Borrows the payload of a non-nil bulk reply.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Response::Bulk(Some(b)) => Some(b),
            _ => None,
        }
    }

    /// Takes the payload of a non-nil bulk reply.
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            Response::Bulk(b) => b,
            _ => None,
        }
    }

    /// Takes the elements of a non-nil array reply.
    pub fn into_array(self) -> Option<Vec<Response>> {
        match self {
            Response::Array(items) => items,
            _ => None,
        }
    }

    /// A convenience method to encode a reply into a `Vec<u8>`.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_response(self, &mut buf);
        buf.to_vec()
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        match self {
            Response::Status(s) => write!(f, "{s}"),
            Response::Error(s) => write!(f, "(error) {s}"),
            Response::Integer(i) => write!(f, "(integer) {i}"),
            Response::Bulk(Some(b)) => write!(f, "\"{}\"", String::from_utf8_lossy(b)),
            Response::Bulk(None) | Response::Array(None) => write!(f, "(nil)"),
            Response::Array(Some(items)) if items.is_empty() => write!(f, "(empty array)"),
            Response::Array(Some(items)) => {
                let width = items.len().to_string().len();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                        write!(f, "{:indent$}", "")?;
                    }
                    write!(f, "{:>width$}) ", i + 1)?;
                    item.fmt_indented(f, indent + width + 2)?;
                }
                Ok(())
            }
        }
    }
}

/// Renders a reply the way interactive RESP shells do.
impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

/// A `tokio_util::codec` implementation for the RESP wire format.
///
/// It decodes [`Response`]s and encodes both [`Response`]s and
/// [`Command`](super::Command)s (see `command.rs`).
///
/// The decoder remembers how far it has validated the reply at the front of the
/// read buffer, so a large reply arriving over many reads is scanned once. That
/// progress belongs to one stream: use one codec per connection.
#[derive(Debug, Clone, Default)]
pub struct RespCodec {
    scan: ScanProgress,
}

/// How much of the reply at the front of the read buffer is known to be well formed.
#[derive(Debug, Clone, Default)]
struct ScanProgress {
    /// Bytes covered by complete elements and array headers.
    offset: usize,
    /// Elements still missing from each open array, innermost last.
    open_arrays: Vec<usize>,
}

impl RespCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continues validating `src` from the saved offset. Returns `true` once
    /// `src[..offset]` holds exactly one whole reply.
    fn scan(&mut self, src: &[u8]) -> Result<bool, ClientError> {
        let progress = &mut self.scan;
        loop {
            if progress.open_arrays.len() > MAX_RECURSION_DEPTH {
                return Err(depth_exceeded());
            }

            let mut rest = &src[progress.offset..];
            let available = rest.len();
            let scanned = match scan_element(&mut rest) {
                Ok(scanned) => scanned,
                Err(ClientError::IncompleteData) => return Ok(false),
                Err(e) => return Err(e),
            };
            progress.offset += available - rest.len();

            if let Scanned::ArrayHeader(len) = scanned {
                progress.open_arrays.push(len);
                continue;
            }
            // A finished element may complete its parent array, and so on upwards.
            loop {
                match progress.open_arrays.last_mut() {
                    None => return Ok(true),
                    Some(remaining) => {
                        *remaining -= 1;
                        if *remaining > 0 {
                            break;
                        }
                        progress.open_arrays.pop();
                    }
                }
            }
        }
    }
}

impl Encoder<Response> for RespCodec {
    type Error = ClientError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_response(&item, dst);
        Ok(())
    }
}

fn encode_response(item: &Response, dst: &mut BytesMut) {
    let mut num = itoa::Buffer::new();
    match item {
        Response::Status(s) => {
            dst.extend_from_slice(b"+");
            dst.extend_from_slice(s.as_bytes());
            dst.extend_from_slice(CRLF);
        }
        Response::Error(s) => {
            dst.extend_from_slice(b"-");
            dst.extend_from_slice(s.as_bytes());
            dst.extend_from_slice(CRLF);
        }
        Response::Integer(i) => {
            dst.extend_from_slice(b":");
            dst.extend_from_slice(num.format(*i).as_bytes());
            dst.extend_from_slice(CRLF);
        }
        Response::Bulk(Some(b)) => {
            dst.extend_from_slice(b"$");
            dst.extend_from_slice(num.format(b.len()).as_bytes());
            dst.extend_from_slice(CRLF);
            dst.extend_from_slice(b);
            dst.extend_from_slice(CRLF);
        }
        Response::Bulk(None) => dst.extend_from_slice(b"$-1\r\n"),
        Response::Array(None) => dst.extend_from_slice(b"*-1\r\n"),
        Response::Array(Some(items)) => {
            dst.extend_from_slice(b"*");
            dst.extend_from_slice(num.format(items.len()).as_bytes());
            dst.extend_from_slice(CRLF);
            for item in items {
                encode_response(item, dst);
            }
        }
    }
}

impl Decoder for RespCodec {
    type Item = Response;
    type Error = ClientError;

    /// Decodes one complete reply, or returns `Ok(None)` without consuming
    /// anything when the buffer does not yet hold a whole reply.
    ///
    /// Bytes are validated without allocating as they arrive; the reply is only
    /// built once it is complete.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.scan.offset > src.len() {
            // Not the buffer the saved progress refers to.
            self.scan = ScanProgress::default();
        }
        if src.is_empty() {
            return Ok(None);
        }

        match self.scan(src) {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(e) => {
                self.scan = ScanProgress::default();
                return Err(e);
            }
        }

        let len = std::mem::take(&mut self.scan).offset;
        let mut bytes = &src[..len];
        let reply = decode_recursive(&mut bytes, 0)?;
        src.advance(len);
        Ok(Some(reply))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(reply) => Ok(Some(reply)),
            None if buf.is_empty() => Ok(None),
            None => Err(ClientError::Protocol(format!(
                "stream ended inside a reply ({} bytes left)",
                buf.len()
            ))),
        }
    }
}

/// Decodes one reply from the front of `bytes`, advancing the slice past it.
fn decode_recursive(bytes: &mut &[u8], depth: usize) -> Result<Response, ClientError> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(depth_exceeded());
    }

    let Some(&prefix) = bytes.first() else {
        return Err(ClientError::IncompleteData);
    };
    // Advance past the type prefix.
    *bytes = &bytes[1..];

    match prefix {
        b'+' => Ok(Response::Status(parse_text(bytes)?)),
        b'-' => Ok(Response::Error(parse_text(bytes)?)),
        b':' => parse_integer(bytes).map(Response::Integer),
        b'$' => parse_bulk_string(bytes),
        b'*' => parse_array(bytes, depth),
        other => Err(invalid_prefix(other)),
    }
}

/// The shape of one element seen by the scanner.
enum Scanned {
    /// A scalar, a bulk string, a nil or an empty array.
    Leaf,
    /// An array header; this many elements follow.
    ArrayHeader(usize),
}

/// Validates one element, or one array header, at the front of `bytes` without
/// building anything.
fn scan_element(bytes: &mut &[u8]) -> Result<Scanned, ClientError> {
    let Some(&prefix) = bytes.first() else {
        return Err(ClientError::IncompleteData);
    };
    *bytes = &bytes[1..];

    match prefix {
        b'+' | b'-' => parse_line(bytes).map(|_| Scanned::Leaf),
        b':' => parse_integer(bytes).map(|_| Scanned::Leaf),
        b'$' => {
            if let Some(len) = parse_length(bytes, MAX_BULK_STRING_SIZE)? {
                take_bulk_payload(bytes, len)?;
            }
            Ok(Scanned::Leaf)
        }
        b'*' => match parse_length(bytes, MAX_FRAME_ELEMENTS)? {
            Some(len) if len > 0 => Ok(Scanned::ArrayHeader(len)),
            _ => Ok(Scanned::Leaf),
        },
        other => Err(invalid_prefix(other)),
    }
}

fn invalid_prefix(prefix: u8) -> ClientError {
    ClientError::Protocol(format!("invalid reply type prefix 0x{prefix:02x}"))
}

fn depth_exceeded() -> ClientError {
    ClientError::Protocol("RESP recursion depth limit exceeded".to_string())
}

/// Returns the bytes up to the next CRLF and advances past the CRLF.
fn parse_line<'a>(bytes: &mut &'a [u8]) -> Result<&'a [u8], ClientError> {
    if let Some(pos) = find_crlf(bytes) {
        let line = &bytes[..pos];
        *bytes = &bytes[pos + CRLF_LEN..];
        Ok(line)
    } else {
        Err(ClientError::IncompleteData)
    }
}

fn parse_text(bytes: &mut &[u8]) -> Result<String, ClientError> {
    let line = parse_line(bytes)?;
    Ok(String::from_utf8_lossy(line).into_owned())
}

fn parse_integer(bytes: &mut &[u8]) -> Result<i64, ClientError> {
    let line = parse_line(bytes)?;
    // `str::parse` tolerates a leading '+', the protocol does not.
    std::str::from_utf8(line)
        .ok()
        .filter(|s| !s.starts_with('+'))
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            ClientError::Protocol(format!(
                "invalid integer '{}'",
                String::from_utf8_lossy(line)
            ))
        })
}

/// Parses a length header, mapping `-1` to `None`.
fn parse_length(bytes: &mut &[u8], limit: usize) -> Result<Option<usize>, ClientError> {
    match parse_integer(bytes)? {
        -1 => Ok(None),
        n if n < 0 => Err(ClientError::Protocol(format!("invalid length {n}"))),
        n if n as u64 > limit as u64 => Err(ClientError::Protocol(format!(
            "length {n} exceeds limit of {limit}"
        ))),
        n => Ok(Some(n as usize)),
    }
}

/// Parses a Bulk String (e.g., `$5\r\nhello\r\n`).
fn parse_bulk_string(bytes: &mut &[u8]) -> Result<Response, ClientError> {
    let Some(len) = parse_length(bytes, MAX_BULK_STRING_SIZE)? else {
        return Ok(Response::Bulk(None));
    };

    let payload = take_bulk_payload(bytes, len)?;
    Ok(Response::Bulk(Some(Bytes::copy_from_slice(payload))))
}

/// Takes `len` payload bytes and their CRLF terminator.
fn take_bulk_payload<'a>(bytes: &mut &'a [u8], len: usize) -> Result<&'a [u8], ClientError> {
    if bytes.len() < len + CRLF_LEN {
        return Err(ClientError::IncompleteData);
    }
    if &bytes[len..len + CRLF_LEN] != CRLF {
        return Err(ClientError::Protocol(
            "bulk string payload is not terminated by CRLF".to_string(),
        ));
    }

    let payload = &bytes[..len];
    *bytes = &bytes[len + CRLF_LEN..];
    Ok(payload)
}

/// Parses an Array (e.g., `*2\r\n$3\r\nfoo\r\n:1\r\n`).
fn parse_array(bytes: &mut &[u8], depth: usize) -> Result<Response, ClientError> {
    let Some(len) = parse_length(bytes, MAX_FRAME_ELEMENTS)? else {
        return Ok(Response::Array(None));
    };

    // Preallocation is capped independently of the declared length.
    let mut items = Vec::with_capacity(len.min(1024));
    for _ in 0..len {
        items.push(decode_recursive(bytes, depth + 1)?);
    }
    Ok(Response::Array(Some(items)))
}

fn find_crlf(src: &[u8]) -> Option<usize> {
    src.windows(CRLF_LEN).position(|window| window == CRLF)
}
