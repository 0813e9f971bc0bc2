// src/core/protocol/command.rs

//! The request side of the protocol: a command is an array of bulk strings.

use super::resp_frame::{CRLF, RespCodec};
use crate::core::ClientError;
use bytes::{Bytes, BytesMut};
use std::fmt;
use tokio_util::codec::Encoder;

/// Converts a value into a single command argument.
///
/// Integers are rendered as decimal ASCII, floats in their shortest
/// round-tripping form and booleans as the protocol flags `1`/`0`.
pub trait ToArg {
    fn to_arg(&self) -> Bytes;
}

impl ToArg for Bytes {
    fn to_arg(&self) -> Bytes {
        self.clone()
    }
}

impl ToArg for str {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for [u8] {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl<const N: usize> ToArg for [u8; N] {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for Vec<u8> {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for bool {
    fn to_arg(&self) -> Bytes {
        Bytes::from_static(if *self { b"1" } else { b"0" })
    }
}

macro_rules! int_to_arg {
    ($($t:ty),*) => {
        $(
            impl ToArg for $t {
                fn to_arg(&self) -> Bytes {
                    Bytes::copy_from_slice(itoa::Buffer::new().format(*self).as_bytes())
                }
            }
        )*
    };
}

int_to_arg!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl ToArg for f64 {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(ryu::Buffer::new().format(*self).as_bytes())
    }
}

impl ToArg for f32 {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(ryu::Buffer::new().format(*self).as_bytes())
    }
}

impl<T: ToArg + ?Sized> ToArg for &T {
    fn to_arg(&self) -> Bytes {
        (**self).to_arg()
    }
}

/// A command ready to be written: the verb followed by its arguments, in wire order.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Command {
    parts: Vec<Bytes>,
}

impl Command {
    /// Starts a command with the given verb.
    pub fn new(verb: impl ToArg) -> Self {
        Self {
            parts: vec![verb.to_arg()],
        }
    }

    /// Builds a command from pre-split parts, e.g. words typed at a shell.
    pub fn from_parts<I, T>(parts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToArg,
    {
        Self {
            parts: parts.into_iter().map(|p| p.to_arg()).collect(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl ToArg) -> Self {
        self.parts.push(arg.to_arg());
        self
    }

    /// Appends every argument yielded by `args`, in order.
    pub fn args<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToArg,
    {
        self.parts.extend(args.into_iter().map(|a| a.to_arg()));
        self
    }

    /// Appends one argument in place.
    pub fn push_arg(&mut self, arg: impl ToArg) {
        self.parts.push(arg.to_arg());
    }

    /// The verb, e.g. `SET`.
    pub fn name(&self) -> &[u8] {
        self.parts.first().map(|b| b.as_ref()).unwrap_or_default()
    }

    /// The verb as text, for logs.
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(self.name()).into_owned()
    }

    /// The verb followed by the arguments.
    pub fn parts(&self) -> &[Bytes] {
        &self.parts
    }

    /// Everything after the verb.
    pub fn arguments(&self) -> &[Bytes] {
        self.parts.get(1..).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// True if the verb matches `verb`, ignoring ASCII case.
    pub fn is(&self, verb: &str) -> bool {
        self.name().eq_ignore_ascii_case(verb.as_bytes())
    }

    /// Encodes the command into a `Vec<u8>`.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.write_to(&mut buf);
        buf.to_vec()
    }

    fn write_to(&self, dst: &mut BytesMut) {
        let mut num = itoa::Buffer::new();
        let payload: usize = self.parts.iter().map(|p| p.len() + 16).sum();
        dst.reserve(payload + 16);

        dst.extend_from_slice(b"*");
        dst.extend_from_slice(num.format(self.parts.len()).as_bytes());
        dst.extend_from_slice(CRLF);
        for part in &self.parts {
            dst.extend_from_slice(b"$");
            dst.extend_from_slice(num.format(part.len()).as_bytes());
            dst.extend_from_slice(CRLF);
            dst.extend_from_slice(part);
            dst.extend_from_slice(CRLF);
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.parts.iter().map(|p| String::from_utf8_lossy(p)))
            .finish()
    }
}

impl From<&str> for Command {
    fn from(verb: &str) -> Self {
        Command::new(verb)
    }
}

impl Encoder<Command> for RespCodec {
    type Error = ClientError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.is_empty() {
            return Err(ClientError::Protocol("cannot send an empty command".into()));
        }
        item.write_to(dst);
        Ok(())
    }
}
