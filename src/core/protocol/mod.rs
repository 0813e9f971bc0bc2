// src/core/protocol/mod.rs

pub mod command;
pub mod resp_frame;
pub use command::{Command, ToArg};
pub use resp_frame::{RespCodec, Response};
