// src/core/commands/mod.rs

//! Typed builders for the commands the client issues by name.
//!
//! Every builder is a thin, pure function producing a [`Command`](crate::core::Command);
//! any other command can be built directly with `Command::new(..).arg(..)`.
//! Builders are grouped by category like the server's command tree.

pub mod bitmap;
pub mod generic;
pub mod string;

pub use bitmap::BitOperation;
pub use string::{SetCondition, SetOptions};
