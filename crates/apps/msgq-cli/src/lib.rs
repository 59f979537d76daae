//! `msgqctl`: operator tool for System V message queues built on [`msgq`].

pub mod app;
pub mod codec;
pub mod commands;
pub mod output;

pub use app::{Cli, CodecArg, Command, Target};
