#![forbid(unsafe_code)]
//! Hang-detecting supervisor for the `cursor-agent` CLI.
//!
//! cursor-wrap spawns the agent in stream-json mode, mirrors its event
//! stream, watches event flow for confirmed hangs (killing the agent when
//! one is found), resumes the conversation across interactive turns, and
//! keeps an append-synchronous forensic log sufficient to post-mortem any
//! decision.

pub mod cli;
pub mod config;
pub mod format;
pub mod logger;
pub mod monitor;
pub mod session;
pub mod turn;
