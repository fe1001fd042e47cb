//! Warden Proto - wire format for the companion-module verification protocol.
//!
//! The peer speaks a hand-rolled JSON-like text format over a raw byte
//! channel. This crate keeps that grammar bit-compatible on purpose: a
//! deliberately minimal codec (documented field scanners, tolerant of
//! whitespace and field reordering) rather than a full JSON library.
//!
//! No async, no I/O - pure parsing and construction.

#![forbid(unsafe_code)]

pub mod message;
pub mod modlist;
pub mod scan;

#[cfg(test)]
mod proptests;

pub use message::{CodecError, WireMessage};
pub use modlist::{strip_versions, ModEntry};
