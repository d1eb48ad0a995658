//! # Repository Module
//!
//! One repository per collection of the local store.
//!
//! The sale and credit queues are terminal-owned; products and workers are
//! server snapshots replaced wholesale. `sync` holds the sync state singleton.

pub mod credit;
pub mod product;
pub mod sale;
pub mod session;
pub mod sync;
pub mod worker;
