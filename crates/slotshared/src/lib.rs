//! slotshared — the SlotShare daemon.
//!
//! The binary in `main.rs` only parses flags and sets up logging; assembly
//! of the subsystems lives in [`standalone`] so it can be exercised from
//! integration tests.

pub mod standalone;
