//! Session state management.

pub mod machine;

pub use machine::{SessionInput, SessionMachine, SessionState, Transition};
