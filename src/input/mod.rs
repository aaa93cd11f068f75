//! Global input detection
//!
//! A single platform hook fans out system-wide pointer-down and scroll events;
//! every consumer owns its own `InputEventSource` on top of it, so stopping
//! one consumer never silences another.

pub mod hook;
pub mod source;

pub use hook::{GlobalInputHook, InputEvent, InputKind, ManualHook, RdevHook};
pub use source::{InputEventSource, InputSourceFactory, Subscription};
