//! In-memory native runtime for tests
//!
//! `FakeRuntime` implements `NativeRuntime` over a small object model:
//! classes with constructors and methods, objects, and reference slots of
//! every strength. It counts each runtime call and records released slots
//! so tests can assert on exact reference traffic.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod fake;

pub use fake::{ClassBuilder, FakeRuntime, FakeStats, FindClassHook, ReleaseHook, OBJECT_CLASS};
