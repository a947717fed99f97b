//! Concrete model backends.
//!
//! Everything here implements the `palaver-core` backend traits; the engine
//! never names these types directly.

pub mod openai;

pub use openai::OpenAiBackend;
