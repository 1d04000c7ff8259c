// Plate packing engine.
// Online, reactive batching: capacity is discovered only by asking the oracle.
// `recorder` is pure bookkeeping; `controller` owns the admission state machine.

pub mod controller;
pub mod recorder;

pub use controller::{run_session, SessionOptions, SessionReport};
