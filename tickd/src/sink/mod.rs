//! Concrete sinks bundled with the collector.

mod jsonl;

pub use jsonl::JsonlSink;
