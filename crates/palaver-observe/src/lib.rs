//! Observability setup for Palaver: structured logging with an optional
//! OpenTelemetry bridge for the `gen_ai.chat` spans emitted by the engine.

pub mod tracing_setup;
