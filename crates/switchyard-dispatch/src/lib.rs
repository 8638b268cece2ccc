//! Per-connection dispatch for routed request cycles
//!
//! A connection's events arrive as cycles: one begin event, any number of
//! content events, one end event. On begin, a [`RouteSelector`] picks a
//! segment; the segment is spliced into the connection's stage chain and
//! configured on first use, then receives every event until the end event.
//! Failures raised inside a segment are wrapped in an [`ExceptionEnvelope`]
//! and routed to the engine's exception segment.
//!
//! Engines nest: a [`ConnectionDispatcher`] is itself a [`Stage`], and a nested
//! engine hands its failures back to its parent, which adds its own route to
//! the envelope's trace.

pub mod chain;
pub mod connection;
pub mod engine;
pub mod envelope;
pub mod exception;
pub mod outbox;
pub mod stage;
pub mod state;

pub use chain::{ChainError, Segment, StageChain};
pub use connection::{ConnectionId, ConnectionTracker};
pub use engine::{
    Configurator, ConnectionDispatcher, CycleEvent, CycleKind, DispatchEngine, DispatchError,
    EngineBuilder, RouteSelector, SegmentConfigurator, Selection, EXCEPTION_SEGMENT,
};
pub use envelope::{ExceptionEnvelope, Origin, TRACE_SEPARATOR};
pub use exception::{forwarding_handler, logging_handler, ExceptionForwarder, LoggingExceptionHandler};
pub use outbox::Outbox;
pub use stage::{stage_fn, BoxError, Stage, StageContext, StageFn};
pub use state::{ActiveDispatchState, DispatchPhase, SegmentId};
