//! Dispatch engine and the per-connection cycle state machine
//!
//! One [`DispatchEngine`] is shared by every connection. Each connection owns a
//! [`ConnectionDispatcher`] that drives the cycle:
//!
//! ```text
//! Idle --begin/selected--> Active(segment) --end--> Idle
//! Idle --begin/rejected--> Draining        --end--> Idle
//!                           Draining        --begin--> Idle, then as above
//! ```
//!
//! While a segment is active every event is forwarded to it unchanged. A begin
//! that arrives while a segment is active is a protocol violation: it is logged
//! and dropped. A begin that arrives while Draining means the end event of the
//! failed cycle was lost; the state is reset and the new cycle proceeds. An end
//! with no active cycle is surfaced as [`DispatchError::CycleEnd`].

use crate::chain::{ChainError, Segment, StageChain};
use crate::connection::{ConnectionId, ConnectionTracker};
use crate::envelope::{ExceptionEnvelope, Origin};
use crate::exception::{forwarding_handler, logging_handler};
use crate::outbox::Outbox;
use crate::stage::{BoxError, Stage, StageContext};
use crate::state::{ActiveDispatchState, DispatchPhase, SegmentId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Name of the reserved exception segment
pub const EXCEPTION_SEGMENT: &str = "EXCEPTION_SEGMENT";

/// Position of an event in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Begin,
    Content,
    End,
}

/// Events the dispatcher can place in a cycle
pub trait CycleEvent {
    fn kind(&self) -> CycleKind;
}

/// Populates a freshly spliced segment with stages.
///
/// Runs at most once per connection and route.
pub trait SegmentConfigurator<E, O>: Send + Sync {
    fn configure(&self, segment: &mut Segment<'_, E, O>) -> Result<(), BoxError>;
}

struct ConfigureFn<F>(F);

impl<E, O, F> SegmentConfigurator<E, O> for ConfigureFn<F>
where
    F: Fn(&mut Segment<'_, E, O>) -> Result<(), BoxError> + Send + Sync,
{
    fn configure(&self, segment: &mut Segment<'_, E, O>) -> Result<(), BoxError> {
        (self.0)(segment)
    }
}

/// Shared handle on a configurator.
///
/// Two handles are equal when they point at the same configurator, which lets
/// a configurator serve as a route target.
pub struct Configurator<E, O>(Arc<dyn SegmentConfigurator<E, O>>);

impl<E: 'static, O: 'static> Configurator<E, O> {
    pub fn new(configurator: impl SegmentConfigurator<E, O> + 'static) -> Self {
        Self(Arc::new(configurator))
    }

    /// Configurator from a closure
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&mut Segment<'_, E, O>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self(Arc::new(ConfigureFn(f)))
    }
}

impl<E, O> Configurator<E, O> {
    pub fn configure(&self, segment: &mut Segment<'_, E, O>) -> Result<(), BoxError> {
        self.0.configure(segment)
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl<E, O> Clone for Configurator<E, O> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<E, O> PartialEq for Configurator<E, O> {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl<E, O> Eq for Configurator<E, O> {}

impl<E, O> Hash for Configurator<E, O> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<E, O> fmt::Debug for Configurator<E, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configurator({:p})", self.addr())
    }
}

/// Outcome of routing a cycle-begin event
pub struct Selection<E, O> {
    /// Identity of the segment, also its name in the chain and in traces
    pub segment: String,
    pub configurator: Configurator<E, O>,
    /// The begin event to forward, possibly enriched by the selector
    pub event: E,
    pub origin: Option<Origin>,
}

/// Chooses the segment for a cycle.
///
/// A selector may write interim output, such as a `100 Continue`, before it
/// decides. A rejection comes back as an envelope carrying the request.
pub trait RouteSelector<E, O>: Send + Sync {
    fn select(&self, begin: E, outbox: &mut Outbox<O>) -> Result<Selection<E, O>, ExceptionEnvelope>;
}

/// Errors surfaced to whoever drives a dispatcher
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Closing segment [{segment}] failed with message [{reason}]")]
    CycleEnd { segment: String, reason: String },

    #[error("Segment [{segment}] could not be configured: {reason}")]
    SegmentUnavailable { segment: String, reason: String },

    #[error("Connection is closed, unable to route message")]
    ConnectionClosed,

    #[error("Failure escaped the exception segment: {0}")]
    Escalated(ExceptionEnvelope),

    #[error("Stage chain error: {0}")]
    Chain(#[from] ChainError),
}

/// Builder for [`DispatchEngine`]
pub struct EngineBuilder<E, O> {
    name: String,
    selector: Box<dyn RouteSelector<E, O>>,
    exception: Option<Configurator<ExceptionEnvelope, O>>,
    nested: bool,
    connections: ConnectionTracker,
}

impl<E, O> EngineBuilder<E, O>
where
    E: CycleEvent + Send + 'static,
    O: Send + 'static,
{
    /// Configurator for the exception segment
    pub fn exception_handler(mut self, configurator: Configurator<ExceptionEnvelope, O>) -> Self {
        self.exception = Some(configurator);
        self
    }

    /// Build an engine meant to run as a stage of another engine's segment.
    ///
    /// Unless an exception handler is set, failures are handed to the parent.
    pub fn nested(mut self) -> Self {
        self.nested = true;
        self
    }

    /// Share a connection tracker with other engines
    pub fn connections(mut self, tracker: ConnectionTracker) -> Self {
        self.connections = tracker;
        self
    }

    pub fn build(self) -> Arc<DispatchEngine<E, O>> {
        let exception = match self.exception {
            Some(configurator) => configurator,
            None if self.nested => forwarding_handler(),
            None => logging_handler(),
        };

        Arc::new(DispatchEngine {
            name: self.name,
            selector: self.selector,
            exception,
            nested: self.nested,
            connections: self.connections,
        })
    }
}

/// Shared, read-only routing engine
pub struct DispatchEngine<E, O> {
    name: String,
    selector: Box<dyn RouteSelector<E, O>>,
    exception: Configurator<ExceptionEnvelope, O>,
    nested: bool,
    connections: ConnectionTracker,
}

impl<E, O> DispatchEngine<E, O>
where
    E: CycleEvent + Send + 'static,
    O: Send + 'static,
{
    pub fn builder(
        name: impl Into<String>,
        selector: impl RouteSelector<E, O> + 'static,
    ) -> EngineBuilder<E, O> {
        EngineBuilder {
            name: name.into(),
            selector: Box::new(selector),
            exception: None,
            nested: false,
            connections: ConnectionTracker::new(),
        }
    }

    /// Per-connection dispatcher for a new connection
    pub fn connect(self: &Arc<Self>, id: ConnectionId) -> ConnectionDispatcher<E, O> {
        let dispatcher = ConnectionDispatcher::new(Arc::clone(self), Some(id));
        self.connections.register(id, &dispatcher.state);
        dispatcher
    }

    /// Dispatcher to add as a stage in a parent engine's segment
    pub fn nested_stage(self: &Arc<Self>) -> ConnectionDispatcher<E, O> {
        ConnectionDispatcher::new(Arc::clone(self), None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_nested(&self) -> bool {
        self.nested
    }

    pub fn connections(&self) -> &ConnectionTracker {
        &self.connections
    }
}

/// Per-connection half of the engine.
///
/// Owned by the worker driving the connection. Dropping it releases every
/// segment built for the connection.
pub struct ConnectionDispatcher<E, O> {
    engine: Arc<DispatchEngine<E, O>>,
    id: Option<ConnectionId>,
    chain: StageChain<E, O>,
    exception_chain: StageChain<ExceptionEnvelope, O>,
    exception_ready: bool,
    configured: HashMap<String, SegmentId>,
    unavailable: HashMap<String, String>,
    identities: Vec<String>,
    state: Arc<ActiveDispatchState>,
    origin: Option<Origin>,
}

impl<E, O> ConnectionDispatcher<E, O>
where
    E: CycleEvent + Send + 'static,
    O: Send + 'static,
{
    fn new(engine: Arc<DispatchEngine<E, O>>, id: Option<ConnectionId>) -> Self {
        Self {
            engine,
            id,
            chain: StageChain::new(),
            exception_chain: StageChain::new(),
            exception_ready: false,
            configured: HashMap::new(),
            unavailable: HashMap::new(),
            identities: Vec::new(),
            state: Arc::new(ActiveDispatchState::new()),
            origin: None,
        }
    }

    /// Feed one inbound event through the cycle state machine
    pub fn dispatch(&mut self, event: E, outbox: &mut Outbox<O>) -> Result<(), DispatchError> {
        let phase = self.state.load();
        if phase == DispatchPhase::Closed {
            return Err(DispatchError::ConnectionClosed);
        }

        match event.kind() {
            CycleKind::Begin => self.begin(phase, event, outbox),
            CycleKind::Content => self.content(phase, event, outbox),
            CycleKind::End => self.end(phase, event, outbox),
        }
    }

    /// Start a cycle.
    ///
    /// Draining is left for Idle before selecting, so a failed cycle whose end
    /// never arrived cannot wedge the connection.
    fn begin(
        &mut self,
        phase: DispatchPhase,
        event: E,
        outbox: &mut Outbox<O>,
    ) -> Result<(), DispatchError> {
        match phase {
            DispatchPhase::Active(id) => {
                warn!(
                    "[{}] Cycle begin on {} while segment [{}] is active, dropping it",
                    self.engine.name,
                    self.label(),
                    self.identity(id)
                );
                return Ok(());
            }
            DispatchPhase::Draining => {
                warn!(
                    "[{}] Cycle begin on {} before the failed cycle ended, starting over",
                    self.engine.name,
                    self.label()
                );
                self.leave(DispatchPhase::Draining)?;
            }
            DispatchPhase::Idle | DispatchPhase::Closed => {}
        }

        let selection = match self.engine.selector.select(event, outbox) {
            Ok(selection) => selection,
            Err(envelope) => {
                self.origin = envelope.origin_handle().cloned();
                self.enter(DispatchPhase::Draining)?;
                return self.raise(envelope, None, outbox);
            }
        };

        let Selection {
            segment,
            configurator,
            event,
            origin,
        } = selection;
        self.origin = origin;

        let id = match self.prepare(&segment, &configurator) {
            Ok(id) => id,
            Err(err) => {
                self.enter(DispatchPhase::Draining)?;
                let mut envelope = ExceptionEnvelope::wrap(err);
                envelope.prepend_trace(segment.as_str());
                return self.raise(envelope, Some(&segment), outbox);
            }
        };

        if !self.enter(DispatchPhase::Active(id))? {
            return Ok(());
        }
        trace!(
            "[{}] Segment [{}] active on {}",
            self.engine.name,
            segment,
            self.label()
        );

        self.forward(id, event, outbox)
    }

    fn content(
        &mut self,
        phase: DispatchPhase,
        event: E,
        outbox: &mut Outbox<O>,
    ) -> Result<(), DispatchError> {
        match phase {
            DispatchPhase::Active(id) => self.forward(id, event, outbox),
            DispatchPhase::Draining => {
                debug!(
                    "[{}] Discarding content of a failed cycle on {}",
                    self.engine.name,
                    self.label()
                );
                Ok(())
            }
            DispatchPhase::Idle => {
                info!(
                    "[{}] One message with no active segment to forward to on {}",
                    self.engine.name,
                    self.label()
                );
                Ok(())
            }
            DispatchPhase::Closed => Err(DispatchError::ConnectionClosed),
        }
    }

    fn end(
        &mut self,
        phase: DispatchPhase,
        event: E,
        outbox: &mut Outbox<O>,
    ) -> Result<(), DispatchError> {
        match phase {
            DispatchPhase::Active(id) => {
                let forwarded = self.forward(id, event, outbox);
                let finished = self.finish(id);
                forwarded.and(finished)
            }
            DispatchPhase::Draining => {
                self.leave(DispatchPhase::Draining)?;
                self.origin = None;
                debug!(
                    "[{}] Failed cycle finished on {}",
                    self.engine.name,
                    self.label()
                );
                Ok(())
            }
            DispatchPhase::Idle => Err(DispatchError::CycleEnd {
                segment: "none".to_string(),
                reason: "cycle end without an active segment".to_string(),
            }),
            DispatchPhase::Closed => Err(DispatchError::ConnectionClosed),
        }
    }

    /// Swap back to Idle once the end event went through
    fn finish(&mut self, id: SegmentId) -> Result<(), DispatchError> {
        let result = match self.state.transition(DispatchPhase::Active(id), DispatchPhase::Idle) {
            Ok(()) => Ok(()),
            Err(DispatchPhase::Closed) => Err(DispatchError::ConnectionClosed),
            Err(actual) => Err(DispatchError::CycleEnd {
                segment: self.identity(id).to_string(),
                reason: format!("expected the segment to be active, found {:?}", actual),
            }),
        };
        self.origin = None;
        result
    }

    /// Idle -> `to`. `Ok(false)` if another transition won the race.
    fn enter(&self, to: DispatchPhase) -> Result<bool, DispatchError> {
        match self.state.transition(DispatchPhase::Idle, to) {
            Ok(()) => Ok(true),
            Err(DispatchPhase::Closed) => Err(DispatchError::ConnectionClosed),
            Err(actual) => {
                warn!(
                    "[{}] Lost the cycle begin race on {} to {:?}, dropping the event",
                    self.engine.name,
                    self.label(),
                    actual
                );
                Ok(false)
            }
        }
    }

    /// `from` -> Idle
    fn leave(&self, from: DispatchPhase) -> Result<(), DispatchError> {
        match self.state.transition(from, DispatchPhase::Idle) {
            Ok(()) => Ok(()),
            Err(DispatchPhase::Closed) => Err(DispatchError::ConnectionClosed),
            Err(actual) => Err(DispatchError::CycleEnd {
                segment: "none".to_string(),
                reason: format!("expected {:?}, found {:?}", from, actual),
            }),
        }
    }

    /// Splice and configure the segment on first use.
    ///
    /// A configurator that failed is not run again on this connection: the
    /// half-built segment is removed and every later begin for the route gets
    /// [`DispatchError::SegmentUnavailable`].
    fn prepare(
        &mut self,
        identity: &str,
        configurator: &Configurator<E, O>,
    ) -> Result<SegmentId, BoxError> {
        if let Some(id) = self.configured.get(identity) {
            return Ok(*id);
        }
        if let Some(reason) = self.unavailable.get(identity) {
            return Err(DispatchError::SegmentUnavailable {
                segment: identity.to_string(),
                reason: reason.clone(),
            }
            .into());
        }

        debug!(
            "[{}] Configuring segment [{}] on {}",
            self.engine.name,
            identity,
            self.label()
        );
        let mut segment = self.chain.splice(identity);
        if let Err(err) = configurator.configure(&mut segment) {
            self.chain.remove(identity)?;
            self.unavailable.insert(identity.to_string(), err.to_string());
            return Err(err);
        }

        let id = SegmentId::from_index(self.identities.len());
        self.identities.push(identity.to_string());
        self.configured.insert(identity.to_string(), id);
        Ok(id)
    }

    fn forward(
        &mut self,
        id: SegmentId,
        event: E,
        outbox: &mut Outbox<O>,
    ) -> Result<(), DispatchError> {
        let identity = self.identity(id).to_string();
        match self.chain.run(&identity, event, outbox) {
            Ok(()) => Ok(()),
            Err(err) => {
                let mut envelope = ExceptionEnvelope::wrap(err);
                envelope.prepend_trace(identity.as_str());
                self.raise(envelope, Some(&identity), outbox)
            }
        }
    }

    /// Hand a failure to the exception segment
    fn raise(
        &mut self,
        mut envelope: ExceptionEnvelope,
        route: Option<&str>,
        outbox: &mut Outbox<O>,
    ) -> Result<(), DispatchError> {
        envelope.bind(self.origin.as_ref(), route);

        if !self.exception_ready {
            self.exception_ready = true;
            let mut segment = self.exception_chain.splice(EXCEPTION_SEGMENT);
            if let Err(err) = self.engine.exception.configure(&mut segment) {
                warn!(
                    "[{}] Exception segment could not be configured: {}",
                    self.engine.name, err
                );
                return Err(DispatchError::Escalated(envelope));
            }
        }

        self.exception_chain
            .run(EXCEPTION_SEGMENT, envelope, outbox)
            .map_err(|err| DispatchError::Escalated(ExceptionEnvelope::wrap(err)))
    }

    /// Close the connection and drop every segment built for it
    pub fn teardown(&mut self) {
        self.state.close();
        if let Some(id) = &self.id {
            self.engine.connections.deregister(id);
        }
        self.chain = StageChain::new();
        self.exception_chain = StageChain::new();
        self.exception_ready = false;
        self.configured.clear();
        self.unavailable.clear();
        self.identities.clear();
        self.origin = None;
    }

    pub fn phase(&self) -> DispatchPhase {
        self.state.load()
    }

    /// Identity of the segment currently active, if any
    pub fn active_segment(&self) -> Option<&str> {
        match self.state.load() {
            DispatchPhase::Active(id) => Some(self.identity(id)),
            _ => None,
        }
    }

    /// Number of segments configured on this connection
    pub fn segment_count(&self) -> usize {
        self.identities.len()
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.id
    }

    fn identity(&self, id: SegmentId) -> &str {
        self.identities
            .get(id.index())
            .map(String::as_str)
            .unwrap_or("<unknown>")
    }

    fn label(&self) -> String {
        match &self.id {
            Some(id) => format!("connection {}", id),
            None => "nested dispatcher".to_string(),
        }
    }
}

impl<E, O> Stage<E, O> for ConnectionDispatcher<E, O>
where
    E: CycleEvent + Send + 'static,
    O: Send + 'static,
{
    fn handle(&mut self, ctx: &mut StageContext<'_, E, O>, msg: E) -> Result<(), BoxError> {
        self.dispatch(msg, ctx.outbox()).map_err(|err| match err {
            DispatchError::Escalated(envelope) => Box::new(envelope) as BoxError,
            other => Box::new(other) as BoxError,
        })
    }
}

impl<E, O> Drop for ConnectionDispatcher<E, O> {
    fn drop(&mut self) {
        if let Some(id) = &self.id {
            self.engine.connections.deregister(id);
        }
    }
}
