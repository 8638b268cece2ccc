//! Stages: the units of work that make up a segment

use crate::chain::{run_slots, Slot};
use crate::outbox::Outbox;
use std::error::Error;

/// Failure raised by a stage
pub type BoxError = Box<dyn Error + Send + Sync>;

/// A handler for messages of type `M` that may write items of type `O`.
///
/// A stage either consumes the message or passes it on with
/// [`StageContext::forward`]. Any error it returns is caught at the segment
/// boundary and routed to the exception segment.
pub trait Stage<M, O>: Send {
    fn handle(&mut self, ctx: &mut StageContext<'_, M, O>, msg: M) -> Result<(), BoxError>;
}

/// What a stage can see while handling one message
pub struct StageContext<'a, M, O> {
    pub(crate) rest: &'a mut [Slot<M, O>],
    pub(crate) segment: &'a str,
    pub(crate) outbox: &'a mut Outbox<O>,
}

impl<'a, M, O> StageContext<'a, M, O> {
    /// Pass the message to the next stage of the same segment
    pub fn forward(&mut self, msg: M) -> Result<(), BoxError> {
        run_slots(self.rest, self.segment, msg, self.outbox)
    }

    /// Name of the segment this stage belongs to
    pub fn segment(&self) -> &str {
        self.segment
    }

    pub fn outbox(&mut self) -> &mut Outbox<O> {
        self.outbox
    }

    pub fn write(&mut self, item: O) {
        self.outbox.push(item);
    }
}

/// Stage built from a closure, see [`stage_fn`]
pub struct StageFn<F> {
    f: F,
}

/// Wrap a closure as a stage.
///
/// # Examples
/// ```
/// use switchyard_dispatch::{stage_fn, StageContext};
///
/// let upper = stage_fn(|ctx: &mut StageContext<'_, String, String>, msg: String| {
///     ctx.forward(msg.to_uppercase())
/// });
/// ```
pub fn stage_fn<M, O, F>(f: F) -> StageFn<F>
where
    F: FnMut(&mut StageContext<'_, M, O>, M) -> Result<(), BoxError> + Send,
{
    StageFn { f }
}

impl<M, O, F> Stage<M, O> for StageFn<F>
where
    F: FnMut(&mut StageContext<'_, M, O>, M) -> Result<(), BoxError> + Send,
{
    fn handle(&mut self, ctx: &mut StageContext<'_, M, O>, msg: M) -> Result<(), BoxError> {
        (self.f)(ctx, msg)
    }
}
