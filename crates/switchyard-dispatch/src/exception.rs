//! Default exception stages

use crate::engine::Configurator;
use crate::envelope::ExceptionEnvelope;
use crate::stage::{BoxError, Stage, StageContext};
use tracing::{debug, error};

/// Terminal handler that logs the failure and swallows it
pub struct LoggingExceptionHandler;

impl<O> Stage<ExceptionEnvelope, O> for LoggingExceptionHandler {
    fn handle(
        &mut self,
        ctx: &mut StageContext<'_, ExceptionEnvelope, O>,
        envelope: ExceptionEnvelope,
    ) -> Result<(), BoxError> {
        error!(
            "Unhandled failure reached segment [{}] (route trace: [{}]): {}",
            ctx.segment(),
            envelope.routing_trace(),
            envelope.cause()
        );
        Ok(())
    }
}

/// Hands the failure back to the dispatcher that hosts this one.
///
/// Only meaningful inside a nested dispatcher: the envelope comes out as the
/// hosting stage's error and the parent boundary adds its own route to the
/// trace before routing it to its own exception segment.
pub struct ExceptionForwarder;

impl<O> Stage<ExceptionEnvelope, O> for ExceptionForwarder {
    fn handle(
        &mut self,
        _ctx: &mut StageContext<'_, ExceptionEnvelope, O>,
        envelope: ExceptionEnvelope,
    ) -> Result<(), BoxError> {
        debug!(
            "Forwarding failure to the parent dispatcher (route trace: [{}])",
            envelope.routing_trace()
        );
        Err(Box::new(envelope))
    }
}

/// Exception segment holding a [`LoggingExceptionHandler`]
pub fn logging_handler<O: 'static>() -> Configurator<ExceptionEnvelope, O> {
    Configurator::from_fn(|segment| {
        segment.add_last("log", LoggingExceptionHandler)?;
        Ok(())
    })
}

/// Exception segment holding an [`ExceptionForwarder`]
pub fn forwarding_handler<O: 'static>() -> Configurator<ExceptionEnvelope, O> {
    Configurator::from_fn(|segment| {
        segment.add_last("forward", ExceptionForwarder)?;
        Ok(())
    })
}
