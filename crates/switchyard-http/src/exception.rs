//! Terminal exception handler for HTTP connections

use crate::failure::HttpFailure;
use crate::request::RequestHead;
use crate::response::{apply_keep_alive, HttpResponse};
use http::StatusCode;
use switchyard_dispatch::{BoxError, Configurator, ExceptionEnvelope, Stage, StageContext};
use tracing::{debug, error};

/// Answers a failed request with an error page.
///
/// The status comes from the [`HttpFailure`] carried by the envelope; any other
/// cause is answered with a 500. The connection stays open unless the request
/// asked to close it or the failure left the request stream unusable.
#[derive(Debug, Default)]
pub struct HttpExceptionHandler;

impl HttpExceptionHandler {
    pub fn render(envelope: &ExceptionEnvelope) -> (HttpResponse, bool) {
        let failure = envelope.downcast_cause::<HttpFailure>();
        let status = failure
            .map(HttpFailure::status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let fatal = failure.map(HttpFailure::is_connection_fatal).unwrap_or(false);

        (HttpResponse::error_page(status), fatal)
    }
}

impl Stage<ExceptionEnvelope, HttpResponse> for HttpExceptionHandler {
    fn handle(
        &mut self,
        ctx: &mut StageContext<'_, ExceptionEnvelope, HttpResponse>,
        envelope: ExceptionEnvelope,
    ) -> Result<(), BoxError> {
        let (mut response, fatal) = Self::render(&envelope);
        let request = envelope.origin::<RequestHead>();

        let target = request
            .map(|r| format!("{} {}", r.method, r.uri))
            .unwrap_or_else(|| "<no request>".to_string());

        if response.status.is_server_error() {
            error!(
                "{} failed with {} (route trace: [{}]): {}",
                target,
                response.status,
                envelope.routing_trace(),
                envelope.cause()
            );
        } else {
            debug!(
                "{} answered with {} (route trace: [{}]): {}",
                target,
                response.status,
                envelope.routing_trace(),
                envelope.cause()
            );
        }

        apply_keep_alive(request, &mut response, ctx.outbox(), fatal);
        ctx.write(response);
        Ok(())
    }
}

/// Exception segment holding an [`HttpExceptionHandler`]
pub fn http_exception_handler() -> Configurator<ExceptionEnvelope, HttpResponse> {
    Configurator::from_fn(|segment| {
        segment.add_last("error-page", HttpExceptionHandler)?;
        Ok(())
    })
}
