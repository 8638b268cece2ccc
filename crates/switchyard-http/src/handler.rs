//! Stock request handlers

use crate::event::{HttpEvent, Routed};
use crate::failure::HttpFailure;
use crate::response::{apply_keep_alive, HttpResponse};
use bytes::{Bytes, BytesMut};
use http::StatusCode;
use std::sync::Arc;
use switchyard_dispatch::{BoxError, Configurator, Stage, StageContext};

/// Configurator for HTTP segments
pub type HttpConfigurator = Configurator<HttpEvent, HttpResponse>;

/// Buffers a routed request's body and answers once the request ends.
///
/// One instance serves every request of a connection on its route.
pub struct RequestHandler<F> {
    f: Arc<F>,
    pending: Option<Routed>,
    body: BytesMut,
}

impl<F> RequestHandler<F> {
    pub fn new(f: Arc<F>) -> Self {
        Self {
            f,
            pending: None,
            body: BytesMut::new(),
        }
    }
}

impl<F> Stage<HttpEvent, HttpResponse> for RequestHandler<F>
where
    F: Fn(&Routed, Bytes) -> Result<HttpResponse, BoxError> + Send + Sync,
{
    fn handle(
        &mut self,
        ctx: &mut StageContext<'_, HttpEvent, HttpResponse>,
        event: HttpEvent,
    ) -> Result<(), BoxError> {
        match event {
            HttpEvent::Routed(routed) => {
                self.body.clear();
                self.pending = Some(routed);
                Ok(())
            }
            HttpEvent::Head(request) => Err(Box::new(HttpFailure::Internal(format!(
                "{} {} reached a handler without being routed",
                request.method, request.uri
            )))),
            HttpEvent::Content(chunk) => {
                if self.pending.is_some() {
                    self.body.extend_from_slice(&chunk);
                }
                Ok(())
            }
            HttpEvent::End(chunk) => {
                let Some(routed) = self.pending.take() else {
                    return Ok(());
                };
                self.body.extend_from_slice(&chunk);
                let body = self.body.split().freeze();

                let mut response = (self.f)(&routed, body)?;
                apply_keep_alive(Some(&routed.request), &mut response, ctx.outbox(), false);
                ctx.write(response);
                Ok(())
            }
        }
    }
}

/// Segment answering each request through `f`
pub fn handle_with<F>(f: F) -> HttpConfigurator
where
    F: Fn(&Routed, Bytes) -> Result<HttpResponse, BoxError> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Configurator::from_fn(move |segment| {
        segment.add_last("handler", RequestHandler::new(Arc::clone(&f)))?;
        Ok(())
    })
}

/// Segment answering every request with a fixed response
pub fn respond(
    status: StatusCode,
    content_type: impl Into<String>,
    body: impl Into<Bytes>,
) -> HttpConfigurator {
    let content_type = content_type.into();
    let body: Bytes = body.into();
    handle_with(move |_routed: &Routed, _body: Bytes| {
        Ok(HttpResponse::new(status).with_body(&content_type, body.clone()))
    })
}

/// Fails the request as soon as it is routed
struct Reject {
    status: StatusCode,
    message: String,
}

impl Stage<HttpEvent, HttpResponse> for Reject {
    fn handle(
        &mut self,
        _ctx: &mut StageContext<'_, HttpEvent, HttpResponse>,
        event: HttpEvent,
    ) -> Result<(), BoxError> {
        match event {
            HttpEvent::Routed(_) | HttpEvent::Head(_) => Err(Box::new(HttpFailure::Rejected {
                status: self.status,
                message: self.message.clone(),
            })),
            HttpEvent::Content(_) | HttpEvent::End(_) => Ok(()),
        }
    }
}

/// Segment failing every request with `status`
pub fn reject(status: StatusCode, message: impl Into<String>) -> HttpConfigurator {
    let message = message.into();
    Configurator::from_fn(move |segment| {
        segment.add_last(
            "reject",
            Reject {
                status,
                message: message.clone(),
            },
        )?;
        Ok(())
    })
}
