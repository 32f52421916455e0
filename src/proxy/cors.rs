//! CORS middleware for the public listener.
//!
//! Preflight (`OPTIONS`) requests are answered here with `204 No Content`
//! and are never routed, so the backing process does not see them. Every
//! other response gets the allow-all CORS headers on the way out.

use crate::proxy::headers::apply_cors;

use actix_web::{
    Error as ActixError, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::Method,
};
use futures::future::{LocalBoxFuture, Ready, ready};

/// CORS middleware factory
#[derive(Debug, Clone, Copy, Default)]
pub struct CorsHeaders;

impl<S, B> Transform<S, ServiceRequest> for CorsHeaders
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = ActixError;
    type Transform = CorsHeadersMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CorsHeadersMiddleware { service }))
    }
}

/// CORS middleware implementation
pub struct CorsHeadersMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for CorsHeadersMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if req.method() == Method::OPTIONS {
            tracing::debug!(path = %req.path(), "Answering preflight locally");
            let mut response = HttpResponse::NoContent().finish();
            apply_cors(response.headers_mut());
            let res = req.into_response(response).map_into_right_body();
            return Box::pin(async move { Ok(res) });
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let mut res = fut.await?;
            apply_cors(res.headers_mut());
            Ok(res.map_into_left_body())
        })
    }
}
