//! Generated tonic service wiring (`proto/vessel.proto`) onto a
//! [`RouteTable`]. This is the only module that knows about the wire
//! format; everything it calls into deals in [`RouteId`] and
//! [`serde_json::Value`].

use std::pin::Pin;
use std::sync::Arc;

use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status};
use vessel_shared::Error;

use super::{RouteId, RouteTable};

pub mod proto {
    tonic::include_proto!("vessel");
}

use proto::call_result::Outcome;
use proto::vessel_server::{Vessel, VesselServer};
use proto::{CallEnvelope, CallError, CallResult};

pub struct VesselRpcService {
    routes: Arc<RouteTable>,
}

impl VesselRpcService {
    pub fn new(routes: Arc<RouteTable>) -> Self {
        Self { routes }
    }

    /// Wraps this service in the tonic-generated server type, ready to
    /// hand to a `tonic::transport::Server` (or, for a Unix socket
    /// listener, `Server::builder().add_service(...)` over a `UnixListener`
    /// stream).
    pub fn into_server(self) -> VesselServer<Self> {
        VesselServer::new(self)
    }
}

fn decode_envelope(envelope: CallEnvelope) -> Result<(RouteId, serde_json::Value), Status> {
    let route = RouteId::parse(&envelope.route).map_err(to_status)?;
    let payload: serde_json::Value =
        serde_json::from_slice(&envelope.payload).map_err(|e| Status::invalid_argument(e.to_string()))?;
    Ok((route, payload))
}

fn encode_ok(route: RouteId, value: serde_json::Value) -> CallResult {
    let payload = serde_json::to_vec(&value).unwrap_or_default();
    CallResult {
        outcome: Some(Outcome::Ok(CallEnvelope {
            route: route.to_string(),
            payload,
        })),
    }
}

fn encode_err(err: Error) -> CallResult {
    CallResult {
        outcome: Some(Outcome::Err(CallError {
            kind: error_kind(&err).to_string(),
            message: err.to_string(),
        })),
    }
}

fn error_kind(err: &Error) -> &'static str {
    match err {
        Error::InvalidArgument(_) => "invalid_argument",
        Error::NotFound(_) => "not_found",
        Error::InvalidState(_) => "invalid_state",
        Error::Conflict(_) => "conflict",
        Error::Internal(_) => "internal",
    }
}

fn to_status(err: Error) -> Status {
    match err {
        Error::InvalidArgument(msg) => Status::invalid_argument(msg),
        Error::NotFound(msg) => Status::not_found(msg),
        Error::InvalidState(msg) => Status::failed_precondition(msg),
        Error::Conflict(msg) => Status::already_exists(msg),
        Error::Internal(msg) => Status::internal(msg),
    }
}

#[tonic::async_trait]
impl Vessel for VesselRpcService {
    async fn call(&self, request: Request<CallEnvelope>) -> Result<Response<CallResult>, Status> {
        let (route, payload) = decode_envelope(request.into_inner())?;
        let result = match self.routes.dispatch(route, payload).await {
            Ok(value) => encode_ok(route, value),
            Err(err) => encode_err(err),
        };
        Ok(Response::new(result))
    }

    type CallStreamStream = Pin<Box<dyn Stream<Item = Result<CallResult, Status>> + Send + 'static>>;

    async fn call_stream(&self, request: Request<CallEnvelope>) -> Result<Response<Self::CallStreamStream>, Status> {
        let (route, payload) = decode_envelope(request.into_inner())?;
        let stream = match self.routes.dispatch_stream(route, payload).await {
            Ok(stream) => stream,
            Err(err) => {
                let once = tokio_stream::once(Ok(encode_err(err)));
                return Ok(Response::new(Box::pin(once)));
            }
        };

        let mapped = stream.map(move |item| {
            Ok(match item {
                Ok(value) => encode_ok(route, value),
                Err(err) => encode_err(err),
            })
        });
        Ok(Response::new(Box::pin(mapped)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{RouteHandler, RouteTableBuilder};
    use async_trait::async_trait;
    use vessel_shared::Result;

    struct PingHandler;

    #[async_trait]
    impl RouteHandler for PingHandler {
        async fn handle(&self, _payload: serde_json::Value) -> Result<serde_json::Value> {
            Ok(serde_json::json!({"status": "ok"}))
        }
    }

    #[tokio::test]
    async fn call_dispatches_and_encodes_ok_result() {
        let routes = Arc::new(RouteTableBuilder::new().register(RouteId::HealthPing, Arc::new(PingHandler)).build());
        let service = VesselRpcService::new(routes);
        let request = Request::new(CallEnvelope {
            route: RouteId::HealthPing.to_string(),
            payload: serde_json::to_vec(&serde_json::Value::Null).unwrap(),
        });
        let response = service.call(request).await.unwrap().into_inner();
        match response.outcome {
            Some(Outcome::Ok(envelope)) => {
                let value: serde_json::Value = serde_json::from_slice(&envelope.payload).unwrap();
                assert_eq!(value, serde_json::json!({"status": "ok"}));
            }
            other => panic!("expected Ok outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn call_on_unregistered_route_encodes_err_result() {
        let routes = Arc::new(RouteTableBuilder::new().build());
        let service = VesselRpcService::new(routes);
        let request = Request::new(CallEnvelope {
            route: RouteId::HealthPing.to_string(),
            payload: serde_json::to_vec(&serde_json::Value::Null).unwrap(),
        });
        let response = service.call(request).await.unwrap().into_inner();
        match response.outcome {
            Some(Outcome::Err(err)) => assert_eq!(err.kind, "not_found"),
            other => panic!("expected Err outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn call_with_unknown_route_string_is_rejected_before_dispatch() {
        let routes = Arc::new(RouteTableBuilder::new().build());
        let service = VesselRpcService::new(routes);
        let request = Request::new(CallEnvelope {
            route: "bogus.route".to_string(),
            payload: serde_json::to_vec(&serde_json::Value::Null).unwrap(),
        });
        let err = service.call(request).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }
}
