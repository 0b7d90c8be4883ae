//! Request dispatch for the three Streamable HTTP endpoints: POST (send a
//! message), GET (open the unsolicited server→client stream), DELETE
//! (terminate a session).

use crate::error::HttpServerError;
use crate::protocol::{validate_accept, validate_json_content_type, StreamableHttpContext};
use crate::session_manager::{ServerSession, SessionManager};
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use mcp_protocol::jsonrpc::JsonRpcMessage;
use mcp_protocol::version::McpVersion;
use mcp_session::{Session, SessionContext, Side};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

/// Registers request/notification handlers on a freshly created session —
/// the host application's hook into every new connection.
pub type SessionHandlerHook = Arc<dyn Fn(&Arc<Session>, &SessionContext) + Send + Sync>;

pub struct HandlerState {
    pub session_manager: Arc<SessionManager>,
    pub server_info: mcp_protocol::initialize::Implementation,
    pub server_capabilities: mcp_protocol::initialize::ServerCapabilities,
    pub session_hook: Option<SessionHandlerHook>,
}

type Body = BoxBody<Bytes, Infallible>;

fn json_body(value: &serde_json::Value) -> Body {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    Full::new(Bytes::from(bytes)).map_err(|_: Infallible| unreachable!()).boxed()
}

fn empty_body() -> Body {
    Full::new(Bytes::new()).map_err(|_: Infallible| unreachable!()).boxed()
}

fn status_response(status: StatusCode, message: impl Into<String>) -> Response<Body> {
    let body = serde_json::json!({ "error": message.into() });
    Response::builder().status(status).header("content-type", "application/json").body(json_body(&body)).unwrap()
}

impl From<HttpServerError> for Response<Body> {
    fn from(err: HttpServerError) -> Self {
        let status = match err {
            HttpServerError::UnknownSession => StatusCode::NOT_FOUND,
            HttpServerError::GetAlreadyOpen => StatusCode::BAD_REQUEST,
            HttpServerError::UnacceptableAccept => StatusCode::NOT_ACCEPTABLE,
            HttpServerError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            HttpServerError::StatelessModeForbidden(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        status_response(status, err.to_string())
    }
}

pub async fn handle(state: Arc<HandlerState>, req: Request<Incoming>) -> Result<Response<Body>, Infallible> {
    let result = match *req.method() {
        Method::POST => handle_post(&state, req).await,
        Method::GET => handle_get(&state, req).await,
        Method::DELETE => handle_delete(&state, req).await,
        _ => Ok(status_response(StatusCode::METHOD_NOT_ALLOWED, "unsupported method")),
    };
    Ok(result.unwrap_or_else(Into::into))
}

async fn handle_post(state: &Arc<HandlerState>, req: Request<Incoming>) -> Result<Response<Body>, HttpServerError> {
    validate_accept(req.headers())?;
    validate_json_content_type(req.headers())?;
    let ctx = StreamableHttpContext::from_headers(req.headers())?;

    let body = req.into_body().collect().await.map_err(|_| HttpServerError::UnsupportedMediaType)?.to_bytes();
    let message = JsonRpcMessage::from_slice(&body)?;

    let is_notification = matches!(message, JsonRpcMessage::Notification(_));
    let is_initialize = matches!(&message, JsonRpcMessage::Request(r) if r.method == "initialize");
    let protocol_version = ctx.protocol_version.unwrap_or(McpVersion::LATEST);

    let server_session = if is_initialize || state.session_manager.is_stateless() {
        create_session(state, protocol_version)
    } else {
        let session_id = ctx.session_id.as_deref().ok_or(HttpServerError::UnknownSession)?;
        state.session_manager.get(session_id).ok_or(HttpServerError::UnknownSession)?
    };
    server_session.touch();
    let is_stateless = state.session_manager.is_stateless();

    if is_notification {
        server_session.session.handle_inbound(message).await;
        if is_stateless {
            state.session_manager.remove(&server_session.id);
        }
        return Ok(Response::builder().status(StatusCode::ACCEPTED).body(empty_body()).unwrap());
    }

    let Some(request_id) = message.request_id().cloned() else {
        if is_stateless {
            state.session_manager.remove(&server_session.id);
        }
        return Ok(status_response(StatusCode::BAD_REQUEST, "message had no request id"));
    };
    let response_rx = server_session.awaiting.register(request_id);
    server_session.session.handle_inbound(message).await;
    let response_message = response_rx.await.map_err(|_| HttpServerError::UnknownSession)?;

    let response_value = match &response_message {
        JsonRpcMessage::Response(r) => serde_json::to_value(r).unwrap(),
        JsonRpcMessage::Error(e) => serde_json::to_value(e).unwrap(),
        _ => unreachable!("only Response/Error are ever claimed by a waiter"),
    };

    let mut builder = Response::builder().status(StatusCode::OK).header("content-type", "application/json");
    if is_initialize && !is_stateless {
        builder = builder
            .header(crate::protocol::SESSION_ID_HEADER, server_session.id.as_str())
            .header(crate::protocol::PROTOCOL_VERSION_HEADER, protocol_version.as_str());
    }
    // Every stateless POST creates and tears down an ephemeral session: the
    // registry entry and its outbound-forwarding task must not outlive this
    // request.
    if is_stateless {
        state.session_manager.remove(&server_session.id);
    }
    Ok(builder.body(json_body(&response_value)).unwrap())
}

async fn handle_get(state: &Arc<HandlerState>, req: Request<Incoming>) -> Result<Response<Body>, HttpServerError> {
    state.session_manager.require_stateful("unsolicited server-to-client streams")?;
    let ctx = StreamableHttpContext::from_headers(req.headers())?;
    let session_id = ctx.session_id.ok_or(HttpServerError::UnknownSession)?;
    let server_session = state.session_manager.get(&session_id).ok_or(HttpServerError::UnknownSession)?;

    let Some(rx) = server_session.open_get_stream() else {
        return Err(HttpServerError::GetAlreadyOpen);
    };

    let stream = UnboundedReceiverStream::new(rx).map(|message| {
        let mut line = b"data: ".to_vec();
        line.extend_from_slice(&serde_json::to_vec(&message).unwrap_or_default());
        line.extend_from_slice(b"\n\n");
        Ok::<_, Infallible>(Frame::data(Bytes::from(line)))
    });

    let body: Body = StreamBody::new(stream).boxed();
    Ok(Response::builder().status(StatusCode::OK).header("content-type", "text/event-stream").body(body).unwrap())
}

async fn handle_delete(state: &Arc<HandlerState>, req: Request<Incoming>) -> Result<Response<Body>, HttpServerError> {
    let ctx = StreamableHttpContext::from_headers(req.headers())?;
    let session_id = ctx.session_id.ok_or(HttpServerError::UnknownSession)?;
    match state.session_manager.remove(&session_id) {
        Some(session) => {
            session.close_get_stream();
            Ok(Response::builder().status(StatusCode::OK).body(empty_body()).unwrap())
        }
        None => Err(HttpServerError::UnknownSession),
    }
}

fn create_session(state: &Arc<HandlerState>, protocol_version: McpVersion) -> Arc<ServerSession> {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<JsonRpcMessage>();
    let mut context = SessionContext::new(Side::Server, protocol_version);
    context.server_capabilities = state.server_capabilities.clone();
    context.stateless = state.session_manager.is_stateless();
    let session = Session::new(outbound_tx, context.clone());

    if let Some(hook) = &state.session_hook {
        hook(&session, &context);
    }

    state.session_manager.create_session(session, context, outbound_rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_bytes(body: Body) -> Bytes {
        body.collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn json_body_round_trips_the_value() {
        let value = serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": {}});
        let bytes = body_bytes(json_body(&value)).await;
        let decoded: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[tokio::test]
    async fn empty_body_has_no_bytes() {
        assert_eq!(body_bytes(empty_body()).await.len(), 0);
    }

    #[tokio::test]
    async fn status_response_carries_the_message_and_status() {
        let response = status_response(StatusCode::BAD_REQUEST, "bad stuff");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = body_bytes(response.into_body()).await;
        let decoded: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded["error"], "bad stuff");
    }

    fn status_of(err: HttpServerError) -> StatusCode {
        let response: Response<Body> = err.into();
        response.status()
    }

    #[test]
    fn error_conversion_maps_to_expected_status_codes() {
        assert_eq!(status_of(HttpServerError::UnknownSession), StatusCode::NOT_FOUND);
        assert_eq!(status_of(HttpServerError::GetAlreadyOpen), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(HttpServerError::UnacceptableAccept), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(status_of(HttpServerError::UnsupportedMediaType), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(status_of(HttpServerError::StatelessModeForbidden("sampling")), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(HttpServerError::InvalidIdleConfig), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
