//! HTTP API routes
//!
//! Each request runs with its own cancellation token. The token fires when the
//! request future is dropped (client went away) or the request deadline passes.

use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::auth::context::AuthenticationContext;
use crate::auth::user::UserUpdate;
use crate::constants::{API_HEADER, LIST_PATH, MAX_REQUEST_BODY_BYTES, USER_PATH};
use crate::error::{HostError, Result};
use crate::handlers::headers::{api_header_value, ApiHeaders};
use crate::security::with_api_security_headers;
use crate::services::HostServices;

/// Answer to an authenticated `GET /`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInformation {
    pub version: String,
    pub api_version: String,
    pub minimum_password_length: usize,
}

/// Every API route, with rejections rendered as JSON errors
pub fn routes(services: HostServices) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let info = warp::path::end()
        .and(warp::get())
        .and(with_services(services.clone()))
        .and(api_headers())
        .and_then(server_info);

    let login = warp::path::end()
        .and(warp::post())
        .and(with_services(services.clone()))
        .and(api_headers())
        .and_then(login_user);

    let list = warp::path(USER_PATH)
        .and(warp::path(LIST_PATH))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_services(services.clone()))
        .and(api_headers())
        .and_then(list_users);

    let get_by_id = warp::path(USER_PATH)
        .and(warp::path::param::<i64>())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_services(services.clone()))
        .and(api_headers())
        .and_then(get_user);

    let read = warp::path(USER_PATH)
        .and(warp::path::end())
        .and(warp::get())
        .and(with_services(services.clone()))
        .and(api_headers())
        .and_then(read_user);

    let create = warp::path(USER_PATH)
        .and(warp::path::end())
        .and(warp::put())
        .and(with_services(services.clone()))
        .and(api_headers())
        .and(json_body())
        .and_then(create_user);

    let update = warp::path(USER_PATH)
        .and(warp::path::end())
        .and(warp::post())
        .and(with_services(services))
        .and(api_headers())
        .and(json_body())
        .and_then(update_user);

    info.or(login)
        .or(list)
        .or(get_by_id)
        .or(read)
        .or(create)
        .or(update)
        .recover(handle_rejection)
}

fn with_services(services: HostServices) -> impl Filter<Extract = (HostServices,), Error = Infallible> + Clone {
    warp::any().map(move || services.clone())
}

fn json_body() -> impl Filter<Extract = (UserUpdate,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_REQUEST_BODY_BYTES).and(warp::body::json())
}

fn api_headers() -> impl Filter<Extract = (ApiHeaders,), Error = Rejection> + Clone {
    warp::header::headers_cloned().and_then(|headers: warp::http::HeaderMap| async move {
        ApiHeaders::from_headers(&headers).map_err(warp::reject::custom)
    })
}

/// Run `operation` under a fresh cancellation token bounded by `timeout`
pub async fn run_cancellable<T, F, Fut>(timeout: Duration, operation: F) -> Result<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    match tokio::time::timeout(timeout, operation(cancel.clone())).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!("Request exceeded its {:?} deadline", timeout);
            cancel.cancel();
            Err(HostError::Cancelled)
        }
    }
}

async fn authenticate(
    services: &HostServices,
    headers: &ApiHeaders,
    cancel: &CancellationToken,
) -> Result<AuthenticationContext> {
    let bearer = headers.bearer().ok_or(HostError::Unauthorized)?;
    services
        .authentication
        .create(bearer, headers.instance_id, cancel)
        .await
}

/// Authenticate, then run `operation` with the resulting context
async fn authenticated<T, F, Fut>(
    services: HostServices,
    headers: ApiHeaders,
    operation: F,
) -> std::result::Result<T, Rejection>
where
    F: FnOnce(HostServices, AuthenticationContext, CancellationToken) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let timeout = services.config.server.request_timeout;
    run_cancellable(timeout, |cancel| async move {
        let ctx = authenticate(&services, &headers, &cancel).await?;
        operation(services, ctx, cancel).await
    })
    .await
    .map_err(warp::reject::custom)
}

fn json_response<T: Serialize>(value: &T, status: StatusCode) -> Response {
    let reply = warp::reply::with_status(warp::reply::json(value), status);
    let reply = warp::reply::with_header(reply, API_HEADER, api_header_value());
    with_api_security_headers(reply).into_response()
}

async fn server_info(services: HostServices, headers: ApiHeaders) -> std::result::Result<Response, Rejection> {
    let info = authenticated(services, headers, |services, _ctx, _cancel| async move {
        Ok(ServerInformation {
            version: env!("CARGO_PKG_VERSION").to_string(),
            api_version: api_header_value(),
            minimum_password_length: services.config.general.minimum_password_length,
        })
    })
    .await?;
    Ok(json_response(&info, StatusCode::OK))
}

async fn login_user(services: HostServices, headers: ApiHeaders) -> std::result::Result<Response, Rejection> {
    let credentials = headers
        .basic()
        .cloned()
        .ok_or_else(|| warp::reject::custom(HostError::Unauthorized))?;

    let timeout = services.config.server.request_timeout;
    let token = run_cancellable(timeout, |cancel| async move {
        services.authentication.login(&credentials, &cancel).await
    })
    .await
    .map_err(warp::reject::custom)?;

    Ok(json_response(&token, StatusCode::OK))
}

async fn create_user(
    services: HostServices,
    headers: ApiHeaders,
    model: UserUpdate,
) -> std::result::Result<Response, Rejection> {
    let profile = authenticated(services, headers, |services, ctx, cancel| async move {
        services.users.create(&ctx, model, &cancel).await
    })
    .await?;
    Ok(json_response(&profile, StatusCode::CREATED))
}

async fn update_user(
    services: HostServices,
    headers: ApiHeaders,
    model: UserUpdate,
) -> std::result::Result<Response, Rejection> {
    let profile = authenticated(services, headers, |services, ctx, cancel| async move {
        services.users.update(&ctx, model, &cancel).await
    })
    .await?;
    Ok(json_response(&profile, StatusCode::OK))
}

async fn read_user(services: HostServices, headers: ApiHeaders) -> std::result::Result<Response, Rejection> {
    let profile = authenticated(services, headers, |services, ctx, cancel| async move {
        services.users.read(&ctx, &cancel).await
    })
    .await?;
    Ok(json_response(&profile, StatusCode::OK))
}

async fn list_users(services: HostServices, headers: ApiHeaders) -> std::result::Result<Response, Rejection> {
    let profiles = authenticated(services, headers, |services, ctx, cancel| async move {
        services.users.list(&ctx, &cancel).await
    })
    .await?;
    Ok(json_response(&profiles, StatusCode::OK))
}

async fn get_user(
    id: i64,
    services: HostServices,
    headers: ApiHeaders,
) -> std::result::Result<Response, Rejection> {
    let profile = authenticated(services, headers, |services, ctx, cancel| async move {
        services.users.get_by_id(&ctx, id, &cancel).await
    })
    .await?;
    Ok(json_response(&profile, StatusCode::OK))
}

#[derive(Serialize)]
struct ErrorMessage {
    message: String,
}

/// Render rejections as status codes with an optional `{ "message": ... }` body
pub async fn handle_rejection(err: Rejection) -> std::result::Result<Response, Infallible> {
    let (status, message) = if let Some(error) = err.find::<HostError>() {
        if error.is_internal() {
            log::error!("Request failed: {}", error);
        } else {
            log::debug!("Request rejected: {}", error);
        }
        (error.status_code(), error.client_message())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, None)
    } else if let Some(error) = err.find::<warp::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, Some(format!("Invalid request body: {}", error)))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, None)
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, None)
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, None)
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, None)
    } else {
        log::error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, Some("Internal server error".to_string()))
    };

    let response = match message {
        Some(message) => json_response(&ErrorMessage { message }, status),
        None => with_api_security_headers(warp::reply::with_status(warp::reply(), status)).into_response(),
    };
    Ok(response)
}
