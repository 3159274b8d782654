//! JSON HTTP API
//!
//! Thin warp transport over the session and account services. Every route
//! passes the global rate limiter first; protected routes then authenticate
//! the bearer token, and admin routes apply the role gate. Filters are
//! ordered path, method, authentication, body, so authentication work only
//! happens for a request that names an existing route.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::auth::token::TokenManager;
use crate::auth::user::{NewAccount, ProfileUpdate, UserRole};
use crate::config::AuthConfig;
use crate::constants::{API_PREFIX, API_VERSION};
use crate::core::{
    AccountService, AdmissionGuard, ClientInfo, GlobalRateLimiter, PageRequest, RequestContext,
    SessionManager,
};
use crate::error::{Result, RustyAuthError};
use crate::metrics::AuthMetrics;
use crate::storage::SharedCredentialStore;

/// Maximum accepted JSON body size
const MAX_BODY_BYTES: u64 = 16 * 1024;

/// Shared state handed to every route
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub accounts: AccountService,
    pub guard: AdmissionGuard,
    pub metrics: AuthMetrics,
    /// Return reset tokens in the forgot-password response
    pub expose_reset_token: bool,
}

impl AppState {
    pub fn new(config: &AuthConfig, store: SharedCredentialStore) -> Result<Self> {
        let tokens = Arc::new(TokenManager::new(
            &config.jwt_secret,
            &config.jwt_issuer,
            config.access_token_ttl,
        ));
        let limiter = Arc::new(GlobalRateLimiter::new(
            config.rate_limit_per_sec,
            config.rate_limit_burst,
        ));

        Ok(Self {
            sessions: Arc::new(SessionManager::new(config, store.clone(), tokens.clone())?),
            accounts: AccountService::new(store),
            guard: AdmissionGuard::new(limiter, tokens),
            metrics: AuthMetrics::new()?,
            expose_reset_token: config.expose_reset_token,
        })
    }
}

/// Rejection carrying a service error
#[derive(Debug)]
pub struct ApiError(pub RustyAuthError);

impl warp::reject::Reject for ApiError {}

fn reject(err: RustyAuthError) -> Rejection {
    warp::reject::custom(ApiError(err))
}

#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

#[derive(Serialize)]
struct PaginatedResponse<T: Serialize> {
    success: bool,
    data: T,
    page: usize,
    limit: usize,
    total: usize,
}

fn success<T: Serialize>(status: StatusCode, message: &str, data: T) -> Response {
    let body = ApiResponse {
        success: true,
        message: message.to_string(),
        data: Some(data),
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

fn message_only(message: &str) -> Response {
    let body: ApiResponse<()> = ApiResponse {
        success: true,
        message: message.to_string(),
        data: None,
    };
    warp::reply::json(&body).into_response()
}

fn error_response(status: StatusCode, error: String) -> Response {
    let body = ErrorResponse {
        success: false,
        error,
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

// Request bodies

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email_or_username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleUpdateRequest {
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
struct ResetTokenData {
    reset_token: String,
}

// Filters

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn client_info() -> impl Filter<Extract = (ClientInfo,), Error = Rejection> + Clone {
    warp::addr::remote()
        .and(warp::header::optional::<String>("user-agent"))
        .map(|addr: Option<SocketAddr>, user_agent: Option<String>| {
            ClientInfo::new(addr.map(|a| a.ip().to_string()), user_agent)
        })
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// Global rate limit, applied once in front of every route
fn admitted(state: AppState) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    with_state(state)
        .and_then(|state: AppState| async move {
            state.guard.admit().map_err(|e| {
                state.metrics.record_rate_limited();
                reject(e)
            })
        })
        .untuple_one()
}

/// Bearer authentication
fn authenticated(state: AppState) -> impl Filter<Extract = (RequestContext,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(client_info())
        .and(with_state(state))
        .and_then(
            |authorization: Option<String>, client: ClientInfo, state: AppState| async move {
                state
                    .guard
                    .authenticate(authorization.as_deref(), client)
                    .map_err(reject)
            },
        )
}

/// Bearer authentication plus the admin role gate
fn admin(state: AppState) -> impl Filter<Extract = (RequestContext,), Error = Rejection> + Clone {
    authenticated(state.clone())
        .and(with_state(state))
        .and_then(|ctx: RequestContext, state: AppState| async move {
            if let Err(e) = ctx.require_role(UserRole::Admin) {
                state.metrics.record_forbidden();
                return Err(reject(e));
            }
            Ok::<_, Rejection>(ctx)
        })
}

fn api_base() -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::path(API_PREFIX).and(warp::path(API_VERSION))
}

// Handlers

type HandlerResult = std::result::Result<Response, Rejection>;

async fn register(state: AppState, client: ClientInfo, account: NewAccount) -> HandlerResult {
    let user = state.sessions.register(account, &client).await.map_err(reject)?;
    Ok(success(StatusCode::CREATED, "User registered successfully", user))
}

async fn login(state: AppState, client: ClientInfo, req: LoginRequest) -> HandlerResult {
    let outcome = state
        .sessions
        .login(&req.email_or_username, &req.password, &client)
        .await;
    state.metrics.record_login(outcome.is_ok());
    let pair = outcome.map_err(reject)?;
    Ok(success(StatusCode::OK, "Login successful", pair))
}

async fn refresh(state: AppState, client: ClientInfo, req: RefreshRequest) -> HandlerResult {
    let outcome = state.sessions.refresh(&req.refresh_token, &client).await;
    state.metrics.record_refresh(outcome.is_ok());
    let pair = outcome.map_err(reject)?;
    Ok(success(StatusCode::OK, "Token refreshed successfully", pair))
}

async fn logout(state: AppState, client: ClientInfo, req: RefreshRequest) -> HandlerResult {
    state
        .sessions
        .logout(&req.refresh_token, &client)
        .await
        .map_err(reject)?;
    Ok(message_only("Logged out successfully"))
}

async fn forgot_password(
    state: AppState,
    client: ClientInfo,
    req: ForgotPasswordRequest,
) -> HandlerResult {
    let token = state
        .sessions
        .forgot_password(&req.email, &client)
        .await
        .map_err(reject)?;

    // Same message whether or not the account exists
    let message = "If the email exists, a password reset link has been sent";
    match token {
        Some(reset_token) if state.expose_reset_token => Ok(success(
            StatusCode::OK,
            message,
            ResetTokenData { reset_token },
        )),
        _ => Ok(message_only(message)),
    }
}

async fn reset_password(
    state: AppState,
    client: ClientInfo,
    req: ResetPasswordRequest,
) -> HandlerResult {
    state
        .sessions
        .reset_password(&req.token, &req.new_password, &client)
        .await
        .map_err(reject)?;
    Ok(message_only("Password reset successfully"))
}

async fn get_profile(ctx: RequestContext, state: AppState) -> HandlerResult {
    let user = state.accounts.get_user(&ctx.user_id).await.map_err(reject)?;
    Ok(success(StatusCode::OK, "Profile retrieved successfully", user))
}

async fn update_profile(
    ctx: RequestContext,
    state: AppState,
    update: ProfileUpdate,
) -> HandlerResult {
    let user = state.accounts.update_profile(&ctx, update).await.map_err(reject)?;
    Ok(success(StatusCode::OK, "Profile updated successfully", user))
}

async fn delete_account(ctx: RequestContext, state: AppState) -> HandlerResult {
    state.accounts.delete_account(&ctx).await.map_err(reject)?;
    Ok(message_only("Account deleted successfully"))
}

async fn change_password(
    ctx: RequestContext,
    state: AppState,
    req: ChangePasswordRequest,
) -> HandlerResult {
    state
        .sessions
        .change_password(&ctx.user_id, &req.current_password, &req.new_password, &ctx.client)
        .await
        .map_err(reject)?;
    Ok(message_only("Password changed successfully"))
}

async fn get_user(user_id: String, _ctx: RequestContext, state: AppState) -> HandlerResult {
    let user = state.accounts.get_user(&user_id).await.map_err(reject)?;
    Ok(success(StatusCode::OK, "User retrieved successfully", user))
}

async fn list_users(
    query: ListQuery,
    ctx: RequestContext,
    state: AppState,
) -> HandlerResult {
    let page = PageRequest::new(query.page, query.limit);
    let listing = state.accounts.list_users(&ctx, page).await.map_err(reject)?;
    let body = PaginatedResponse {
        success: true,
        data: listing.users,
        page: listing.page,
        limit: listing.limit,
        total: listing.total,
    };
    Ok(warp::reply::json(&body).into_response())
}

async fn delete_user(user_id: String, ctx: RequestContext, state: AppState) -> HandlerResult {
    state.accounts.delete_user(&ctx, &user_id).await.map_err(reject)?;
    Ok(message_only("User deleted successfully"))
}

async fn update_role(
    user_id: String,
    ctx: RequestContext,
    state: AppState,
    req: RoleUpdateRequest,
) -> HandlerResult {
    let user = state
        .accounts
        .update_role(&ctx, &user_id, req.role)
        .await
        .map_err(reject)?;
    Ok(success(StatusCode::OK, "User role updated successfully", user))
}

async fn stats(ctx: RequestContext, state: AppState) -> HandlerResult {
    let stats = state.accounts.stats(&ctx).await.map_err(reject)?;
    Ok(success(StatusCode::OK, "Statistics retrieved successfully", stats))
}

// Routes

fn auth_routes(state: AppState) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let public = move || with_state(state.clone()).and(client_info());

    let register = api_base()
        .and(warp::path!("auth" / "register"))
        .and(warp::post())
        .and(public())
        .and(json_body::<NewAccount>())
        .and_then(register);
    let login = api_base()
        .and(warp::path!("auth" / "login"))
        .and(warp::post())
        .and(public())
        .and(json_body::<LoginRequest>())
        .and_then(login);
    let refresh = api_base()
        .and(warp::path!("auth" / "refresh"))
        .and(warp::post())
        .and(public())
        .and(json_body::<RefreshRequest>())
        .and_then(refresh);
    let logout = api_base()
        .and(warp::path!("auth" / "logout"))
        .and(warp::post())
        .and(public())
        .and(json_body::<RefreshRequest>())
        .and_then(logout);
    let forgot = api_base()
        .and(warp::path!("auth" / "forgot-password"))
        .and(warp::post())
        .and(public())
        .and(json_body::<ForgotPasswordRequest>())
        .and_then(forgot_password);
    let reset = api_base()
        .and(warp::path!("auth" / "reset-password"))
        .and(warp::post())
        .and(public())
        .and(json_body::<ResetPasswordRequest>())
        .and_then(reset_password);

    register
        .or(login)
        .unify()
        .or(refresh)
        .unify()
        .or(logout)
        .unify()
        .or(forgot)
        .unify()
        .or(reset)
        .unify()
}

fn user_routes(state: AppState) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let me = api_base().and(warp::path!("users" / "me"));

    let get_me = me
        .clone()
        .and(warp::get())
        .and(authenticated(state.clone()))
        .and(with_state(state.clone()))
        .and_then(get_profile);
    let put_me = me
        .clone()
        .and(warp::put())
        .and(authenticated(state.clone()))
        .and(with_state(state.clone()))
        .and(json_body::<ProfileUpdate>())
        .and_then(update_profile);
    let delete_me = me
        .and(warp::delete())
        .and(authenticated(state.clone()))
        .and(with_state(state.clone()))
        .and_then(delete_account);
    let change = api_base()
        .and(warp::path!("users" / "change-password"))
        .and(warp::post())
        .and(authenticated(state.clone()))
        .and(with_state(state.clone()))
        .and(json_body::<ChangePasswordRequest>())
        .and_then(change_password);
    let by_id = api_base()
        .and(warp::path!("users" / String))
        .and(warp::get())
        .and(authenticated(state.clone()))
        .and(with_state(state))
        .and_then(get_user);

    get_me
        .or(put_me)
        .unify()
        .or(delete_me)
        .unify()
        .or(change)
        .unify()
        .or(by_id)
        .unify()
}

fn admin_routes(state: AppState) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let list = api_base()
        .and(warp::path!("admin" / "users"))
        .and(warp::get())
        .and(warp::query::<ListQuery>())
        .and(admin(state.clone()))
        .and(with_state(state.clone()))
        .and_then(list_users);
    let delete = api_base()
        .and(warp::path!("admin" / "users" / String))
        .and(warp::delete())
        .and(admin(state.clone()))
        .and(with_state(state.clone()))
        .and_then(delete_user);
    let role = api_base()
        .and(warp::path!("admin" / "users" / String / "role"))
        .and(warp::put())
        .and(admin(state.clone()))
        .and(with_state(state.clone()))
        .and(json_body::<RoleUpdateRequest>())
        .and_then(update_role);
    let stats = api_base()
        .and(warp::path!("admin" / "stats"))
        .and(warp::get())
        .and(admin(state.clone()))
        .and(with_state(state))
        .and_then(stats);

    list.or(delete)
        .unify()
        .or(role)
        .unify()
        .or(stats)
        .unify()
}

fn health_route() -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path("health").and(warp::path::end()).and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({
            "status": "healthy",
            "service": "user-management"
        }))
        .into_response()
    })
}

fn metrics_route(state: AppState) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state))
        .and_then(|state: AppState| async move {
            let text = state.metrics.export().map_err(reject)?;
            Ok::<_, Rejection>(
                warp::reply::with_header(text, "content-type", "text/plain; version=0.0.4")
                    .into_response(),
            )
        })
}

/// Access log line and request metrics for every answered request
fn access_log(metrics: AuthMetrics) -> warp::log::Log<impl Fn(warp::log::Info<'_>) + Clone> {
    warp::log::custom(move |info: warp::log::Info<'_>| {
        let status = info.status().as_u16();
        metrics.record_request(info.method().as_str(), status, info.elapsed());
        log::info!(
            target: "rusty_auth::access",
            "[{}] {} {} {} {:?}",
            info.method(),
            info.path(),
            info.remote_addr()
                .map(|addr| addr.ip().to_string())
                .unwrap_or_else(|| "-".to_string()),
            status,
            info.elapsed()
        );
    })
}

/// All routes behind the rate limiter, with errors rendered as JSON and
/// every request written to the access log
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let metrics = state.metrics.clone();
    let api = health_route()
        .or(metrics_route(state.clone()))
        .unify()
        .or(auth_routes(state.clone()))
        .unify()
        .or(user_routes(state.clone()))
        .unify()
        .or(admin_routes(state.clone()))
        .unify();

    admitted(state)
        .and(api)
        .recover(handle_rejection)
        .unify()
        .with(access_log(metrics))
}

/// Render rejections as `{"success": false, "error": ...}`
pub async fn handle_rejection(err: Rejection) -> std::result::Result<Response, Infallible> {
    let (status, message) = if let Some(ApiError(e)) = err.find::<ApiError>() {
        let status =
            StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if e.is_internal() {
            log::error!("Request failed: {}", e);
            (status, "Internal server error".to_string())
        } else {
            (status, e.to_string())
        }
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid query string".to_string())
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Content-Length header is required".to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large".to_string())
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, "Unsupported media type".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        log::error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };

    Ok(error_response(status, message))
}
