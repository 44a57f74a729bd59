use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use tower::ServiceBuilder;

use crate::context::{IdentityContext, RouteContext};
use crate::errors::json_error;
use crate::middleware::{GatewayState, gateway_middleware};

/// Build the HTTP application. Every request, including the fallback, passes
/// through the gateway first.
pub fn build_app(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/logout", get(logout).post(logout))
        .route("/admin/routes", get(list_routes))
        .fallback(page)
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn_with_state(
            state.clone(),
            gateway_middleware,
        )))
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// Placeholder page: echoes what the gateway resolved for this request.
async fn page(
    State(state): State<GatewayState>,
    route: Option<Extension<RouteContext>>,
    identity: Option<Extension<IdentityContext>>,
    headers: HeaderMap,
) -> Response {
    let Some(Extension(route)) = route else {
        return json_error(StatusCode::NOT_FOUND, "not_found", "no page at this path");
    };

    let forwarded = headers
        .get(state.identity_header())
        .and_then(|v| serde_json::from_slice::<serde_json::Value>(v.as_bytes()).ok());

    Json(serde_json::json!({
        "route": route.name(),
        "params": route.params(),
        "subject": identity.map(|Extension(ctx)| ctx.identity().subject.to_string()),
        "identity": forwarded,
    }))
    .into_response()
}

async fn logout(State(state): State<GatewayState>) -> Response {
    let mut response = Redirect::to(state.login_path()).into_response();
    state.tracker().clear(response.headers_mut());
    response
}

async fn list_routes(State(state): State<GatewayState>) -> impl IntoResponse {
    let routes: Vec<_> = state.registry().iter().collect();
    Json(serde_json::json!({
        "count": routes.len(),
        "routes": routes,
    }))
}
