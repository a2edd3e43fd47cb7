use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};

use crate::{
    auth::require_user,
    error::AppResult,
    schemas::ReverseGeocodeQuery,
    services::geocoding::reverse_geocode,
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route("/geocode/reverse", axum::routing::get(reverse))
}

async fn reverse(
    State(state): State<AppState>,
    Query(query): Query<ReverseGeocodeQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let address = reverse_geocode(&state.http_client, &state.config, query.lat, query.lng).await?;
    Ok(Json(json!({ "data": address })))
}
