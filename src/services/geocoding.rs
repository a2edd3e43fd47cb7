use serde::Serialize;
use serde_json::Value;

use crate::{config::AppConfig, error::AppError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedAddress {
    pub address: String,
    pub subdistrict: String,
    pub district: String,
    pub province: String,
    pub postal_code: String,
    pub display_name: String,
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), AppError> {
    let valid = latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude);
    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest(
            "lat must be within [-90, 90] and lng within [-180, 180].".to_string(),
        ))
    }
}

/// Looks up the address at a coordinate with a Nominatim-compatible
/// reverse geocoder.
pub async fn reverse_geocode(
    http_client: &reqwest::Client,
    config: &AppConfig,
    latitude: f64,
    longitude: f64,
) -> Result<ParsedAddress, AppError> {
    validate_coordinates(latitude, longitude)?;

    let url = url::Url::parse_with_params(
        &config.geocoder_url,
        &[
            ("format", "jsonv2".to_string()),
            ("lat", latitude.to_string()),
            ("lon", longitude.to_string()),
            ("accept-language", "th".to_string()),
            ("addressdetails", "1".to_string()),
        ],
    )
    .map_err(|error| AppError::Internal(format!("GEOCODER_URL is invalid: {error}")))?;

    let response = http_client.get(url).send().await.map_err(|error| {
        tracing::error!(error = %error, "Reverse geocoding request failed");
        AppError::Dependency("Reverse geocoding request failed.".to_string())
    })?;

    let status = response.status();
    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), "Reverse geocoder returned an error");
        return Err(AppError::Dependency(format!(
            "Reverse geocoder returned HTTP {}.",
            status.as_u16()
        )));
    }

    let body = response.json::<Value>().await.map_err(|error| {
        tracing::error!(error = %error, "Reverse geocoder returned invalid JSON");
        AppError::Dependency("Reverse geocoder returned an invalid response.".to_string())
    })?;

    if let Some(message) = body.get("error").and_then(Value::as_str) {
        return Err(AppError::NotFound(format!("No address found: {message}")));
    }

    Ok(parse_reverse_geocode(&body))
}

fn first_of(address: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| address.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}

/// Maps Nominatim `address` parts onto Thai address fields. Bangkok
/// results carry no `state`, so the province falls back to `city`.
pub fn parse_reverse_geocode(body: &Value) -> ParsedAddress {
    let empty = Value::Null;
    let address = body.get("address").unwrap_or(&empty);

    let street = [first_of(address, &["house_number"]), first_of(address, &["road"])]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    ParsedAddress {
        address: street,
        subdistrict: first_of(address, &["suburb", "quarter", "village", "neighbourhood"]),
        district: first_of(address, &["city_district", "county", "district", "town"]),
        province: first_of(address, &["state", "province", "city"]),
        postal_code: first_of(address, &["postcode"]),
        display_name: body
            .get("display_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}
