use crate::AppState;
use crate::error::AppError;
use crate::health_probe::ProbeReport;
use axum::{
    Json,
    extract::{Query, State},
};
use homelinks_store::models::HealthMethod;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct ProxyParams {
    pub url: Option<String>,
    pub method: Option<String>,
}

fn parse_method(raw: Option<&str>) -> Result<HealthMethod, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(HealthMethod::Head),
        Some(m) if m.eq_ignore_ascii_case("HEAD") => Ok(HealthMethod::Head),
        Some(m) if m.eq_ignore_ascii_case("GET") => Ok(HealthMethod::Get),
        Some(other) => Err(AppError::BadRequest(format!(
            "unsupported method '{}'",
            other
        ))),
    }
}

/// Check `url` from the server side and report status and latency.
pub async fn health_proxy(
    State(state): State<AppState>,
    Query(params): Query<ProxyParams>,
) -> Result<Json<ProbeReport>, AppError> {
    let url = params
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("URL is required".into()))?;
    let method = parse_method(params.method.as_deref())?;

    let report = state.probe.check(url.trim(), method).await?;
    tracing::debug!("Probe {} -> {} in {}ms", url, report.status, report.ms);
    Ok(Json(report))
}
