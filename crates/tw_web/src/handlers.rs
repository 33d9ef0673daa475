use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use tw_core::{ArticleStatus, CrawlerConfigPatch, DownloadRecord, Error, TrendingKeyword};
use tw_guard::{ClientInfo, Verdict};
use tw_rank::query::DEFAULT_LIMIT;
use tw_rank::{trending, KeywordDelta, RankedKeyword, TimeRange, TrendingQuery};
use tw_sources::{BatchReport, IngestRequest};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope { success: true, data })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub fn client_info(headers: &HeaderMap) -> ClientInfo {
    ClientInfo {
        user_agent: header_str(headers, "user-agent").unwrap_or_default().to_string(),
        accept: header_str(headers, "accept").map(str::to_string),
        accept_language: header_str(headers, "accept-language").map(str::to_string),
        referer: header_str(headers, "referer").map(str::to_string),
        host: header_str(headers, "host").map(str::to_string),
    }
}

/// First `x-forwarded-for` entry, then `x-real-ip`, else `unknown`.
pub fn client_ip(headers: &HeaderMap) -> String {
    header_str(headers, "x-forwarded-for")
        .and_then(|raw| raw.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))
        .unwrap_or("unknown")
        .to_string()
}

/// Bodies are read as raw bytes so that a missing content type or bad JSON
/// still answers with the API error envelope.
fn parse_body<T: DeserializeOwned>(body: &[u8], what: &str) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::invalid_params(format!("malformed {}: {}", what, e)))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: BatchReport,
}

pub async fn ingest(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<Json<IngestResponse>> {
    let request: IngestRequest = parse_body(&body, "ingest request")?;
    info!("📥 Ingest request for {}", request.source.source_type);
    let report = state.ingest.ingest_request(&request).await?;
    Ok(Json(IngestResponse { success: true, report }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingParams {
    pub limit: Option<String>,
    pub category: Option<String>,
    pub time_range: Option<String>,
}

impl TrendingParams {
    pub fn into_query(self) -> ApiResult<TrendingQuery> {
        let limit = match self.limit.as_deref() {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| ApiError::invalid_params(format!("invalid limit: {}", raw)))?,
            None => DEFAULT_LIMIT,
        };
        let time_range = match self.time_range.as_deref() {
            Some(raw) => raw.parse::<TimeRange>()?,
            None => TimeRange::default(),
        };
        Ok(TrendingQuery {
            limit,
            category: self.category,
            time_range,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingSummary {
    pub total: usize,
    pub time_range: &'static str,
    pub category: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct TrendingResponse {
    pub keywords: Vec<RankedKeyword>,
    pub summary: TrendingSummary,
}

pub async fn get_trending(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrendingParams>,
) -> ApiResult<Json<Envelope<TrendingResponse>>> {
    let query = params.into_query()?;
    let now = Utc::now();
    let keywords = trending(state.storage.keywords.as_ref(), &query, now).await?;
    let summary = TrendingSummary {
        total: keywords.len(),
        time_range: query.time_range.as_str(),
        category: query.category.clone().unwrap_or_else(|| "all".to_string()),
        updated_at: now,
    };
    Ok(ok(TrendingResponse { keywords, summary }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordBump {
    pub keyword: String,
    pub category: Option<String>,
    #[serde(default = "one")]
    pub search_count: u64,
    #[serde(default)]
    pub mention_count: u64,
}

fn one() -> u64 {
    1
}

pub async fn bump_keyword(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<Envelope<TrendingKeyword>>> {
    let bump: KeywordBump = parse_body(&body, "keyword update")?;
    let delta = KeywordDelta {
        search_count: bump.search_count,
        mention_count: bump.mention_count,
    };
    let row = state
        .trending
        .record(&bump.keyword, bump.category.as_deref(), delta, Utc::now())
        .await?;
    Ok(ok(row))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub original_url: String,
    pub status: ArticleStatus,
}

pub async fn set_article_status(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let update: StatusUpdate = parse_body(&body, "status update")?;
    let article = state
        .storage
        .articles
        .set_status(&update.original_url, update.status)
        .await?;
    info!("🗂️ {} is now {}", article.original_url, article.status);
    Ok(ok(article))
}

pub async fn list_crawlers(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(ok(state.storage.configs.list_configs().await?))
}

pub async fn get_crawler(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> ApiResult<impl IntoResponse> {
    let config = state
        .storage
        .configs
        .get_config(&name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("crawler config {}", name)))?;
    Ok(ok(config))
}

pub async fn update_crawler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let patch: CrawlerConfigPatch = parse_body(&body, "crawler config")?;
    let config = state.storage.configs.set_config(&name, &patch).await?;
    info!("⚙️ Crawler {} updated (enabled: {})", name, config.is_enabled);
    Ok(ok(config))
}

pub async fn toggle_crawler(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> ApiResult<impl IntoResponse> {
    let config = state.storage.configs.toggle(&name).await?;
    info!("🔀 Crawler {} toggled to {}", name, config.is_enabled);
    Ok(ok(config))
}

fn no_cache(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
}

/// Screens the caller, charges the download to their quota and streams the
/// stored image back as an attachment.
pub async fn download_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let client = client_info(&headers);
    state.guard.screen(&client)?;

    let user_id = header_str(&headers, "x-user-id")
        .ok_or_else(ApiError::unauthenticated)?
        .to_string();
    let id = Uuid::parse_str(id.trim()).map_err(|_| ApiError::invalid_params(format!("invalid asset id: {}", id)))?;
    let ip_address = client_ip(&headers);
    info!("📥 Download request for {} by {} from {}", id, user_id, ip_address);

    let now = Utc::now();
    let remaining = match state.guard.check_quota(&user_id, &ip_address, now).await? {
        Verdict::Allowed { remaining } => remaining,
        Verdict::Rejected(rejection) => return Err(rejection.into()),
    };

    let asset = state.storage.assets.get_active_asset(id).await?.ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "WALLPAPER_NOT_FOUND",
            "wallpaper does not exist or was taken down",
        )
    })?;

    let record = DownloadRecord {
        asset_id: asset.id,
        user_id: user_id.clone(),
        ip_address: ip_address.clone(),
        user_agent: client.user_agent.clone(),
        timestamp: now,
    };
    if let Err(e) = state.guard.record(&record).await {
        warn!("⚠️ Could not record download of {}: {}", asset.id, e);
    }
    if let Err(e) = state.storage.assets.increment_download_count(asset.id).await {
        warn!("⚠️ Could not bump download count of {}: {}", asset.id, e);
    }

    let upstream = state.http.get(&asset.image_url).send().await.map_err(|e| {
        error!("❌ Fetching {} failed: {}", asset.image_url, e);
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "IMAGE_PROXY_FAILED",
            "image download failed, please retry later",
        )
    })?;
    if !upstream.status().is_success() {
        error!("❌ Upstream answered {} for {}", upstream.status(), asset.image_url);
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "IMAGE_FETCH_FAILED",
            "image is temporarily unavailable, please retry later",
        ));
    }

    // reqwest carries its own http types, so the value is copied over byte-wise
    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| HeaderValue::from_bytes(value.as_bytes()).ok())
        .unwrap_or_else(|| HeaderValue::from_static("image/jpeg"));
    let filename = asset.download_filename().replace(['"', '\r', '\n'], "");
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    let mut response = Body::from_stream(upstream.bytes_stream()).into_response();
    response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    response.headers_mut().insert(header::CONTENT_DISPOSITION, disposition);
    response
        .headers_mut()
        .insert("x-ratelimit-remaining", HeaderValue::from(remaining.saturating_sub(1)));
    no_cache(&mut response);
    info!("✅ Streaming {} as {}", asset.id, filename);
    Ok(response)
}
