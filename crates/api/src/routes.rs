use crate::error::ApiError;
use axum::{
    extract::{Path, Query, State},
    http::{
        header::{
            HeaderName, ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, EXPIRES, LINK, PRAGMA,
        },
        HeaderValue, Method, Request,
    },
    routing::get,
    Json, Router,
};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};

use stockify_core::domain::recommendation::RecommendedStock;
use stockify_core::domain::stock::StockEvent;
use stockify_core::recommend::recommend;
use stockify_core::storage::{SearchParams, StockStore};

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_PAGE_SIZE: i64 = 10;

const ALLOWED_ORIGINS: [&str; 4] = [
    "http://localhost:5173",
    "http://127.0.0.1:5173",
    "http://localhost:3000",
    "http://127.0.0.1:3000",
];

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StockStore>,
}

/// Routes plus the HTTP middleware stack.
pub fn app(state: AppState) -> Router {
    router(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
        .layer(cors_layer())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/stocks", get(list_stocks))
        .route("/api/stocks/", get(list_stocks))
        .route("/api/stocks/recommendations", get(get_recommendations))
        .route("/api/stocks/:ticker", get(get_stock_by_ticker))
        .with_state(state)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_default();
    tracing::error!(panic = %detail, "handler panicked");
    ApiError::Internal.into_response()
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            ALLOWED_ORIGINS.into_iter().map(HeaderValue::from_static),
        ))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            ACCEPT,
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-csrf-token"),
            HeaderName::from_static("x-requested-with"),
            CACHE_CONTROL,
            PRAGMA,
            EXPIRES,
        ])
        .expose_headers([LINK])
        .allow_credentials(true)
        .max_age(Duration::from_secs(300))
}

#[derive(Debug, Clone, Copy, Default)]
struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    page: Option<String>,
    page_size: Option<String>,
    search: Option<String>,
    sort_by: Option<String>,
    sort_order: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    stocks: Vec<StockEvent>,
    total_items: i64,
    page: i64,
    page_size: i64,
    total_pages: i64,
}

async fn list_stocks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let page = positive_or(query.page.as_deref(), DEFAULT_PAGE);
    let page_size = positive_or(query.page_size.as_deref(), DEFAULT_PAGE_SIZE);

    let params = SearchParams {
        search: query.search,
        sort_by: query.sort_by,
        sort_order: query.sort_order,
        page,
        page_size,
    };

    let (stocks, total_items) = state
        .store
        .search(&params)
        .await
        .map_err(ApiError::storage("Falló la obtención de acciones"))?;

    Ok(Json(ListResponse {
        stocks,
        total_items,
        page,
        page_size,
        total_pages: total_pages(total_items, page_size),
    }))
}

async fn get_stock_by_ticker(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<StockEvent>, ApiError> {
    let ticker = ticker.trim();
    if ticker.is_empty() {
        return Err(ApiError::BadRequest("Parámetro ticker es requerido"));
    }

    state
        .store
        .get_by_ticker(ticker)
        .await
        .map_err(ApiError::storage("Falló la obtención del stock"))?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

#[derive(Debug, Serialize)]
struct RecommendationsResponse {
    recommendations: Vec<RecommendedStock>,
}

async fn get_recommendations(
    State(state): State<AppState>,
) -> Result<Json<RecommendationsResponse>, ApiError> {
    let recommendations = recommend(state.store.as_ref(), chrono::Utc::now())
        .await
        .map_err(ApiError::storage("Falló la obtención de recomendaciones"))?;

    Ok(Json(RecommendationsResponse { recommendations }))
}

/// Missing, non-numeric and non-positive values all fall back to `default`.
fn positive_or(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
}

fn total_pages(total_items: i64, page_size: i64) -> i64 {
    if page_size <= 0 || total_items <= 0 {
        return 0;
    }
    total_items / page_size + i64::from(total_items % page_size != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{HeaderMap, StatusCode};
    use chrono::{DateTime, Duration as ChronoDuration, Months, TimeZone, Utc};
    use stockify_core::recommend::recent_cutoff;
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use stockify_core::domain::stock::NewStockEvent;
    use stockify_core::storage::memory::InMemoryStockStore;
    use tower::ServiceExt;

    fn event(ticker: &str, rating_to: &str, time: DateTime<Utc>) -> NewStockEvent {
        NewStockEvent {
            ticker: ticker.to_string(),
            company: format!("{ticker} Holdings"),
            brokerage: "Broker".to_string(),
            action: "reiterated by".to_string(),
            rating_to: rating_to.to_string(),
            rating_from: None,
            target_to: None,
            target_from: None,
            time,
        }
    }

    fn app_with(events: Vec<NewStockEvent>) -> Router {
        app(AppState {
            store: Arc::new(InMemoryStockStore::with_events(events)),
        })
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        (status, headers, body)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(app, req).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn twenty_five() -> Vec<NewStockEvent> {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        (0..25)
            .map(|i| event(&format!("T{i:02}"), "Hold", t0 + ChronoDuration::hours(i)))
            .collect()
    }

    #[tokio::test]
    async fn health_is_plain_ok() {
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(app_with(vec![]), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");
        assert!(headers.contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn lists_second_page_sorted_by_ticker_desc() {
        let (status, body) = get_json(
            app_with(twenty_five()),
            "/api/stocks?page=2&pageSize=10&sortBy=ticker&sortOrder=desc",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalItems"], json!(25));
        assert_eq!(body["totalPages"], json!(3));
        assert_eq!(body["page"], json!(2));
        assert_eq!(body["pageSize"], json!(10));
        let tickers: Vec<_> = body["stocks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["ticker"].as_str().unwrap().to_string())
            .collect();
        let expected: Vec<_> = (5..=14).rev().map(|i| format!("T{i:02}")).collect();
        assert_eq!(tickers, expected);
    }

    #[tokio::test]
    async fn bad_paging_values_fall_back_to_defaults() {
        let (status, body) = get_json(
            app_with(twenty_five()),
            "/api/stocks?page=-3&pageSize=abc",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["page"], json!(1));
        assert_eq!(body["pageSize"], json!(10));
        assert_eq!(body["stocks"].as_array().unwrap().len(), 10);
        // Default order is newest first.
        assert_eq!(body["stocks"][0]["ticker"], json!("T24"));
    }

    #[tokio::test]
    async fn search_filters_by_ticker_or_company() {
        let (_, body) = get_json(app_with(twenty_five()), "/api/stocks?search=t1").await;
        assert_eq!(body["totalItems"], json!(10));
    }

    #[tokio::test]
    async fn ticker_lookup_is_case_insensitive() {
        let app = app_with(twenty_five());
        let (status, body) = get_json(app.clone(), "/api/stocks/t07").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ticker"], json!("T07"));
        assert_eq!(body["company"], json!("T07 Holdings"));

        let (status, body) = get_json(app, "/api/stocks/NOPE").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Stock no encontrado"}));
    }

    #[tokio::test]
    async fn blank_ticker_is_a_bad_request() {
        let (status, body) = get_json(app_with(vec![]), "/api/stocks/%20").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn recommendations_rank_scenario_events() {
        let now = Utc::now();
        let good1 = NewStockEvent {
            target_to: Some(Decimal::new(100, 0)),
            action: "upgraded by".to_string(),
            brokerage: "Broker A".to_string(),
            ..event("GOOD1", "Buy", now)
        };
        let good2 = NewStockEvent {
            target_to: Some(Decimal::new(150, 0)),
            target_from: Some(Decimal::new(120, 0)),
            action: "target raised by".to_string(),
            ..event("GOOD2", "Strong Buy", recent_cutoff(now) + ChronoDuration::hours(1))
        };
        let hold = NewStockEvent {
            target_to: Some(Decimal::new(50, 0)),
            ..event("HOLD1", "Hold", now)
        };
        let old_buy = NewStockEvent {
            target_to: Some(Decimal::new(80, 0)),
            ..event("OLD_BUY", "Buy", now.checked_sub_months(Months::new(6)).unwrap())
        };

        let (status, body) = get_json(
            app_with(vec![hold, old_buy, good2, good1]),
            "/api/stocks/recommendations",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let recs = body["recommendations"].as_array().unwrap();
        let tickers: Vec<_> = recs.iter().map(|r| r["ticker"].as_str().unwrap()).collect();
        assert_eq!(tickers, ["GOOD1", "GOOD2", "OLD_BUY"]);
        assert_eq!(recs[0]["score"], json!(105.0));
        assert_eq!(recs[0]["reasons"][0]["type"], json!("POSITIVE_RATING"));
    }

    struct BrokenStore;

    #[async_trait::async_trait]
    impl StockStore for BrokenStore {
        async fn search(&self, _: &SearchParams) -> anyhow::Result<(Vec<StockEvent>, i64)> {
            anyhow::bail!("connection refused (secret-host:5432)")
        }
        async fn get_by_ticker(&self, _: &str) -> anyhow::Result<Option<StockEvent>> {
            anyhow::bail!("connection refused (secret-host:5432)")
        }
        async fn count(&self) -> anyhow::Result<i64> {
            anyhow::bail!("connection refused (secret-host:5432)")
        }
        async fn recent(&self, _: i64) -> anyhow::Result<Vec<StockEvent>> {
            anyhow::bail!("connection refused (secret-host:5432)")
        }
        async fn insert(&self, _: &NewStockEvent) -> anyhow::Result<i64> {
            anyhow::bail!("connection refused (secret-host:5432)")
        }
    }

    #[tokio::test]
    async fn storage_failures_return_curated_500s() {
        let app = app(AppState {
            store: Arc::new(BrokenStore),
        });

        for (uri, message) in [
            ("/api/stocks", "Falló la obtención de acciones"),
            ("/api/stocks/AAPL", "Falló la obtención del stock"),
            (
                "/api/stocks/recommendations",
                "Falló la obtención de recomendaciones",
            ),
        ] {
            let (status, body) = get_json(app.clone(), uri).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
            assert_eq!(body, json!({ "error": message }), "{uri}");
        }
    }

    #[tokio::test]
    async fn cors_preflight_allows_known_origins_only() {
        let preflight = |origin: &str| {
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/stocks")
                .header("origin", origin)
                .header("access-control-request-method", "GET")
                .body(Body::empty())
                .unwrap()
        };

        let (_, headers, _) = send(app_with(vec![]), preflight("http://localhost:5173")).await;
        assert_eq!(
            headers.get("access-control-allow-origin").unwrap(),
            "http://localhost:5173"
        );
        assert_eq!(
            headers.get("access-control-allow-credentials").unwrap(),
            "true"
        );
        assert_eq!(headers.get("access-control-max-age").unwrap(), "300");

        let (_, headers, _) = send(app_with(vec![]), preflight("http://evil.example")).await;
        assert!(headers.get("access-control-allow-origin").is_none());
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(25, 10), 3);
        assert_eq!(total_pages(20, 10), 2);
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(1, 1), 1);
        assert_eq!(total_pages(25, 0), 0);
        assert_eq!(total_pages(25, -1), 0);
        assert_eq!(total_pages(2, i64::MAX), 1);
        assert_eq!(total_pages(i64::MAX, i64::MAX), 1);
    }

    #[tokio::test]
    async fn huge_page_size_reports_one_page() {
        let (status, body) = get_json(
            app_with(twenty_five()),
            "/api/stocks?pageSize=9223372036854775807",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalItems"], json!(25));
        assert_eq!(body["pageSize"], json!(i64::MAX));
        assert_eq!(body["totalPages"], json!(1));
        assert_eq!(body["stocks"].as_array().unwrap().len(), 25);
    }

    #[tokio::test]
    async fn panics_render_the_error_envelope() {
        let res = panic_response(Box::new("boom"));
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({"error": "Error interno del servidor"}));
    }

    #[test]
    fn paging_values_are_lenient() {
        assert_eq!(positive_or(None, 10), 10);
        assert_eq!(positive_or(Some("0"), 10), 10);
        assert_eq!(positive_or(Some(" 7 "), 10), 7);
        assert_eq!(positive_or(Some("x"), 1), 1);
    }
}
