//! Betfair Exchange integration.
//!
//! JSON REST client for the Betfair Exchange API, restricted to what the
//! staking loop needs: horse-racing WIN market definitions, best-offer
//! books, LIMIT order placement and cancellation, open orders and funds.
//!
//! Betting API base: https://api.betfair.com/exchange/betting/rest/v1.0/
//! Account API base: https://api.betfair.com/exchange/account/rest/v1.0/
//! Auth: https://identitysso.betfair.com/api/login
//!
//! Auth requires: App Key + session token (obtained via username/password login).
//! Headers: `X-Application: {app_key}`, `X-Authentication: {session_token}`
//!
//! Every call passes through a shared [`Throttle`], and an expired session
//! is re-established once per call before the failure is reported.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::{
    AccountFunds, CurrentOrder, ExchangeGateway, GatewayError, GatewayResult, MarketDefinition,
    OrderReport, OrderRequest, RunnerDefinition, RunnerPrices,
};
use crate::execution::Throttle;
use crate::types::BetSide;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const AUTH_URL: &str = "https://identitysso.betfair.com/api/login";
const KEEP_ALIVE_URL: &str = "https://identitysso.betfair.com/api/keepAlive";
const BETTING_URL: &str = "https://api.betfair.com/exchange/betting/rest/v1.0";
const ACCOUNT_URL: &str = "https://api.betfair.com/exchange/account/rest/v1.0";

/// Betfair event type id for horse racing.
const HORSE_RACING_EVENT_TYPE: &str = "7";

/// Maximum markets to fetch per catalogue request.
const DEFAULT_FETCH_LIMIT: u32 = 1000;

/// Error codes that mean the session token is no longer valid.
const SESSION_ERROR_CODES: [&str; 2] = ["INVALID_SESSION_INFORMATION", "NO_SESSION"];

// ---------------------------------------------------------------------------
// Betfair API types
// ---------------------------------------------------------------------------

/// Login / keep-alive response from the SSO endpoints.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(rename = "sessionToken", alias = "token")]
    session_token: Option<String>,
    #[serde(rename = "loginStatus", alias = "status")]
    login_status: String,
    #[serde(default)]
    error: Option<String>,
}

/// Market catalogue entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketCatalogue {
    market_id: String,
    market_name: String,
    #[serde(default)]
    event: Option<EventInfo>,
    #[serde(default)]
    market_start_time: Option<String>,
    #[serde(default)]
    runners: Vec<RunnerCatalogue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    venue: Option<String>,
    #[serde(default)]
    open_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunnerCatalogue {
    selection_id: u64,
    runner_name: String,
}

/// Market book (live prices).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketBook {
    market_id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    runners: Vec<RunnerBook>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunnerBook {
    selection_id: u64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    total_matched: Option<f64>,
    #[serde(default)]
    ex: Option<ExchangePrices>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangePrices {
    #[serde(default)]
    available_to_back: Vec<PriceSize>,
    #[serde(default)]
    available_to_lay: Vec<PriceSize>,
}

#[derive(Debug, Deserialize)]
struct PriceSize {
    price: f64,
    #[allow(dead_code)]
    size: f64,
}

/// Place order request types.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaceOrdersRequest {
    market_id: String,
    instructions: Vec<PlaceInstruction>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaceInstruction {
    order_type: &'static str,
    selection_id: u64,
    side: &'static str,
    limit_order: LimitOrder,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LimitOrder {
    size: f64,
    price: f64,
    persistence_type: &'static str,
}

/// Place orders response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceExecutionReport {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    instruction_reports: Vec<PlaceInstructionReport>,
    #[serde(default)]
    error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceInstructionReport {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    bet_id: Option<String>,
    #[serde(default)]
    average_price_matched: Option<f64>,
    #[serde(default)]
    size_matched: Option<f64>,
}

/// Cancel orders response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelExecutionReport {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    instruction_reports: Vec<CancelInstructionReport>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelInstructionReport {
    #[serde(default)]
    status: Option<String>,
}

/// Current orders response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentOrderSummaryReport {
    #[serde(default)]
    current_orders: Vec<CurrentOrderSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentOrderSummary {
    bet_id: String,
    market_id: String,
    selection_id: u64,
    side: String,
    #[serde(default)]
    price_size: Option<PriceSize>,
    #[serde(default)]
    average_price_matched: Option<f64>,
    #[serde(default)]
    size_matched: Option<f64>,
    #[serde(default)]
    size_remaining: Option<f64>,
}

/// Account funds response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountFundsResponse {
    #[serde(default)]
    available_to_bet_balance: Option<f64>,
    #[serde(default)]
    exposure: Option<f64>,
}

// ---------------------------------------------------------------------------
// Filter for market catalogue requests
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct MarketFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    event_type_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    market_type_codes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    market_countries: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    market_start_time: Option<TimeRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    market_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct TimeRange {
    from: String,
    to: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogueRequest {
    filter: MarketFilter,
    max_results: u32,
    market_projection: [&'static str; 3],
    sort: &'static str,
}

impl CatalogueRequest {
    fn new(filter: MarketFilter) -> Self {
        Self {
            filter,
            max_results: DEFAULT_FETCH_LIMIT,
            market_projection: ["EVENT", "RUNNER_DESCRIPTION", "MARKET_START_TIME"],
            sort: "FIRST_TO_START",
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Betfair Exchange client.
pub struct BetfairClient {
    http: Client,
    app_key: String,
    username: String,
    password: SecretString,
    session_token: RwLock<Option<String>>,
    throttle: Mutex<Throttle>,
    server_time: std::sync::RwLock<Option<DateTime<Utc>>>,
}

impl BetfairClient {
    /// Create a client from credentials held in the named environment
    /// variables.
    pub fn from_env(
        app_key_env: &str,
        username_env: &str,
        password_env: &str,
        throttle: Throttle,
    ) -> Result<Self> {
        let app_key = std::env::var(app_key_env)
            .with_context(|| format!("{app_key_env} environment variable not set"))?;
        let username = std::env::var(username_env)
            .with_context(|| format!("{username_env} environment variable not set"))?;
        let password = std::env::var(password_env)
            .with_context(|| format!("{password_env} environment variable not set"))?;
        Self::with_credentials(app_key, username, SecretString::new(password), throttle)
    }

    /// Create a client with explicit credentials.
    pub fn with_credentials(
        app_key: String,
        username: String,
        password: SecretString,
        throttle: Throttle,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("PADDOCK/0.1.0")
            .build()
            .context("Failed to build HTTP client for Betfair")?;

        Ok(Self {
            http,
            app_key,
            username,
            password,
            session_token: RwLock::new(None),
            throttle: Mutex::new(throttle),
            server_time: std::sync::RwLock::new(None),
        })
    }

    // -- Authentication ----------------------------------------------------

    /// Authenticate with Betfair SSO and store the session token.
    async fn login(&self) -> GatewayResult<String> {
        info!("Authenticating with Betfair...");

        let resp = self
            .http
            .post(AUTH_URL)
            .header("X-Application", &self.app_key)
            .header("Accept", "application/json")
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.expose_secret().as_str()),
            ])
            .send()
            .await?;
        self.record_server_time(&resp);

        if !resp.status().is_success() {
            return Err(http_error(resp).await);
        }
        let login: LoginResponse = resp.json().await?;
        let token = session_from_login(login)?;

        *self.session_token.write().await = Some(token.clone());
        info!("Betfair authentication successful");
        Ok(token)
    }

    /// Get a valid session token, logging in if necessary.
    async fn ensure_session(&self) -> GatewayResult<String> {
        if let Some(token) = self.session_token.read().await.clone() {
            return Ok(token);
        }
        self.login().await
    }

    // -- API helpers -------------------------------------------------------

    fn record_server_time(&self, resp: &reqwest::Response) {
        let Some(date) = resp
            .headers()
            .get(reqwest::header::DATE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_server_date)
        else {
            return;
        };
        if let Ok(mut guard) = self.server_time.write() {
            *guard = Some(date);
        }
    }

    async fn post_json(
        &self,
        url: &str,
        token: &str,
        body: &serde_json::Value,
    ) -> GatewayResult<(StatusCode, String)> {
        let resp = self
            .http
            .post(url)
            .header("X-Application", &self.app_key)
            .header("X-Authentication", token)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;
        self.record_server_time(&resp);
        let status = resp.status();
        let text = resp.text().await?;
        Ok((status, text))
    }

    /// Throttled, authenticated POST; re-authenticates once on a stale
    /// session.
    async fn call<T: DeserializeOwned>(
        &self,
        base: &str,
        operation: &str,
        body: &serde_json::Value,
    ) -> GatewayResult<T> {
        self.throttle.lock().await.wait().await;

        let url = format!("{base}/{operation}/");
        debug!(url = %url, "Betfair API request");

        let token = self.ensure_session().await?;
        let (mut status, mut text) = self.post_json(&url, &token, body).await?;

        if is_session_error(status, &text) {
            *self.session_token.write().await = None;
            warn!(operation, "Betfair session expired, re-authenticating...");
            let token = self.login().await?;
            (status, text) = self.post_json(&url, &token, body).await?;
        }

        if !status.is_success() {
            return Err(match api_error_code(&text) {
                Some(code) => GatewayError::Api {
                    operation: operation.to_string(),
                    code,
                },
                None => GatewayError::Http {
                    status: status.as_u16(),
                    body: text,
                },
            });
        }
        serde_json::from_str(&text)
            .map_err(|e| GatewayError::Decode(format!("{operation}: {e}")))
    }

    async fn betting_api<T: DeserializeOwned>(
        &self,
        operation: &str,
        body: serde_json::Value,
    ) -> GatewayResult<T> {
        self.call(BETTING_URL, operation, &body).await
    }

    async fn account_api<T: DeserializeOwned>(
        &self,
        operation: &str,
        body: serde_json::Value,
    ) -> GatewayResult<T> {
        self.call(ACCOUNT_URL, operation, &body).await
    }

    async fn list_catalogues(&self, filter: MarketFilter) -> GatewayResult<Vec<MarketCatalogue>> {
        let body = serde_json::to_value(CatalogueRequest::new(filter))
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        self.betting_api("listMarketCatalogue", body).await
    }
}

#[async_trait]
impl ExchangeGateway for BetfairClient {
    async fn get_market(&self, market_id: &str) -> GatewayResult<MarketDefinition> {
        let catalogues = self
            .list_catalogues(MarketFilter {
                market_ids: Some(vec![market_id.to_string()]),
                ..MarketFilter::default()
            })
            .await?;
        let catalogue = catalogues.into_iter().next().ok_or_else(|| GatewayError::Api {
            operation: "listMarketCatalogue".into(),
            code: format!("MARKET_NOT_FOUND {market_id}"),
        })?;
        to_definition(catalogue)
    }

    async fn get_market_prices(&self, market_id: &str) -> GatewayResult<Vec<RunnerPrices>> {
        let body = serde_json::json!({
            "marketIds": [market_id],
            "priceProjection": {
                "priceData": ["EX_BEST_OFFERS"],
                "virtualise": false
            }
        });
        let books: Vec<MarketBook> = self.betting_api("listMarketBook", body).await?;
        let book = books.into_iter().next().ok_or_else(|| GatewayError::Api {
            operation: "listMarketBook".into(),
            code: format!("MARKET_NOT_FOUND {market_id}"),
        })?;
        debug!(
            market_id = %book.market_id,
            status = book.status.as_deref().unwrap_or("UNKNOWN"),
            runners = book.runners.len(),
            "Market book fetched"
        );
        Ok(book.runners.iter().map(runner_prices).collect())
    }

    async fn place_orders(
        &self,
        market_id: &str,
        orders: Vec<OrderRequest>,
    ) -> GatewayResult<Vec<OrderReport>> {
        let request = place_request(market_id, &orders);
        let body =
            serde_json::to_value(&request).map_err(|e| GatewayError::Decode(e.to_string()))?;
        let report: PlaceExecutionReport = self.betting_api("placeOrders", body).await?;

        if report.instruction_reports.is_empty() {
            return Err(GatewayError::Api {
                operation: "placeOrders".into(),
                code: report.error_code.unwrap_or_else(|| "NO_INSTRUCTION_REPORTS".into()),
            });
        }
        if report.status.as_deref() != Some("SUCCESS") {
            warn!(
                market_id,
                status = report.status.as_deref().unwrap_or("UNKNOWN"),
                error_code = report.error_code.as_deref().unwrap_or(""),
                "Betfair placeOrders not fully successful"
            );
        }

        Ok(orders
            .iter()
            .zip(report.instruction_reports)
            .map(|(order, r)| OrderReport {
                selection_id: order.selection_id,
                bet_id: r.bet_id,
                average_price_matched: r.average_price_matched,
                size_matched: r.size_matched.unwrap_or(0.0),
                error_code: r.error_code,
            })
            .collect())
    }

    async fn list_current_orders(
        &self,
        market_id: Option<String>,
    ) -> GatewayResult<Vec<CurrentOrder>> {
        let mut body = serde_json::json!({ "orderProjection": "EXECUTABLE" });
        if let Some(id) = market_id {
            body["marketIds"] = serde_json::json!([id]);
        }
        let report: CurrentOrderSummaryReport =
            self.betting_api("listCurrentOrders", body).await?;
        Ok(report.current_orders.into_iter().map(current_order).collect())
    }

    async fn cancel_orders(&self, market_id: &str, bet_ids: Vec<String>) -> GatewayResult<usize> {
        let mut body = serde_json::json!({ "marketId": market_id });
        if !bet_ids.is_empty() {
            let instructions: Vec<serde_json::Value> = bet_ids
                .iter()
                .map(|id| serde_json::json!({ "betId": id }))
                .collect();
            body["instructions"] = serde_json::Value::Array(instructions);
        }
        let report: CancelExecutionReport = self.betting_api("cancelOrders", body).await?;
        if report.status.as_deref() == Some("FAILURE") {
            return Err(GatewayError::Api {
                operation: "cancelOrders".into(),
                code: report.error_code.unwrap_or_else(|| "UNKNOWN".into()),
            });
        }
        Ok(cancelled_count(&report))
    }

    async fn account_funds(&self) -> GatewayResult<AccountFunds> {
        let funds: AccountFundsResponse =
            self.account_api("getAccountFunds", serde_json::json!({})).await?;
        Ok(AccountFunds {
            available_to_bet: funds.available_to_bet_balance.unwrap_or(0.0),
            exposure: funds.exposure.unwrap_or(0.0),
        })
    }

    async fn keep_alive(&self) -> GatewayResult<()> {
        let token = self.ensure_session().await?;
        let resp = self
            .http
            .post(KEEP_ALIVE_URL)
            .header("X-Application", &self.app_key)
            .header("X-Authentication", &token)
            .header("Accept", "application/json")
            .send()
            .await?;
        self.record_server_time(&resp);
        if !resp.status().is_success() {
            return Err(http_error(resp).await);
        }
        let reply: LoginResponse = resp.json().await?;
        if let Err(e) = session_from_login(reply) {
            *self.session_token.write().await = None;
            return Err(e);
        }
        debug!("Betfair session kept alive");
        Ok(())
    }

    fn server_time(&self) -> Option<DateTime<Utc>> {
        self.server_time.read().ok().and_then(|guard| *guard)
    }

    async fn future_races(
        &self,
        hours: i64,
        countries: Vec<String>,
    ) -> GatewayResult<Vec<MarketDefinition>> {
        let now = self.server_time().unwrap_or_else(Utc::now);
        let catalogues = self
            .list_catalogues(future_races_filter(now, hours, countries))
            .await?;

        let mut races = Vec::with_capacity(catalogues.len());
        for catalogue in catalogues {
            let market_id = catalogue.market_id.clone();
            match to_definition(catalogue) {
                Ok(def) if def.to_race().is_some() => races.push(def),
                Ok(_) => debug!(market_id = %market_id, "Market has non-horse selections, skipped"),
                Err(e) => warn!(market_id = %market_id, error = %e, "Unreadable market skipped"),
            }
        }
        info!(markets = races.len(), hours, "Upcoming races fetched");
        Ok(races)
    }
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

async fn http_error(resp: reqwest::Response) -> GatewayError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    GatewayError::Http { status, body }
}

fn session_from_login(login: LoginResponse) -> GatewayResult<String> {
    if login.login_status != "SUCCESS" {
        let reason = login
            .error
            .filter(|e| !e.is_empty())
            .unwrap_or(login.login_status);
        return Err(GatewayError::NoSession(reason));
    }
    login
        .session_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GatewayError::NoSession("no session token returned".into()))
}

/// Parse an HTTP `Date` header, e.g. "Tue, 02 Jun 2015 14:05:09 GMT".
fn parse_server_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// The `errorCode` from an APING fault body, if there is one.
fn api_error_code(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/detail/APINGException/errorCode")
        .or_else(|| value.pointer("/detail/AccountAPINGException/errorCode"))
        .or_else(|| value.get("errorCode"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
}

fn is_session_error(status: StatusCode, body: &str) -> bool {
    status == StatusCode::UNAUTHORIZED
        || api_error_code(body).is_some_and(|code| SESSION_ERROR_CODES.contains(&code.as_str()))
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn to_definition(catalogue: MarketCatalogue) -> GatewayResult<MarketDefinition> {
    let event = catalogue.event.as_ref();
    let scheduled_off = catalogue
        .market_start_time
        .as_deref()
        .and_then(parse_time)
        .or_else(|| event.and_then(|e| e.open_date.as_deref()).and_then(parse_time))
        .ok_or_else(|| {
            GatewayError::Decode(format!("market {} has no start time", catalogue.market_id))
        })?;
    let course = event
        .and_then(|e| e.venue.clone().or_else(|| e.name.clone()))
        .unwrap_or_default();
    let country = event.and_then(|e| e.country_code.clone()).unwrap_or_default();

    Ok(MarketDefinition {
        market_id: catalogue.market_id,
        market_name: catalogue.market_name,
        course,
        country,
        scheduled_off,
        runners: catalogue
            .runners
            .into_iter()
            .map(|r| RunnerDefinition {
                selection_id: r.selection_id,
                name: r.runner_name,
            })
            .collect(),
    })
}

fn runner_prices(runner: &RunnerBook) -> RunnerPrices {
    let ex = runner.ex.as_ref();
    RunnerPrices {
        selection_id: runner.selection_id,
        best_back: ex.and_then(|e| e.available_to_back.first()).map(|p| p.price),
        best_lay: ex.and_then(|e| e.available_to_lay.first()).map(|p| p.price),
        total_matched: runner.total_matched.unwrap_or(0.0),
        active: runner.status.as_deref().map_or(true, |s| s == "ACTIVE"),
    }
}

fn place_request(market_id: &str, orders: &[OrderRequest]) -> PlaceOrdersRequest {
    PlaceOrdersRequest {
        market_id: market_id.to_string(),
        instructions: orders
            .iter()
            .map(|o| PlaceInstruction {
                order_type: "LIMIT",
                selection_id: o.selection_id,
                side: o.side.as_exchange_str(),
                limit_order: LimitOrder {
                    size: o.size.abs(),
                    price: o.price,
                    persistence_type: "LAPSE",
                },
            })
            .collect(),
    }
}

fn current_order(o: CurrentOrderSummary) -> CurrentOrder {
    CurrentOrder {
        side: if o.side == "LAY" {
            BetSide::Lay
        } else {
            BetSide::Back
        },
        price: o.price_size.as_ref().map_or(0.0, |ps| ps.price),
        size_matched: o.size_matched.unwrap_or(0.0),
        size_remaining: o.size_remaining.unwrap_or(0.0),
        average_price_matched: o.average_price_matched,
        bet_id: o.bet_id,
        market_id: o.market_id,
        selection_id: o.selection_id,
    }
}

fn cancelled_count(report: &CancelExecutionReport) -> usize {
    report
        .instruction_reports
        .iter()
        .filter(|r| r.status.as_deref() == Some("SUCCESS"))
        .count()
}

fn future_races_filter(now: DateTime<Utc>, hours: i64, countries: Vec<String>) -> MarketFilter {
    let fmt = "%Y-%m-%dT%H:%M:%SZ";
    MarketFilter {
        event_type_ids: Some(vec![HORSE_RACING_EVENT_TYPE.to_string()]),
        market_type_codes: Some(vec!["WIN".to_string()]),
        market_countries: (!countries.is_empty()).then_some(countries),
        market_start_time: Some(TimeRange {
            from: now.format(fmt).to_string(),
            to: (now + Duration::hours(hours)).format(fmt).to_string(),
        }),
        market_ids: None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
