//! In-memory stand-in for the financial API, with optional fault injection.
use axum::{
    debug_handler,
    extract::{Path, Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use metrics::counter;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Misbehaviour the service can be told to exhibit.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Added to every request before it is handled.
    pub latency: Duration,
    /// Added to the balance returned by `GET /account/:id`.
    pub balance_skew: f64,
    /// Serve an empty transaction history.
    pub drop_history: bool,
    /// Status reported by a successful payment instead of `SUCCESS`.
    pub payment_status: Option<String>,
    /// Requests beyond this rate are answered with 503.
    pub max_tps: Option<NonZeroU32>,
}

impl Faults {
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn balance_skew(mut self, skew: f64) -> Self {
        self.balance_skew = skew;
        self
    }

    pub fn drop_history(mut self) -> Self {
        self.drop_history = true;
        self
    }

    pub fn payment_status(mut self, status: &str) -> Self {
        self.payment_status = Some(status.to_string());
        self
    }

    pub fn max_tps(mut self, tps: NonZeroU32) -> Self {
        self.max_tps = Some(tps);
        self
    }
}

struct Account {
    password: String,
    balance: f64,
}

struct Transaction {
    id: String,
    from: String,
    to: String,
    amount: f64,
    status: String,
}

impl Transaction {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "fromAccountId": self.from,
            "toAccountId": self.to,
            "amount": self.amount,
            "status": self.status,
        })
    }
}

#[derive(Default)]
struct Ledger {
    next_id: u64,
    usernames: HashMap<String, String>,
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, String>,
    transactions: Vec<Transaction>,
}

impl Ledger {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Account id owning the bearer token of `headers`.
    fn owner(&self, headers: &HeaderMap) -> Result<String, StatusCode> {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .and_then(|token| self.tokens.get(token.trim()))
            .cloned()
            .ok_or(StatusCode::UNAUTHORIZED)
    }

    /// The caller's own account, by path id.
    fn own_account(&mut self, headers: &HeaderMap, id: &str) -> Result<&mut Account, StatusCode> {
        let owner = self.owner(headers)?;
        let account = self.accounts.get_mut(id).ok_or(StatusCode::NOT_FOUND)?;
        if owner != id {
            return Err(StatusCode::FORBIDDEN);
        }
        Ok(account)
    }
}

struct Bank {
    ledger: Mutex<Ledger>,
    faults: Faults,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl Bank {
    fn new(faults: Faults) -> Self {
        Self {
            ledger: Mutex::new(Ledger::default()),
            limiter: faults.max_tps.map(|tps| RateLimiter::direct(Quota::per_second(tps))),
            faults,
        }
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type Shared = Arc<Bank>;

pub fn app(faults: Faults) -> Router {
    let bank: Shared = Arc::new(Bank::new(faults));

    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/account/:id", get(balance))
        .route("/account/:id/fund", post(fund))
        .route("/transaction/payment", post(payment))
        .route("/transaction/:id", get(history))
        .layer(middleware::from_fn_with_state(bank.clone(), admit))
        .layer(TraceLayer::new_for_http())
        .with_state(bank)
}

pub async fn serve(listener: TcpListener, faults: Faults) -> std::io::Result<()> {
    axum::serve(listener, app(faults)).await
}

pub async fn run(addr: SocketAddr, faults: Faults) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, faults).await
}

/// Serve on an ephemeral loopback port in the background.
pub async fn spawn(faults: Faults) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(err) = serve(listener, faults).await {
            tracing::error!("Mock service stopped: {err}");
        }
    });
    Ok(addr)
}

async fn admit(State(bank): State<Shared>, request: Request, next: Next) -> Response {
    counter!("mock-service.requests").increment(1);

    if let Some(limiter) = &bank.limiter {
        if limiter.check().is_err() {
            debug!("Throttled {} {}", request.method(), request.uri());
            counter!("mock-service.throttled").increment(1);
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }

    if !bank.faults.latency.is_zero() {
        tokio::time::sleep(bank.faults.latency).await;
    }

    next.run(request).await
}

#[derive(Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

/// Accepts both `100.00` and `"100.00"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Amount {
    Number(f64),
    Text(String),
}

impl Amount {
    fn positive(&self) -> Option<f64> {
        let value = match self {
            Amount::Number(n) => Some(*n),
            Amount::Text(t) => t.trim().parse().ok(),
        };
        value.filter(|v: &f64| v.is_finite() && *v > 0.)
    }
}

#[derive(Deserialize)]
struct FundRequest {
    amount: Amount,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRequest {
    from_account_id: String,
    to_account_id: String,
    amount: Amount,
}

type Reply = Result<(StatusCode, Json<Value>), StatusCode>;

#[debug_handler]
async fn register(State(bank): State<Shared>, Json(creds): Json<Credentials>) -> Reply {
    let mut ledger = bank.ledger();
    if ledger.usernames.contains_key(&creds.username) {
        return Err(StatusCode::CONFLICT);
    }

    let id = ledger.next_id().to_string();
    ledger.usernames.insert(creds.username.clone(), id.clone());
    ledger.accounts.insert(
        id.clone(),
        Account {
            password: creds.password,
            balance: 0.,
        },
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": id, "username": creds.username })),
    ))
}

#[debug_handler]
async fn login(State(bank): State<Shared>, Json(creds): Json<Credentials>) -> Reply {
    let mut ledger = bank.ledger();
    let id = ledger
        .usernames
        .get(&creds.username)
        .cloned()
        .ok_or(StatusCode::UNAUTHORIZED)?;
    match ledger.accounts.get(&id) {
        Some(account) if account.password == creds.password => {}
        _ => return Err(StatusCode::UNAUTHORIZED),
    }

    let token = format!("token-{id}-{}", ledger.next_id());
    ledger.tokens.insert(token.clone(), id.clone());

    Ok((StatusCode::OK, Json(json!({ "token": token, "userId": id }))))
}

#[debug_handler]
async fn balance(State(bank): State<Shared>, Path(id): Path<String>, headers: HeaderMap) -> Reply {
    let mut ledger = bank.ledger();
    let account = ledger.own_account(&headers, &id)?;
    let balance = account.balance + bank.faults.balance_skew;

    Ok((StatusCode::OK, Json(json!({ "id": id, "balance": balance }))))
}

#[debug_handler]
async fn fund(
    State(bank): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<FundRequest>,
) -> Reply {
    let amount = request.amount.positive().ok_or(StatusCode::BAD_REQUEST)?;

    let mut ledger = bank.ledger();
    let account = ledger.own_account(&headers, &id)?;
    account.balance += amount;
    let balance = account.balance;

    Ok((StatusCode::OK, Json(json!({ "id": id, "balance": balance }))))
}

#[debug_handler]
async fn payment(
    State(bank): State<Shared>,
    headers: HeaderMap,
    Json(request): Json<PaymentRequest>,
) -> Reply {
    let amount = request.amount.positive().ok_or(StatusCode::BAD_REQUEST)?;

    let mut ledger = bank.ledger();
    let from = request.from_account_id;
    let to = request.to_account_id;
    if !ledger.accounts.contains_key(&to) {
        return Err(StatusCode::NOT_FOUND);
    }

    let payer = ledger.own_account(&headers, &from)?;
    if payer.balance < amount {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    payer.balance -= amount;
    if let Some(payee) = ledger.accounts.get_mut(&to) {
        payee.balance += amount;
    }

    let id = format!("tx-{}", ledger.next_id());
    let status = bank
        .faults
        .payment_status
        .clone()
        .unwrap_or_else(|| "SUCCESS".to_string());
    ledger.transactions.push(Transaction {
        id: id.clone(),
        from,
        to,
        amount,
        status: status.clone(),
    });

    Ok((
        StatusCode::OK,
        Json(json!({ "transactionId": id, "status": status })),
    ))
}

#[debug_handler]
async fn history(State(bank): State<Shared>, Path(id): Path<String>, headers: HeaderMap) -> Reply {
    let mut ledger = bank.ledger();
    ledger.own_account(&headers, &id)?;

    let transactions: Vec<Value> = if bank.faults.drop_history {
        vec![]
    } else {
        ledger
            .transactions
            .iter()
            .filter(|tx| tx.from == id || tx.to == id)
            .map(Transaction::to_json)
            .collect()
    };

    Ok((StatusCode::OK, Json(Value::Array(transactions))))
}
