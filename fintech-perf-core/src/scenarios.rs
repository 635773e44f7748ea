//! The built-in journeys against the financial API, and the assertions each of
//! them is judged by.
use crate::constants::{bodies, endpoints, requests, test_data};
use crate::{ConsistencyCheck, JourneyStep, RuntimeConfig, ScenarioSpec};
use crate::load_profile::{self, InjectionPhase};
use serde::Serialize;
use std::fmt;

/// A pass/fail criterion evaluated once the run completes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Assertion {
    /// Failed requests across the run, as a percentage of all requests.
    GlobalErrorRate { max_percent: f64 },
    GlobalP95 { max_ms: u64 },
    /// The named request must never fail.
    RequestNoFailures { request: String },
    RequestP95 { request: String, max_ms: u64 },
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assertion::GlobalErrorRate { max_percent } => {
                write!(f, "global: failed requests <= {max_percent}%")
            }
            Assertion::GlobalP95 { max_ms } => write!(f, "global: p95 <= {max_ms}ms"),
            Assertion::RequestNoFailures { request } => write!(f, "{request}: failed requests = 0%"),
            Assertion::RequestP95 { request, max_ms } => write!(f, "{request}: p95 <= {max_ms}ms"),
        }
    }
}

/// Everything the engine needs for one simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationPlan {
    pub scenario: ScenarioSpec,
    pub injection: Vec<InjectionPhase>,
    pub assertions: Vec<Assertion>,
}

/// The selectable built-in simulations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationKind {
    Auth,
    Funding,
    Payment,
}

impl SimulationKind {
    pub const ALL: [SimulationKind; 3] = [
        SimulationKind::Auth,
        SimulationKind::Funding,
        SimulationKind::Payment,
    ];

    pub fn plan(&self, config: &RuntimeConfig) -> SimulationPlan {
        match self {
            SimulationKind::Auth => auth(config),
            SimulationKind::Funding => funding(config),
            SimulationKind::Payment => payment(config),
        }
    }
}

fn global_assertions(config: &RuntimeConfig) -> Vec<Assertion> {
    let sla = config.thresholds();
    vec![
        Assertion::GlobalErrorRate {
            max_percent: sla.max_error_rate_percent,
        },
        Assertion::GlobalP95 {
            max_ms: sla.p95_latency_ms,
        },
    ]
}

fn no_failures(request: &str) -> Assertion {
    Assertion::RequestNoFailures {
        request: request.to_string(),
    }
}

/// Register then log in. Always injected at scale 1.
pub fn auth(config: &RuntimeConfig) -> SimulationPlan {
    let body = bodies::auth("username", "password");

    let scenario = ScenarioSpec::new("Auth Flow Scenario")
        .username("username", "perf_auth")
        .literal("password", test_data::PASSWORD)
        .step(
            JourneyStep::post(requests::auth::REGISTER, endpoints::AUTH_REGISTER)
                .body(body.clone())
                .status_in(&[200, 201])
                .exists("$.id"),
        )
        .step(
            JourneyStep::post(requests::auth::LOGIN, endpoints::AUTH_LOGIN)
                .body(body)
                .status(200)
                .exists("$.token")
                .exists("$.userId"),
        )
        .request_timeout(config.request_timeout);

    SimulationPlan {
        scenario,
        injection: load_profile::user_injection(config.profile, 1, i64::from(config.duration_multiplier)),
        assertions: global_assertions(config),
    }
}

/// Register, log in, fund the account and read the balance back.
pub fn funding(config: &RuntimeConfig) -> SimulationPlan {
    let body = bodies::auth("username", "password");

    let scenario = ScenarioSpec::new("Account Funding Scenario")
        .username("username", "perf_fund")
        .literal("password", test_data::PASSWORD)
        .step(
            JourneyStep::post(requests::funding::REGISTER, endpoints::AUTH_REGISTER)
                .body(body.clone())
                .status_in(&[200, 201])
                .save("$.id", "accountId"),
        )
        .step(
            JourneyStep::post(requests::funding::LOGIN, endpoints::AUTH_LOGIN)
                .body(body)
                .status(200)
                .save("$.token", "token"),
        )
        .step(
            JourneyStep::post(requests::funding::FUND, endpoints::ACCOUNT_FUND)
                .bearer("token")
                .body(bodies::fund(test_data::FUND_AMOUNT))
                .status(200)
                .save("$.balance", "fundedBalance"),
        )
        .step(
            JourneyStep::get(requests::funding::BALANCE, endpoints::ACCOUNT_BALANCE)
                .bearer("token")
                .status(200)
                .save("$.balance", "balance"),
        )
        .consistency(ConsistencyCheck::Funding {
            funded: "fundedBalance".to_string(),
            reread: "balance".to_string(),
        })
        .request_timeout(config.request_timeout);

    let mut assertions = global_assertions(config);
    assertions.push(no_failures(requests::funding::FUND));
    assertions.push(no_failures(requests::funding::BALANCE));

    SimulationPlan {
        scenario,
        injection: config.injection(),
        assertions,
    }
}

/// Two users; the payer funds their account, pays the payee, and checks the
/// resulting balance and history.
pub fn payment(config: &RuntimeConfig) -> SimulationPlan {
    let payer_auth = bodies::auth("payerUsername", "password");
    let payee_auth = bodies::auth("payeeUsername", "password");

    let scenario = ScenarioSpec::new("Payment Flow Scenario")
        .username("payerUsername", "perf_payer")
        .username("payeeUsername", "perf_payee")
        .literal("password", test_data::PASSWORD)
        .literal("paymentAmount", test_data::PAYMENT_AMOUNT)
        .step(
            JourneyStep::post(requests::payment::PAYER_REGISTER, endpoints::AUTH_REGISTER)
                .body(payer_auth.clone())
                .status_in(&[200, 201])
                .save("$.id", "payerAccountId"),
        )
        .step(
            JourneyStep::post(requests::payment::PAYEE_REGISTER, endpoints::AUTH_REGISTER)
                .body(payee_auth)
                .status_in(&[200, 201])
                .save("$.id", "payeeAccountId"),
        )
        .step(
            JourneyStep::post(requests::payment::PAYER_LOGIN, endpoints::AUTH_LOGIN)
                .body(payer_auth)
                .status(200)
                .save("$.token", "payerToken"),
        )
        .step(
            JourneyStep::post(
                requests::payment::PAYER_FUND,
                &endpoints::for_account(endpoints::ACCOUNT_FUND, "payerAccountId"),
            )
            .bearer("payerToken")
            .body(bodies::fund(test_data::FUND_AMOUNT))
            .status(200)
            .save("$.balance", "payerBalanceAfterFund"),
        )
        .step(
            JourneyStep::post(requests::payment::TRANSFER, endpoints::TRANSACTION_PAYMENT)
                .bearer("payerToken")
                .body(bodies::payment(
                    "payerAccountId",
                    "payeeAccountId",
                    test_data::PAYMENT_AMOUNT,
                ))
                .status(200)
                .save("$.transactionId", "transactionId")
                .equals("$.status", "SUCCESS"),
        )
        .step(
            JourneyStep::get(
                requests::payment::PAYER_BALANCE,
                &endpoints::for_account(endpoints::ACCOUNT_BALANCE, "payerAccountId"),
            )
            .bearer("payerToken")
            .status(200)
            .save("$.balance", "payerBalanceAfterPayment"),
        )
        .step(
            JourneyStep::get(
                requests::payment::PAYER_TRANSACTIONS,
                &endpoints::for_account(endpoints::TRANSACTION_HISTORY, "payerAccountId"),
            )
            .bearer("payerToken")
            .status(200)
            .save_body("transactionHistory"),
        )
        .consistency(ConsistencyCheck::Payment {
            after_fund: "payerBalanceAfterFund".to_string(),
            amount: "paymentAmount".to_string(),
            after_payment: "payerBalanceAfterPayment".to_string(),
            transaction_id: "transactionId".to_string(),
            history: "transactionHistory".to_string(),
        })
        .request_timeout(config.request_timeout);

    let mut assertions = global_assertions(config);
    assertions.push(no_failures(requests::payment::TRANSFER));
    assertions.push(Assertion::RequestP95 {
        request: requests::payment::TRANSFER.to_string(),
        max_ms: config.thresholds().p95_latency_ms,
    });
    assertions.push(no_failures(requests::payment::PAYER_BALANCE));

    SimulationPlan {
        scenario,
        injection: config.injection(),
        assertions,
    }
}
