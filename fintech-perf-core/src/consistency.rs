//! Post-transaction consistency checks.
//!
//! These run after an iteration's request chain has completed and only look at
//! values already bound in its [`Session`]. They never perform I/O and never
//! panic: unparsable amounts become `NaN` and fail the finiteness rules.
use crate::Session;
use thiserror::Error;

/// Maximum absolute difference between two balances that still counts as equal.
///
/// Amounts are compared as `f64`, so the bound is inclusive and widened by a few
/// ULPs of the compared magnitudes; `100.0` and `100.0001` are exactly
/// `BALANCE_TOLERANCE` apart in decimal but not in binary.
pub const BALANCE_TOLERANCE: f64 = 0.0001;

const ULP_SLACK: f64 = 4. * f64::EPSILON;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConsistencyViolation {
    #[error("{0} is not a finite amount")]
    NonFinite(&'static str),

    #[error("Funded balance {0} is not positive")]
    NonPositiveBalance(f64),

    #[error("Balance after payment {0} is negative")]
    NegativeBalance(f64),

    #[error("Balance mismatch: expected {expected}, observed {observed}")]
    BalanceMismatch { expected: f64, observed: f64 },

    #[error("Transfer returned no transaction id")]
    MissingTransactionId,

    #[error("Transaction {0} is missing from the history")]
    TransactionNotRecorded(String),
}

/// Parse a monetary amount, yielding `NaN` when absent or malformed.
pub fn parse_amount(value: Option<&str>) -> f64 {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

/// Whether `a` and `b` differ by more than [`BALANCE_TOLERANCE`].
pub fn exceeds_tolerance(a: f64, b: f64) -> bool {
    let slack = ULP_SLACK * a.abs().max(b.abs());
    (a - b).abs() > BALANCE_TOLERANCE + slack
}

/// The balance reported by the funding call must be positive and match the
/// balance read back afterwards.
pub fn verify_funding(funded: f64, reread: f64) -> Result<(), ConsistencyViolation> {
    if !funded.is_finite() {
        return Err(ConsistencyViolation::NonFinite("funded balance"));
    }
    if !reread.is_finite() {
        return Err(ConsistencyViolation::NonFinite("re-read balance"));
    }
    if funded <= 0. {
        return Err(ConsistencyViolation::NonPositiveBalance(funded));
    }
    if exceeds_tolerance(funded, reread) {
        return Err(ConsistencyViolation::BalanceMismatch {
            expected: funded,
            observed: reread,
        });
    }
    Ok(())
}

/// The payer's balance after the transfer must equal the funded balance minus
/// the payment amount.
pub fn verify_payment(after_fund: f64, amount: f64, after_payment: f64) -> Result<(), ConsistencyViolation> {
    let expected = after_fund - amount;

    if !after_fund.is_finite() {
        return Err(ConsistencyViolation::NonFinite("balance after funding"));
    }
    if !after_payment.is_finite() {
        return Err(ConsistencyViolation::NonFinite("balance after payment"));
    }
    if !expected.is_finite() {
        return Err(ConsistencyViolation::NonFinite("expected balance"));
    }
    if after_fund <= 0. {
        return Err(ConsistencyViolation::NonPositiveBalance(after_fund));
    }
    if after_payment < 0. {
        return Err(ConsistencyViolation::NegativeBalance(after_payment));
    }
    if exceeds_tolerance(expected, after_payment) {
        return Err(ConsistencyViolation::BalanceMismatch {
            expected,
            observed: after_payment,
        });
    }
    Ok(())
}

/// The transaction id returned by the transfer must appear verbatim in the
/// history response body.
pub fn verify_transaction_recorded(
    transaction_id: Option<&str>,
    history: Option<&str>,
) -> Result<(), ConsistencyViolation> {
    let transaction_id = match transaction_id.map(str::trim) {
        Some(id) if !id.is_empty() => id,
        _ => return Err(ConsistencyViolation::MissingTransactionId),
    };

    if history.is_some_and(|body| body.contains(transaction_id)) {
        Ok(())
    } else {
        Err(ConsistencyViolation::TransactionNotRecorded(
            transaction_id.to_string(),
        ))
    }
}

/// A consistency predicate over named session variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyCheck {
    Funding {
        funded: String,
        reread: String,
    },
    Payment {
        after_fund: String,
        amount: String,
        after_payment: String,
        transaction_id: String,
        history: String,
    },
}

impl ConsistencyCheck {
    pub fn evaluate(&self, session: &Session) -> Result<(), ConsistencyViolation> {
        let amount = |name: &String| parse_amount(session.get(name));

        match self {
            ConsistencyCheck::Funding { funded, reread } => {
                verify_funding(amount(funded), amount(reread))
            }
            ConsistencyCheck::Payment {
                after_fund,
                amount: payment,
                after_payment,
                transaction_id,
                history,
            } => {
                verify_payment(amount(after_fund), amount(payment), amount(after_payment))?;
                verify_transaction_recorded(session.get(transaction_id), session.get(history))
            }
        }
    }
}
