//! Endpoints, request names and fixed test data for the financial API.

pub mod endpoints {
    pub const AUTH_REGISTER: &str = "/auth/register";
    pub const AUTH_LOGIN: &str = "/auth/login";
    pub const ACCOUNT_BALANCE: &str = "/account/${accountId}";
    pub const ACCOUNT_FUND: &str = "/account/${accountId}/fund";
    pub const TRANSACTION_PAYMENT: &str = "/transaction/payment";
    pub const TRANSACTION_HISTORY: &str = "/transaction/${accountId}";

    /// Substitute the account placeholder with another session variable.
    pub fn for_account(template: &str, variable: &str) -> String {
        template.replace("${accountId}", &format!("${{{variable}}}"))
    }
}

/// Request names. These label metrics and per-request assertions.
pub mod requests {
    pub mod auth {
        pub const REGISTER: &str = "auth.register";
        pub const LOGIN: &str = "auth.login";
    }

    pub mod funding {
        pub const REGISTER: &str = "funding.auth.register";
        pub const LOGIN: &str = "funding.auth.login";
        pub const FUND: &str = "funding.account.fund";
        pub const BALANCE: &str = "funding.account.balance";
    }

    pub mod payment {
        pub const PAYER_REGISTER: &str = "payment.payer.register";
        pub const PAYEE_REGISTER: &str = "payment.payee.register";
        pub const PAYER_LOGIN: &str = "payment.payer.login";
        pub const PAYER_FUND: &str = "payment.payer.fund";
        pub const TRANSFER: &str = "payment.transfer";
        pub const PAYER_BALANCE: &str = "payment.payer.balance";
        pub const PAYER_TRANSACTIONS: &str = "payment.payer.transactions";
    }

    /// Synthetic request recorded when an iteration fails its consistency check.
    pub const CONSISTENCY: &str = "consistency";
}

pub mod test_data {
    pub const PASSWORD: &str = "password";
    pub const FUND_AMOUNT: &str = "100.00";
    pub const PAYMENT_AMOUNT: &str = "40.00";
}

pub mod http {
    pub const AUTHORIZATION: &str = "Authorization";
    pub const BEARER_PREFIX: &str = "Bearer ";
    pub const USER_AGENT: &str = "fintech-perf";
    pub const JSON: &str = "application/json";
}

/// Request body templates.
pub mod bodies {
    pub fn auth(username_var: &str, password_var: &str) -> String {
        format!(r#"{{"username":"${{{username_var}}}","password":"${{{password_var}}}"}}"#)
    }

    pub fn fund(amount: &str) -> String {
        format!(r#"{{"amount":{amount}}}"#)
    }

    pub fn payment(from_var: &str, to_var: &str, amount: &str) -> String {
        format!(
            r#"{{"fromAccountId":"${{{from_var}}}","toAccountId":"${{{to_var}}}","amount":"{amount}"}}"#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_templates() {
        assert_eq!(
            bodies::auth("username", "password"),
            r#"{"username":"${username}","password":"${password}"}"#
        );
        assert_eq!(bodies::fund("100.00"), r#"{"amount":100.00}"#);
        assert_eq!(
            bodies::payment("payer", "payee", "40.00"),
            r#"{"fromAccountId":"${payer}","toAccountId":"${payee}","amount":"40.00"}"#
        );
    }

    #[test]
    fn account_paths() {
        assert_eq!(
            endpoints::for_account(endpoints::ACCOUNT_FUND, "payerAccountId"),
            "/account/${payerAccountId}/fund"
        );
    }
}
