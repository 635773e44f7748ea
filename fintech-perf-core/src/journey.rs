//! Transport-independent description of a request journey.
//!
//! A [`ScenarioSpec`] is an ordered chain of [`JourneyStep`]s sharing one
//! [`Session`]. Each step is a request template plus the checks applied to its
//! response; checks may bind values into the session for later steps.
use crate::consistency::ConsistencyCheck;
use crate::users;
use crate::StepError;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// Accepted HTTP status codes for a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedStatus {
    Exact(u16),
    OneOf(Vec<u16>),
}

impl ExpectedStatus {
    pub fn matches(&self, status: u16) -> bool {
        match self {
            ExpectedStatus::Exact(expected) => *expected == status,
            ExpectedStatus::OneOf(expected) => expected.contains(&status),
        }
    }
}

impl fmt::Display for ExpectedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedStatus::Exact(status) => write!(f, "{status}"),
            ExpectedStatus::OneOf(statuses) => {
                let statuses: Vec<_> = statuses.iter().map(u16::to_string).collect();
                write!(f, "one of [{}]", statuses.join(", "))
            }
        }
    }
}

/// Small JSON path subset: `$`, `$.field`, `$.a.b` and `$.items[0]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath(String);

impl JsonPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Select the value at this path. `null` and malformed paths select nothing.
    pub fn select<'v>(&self, document: &'v Value) -> Option<&'v Value> {
        let rest = self.0.strip_prefix('$')?;
        if rest.is_empty() {
            return non_null(document);
        }

        let mut current = document;
        for segment in rest.strip_prefix('.')?.split('.') {
            let (field, mut indices) = match segment.find('[') {
                Some(pos) => (&segment[..pos], &segment[pos..]),
                None => (segment, ""),
            };

            if field.is_empty() && indices.is_empty() {
                return None;
            }
            if !field.is_empty() {
                current = current.get(field)?;
            }

            while let Some(open) = indices.strip_prefix('[') {
                let close = open.find(']')?;
                let index: usize = open[..close].parse().ok()?;
                current = current.get(index)?;
                indices = &open[close + 1..];
            }
            if !indices.is_empty() {
                return None;
            }
        }

        non_null(current)
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn non_null(value: &Value) -> Option<&Value> {
    if value.is_null() {
        None
    } else {
        Some(value)
    }
}

/// Text form of an extracted value. Strings lose their quotes.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A check applied to a step's JSON response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// The path must be present; its value is bound to `variable`.
    Save { path: JsonPath, variable: String },
    /// The path must be present.
    Exists { path: JsonPath },
    /// The path must be present and equal `expected`.
    Equals { path: JsonPath, expected: String },
}

impl Extraction {
    pub fn path(&self) -> &JsonPath {
        match self {
            Extraction::Save { path, .. }
            | Extraction::Exists { path }
            | Extraction::Equals { path, .. } => path,
        }
    }

    fn apply(&self, document: &Value, session: &mut Session) -> Result<(), StepError> {
        let value = self
            .path()
            .select(document)
            .ok_or_else(|| StepError::MissingField(self.path().to_string()))?;

        match self {
            Extraction::Save { variable, .. } => {
                session.set(variable.clone(), value_text(value));
                Ok(())
            }
            Extraction::Exists { .. } => Ok(()),
            Extraction::Equals { path, expected } => {
                let actual = value_text(value);
                if &actual == expected {
                    Ok(())
                } else {
                    Err(StepError::UnexpectedValue {
                        path: path.to_string(),
                        expected: expected.clone(),
                        actual,
                    })
                }
            }
        }
    }
}

/// One request of a journey.
#[derive(Debug, Clone, PartialEq)]
pub struct JourneyStep {
    pub name: String,
    pub method: Method,
    pub path_template: String,
    /// `None` means the engine's configured timeout applies.
    pub request_timeout: Option<Duration>,
    pub headers: Vec<(String, String)>,
    pub body_template: Option<String>,
    pub expected_status: ExpectedStatus,
    pub extractions: Vec<Extraction>,
    /// Bind the raw response body to this variable.
    pub save_body_as: Option<String>,
}

impl JourneyStep {
    pub fn new(name: &str, method: Method, path_template: &str) -> Self {
        Self {
            name: name.to_string(),
            method,
            path_template: path_template.to_string(),
            request_timeout: None,
            headers: vec![],
            body_template: None,
            expected_status: ExpectedStatus::Exact(200),
            extractions: vec![],
            save_body_as: None,
        }
    }

    pub fn get(name: &str, path_template: &str) -> Self {
        Self::new(name, Method::Get, path_template)
    }

    pub fn post(name: &str, path_template: &str) -> Self {
        Self::new(name, Method::Post, path_template)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn header(mut self, name: &str, value_template: &str) -> Self {
        self.headers.push((name.to_string(), value_template.to_string()));
        self
    }

    /// `Authorization: Bearer ${token_var}`
    pub fn bearer(self, token_var: &str) -> Self {
        use crate::constants::http::{AUTHORIZATION, BEARER_PREFIX};
        let value = format!("{BEARER_PREFIX}${{{token_var}}}");
        self.header(AUTHORIZATION, &value)
    }

    pub fn body(mut self, template: impl Into<String>) -> Self {
        self.body_template = Some(template.into());
        self
    }

    pub fn status(mut self, expected: u16) -> Self {
        self.expected_status = ExpectedStatus::Exact(expected);
        self
    }

    pub fn status_in(mut self, expected: &[u16]) -> Self {
        self.expected_status = ExpectedStatus::OneOf(expected.to_vec());
        self
    }

    pub fn save(mut self, path: &str, variable: &str) -> Self {
        self.extractions.push(Extraction::Save {
            path: JsonPath::new(path),
            variable: variable.to_string(),
        });
        self
    }

    pub fn exists(mut self, path: &str) -> Self {
        self.extractions.push(Extraction::Exists {
            path: JsonPath::new(path),
        });
        self
    }

    pub fn equals(mut self, path: &str, expected: &str) -> Self {
        self.extractions.push(Extraction::Equals {
            path: JsonPath::new(path),
            expected: expected.to_string(),
        });
        self
    }

    pub fn save_body(mut self, variable: &str) -> Self {
        self.save_body_as = Some(variable.to_string());
        self
    }

    /// Fill in every template of this step from the session.
    pub fn render(&self, session: &Session) -> Result<RenderedRequest, StepError> {
        let headers = self
            .headers
            .iter()
            .map(|(name, value)| Ok((name.clone(), session.render(value)?)))
            .collect::<Result<Vec<_>, StepError>>()?;

        Ok(RenderedRequest {
            method: self.method,
            path: session.render(&self.path_template)?,
            headers,
            body: self
                .body_template
                .as_deref()
                .map(|body| session.render(body))
                .transpose()?,
        })
    }

    /// Check a response against this step and bind its extractions.
    ///
    /// Stops at the first failing check; bindings made before it stay in the
    /// session, which is harmless since the iteration ends there.
    pub fn validate(&self, status: u16, body: &str, session: &mut Session) -> Result<(), StepError> {
        if !self.expected_status.matches(status) {
            return Err(StepError::UnexpectedStatus {
                expected: self.expected_status.clone(),
                actual: status,
            });
        }

        if !self.extractions.is_empty() {
            let document: Value =
                serde_json::from_str(body).map_err(|err| StepError::InvalidBody(err.to_string()))?;
            for extraction in &self.extractions {
                extraction.apply(&document, session)?;
            }
        }

        if let Some(variable) = &self.save_body_as {
            session.set(variable.clone(), body);
        }

        Ok(())
    }
}

/// A step with every placeholder substituted, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRequest {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Per-iteration variable scope. Owned by exactly one running iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    vars: HashMap<String, String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Replace every `${name}` in `template`. An unterminated `${` is kept
    /// verbatim.
    pub fn render(&self, template: &str) -> Result<String, StepError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("${") {
            let Some(len) = rest[start + 2..].find('}') else {
                break;
            };
            let name = &rest[start + 2..start + 2 + len];
            let value = self
                .get(name)
                .ok_or_else(|| StepError::UnboundVariable(name.to_string()))?;

            out.push_str(&rest[..start]);
            out.push_str(value);
            rest = &rest[start + 2 + len + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

/// Value placed into a fresh session before the first step runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionValue {
    /// A new unique username per iteration.
    Username { variable: String, prefix: String },
    Literal { variable: String, value: String },
}

/// A named journey: its steps, initial session values and the consistency
/// check evaluated once every step has passed.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSpec {
    pub name: String,
    pub session_values: Vec<SessionValue>,
    pub steps: Vec<JourneyStep>,
    pub consistency: Option<ConsistencyCheck>,
}

impl ScenarioSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            session_values: vec![],
            steps: vec![],
            consistency: None,
        }
    }

    pub fn username(mut self, variable: &str, prefix: &str) -> Self {
        self.session_values.push(SessionValue::Username {
            variable: variable.to_string(),
            prefix: prefix.to_string(),
        });
        self
    }

    pub fn literal(mut self, variable: &str, value: &str) -> Self {
        self.session_values.push(SessionValue::Literal {
            variable: variable.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn step(mut self, step: JourneyStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn consistency(mut self, check: ConsistencyCheck) -> Self {
        self.consistency = Some(check);
        self
    }

    /// Apply one timeout to every step that does not set its own.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        for step in &mut self.steps {
            step.request_timeout.get_or_insert(timeout);
        }
        self
    }

    /// Fresh session for a new iteration.
    pub fn new_session(&self) -> Session {
        let mut session = Session::new();
        for value in &self.session_values {
            match value {
                SessionValue::Username { variable, prefix } => {
                    session.set(variable.clone(), users::username(prefix))
                }
                SessionValue::Literal { variable, value } => {
                    session.set(variable.clone(), value.clone())
                }
            }
        }
        session
    }

    pub fn request_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|step| step.name.as_str())
    }
}
