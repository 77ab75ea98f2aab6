use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// The failure half of a pledge.
///
/// Carries a message, a numeric code, an optional wrapped cause and an
/// ordered list of related errors (filled in for aggregate failures).
/// Cloning is cheap: the cause is shared.
///
/// # Examples
///
/// ```
/// use pledges::PledgeError;
///
/// let error = PledgeError::new("socket closed", 7);
/// let wrapped = error.wrap("fetching profile: ");
/// assert_eq!(wrapped.message(), "fetching profile: socket closed");
/// assert_eq!(wrapped.code(), 7);
/// assert_eq!(wrapped.cause(), Some(&error));
///
/// // An empty context passes the error through untouched.
/// assert_eq!(error.wrap(""), error);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PledgeError {
    message: String,
    code: i64,
    #[source]
    cause: Option<Arc<PledgeError>>,
    related: Vec<PledgeError>,
}

impl PledgeError {
    /// `from_option` was handed `None`.
    pub const NIL_VALUE: i64 = 1;
    /// The pledge was still pending when its timeout elapsed.
    pub const TIMEOUT: i64 = 2;
    /// A rejection nobody observed within the grace window.
    pub const UNCAUGHT: i64 = 12;
    /// A type-erased slot did not hold the expected type.
    pub const TYPE_MISMATCH: i64 = 98;
    /// Several inputs of an `all` failed.
    pub const AGGREGATE: i64 = 99;

    pub fn new(message: impl Into<String>, code: i64) -> Self {
        Self {
            message: message.into(),
            code,
            cause: None,
            related: Vec::new(),
        }
    }

    /// A domain error with code `0`.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(message, 0)
    }

    /// Captures the display text of any error, keeping its source chain as
    /// nested causes.
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut captured = Self::msg(error.to_string());
        if let Some(source) = error.source() {
            captured.cause = Some(Arc::new(Self::from_error(source)));
        }
        captured
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> i64 {
        self.code
    }

    pub fn cause(&self) -> Option<&PledgeError> {
        self.cause.as_deref()
    }

    pub fn related(&self) -> &[PledgeError] {
        &self.related
    }

    pub fn with_cause(mut self, cause: PledgeError) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn with_related(mut self, related: Vec<PledgeError>) -> Self {
        self.related = related;
        self
    }

    /// Prefixes `context` to the message and nests `self` as the cause.
    /// Code and related errors carry over. An empty `context` returns the
    /// error unchanged.
    pub fn wrap(&self, context: &str) -> PledgeError {
        if context.is_empty() {
            return self.clone();
        }
        self.rewrite(format!("{context}{}", self.message))
    }

    /// Same shape as [`wrap`](Self::wrap) but with the whole message replaced.
    pub(crate) fn rewrite(&self, message: String) -> PledgeError {
        PledgeError {
            message,
            code: self.code,
            cause: Some(Arc::new(self.clone())),
            related: self.related.clone(),
        }
    }

    pub(crate) fn timeout(timeout: Duration) -> Self {
        Self::new(
            format!(
                "Pledge did not resolve or reject before timeout of {:?} second.",
                timeout.as_secs_f64()
            ),
            Self::TIMEOUT,
        )
    }

    pub(crate) fn uncaught(error: &PledgeError) -> Self {
        PledgeError {
            message: format!("Uncaught Pledge failure: {}", error.message),
            code: Self::UNCAUGHT,
            cause: Some(Arc::new(error.clone())),
            related: error.related.clone(),
        }
    }

    pub(crate) fn nil_value() -> Self {
        Self::new("Value was nil", Self::NIL_VALUE)
    }

    /// Several failures folded into one: `[`, each message on its own line,
    /// then `]`.
    pub(crate) fn aggregate(errors: Vec<PledgeError>) -> Self {
        let mut message = String::from("[\n");
        for error in &errors {
            message.push_str(&error.message);
            message.push('\n');
        }
        message.push(']');
        Self::new(message, Self::AGGREGATE).with_related(errors)
    }
}

impl From<&str> for PledgeError {
    fn from(message: &str) -> Self {
        Self::msg(message)
    }
}

impl From<String> for PledgeError {
    fn from(message: String) -> Self {
        Self::msg(message)
    }
}
