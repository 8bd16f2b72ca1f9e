//! Error types for the cadence controller
//!
//! Errors are structured with fields to aid debugging in production.
//! Kubernetes API failures are classified on conversion, so the error
//! policy only has to ask [`Error::is_retryable`].

use thiserror::Error;

/// Main error type for cadence operations
#[derive(Debug, Error)]
pub enum Error {
    /// The scaler spec cannot be evaluated as written
    #[error("configuration error for {scaler}: {message}")]
    Configuration {
        /// Name of the scaler with invalid configuration
        scaler: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.windows[0].start")
        field: Option<String>,
    },

    /// The schedule engine failed on otherwise valid input
    #[error("compute error for {scaler}: {message}")]
    Compute {
        /// Name of the scaler being evaluated
        scaler: String,
        /// Description of what failed
        message: String,
    },

    /// A remote read or write failed for a reason other than "not found"
    #[error("remote error: {message}")]
    Remote {
        /// Description of what failed
        message: String,
        /// Whether the same request may succeed later without a spec or RBAC change
        retryable: bool,
    },
}

impl Error {
    /// Create a configuration error with scaler context and field path
    pub fn configuration_for_field(
        scaler: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Configuration {
            scaler: scaler.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a compute error for a scaler
    pub fn compute(scaler: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Compute {
            scaler: scaler.into(),
            message: msg.into(),
        }
    }

    /// Create a remote error
    pub fn remote(msg: impl Into<String>, retryable: bool) -> Self {
        Self::Remote {
            message: msg.into(),
            retryable,
        }
    }

    /// Check if this error is retryable
    ///
    /// Configuration errors need a spec change and rejected API requests
    /// need a spec or RBAC change; everything else may self-heal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Configuration { .. } => false,
            Error::Compute { .. } => true,
            Error::Remote { retryable, .. } => *retryable,
        }
    }

    /// Get the scaler name if this error is associated with a specific scaler
    pub fn scaler(&self) -> Option<&str> {
        match self {
            Error::Configuration { scaler, .. } | Error::Compute { scaler, .. } => Some(scaler),
            Error::Remote { .. } => None,
        }
    }

    /// Get the field path of a configuration error
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Configuration { field, .. } => field.as_deref(),
            _ => None,
        }
    }
}

/// API status codes that report a rejected request rather than a transient fault
fn is_rejected(code: u16) -> bool {
    // 409 conflicts and 429 throttling clear up on their own
    (400..500).contains(&code) && code != 409 && code != 429
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        let retryable = match &err {
            kube::Error::Api(ae) => !is_rejected(ae.code),
            kube::Error::SerdeError(_) => false,
            _ => true,
        };
        Self::remote(err.to_string(), retryable)
    }
}
