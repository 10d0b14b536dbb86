//! Message patterns used to classify upstream failures.
//!
//! Transports do not always expose a structured status, and vendor SDKs
//! often fold the status into the message text. These patterns are the
//! single place where message text is matched; `classify` consults them
//! only after structured evidence (status code, RPC code) is exhausted.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // =========================================================================
    // CREDENTIAL PATTERNS (checked first, they override everything else)
    // =========================================================================

    /// The configured key or selected project no longer resolves
    pub static ref CREDENTIAL_PATTERN: Regex = Regex::new(
        r"(?i)(requested entity was not found|api key not valid|api[_ ]key[_ ]invalid|api_key_reset_required|unauthenticated|invalid api key|api key expired)"
    ).unwrap();

    // =========================================================================
    // TRANSIENT PATTERNS
    // =========================================================================

    /// Quota exhaustion (daily or per-project limits)
    pub static ref QUOTA_PATTERN: Regex = Regex::new(
        r"(?i)(quota[_ ]exceeded|exceeded your current quota|quota)"
    ).unwrap();

    /// Rate limiting
    pub static ref RATE_LIMIT_PATTERN: Regex = Regex::new(
        r"(?i)(\b429\b|too many requests|rate[_ ]?limit|resource_exhausted)"
    ).unwrap();

    /// Temporary unavailability
    pub static ref UNAVAILABLE_PATTERN: Regex = Regex::new(
        r"(?i)(\b503\b|service unavailable|\bunavailable\b|overloaded)"
    ).unwrap();

    /// Server-side errors
    pub static ref SERVER_ERROR_PATTERN: Regex = Regex::new(
        r"(?i)(\b50[0-24]\b|internal server error|\binternal\b|bad gateway)"
    ).unwrap();

    /// Timeouts
    pub static ref TIMEOUT_PATTERN: Regex = Regex::new(
        r"(?i)(deadline[_ ]exceeded|timed? ?out|timeout)"
    ).unwrap();

    /// Network-level failures
    pub static ref NETWORK_PATTERN: Regex = Regex::new(
        r"(?i)(network|connection (reset|refused|closed)|econnreset|econnrefused|failed to fetch|fetch failed|dns error)"
    ).unwrap();

    // =========================================================================
    // PERMANENT PATTERNS
    // =========================================================================

    /// Content policy rejection
    pub static ref CONTENT_BLOCKED_PATTERN: Regex = Regex::new(
        r"(?i)(safety|blocked|prohibited content|content policy)"
    ).unwrap();

    /// Invalid request arguments
    pub static ref INVALID_ARGUMENT_PATTERN: Regex = Regex::new(
        r"(?i)(invalid[_ ]argument|failed[_ ]precondition|bad request|\b400\b)"
    ).unwrap();

    /// Permission problems that a new key would not fix
    pub static ref PERMISSION_PATTERN: Regex = Regex::new(
        r"(?i)(permission[_ ]denied|\b403\b|forbidden)"
    ).unwrap();

    /// Unknown or retired model
    pub static ref MODEL_NOT_FOUND_PATTERN: Regex = Regex::new(
        r"(?i)(models/\S+ is not found|model not found|not_found|\b404\b)"
    ).unwrap();
}

/// Check if the message signals an invalid credential.
pub fn mentions_credential(message: &str) -> bool {
    CREDENTIAL_PATTERN.is_match(message)
}
