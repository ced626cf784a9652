//! Heuristic error classification
//!
//! Category and severity are assigned by scanning the error message (and
//! stack trace, when available) for keywords. The keyword tables below are
//! the contract: they are inherently heuristic and a known source of
//! misclassification, so they live here in isolation where they can be
//! unit-tested and audited.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse-grained classification of an error's origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Failures from an application API layer
    Api,
    /// Connectivity, fetch and timeout failures
    Network,
    /// Input or state validation failures
    Validation,
    /// Panics and other runtime faults
    Runtime,
    /// Authorization and access failures
    Permission,
    /// Anything the keyword tables do not recognize
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Api => "api",
            Self::Network => "network",
            Self::Validation => "validation",
            Self::Runtime => "runtime",
            Self::Permission => "permission",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Impact ranking driving retry eligibility, log level and reporting threshold
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{}", name)
    }
}

lazy_static! {
    // Keyword tables. Substring matches, case-insensitive, checked in the
    // order network -> validation -> permission -> api.
    static ref NETWORK_KEYWORDS: Regex = Regex::new(r"(?i)network|fetch|timeout").unwrap();
    static ref VALIDATION_KEYWORDS: Regex = Regex::new(r"(?i)validation|invalid|required").unwrap();
    static ref PERMISSION_KEYWORDS: Regex =
        Regex::new(r"(?i)permission|unauthorized|forbidden").unwrap();
    static ref API_KEYWORDS: Regex = Regex::new(r"(?i)api").unwrap();
    static ref CRITICAL_KEYWORDS: Regex = Regex::new(r"(?i)critical|fatal").unwrap();
}

/// Classify an error's category from its message and optional stack trace
pub fn classify_category(message: &str, stack: Option<&str>) -> ErrorCategory {
    let haystack = match stack {
        Some(stack) => format!("{}\n{}", message, stack),
        None => message.to_string(),
    };

    if NETWORK_KEYWORDS.is_match(&haystack) {
        ErrorCategory::Network
    } else if VALIDATION_KEYWORDS.is_match(&haystack) {
        ErrorCategory::Validation
    } else if PERMISSION_KEYWORDS.is_match(&haystack) {
        ErrorCategory::Permission
    } else if API_KEYWORDS.is_match(&haystack) {
        ErrorCategory::Api
    } else {
        ErrorCategory::Unknown
    }
}

/// Classify an error's severity from its message and already-assigned category
///
/// A "critical"/"fatal" keyword in the message wins over the category rule.
pub fn classify_severity(message: &str, category: ErrorCategory) -> ErrorSeverity {
    if CRITICAL_KEYWORDS.is_match(message) {
        return ErrorSeverity::Critical;
    }

    match category {
        ErrorCategory::Network | ErrorCategory::Api => ErrorSeverity::High,
        ErrorCategory::Validation => ErrorSeverity::Low,
        _ => ErrorSeverity::Medium,
    }
}
