//! Error Classifier
//!
//! Maps warehouse errors onto [`ExecutionErrorKind`]. SQLSTATE codes win;
//! the message text is only consulted when no code is available.

use crate::execution::result::{ExecutionErrorKind, ExecutionFailure};

/// Classify by SQLSTATE code and message
pub fn classify(code: Option<&str>, message: &str) -> ExecutionErrorKind {
    if let Some(code) = code {
        match code {
            "42501" | "25006" => return ExecutionErrorKind::Permission,
            c if c.starts_with("28") => return ExecutionErrorKind::Permission,
            "57014" => return ExecutionErrorKind::Timeout,
            c if c.starts_with("42") => return ExecutionErrorKind::Syntax,
            c if c.starts_with("08") || c.starts_with("53") || c.starts_with("57P") => {
                return ExecutionErrorKind::Unavailable
            }
            _ => {}
        }
    }

    let error_msg = message.to_lowercase();

    if error_msg.contains("permission denied")
        || error_msg.contains("access denied")
        || error_msg.contains("not authorized")
    {
        return ExecutionErrorKind::Permission;
    }

    if error_msg.contains("statement timeout")
        || error_msg.contains("canceling statement")
        || error_msg.contains("timed out")
    {
        return ExecutionErrorKind::Timeout;
    }

    if error_msg.contains("connection refused")
        || error_msg.contains("connection reset")
        || error_msg.contains("could not connect")
    {
        return ExecutionErrorKind::Unavailable;
    }

    // "syntax error", unknown columns and anything unrecognised
    ExecutionErrorKind::Syntax
}

/// Classify a driver error
pub fn classify_sqlx(error: &sqlx::Error) -> ExecutionFailure {
    match error {
        sqlx::Error::Database(db_error) => {
            let code = db_error.code();
            let kind = classify(code.as_deref(), db_error.message());
            ExecutionFailure::new(kind, db_error.message())
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_) => ExecutionFailure::new(ExecutionErrorKind::Unavailable, error.to_string()),
        other => {
            let message = other.to_string();
            ExecutionFailure::new(classify(None, &message), message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlstate_codes() {
        assert_eq!(classify(Some("42501"), "whatever"), ExecutionErrorKind::Permission);
        assert_eq!(classify(Some("28000"), ""), ExecutionErrorKind::Permission);
        assert_eq!(classify(Some("25006"), ""), ExecutionErrorKind::Permission);
        assert_eq!(classify(Some("42601"), ""), ExecutionErrorKind::Syntax);
        assert_eq!(classify(Some("42P01"), "relation does not exist"), ExecutionErrorKind::Syntax);
        assert_eq!(classify(Some("57014"), ""), ExecutionErrorKind::Timeout);
        assert_eq!(classify(Some("08006"), ""), ExecutionErrorKind::Unavailable);
    }

    #[test]
    fn test_message_fallback() {
        assert_eq!(
            classify(None, "ERROR: permission denied for relation orders"),
            ExecutionErrorKind::Permission
        );
        assert_eq!(
            classify(None, "canceling statement due to statement timeout"),
            ExecutionErrorKind::Timeout
        );
        assert_eq!(classify(Some("XX000"), "something odd"), ExecutionErrorKind::Syntax);
    }

    #[test]
    fn test_pool_errors_are_unavailable() {
        assert_eq!(classify_sqlx(&sqlx::Error::PoolTimedOut).kind, ExecutionErrorKind::Unavailable);
        assert_eq!(
            classify_sqlx(&sqlx::Error::Protocol("bad message".to_string())).kind,
            ExecutionErrorKind::Unavailable
        );
    }
}
