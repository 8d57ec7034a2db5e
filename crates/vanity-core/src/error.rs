use std::fmt;

/// Machine-readable error codes surfaced by the CLI in JSON mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    NotARepository,
    IdentityUnavailable,
    ConfigParseError,
    InvalidArgument,
    StoreWriteFailed,
    FetchFailed,
    EmitFailed,
    PushFailed,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::NotARepository => "E1002",
            Self::IdentityUnavailable => "E1003",
            Self::ConfigParseError => "E1004",
            Self::InvalidArgument => "E1005",
            Self::StoreWriteFailed => "E2001",
            Self::FetchFailed => "E3001",
            Self::EmitFailed => "E3002",
            Self::PushFailed => "E3003",
            Self::LockContention => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "vanity not initialized",
            Self::NotARepository => "Not a git repository",
            Self::IdentityUnavailable => "GitHub identity unavailable",
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidArgument => "Invalid argument",
            Self::StoreWriteFailed => "Data file write failed",
            Self::FetchFailed => "Contribution fetch failed",
            Self::EmitFailed => "Mirror commit failed",
            Self::PushFailed => "Push failed",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `vanity init` in the shared repository."),
            Self::NotARepository => Some("Run this from the root of your vanity repository."),
            Self::IdentityUnavailable => {
                Some("Run `gh auth login`, or pass `--user` / set VANITY_USER.")
            }
            Self::ConfigParseError => Some("Fix syntax in .vanity/config.toml and retry."),
            Self::InvalidArgument => None,
            Self::StoreWriteFailed => Some("Check disk space and write permissions."),
            Self::FetchFailed => Some("Check network access and `gh auth status`."),
            Self::EmitFailed => None,
            Self::PushFailed => {
                Some("Resolve the remote state, then rerun `vanity sync`; progress was saved.")
            }
            Self::LockContention => Some("Retry after the other `vanity` process finishes."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::NotInitialized,
            ErrorCode::NotARepository,
            ErrorCode::IdentityUnavailable,
            ErrorCode::ConfigParseError,
            ErrorCode::InvalidArgument,
            ErrorCode::StoreWriteFailed,
            ErrorCode::FetchFailed,
            ErrorCode::EmitFailed,
            ErrorCode::PushFailed,
            ErrorCode::LockContention,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::PushFailed.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }
}
