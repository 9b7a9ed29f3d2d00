use thiserror::Error;
use uuid::Uuid;

/// Why a slot refused a booking delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    Closed,
    CapacityExceeded,
}

impl UnavailableReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "slot is closed",
            Self::CapacityExceeded => "not enough capacity",
        }
    }
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Slot {slot_id} unavailable: {reason}")]
    SlotUnavailable {
        slot_id: Uuid,
        reason: UnavailableReason,
    },

    #[error("Reservation {0} is already cancelled")]
    AlreadyCancelled(String),

    #[error("Timed out waiting for lock: {0}")]
    LockTimeout(String),

    #[error("Idempotency key {0} was already used for a different request")]
    IdempotencyKeyReused(String),

    #[error("Validation: {0}")]
    Validation(String),

    #[error("Ledger is in read-only mode")]
    ReadOnly,

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Duplicate idempotency key: {0}")]
    DuplicateIdempotencyKey(String),

    #[error("Duplicate confirmation code: {0}")]
    DuplicateConfirmationCode(String),

    #[error("Concurrent modification of {0}")]
    StaleWrite(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, field: &'static str, value: impl ToString) -> Self {
        Self::NotFound {
            entity,
            field,
            value: value.to_string(),
        }
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::SlotUnavailable { .. } => "slot_unavailable",
            Self::AlreadyCancelled(_) => "already_cancelled",
            Self::LockTimeout(_) => "lock_timeout",
            Self::IdempotencyKeyReused(_) => "idempotency_key_reused",
            Self::Validation(_) => "validation",
            Self::ReadOnly => "read_only",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::DuplicateIdempotencyKey(_) => "duplicate_idempotency_key",
            Self::DuplicateConfirmationCode(_) => "duplicate_confirmation_code",
            Self::StaleWrite(_) => "stale_write",
            Self::Storage(_) => "storage",
        }
    }

    /// Whether the caller may resubmit the same request (same idempotency key)
    /// and reasonably expect a different outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout(_) | Self::StaleWrite(_) | Self::DuplicateConfirmationCode(_)
        )
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
