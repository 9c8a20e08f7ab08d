use crate::model::Amount;

pub type CalcResult<T> = std::result::Result<T, CalcError>;

/// Errors raised by the financial calculators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalcError {
    /// The inputs were rejected before any computation took place.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The payment is larger than what is owed, beyond the configured tolerance. The caller has to
    /// decide on early closure explicitly.
    #[error(
        "a payment of {payment} exceeds the outstanding balance of {outstanding} by more than \
        the tolerance of {tolerance}"
    )]
    Overpayment {
        payment: Amount,
        outstanding: Amount,
        tolerance: Amount,
    },

    /// Rounding left a remainder too large to come from rounding alone. This is a bug upstream
    /// and must not be recovered from.
    #[error("allocation remainder of {remainder} is larger than the permitted {limit}")]
    RoundingOverflow { remainder: Amount, limit: Amount },
}

impl CalcError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        CalcError::InvalidInput(message.into())
    }

    /// True for errors that indicate a defect rather than bad input.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CalcError::RoundingOverflow { .. })
    }
}
