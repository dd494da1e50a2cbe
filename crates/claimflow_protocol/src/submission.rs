//! Validated claim submissions accepted by the HTTP surface.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};

/// Status given to submissions that do not carry one.
pub const DEFAULT_STATUS: &str = "Enviado";

fn default_status() -> String {
    DEFAULT_STATUS.to_string()
}

/// A fully typed claim submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimSubmission {
    /// External identifier.
    pub id: String,
    /// Customer name.
    pub customer: String,
    /// Claimed amount.
    pub amount: f64,
    /// Free-form description.
    pub description: String,
    /// Status label.
    #[serde(default = "default_status")]
    pub status: String,
}

impl ClaimSubmission {
    /// Creates a submission with the default status.
    pub fn new(
        id: impl Into<String>,
        customer: impl Into<String>,
        amount: f64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            customer: customer.into(),
            amount,
            description: description.into(),
            status: default_status(),
        }
    }

    /// Checks the fields a submission must carry.
    ///
    /// `id` and `customer` must be non-blank and `amount` finite.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.id.trim().is_empty() {
            return Err(ProtocolError::InvalidSubmission("id must not be empty".into()));
        }
        if self.customer.trim().is_empty() {
            return Err(ProtocolError::InvalidSubmission(
                "customer must not be empty".into(),
            ));
        }
        if !self.amount.is_finite() {
            return Err(ProtocolError::InvalidSubmission(
                "amount must be a finite number".into(),
            ));
        }
        Ok(())
    }
}
