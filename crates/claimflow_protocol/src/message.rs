//! The claim message envelope.
//!
//! On the wire a message is a CBOR map:
//!
//! ```text
//! { "v": 1, "id": text?, "customer": text?, "amount": number?,
//!   "description": text?, "status": text? }
//! ```
//!
//! Every claim field is optional; consumers fill in defaults for the ones a
//! producer left out. A `null` value is read as absent.

use crate::error::{ProtocolError, ProtocolResult};
use crate::submission::ClaimSubmission;
use ciborium::value::{Integer, Value};

/// Current envelope schema version.
pub const PROTOCOL_VERSION: u64 = 1;

const FIELD_VERSION: &str = "v";
const FIELD_ID: &str = "id";
const FIELD_CUSTOMER: &str = "customer";
const FIELD_AMOUNT: &str = "amount";
const FIELD_DESCRIPTION: &str = "description";
const FIELD_STATUS: &str = "status";

/// A claim carried through the queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimMessage {
    /// External identifier.
    pub id: Option<String>,
    /// Customer name.
    pub customer: Option<String>,
    /// Claimed amount.
    pub amount: Option<f64>,
    /// Free-form description.
    pub description: Option<String>,
    /// Status label.
    pub status: Option<String>,
}

impl ClaimMessage {
    /// Creates an empty message; every field will be defaulted by consumers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes to CBOR. Absent fields are omitted from the map.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut pairs = vec![(
            Value::Text(FIELD_VERSION.into()),
            Value::Integer(Integer::from(PROTOCOL_VERSION)),
        )];

        let text_fields = [
            (FIELD_ID, &self.id),
            (FIELD_CUSTOMER, &self.customer),
            (FIELD_DESCRIPTION, &self.description),
            (FIELD_STATUS, &self.status),
        ];
        for (name, value) in text_fields {
            if let Some(text) = value {
                pairs.push((Value::Text(name.into()), Value::Text(text.clone())));
            }
        }
        if let Some(amount) = self.amount {
            pairs.push((Value::Text(FIELD_AMOUNT.into()), Value::Float(amount)));
        }

        let mut buf = Vec::new();
        ciborium::ser::into_writer(&Value::Map(pairs), &mut buf)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Decodes from CBOR.
    ///
    /// # Errors
    ///
    /// Returns `MalformedPayload` for bodies that are not CBOR maps, lack a
    /// version, carry fields of the wrong type or a non-finite amount, and
    /// `UnsupportedVersion`
    /// for versions other than [`PROTOCOL_VERSION`].
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let value: Value = ciborium::de::from_reader(bytes)
            .map_err(|e| ProtocolError::malformed(e.to_string()))?;
        let map = value
            .as_map()
            .ok_or_else(|| ProtocolError::malformed("expected map"))?;

        let get_field = |name: &str| {
            map.iter()
                .find(|(k, _)| k.as_text() == Some(name))
                .map(|(_, v)| v)
                .filter(|v| !v.is_null())
        };

        let version = get_field(FIELD_VERSION)
            .and_then(Value::as_integer)
            .map(i128::from)
            .ok_or_else(|| ProtocolError::malformed("missing version"))?;
        if version != i128::from(PROTOCOL_VERSION) {
            return Err(ProtocolError::UnsupportedVersion(version));
        }

        let text = |name: &str| -> ProtocolResult<Option<String>> {
            match get_field(name) {
                None => Ok(None),
                Some(v) => v
                    .as_text()
                    .map(|s| Some(s.to_string()))
                    .ok_or_else(|| ProtocolError::malformed(format!("{name} must be text"))),
            }
        };

        let amount = match get_field(FIELD_AMOUNT) {
            None => None,
            Some(Value::Float(f)) => Some(*f),
            Some(Value::Integer(i)) => Some(i128::from(*i) as f64),
            Some(_) => return Err(ProtocolError::malformed("amount must be a number")),
        };
        // JSON has no NaN or infinity; such an amount could never be stored.
        if amount.is_some_and(|a| !a.is_finite()) {
            return Err(ProtocolError::malformed("amount must be finite"));
        }

        Ok(Self {
            id: text(FIELD_ID)?,
            customer: text(FIELD_CUSTOMER)?,
            amount,
            description: text(FIELD_DESCRIPTION)?,
            status: text(FIELD_STATUS)?,
        })
    }
}

impl From<ClaimSubmission> for ClaimMessage {
    fn from(submission: ClaimSubmission) -> Self {
        Self {
            id: Some(submission.id),
            customer: Some(submission.customer),
            amount: Some(submission.amount),
            description: Some(submission.description),
            status: Some(submission.status),
        }
    }
}
