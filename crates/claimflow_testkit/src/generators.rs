//! Property-based test generators using proptest.

use claimflow_core::{ClaimFields, HistoryMode};
use claimflow_protocol::ClaimMessage;
use proptest::prelude::*;

/// Strategy for claim ids, including duplicates across draws.
pub fn claim_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][0-9]{1,3}").expect("Invalid regex")
}

/// Strategy for status labels.
pub fn status_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Enviado".to_string()),
        Just("Revisado".to_string()),
        Just("Aprobado".to_string()),
        Just("Rechazado".to_string()),
        Just("Pagado".to_string()),
    ]
}

/// Strategy for finite claim amounts.
pub fn amount_strategy() -> impl Strategy<Value = f64> {
    (0u32..1_000_000).prop_map(|cents| f64::from(cents) / 100.0)
}

/// Strategy for claim fields.
pub fn claim_fields_strategy() -> impl Strategy<Value = ClaimFields> {
    (
        claim_id_strategy(),
        "[a-zA-Z ]{1,24}",
        amount_strategy(),
        ".{0,48}",
        status_strategy(),
    )
        .prop_map(|(id, customer, amount, description, status)| {
            ClaimFields::new(id, customer, amount, description).with_status(status)
        })
}

/// Strategy for queue messages with any subset of fields present.
pub fn claim_message_strategy() -> impl Strategy<Value = ClaimMessage> {
    (
        prop::option::of(claim_id_strategy()),
        prop::option::of("[a-zA-Z ]{1,24}"),
        prop::option::of(amount_strategy()),
        prop::option::of(".{0,48}"),
        prop::option::of(status_strategy()),
    )
        .prop_map(|(id, customer, amount, description, status)| ClaimMessage {
            id,
            customer,
            amount,
            description,
            status,
        })
}

/// Strategy for status update modes.
pub fn history_mode_strategy() -> impl Strategy<Value = HistoryMode> {
    prop_oneof![Just(HistoryMode::Replace), Just(HistoryMode::Track)]
}

/// Configuration for property-based tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to generate.
    pub cases: u32,
}

impl PropTestConfig {
    /// Fast runs for store-backed properties, which touch the file system.
    pub fn quick() -> Self {
        Self { cases: 16 }
    }

    /// Converts to proptest config.
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig::with_cases(self.cases)
    }
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self { cases: 64 }
    }
}
