//! Order entity and its validated creation input.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{OrderId, Timestamp, ValidationError};

/// Upper bound on `number` and `customer_id` lengths.
pub const MAX_FIELD_LEN: usize = 64;

/// Validated input for creating an order.
///
/// Construction is the only validation point; a `NewOrder` that exists is
/// always safe to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    number: String,
    customer_id: String,
}

impl NewOrder {
    /// Validates raw input, trimming surrounding whitespace.
    pub fn new(
        number: impl Into<String>,
        customer_id: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let number = validate_field("number", number.into())?;
        let customer_id = validate_field("customerId", customer_id.into())?;
        Ok(Self {
            number,
            customer_id,
        })
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }
}

fn validate_field(field: &str, value: String) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::empty_field(field));
    }
    let len = trimmed.chars().count();
    if len > MAX_FIELD_LEN {
        return Err(ValidationError::too_long(field, MAX_FIELD_LEN, len));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(ValidationError::invalid_format(
            field,
            "control characters are not allowed",
        ));
    }
    Ok(trimmed.to_string())
}

/// A persisted order. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    number: String,
    customer_id: String,
    created_at: Timestamp,
}

impl Order {
    /// Materializes a new order once the store has assigned its id.
    pub fn from_new(id: OrderId, input: NewOrder, created_at: Timestamp) -> Self {
        Self {
            id,
            number: input.number,
            customer_id: input.customer_id,
            created_at,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_order_trims_input() {
        let input = NewOrder::new("  A-100 ", "C-1").unwrap();
        assert_eq!(input.number(), "A-100");
        assert_eq!(input.customer_id(), "C-1");
    }

    #[test]
    fn new_order_rejects_blank_number() {
        let err = NewOrder::new("   ", "C-1").unwrap_err();
        assert_eq!(err, ValidationError::empty_field("number"));
    }

    #[test]
    fn new_order_rejects_overlong_customer() {
        let err = NewOrder::new("A-100", "c".repeat(MAX_FIELD_LEN + 1)).unwrap_err();
        assert_eq!(err.field(), "customerId");
    }

    #[test]
    fn new_order_rejects_control_characters() {
        assert!(NewOrder::new("A-\n100", "C-1").is_err());
    }

    #[test]
    fn from_new_keeps_validated_fields() {
        let input = NewOrder::new("A-100", "C-1").unwrap();
        let order = Order::from_new(OrderId::new(42), input, Timestamp::now());

        assert_eq!(order.id(), OrderId::new(42));
        assert_eq!(order.number(), "A-100");
        assert_eq!(order.customer_id(), "C-1");
    }
}
