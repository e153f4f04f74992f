use serde::{Deserialize, Serialize};

use crate::error::StateMachineError;
use crate::state_machine::{MessageMeta, StateMachine};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Add,
    Multiply,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatorMessage {
    pub operation: Operation,
    pub value: i64,
}

impl AccumulatorMessage {
    pub fn add(value: i64) -> Self {
        Self {
            operation: Operation::Add,
            value,
        }
    }

    pub fn multiply(value: i64) -> Self {
        Self {
            operation: Operation::Multiply,
            value,
        }
    }
}

/// Numeric fold starting at zero.
///
/// Mixing `Add` and `Multiply` makes the result depend on delivery order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Accumulator {
    value: i64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> i64 {
        self.value
    }
}

impl StateMachine for Accumulator {
    type Message = AccumulatorMessage;

    fn execute(
        &mut self,
        message: AccumulatorMessage,
        _meta: &MessageMeta,
    ) -> Result<(), StateMachineError> {
        let next = match message.operation {
            Operation::Add => self.value.checked_add(message.value),
            Operation::Multiply => self.value.checked_mul(message.value),
        };
        self.value = next.ok_or_else(|| {
            StateMachineError::Rejected(format!(
                "{:?} {} overflows {}",
                message.operation, message.value, self.value
            ))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echo_types::{PublicKey, Timeframe};

    fn meta() -> MessageMeta {
        MessageMeta {
            feed_key: PublicKey::from_bytes([1; 32]),
            seq: 0,
            timeframe: Timeframe::new(),
        }
    }

    fn fold(messages: &[AccumulatorMessage]) -> i64 {
        let mut acc = Accumulator::new();
        for m in messages {
            acc.execute(*m, &meta()).unwrap();
        }
        acc.value()
    }

    #[test]
    fn add_then_multiply() {
        let messages = [AccumulatorMessage::add(5), AccumulatorMessage::multiply(3)];
        assert_eq!(fold(&messages), 15);
    }

    #[test]
    fn multiply_then_add() {
        let messages = [AccumulatorMessage::multiply(3), AccumulatorMessage::add(5)];
        assert_eq!(fold(&messages), 5);
    }

    #[test]
    fn overflow_is_rejected_without_changing_state() {
        let mut acc = Accumulator::new();
        acc.execute(AccumulatorMessage::add(i64::MAX), &meta()).unwrap();
        let err = acc
            .execute(AccumulatorMessage::multiply(2), &meta())
            .unwrap_err();
        assert!(matches!(err, StateMachineError::Rejected(_)));
        assert_eq!(acc.value(), i64::MAX);
    }

    #[test]
    fn wire_format_uses_upper_case_operations() {
        let json = serde_json::to_string(&AccumulatorMessage::multiply(3)).unwrap();
        assert_eq!(json, r#"{"operation":"MULTIPLY","value":3}"#);
    }
}
