//! Field and method descriptor parsing.

use serde::{Deserialize, Serialize};

use crate::bytecode::DecodeError;
use crate::value::ValueKind;

/// Parsed method descriptor such as `(IJLjava/lang/String;)V`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub parameters: Vec<ValueKind>,
    /// `None` for `void`.
    pub returns: Option<ValueKind>,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<Self, DecodeError> {
        let malformed = || DecodeError::Descriptor(descriptor.to_owned());
        let rest = descriptor.strip_prefix('(').ok_or_else(malformed)?;
        let close = rest.find(')').ok_or_else(malformed)?;
        let (mut params, returns) = (&rest[..close], &rest[close + 1..]);

        let mut parameters = Vec::new();
        while !params.is_empty() {
            let (kind, remaining) = split_type(params).ok_or_else(malformed)?;
            parameters.push(kind);
            params = remaining;
        }

        let returns = if returns == "V" {
            None
        } else {
            match split_type(returns) {
                Some((kind, "")) => Some(kind),
                _ => return Err(malformed()),
            }
        };
        Ok(Self {
            parameters,
            returns,
        })
    }

    /// Local-variable slots taken by the parameters, excluding any receiver.
    pub fn parameter_slots(&self) -> usize {
        self.parameters
            .iter()
            .map(|kind| kind.category().slots())
            .sum()
    }
}

/// Kind of the value stored in a field with this descriptor.
pub fn field_kind(descriptor: &str) -> Result<ValueKind, DecodeError> {
    match split_type(descriptor) {
        Some((kind, "")) => Ok(kind),
        _ => Err(DecodeError::Descriptor(descriptor.to_owned())),
    }
}

fn split_type(input: &str) -> Option<(ValueKind, &str)> {
    let mut chars = input.chars();
    let kind = match chars.next()? {
        'Z' => ValueKind::Boolean,
        'B' => ValueKind::Byte,
        'C' => ValueKind::Char,
        'S' => ValueKind::Short,
        'I' => ValueKind::Int,
        'J' => ValueKind::Long,
        'F' => ValueKind::Float,
        'D' => ValueKind::Double,
        'L' => {
            let end = input.find(';')?;
            if end < 2 {
                return None;
            }
            return Some((ValueKind::Reference, &input[end + 1..]));
        }
        '[' => {
            let (_, rest) = split_type(&input[1..])?;
            return Some((ValueKind::Reference, rest));
        }
        _ => return None,
    };
    Some((kind, chars.as_str()))
}
