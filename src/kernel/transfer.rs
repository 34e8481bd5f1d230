//! Connector kinds and payload descriptors.
//!
//! Every edge joins exactly one `Input` and one `Output`. A connector may also
//! declare the payload type it transfers; strict connection checks require
//! both typed sides to agree.

use serde::Serialize;
use std::any::TypeId;
use std::fmt;

/// Whether a connector consumes or produces data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectorKind {
    Input,
    Output,
}

impl ConnectorKind {
    /// The kind an edge partner must have.
    pub const fn opposite(self) -> Self {
        match self {
            ConnectorKind::Input => ConnectorKind::Output,
            ConnectorKind::Output => ConnectorKind::Input,
        }
    }
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorKind::Input => write!(f, "input"),
            ConnectorKind::Output => write!(f, "output"),
        }
    }
}

/// Payload type carried over a connector.
#[derive(Clone, Copy)]
pub struct TransferType {
    id: TypeId,
    name: &'static str,
}

impl TransferType {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    /// Payload compatibility of two optional descriptors. An untyped side
    /// accepts anything.
    pub fn compatible(a: Option<&TransferType>, b: Option<&TransferType>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl PartialEq for TransferType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TransferType {}

impl fmt::Debug for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransferType({})", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposite_kind() {
        assert_eq!(ConnectorKind::Input.opposite(), ConnectorKind::Output);
        assert_eq!(ConnectorKind::Output.opposite(), ConnectorKind::Input);
    }

    #[test]
    fn test_transfer_type_equality() {
        assert_eq!(TransferType::of::<f64>(), TransferType::of::<f64>());
        assert_ne!(TransferType::of::<f64>(), TransferType::of::<f32>());
        assert!(TransferType::of::<Vec<u8>>().is::<Vec<u8>>());
    }

    #[test]
    fn test_untyped_side_accepts_anything() {
        let f = TransferType::of::<f64>();
        let s = TransferType::of::<String>();
        assert!(TransferType::compatible(None, Some(&f)));
        assert!(TransferType::compatible(Some(&f), None));
        assert!(TransferType::compatible(Some(&f), Some(&f)));
        assert!(!TransferType::compatible(Some(&f), Some(&s)));
    }
}
