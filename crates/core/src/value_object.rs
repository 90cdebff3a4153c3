//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. A
/// `Quantity` of 3 is the same as any other `Quantity` of 3; a `Movement` with
/// its own id is not a value object.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
