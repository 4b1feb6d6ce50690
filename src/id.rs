//! Identity types for the pipeline graph.
//!
//! An [`OperationId`] indexes directly into the engine's operation table.
//! A [`SocketId`] addresses one input socket of one operation; the engine
//! hands them out for exposed boundary inputs so objects can be injected
//! without repeating name lookups.

use std::fmt;

/// Index into the engine's operation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OperationId(pub u32);

impl OperationId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Compact socket address. High 20 bits = operation index, low 12 bits =
/// socket index. Supports up to ~1M operations with 4096 sockets each.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(u32);

impl SocketId {
    const SOCKET_BITS: u32 = 12;
    const SOCKET_MASK: u32 = (1 << Self::SOCKET_BITS) - 1;

    pub fn new(operation: OperationId, socket_index: u16) -> Self {
        debug_assert!(socket_index < (1 << Self::SOCKET_BITS) as u16);
        Self((operation.0 << Self::SOCKET_BITS) | (socket_index as u32 & Self::SOCKET_MASK))
    }

    #[inline]
    pub fn operation(self) -> OperationId {
        OperationId(self.0 >> Self::SOCKET_BITS)
    }

    #[inline]
    pub fn socket_index(self) -> usize {
        (self.0 & Self::SOCKET_MASK) as usize
    }
}

impl fmt::Debug for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SocketId(op={}, socket={})",
            self.operation().0,
            self.socket_index()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_id_indexes() {
        let id = OperationId(42);
        assert_eq!(id.index(), 42);
        assert_eq!(id.to_string(), "#42");
    }

    #[test]
    fn test_socket_id_round_trip() {
        let op = OperationId(100);
        let socket = SocketId::new(op, 7);
        assert_eq!(socket.operation(), op);
        assert_eq!(socket.socket_index(), 7);
    }

    #[test]
    fn test_socket_id_limits() {
        let op = OperationId((1 << 20) - 1);
        let socket = SocketId::new(op, 4095);
        assert_eq!(socket.operation(), op);
        assert_eq!(socket.socket_index(), 4095);
    }
}
