use crate::parse::{Parsable, ParseResult};
use cookie_factory as cf;
use nom::{combinator::map, number::complete::be_u8};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};

pub const NODE_ID_UNSPECIFIED: NodeId = NodeId(0);
pub const NODE_ID_BROADCAST: NodeId = NodeId(0xff);
/// The highest assignable node ID
pub const NODE_ID_MAX: u8 = 232;

/// An 8-bit node address. 1..=232 are usable devices, 0xff addresses
/// every node on the network at once.
#[derive(
    Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeId(u8);

impl NodeId {
    pub fn new(id: u8) -> Self {
        Self(id)
    }

    pub fn broadcast() -> Self {
        NODE_ID_BROADCAST
    }

    pub fn unspecified() -> Self {
        NODE_ID_UNSPECIFIED
    }

    pub fn is_broadcast(&self) -> bool {
        *self == NODE_ID_BROADCAST
    }

    /// Whether this ID can refer to an actual device on the mesh
    pub fn is_valid(&self) -> bool {
        self.0 >= 1 && self.0 <= NODE_ID_MAX
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:0>3}", self.0)
    }
}

macro_rules! impl_conversions_for {
    ($t:ty) => {
        impl From<$t> for NodeId {
            fn from(val: $t) -> Self {
                Self(val as u8)
            }
        }

        impl From<NodeId> for $t {
            fn from(val: NodeId) -> Self {
                val.0 as $t
            }
        }

        impl PartialEq<$t> for NodeId {
            fn eq(&self, other: &$t) -> bool {
                self.0 as $t == *other
            }
        }
    };
}

impl_conversions_for!(u8);
impl_conversions_for!(u16);
impl_conversions_for!(usize);

impl Parsable for NodeId {
    fn parse(i: &[u8]) -> ParseResult<Self> {
        map(be_u8, NodeId::new)(i)
    }
}

impl crate::encoding::Serializable for NodeId {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        cf::bytes::be_u8(self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_validity() {
        assert!(!NodeId::unspecified().is_valid());
        assert!(NodeId::new(1).is_valid());
        assert!(NodeId::new(232).is_valid());
        assert!(!NodeId::new(233).is_valid());
        assert!(!NodeId::broadcast().is_valid());
        assert!(NodeId::broadcast().is_broadcast());
    }
}
