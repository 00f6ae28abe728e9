use crate::definitions::{HomeId, NodeId};
use crate::values::ValueType;
use serde::{Deserialize, Serialize};

/// Which aspect of a device a value describes. Determines where embedders
/// surface it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum ValueGenre {
    /// The bare-bones level every device maps onto (Basic CC)
    Basic = 0,
    /// What the end user cares about
    User = 1,
    /// Device configuration parameters
    Config = 2,
    /// Library-internal state (node health, versions, ...)
    System = 3,
}

/// The stable, opaque key an embedder uses to name a single reported value
/// on a single device. The tuple (node, command class, instance, index)
/// uniquely identifies a value within a home.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ValueId {
    home_id: HomeId,
    node_id: NodeId,
    genre: ValueGenre,
    /// Raw command class id; classes outside the known set still own values
    command_class_id: u8,
    instance: u8,
    index: u8,
    value_type: ValueType,
}

impl ValueId {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        home_id: HomeId,
        node_id: NodeId,
        genre: ValueGenre,
        command_class_id: u8,
        instance: u8,
        index: u8,
        value_type: ValueType,
    ) -> Self {
        Self {
            home_id,
            node_id,
            genre,
            command_class_id,
            instance,
            index,
            value_type,
        }
    }

    pub fn home_id(&self) -> HomeId {
        self.home_id
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn genre(&self) -> ValueGenre {
        self.genre
    }

    pub fn command_class_id(&self) -> u8 {
        self.command_class_id
    }

    pub fn instance(&self) -> u8 {
        self.instance
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Packs everything except the home id into a single integer. The
    /// home id keys the store this id lives in, so the packed form is
    /// unique per home. Round-trips losslessly via [ValueId::unpack].
    pub fn pack(&self) -> u64 {
        (u8::from(self.node_id) as u64) << 40
            | (self.genre as u64) << 38
            | (self.command_class_id as u64) << 30
            | (self.instance as u64) << 22
            | (self.index as u64) << 14
            | (self.value_type as u64) << 10
    }

    /// Reverses [ValueId::pack]. Returns None if the genre or type bits
    /// do not name a known variant.
    pub fn unpack(home_id: HomeId, packed: u64) -> Option<Self> {
        let genre = match (packed >> 38) & 0x03 {
            0 => ValueGenre::Basic,
            1 => ValueGenre::User,
            2 => ValueGenre::Config,
            _ => ValueGenre::System,
        };
        let value_type = match (packed >> 10) & 0x0f {
            0 => ValueType::Bool,
            1 => ValueType::Byte,
            2 => ValueType::Short,
            3 => ValueType::Int,
            4 => ValueType::Decimal,
            5 => ValueType::String,
            6 => ValueType::List,
            7 => ValueType::Button,
            8 => ValueType::Schedule,
            9 => ValueType::Raw,
            10 => ValueType::BitSet,
            _ => return None,
        };
        Some(Self {
            home_id,
            node_id: NodeId::new(((packed >> 40) & 0xff) as u8),
            genre,
            command_class_id: ((packed >> 30) & 0xff) as u8,
            instance: ((packed >> 22) & 0xff) as u8,
            index: ((packed >> 14) & 0xff) as u8,
            value_type,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_id() -> ValueId {
        ValueId::new(
            HomeId::new(0xcafe_babe),
            NodeId::new(5),
            ValueGenre::User,
            0x31,
            1,
            1,
            ValueType::Decimal,
        )
    }

    #[test]
    fn test_pack_roundtrip() {
        let id = sample_id();
        let packed = id.pack();
        assert_eq!(ValueId::unpack(HomeId::new(0xcafe_babe), packed), Some(id));
    }

    #[test]
    fn test_pack_injective() {
        // Ids differing in exactly one field must pack differently
        let base = sample_id();
        let variants = [
            ValueId::new(
                base.home_id(),
                NodeId::new(6),
                base.genre(),
                0x31,
                1,
                1,
                ValueType::Decimal,
            ),
            ValueId::new(
                base.home_id(),
                base.node_id(),
                ValueGenre::Config,
                0x31,
                1,
                1,
                ValueType::Decimal,
            ),
            ValueId::new(
                base.home_id(),
                base.node_id(),
                base.genre(),
                0x32,
                1,
                1,
                ValueType::Decimal,
            ),
            ValueId::new(
                base.home_id(),
                base.node_id(),
                base.genre(),
                0x31,
                2,
                1,
                ValueType::Decimal,
            ),
            ValueId::new(
                base.home_id(),
                base.node_id(),
                base.genre(),
                0x31,
                1,
                2,
                ValueType::Decimal,
            ),
            ValueId::new(
                base.home_id(),
                base.node_id(),
                base.genre(),
                0x31,
                1,
                1,
                ValueType::Int,
            ),
        ];
        for variant in variants {
            assert_ne!(base.pack(), variant.pack());
        }
    }
}
