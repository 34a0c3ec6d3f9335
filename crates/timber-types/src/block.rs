use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::{CORE_KFACTOR, VECTOR_CAPACITY};

/// One-byte wire tag identifying the kind of a stored block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockType {
    /// Interior tree node holding child pointers and aggregates.
    Core = 1,
    /// Leaf node holding raw time/value points.
    Vector = 2,
}

impl TryFrom<u8> for BlockType {
    type Error = TypeError;

    fn try_from(tag: u8) -> Result<Self, TypeError> {
        match tag {
            1 => Ok(BlockType::Core),
            2 => Ok(BlockType::Vector),
            other => Err(TypeError::UnknownBlockType(other)),
        }
    }
}

/// Interior node of a stream's block tree.
///
/// The addressing context (`address`, `version`, `point_width`, `start_time`)
/// is supplied by tree navigation, not by the stored payload, and is skipped
/// by the codec. Only the child tables go to disk.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coreblock {
    /// Address this block lives at. Virtual until the linking algorithm
    /// assigns a final address at commit.
    #[serde(skip)]
    pub address: u64,
    /// Stream version this block was written under.
    #[serde(skip)]
    pub version: u64,
    /// Log2 width of the time span covered by each child slot.
    #[serde(skip)]
    pub point_width: u8,
    /// Start of the time span this block covers, in nanoseconds.
    #[serde(skip)]
    pub start_time: i64,

    /// Addresses of child blocks, zero for absent children.
    pub child_addrs: Vec<u64>,
    /// Version under which each child was last written.
    pub child_versions: Vec<u64>,
    /// Total point count beneath each child.
    pub child_counts: Vec<u64>,
}

impl Coreblock {
    /// A zeroed core block with the full child fanout allocated.
    pub fn new() -> Self {
        Self {
            child_addrs: vec![0; CORE_KFACTOR],
            child_versions: vec![0; CORE_KFACTOR],
            child_counts: vec![0; CORE_KFACTOR],
            ..Self::default()
        }
    }

    /// Encode into `buf` (cleared first): one tag byte, then the bincode body.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), TypeError> {
        buf.clear();
        buf.push(BlockType::Core as u8);
        bincode::serialize_into(&mut *buf, self).map_err(|e| TypeError::Codec(e.to_string()))
    }
}

/// Leaf node holding raw points.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vectorblock {
    /// Address this block lives at. Virtual until linked.
    #[serde(skip)]
    pub address: u64,
    /// Stream version this block was written under.
    #[serde(skip)]
    pub version: u64,
    /// Log2 width of the time span covered by this leaf.
    #[serde(skip)]
    pub point_width: u8,
    /// Start of the time span this block covers, in nanoseconds.
    #[serde(skip)]
    pub start_time: i64,

    /// Point timestamps, in nanoseconds.
    pub times: Vec<i64>,
    /// Point values, parallel to `times`.
    pub values: Vec<f64>,
}

impl Vectorblock {
    /// An empty leaf with room for [`VECTOR_CAPACITY`] points.
    pub fn new() -> Self {
        Self {
            times: Vec::with_capacity(VECTOR_CAPACITY),
            values: Vec::with_capacity(VECTOR_CAPACITY),
            ..Self::default()
        }
    }

    /// Append one point. Callers are responsible for staying within
    /// [`VECTOR_CAPACITY`]; the tree layer splits leaves before they overflow.
    pub fn push_point(&mut self, time: i64, value: f64) {
        self.times.push(time);
        self.values.push(value);
    }

    /// Number of points held.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Returns `true` if no points are held.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Encode into `buf` (cleared first): one tag byte, then the bincode body.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), TypeError> {
        buf.clear();
        buf.push(BlockType::Vector as u8);
        bincode::serialize_into(&mut *buf, self).map_err(|e| TypeError::Codec(e.to_string()))
    }
}

/// A decoded block of either kind, as produced by the typed read path.
#[derive(Clone, Debug, PartialEq)]
pub enum Datablock {
    Core(Coreblock),
    Vector(Vectorblock),
}

impl Datablock {
    /// Decode a stored payload: one tag byte, then the bincode body.
    ///
    /// The addressing context fields come back zeroed; the caller restamps
    /// them from navigation context.
    pub fn decode(payload: &[u8]) -> Result<Self, TypeError> {
        let (&tag, body) = payload.split_first().ok_or(TypeError::EmptyPayload)?;
        match BlockType::try_from(tag)? {
            BlockType::Core => {
                let block: Coreblock =
                    bincode::deserialize(body).map_err(|e| TypeError::Codec(e.to_string()))?;
                Ok(Datablock::Core(block))
            }
            BlockType::Vector => {
                let block: Vectorblock =
                    bincode::deserialize(body).map_err(|e| TypeError::Codec(e.to_string()))?;
                Ok(Datablock::Vector(block))
            }
        }
    }

    /// Encode into `buf` (cleared first): one tag byte, then the bincode body.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), TypeError> {
        match self {
            Datablock::Core(b) => b.encode_into(buf),
            Datablock::Vector(b) => b.encode_into(buf),
        }
    }

    /// The wire tag for this block.
    pub fn block_type(&self) -> BlockType {
        match self {
            Datablock::Core(_) => BlockType::Core,
            Datablock::Vector(_) => BlockType::Vector,
        }
    }

    /// The address this block lives at.
    pub fn address(&self) -> u64 {
        match self {
            Datablock::Core(b) => b.address,
            Datablock::Vector(b) => b.address,
        }
    }

    /// Restamp the addressing context supplied by tree navigation.
    pub fn stamp(&mut self, address: u64, version: u64, point_width: u8, start_time: i64) {
        match self {
            Datablock::Core(b) => {
                b.address = address;
                b.version = version;
                b.point_width = point_width;
                b.start_time = start_time;
            }
            Datablock::Vector(b) => {
                b.address = address;
                b.version = version;
                b.point_width = point_width;
                b.start_time = start_time;
            }
        }
    }
}

impl From<Coreblock> for Datablock {
    fn from(b: Coreblock) -> Self {
        Datablock::Core(b)
    }
}

impl From<Vectorblock> for Datablock {
    fn from(b: Vectorblock) -> Self {
        Datablock::Vector(b)
    }
}
