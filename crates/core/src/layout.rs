//! Memory layout of an opened model
//!
//! A model exposes a fixed list of [`Region`]s (contiguous memory areas the
//! accelerator reads or writes) and a list of [`BufferSlot`]s describing how
//! the caller sees them. Every slot maps to exactly one region. Both lists are
//! produced once by the dispatch layer at open time and never change after.
//!
//! ## Directions
//!
//! | Direction | Bound by |
//! |-----------|----------|
//! | `In` | caller, by index or label |
//! | `Out` | caller, by index or label |
//! | `Ext` | runtime at commit, or caller by label |

use crate::error::{Error, Result};
use crate::types::ModelId;
use serde::{Deserialize, Serialize};

/// Data-flow direction of a buffer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Model input.
    In,
    /// Model output.
    Out,
    /// Internal scratch region the runtime backs automatically.
    Ext,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::In => write!(f, "IN"),
            Direction::Out => write!(f, "OUT"),
            Direction::Ext => write!(f, "EXT"),
        }
    }
}

/// Tensor shape as reported by the model (NWHC).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    /// Batch
    pub n: u32,
    /// Width
    pub w: u32,
    /// Height
    pub h: u32,
    /// Channels
    pub c: u32,
}

impl Shape {
    /// Create a shape.
    pub const fn new(n: u32, w: u32, h: u32, c: u32) -> Self {
        Shape { n, w, h, c }
    }
}

/// A contiguous memory area required by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Position in the session's region list.
    pub index: usize,
    /// Exact byte size a bound buffer must have.
    pub required_size: usize,
    /// Backend-defined attribute flags.
    #[serde(default)]
    pub attribute: u32,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
}

/// Caller-visible view of a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferSlot {
    /// Region this slot maps to.
    pub region_index: usize,
    /// Data-flow direction.
    pub direction: Direction,
    /// Index among slots of the same direction.
    pub slot_index: usize,
    /// Byte size of the slot.
    pub size: usize,
    /// Byte offset of the slot inside its region.
    #[serde(default)]
    pub offset: usize,
    /// Tensor shape.
    #[serde(default)]
    pub shape: Shape,
    /// Backend-defined element kind.
    #[serde(default)]
    pub kind: u32,
    /// Label the caller can bind by.
    #[serde(default)]
    pub name: String,
}

/// How a bind call names its target slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotSelector {
    /// Match the slot's label exactly.
    Label(String),
    /// Match (direction, index within direction).
    Index(Direction, usize),
}

impl SlotSelector {
    /// Selector matching a label.
    pub fn label(name: impl Into<String>) -> Self {
        SlotSelector::Label(name.into())
    }

    fn matches(&self, slot: &BufferSlot) -> bool {
        match self {
            SlotSelector::Label(name) => slot.name == *name,
            SlotSelector::Index(direction, index) => {
                slot.direction == *direction && slot.slot_index == *index
            }
        }
    }
}

impl std::fmt::Display for SlotSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotSelector::Label(name) => write!(f, "label {:?}", name),
            SlotSelector::Index(direction, index) => write!(f, "{}[{}]", direction, index),
        }
    }
}

/// Number of input and output slots of a model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferCounts {
    /// Input slots
    pub inputs: usize,
    /// Output slots
    pub outputs: usize,
}

impl BufferCounts {
    /// Inputs plus outputs.
    pub fn total(&self) -> usize {
        self.inputs + self.outputs
    }
}

/// Description of one slot returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferInfo {
    /// Tensor shape
    pub shape: Shape,
    /// Byte size
    pub size: usize,
    /// Element kind
    pub kind: u32,
    /// Slot label
    pub label: String,
}

impl From<&BufferSlot> for BufferInfo {
    fn from(slot: &BufferSlot) -> Self {
        BufferInfo {
            shape: slot.shape,
            size: slot.size,
            kind: slot.kind,
            label: slot.name.clone(),
        }
    }
}

/// Layout of an opened model as reported by the dispatch layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Owning model.
    pub model_id: ModelId,
    /// Caller-visible slots, in dispatch order.
    pub slots: Vec<BufferSlot>,
    /// Memory regions, indexed by `Region::index`.
    pub regions: Vec<Region>,
}

impl Session {
    /// Create a session layout.
    pub fn new(model_id: ModelId, slots: Vec<BufferSlot>, regions: Vec<Region>) -> Self {
        Session {
            model_id,
            slots,
            regions,
        }
    }

    /// Check that regions sit at the position their index names and that
    /// every slot maps to an existing region.
    pub fn validate(&self) -> Result<()> {
        for (position, region) in self.regions.iter().enumerate() {
            if region.index != position {
                return Err(Error::InvalidArgument(format!(
                    "model {}: region at position {} declares index {}",
                    self.model_id, position, region.index
                )));
            }
        }
        if let Some(slot) = self
            .slots
            .iter()
            .find(|slot| slot.region_index >= self.regions.len())
        {
            return Err(Error::InvalidArgument(format!(
                "model {}: slot {:?} maps to missing region {}",
                self.model_id, slot.name, slot.region_index
            )));
        }
        Ok(())
    }

    /// First slot matching `selector`.
    pub fn find_slot(&self, selector: &SlotSelector) -> Option<&BufferSlot> {
        self.slots.iter().find(|slot| selector.matches(slot))
    }

    /// Region at `index`.
    pub fn region(&self, index: usize) -> Option<&Region> {
        self.regions.get(index)
    }

    /// Count of IN and OUT slots. EXT slots are not counted.
    pub fn buffer_counts(&self) -> BufferCounts {
        let mut counts = BufferCounts::default();
        for slot in &self.slots {
            match slot.direction {
                Direction::In => counts.inputs += 1,
                Direction::Out => counts.outputs += 1,
                Direction::Ext => {}
            }
        }
        counts
    }

    /// Slots of the given direction ordered by slot index.
    pub fn slots_of(&self, direction: Direction) -> Vec<&BufferSlot> {
        let mut slots: Vec<&BufferSlot> = self
            .slots
            .iter()
            .filter(|slot| slot.direction == direction)
            .collect();
        slots.sort_by_key(|slot| slot.slot_index);
        slots
    }
}
