//! Parameters, communication objects, and the conditional parameter tree.
//!
//! [`ProgramContext`] plays the role of the loader's process-wide class-level
//! tables (`Parameter.Table`, `Com_Object.Table`, ...): a write-once registry
//! built while an application program is loaded, read-only afterwards and
//! shared by the codec and the image builder.

use std::collections::HashMap;

use flagset::{flags, FlagSet};

use crate::telegram::Priority;

impl Priority {
    /// Decodes the 2-bit priority encoding used inside a compiled
    /// communication-object flags byte. Unlike the telegram header's
    /// priority bits, this mapping is `Low=0b11, High=0b10, Alert=0b01,
    /// System=0b00` — numerically reversed from the telegram wire encoding,
    /// so it gets its own conversion rather than reusing
    /// [`Priority::from_wire_bits`].
    pub fn from_co_flags_bits(bits: u8) -> Priority {
        match bits & 0x3 {
            0b00 => Priority::System,
            0b01 => Priority::Alert,
            0b10 => Priority::High,
            _ => Priority::Low,
        }
    }

    /// Encodes to the compiled communication-object flags byte's 2-bit
    /// priority field.
    pub fn to_co_flags_bits(self) -> u8 {
        match self {
            Priority::System => 0b00,
            Priority::Alert => 0b01,
            Priority::High => 0b10,
            Priority::Low => 0b11,
        }
    }
}

flags! {
    /// The six boolean flags a communication object carries.
    pub enum ComObjectFlag: u8 {
        Communication,
        Read,
        ReadOnInit,
        Write,
        Transmit,
        Update,
    }
}

/// Bit positions of each flag within a compiled communication-object flags
/// byte. `ReadOnInit` has no bit here — it governs device-local startup
/// behavior and is never compiled into this byte.
const FLAG_READ: u8 = 0x08;
const FLAG_WRITE: u8 = 0x10;
const FLAG_COMMUNICATION: u8 = 0x04;
const FLAG_TRANSMIT: u8 = 0x40;
const FLAG_UPDATE: u8 = 0x80;

/// Packs a flag set and priority into the byte layout the com-object table
/// stores per entry. `include_communication` mirrors the `com` parameter of
/// the source this is grounded on; the compiled per-object table always
/// passes `false` (communication enablement lives in table membership, not
/// this byte), while a human-readable dump would pass `true`.
pub fn flags_as_byte(flags: FlagSet<ComObjectFlag>, priority: Priority, include_communication: bool) -> u8 {
    let mut result = 0u8;
    if flags.contains(ComObjectFlag::Read) {
        result |= FLAG_READ;
    }
    if flags.contains(ComObjectFlag::Write) {
        result |= FLAG_WRITE;
    }
    if include_communication && flags.contains(ComObjectFlag::Communication) {
        result |= FLAG_COMMUNICATION;
    }
    if flags.contains(ComObjectFlag::Transmit) {
        result |= FLAG_TRANSMIT;
    }
    if flags.contains(ComObjectFlag::Update) {
        result |= FLAG_UPDATE;
    }
    result | priority.to_co_flags_bits()
}

/// Read access for a [`Parameter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Read-only.
    ReadOnly,
    /// Read-write (the default).
    ReadWrite,
}

/// An absolute, fixed-location segment of device memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsoluteSegment {
    /// Segment id, used to key [`ProgramContext::segments`].
    pub id: String,
    /// Absolute start address.
    pub address: u32,
    /// Size in bytes.
    pub size: u32,
    /// Fixed initial content, if any.
    pub data: Option<Vec<u8>>,
    /// Fixed bitmask over `data`, if any.
    pub mask: Option<Vec<u8>>,
}

/// A parameter's underlying value type: a plain integer input, or a
/// restricted selection with display text per choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterType {
    /// Type id.
    pub id: String,
    /// Size in bits.
    pub size: u16,
    /// `(value, display text)` pairs, non-empty only for selection types.
    pub choices: Vec<(i64, String)>,
}

impl ParameterType {
    /// Renders `value` using the type's choice list, falling back to its
    /// plain decimal representation.
    pub fn value_as_text(&self, value: i64) -> String {
        self.choices
            .iter()
            .find(|(v, _)| *v == value)
            .map(|(_, text)| text.clone())
            .unwrap_or_else(|| value.to_string())
    }
}

/// Where a parameter's value lives in device memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterMemory {
    /// Byte offset within the owning segment.
    pub offset: u32,
    /// Bit offset within that byte, `0..8`.
    pub bit_offset: u16,
    /// Size in bits.
    pub size: u16,
}

/// A named device configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Parameter id.
    pub id: String,
    /// Id of this parameter's [`ParameterType`].
    pub type_id: String,
    /// Default value, `-1` if unset (mirrors the loader's convention of
    /// parsing a missing `Value` attribute as `-1`).
    pub default_value: i64,
    /// Read/write access.
    pub access: Access,
    /// Segment id plus placement, absent for parameters with no backing
    /// memory (e.g. ones only ever read through an `Assign`).
    pub segment_id: Option<String>,
    /// Placement within `segment_id`.
    pub memory: Option<ParameterMemory>,
}

impl Parameter {
    /// Checks the sub-byte/multi-byte placement invariant: a parameter
    /// narrower than a byte must fit within it; one a byte or wider must
    /// start on a byte boundary.
    pub fn validate(&self) -> Result<(), crate::error::LayoutError> {
        if let Some(mem) = &self.memory {
            let misaligned = if mem.size < 8 {
                mem.bit_offset + mem.size > 8
            } else {
                mem.bit_offset != 0
            };
            if misaligned {
                return Err(crate::error::LayoutError::MisalignedParameter {
                    parameter: self.id.clone(),
                    bit_offset: mem.bit_offset,
                    size: mem.size,
                });
            }
        }
        Ok(())
    }
}

/// A reference to a [`Parameter`], optionally overriding its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterRef {
    /// Reference id.
    pub id: String,
    /// Id of the referenced [`Parameter`].
    pub parameter_id: String,
    /// The value in effect at this reference, before any `Assign` runs.
    pub value: i64,
}

/// A communication object definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComObject {
    /// Object id.
    pub id: String,
    /// Device-visible object number.
    pub number: u32,
    /// Size in bits.
    pub size_bits: u16,
    /// Datapoint type catalog id, if one is assigned.
    pub datapoint_type: Option<String>,
    /// Base flag set.
    pub flags: FlagSet<ComObjectFlag>,
    /// Base priority.
    pub priority: Priority,
}

/// Per-flag overrides layered onto a base flag set. `None` means "inherit".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagOverrides {
    pub communication: Option<bool>,
    pub read: Option<bool>,
    pub read_on_init: Option<bool>,
    pub write: Option<bool>,
    pub transmit: Option<bool>,
    pub update: Option<bool>,
}

impl FlagOverrides {
    /// Applies the overrides onto `base`, returning the resolved set.
    pub fn resolve(&self, base: FlagSet<ComObjectFlag>) -> FlagSet<ComObjectFlag> {
        let mut result = base;
        let mut set = |flag: ComObjectFlag, value: Option<bool>| {
            if let Some(v) = value {
                if v {
                    result |= flag;
                } else {
                    result -= flag;
                }
            }
        };
        set(ComObjectFlag::Communication, self.communication);
        set(ComObjectFlag::Read, self.read);
        set(ComObjectFlag::ReadOnInit, self.read_on_init);
        set(ComObjectFlag::Write, self.write);
        set(ComObjectFlag::Transmit, self.transmit);
        set(ComObjectFlag::Update, self.update);
        result
    }
}

/// A reference to a [`ComObject`], overlaying partial flag/priority
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComObjectRef {
    /// Reference id.
    pub id: String,
    /// Id of the referenced [`ComObject`].
    pub object_id: String,
    /// Flag overrides relative to the base object.
    pub overrides: FlagOverrides,
    /// Priority override relative to the base object.
    pub priority_override: Option<Priority>,
}

/// A [`ComObjectRef`] bound to one or more group addresses for a concrete
/// device instance, with further flag overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComObjectInstance {
    /// Id of the bound [`ComObjectRef`].
    pub ref_id: String,
    /// Group addresses this instance communicates over.
    pub group_addresses: Vec<crate::address::GroupAddress>,
    /// Flag overrides relative to the reference.
    pub overrides: FlagOverrides,
}

/// The process-wide, write-once registries built while a program loads.
///
/// Mirrors the source's per-class `Table` dictionaries (`Parameter.Table`,
/// `Com_Object.Table`, ...) as one explicit struct rather than several
/// implicit global maps.
#[derive(Debug, Clone, Default)]
pub struct ProgramContext {
    pub segments: HashMap<String, AbsoluteSegment>,
    pub parameter_types: HashMap<String, ParameterType>,
    pub parameters: HashMap<String, Parameter>,
    pub parameter_refs: HashMap<String, ParameterRef>,
    pub com_objects: HashMap<String, ComObject>,
    pub com_object_refs: HashMap<String, ComObjectRef>,
    /// Root nodes of the application program's conditional (dynamic) parameter
    /// tree. Empty for programs with no `Choose`/`When` structure at all.
    pub dynamic_tree: Vec<DynamicNode>,
}

impl ProgramContext {
    /// Resolves a [`ComObjectRef`]'s effective flags and priority by
    /// overlaying its overrides onto its base [`ComObject`].
    pub fn resolve_com_object_ref(&self, ref_id: &str) -> Option<(FlagSet<ComObjectFlag>, Priority)> {
        let co_ref = self.com_object_refs.get(ref_id)?;
        let object = self.com_objects.get(&co_ref.object_id)?;
        let flags = co_ref.overrides.resolve(object.flags);
        let priority = co_ref.priority_override.unwrap_or(object.priority);
        Some((flags, priority))
    }
}

/// One node of the conditional parameter tree used by an application
/// program's dynamic (UI-facing) view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DynamicNode {
    /// A named grouping of child nodes, optionally tied to a parameter.
    ParameterBlock { id: String, param_ref_id: Option<String>, children: Vec<DynamicNode> },
    /// Branches on the current value of a referenced parameter.
    Choose { param_ref_id: String, whens: Vec<WhenBranch> },
    /// A leaf referencing a parameter directly.
    ParameterRefRef(String),
    /// A leaf referencing a communication object directly.
    ComObjectRefRef(String),
    /// Copies or assigns a value into another parameter reference.
    Assign { target_param_ref_id: String, value: AssignSource },
    /// A cosmetic, non-functional separator.
    Separator,
}

/// One branch of a [`DynamicNode::Choose`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhenBranch {
    /// The value the choosing parameter must hold for this branch to apply.
    pub test: i64,
    /// Children active when this branch is taken.
    pub children: Vec<DynamicNode>,
}

/// Where an [`DynamicNode::Assign`] gets its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignSource {
    /// A literal constant.
    Literal(i64),
    /// The current value of another parameter reference.
    CopyFrom(String),
}

/// Accumulated effects of walking a dynamic tree: which leaves are active
/// given the current environment, and which assignments it produced.
///
/// Assignments are collected, not applied, while walking — applying them
/// eagerly would make the result depend on traversal order, since an
/// `Assign` earlier in document order could otherwise feed a `Choose`
/// evaluated later in the same pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvalResult {
    pub active_parameter_refs: Vec<String>,
    pub active_com_object_refs: Vec<String>,
    pub assignments: Vec<(String, i64)>,
}

/// Walks `roots` against `env` (parameter-reference id to current value),
/// returning the active leaves and pending assignments.
pub fn evaluate(roots: &[DynamicNode], env: &HashMap<String, i64>) -> EvalResult {
    let mut result = EvalResult::default();
    for node in roots {
        walk(node, env, &mut result);
    }
    result
}

fn walk(node: &DynamicNode, env: &HashMap<String, i64>, out: &mut EvalResult) {
    match node {
        DynamicNode::ParameterBlock { param_ref_id, children, .. } => {
            if let Some(id) = param_ref_id {
                out.active_parameter_refs.push(id.clone());
            }
            for child in children {
                walk(child, env, out);
            }
        }
        DynamicNode::ParameterRefRef(id) => out.active_parameter_refs.push(id.clone()),
        DynamicNode::ComObjectRefRef(id) => out.active_com_object_refs.push(id.clone()),
        DynamicNode::Separator => {}
        DynamicNode::Assign { target_param_ref_id, value } => {
            let resolved = match value {
                AssignSource::Literal(v) => *v,
                AssignSource::CopyFrom(src_id) => env.get(src_id).copied().unwrap_or(-1),
            };
            out.assignments.push((target_param_ref_id.clone(), resolved));
        }
        DynamicNode::Choose { param_ref_id, whens } => {
            let current = env.get(param_ref_id).copied().unwrap_or(-1);
            for branch in whens {
                if branch.test == current {
                    for child in &branch.children {
                        walk(child, env, out);
                    }
                }
            }
        }
    }
}

/// Applies previously-collected assignments onto `env`.
pub fn apply_assignments(env: &mut HashMap<String, i64>, assignments: &[(String, i64)]) {
    for (id, value) in assignments {
        env.insert(id.clone(), *value);
    }
}
