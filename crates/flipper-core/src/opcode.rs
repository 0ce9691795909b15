//! Opcode encoding of the command stream.
//!
//! Every command starts with one opcode byte. Bits `3..8` select the
//! opcode class (one of 32), bits `0..3` select the vertex attribute
//! table (VAT) used by draw commands. [`OpcodeTable`] maps class indices
//! to the closed set of [`OpcodeClass`] variants the decoder understands.

use std::fmt;

/// A raw opcode byte as it appears at the start of a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Opcode(pub u8);

impl Opcode {
    /// Do nothing.
    pub const NOP: Opcode = Opcode(0x00);
    /// Load a command-processor register: `addr: u8`, `value: u32`.
    pub const LOAD_CP_REG: Opcode = Opcode(0x08);
    /// Load a run of transform registers: `ctrl: u32`, then `count` words.
    pub const LOAD_XF_REG: Opcode = Opcode(0x10);
    /// Indexed transform load through array A.
    pub const LOAD_INDX_A: Opcode = Opcode(0x20);
    /// Indexed transform load through array B.
    pub const LOAD_INDX_B: Opcode = Opcode(0x28);
    /// Indexed transform load through array C.
    pub const LOAD_INDX_C: Opcode = Opcode(0x30);
    /// Indexed transform load through array D.
    pub const LOAD_INDX_D: Opcode = Opcode(0x38);
    /// Execute a display list: `address: u32`, `length: u32`.
    pub const CALL_DISPLAYLIST: Opcode = Opcode(0x40);
    /// Invalidate the vertex cache.
    pub const INVALIDATE_VERTEX_CACHE: Opcode = Opcode(0x48);
    /// Load a blending-processor register: `addr << 24 | value` as one word.
    pub const LOAD_BP_REG: Opcode = Opcode(0x61);
    /// Draw quads (VAT 0).
    pub const DRAW_QUADS: Opcode = Opcode(0x80);
    /// Draw a triangle list (VAT 0).
    pub const DRAW_TRIANGLES: Opcode = Opcode(0x90);
    /// Draw a triangle strip (VAT 0).
    pub const DRAW_TRIANGLE_STRIP: Opcode = Opcode(0x98);
    /// Draw a triangle fan (VAT 0).
    pub const DRAW_TRIANGLE_FAN: Opcode = Opcode(0xA0);
    /// Draw a line list (VAT 0).
    pub const DRAW_LINES: Opcode = Opcode(0xA8);
    /// Draw a line strip (VAT 0).
    pub const DRAW_LINE_STRIP: Opcode = Opcode(0xB0);
    /// Draw points (VAT 0).
    pub const DRAW_POINTS: Opcode = Opcode(0xB8);

    /// The 5-bit opcode class (`byte >> 3`).
    pub fn class_index(self) -> u8 {
        self.0 >> 3
    }

    /// The vertex attribute table selector (`byte & 7`).
    pub fn vat(self) -> u8 {
        self.0 & 0x7
    }

    /// Whether the high bit is set, which marks a primitive draw.
    pub fn is_draw(self) -> bool {
        self.0 & 0x80 != 0
    }

    /// The same opcode with a different VAT selector.
    pub fn with_vat(self, vat: u8) -> Opcode {
        Opcode((self.0 & !0x7) | (vat & 0x7))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

impl From<u8> for Opcode {
    fn from(v: u8) -> Self {
        Self(v)
    }
}

/// Primitive topology selected by a draw opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// Independent quads.
    Quads,
    /// Independent triangles.
    Triangles,
    /// Triangle strip.
    TriangleStrip,
    /// Triangle fan.
    TriangleFan,
    /// Independent lines.
    Lines,
    /// Line strip.
    LineStrip,
    /// Points.
    Points,
}

impl Primitive {
    /// Every primitive, in opcode order.
    pub const ALL: [Primitive; 7] = [
        Primitive::Quads,
        Primitive::Triangles,
        Primitive::TriangleStrip,
        Primitive::TriangleFan,
        Primitive::Lines,
        Primitive::LineStrip,
        Primitive::Points,
    ];

    /// The draw opcode for this primitive, with VAT 0.
    pub fn opcode(self) -> Opcode {
        match self {
            Self::Quads => Opcode::DRAW_QUADS,
            Self::Triangles => Opcode::DRAW_TRIANGLES,
            Self::TriangleStrip => Opcode::DRAW_TRIANGLE_STRIP,
            Self::TriangleFan => Opcode::DRAW_TRIANGLE_FAN,
            Self::Lines => Opcode::DRAW_LINES,
            Self::LineStrip => Opcode::DRAW_LINE_STRIP,
            Self::Points => Opcode::DRAW_POINTS,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Quads => "quads",
            Self::Triangles => "triangles",
            Self::TriangleStrip => "triangle strip",
            Self::TriangleFan => "triangle fan",
            Self::Lines => "lines",
            Self::LineStrip => "line strip",
            Self::Points => "points",
        };
        f.write_str(name)
    }
}

/// Which indexed array an indexed transform load reads through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexedArray {
    /// Array A (position matrices).
    A,
    /// Array B (normal matrices).
    B,
    /// Array C (texture matrices).
    C,
    /// Array D (lights).
    D,
}

/// The closed set of command kinds the decoder can dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpcodeClass {
    /// No operation.
    Nop,
    /// Scalar command-processor register load.
    LoadCpReg,
    /// Bulk transform register load.
    LoadXfReg,
    /// Indexed transform register load.
    LoadIndexed(IndexedArray),
    /// Nested display-list invocation.
    CallDisplayList,
    /// Vertex cache invalidation.
    InvalidateVertexCache,
    /// Scalar direct blending-processor register load.
    LoadBpReg,
    /// Primitive draw.
    Draw(Primitive),
    /// No handler registered for this class.
    Unknown,
}

impl OpcodeClass {
    /// Total command length when it does not depend on operands.
    ///
    /// Returns `None` for variable-length commands (bulk loads and draws)
    /// and for [`OpcodeClass::Unknown`].
    pub fn fixed_length(self) -> Option<usize> {
        match self {
            Self::Nop | Self::InvalidateVertexCache => Some(1),
            Self::LoadCpReg => Some(6),
            Self::LoadIndexed(_) | Self::LoadBpReg => Some(5),
            Self::CallDisplayList => Some(9),
            Self::LoadXfReg | Self::Draw(_) | Self::Unknown => None,
        }
    }
}

/// Mapping from the 5-bit class index to an [`OpcodeClass`].
///
/// Built once at processor construction and never mutated afterwards.
/// Classes without a registered handler map to [`OpcodeClass::Unknown`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpcodeTable {
    entries: [OpcodeClass; OpcodeTable::CLASS_COUNT],
}

impl OpcodeTable {
    /// Number of opcode classes (5 bits).
    pub const CLASS_COUNT: usize = 32;

    /// A table where every class is unknown.
    pub fn empty() -> Self {
        Self {
            entries: [OpcodeClass::Unknown; Self::CLASS_COUNT],
        }
    }

    /// The standard table covering every command the hardware defines.
    pub fn new() -> Self {
        let mut table = Self::empty();
        table.register(Opcode::NOP, OpcodeClass::Nop);
        table.register(Opcode::LOAD_CP_REG, OpcodeClass::LoadCpReg);
        table.register(Opcode::LOAD_XF_REG, OpcodeClass::LoadXfReg);
        table.register(
            Opcode::LOAD_INDX_A,
            OpcodeClass::LoadIndexed(IndexedArray::A),
        );
        table.register(
            Opcode::LOAD_INDX_B,
            OpcodeClass::LoadIndexed(IndexedArray::B),
        );
        table.register(
            Opcode::LOAD_INDX_C,
            OpcodeClass::LoadIndexed(IndexedArray::C),
        );
        table.register(
            Opcode::LOAD_INDX_D,
            OpcodeClass::LoadIndexed(IndexedArray::D),
        );
        table.register(Opcode::CALL_DISPLAYLIST, OpcodeClass::CallDisplayList);
        table.register(
            Opcode::INVALIDATE_VERTEX_CACHE,
            OpcodeClass::InvalidateVertexCache,
        );
        table.register(Opcode::LOAD_BP_REG, OpcodeClass::LoadBpReg);
        for primitive in Primitive::ALL {
            table.register(primitive.opcode(), OpcodeClass::Draw(primitive));
        }
        table
    }

    /// Register `class` for the class index of `opcode`.
    pub fn register(&mut self, opcode: Opcode, class: OpcodeClass) {
        self.entries[opcode.class_index() as usize] = class;
    }

    /// Look up the class of an opcode byte.
    pub fn classify(&self, opcode: Opcode) -> OpcodeClass {
        self.entries[opcode.class_index() as usize]
    }

    /// Look up a class index directly. Indices are masked to 5 bits.
    pub fn get(&self, class_index: u8) -> OpcodeClass {
        self.entries[(class_index & 0x1F) as usize]
    }

    /// Number of populated (non-unknown) classes.
    pub fn populated(&self) -> usize {
        self.entries
            .iter()
            .filter(|c| !matches!(c, OpcodeClass::Unknown))
            .count()
    }
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_and_vat_split() {
        let op = Opcode(0x9D);
        assert_eq!(op.class_index(), 0x13);
        assert_eq!(op.vat(), 5);
        assert!(op.is_draw());
        assert_eq!(Opcode::DRAW_TRIANGLE_STRIP.with_vat(5), op);
    }

    #[test]
    fn standard_table_classifies_every_command() {
        let table = OpcodeTable::new();
        assert_eq!(table.classify(Opcode::NOP), OpcodeClass::Nop);
        assert_eq!(table.classify(Opcode::LOAD_CP_REG), OpcodeClass::LoadCpReg);
        assert_eq!(table.classify(Opcode::LOAD_XF_REG), OpcodeClass::LoadXfReg);
        assert_eq!(
            table.classify(Opcode::LOAD_INDX_C),
            OpcodeClass::LoadIndexed(IndexedArray::C)
        );
        assert_eq!(
            table.classify(Opcode::CALL_DISPLAYLIST),
            OpcodeClass::CallDisplayList
        );
        assert_eq!(
            table.classify(Opcode::INVALIDATE_VERTEX_CACHE),
            OpcodeClass::InvalidateVertexCache
        );
        assert_eq!(table.classify(Opcode::LOAD_BP_REG), OpcodeClass::LoadBpReg);
        assert_eq!(
            table.classify(Opcode(0xA3)),
            OpcodeClass::Draw(Primitive::TriangleFan)
        );
        assert_eq!(table.populated(), 17);
    }

    #[test]
    fn unpopulated_classes_are_unknown() {
        let table = OpcodeTable::new();
        // 0x18 (class 3), 0x88 (class 0x11) and 0xF8 (class 0x1F) have no handler.
        for byte in [0x18u8, 0x50, 0x58, 0x68, 0x78, 0x88, 0xC0, 0xF8] {
            assert_eq!(table.classify(Opcode(byte)), OpcodeClass::Unknown, "{byte:#04x}");
        }
    }

    #[test]
    fn load_bp_shares_class_with_any_vat() {
        let table = OpcodeTable::new();
        assert_eq!(table.classify(Opcode(0x60)), OpcodeClass::LoadBpReg);
        assert_eq!(table.classify(Opcode(0x67)), OpcodeClass::LoadBpReg);
    }

    #[test]
    fn fixed_lengths() {
        assert_eq!(OpcodeClass::Nop.fixed_length(), Some(1));
        assert_eq!(OpcodeClass::LoadCpReg.fixed_length(), Some(6));
        assert_eq!(OpcodeClass::LoadBpReg.fixed_length(), Some(5));
        assert_eq!(
            OpcodeClass::LoadIndexed(IndexedArray::A).fixed_length(),
            Some(5)
        );
        assert_eq!(OpcodeClass::CallDisplayList.fixed_length(), Some(9));
        assert_eq!(OpcodeClass::LoadXfReg.fixed_length(), None);
        assert_eq!(OpcodeClass::Draw(Primitive::Points).fixed_length(), None);
        assert_eq!(OpcodeClass::Unknown.fixed_length(), None);
    }

    #[test]
    fn empty_table_has_nothing() {
        let table = OpcodeTable::empty();
        assert_eq!(table.populated(), 0);
        assert_eq!(table.get(0), OpcodeClass::Unknown);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn classify_ignores_vat_bits(byte in any::<u8>(), vat in 0u8..8) {
                let table = OpcodeTable::new();
                let op = Opcode(byte);
                prop_assert_eq!(table.classify(op), table.classify(op.with_vat(vat)));
            }
        }
    }
}
