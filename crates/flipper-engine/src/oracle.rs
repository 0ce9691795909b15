//! Command-length oracle.
//!
//! Decides, without consuming anything, whether the next command is fully
//! present and how long it is. Some lengths are only known after the
//! header has arrived (bulk register loads and draws), so the answer may
//! be refined over several polls.

use flipper_core::{OpcodeClass, OpcodeTable, PeekSource, VertexFormat};

/// Header length of a bulk transform load (opcode + control word).
const XF_HEADER: usize = 5;
/// Header length of a draw (opcode + vertex count).
const DRAW_HEADER: usize = 3;

/// Readiness of the next command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandLength {
    /// The whole command is present and is this many bytes long.
    Ready(usize),
    /// At least this many bytes are needed before the command can be
    /// decoded (or its length refined).
    Incomplete(usize),
    /// No bytes at all.
    Empty,
    /// The opcode's class has no handler.
    Unknown,
}

impl CommandLength {
    /// The ready length, if any.
    pub fn ready(self) -> Option<usize> {
        match self {
            Self::Ready(len) => Some(len),
            _ => None,
        }
    }
}

/// Compute the length of the command at the front of `source`.
///
/// `available == required` counts as ready. Draw lengths consult
/// `format.vertex_size(vat)` at the time of the call.
pub fn command_length<S, V>(source: &S, table: &OpcodeTable, format: &V) -> CommandLength
where
    S: PeekSource + ?Sized,
    V: VertexFormat + ?Sized,
{
    let available = source.available();
    if available == 0 {
        return CommandLength::Empty;
    }
    let opcode = flipper_core::Opcode(source.peek_u8(0));
    let class = table.classify(opcode);

    let required = match class {
        OpcodeClass::Unknown => return CommandLength::Unknown,
        OpcodeClass::LoadXfReg => {
            if available < XF_HEADER {
                return CommandLength::Incomplete(XF_HEADER);
            }
            let count = (source.peek_u32(1) >> 16) as usize + 1;
            XF_HEADER + 4 * count
        }
        OpcodeClass::Draw(_) => {
            if available < DRAW_HEADER {
                return CommandLength::Incomplete(DRAW_HEADER);
            }
            let count = source.peek_u16(1) as usize;
            let size = format.vertex_size(opcode.vat()) as usize;
            DRAW_HEADER.saturating_add(count.saturating_mul(size))
        }
        fixed => match fixed.fixed_length() {
            Some(len) => len,
            None => return CommandLength::Unknown,
        },
    };

    if available >= required {
        CommandLength::Ready(required)
    } else {
        CommandLength::Incomplete(required)
    }
}

/// [`command_length`] with a cached pending requirement.
///
/// While a previously computed requirement still exceeds the available
/// byte count, [`LengthOracle::check`] answers without peeking.
#[derive(Clone, Debug, Default)]
pub struct LengthOracle {
    pending: Option<usize>,
}

impl LengthOracle {
    /// An oracle with no cached requirement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the command at the front of `source`.
    pub fn check<S, V>(&mut self, source: &S, table: &OpcodeTable, format: &V) -> CommandLength
    where
        S: PeekSource + ?Sized,
        V: VertexFormat + ?Sized,
    {
        if let Some(required) = self.pending {
            if source.available() < required {
                return CommandLength::Incomplete(required);
            }
        }
        let result = command_length(source, table, format);
        self.pending = match result {
            CommandLength::Incomplete(required) => Some(required),
            _ => None,
        };
        result
    }

    /// The cached requirement, if any.
    pub fn pending(&self) -> Option<usize> {
        self.pending
    }

    /// Forget the cached requirement. Called after every decoded command,
    /// on buffer reset and on recovery.
    pub fn invalidate(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSize(u32);

    impl VertexFormat for FixedSize {
        fn vertex_size(&self, _vat: u8) -> u32 {
            self.0
        }
    }

    fn len(bytes: &[u8]) -> CommandLength {
        command_length(&bytes, &OpcodeTable::new(), &FixedSize(12))
    }

    #[test]
    fn empty_source() {
        assert_eq!(len(&[]), CommandLength::Empty);
    }

    #[test]
    fn single_byte_commands_always_ready() {
        assert_eq!(len(&[0x00]), CommandLength::Ready(1));
        assert_eq!(len(&[0x48]), CommandLength::Ready(1));
    }

    #[test]
    fn load_cp_five_of_six_bytes() {
        assert_eq!(
            len(&[0x08, 0x30, 0x00, 0x00, 0x00]),
            CommandLength::Incomplete(6)
        );
        assert_eq!(
            len(&[0x08, 0x30, 0x00, 0x00, 0x00, 0x01]),
            CommandLength::Ready(6)
        );
    }

    #[test]
    fn load_bp_ready_at_five_bytes() {
        assert_eq!(len(&[0x61, 0x45, 0x00]), CommandLength::Incomplete(5));
        assert_eq!(len(&[0x61, 0x45, 0x00, 0x00, 0x01]), CommandLength::Ready(5));
    }

    #[test]
    fn indexed_and_call_are_fixed() {
        assert_eq!(len(&[0x28, 0, 1, 0x30, 0x40]), CommandLength::Ready(5));
        assert_eq!(len(&[0x40, 0, 0, 0x10, 0]), CommandLength::Incomplete(9));
    }

    #[test]
    fn xf_count_zero_needs_nine() {
        let header = [0x10, 0x00, 0x00, 0x10, 0x00];
        assert_eq!(len(&header[..3]), CommandLength::Incomplete(5));
        assert_eq!(len(&header), CommandLength::Incomplete(9));
        let mut full = header.to_vec();
        full.extend_from_slice(&[0, 0, 0, 1]);
        assert_eq!(len(&full), CommandLength::Ready(9));
    }

    #[test]
    fn xf_count_uses_high_half() {
        // count - 1 = 0x0011 → 18 words.
        let bytes = [0x10, 0x00, 0x11, 0x10, 0x00];
        assert_eq!(len(&bytes), CommandLength::Incomplete(5 + 4 * 18));
    }

    #[test]
    fn draw_length_uses_vertex_size() {
        assert_eq!(len(&[0x90, 0x00]), CommandLength::Incomplete(3));
        assert_eq!(len(&[0x90, 0x00, 0x03]), CommandLength::Incomplete(3 + 36));
        assert_eq!(len(&[0x90, 0x00, 0x00]), CommandLength::Ready(3));
    }

    #[test]
    fn unknown_classes() {
        assert_eq!(len(&[0x18, 0, 0]), CommandLength::Unknown);
        assert_eq!(len(&[0x88]), CommandLength::Unknown);
    }

    #[test]
    fn high_bit_without_draw_class_is_unknown() {
        // A set high bit alone does not make a draw.
        for op in [0x88u8, 0xC0, 0xC8, 0xD0, 0xD8, 0xE0, 0xE8, 0xF0, 0xF8] {
            assert_eq!(len(&[op, 0x00, 0x01]), CommandLength::Unknown, "{op:#04x}");
        }
    }

    #[test]
    fn oracle_caches_until_enough_bytes() {
        let table = OpcodeTable::new();
        let format = FixedSize(4);
        let mut oracle = LengthOracle::new();

        let partial: &[u8] = &[0x08, 0x30];
        assert_eq!(
            oracle.check(&partial, &table, &format),
            CommandLength::Incomplete(6)
        );
        assert_eq!(oracle.pending(), Some(6));

        // Even with a different opcode in front, the cache answers while
        // the byte count is short.
        let other: &[u8] = &[0x00];
        assert_eq!(
            oracle.check(&other, &table, &format),
            CommandLength::Incomplete(6)
        );

        let full: &[u8] = &[0x08, 0x30, 0, 0, 0, 1];
        assert_eq!(oracle.check(&full, &table, &format), CommandLength::Ready(6));
        assert_eq!(oracle.pending(), None);
    }

    #[test]
    fn oracle_refines_xf_requirement() {
        let table = OpcodeTable::new();
        let format = FixedSize(4);
        let mut oracle = LengthOracle::new();
        let header: &[u8] = &[0x10, 0x00, 0x01, 0x10, 0x00];
        assert_eq!(
            oracle.check(&&header[..2], &table, &format),
            CommandLength::Incomplete(5)
        );
        assert_eq!(
            oracle.check(&header, &table, &format),
            CommandLength::Incomplete(13)
        );
        oracle.invalidate();
        assert_eq!(oracle.pending(), None);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn ready_never_exceeds_available(
                bytes in proptest::collection::vec(any::<u8>(), 0..64),
                vsize in 0u32..16,
            ) {
                let src: &[u8] = &bytes;
                match command_length(&src, &OpcodeTable::new(), &FixedSize(vsize)) {
                    CommandLength::Ready(n) => {
                        prop_assert!(n >= 1);
                        prop_assert!(n <= bytes.len());
                    }
                    CommandLength::Incomplete(n) => prop_assert!(n > bytes.len()),
                    CommandLength::Empty => prop_assert!(bytes.is_empty()),
                    CommandLength::Unknown => prop_assert!(!bytes.is_empty()),
                }
            }

            #[test]
            fn ready_once_enough_bytes(extra in proptest::collection::vec(any::<u8>(), 0..8)) {
                // A LOAD_CP followed by arbitrary trailing bytes is always ready.
                let mut bytes = vec![0x08, 1, 2, 3, 4, 5];
                bytes.extend(extra);
                let src: &[u8] = &bytes;
                prop_assert_eq!(
                    command_length(&src, &OpcodeTable::new(), &FixedSize(0)),
                    CommandLength::Ready(6)
                );
            }
        }
    }
}
