// Default VCDIFF instruction code table (RFC 3284, Section 5.6).
//
// 256 opcodes, each describing one or two half-instructions. A size of 0
// means the real size follows the opcode as a varint.

use std::sync::LazyLock;

/// Number of NEAR address-cache slots in the default table.
pub const NEAR_SLOTS: usize = 4;
/// Number of SAME address-cache groups in the default table.
pub const SAME_GROUPS: usize = 3;
/// SELF + HERE + NEAR + SAME.
pub const COPY_MODES: u8 = (2 + NEAR_SLOTS + SAME_GROUPS) as u8;
/// Shortest COPY the table can express with an implicit size.
pub const MIN_COPY: u32 = 4;

/// One half of an opcode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Op {
    #[default]
    Noop,
    Add,
    Run,
    /// COPY with the given address mode.
    Copy(u8),
}

/// A code table entry: two half-instructions and their implicit sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Opcode {
    pub op1: Op,
    pub size1: u8,
    pub op2: Op,
    pub size2: u8,
}

impl Opcode {
    const fn single(op: Op, size: u8) -> Self {
        Self {
            op1: op,
            size1: size,
            op2: Op::Noop,
            size2: 0,
        }
    }

    const fn double(op1: Op, size1: u8, op2: Op, size2: u8) -> Self {
        Self {
            op1,
            size1,
            op2,
            size2,
        }
    }
}

pub type CodeTable = [Opcode; 256];

fn build() -> CodeTable {
    let mut table = [Opcode::default(); 256];
    let mut next = 0usize;
    let mut put = |entry: Opcode| {
        table[next] = entry;
        next += 1;
    };

    put(Opcode::single(Op::Run, 0));
    for size in 0..=17 {
        put(Opcode::single(Op::Add, size));
    }
    for mode in 0..COPY_MODES {
        put(Opcode::single(Op::Copy(mode), 0));
        for size in 4..=18 {
            put(Opcode::single(Op::Copy(mode), size));
        }
    }
    // ADD(1..4) followed by COPY: sizes 4..6 for SELF/HERE/NEAR, 4 for SAME.
    for mode in 0..COPY_MODES {
        let copy_max = if mode < 6 { 6 } else { 4 };
        for add in 1..=4 {
            for copy in 4..=copy_max {
                put(Opcode::double(Op::Add, add, Op::Copy(mode), copy));
            }
        }
    }
    // COPY(4) followed by ADD(1).
    for mode in 0..COPY_MODES {
        put(Opcode::double(Op::Copy(mode), 4, Op::Add, 1));
    }

    debug_assert_eq!(next, 256);
    table
}

/// The shared default code table.
pub fn default_table() -> &'static CodeTable {
    static TABLE: LazyLock<CodeTable> = LazyLock::new(build);
    &TABLE
}

/// Opcode for a single instruction; `size_inline` tells whether the size
/// must follow as a varint.
pub fn single_opcode(op: Op, size: u32) -> (u8, bool) {
    match op {
        Op::Run => (0, true),
        Op::Add if (1..=17).contains(&size) => (1 + size as u8, false),
        Op::Add => (1, true),
        Op::Copy(mode) if (MIN_COPY..=18).contains(&size) => (19 + 16 * mode + (size as u8 - 3), false),
        Op::Copy(mode) => (19 + 16 * mode, true),
        Op::Noop => unreachable!("noop has no opcode"),
    }
}

/// Opcode merging `first` and `second` into one byte, if the table has one.
pub fn double_opcode(first: (Op, u32), second: (Op, u32)) -> Option<u8> {
    match (first, second) {
        ((Op::Add, add), (Op::Copy(mode), copy)) if (1..=4).contains(&add) => {
            if mode < 6 && (4..=6).contains(&copy) {
                Some(163 + 12 * mode + 3 * (add as u8 - 1) + (copy as u8 - 4))
            } else if mode >= 6 && copy == 4 {
                Some(235 + 4 * (mode - 6) + (add as u8 - 1))
            } else {
                None
            }
        }
        ((Op::Copy(mode), 4), (Op::Add, 1)) => Some(247 + mode),
        _ => None,
    }
}
