//! Decoded instruction representation.
//!
//! This module defines the structured form the decoder produces for each machine
//! instruction: the [`Instruction`] itself, its [`Operand`]s, [`Register`] identities,
//! the [`Opcode`] operation kind, branch [`Condition`] codes, and the [`FlowType`]
//! classification consumed by control-flow recovery. Instructions are immutable once
//! decoded; decoding the same bytes at the same address always yields an identical
//! value.

use crate::disassembler::flags::{flag_effects, FlagEffects};

/// Register index used for RIP-relative memory operands.
pub(crate) const REG_RIP: u8 = 16;
/// First index of the legacy high-byte registers (ah, ch, dh, bh).
pub(crate) const REG_HIGH_BYTE: u8 = 17;

static NAMES_64: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15",
];
static NAMES_32: [&str; 16] = [
    "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "r8d", "r9d", "r10d", "r11d", "r12d",
    "r13d", "r14d", "r15d",
];
static NAMES_16: [&str; 16] = [
    "ax", "cx", "dx", "bx", "sp", "bp", "si", "di", "r8w", "r9w", "r10w", "r11w", "r12w", "r13w",
    "r14w", "r15w",
];
static NAMES_8: [&str; 16] = [
    "al", "cl", "dl", "bl", "spl", "bpl", "sil", "dil", "r8b", "r9b", "r10b", "r11b", "r12b",
    "r13b", "r14b", "r15b",
];
static NAMES_8_HIGH: [&str; 4] = ["ah", "ch", "dh", "bh"];

/// A general-purpose register (or RIP) with its access width.
///
/// The identity combines the architectural register index (0 = rax family, 15 = r15)
/// with the operand width in bytes, so `al`, `ax`, `eax` and `rax` are distinct values
/// sharing index 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    /// Architectural register index (0..=15), [`REG_RIP`] or a high-byte encoding
    index: u8,
    /// Access width in bytes: 1, 2, 4 or 8
    size: u8,
}

impl Register {
    /// Creates a general-purpose register from its architectural index and width.
    #[must_use]
    pub(crate) fn gpr(index: u8, size: u8) -> Register {
        debug_assert!(index < 16);
        Register { index, size }
    }

    /// Creates an 8-bit register honoring the legacy high-byte encoding: without a REX
    /// prefix, indices 4..=7 address ah/ch/dh/bh instead of spl/bpl/sil/dil.
    #[must_use]
    pub(crate) fn gpr8(index: u8, has_rex: bool) -> Register {
        if !has_rex && (4..8).contains(&index) {
            Register {
                index: REG_HIGH_BYTE + (index - 4),
                size: 1,
            }
        } else {
            Register { index, size: 1 }
        }
    }

    /// The instruction pointer, used as the base of RIP-relative memory operands.
    #[must_use]
    pub(crate) fn rip() -> Register {
        Register {
            index: REG_RIP,
            size: 8,
        }
    }

    /// Returns the architectural index (0..=15), or [`REG_RIP`] / a high-byte encoding.
    #[must_use]
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Returns the access width in bytes.
    #[must_use]
    pub fn size(&self) -> u8 {
        self.size
    }

    /// Returns `true` for the instruction-pointer pseudo register.
    #[must_use]
    pub fn is_rip(&self) -> bool {
        self.index == REG_RIP
    }

    /// Returns the assembly name of this register.
    #[must_use]
    pub fn name(&self) -> &'static str {
        if self.index == REG_RIP {
            return "rip";
        }
        if self.index >= REG_HIGH_BYTE {
            return NAMES_8_HIGH[(self.index - REG_HIGH_BYTE) as usize];
        }

        let index = self.index as usize;
        match self.size {
            1 => NAMES_8[index],
            2 => NAMES_16[index],
            4 => NAMES_32[index],
            _ => NAMES_64[index],
        }
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Segment-override prefix attached to an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentPrefix {
    /// CS override (0x2E)
    Cs,
    /// SS override (0x36)
    Ss,
    /// DS override (0x3E)
    Ds,
    /// ES override (0x26)
    Es,
    /// FS override (0x64)
    Fs,
    /// GS override (0x65)
    Gs,
}

/// Legacy prefixes accumulated before the opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Prefixes {
    /// Operand-size override (0x66)
    pub operand_size: bool,
    /// Address-size override (0x67)
    pub address_size: bool,
    /// LOCK prefix (0xF0)
    pub lock: bool,
    /// REP/REPE prefix (0xF3)
    pub rep: bool,
    /// REPNE prefix (0xF2)
    pub repne: bool,
    /// Segment-override prefix, if any
    pub segment: Option<SegmentPrefix>,
}

/// One operand of a decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// A register operand
    Register(Register),
    /// An immediate value, sign-extended to 64 bits
    Immediate(i64),
    /// A memory reference with optional base/index and displacement.
    ///
    /// RIP-relative references carry [`Register::rip`] as base; their displacement is
    /// relative to the address of the next instruction.
    Memory {
        /// Base register, if present
        base: Option<Register>,
        /// Index register, if present
        index: Option<Register>,
        /// Index scale factor: 1, 2, 4 or 8
        scale: u8,
        /// Signed displacement
        displacement: i64,
    },
    /// The absolute virtual address of a direct branch or call target
    BranchTarget(u64),
}

/// Branch condition codes, in x86 encoding order (tttn nibble).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    /// Overflow (OF=1)
    O,
    /// Not overflow (OF=0)
    No,
    /// Below (CF=1, unsigned)
    B,
    /// Above or equal (CF=0, unsigned)
    Ae,
    /// Equal (ZF=1)
    E,
    /// Not equal (ZF=0)
    Ne,
    /// Below or equal (CF=1 or ZF=1, unsigned)
    Be,
    /// Above (CF=0 and ZF=0, unsigned)
    A,
    /// Sign (SF=1)
    S,
    /// Not sign (SF=0)
    Ns,
    /// Parity (PF=1)
    P,
    /// Not parity (PF=0)
    Np,
    /// Less (SF!=OF, signed)
    L,
    /// Greater or equal (SF=OF, signed)
    Ge,
    /// Less or equal (ZF=1 or SF!=OF, signed)
    Le,
    /// Greater (ZF=0 and SF=OF, signed)
    G,
}

impl Condition {
    /// Decodes a condition from the low nibble of a Jcc/SETcc/CMOVcc opcode.
    #[must_use]
    pub fn from_nibble(nibble: u8) -> Condition {
        match nibble & 0xF {
            0x0 => Condition::O,
            0x1 => Condition::No,
            0x2 => Condition::B,
            0x3 => Condition::Ae,
            0x4 => Condition::E,
            0x5 => Condition::Ne,
            0x6 => Condition::Be,
            0x7 => Condition::A,
            0x8 => Condition::S,
            0x9 => Condition::Ns,
            0xA => Condition::P,
            0xB => Condition::Np,
            0xC => Condition::L,
            0xD => Condition::Ge,
            0xE => Condition::Le,
            _ => Condition::G,
        }
    }

    /// Returns the mnemonic suffix for this condition (`e` in `je`, `ne` in `jne`).
    #[must_use]
    pub fn suffix(&self) -> &'static str {
        match self {
            Condition::O => "o",
            Condition::No => "no",
            Condition::B => "b",
            Condition::Ae => "ae",
            Condition::E => "e",
            Condition::Ne => "ne",
            Condition::Be => "be",
            Condition::A => "a",
            Condition::S => "s",
            Condition::Ns => "ns",
            Condition::P => "p",
            Condition::Np => "np",
            Condition::L => "l",
            Condition::Ge => "ge",
            Condition::Le => "le",
            Condition::G => "g",
        }
    }
}

/// The operation kind of a decoded instruction.
///
/// Every variant the decoder can produce has a flag-effects entry in
/// [`crate::disassembler::flags::flag_effects`]; adding a variant here forces an
/// explicit semantics entry there (the match is exhaustive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Opcode {
    // Data movement
    Mov,
    Movzx,
    Movsx,
    Movsxd,
    Lea,
    Xchg,
    Push,
    Pop,
    Pushf,
    Popf,
    // ALU
    Add,
    Or,
    Adc,
    Sbb,
    And,
    Sub,
    Xor,
    Cmp,
    Test,
    Inc,
    Dec,
    Neg,
    Not,
    Mul,
    Imul,
    Div,
    Idiv,
    // Shifts and rotates
    Shl,
    Shr,
    Sar,
    Rol,
    Ror,
    Rcl,
    Rcr,
    // Sign extension of the accumulator
    Cbw,
    Cdq,
    // Conditional data movement
    Setcc,
    Cmovcc,
    // Control flow
    Jmp,
    Jcc,
    Jrcxz,
    Loop,
    Loope,
    Loopne,
    Call,
    Ret,
    Leave,
    // String operations
    Movs,
    Stos,
    Lods,
    Scas,
    Cmps,
    // Flag manipulation
    Clc,
    Stc,
    Cmc,
    Cld,
    Std,
    Cli,
    Sti,
    Sahf,
    Lahf,
    // System / miscellaneous
    Nop,
    Int3,
    Int,
    Hlt,
    Ud2,
    Cpuid,
    Syscall,
    Endbr64,
}

/// How an instruction affects control flow, as consumed by the recoverer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Execution continues at the next instruction
    Sequential,
    /// Two-way branch: taken target plus fallthrough
    ConditionalBranch,
    /// One-way branch to a known target
    UnconditionalBranch,
    /// One-way branch through a register or memory operand; target unknown
    IndirectBranch,
    /// Call to a known target; execution resumes at the next instruction
    Call,
    /// Call through a register or memory operand; execution resumes at the next
    /// instruction
    IndirectCall,
    /// Return to the caller; this path terminates
    Return,
    /// Execution cannot meaningfully continue (hlt, ud2, int3 padding)
    Terminal,
}

/// A single decoded machine instruction.
///
/// Immutable once produced. Equality covers every decoded field, which is what the
/// instruction cache relies on: re-decoding the same address over the same bytes must
/// compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Virtual address of the first instruction byte
    pub address: u64,
    /// Encoded length in bytes (1..=15)
    pub size: u8,
    /// Operation kind
    pub opcode: Opcode,
    /// Condition code for Jcc/SETcc/CMOVcc, `None` otherwise
    pub condition: Option<Condition>,
    /// Operands in Intel order (destination first)
    pub operands: Vec<Operand>,
    /// Legacy prefixes present on the encoding
    pub prefixes: Prefixes,
    /// Effective operand size in bytes (1, 2, 4 or 8)
    pub operand_size: u8,
}

impl Instruction {
    /// Returns the virtual address of the following instruction.
    #[must_use]
    pub fn next_address(&self) -> u64 {
        self.address + u64::from(self.size)
    }

    /// Returns the direct branch or call target, if this instruction has one.
    #[must_use]
    pub fn branch_target(&self) -> Option<u64> {
        self.operands.iter().find_map(|operand| match operand {
            Operand::BranchTarget(target) => Some(*target),
            _ => None,
        })
    }

    /// Classifies this instruction's effect on control flow.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        match self.opcode {
            Opcode::Jmp => {
                if self.branch_target().is_some() {
                    FlowType::UnconditionalBranch
                } else {
                    FlowType::IndirectBranch
                }
            }
            Opcode::Jcc | Opcode::Jrcxz | Opcode::Loop | Opcode::Loope | Opcode::Loopne => {
                FlowType::ConditionalBranch
            }
            Opcode::Call => {
                if self.branch_target().is_some() {
                    FlowType::Call
                } else {
                    FlowType::IndirectCall
                }
            }
            Opcode::Ret => FlowType::Return,
            Opcode::Int3 | Opcode::Hlt | Opcode::Ud2 => FlowType::Terminal,
            _ => FlowType::Sequential,
        }
    }

    /// Returns the flag read/write/clobber sets of this instruction.
    #[must_use]
    pub fn flag_effects(&self) -> FlagEffects {
        flag_effects(self.opcode, self.condition)
    }

    /// Returns the mnemonic of this instruction, e.g. `mov` or `jne`.
    #[must_use]
    pub fn mnemonic(&self) -> String {
        let base = match self.opcode {
            Opcode::Jcc => {
                return format!("j{}", self.condition.map_or("??", |c| c.suffix()));
            }
            Opcode::Setcc => {
                return format!("set{}", self.condition.map_or("??", |c| c.suffix()));
            }
            Opcode::Cmovcc => {
                return format!("cmov{}", self.condition.map_or("??", |c| c.suffix()));
            }
            Opcode::Cbw => match self.operand_size {
                2 => "cbw",
                4 => "cwde",
                _ => "cdqe",
            },
            Opcode::Cdq => match self.operand_size {
                2 => "cwd",
                4 => "cdq",
                _ => "cqo",
            },
            Opcode::Mov => "mov",
            Opcode::Movzx => "movzx",
            Opcode::Movsx => "movsx",
            Opcode::Movsxd => "movsxd",
            Opcode::Lea => "lea",
            Opcode::Xchg => "xchg",
            Opcode::Push => "push",
            Opcode::Pop => "pop",
            Opcode::Pushf => "pushfq",
            Opcode::Popf => "popfq",
            Opcode::Add => "add",
            Opcode::Or => "or",
            Opcode::Adc => "adc",
            Opcode::Sbb => "sbb",
            Opcode::And => "and",
            Opcode::Sub => "sub",
            Opcode::Xor => "xor",
            Opcode::Cmp => "cmp",
            Opcode::Test => "test",
            Opcode::Inc => "inc",
            Opcode::Dec => "dec",
            Opcode::Neg => "neg",
            Opcode::Not => "not",
            Opcode::Mul => "mul",
            Opcode::Imul => "imul",
            Opcode::Div => "div",
            Opcode::Idiv => "idiv",
            Opcode::Shl => "shl",
            Opcode::Shr => "shr",
            Opcode::Sar => "sar",
            Opcode::Rol => "rol",
            Opcode::Ror => "ror",
            Opcode::Rcl => "rcl",
            Opcode::Rcr => "rcr",
            Opcode::Jmp => "jmp",
            Opcode::Jrcxz => "jrcxz",
            Opcode::Loop => "loop",
            Opcode::Loope => "loope",
            Opcode::Loopne => "loopne",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
            Opcode::Leave => "leave",
            Opcode::Movs => "movs",
            Opcode::Stos => "stos",
            Opcode::Lods => "lods",
            Opcode::Scas => "scas",
            Opcode::Cmps => "cmps",
            Opcode::Clc => "clc",
            Opcode::Stc => "stc",
            Opcode::Cmc => "cmc",
            Opcode::Cld => "cld",
            Opcode::Std => "std",
            Opcode::Cli => "cli",
            Opcode::Sti => "sti",
            Opcode::Sahf => "sahf",
            Opcode::Lahf => "lahf",
            Opcode::Nop => "nop",
            Opcode::Int3 => "int3",
            Opcode::Int => "int",
            Opcode::Hlt => "hlt",
            Opcode::Ud2 => "ud2",
            Opcode::Cpuid => "cpuid",
            Opcode::Syscall => "syscall",
            Opcode::Endbr64 => "endbr64",
        };

        if self.prefixes.rep
            && matches!(
                self.opcode,
                Opcode::Movs | Opcode::Stos | Opcode::Lods | Opcode::Scas | Opcode::Cmps
            )
        {
            format!("rep {}", base)
        } else {
            base.to_string()
        }
    }
}
