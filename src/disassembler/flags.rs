//! EFLAGS semantics for the decoded instruction set.
//!
//! Every opcode the decoder can produce has an entry in [`flag_effects`] describing
//! three disjoint roles: the flags an instruction *reads*, the flags it *writes* to a
//! defined value, and the flags it leaves *undefined* (clobbered). Consumers that
//! track flag liveness must treat clobbered flags as killed without producing a
//! usable value; a flag absent from all three sets passes through unchanged.
//!
//! The match over [`Opcode`] is exhaustive on purpose: extending the decoder with a
//! new opcode will not compile until its flag semantics are stated here.

use bitflags::bitflags;

use crate::disassembler::instruction::{Condition, Opcode};

bitflags! {
    /// The EFLAGS bits tracked by the analysis, at their architectural bit positions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u16 {
        /// Carry flag
        const CF = 0x0001;
        /// Parity flag
        const PF = 0x0004;
        /// Auxiliary carry flag
        const AF = 0x0010;
        /// Zero flag
        const ZF = 0x0040;
        /// Sign flag
        const SF = 0x0080;
        /// Trap flag
        const TF = 0x0100;
        /// Interrupt enable flag
        const IF = 0x0200;
        /// Direction flag
        const DF = 0x0400;
        /// Overflow flag
        const OF = 0x0800;
    }
}

/// The full arithmetic status group written by add/sub-class instructions.
const ARITH: Flags = Flags::OF
    .union(Flags::SF)
    .union(Flags::ZF)
    .union(Flags::AF)
    .union(Flags::PF)
    .union(Flags::CF);

/// The status flags restored by `sahf` and captured by `lahf`.
const LAHF_GROUP: Flags = Flags::SF
    .union(Flags::ZF)
    .union(Flags::AF)
    .union(Flags::PF)
    .union(Flags::CF);

/// Flag read/write/clobber sets of one instruction.
///
/// The three sets are pairwise disjoint for every opcode this crate produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagEffects {
    /// Flags whose current value the instruction consumes
    pub read: Flags,
    /// Flags set to a defined value
    pub written: Flags,
    /// Flags left with an undefined value
    pub clobbered: Flags,
}

impl FlagEffects {
    const NONE: FlagEffects = FlagEffects {
        read: Flags::empty(),
        written: Flags::empty(),
        clobbered: Flags::empty(),
    };

    fn written(written: Flags) -> FlagEffects {
        FlagEffects {
            read: Flags::empty(),
            written,
            clobbered: Flags::empty(),
        }
    }

    fn read(read: Flags) -> FlagEffects {
        FlagEffects {
            read,
            written: Flags::empty(),
            clobbered: Flags::empty(),
        }
    }

    /// Returns `true` if the instruction touches no flags at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read.is_empty() && self.written.is_empty() && self.clobbered.is_empty()
    }
}

/// Returns the flags a condition code tests.
#[must_use]
pub fn condition_reads(condition: Condition) -> Flags {
    match condition {
        Condition::O | Condition::No => Flags::OF,
        Condition::B | Condition::Ae => Flags::CF,
        Condition::E | Condition::Ne => Flags::ZF,
        Condition::Be | Condition::A => Flags::CF | Flags::ZF,
        Condition::S | Condition::Ns => Flags::SF,
        Condition::P | Condition::Np => Flags::PF,
        Condition::L | Condition::Ge => Flags::SF | Flags::OF,
        Condition::Le | Condition::G => Flags::ZF | Flags::SF | Flags::OF,
    }
}

/// Returns the flag effects of `opcode`, with `condition` supplying the tested flags
/// for the conditional families (Jcc, SETcc, CMOVcc).
#[must_use]
pub fn flag_effects(opcode: Opcode, condition: Option<Condition>) -> FlagEffects {
    match opcode {
        // Plain data movement and control transfers leave the flags alone.
        Opcode::Mov
        | Opcode::Movzx
        | Opcode::Movsx
        | Opcode::Movsxd
        | Opcode::Lea
        | Opcode::Xchg
        | Opcode::Push
        | Opcode::Pop
        | Opcode::Cbw
        | Opcode::Cdq
        | Opcode::Jmp
        | Opcode::Call
        | Opcode::Ret
        | Opcode::Leave
        | Opcode::Nop
        | Opcode::Hlt
        | Opcode::Ud2
        | Opcode::Endbr64
        | Opcode::Syscall
        | Opcode::Cpuid => FlagEffects::NONE,

        Opcode::Add | Opcode::Sub | Opcode::Cmp | Opcode::Neg => FlagEffects::written(ARITH),

        Opcode::Adc | Opcode::Sbb => FlagEffects {
            read: Flags::CF,
            written: ARITH,
            clobbered: Flags::empty(),
        },

        Opcode::And | Opcode::Or | Opcode::Xor | Opcode::Test => FlagEffects {
            read: Flags::empty(),
            written: Flags::OF | Flags::SF | Flags::ZF | Flags::PF | Flags::CF,
            clobbered: Flags::AF,
        },

        // inc/dec preserve CF.
        Opcode::Inc | Opcode::Dec => {
            FlagEffects::written(Flags::OF | Flags::SF | Flags::ZF | Flags::AF | Flags::PF)
        }

        Opcode::Not => FlagEffects::NONE,

        Opcode::Mul | Opcode::Imul => FlagEffects {
            read: Flags::empty(),
            written: Flags::CF | Flags::OF,
            clobbered: Flags::SF | Flags::ZF | Flags::AF | Flags::PF,
        },

        Opcode::Div | Opcode::Idiv => FlagEffects {
            read: Flags::empty(),
            written: Flags::empty(),
            clobbered: ARITH,
        },

        // OF is only defined for 1-bit shifts; treated as clobbered across the group.
        Opcode::Shl | Opcode::Shr | Opcode::Sar => FlagEffects {
            read: Flags::empty(),
            written: Flags::CF | Flags::SF | Flags::ZF | Flags::PF,
            clobbered: Flags::AF | Flags::OF,
        },

        Opcode::Rol | Opcode::Ror => FlagEffects {
            read: Flags::empty(),
            written: Flags::CF,
            clobbered: Flags::OF,
        },

        Opcode::Rcl | Opcode::Rcr => FlagEffects {
            read: Flags::CF,
            written: Flags::CF,
            clobbered: Flags::OF,
        },

        Opcode::Jcc | Opcode::Setcc | Opcode::Cmovcc => {
            FlagEffects::read(condition.map_or(Flags::empty(), condition_reads))
        }

        Opcode::Jrcxz => FlagEffects::NONE,
        Opcode::Loop => FlagEffects::NONE,
        Opcode::Loope | Opcode::Loopne => FlagEffects::read(Flags::ZF),

        // String compares write the arithmetic group; all string ops step by DF.
        Opcode::Cmps | Opcode::Scas => FlagEffects {
            read: Flags::DF,
            written: ARITH,
            clobbered: Flags::empty(),
        },
        Opcode::Movs | Opcode::Stos | Opcode::Lods => FlagEffects::read(Flags::DF),

        Opcode::Clc | Opcode::Stc => FlagEffects::written(Flags::CF),
        Opcode::Cmc => FlagEffects {
            read: Flags::CF,
            written: Flags::CF,
            clobbered: Flags::empty(),
        },
        Opcode::Cld | Opcode::Std => FlagEffects::written(Flags::DF),
        Opcode::Cli | Opcode::Sti => FlagEffects::written(Flags::IF),

        Opcode::Sahf => FlagEffects::written(LAHF_GROUP),
        Opcode::Lahf => FlagEffects::read(LAHF_GROUP),

        Opcode::Pushf => FlagEffects::read(ARITH | Flags::TF | Flags::IF | Flags::DF),
        Opcode::Popf => FlagEffects::written(ARITH | Flags::TF | Flags::IF | Flags::DF),

        // Software interrupts clear TF and (for external handlers) IF on entry.
        Opcode::Int | Opcode::Int3 => FlagEffects::written(Flags::TF | Flags::IF),
    }
}
