//! Hand-written x86-64 instruction decoder.
//!
//! [`decode_instruction`] consumes bytes from a [`Parser`] and produces one
//! [`Instruction`]. The decoder is a pure function of the input bytes and the given
//! virtual address: it never consults the segment map or any analysis state, and
//! decoding the same bytes at the same address always yields the same value. Direct
//! branch targets are resolved to absolute virtual addresses during decoding; the
//! address influences nothing else.
//!
//! The supported subset covers the integer core of the architecture: data movement,
//! the ALU groups, shifts and rotates, multiply/divide, conditional sets and moves,
//! string operations, flag manipulation, and every control-transfer form the recoverer
//! distinguishes. Unknown opcodes fail with [`crate::Error::InvalidInstruction`]
//! rather than guessing; truncated encodings fail with
//! [`crate::Error::OutOfBounds`] from the underlying parser.

use crate::{
    disassembler::instruction::{
        Condition, Instruction, Opcode, Operand, Prefixes, Register, SegmentPrefix,
    },
    file::Parser,
    Result,
};

/// Longest legal x86-64 encoding; anything beyond is rejected by the hardware too.
pub const MAX_INSTRUCTION_LEN: usize = 15;

const ALU_OPS: [Opcode; 8] = [
    Opcode::Add,
    Opcode::Or,
    Opcode::Adc,
    Opcode::Sbb,
    Opcode::And,
    Opcode::Sub,
    Opcode::Xor,
    Opcode::Cmp,
];

const SHIFT_OPS: [Opcode; 8] = [
    Opcode::Rol,
    Opcode::Ror,
    Opcode::Rcl,
    Opcode::Rcr,
    Opcode::Shl,
    Opcode::Shr,
    Opcode::Shl, // encoding 6 (sal) aliases shl
    Opcode::Sar,
];

#[derive(Debug, Clone, Copy, Default)]
struct Rex {
    present: bool,
    w: bool,
    r: bool,
    x: bool,
    b: bool,
}

impl Rex {
    fn from_byte(byte: u8) -> Rex {
        Rex {
            present: true,
            w: byte & 0x8 != 0,
            r: byte & 0x4 != 0,
            x: byte & 0x2 != 0,
            b: byte & 0x1 != 0,
        }
    }
}

/// Decoding state for a single instruction: the cursor plus the prefix bytes
/// consumed so far.
struct Decoder<'a, 'p> {
    parser: &'p mut Parser<'a>,
    address: u64,
    start: usize,
    prefixes: Prefixes,
    rex: Rex,
}

impl<'a, 'p> Decoder<'a, 'p> {
    fn invalid(&self) -> crate::Error {
        crate::Error::InvalidInstruction {
            address: self.address,
        }
    }

    fn consumed(&self) -> usize {
        self.parser.pos() - self.start
    }

    /// Effective operand size in bytes, from REX.W and the 0x66 prefix.
    fn opsize(&self) -> u8 {
        if self.rex.w {
            8
        } else if self.prefixes.operand_size {
            2
        } else {
            4
        }
    }

    /// Operand size for push/pop forms, which default to 64 bits.
    fn stack_opsize(&self) -> u8 {
        if self.prefixes.operand_size {
            2
        } else {
            8
        }
    }

    fn read_u8(&mut self) -> Result<u8> {
        self.parser.read_le::<u8>()
    }

    /// Reads a little-endian immediate of `size` bytes, sign-extended to 64 bits.
    fn read_imm(&mut self, size: u8) -> Result<i64> {
        Ok(match size {
            1 => i64::from(self.parser.read_le::<i8>()?),
            2 => i64::from(self.parser.read_le::<i16>()?),
            4 => i64::from(self.parser.read_le::<i32>()?),
            _ => self.parser.read_le::<i64>()?,
        })
    }

    /// Immediate size for the `Iz` operand form: 16-bit with the 0x66 prefix,
    /// otherwise 32-bit (sign-extended for 64-bit operations).
    fn imm_size_z(&self) -> u8 {
        if self.opsize() == 2 {
            2
        } else {
            4
        }
    }

    /// Reads a relative displacement and resolves it against the address of the next
    /// instruction.
    fn rel_target(&mut self, size: u8) -> Result<Operand> {
        let rel = self.read_imm(size)?;
        let next = self.address.wrapping_add(self.consumed() as u64);
        Ok(Operand::BranchTarget(next.wrapping_add(rel as u64)))
    }

    /// Builds a register operand from a ModRM reg/rm field (with the REX extension
    /// bit already folded in).
    fn reg(&self, bits: u8, size: u8) -> Operand {
        if size == 1 {
            Operand::Register(Register::gpr8(bits, self.rex.present))
        } else {
            Operand::Register(Register::gpr(bits, size))
        }
    }

    /// Decodes a ModRM byte (and SIB/displacement, if present).
    ///
    /// Returns the 4-bit reg field (REX.R folded in) and the decoded r/m operand.
    /// `rm_size` is the access width used when r/m names a register.
    fn modrm(&mut self, rm_size: u8) -> Result<(u8, Operand)> {
        let byte = self.read_u8()?;
        let mode = byte >> 6;
        let reg = ((byte >> 3) & 7) | if self.rex.r { 8 } else { 0 };
        let rm = byte & 7;

        if mode == 3 {
            let bits = rm | if self.rex.b { 8 } else { 0 };
            return Ok((reg, self.reg(bits, rm_size)));
        }

        let mut base = None;
        let mut index = None;
        let mut scale = 1u8;
        let mut displacement = 0i64;

        if rm == 4 {
            let sib = self.read_u8()?;
            scale = 1 << (sib >> 6);
            let index_bits = ((sib >> 3) & 7) | if self.rex.x { 8 } else { 0 };
            // Encoded index 4 (without REX.X) means "no index"; r12 is a valid index.
            if index_bits != 4 {
                index = Some(Register::gpr(index_bits, 8));
            }
            if sib & 7 == 5 && mode == 0 {
                displacement = i64::from(self.parser.read_le::<i32>()?);
            } else {
                base = Some(Register::gpr(sib & 7 | if self.rex.b { 8 } else { 0 }, 8));
            }
        } else if rm == 5 && mode == 0 {
            // RIP-relative: displacement is taken from the next instruction's address.
            base = Some(Register::rip());
            displacement = i64::from(self.parser.read_le::<i32>()?);
        } else {
            base = Some(Register::gpr(rm | if self.rex.b { 8 } else { 0 }, 8));
        }

        match mode {
            1 => displacement = i64::from(self.parser.read_le::<i8>()?),
            2 => displacement = i64::from(self.parser.read_le::<i32>()?),
            _ => {}
        }

        Ok((
            reg,
            Operand::Memory {
                base,
                index,
                scale,
                displacement,
            },
        ))
    }

    /// Peeks the reg/extension field of the upcoming ModRM byte without consuming it.
    fn peek_modrm_ext(&self) -> Result<u8> {
        Ok((self.parser.peek_byte()? >> 3) & 7)
    }
}

/// Decodes a single instruction at `address` from the parser's current position.
///
/// On success the parser is positioned just past the encoding. On failure the parser
/// position is unspecified; callers recovering from decode failures re-seek before
/// decoding elsewhere.
///
/// # Arguments
/// * `parser` - Cursor over the readable bytes; decoding starts at its current position
/// * `address` - Virtual address of the first instruction byte, used to resolve
///   relative branch targets
///
/// # Errors
/// Returns [`crate::Error::InvalidInstruction`] for opcodes outside the supported
/// subset or encodings longer than [`MAX_INSTRUCTION_LEN`], and
/// [`crate::Error::OutOfBounds`] when the encoding is truncated by the end of the
/// readable bytes.
///
/// # Examples
///
/// ```rust
/// use rcdecomp::{disassembler::decode_instruction, Parser};
///
/// let bytes = [0x48, 0x89, 0xE5]; // mov rbp, rsp
/// let mut parser = Parser::new(&bytes);
/// let instruction = decode_instruction(&mut parser, 0x401000)?;
/// assert_eq!(instruction.size, 3);
/// assert_eq!(instruction.mnemonic(), "mov");
/// # Ok::<(), rcdecomp::Error>(())
/// ```
pub fn decode_instruction(parser: &mut Parser, address: u64) -> Result<Instruction> {
    let start = parser.pos();
    let mut prefixes = Prefixes::default();
    let mut rex = Rex::default();

    loop {
        if parser.pos() - start >= MAX_INSTRUCTION_LEN {
            return Err(crate::Error::InvalidInstruction { address });
        }

        let byte = parser.peek_byte()?;
        match byte {
            0x66 => prefixes.operand_size = true,
            0x67 => prefixes.address_size = true,
            0xF0 => prefixes.lock = true,
            0xF2 => prefixes.repne = true,
            0xF3 => prefixes.rep = true,
            0x2E => prefixes.segment = Some(SegmentPrefix::Cs),
            0x36 => prefixes.segment = Some(SegmentPrefix::Ss),
            0x3E => prefixes.segment = Some(SegmentPrefix::Ds),
            0x26 => prefixes.segment = Some(SegmentPrefix::Es),
            0x64 => prefixes.segment = Some(SegmentPrefix::Fs),
            0x65 => prefixes.segment = Some(SegmentPrefix::Gs),
            0x40..=0x4F => {
                // REX must be the last prefix; the opcode byte follows immediately.
                rex = Rex::from_byte(byte);
                parser.advance_by(1)?;
                break;
            }
            _ => break,
        }
        parser.advance_by(1)?;
    }

    let mut decoder = Decoder {
        parser,
        address,
        start,
        prefixes,
        rex,
    };

    let opcode_byte = decoder.read_u8()?;

    let opcode;
    let mut condition = None;
    let mut operands = Vec::new();
    let mut operand_size = decoder.opsize();

    match opcode_byte {
        // ALU block: add/or/adc/sbb/and/sub/xor/cmp, six encoding forms each.
        0x00..=0x05
        | 0x08..=0x0D
        | 0x10..=0x15
        | 0x18..=0x1D
        | 0x20..=0x25
        | 0x28..=0x2D
        | 0x30..=0x35
        | 0x38..=0x3D => {
            opcode = ALU_OPS[(opcode_byte >> 3) as usize & 7];
            match opcode_byte & 7 {
                0 => {
                    operand_size = 1;
                    let (reg, rm) = decoder.modrm(1)?;
                    operands = vec![rm, decoder.reg(reg, 1)];
                }
                1 => {
                    let (reg, rm) = decoder.modrm(operand_size)?;
                    operands = vec![rm, decoder.reg(reg, operand_size)];
                }
                2 => {
                    operand_size = 1;
                    let (reg, rm) = decoder.modrm(1)?;
                    operands = vec![decoder.reg(reg, 1), rm];
                }
                3 => {
                    let (reg, rm) = decoder.modrm(operand_size)?;
                    operands = vec![decoder.reg(reg, operand_size), rm];
                }
                4 => {
                    operand_size = 1;
                    let imm = decoder.read_imm(1)?;
                    operands = vec![decoder.reg(0, 1), Operand::Immediate(imm)];
                }
                _ => {
                    let imm = decoder.read_imm(decoder.imm_size_z())?;
                    operands = vec![decoder.reg(0, operand_size), Operand::Immediate(imm)];
                }
            }
        }
        0x50..=0x57 => {
            opcode = Opcode::Push;
            operand_size = decoder.stack_opsize();
            operands = vec![decoder.reg(opcode_byte & 7 | if rex.b { 8 } else { 0 }, operand_size)];
        }
        0x58..=0x5F => {
            opcode = Opcode::Pop;
            operand_size = decoder.stack_opsize();
            operands = vec![decoder.reg(opcode_byte & 7 | if rex.b { 8 } else { 0 }, operand_size)];
        }
        0x63 => {
            opcode = Opcode::Movsxd;
            let (reg, rm) = decoder.modrm(4)?;
            operands = vec![decoder.reg(reg, operand_size), rm];
        }
        0x68 => {
            opcode = Opcode::Push;
            let imm = decoder.read_imm(decoder.imm_size_z())?;
            operand_size = decoder.stack_opsize();
            operands = vec![Operand::Immediate(imm)];
        }
        0x69 => {
            opcode = Opcode::Imul;
            let (reg, rm) = decoder.modrm(operand_size)?;
            let imm = decoder.read_imm(decoder.imm_size_z())?;
            operands = vec![decoder.reg(reg, operand_size), rm, Operand::Immediate(imm)];
        }
        0x6A => {
            opcode = Opcode::Push;
            let imm = decoder.read_imm(1)?;
            operand_size = decoder.stack_opsize();
            operands = vec![Operand::Immediate(imm)];
        }
        0x6B => {
            opcode = Opcode::Imul;
            let (reg, rm) = decoder.modrm(operand_size)?;
            let imm = decoder.read_imm(1)?;
            operands = vec![decoder.reg(reg, operand_size), rm, Operand::Immediate(imm)];
        }
        0x70..=0x7F => {
            opcode = Opcode::Jcc;
            condition = Some(Condition::from_nibble(opcode_byte));
            operands = vec![decoder.rel_target(1)?];
        }
        0x80 => {
            operand_size = 1;
            let (ext, rm) = decoder.modrm(1)?;
            opcode = ALU_OPS[ext as usize & 7];
            let imm = decoder.read_imm(1)?;
            operands = vec![rm, Operand::Immediate(imm)];
        }
        0x81 => {
            let (ext, rm) = decoder.modrm(operand_size)?;
            opcode = ALU_OPS[ext as usize & 7];
            let imm = decoder.read_imm(decoder.imm_size_z())?;
            operands = vec![rm, Operand::Immediate(imm)];
        }
        0x83 => {
            let (ext, rm) = decoder.modrm(operand_size)?;
            opcode = ALU_OPS[ext as usize & 7];
            let imm = decoder.read_imm(1)?;
            operands = vec![rm, Operand::Immediate(imm)];
        }
        0x84 => {
            opcode = Opcode::Test;
            operand_size = 1;
            let (reg, rm) = decoder.modrm(1)?;
            operands = vec![rm, decoder.reg(reg, 1)];
        }
        0x85 => {
            opcode = Opcode::Test;
            let (reg, rm) = decoder.modrm(operand_size)?;
            operands = vec![rm, decoder.reg(reg, operand_size)];
        }
        0x86 => {
            opcode = Opcode::Xchg;
            operand_size = 1;
            let (reg, rm) = decoder.modrm(1)?;
            operands = vec![rm, decoder.reg(reg, 1)];
        }
        0x87 => {
            opcode = Opcode::Xchg;
            let (reg, rm) = decoder.modrm(operand_size)?;
            operands = vec![rm, decoder.reg(reg, operand_size)];
        }
        0x88 => {
            opcode = Opcode::Mov;
            operand_size = 1;
            let (reg, rm) = decoder.modrm(1)?;
            operands = vec![rm, decoder.reg(reg, 1)];
        }
        0x89 => {
            opcode = Opcode::Mov;
            let (reg, rm) = decoder.modrm(operand_size)?;
            operands = vec![rm, decoder.reg(reg, operand_size)];
        }
        0x8A => {
            opcode = Opcode::Mov;
            operand_size = 1;
            let (reg, rm) = decoder.modrm(1)?;
            operands = vec![decoder.reg(reg, 1), rm];
        }
        0x8B => {
            opcode = Opcode::Mov;
            let (reg, rm) = decoder.modrm(operand_size)?;
            operands = vec![decoder.reg(reg, operand_size), rm];
        }
        0x8D => {
            opcode = Opcode::Lea;
            let (reg, rm) = decoder.modrm(operand_size)?;
            if !matches!(rm, Operand::Memory { .. }) {
                return Err(decoder.invalid());
            }
            operands = vec![decoder.reg(reg, operand_size), rm];
        }
        0x8F => {
            opcode = Opcode::Pop;
            operand_size = decoder.stack_opsize();
            let (_, rm) = decoder.modrm(operand_size)?;
            operands = vec![rm];
        }
        0x90 => {
            opcode = Opcode::Nop;
        }
        0x91..=0x97 => {
            opcode = Opcode::Xchg;
            operands = vec![
                decoder.reg(0, operand_size),
                decoder.reg(opcode_byte & 7 | if rex.b { 8 } else { 0 }, operand_size),
            ];
        }
        0x98 => {
            opcode = Opcode::Cbw;
        }
        0x99 => {
            opcode = Opcode::Cdq;
        }
        0x9C => {
            opcode = Opcode::Pushf;
            operand_size = decoder.stack_opsize();
        }
        0x9D => {
            opcode = Opcode::Popf;
            operand_size = decoder.stack_opsize();
        }
        0x9E => {
            opcode = Opcode::Sahf;
        }
        0x9F => {
            opcode = Opcode::Lahf;
        }
        0xA4 => {
            opcode = Opcode::Movs;
            operand_size = 1;
        }
        0xA5 => {
            opcode = Opcode::Movs;
        }
        0xA6 => {
            opcode = Opcode::Cmps;
            operand_size = 1;
        }
        0xA7 => {
            opcode = Opcode::Cmps;
        }
        0xA8 => {
            opcode = Opcode::Test;
            operand_size = 1;
            let imm = decoder.read_imm(1)?;
            operands = vec![decoder.reg(0, 1), Operand::Immediate(imm)];
        }
        0xA9 => {
            opcode = Opcode::Test;
            let imm = decoder.read_imm(decoder.imm_size_z())?;
            operands = vec![decoder.reg(0, operand_size), Operand::Immediate(imm)];
        }
        0xAA => {
            opcode = Opcode::Stos;
            operand_size = 1;
        }
        0xAB => {
            opcode = Opcode::Stos;
        }
        0xAC => {
            opcode = Opcode::Lods;
            operand_size = 1;
        }
        0xAD => {
            opcode = Opcode::Lods;
        }
        0xAE => {
            opcode = Opcode::Scas;
            operand_size = 1;
        }
        0xAF => {
            opcode = Opcode::Scas;
        }
        0xB0..=0xB7 => {
            opcode = Opcode::Mov;
            operand_size = 1;
            let imm = decoder.read_imm(1)?;
            operands = vec![
                decoder.reg(opcode_byte & 7 | if rex.b { 8 } else { 0 }, 1),
                Operand::Immediate(imm),
            ];
        }
        0xB8..=0xBF => {
            // The only form carrying a full 64-bit immediate (with REX.W).
            opcode = Opcode::Mov;
            let imm = decoder.read_imm(operand_size)?;
            operands = vec![
                decoder.reg(opcode_byte & 7 | if rex.b { 8 } else { 0 }, operand_size),
                Operand::Immediate(imm),
            ];
        }
        0xC0 => {
            operand_size = 1;
            let (ext, rm) = decoder.modrm(1)?;
            opcode = SHIFT_OPS[ext as usize & 7];
            let imm = decoder.read_imm(1)?;
            operands = vec![rm, Operand::Immediate(imm)];
        }
        0xC1 => {
            let (ext, rm) = decoder.modrm(operand_size)?;
            opcode = SHIFT_OPS[ext as usize & 7];
            let imm = decoder.read_imm(1)?;
            operands = vec![rm, Operand::Immediate(imm)];
        }
        0xC2 => {
            opcode = Opcode::Ret;
            let imm = i64::from(decoder.parser.read_le::<u16>()?);
            operands = vec![Operand::Immediate(imm)];
        }
        0xC3 => {
            opcode = Opcode::Ret;
        }
        0xC6 => {
            opcode = Opcode::Mov;
            operand_size = 1;
            let (_, rm) = decoder.modrm(1)?;
            let imm = decoder.read_imm(1)?;
            operands = vec![rm, Operand::Immediate(imm)];
        }
        0xC7 => {
            opcode = Opcode::Mov;
            let (_, rm) = decoder.modrm(operand_size)?;
            let imm = decoder.read_imm(decoder.imm_size_z())?;
            operands = vec![rm, Operand::Immediate(imm)];
        }
        0xC9 => {
            opcode = Opcode::Leave;
        }
        0xCC => {
            opcode = Opcode::Int3;
        }
        0xCD => {
            opcode = Opcode::Int;
            let imm = i64::from(decoder.read_u8()?);
            operands = vec![Operand::Immediate(imm)];
        }
        0xD0 => {
            operand_size = 1;
            let (ext, rm) = decoder.modrm(1)?;
            opcode = SHIFT_OPS[ext as usize & 7];
            operands = vec![rm, Operand::Immediate(1)];
        }
        0xD1 => {
            let (ext, rm) = decoder.modrm(operand_size)?;
            opcode = SHIFT_OPS[ext as usize & 7];
            operands = vec![rm, Operand::Immediate(1)];
        }
        0xD2 => {
            operand_size = 1;
            let (ext, rm) = decoder.modrm(1)?;
            opcode = SHIFT_OPS[ext as usize & 7];
            operands = vec![rm, Operand::Register(Register::gpr(1, 1))];
        }
        0xD3 => {
            let (ext, rm) = decoder.modrm(operand_size)?;
            opcode = SHIFT_OPS[ext as usize & 7];
            operands = vec![rm, Operand::Register(Register::gpr(1, 1))];
        }
        0xE0 => {
            opcode = Opcode::Loopne;
            operands = vec![decoder.rel_target(1)?];
        }
        0xE1 => {
            opcode = Opcode::Loope;
            operands = vec![decoder.rel_target(1)?];
        }
        0xE2 => {
            opcode = Opcode::Loop;
            operands = vec![decoder.rel_target(1)?];
        }
        0xE3 => {
            opcode = Opcode::Jrcxz;
            operands = vec![decoder.rel_target(1)?];
        }
        0xE8 => {
            opcode = Opcode::Call;
            operands = vec![decoder.rel_target(4)?];
        }
        0xE9 => {
            opcode = Opcode::Jmp;
            operands = vec![decoder.rel_target(4)?];
        }
        0xEB => {
            opcode = Opcode::Jmp;
            operands = vec![decoder.rel_target(1)?];
        }
        0xF4 => {
            opcode = Opcode::Hlt;
        }
        0xF5 => {
            opcode = Opcode::Cmc;
        }
        0xF6 => {
            operand_size = 1;
            let (ext, rm) = decoder.modrm(1)?;
            match ext & 7 {
                0 | 1 => {
                    opcode = Opcode::Test;
                    let imm = decoder.read_imm(1)?;
                    operands = vec![rm, Operand::Immediate(imm)];
                }
                2 => {
                    opcode = Opcode::Not;
                    operands = vec![rm];
                }
                3 => {
                    opcode = Opcode::Neg;
                    operands = vec![rm];
                }
                4 => {
                    opcode = Opcode::Mul;
                    operands = vec![rm];
                }
                5 => {
                    opcode = Opcode::Imul;
                    operands = vec![rm];
                }
                6 => {
                    opcode = Opcode::Div;
                    operands = vec![rm];
                }
                _ => {
                    opcode = Opcode::Idiv;
                    operands = vec![rm];
                }
            }
        }
        0xF7 => {
            let (ext, rm) = decoder.modrm(operand_size)?;
            match ext & 7 {
                0 | 1 => {
                    opcode = Opcode::Test;
                    let imm = decoder.read_imm(decoder.imm_size_z())?;
                    operands = vec![rm, Operand::Immediate(imm)];
                }
                2 => {
                    opcode = Opcode::Not;
                    operands = vec![rm];
                }
                3 => {
                    opcode = Opcode::Neg;
                    operands = vec![rm];
                }
                4 => {
                    opcode = Opcode::Mul;
                    operands = vec![rm];
                }
                5 => {
                    opcode = Opcode::Imul;
                    operands = vec![rm];
                }
                6 => {
                    opcode = Opcode::Div;
                    operands = vec![rm];
                }
                _ => {
                    opcode = Opcode::Idiv;
                    operands = vec![rm];
                }
            }
        }
        0xF8 => {
            opcode = Opcode::Clc;
        }
        0xF9 => {
            opcode = Opcode::Stc;
        }
        0xFA => {
            opcode = Opcode::Cli;
        }
        0xFB => {
            opcode = Opcode::Sti;
        }
        0xFC => {
            opcode = Opcode::Cld;
        }
        0xFD => {
            opcode = Opcode::Std;
        }
        0xFE => {
            operand_size = 1;
            let (ext, rm) = decoder.modrm(1)?;
            opcode = match ext & 7 {
                0 => Opcode::Inc,
                1 => Opcode::Dec,
                _ => return Err(decoder.invalid()),
            };
            operands = vec![rm];
        }
        0xFF => {
            let ext = decoder.peek_modrm_ext()?;
            match ext {
                0 | 1 => {
                    let (_, rm) = decoder.modrm(operand_size)?;
                    opcode = if ext == 0 { Opcode::Inc } else { Opcode::Dec };
                    operands = vec![rm];
                }
                2 => {
                    // Indirect near call: operand is always 64-bit.
                    operand_size = 8;
                    let (_, rm) = decoder.modrm(8)?;
                    opcode = Opcode::Call;
                    operands = vec![rm];
                }
                4 => {
                    operand_size = 8;
                    let (_, rm) = decoder.modrm(8)?;
                    opcode = Opcode::Jmp;
                    operands = vec![rm];
                }
                6 => {
                    operand_size = decoder.stack_opsize();
                    let (_, rm) = decoder.modrm(operand_size)?;
                    opcode = Opcode::Push;
                    operands = vec![rm];
                }
                _ => return Err(decoder.invalid()),
            }
        }
        0x0F => {
            let second = decoder.read_u8()?;
            match second {
                0x05 => {
                    opcode = Opcode::Syscall;
                }
                0x0B => {
                    opcode = Opcode::Ud2;
                }
                0x1E => {
                    // F3 0F 1E FA is endbr64; other encodings of this group are not
                    // decoded.
                    let tail = decoder.read_u8()?;
                    if decoder.prefixes.rep && tail == 0xFA {
                        opcode = Opcode::Endbr64;
                    } else {
                        return Err(decoder.invalid());
                    }
                }
                0x1F => {
                    // Multi-byte nop; the memory operand is decoded but has no effect.
                    opcode = Opcode::Nop;
                    let (_, rm) = decoder.modrm(operand_size)?;
                    operands = vec![rm];
                }
                0x40..=0x4F => {
                    opcode = Opcode::Cmovcc;
                    condition = Some(Condition::from_nibble(second));
                    let (reg, rm) = decoder.modrm(operand_size)?;
                    operands = vec![decoder.reg(reg, operand_size), rm];
                }
                0x80..=0x8F => {
                    opcode = Opcode::Jcc;
                    condition = Some(Condition::from_nibble(second));
                    operands = vec![decoder.rel_target(4)?];
                }
                0x90..=0x9F => {
                    opcode = Opcode::Setcc;
                    condition = Some(Condition::from_nibble(second));
                    operand_size = 1;
                    let (_, rm) = decoder.modrm(1)?;
                    operands = vec![rm];
                }
                0xA2 => {
                    opcode = Opcode::Cpuid;
                }
                0xAF => {
                    opcode = Opcode::Imul;
                    let (reg, rm) = decoder.modrm(operand_size)?;
                    operands = vec![decoder.reg(reg, operand_size), rm];
                }
                0xB6 => {
                    opcode = Opcode::Movzx;
                    let (reg, rm) = decoder.modrm(1)?;
                    operands = vec![decoder.reg(reg, operand_size), rm];
                }
                0xB7 => {
                    opcode = Opcode::Movzx;
                    let (reg, rm) = decoder.modrm(2)?;
                    operands = vec![decoder.reg(reg, operand_size), rm];
                }
                0xBE => {
                    opcode = Opcode::Movsx;
                    let (reg, rm) = decoder.modrm(1)?;
                    operands = vec![decoder.reg(reg, operand_size), rm];
                }
                0xBF => {
                    opcode = Opcode::Movsx;
                    let (reg, rm) = decoder.modrm(2)?;
                    operands = vec![decoder.reg(reg, operand_size), rm];
                }
                _ => return Err(decoder.invalid()),
            }
        }
        _ => return Err(decoder.invalid()),
    }

    let size = decoder.consumed();
    if size > MAX_INSTRUCTION_LEN {
        return Err(crate::Error::InvalidInstruction { address });
    }

    Ok(Instruction {
        address,
        size: size as u8,
        opcode,
        condition,
        operands,
        prefixes,
        operand_size,
    })
}

/// Decodes instructions linearly until the parser is exhausted.
///
/// `address` is the virtual address of the parser's current position; subsequent
/// addresses follow from each decoded length.
///
/// # Errors
/// Propagates the first decode failure; instructions decoded before it are lost.
pub fn decode_stream(parser: &mut Parser, address: u64) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();
    let mut va = address;

    while parser.has_more_data() {
        let instruction = decode_instruction(parser, va)?;
        va = instruction.next_address();
        instructions.push(instruction);
    }

    Ok(instructions)
}
