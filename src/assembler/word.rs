use serde::{Deserialize, Serialize};

/// Number of low bits carrying the operand.
const OPERAND_BITS: u16 = 11;
/// Largest encodable operand value.
pub const OPERAND_LIMIT: u16 = (1 << OPERAND_BITS) - 1;

const MODIFIER_SHIFT: u16 = OPERAND_BITS;
const OPCODE_SHIFT: u16 = OPERAND_BITS + 2;

/// The eight machine operations, in encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Opcode {
    Jump = 0,
    Push = 1,
    Pop = 2,
    Load = 3,
    Store = 4,
    Invoke = 5,
    Execute = 6,
    Handle = 7,
}

impl Opcode {
    fn from_bits(bits: u16) -> Self {
        match bits & 0b111 {
            0 => Opcode::Jump,
            1 => Opcode::Push,
            2 => Opcode::Pop,
            3 => Opcode::Load,
            4 => Opcode::Store,
            5 => Opcode::Invoke,
            6 => Opcode::Execute,
            _ => Opcode::Handle,
        }
    }
}

/// One fixed-width bytecode word: a 3-bit opcode, a 2-bit modifier, and
/// an 11-bit operand packed into sixteen bits.
///
/// Operands are 1-based table indexes or word addresses; zero means "no
/// operand". The all-zero word is the SKIP no-op (an unconditional jump
/// with no address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Word(u16);

impl Word {
    /// The SKIP no-op.
    pub const SKIP: Word = Word(0);

    /// Pack a word. The modifier must fit in two bits and the operand in
    /// eleven; the caller validates both before encoding.
    pub fn new(opcode: Opcode, modifier: u8, operand: u16) -> Self {
        debug_assert!(modifier < 4, "modifier {modifier} exceeds two bits");
        debug_assert!(
            operand <= OPERAND_LIMIT,
            "operand {operand} exceeds {OPERAND_LIMIT}"
        );
        Word(((opcode as u16) << OPCODE_SHIFT) | (u16::from(modifier) << MODIFIER_SHIFT) | operand)
    }

    pub fn opcode(self) -> Opcode {
        Opcode::from_bits(self.0 >> OPCODE_SHIFT)
    }

    pub fn modifier(self) -> u8 {
        ((self.0 >> MODIFIER_SHIFT) & 0b11) as u8
    }

    pub fn operand(self) -> u16 {
        self.0 & OPERAND_LIMIT
    }

    pub fn is_skip(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u16 {
        self.0
    }
}

impl From<Word> for u16 {
    fn from(word: Word) -> u16 {
        word.0
    }
}

impl From<u16> for Word {
    fn from(bits: u16) -> Word {
        Word(bits)
    }
}
