//! Instruction decoding.
//!
//! [`decode`] turns the bytes at one offset into an [`Instruction`] whose
//! [`Operation`] names the transition family and carries resolved operands.
//! Opcodes that differ only by kind or by an implicit operand are decoded
//! from the tables below rather than one arm per opcode.

use serde::{Deserialize, Serialize};

use crate::bytecode::{BytecodeSource, Constant, DecodeError, MemberRef, Opcode};
use crate::descriptor::{field_kind, MethodDescriptor};
use crate::stack::StackOp;
use crate::value::{ArithmeticOp, Comparison, Conversion, NumericKind, ValueKind};

/// Operand of a constant-push instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Int(i32),
    Short(i16),
    Long(i64),
    Float(f32),
    Double(f64),
    /// Loaded from the constant pool; `wide` is set for `ldc2_w`.
    Pooled { constant: Constant, wide: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

/// What a conditional branch tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchTest {
    /// `if<cond>`: one int against zero.
    Zero(Condition),
    /// `if_icmp<cond>`: two ints.
    IntCompare(Condition),
    /// `if_acmpeq` / `if_acmpne`.
    RefCompare { equal: bool },
    /// `ifnull` / `ifnonnull`.
    Null { is_null: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

impl InvokeKind {
    pub const fn has_receiver(self) -> bool {
        !matches!(self, InvokeKind::Static)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Allocation {
    Object(String),
    /// `newarray` with a primitive element kind.
    Array(ValueKind),
    /// `anewarray` with the element class.
    ReferenceArray(String),
    MultiArray { class: String, dimensions: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeCheck {
    Cast(String),
    InstanceOf(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MonitorOp {
    Enter,
    Exit,
}

/// How a path ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Terminal {
    /// `None` for a void `return`.
    Return(Option<ValueKind>),
    Throw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAccess {
    pub field: MemberRef,
    pub kind: ValueKind,
}

/// Decoded `tableswitch` or `lookupswitch`; offsets are relative to the
/// switch instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchTable {
    pub default: i32,
    /// `(match, offset)` pairs in ascending match order.
    pub cases: Vec<(i32, i32)>,
}

impl SwitchTable {
    /// Offset taken when the selector equals `value`.
    pub fn offset_for(&self, value: i64) -> i32 {
        self.cases
            .iter()
            .find(|(key, _)| i64::from(*key) == value)
            .map_or(self.default, |(_, offset)| *offset)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Nop,
    Push(Literal),
    Load { kind: ValueKind, index: u16 },
    Store { kind: ValueKind, index: u16 },
    Increment { index: u16, delta: i32 },
    ArrayLoad(ValueKind),
    ArrayStore(ValueKind),
    Stack(StackOp),
    Arithmetic(ArithmeticOp, NumericKind),
    Negate(NumericKind),
    Convert(Conversion),
    Compare(Comparison),
    Branch { test: BranchTest, offset: i32 },
    Goto(i32),
    Jsr(i32),
    Ret(u16),
    Switch(SwitchTable),
    Terminate(Terminal),
    GetStatic(FieldAccess),
    PutStatic(FieldAccess),
    GetField(FieldAccess),
    PutField(FieldAccess),
    Invoke {
        kind: InvokeKind,
        method: MemberRef,
        descriptor: MethodDescriptor,
    },
    Allocate(Allocation),
    ArrayLength,
    TypeCheck(TypeCheck),
    Monitor(MonitorOp),
    /// No transition exists for this opcode.
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub offset: usize,
    pub byte: u8,
    /// `None` for bytes outside the opcode table.
    pub opcode: Option<Opcode>,
    pub length: usize,
    pub operation: Operation,
}

impl Instruction {
    pub fn mnemonic(&self) -> &'static str {
        self.opcode.map_or("<unknown>", Opcode::mnemonic)
    }
}

const LOCAL_KINDS: [ValueKind; 5] = [
    ValueKind::Int,
    ValueKind::Long,
    ValueKind::Float,
    ValueKind::Double,
    ValueKind::Reference,
];

const ARRAY_KINDS: [ValueKind; 8] = [
    ValueKind::Int,
    ValueKind::Long,
    ValueKind::Float,
    ValueKind::Double,
    ValueKind::Reference,
    ValueKind::Byte,
    ValueKind::Char,
    ValueKind::Short,
];

const NUMERIC_KINDS: [NumericKind; 4] = [
    NumericKind::Int,
    NumericKind::Long,
    NumericKind::Float,
    NumericKind::Double,
];

const STACK_OPS: [StackOp; 9] = [
    StackOp::Pop,
    StackOp::Pop2,
    StackOp::Dup,
    StackOp::DupX1,
    StackOp::DupX2,
    StackOp::Dup2,
    StackOp::Dup2X1,
    StackOp::Dup2X2,
    StackOp::Swap,
];

const CONVERSIONS: [Conversion; 15] = [
    Conversion::I2L,
    Conversion::I2F,
    Conversion::I2D,
    Conversion::L2I,
    Conversion::L2F,
    Conversion::L2D,
    Conversion::F2I,
    Conversion::F2L,
    Conversion::F2D,
    Conversion::D2I,
    Conversion::D2L,
    Conversion::D2F,
    Conversion::I2B,
    Conversion::I2C,
    Conversion::I2S,
];

const COMPARISONS: [Comparison; 5] = [
    Comparison::Lcmp,
    Comparison::Fcmpl,
    Comparison::Fcmpg,
    Comparison::Dcmpl,
    Comparison::Dcmpg,
];

const CONDITIONS: [Condition; 6] = [
    Condition::Eq,
    Condition::Ne,
    Condition::Lt,
    Condition::Ge,
    Condition::Gt,
    Condition::Le,
];

/// `newarray` element type codes 4..=11.
const NEWARRAY_KINDS: [ValueKind; 8] = [
    ValueKind::Boolean,
    ValueKind::Char,
    ValueKind::Float,
    ValueKind::Double,
    ValueKind::Byte,
    ValueKind::Short,
    ValueKind::Int,
    ValueKind::Long,
];

/// Decodes the instruction starting at `offset`.
pub fn decode<S: BytecodeSource + ?Sized>(
    source: &S,
    offset: usize,
) -> Result<Instruction, DecodeError> {
    let byte = source.opcode_at(offset)?;
    let opcode = Opcode::from_byte(byte);
    let (operation, length) = match byte {
        0x02..=0x08 => (Operation::Push(Literal::Int(i32::from(byte) - 3)), 1),
        0x09..=0x0a => (Operation::Push(Literal::Long(i64::from(byte - 0x09))), 1),
        0x0b..=0x0d => (Operation::Push(Literal::Float(f32::from(byte - 0x0b))), 1),
        0x0e..=0x0f => (Operation::Push(Literal::Double(f64::from(byte - 0x0e))), 1),
        0x15..=0x19 => {
            let index = u16::from(source.u8_at(offset + 1)?);
            let kind = LOCAL_KINDS[usize::from(byte - 0x15)];
            (Operation::Load { kind, index }, 2)
        }
        0x1a..=0x2d => {
            let slot = byte - 0x1a;
            let kind = LOCAL_KINDS[usize::from(slot / 4)];
            let index = u16::from(slot % 4);
            (Operation::Load { kind, index }, 1)
        }
        0x2e..=0x35 => (Operation::ArrayLoad(ARRAY_KINDS[usize::from(byte - 0x2e)]), 1),
        0x36..=0x3a => {
            let index = u16::from(source.u8_at(offset + 1)?);
            let kind = LOCAL_KINDS[usize::from(byte - 0x36)];
            (Operation::Store { kind, index }, 2)
        }
        0x3b..=0x4e => {
            let slot = byte - 0x3b;
            let kind = LOCAL_KINDS[usize::from(slot / 4)];
            let index = u16::from(slot % 4);
            (Operation::Store { kind, index }, 1)
        }
        0x4f..=0x56 => (Operation::ArrayStore(ARRAY_KINDS[usize::from(byte - 0x4f)]), 1),
        0x57..=0x5f => (Operation::Stack(STACK_OPS[usize::from(byte - 0x57)]), 1),
        0x60..=0x73 => {
            let slot = usize::from(byte - 0x60);
            let op = [
                ArithmeticOp::Add,
                ArithmeticOp::Sub,
                ArithmeticOp::Mul,
                ArithmeticOp::Div,
                ArithmeticOp::Rem,
            ][slot / 4];
            (Operation::Arithmetic(op, NUMERIC_KINDS[slot % 4]), 1)
        }
        0x74..=0x77 => (Operation::Negate(NUMERIC_KINDS[usize::from(byte - 0x74)]), 1),
        0x78..=0x83 => {
            let slot = usize::from(byte - 0x78);
            let op = [
                ArithmeticOp::Shl,
                ArithmeticOp::Shr,
                ArithmeticOp::Ushr,
                ArithmeticOp::And,
                ArithmeticOp::Or,
                ArithmeticOp::Xor,
            ][slot / 2];
            (Operation::Arithmetic(op, NUMERIC_KINDS[slot % 2]), 1)
        }
        0x85..=0x93 => (Operation::Convert(CONVERSIONS[usize::from(byte - 0x85)]), 1),
        0x94..=0x98 => (Operation::Compare(COMPARISONS[usize::from(byte - 0x94)]), 1),
        0x99..=0x9e => {
            let test = BranchTest::Zero(CONDITIONS[usize::from(byte - 0x99)]);
            let offset = i32::from(source.i16_at(offset + 1)?);
            (Operation::Branch { test, offset }, 3)
        }
        0x9f..=0xa4 => {
            let test = BranchTest::IntCompare(CONDITIONS[usize::from(byte - 0x9f)]);
            let offset = i32::from(source.i16_at(offset + 1)?);
            (Operation::Branch { test, offset }, 3)
        }
        0xac..=0xb0 => {
            let kind = LOCAL_KINDS[usize::from(byte - 0xac)];
            (Operation::Terminate(Terminal::Return(Some(kind))), 1)
        }
        _ => match opcode {
            Some(opcode) => decode_named(source, offset, opcode)?,
            None => (Operation::Unsupported, 1),
        },
    };
    Ok(Instruction {
        offset,
        byte,
        opcode,
        length,
        operation,
    })
}

fn decode_named<S: BytecodeSource + ?Sized>(
    source: &S,
    offset: usize,
    opcode: Opcode,
) -> Result<(Operation, usize), DecodeError> {
    let index_operand = || source.u16_at(offset + 1);
    let decoded = match opcode {
        Opcode::Nop => (Operation::Nop, 1),
        Opcode::AconstNull => (Operation::Push(Literal::Null), 1),
        Opcode::Bipush => {
            let value = i32::from(source.i8_at(offset + 1)?);
            (Operation::Push(Literal::Int(value)), 2)
        }
        Opcode::Sipush => (Operation::Push(Literal::Short(source.i16_at(offset + 1)?)), 3),
        Opcode::Ldc => {
            let constant = source.constant(u16::from(source.u8_at(offset + 1)?))?;
            (Operation::Push(Literal::Pooled { constant, wide: false }), 2)
        }
        Opcode::LdcW | Opcode::Ldc2W => {
            let constant = source.constant(index_operand()?)?;
            let wide = opcode == Opcode::Ldc2W;
            (Operation::Push(Literal::Pooled { constant, wide }), 3)
        }
        Opcode::Iinc => {
            let index = u16::from(source.u8_at(offset + 1)?);
            let delta = i32::from(source.i8_at(offset + 2)?);
            (Operation::Increment { index, delta }, 3)
        }
        Opcode::Goto => (Operation::Goto(i32::from(source.i16_at(offset + 1)?)), 3),
        Opcode::GotoW => (Operation::Goto(source.i32_at(offset + 1)?), 5),
        Opcode::Jsr => (Operation::Jsr(i32::from(source.i16_at(offset + 1)?)), 3),
        Opcode::JsrW => (Operation::Jsr(source.i32_at(offset + 1)?), 5),
        Opcode::Ret => (Operation::Ret(u16::from(source.u8_at(offset + 1)?)), 2),
        Opcode::IfAcmpeq | Opcode::IfAcmpne | Opcode::Ifnull | Opcode::Ifnonnull => {
            let test = match opcode {
                Opcode::IfAcmpeq => BranchTest::RefCompare { equal: true },
                Opcode::IfAcmpne => BranchTest::RefCompare { equal: false },
                Opcode::Ifnull => BranchTest::Null { is_null: true },
                _ => BranchTest::Null { is_null: false },
            };
            let offset = i32::from(source.i16_at(offset + 1)?);
            (Operation::Branch { test, offset }, 3)
        }
        Opcode::Tableswitch => decode_tableswitch(source, offset)?,
        Opcode::Lookupswitch => decode_lookupswitch(source, offset)?,
        Opcode::Return => (Operation::Terminate(Terminal::Return(None)), 1),
        Opcode::Athrow => (Operation::Terminate(Terminal::Throw), 1),
        Opcode::Getstatic | Opcode::Putstatic | Opcode::Getfield | Opcode::Putfield => {
            let field = source.field_ref(index_operand()?)?;
            let kind = field_kind(&field.descriptor)?;
            let access = FieldAccess { field, kind };
            let operation = match opcode {
                Opcode::Getstatic => Operation::GetStatic(access),
                Opcode::Putstatic => Operation::PutStatic(access),
                Opcode::Getfield => Operation::GetField(access),
                _ => Operation::PutField(access),
            };
            (operation, 3)
        }
        Opcode::Invokevirtual
        | Opcode::Invokespecial
        | Opcode::Invokestatic
        | Opcode::Invokeinterface => {
            let method = source.method_ref(index_operand()?)?;
            let descriptor = MethodDescriptor::parse(&method.descriptor)?;
            let (kind, length) = match opcode {
                Opcode::Invokevirtual => (InvokeKind::Virtual, 3),
                Opcode::Invokespecial => (InvokeKind::Special, 3),
                Opcode::Invokestatic => (InvokeKind::Static, 3),
                _ => (InvokeKind::Interface, 5),
            };
            let operation = Operation::Invoke {
                kind,
                method,
                descriptor,
            };
            (operation, length)
        }
        Opcode::New => {
            let class = source.class_name(index_operand()?)?;
            (Operation::Allocate(Allocation::Object(class)), 3)
        }
        Opcode::Newarray => {
            let code = source.u8_at(offset + 1)?;
            let kind = code
                .checked_sub(4)
                .and_then(|slot| NEWARRAY_KINDS.get(usize::from(slot)))
                .ok_or(DecodeError::ArrayType { offset, code })?;
            (Operation::Allocate(Allocation::Array(*kind)), 2)
        }
        Opcode::Anewarray => {
            let class = source.class_name(index_operand()?)?;
            (Operation::Allocate(Allocation::ReferenceArray(class)), 3)
        }
        Opcode::Multianewarray => {
            let class = source.class_name(index_operand()?)?;
            let dimensions = source.u8_at(offset + 3)?;
            (
                Operation::Allocate(Allocation::MultiArray { class, dimensions }),
                4,
            )
        }
        Opcode::Arraylength => (Operation::ArrayLength, 1),
        Opcode::Checkcast => {
            let class = source.class_name(index_operand()?)?;
            (Operation::TypeCheck(TypeCheck::Cast(class)), 3)
        }
        Opcode::Instanceof => {
            let class = source.class_name(index_operand()?)?;
            (Operation::TypeCheck(TypeCheck::InstanceOf(class)), 3)
        }
        Opcode::Monitorenter => (Operation::Monitor(MonitorOp::Enter), 1),
        Opcode::Monitorexit => (Operation::Monitor(MonitorOp::Exit), 1),
        Opcode::Wide => decode_wide(source, offset)?,
        Opcode::Invokedynamic => (Operation::Unsupported, 5),
        _ => (Operation::Unsupported, 1),
    };
    Ok(decoded)
}

fn decode_wide<S: BytecodeSource + ?Sized>(
    source: &S,
    offset: usize,
) -> Result<(Operation, usize), DecodeError> {
    let byte = source.u8_at(offset + 1)?;
    let index = source.u16_at(offset + 2)?;
    let decoded = match byte {
        0x15..=0x19 => {
            let kind = LOCAL_KINDS[usize::from(byte - 0x15)];
            (Operation::Load { kind, index }, 4)
        }
        0x36..=0x3a => {
            let kind = LOCAL_KINDS[usize::from(byte - 0x36)];
            (Operation::Store { kind, index }, 4)
        }
        0x84 => {
            let delta = i32::from(source.i16_at(offset + 4)?);
            (Operation::Increment { index, delta }, 6)
        }
        0xa9 => (Operation::Ret(index), 4),
        _ => return Err(DecodeError::BadWide { offset, opcode: byte }),
    };
    Ok(decoded)
}

/// First byte of the 4-byte aligned operand block of a switch at `offset`.
pub fn switch_operands_start(offset: usize) -> usize {
    (offset + 4) & !3
}

fn decode_tableswitch<S: BytecodeSource + ?Sized>(
    source: &S,
    offset: usize,
) -> Result<(Operation, usize), DecodeError> {
    let base = switch_operands_start(offset);
    let default = source.i32_at(base)?;
    let low = source.i32_at(base + 4)?;
    let high = source.i32_at(base + 8)?;
    let mut cases = Vec::new();
    let mut cursor = base + 12;
    if low <= high {
        for key in low..=high {
            cases.push((key, source.i32_at(cursor)?));
            cursor += 4;
        }
    }
    let table = SwitchTable { default, cases };
    Ok((Operation::Switch(table), cursor - offset))
}

fn decode_lookupswitch<S: BytecodeSource + ?Sized>(
    source: &S,
    offset: usize,
) -> Result<(Operation, usize), DecodeError> {
    let base = switch_operands_start(offset);
    let default = source.i32_at(base)?;
    let pairs = source.i32_at(base + 4)?;
    let mut cases = Vec::new();
    let mut cursor = base + 8;
    for _ in 0..pairs.max(0) {
        cases.push((source.i32_at(cursor)?, source.i32_at(cursor + 4)?));
        cursor += 8;
    }
    let table = SwitchTable { default, cases };
    Ok((Operation::Switch(table), cursor - offset))
}
