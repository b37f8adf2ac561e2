//! Small label-based bytecode assembler.
//!
//! Emitters append bytes and intern constant-pool entries as they go; jump
//! operands are left as placeholders and patched by [`Assembler::finish`]
//! once every label has an offset.  Emitters never fail on the spot: the
//! first problem is remembered and reported by `finish`, which keeps call
//! sites chainable.

use thiserror::Error;

use crate::bytecode::{Constant, ConstantPool, DecodeError, MemberRef, MethodBody, Opcode, PoolEntry};
use crate::descriptor::MethodDescriptor;
use crate::instruction::switch_operands_start;
use crate::value::ValueKind;

pub type AssembleResult<T> = Result<T, AssembleError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    #[error("label {0} was never bound")]
    UnboundLabel(usize),
    #[error("label {0} is bound twice")]
    Rebound(usize),
    #[error("`{opcode}` cannot be emitted by `{emitter}`")]
    WrongEmitter {
        opcode: Opcode,
        emitter: &'static str,
    },
    #[error("jump at offset {offset} to {target} does not fit in 16 bits")]
    OutOfRange { offset: usize, target: usize },
    #[error("element kind {0:?} has no newarray code")]
    ArrayKind(ValueKind),
    #[error(transparent)]
    Descriptor(#[from] DecodeError),
}

/// Jump target handed out by [`Assembler::label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug)]
struct Fixup {
    /// Offset of the instruction the jump is relative to.
    origin: usize,
    /// Where the operand bytes live.
    site: usize,
    label: Label,
    wide: bool,
}

#[derive(Debug, Default)]
pub struct Assembler {
    code: Vec<u8>,
    pool: ConstantPool,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
    error: Option<AssembleError>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds `label` to the current offset.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        match self.labels[label.0] {
            Some(_) => self.fail(AssembleError::Rebound(label.0)),
            None => self.labels[label.0] = Some(self.code.len()),
        }
        self
    }

    pub fn offset(&self) -> usize {
        self.code.len()
    }

    pub fn pool_mut(&mut self) -> &mut ConstantPool {
        &mut self.pool
    }

    /// Emits an opcode that takes no operands.
    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.code.push(opcode.byte());
        self
    }

    /// Emits an arbitrary byte, whether or not it names an opcode.
    pub fn raw(&mut self, byte: u8) -> &mut Self {
        self.code.push(byte);
        self
    }

    /// Pushes an int constant with the shortest encoding.
    pub fn int(&mut self, value: i32) -> &mut Self {
        match value {
            -1..=5 => self.raw((i32::from(Opcode::Iconst0.byte()) + value) as u8),
            _ if i8::try_from(value).is_ok() => self.bipush(value as i8),
            _ if i16::try_from(value).is_ok() => self.sipush(value as i16),
            _ => self.ldc(Constant::Integer(value)),
        }
    }

    pub fn bipush(&mut self, value: i8) -> &mut Self {
        self.op(Opcode::Bipush).raw(value as u8)
    }

    pub fn sipush(&mut self, value: i16) -> &mut Self {
        self.op(Opcode::Sipush).u16(value as u16)
    }

    /// Emits `ldc`, `ldc_w` or `ldc2_w` as the constant and its index need.
    pub fn ldc(&mut self, constant: Constant) -> &mut Self {
        let wide = matches!(constant, Constant::Long(_) | Constant::Double(_));
        let index = self.pool.intern(PoolEntry::Constant(constant));
        if wide {
            self.op(Opcode::Ldc2W).u16(index)
        } else if let Ok(short) = u8::try_from(index) {
            self.op(Opcode::Ldc).raw(short)
        } else {
            self.op(Opcode::LdcW).u16(index)
        }
    }

    /// Local load, store or `ret`, widened when `index` exceeds a byte.
    pub fn local(&mut self, opcode: Opcode, index: u16) -> &mut Self {
        let indexed = matches!(
            opcode,
            Opcode::Iload
                | Opcode::Lload
                | Opcode::Fload
                | Opcode::Dload
                | Opcode::Aload
                | Opcode::Istore
                | Opcode::Lstore
                | Opcode::Fstore
                | Opcode::Dstore
                | Opcode::Astore
                | Opcode::Ret
        );
        if !indexed {
            self.fail(AssembleError::WrongEmitter {
                opcode,
                emitter: "local",
            });
            return self;
        }
        match u8::try_from(index) {
            Ok(short) => self.op(opcode).raw(short),
            Err(_) => self.op(Opcode::Wide).op(opcode).u16(index),
        }
    }

    pub fn iinc(&mut self, index: u16, delta: i16) -> &mut Self {
        match (u8::try_from(index), i8::try_from(delta)) {
            (Ok(index), Ok(delta)) => self.op(Opcode::Iinc).raw(index).raw(delta as u8),
            _ => self
                .op(Opcode::Wide)
                .op(Opcode::Iinc)
                .u16(index)
                .u16(delta as u16),
        }
    }

    /// Conditional branch, `goto`, `jsr` or their `_w` forms.
    pub fn branch(&mut self, opcode: Opcode, target: Label) -> &mut Self {
        let byte = opcode.byte();
        let wide = matches!(opcode, Opcode::GotoW | Opcode::JsrW);
        let narrow = (Opcode::Ifeq.byte()..=Opcode::Jsr.byte()).contains(&byte)
            || matches!(opcode, Opcode::Ifnull | Opcode::Ifnonnull);
        if !wide && !narrow {
            self.fail(AssembleError::WrongEmitter {
                opcode,
                emitter: "branch",
            });
            return self;
        }
        let origin = self.code.len();
        self.op(opcode);
        self.placeholder(origin, target, wide)
    }

    /// `tableswitch` whose cases start at `low` and follow `targets` in order.
    pub fn tableswitch(&mut self, low: i32, default: Label, targets: &[Label]) -> &mut Self {
        let origin = self.code.len();
        self.op(Opcode::Tableswitch).align(origin);
        self.placeholder(origin, default, true);
        let high = low.saturating_add(targets.len() as i32 - 1);
        self.u32(low as u32).u32(high as u32);
        for target in targets {
            self.placeholder(origin, *target, true);
        }
        self
    }

    /// `lookupswitch`; cases are sorted by key before encoding.
    pub fn lookupswitch(&mut self, default: Label, cases: &[(i32, Label)]) -> &mut Self {
        let mut sorted = cases.to_vec();
        sorted.sort_by_key(|(key, _)| *key);
        let origin = self.code.len();
        self.op(Opcode::Lookupswitch).align(origin);
        self.placeholder(origin, default, true);
        self.u32(sorted.len() as u32);
        for (key, target) in sorted {
            self.u32(key as u32);
            self.placeholder(origin, target, true);
        }
        self
    }

    pub fn field(&mut self, opcode: Opcode, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        if !matches!(
            opcode,
            Opcode::Getstatic | Opcode::Putstatic | Opcode::Getfield | Opcode::Putfield
        ) {
            self.fail(AssembleError::WrongEmitter {
                opcode,
                emitter: "field",
            });
            return self;
        }
        let index = self
            .pool
            .intern(PoolEntry::FieldRef(MemberRef::new(owner, name, descriptor)));
        self.op(opcode).u16(index)
    }

    pub fn invoke(&mut self, opcode: Opcode, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let member = MemberRef::new(owner, name, descriptor);
        match opcode {
            Opcode::Invokevirtual | Opcode::Invokespecial | Opcode::Invokestatic => {
                let index = self.pool.intern(PoolEntry::MethodRef(member));
                self.op(opcode).u16(index)
            }
            Opcode::Invokeinterface => {
                let slots = match MethodDescriptor::parse(descriptor) {
                    Ok(parsed) => parsed.parameter_slots(),
                    Err(err) => {
                        self.fail(err.into());
                        return self;
                    }
                };
                let index = self.pool.intern(PoolEntry::InterfaceMethodRef(member));
                self.op(opcode).u16(index).raw((slots + 1) as u8).raw(0)
            }
            _ => {
                self.fail(AssembleError::WrongEmitter {
                    opcode,
                    emitter: "invoke",
                });
                self
            }
        }
    }

    /// `new`, `anewarray`, `checkcast` or `instanceof`.
    pub fn class_op(&mut self, opcode: Opcode, class: &str) -> &mut Self {
        if !matches!(
            opcode,
            Opcode::New | Opcode::Anewarray | Opcode::Checkcast | Opcode::Instanceof
        ) {
            self.fail(AssembleError::WrongEmitter {
                opcode,
                emitter: "class_op",
            });
            return self;
        }
        let index = self.class_index(class);
        self.op(opcode).u16(index)
    }

    pub fn newarray(&mut self, element: ValueKind) -> &mut Self {
        let code = match element {
            ValueKind::Boolean => 4,
            ValueKind::Char => 5,
            ValueKind::Float => 6,
            ValueKind::Double => 7,
            ValueKind::Byte => 8,
            ValueKind::Short => 9,
            ValueKind::Int => 10,
            ValueKind::Long => 11,
            other => {
                self.fail(AssembleError::ArrayKind(other));
                return self;
            }
        };
        self.op(Opcode::Newarray).raw(code)
    }

    pub fn multianewarray(&mut self, class: &str, dimensions: u8) -> &mut Self {
        let index = self.class_index(class);
        self.op(Opcode::Multianewarray).u16(index).raw(dimensions)
    }

    /// Resolves every jump and returns the finished method body.
    pub fn finish(self) -> AssembleResult<MethodBody> {
        let Assembler {
            mut code,
            pool,
            labels,
            fixups,
            error,
        } = self;
        if let Some(error) = error {
            return Err(error);
        }
        for fixup in fixups {
            let target = labels[fixup.label.0].ok_or(AssembleError::UnboundLabel(fixup.label.0))?;
            let relative = target as i64 - fixup.origin as i64;
            if fixup.wide {
                code[fixup.site..fixup.site + 4].copy_from_slice(&(relative as i32).to_be_bytes());
            } else {
                let narrow = i16::try_from(relative).map_err(|_| AssembleError::OutOfRange {
                    offset: fixup.origin,
                    target,
                })?;
                code[fixup.site..fixup.site + 2].copy_from_slice(&narrow.to_be_bytes());
            }
        }
        Ok(MethodBody::new(code, pool))
    }

    fn class_index(&mut self, class: &str) -> u16 {
        self.pool
            .intern(PoolEntry::Constant(Constant::Class(class.to_owned())))
    }

    fn placeholder(&mut self, origin: usize, label: Label, wide: bool) -> &mut Self {
        self.fixups.push(Fixup {
            origin,
            site: self.code.len(),
            label,
            wide,
        });
        let width = if wide { 4 } else { 2 };
        self.code.resize(self.code.len() + width, 0);
        self
    }

    fn align(&mut self, origin: usize) -> &mut Self {
        self.code.resize(switch_operands_start(origin), 0);
        self
    }

    fn u16(&mut self, value: u16) -> &mut Self {
        self.code.extend_from_slice(&value.to_be_bytes());
        self
    }

    fn u32(&mut self, value: u32) -> &mut Self {
        self.code.extend_from_slice(&value.to_be_bytes());
        self
    }

    fn fail(&mut self, error: AssembleError) {
        self.error.get_or_insert(error);
    }
}
