//! Operand-stack typing of function bodies.
//!
//! The validator simulates the operand stack with abstract types. Each open
//! block keeps a frame with its height floor; popping below the floor is an
//! underflow unless the frame is in unreachable state, where missing
//! operands materialize as [`Operand::Unknown`] and match anything.
//!
//! Errors accumulate instead of aborting. After a mistake the validator
//! resynchronizes: known result types are pushed as declared, unknowable
//! ones degrade the current frame to unreachable so one bad index does not
//! cascade into a page of noise.

use crate::module::{
    BlockType, FunctionType, Instruction, MemArg, RefType, TableType, ValueType,
};
use crate::validate::context::ModuleContext;
use crate::validate::error::{IndexSpace, Location, ValidationError};

/// A slot of the abstract operand stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    /// Produced below an unreachable point; compatible with every type.
    Unknown,
    Val(ValueType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Body,
    Block,
    Loop,
    If,
    Else,
}

#[derive(Debug, Clone)]
struct Frame {
    kind: FrameKind,
    params: Vec<ValueType>,
    results: Vec<ValueType>,
    /// Operand stack height when the frame was opened; pops stop here.
    height: usize,
    unreachable: bool,
}

impl Frame {
    /// What a branch to this frame's label must provide: loops re-enter at
    /// the top, every other frame exits at the bottom.
    fn label_types(&self) -> &[ValueType] {
        if self.kind == FrameKind::Loop {
            &self.params
        } else {
            &self.results
        }
    }
}

pub(crate) fn validate_function_body(
    ctx: &ModuleContext<'_>,
    func: u32,
    ty: &FunctionType,
    locals: &[ValueType],
    body: &[Instruction],
) -> Vec<ValidationError> {
    let mut all_locals = Vec::with_capacity(ty.params.len() + locals.len());
    all_locals.extend_from_slice(&ty.params);
    all_locals.extend_from_slice(locals);

    let mut v = FuncValidator {
        ctx,
        func,
        locals: all_locals,
        operands: Vec::new(),
        frames: vec![Frame {
            kind: FrameKind::Body,
            params: Vec::new(),
            results: ty.results.clone(),
            height: 0,
            unreachable: false,
        }],
        index: 0,
        body_len: body.len(),
        errors: Vec::new(),
    };
    for (index, instr) in body.iter().enumerate() {
        v.index = index;
        v.visit(instr);
    }
    v.index = body.len();
    v.finish()
}

struct FuncValidator<'v, 'm> {
    ctx: &'v ModuleContext<'m>,
    func: u32,
    locals: Vec<ValueType>,
    operands: Vec<Operand>,
    frames: Vec<Frame>,
    index: usize,
    body_len: usize,
    errors: Vec<ValidationError>,
}

impl FuncValidator<'_, '_> {
    fn location(&self) -> Location {
        if self.index < self.body_len {
            Location::Instr {
                func: self.func,
                index: self.index,
            }
        } else {
            Location::Func(self.func)
        }
    }

    fn record(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    fn floor(&self) -> usize {
        self.frames.last().map_or(0, |f| f.height)
    }

    fn top_unreachable(&self) -> bool {
        self.frames.last().is_some_and(|f| f.unreachable)
    }

    fn pop(&mut self) -> Operand {
        if self.operands.len() == self.floor() {
            if !self.top_unreachable() {
                self.record(ValidationError::StackUnderflow {
                    location: self.location(),
                });
            }
            Operand::Unknown
        } else {
            self.operands.pop().unwrap_or(Operand::Unknown)
        }
    }

    fn pop_expect(&mut self, expected: ValueType) {
        if let Operand::Val(found) = self.pop() {
            if found != expected {
                self.record(ValidationError::TypeMismatch {
                    expected,
                    found,
                    location: self.location(),
                });
            }
        }
    }

    fn pop_many(&mut self, types: &[ValueType]) {
        for ty in types.iter().rev() {
            self.pop_expect(*ty);
        }
    }

    fn push(&mut self, ty: ValueType) {
        self.operands.push(Operand::Val(ty));
    }

    fn push_unknown(&mut self) {
        self.operands.push(Operand::Unknown);
    }

    fn push_many(&mut self, types: &[ValueType]) {
        for ty in types {
            self.push(*ty);
        }
    }

    /// Open a frame. The caller has already popped the parameters; they are
    /// pushed back as the frame's starting operands.
    fn push_frame(&mut self, kind: FrameKind, params: Vec<ValueType>, results: Vec<ValueType>) {
        let height = self.operands.len();
        for ty in &params {
            self.operands.push(Operand::Val(*ty));
        }
        self.frames.push(Frame {
            kind,
            params,
            results,
            height,
            unreachable: false,
        });
    }

    /// Close the top frame: its results must sit on the stack and nothing
    /// else above the floor. Extra values are reported and discarded.
    fn pop_frame(&mut self) -> Option<Frame> {
        let (results, height) = match self.frames.last() {
            Some(f) => (f.results.clone(), f.height),
            None => return None,
        };
        self.pop_many(&results);
        if self.operands.len() != height {
            self.record(ValidationError::StackHeightMismatch {
                expected: results.len(),
                found: results.len() + self.operands.len() - height,
                location: self.location(),
            });
            self.operands.truncate(height);
        }
        self.frames.pop()
    }

    /// Enter unreachable state: the rest of the frame types against a
    /// polymorphic stack.
    fn make_unreachable(&mut self) {
        let floor = self.floor();
        self.operands.truncate(floor);
        if let Some(frame) = self.frames.last_mut() {
            frame.unreachable = true;
        }
    }

    fn block_signature(&mut self, bt: BlockType) -> (Vec<ValueType>, Vec<ValueType>) {
        match bt {
            BlockType::Empty => (Vec::new(), Vec::new()),
            BlockType::Value(ty) => (Vec::new(), vec![ty]),
            BlockType::Func(index) => match self.ctx.type_at(index) {
                Some(ty) => (ty.params.clone(), ty.results.clone()),
                None => {
                    self.record(ValidationError::UnknownIndex {
                        space: IndexSpace::Type,
                        index,
                        count: self.ctx.module.types.len() as u32,
                        location: self.location(),
                    });
                    (Vec::new(), Vec::new())
                }
            },
        }
    }

    /// Label types reachable by a branch of the given depth, or a recorded
    /// error when the depth leaves the frame stack.
    fn label_types_at(&mut self, depth: u32) -> Option<Vec<ValueType>> {
        let index = self
            .frames
            .len()
            .checked_sub(1)?
            .checked_sub(depth as usize);
        match index.and_then(|i| self.frames.get(i)) {
            Some(frame) => Some(frame.label_types().to_vec()),
            None => {
                self.record(ValidationError::BranchDepthOutOfRange {
                    depth,
                    max: self.frames.len().saturating_sub(1),
                    location: self.location(),
                });
                None
            }
        }
    }

    fn gate(&mut self, enabled: bool, instruction: &'static str, feature: &'static str) {
        if !enabled {
            self.record(ValidationError::FeatureDisabled {
                instruction,
                feature,
                location: self.location(),
            });
        }
    }

    fn gate_refs(&mut self, instruction: &'static str) {
        self.gate(self.ctx.features.reference_types, instruction, "reference-types");
    }

    fn gate_bulk(&mut self, instruction: &'static str) {
        self.gate(self.ctx.features.bulk_memory, instruction, "bulk-memory");
    }

    fn gate_sat(&mut self, instruction: &'static str) {
        self.gate(
            self.ctx.features.saturating_float_to_int,
            instruction,
            "saturating-float-to-int",
        );
    }

    fn check_memory(&mut self, index: u32) {
        if self.ctx.memory(index).is_none() {
            self.record(ValidationError::UnknownIndex {
                space: IndexSpace::Memory,
                index,
                count: self.ctx.num_memories(),
                location: self.location(),
            });
        }
    }

    fn check_table(&mut self, index: u32) -> Option<TableType> {
        let table = self.ctx.table(index).copied();
        if table.is_none() {
            self.record(ValidationError::UnknownIndex {
                space: IndexSpace::Table,
                index,
                count: self.ctx.num_tables(),
                location: self.location(),
            });
        }
        table
    }

    fn check_element(&mut self, index: u32) -> Option<RefType> {
        let ty = self.ctx.module.elements.get(index as usize).map(|e| e.ty);
        if ty.is_none() {
            self.record(ValidationError::UnknownIndex {
                space: IndexSpace::Element,
                index,
                count: self.ctx.num_elements(),
                location: self.location(),
            });
        }
        ty
    }

    fn check_data(&mut self, index: u32) {
        if index >= self.ctx.num_data() {
            self.record(ValidationError::UnknownIndex {
                space: IndexSpace::Data,
                index,
                count: self.ctx.num_data(),
                location: self.location(),
            });
        }
        if self.ctx.module.data_count.is_none() {
            self.record(ValidationError::RequiresDataCount {
                location: self.location(),
            });
        }
    }

    /// Memory access with the natural alignment exponent of the access
    /// width; the declared alignment may not exceed it.
    fn check_access(&mut self, memarg: &MemArg, natural: u32) {
        self.check_memory(0);
        if memarg.align > natural {
            self.record(ValidationError::InvalidAlignment {
                align: memarg.align,
                natural,
                location: self.location(),
            });
        }
    }

    fn load(&mut self, memarg: &MemArg, natural: u32, result: ValueType) {
        self.check_access(memarg, natural);
        self.pop_expect(ValueType::I32);
        self.push(result);
    }

    fn store(&mut self, memarg: &MemArg, natural: u32, value: ValueType) {
        self.check_access(memarg, natural);
        self.pop_expect(value);
        self.pop_expect(ValueType::I32);
    }

    fn unary(&mut self, operand: ValueType, result: ValueType) {
        self.pop_expect(operand);
        self.push(result);
    }

    fn binary(&mut self, operand: ValueType, result: ValueType) {
        self.pop_expect(operand);
        self.pop_expect(operand);
        self.push(result);
    }

    fn visit(&mut self, instr: &Instruction) {
        use ValueType::{F32, F64, I32, I64};
        match instr {
            Instruction::Unreachable => self.make_unreachable(),
            Instruction::Nop => {}

            Instruction::Block(bt) => {
                let (params, results) = self.block_signature(*bt);
                self.pop_many(&params);
                self.push_frame(FrameKind::Block, params, results);
            }
            Instruction::Loop(bt) => {
                let (params, results) = self.block_signature(*bt);
                self.pop_many(&params);
                self.push_frame(FrameKind::Loop, params, results);
            }
            Instruction::If(bt) => {
                self.pop_expect(I32);
                let (params, results) = self.block_signature(*bt);
                self.pop_many(&params);
                self.push_frame(FrameKind::If, params, results);
            }
            Instruction::Else => {
                if self.frames.last().map(|f| f.kind) == Some(FrameKind::If) {
                    if let Some(frame) = self.pop_frame() {
                        self.push_frame(FrameKind::Else, frame.params, frame.results);
                    }
                } else {
                    self.record(ValidationError::ElseWithoutIf {
                        location: self.location(),
                    });
                }
            }
            Instruction::End => {
                if self.frames.len() <= 1 {
                    self.record(ValidationError::UnexpectedEnd {
                        location: self.location(),
                    });
                } else if let Some(frame) = self.pop_frame() {
                    if frame.kind == FrameKind::If && frame.params != frame.results {
                        self.record(ValidationError::MissingElse {
                            location: self.location(),
                        });
                    }
                    self.push_many(&frame.results);
                }
            }

            Instruction::Br(depth) => {
                if let Some(types) = self.label_types_at(*depth) {
                    self.pop_many(&types);
                }
                self.make_unreachable();
            }
            Instruction::BrIf(depth) => {
                self.pop_expect(I32);
                if let Some(types) = self.label_types_at(*depth) {
                    self.pop_many(&types);
                    self.push_many(&types);
                }
            }
            Instruction::BrTable { targets, default } => {
                self.pop_expect(I32);
                if let Some(default_types) = self.label_types_at(*default) {
                    for target in targets {
                        if let Some(types) = self.label_types_at(*target) {
                            if types != default_types {
                                self.record(ValidationError::BranchTableTypeMismatch {
                                    location: self.location(),
                                });
                            }
                        }
                    }
                    self.pop_many(&default_types);
                }
                self.make_unreachable();
            }
            Instruction::Return => {
                let results = self
                    .frames
                    .first()
                    .map(|f| f.results.clone())
                    .unwrap_or_default();
                self.pop_many(&results);
                self.make_unreachable();
            }
            Instruction::Call(index) => match self.ctx.func_type(*index).cloned() {
                Some(ty) => {
                    self.pop_many(&ty.params);
                    self.push_many(&ty.results);
                }
                None => {
                    if *index >= self.ctx.num_functions() {
                        self.record(ValidationError::UnknownIndex {
                            space: IndexSpace::Function,
                            index: *index,
                            count: self.ctx.num_functions(),
                            location: self.location(),
                        });
                    }
                    self.make_unreachable();
                }
            },
            Instruction::CallIndirect { type_index, table } => {
                if let Some(tt) = self.check_table(*table) {
                    if tt.element != RefType::Func {
                        self.record(ValidationError::TypeMismatch {
                            expected: ValueType::FuncRef,
                            found: tt.element.into(),
                            location: self.location(),
                        });
                    }
                }
                self.pop_expect(I32);
                match self.ctx.type_at(*type_index).cloned() {
                    Some(ty) => {
                        self.pop_many(&ty.params);
                        self.push_many(&ty.results);
                    }
                    None => {
                        self.record(ValidationError::UnknownIndex {
                            space: IndexSpace::Type,
                            index: *type_index,
                            count: self.ctx.module.types.len() as u32,
                            location: self.location(),
                        });
                        self.make_unreachable();
                    }
                }
            }

            Instruction::Drop => {
                self.pop();
            }
            Instruction::Select => {
                self.pop_expect(I32);
                let second = self.pop();
                let first = self.pop();
                for op in [first, second] {
                    if let Operand::Val(found) = op {
                        if found.is_ref() {
                            self.record(ValidationError::ExpectedNumeric {
                                found,
                                location: self.location(),
                            });
                        }
                    }
                }
                match (first, second) {
                    (Operand::Val(a), Operand::Val(b)) => {
                        if a != b {
                            self.record(ValidationError::SelectOperandMismatch {
                                first: a,
                                second: b,
                                location: self.location(),
                            });
                        }
                        self.push(a);
                    }
                    (Operand::Val(a), Operand::Unknown)
                    | (Operand::Unknown, Operand::Val(a)) => self.push(a),
                    (Operand::Unknown, Operand::Unknown) => self.push_unknown(),
                }
            }
            Instruction::TypedSelect(types) => {
                self.gate_refs("select");
                if types.len() != 1 {
                    self.record(ValidationError::SelectArity {
                        count: types.len(),
                        location: self.location(),
                    });
                }
                self.pop_expect(I32);
                match types.first() {
                    Some(ty) => {
                        self.pop_expect(*ty);
                        self.pop_expect(*ty);
                        self.push(*ty);
                    }
                    None => {
                        self.pop();
                        self.pop();
                        self.push_unknown();
                    }
                }
            }

            Instruction::LocalGet(index) => match self.locals.get(*index as usize).copied() {
                Some(ty) => self.push(ty),
                None => {
                    self.record_local_error(*index);
                    self.push_unknown();
                }
            },
            Instruction::LocalSet(index) => match self.locals.get(*index as usize).copied() {
                Some(ty) => self.pop_expect(ty),
                None => {
                    self.record_local_error(*index);
                    self.pop();
                }
            },
            Instruction::LocalTee(index) => match self.locals.get(*index as usize).copied() {
                Some(ty) => {
                    self.pop_expect(ty);
                    self.push(ty);
                }
                None => {
                    self.record_local_error(*index);
                    self.pop();
                    self.push_unknown();
                }
            },
            Instruction::GlobalGet(index) => match self.ctx.global(*index) {
                Some(ty) => {
                    let value = ty.value;
                    self.push(value);
                }
                None => {
                    self.record_global_error(*index);
                    self.push_unknown();
                }
            },
            Instruction::GlobalSet(index) => match self.ctx.global(*index).copied() {
                Some(ty) => {
                    if !ty.mutable {
                        self.record(ValidationError::ImmutableGlobal {
                            index: *index,
                            location: self.location(),
                        });
                    }
                    self.pop_expect(ty.value);
                }
                None => {
                    self.record_global_error(*index);
                    self.pop();
                }
            },

            Instruction::TableGet(index) => {
                self.gate_refs("table.get");
                match self.check_table(*index) {
                    Some(tt) => {
                        self.pop_expect(I32);
                        self.push(tt.element.into());
                    }
                    None => {
                        self.pop_expect(I32);
                        self.push_unknown();
                    }
                }
            }
            Instruction::TableSet(index) => {
                self.gate_refs("table.set");
                match self.check_table(*index) {
                    Some(tt) => {
                        self.pop_expect(tt.element.into());
                        self.pop_expect(I32);
                    }
                    None => {
                        self.pop();
                        self.pop_expect(I32);
                    }
                }
            }

            Instruction::I32Load(m) => self.load(m, 2, I32),
            Instruction::I64Load(m) => self.load(m, 3, I64),
            Instruction::F32Load(m) => self.load(m, 2, F32),
            Instruction::F64Load(m) => self.load(m, 3, F64),
            Instruction::I32Load8S(m) | Instruction::I32Load8U(m) => self.load(m, 0, I32),
            Instruction::I32Load16S(m) | Instruction::I32Load16U(m) => self.load(m, 1, I32),
            Instruction::I64Load8S(m) | Instruction::I64Load8U(m) => self.load(m, 0, I64),
            Instruction::I64Load16S(m) | Instruction::I64Load16U(m) => self.load(m, 1, I64),
            Instruction::I64Load32S(m) | Instruction::I64Load32U(m) => self.load(m, 2, I64),

            Instruction::I32Store(m) => self.store(m, 2, I32),
            Instruction::I64Store(m) => self.store(m, 3, I64),
            Instruction::F32Store(m) => self.store(m, 2, F32),
            Instruction::F64Store(m) => self.store(m, 3, F64),
            Instruction::I32Store8(m) => self.store(m, 0, I32),
            Instruction::I32Store16(m) => self.store(m, 1, I32),
            Instruction::I64Store8(m) => self.store(m, 0, I64),
            Instruction::I64Store16(m) => self.store(m, 1, I64),
            Instruction::I64Store32(m) => self.store(m, 2, I64),

            Instruction::MemorySize(index) => {
                self.check_memory(*index);
                self.push(I32);
            }
            Instruction::MemoryGrow(index) => {
                self.check_memory(*index);
                self.pop_expect(I32);
                self.push(I32);
            }

            Instruction::I32Const(_) => self.push(I32),
            Instruction::I64Const(_) => self.push(I64),
            Instruction::F32Const(_) => self.push(F32),
            Instruction::F64Const(_) => self.push(F64),

            Instruction::I32Eqz => self.unary(I32, I32),
            Instruction::I32Eq
            | Instruction::I32Ne
            | Instruction::I32LtS
            | Instruction::I32LtU
            | Instruction::I32GtS
            | Instruction::I32GtU
            | Instruction::I32LeS
            | Instruction::I32LeU
            | Instruction::I32GeS
            | Instruction::I32GeU => self.binary(I32, I32),

            Instruction::I64Eqz => self.unary(I64, I32),
            Instruction::I64Eq
            | Instruction::I64Ne
            | Instruction::I64LtS
            | Instruction::I64LtU
            | Instruction::I64GtS
            | Instruction::I64GtU
            | Instruction::I64LeS
            | Instruction::I64LeU
            | Instruction::I64GeS
            | Instruction::I64GeU => self.binary(I64, I32),

            Instruction::F32Eq
            | Instruction::F32Ne
            | Instruction::F32Lt
            | Instruction::F32Gt
            | Instruction::F32Le
            | Instruction::F32Ge => self.binary(F32, I32),

            Instruction::F64Eq
            | Instruction::F64Ne
            | Instruction::F64Lt
            | Instruction::F64Gt
            | Instruction::F64Le
            | Instruction::F64Ge => self.binary(F64, I32),

            Instruction::I32Clz | Instruction::I32Ctz | Instruction::I32Popcnt => {
                self.unary(I32, I32)
            }
            Instruction::I32Add
            | Instruction::I32Sub
            | Instruction::I32Mul
            | Instruction::I32DivS
            | Instruction::I32DivU
            | Instruction::I32RemS
            | Instruction::I32RemU
            | Instruction::I32And
            | Instruction::I32Or
            | Instruction::I32Xor
            | Instruction::I32Shl
            | Instruction::I32ShrS
            | Instruction::I32ShrU
            | Instruction::I32Rotl
            | Instruction::I32Rotr => self.binary(I32, I32),

            Instruction::I64Clz | Instruction::I64Ctz | Instruction::I64Popcnt => {
                self.unary(I64, I64)
            }
            Instruction::I64Add
            | Instruction::I64Sub
            | Instruction::I64Mul
            | Instruction::I64DivS
            | Instruction::I64DivU
            | Instruction::I64RemS
            | Instruction::I64RemU
            | Instruction::I64And
            | Instruction::I64Or
            | Instruction::I64Xor
            | Instruction::I64Shl
            | Instruction::I64ShrS
            | Instruction::I64ShrU
            | Instruction::I64Rotl
            | Instruction::I64Rotr => self.binary(I64, I64),

            Instruction::F32Abs
            | Instruction::F32Neg
            | Instruction::F32Ceil
            | Instruction::F32Floor
            | Instruction::F32Trunc
            | Instruction::F32Nearest
            | Instruction::F32Sqrt => self.unary(F32, F32),
            Instruction::F32Add
            | Instruction::F32Sub
            | Instruction::F32Mul
            | Instruction::F32Div
            | Instruction::F32Min
            | Instruction::F32Max
            | Instruction::F32Copysign => self.binary(F32, F32),

            Instruction::F64Abs
            | Instruction::F64Neg
            | Instruction::F64Ceil
            | Instruction::F64Floor
            | Instruction::F64Trunc
            | Instruction::F64Nearest
            | Instruction::F64Sqrt => self.unary(F64, F64),
            Instruction::F64Add
            | Instruction::F64Sub
            | Instruction::F64Mul
            | Instruction::F64Div
            | Instruction::F64Min
            | Instruction::F64Max
            | Instruction::F64Copysign => self.binary(F64, F64),

            Instruction::I32WrapI64 => self.unary(I64, I32),
            Instruction::I32TruncF32S | Instruction::I32TruncF32U => self.unary(F32, I32),
            Instruction::I32TruncF64S | Instruction::I32TruncF64U => self.unary(F64, I32),
            Instruction::I64ExtendI32S | Instruction::I64ExtendI32U => self.unary(I32, I64),
            Instruction::I64TruncF32S | Instruction::I64TruncF32U => self.unary(F32, I64),
            Instruction::I64TruncF64S | Instruction::I64TruncF64U => self.unary(F64, I64),
            Instruction::F32ConvertI32S | Instruction::F32ConvertI32U => self.unary(I32, F32),
            Instruction::F32ConvertI64S | Instruction::F32ConvertI64U => self.unary(I64, F32),
            Instruction::F32DemoteF64 => self.unary(F64, F32),
            Instruction::F64ConvertI32S | Instruction::F64ConvertI32U => self.unary(I32, F64),
            Instruction::F64ConvertI64S | Instruction::F64ConvertI64U => self.unary(I64, F64),
            Instruction::F64PromoteF32 => self.unary(F32, F64),
            Instruction::I32ReinterpretF32 => self.unary(F32, I32),
            Instruction::I64ReinterpretF64 => self.unary(F64, I64),
            Instruction::F32ReinterpretI32 => self.unary(I32, F32),
            Instruction::F64ReinterpretI64 => self.unary(I64, F64),

            Instruction::I32Extend8S | Instruction::I32Extend16S => self.unary(I32, I32),
            Instruction::I64Extend8S
            | Instruction::I64Extend16S
            | Instruction::I64Extend32S => self.unary(I64, I64),

            Instruction::RefNull(ty) => {
                self.gate_refs("ref.null");
                self.push((*ty).into());
            }
            Instruction::RefIsNull => {
                self.gate_refs("ref.is_null");
                if let Operand::Val(found) = self.pop() {
                    if !found.is_ref() {
                        self.record(ValidationError::ExpectedReference {
                            found,
                            location: self.location(),
                        });
                    }
                }
                self.push(I32);
            }
            Instruction::RefFunc(index) => {
                self.gate_refs("ref.func");
                if *index >= self.ctx.num_functions() {
                    self.record(ValidationError::UnknownIndex {
                        space: IndexSpace::Function,
                        index: *index,
                        count: self.ctx.num_functions(),
                        location: self.location(),
                    });
                } else if !self.ctx.refs.contains(index) {
                    self.record(ValidationError::UndeclaredFunctionReference {
                        index: *index,
                        location: self.location(),
                    });
                }
                self.push(ValueType::FuncRef);
            }

            Instruction::I32TruncSatF32S | Instruction::I32TruncSatF32U => {
                self.gate_sat("i32.trunc_sat_f32");
                self.unary(F32, I32);
            }
            Instruction::I32TruncSatF64S | Instruction::I32TruncSatF64U => {
                self.gate_sat("i32.trunc_sat_f64");
                self.unary(F64, I32);
            }
            Instruction::I64TruncSatF32S | Instruction::I64TruncSatF32U => {
                self.gate_sat("i64.trunc_sat_f32");
                self.unary(F32, I64);
            }
            Instruction::I64TruncSatF64S | Instruction::I64TruncSatF64U => {
                self.gate_sat("i64.trunc_sat_f64");
                self.unary(F64, I64);
            }

            Instruction::MemoryInit { data, memory } => {
                self.gate_bulk("memory.init");
                self.check_memory(*memory);
                self.check_data(*data);
                self.pop_expect(I32);
                self.pop_expect(I32);
                self.pop_expect(I32);
            }
            Instruction::DataDrop(index) => {
                self.gate_bulk("data.drop");
                self.check_data(*index);
            }
            Instruction::MemoryCopy { dst, src } => {
                self.gate_bulk("memory.copy");
                self.check_memory(*dst);
                self.check_memory(*src);
                self.pop_expect(I32);
                self.pop_expect(I32);
                self.pop_expect(I32);
            }
            Instruction::MemoryFill(index) => {
                self.gate_bulk("memory.fill");
                self.check_memory(*index);
                self.pop_expect(I32);
                self.pop_expect(I32);
                self.pop_expect(I32);
            }
            Instruction::TableInit { element, table } => {
                self.gate_bulk("table.init");
                let table_ty = self.check_table(*table);
                let elem_ty = self.check_element(*element);
                if let (Some(tt), Some(et)) = (table_ty, elem_ty) {
                    if et != tt.element {
                        self.record(ValidationError::TypeMismatch {
                            expected: tt.element.into(),
                            found: et.into(),
                            location: self.location(),
                        });
                    }
                }
                self.pop_expect(I32);
                self.pop_expect(I32);
                self.pop_expect(I32);
            }
            Instruction::ElemDrop(index) => {
                self.gate_bulk("elem.drop");
                self.check_element(*index);
            }
            Instruction::TableCopy { dst, src } => {
                self.gate_bulk("table.copy");
                let dst_ty = self.check_table(*dst);
                let src_ty = self.check_table(*src);
                if let (Some(d), Some(s)) = (dst_ty, src_ty) {
                    if d.element != s.element {
                        self.record(ValidationError::TypeMismatch {
                            expected: d.element.into(),
                            found: s.element.into(),
                            location: self.location(),
                        });
                    }
                }
                self.pop_expect(I32);
                self.pop_expect(I32);
                self.pop_expect(I32);
            }
            Instruction::TableGrow(index) => {
                self.gate_refs("table.grow");
                match self.check_table(*index) {
                    Some(tt) => {
                        self.pop_expect(I32);
                        self.pop_expect(tt.element.into());
                    }
                    None => {
                        self.pop_expect(I32);
                        self.pop();
                    }
                }
                self.push(I32);
            }
            Instruction::TableSize(index) => {
                self.gate_refs("table.size");
                self.check_table(*index);
                self.push(I32);
            }
            Instruction::TableFill(index) => {
                self.gate_refs("table.fill");
                match self.check_table(*index) {
                    Some(tt) => {
                        self.pop_expect(I32);
                        self.pop_expect(tt.element.into());
                        self.pop_expect(I32);
                    }
                    None => {
                        self.pop_expect(I32);
                        self.pop();
                        self.pop_expect(I32);
                    }
                }
            }
        }
    }

    fn record_local_error(&mut self, index: u32) {
        self.record(ValidationError::UnknownIndex {
            space: IndexSpace::Local,
            index,
            count: self.locals.len() as u32,
            location: self.location(),
        });
    }

    fn record_global_error(&mut self, index: u32) {
        self.record(ValidationError::UnknownIndex {
            space: IndexSpace::Global,
            index,
            count: self.ctx.num_globals(),
            location: self.location(),
        });
    }

    /// The implicit end of the body: all blocks closed and exactly the
    /// declared results on the stack.
    fn finish(mut self) -> Vec<ValidationError> {
        if self.frames.len() > 1 {
            self.record(ValidationError::UnclosedBlock {
                depth: self.frames.len() - 1,
                location: Location::Func(self.func),
            });
            return self.errors;
        }
        let results = self
            .frames
            .first()
            .map(|f| f.results.clone())
            .unwrap_or_default();
        self.pop_many(&results);
        if !self.operands.is_empty() {
            self.record(ValidationError::StackHeightMismatch {
                expected: results.len(),
                found: results.len() + self.operands.len(),
                location: Location::Func(self.func),
            });
        }
        self.errors
    }
}
