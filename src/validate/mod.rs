//! Structural and type validation of decoded or hand-built modules.
//!
//! [`validate_module`] checks everything the binary decoder deliberately
//! leaves alone: index bounds across all spaces, limits, export uniqueness,
//! constant expressions, and the operand-stack typing of every function
//! body. Problems accumulate into a [`ValidationErrors`] list ordered
//! module-level checks first, then function bodies in index order.

mod context;
mod error;
mod func;

pub use error::{IndexSpace, Location, ValidationError, ValidationErrors};

use crate::features::Features;
use crate::logging::warn;
use crate::module::{
    ConstExpr, DataMode, ElementItems, ElementMode, ExportKind, ImportDesc, Instruction, Limits,
    Module, Table, ValueType,
};
use context::ModuleContext;
use std::collections::BTreeSet;

/// Largest number of 64 KiB pages a memory may declare.
const MAX_MEMORY_PAGES: u64 = 65536;

/// Check a whole module against the given feature set.
///
/// Returns every problem found, not just the first. A module that decodes
/// successfully can still fail here: the decoder checks structure only,
/// while bounds and types are this pass's job.
pub fn validate_module(module: &Module, features: Features) -> Result<(), ValidationErrors> {
    let ctx = ModuleContext::new(module, features);
    let mut errors = Vec::new();

    check_imports(&ctx, &mut errors);
    check_function_declarations(&ctx, &mut errors);
    check_tables(&ctx, &mut errors);
    check_memories(&ctx, &mut errors);
    check_globals(&ctx, &mut errors);
    check_exports(&ctx, &mut errors);
    check_start(&ctx, &mut errors);
    check_elements(&ctx, &mut errors);
    check_data(&ctx, &mut errors);

    for (i, function) in module.functions.iter().enumerate() {
        let abs = ctx.num_imported_functions + i as u32;
        // A broken type declaration is already recorded; the body cannot
        // be typed without its signature.
        let Some(ty) = ctx.type_at(function.type_index) else {
            continue;
        };
        errors.extend(func::validate_function_body(
            &ctx,
            abs,
            ty,
            &function.locals,
            &function.body,
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        warn!(count = errors.len(), "module failed validation");
        Err(ValidationErrors { errors })
    }
}

fn check_limits(
    limits: &Limits,
    ceiling: u64,
    location: Location,
    errors: &mut Vec<ValidationError>,
) {
    if let Some(max) = limits.max {
        if limits.min > max {
            errors.push(ValidationError::InvalidLimits {
                min: limits.min,
                max,
                location,
            });
        }
    }
    if limits.min > ceiling {
        errors.push(ValidationError::LimitsTooLarge {
            value: limits.min,
            ceiling,
            location,
        });
    } else if let Some(max) = limits.max {
        if max > ceiling {
            errors.push(ValidationError::LimitsTooLarge {
                value: max,
                ceiling,
                location,
            });
        }
    }
}

fn check_imports(ctx: &ModuleContext<'_>, errors: &mut Vec<ValidationError>) {
    for (i, import) in ctx.module.imports.iter().enumerate() {
        let location = Location::Import(i as u32);
        match &import.desc {
            ImportDesc::Func(type_index) => {
                if ctx.type_at(*type_index).is_none() {
                    errors.push(ValidationError::UnknownIndex {
                        space: IndexSpace::Type,
                        index: *type_index,
                        count: ctx.module.types.len() as u32,
                        location,
                    });
                }
            }
            ImportDesc::Table(ty) => {
                check_limits(&ty.limits, u64::from(u32::MAX), location, errors);
            }
            ImportDesc::Memory(ty) => {
                check_limits(&ty.limits, MAX_MEMORY_PAGES, location, errors);
            }
            ImportDesc::Global(_) => {}
        }
    }
}

fn check_function_declarations(ctx: &ModuleContext<'_>, errors: &mut Vec<ValidationError>) {
    for (i, function) in ctx.module.functions.iter().enumerate() {
        if ctx.type_at(function.type_index).is_none() {
            errors.push(ValidationError::UnknownIndex {
                space: IndexSpace::Type,
                index: function.type_index,
                count: ctx.module.types.len() as u32,
                location: Location::Func(ctx.num_imported_functions + i as u32),
            });
        }
    }
}

fn check_tables(ctx: &ModuleContext<'_>, errors: &mut Vec<ValidationError>) {
    let count = ctx.num_tables();
    if count > 1 && !ctx.features.reference_types {
        errors.push(ValidationError::MultipleTables { count });
    }
    for (i, table) in ctx.module.tables.iter().enumerate() {
        let location = Location::Table(ctx.num_imported_tables + i as u32);
        let Table { ty, init } = table;
        check_limits(&ty.limits, u64::from(u32::MAX), location, errors);
        if let Some(init) = init {
            validate_const_expr(ctx, init, ty.element.into(), location, errors);
        }
    }
}

fn check_memories(ctx: &ModuleContext<'_>, errors: &mut Vec<ValidationError>) {
    let count = ctx.num_memories();
    if count > 1 {
        errors.push(ValidationError::MultipleMemories { count });
    }
    for (i, memory) in ctx.module.memories.iter().enumerate() {
        let location = Location::Memory(ctx.num_imported_memories + i as u32);
        check_limits(&memory.limits, MAX_MEMORY_PAGES, location, errors);
    }
}

fn check_globals(ctx: &ModuleContext<'_>, errors: &mut Vec<ValidationError>) {
    for (i, global) in ctx.module.globals.iter().enumerate() {
        let location = Location::Global(ctx.num_imported_globals + i as u32);
        validate_const_expr(ctx, &global.init, global.ty.value, location, errors);
    }
}

fn check_exports(ctx: &ModuleContext<'_>, errors: &mut Vec<ValidationError>) {
    let mut seen = BTreeSet::new();
    for (i, export) in ctx.module.exports.iter().enumerate() {
        let location = Location::Export(i as u32);
        if !seen.insert(export.name.as_str()) {
            errors.push(ValidationError::DuplicateExportName {
                name: export.name.clone(),
            });
        }
        let (space, count) = match export.kind {
            ExportKind::Func => (IndexSpace::Function, ctx.num_functions()),
            ExportKind::Table => (IndexSpace::Table, ctx.num_tables()),
            ExportKind::Memory => (IndexSpace::Memory, ctx.num_memories()),
            ExportKind::Global => (IndexSpace::Global, ctx.num_globals()),
        };
        if export.index >= count {
            errors.push(ValidationError::UnknownIndex {
                space,
                index: export.index,
                count,
                location,
            });
        }
    }
}

fn check_start(ctx: &ModuleContext<'_>, errors: &mut Vec<ValidationError>) {
    let Some(index) = ctx.module.start else {
        return;
    };
    if index >= ctx.num_functions() {
        errors.push(ValidationError::UnknownIndex {
            space: IndexSpace::Function,
            index,
            count: ctx.num_functions(),
            location: Location::Start,
        });
        return;
    }
    if let Some(ty) = ctx.func_type(index) {
        if !ty.params.is_empty() || !ty.results.is_empty() {
            errors.push(ValidationError::InvalidStartSignature);
        }
    }
}

fn check_elements(ctx: &ModuleContext<'_>, errors: &mut Vec<ValidationError>) {
    for (i, element) in ctx.module.elements.iter().enumerate() {
        let location = Location::Element(i as u32);
        match &element.items {
            ElementItems::Functions(indices) => {
                for index in indices {
                    if *index >= ctx.num_functions() {
                        errors.push(ValidationError::UnknownIndex {
                            space: IndexSpace::Function,
                            index: *index,
                            count: ctx.num_functions(),
                            location,
                        });
                    }
                }
            }
            ElementItems::Expressions(exprs) => {
                for expr in exprs {
                    validate_const_expr(ctx, expr, element.ty.into(), location, errors);
                }
            }
        }
        if let ElementMode::Active { table, offset } = &element.mode {
            match ctx.table(*table) {
                Some(ty) => {
                    if ty.element != element.ty {
                        errors.push(ValidationError::TypeMismatch {
                            expected: ty.element.into(),
                            found: element.ty.into(),
                            location,
                        });
                    }
                }
                None => {
                    errors.push(ValidationError::UnknownIndex {
                        space: IndexSpace::Table,
                        index: *table,
                        count: ctx.num_tables(),
                        location,
                    });
                }
            }
            validate_const_expr(ctx, offset, ValueType::I32, location, errors);
        }
    }
}

fn check_data(ctx: &ModuleContext<'_>, errors: &mut Vec<ValidationError>) {
    if let Some(declared) = ctx.module.data_count {
        let defined = ctx.module.data.len() as u32;
        if declared != defined {
            errors.push(ValidationError::DataCountMismatch { declared, defined });
        }
    }
    for (i, data) in ctx.module.data.iter().enumerate() {
        let location = Location::Data(i as u32);
        if let DataMode::Active { memory, offset } = &data.mode {
            if ctx.memory(*memory).is_none() {
                errors.push(ValidationError::UnknownIndex {
                    space: IndexSpace::Memory,
                    index: *memory,
                    count: ctx.num_memories(),
                    location,
                });
            }
            validate_const_expr(ctx, offset, ValueType::I32, location, errors);
        }
    }
}

/// Check a constant expression: only constant instructions, reads of
/// imported immutable globals, and exactly one resulting value of the
/// expected type.
fn validate_const_expr(
    ctx: &ModuleContext<'_>,
    expr: &ConstExpr,
    expected: ValueType,
    location: Location,
    errors: &mut Vec<ValidationError>,
) {
    let mut stack: Vec<ValueType> = Vec::new();
    for instr in &expr.instructions {
        match instr {
            Instruction::I32Const(_) => stack.push(ValueType::I32),
            Instruction::I64Const(_) => stack.push(ValueType::I64),
            Instruction::F32Const(_) => stack.push(ValueType::F32),
            Instruction::F64Const(_) => stack.push(ValueType::F64),
            Instruction::RefNull(ty) => stack.push((*ty).into()),
            Instruction::RefFunc(index) => {
                // A constant ref.func declares the function reference by
                // itself; only the index must exist.
                if *index >= ctx.num_functions() {
                    errors.push(ValidationError::UnknownIndex {
                        space: IndexSpace::Function,
                        index: *index,
                        count: ctx.num_functions(),
                        location,
                    });
                }
                stack.push(ValueType::FuncRef);
            }
            Instruction::GlobalGet(index) => match ctx.global(*index) {
                Some(ty) => {
                    if *index >= ctx.num_imported_globals {
                        errors.push(ValidationError::ConstExprGlobalNotImported {
                            index: *index,
                            location,
                        });
                    } else if ty.mutable {
                        errors.push(ValidationError::NonConstantInstruction { location });
                    }
                    stack.push(ty.value);
                }
                None => {
                    errors.push(ValidationError::UnknownIndex {
                        space: IndexSpace::Global,
                        index: *index,
                        count: ctx.num_globals(),
                        location,
                    });
                    stack.push(expected);
                }
            },
            _ => {
                errors.push(ValidationError::NonConstantInstruction { location });
                return;
            }
        }
    }
    if stack.len() != 1 {
        errors.push(ValidationError::ConstExprArity {
            found: stack.len(),
            location,
        });
        return;
    }
    if let Some(found) = stack.first().copied() {
        if found != expected {
            errors.push(ValidationError::TypeMismatch {
                expected,
                found,
                location,
            });
        }
    }
}
