//! Flattened view of a module's index spaces.
//!
//! Imports come first in every index space, so the validator works against
//! precomputed vectors instead of re-walking the import list on every
//! lookup.

use std::collections::BTreeSet;

use crate::features::Features;
use crate::module::{
    ConstExpr, ElementItems, ElementMode, ExportKind, FunctionType, GlobalType, ImportDesc,
    Instruction, MemoryType, Module, TableType,
};

pub(crate) struct ModuleContext<'a> {
    pub module: &'a Module,
    pub features: Features,
    /// Type index per function, imports first.
    pub func_types: Vec<u32>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<GlobalType>,
    pub num_imported_functions: u32,
    pub num_imported_tables: u32,
    pub num_imported_memories: u32,
    pub num_imported_globals: u32,
    /// Function indices that appear outside any function body; only these
    /// may be taken as `ref.func` operands inside one.
    pub refs: BTreeSet<u32>,
}

impl<'a> ModuleContext<'a> {
    pub(crate) fn new(module: &'a Module, features: Features) -> Self {
        let mut func_types = Vec::new();
        let mut tables = Vec::new();
        let mut memories = Vec::new();
        let mut globals = Vec::new();

        for import in &module.imports {
            match &import.desc {
                ImportDesc::Func(type_index) => func_types.push(*type_index),
                ImportDesc::Table(ty) => tables.push(*ty),
                ImportDesc::Memory(ty) => memories.push(*ty),
                ImportDesc::Global(ty) => globals.push(*ty),
            }
        }
        let num_imported_functions = func_types.len() as u32;
        let num_imported_tables = tables.len() as u32;
        let num_imported_memories = memories.len() as u32;
        let num_imported_globals = globals.len() as u32;

        func_types.extend(module.functions.iter().map(|f| f.type_index));
        tables.extend(module.tables.iter().map(|t| t.ty));
        memories.extend(module.memories.iter().copied());
        globals.extend(module.globals.iter().map(|g| g.ty));

        let refs = collect_refs(module);

        ModuleContext {
            module,
            features,
            func_types,
            tables,
            memories,
            globals,
            num_imported_functions,
            num_imported_tables,
            num_imported_memories,
            num_imported_globals,
            refs,
        }
    }

    pub(crate) fn type_at(&self, index: u32) -> Option<&FunctionType> {
        self.module.types.get(index as usize)
    }

    /// The signature of a function by its index in the joint space.
    pub(crate) fn func_type(&self, func: u32) -> Option<&FunctionType> {
        let type_index = *self.func_types.get(func as usize)?;
        self.type_at(type_index)
    }

    pub(crate) fn table(&self, index: u32) -> Option<&TableType> {
        self.tables.get(index as usize)
    }

    pub(crate) fn memory(&self, index: u32) -> Option<&MemoryType> {
        self.memories.get(index as usize)
    }

    pub(crate) fn global(&self, index: u32) -> Option<&GlobalType> {
        self.globals.get(index as usize)
    }

    pub(crate) fn num_functions(&self) -> u32 {
        self.func_types.len() as u32
    }

    pub(crate) fn num_tables(&self) -> u32 {
        self.tables.len() as u32
    }

    pub(crate) fn num_memories(&self) -> u32 {
        self.memories.len() as u32
    }

    pub(crate) fn num_globals(&self) -> u32 {
        self.globals.len() as u32
    }

    pub(crate) fn num_elements(&self) -> u32 {
        self.module.elements.len() as u32
    }

    pub(crate) fn num_data(&self) -> u32 {
        self.module.data.len() as u32
    }
}

fn add_expr_refs(refs: &mut BTreeSet<u32>, expr: &ConstExpr) {
    for instr in &expr.instructions {
        if let Instruction::RefFunc(index) = instr {
            refs.insert(*index);
        }
    }
}

/// Function indices occurring anywhere outside function bodies and the
/// start entry: exports, global initializers, table initializers, element
/// and data segments.
fn collect_refs(module: &Module) -> BTreeSet<u32> {
    let mut refs = BTreeSet::new();
    for export in &module.exports {
        if export.kind == ExportKind::Func {
            refs.insert(export.index);
        }
    }
    for global in &module.globals {
        add_expr_refs(&mut refs, &global.init);
    }
    for table in &module.tables {
        if let Some(init) = &table.init {
            add_expr_refs(&mut refs, init);
        }
    }
    for element in &module.elements {
        match &element.items {
            ElementItems::Functions(indices) => refs.extend(indices.iter().copied()),
            ElementItems::Expressions(exprs) => {
                for expr in exprs {
                    add_expr_refs(&mut refs, expr);
                }
            }
        }
        if let ElementMode::Active { offset, .. } = &element.mode {
            add_expr_refs(&mut refs, offset);
        }
    }
    for data in &module.data {
        if let crate::module::DataMode::Active { offset, .. } = &data.mode {
            add_expr_refs(&mut refs, offset);
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Export, Limits, RefType, ValueType};

    #[test]
    fn test_imports_precede_defined() {
        let module = Module::builder()
            .function_type(FunctionType::new(vec![], vec![]))
            .function_type(FunctionType::new(vec![ValueType::I32], vec![]))
            .import(
                "env",
                "f",
                ImportDesc::Func(1),
            )
            .function(0, vec![], vec![])
            .build();
        let ctx = ModuleContext::new(&module, Features::default());
        assert_eq!(ctx.func_types, vec![1, 0]);
        assert_eq!(ctx.num_imported_functions, 1);
        assert_eq!(ctx.num_functions(), 2);
        assert_eq!(
            ctx.func_type(0).map(|t| t.params.len()),
            Some(1)
        );
    }

    #[test]
    fn test_refs_from_exports_and_elements() {
        let module = Module {
            exports: vec![Export {
                name: "f".to_string(),
                kind: ExportKind::Func,
                index: 4,
            }],
            elements: vec![crate::module::Element {
                ty: RefType::Func,
                items: ElementItems::Functions(vec![1, 2]),
                mode: ElementMode::Passive,
            }],
            ..Module::default()
        };
        let refs = collect_refs(&module);
        assert!(refs.contains(&4));
        assert!(refs.contains(&1));
        assert!(refs.contains(&2));
        assert!(!refs.contains(&0));
    }

    #[test]
    fn test_imported_table_counted() {
        let module = Module::builder()
            .import(
                "env",
                "t",
                ImportDesc::Table(TableType {
                    element: RefType::Func,
                    limits: Limits { min: 1, max: None },
                }),
            )
            .build();
        let ctx = ModuleContext::new(&module, Features::default());
        assert_eq!(ctx.num_tables(), 1);
        assert_eq!(ctx.table(0).map(|t| t.element), Some(RefType::Func));
    }
}
