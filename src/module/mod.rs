//! The in-memory module representation.
//!
//! A [`Module`] is an immutable snapshot of one binary module: flat ordered
//! sequences cross-referenced by integer indices, never by pointers. The
//! decoder produces one, the validator and encoder read one, and the
//! [`Builder`] constructs one programmatically. No component mutates a module
//! in place.

mod instr;
mod types;

pub use instr::{ConstExpr, Ieee32, Ieee64, Instruction, MemArg};
pub use types::{
    BlockType, FunctionType, GlobalType, Limits, MemoryType, RefType, TableType, ValueType,
};

/// What an import provides: an entry in one of the four index spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportDesc {
    Func(u32),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

/// A single import: two-level name plus the imported item's type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub desc: ImportDesc,
}

/// The index space an export points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportKind {
    Func,
    Table,
    Memory,
    Global,
}

impl ExportKind {
    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(ExportKind::Func),
            0x01 => Some(ExportKind::Table),
            0x02 => Some(ExportKind::Memory),
            0x03 => Some(ExportKind::Global),
            _ => None,
        }
    }

    pub(crate) fn byte(self) -> u8 {
        match self {
            ExportKind::Func => 0x00,
            ExportKind::Table => 0x01,
            ExportKind::Memory => 0x02,
            ExportKind::Global => 0x03,
        }
    }
}

/// A single export: unique name, kind, and index into that kind's space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub kind: ExportKind,
    pub index: u32,
}

/// A defined function: its signature by type index, extra locals appended
/// after the parameters, and the flat body expression.
///
/// Fusing declaration and body into one value makes the binary format's
/// "function section and code section must agree" invariant structural.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub type_index: u32,
    pub locals: Vec<ValueType>,
    pub body: Vec<Instruction>,
}

/// A defined table, optionally carrying an explicit initializer expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub ty: TableType,
    pub init: Option<ConstExpr>,
}

/// A defined global: its type and initializer expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub ty: GlobalType,
    pub init: ConstExpr,
}

/// The payload of an element segment: plain function indices or full
/// constant expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementItems {
    Functions(Vec<u32>),
    Expressions(Vec<ConstExpr>),
}

/// How an element segment is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementMode {
    Active { table: u32, offset: ConstExpr },
    Passive,
    Declarative,
}

/// A table initializer segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub ty: RefType,
    pub items: ElementItems,
    pub mode: ElementMode,
}

/// How a data segment is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataMode {
    Active { memory: u32, offset: ConstExpr },
    Passive,
}

/// A memory initializer segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    pub bytes: Vec<u8>,
    pub mode: DataMode,
}

/// A custom section: opaque named bytes, preserved verbatim.
///
/// `placement` is the number of standard sections emitted before this one,
/// recorded by the decoder so the encoder can re-interleave custom sections
/// at their original positions. `None` (the builder default) appends the
/// section after all standard sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomSection {
    pub name: String,
    pub data: Vec<u8>,
    pub placement: Option<u32>,
}

/// One complete module.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Module {
    pub types: Vec<FunctionType>,
    pub imports: Vec<Import>,
    pub functions: Vec<Function>,
    pub tables: Vec<Table>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub elements: Vec<Element>,
    pub data: Vec<Data>,
    /// Declared data-segment count, when the binary carried one.
    pub data_count: Option<u32>,
    pub custom_sections: Vec<CustomSection>,
}

impl Module {
    /// Start building a module programmatically.
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Number of imports providing a function.
    pub fn num_imported_functions(&self) -> u32 {
        self.count_imports(|desc| matches!(desc, ImportDesc::Func(_)))
    }

    /// Number of imports providing a table.
    pub fn num_imported_tables(&self) -> u32 {
        self.count_imports(|desc| matches!(desc, ImportDesc::Table(_)))
    }

    /// Number of imports providing a memory.
    pub fn num_imported_memories(&self) -> u32 {
        self.count_imports(|desc| matches!(desc, ImportDesc::Memory(_)))
    }

    /// Number of imports providing a global.
    pub fn num_imported_globals(&self) -> u32 {
        self.count_imports(|desc| matches!(desc, ImportDesc::Global(_)))
    }

    /// Total size of the function index space (imports then definitions).
    pub fn num_functions(&self) -> u32 {
        self.num_imported_functions() + self.functions.len() as u32
    }

    /// Total size of the table index space.
    pub fn num_tables(&self) -> u32 {
        self.num_imported_tables() + self.tables.len() as u32
    }

    /// Total size of the memory index space.
    pub fn num_memories(&self) -> u32 {
        self.num_imported_memories() + self.memories.len() as u32
    }

    /// Total size of the global index space.
    pub fn num_globals(&self) -> u32 {
        self.num_imported_globals() + self.globals.len() as u32
    }

    fn count_imports(&self, pred: impl Fn(&ImportDesc) -> bool) -> u32 {
        self.imports.iter().filter(|i| pred(&i.desc)).count() as u32
    }
}

/// Fluent builder for programmatic module construction.
///
/// # Example
///
/// ```
/// use wasmod::module::{FunctionType, Instruction, Module, ExportKind, ValueType};
///
/// let module = Module::builder()
///     .function_type(FunctionType::new(vec![], vec![ValueType::I32]))
///     .function(0, vec![], vec![Instruction::I32Const(42)])
///     .export("answer", ExportKind::Func, 0)
///     .build();
/// assert_eq!(module.functions.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Builder {
    module: Module,
}

impl Builder {
    /// Append an entry to the type section.
    pub fn function_type(mut self, ty: FunctionType) -> Self {
        self.module.types.push(ty);
        self
    }

    /// Append an import.
    pub fn import(
        mut self,
        module: impl Into<String>,
        name: impl Into<String>,
        desc: ImportDesc,
    ) -> Self {
        self.module.imports.push(Import {
            module: module.into(),
            name: name.into(),
            desc,
        });
        self
    }

    /// Append a defined function.
    pub fn function(
        mut self,
        type_index: u32,
        locals: Vec<ValueType>,
        body: Vec<Instruction>,
    ) -> Self {
        self.module.functions.push(Function {
            type_index,
            locals,
            body,
        });
        self
    }

    /// Append a defined table.
    pub fn table(mut self, ty: TableType) -> Self {
        self.module.tables.push(Table { ty, init: None });
        self
    }

    /// Append a defined table with an explicit initializer.
    pub fn table_with_init(mut self, ty: TableType, init: ConstExpr) -> Self {
        self.module.tables.push(Table {
            ty,
            init: Some(init),
        });
        self
    }

    /// Append a defined memory.
    pub fn memory(mut self, limits: Limits) -> Self {
        self.module.memories.push(MemoryType { limits });
        self
    }

    /// Append a defined global.
    pub fn global(mut self, ty: GlobalType, init: ConstExpr) -> Self {
        self.module.globals.push(Global { ty, init });
        self
    }

    /// Append an export.
    pub fn export(mut self, name: impl Into<String>, kind: ExportKind, index: u32) -> Self {
        self.module.exports.push(Export {
            name: name.into(),
            kind,
            index,
        });
        self
    }

    /// Set the start function.
    pub fn start(mut self, function: u32) -> Self {
        self.module.start = Some(function);
        self
    }

    /// Append an element segment.
    pub fn element(mut self, element: Element) -> Self {
        self.module.elements.push(element);
        self
    }

    /// Append a data segment.
    pub fn data(mut self, data: Data) -> Self {
        if self.module.data_count.is_some() {
            self.module.data_count = Some(self.module.data.len() as u32 + 1);
        }
        self.module.data.push(data);
        self
    }

    /// Record a data-count section (kept in sync by later `data` calls).
    pub fn data_count(mut self) -> Self {
        self.module.data_count = Some(self.module.data.len() as u32);
        self
    }

    /// Append a custom section after all standard sections.
    pub fn custom_section(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.module.custom_sections.push(CustomSection {
            name: name.into(),
            data,
            placement: None,
        });
        self
    }

    /// Finish building.
    pub fn build(self) -> Module {
        self.module
    }
}
