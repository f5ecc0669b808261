//! Reference tests over hand-assembled binary modules.
//!
//! These tests pin the byte-level behavior of the public API: known binaries
//! decode to known structures, malformed ones fail with the right error, and
//! decode/encode round-trips are byte-exact.

use wasmod::module::{
    ConstExpr, Data, DataMode, Element, ElementItems, ElementMode, ExportKind, FunctionType,
    GlobalType, ImportDesc, Instruction, Limits, Module, RefType, TableType, ValueType,
};
use wasmod::{DecodeError, Error, Features, ValidationError};

/// A classic two-argument add function, assembled by hand.
fn add_module_bytes() -> Vec<u8> {
    vec![
        0x00, 0x61, 0x73, 0x6d, // magic
        0x01, 0x00, 0x00, 0x00, // version 1
        0x01, 0x07, // type section, 7 bytes
        0x01, 0x60, 0x02, 0x7f, 0x7f, 0x01, 0x7f, // one type: (i32, i32) -> i32
        0x03, 0x02, // function section, 2 bytes
        0x01, 0x00, // one function of type 0
        0x07, 0x07, // export section, 7 bytes
        0x01, 0x03, 0x61, 0x64, 0x64, 0x00, 0x00, // "add" exports function 0
        0x0a, 0x09, // code section, 9 bytes
        0x01, 0x07, // one body, 7 bytes
        0x00, // no locals
        0x20, 0x00, // local.get 0
        0x20, 0x01, // local.get 1
        0x6a, // i32.add
        0x0b, // end
    ]
}

/// The add module decodes to the expected structure.
#[test]
fn test_add_module_decodes() -> Result<(), anyhow::Error> {
    let module = wasmod::decode(&add_module_bytes())?;

    assert_eq!(
        module.types,
        vec![FunctionType::new(
            vec![ValueType::I32, ValueType::I32],
            vec![ValueType::I32],
        )]
    );
    assert_eq!(module.functions.len(), 1);
    assert_eq!(module.functions[0].type_index, 0);
    assert!(module.functions[0].locals.is_empty());
    assert_eq!(
        module.functions[0].body,
        vec![
            Instruction::LocalGet(0),
            Instruction::LocalGet(1),
            Instruction::I32Add,
        ]
    );
    assert_eq!(module.exports.len(), 1);
    assert_eq!(module.exports[0].name, "add");
    assert_eq!(module.exports[0].kind, ExportKind::Func);
    assert_eq!(module.exports[0].index, 0);

    Ok(())
}

/// The add module validates, and re-encoding reproduces the input bytes.
#[test]
fn test_add_module_validates_and_roundtrips() -> Result<(), anyhow::Error> {
    let bytes = add_module_bytes();
    let module = wasmod::decode(&bytes)?;

    wasmod::validate(&module)?;
    assert_eq!(wasmod::encode(&module)?, bytes);

    Ok(())
}

/// The eight-byte header alone is a complete, empty module in both
/// directions.
#[test]
fn test_empty_module_is_just_the_header() -> Result<(), anyhow::Error> {
    let header = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

    let module = wasmod::decode(&header)?;
    assert_eq!(module, Module::default());
    assert_eq!(wasmod::encode(&module)?, header);

    Ok(())
}

/// Every truncation of the add module fails to decode, except the two cut
/// points that happen to close a smaller complete module: the bare header
/// and the end of the type section. A cut after the function section still
/// fails because the declared function has no body.
#[test]
fn test_truncated_binaries_fail_to_decode() {
    let bytes = add_module_bytes();

    let decodable: Vec<usize> = (0..bytes.len())
        .filter(|len| wasmod::decode(&bytes[..*len]).is_ok())
        .collect();

    assert_eq!(decodable, vec![8, 17]);
}

/// A count encoded in six LEB128 bytes is rejected even though its value
/// would fit in 32 bits.
#[test]
fn test_overlong_integer_is_rejected() {
    let bytes = [
        0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
        0x01, 0x06, // type section, 6 bytes
        0x80, 0x80, 0x80, 0x80, 0x80, 0x00, // count 0 in six bytes
    ];

    let err = wasmod::decode(&bytes).unwrap_err();
    assert!(matches!(
        err,
        Error::Decode(DecodeError::InvalidInt { bits: 32, offset: 10 })
    ));
}

/// Magic and version are checked before anything else.
#[test]
fn test_bad_header_is_rejected() {
    let err = wasmod::decode(b"\0asm\x02\0\0\0").unwrap_err();
    assert!(matches!(
        err,
        Error::Decode(DecodeError::InvalidVersion { found: 2, .. })
    ));

    let err = wasmod::decode(b"\x7fELF\x01\0\0\0").unwrap_err();
    assert!(matches!(err, Error::Decode(DecodeError::InvalidMagic { .. })));
    assert!(err.is_decode());
}

/// A function that leaves an i64 where its type demands an i32 fails
/// validation with a type mismatch against the function itself.
#[test]
fn test_wrong_result_type_fails_validation() {
    let module = Module::builder()
        .function_type(FunctionType::new(vec![], vec![ValueType::I32]))
        .function(0, vec![], vec![Instruction::I64Const(5)])
        .build();

    let err = wasmod::validate(&module).unwrap_err();
    let errors = err.as_validation().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors.first(),
        Some(ValidationError::TypeMismatch {
            expected: ValueType::I32,
            found: ValueType::I64,
            ..
        })
    ));
}

/// Code after `unreachable` is type-checked polymorphically, so a bare
/// `i32.add` with no operands still validates there.
#[test]
fn test_unreachable_code_validates() -> Result<(), anyhow::Error> {
    let module = Module::builder()
        .function_type(FunctionType::new(vec![], vec![ValueType::I32]))
        .function(
            0,
            vec![],
            vec![Instruction::Unreachable, Instruction::I32Add],
        )
        .build();

    wasmod::validate(&module)?;
    Ok(())
}

/// Calling a function index that does not exist is a validation error, not
/// a decode error.
#[test]
fn test_call_out_of_bounds_fails_validation_only() -> Result<(), anyhow::Error> {
    let module = Module::builder()
        .function_type(FunctionType::new(vec![], vec![]))
        .function(0, vec![], vec![Instruction::Call(7)])
        .build();

    let bytes = wasmod::encode(&module)?;
    let decoded = wasmod::decode(&bytes)?;
    assert_eq!(decoded, module);

    let err = wasmod::validate(&module).unwrap_err();
    let errors = err.as_validation().unwrap();
    assert!(errors.iter().any(|e| matches!(
        e,
        ValidationError::UnknownIndex {
            space: wasmod::validate::IndexSpace::Function,
            index: 7,
            ..
        }
    )));

    Ok(())
}

/// A module exercising every standard section survives a full
/// encode/decode round trip unchanged.
#[test]
fn test_builder_roundtrip_with_all_sections() -> Result<(), anyhow::Error> {
    let module = Module::builder()
        .function_type(FunctionType::new(vec![], vec![]))
        .function_type(FunctionType::new(vec![ValueType::I32], vec![ValueType::I32]))
        .import(
            "env",
            "g",
            ImportDesc::Global(GlobalType {
                value: ValueType::I32,
                mutable: false,
            }),
        )
        .function(0, vec![], vec![])
        .function(
            1,
            vec![ValueType::I64],
            vec![Instruction::LocalGet(0)],
        )
        .table(TableType {
            element: RefType::Func,
            limits: Limits { min: 2, max: Some(4) },
        })
        .memory(Limits { min: 1, max: None })
        .global(
            GlobalType {
                value: ValueType::I32,
                mutable: true,
            },
            ConstExpr::global_get(0),
        )
        .export("run", ExportKind::Func, 1)
        .export("mem", ExportKind::Memory, 0)
        .start(0)
        .element(Element {
            ty: RefType::Func,
            items: ElementItems::Functions(vec![0, 1]),
            mode: ElementMode::Active {
                table: 0,
                offset: ConstExpr::i32_const(0),
            },
        })
        .data_count()
        .data(Data {
            bytes: b"hello".to_vec(),
            mode: DataMode::Active {
                memory: 0,
                offset: ConstExpr::i32_const(8),
            },
        })
        .build();

    wasmod::validate(&module)?;

    let bytes = wasmod::encode(&module)?;
    let decoded = wasmod::decode(&bytes)?;
    assert_eq!(decoded, module);

    Ok(())
}

/// Custom sections decoded from between standard sections are re-encoded in
/// the same positions, byte for byte.
#[test]
fn test_custom_section_placement_roundtrips() -> Result<(), anyhow::Error> {
    let bytes = [
        0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
        0x00, 0x07, 0x05, 0x66, 0x69, 0x72, 0x73, 0x74, 0xaa, // custom "first"
        0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type section: () -> ()
        0x00, 0x08, 0x06, 0x6d, 0x69, 0x64, 0x64, 0x6c, 0x65, 0xbb, // custom "middle"
        0x05, 0x03, 0x01, 0x00, 0x01, // memory section: min 1
        0x00, 0x06, 0x04, 0x6c, 0x61, 0x73, 0x74, 0xcc, // custom "last"
    ];

    let module = wasmod::decode(&bytes)?;
    assert_eq!(module.custom_sections.len(), 3);
    assert_eq!(module.custom_sections[0].name, "first");
    assert_eq!(module.custom_sections[0].placement, Some(0));
    assert_eq!(module.custom_sections[1].placement, Some(1));
    assert_eq!(module.custom_sections[2].placement, Some(2));

    assert_eq!(wasmod::encode(&module)?, bytes);

    Ok(())
}

/// Validating the same module twice reports the same errors in the same
/// order.
#[test]
fn test_validation_is_idempotent() {
    let module = Module::builder()
        .function_type(FunctionType::new(vec![], vec![ValueType::I32]))
        .function(0, vec![], vec![Instruction::I64Const(1)])
        .export("a", ExportKind::Func, 0)
        .export("a", ExportKind::Func, 0)
        .build();

    let first = wasmod::validate(&module).unwrap_err();
    let second = wasmod::validate(&module).unwrap_err();

    let first = first.as_validation().unwrap();
    let second = second.as_validation().unwrap();
    assert_eq!(first.errors, second.errors);
    assert!(first
        .iter()
        .any(|e| matches!(e, ValidationError::DuplicateExportName { name } if name == "a")));
}

/// Restricting features rejects extended instructions at decode time, and
/// at validation time for modules built in memory.
#[test]
fn test_mvp_features_gate_extended_instructions() -> Result<(), anyhow::Error> {
    let bytes = [
        0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
        0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type section: () -> ()
        0x03, 0x02, 0x01, 0x00, // function section
        0x05, 0x03, 0x01, 0x00, 0x01, // memory section: min 1
        0x0a, 0x0d, 0x01, 0x0b, // code section, one 11-byte body
        0x00, // no locals
        0x41, 0x00, // i32.const 0
        0x41, 0x00, // i32.const 0
        0x41, 0x00, // i32.const 0
        0xfc, 0x0b, 0x00, // memory.fill
        0x0b, // end
    ];

    let module = wasmod::decode(&bytes)?;
    wasmod::validate(&module)?;

    let err = wasmod::decode_with_features(&bytes, Features::mvp()).unwrap_err();
    assert!(matches!(
        err,
        Error::Decode(DecodeError::DisabledCapability { .. })
    ));

    let err = wasmod::validate_with_features(&module, Features::mvp()).unwrap_err();
    let errors = err.as_validation().unwrap();
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::FeatureDisabled { .. })));

    Ok(())
}
