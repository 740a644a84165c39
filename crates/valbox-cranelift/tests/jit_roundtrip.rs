//! Executes synthesized conversion functions through the JIT
//!
//! These tests link compiled box/unbox functions against `valbox-runtime`
//! and call them natively. The runtime's allocation counter is global, so
//! every test runs serially.

use cranelift_codegen::ir::types::I32;
use cranelift_codegen::ir::{AbiParam, InstBuilder};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{Linkage, Module};
use serial_test::serial;
use valbox_core::{
    BackendConfig, BoxCache, ClassId, ClassTable, InlinedClass, OutputKind, ScalarKind,
    TargetInfo, Type,
};
use valbox_cranelift::runtime::ALLOC_FN;
use valbox_cranelift::{BoxingBackend, build_isa};
use valbox_runtime::{ObjHeader, STATIC_REFCOUNT, allocation_count};

macro_rules! jit_fn {
    ($backend:expr, $function:expr, $sig:ty) => {{
        let ptr = $backend.module().get_finalized_function($function.func_id);
        unsafe { std::mem::transmute::<*const u8, $sig>(ptr) }
    }};
}

fn jit_backend(
    classes: ClassTable,
    config: BackendConfig,
    symbols: &[(&str, *const u8)],
) -> BoxingBackend<JITModule> {
    let isa = build_isa(&config.target).unwrap();
    let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
    builder.symbol(ALLOC_FN, valbox_runtime::__valbox_alloc as *const u8);
    for &(name, ptr) in symbols {
        builder.symbol(name, ptr);
    }
    BoxingBackend::new(JITModule::new(builder), classes, config).unwrap()
}

fn header(obj: *mut ObjHeader) -> ObjHeader {
    unsafe { *obj }
}

#[test]
#[serial]
fn test_int_cache_hits_and_misses() {
    let mut backend = jit_backend(ClassTable::new(), BackendConfig::host(), &[]);
    let boxer = backend.box_function(ClassId::INT).unwrap();
    let unboxer = backend.unbox_function(ClassId::INT).unwrap();
    backend.module_mut().finalize_definitions().unwrap();

    let box_int = jit_fn!(backend, boxer, extern "C" fn(i32) -> *mut ObjHeader);
    let unbox_int = jit_fn!(backend, unboxer, extern "C" fn(*mut ObjHeader) -> i32);

    let before = allocation_count();
    let a = box_int(5);
    let b = box_int(5);
    assert_eq!(a, b);
    assert_eq!(allocation_count(), before);
    assert_eq!(
        header(a),
        ObjHeader {
            refcount: STATIC_REFCOUNT,
            rtti_idx: ClassId::INT.index() as u32,
        }
    );

    // The entry for 5 sits at index 5 - (-128) of INT_CACHE.
    let table = backend.cache_tables().unwrap().get(BoxCache::Int).unwrap();
    let (entries, size) = backend.module().get_finalized_data(table.entries);
    assert_eq!(size, 256 * 16);
    assert_eq!(a as usize - entries as usize, (5 + 128) * 16);
    assert_eq!(box_int(-128) as usize, entries as usize);
    assert_eq!(box_int(127) as usize, entries as usize + 255 * 16);

    let c = box_int(128);
    let d = box_int(128);
    assert_ne!(c, d);
    assert_eq!(allocation_count(), before + 2);
    assert_eq!(header(c).refcount, 1);
    assert_eq!(header(c).rtti_idx, ClassId::INT.index() as u32);

    for value in [i32::MIN, -129, -128, -1, 0, 1, 127, 128, i32::MAX] {
        assert_eq!(unbox_int(box_int(value)), value);
    }
}

#[test]
#[serial]
fn test_every_builtin_round_trips() {
    let mut backend = jit_backend(ClassTable::new(), BackendConfig::host(), &[]);
    let classes = [
        ClassId::BOOLEAN,
        ClassId::BYTE,
        ClassId::SHORT,
        ClassId::CHAR,
        ClassId::LONG,
        ClassId::FLOAT,
        ClassId::DOUBLE,
    ];
    let mut functions = Vec::new();
    for class in classes {
        functions.push((
            backend.box_function(class).unwrap(),
            backend.unbox_function(class).unwrap(),
        ));
    }
    backend.module_mut().finalize_definitions().unwrap();

    let (b, u) = &functions[0];
    let box_bool = jit_fn!(backend, b, extern "C" fn(bool) -> *mut ObjHeader);
    let unbox_bool = jit_fn!(backend, u, extern "C" fn(*mut ObjHeader) -> bool);
    assert_eq!(box_bool(true), box_bool(true));
    assert_ne!(box_bool(true), box_bool(false));
    assert!(unbox_bool(box_bool(true)));
    assert!(!unbox_bool(box_bool(false)));

    let (b, u) = &functions[1];
    let box_byte = jit_fn!(backend, b, extern "C" fn(i8) -> *mut ObjHeader);
    let unbox_byte = jit_fn!(backend, u, extern "C" fn(*mut ObjHeader) -> i8);
    let before = allocation_count();
    for value in [i8::MIN, -1, 0, i8::MAX] {
        assert_eq!(box_byte(value), box_byte(value));
        assert_eq!(unbox_byte(box_byte(value)), value);
    }
    assert_eq!(allocation_count(), before);

    let (b, u) = &functions[2];
    let box_short = jit_fn!(backend, b, extern "C" fn(i16) -> *mut ObjHeader);
    let unbox_short = jit_fn!(backend, u, extern "C" fn(*mut ObjHeader) -> i16);
    assert_eq!(box_short(-128), box_short(-128));
    assert_ne!(box_short(-129), box_short(-129));
    for value in [i16::MIN, -129, -128, 127, 128, i16::MAX] {
        assert_eq!(unbox_short(box_short(value)), value);
    }

    let (b, u) = &functions[3];
    let box_char = jit_fn!(backend, b, extern "C" fn(u16) -> *mut ObjHeader);
    let unbox_char = jit_fn!(backend, u, extern "C" fn(*mut ObjHeader) -> u16);
    assert_eq!(box_char(255), box_char(255));
    assert_ne!(box_char(256), box_char(256));
    assert_ne!(box_char(u16::MAX), box_char(u16::MAX));
    for value in [0, 65, 255, 256, u16::MAX] {
        assert_eq!(unbox_char(box_char(value)), value);
    }

    let (b, u) = &functions[4];
    let box_long = jit_fn!(backend, b, extern "C" fn(i64) -> *mut ObjHeader);
    let unbox_long = jit_fn!(backend, u, extern "C" fn(*mut ObjHeader) -> i64);
    assert_eq!(box_long(-1), box_long(-1));
    assert_ne!(box_long(1 << 40), box_long(1 << 40));
    for value in [i64::MIN, -129, 0, 127, 1 << 40, i64::MAX] {
        assert_eq!(unbox_long(box_long(value)), value);
    }

    let (b, u) = &functions[5];
    let box_float = jit_fn!(backend, b, extern "C" fn(f32) -> *mut ObjHeader);
    let unbox_float = jit_fn!(backend, u, extern "C" fn(*mut ObjHeader) -> f32);
    let before = allocation_count();
    assert_ne!(box_float(1.0), box_float(1.0));
    assert_eq!(allocation_count(), before + 2);
    assert_eq!(unbox_float(box_float(-2.5)), -2.5);

    let (b, u) = &functions[6];
    let box_double = jit_fn!(backend, b, extern "C" fn(f64) -> *mut ObjHeader);
    let unbox_double = jit_fn!(backend, u, extern "C" fn(*mut ObjHeader) -> f64);
    let boxed = box_double(std::f64::consts::PI);
    assert_eq!(header(boxed).rtti_idx, ClassId::DOUBLE.index() as u32);
    assert_eq!(unbox_double(boxed), std::f64::consts::PI);
}

/// Box and unbox every value of `values`, returning the number of boxes
/// that were freshly allocated.
fn sweep<T: Copy + PartialEq + std::fmt::Debug>(
    values: impl IntoIterator<Item = T>,
    box_fn: extern "C" fn(T) -> *mut ObjHeader,
    unbox_fn: extern "C" fn(*mut ObjHeader) -> T,
) -> u64 {
    let mut allocated = 0;
    for value in values {
        let boxed = box_fn(value);
        assert_eq!(unbox_fn(boxed), value);
        if header(boxed).refcount != STATIC_REFCOUNT {
            assert_eq!(header(boxed).refcount, 1);
            allocated += 1;
        } else {
            assert_eq!(box_fn(value), boxed, "{value:?}");
        }
    }
    allocated
}

#[test]
#[serial]
fn test_small_domains_round_trip_completely() {
    for constrained in [false, true] {
        let target = TargetInfo::host().with_memory_constrained(constrained);
        let config = BackendConfig::new(target, OutputKind::Program);
        let mut backend = jit_backend(ClassTable::new(), config, &[]);
        let mut functions = Vec::new();
        for class in [ClassId::BOOLEAN, ClassId::BYTE, ClassId::SHORT, ClassId::CHAR] {
            functions.push((
                backend.box_function(class).unwrap(),
                backend.unbox_function(class).unwrap(),
            ));
        }
        backend.module_mut().finalize_definitions().unwrap();

        let (b, u) = &functions[0];
        let box_bool = jit_fn!(backend, b, extern "C" fn(bool) -> *mut ObjHeader);
        let unbox_bool = jit_fn!(backend, u, extern "C" fn(*mut ObjHeader) -> bool);
        let (b, u) = &functions[1];
        let box_byte = jit_fn!(backend, b, extern "C" fn(i8) -> *mut ObjHeader);
        let unbox_byte = jit_fn!(backend, u, extern "C" fn(*mut ObjHeader) -> i8);
        let (b, u) = &functions[2];
        let box_short = jit_fn!(backend, b, extern "C" fn(i16) -> *mut ObjHeader);
        let unbox_short = jit_fn!(backend, u, extern "C" fn(*mut ObjHeader) -> i16);
        let (b, u) = &functions[3];
        let box_char = jit_fn!(backend, b, extern "C" fn(u16) -> *mut ObjHeader);
        let unbox_char = jit_fn!(backend, u, extern "C" fn(*mut ObjHeader) -> u16);

        let before = allocation_count();
        let counts = [
            sweep([false, true], box_bool, unbox_bool),
            sweep(i8::MIN..=i8::MAX, box_byte, unbox_byte),
            sweep(i16::MIN..=i16::MAX, box_short, unbox_short),
            sweep(u16::MIN..=u16::MAX, box_char, unbox_char),
        ];
        let expected = if constrained {
            [2, 256, 65536, 65536]
        } else {
            [0, 0, 65536 - 256, 65536 - 256]
        };
        assert_eq!(counts, expected, "constrained: {constrained}");
        assert_eq!(
            allocation_count() - before,
            counts.iter().sum::<u64>(),
            "constrained: {constrained}"
        );
    }
}

#[test]
#[serial]
fn test_nullable_pointer_maps_null_to_null() {
    let mut backend = jit_backend(ClassTable::new(), BackendConfig::host(), &[]);
    let boxer = backend.box_function(ClassId::NATIVE_PTR).unwrap();
    let unboxer = backend.unbox_function(ClassId::NATIVE_PTR).unwrap();
    backend.module_mut().finalize_definitions().unwrap();

    let box_ptr = jit_fn!(backend, boxer, extern "C" fn(*const u8) -> *mut ObjHeader);
    let unbox_ptr = jit_fn!(backend, unboxer, extern "C" fn(*mut ObjHeader) -> *const u8);

    let before = allocation_count();
    assert!(box_ptr(std::ptr::null()).is_null());
    assert!(unbox_ptr(std::ptr::null_mut()).is_null());
    assert_eq!(allocation_count(), before);

    let target = 7u64;
    let address = &target as *const u64 as *const u8;
    let boxed = box_ptr(address);
    assert!(!boxed.is_null());
    assert_eq!(header(boxed).refcount, 1);
    assert_eq!(unbox_ptr(boxed), address);
}

#[test]
#[serial]
fn test_user_value_class_is_always_allocated() {
    let mut classes = ClassTable::new();
    let meters = classes.add_inline_class("Meters", InlinedClass::new(ScalarKind::I32));
    let rtti = classes.inlined(meters).unwrap().rtti_idx();

    let mut backend = jit_backend(classes, BackendConfig::host(), &[]);
    let boxer = backend.box_function(meters).unwrap();
    backend.module_mut().finalize_definitions().unwrap();
    assert_eq!(boxer.symbol, "Meters.<box>");

    let box_meters = jit_fn!(backend, boxer, extern "C" fn(i32) -> *mut ObjHeader);
    let a = box_meters(5);
    let b = box_meters(5);
    assert_ne!(a, b);
    assert_eq!(header(a).rtti_idx, rtti);
}

#[repr(C, align(8))]
struct IntEntry {
    header: ObjHeader,
    payload: i32,
    _pad: u32,
}

const fn int_entry(payload: i32) -> IntEntry {
    IntEntry {
        header: ObjHeader {
            refcount: STATIC_REFCOUNT,
            rtti_idx: 6,
        },
        payload,
        _pad: 0,
    }
}

static LINKED_INT_CACHE: [IntEntry; 4] =
    [int_entry(10), int_entry(11), int_entry(12), int_entry(13)];
static LINKED_INT_RANGE_FROM: i32 = 10;
static LINKED_INT_RANGE_TO: i32 = 13;

#[test]
#[serial]
fn test_library_output_reads_linked_cache() {
    let config = BackendConfig::new(TargetInfo::host(), OutputKind::Library);
    let symbols = [
        ("INT_CACHE", LINKED_INT_CACHE.as_ptr() as *const u8),
        (
            "INT_RANGE_FROM",
            &LINKED_INT_RANGE_FROM as *const i32 as *const u8,
        ),
        ("INT_RANGE_TO", &LINKED_INT_RANGE_TO as *const i32 as *const u8),
    ];
    let mut backend = jit_backend(ClassTable::new(), config, &symbols);
    assert!(backend.cache_tables().is_none());

    let boxer = backend.box_function(ClassId::INT).unwrap();
    let unboxer = backend.unbox_function(ClassId::INT).unwrap();
    backend.module_mut().finalize_definitions().unwrap();
    let box_int = jit_fn!(backend, boxer, extern "C" fn(i32) -> *mut ObjHeader);
    let unbox_int = jit_fn!(backend, unboxer, extern "C" fn(*mut ObjHeader) -> i32);

    let expected = &LINKED_INT_CACHE[1].header as *const ObjHeader;
    assert_eq!(box_int(11) as *const ObjHeader, expected);
    assert_eq!(unbox_int(box_int(13)), 13);

    let before = allocation_count();
    let fresh = box_int(14);
    assert_eq!(allocation_count(), before + 1);
    assert_eq!(header(fresh).refcount, 1);
    assert_eq!(unbox_int(box_int(9)), 9);
}

#[test]
#[serial]
fn test_convert_value_inside_caller() {
    let mut backend = jit_backend(ClassTable::new(), BackendConfig::host(), &[]);
    let int = Type::of(ClassId::INT);

    let mut sig = backend.module().make_signature();
    sig.params.push(AbiParam::new(I32));
    sig.returns.push(AbiParam::new(I32));
    let func_id = backend
        .module_mut()
        .declare_function("roundtrip", Linkage::Local, &sig)
        .unwrap();

    let mut ctx = backend.module().make_context();
    ctx.func.signature = sig;
    let mut func_ctx = FunctionBuilderContext::new();
    let mut builder = FunctionBuilder::new(&mut ctx.func, &mut func_ctx);
    let entry = builder.create_block();
    builder.append_block_params_for_function_params(entry);
    builder.switch_to_block(entry);
    builder.seal_block(entry);
    let value = builder.block_params(entry)[0];

    let boxed = backend
        .convert_value(&mut builder, int, Type::any(), value)
        .unwrap();
    let same = backend
        .convert_value(&mut builder, Type::any(), Type::any().or_null(), boxed)
        .unwrap();
    assert_eq!(same, boxed);
    let unboxed = backend
        .convert_value(&mut builder, Type::any().or_null(), int, same)
        .unwrap();
    builder.ins().return_(&[unboxed]);
    builder.finalize();

    backend
        .module_mut()
        .define_function(func_id, &mut ctx)
        .unwrap();
    backend.module_mut().finalize_definitions().unwrap();
    assert_eq!(backend.conversions().len(), 2);

    let ptr = backend.module().get_finalized_function(func_id);
    let roundtrip = unsafe { std::mem::transmute::<*const u8, extern "C" fn(i32) -> i32>(ptr) };
    assert_eq!(roundtrip(42), 42);
    assert_eq!(roundtrip(-100_000), -100_000);
}
