//! Tests for value injection, extraction and callable invocation.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tether::{
    ClassRef, EngineError, Kwargs, ObjectRef, Session, SessionConfig, SessionError, ThreadRegistry, Value, ValueKind,
    testing::FakeEngine,
};

fn new_session() -> (Arc<FakeEngine>, Session) {
    let engine = Arc::new(FakeEngine::new());
    let session = Session::with_engine(engine.clone(), Arc::new(ThreadRegistry::new()), SessionConfig::new()).unwrap();
    (engine, session)
}

// ============================================================================
// Injection dispatch
// ============================================================================

#[test]
fn each_host_type_reaches_the_engine_as_its_own_kind() {
    let (engine, mut session) = new_session();
    session.set_value("flag", true).unwrap();
    session.set_value("b", 1_i8).unwrap();
    session.set_value("s", 2_i16).unwrap();
    session.set_value("i", 3_i32).unwrap();
    session.set_value("l", 4_i64).unwrap();
    session.set_value("f", 0.5_f32).unwrap();
    session.set_value("d", 0.25_f64).unwrap();
    session.set_value("text", "hello").unwrap();
    session.set_value("c", 'q').unwrap();
    session.set_value("ints", vec![1_i32, 2, 3]).unwrap();
    session.set_value("raw", b"abc".as_slice()).unwrap();
    session.set_value("doubles", [1.0_f64, 2.0].as_slice()).unwrap();
    session.set_value("obj", ObjectRef::new(1, "java.util.HashMap")).unwrap();
    session.set_value("cls", ClassRef::new("java.lang.Integer")).unwrap();
    session.set_value("nothing", None::<i32>).unwrap();

    let context = engine.context(session.context_handle().unwrap()).unwrap();
    let kinds: Vec<ValueKind> = context.assignments.iter().map(|(_, kind)| *kind).collect();
    assert_eq!(
        kinds,
        vec![
            ValueKind::Bool,
            ValueKind::Byte,
            ValueKind::Short,
            ValueKind::Int,
            ValueKind::Long,
            ValueKind::Float,
            ValueKind::Double,
            ValueKind::Str,
            ValueKind::Str,
            ValueKind::IntArray,
            ValueKind::ByteArray,
            ValueKind::DoubleArray,
            ValueKind::Object,
            ValueKind::Class,
            ValueKind::None,
        ]
    );
}

#[test]
fn blank_name_is_rejected_before_reaching_the_engine() {
    let (engine, mut session) = new_session();
    let err = session.set_value("  ", 1_i32).unwrap_err();
    assert!(matches!(err, SessionError::InvalidArgument(_)), "got {err:?}");
    let err = session.get_value::<i32>("").unwrap_err();
    assert!(matches!(err, SessionError::InvalidArgument(_)), "got {err:?}");
    let context = engine.context(session.context_handle().unwrap()).unwrap();
    assert!(context.assignments.is_empty());
}

// ============================================================================
// Extraction
// ============================================================================

#[test]
fn integer_round_trip_returns_equal_value() {
    let (_engine, mut session) = new_session();
    session.set_value("n", 42_i32).unwrap();
    assert_eq!(session.get_value::<i32>("n").unwrap(), 42);
    assert_eq!(session.get_value::<i64>("n").unwrap(), 42);
    assert_eq!(session.get_object("n").unwrap(), Value::Int(42));
}

#[test]
fn extracting_into_a_narrower_type_fails_when_out_of_range() {
    let (_engine, mut session) = new_session();
    session.set_value("big", i64::from(i32::MAX) * 4).unwrap();

    let err = session.get_value::<i8>("big").unwrap_err();
    assert!(matches!(err, SessionError::TypeConversion(_)), "got {err:?}");
    // the session is still usable afterwards
    assert_eq!(session.get_value::<i64>("big").unwrap(), i64::from(i32::MAX) * 4);
}

#[test]
fn extracting_an_incompatible_kind_fails() {
    let (_engine, mut session) = new_session();
    session.set_value("name", "tether").unwrap();
    let err = session.get_value::<f64>("name").unwrap_err();
    assert!(matches!(err, SessionError::TypeConversion(_)), "got {err:?}");
    assert_eq!(session.get_value::<String>("name").unwrap(), "tether");
}

#[test]
fn missing_name_surfaces_engine_error() {
    let (_engine, mut session) = new_session();
    let err = session.get_object("ghost").unwrap_err();
    assert!(matches!(err, SessionError::Execution(_)), "got {err:?}");
    assert_eq!(err.to_string(), "name 'ghost' is not defined");
}

#[test]
fn get_bytes_returns_raw_bytes() {
    let (_engine, mut session) = new_session();
    session.set_value("greeting", "héllo").unwrap();
    assert_eq!(session.get_bytes("greeting").unwrap(), "héllo".as_bytes().to_vec());

    session.set_value("raw", vec![0_u8, 159, 255]).unwrap();
    assert_eq!(session.get_bytes("raw").unwrap(), vec![0, 159, 255]);

    session.set_value("n", 1_i32).unwrap();
    let err = session.get_bytes("n").unwrap_err();
    assert!(matches!(err, SessionError::TypeConversion(_)), "got {err:?}");
}

#[test]
fn arrays_round_trip() {
    let (_engine, mut session) = new_session();
    session.set_value("xs", vec![1_i64, -2, 3]).unwrap();
    assert_eq!(session.get_value::<Vec<i64>>("xs").unwrap(), vec![1, -2, 3]);
    assert!(session.get_value::<Vec<i32>>("xs").is_err());
}

#[test]
fn optional_extraction_maps_guest_null() {
    let (_engine, mut session) = new_session();
    session.eval("maybe = None").unwrap();
    assert_eq!(session.get_value::<Option<i32>>("maybe").unwrap(), None);
}

// ============================================================================
// Invoke
// ============================================================================

#[test]
fn invoke_passes_arguments_in_order_with_kwargs() {
    let (engine, mut session) = new_session();
    engine.register_callable("describe", |args, kwargs| {
        let mut parts: Vec<String> = args.iter().map(|a| format!("{a:?}")).collect();
        if let Some(kwargs) = kwargs {
            let mut named: Vec<String> = kwargs.iter().map(|(k, v)| format!("{k}={v:?}")).collect();
            named.sort();
            parts.extend(named);
        }
        Ok(Value::Str(parts.join(",")))
    });

    let mut kwargs = Kwargs::new();
    kwargs.insert("sep".to_owned(), Value::Str("-".to_owned()));
    kwargs.insert("end".to_owned(), Value::None);

    let result = session
        .invoke("describe", &[Value::Int(1), Value::Bool(false)], Some(&kwargs))
        .unwrap();
    assert_eq!(
        result,
        Value::Str("Int(1),Bool(false),end=None,sep=Str(\"-\")".to_owned())
    );
}

#[test]
fn invoke_rejects_blank_names() {
    let (_engine, mut session) = new_session();
    for name in ["", "   "] {
        let err = session.invoke(name, &[], None).unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument(_)), "got {err:?}");
    }
}

#[test]
fn invoke_propagates_guest_errors_verbatim() {
    let (engine, mut session) = new_session();
    engine.register_callable("fail", |_args, _kwargs| {
        Err(EngineError::Execution("ZeroDivisionError: division by zero".to_owned()))
    });
    let err = session.invoke("fail", &[], None).unwrap_err();
    assert_eq!(err.to_string(), "ZeroDivisionError: division by zero");

    let err = session.invoke("unknown", &[], None).unwrap_err();
    assert!(matches!(err, SessionError::Execution(_)), "got {err:?}");
}

#[test]
fn object_results_are_tracked_for_release() {
    let (engine, mut session) = new_session();
    engine.register_callable("new_obj", |args, _kwargs| {
        let id = match args.first() {
            Some(Value::Long(id)) => u64::try_from(*id).unwrap_or_default(),
            _ => 0,
        };
        Ok(Value::Object(ObjectRef::new(id, "Widget")))
    });

    session.invoke("new_obj", &[Value::Long(1)], None).unwrap();
    session.invoke("new_obj", &[Value::Long(2)], None).unwrap();
    assert_eq!(session.tracked_references(), 2);

    session.close().unwrap();
    let released: Vec<u64> = engine.released_references().iter().map(ObjectRef::id).collect();
    assert_eq!(released, vec![1, 2]);
}
