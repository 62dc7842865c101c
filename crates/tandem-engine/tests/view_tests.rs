//! Live views over guest collections, iterators, functions and buffers

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tandem_engine::coercion::to_integer;
use tandem_engine::views::MAX_ARRAY_LENGTH;
use tandem_engine::{
    to_host, Context, HostType, HostValue, InteropOptions, PolyglotError, PrimitiveKind, Priority,
};
use tandem_sdk::{
    ArrayObject, BufferObject, ExceptionObject, ForeignObject, FunctionObject, GuestValue,
    HostException, InteropError, InteropResult, RecordObject,
};

fn context() -> Context {
    Context::builder("memory").build()
}

fn strings(values: &[&str]) -> GuestValue {
    GuestValue::object(ArrayObject::new(
        values.iter().map(|v| GuestValue::from(*v)).collect(),
    ))
}

fn view(ctx: &Context, value: &GuestValue, target: HostType) -> HostValue {
    to_host(ctx, value, &target, Priority::HostProxy).unwrap()
}

// ============================================================================
// List Views
// ============================================================================

#[test]
fn test_list_end_to_end() {
    let ctx = context();
    let value = view(&ctx, &strings(&["a", "b"]), HostType::list_of(HostType::string()));
    let list = value.as_list().unwrap();

    assert_eq!(list.get(0).unwrap().as_str(), Some("a"));
    assert_eq!(list.size().unwrap(), 2);
    let err = list.get(2).unwrap_err();
    assert!(matches!(err, PolyglotError::IndexOutOfBounds(_)));
    assert!(err.message().contains("index '2'"), "{}", err);
}

#[test]
fn test_list_rejects_indices_past_the_end() {
    let ctx = context();
    let guest = strings(&["a", "b"]);
    let value = view(&ctx, &guest, HostType::list_of(HostType::string()));
    let list = value.as_list().unwrap();

    for index in [2, 1 << 40, i64::MAX as usize, usize::MAX] {
        let err = list.get(index).unwrap_err();
        assert!(matches!(err, PolyglotError::IndexOutOfBounds(_)), "{}", err);
        assert!(err.message().contains(&format!("index '{}'", index)), "{}", err);
        assert!(matches!(
            list.set(index, HostValue::from("z")),
            Err(PolyglotError::IndexOutOfBounds(_))
        ));
        assert!(matches!(list.remove(index), Err(PolyglotError::IndexOutOfBounds(_))));
    }
    assert_eq!(list.to_vec().unwrap(), vec![HostValue::from("a"), HostValue::from("b")]);
}

#[test]
fn test_list_writes_reach_the_guest() {
    let ctx = context();
    let guest = strings(&["a"]);
    let value = view(&ctx, &guest, HostType::list_of(HostType::string()));
    let list = value.as_list().unwrap();

    let previous = list.set(0, HostValue::from("z")).unwrap();
    assert_eq!(previous.as_str(), Some("a"));
    list.add(HostValue::from("q")).unwrap();
    assert_eq!(guest.as_object().unwrap().array_size().unwrap(), 2);

    let removed = list.remove(0).unwrap();
    assert_eq!(removed.as_str(), Some("z"));
    let rest: Vec<HostValue> = list.to_vec().unwrap();
    assert_eq!(rest, vec![HostValue::from("q")]);
}

#[test]
fn test_read_only_list_rejects_set() {
    let ctx = context();
    let guest = GuestValue::object(ArrayObject::read_only(vec![GuestValue::from(1)]));
    let value = view(&ctx, &guest, HostType::list_of(HostType::boxed(PrimitiveKind::Int)));
    let err = value.as_list().unwrap().set(0, HostValue::Int(2)).unwrap_err();
    assert!(matches!(err, PolyglotError::Unsupported(_)));
}

#[test]
fn test_list_element_type_is_enforced_on_read() {
    let ctx = context();
    let guest = GuestValue::object(ArrayObject::new(vec![GuestValue::from(1.5f64)]));
    let value = view(&ctx, &guest, HostType::list_of(HostType::boxed(PrimitiveKind::Int)));
    let err = value.as_list().unwrap().get(0).unwrap_err();
    assert!(matches!(err, PolyglotError::ClassCast(_)));
}

#[test]
fn test_views_share_cached_routines() {
    let ctx = context();
    let target = HostType::list_of(HostType::string());
    let first = view(&ctx, &strings(&["a"]), target.clone());
    let second = view(&ctx, &strings(&["b", "c"]), target);

    first.as_list().unwrap().size().unwrap();
    let installed = ctx.layer().host_targets().len();
    second.as_list().unwrap().size().unwrap();
    assert_eq!(ctx.layer().host_targets().len(), installed);
}

// ============================================================================
// Map Views
// ============================================================================

#[test]
fn test_member_map() {
    let ctx = context();
    let record = GuestValue::object(RecordObject::new(vec![
        ("x", GuestValue::from(1)),
        ("y", GuestValue::from(2)),
    ]));
    let value = view(
        &ctx,
        &record,
        HostType::map_of(HostType::string(), HostType::boxed(PrimitiveKind::Int)),
    );
    let map = value.as_map().unwrap();

    assert_eq!(map.size().unwrap(), 2);
    assert_eq!(map.get(&HostValue::from("y")).unwrap(), HostValue::Int(2));
    assert!(map.get(&HostValue::from("missing")).unwrap().is_null());
    assert!(map.contains_key(&HostValue::from("x")).unwrap());

    map.put(HostValue::from("z"), HostValue::Int(3)).unwrap();
    assert_eq!(map.keys().unwrap().len(), 3);

    let entries = map.entries().unwrap();
    let first = &entries[0];
    assert_eq!(first.key().as_str(), Some("x"));
    assert_eq!(first.value().unwrap(), HostValue::Int(1));
}

#[test]
fn test_map_entries_as_host_values() {
    let ctx = context();
    let record = GuestValue::object(RecordObject::new(vec![("x", GuestValue::from(1))]));
    let value = view(
        &ctx,
        &record,
        HostType::map_of(HostType::string(), HostType::boxed(PrimitiveKind::Int)),
    );
    let map = value.as_map().unwrap();

    let entry = map.entries().unwrap().remove(0);
    let wrapped = HostValue::Entry(entry.clone());
    assert_eq!(wrapped, HostValue::Entry(map.entries().unwrap().remove(0)));
    assert_eq!(entry.set_value(HostValue::Int(5)).unwrap(), HostValue::Int(1));
    assert_eq!(map.get(entry.key()).unwrap(), HostValue::Int(5));
}

#[test]
fn test_map_key_type_gate() {
    let ctx = context();
    let record = GuestValue::object(RecordObject::new(vec![("x", GuestValue::from(1))]));

    let err = to_host(
        &ctx,
        &record,
        &HostType::map_of(HostType::named("Thread"), HostType::object()),
        Priority::HostProxy,
    )
    .unwrap_err();
    assert!(matches!(err, PolyglotError::IllegalArgument(_)));

    let ok = to_host(
        &ctx,
        &record,
        &HostType::map_of(HostType::string(), HostType::object()),
        Priority::HostProxy,
    );
    assert!(ok.is_ok());
}

#[test]
fn test_index_keyed_map_over_array() {
    let ctx = context();
    let value = view(
        &ctx,
        &strings(&["a", "b"]),
        HostType::map_of(HostType::boxed(PrimitiveKind::Long), HostType::string()),
    );
    let map = value.as_map().unwrap();
    assert!(!map.is_member_backed());
    assert_eq!(map.get(&HostValue::Long(1)).unwrap().as_str(), Some("b"));
    assert_eq!(map.size().unwrap(), 2);
}

#[test]
fn test_disabled_map_access() {
    let options = InteropOptions {
        allow_map_access: false,
        ..InteropOptions::default()
    };
    let ctx = Context::builder("memory").options(options).build();
    let record = GuestValue::object(RecordObject::new(vec![("x", GuestValue::from(1))]));
    let err = to_host(
        &ctx,
        &record,
        &HostType::map_of(HostType::string(), HostType::object()),
        Priority::HostProxy,
    )
    .unwrap_err();
    assert!(matches!(err, PolyglotError::ClassCast(_)));
    assert!(err.message().contains("Map access is disabled."));
}

// ============================================================================
// Iterators
// ============================================================================

#[test]
fn test_iterable_yields_all_elements() {
    let ctx = context();
    let value = view(
        &ctx,
        &strings(&["a", "b", "c"]),
        HostType::iterable_of(HostType::string()),
    );
    let iterator = value.as_iterable().unwrap().iterator().unwrap();
    let collected: Vec<String> = iterator
        .elements()
        .map(|e| e.unwrap().as_str().unwrap().to_string())
        .collect();
    assert_eq!(collected, vec!["a", "b", "c"]);
    assert!(!iterator.has_next().unwrap());
    assert!(matches!(iterator.next(), Err(PolyglotError::NoSuchElement(_))));
}

#[test]
fn test_iterator_detects_concurrent_modification() {
    let ctx = context();
    let array = Arc::new(ArrayObject::new(vec![GuestValue::from("a")]));
    let cursor = array.get_iterator().unwrap();
    let value = view(&ctx, &cursor, HostType::iterator_of(HostType::string()));
    let iterator = value.as_iterator().unwrap();

    assert!(iterator.has_next().unwrap());
    array.clear();
    let err = iterator.next().unwrap_err();
    assert!(matches!(err, PolyglotError::ConcurrentModification(_)));
    let again = iterator.next().unwrap_err();
    assert!(matches!(again, PolyglotError::ConcurrentModification(_)));
}

#[test]
fn test_exhausted_iterator_without_has_next() {
    let ctx = context();
    let array = ArrayObject::new(vec![]);
    let cursor = array.get_iterator().unwrap();
    let value = view(&ctx, &cursor, HostType::iterator_of(HostType::object()));
    let err = value.as_iterator().unwrap().next().unwrap_err();
    assert!(matches!(err, PolyglotError::NoSuchElement(_)));
}

/// An iterator that promises an element but fails with a host error
struct FailingIterator;

impl ForeignObject for FailingIterator {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn language(&self) -> &str {
        "memory"
    }

    fn display_string(&self) -> String {
        "FailingIterator".to_string()
    }

    fn is_iterator(&self) -> bool {
        true
    }

    fn has_iterator_next_element(&self) -> InteropResult<bool> {
        Ok(true)
    }

    fn get_iterator_next_element(&self) -> InteropResult<GuestValue> {
        Err(InteropError::Host(HostException::new(PolyglotError::NoSuchElement(
            "host callback failed".to_string(),
        ))))
    }
}

#[test]
fn test_host_error_from_guest_next_propagates_unchanged() {
    let ctx = context();
    let cursor = GuestValue::object(FailingIterator);
    let value = view(&ctx, &cursor, HostType::iterator_of(HostType::object()));
    let iterator = value.as_iterator().unwrap();

    assert!(iterator.has_next().unwrap());
    for _ in 0..2 {
        match iterator.next() {
            Err(PolyglotError::NoSuchElement(message)) => {
                assert_eq!(message, "host callback failed")
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

// ============================================================================
// Context Lifecycle
// ============================================================================

#[test]
fn test_view_after_close_fails() {
    let ctx = context();
    let value = view(&ctx, &strings(&["a"]), HostType::list_of(HostType::string()));
    let list = value.as_list().unwrap();
    assert_eq!(list.size().unwrap(), 1);

    ctx.close().unwrap();
    let err = list.get(0).unwrap_err();
    assert!(matches!(err, PolyglotError::ContextClosed(_)));
    assert!(err.message().contains("already closed"), "{}", err);
    assert!(matches!(list.size(), Err(PolyglotError::ContextClosed(_))));
}

#[test]
fn test_view_after_cancel_fails() {
    let ctx = context();
    let record = GuestValue::object(RecordObject::new(vec![("x", GuestValue::from(1))]));
    let value = view(
        &ctx,
        &record,
        HostType::map_of(HostType::string(), HostType::object()),
    );
    let map = value.as_map().unwrap();

    ctx.cancel();
    assert!(matches!(
        map.get(&HostValue::from("x")),
        Err(PolyglotError::ContextClosed(_))
    ));
}

#[test]
fn test_view_fails_when_cancelled_mid_call() {
    let ctx = context();
    let inner = ctx.clone();
    let cancelling = GuestValue::object(FunctionObject::new("cancel", move |_| {
        inner.cancel();
        Ok(GuestValue::Null)
    }));
    let value = view(&ctx, &cancelling, HostType::function_of(HostType::object(), HostType::object()));
    let function = value.as_function().unwrap();

    function.apply(&[]).unwrap();
    assert!(ctx.is_closed());
    assert!(matches!(function.apply(&[]), Err(PolyglotError::ContextClosed(_))));
}

// ============================================================================
// Function Views
// ============================================================================

#[test]
fn test_function_apply() {
    let ctx = context();
    let add = GuestValue::object(FunctionObject::new("add", |args| {
        let a = args[0].unboxed().and_then(|p| to_integer(&p)).unwrap_or(0);
        let b = args[1].unboxed().and_then(|p| to_integer(&p)).unwrap_or(0);
        Ok(GuestValue::from(a + b))
    }));
    let value = view(
        &ctx,
        &add,
        HostType::function_of(HostType::object(), HostType::boxed(PrimitiveKind::Long)),
    );
    let function = value.as_function().unwrap();
    let sum = function.apply(&[HostValue::Int(2), HostValue::Int(40)]).unwrap();
    assert_eq!(sum, HostValue::Long(42));
}

#[test]
fn test_function_failures() {
    let ctx = context();
    let strict = GuestValue::object(
        FunctionObject::new("one", |args| Ok(args[0].clone())).with_arity(1),
    );
    let value = view(&ctx, &strict, HostType::function_of(HostType::object(), HostType::object()));
    let err = value.as_function().unwrap().apply(&[]).unwrap_err();
    assert!(matches!(err, PolyglotError::IllegalArgument(_)));
    assert!(err.message().contains("Expected 1 argument(s) but got 0."), "{}", err);

    let throwing = GuestValue::object(FunctionObject::new("boom", |_| {
        Err(ExceptionObject::raise("kaput"))
    }));
    let value = view(&ctx, &throwing, HostType::function_of(HostType::object(), HostType::object()));
    match value.as_function().unwrap().apply(&[]) {
        Err(PolyglotError::Guest(exception)) => assert_eq!(exception.message(), "kaput"),
        other => panic!("unexpected {:?}", other),
    }
}

// ============================================================================
// Byte Sequences
// ============================================================================

#[test]
fn test_byte_sequence() {
    let ctx = context();
    let buffer = GuestValue::object(BufferObject::new(vec![1, 2, 3, 4]));
    let value = view(&ctx, &buffer, HostType::bytes());
    let bytes = value.as_bytes().unwrap();
    assert_eq!(bytes.length().unwrap(), 4);
    assert_eq!(bytes.byte_at(2).unwrap(), 3);
    assert!(matches!(bytes.byte_at(4), Err(PolyglotError::IndexOutOfBounds(_))));

    let tail = bytes.sub_sequence(1, 4).unwrap();
    assert_eq!(tail.to_byte_array().unwrap(), vec![2, 3, 4]);
    assert!(bytes.sub_sequence(3, 2).is_err());
}

/// A buffer that reports a size no host array can hold and counts reads
struct HugeBuffer {
    reads: AtomicUsize,
}

impl ForeignObject for HugeBuffer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn language(&self) -> &str {
        "memory"
    }

    fn display_string(&self) -> String {
        "HugeBuffer".to_string()
    }

    fn has_buffer_elements(&self) -> bool {
        true
    }

    fn buffer_size(&self) -> InteropResult<u64> {
        Ok(MAX_ARRAY_LENGTH + 1)
    }

    fn read_buffer_byte(&self, _offset: u64) -> InteropResult<u8> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(0)
    }
}

#[test]
fn test_oversized_buffer_is_not_copied() {
    let ctx = context();
    let huge = Arc::new(HugeBuffer {
        reads: AtomicUsize::new(0),
    });
    let value = view(&ctx, &GuestValue::Object(huge.clone()), HostType::bytes());
    let err = value.as_bytes().unwrap().to_byte_array().unwrap_err();
    assert!(matches!(err, PolyglotError::Unsupported(_)));
    assert_eq!(huge.reads.load(Ordering::Relaxed), 0);
}
