use memory::{Binding, BindingKind, Heap, Object, ObjectKind, Property, Scope, ScopeKind, Value};

#[test]
fn test_gc_alloc_reuse_string() {
    let mut heap = Heap::new();
    let idx1 = heap.alloc_string("Hello".to_string());

    // Mark nothing, sweep: idx1 is free.
    heap.trace(vec![], vec![]);
    heap.sweep();
    assert!(heap.is_string_free(idx1));

    let idx2 = heap.alloc_string("World".to_string());
    assert_eq!(idx1, idx2, "Heap should reuse freed index");
    assert_eq!(heap.get_flat_string(idx2), Some("World"));
}

#[test]
fn test_gc_cycle_collection() {
    let mut heap = Heap::new();
    let a = heap.alloc_object(Object::new(ObjectKind::Ordinary, 0));
    let b = heap.alloc_object(Object::new(ObjectKind::Ordinary, 0));

    // A -> B, B -> A
    heap.get_object_mut(a)
        .unwrap()
        .properties
        .insert("b".into(), Property::data(Value::object(b)));
    heap.get_object_mut(b)
        .unwrap()
        .properties
        .insert("a".into(), Property::data(Value::object(a)));

    heap.trace(vec![], vec![]);
    assert_eq!(heap.sweep(), 2);
    assert!(heap.is_object_free(a));
    assert!(heap.is_object_free(b));
}

#[test]
fn test_gc_traces_elements_and_getters() {
    let mut heap = Heap::new();
    let s = heap.alloc_string("kept".into());
    let getter = heap.alloc_object(Object::new(ObjectKind::Function(0), 0));
    let mut holder = Object::with_elements(ObjectKind::Array, 0, vec![Value::string(s)]);
    holder
        .properties
        .insert("x".into(), Property::accessor(Value::object(getter)));
    let holder = heap.alloc_object(holder);

    heap.trace(vec![Value::object(holder)], vec![]);
    heap.sweep();
    assert!(!heap.is_string_free(s));
    assert!(!heap.is_object_free(getter));
}

#[test]
fn test_gc_rope_keeps_fibers() {
    let mut heap = Heap::new();
    let lhs = heap.alloc_string("var x = 1".into());
    let rhs = heap.alloc_string("()".into());
    let rope = heap.alloc_rope(lhs, rhs);

    heap.trace(vec![Value::string(rope)], vec![]);
    heap.sweep();
    assert!(!heap.is_string_free(lhs));
    assert!(!heap.is_string_free(rhs));
}

#[test]
fn test_gc_scope_chain_roots_bindings() {
    let mut heap = Heap::new();
    let global = heap.alloc_scope(Scope::new(ScopeKind::Global, None, 0));
    let obj = heap.alloc_object(Object::new(ObjectKind::Ordinary, 0));
    let mut inner = Scope::new(ScopeKind::Lexical, Some(global), 0);
    inner
        .bindings
        .insert("o".into(), Binding::new(BindingKind::Let, Value::object(obj)));
    let inner = heap.alloc_scope(inner);
    let orphan = heap.alloc_scope(Scope::new(ScopeKind::Function, Some(global), 0));

    heap.trace(vec![], vec![inner]);
    heap.sweep();
    assert!(!heap.is_scope_free(global));
    assert!(!heap.is_object_free(obj));
    assert!(heap.is_scope_free(orphan));
}

#[test]
fn test_rope_resolution_and_suffix_lookup() {
    let mut heap = Heap::new();
    let lhs = heap.alloc_string("f".into());
    let rhs = heap.alloc_string("()".into());
    let rope = heap.alloc_rope(lhs, rhs);

    assert!(heap.is_rope(rope));
    assert_eq!(heap.rope_lhs_before_suffix(rope, "()"), Some("f"));
    assert_eq!(heap.rope_lhs_before_suffix(rope, ";"), None);

    assert_eq!(heap.resolve_string(rope).as_deref(), Some("f()"));
    assert!(!heap.is_rope(rope));
    assert_eq!(heap.get_flat_string(rope), Some("f()"));
    assert_eq!(heap.rope_lhs_before_suffix(rope, "()"), None);
}
