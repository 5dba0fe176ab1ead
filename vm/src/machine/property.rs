//! Named and indexed property access on the object model the core needs:
//! data and getter properties, element storage and the global object's
//! scope-backed properties.

use memory::{BindingKind, ErrorType, ObjectKind, Property, PropertyValue, Value};

use crate::exception::Completion;

use super::vm::VM;

/// Slot a property read resolved to, before any getter runs.
enum Found {
    Value(Value),
    Getter(Value),
    Absent,
}

fn parse_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse().ok()
}

impl VM {
    fn lookup_property(&self, handle: u32, key: &str) -> Found {
        let Some(object) = self.heap.get_object(handle) else {
            return Found::Absent;
        };
        if let ObjectKind::Global { scope } = object.kind {
            let binding = self
                .heap
                .get_scope(scope)
                .and_then(|s| s.lookup(key))
                .filter(|b| !b.kind.is_lexical());
            if let Some(binding) = binding {
                return Found::Value(binding.value);
            }
        }
        if let Some(index) = parse_index(key) {
            if let Some(value) = object.element(index) {
                return Found::Value(value);
            }
        }
        match object.properties.get(key).map(|p| p.value) {
            Some(PropertyValue::Data(value)) => Found::Value(value),
            Some(PropertyValue::Accessor { getter }) => Found::Getter(getter),
            None if key == "length" && matches!(object.kind, ObjectKind::Array | ObjectKind::ImmutableList) => {
                Found::Value(Value::int(object.elements.len() as i64))
            }
            None => Found::Absent,
        }
    }

    /// Full property get. Getters run as calls with the object as `this`.
    pub fn get(&mut self, base: Value, key: &str) -> Completion {
        let Some(handle) = base.as_object() else {
            if base.is_undefined_or_null() {
                let message = format!("Cannot read property '{key}' of {}", self.to_display_string(base));
                return Err(self.throw_type_error(&message));
            }
            return Ok(Value::undefined());
        };
        match self.lookup_property(handle, key) {
            Found::Value(value) => Ok(value),
            Found::Getter(getter) => self.call(getter, base, &[]),
            Found::Absent => Ok(Value::undefined()),
        }
    }

    /// Indexed get through the full property protocol.
    pub fn get_index(&mut self, base: Value, index: usize) -> Completion {
        self.stats.slow_index_gets += 1;
        self.get(base, &index.to_string())
    }

    /// Whether `index` is a plain stored element that can be read without
    /// running script.
    pub fn can_get_index_quickly(&self, base: Value, index: usize) -> bool {
        base.as_object()
            .and_then(|h| self.heap.get_object(h))
            .is_some_and(|o| o.element(index).is_some())
    }

    pub fn get_index_quickly(&mut self, base: Value, index: usize) -> Value {
        debug_assert!(self.can_get_index_quickly(base, index));
        self.stats.quick_index_gets += 1;
        base.as_object()
            .and_then(|h| self.heap.get_object(h))
            .and_then(|o| o.element(index))
            .unwrap_or_else(Value::undefined)
    }

    /// Sloppy-mode put: writes to read-only or getter-only properties are
    /// ignored.
    pub fn put(&mut self, base: Value, key: &str, value: Value) -> Completion<()> {
        let Some(handle) = base.as_object() else {
            if base.is_undefined_or_null() {
                let message = format!("Cannot set property '{key}' of {}", self.to_display_string(base));
                return Err(self.throw_type_error(&message));
            }
            return Ok(());
        };
        let Some(object) = self.heap.get_object(handle) else {
            return Ok(());
        };

        if let ObjectKind::Global { scope } = object.kind {
            let extensible = object.extensible;
            if let Some(scope) = self.heap.get_scope_mut(scope) {
                match scope.bindings.get_mut(key) {
                    Some(binding) if !binding.kind.is_lexical() => {
                        if binding.writable {
                            binding.value = value;
                        }
                        return Ok(());
                    }
                    Some(_) => {}
                    None if extensible => {
                        scope.declare(key, BindingKind::Var, value);
                        return Ok(());
                    }
                    None => return Ok(()),
                }
            }
        }

        let Some(object) = self.heap.get_object_mut(handle) else {
            return Ok(());
        };
        let element_storage = matches!(object.kind, ObjectKind::Array | ObjectKind::Arguments(_));
        if element_storage {
            if let Some(index) = parse_index(key) {
                if index >= object.elements.len() {
                    object.elements.resize(index + 1, Value::empty());
                }
                object.elements[index] = value;
                return Ok(());
            }
            if key == "length" && object.kind == ObjectKind::Array {
                if let Some(length) = value.as_int().filter(|n| *n >= 0) {
                    object.elements.resize(length as usize, Value::empty());
                }
                return Ok(());
            }
        }
        match object.properties.get_mut(key) {
            Some(property) => {
                if let (PropertyValue::Data(_), true) = (property.value, property.attributes.writable) {
                    property.value = PropertyValue::Data(value);
                }
            }
            None if object.extensible => {
                object.properties.insert(key.to_string(), Property::data(value));
            }
            None => {}
        }
        Ok(())
    }

    pub fn put_index(&mut self, base: Value, index: usize, value: Value) -> Completion<()> {
        self.put(base, &index.to_string(), value)
    }

    /// `ToLength`, clamped to the unsigned 32-bit range.
    pub fn to_length(&mut self, value: Value) -> Completion<u64> {
        let number = if let Some(n) = value.as_int() {
            n
        } else if let Some(b) = value.as_bool() {
            i64::from(b)
        } else if value.is_string() {
            let text = self.string_value(value);
            text.trim().parse::<i64>().unwrap_or(0)
        } else if value.is_symbol() {
            return Err(self.throw_error(ErrorType::TypeError, "Cannot convert a symbol to a number"));
        } else if value.is_bigint() {
            return Err(self.throw_error(ErrorType::TypeError, "Cannot convert a BigInt value to a number"));
        } else {
            0
        };
        Ok(number.clamp(0, i64::from(u32::MAX)) as u64)
    }

    /// Human-readable rendering that never runs script.
    pub fn to_display_string(&mut self, value: Value) -> String {
        if let Some(n) = value.as_int() {
            return n.to_string();
        }
        if let Some(b) = value.as_bool() {
            return b.to_string();
        }
        if value.is_undefined() {
            return "undefined".to_string();
        }
        if value.is_null() {
            return "null".to_string();
        }
        if value.is_string() {
            return self.string_value(value);
        }
        let Some(handle) = value.as_handle() else {
            return String::new();
        };
        if value.is_symbol() {
            return format!("Symbol({})", self.heap.get_symbol(handle).unwrap_or_default());
        }
        if value.is_bigint() {
            return self.heap.get_bigint(handle).unwrap_or_default().to_string();
        }
        let Some(object) = self.heap.get_object(handle) else {
            return String::new();
        };
        match &object.kind {
            ObjectKind::Error(data) if data.message.is_empty() => data.error_type.name().to_string(),
            ObjectKind::Error(data) => format!("{}: {}", data.error_type.name(), data.message),
            ObjectKind::Function(_) => {
                let name = self.function_record(value).map(|r| r.name.clone()).unwrap_or_default();
                format!("function {name}() {{\n    [native code]\n}}")
            }
            ObjectKind::Array | ObjectKind::ImmutableList => {
                let elements = object.elements.clone();
                elements
                    .into_iter()
                    .map(|v| {
                        if v.is_empty() || v.is_undefined_or_null() {
                            String::new()
                        } else {
                            self.to_display_string(v)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(",")
            }
            ObjectKind::Arguments(_) => "[object Arguments]".to_string(),
            _ => "[object Object]".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::FrameId;
    use crate::native::native_fn;
    use crate::realm::RealmId;

    #[test]
    fn getters_run_with_the_object_as_this() {
        let mut vm = VM::new();
        let object = vm.create_object(RealmId::MAIN);
        let getter = vm.create_native_function(
            RealmId::MAIN,
            "get",
            native_fn(|vm: &mut VM, frame: FrameId| {
                use crate::machine::StackOps;
                let this = vm.this_value(frame);
                vm.get(this, "backing")
            }),
        );
        vm.put(object, "backing", Value::int(41)).unwrap();
        let handle = object.as_object().unwrap();
        vm.heap
            .get_object_mut(handle)
            .unwrap()
            .properties
            .insert("answer".into(), Property::accessor(getter));
        assert_eq!(vm.get(object, "answer"), Ok(Value::int(41)));
    }

    #[test]
    fn array_length_tracks_elements() {
        let mut vm = VM::new();
        let array = vm.create_array(&[Value::int(1)]);
        vm.put_index(array, 3, Value::int(4)).unwrap();
        assert_eq!(vm.get(array, "length"), Ok(Value::int(4)));
        assert!(!vm.can_get_index_quickly(array, 2), "holes are not quick");
        assert!(vm.can_get_index_quickly(array, 3));
        vm.put(array, "length", Value::int(1)).unwrap();
        assert_eq!(vm.get(array, "length"), Ok(Value::int(1)));
    }

    #[test]
    fn index_gets_are_counted_by_path() {
        let mut vm = VM::new();
        let array = vm.create_array(&[Value::int(7)]);
        assert_eq!(vm.get_index_quickly(array, 0), Value::int(7));
        assert_eq!(vm.get_index(array, 0), Ok(Value::int(7)));
        assert_eq!(vm.stats.quick_index_gets, 1);
        assert_eq!(vm.stats.slow_index_gets, 1);
    }

    #[test]
    fn to_length_clamps() {
        let mut vm = VM::new();
        assert_eq!(vm.to_length(Value::int(-4)), Ok(0));
        assert_eq!(vm.to_length(Value::int(1 << 40)), Ok(u64::from(u32::MAX)));
        let s = vm.alloc_str(" 12 ");
        assert_eq!(vm.to_length(s), Ok(12));
        assert_eq!(vm.to_length(Value::undefined()), Ok(0));
    }

    #[test]
    fn reading_from_undefined_throws() {
        let mut vm = VM::new();
        assert!(vm.get(Value::undefined(), "x").is_err());
        let (ty, message) = vm.error_info(vm.exception_value().unwrap()).unwrap();
        assert_eq!(ty, ErrorType::TypeError);
        assert_eq!(message, "Cannot read property 'x' of undefined");
    }

    #[test]
    fn global_object_properties_live_in_the_global_scope() {
        let mut vm = VM::new();
        let global = vm.global_this(RealmId::MAIN);
        vm.put(global, "answer", Value::int(42)).unwrap();
        let scope = vm.realm(RealmId::MAIN).global_scope;
        let binding = *vm.heap.get_scope(scope).unwrap().lookup("answer").unwrap();
        assert_eq!(binding.value, Value::int(42));
        assert_eq!(vm.get(global, "answer"), Ok(Value::int(42)));
    }
}
