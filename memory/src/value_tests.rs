#[cfg(test)]
mod tests {
    use crate::value::{I60_MAX, I60_MIN};
    use crate::Value;
    use proptest::prelude::*;

    #[test]
    fn test_tagged_int_basics() {
        let v = Value::int(123);
        assert!(v.is_int());
        assert!(!v.is_cell());
        assert_eq!(v.as_int(), Some(123));

        let v_neg = Value::int(-99);
        assert!(v_neg.is_int());
        assert_eq!(v_neg.as_int(), Some(-99));
    }

    #[test]
    fn test_tagged_int_i60_range() {
        assert_eq!(Value::int(I60_MAX).as_int(), Some(I60_MAX));
        assert_eq!(Value::int(I60_MIN).as_int(), Some(I60_MIN));
    }

    #[test]
    fn test_undefined_null_empty_are_distinct() {
        let u = Value::undefined();
        let n = Value::null();
        let e = Value::empty();
        assert!(u.is_undefined() && u.is_undefined_or_null());
        assert!(n.is_null() && n.is_undefined_or_null());
        assert!(e.is_empty() && !e.is_undefined_or_null());
        assert_ne!(u, n);
        assert_ne!(u, e);
        assert!(u.as_handle().is_none());
    }

    #[test]
    fn test_tagged_bools() {
        assert_eq!(Value::bool(true).as_bool(), Some(true));
        assert_eq!(Value::bool(false).as_bool(), Some(false));
        assert_eq!(Value::int(1).as_bool(), None);
    }

    #[test]
    fn test_cells_keep_handles() {
        let cases = [
            (Value::string(7), "string"),
            (Value::symbol(8), "symbol"),
            (Value::bigint(9), "bigint"),
            (Value::object(10), "object"),
        ];
        for (v, name) in cases {
            assert!(v.is_cell(), "{name} should be a cell");
            assert!(v.as_handle().is_some(), "{name} should carry a handle");
        }
        assert_eq!(Value::object(10).as_object(), Some(10));
        assert_eq!(Value::string(7).as_object(), None);
        assert!(Value::object(3).is_object() && !Value::object(3).is_primitive());
        assert!(Value::symbol(3).is_primitive());
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", Value::int(-4)), "Int(-4)");
        assert_eq!(format!("{:?}", Value::undefined()), "Undefined");
        assert_eq!(format!("{:?}", Value::object(2)), "Object(2)");
    }

    proptest! {
        #[test]
        fn int_roundtrip_within_i60(n in I60_MIN..=I60_MAX) {
            prop_assert_eq!(Value::int(n).as_int(), Some(n));
        }
    }
}
