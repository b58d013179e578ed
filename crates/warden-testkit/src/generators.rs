//! Proptest strategies.

use proptest::prelude::*;
use warden_core::Method;

/// Any known method.
pub fn known_method() -> impl Strategy<Value = Method> {
    proptest::sample::select(Method::ALL.to_vec())
}

/// Method names the protocol does not define.
pub fn unknown_method_name() -> impl Strategy<Value = String> {
    "[a-z_]{1,16}".prop_filter("must not be a known method", |s| !Method::parse(s).is_known())
}

/// Event kinds, biased toward the ones apps actually request.
pub fn event_kind() -> impl Strategy<Value = u16> {
    prop_oneof![
        3 => proptest::sample::select(vec![0u16, 1, 3, 6, 7, 9734, 10002, 30023, 10000, 27235]),
        1 => any::<u16>(),
    ]
}

/// A request id as apps generate them.
pub fn request_id() -> impl Strategy<Value = String> {
    "[0-9a-f]{8,32}"
}
