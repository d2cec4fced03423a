use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Returns the bare name of `T`, without module path or generic arguments.
///
/// `lib_flotils::runable::StartStopable<app::Worker>` becomes `StartStopable`.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics.rsplit("::").next().unwrap_or(without_generics)
}

/// # Format Fields
///
/// Renders the fields of a serializable value as `key=value` pairs joined by
/// `", "`. Strings are printed without quotes; nested values as compact JSON.
/// Values that do not serialize to an object are rendered whole.
pub fn format_fields<T: Serialize + ?Sized>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => fields
            .iter()
            .map(|(key, value)| match value {
                Value::String(text) => format!("{}={}", key, text),
                other => format!("{}={}", key, other),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Ok(other) => other.to_string(),
        Err(e) => format!("<unserializable: {}>", e),
    }
}

/// # Printable
///
/// A `Display` wrapper printing a value as `<TypeName>(key=value, ...)`.
///
/// ```
/// use lib_flotils::utils::Printable;
///
/// #[derive(serde::Serialize)]
/// struct Point { x: i32, y: i32 }
///
/// assert_eq!(Printable(&Point { x: 1, y: 2 }).to_string(), "<Point>(x=1, y=2)");
/// ```
pub struct Printable<'a, T: ?Sized>(pub &'a T);

impl<T: Serialize + ?Sized> fmt::Display for Printable<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>({})", short_type_name::<T>(), format_fields(self.0))
    }
}

impl<T: Serialize + ?Sized> fmt::Debug for Printable<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
