//! Convenience macros for plugin development.

/// Builds the key/value map carried as event data. Keys keep the order
/// they are written in.
///
/// # Example
/// ```rust,ignore
/// let data = event_data! {
///     "document" => "readme.md",
///     "bytes" => 2048,
/// };
/// runtime.publish("document.saved", data, ContextData::from_source("editor"));
/// ```
#[macro_export]
macro_rules! event_data {
    () => {
        $crate::serde_json::Map::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut data = $crate::serde_json::Map::new();
        $(
            data.insert($key.to_string(), $crate::serde_json::json!($value));
        )+
        data
    }};
}
