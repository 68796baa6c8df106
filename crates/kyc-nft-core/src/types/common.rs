pub type AnyJson = serde_json::Value;

/// Boxed error used before a failure has been classified into the taxonomy.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
