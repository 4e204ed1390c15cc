use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// Persisted state of a correlated, long-running workflow.
///
/// The correlation field is declared as trait metadata instead of being
/// discovered at runtime:
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use transit_saga_store::Saga;
/// use uuid::Uuid;
///
/// #[derive(Serialize, Deserialize)]
/// #[serde(rename_all = "camelCase")]
/// struct OrderState {
///     correlation_id: Uuid,
///     current_state: String,
/// }
///
/// impl Saga for OrderState {
///     const CORRELATION_FIELD: &'static str = "correlationId";
///
///     fn correlation_id(&self) -> Uuid {
///         self.correlation_id
///     }
/// }
/// ```
pub trait Saga: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Serialized name of the field carrying the correlation key.
    const CORRELATION_FIELD: &'static str;

    /// The correlation key of this instance.
    fn correlation_id(&self) -> Uuid;
}
