//! Integration tests for saga persistence on the in-memory document engine

use assert_matches::assert_matches;
use serde::{Deserialize, Serialize};
use serde_json::json;
use transit_saga_store::{
    ClientBuilder, ClientOptions, ErrorKind, Saga, SagaClientFactory, SingleEndpointClientFactory,
    StorageClient,
};
use transit_saga_store_memory::{Error, MemoryClientBuilder, MemoryDocumentEngine};
use uuid::Uuid;

const ENDPOINT: &str = "memory://documents";
const KEY: &str = "primary-key";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderState {
    correlation_id: Uuid,
    current_state: String,
    items: Vec<String>,
}

impl Saga for OrderState {
    const CORRELATION_FIELD: &'static str = "correlationId";

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct PaymentState {
    id: Uuid,
    amount: u64,
}

impl Saga for PaymentState {
    const CORRELATION_FIELD: &'static str = "id";

    fn correlation_id(&self) -> Uuid {
        self.id
    }
}

fn order() -> OrderState {
    OrderState {
        correlation_id: Uuid::new_v4(),
        current_state: "Submitted".to_string(),
        items: vec!["book".to_string()],
    }
}

fn engine() -> MemoryDocumentEngine {
    MemoryDocumentEngine::new().with_account(ENDPOINT, KEY)
}

fn factory(engine: &MemoryDocumentEngine) -> SingleEndpointClientFactory<MemoryClientBuilder> {
    SingleEndpointClientFactory::new(engine.builder(), ENDPOINT, KEY).unwrap()
}

#[tokio::test]
async fn test_remapped_saga_round_trip() {
    let _ = tracing_subscriber::fmt::try_init();

    let engine = engine();
    let factory = factory(&engine);
    let client = factory.get_client::<OrderState>("orders").unwrap();
    let container = client.container("sagas").unwrap();

    let state = order();
    let id = state.correlation_id().to_string();
    container.create(&state).await.unwrap();

    let stored = container.read_document(&id).await.unwrap().unwrap();
    assert_eq!(stored["id"], json!(id));
    assert!(stored.get("correlationId").is_none());
    assert_eq!(stored["currentState"], json!("Submitted"));

    let loaded = container.read::<OrderState>(&id).await.unwrap().unwrap();
    assert_eq!(loaded.item, state);

    factory.dispose();
    assert_eq!(engine.connections_opened(), 1);
    assert_eq!(engine.connections_closed(), 1);
}

#[tokio::test]
async fn test_unmapped_saga_rejected_by_engine() {
    let engine = engine();
    let client = engine
        .builder()
        .build(ENDPOINT, KEY, ClientOptions::default())
        .unwrap();
    let container = client.container("sagas").unwrap();

    let result = container.create(&order()).await;

    assert_matches!(result, Err(Error::MissingId));
    assert_eq!(engine.document_count("sagas").await, 0);
}

#[tokio::test]
async fn test_identity_saga_stored_as_is() {
    let engine = engine();
    let factory = factory(&engine);
    let client = factory.get_client::<PaymentState>("payments").unwrap();
    let container = client.container("sagas").unwrap();

    let state = PaymentState {
        id: Uuid::new_v4(),
        amount: 42,
    };
    container.upsert(&state).await.unwrap();

    let stored = container
        .read_document(&state.id.to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, json!({ "id": state.id.to_string(), "amount": 42 }));
    assert!(client.options().serializer.is_pass_through());
}

#[tokio::test]
async fn test_sagas_share_endpoint_but_not_clients() {
    let engine = engine();
    let factory = factory(&engine);

    let orders = factory.get_client::<OrderState>("orders").unwrap();
    let payments = factory.get_client::<PaymentState>("payments").unwrap();

    assert_eq!(orders.endpoint(), payments.endpoint());
    assert_eq!(engine.connections_opened(), 2);

    drop(factory);

    assert!(orders.is_closed());
    assert!(payments.is_closed());
    assert_eq!(engine.connections_closed(), 2);
}

#[tokio::test]
async fn test_optimistic_concurrency() {
    let engine = engine();
    let factory = factory(&engine);
    let container = factory
        .get_client::<OrderState>("orders")
        .unwrap()
        .container("sagas")
        .unwrap();

    let mut state = order();
    let id = state.correlation_id.to_string();
    let first = container.upsert(&state).await.unwrap();

    state.current_state = "Accepted".to_string();
    let second = container.replace(&state, Some(first.as_str())).await.unwrap();
    assert_ne!(first, second);

    state.current_state = "Cancelled".to_string();
    assert_matches!(
        container.replace(&state, Some(first.as_str())).await,
        Err(Error::PreconditionFailed { .. })
    );
    assert_matches!(
        container.delete(&id, Some(first.as_str())).await,
        Err(Error::PreconditionFailed { .. })
    );

    let loaded = container.read::<OrderState>(&id).await.unwrap().unwrap();
    assert_eq!(loaded.item.current_state, "Accepted");
    assert_eq!(loaded.etag, second);

    assert!(container.delete(&id, Some(second.as_str())).await.unwrap());
    assert!(!container.delete(&id, None).await.unwrap());
    assert!(container.read::<OrderState>(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_create_conflict_and_replace_missing() {
    let engine = engine();
    let factory = factory(&engine);
    let container = factory
        .get_client::<OrderState>("orders")
        .unwrap()
        .container("sagas")
        .unwrap();

    let state = order();
    container.create(&state).await.unwrap();
    assert_matches!(container.create(&state).await, Err(Error::Conflict { .. }));

    assert_matches!(
        container.replace(&order(), None).await,
        Err(Error::NotFound { .. })
    );
}

#[tokio::test]
async fn test_unreachable_engine_is_retried() {
    let engine = engine();
    let factory = factory(&engine);

    engine.set_available(false);
    let err = factory.get_client::<OrderState>("orders").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstructionFailure);
    assert_eq!(factory.constructed_clients(), 0);

    engine.set_available(true);
    factory.get_client::<OrderState>("orders").unwrap();

    assert_eq!(engine.connections_opened(), 1);
}

#[tokio::test]
async fn test_wrong_key_rejected() {
    let engine = engine();
    let factory = SingleEndpointClientFactory::new(engine.builder(), ENDPOINT, "stale").unwrap();

    let err = factory.get_client::<OrderState>("orders").unwrap_err();

    assert_matches!(
        err,
        transit_saga_store::Error::Construction { ref source, .. }
            if matches!(source.downcast_ref::<Error>(), Some(Error::Unauthorized { .. }))
    );
}

#[tokio::test]
async fn test_closed_client_rejects_operations() {
    let engine = engine();
    let factory = factory(&engine);
    let client = factory.get_client::<OrderState>("orders").unwrap();
    let container = client.container("sagas").unwrap();

    client.close();
    client.close();

    assert_matches!(container.upsert(&order()).await, Err(Error::Closed));
    assert_matches!(client.container("sagas"), Err(Error::Closed));
    assert_eq!(engine.connections_closed(), 1);

    factory.dispose();
    assert_eq!(engine.connections_closed(), 1);
}
