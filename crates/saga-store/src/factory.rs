use std::any::{TypeId, type_name};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering, fence};

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::client::{ClientBuilder, ClientOptions, StorageClient};
use crate::config::FactoryConfig;
use crate::correlation::CorrelationResolver;
use crate::error::Error;
use crate::saga::Saga;
use crate::serializer::DocumentSerializer;

/// Hands out one native storage client per saga type.
pub trait SagaClientFactory: Send + Sync {
    /// The native client type.
    type Client: StorageClient;

    /// Returns the client for saga type `S`, building it on first request.
    ///
    /// `client_name` is a diagnostic label only; it does not affect which
    /// client is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the factory was disposed, `S` declares a blank
    /// correlation field, or the client cannot be built.
    fn get_client<S>(&self, client_name: &str) -> Result<Arc<Self::Client>, Error>
    where
        S: Saga;

    /// Closes every client built so far. Idempotent.
    fn dispose(&self);
}

struct BuiltClient<C> {
    client: Arc<C>,
    closed: AtomicBool,
}

impl<C> BuiltClient<C>
where
    C: StorageClient,
{
    fn new(client: C) -> Self {
        Self {
            client: Arc::new(client),
            closed: AtomicBool::new(false),
        }
    }

    /// Closes the client unless already closed; returns whether this call
    /// closed it.
    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.client.close();
        true
    }
}

type ClientCell<C> = Arc<OnceCell<BuiltClient<C>>>;

/// A [`SagaClientFactory`] where every saga type shares one endpoint and key.
///
/// Clients are built lazily and at most once per saga type, even under
/// concurrent first requests. A failed build is not cached; the next request
/// retries. Dropping the factory disposes it.
pub struct SingleEndpointClientFactory<B>
where
    B: ClientBuilder,
{
    builder: B,
    config: FactoryConfig,
    resolver: CorrelationResolver,
    clients: DashMap<TypeId, ClientCell<B::Client>>,
    disposed: AtomicBool,
}

impl<B> SingleEndpointClientFactory<B>
where
    B: ClientBuilder,
{
    /// Creates a factory for `endpoint` authenticated with `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if either value is blank.
    pub fn new(
        builder: B,
        endpoint: impl Into<String>,
        key: impl Into<String>,
    ) -> Result<Self, Error> {
        Self::from_config(builder, FactoryConfig::new(endpoint, key))
    }

    /// Creates a factory from a full config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the endpoint or key is blank.
    pub fn from_config(builder: B, config: FactoryConfig) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            builder,
            config,
            resolver: CorrelationResolver::new(B::RESERVED_ID_FIELD),
            clients: DashMap::new(),
            disposed: AtomicBool::new(false),
        })
    }

    /// The factory's config.
    pub const fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// The builder clients are built with.
    pub const fn builder(&self) -> &B {
        &self.builder
    }

    /// The serializer clients for `S` are built with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `S` declares a blank
    /// correlation field.
    pub fn serializer_for<S>(&self) -> Result<DocumentSerializer, Error>
    where
        S: Saga,
    {
        self.resolver.serializer_for::<S>()
    }

    /// Number of clients built and not yet disposed.
    pub fn constructed_clients(&self) -> usize {
        self.clients
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .count()
    }

    /// Whether [`dispose`](SagaClientFactory::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn construct<S>(&self) -> Result<BuiltClient<B::Client>, Error>
    where
        S: Saga,
    {
        let serializer = self.resolver.serializer_for::<S>()?;
        debug!(remap = ?serializer.rename(), "building storage client");

        let options = ClientOptions {
            serializer,
            application_name: self.config.application_name.clone(),
            request_timeout: self.config.request_timeout(),
        };

        let client = self
            .builder
            .build(&self.config.endpoint, &self.config.key, options)
            .map_err(|e| Error::Construction {
                saga_type: type_name::<S>(),
                source: Box::new(e),
            })?;

        info!(endpoint = %self.config.endpoint, "storage client built");

        Ok(BuiltClient::new(client))
    }
}

impl<B> SagaClientFactory for SingleEndpointClientFactory<B>
where
    B: ClientBuilder,
{
    type Client = B::Client;

    #[instrument(skip(self), fields(saga = type_name::<S>()))]
    fn get_client<S>(&self, client_name: &str) -> Result<Arc<Self::Client>, Error>
    where
        S: Saga,
    {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }

        // Clone the cell out so the shard lock is released before building.
        let cell = Arc::clone(&self.clients.entry(TypeId::of::<S>()).or_default());

        let built = cell
            .get_or_try_init(|| self.construct::<S>())
            .inspect_err(|e| warn!(error = %e, "storage client unavailable"))?;

        // A dispose that swept the cache while this build was in flight never
        // saw the client; close it here. Pairs with the fence in `dispose`.
        fence(Ordering::SeqCst);
        if self.is_disposed() {
            if built.close() {
                debug!("closed client built during dispose");
            }
            return Err(Error::Disposed);
        }

        Ok(Arc::clone(&built.client))
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        fence(Ordering::SeqCst);

        let closed = self
            .clients
            .iter()
            .filter(|entry| entry.value().get().is_some_and(BuiltClient::close))
            .count();
        self.clients.clear();

        info!(closed, "client factory disposed");
    }
}

impl<B> fmt::Debug for SingleEndpointClientFactory<B>
where
    B: ClientBuilder,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleEndpointClientFactory")
            .field("config", &self.config)
            .field("reserved_id_field", &self.resolver.reserved())
            .field("constructed_clients", &self.constructed_clients())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl<B> Drop for SingleEndpointClientFactory<B>
where
    B: ClientBuilder,
{
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Barrier, Mutex};
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use serde::{Deserialize, Serialize};
    use thiserror::Error as ThisError;
    use tracing_test::traced_test;
    use uuid::Uuid;

    use crate::client::StorageClientError;
    use crate::error::ErrorKind;
    use crate::serializer::FieldRename;

    #[derive(Debug, ThisError)]
    #[error("engine unreachable")]
    struct Unreachable;

    impl StorageClientError for Unreachable {}

    #[derive(Debug)]
    struct FakeClient {
        options: ClientOptions,
        closes: Arc<AtomicUsize>,
    }

    impl StorageClient for FakeClient {
        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl FakeClient {
        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    /// Two rendezvous points a build waits on: one when it starts, one before
    /// it returns.
    struct BuildGate {
        entered: Barrier,
        release: Barrier,
    }

    #[derive(Default)]
    struct CountingBuilder {
        builds: AtomicUsize,
        failures_left: AtomicUsize,
        delay: Duration,
        gate: Option<BuildGate>,
        issued: Mutex<Vec<Arc<AtomicUsize>>>,
    }

    impl CountingBuilder {
        fn failing(times: usize) -> Self {
            Self {
                failures_left: AtomicUsize::new(times),
                ..Self::default()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        fn gated() -> Self {
            Self {
                gate: Some(BuildGate {
                    entered: Barrier::new(2),
                    release: Barrier::new(2),
                }),
                ..Self::default()
            }
        }

        fn builds(&self) -> usize {
            self.builds.load(Ordering::SeqCst)
        }

        /// Close counts of every client handed out, in build order.
        fn issued_closes(&self) -> Vec<usize> {
            self.issued
                .lock()
                .unwrap()
                .iter()
                .map(|closes| closes.load(Ordering::SeqCst))
                .collect()
        }
    }

    impl ClientBuilder for CountingBuilder {
        type Client = FakeClient;
        type Error = Unreachable;

        fn build(
            &self,
            _endpoint: &str,
            _key: &str,
            options: ClientOptions,
        ) -> Result<Self::Client, Self::Error> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.entered.wait();
                gate.release.wait();
            }
            thread::sleep(self.delay);

            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(Unreachable);
            }

            let closes = Arc::new(AtomicUsize::new(0));
            self.issued.lock().unwrap().push(Arc::clone(&closes));

            Ok(FakeClient { options, closes })
        }
    }

    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct OrderState {
        correlation_id: Uuid,
    }

    impl Saga for OrderState {
        const CORRELATION_FIELD: &'static str = "correlationId";

        fn correlation_id(&self) -> Uuid {
            self.correlation_id
        }
    }

    #[derive(Serialize, Deserialize)]
    struct PaymentState {
        id: Uuid,
    }

    impl Saga for PaymentState {
        const CORRELATION_FIELD: &'static str = "id";

        fn correlation_id(&self) -> Uuid {
            self.id
        }
    }

    #[derive(Serialize, Deserialize)]
    struct UnlocatableState;

    impl Saga for UnlocatableState {
        const CORRELATION_FIELD: &'static str = "";

        fn correlation_id(&self) -> Uuid {
            Uuid::nil()
        }
    }

    fn factory(builder: CountingBuilder) -> SingleEndpointClientFactory<CountingBuilder> {
        SingleEndpointClientFactory::new(builder, "memory://documents", "secret").unwrap()
    }

    #[test]
    fn test_concurrent_first_requests_build_once() {
        let factory = factory(CountingBuilder::slow(Duration::from_millis(20)));
        let barrier = Barrier::new(16);

        let clients: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let factory = &factory;
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        factory
                            .get_client::<OrderState>(&format!("caller-{i}"))
                            .unwrap()
                    })
                })
                .collect();

            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(factory.builder().builds(), 1);
        assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
    }

    #[test]
    fn test_cached_client_reused_regardless_of_name() {
        let factory = factory(CountingBuilder::default());

        let first = factory.get_client::<OrderState>("orders").unwrap();
        let second = factory.get_client::<OrderState>("something-else").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.builder().builds(), 1);
    }

    #[test]
    fn test_types_get_independent_clients() {
        let factory = factory(CountingBuilder::default());

        let orders = factory.get_client::<OrderState>("orders").unwrap();
        let payments = factory.get_client::<PaymentState>("payments").unwrap();

        assert!(!Arc::ptr_eq(&orders, &payments));
        assert_eq!(factory.constructed_clients(), 2);

        factory.dispose();

        assert_eq!(orders.closes(), 1);
        assert_eq!(payments.closes(), 1);
    }

    #[test]
    fn test_serializer_remaps_only_when_needed() {
        let factory = factory(CountingBuilder::default());

        let orders = factory.get_client::<OrderState>("orders").unwrap();
        let payments = factory.get_client::<PaymentState>("payments").unwrap();

        assert_eq!(
            orders.options.serializer.rename(),
            Some(&FieldRename::new("correlationId", "id"))
        );
        assert!(payments.options.serializer.is_pass_through());
    }

    #[test]
    fn test_options_carry_config() {
        let config = FactoryConfig::new("memory://documents", "secret")
            .with_application_name("orders-service")
            .with_request_timeout(Duration::from_secs(5));
        let factory =
            SingleEndpointClientFactory::from_config(CountingBuilder::default(), config).unwrap();

        let client = factory.get_client::<PaymentState>("payments").unwrap();

        assert_eq!(
            client.options.application_name.as_deref(),
            Some("orders-service")
        );
        assert_eq!(client.options.request_timeout, Duration::from_secs(5));
    }

    #[test]
    #[traced_test]
    fn test_failed_build_not_cached() {
        let factory = factory(CountingBuilder::failing(1));

        let err = factory.get_client::<OrderState>("orders").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstructionFailure);
        assert_eq!(factory.constructed_clients(), 0);

        let client = factory.get_client::<OrderState>("orders");
        assert!(client.is_ok());
        assert_eq!(factory.builder().builds(), 2);
        assert!(logs_contain("storage client unavailable"));
    }

    #[test]
    fn test_dispose_closes_only_built_clients() {
        let factory = factory(CountingBuilder::default());

        let orders = factory.get_client::<OrderState>("orders").unwrap();
        factory.dispose();
        factory.dispose();

        assert_eq!(orders.closes(), 1);
        assert_eq!(factory.builder().builds(), 1);
        assert_eq!(factory.constructed_clients(), 0);
        assert!(factory.is_disposed());
    }

    #[test]
    fn test_dispose_skips_cells_never_built() {
        let factory = factory(CountingBuilder::failing(1));

        assert!(factory.get_client::<OrderState>("orders").is_err());
        factory.dispose();

        assert_eq!(factory.builder().builds(), 1);
        assert!(factory.builder().issued_closes().is_empty());
        assert_eq!(factory.constructed_clients(), 0);
    }

    #[test]
    fn test_client_built_during_dispose_is_closed() {
        let factory = factory(CountingBuilder::gated());

        let result = thread::scope(|scope| {
            let caller = scope.spawn(|| factory.get_client::<OrderState>("orders"));

            let gate = factory.builder().gate.as_ref().unwrap();
            gate.entered.wait();
            factory.dispose();
            gate.release.wait();

            caller.join().unwrap()
        });

        assert_matches!(result, Err(Error::Disposed));
        assert_eq!(factory.builder().builds(), 1);
        assert_eq!(factory.builder().issued_closes(), vec![1]);
    }

    #[test]
    fn test_get_client_after_dispose() {
        let factory = factory(CountingBuilder::default());
        factory.dispose();

        let err = factory.get_client::<OrderState>("orders").unwrap_err();

        assert_matches!(err, Error::Disposed);
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(factory.builder().builds(), 0);
    }

    #[test]
    fn test_drop_disposes() {
        let factory = factory(CountingBuilder::default());
        let orders = factory.get_client::<OrderState>("orders").unwrap();

        drop(factory);

        assert_eq!(orders.closes(), 1);
    }

    #[test]
    fn test_blank_correlation_field_rejected_before_build() {
        let factory = factory(CountingBuilder::default());

        for _ in 0..2 {
            let err = factory.get_client::<UnlocatableState>("broken").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
        }

        assert_eq!(factory.builder().builds(), 0);
        assert_eq!(factory.constructed_clients(), 0);
    }

    #[test]
    fn test_blank_connection_parameters_rejected() {
        for (endpoint, key) in [("", "secret"), (" ", "secret"), ("memory://documents", "\t")] {
            let err = SingleEndpointClientFactory::new(CountingBuilder::default(), endpoint, key)
                .unwrap_err();
            assert_matches!(err, Error::InvalidConfiguration(_));
        }
    }
}
