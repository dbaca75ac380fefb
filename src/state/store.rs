//! Product store: owns the product state and runs its async operations

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::api::{ProductDataSource, SourceResult};
use crate::state::{ProductAction, ProductState, StateEvent, Thunk};
use crate::task::{spawn_call, CallId, CallPhase, Outcome, Settlement};

type CallResult = SourceResult<ProductAction>;

/// How many settled outcomes `call_phase` can still report
const SETTLED_HISTORY: usize = 256;

/// State container for the product slice.
///
/// Async operations apply their pending action immediately and run the data
/// source call in a spawned task. The terminal action is applied when the
/// caller drives the store with [`ProductStore::poll`] (frame loops) or
/// [`ProductStore::settle_next`] / [`ProductStore::settle_all`] (async callers).
/// Terminal actions are applied in the order calls settle.
pub struct ProductStore {
    state: ProductState,
    source: Arc<dyn ProductDataSource>,
    next_call: CallId,
    /// Calls whose terminal action has not been applied yet
    in_flight: BTreeMap<CallId, Thunk>,
    /// Most recent outcomes, oldest first
    settled: VecDeque<(CallId, Outcome)>,
    settle_tx: mpsc::UnboundedSender<Settlement<CallResult>>,
    settle_rx: mpsc::UnboundedReceiver<Settlement<CallResult>>,
}

impl ProductStore {
    /// Create a store with the initial (empty, idle) state
    pub fn new(source: Arc<dyn ProductDataSource>) -> Self {
        let (settle_tx, settle_rx) = mpsc::unbounded_channel();
        Self {
            state: ProductState::default(),
            source,
            next_call: CallId::default(),
            in_flight: BTreeMap::new(),
            settled: VecDeque::new(),
            settle_tx,
            settle_rx,
        }
    }

    pub fn state(&self) -> &ProductState {
        &self.state
    }

    /// Number of calls still waiting for their terminal action
    pub fn pending_calls(&self) -> usize {
        self.in_flight.len()
    }

    pub fn call_phase(&self, call: CallId) -> CallPhase {
        if self.in_flight.contains_key(&call) {
            CallPhase::Pending
        } else if let Some((_, outcome)) = self.settled.iter().find(|(id, _)| *id == call) {
            CallPhase::Settled(*outcome)
        } else if call < self.next_call {
            CallPhase::Expired
        } else {
            CallPhase::NotStarted
        }
    }

    /// Apply an action to the state
    pub fn dispatch(&mut self, action: ProductAction) {
        tracing::debug!(action = action.type_name(), "Dispatch");
        self.state.apply(action);
    }

    /// Fetch a single product into `product`
    pub fn fetch_product_by_id(&mut self, id: i64) -> CallId {
        let source = Arc::clone(&self.source);
        self.start(Thunk::FetchProduct, async move {
            source
                .get_by_id(id)
                .await
                .map(ProductAction::FetchProductFulfilled)
        })
    }

    /// Fetch the full product list into `products`
    pub fn fetch_all_products(&mut self) -> CallId {
        let source = Arc::clone(&self.source);
        self.start(Thunk::FetchProducts, async move {
            source
                .get_all()
                .await
                .map(ProductAction::FetchProductsFulfilled)
        })
    }

    /// Search products and store the matches in `products`
    pub fn search_products(&mut self, query: impl Into<String>) -> CallId {
        let source = Arc::clone(&self.source);
        let query = query.into();
        self.start(Thunk::SearchProducts, async move {
            source
                .search(&query)
                .await
                .map(ProductAction::SearchProductsFulfilled)
        })
    }

    /// Clear the current product
    pub fn remove_current_product(&mut self) {
        self.dispatch(ProductAction::RemoveCurrentProduct);
    }

    fn start<F>(&mut self, thunk: Thunk, call: F) -> CallId
    where
        F: Future<Output = CallResult> + Send + 'static,
    {
        let id = self.next_call.advance();
        self.dispatch(thunk.pending());
        self.in_flight.insert(id, thunk);
        spawn_call(id, self.settle_tx.clone(), call);
        tracing::debug!(call = %id, "{} started", thunk);
        id
    }

    /// Apply every settlement that has already arrived, without waiting
    pub fn poll(&mut self) -> Vec<StateEvent> {
        let mut events = Vec::new();
        while let Ok(settlement) = self.settle_rx.try_recv() {
            events.extend(self.apply_settlement(settlement));
        }
        events
    }

    /// Wait for the next call to settle and apply it.
    /// Returns `None` when nothing is pending.
    pub async fn settle_next(&mut self) -> Option<StateEvent> {
        while !self.in_flight.is_empty() {
            let settlement = self.settle_rx.recv().await?;
            if let Some(event) = self.apply_settlement(settlement) {
                return Some(event);
            }
        }
        None
    }

    /// Wait until every pending call has settled
    pub async fn settle_all(&mut self) -> Vec<StateEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.settle_next().await {
            events.push(event);
        }
        events
    }

    fn apply_settlement(&mut self, settlement: Settlement<CallResult>) -> Option<StateEvent> {
        let Settlement { call, result } = settlement;
        let Some(thunk) = self.in_flight.remove(&call) else {
            tracing::warn!(call = %call, "Ignoring settlement for unknown call");
            return None;
        };

        let event = match result {
            Ok(action) => {
                self.dispatch(action);
                self.record(call, Outcome::Fulfilled);
                StateEvent::Fulfilled { call, thunk }
            }
            Err(e) => {
                tracing::warn!(call = %call, "{} failed: {}", thunk, e);
                self.dispatch(thunk.rejected());
                self.record(call, Outcome::Rejected);
                StateEvent::Rejected {
                    call,
                    thunk,
                    error: e.to_string(),
                }
            }
        };

        Some(event)
    }

    fn record(&mut self, call: CallId, outcome: Outcome) {
        if self.settled.len() == SETTLED_HISTORY {
            self.settled.pop_front();
        }
        self.settled.push_back((call, outcome));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{parse_product_list, Product, SourceError};
    use crate::state::{select_product, select_products, select_status, Status};
    use futures::future::BoxFuture;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    type Reply = SourceResult<Value>;

    /// Data source whose calls wait until the test answers them.
    /// Calls are keyed as `id:<n>`, `all` or `search:<query>`.
    #[derive(Default)]
    struct GatedSource {
        gates: Mutex<HashMap<String, oneshot::Receiver<Reply>>>,
    }

    impl GatedSource {
        fn gate(&self, key: &str) -> oneshot::Sender<Reply> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().insert(key.to_string(), rx);
            tx
        }

        async fn wait(&self, key: String) -> Reply {
            let gate = self.gates.lock().unwrap().remove(&key);
            match gate {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(SourceError::Decode(format!("{} abandoned", key)))),
                None => Err(SourceError::Decode(format!("no gate for {}", key))),
            }
        }
    }

    impl ProductDataSource for GatedSource {
        fn get_by_id(&self, id: i64) -> BoxFuture<'_, SourceResult<Product>> {
            Box::pin(async move { self.wait(format!("id:{}", id)).await.map(Product::from) })
        }

        fn get_all(&self) -> BoxFuture<'_, SourceResult<Vec<Product>>> {
            Box::pin(async move { self.wait("all".to_string()).await.and_then(parse_product_list) })
        }

        fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, SourceResult<Vec<Product>>> {
            Box::pin(async move {
                self.wait(format!("search:{}", query))
                    .await
                    .and_then(parse_product_list)
            })
        }
    }

    struct PanickingSource;

    fn explode<T>(what: String) -> SourceResult<T> {
        panic!("source exploded for {}", what)
    }

    impl ProductDataSource for PanickingSource {
        fn get_by_id(&self, id: i64) -> BoxFuture<'_, SourceResult<Product>> {
            Box::pin(async move { explode::<Product>(format!("id {}", id)) })
        }

        fn get_all(&self) -> BoxFuture<'_, SourceResult<Vec<Product>>> {
            Box::pin(async { explode::<Vec<Product>>("all".to_string()) })
        }

        fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, SourceResult<Vec<Product>>> {
            Box::pin(async move { explode::<Vec<Product>>(format!("search {}", query)) })
        }
    }

    fn rejected() -> Reply {
        Err(SourceError::Status {
            status: 500,
            body: "internal error".to_string(),
        })
    }

    fn gated_store() -> (Arc<GatedSource>, ProductStore) {
        let source = Arc::new(GatedSource::default());
        let store = ProductStore::new(source.clone());
        (source, store)
    }

    #[tokio::test]
    async fn test_initial_state() {
        let (_source, mut store) = gated_store();
        assert_eq!(store.state(), &ProductState::default());
        assert_eq!(store.pending_calls(), 0);
        assert!(store.poll().is_empty());
        assert!(store.settle_next().await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_product_by_id() {
        let (source, mut store) = gated_store();
        let gate = source.gate("id:7");

        let call = store.fetch_product_by_id(7);
        assert_eq!(select_status(store.state()), Status::Loading);
        assert_eq!(store.call_phase(call), CallPhase::Pending);

        gate.send(Ok(json!({"id": 7, "name": "X"}))).unwrap();
        let event = store.settle_next().await.unwrap();

        assert!(matches!(event, StateEvent::Fulfilled { thunk: Thunk::FetchProduct, .. }));
        assert_eq!(
            select_product(store.state()),
            Some(&Product::from(json!({"id": 7, "name": "X"})))
        );
        assert_eq!(select_status(store.state()), Status::Idle);
        assert_eq!(store.call_phase(call), CallPhase::Settled(Outcome::Fulfilled));
    }

    #[tokio::test]
    async fn test_fetch_all_products() {
        let (source, mut store) = gated_store();
        source.gate("all").send(Ok(json!([{"id": 1}, {"id": 2}]))).unwrap();

        store.fetch_all_products();
        let events = store.settle_all().await;

        assert_eq!(events.len(), 1);
        assert_eq!(
            select_products(store.state()),
            &[Product::from(json!({"id": 1})), Product::from(json!({"id": 2}))]
        );
        assert_eq!(select_status(store.state()), Status::Idle);
    }

    #[tokio::test]
    async fn test_search_rejected_keeps_products() {
        let (source, mut store) = gated_store();
        source.gate("all").send(Ok(json!([{"id": 1}]))).unwrap();
        store.fetch_all_products();
        store.settle_all().await;

        source.gate("search:shoe").send(rejected()).unwrap();
        let call = store.search_products("shoe");
        let event = store.settle_next().await.unwrap();

        match event {
            StateEvent::Rejected { thunk, error, .. } => {
                assert_eq!(thunk, Thunk::SearchProducts);
                assert!(error.contains("500"));
            }
            other => panic!("Unexpected event: {:?}", other),
        }
        assert_eq!(select_status(store.state()), Status::Failed);
        assert_eq!(select_products(store.state()), &[Product::from(json!({"id": 1}))]);
        assert_eq!(store.call_phase(call), CallPhase::Settled(Outcome::Rejected));
    }

    #[tokio::test]
    async fn test_search_envelope_response() {
        let (source, mut store) = gated_store();
        source
            .gate("search:phone")
            .send(Ok(json!({"products": [{"id": 4, "title": "Phone"}], "total": 1})))
            .unwrap();

        store.search_products("phone");
        store.settle_all().await;

        assert_eq!(select_products(store.state()).len(), 1);
        assert_eq!(select_products(store.state())[0].display_name(), Some("Phone"));
    }

    #[tokio::test]
    async fn test_remove_current_product() {
        let (source, mut store) = gated_store();
        source.gate("id:3").send(Ok(json!({"id": 3}))).unwrap();
        source.gate("all").send(Ok(json!([{"id": 3}]))).unwrap();
        store.fetch_product_by_id(3);
        store.fetch_all_products();
        store.settle_all().await;

        let before = store.state().clone();
        store.remove_current_product();

        assert_eq!(select_product(store.state()), None);
        assert_eq!(store.state().products, before.products);
        assert_eq!(store.state().status, before.status);
    }

    #[tokio::test]
    async fn test_last_settled_call_wins() {
        let (source, mut store) = gated_store();
        let fetch_gate = source.gate("id:1");
        let search_gate = source.gate("search:hat");

        let fetch = store.fetch_product_by_id(1);
        let search = store.search_products("hat");
        assert_eq!(store.pending_calls(), 2);

        // The later call settles first
        search_gate.send(rejected()).unwrap();
        store.settle_next().await.unwrap();
        assert_eq!(select_status(store.state()), Status::Failed);
        assert_eq!(store.call_phase(fetch), CallPhase::Pending);

        // The earlier call settles last and decides the final status
        fetch_gate.send(Ok(json!({"id": 1}))).unwrap();
        store.settle_next().await.unwrap();
        assert_eq!(select_status(store.state()), Status::Idle);
        assert_eq!(select_product(store.state()), Some(&Product::from(json!({"id": 1}))));
        assert_eq!(store.call_phase(search), CallPhase::Settled(Outcome::Rejected));
        assert_eq!(store.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_earlier_call_failing_last_leaves_failed() {
        let (source, mut store) = gated_store();
        let first = source.gate("all");
        let second = source.gate("search:cap");

        store.fetch_all_products();
        store.search_products("cap");

        second.send(Ok(json!([{"id": 5}]))).unwrap();
        store.settle_next().await.unwrap();
        assert_eq!(select_status(store.state()), Status::Idle);

        first.send(rejected()).unwrap();
        store.settle_next().await.unwrap();
        assert_eq!(select_status(store.state()), Status::Failed);
        assert_eq!(select_products(store.state()), &[Product::from(json!({"id": 5}))]);
    }

    #[tokio::test]
    async fn test_status_not_loading_after_any_terminal() {
        let (source, mut store) = gated_store();
        let a = source.gate("id:1");
        let _b = source.gate("id:2");

        store.fetch_product_by_id(1);
        store.fetch_product_by_id(2);
        a.send(Ok(json!({"id": 1}))).unwrap();
        store.settle_next().await.unwrap();

        // One call is still pending, but a terminal signal was applied last
        assert_eq!(store.pending_calls(), 1);
        assert_eq!(select_status(store.state()), Status::Idle);

        // A new pending signal flips it back
        let _c = source.gate("all");
        store.fetch_all_products();
        assert_eq!(select_status(store.state()), Status::Loading);
    }

    #[tokio::test]
    async fn test_poll_applies_arrived_settlements() {
        let (source, mut store) = gated_store();
        let gate = source.gate("id:2");
        store.fetch_product_by_id(2);
        assert!(store.poll().is_empty());

        gate.send(Ok(json!({"id": 2}))).unwrap();
        let events = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let events = store.poll();
                if !events.is_empty() {
                    return events;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(select_status(store.state()), Status::Idle);
    }

    #[tokio::test]
    async fn test_panicking_source_is_rejected() {
        let mut store = ProductStore::new(Arc::new(PanickingSource));
        let call = store.fetch_all_products();

        let event = store.settle_next().await.unwrap();
        assert!(matches!(event, StateEvent::Rejected { .. }));
        assert_eq!(select_status(store.state()), Status::Failed);
        assert_eq!(store.call_phase(call), CallPhase::Settled(Outcome::Rejected));
    }

    #[tokio::test]
    async fn test_unknown_call_is_not_started() {
        let (_source, store) = gated_store();
        let mut ids = CallId::default();
        assert_eq!(store.call_phase(ids.advance()), CallPhase::NotStarted);
    }

    #[tokio::test]
    async fn test_settled_history_is_bounded() {
        // No gates: every call is rejected straight away
        let (_source, mut store) = gated_store();
        let first = store.fetch_all_products();
        store.settle_all().await;
        assert_eq!(store.call_phase(first), CallPhase::Settled(Outcome::Rejected));

        let mut last = first;
        for _ in 0..SETTLED_HISTORY {
            last = store.fetch_all_products();
            store.settle_all().await;
        }

        assert_eq!(store.settled.len(), SETTLED_HISTORY);
        assert_eq!(store.call_phase(first), CallPhase::Expired);
        assert_eq!(store.call_phase(last), CallPhase::Settled(Outcome::Rejected));
    }
}
