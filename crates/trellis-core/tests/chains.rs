use mockall::mock;
use mockall::predicate::{always, eq};
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use trellis_core::cache::{CacheService, EXPORT_CACHE};
use trellis_core::comparison::PropertyComparator;
use trellis_core::domain::schema::{ElementDefinition, PropertyDefinition, SchemaDefinition};
use trellis_core::operation::handler::OperationHandler;
use trellis_core::operation::impls::{
    Count, DiscardOutput, ExportToCache, GetExport, Limit, Max, Sort, ToEntitySeeds,
};
use trellis_core::operation::{DataType, KnownOperation, OperationKind};
use trellis_core::{
    ChainExecution, ChainExecutor, ChainStatus, Context, CoreError, Data, Element, ElementStream,
    Entity, HandlerRegistry, OperationChain, ReleaseHandle, Schema, Store, Value, ValueType,
};

mock! {
    pub Cache {}

    impl CacheService for Cache {
        fn get(&self, cache: &str, key: &str) -> Result<Option<JsonValue>, CoreError>;
        fn put(&self, cache: &str, key: &str, value: JsonValue) -> Result<(), CoreError>;
        fn put_if_absent(&self, cache: &str, key: &str, value: JsonValue) -> Result<(), CoreError>;
        fn remove(&self, cache: &str, key: &str) -> Result<Option<JsonValue>, CoreError>;
        fn clear(&self, cache: &str) -> Result<(), CoreError>;
        fn keys(&self, cache: &str) -> Result<BTreeSet<String>, CoreError>;
        fn values(&self, cache: &str) -> Result<Vec<JsonValue>, CoreError>;
    }
}

/// Produces one element and records that it ran
#[derive(Debug, Default)]
struct Produce;

impl KnownOperation for Produce {
    const KIND: OperationKind = OperationKind("Produce");
    const INPUT: DataType = DataType::Null;
    const OUTPUT: DataType = DataType::Element;
}

struct ProduceHandler {
    ran: Arc<AtomicBool>,
}

impl OperationHandler<Produce> for ProduceHandler {
    fn handle(
        &self,
        _operation: &Produce,
        _input: Data,
        _context: &mut Context,
        _store: &dyn Store,
    ) -> Result<Data, CoreError> {
        self.ran.store(true, Ordering::SeqCst);
        Ok(Data::Element(Element::from(Entity::new("Person", "a"))))
    }
}

/// Requires string input
#[derive(Debug, Default)]
struct NeedsStrings;

impl KnownOperation for NeedsStrings {
    const KIND: OperationKind = OperationKind("NeedsStrings");
    const INPUT: DataType = DataType::Strings;
    const OUTPUT: DataType = DataType::Null;
}

/// Emits a closeable stream whose release is recorded
#[derive(Debug)]
struct Stream {
    name: &'static str,
}

impl KnownOperation for Stream {
    const KIND: OperationKind = OperationKind("Stream");
    const INPUT: DataType = DataType::Any;
    const OUTPUT: DataType = DataType::Elements;
}

struct StreamHandler {
    released: Arc<Mutex<Vec<&'static str>>>,
    kept: Arc<Mutex<Vec<Data>>>,
}

impl OperationHandler<Stream> for StreamHandler {
    fn handle(
        &self,
        operation: &Stream,
        input: Data,
        _context: &mut Context,
        _store: &dyn Store,
    ) -> Result<Data, CoreError> {
        // keep upstream alive so only the engine can release it
        self.kept.lock().unwrap().push(input);
        let released = Arc::clone(&self.released);
        let name = operation.name;
        let handle = ReleaseHandle::new(move || released.lock().unwrap().push(name));
        let elements = vec![
            Element::from(Entity::new("Person", "a").with_property("age", 30)),
            Element::from(Entity::new("Person", "b").with_property("age", 40)),
        ];
        Ok(Data::Elements(ElementStream::new(elements.into_iter(), handle)))
    }
}

/// Always fails, holding on to its input
#[derive(Debug, Default)]
struct Explode;

impl KnownOperation for Explode {
    const KIND: OperationKind = OperationKind("Explode");
    const INPUT: DataType = DataType::Elements;
    const OUTPUT: DataType = DataType::Elements;
}

struct ExplodeHandler {
    kept: Arc<Mutex<Vec<Data>>>,
}

impl OperationHandler<Explode> for ExplodeHandler {
    fn handle(
        &self,
        _operation: &Explode,
        input: Data,
        _context: &mut Context,
        _store: &dyn Store,
    ) -> Result<Data, CoreError> {
        self.kept.lock().unwrap().push(input);
        Err(CoreError::operation_caused_by(
            "backend unavailable",
            CoreError::Io("connection reset".to_string()),
        ))
    }
}

struct TestStore {
    schema: Schema,
    handlers: HandlerRegistry,
    ran: Arc<AtomicBool>,
    released: Arc<Mutex<Vec<&'static str>>>,
    kept: Arc<Mutex<Vec<Data>>>,
}

impl Store for TestStore {
    fn graph_id(&self) -> &str {
        "test-graph"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }
}

fn store() -> TestStore {
    let schema = Schema::from_definition(SchemaDefinition::default().entity(
        "Person",
        ElementDefinition::default()
            .property("age", PropertyDefinition::new(ValueType::Long))
            .property("photo", PropertyDefinition::new(ValueType::Sketch)),
    ))
    .unwrap();
    let ran = Arc::new(AtomicBool::new(false));
    let released = Arc::new(Mutex::new(Vec::new()));
    let kept = Arc::new(Mutex::new(Vec::new()));
    let mut handlers = HandlerRegistry::with_core_handlers();
    handlers.register::<Produce, _>(ProduceHandler { ran: Arc::clone(&ran) });
    handlers.register::<Stream, _>(StreamHandler {
        released: Arc::clone(&released),
        kept: Arc::clone(&kept),
    });
    handlers.register::<Explode, _>(ExplodeHandler { kept: Arc::clone(&kept) });
    TestStore {
        schema,
        handlers,
        ran,
        released,
        kept,
    }
}

#[test]
fn mistyped_chain_fails_before_anything_runs() {
    let store = store();
    let chain = OperationChain::first(Produce).then(NeedsStrings);
    let err = store.execute(chain, &mut Context::default()).unwrap_err();
    assert_eq!(
        err,
        CoreError::ChainType {
            index: 1,
            producer: "Produce".to_string(),
            output: "Element".to_string(),
            consumer: "NeedsStrings".to_string(),
            input: "Strings".to_string(),
        }
    );
    assert!(err.is_structural());
    assert!(!store.ran.load(Ordering::SeqCst));
}

#[test]
fn unknown_operation_names_the_store() {
    let store = store();
    let chain = OperationChain::first(Produce).then(Count).then(DiscardOutput);
    assert!(store.execute(chain, &mut Context::default()).is_ok());

    let err = store
        .execute(OperationChain::first(NeedsStrings), &mut Context::default())
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Operation NeedsStrings is not supported by store test-graph"
    );
}

#[test]
fn schema_checks_reject_unorderable_sort_before_running() {
    let store = store();
    let chain = OperationChain::first(Produce)
        .then(Sort::by(Arc::new(PropertyComparator::new("Person", "photo"))));
    let err = store.execute(chain, &mut Context::default()).unwrap_err();
    assert!(matches!(err, CoreError::InvalidChain(ref problems) if problems.len() == 1));
    assert!(!store.ran.load(Ordering::SeqCst));
}

#[test]
fn empty_chain_is_invalid() {
    let err = store()
        .execute(OperationChain::new(), &mut Context::default())
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid operation chain: operation chain is empty");
}

#[test]
fn failure_releases_earlier_results_in_reverse_order() {
    let store = store();
    let chain = OperationChain::first(Stream { name: "first" })
        .then(Stream { name: "second" })
        .then(Explode);
    let mut execution = ChainExecution::new("job");
    let err = ChainExecutor::new(&store)
        .execute_recorded(chain, &mut Context::default(), &mut execution)
        .unwrap_err();

    assert_eq!(err.to_string(), "Operation error: backend unavailable");
    assert_eq!(*store.released.lock().unwrap(), vec!["second", "first"]);
    assert_eq!(execution.status, ChainStatus::Failed);
    assert_eq!(execution.error, Some(err));

    // dropping what the handlers kept must not release a second time
    store.kept.lock().unwrap().clear();
    assert_eq!(store.released.lock().unwrap().len(), 2);
}

#[test]
fn successful_chain_returns_an_open_stream() {
    let store = store();
    let mut execution = ChainExecution::new("job");
    let result = ChainExecutor::new(&store)
        .execute_recorded(
            OperationChain::first(Stream { name: "only" }).then(Limit::new(1)),
            &mut Context::default(),
            &mut execution,
        )
        .unwrap();
    assert!(store.released.lock().unwrap().is_empty());
    assert_eq!(execution.status, ChainStatus::Completed);

    let elements: Vec<_> = result.into_elements().unwrap().unwrap().collect();
    assert_eq!(elements.len(), 1);
    assert_eq!(*store.released.lock().unwrap(), vec!["only"]);
}

#[test]
fn configured_input_replaces_upstream_output() {
    let store = store();
    let chain = OperationChain::first(Stream { name: "ignored" }).then(Max {
        elements: Some(vec![
            Element::from(Entity::new("Person", "x").with_property("age", 1)),
            Element::from(Entity::new("Person", "y").with_property("age", 3)),
        ]),
        comparator: Some(Arc::new(PropertyComparator::new("Person", "age"))),
    });
    match store.execute(chain, &mut Context::default()).unwrap() {
        Data::Element(element) => assert_eq!(element.property("age"), Some(&Value::Long(3))),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(*store.released.lock().unwrap(), vec!["ignored"]);
}

#[test]
fn max_over_empty_input_fails_the_chain() {
    let store = store();
    let chain = OperationChain::first(Max {
        elements: Some(Vec::new()),
        comparator: Some(Arc::new(PropertyComparator::new("Person", "age"))),
    });
    let err = store.execute(chain, &mut Context::default()).unwrap_err();
    assert!(matches!(err, CoreError::EmptyInput(_)));
}

#[test]
fn export_is_written_to_the_cache_service() {
    let mut cache = MockCache::new();
    cache
        .expect_get()
        .with(eq(EXPORT_CACHE), eq("job-9:ALL"))
        .times(1)
        .returning(|_, _| Ok(None));
    cache
        .expect_put()
        .with(eq(EXPORT_CACHE), eq("job-9:ALL"), always())
        .times(1)
        .returning(|_, _, _| Ok(()));

    let mut context = Context::default()
        .with_job_id("job-9")
        .with_cache_service(Arc::new(cache));
    let chain = OperationChain::first(ToEntitySeeds {
        vertices: Some(vec![Value::from("a"), Value::from("b")]),
    })
    .then(ExportToCache::default())
    .then(GetExport::default());
    match store().execute(chain, &mut context).unwrap() {
        Data::Json(items) => assert_eq!(items.len(), 2),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn cache_failures_surface_as_errors() {
    let mut cache = MockCache::new();
    cache
        .expect_get()
        .returning(|_, _| Err(CoreError::Cache("cluster unreachable".to_string())));
    let mut context = Context::default().with_cache_service(Arc::new(cache));
    let chain = OperationChain::first(GetExport::new("names").from_job("old-job"));
    let err = store().execute(chain, &mut context).unwrap_err();
    assert_eq!(err.to_string(), "Cache error: cluster unreachable");
}

#[test]
fn exports_of_an_earlier_job_are_read_through_the_cache() {
    let mut cache = MockCache::new();
    cache
        .expect_get()
        .with(eq(EXPORT_CACHE), eq("old-job:names"))
        .returning(|_, _| Ok(Some(json!(["x", "y"]))));
    let mut context = Context::default().with_cache_service(Arc::new(cache));
    let chain = OperationChain::first(GetExport::new("names").from_job("old-job")).then(Count);
    assert!(matches!(
        store().execute(chain, &mut context).unwrap(),
        Data::Count(2)
    ));
}

#[test]
fn sort_with_limit_through_a_chain() {
    let store = store();
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let stream = ElementStream::new(
        vec![
            Element::from(Entity::new("Person", "a").with_property("age", 50)),
            Element::from(Entity::new("Person", "b")),
            Element::from(Entity::new("Person", "c").with_property("age", 20)),
            Element::from(Entity::new("Person", "d").with_property("age", 35)),
        ]
        .into_iter(),
        ReleaseHandle::new(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let chain = OperationChain::first(Sort {
        elements: Some(stream.collect()),
        comparator: Some(Arc::new(PropertyComparator::new("Person", "age"))),
        result_limit: Some(2),
    });
    let sorted = store
        .execute(chain, &mut Context::default())
        .unwrap()
        .into_elements()
        .unwrap()
        .unwrap();
    let ages: Vec<_> = Iterator::map(sorted, |e| e.property("age").cloned()).collect();
    assert_eq!(ages, vec![Some(Value::Long(20)), Some(Value::Long(35))]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
