use std::sync::{Arc, Mutex};

use asupersync::runtime::RuntimeBuilder;
use serde::{Deserialize, Serialize};

use sqlwork::prelude::*;
use sqlwork::{
    CorrelationRow, Dialect, Parameter, QueryError, QueryErrorKind, Row, ScopeErrorKind,
    TrackingState,
};

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Customer {
    customer_id: Option<i64>,
    name: String,
    orders: Vec<Order>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    order_id: Option<i64>,
    customer_id: Option<i64>,
    number: String,
}

static CUSTOMER_PROPERTIES: [PropertyInfo; 3] = [
    PropertyInfo::new("customer_id", SqlType::BigInt)
        .column("CustomerId")
        .primary_key(true)
        .auto_generated(true),
    PropertyInfo::new("name", SqlType::VarChar(100)).column("Name"),
    PropertyInfo::entity_list("orders"),
];

static ORDER_PROPERTIES: [PropertyInfo; 3] = [
    PropertyInfo::new("order_id", SqlType::BigInt)
        .column("OrderId")
        .primary_key(true)
        .auto_generated(true),
    PropertyInfo::new("customer_id", SqlType::BigInt).column("CustomerId"),
    PropertyInfo::new("number", SqlType::VarChar(20)).column("Number"),
];

impl ContentIdentity for Customer {
    fn content_hash(&self) -> String {
        primary_key_hash(self)
    }
}

impl Entity for Customer {
    fn table_name(&self) -> &'static str {
        "customers"
    }

    fn properties(&self) -> &'static [PropertyInfo] {
        &CUSTOMER_PROPERTIES
    }

    fn property(&self, name: &str) -> Option<Property<'_>> {
        match name {
            "customer_id" => Some(Property::Scalar(self.customer_id.into())),
            "name" => Some(Property::Scalar(self.name.as_str().into())),
            "orders" => Some(Property::List(
                self.orders.iter().map(|o| o as &dyn Entity).collect(),
            )),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> bool {
        match name {
            "customer_id" => assign(&mut self.customer_id, value),
            "name" => assign(&mut self.name, value),
            _ => false,
        }
    }

    fn nested_mut(&mut self, name: &str) -> Vec<&mut dyn Entity> {
        match name {
            "orders" => self
                .orders
                .iter_mut()
                .map(|o| o as &mut dyn Entity)
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl ContentIdentity for Order {
    fn content_hash(&self) -> String {
        format!("orders:{}", self.number)
    }
}

impl Entity for Order {
    fn table_name(&self) -> &'static str {
        "orders"
    }

    fn properties(&self) -> &'static [PropertyInfo] {
        &ORDER_PROPERTIES
    }

    fn property(&self, name: &str) -> Option<Property<'_>> {
        match name {
            "order_id" => Some(Property::Scalar(self.order_id.into())),
            "customer_id" => Some(Property::Scalar(self.customer_id.into())),
            "number" => Some(Property::Scalar(self.number.as_str().into())),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> bool {
        match name {
            "order_id" => assign(&mut self.order_id, value),
            "customer_id" => assign(&mut self.customer_id, value),
            "number" => assign(&mut self.number, value),
            _ => false,
        }
    }
}

fn unsaved_customer() -> Customer {
    Customer {
        customer_id: None,
        name: "Acme".to_string(),
        orders: vec![Order {
            order_id: None,
            customer_id: None,
            number: "SO-1".to_string(),
        }],
    }
}

fn saved_customer() -> Customer {
    Customer {
        customer_id: Some(1),
        name: "Acme".to_string(),
        orders: vec![Order {
            order_id: Some(10),
            customer_id: Some(1),
            number: "SO-10".to_string(),
        }],
    }
}

fn correlation(statement_id: i32, id: i64, property: &str) -> Row {
    Row::new(
        CorrelationRow::COLUMNS
            .iter()
            .map(|c| (*c).to_string())
            .collect(),
        vec![
            Value::Int(statement_id),
            Value::BigInt(id),
            Value::Text(format!("{property}_{statement_id}")),
            Value::Text(property.to_string()),
        ],
    )
}

#[derive(Debug, Default)]
struct MockState {
    executed: Vec<(String, Vec<Parameter>)>,
    rows: Vec<Row>,
    fail_with: Option<String>,
}

#[derive(Debug, Clone)]
struct MockConnection {
    state: Arc<Mutex<MockState>>,
    dialect: Dialect,
}

impl MockConnection {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            dialect: Dialect::SqlServer,
        }
    }

    fn returning(rows: Vec<Row>) -> Self {
        let conn = Self::new();
        conn.state.lock().expect("lock poisoned").rows = rows;
        conn
    }

    fn failing(message: &str) -> Self {
        let conn = Self::new();
        conn.state.lock().expect("lock poisoned").fail_with = Some(message.to_string());
        conn
    }

    fn executed(&self) -> Vec<(String, Vec<Parameter>)> {
        self.state.lock().expect("lock poisoned").executed.clone()
    }
}

impl Connection for MockConnection {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Parameter],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let state = Arc::clone(&self.state);
        let sql = sql.to_string();
        let params = params.to_vec();
        async move {
            let mut guard = state.lock().expect("lock poisoned");
            guard.executed.push((sql.clone(), params));
            match &guard.fail_with {
                Some(message) => Outcome::Err(Error::Query(QueryError {
                    kind: QueryErrorKind::Constraint,
                    sql: Some(sql),
                    message: message.clone(),
                    source: None,
                })),
                None => Outcome::Ok(guard.rows.clone()),
            }
        }
    }
}

#[test]
fn commit_new_graph_assigns_generated_keys() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn =
        MockConnection::returning(vec![correlation(0, 7, "customer_id"), correlation(1, 70, "order_id")]);

    rt.block_on(async {
        let mut scope = ObjectScope::new();
        scope.begin(ScopeOptions::new());
        let mut customer = scope.track_new(unsaved_customer()).unwrap();

        let summary = unwrap_outcome(scope.commit(&cx, &conn, &mut customer).await);
        assert!(summary.executed);
        assert_eq!(summary.inserts, 2);
        assert_eq!(summary.generated, 2);
        assert_eq!(summary.cascaded, 1);

        assert_eq!(customer.customer_id, Some(7));
        assert_eq!(customer.orders[0].order_id, Some(70));
        assert_eq!(customer.orders[0].customer_id, Some(7));
        assert_eq!(scope.state_of(customer.key()), Some(TrackingState::Committed));
        assert!(scope.old(&customer).unwrap().is_none());

        let summary = scope.end().unwrap();
        assert_eq!(summary.committed, 1);
        assert_eq!(summary.discarded, 0);
    });

    let executed = conn.executed();
    assert_eq!(executed.len(), 1);
    let (sql, params) = &executed[0];
    assert!(sql.starts_with("CREATE TABLE [#__ID]"));
    assert!(sql.contains(
        "INSERT INTO [orders] ([CustomerId], [Number]) VALUES ((SELECT [GeneratedId] FROM [#__ID] WHERE [StatementId] = 0), @number_1)"
    ));
    assert!(sql.trim_end().ends_with("SELECT * FROM [#__ID];"));
    // Scratch variables for generated keys are declared in the batch, not bound.
    assert!(params.iter().all(|p| !p.is_auto_generated));
    assert_eq!(
        params.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        vec!["name_0", "number_1"]
    );
}

#[test]
fn commit_rename_sends_single_update() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = MockConnection::new();

    rt.block_on(async {
        let mut scope = ObjectScope::new();
        scope.begin(ScopeOptions::new());
        let mut customer = scope.track(saved_customer()).unwrap();
        customer.name = "Acme Inc".to_string();

        let summary = unwrap_outcome(scope.commit(&cx, &conn, &mut customer).await);
        assert_eq!(summary.updates, 1);
        assert_eq!(summary.inserts + summary.deletes, 0);
        assert_eq!(summary.generated, 0);
        scope.end().unwrap();
    });

    let executed = conn.executed();
    assert_eq!(
        executed[0].0,
        "UPDATE [customers] SET [Name] = @name_0 WHERE [CustomerId] = @customer_id_0;\n"
    );
    assert_eq!(executed[0].1[0].value, Value::Text("Acme Inc".to_string()));
    assert_eq!(executed[0].1[1].value, Value::BigInt(1));
}

#[test]
fn unchanged_entity_executes_nothing() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = MockConnection::new();

    rt.block_on(async {
        let mut scope = ObjectScope::new();
        scope.begin(ScopeOptions::new());
        let mut customer = scope.track(saved_customer()).unwrap();
        let summary = unwrap_outcome(scope.commit(&cx, &conn, &mut customer).await);
        assert!(!summary.executed);
        assert_eq!(scope.state_of(customer.key()), Some(TrackingState::Committed));
    });

    assert!(conn.executed().is_empty());
}

#[test]
fn debug_mode_renders_but_does_not_execute() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = MockConnection::new();

    rt.block_on(async {
        let mut scope = ObjectScope::new();
        scope.begin(
            ScopeOptions::new()
                .change_tracking(ChangeTrackingMode::Debug)
                .transactional(true),
        );
        let mut customer = scope.track_new(unsaved_customer()).unwrap();
        let summary = unwrap_outcome(scope.commit(&cx, &conn, &mut customer).await);

        assert_eq!(summary.mode, ChangeTrackingMode::Debug);
        assert!(!summary.executed);
        assert_eq!(summary.inserts, 2);
        assert_eq!(customer.customer_id, None);
        assert!(scope.transaction().unwrap().is_completed());
    });

    assert!(conn.executed().is_empty());
}

#[test]
fn manual_mode_skips_detection() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = MockConnection::new();

    rt.block_on(async {
        let mut scope = ObjectScope::new();
        scope.begin(ScopeOptions::new().change_tracking(ChangeTrackingMode::Manual));
        let mut customer = scope.track(saved_customer()).unwrap();
        customer.name = "Ignored".to_string();

        let summary = unwrap_outcome(scope.commit(&cx, &conn, &mut customer).await);
        assert_eq!(summary.mode, ChangeTrackingMode::Manual);
        assert_eq!(summary.inserts + summary.updates + summary.deletes, 0);
        assert_eq!(scope.state_of(customer.key()), Some(TrackingState::Committed));
    });

    assert!(conn.executed().is_empty());
}

#[test]
fn commit_without_scope_is_rejected() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = MockConnection::new();

    rt.block_on(async {
        let mut scope = ObjectScope::new();
        scope.begin(ScopeOptions::new());
        let mut customer = scope.track(saved_customer()).unwrap();
        scope.end().unwrap();

        match scope.commit(&cx, &conn, &mut customer).await {
            Outcome::Err(e) => {
                assert_eq!(e.scope_kind(), Some(ScopeErrorKind::NoActiveScope));
            }
            other => panic!("expected scope error, got {other:?}"),
        }

        // A fresh scope has no snapshot for it.
        scope.begin(ScopeOptions::new());
        match scope.commit(&cx, &conn, &mut customer).await {
            Outcome::Err(e) => assert_eq!(e.scope_kind(), Some(ScopeErrorKind::NotTracked)),
            other => panic!("expected scope error, got {other:?}"),
        }
    });

    assert!(conn.executed().is_empty());
}

#[test]
fn failed_batch_keeps_snapshot_and_vote_open() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = MockConnection::failing("duplicate key");

    rt.block_on(async {
        let mut scope = ObjectScope::new();
        scope.begin(ScopeOptions::new().transactional(true));
        let mut customer = scope.track(saved_customer()).unwrap();
        customer.name = "Acme Inc".to_string();

        match scope.commit(&cx, &conn, &mut customer).await {
            Outcome::Err(Error::Query(e)) => assert_eq!(e.kind, QueryErrorKind::Constraint),
            other => panic!("expected query error, got {other:?}"),
        }
        assert_eq!(scope.state_of(customer.key()), Some(TrackingState::Tracked));
        assert_eq!(scope.old(&customer).unwrap().unwrap().name, "Acme");
        assert!(!scope.transaction().unwrap().is_completed());

        let summary = scope.end().unwrap();
        assert_eq!(summary.transaction_completed, Some(false));
        assert_eq!(summary.discarded, 1);
    });
}

#[test]
fn rollback_restores_and_releases_snapshot() {
    let mut scope = ObjectScope::new();
    scope.begin(ScopeOptions::new());
    let mut customer = scope.track(saved_customer()).unwrap();
    customer.name = "Changed".to_string();
    customer.orders.clear();

    scope.rollback(&mut customer).unwrap();
    assert_eq!(*customer, saved_customer());
    assert_eq!(scope.state_of(customer.key()), Some(TrackingState::RolledBack));

    let err = scope.rollback(&mut customer).unwrap_err();
    assert_eq!(err.scope_kind(), Some(ScopeErrorKind::NotTracked));
    assert_eq!(scope.end().unwrap().rolled_back, 1);
}

#[test]
fn nested_commit_refreshes_outer_snapshot() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = MockConnection::new();

    rt.block_on(async {
        let mut scope = ObjectScope::new();
        scope.begin(ScopeOptions::new().transactional(true));
        let mut customer = scope.track(saved_customer()).unwrap();

        scope.begin(ScopeOptions::new().transactional(true));
        scope.attach(&customer).unwrap();
        customer.name = "Inner".to_string();

        let summary = unwrap_outcome(scope.commit(&cx, &conn, &mut customer).await);
        assert!(summary.refreshed_outer);
        let inner = scope.end().unwrap();
        assert_eq!(inner.transaction_completed, Some(true));

        // The outer snapshot now matches what the database holds.
        assert_eq!(scope.old(&customer).unwrap().unwrap().name, "Inner");
        let summary = unwrap_outcome(scope.commit(&cx, &conn, &mut customer).await);
        assert!(!summary.executed);
        assert_eq!(scope.end().unwrap().transaction_completed, Some(true));
    });

    assert_eq!(conn.executed().len(), 1);
}

#[test]
fn is_new_scope_inserts_existing_graph() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = MockConnection::returning(vec![
        correlation(0, 2, "customer_id"),
        correlation(1, 20, "order_id"),
    ]);

    rt.block_on(async {
        let mut scope = ObjectScope::new();
        scope.begin(ScopeOptions::new().is_new(true));
        let mut customer = scope.track(saved_customer()).unwrap();

        let summary = unwrap_outcome(scope.commit(&cx, &conn, &mut customer).await);
        assert_eq!(summary.inserts, 2);
        assert_eq!(summary.updates, 0);
        assert_eq!(customer.customer_id, Some(2));
        assert_eq!(customer.orders[0].customer_id, Some(2));
    });
}
