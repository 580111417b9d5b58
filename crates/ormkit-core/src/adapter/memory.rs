//! Embedded in-memory adapter.
//!
//! Tables live in process memory. Queries are answered from the normalized
//! filter one conjunctive clause at a time, then sorted with the filter
//! language's `compare` order. Every call is appended to a call log so tests
//! can assert how many round trips a code path made.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::Duration;

use async_trait::async_trait;
use ormkit_lang::{compare, Expression};
use ormkit_proto::{BatchOp, Record, Value};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tracing::{debug, trace};

use super::Adapter;
use crate::error::AdapterError;
use crate::query::{OrderBy, Query};

/// Default maximum ids or operations per physical call.
pub const DEFAULT_BATCH_LIMIT: usize = 100;

type Table = BTreeMap<String, Record>;

/// A call received by a [`MemoryAdapter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterCall {
    Get { type_name: String, id: String },
    GetAll { type_name: String, ids: Vec<String> },
    ExecuteQuery { type_name: String },
    ApplyBatch { ops: usize },
    Count { type_name: String },
    Explain { type_name: String },
}

/// In-process adapter over a map of tables.
#[derive(Debug)]
pub struct MemoryAdapter {
    tables: RwLock<HashMap<String, Table>>,
    rejected: RwLock<HashSet<(String, String)>>,
    calls: Mutex<Vec<AdapterCall>>,
    offline: AtomicBool,
    latency: Option<Duration>,
    batch_limit: usize,
}

impl MemoryAdapter {
    /// Create an empty adapter.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            rejected: RwLock::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
            latency: None,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    /// Delay every call by `latency`, so that concurrent callers interleave.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Set the per-call chunk size.
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    /// Store a record directly, bypassing the call log.
    pub fn insert(&self, record: Record) {
        self.tables
            .write()
            .entry(record.type_name.clone())
            .or_default()
            .insert(record.id.clone(), record);
    }

    /// Read a stored record directly, bypassing the call log.
    pub fn record(&self, type_name: &str, id: &str) -> Option<Record> {
        self.tables
            .read()
            .get(type_name)
            .and_then(|table| table.get(id))
            .cloned()
    }

    /// Number of stored records of a type.
    pub fn len(&self, type_name: &str) -> usize {
        self.tables.read().get(type_name).map_or(0, BTreeMap::len)
    }

    /// Make every future write to this object fail with `Rejected`.
    pub fn reject(&self, type_name: &str, id: &str) {
        self.rejected
            .write()
            .insert((type_name.to_string(), id.to_string()));
    }

    /// Stop rejecting writes to this object.
    pub fn accept(&self, type_name: &str, id: &str) {
        self.rejected
            .write()
            .remove(&(type_name.to_string(), id.to_string()));
    }

    /// While offline every call fails with a storage error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<AdapterCall> {
        self.calls.lock().clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn log(&self, call: AdapterCall) {
        trace!(?call, "memory adapter call");
        self.calls.lock().push(call);
    }

    /// Simulated round trip: wait out the latency, then fail if offline.
    async fn round_trip(&self) -> Result<(), AdapterError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(AtomicOrdering::SeqCst) {
            return Err(AdapterError::Storage("adapter is offline".into()));
        }
        Ok(())
    }

    /// Matching records in result order, before skip and limit.
    fn select(&self, query: &Query) -> Result<Vec<Record>, AdapterError> {
        let dnf = query.normalized()?;
        let Expression::Or(clauses) = &dnf else {
            return Err(AdapterError::Unsupported(format!(
                "filter did not normalize: {}",
                dnf
            )));
        };

        let tables = self.tables.read();
        let Some(table) = tables.get(&query.object_type().name) else {
            return Ok(Vec::new());
        };

        let mut matched: BTreeMap<&str, &Record> = BTreeMap::new();
        for clause in clauses {
            for (id, record) in table {
                if !matched.contains_key(id.as_str()) && clause.evaluate(record) {
                    matched.insert(id.as_str(), record);
                }
            }
        }

        let mut records: Vec<Record> = matched.into_values().cloned().collect();
        sort_records(&mut records, query.order_by_keys());
        Ok(records)
    }

    fn apply(&self, tables: &mut HashMap<String, Table>, op: &BatchOp) -> Result<(), AdapterError> {
        let key = (op.type_name().to_string(), op.id().to_string());
        if self.rejected.read().contains(&key) {
            return Err(AdapterError::Rejected(format!("{} '{}'", key.0, key.1)));
        }

        let not_found = || AdapterError::NotFound {
            type_name: key.0.clone(),
            id: key.1.clone(),
        };

        match op {
            BatchOp::Put { record } => {
                tables
                    .entry(record.type_name.clone())
                    .or_default()
                    .insert(record.id.clone(), record.clone());
                Ok(())
            }
            BatchOp::Patch { record } => {
                let existing = tables
                    .get_mut(&record.type_name)
                    .and_then(|table| table.get_mut(&record.id))
                    .ok_or_else(not_found)?;
                existing.merge(record);
                Ok(())
            }
            BatchOp::Delete { type_name, id } => tables
                .get_mut(type_name)
                .and_then(|table| table.remove(id))
                .map(|_| ())
                .ok_or_else(not_found),
        }
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_records(records: &mut [Record], order: &[OrderBy]) {
    if order.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        for spec in order {
            let ordering = sort_order(&spec.field.read(a), &spec.field.read(b));
            let ordering = if spec.descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Total order for sorting. Agrees with [`compare`] where that orders by
/// value; kinds it cannot relate are ranked, and equal dates put the day
/// before any timestamp on it.
fn sort_order(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::Bool(_) => 2,
            Value::String(_) => 3,
            Value::Day(_) | Value::DateTime(_) => 4,
            Value::Array(_) => 5,
            Value::Json(_) => 6,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Day(x), Value::Day(y)) => x.cmp(y),
        (Value::Day(d), Value::DateTime(t)) => d.cmp(&t.date_naive()).then(Ordering::Less),
        (Value::DateTime(t), Value::Day(d)) => t.date_naive().cmp(d).then(Ordering::Greater),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(left, right)| sort_order(left, right))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Json(x), Value::Json(y)) => x.to_string().cmp(&y.to_string()),
        _ if rank(a) != rank(b) => rank(a).cmp(&rank(b)),
        _ => compare(a, b).unwrap_or_else(|| match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => Ordering::Equal,
        }),
    }
}

fn window(records: Vec<Record>, query: &Query) -> Vec<Record> {
    records
        .into_iter()
        .skip(query.skip_value())
        .take(query.limit_value().unwrap_or(usize::MAX))
        .collect()
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn get(&self, type_name: &str, id: &str) -> Result<Option<Record>, AdapterError> {
        self.log(AdapterCall::Get {
            type_name: type_name.to_string(),
            id: id.to_string(),
        });
        self.round_trip().await?;
        Ok(self.record(type_name, id))
    }

    async fn get_all(
        &self,
        type_name: &str,
        ids: &[String],
    ) -> Result<Vec<Option<Record>>, AdapterError> {
        self.log(AdapterCall::GetAll {
            type_name: type_name.to_string(),
            ids: ids.to_vec(),
        });
        self.round_trip().await?;

        let mut records = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.batch_limit) {
            trace!(type_name, chunk = chunk.len(), "get_all chunk");
            let tables = self.tables.read();
            let table = tables.get(type_name);
            records.extend(
                chunk
                    .iter()
                    .map(|id| table.and_then(|t| t.get(id)).cloned()),
            );
        }
        Ok(records)
    }

    async fn execute_query(&self, query: &Query) -> Result<Vec<Record>, AdapterError> {
        self.log(AdapterCall::ExecuteQuery {
            type_name: query.object_type().name.clone(),
        });
        self.round_trip().await?;
        let records = self.select(query)?;
        Ok(window(records, query))
    }

    async fn apply_batch(
        &self,
        ops: &[BatchOp],
    ) -> Result<Vec<Result<(), AdapterError>>, AdapterError> {
        self.log(AdapterCall::ApplyBatch { ops: ops.len() });
        self.round_trip().await?;

        let mut results = Vec::with_capacity(ops.len());
        for chunk in ops.chunks(self.batch_limit) {
            let mut tables = self.tables.write();
            results.extend(chunk.iter().map(|op| self.apply(&mut tables, op)));
        }

        debug!(
            ops = ops.len(),
            failed = results.iter().filter(|r| r.is_err()).count(),
            "memory adapter applied batch"
        );
        Ok(results)
    }

    async fn count(&self, query: &Query) -> Result<usize, AdapterError> {
        self.log(AdapterCall::Count {
            type_name: query.object_type().name.clone(),
        });
        self.round_trip().await?;
        let matched = self.select(query)?.len().saturating_sub(query.skip_value());
        Ok(query.limit_value().map_or(matched, |limit| matched.min(limit)))
    }

    async fn explain(&self, query: &Query) -> Result<serde_json::Value, AdapterError> {
        self.log(AdapterCall::Explain {
            type_name: query.object_type().name.clone(),
        });
        self.round_trip().await?;
        let dnf = query.normalized()?;
        let clauses = match &dnf {
            Expression::Or(clauses) => clauses.iter().map(ToString::to_string).collect(),
            other => vec![other.to_string()],
        };
        let order: Vec<String> = query
            .order_by_keys()
            .iter()
            .map(|spec| {
                let prefix = if spec.descending { "-" } else { "" };
                format!("{}{}", prefix, spec.field.name())
            })
            .collect();

        Ok(json!({
            "adapter": "memory",
            "type": query.object_type().name,
            "strategy": "scan per clause",
            "clauses": clauses,
            "order_by": order,
            "skip": query.skip_value(),
            "limit": query.limit_value(),
        }))
    }

    fn batch_limit(&self) -> usize {
        self.batch_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use ormkit_proto::{AttributeType, ObjectType, Schema};
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryAdapter>, Store) {
        let schema = Schema::new().with_type(
            ObjectType::new("Phone")
                .with_attribute("make", AttributeType::Text)
                .with_attribute("price", AttributeType::Integer),
        );
        let adapter = Arc::new(MemoryAdapter::new());
        for (id, make, price) in [
            ("1", "Nokia", 120),
            ("2", "Samsung", 300),
            ("3", "apple", 800),
            ("4", "Nokia", 90),
        ] {
            adapter.insert(
                Record::new("Phone", id)
                    .with_attribute("make", make)
                    .with_attribute("price", price),
            );
        }
        let store = Store::new(adapter.clone(), schema);
        (adapter, store)
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_query_filters_sorts_and_windows() {
        let (adapter, store) = setup();
        let query = store
            .query("Phone")
            .unwrap()
            .filter("make in ?", &[Value::from(vec!["nokia", "APPLE"])])
            .unwrap()
            .order_by(&["-price"])
            .unwrap();

        let all = adapter.execute_query(&query).await.unwrap();
        assert_eq!(ids(&all), vec!["3", "1", "4"]);

        let page = adapter
            .execute_query(&query.skip(1).limit(1))
            .await
            .unwrap();
        assert_eq!(ids(&page), vec!["1"]);

        assert_eq!(adapter.count(&query).await.unwrap(), 3);
        assert_eq!(adapter.count(&query.skip(2).limit(5)).await.unwrap(), 1);
    }

    #[test]
    fn test_sort_order_is_total() {
        let day = AttributeType::Day.cast(&Value::from("2020-01-02")).unwrap();
        let early = AttributeType::DateTime
            .cast(&Value::from("2020-01-02T01:00:00Z"))
            .unwrap();
        let noon = AttributeType::DateTime
            .cast(&Value::from("2020-01-02T12:00:00Z"))
            .unwrap();
        let samples = vec![
            Value::from(vec![1, 2, 3]),
            noon.clone(),
            Value::Bool(true),
            Value::from("Nokia"),
            Value::Null,
            early.clone(),
            Value::Float(2.5),
            Value::from(vec![1, 2]),
            day.clone(),
            Value::Int(3),
            Value::Bool(false),
        ];

        for a in &samples {
            for b in &samples {
                assert_eq!(sort_order(a, b), sort_order(b, a).reverse(), "{:?} vs {:?}", a, b);
                for c in &samples {
                    if sort_order(a, b).is_le() && sort_order(b, c).is_le() {
                        assert!(sort_order(a, c).is_le(), "{:?} <= {:?} <= {:?}", a, b, c);
                    }
                }
            }
        }

        let mut sorted = samples.clone();
        sorted.sort_by(sort_order);
        assert_eq!(
            sorted,
            vec![
                Value::Null,
                Value::Float(2.5),
                Value::Int(3),
                Value::Bool(false),
                Value::Bool(true),
                Value::from("Nokia"),
                day,
                early,
                noon,
                Value::from(vec![1, 2]),
                Value::from(vec![1, 2, 3]),
            ]
        );
    }

    #[tokio::test]
    async fn test_order_by_mixed_kinds_is_deterministic() {
        let adapter = Arc::new(MemoryAdapter::new());
        let schema = Schema::new()
            .with_type(ObjectType::new("Note").with_attribute("body", AttributeType::Json));
        for (id, body) in [
            ("a", json!({"v": 2})),
            ("b", json!("text")),
            ("c", json!(null)),
            ("d", json!(7)),
            ("e", json!({"v": 1})),
        ] {
            adapter.insert(Record::new("Note", id).with_attribute("body", body));
        }
        let store = Store::new(adapter.clone(), schema);
        let query = store.query("Note").unwrap().order_by(&["body"]).unwrap();

        let records = adapter.execute_query(&query).await.unwrap();
        assert_eq!(ids(&records), vec!["c", "b", "d", "e", "a"]);
        let reversed = adapter
            .execute_query(&query.order_by(&["-body"]).unwrap())
            .await
            .unwrap();
        assert_eq!(ids(&reversed), vec!["a", "e", "d", "b", "c"]);
    }

    #[tokio::test]
    async fn test_get_all_preserves_order_and_gaps() {
        let adapter = MemoryAdapter::new().with_batch_limit(1);
        adapter.insert(Record::new("Phone", "1"));
        adapter.insert(Record::new("Phone", "4"));
        let records = adapter
            .get_all("Phone", &["4".into(), "missing".into(), "1".into()])
            .await
            .unwrap();
        let found: Vec<Option<&str>> = records
            .iter()
            .map(|r| r.as_ref().map(|r| r.id.as_str()))
            .collect();
        assert_eq!(found, vec![Some("4"), None, Some("1")]);
        assert_eq!(adapter.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_apply_batch_reports_per_op_errors() {
        let (adapter, _store) = setup();
        adapter.reject("Phone", "2");

        let results = adapter
            .apply_batch(&[
                BatchOp::patch(Record::new("Phone", "1").with_attribute("price", 99)),
                BatchOp::delete("Phone", "2"),
                BatchOp::delete("Phone", "missing"),
                BatchOp::put(Record::new("Phone", "5").with_attribute("make", "Sony")),
            ])
            .await
            .unwrap();

        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(AdapterError::Rejected(_))));
        assert_eq!(
            results[2],
            Err(AdapterError::NotFound {
                type_name: "Phone".into(),
                id: "missing".into()
            })
        );
        assert!(results[3].is_ok());

        let patched = adapter.record("Phone", "1").unwrap();
        assert_eq!(patched.attributes["price"], json!(99));
        assert_eq!(patched.attributes["make"], json!("Nokia"));
        assert_eq!(adapter.len("Phone"), 5);
    }

    #[tokio::test]
    async fn test_explain_lists_clauses() {
        let (adapter, store) = setup();
        let query = store
            .query("Phone")
            .unwrap()
            .filter("make = ? or price > ?", &["Sony".into(), 100.into()])
            .unwrap();
        let plan = adapter.explain(&query).await.unwrap();
        assert_eq!(plan["clauses"].as_array().unwrap().len(), 2);
        assert_eq!(plan["type"], json!("Phone"));
    }
}
