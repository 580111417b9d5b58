//! Immutable query builder.
//!
//! Every builder method returns a new [`Query`]; the receiver is left as it
//! was, so a base query can be shared and refined freely.

mod preload;

pub use preload::PreloadTree;

use std::fmt;
use std::sync::Arc;

use ormkit_lang::{compile_map, parse_filter, Expression, Field, NormalizeError};
use ormkit_proto::{DisplayFormat, ObjectType, Value};
use tracing::{debug, warn};

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::store::Store;

/// One ordering key.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: Field,
    pub descending: bool,
}

impl OrderBy {
    /// Parse `"field"` or `"-field"` against a scope type.
    pub fn parse(scope: &ObjectType, spec: &str) -> Result<OrderBy> {
        let (name, descending) = match spec.strip_prefix('-') {
            Some(name) => (name, true),
            None => (spec, false),
        };
        let field = Field::resolve(scope, name)
            .map_err(|_| Error::unknown_attribute(&scope.name, name))?;
        Ok(OrderBy { field, descending })
    }
}

/// A query over one object type.
#[derive(Clone)]
pub struct Query {
    store: Store,
    object_type: Arc<ObjectType>,
    expression: Expression,
    order_by: Vec<OrderBy>,
    limit: Option<usize>,
    skip: usize,
    preload: PreloadTree,
}

impl Query {
    pub(crate) fn new(store: Store, object_type: Arc<ObjectType>) -> Self {
        Self {
            store,
            object_type,
            expression: Expression::True,
            order_by: Vec::new(),
            limit: None,
            skip: 0,
            preload: PreloadTree::default(),
        }
    }

    /// Narrow by a textual filter with positional arguments.
    ///
    /// ```text
    /// query.filter("model = ? and make = ?", &["5230".into(), "Samsung".into()])
    /// ```
    pub fn filter(&self, source: &str, args: &[Value]) -> Result<Query> {
        let expr = parse_filter(source, &self.object_type, args)?;
        Ok(self.and(expr))
    }

    /// Narrow by attribute equalities.
    pub fn filter_by<K, I>(&self, entries: I) -> Result<Query>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let expr = compile_map(&self.object_type, entries)?;
        Ok(self.and(expr))
    }

    /// Narrow by a prebuilt expression.
    pub fn and(&self, expr: Expression) -> Query {
        let mut query = self.clone();
        query.expression = query.expression.and_also(expr);
        query
    }

    /// Return at most `limit` results.
    pub fn limit(&self, limit: usize) -> Query {
        let mut query = self.clone();
        query.limit = Some(limit);
        query
    }

    /// Skip the first `skip` results.
    pub fn skip(&self, skip: usize) -> Query {
        let mut query = self.clone();
        query.skip = skip;
        query
    }

    /// Replace the ordering. A leading `-` sorts descending.
    pub fn order_by(&self, fields: &[&str]) -> Result<Query> {
        let order_by = fields
            .iter()
            .map(|spec| OrderBy::parse(&self.object_type, spec))
            .collect::<Result<Vec<_>>>()?;
        let mut query = self.clone();
        query.order_by = order_by;
        Ok(query)
    }

    /// Preload belongs-to relationships along dotted paths, e.g. `"room.floor"`.
    ///
    /// Paths accumulate across calls.
    pub fn include(&self, paths: &[&str]) -> Result<Query> {
        let mut preload = self.preload.clone();
        for path in paths {
            self.check_path(path)?;
            preload.insert_path(path);
        }
        let mut query = self.clone();
        query.preload = preload;
        Ok(query)
    }

    fn check_path(&self, path: &str) -> Result<()> {
        let limit = self.store.config().max_preload_depth;
        if path.split('.').count() > limit {
            return Err(Error::PreloadTooDeep {
                path: path.to_string(),
                limit,
            });
        }

        let mut scope = self.object_type.clone();
        for segment in path.split('.') {
            let rel = scope
                .belongs_to_relationship(segment)
                .ok_or_else(|| Error::unknown_relationship(&scope.name, segment))?;
            scope = self.store.object_type(&rel.foreign_type)?;
        }
        Ok(())
    }

    /// The store this query runs against.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The queried type.
    pub fn object_type(&self) -> &Arc<ObjectType> {
        &self.object_type
    }

    /// The filter as built.
    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Ordering keys, most significant first.
    pub fn order_by_keys(&self) -> &[OrderBy] {
        &self.order_by
    }

    /// The limit, if any.
    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    /// Number of results skipped.
    pub fn skip_value(&self) -> usize {
        self.skip
    }

    /// Relationships to preload.
    pub fn preload(&self) -> &PreloadTree {
        &self.preload
    }

    /// The filter in disjunctive normal form, bounded by the store's limits.
    pub fn normalized(&self) -> Result<Expression, NormalizeError> {
        let config = self.store.config();
        let dnf = self
            .expression
            .normalize_with_limit(config.max_normalized_clauses)?;
        if let Expression::Or(clauses) = &dnf {
            if clauses.len() > config.warn_normalized_clauses {
                warn!(
                    object_type = %self.object_type.name,
                    clauses = clauses.len(),
                    threshold = config.warn_normalized_clauses,
                    "large normalized filter"
                );
            }
        }
        Ok(dnf)
    }

    /// Run the query and preload requested relationships.
    pub async fn fetch(&self) -> Result<Vec<Entity>> {
        let records = self.store.adapter().execute_query(self).await?;
        let entities = records
            .into_iter()
            .map(|record| Entity::hydrate(self.store.clone(), self.object_type.clone(), record))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            object_type = %self.object_type.name,
            results = entities.len(),
            "query fetched"
        );

        if !self.preload.is_empty() && !entities.is_empty() {
            preload::resolve(
                &self.store,
                self.object_type.clone(),
                entities.clone(),
                &self.preload,
            )
            .await?;
        }
        Ok(entities)
    }

    /// Fetch the first result.
    pub async fn first(&self) -> Result<Option<Entity>> {
        Ok(self.limit(1).fetch().await?.into_iter().next())
    }

    /// Same as [`Query::first`].
    pub async fn get(&self) -> Result<Option<Entity>> {
        self.first().await
    }

    /// Fetch the result with the given id, if it also matches the filter.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Entity>> {
        self.and(Expression::eq(Field::Id, id)).first().await
    }

    /// Count matching objects.
    pub async fn count(&self) -> Result<usize> {
        Ok(self.store.adapter().count(self).await?)
    }

    /// Ask the adapter how it would run this query.
    pub async fn explain(&self) -> Result<serde_json::Value> {
        Ok(self.store.adapter().explain(self).await?)
    }

    /// Fetch with every relationship the display templates traverse preloaded.
    ///
    /// Without explicit templates the type's default template is used.
    pub async fn fetch_with_display(
        &self,
        formats: Option<&[DisplayFormat]>,
    ) -> Result<Vec<Entity>> {
        let formats: Vec<&DisplayFormat> = match formats {
            Some(formats) => formats.iter().collect(),
            None => self.object_type.display_format.iter().collect(),
        };
        let paths: Vec<String> = formats
            .into_iter()
            .flat_map(|format| format.relationship_paths())
            .collect();
        let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
        self.include(&paths)?.fetch().await
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.store.same_adapter(&other.store)
            && self.object_type.name == other.object_type.name
            && self.expression == other.expression
            && self.order_by == other.order_by
            && self.limit == other.limit
            && self.skip == other.skip
            && self.preload == other.preload
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("object_type", &self.object_type.name)
            .field("filter", &self.expression.to_string())
            .field("order_by", &self.order_by)
            .field("limit", &self.limit)
            .field("skip", &self.skip)
            .field("preload", &self.preload.paths())
            .finish()
    }
}
