use std::collections::{BTreeMap, BTreeSet};

use super::{DatabaseRouter, ModelRef, RoutingError, Verdict};

/// Namespaces shipped with the application and the database each one lives in.
pub const DEFAULT_ROUTES: [(&str, &str); 4] = [
    ("auth", "auth"),
    ("users", "users"),
    ("videos", "videos"),
    ("billing", "billing"),
];

/// Immutable namespace -> database map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    routes: BTreeMap<String, String>,
}

impl RoutingTable {
    /// Builds a table from `(namespace, database)` pairs, rejecting duplicate
    /// namespaces and empty names.
    pub fn new<I, N, D>(entries: I) -> Result<Self, RoutingError>
    where
        I: IntoIterator<Item = (N, D)>,
        N: Into<String>,
        D: Into<String>,
    {
        entries
            .into_iter()
            .fold(Ok(Self::builder()), |builder, (namespace, database)| {
                builder?.route(namespace, database)
            })
            .map(RoutingTableBuilder::build)
    }

    pub fn builder() -> RoutingTableBuilder {
        RoutingTableBuilder::default()
    }

    /// Parses `ns=db,ns=db`. Whitespace around names is ignored, as are empty
    /// list items (`a=a,,b=b`).
    pub fn parse(raw: &str) -> Result<Self, RoutingError> {
        let mut builder = Self::builder();
        for item in raw.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let (namespace, database) = item
                .split_once('=')
                .ok_or_else(|| RoutingError::MalformedEntry(item.to_string()))?;
            builder = builder.route(namespace.trim(), database.trim())?;
        }
        Ok(builder.build())
    }

    /// Database configured for `namespace`, or `None` when the table has no
    /// opinion about it.
    pub fn database_for(&self, namespace: &str) -> Option<&str> {
        self.routes.get(namespace).map(String::as_str)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Distinct databases referenced by the table, sorted.
    pub fn databases(&self) -> Vec<&str> {
        self.routes
            .values()
            .map(String::as_str)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self {
            routes: DEFAULT_ROUTES
                .iter()
                .map(|(namespace, database)| (namespace.to_string(), database.to_string()))
                .collect(),
        }
    }
}

impl DatabaseRouter for RoutingTable {
    fn db_for_read(&self, model: &ModelRef) -> Option<&str> {
        self.database_for(model.namespace())
    }

    fn db_for_write(&self, model: &ModelRef) -> Option<&str> {
        self.database_for(model.namespace())
    }

    fn allow_relation(&self, left: &ModelRef, right: &ModelRef) -> Verdict {
        match (
            self.database_for(left.namespace()),
            self.database_for(right.namespace()),
        ) {
            (Some(left_db), Some(right_db)) => Verdict::from(left_db == right_db),
            _ => Verdict::NoOpinion,
        }
    }

    fn allow_migrate(&self, db: &str, namespace: &str, _model_name: Option<&str>) -> Verdict {
        match self.database_for(namespace) {
            Some(routed) => Verdict::from(routed == db),
            None => Verdict::NoOpinion,
        }
    }
}

#[derive(Debug, Default)]
pub struct RoutingTableBuilder {
    routes: BTreeMap<String, String>,
}

impl RoutingTableBuilder {
    pub fn route(
        mut self,
        namespace: impl Into<String>,
        database: impl Into<String>,
    ) -> Result<Self, RoutingError> {
        let namespace = namespace.into();
        let database = database.into();
        if namespace.is_empty() || database.is_empty() {
            return Err(RoutingError::EmptySegment);
        }
        if self.routes.contains_key(&namespace) {
            return Err(RoutingError::DuplicateNamespace(namespace));
        }
        self.routes.insert(namespace, database);
        Ok(self)
    }

    pub fn build(self) -> RoutingTable {
        RoutingTable {
            routes: self.routes,
        }
    }
}
