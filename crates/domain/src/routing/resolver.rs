use super::{DatabaseRouter, ModelRef};

/// Applies the caller-side defaults on top of a router: abstaining reads and
/// writes land on the default alias, abstaining migrations are allowed, and
/// abstaining relations are allowed only when both models resolve to the same
/// database.
#[derive(Debug, Clone)]
pub struct RouteResolver<R> {
    router: R,
    default_alias: String,
}

impl<R> RouteResolver<R>
where
    R: DatabaseRouter,
{
    pub fn new(router: R, default_alias: impl Into<String>) -> Self {
        Self {
            router,
            default_alias: default_alias.into(),
        }
    }

    pub fn router(&self) -> &R {
        &self.router
    }

    pub fn default_alias(&self) -> &str {
        &self.default_alias
    }

    pub fn reader(&self, model: &ModelRef) -> &str {
        self.router
            .db_for_read(model)
            .unwrap_or(self.default_alias.as_str())
    }

    pub fn writer(&self, model: &ModelRef) -> &str {
        self.router
            .db_for_write(model)
            .unwrap_or(self.default_alias.as_str())
    }

    pub fn relation_allowed(&self, left: &ModelRef, right: &ModelRef) -> bool {
        let same_database = self.writer(left) == self.writer(right);
        self.router
            .allow_relation(left, right)
            .resolve(same_database)
    }

    pub fn migration_allowed(&self, db: &str, namespace: &str, model_name: Option<&str>) -> bool {
        self.router
            .allow_migrate(db, namespace, model_name)
            .resolve(true)
    }
}
