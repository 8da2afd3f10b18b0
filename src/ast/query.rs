//! Query builder.
//!
//! Every method borrows the receiver and returns a new `Query`, so
//! intermediate queries stay valid and can be reused as templates.
use std::sync::Arc;

use super::dsl;
use super::types::*;
use crate::error::{QueryBuildError, Result, SchemaError};
use crate::schema::{AssociationKind, Entity, EntityType, SchemaRegistry};

/// Start a query over a bare relation name.
pub fn projection(relation: impl Into<String>) -> Query {
    Query {
        source: relation.into(),
        entity: None,
        joins: vec![],
        predicate: None,
        order_by: None,
        projection: None,
    }
}

/// Start a query over `E` using the process-wide registry.
pub fn from<E: Entity>() -> Result<Query, SchemaError> {
    SchemaRegistry::global().from::<E>()
}

impl SchemaRegistry {
    /// Start a query over `E`. The projection stays empty, so it renders as
    /// `SELECT *`. All of `E`'s associations must resolve at this point.
    pub fn from<E: Entity>(&self) -> Result<Query, SchemaError> {
        let entity = self.lookup::<E>()?;
        self.resolve_all(&entity)?;
        Ok(Query::from_entity(entity))
    }
}

impl Query {
    pub fn from_entity(entity: Arc<EntityType>) -> Self {
        Query {
            source: entity.relation.clone(),
            entity: Some(entity),
            joins: vec![],
            predicate: None,
            order_by: None,
            projection: None,
        }
    }

    /// Add a predicate. An existing predicate is kept and AND-ed with the new one.
    #[must_use]
    pub fn filter(&self, predicate: Expression) -> Query {
        let mut query = self.clone();
        query.predicate = Some(match query.predicate.take() {
            Some(existing) => existing & predicate,
            None => predicate,
        });
        query
    }

    pub fn join(
        &self,
        relation: impl Into<String>,
        alias: impl Into<String>,
        on: Expression,
    ) -> Result<Query, QueryBuildError> {
        self.with_join(JoinKind::Inner, relation.into(), alias.into(), on)
    }

    pub fn left_join(
        &self,
        relation: impl Into<String>,
        alias: impl Into<String>,
        on: Expression,
    ) -> Result<Query, QueryBuildError> {
        self.with_join(JoinKind::Left, relation.into(), alias.into(), on)
    }

    /// Join the target of a declared association, aliased as
    /// `<entity>_<association>`.
    pub fn join_association(&self, registry: &SchemaRegistry, name: &str) -> Result<Query> {
        self.association_join(registry, name, JoinKind::Inner)
    }

    pub fn left_join_association(&self, registry: &SchemaRegistry, name: &str) -> Result<Query> {
        self.association_join(registry, name, JoinKind::Left)
    }

    /// Order ascending by `column`, replacing any previous ordering.
    #[must_use]
    pub fn order(&self, column: ColumnRef) -> Query {
        self.order_by(column, OrderDirection::Ascending)
    }

    #[must_use]
    pub fn order_by(&self, column: ColumnRef, direction: OrderDirection) -> Query {
        let mut query = self.clone();
        query.order_by = Some(OrderBy { column, direction });
        query
    }

    pub fn reverse_order(&self) -> Result<Query, QueryBuildError> {
        let mut query = self.clone();
        let order = query
            .order_by
            .as_mut()
            .ok_or(QueryBuildError::NoOrderClause)?;
        order.direction = order.direction.reversed();
        Ok(query)
    }

    /// Replace the projected columns.
    #[must_use]
    pub fn select(&self, columns: Vec<ColumnRef>) -> Query {
        let mut query = self.clone();
        query.projection = Some(columns);
        query
    }

    /// Project every mapped column of the source entity, in declaration order.
    pub fn select_entity(&self) -> Result<Query, QueryBuildError> {
        let entity = self
            .entity
            .as_ref()
            .ok_or_else(|| QueryBuildError::NoEntity(self.source.clone()))?;
        let columns = entity
            .columns()
            .map(|column| dsl::raw_column(self.source.clone(), column))
            .collect();
        Ok(self.select(columns))
    }

    /// Source alias followed by every join alias, in declaration order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.source.as_str()).chain(self.joins.iter().map(|j| j.alias.as_str()))
    }

    fn with_join(
        &self,
        kind: JoinKind,
        relation: String,
        alias: String,
        on: Expression,
    ) -> Result<Query, QueryBuildError> {
        if self.aliases().any(|existing| existing == alias) {
            return Err(QueryBuildError::DuplicateAlias(alias));
        }
        let mut query = self.clone();
        query.joins.push(Join {
            kind,
            relation,
            alias,
            on,
        });
        Ok(query)
    }

    fn association_join(
        &self,
        registry: &SchemaRegistry,
        name: &str,
        kind: JoinKind,
    ) -> Result<Query> {
        let entity = self
            .entity
            .as_ref()
            .ok_or_else(|| QueryBuildError::NoEntity(self.source.clone()))?;
        let association =
            entity
                .association(name)
                .ok_or_else(|| SchemaError::UnknownAssociation {
                    entity: entity.name.clone(),
                    association: name.to_string(),
                })?;
        let target = registry.resolve(entity, association)?;
        let alias = format!("{}_{}", entity.name.to_lowercase(), association.local_property);

        let on = match association.kind {
            // alias.id = source.author_id
            AssociationKind::BelongsTo => dsl::raw_column(&alias, &target.primary_key().column)
                .eq(dsl::raw_column(&self.source, &association.foreign_key))?,
            // alias.author_id = source.id
            AssociationKind::HasMany | AssociationKind::HasOne => {
                dsl::raw_column(&alias, &association.foreign_key)
                    .eq(dsl::raw_column(&self.source, &entity.primary_key().column))?
            }
        };

        Ok(self.with_join(kind, target.relation.clone(), alias, on)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::dsl::{column, raw_column, sql};
    use crate::error::Error;
    use crate::schema::{EntityTypeBuilder, ValueType};

    struct User;
    struct Article;

    impl Entity for User {
        fn describe(t: &mut EntityTypeBuilder<Self>) {
            t.property("id", "id", ValueType::PrimaryKey);
            t.property("email", "email", ValueType::Text);
            t.has_many::<Article>("articles", "author_id");
        }
    }

    impl Entity for Article {
        fn describe(t: &mut EntityTypeBuilder<Self>) {
            t.property("id", "id", ValueType::PrimaryKey);
            t.property("title", "title", ValueType::Text);
            t.belongs_to::<User>("author", "author_id");
        }
    }

    fn registry() -> SchemaRegistry {
        let registry = SchemaRegistry::new();
        registry.register::<User>().unwrap();
        registry.register::<Article>().unwrap();
        registry
    }

    #[test]
    fn test_projection_is_empty() {
        let q = projection("articles");
        assert_eq!(q.source, "articles");
        assert!(q.joins.is_empty());
        assert!(q.predicate.is_none());
        assert!(q.order_by.is_none());
        assert!(q.projection.is_none());
    }

    #[test]
    fn test_from_entity_leaves_projection_empty() {
        let q = registry().from::<Article>().unwrap();
        assert_eq!(q.source, "articles");
        assert!(q.projection.is_none());
    }

    #[test]
    fn test_select_entity_projects_columns() {
        let base = registry().from::<Article>().unwrap();
        let q = base.select_entity().unwrap();
        let cols: Vec<(&str, &str)> = q
            .projection
            .as_ref()
            .unwrap()
            .iter()
            .map(|c| (c.relation_alias.as_str(), c.column.as_str()))
            .collect();
        assert_eq!(
            cols,
            vec![("articles", "id"), ("articles", "title"), ("articles", "author_id")]
        );
        assert!(base.projection.is_none());
        assert_eq!(
            projection("articles").select_entity(),
            Err(QueryBuildError::NoEntity("articles".into()))
        );
    }

    #[test]
    fn test_from_fails_on_unresolved_association() {
        let registry = SchemaRegistry::new();
        registry.register::<Article>().unwrap();
        assert!(matches!(
            registry.from::<Article>(),
            Err(SchemaError::UnresolvedAssociation { .. })
        ));
    }

    #[test]
    fn test_from_unknown_entity() {
        let registry = SchemaRegistry::new();
        assert_eq!(
            registry.from::<User>(),
            Err(SchemaError::UnknownEntityType("User".into()))
        );
    }

    #[test]
    fn test_filter_does_not_mutate_receiver() {
        let base = projection("articles");
        let filtered = base.filter(raw_column("articles", "id").eq(1).unwrap());
        assert!(base.predicate.is_none());
        assert!(filtered.predicate.is_some());
    }

    #[test]
    fn test_filter_twice_ands_predicates() {
        let a = raw_column("articles", "id").eq(1).unwrap();
        let b = raw_column("articles", "title").like("%x%").unwrap();
        let q = projection("articles").filter(a.clone()).filter(b.clone());
        assert_eq!(q.predicate, Some(a & b));
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let on = raw_column("u", "id").eq(raw_column("articles", "author_id")).unwrap();
        let q = projection("articles").left_join("users", "u", on.clone()).unwrap();
        assert_eq!(
            q.join("users", "u", on.clone()),
            Err(QueryBuildError::DuplicateAlias("u".into()))
        );
        assert_eq!(
            q.join("articles", "articles", on),
            Err(QueryBuildError::DuplicateAlias("articles".into()))
        );
    }

    #[test]
    fn test_reverse_order() {
        let q = projection("articles").order(raw_column("articles", "created_at"));
        let reversed = q.reverse_order().unwrap();
        assert_eq!(
            reversed.order_by.as_ref().unwrap().direction,
            OrderDirection::Descending
        );
        assert_eq!(q.order_by.as_ref().unwrap().direction, OrderDirection::Ascending);
        assert_eq!(reversed.reverse_order().unwrap(), q);
    }

    #[test]
    fn test_reverse_order_without_order() {
        assert_eq!(
            projection("articles").reverse_order(),
            Err(QueryBuildError::NoOrderClause)
        );
    }

    #[test]
    fn test_belongs_to_association_join() {
        let registry = registry();
        let q = registry
            .from::<Article>()
            .unwrap()
            .left_join_association(&registry, "author")
            .unwrap();
        let join = &q.joins[0];
        assert_eq!(join.kind, JoinKind::Left);
        assert_eq!(join.relation, "users");
        assert_eq!(join.alias, "article_author");
        assert_eq!(
            join.on,
            raw_column("article_author", "id")
                .eq(raw_column("articles", "author_id"))
                .unwrap()
        );
    }

    #[test]
    fn test_has_many_association_join() {
        let registry = registry();
        let q = registry
            .from::<User>()
            .unwrap()
            .join_association(&registry, "articles")
            .unwrap();
        let join = &q.joins[0];
        assert_eq!(join.kind, JoinKind::Inner);
        assert_eq!(join.relation, "articles");
        assert_eq!(join.alias, "user_articles");
        assert_eq!(
            join.on,
            raw_column("user_articles", "author_id")
                .eq(raw_column("users", "id"))
                .unwrap()
        );
    }

    #[test]
    fn test_has_one_association_join() {
        struct Profile;
        struct Account;

        impl Entity for Profile {
            fn describe(t: &mut EntityTypeBuilder<Self>) {
                t.property("id", "id", ValueType::PrimaryKey);
                t.property("bio", "bio", ValueType::Text);
            }
        }

        impl Entity for Account {
            fn describe(t: &mut EntityTypeBuilder<Self>) {
                t.property("id", "id", ValueType::PrimaryKey);
                t.has_one::<Profile>("profile", "account_id");
            }
        }

        let registry = SchemaRegistry::new();
        registry.register::<Profile>().unwrap();
        registry.register::<Account>().unwrap();
        let q = registry
            .from::<Account>()
            .unwrap()
            .left_join_association(&registry, "profile")
            .unwrap();
        let join = &q.joins[0];
        assert_eq!(join.kind, JoinKind::Left);
        assert_eq!(join.relation, "profiles");
        assert_eq!(join.alias, "account_profile");
        assert_eq!(
            join.on,
            raw_column("account_profile", "account_id")
                .eq(raw_column("accounts", "id"))
                .unwrap()
        );
    }

    #[test]
    fn test_association_join_errors() {
        let registry = registry();
        let q = registry.from::<Article>().unwrap();
        assert!(matches!(
            q.join_association(&registry, "comments"),
            Err(Error::Schema(SchemaError::UnknownAssociation { .. }))
        ));
        assert!(matches!(
            projection("articles").join_association(&registry, "author"),
            Err(Error::QueryBuild(QueryBuildError::NoEntity(_)))
        ));
    }

    #[test]
    fn test_select_replaces_projection() {
        let registry = registry();
        let article = registry.lookup::<Article>().unwrap();
        let q = registry
            .from::<Article>()
            .unwrap()
            .select(vec![column(&article, "title").unwrap()]);
        assert_eq!(q.projection.unwrap().len(), 1);
    }

    #[test]
    fn test_filter_accepts_raw_sql() {
        let q = projection("articles").filter(sql("true"));
        assert_eq!(q.predicate, Some(Expression::RawSql("true".into())));
    }
}
