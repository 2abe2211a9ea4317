//! Relationship metadata for SQLModel Rust.
//!
//! Relationships are declared as static metadata on each `Model`. Loader
//! option paths (`"author.publisher"`) are chains of relationship names, and
//! the session uses the key columns recorded here to load related rows.

use crate::mapper::MappedEntity;
use crate::model::Model;

/// The type of relationship between two models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RelationshipKind {
    /// One-to-one: `Book` has one `Cover`.
    OneToOne,
    /// Many-to-one: many `Book`s belong to one `Author`.
    #[default]
    ManyToOne,
    /// One-to-many: one `Author` has many `Book`s.
    OneToMany,
}

/// Metadata about a relationship between models.
#[derive(Debug, Clone, Copy)]
pub struct RelationshipInfo {
    /// Name of the relationship field.
    pub name: &'static str,

    /// The related model's table name.
    pub related_table: &'static str,

    /// Kind of relationship.
    pub kind: RelationshipKind,

    /// Local foreign key attribute (for ManyToOne).
    /// e.g., `"author_id"` on `Book`.
    pub local_key: Option<&'static str>,

    /// Remote foreign key attribute (for OneToMany).
    /// e.g., `"author_id"` on `Book` when accessed from `Author`.
    pub remote_key: Option<&'static str>,

    /// The field on the related model that points back.
    pub back_populates: Option<&'static str>,

    /// Mapped entity of the related model; set by [`RelationshipInfo::to`].
    /// Options below this relationship are validated against it.
    pub target: Option<fn() -> MappedEntity>,
}

impl PartialEq for RelationshipInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.related_table == other.related_table
            && self.kind == other.kind
            && self.local_key == other.local_key
            && self.remote_key == other.remote_key
            && self.back_populates == other.back_populates
            && self.target.is_some() == other.target.is_some()
    }
}

impl Eq for RelationshipInfo {}

impl RelationshipInfo {
    /// Create a new relationship with required fields.
    #[must_use]
    pub const fn new(
        name: &'static str,
        related_table: &'static str,
        kind: RelationshipKind,
    ) -> Self {
        Self {
            name,
            related_table,
            kind,
            local_key: None,
            remote_key: None,
            back_populates: None,
            target: None,
        }
    }

    /// Relationship to model `M`, recording its table and mapped entity.
    #[must_use]
    pub const fn to<M: Model>(name: &'static str, kind: RelationshipKind) -> Self {
        let mut info = Self::new(name, M::TABLE_NAME, kind);
        info.target = Some(MappedEntity::of::<M>);
        info
    }

    /// Set the local foreign key attribute (ManyToOne).
    #[must_use]
    pub const fn local_key(mut self, key: &'static str) -> Self {
        self.local_key = Some(key);
        self
    }

    /// Set the remote foreign key attribute (OneToMany).
    #[must_use]
    pub const fn remote_key(mut self, key: &'static str) -> Self {
        self.remote_key = Some(key);
        self
    }

    /// Set the back-populates field name (bidirectional relationships).
    #[must_use]
    pub const fn back_populates(mut self, field: &'static str) -> Self {
        self.back_populates = Some(field);
        self
    }

    /// Mapped entity of the related model, if declared with `to`.
    #[must_use]
    pub fn target_entity(&self) -> Option<MappedEntity> {
        self.target.map(|entity| entity())
    }

    /// True when the parent row holds the key (ManyToOne, or OneToOne with a
    /// local key).
    #[must_use]
    pub const fn keyed_on_parent(&self) -> bool {
        match self.kind {
            RelationshipKind::ManyToOne => true,
            RelationshipKind::OneToOne => self.local_key.is_some(),
            RelationshipKind::OneToMany => false,
        }
    }
}

impl Default for RelationshipInfo {
    fn default() -> Self {
        Self::new("", "", RelationshipKind::default())
    }
}

/// Find a relationship by name.
#[must_use]
pub fn find_relationship<'a>(
    relationships: &'a [RelationshipInfo],
    name: &str,
) -> Option<&'a RelationshipInfo> {
    relationships.iter().find(|r| r.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_kind_default() {
        assert_eq!(RelationshipKind::default(), RelationshipKind::ManyToOne);
    }

    #[test]
    fn test_relationship_info_builder_chain() {
        let info = RelationshipInfo::new("author", "authors", RelationshipKind::ManyToOne)
            .local_key("author_id")
            .back_populates("books");

        assert_eq!(info.name, "author");
        assert_eq!(info.related_table, "authors");
        assert_eq!(info.kind, RelationshipKind::ManyToOne);
        assert_eq!(info.local_key, Some("author_id"));
        assert_eq!(info.remote_key, None);
        assert_eq!(info.back_populates, Some("books"));
        assert!(info.keyed_on_parent());
    }

    #[test]
    fn test_one_to_one_key_side() {
        let remote = RelationshipInfo::new("cover", "covers", RelationshipKind::OneToOne)
            .remote_key("book_id");
        assert!(!remote.keyed_on_parent());
        let local = remote.local_key("cover_id");
        assert!(local.keyed_on_parent());
    }

    #[test]
    fn test_find_relationship_by_name() {
        static RELS: &[RelationshipInfo] = &[
            RelationshipInfo::new("author", "authors", RelationshipKind::ManyToOne),
            RelationshipInfo::new("reviews", "reviews", RelationshipKind::OneToMany),
        ];
        assert_eq!(
            find_relationship(RELS, "reviews").map(|r| r.related_table),
            Some("reviews")
        );
        assert!(find_relationship(RELS, "publisher").is_none());
    }

    struct Author;

    impl Model for Author {
        const TABLE_NAME: &'static str = "authors";
        const PRIMARY_KEY: &'static [&'static str] = &["id"];

        fn fields() -> &'static [crate::FieldInfo] {
            static FIELDS: &[crate::FieldInfo] = &[crate::FieldInfo::new("id", "id").primary_key(true)];
            FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, crate::Value)> {
            vec![]
        }

        fn from_row(_row: &crate::Row) -> crate::Result<Self> {
            Ok(Author)
        }

        fn primary_key_value(&self) -> Vec<crate::Value> {
            vec![]
        }

        fn set_attribute(&mut self, _name: &str, _value: crate::Value) -> crate::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_to_records_target_entity() {
        static RELS: &[RelationshipInfo] =
            &[RelationshipInfo::to::<Author>("author", RelationshipKind::ManyToOne).local_key("author_id")];
        let rel = &RELS[0];
        assert_eq!(rel.related_table, "authors");
        assert_eq!(rel.target_entity(), Some(MappedEntity::of::<Author>()));
        assert!(
            RelationshipInfo::new("author", "authors", RelationshipKind::ManyToOne)
                .target_entity()
                .is_none()
        );
    }
}
