//! Domain metadata consumed by the query tree.
//!
//! The tree never owns entity mappings; it only asks this module what type an
//! attribute has and how two types relate. `ExpressibleType` is the minimal
//! capability every typed node carries, and `DomainCatalog` resolves entity
//! and attribute names into those types for the builder.

use std::fmt;

use ecow::EcoString;
use iddqd::{IdHashItem, IdHashMap, id_upcast};

/// Broad family of an expressible type. Comparability is decided per family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Numeric,
    String,
    Boolean,
    Temporal,
    Binary,
    /// An entity valued type, comparable within its mapped hierarchy.
    Entity { hierarchy: EcoString },
    /// The identifier type of an entity hierarchy.
    Identifier {
        hierarchy: EcoString,
        underlying: Box<ExpressibleType>,
    },
    /// A plural (collection valued) attribute type.
    Collection { element: Box<ExpressibleType> },
}

/// The type of an expression as far as the tree is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpressibleType {
    pub name: EcoString,
    pub kind: TypeKind,
}

impl ExpressibleType {
    pub fn new(name: impl Into<EcoString>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn integer() -> Self {
        Self::new("integer", TypeKind::Numeric)
    }

    pub fn long() -> Self {
        Self::new("long", TypeKind::Numeric)
    }

    pub fn double() -> Self {
        Self::new("double", TypeKind::Numeric)
    }

    pub fn big_decimal() -> Self {
        Self::new("big_decimal", TypeKind::Numeric)
    }

    pub fn string() -> Self {
        Self::new("string", TypeKind::String)
    }

    pub fn character() -> Self {
        Self::new("character", TypeKind::String)
    }

    pub fn boolean() -> Self {
        Self::new("boolean", TypeKind::Boolean)
    }

    pub fn date() -> Self {
        Self::new("date", TypeKind::Temporal)
    }

    pub fn timestamp() -> Self {
        Self::new("timestamp", TypeKind::Temporal)
    }

    pub fn binary() -> Self {
        Self::new("binary", TypeKind::Binary)
    }

    pub fn entity(name: impl Into<EcoString>, hierarchy: impl Into<EcoString>) -> Self {
        Self::new(
            name,
            TypeKind::Entity {
                hierarchy: hierarchy.into(),
            },
        )
    }

    pub fn identifier(hierarchy: impl Into<EcoString>, underlying: ExpressibleType) -> Self {
        let hierarchy = hierarchy.into();
        Self::new(
            underlying.name.clone(),
            TypeKind::Identifier {
                hierarchy,
                underlying: Box::new(underlying),
            },
        )
    }

    pub fn collection(element: ExpressibleType) -> Self {
        let name = EcoString::from(format!("collection<{}>", element.name));
        Self::new(
            name,
            TypeKind::Collection {
                element: Box::new(element),
            },
        )
    }

    pub fn is_numeric(&self) -> bool {
        match &self.kind {
            TypeKind::Numeric => true,
            TypeKind::Identifier { underlying, .. } => underlying.is_numeric(),
            _ => false,
        }
    }

    pub fn is_string_like(&self) -> bool {
        match &self.kind {
            TypeKind::String => true,
            TypeKind::Identifier { underlying, .. } => underlying.is_string_like(),
            _ => false,
        }
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self.kind, TypeKind::Boolean)
    }

    pub fn is_plural(&self) -> bool {
        matches!(self.kind, TypeKind::Collection { .. })
    }

    /// Element type of a plural type, `None` for singular types.
    pub fn element_type(&self) -> Option<&ExpressibleType> {
        match &self.kind {
            TypeKind::Collection { element } => Some(element),
            _ => None,
        }
    }

    /// Entity hierarchy for entity and identifier types.
    pub fn hierarchy(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::Entity { hierarchy } | TypeKind::Identifier { hierarchy, .. } => {
                Some(hierarchy.as_str())
            }
            _ => None,
        }
    }
}

impl fmt::Display for ExpressibleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// How an attribute is mapped on its owning entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeKind {
    Basic(ExpressibleType),
    /// Single valued association to another entity.
    ToOne { target: EcoString },
    /// Collection of basic values.
    ElementCollection(ExpressibleType),
    /// Collection valued association to another entity.
    ToMany { target: EcoString },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMetadata {
    pub name: EcoString,
    pub kind: AttributeKind,
    /// Whether this attribute is the identifier of its entity
    pub is_id: bool,
}

impl IdHashItem for AttributeMetadata {
    type Key<'a> = &'a str;

    fn key(&self) -> Self::Key<'_> {
        self.name.as_str()
    }

    id_upcast!();
}

/// Metadata about a mapped entity.
#[derive(Debug, Clone)]
pub struct EntityMetadata {
    pub name: EcoString,
    /// Name of the root entity of the inheritance hierarchy
    pub hierarchy: EcoString,
    pub attributes: IdHashMap<AttributeMetadata>,
}

impl EntityMetadata {
    /// A hierarchy root.
    pub fn new(name: impl Into<EcoString>) -> Self {
        let name = name.into();
        Self {
            hierarchy: name.clone(),
            name,
            attributes: IdHashMap::new(),
        }
    }

    /// A subclass mapped within `hierarchy`.
    pub fn subclass(name: impl Into<EcoString>, hierarchy: impl Into<EcoString>) -> Self {
        Self {
            name: name.into(),
            hierarchy: hierarchy.into(),
            attributes: IdHashMap::new(),
        }
    }

    pub fn id(self, name: impl Into<EcoString>, id_type: ExpressibleType) -> Self {
        self.attribute(name, AttributeKind::Basic(id_type), true)
    }

    pub fn basic(self, name: impl Into<EcoString>, basic_type: ExpressibleType) -> Self {
        self.attribute(name, AttributeKind::Basic(basic_type), false)
    }

    pub fn to_one(self, name: impl Into<EcoString>, target: impl Into<EcoString>) -> Self {
        let target = target.into();
        self.attribute(name, AttributeKind::ToOne { target }, false)
    }

    pub fn element_collection(self, name: impl Into<EcoString>, element: ExpressibleType) -> Self {
        self.attribute(name, AttributeKind::ElementCollection(element), false)
    }

    pub fn to_many(self, name: impl Into<EcoString>, target: impl Into<EcoString>) -> Self {
        let target = target.into();
        self.attribute(name, AttributeKind::ToMany { target }, false)
    }

    fn attribute(mut self, name: impl Into<EcoString>, kind: AttributeKind, is_id: bool) -> Self {
        self.attributes.insert_overwrite(AttributeMetadata {
            name: name.into(),
            kind,
            is_id,
        });
        self
    }

    pub fn entity_type(&self) -> ExpressibleType {
        ExpressibleType::entity(self.name.clone(), self.hierarchy.clone())
    }

    pub fn id_attribute(&self) -> Option<&AttributeMetadata> {
        self.attributes.iter().find(|a| a.is_id)
    }
}

impl IdHashItem for EntityMetadata {
    type Key<'a> = &'a str;

    fn key(&self) -> Self::Key<'_> {
        self.name.as_str()
    }

    id_upcast!();
}

/// Resolved facts about one attribute reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAttribute {
    pub attribute_type: ExpressibleType,
    /// Entity reached by navigating this attribute, for associations
    pub target_entity: Option<EcoString>,
    pub plural: bool,
}

/// The set of mapped entities available to a builder.
#[derive(Debug, Clone, Default)]
pub struct DomainCatalog {
    entities: IdHashMap<EntityMetadata>,
}

impl DomainCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity: EntityMetadata) -> Self {
        self.entity_add(entity);
        self
    }

    pub fn entity_add(&mut self, entity: EntityMetadata) {
        self.entities.insert_overwrite(entity);
    }

    pub fn entity(&self, name: &str) -> Option<&EntityMetadata> {
        self.entities.get(name)
    }

    /// Resolve `entity.attribute` into its expressible type.
    ///
    /// Attributes a subclass does not declare are looked up on its hierarchy
    /// root. Returns `None` when either name is unknown, or when an
    /// association points at an entity missing from the catalog.
    pub fn attribute_resolve(&self, entity: &str, attribute: &str) -> Option<ResolvedAttribute> {
        let metadata = self.entities.get(entity)?;
        let attr = match metadata.attributes.get(attribute) {
            Some(attr) => attr,
            None if metadata.hierarchy != metadata.name => self
                .entities
                .get(metadata.hierarchy.as_str())?
                .attributes
                .get(attribute)?,
            None => return None,
        };

        let resolved = match &attr.kind {
            AttributeKind::Basic(basic) if attr.is_id => ResolvedAttribute {
                attribute_type: ExpressibleType::identifier(
                    metadata.hierarchy.clone(),
                    basic.clone(),
                ),
                target_entity: None,
                plural: false,
            },
            AttributeKind::Basic(basic) => ResolvedAttribute {
                attribute_type: basic.clone(),
                target_entity: None,
                plural: false,
            },
            AttributeKind::ToOne { target } => ResolvedAttribute {
                attribute_type: self.entities.get(target.as_str())?.entity_type(),
                target_entity: Some(target.clone()),
                plural: false,
            },
            AttributeKind::ElementCollection(element) => ResolvedAttribute {
                attribute_type: ExpressibleType::collection(element.clone()),
                target_entity: None,
                plural: true,
            },
            AttributeKind::ToMany { target } => {
                let element = self.entities.get(target.as_str())?.entity_type();
                ResolvedAttribute {
                    attribute_type: ExpressibleType::collection(element),
                    target_entity: Some(target.clone()),
                    plural: true,
                }
            }
        };

        Some(resolved)
    }
}
