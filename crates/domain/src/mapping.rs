use serde::{Deserialize, Serialize};

/// Scope a field correspondence belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingScope {
    /// The grant-record side of a correspondence.
    GrantRecord,
    /// The subject side of a correspondence.
    Subject,
    /// The target side of a correspondence.
    Target,
}

impl MappingScope {
    /// Returns the stable alias prefix for projected columns of this scope.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GrantRecord => "grant",
            Self::Subject => "subject",
            Self::Target => "target",
        }
    }
}

/// Column-level linkage between a grant-record field and one scope.
///
/// `mapped_name` is the join key: correspondences of different scopes match
/// when their mapped names are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCorrespondence {
    /// Scope the column belongs to.
    pub scope: MappingScope,
    /// Physical table carrying the column.
    pub table: String,
    /// Physical column name.
    pub column: String,
    /// Property name within the field's storage shape.
    pub property: String,
    /// Disambiguated join-key name shared across scopes.
    pub mapped_name: String,
}

impl FieldCorrespondence {
    /// Returns the projected output alias for this correspondence.
    #[must_use]
    pub fn output_alias(&self) -> String {
        format!("{}__{}", self.scope.as_str(), self.mapped_name)
    }
}

/// All correspondences resolved for one grant-record field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    grant_field: String,
    correspondences: Vec<FieldCorrespondence>,
}

impl FieldMapping {
    /// Creates a mapping for one grant-record field.
    #[must_use]
    pub fn new(grant_field: impl Into<String>, correspondences: Vec<FieldCorrespondence>) -> Self {
        Self {
            grant_field: grant_field.into(),
            correspondences,
        }
    }

    /// Returns the grant-record field name.
    #[must_use]
    pub fn grant_field(&self) -> &str {
        self.grant_field.as_str()
    }

    /// Returns every correspondence of the mapping.
    #[must_use]
    pub fn correspondences(&self) -> &[FieldCorrespondence] {
        self.correspondences.as_slice()
    }

    /// Returns the correspondences belonging to one scope.
    pub fn for_scope(&self, scope: MappingScope) -> impl Iterator<Item = &FieldCorrespondence> {
        self.correspondences
            .iter()
            .filter(move |correspondence| correspondence.scope == scope)
    }

    /// Returns `(grant correspondence, scope correspondence)` pairs sharing a
    /// mapped name between the grant-record scope and the given scope.
    #[must_use]
    pub fn shared_pairs(
        &self,
        scope: MappingScope,
    ) -> Vec<(&FieldCorrespondence, &FieldCorrespondence)> {
        self.for_scope(MappingScope::GrantRecord)
            .filter_map(|grant_side| {
                self.for_scope(scope)
                    .find(|candidate| candidate.mapped_name == grant_side.mapped_name)
                    .map(|scope_side| (grant_side, scope_side))
            })
            .collect()
    }
}
