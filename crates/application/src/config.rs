use recordgate_core::{AppError, AppResult, EntityId, EntityTypeId};

/// Settings describing the principal (user-like) entity kind.
///
/// Membership of the anonymous and authenticated pseudo-roles is not stored
/// on principal entities; the compilers synthesize it from the subject's
/// identity against `anonymous_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalSettings {
    entity_type: EntityTypeId,
    roles_field: String,
    anonymous_id: EntityId,
    anonymous_role: String,
    authenticated_role: String,
}

impl PrincipalSettings {
    /// Creates validated principal settings.
    pub fn new(
        entity_type: EntityTypeId,
        roles_field: impl Into<String>,
        anonymous_id: EntityId,
        anonymous_role: impl Into<String>,
        authenticated_role: impl Into<String>,
    ) -> AppResult<Self> {
        let roles_field = roles_field.into();
        let anonymous_role = anonymous_role.into();
        let authenticated_role = authenticated_role.into();

        if roles_field.trim().is_empty() {
            return Err(AppError::Validation(
                "principal roles field must not be empty".to_owned(),
            ));
        }

        if anonymous_role.trim().is_empty() || authenticated_role.trim().is_empty() {
            return Err(AppError::Validation(
                "pseudo-role names must not be empty".to_owned(),
            ));
        }

        if anonymous_role == authenticated_role {
            return Err(AppError::Validation(
                "anonymous and authenticated pseudo-roles must differ".to_owned(),
            ));
        }

        Ok(Self {
            entity_type,
            roles_field,
            anonymous_id,
            anonymous_role,
            authenticated_role,
        })
    }

    /// Returns the principal entity kind.
    #[must_use]
    pub fn entity_type(&self) -> &EntityTypeId {
        &self.entity_type
    }

    /// Returns the field carrying stored role values on principals.
    #[must_use]
    pub fn roles_field(&self) -> &str {
        self.roles_field.as_str()
    }

    /// Returns the identity of the anonymous principal.
    #[must_use]
    pub fn anonymous_id(&self) -> &EntityId {
        &self.anonymous_id
    }

    /// Returns the anonymous pseudo-role value.
    #[must_use]
    pub fn anonymous_role(&self) -> &str {
        self.anonymous_role.as_str()
    }

    /// Returns the authenticated pseudo-role value.
    #[must_use]
    pub fn authenticated_role(&self) -> &str {
        self.authenticated_role.as_str()
    }

    /// Returns the pseudo-role synthesized for a concrete principal id.
    #[must_use]
    pub fn synthesized_role(&self, principal_id: &EntityId) -> &str {
        if principal_id == &self.anonymous_id {
            self.anonymous_role.as_str()
        } else {
            self.authenticated_role.as_str()
        }
    }
}

/// Engine-wide configuration injected into resolver and compilers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    grant_entity_type: EntityTypeId,
    principal: PrincipalSettings,
}

impl EngineConfig {
    /// Creates the engine configuration.
    #[must_use]
    pub fn new(grant_entity_type: EntityTypeId, principal: PrincipalSettings) -> Self {
        Self {
            grant_entity_type,
            principal,
        }
    }

    /// Returns the grant-record entity kind.
    #[must_use]
    pub fn grant_entity_type(&self) -> &EntityTypeId {
        &self.grant_entity_type
    }

    /// Returns the principal settings.
    #[must_use]
    pub fn principal(&self) -> &PrincipalSettings {
        &self.principal
    }
}
