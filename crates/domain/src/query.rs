use recordgate_core::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output name under which every sub-plan projects its entity id.
pub const ID_OUTPUT: &str = "id";

/// A literal value embeddable into a compiled query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryValue {
    /// UTF-8 text literal.
    Text(String),
    /// Signed integer literal.
    Integer(i64),
    /// Boolean literal.
    Boolean(bool),
}

impl QueryValue {
    /// Converts a JSON field value into an embeddable literal.
    ///
    /// Empty or whitespace-only strings, fractional numbers, nulls, arrays
    /// and objects are not usable as match values.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) if !text.trim().is_empty() => Some(Self::Text(text.clone())),
            Value::Number(number) => number.as_i64().map(Self::Integer),
            Value::Bool(flag) => Some(Self::Boolean(*flag)),
            _ => None,
        }
    }

    /// Returns the literal as a JSON value.
    #[must_use]
    pub fn as_json(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Integer(number) => Value::from(*number),
            Self::Boolean(flag) => Value::Bool(*flag),
        }
    }
}

/// A column addressed through its sub-plan or attachment alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifiedColumn {
    /// Alias of the table or sub-plan carrying the column.
    pub table_alias: String,
    /// Column or projected output name.
    pub column: String,
}

impl QualifiedColumn {
    /// Creates a qualified column reference.
    #[must_use]
    pub fn new(table_alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table_alias: table_alias.into(),
            column: column.into(),
        }
    }
}

/// One node of a compiled AND/OR condition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanCondition {
    /// Column equals a literal value.
    Equals {
        /// Column compared.
        column: QualifiedColumn,
        /// Expected literal.
        value: QueryValue,
    },
    /// Column differs from a literal value.
    NotEquals {
        /// Column compared.
        column: QualifiedColumn,
        /// Rejected literal.
        value: QueryValue,
    },
    /// Column carries a non-null value.
    IsNotNull {
        /// Column tested.
        column: QualifiedColumn,
    },
    /// Two columns carry equal non-null values.
    ColumnsEqual {
        /// Left-hand column.
        left: QualifiedColumn,
        /// Right-hand column.
        right: QualifiedColumn,
    },
    /// Every child condition must hold.
    All(Vec<PlanCondition>),
    /// At least one child condition must hold.
    Any(Vec<PlanCondition>),
}

impl PlanCondition {
    /// Creates an equality condition.
    #[must_use]
    pub fn equals(column: QualifiedColumn, value: QueryValue) -> Self {
        Self::Equals { column, value }
    }

    /// Creates an inequality condition.
    #[must_use]
    pub fn not_equals(column: QualifiedColumn, value: QueryValue) -> Self {
        Self::NotEquals { column, value }
    }

    /// Creates a non-null condition.
    #[must_use]
    pub fn is_not_null(column: QualifiedColumn) -> Self {
        Self::IsNotNull { column }
    }

    /// Creates a column-to-column equality condition.
    #[must_use]
    pub fn columns_equal(left: QualifiedColumn, right: QualifiedColumn) -> Self {
        Self::ColumnsEqual { left, right }
    }
}

/// A dedicated field table attached to a sub-plan's base table.
///
/// Attachments join on the engine-wide `entity_id` linking column and are
/// outer joins: a row without a value in the attached table survives with
/// null columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableAttachment {
    /// Physical table name.
    pub table: String,
    /// Alias the attachment's columns are addressed through.
    pub alias: String,
}

/// One projected output column of a sub-plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedColumn {
    /// Source column within the sub-plan's table namespace.
    pub source: QualifiedColumn,
    /// Output name the column is projected under.
    pub output_name: String,
}

/// A per-scope scan over one entity kind's storage.
///
/// The sub-plan projects its entity id as [`ID_OUTPUT`] plus one aliased
/// output per correspondence, de-duplicated by grouping over every emitted
/// column so multi-valued source fields collapse before any join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySubPlan {
    /// Alias of the sub-plan in the enclosing query.
    pub alias: String,
    /// Base (data) table of the entity kind.
    pub base_table: String,
    /// Identity column on the base table.
    pub id_column: String,
    /// Dedicated field tables attached to the base table.
    pub attachments: Vec<TableAttachment>,
    /// Conditions combined with AND.
    pub conditions: Vec<PlanCondition>,
    /// Projected correspondence columns, besides the id.
    pub columns: Vec<ProjectedColumn>,
}

impl EntitySubPlan {
    /// Returns every output name the sub-plan emits, id first.
    #[must_use]
    pub fn output_names(&self) -> Vec<&str> {
        let mut names = vec![ID_OUTPUT];
        names.extend(self.columns.iter().map(|column| column.output_name.as_str()));
        names
    }
}

/// A sub-plan outer-joined into a match query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedSubPlan {
    /// The joined sub-plan.
    pub plan: EntitySubPlan,
    /// Join condition referencing projected outputs of both sides.
    pub on: PlanCondition,
}

/// Set Mode output: a join-based plan yielding matching
/// (grant, subject, target) rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantMatchQuery {
    /// Grant-record sub-plan.
    pub grant: EntitySubPlan,
    /// Subject sub-plan, when subject identities are joined.
    pub subject: Option<JoinedSubPlan>,
    /// Target sub-plan, when target identities are joined.
    pub target: Option<JoinedSubPlan>,
}

impl GrantMatchQuery {
    /// Returns whether subject identities appear in result rows.
    #[must_use]
    pub fn includes_subject_ids(&self) -> bool {
        self.subject.is_some()
    }

    /// Returns whether target identities appear in result rows.
    #[must_use]
    pub fn includes_target_ids(&self) -> bool {
        self.target.is_some()
    }
}

/// Point Mode output: a single-scan existence query over grant storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantScanQuery {
    /// Grant-record sub-plan with embedded literal match conditions.
    pub grant: EntitySubPlan,
    /// Optional row limit.
    pub limit: Option<u64>,
}

impl GrantScanQuery {
    /// Returns a copy limited to the given number of rows.
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One row produced by executing a [`GrantMatchQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantMatchRow {
    /// Matching grant-record identity.
    pub grant_id: EntityId,
    /// Matching subject identity, when joined and matched.
    pub subject_id: Option<EntityId>,
    /// Matching target identity, when joined and matched.
    pub target_id: Option<EntityId>,
}
