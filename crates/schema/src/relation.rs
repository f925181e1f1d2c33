/// JoinKind enumerates the join types the formatter renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Full => "FULL",
        }
    }
}

/// One hop of a named relation: join `table` on `left = right`.
/// Column references are canonical (`table.column`) so a relation can be
/// applied from any builder without re-qualification.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RelationStep {
    pub table: String,
    pub left: String,
    pub right: String,
    #[serde(default = "RelationStep::default_kind")]
    pub kind: JoinKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl RelationStep {
    fn default_kind() -> JoinKind {
        JoinKind::Inner
    }
}

/// Relation is a named single or chained join path registered on a Schema
/// and resolved by the builder's `with_relation`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Relation {
    pub steps: Vec<RelationStep>,
}

impl Relation {
    /// A single-hop relation.
    pub fn single(table: &str, left: &str, right: &str) -> Relation {
        Relation {
            steps: vec![RelationStep {
                table: table.to_string(),
                left: left.to_string(),
                right: right.to_string(),
                kind: JoinKind::Inner,
                alias: None,
            }],
        }
    }

    pub fn chained(steps: Vec<RelationStep>) -> Relation {
        Relation { steps }
    }
}
