use filters::{Conjunction, CrossFilter, FilterNode};

use crate::config::WhereItem;
use crate::QueryError;

use super::filtering::validate_against;
use super::QueryBuilder;

impl QueryBuilder {
    /// Rewrite a filter tree into this builder's WHERE stream.
    ///
    /// A top-level AND group contributes each child as a separate AND
    /// condition; a top-level OR group becomes a single parenthesized
    /// group. Mixed nesting produces nested group markers, so the rendered
    /// SQL carries explicit parentheses and no spurious conjunctions.
    pub fn apply_cross_filters(mut self, filter: &CrossFilter) -> Result<Self, QueryError> {
        let FilterNode::Group { operator, children } = filter.root() else {
            return Ok(self);
        };

        if !children.is_empty() {
            match operator {
                Conjunction::And => {
                    for child in &children {
                        self.append_node(child, Conjunction::And)?;
                    }
                }
                Conjunction::Or => {
                    self.push_where(WhereItem::GroupStart {
                        conjunction: Conjunction::And,
                    });
                    for child in &children {
                        self.append_node(child, Conjunction::Or)?;
                    }
                    self.push_where(WhereItem::GroupEnd);
                }
            }
        }

        if let Some(hint) = filter.top_n_hint() {
            self = self.top_n(&hint.column, hint.n, hint.direction);
        }
        Ok(self)
    }

    /// Append one tree node, joined to its predecessor by `conjunction`.
    fn append_node(&mut self, node: &FilterNode, conjunction: Conjunction) -> Result<(), QueryError> {
        match node {
            FilterNode::Condition(condition) => {
                let mut condition = condition.clone();
                condition.conjunction = conjunction;
                validate_against(&self.shared, &self.visible_tables(), &mut condition)?;
                self.push_where(WhereItem::Condition(condition));
            }
            FilterNode::Group { children, .. } if children.is_empty() => (),
            FilterNode::Group { operator, children } => {
                self.push_where(WhereItem::GroupStart { conjunction });
                for child in children {
                    self.append_node(child, *operator)?;
                }
                self.push_where(WhereItem::GroupEnd);
            }
        }
        Ok(())
    }
}
