//! Nested loop join.
//!
//! For each tuple of the left child the right child is restarted and scanned in full;
//! pairs satisfying the predicate are emitted as the left fields followed by the right.

use crate::access::schema::Schema;
use crate::access::tuple::Tuple;
use crate::error::{DbError, DbResult};
use crate::executor::Executor;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Comparison applied between a left and a right field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEq,
    GreaterThan,
    GreaterThanOrEq,
}

impl CompareOp {
    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Equals => ordering == Ordering::Equal,
            CompareOp::NotEquals => ordering != Ordering::Equal,
            CompareOp::LessThan => ordering == Ordering::Less,
            CompareOp::LessThanOrEq => ordering != Ordering::Greater,
            CompareOp::GreaterThan => ordering == Ordering::Greater,
            CompareOp::GreaterThanOrEq => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Equals => "=",
            CompareOp::NotEquals => "<>",
            CompareOp::LessThan => "<",
            CompareOp::LessThanOrEq => "<=",
            CompareOp::GreaterThan => ">",
            CompareOp::GreaterThanOrEq => ">=",
        };
        f.write_str(symbol)
    }
}

/// `left[left_field] op right[right_field]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinPredicate {
    pub left_field: usize,
    pub op: CompareOp,
    pub right_field: usize,
}

impl JoinPredicate {
    pub fn new(left_field: usize, op: CompareOp, right_field: usize) -> Self {
        Self {
            left_field,
            op,
            right_field,
        }
    }

    pub fn matches(&self, left: &Tuple, right: &Tuple) -> bool {
        match (left.field(self.left_field), right.field(self.right_field)) {
            (Some(l), Some(r)) => self.op.holds(l.cmp(r)),
            _ => false,
        }
    }

    /// Both fields must exist and have the same type.
    fn check(&self, left: &Schema, right: &Schema) -> DbResult<()> {
        let left_type = left.field_type(self.left_field);
        let right_type = right.field_type(self.right_field);
        match (left_type, right_type) {
            (Some(l), Some(r)) if l == r => Ok(()),
            _ => Err(DbError::Executor(format!(
                "cannot compare left field {} ({:?}) with right field {} ({:?})",
                self.left_field, left_type, self.right_field, right_type
            ))),
        }
    }
}

/// Executor that performs a nested loop join
pub struct NestedLoopJoinExecutor {
    left_child: Box<dyn Executor>,
    right_child: Box<dyn Executor>,
    predicate: JoinPredicate,
    output_schema: Arc<Schema>,
    current_left_tuple: Option<Tuple>,
    initialized: bool,
}

impl NestedLoopJoinExecutor {
    pub fn new(
        left_child: Box<dyn Executor>,
        right_child: Box<dyn Executor>,
        predicate: JoinPredicate,
    ) -> DbResult<Self> {
        let left_schema = left_child.output_schema();
        let right_schema = right_child.output_schema();
        predicate.check(left_schema, right_schema)?;
        let output_schema = Arc::new(Schema::merge(left_schema, right_schema));
        Ok(Self {
            left_child,
            right_child,
            predicate,
            output_schema,
            current_left_tuple: None,
            initialized: false,
        })
    }

    pub fn predicate(&self) -> &JoinPredicate {
        &self.predicate
    }
}

impl Executor for NestedLoopJoinExecutor {
    fn init(&mut self) -> DbResult<()> {
        self.left_child.init()?;
        self.current_left_tuple = None;
        self.initialized = true;
        Ok(())
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        if !self.initialized {
            return Err(DbError::Executor(
                "join not initialized, call init() first".to_string(),
            ));
        }

        loop {
            let left = match self.current_left_tuple.take() {
                Some(left) => left,
                None => match self.left_child.next()? {
                    Some(left) => {
                        self.right_child.init()?;
                        left
                    }
                    None => return Ok(None),
                },
            };

            while let Some(right) = self.right_child.next()? {
                if self.predicate.matches(&left, &right) {
                    let joined = Tuple::merge(self.output_schema.clone(), &left, &right)?;
                    self.current_left_tuple = Some(left);
                    return Ok(Some(joined));
                }
            }
        }
    }

    fn output_schema(&self) -> &Arc<Schema> {
        &self.output_schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::schema::Column;
    use crate::access::value::{Field, FieldType};
    use crate::executor::collect;
    use crate::executor::tests::ValuesExecutor;

    fn people() -> DbResult<ValuesExecutor> {
        let schema = Schema::new(vec![
            Column::new("id", FieldType::Int),
            Column::new("name", FieldType::Str),
        ])?;
        ValuesExecutor::new(
            schema,
            vec![
                vec![Field::Int(1), Field::Str("ann".into())],
                vec![Field::Int(2), Field::Str("bo".into())],
                vec![Field::Int(3), Field::Str("cy".into())],
            ],
        )
    }

    fn orders() -> DbResult<ValuesExecutor> {
        let schema = Schema::new(vec![
            Column::new("person", FieldType::Int),
            Column::new("amount", FieldType::Int),
        ])?;
        ValuesExecutor::new(
            schema,
            vec![
                vec![Field::Int(1), Field::Int(10)],
                vec![Field::Int(3), Field::Int(30)],
                vec![Field::Int(1), Field::Int(11)],
            ],
        )
    }

    #[test]
    fn test_equi_join() -> DbResult<()> {
        let predicate = JoinPredicate::new(0, CompareOp::Equals, 0);
        let mut join =
            NestedLoopJoinExecutor::new(Box::new(people()?), Box::new(orders()?), predicate)?;

        let schema = join.output_schema().clone();
        assert_eq!(schema.num_fields(), 4);
        assert_eq!(schema.field_index("amount"), Some(3));

        let rows: Vec<String> = collect(&mut join)?.iter().map(|t| t.to_string()).collect();
        assert_eq!(rows, vec!["1\tann\t1\t10", "1\tann\t1\t11", "3\tcy\t3\t30"]);
        Ok(())
    }

    #[test]
    fn test_inequality_join() -> DbResult<()> {
        let predicate = JoinPredicate::new(0, CompareOp::GreaterThan, 0);
        let mut join =
            NestedLoopJoinExecutor::new(Box::new(people()?), Box::new(orders()?), predicate)?;
        // 2 > 1 twice, 3 > 1 twice.
        assert_eq!(collect(&mut join)?.len(), 4);
        // Rerunning the join gives the same rows.
        assert_eq!(collect(&mut join)?.len(), 4);
        Ok(())
    }

    #[test]
    fn test_empty_side() -> DbResult<()> {
        let empty = ValuesExecutor::new(Schema::from_types(&[FieldType::Int])?, vec![])?;
        let predicate = JoinPredicate::new(0, CompareOp::Equals, 0);
        let mut join =
            NestedLoopJoinExecutor::new(Box::new(people()?), Box::new(empty), predicate)?;
        assert!(collect(&mut join)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_rejects_mismatched_fields() -> DbResult<()> {
        // id is an int, name is a string.
        let predicate = JoinPredicate::new(0, CompareOp::Equals, 1);
        assert!(matches!(
            NestedLoopJoinExecutor::new(Box::new(orders()?), Box::new(people()?), predicate),
            Err(DbError::Executor(_))
        ));
        let predicate = JoinPredicate::new(5, CompareOp::Equals, 0);
        let join = NestedLoopJoinExecutor::new(Box::new(people()?), Box::new(orders()?), predicate);
        assert!(join.is_err());
        Ok(())
    }

    #[test]
    fn test_next_before_init() -> DbResult<()> {
        let predicate = JoinPredicate::new(0, CompareOp::Equals, 0);
        let mut join =
            NestedLoopJoinExecutor::new(Box::new(people()?), Box::new(orders()?), predicate)?;
        assert!(join.next().is_err());
        Ok(())
    }

    #[test]
    fn test_compare_ops() {
        assert!(CompareOp::LessThanOrEq.holds(Ordering::Equal));
        assert!(!CompareOp::LessThan.holds(Ordering::Equal));
        assert!(CompareOp::NotEquals.holds(Ordering::Less));
        assert_eq!(CompareOp::GreaterThanOrEq.to_string(), ">=");
    }
}
