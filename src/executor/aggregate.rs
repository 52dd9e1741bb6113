//! Grouped aggregation over a single column.
//!
//! The child is drained on `init()`. Integer columns support every function; string
//! columns can only be counted. Averages use integer division. Groups come out in
//! ascending key order, and an empty input yields no rows at all, grouped or not.

use crate::access::schema::{Column, Schema};
use crate::access::tuple::Tuple;
use crate::access::value::{Field, FieldType};
use crate::error::{DbError, DbResult};
use crate::executor::Executor;
use std::collections::{BTreeMap, VecDeque};
use std::str::FromStr;
use std::sync::Arc;

/// Supported aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }

    /// Whether the function applies to values of `field_type`.
    pub fn supports(&self, field_type: FieldType) -> bool {
        match field_type {
            FieldType::Int => true,
            FieldType::Str => *self == AggregateFunction::Count,
        }
    }
}

impl FromStr for AggregateFunction {
    type Err = DbError;

    fn from_str(s: &str) -> DbResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "count" => Ok(AggregateFunction::Count),
            "sum" => Ok(AggregateFunction::Sum),
            "avg" => Ok(AggregateFunction::Avg),
            "min" => Ok(AggregateFunction::Min),
            "max" => Ok(AggregateFunction::Max),
            other => Err(DbError::Executor(format!("unknown aggregate '{}'", other))),
        }
    }
}

/// Running state for one group
#[derive(Debug, Default)]
struct AggregateState {
    count: i64,
    sum: i64,
    min: Option<i32>,
    max: Option<i32>,
}

impl AggregateState {
    fn update(&mut self, value: &Field) {
        self.count += 1;
        if let Field::Int(n) = value {
            self.sum += i64::from(*n);
            self.min = Some(self.min.map_or(*n, |m| m.min(*n)));
            self.max = Some(self.max.map_or(*n, |m| m.max(*n)));
        }
    }

    fn finalize(&self, function: AggregateFunction) -> DbResult<i32> {
        let value = match function {
            AggregateFunction::Count => self.count,
            AggregateFunction::Sum => self.sum,
            AggregateFunction::Avg => self.sum / self.count.max(1),
            AggregateFunction::Min => self.min.map_or(0, i64::from),
            AggregateFunction::Max => self.max.map_or(0, i64::from),
        };
        i32::try_from(value).map_err(|_| {
            DbError::Executor(format!("{} result {} overflows an int", function.name(), value))
        })
    }
}

/// Computes one aggregate over `aggregate_field`, optionally per value of `group_by`
pub struct AggregateExecutor {
    child: Box<dyn Executor>,
    group_by: Option<usize>,
    aggregate_field: usize,
    function: AggregateFunction,
    output_schema: Arc<Schema>,
    results: VecDeque<Tuple>,
    initialized: bool,
}

impl AggregateExecutor {
    pub fn new(
        child: Box<dyn Executor>,
        group_by: Option<usize>,
        aggregate_field: usize,
        function: AggregateFunction,
    ) -> DbResult<Self> {
        let input = child.output_schema();
        let column = input.columns().get(aggregate_field).ok_or_else(|| {
            DbError::Executor(format!("no field {} to aggregate", aggregate_field))
        })?;
        if !function.supports(column.field_type) {
            return Err(DbError::Executor(format!(
                "{} is not supported on {} fields",
                function.name(),
                column.field_type
            )));
        }

        let mut columns = Vec::with_capacity(2);
        if let Some(index) = group_by {
            let group_column = input.columns().get(index).ok_or_else(|| {
                DbError::Executor(format!("no field {} to group by", index))
            })?;
            columns.push(group_column.clone());
        }
        columns.push(Column::new(
            format!("{}({})", function.name(), column.name),
            FieldType::Int,
        ));
        let output_schema = Arc::new(Schema::new(columns)?);

        Ok(Self {
            child,
            group_by,
            aggregate_field,
            function,
            output_schema,
            results: VecDeque::new(),
            initialized: false,
        })
    }

    pub fn function(&self) -> AggregateFunction {
        self.function
    }

    fn output_row(&self, key: Option<Field>, state: &AggregateState) -> DbResult<Tuple> {
        let mut fields: Vec<Field> = key.into_iter().collect();
        fields.push(Field::Int(state.finalize(self.function)?));
        Tuple::new(self.output_schema.clone(), fields)
    }
}

impl Executor for AggregateExecutor {
    fn init(&mut self) -> DbResult<()> {
        self.child.init()?;

        let mut groups: BTreeMap<Option<Field>, AggregateState> = BTreeMap::new();
        while let Some(tuple) = self.child.next()? {
            let key = match self.group_by {
                Some(index) => tuple.field(index).cloned(),
                None => None,
            };
            if let Some(value) = tuple.field(self.aggregate_field) {
                groups.entry(key).or_default().update(value);
            }
        }

        self.results = groups
            .iter()
            .map(|(key, state)| self.output_row(key.clone(), state))
            .collect::<DbResult<VecDeque<_>>>()?;
        self.initialized = true;
        Ok(())
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        if !self.initialized {
            return Err(DbError::Executor(
                "aggregate not initialized, call init() first".to_string(),
            ));
        }
        Ok(self.results.pop_front())
    }

    fn output_schema(&self) -> &Arc<Schema> {
        &self.output_schema
    }
}
