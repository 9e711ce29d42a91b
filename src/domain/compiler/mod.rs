//! Grammar compiler: claim text in, typed condition/boolean-expression tree
//! out, plus the serializer sharing the same grammar.

pub mod compile;
pub mod condition;
pub mod duration;
pub mod expression;
pub mod serializer;

pub use compile::{Compiler, RawCondition, RawExpressions, RawPrediction};
pub use condition::{parse_condition, parse_operand};
pub use duration::parse_duration;
pub use expression::parse_bool_expr;
pub use serializer::{serialize_bool_expr, serialize_condition, serialize_operand};
