//! Predicate-building sugar.
//!
//! [`attr`] starts a field path; comparison methods on [`FieldPath`] produce
//! predicate leaves; `&`, `|` and `!` combine predicates; `asc`/`desc` turn
//! a path into an ordering term.
//!
//! ```
//! use facetdb::attr;
//!
//! let p = attr("kind").eq("click") & !attr("time").le(2);
//! let by_age = attr("dog").then("age").asc();
//! # let _ = (p, by_age);
//! ```

use super::{CmpOp, Direction, Expr, FieldPath, OrderTerm};
use facetdb_value::Value;
use std::ops::{BitAnd, BitOr, Not};

/// Start a field path at a root attribute.
pub fn attr(name: impl Into<String>) -> FieldPath {
    FieldPath::new(name)
}

impl FieldPath {
    /// Extend the path one attribute deeper.
    pub fn then(mut self, name: impl Into<String>) -> Self {
        self.push(name.into());
        self
    }

    pub fn eq(self, value: impl Into<Value>) -> Expr {
        self.cmp(CmpOp::Eq, value)
    }

    pub fn ne(self, value: impl Into<Value>) -> Expr {
        self.cmp(CmpOp::Ne, value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Expr {
        self.cmp(CmpOp::Lt, value)
    }

    pub fn le(self, value: impl Into<Value>) -> Expr {
        self.cmp(CmpOp::Le, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Expr {
        self.cmp(CmpOp::Gt, value)
    }

    pub fn ge(self, value: impl Into<Value>) -> Expr {
        self.cmp(CmpOp::Ge, value)
    }

    /// True when the attribute's value equals any element of `values`.
    pub fn one_of<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::OneOf {
            path: self,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn asc(self) -> OrderTerm {
        OrderTerm {
            path: self,
            direction: Direction::Asc,
        }
    }

    pub fn desc(self) -> OrderTerm {
        OrderTerm {
            path: self,
            direction: Direction::Desc,
        }
    }

    fn cmp(self, op: CmpOp, value: impl Into<Value>) -> Expr {
        Expr::Cmp {
            path: self,
            op,
            value: value.into(),
        }
    }
}

impl BitAnd for Expr {
    type Output = Expr;

    fn bitand(self, rhs: Expr) -> Expr {
        self.and(rhs)
    }
}

impl BitOr for Expr {
    type Output = Expr;

    fn bitor(self, rhs: Expr) -> Expr {
        self.or(rhs)
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}
