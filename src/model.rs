//! Backend-neutral constraint model.
//!
//! The constraint builders describe the problem with [`CpModel`]: boolean and
//! bounded integer variables, linear constraints that may be reified on a
//! literal, absolute-value equalities, advisory hints and a linear objective.
//! A [`SolverBackend`](crate::backend::SolverBackend) turns the model into a
//! concrete engine call.

use std::ops::Not;

/// Index of a model variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A 0/1 variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoolVar(VarId);

impl BoolVar {
    pub fn id(self) -> VarId {
        self.0
    }
}

impl Not for BoolVar {
    type Output = Literal;

    fn not(self) -> Literal {
        !Literal::from(self)
    }
}

/// A bounded integer variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntVar(VarId);

impl IntVar {
    pub fn id(self) -> VarId {
        self.0
    }
}

impl From<BoolVar> for VarId {
    fn from(var: BoolVar) -> Self {
        var.0
    }
}

impl From<IntVar> for VarId {
    fn from(var: IntVar) -> Self {
        var.0
    }
}

/// A boolean variable or its negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Literal {
    var: BoolVar,
    negated: bool,
}

impl Literal {
    pub fn var(self) -> BoolVar {
        self.var
    }

    pub fn is_negated(self) -> bool {
        self.negated
    }

    /// Truth value under `values`.
    pub fn evaluate(self, values: &[i64]) -> bool {
        (values[self.var.0 .0] != 0) != self.negated
    }
}

impl From<BoolVar> for Literal {
    fn from(var: BoolVar) -> Self {
        Self {
            var,
            negated: false,
        }
    }
}

impl Not for Literal {
    type Output = Literal;

    fn not(self) -> Literal {
        Literal {
            var: self.var,
            negated: !self.negated,
        }
    }
}

/// `Σ coef·var + constant`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearExpr {
    terms: Vec<(VarId, i64)>,
    constant: i64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(value: i64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    /// Sum of variables with coefficient 1.
    pub fn sum<V: Into<VarId>>(vars: impl IntoIterator<Item = V>) -> Self {
        Self {
            terms: vars.into_iter().map(|v| (v.into(), 1)).collect(),
            constant: 0,
        }
    }

    /// Adds `coef·var`; zero coefficients are dropped.
    pub fn term(mut self, var: impl Into<VarId>, coef: i64) -> Self {
        self.push(var, coef);
        self
    }

    pub fn push(&mut self, var: impl Into<VarId>, coef: i64) {
        if coef != 0 {
            self.terms.push((var.into(), coef));
        }
    }

    /// Adds `coef·lit`, where a negated literal contributes `coef·(1 − var)`.
    pub fn literal(mut self, lit: Literal, coef: i64) -> Self {
        if lit.negated {
            self.constant += coef;
            self.push(lit.var, -coef);
        } else {
            self.push(lit.var, coef);
        }
        self
    }

    pub fn offset(mut self, value: i64) -> Self {
        self.constant += value;
        self
    }

    /// Appends `coef·other`.
    pub fn add_scaled(mut self, other: &LinearExpr, coef: i64) -> Self {
        for &(var, c) in &other.terms {
            self.push(var, c * coef);
        }
        self.constant += other.constant * coef;
        self
    }

    pub fn terms(&self) -> &[(VarId, i64)] {
        &self.terms
    }

    pub fn constant_term(&self) -> i64 {
        self.constant
    }

    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn evaluate(&self, values: &[i64]) -> i64 {
        self.terms
            .iter()
            .map(|&(var, coef)| coef * values[var.0])
            .sum::<i64>()
            + self.constant
    }
}

/// What a constraint requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintKind {
    /// `lower ≤ expr ≤ upper`, each bound optional.
    Linear {
        expr: LinearExpr,
        lower: Option<i64>,
        upper: Option<i64>,
    },
    /// `target == |expr|`.
    AbsEquality { target: IntVar, expr: LinearExpr },
}

/// A constraint, optionally enforced only when a literal holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub enforcement: Option<Literal>,
}

impl Constraint {
    /// Enforces the constraint only when `lit` is true.
    pub fn only_enforce_if(&mut self, lit: impl Into<Literal>) -> &mut Self {
        self.enforcement = Some(lit.into());
        self
    }

    /// Whether `values` satisfy the constraint (vacuously so when not enforced).
    pub fn is_satisfied_by(&self, values: &[i64]) -> bool {
        if let Some(lit) = self.enforcement {
            if !lit.evaluate(values) {
                return true;
            }
        }
        match &self.kind {
            ConstraintKind::Linear { expr, lower, upper } => {
                let value = expr.evaluate(values);
                lower.map_or(true, |l| value >= l) && upper.map_or(true, |u| value <= u)
            }
            ConstraintKind::AbsEquality { target, expr } => {
                values[target.0 .0] == expr.evaluate(values).abs()
            }
        }
    }
}

/// Declared variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarInfo {
    pub name: String,
    pub lower: i64,
    pub upper: i64,
    pub is_bool: bool,
}

/// A complete constraint model.
///
/// ```
/// use shift_scheduling::model::{CpModel, LinearExpr};
///
/// let mut model = CpModel::new("example");
/// let a = model.new_bool_var("a");
/// let b = model.new_bool_var("b");
/// model.add_eq(LinearExpr::sum([a, b]), 1);
///
/// assert!(model.is_satisfied_by(&[1, 0]));
/// assert!(!model.is_satisfied_by(&[1, 1]));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CpModel {
    name: String,
    vars: Vec<VarInfo>,
    constraints: Vec<Constraint>,
    hints: Vec<(VarId, i64)>,
    objective: Option<LinearExpr>,
}

impl CpModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn new_bool_var(&mut self, name: impl Into<String>) -> BoolVar {
        BoolVar(self.push_var(name.into(), 0, 1, true))
    }

    pub fn new_int_var(&mut self, lower: i64, upper: i64, name: impl Into<String>) -> IntVar {
        debug_assert!(lower <= upper, "empty domain");
        IntVar(self.push_var(name.into(), lower, upper, false))
    }

    fn push_var(&mut self, name: String, lower: i64, upper: i64, is_bool: bool) -> VarId {
        self.vars.push(VarInfo {
            name,
            lower,
            upper,
            is_bool,
        });
        VarId(self.vars.len() - 1)
    }

    /// `lower ≤ expr ≤ upper`.
    pub fn add_linear(
        &mut self,
        expr: LinearExpr,
        lower: Option<i64>,
        upper: Option<i64>,
    ) -> &mut Constraint {
        self.push(ConstraintKind::Linear { expr, lower, upper })
    }

    pub fn add_eq(&mut self, expr: LinearExpr, value: i64) -> &mut Constraint {
        self.add_linear(expr, Some(value), Some(value))
    }

    pub fn add_ge(&mut self, expr: LinearExpr, value: i64) -> &mut Constraint {
        self.add_linear(expr, Some(value), None)
    }

    pub fn add_le(&mut self, expr: LinearExpr, value: i64) -> &mut Constraint {
        self.add_linear(expr, None, Some(value))
    }

    /// `target == |expr|`.
    pub fn add_abs_equality(&mut self, target: IntVar, expr: LinearExpr) -> &mut Constraint {
        self.push(ConstraintKind::AbsEquality { target, expr })
    }

    /// All literals hold.
    pub fn add_bool_and(&mut self, literals: &[Literal]) -> &mut Constraint {
        let expr = literals
            .iter()
            .fold(LinearExpr::new(), |expr, &lit| expr.literal(lit, 1));
        self.add_ge(expr, literals.len() as i64)
    }

    /// At least one literal holds.
    pub fn add_bool_or(&mut self, literals: &[Literal]) -> &mut Constraint {
        let expr = literals
            .iter()
            .fold(LinearExpr::new(), |expr, &lit| expr.literal(lit, 1));
        self.add_ge(expr, 1)
    }

    fn push(&mut self, kind: ConstraintKind) -> &mut Constraint {
        self.constraints.push(Constraint {
            kind,
            enforcement: None,
        });
        let last = self.constraints.len() - 1;
        &mut self.constraints[last]
    }

    /// Suggests a value to the search; never enforced.
    pub fn add_hint(&mut self, var: impl Into<VarId>, value: i64) {
        self.hints.push((var.into(), value));
    }

    pub fn minimize(&mut self, objective: LinearExpr) {
        self.objective = Some(objective);
    }

    pub fn vars(&self) -> &[VarInfo] {
        &self.vars
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn hints(&self) -> &[(VarId, i64)] {
        &self.hints
    }

    pub fn objective(&self) -> Option<&LinearExpr> {
        self.objective.as_ref()
    }

    /// Smallest and largest value `expr` can take given the variable domains.
    pub fn bounds(&self, expr: &LinearExpr) -> (i64, i64) {
        expr.terms().iter().fold(
            (expr.constant_term(), expr.constant_term()),
            |(lo, hi), &(var, coef)| {
                let info = &self.vars[var.0];
                let (a, b) = (coef * info.lower, coef * info.upper);
                (lo + a.min(b), hi + a.max(b))
            },
        )
    }

    /// Indices of the constraints violated by `values`.
    pub fn violated(&self, values: &[i64]) -> Vec<usize> {
        self.constraints
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_satisfied_by(values))
            .map(|(i, _)| i)
            .collect()
    }

    /// Whether `values` respect every domain and constraint.
    pub fn is_satisfied_by(&self, values: &[i64]) -> bool {
        values.len() == self.vars.len()
            && self
                .vars
                .iter()
                .zip(values)
                .all(|(info, &v)| (info.lower..=info.upper).contains(&v))
            && self.violated(values).is_empty()
    }

    pub fn objective_value(&self, values: &[i64]) -> Option<i64> {
        self.objective.as_ref().map(|o| o.evaluate(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negated_literal_in_expr() {
        let mut model = CpModel::new("t");
        let a = model.new_bool_var("a");
        let expr = LinearExpr::new().literal(!a, 3);

        assert_eq!(expr.evaluate(&[0]), 3);
        assert_eq!(expr.evaluate(&[1]), 0);
    }

    #[test]
    fn test_reified_constraint() {
        let mut model = CpModel::new("t");
        let flag = model.new_bool_var("flag");
        let x = model.new_int_var(0, 5, "x");
        model
            .add_ge(LinearExpr::sum([x]), 3)
            .only_enforce_if(flag);
        model.add_le(LinearExpr::sum([x]), 2).only_enforce_if(!flag);

        assert!(model.is_satisfied_by(&[1, 4]));
        assert!(model.is_satisfied_by(&[0, 1]));
        assert!(!model.is_satisfied_by(&[1, 1]));
        assert!(!model.is_satisfied_by(&[0, 4]));
        // Outside the declared domain.
        assert!(!model.is_satisfied_by(&[0, 9]));
    }

    #[test]
    fn test_bool_and_or() {
        let mut model = CpModel::new("t");
        let a = model.new_bool_var("a");
        let b = model.new_bool_var("b");
        let flag = model.new_bool_var("flag");
        model.add_bool_and(&[a.into(), !b]).only_enforce_if(flag);
        model.add_bool_or(&[!a, b.into()]).only_enforce_if(!flag);

        assert!(model.is_satisfied_by(&[1, 0, 1]));
        assert!(model.is_satisfied_by(&[1, 1, 0]));
        assert!(model.is_satisfied_by(&[0, 0, 0]));
        assert!(!model.is_satisfied_by(&[1, 0, 0]));
        assert!(!model.is_satisfied_by(&[0, 0, 1]));
    }

    #[test]
    fn test_abs_equality_and_bounds() {
        let mut model = CpModel::new("t");
        let a = model.new_bool_var("a");
        let b = model.new_bool_var("b");
        let diff = model.new_int_var(0, 4, "diff");
        let expr = LinearExpr::sum([a, b]).offset(-3);
        assert_eq!(model.bounds(&expr), (-3, -1));

        model.add_abs_equality(diff, expr);
        assert!(model.is_satisfied_by(&[1, 0, 2]));
        assert!(!model.is_satisfied_by(&[1, 0, 1]));
        assert_eq!(model.violated(&[1, 1, 0]), vec![0]);
    }

    #[test]
    fn test_objective_and_hints() {
        let mut model = CpModel::new("t");
        let a = model.new_bool_var("a");
        let x = model.new_int_var(-2, 2, "x");
        model.add_hint(a, 1);
        model.minimize(LinearExpr::new().term(a, 2).term(x, -1).term(x, 0));

        assert_eq!(model.hints(), &[(a.id(), 1)]);
        assert_eq!(model.objective().map(|o| o.terms().len()), Some(2));
        assert_eq!(model.objective_value(&[1, -2]), Some(4));
        assert_eq!(model.bounds(model.objective().unwrap()), (-2, 4));
    }
}
