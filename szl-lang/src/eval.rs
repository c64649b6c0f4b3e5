//! A reference evaluator for lowered statements.
//!
//! Exercises the loops the `when` lowering produces without involving the
//! code generator: undefined results propagate as [`Value::Undef`], `def`
//! observes them, and the `$combinerange`/`$combinekeys`/`$getkeybyindex`
//! intrinsics behave as the generated loops expect. Undefined conditions
//! count in `undef_conds` instead of failing, mirroring recoverable undefs.

use std::collections::HashMap;

use thiserror::Error;

use crate::ast::{BinOp, DeclId, Expr, ExprId, Intrinsic, Program, Stmt, StmtId};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Undef,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("'when' must be lowered before evaluation")]
    UnloweredWhen,
    #[error("break with an unresolved target")]
    UnresolvedBreak,
    #[error("assignment target is not an lvalue")]
    BadAssignTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break(StmtId),
}

pub struct Evaluator<'p> {
    prog: &'p Program,
    env: HashMap<DeclId, Value>,
    undef_conds: usize,
}

impl<'p> Evaluator<'p> {
    pub fn new(prog: &'p Program) -> Self {
        Self {
            prog,
            env: HashMap::new(),
            undef_conds: 0,
        }
    }

    pub fn set(&mut self, decl: DeclId, value: Value) {
        self.env.insert(decl, value);
    }

    pub fn value(&self, decl: DeclId) -> Value {
        self.env.get(&decl).cloned().unwrap_or(Value::Undef)
    }

    /// Conditions that evaluated to undef and fell through.
    pub fn undef_conds(&self) -> usize {
        self.undef_conds
    }

    pub fn exec(&mut self, stmt: StmtId) -> Result<(), EvalError> {
        self.exec_flow(stmt).map(|_| ())
    }

    fn exec_flow(&mut self, id: StmtId) -> Result<Flow, EvalError> {
        match self.prog.stmt(id).clone() {
            Stmt::Empty => Ok(Flow::Normal),
            Stmt::Block(items) => {
                for item in items {
                    match self.exec_flow(item)? {
                        Flow::Normal => {}
                        brk => return Ok(brk),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Decl(decl) => {
                self.run_decl(decl);
                Ok(Flow::Normal)
            }
            Stmt::Assign { lhs, rhs } => {
                let value = self.eval(rhs);
                self.assign(lhs, value)?;
                Ok(Flow::Normal)
            }
            Stmt::Increment { var, delta } => {
                if let Expr::Var(decl) = self.prog.expr(var) {
                    if let Value::Int(i) = self.value(*decl) {
                        self.env.insert(*decl, Value::Int(i + delta));
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::If {
                cond,
                then_part,
                else_part,
            } => match self.eval(cond) {
                Value::Bool(true) => self.exec_flow(then_part),
                Value::Bool(false) => self.exec_flow(else_part),
                _ => {
                    self.undef_conds += 1;
                    self.exec_flow(else_part)
                }
            },
            Stmt::Loop {
                before,
                cond,
                after,
                body,
                ..
            } => {
                if let Some(decl) = before {
                    self.run_decl(decl);
                }
                loop {
                    let go = match cond {
                        None => true,
                        Some(c) => match self.eval(c) {
                            Value::Bool(b) => b,
                            _ => {
                                self.undef_conds += 1;
                                false
                            }
                        },
                    };
                    if !go {
                        break;
                    }
                    match self.exec_flow(body)? {
                        Flow::Normal => {}
                        Flow::Break(target) if target == id => break,
                        brk => return Ok(brk),
                    }
                    if let Some(after) = after {
                        self.exec_flow(after)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Break { target } => target
                .map(Flow::Break)
                .ok_or(EvalError::UnresolvedBreak),
            Stmt::When { .. } => Err(EvalError::UnloweredWhen),
        }
    }

    fn run_decl(&mut self, decl: DeclId) {
        let value = match self.prog.decl(decl).init {
            Some(init) => self.eval(init),
            None => Value::Undef,
        };
        self.env.insert(decl, value);
    }

    fn assign(&mut self, lhs: ExprId, value: Value) -> Result<(), EvalError> {
        match self.prog.expr(lhs) {
            Expr::Var(decl) => {
                self.env.insert(*decl, value);
                Ok(())
            }
            Expr::Index { var, index } => {
                let Expr::Var(decl) = self.prog.expr(*var) else {
                    return Err(EvalError::BadAssignTarget);
                };
                let decl = *decl;
                let key = self.eval(*index);
                let mut base = self.value(decl);
                match (&mut base, key) {
                    (Value::Array(items), Value::Int(i)) => {
                        if i >= 0 && (i as usize) < items.len() {
                            items[i as usize] = value;
                        }
                    }
                    (Value::Map(pairs), key) => {
                        match pairs.iter_mut().find(|(k, _)| *k == key) {
                            Some(pair) => pair.1 = value,
                            None => pairs.push((key, value)),
                        }
                    }
                    _ => {}
                }
                self.env.insert(decl, base);
                Ok(())
            }
            _ => Err(EvalError::BadAssignTarget),
        }
    }

    pub fn eval(&self, id: ExprId) -> Value {
        match self.prog.expr(id) {
            Expr::IntLit(i) => Value::Int(*i),
            Expr::BoolLit(b) => Value::Bool(*b),
            Expr::StrLit(s) => Value::Str(s.clone()),
            Expr::Var(decl) => self.value(*decl),
            Expr::Index { var, index } => {
                let base = self.eval(*var);
                let key = self.eval(*index);
                match (base, key) {
                    (Value::Array(items), Value::Int(i)) => {
                        if i >= 0 && (i as usize) < items.len() {
                            items[i as usize].clone()
                        } else {
                            Value::Undef
                        }
                    }
                    (Value::Str(s), Value::Int(i)) => {
                        if i >= 0 && (i as usize) < s.len() {
                            Value::Int(s.as_bytes()[i as usize] as i64)
                        } else {
                            Value::Undef
                        }
                    }
                    (Value::Map(pairs), key) if key != Value::Undef => pairs
                        .iter()
                        .find(|(k, _)| *k == key)
                        .map(|(_, v)| v.clone())
                        .unwrap_or(Value::Undef),
                    _ => Value::Undef,
                }
            }
            Expr::Slice { var, beg, end } => {
                match (self.eval(*var), self.eval(*beg), self.eval(*end)) {
                    (Value::Array(items), Value::Int(b), Value::Int(e)) => {
                        if b >= 0 && b <= e && (e as usize) <= items.len() {
                            Value::Array(items[b as usize..e as usize].to_vec())
                        } else {
                            Value::Undef
                        }
                    }
                    _ => Value::Undef,
                }
            }
            Expr::Binary { op, left, right } => self.eval_binary(*op, *left, *right),
            Expr::Call { fun, args } => self.eval_call(*fun, args),
            Expr::Dollar { array } => match self.eval(*array) {
                Value::Array(items) => Value::Int(items.len() as i64),
                Value::Str(s) => Value::Int(s.len() as i64),
                _ => Value::Undef,
            },
        }
    }

    fn eval_binary(&self, op: BinOp, left: ExprId, right: ExprId) -> Value {
        match op {
            BinOp::LAnd => match self.eval(left) {
                Value::Bool(false) => Value::Bool(false),
                Value::Bool(true) => match self.eval(right) {
                    v @ Value::Bool(_) => v,
                    _ => Value::Undef,
                },
                _ => Value::Undef,
            },
            BinOp::LOr => match self.eval(left) {
                Value::Bool(true) => Value::Bool(true),
                Value::Bool(false) => match self.eval(right) {
                    v @ Value::Bool(_) => v,
                    _ => Value::Undef,
                },
                _ => Value::Undef,
            },
            _ => {
                let l = self.eval(left);
                let r = self.eval(right);
                if l == Value::Undef || r == Value::Undef {
                    return Value::Undef;
                }
                match op {
                    BinOp::Eql => Value::Bool(l == r),
                    BinOp::Neq => Value::Bool(l != r),
                    BinOp::Lss | BinOp::Leq | BinOp::Gtr | BinOp::Geq => compare(op, &l, &r),
                    _ => arith(op, &l, &r),
                }
            }
        }
    }

    fn eval_call(&self, fun: Intrinsic, args: &[ExprId]) -> Value {
        match fun {
            Intrinsic::Len => match args.first().map(|&a| self.eval(a)) {
                Some(Value::Array(items)) => Value::Int(items.len() as i64),
                Some(Value::Map(pairs)) => Value::Int(pairs.len() as i64),
                Some(Value::Str(s)) => Value::Int(s.len() as i64),
                _ => Value::Undef,
            },
            Intrinsic::Def => {
                let defined = args
                    .first()
                    .map(|&a| self.eval(a) != Value::Undef)
                    .unwrap_or(false);
                Value::Bool(defined)
            }
            Intrinsic::CombineRange => {
                // (count, min1, max1, …) -> (max << 32) | min, intersected.
                let mut lo = 0i64;
                let mut hi = i64::MAX;
                let mut any = false;
                let mut pairs = args[1..].chunks_exact(2);
                for pair in &mut pairs {
                    match (self.eval(pair[0]), self.eval(pair[1])) {
                        (Value::Int(min), Value::Int(max)) => {
                            lo = lo.max(min);
                            hi = hi.min(max);
                            any = true;
                        }
                        _ => return Value::Undef,
                    }
                }
                if !any {
                    hi = 0;
                }
                if hi < lo {
                    hi = lo;
                }
                Value::Int((hi << 32) | (lo & 0x7fff_ffff))
            }
            Intrinsic::CombineKeys => {
                let mut keys: Vec<Value> = Vec::new();
                for &arg in &args[1..] {
                    match self.eval(arg) {
                        Value::Map(pairs) => {
                            for (k, _) in pairs {
                                if !keys.contains(&k) {
                                    keys.push(k);
                                }
                            }
                        }
                        _ => return Value::Undef,
                    }
                }
                Value::Array(keys)
            }
            Intrinsic::GetKeyByIndex => {
                let map = args.first().map(|&a| self.eval(a));
                let index = args.get(1).map(|&a| self.eval(a));
                match (map, index) {
                    (Some(Value::Map(pairs)), Some(Value::Int(i)))
                        if i >= 0 && (i as usize) < pairs.len() =>
                    {
                        pairs[i as usize].0.clone()
                    }
                    _ => Value::Undef,
                }
            }
        }
    }
}

fn compare(op: BinOp, l: &Value, r: &Value) -> Value {
    let ord = match (l, r) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => return Value::Undef,
    };
    Value::Bool(match op {
        BinOp::Lss => ord.is_lt(),
        BinOp::Leq => ord.is_le(),
        BinOp::Gtr => ord.is_gt(),
        _ => ord.is_ge(),
    })
}

fn arith(op: BinOp, l: &Value, r: &Value) -> Value {
    let (Value::Int(a), Value::Int(b)) = (l, r) else {
        return Value::Undef;
    };
    let (a, b) = (*a, *b);
    match op {
        BinOp::Add => Value::Int(a.wrapping_add(b)),
        BinOp::Sub => Value::Int(a.wrapping_sub(b)),
        BinOp::Mul => Value::Int(a.wrapping_mul(b)),
        BinOp::Div => {
            if b == 0 {
                Value::Undef
            } else {
                Value::Int(a.wrapping_div(b))
            }
        }
        BinOp::Mod => {
            if b == 0 {
                Value::Undef
            } else {
                Value::Int(a.wrapping_rem(b))
            }
        }
        BinOp::BAnd => Value::Int(a & b),
        BinOp::Shl => {
            if (0..64).contains(&b) {
                Value::Int(((a as u64) << b) as i64)
            } else {
                Value::Undef
            }
        }
        BinOp::Shr => {
            // Unsigned shift, as the range unpacking relies on.
            if (0..64).contains(&b) {
                Value::Int(((a as u64) >> b) as i64)
            } else {
                Value::Undef
            }
        }
        _ => Value::Undef,
    }
}
