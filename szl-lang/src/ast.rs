//! Arena-allocated statement and expression nodes.
//!
//! Nodes live in flat pools and refer to each other by index, so rewrites
//! can clone and splice subtrees freely. Back-edges (a `Break` to its
//! enclosing loop) start unresolved and are patched in a second pass.

use core::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(u32);

/// The value types the `when` analysis distinguishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Bool,
    Int,
    String,
    Array(Box<Type>),
    Map(Box<Type>, Box<Type>),
}

impl Type {
    pub fn is_int(&self) -> bool {
        *self == Type::Int
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Type::Map(..))
    }

    /// Element type of an array.
    pub fn elem_type(&self) -> Option<&Type> {
        match self {
            Type::Array(elem) => Some(elem),
            _ => None,
        }
    }

    /// For maps, the type of the array produced by key extraction.
    pub fn key_array_type(&self) -> Option<Type> {
        match self {
            Type::Map(key, _) => Some(Type::Array(key.clone())),
            _ => None,
        }
    }
}

/// The three quantifier kinds of a `when` statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantKind {
    Some,
    Each,
    All,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub ty: Type,
    pub quant: Option<QuantKind>,
    pub init: Option<ExprId>,
    pub modified_after_init: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eql,
    Neq,
    Lss,
    Leq,
    Gtr,
    Geq,
    LAnd,
    LOr,
    BAnd,
    Shl,
    Shr,
}

/// Intrinsics the lowering emits or analyzes around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    Len,
    Def,
    CombineRange,
    CombineKeys,
    GetKeyByIndex,
}

impl Intrinsic {
    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::Len => "len",
            Intrinsic::Def => "def",
            Intrinsic::CombineRange => "$combinerange",
            Intrinsic::CombineKeys => "$combinekeys",
            Intrinsic::GetKeyByIndex => "$getkeybyindex",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    IntLit(i64),
    BoolLit(bool),
    StrLit(String),
    Var(DeclId),
    Index { var: ExprId, index: ExprId },
    Slice { var: ExprId, beg: ExprId, end: ExprId },
    Binary { op: BinOp, left: ExprId, right: ExprId },
    Call { fun: Intrinsic, args: Vec<ExprId> },
    /// `$` inside an index expression: the length of the indexed array.
    Dollar { array: ExprId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopSort {
    For,
    While,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Empty,
    Block(Vec<StmtId>),
    Decl(DeclId),
    Assign { lhs: ExprId, rhs: ExprId },
    Increment { var: ExprId, delta: i64 },
    If { cond: ExprId, then_part: StmtId, else_part: StmtId },
    Loop {
        sort: LoopSort,
        before: Option<DeclId>,
        cond: Option<ExprId>,
        after: Option<StmtId>,
        body: StmtId,
    },
    /// Target is patched once the enclosing loop exists.
    Break { target: Option<StmtId> },
    When { quants: Vec<DeclId>, cond: ExprId, body: StmtId },
}

/// The node pools of one compilation unit.
#[derive(Debug, Default, Clone)]
pub struct Program {
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
    decls: Vec<VarDecl>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0 as usize]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.0 as usize]
    }

    pub fn decl(&self, id: DeclId) -> &VarDecl {
        &self.decls[id.0 as usize]
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut VarDecl {
        &mut self.decls[id.0 as usize]
    }

    pub fn add_expr(&mut self, expr: Expr) -> ExprId {
        self.exprs.push(expr);
        ExprId(self.exprs.len() as u32 - 1)
    }

    pub fn add_stmt(&mut self, stmt: Stmt) -> StmtId {
        self.stmts.push(stmt);
        StmtId(self.stmts.len() as u32 - 1)
    }

    pub fn declare(
        &mut self,
        name: impl Into<String>,
        ty: Type,
        quant: Option<QuantKind>,
        init: Option<ExprId>,
    ) -> DeclId {
        self.decls.push(VarDecl {
            name: name.into(),
            ty,
            quant,
            init,
            modified_after_init: false,
        });
        DeclId(self.decls.len() as u32 - 1)
    }

    /// Resolve a `Break` back-edge to its loop.
    pub fn set_break_target(&mut self, brk: StmtId, target_loop: StmtId) {
        if let Stmt::Break { target } = &mut self.stmts[brk.0 as usize] {
            *target = Some(target_loop);
        }
    }

    /// Append a statement to an existing block.
    pub fn block_push(&mut self, block: StmtId, stmt: StmtId) {
        if let Stmt::Block(items) = &mut self.stmts[block.0 as usize] {
            items.push(stmt);
        }
    }

    pub fn int_lit(&mut self, i: i64) -> ExprId {
        self.add_expr(Expr::IntLit(i))
    }

    pub fn bool_lit(&mut self, b: bool) -> ExprId {
        self.add_expr(Expr::BoolLit(b))
    }

    pub fn var(&mut self, decl: DeclId) -> ExprId {
        self.add_expr(Expr::Var(decl))
    }

    pub fn index(&mut self, var: ExprId, index: ExprId) -> ExprId {
        self.add_expr(Expr::Index { var, index })
    }

    pub fn binary(&mut self, op: BinOp, left: ExprId, right: ExprId) -> ExprId {
        self.add_expr(Expr::Binary { op, left, right })
    }

    pub fn call(&mut self, fun: Intrinsic, args: Vec<ExprId>) -> ExprId {
        self.add_expr(Expr::Call { fun, args })
    }

    /// Deep copy of an expression subtree.
    pub fn clone_expr(&mut self, id: ExprId) -> ExprId {
        let expr = self.expr(id).clone();
        let cloned = match expr {
            Expr::Index { var, index } => {
                let var = self.clone_expr(var);
                let index = self.clone_expr(index);
                Expr::Index { var, index }
            }
            Expr::Slice { var, beg, end } => {
                let var = self.clone_expr(var);
                let beg = self.clone_expr(beg);
                let end = self.clone_expr(end);
                Expr::Slice { var, beg, end }
            }
            Expr::Binary { op, left, right } => {
                let left = self.clone_expr(left);
                let right = self.clone_expr(right);
                Expr::Binary { op, left, right }
            }
            Expr::Call { fun, args } => {
                let args = args.iter().map(|&a| self.clone_expr(a)).collect();
                Expr::Call { fun, args }
            }
            Expr::Dollar { array } => {
                let array = self.clone_expr(array);
                Expr::Dollar { array }
            }
            leaf => leaf,
        };
        self.add_expr(cloned)
    }

    /// Static type of an expression, where the analysis needs one.
    pub fn expr_type(&self, id: ExprId) -> Option<Type> {
        match self.expr(id) {
            Expr::IntLit(_) | Expr::Dollar { .. } => Some(Type::Int),
            Expr::BoolLit(_) => Some(Type::Bool),
            Expr::StrLit(_) => Some(Type::String),
            Expr::Var(decl) => Some(self.decl(*decl).ty.clone()),
            Expr::Index { var, .. } => match self.expr_type(*var)? {
                Type::Array(elem) => Some(*elem),
                Type::Map(_, value) => Some(*value),
                Type::String => Some(Type::Int),
                _ => None,
            },
            Expr::Slice { var, .. } => self.expr_type(*var),
            Expr::Binary { op, left, .. } => match op {
                BinOp::Eql
                | BinOp::Neq
                | BinOp::Lss
                | BinOp::Leq
                | BinOp::Gtr
                | BinOp::Geq
                | BinOp::LAnd
                | BinOp::LOr => Some(Type::Bool),
                _ => self.expr_type(*left),
            },
            Expr::Call { fun, args } => match fun {
                Intrinsic::Len | Intrinsic::CombineRange => Some(Type::Int),
                Intrinsic::Def => Some(Type::Bool),
                Intrinsic::CombineKeys => args
                    .first()
                    .and_then(|&m| self.expr_type(m))
                    .and_then(|t| t.key_array_type()),
                Intrinsic::GetKeyByIndex => match args.first().and_then(|&m| self.expr_type(m)) {
                    Some(Type::Map(key, _)) => Some(*key),
                    _ => None,
                },
            },
        }
    }

    /// Source-like rendering, for diagnostics.
    pub fn render_expr(&self, id: ExprId) -> String {
        let mut out = String::new();
        self.render_into(id, &mut out);
        out
    }

    fn render_into(&self, id: ExprId, out: &mut String) {
        match self.expr(id) {
            Expr::IntLit(i) => {
                let _ = write!(out, "{i}");
            }
            Expr::BoolLit(b) => {
                let _ = write!(out, "{b}");
            }
            Expr::StrLit(s) => {
                let _ = write!(out, "{s:?}");
            }
            Expr::Var(decl) => out.push_str(&self.decl(*decl).name),
            Expr::Index { var, index } => {
                self.render_into(*var, out);
                out.push('[');
                self.render_into(*index, out);
                out.push(']');
            }
            Expr::Slice { var, beg, end } => {
                self.render_into(*var, out);
                out.push('[');
                self.render_into(*beg, out);
                out.push(':');
                self.render_into(*end, out);
                out.push(']');
            }
            Expr::Binary { op, left, right } => {
                self.render_into(*left, out);
                let _ = write!(out, " {} ", op_token(*op));
                self.render_into(*right, out);
            }
            Expr::Call { fun, args } => {
                out.push_str(fun.name());
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.render_into(*arg, out);
                }
                out.push(')');
            }
            Expr::Dollar { .. } => out.push('$'),
        }
    }
}

fn op_token(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Eql => "==",
        BinOp::Neq => "!=",
        BinOp::Lss => "<",
        BinOp::Leq => "<=",
        BinOp::Gtr => ">",
        BinOp::Geq => ">=",
        BinOp::LAnd => "&&",
        BinOp::LOr => "||",
        BinOp::BAnd => "&",
        BinOp::Shl => "<<",
        BinOp::Shr => ">>",
    }
}
