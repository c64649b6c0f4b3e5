//! Lowering of `when` statements into explicit loops.
//!
//! `when (q1, …, qk; cond) body` turns into bounded `for` loops over the
//! index ranges that constrain each quantifier, with the condition wrapped
//! in a `def` guard whenever the analysis cannot prove it safe. The code
//! generator consumes the rewritten statement instead of the `when`.

use thiserror::Error;
use tracing::debug;

use crate::ast::{
    BinOp, DeclId, Expr, ExprId, Intrinsic, LoopSort, Program, QuantKind, Stmt, StmtId, Type,
};

/// A construct the analysis cannot lower; one line, for the compiler's
/// diagnostic channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct AnalysisError(pub String);

/// Collected constraints for one quantifier: the index expressions that
/// can drive a loop, and whether the condition needs a `def` guard.
struct ExprAnalyzer<'p> {
    prog: &'p Program,
    quant: DeclId,
    uses: Vec<ExprId>,
    needs_def: bool,
    error: Option<String>,
}

impl<'p> ExprAnalyzer<'p> {
    fn new(prog: &'p Program, quant: DeclId) -> Self {
        Self {
            prog,
            quant,
            uses: Vec::new(),
            needs_def: false,
            error: None,
        }
    }

    fn analyze(&mut self, x: ExprId) {
        match self.prog.expr(x) {
            Expr::IntLit(_) | Expr::BoolLit(_) | Expr::StrLit(_) | Expr::Var(_) => {}
            Expr::Dollar { .. } => {}
            Expr::Binary { left, right, .. } => {
                let (left, right) = (*left, *right);
                self.analyze(left);
                self.analyze(right);
            }
            Expr::Call { args, .. } => {
                for arg in args.clone() {
                    self.analyze(arg);
                }
            }
            Expr::Index { var, index } => {
                let (var, index) = (*var, *index);
                self.analyze(var);
                self.analyze_index(x, index);
            }
            Expr::Slice { var, beg, end } => {
                let (var, beg, end) = (*var, *beg, *end);
                self.analyze(var);
                self.analyze_index(x, beg);
                self.analyze_index(x, end);
            }
        }
    }

    // `expr` is of the form a[index] (or a slice). If the index is a bare
    // reference to our quantifier, `expr` constrains the loop. A nested
    // index like a[b[c[i]]] recurses to the innermost use, but b[c[i]] may
    // be out of range for a valid i, so the condition gets def-protected.
    // Anything more complex is analyzed for inner constraints and likewise
    // protected.
    fn analyze_index(&mut self, expr: ExprId, index: ExprId) {
        let quants = quants_in(self.prog, index);
        match quants.len() {
            0 => return,
            1 => {
                if quants[0] != self.quant {
                    return;
                }
                if let Expr::Index { var, index: inner } = self.prog.expr(index) {
                    let (var, inner) = (*var, *inner);
                    self.needs_def = true;
                    self.analyze(var);
                    self.analyze_index(index, inner);
                    return;
                }
                if matches!(self.prog.expr(index), Expr::Var(_)) {
                    self.uses.push(expr);
                    return;
                }
            }
            _ => {}
        }

        // No constraint here, but an inner expression may still provide
        // one; either way the whole condition can go out of range.
        self.analyze(index);
        self.needs_def = true;
    }
}

fn quants_in(prog: &Program, x: ExprId) -> Vec<DeclId> {
    let mut out = Vec::new();
    collect_quants(prog, x, &mut out);
    out
}

fn collect_quants(prog: &Program, x: ExprId, out: &mut Vec<DeclId>) {
    match prog.expr(x) {
        Expr::Var(decl) => {
            if prog.decl(*decl).quant.is_some() {
                out.push(*decl);
            }
        }
        Expr::IntLit(_) | Expr::BoolLit(_) | Expr::StrLit(_) => {}
        Expr::Index { var, index } => {
            collect_quants(prog, *var, out);
            collect_quants(prog, *index, out);
        }
        Expr::Slice { var, beg, end } => {
            collect_quants(prog, *var, out);
            collect_quants(prog, *beg, out);
            collect_quants(prog, *end, out);
        }
        Expr::Binary { left, right, .. } => {
            collect_quants(prog, *left, out);
            collect_quants(prog, *right, out);
        }
        Expr::Call { args, .. } => {
            for &arg in args {
                collect_quants(prog, arg, out);
            }
        }
        Expr::Dollar { array } => collect_quants(prog, *array, out),
    }
}

/// Is this expression a logical combination of `def()` calls? Wrapping
/// such a condition again would be pointless: def(def()) is always true.
fn all_defs(prog: &Program, cond: ExprId) -> bool {
    match prog.expr(cond) {
        Expr::Call {
            fun: Intrinsic::Def,
            ..
        } => true,
        Expr::Binary {
            op: BinOp::LAnd | BinOp::LOr | BinOp::Eql,
            left,
            right,
        } => all_defs(prog, *left) && all_defs(prog, *right),
        Expr::BoolLit(_) => true,
        _ => false,
    }
}

/// Rewrites one `when` statement.
pub struct WhenAnalyzer<'a> {
    prog: &'a mut Program,
    when: StmtId,
    namecount: usize,
    error: Option<String>,
}

impl<'a> WhenAnalyzer<'a> {
    pub fn new(prog: &'a mut Program, when: StmtId) -> Self {
        Self {
            prog,
            when,
            namecount: 0,
            error: None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Produce the replacement statement, or the single-line reason the
    /// construct cannot be lowered.
    pub fn analyze(&mut self) -> Result<StmtId, AnalysisError> {
        let (quants, cond, body) = match self.prog.stmt(self.when) {
            Stmt::When { quants, cond, body } => (quants.clone(), *cond, *body),
            _ => return self.fail("statement is not a 'when'"),
        };

        let mut alluses = Vec::with_capacity(quants.len());
        let mut needs_def = false;
        for &quant in &quants {
            let mut exanal = ExprAnalyzer::new(self.prog, quant);
            exanal.analyze(cond);
            needs_def |= exanal.needs_def;
            if let Some(error) = exanal.error {
                return self.fail(error);
            }
            if exanal.uses.is_empty() {
                let name = self.prog.decl(quant).name.clone();
                return self.fail(format!(
                    "quantifier {name} must be constrained by a simple index expression"
                ));
            }
            alluses.push(exanal.uses);
        }

        match quants.len() {
            0 => {
                let else_part = self.prog.add_stmt(Stmt::Empty);
                Ok(self.prog.add_stmt(Stmt::If {
                    cond,
                    then_part: body,
                    else_part,
                }))
            }
            1 => self.analyze_one_var(&quants, quants[0], &alluses[0], needs_def, cond, body),
            _ => self.analyze_n_vars(&quants, &alluses, cond, body),
        }
    }

    fn fail<T>(&mut self, msg: impl Into<String>) -> Result<T, AnalysisError> {
        let msg = msg.into();
        debug!("when analysis error: {msg}");
        self.error = Some(msg.clone());
        Err(AnalysisError(msg))
    }

    fn temp_decl(&mut self, name: &str, ty: Type, init: ExprId) -> DeclId {
        let vname = format!("{name}{}", self.namecount);
        self.namecount += 1;
        self.prog.declare(vname, ty, None, Some(init))
    }

    /// The expression being indexed, cloned: `a` in `a[i]` or `a[i:j]`.
    fn var_of(&mut self, expr: ExprId) -> Option<ExprId> {
        match self.prog.expr(expr) {
            Expr::Index { var, .. } | Expr::Slice { var, .. } => {
                let var = *var;
                Some(self.prog.clone_expr(var))
            }
            _ => None,
        }
    }

    fn var_expr_of(&self, expr: ExprId) -> Option<ExprId> {
        match self.prog.expr(expr) {
            Expr::Index { var, .. } | Expr::Slice { var, .. } => Some(*var),
            _ => None,
        }
    }

    fn type_of_var_of(&self, expr: ExprId) -> Option<Type> {
        self.var_expr_of(expr).and_then(|v| self.prog.expr_type(v))
    }

    /// `[0, len(a))` for an index use; one past that for a slice, since
    /// `a[0:len(a)]` is legal.
    fn range_limit(&mut self, use_expr: ExprId) -> Result<(ExprId, ExprId), AnalysisError> {
        let Some(var) = self.var_of(use_expr) else {
            let rendered = self.prog.render_expr(use_expr);
            return self.fail(format!(
                "can't handle {rendered} in RangeLimit in 'when' analysis"
            ));
        };
        let min = self.prog.int_lit(0);
        let mut max = self.prog.call(Intrinsic::Len, vec![var]);
        if matches!(self.prog.expr(use_expr), Expr::Slice { .. }) {
            let one = self.prog.int_lit(1);
            max = self.prog.binary(BinOp::Add, max, one);
        }
        Ok((min, max))
    }

    /// Total quantifier uses inside an expression, over all quantifiers.
    /// More than one means the loop initializer would read a quantifier
    /// before the loop sets it, e.g. `a[i][i]`.
    fn num_quant(&self, quants: &[DeclId], expr: ExprId) -> usize {
        quants
            .iter()
            .map(|&quant| {
                let mut exanal = ExprAnalyzer::new(&*self.prog, quant);
                exanal.analyze(expr);
                exanal.uses.len()
            })
            .sum()
    }

    // Generate the iteration initializers. Arrays (and a lone map
    // variable) intersect index ranges via $combinerange and iterate an
    // integer loop; several maps or complex map expressions union their
    // key sets via $combinekeys; mixing arrays and maps is rejected.
    fn combine_range(
        &mut self,
        block: &mut Vec<StmtId>,
        quants: &[DeclId],
        uses: &[ExprId],
    ) -> Result<(DeclId, DeclId, Option<DeclId>), AnalysisError> {
        let mut nmapexpr = 0;
        let mut narray = 0;
        let mut mapdecls: Vec<DeclId> = Vec::new();
        for &use_expr in uses {
            let Some(var) = self.var_expr_of(use_expr) else {
                return self.too_complex(use_expr);
            };
            let Some(var_ty) = self.prog.expr_type(var) else {
                return self.too_complex(use_expr);
            };
            if var_ty.is_map() {
                if let Expr::Var(decl) = self.prog.expr(var) {
                    if !mapdecls.contains(decl) {
                        mapdecls.push(*decl);
                    }
                } else {
                    nmapexpr += 1;
                    if self.num_quant(quants, use_expr) > 1 {
                        return self.too_complex(use_expr);
                    }
                }
            } else {
                narray += 1;
                if var_ty.is_array() && !matches!(self.prog.expr(var), Expr::Var(_)) {
                    if self.num_quant(quants, use_expr) > 1 {
                        return self.too_complex(use_expr);
                    }
                }
            }
        }

        if nmapexpr == 0 && (mapdecls.is_empty() || (mapdecls.len() == 1 && narray == 0)) {
            let (min, max) = self.combine_array_range(block, uses)?;
            return Ok((min, max, None));
        }
        if narray > 0 {
            return self.fail("can't handle mixed array and map access in 'when' analysis");
        }
        let (min, max, key_array) = self.combine_map_range(block, uses)?;
        Ok((min, max, Some(key_array)))
    }

    fn too_complex<T>(&mut self, expr: ExprId) -> Result<T, AnalysisError> {
        let rendered = self.prog.render_expr(expr);
        self.fail(format!(
            "implementation restriction: {rendered} in 'when' condition too complex"
        ))
    }

    /// `$minmax = $combinerange(n, min1, max1, …)`, unpacked into `$min`
    /// and `$max`. The packed form is `(max << 32) | min`.
    fn combine_array_range(
        &mut self,
        block: &mut Vec<StmtId>,
        uses: &[ExprId],
    ) -> Result<(DeclId, DeclId), AnalysisError> {
        let mut args = vec![self.prog.int_lit(uses.len() as i64)];
        for &use_expr in uses {
            let (min, max) = self.range_limit(use_expr)?;
            args.push(min);
            args.push(max);
        }
        let call = self.prog.call(Intrinsic::CombineRange, args);
        let minmax = self.temp_decl("$minmax", Type::Int, call);
        block.push(self.prog.add_stmt(Stmt::Decl(minmax)));

        let minmax_var = self.prog.var(minmax);
        let mask = self.prog.int_lit(0x7fff_ffff);
        let low = self.prog.binary(BinOp::BAnd, minmax_var, mask);
        let min = self.temp_decl("$min", Type::Int, low);
        block.push(self.prog.add_stmt(Stmt::Decl(min)));

        let minmax_var = self.prog.var(minmax);
        let shift = self.prog.int_lit(32);
        let high = self.prog.binary(BinOp::Shr, minmax_var, shift);
        let max = self.temp_decl("$max", Type::Int, high);
        block.push(self.prog.add_stmt(Stmt::Decl(max)));
        Ok((min, max))
    }

    /// `$key_array = $combinekeys(n, m1, …)`, iterated by position.
    fn combine_map_range(
        &mut self,
        block: &mut Vec<StmtId>,
        uses: &[ExprId],
    ) -> Result<(DeclId, DeclId, DeclId), AnalysisError> {
        let mut args = vec![self.prog.int_lit(uses.len() as i64)];
        for &use_expr in uses {
            match self.var_of(use_expr) {
                Some(var) => args.push(var),
                None => return self.too_complex(use_expr),
            }
        }
        let call = self.prog.call(Intrinsic::CombineKeys, args);
        let Some(key_array_ty) = self.type_of_var_of(uses[0]).and_then(|t| t.key_array_type())
        else {
            return self.too_complex(uses[0]);
        };
        let key_array = self.temp_decl("$key_array", key_array_ty, call);
        block.push(self.prog.add_stmt(Stmt::Decl(key_array)));

        let zero = self.prog.int_lit(0);
        let min = self.temp_decl("$min", Type::Int, zero);
        block.push(self.prog.add_stmt(Stmt::Decl(min)));

        let key_array_var = self.prog.var(key_array);
        let len = self.prog.call(Intrinsic::Len, vec![key_array_var]);
        let max = self.temp_decl("$max", Type::Int, len);
        block.push(self.prog.add_stmt(Stmt::Decl(max)));
        Ok((min, max, key_array))
    }

    /// `quant = $key_array[$index]` or `quant = $getkeybyindex(m, $index)`.
    fn create_assignment(
        &mut self,
        quant_decl: DeclId,
        map: ExprId,
        key_array: Option<DeclId>,
        index_decl: DeclId,
    ) -> StmtId {
        let quant = self.prog.var(quant_decl);
        let index = self.prog.var(index_decl);
        let rhs = match key_array {
            Some(keys) => {
                let keys_var = self.prog.var(keys);
                self.prog.index(keys_var, index)
            }
            None => self.prog.call(Intrinsic::GetKeyByIndex, vec![map, index]),
        };
        self.prog.decl_mut(quant_decl).modified_after_init = true;
        self.prog.add_stmt(Stmt::Assign { lhs: quant, rhs })
    }

    fn for_loop(&mut self, index_decl: DeclId, max: DeclId, body: StmtId) -> StmtId {
        let index = self.prog.var(index_decl);
        let max_var = self.prog.var(max);
        let cond = self.prog.binary(BinOp::Lss, index, max_var);
        let index = self.prog.var(index_decl);
        let after = self.prog.add_stmt(Stmt::Increment {
            var: index,
            delta: 1,
        });
        self.prog.decl_mut(index_decl).modified_after_init = true;
        self.prog.add_stmt(Stmt::Loop {
            sort: LoopSort::For,
            before: Some(index_decl),
            cond: Some(cond),
            after: Some(after),
            body,
        })
    }

    // Wrap a loop body in the for loop for one quantifier, possibly with
    // `$succeeded` plumbing when several quantifiers of mixed kind nest.
    fn create_for_loop(
        &mut self,
        quants: &[DeclId],
        quant_decl: DeclId,
        uses: &[ExprId],
        succeeded: Option<DeclId>,
        body: StmtId,
        break_loop: Option<StmtId>,
    ) -> Result<StmtId, AnalysisError> {
        let mut block = Vec::new();
        let (min, max, key_array) = self.combine_range(&mut block, quants, uses)?;
        let (index_decl, map_use) = self.bind_index_var(&mut block, quant_decl, uses, min);

        let mut body = body;
        if let Some(map_use) = map_use {
            let Some(map) = self.var_of(map_use) else {
                return self.too_complex(map_use);
            };
            let assign = self.create_assignment(quant_decl, map, key_array, index_decl);
            body = self.prog.add_stmt(Stmt::Block(vec![assign, body]));
        }

        let forloop = self.for_loop(index_decl, max, body);
        if let Some(brk) = break_loop {
            self.prog.set_break_target(brk, forloop);
        }
        if let Some(succeeded) = succeeded {
            let kind = self.prog.decl(quant_decl).quant;
            match kind {
                Some(QuantKind::Some) => {
                    let brk = self.prog.add_stmt(Stmt::Break { target: None });
                    self.prog.set_break_target(brk, forloop);
                    let succeeded_var = self.prog.var(succeeded);
                    let empty = self.prog.add_stmt(Stmt::Empty);
                    let check = self.prog.add_stmt(Stmt::If {
                        cond: succeeded_var,
                        then_part: brk,
                        else_part: empty,
                    });
                    self.prog.block_push(body, check);
                }
                Some(QuantKind::Each) | None => {}
                Some(QuantKind::All) => {
                    // An 'all' that is not innermost needs two-phase
                    // execution.
                    return self.fail("can't handle alls yet in complex 'when' conditions");
                }
            }
        }
        block.push(forloop);
        Ok(self.prog.add_stmt(Stmt::Block(block)))
    }

    /// `while (true) { loops; body; [succeeded = true;] break; }` — the
    /// skeleton every 'all' lowering bottoms out in.
    fn create_while_all_loop(
        &mut self,
        succeeded: Option<DeclId>,
        loop_body: StmtId,
        break_all: Option<StmtId>,
        when_body: StmtId,
    ) -> StmtId {
        let mut items = vec![loop_body, when_body];
        if let Some(succeeded) = succeeded {
            let succeeded_var = self.prog.var(succeeded);
            let yes = self.prog.bool_lit(true);
            items.push(self.prog.add_stmt(Stmt::Assign {
                lhs: succeeded_var,
                rhs: yes,
            }));
        }
        let brk = self.prog.add_stmt(Stmt::Break { target: None });
        items.push(brk);
        let while_body = self.prog.add_stmt(Stmt::Block(items));
        let always = self.prog.bool_lit(true);
        let while_loop = self.prog.add_stmt(Stmt::Loop {
            sort: LoopSort::While,
            before: None,
            cond: Some(always),
            after: None,
            body: while_body,
        });
        self.prog.set_break_target(brk, while_loop);
        if let Some(break_all) = break_all {
            self.prog.set_break_target(break_all, while_loop);
        }
        self.prog.add_stmt(Stmt::Block(vec![while_loop]))
    }

    /// `def(cond) && cond`, through a temporary to evaluate `cond` once.
    fn protect_condition(&mut self, cond: ExprId, block: &mut Vec<StmtId>) -> ExprId {
        if all_defs(self.prog, cond) {
            return cond;
        }
        let tmp = self.temp_decl("$boolean", Type::Bool, cond);
        block.push(self.prog.add_stmt(Stmt::Decl(tmp)));
        let tmp_var = self.prog.var(tmp);
        let def = self.prog.call(Intrinsic::Def, vec![tmp_var]);
        let tmp_var = self.prog.var(tmp);
        self.prog.binary(BinOp::LAnd, def, tmp_var)
    }

    // One quantifier allows a tighter rendition of the same semantics:
    //
    //   some:  for (range) if (cond) { body; break; }
    //   each:  for (range) if (cond) body
    //   all:   outer: while (true) {
    //            for (range) if (cond) ; else break outer;
    //            body; break;
    //          }
    fn analyze_one_var(
        &mut self,
        quants: &[DeclId],
        quant_decl: DeclId,
        uses: &[ExprId],
        needs_def: bool,
        cond: ExprId,
        body: StmtId,
    ) -> Result<StmtId, AnalysisError> {
        let mut block = Vec::new();
        let mut forbody = Vec::new();
        let (min, max, key_array) = self.combine_range(&mut block, quants, uses)?;
        let (index_decl, map_use) = self.bind_index_var(&mut block, quant_decl, uses, min);
        if let Some(map_use) = map_use {
            let Some(map) = self.var_of(map_use) else {
                return self.too_complex(map_use);
            };
            forbody.push(self.create_assignment(quant_decl, map, key_array, index_decl));
        }

        let needs_def = needs_def || key_array.is_some();
        let safecond = if needs_def {
            self.protect_condition(cond, &mut forbody)
        } else {
            cond
        };

        let kind = self.prog.decl(quant_decl).quant;
        match kind {
            Some(QuantKind::Some) => {
                let brk = self.prog.add_stmt(Stmt::Break { target: None });
                let ifbody = self.prog.add_stmt(Stmt::Block(vec![body, brk]));
                let empty = self.prog.add_stmt(Stmt::Empty);
                forbody.push(self.prog.add_stmt(Stmt::If {
                    cond: safecond,
                    then_part: ifbody,
                    else_part: empty,
                }));
                let forbody = self.prog.add_stmt(Stmt::Block(forbody));
                let forloop = self.for_loop(index_decl, max, forbody);
                self.prog.set_break_target(brk, forloop);
                block.push(forloop);
            }
            Some(QuantKind::Each) => {
                let empty = self.prog.add_stmt(Stmt::Empty);
                forbody.push(self.prog.add_stmt(Stmt::If {
                    cond: safecond,
                    then_part: body,
                    else_part: empty,
                }));
                let forbody = self.prog.add_stmt(Stmt::Block(forbody));
                let forloop = self.for_loop(index_decl, max, forbody);
                block.push(forloop);
            }
            Some(QuantKind::All) => {
                let empty = self.prog.add_stmt(Stmt::Empty);
                let break_outer = self.prog.add_stmt(Stmt::Break { target: None });
                forbody.push(self.prog.add_stmt(Stmt::If {
                    cond: safecond,
                    then_part: empty,
                    else_part: break_outer,
                }));
                let forbody = self.prog.add_stmt(Stmt::Block(forbody));
                let forloop = self.for_loop(index_decl, max, forbody);
                block.push(forloop);
                let loops = self.prog.add_stmt(Stmt::Block(block));
                return Ok(self.create_while_all_loop(None, loops, Some(break_outer), body));
            }
            None => return self.fail("declaration is not a quantifier"),
        }
        Ok(self.prog.add_stmt(Stmt::Block(block)))
    }

    // Multiple quantifiers of one kind nest directly; mixed kinds thread a
    // `$succeeded` flag through the loops, built from the inside out.
    fn analyze_n_vars(
        &mut self,
        quants: &[DeclId],
        alluses: &[Vec<ExprId>],
        cond: ExprId,
        body: StmtId,
    ) -> Result<StmtId, AnalysisError> {
        let kinds: Vec<QuantKind> = quants
            .iter()
            .map(|&q| self.prog.decl(q).quant.unwrap_or(QuantKind::Each))
            .collect();
        let innermost = kinds[kinds.len() - 1];
        if kinds.iter().all(|&k| k == innermost) {
            return self.analyze_n_vars_all_same(quants, alluses, innermost, cond, body);
        }

        let mut mainblock = Vec::new();
        let no = self.prog.bool_lit(false);
        let succeeded = self.temp_decl("$succeeded", Type::Bool, no);
        mainblock.push(self.prog.add_stmt(Stmt::Decl(succeeded)));

        let mut forbody_items = Vec::new();
        let mut break_loop = None;
        let mut break_all = None;
        let (ifbody, else_clause) = match innermost {
            QuantKind::Some => {
                let succeeded_var = self.prog.var(succeeded);
                let yes = self.prog.bool_lit(true);
                let mark = self.prog.add_stmt(Stmt::Assign {
                    lhs: succeeded_var,
                    rhs: yes,
                });
                let brk = self.prog.add_stmt(Stmt::Break { target: None });
                break_loop = Some(brk);
                let ifbody = self.prog.add_stmt(Stmt::Block(vec![body, mark, brk]));
                let empty = self.prog.add_stmt(Stmt::Empty);
                (ifbody, empty)
            }
            QuantKind::Each => {
                let succeeded_var = self.prog.var(succeeded);
                let yes = self.prog.bool_lit(true);
                let mark = self.prog.add_stmt(Stmt::Assign {
                    lhs: succeeded_var,
                    rhs: yes,
                });
                let ifbody = self.prog.add_stmt(Stmt::Block(vec![body, mark]));
                let empty = self.prog.add_stmt(Stmt::Empty);
                (ifbody, empty)
            }
            QuantKind::All => {
                let ifbody = self.prog.add_stmt(Stmt::Empty);
                let brk = self.prog.add_stmt(Stmt::Break { target: None });
                break_all = Some(brk);
                (ifbody, brk)
            }
        };

        let tcond = self.protect_condition(cond, &mut forbody_items);
        forbody_items.push(self.prog.add_stmt(Stmt::If {
            cond: tcond,
            then_part: ifbody,
            else_part: else_clause,
        }));
        let mut forbody = self.prog.add_stmt(Stmt::Block(forbody_items));

        let last = quants.len() - 1;
        forbody = self.create_for_loop(quants, quants[last], &alluses[last], None, forbody, break_loop)?;
        if innermost == QuantKind::All {
            forbody = self.create_while_all_loop(Some(succeeded), forbody, break_all, body);
        }
        for i in (0..last).rev() {
            forbody =
                self.create_for_loop(quants, quants[i], &alluses[i], Some(succeeded), forbody, None)?;
        }
        mainblock.push(forbody);
        Ok(self.prog.add_stmt(Stmt::Block(mainblock)))
    }

    fn analyze_n_vars_all_same(
        &mut self,
        quants: &[DeclId],
        alluses: &[Vec<ExprId>],
        kind: QuantKind,
        cond: ExprId,
        body: StmtId,
    ) -> Result<StmtId, AnalysisError> {
        let break_outermost = self.prog.add_stmt(Stmt::Break { target: None });
        let mut forbody_items = Vec::new();
        let (ifbody, else_clause) = match kind {
            QuantKind::Some => {
                let ifbody = self.prog.add_stmt(Stmt::Block(vec![body, break_outermost]));
                let empty = self.prog.add_stmt(Stmt::Empty);
                (ifbody, empty)
            }
            QuantKind::Each => {
                let empty = self.prog.add_stmt(Stmt::Empty);
                (body, empty)
            }
            QuantKind::All => {
                let empty = self.prog.add_stmt(Stmt::Empty);
                (empty, break_outermost)
            }
        };
        let tcond = self.protect_condition(cond, &mut forbody_items);
        forbody_items.push(self.prog.add_stmt(Stmt::If {
            cond: tcond,
            then_part: ifbody,
            else_part: else_clause,
        }));
        let mut forbody = self.prog.add_stmt(Stmt::Block(forbody_items));

        for i in (0..quants.len()).rev() {
            forbody = self.create_for_loop(
                quants,
                quants[i],
                &alluses[i],
                None,
                forbody,
                Some(break_outermost),
            )?;
        }
        if kind == QuantKind::All {
            forbody = self.create_while_all_loop(None, forbody, Some(break_outermost), body);
        }
        Ok(forbody)
    }

    // The loop can use the quantifier itself as its index when the
    // quantifier is an int not used to index a map; otherwise a fresh
    // `$index` drives the loop and the quantifier is assigned from it.
    // With several maps like m1[s] == 1 && m2[s] == 2, any one of them
    // recovers the key for a given position: the restriction to trivial
    // index expressions keeps the iterations aligned.
    fn bind_index_var(
        &mut self,
        block: &mut Vec<StmtId>,
        quant_decl: DeclId,
        uses: &[ExprId],
        min: DeclId,
    ) -> (DeclId, Option<ExprId>) {
        let map_use = uses
            .iter()
            .copied()
            .find(|&u| self.type_of_var_of(u).is_some_and(|t| t.is_map()));
        if self.prog.decl(quant_decl).ty.is_int() && map_use.is_none() {
            let min_var = self.prog.var(min);
            self.prog.decl_mut(quant_decl).init = Some(min_var);
            (quant_decl, None)
        } else {
            block.push(self.prog.add_stmt(Stmt::Decl(quant_decl)));
            let min_var = self.prog.var(min);
            let index = self.temp_decl("$index", Type::Int, min_var);
            (index, map_use)
        }
    }
}
