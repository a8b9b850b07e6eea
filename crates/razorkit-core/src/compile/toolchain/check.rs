//! Name resolution and lowering to the IR

use super::parser::{self as syntax, ExprKind, Member, Named, Unit};
use super::CompileOptions;
use crate::compile::diagnostic::{codes, Diagnostic};
use crate::compile::ir::{self, Builtin, Callee, Import, Module};
use crate::compile::reference::ReferenceHandle;
use crate::config::consts::{BINARY_FORMAT_VERSION, GENERATED_NAMESPACE};
use crate::types::SourcePos;
use serde_json::Value;
use std::collections::BTreeSet;

struct Checker<'a> {
    options: &'a CompileOptions,
    references: &'a [ReferenceHandle],
    usings: Vec<String>,
    /// Name and parameter count of each template function
    functions: Vec<(String, usize)>,
    sections: Vec<&'a syntax::SectionDecl>,
    lowered_sections: Vec<Option<ir::Section>>,
    imports: Vec<Import>,
    called: BTreeSet<usize>,
    diagnostics: Vec<Diagnostic>,
}

/// Resolves every name in `unit`. Returns the module when no error was
/// reported, plus all diagnostics.
pub(crate) fn lower(
    unit: &Unit,
    options: &CompileOptions,
    references: &[ReferenceHandle],
) -> (Option<Module>, Vec<Diagnostic>) {
    let mut usings: Vec<String> = unit.usings.iter().map(|u| u.name.clone()).collect();
    for using in &options.usings {
        if !usings.contains(using) {
            usings.push(using.clone());
        }
    }

    let mut checker = Checker {
        options,
        references,
        usings,
        functions: Vec::new(),
        sections: Vec::new(),
        lowered_sections: Vec::new(),
        imports: Vec::new(),
        called: BTreeSet::new(),
        diagnostics: Vec::new(),
    };
    let module = checker.module(unit);
    let failed = checker.diagnostics.iter().any(Diagnostic::is_error);
    (module.filter(|_| !failed), checker.diagnostics)
}

impl<'a> Checker<'a> {
    fn error(&mut self, code: &str, pos: SourcePos, message: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::error(code, Some(pos), message));
    }

    fn warning(&mut self, code: &str, pos: SourcePos, message: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::warning(code, Some(pos), message));
    }

    fn module(&mut self, unit: &'a Unit) -> Option<Module> {
        let class = &unit.class;
        self.check_header(unit);

        let mut layout = None;
        let mut layout_inherited = false;
        let mut execute = None;
        let mut function_decls = Vec::new();
        for member in &class.members {
            match member {
                Member::Layout {
                    key,
                    pos,
                    inherited,
                } => {
                    if layout.is_some() {
                        self.error(codes::SYNTAX, *pos, "The layout is declared more than once");
                    }
                    layout = Some(key.clone());
                    layout_inherited = *inherited;
                }
                Member::Function(decl) => {
                    if self.functions.iter().any(|(name, _)| *name == decl.name.name) {
                        self.error(
                            codes::DUPLICATE_FUNCTION,
                            decl.name.pos,
                            format!("The function '{}' is already defined", decl.name.name),
                        );
                        continue;
                    }
                    self.functions
                        .push((decl.name.name.clone(), decl.params.len()));
                    function_decls.push(decl);
                }
                Member::Section(decl) => {
                    if self.sections.iter().any(|s| s.name == decl.name) {
                        self.error(
                            codes::SYNTAX,
                            decl.pos,
                            format!("The section '{}' is declared more than once", decl.name),
                        );
                        continue;
                    }
                    self.sections.push(decl);
                }
                Member::Execute { body, pos } => {
                    if execute.is_some() {
                        self.error(codes::SYNTAX, *pos, "The execute block is declared more than once");
                    }
                    execute = Some(body);
                }
            }
        }
        self.lowered_sections = vec![None; self.sections.len()];

        let functions: Vec<ir::Function> = function_decls
            .iter()
            .map(|decl| {
                let params: Vec<String> = decl.params.iter().map(|p| p.name.clone()).collect();
                ir::Function {
                    name: decl.name.name.clone(),
                    body: self.expr(&decl.body, &params),
                    params,
                    at: decl.at,
                }
            })
            .collect();

        let mut locals = Vec::new();
        let body = match execute {
            Some(body) => self.stmts(body, &mut locals),
            None => {
                self.error(codes::SYNTAX, class.name.pos, "The class has no execute block");
                Vec::new()
            }
        };

        // Sections never registered by the body still compile on their own
        for index in 0..self.sections.len() {
            if self.lowered_sections[index].is_none() {
                self.lower_section(index, &mut Vec::new());
            }
        }

        for (index, decl) in function_decls.iter().enumerate() {
            if !self.called.contains(&index) {
                self.warning(
                    codes::UNUSED_FUNCTION,
                    decl.name.pos,
                    format!("The function '{}' is never called", decl.name.name),
                );
            }
        }

        let sections = std::mem::take(&mut self.lowered_sections)
            .into_iter()
            .flatten()
            .collect();

        Some(Module {
            format: BINARY_FORMAT_VERSION,
            namespace: unit
                .namespace
                .clone()
                .unwrap_or_else(|| GENERATED_NAMESPACE.to_string()),
            class_name: class.name.name.clone(),
            base_type: class.base.name.clone(),
            model_type: class.model.name.clone(),
            usings: self.usings.clone(),
            layout,
            layout_inherited,
            imports: std::mem::take(&mut self.imports),
            functions,
            sections,
            body,
        })
    }

    fn check_header(&mut self, unit: &Unit) {
        let class = &unit.class;
        if !self
            .options
            .base_types
            .iter()
            .any(|base| base.name == class.base.name)
        {
            self.error(
                codes::UNKNOWN_BASE_TYPE,
                class.base.pos,
                format!("The base type '{}' could not be found", class.base.name),
            );
        }

        let requested = &self.options.model_type;
        if !requested.is_dynamic() && requested.name() != class.model.name {
            let message = format!(
                "The template declares model '{}' but is compiled for '{}'",
                class.model.name,
                requested.name()
            );
            self.warning(codes::MODEL_MISMATCH, class.model.pos, message);
        }

        for using in &unit.usings {
            if !self.has_namespace(&using.name) {
                self.warning(
                    codes::UNKNOWN_NAMESPACE,
                    using.pos,
                    format!(
                        "The namespace '{}' is not provided by any reference",
                        using.name
                    ),
                );
            }
        }
    }

    fn has_namespace(&self, namespace: &str) -> bool {
        self.references.iter().any(|r| r.namespace() == namespace)
    }

    fn lower_section(&mut self, index: usize, locals: &mut Vec<String>) {
        let section = self.sections[index];
        let body = self.stmts(&section.body, locals);
        self.lowered_sections[index] = Some(ir::Section {
            name: section.name.clone(),
            body,
        });
    }

    fn stmts(&mut self, stmts: &[syntax::Stmt], locals: &mut Vec<String>) -> Vec<ir::Stmt> {
        let depth = locals.len();
        let lowered = stmts
            .iter()
            .filter_map(|stmt| self.stmt(stmt, locals))
            .collect();
        locals.truncate(depth);
        lowered
    }

    fn stmt(&mut self, stmt: &syntax::Stmt, locals: &mut Vec<String>) -> Option<ir::Stmt> {
        let lowered = match stmt {
            syntax::Stmt::Write(text) => ir::Stmt::Write(text.clone()),
            syntax::Stmt::Emit { expr, at } => ir::Stmt::Emit {
                expr: self.expr(expr, locals),
                at: *at,
            },
            syntax::Stmt::Var { name, expr, at } => {
                let expr = self.expr(expr, locals);
                locals.push(name.name.clone());
                ir::Stmt::Let {
                    name: name.name.clone(),
                    expr,
                    at: *at,
                }
            }
            syntax::Stmt::If {
                branches,
                otherwise,
                at,
            } => ir::Stmt::If {
                branches: branches
                    .iter()
                    .map(|(cond, body)| ir::Branch {
                        cond: self.expr(cond, locals),
                        body: self.stmts(body, locals),
                    })
                    .collect(),
                otherwise: otherwise.as_ref().map(|body| self.stmts(body, locals)),
                at: *at,
            },
            syntax::Stmt::ForEach {
                var,
                source,
                body,
                at,
            } => {
                let source = self.expr(source, locals);
                locals.push(var.name.clone());
                let body = self.stmts(body, locals);
                locals.pop();
                ir::Stmt::ForEach {
                    var: var.name.clone(),
                    source,
                    body,
                    at: *at,
                }
            }
            syntax::Stmt::DefineSection { name, pos } => {
                let Some(index) = self.sections.iter().position(|s| s.name == *name) else {
                    self.error(
                        codes::SYNTAX,
                        *pos,
                        format!("The section '{}' is not declared", name),
                    );
                    return None;
                };
                // The section body sees the locals in scope where it is defined
                let mut captured = locals.clone();
                self.lower_section(index, &mut captured);
                ir::Stmt::DefineSection { section: index }
            }
        };
        Some(lowered)
    }

    fn expr(&mut self, expr: &syntax::Expr, locals: &[String]) -> ir::Expr {
        match &expr.kind {
            ExprKind::Literal(value) => ir::Expr::Literal(value.clone()),
            ExprKind::Name(name) => {
                if locals.contains(name) {
                    ir::Expr::Local(name.clone())
                } else if name == "Model" {
                    ir::Expr::Model
                } else {
                    self.error(
                        codes::UNKNOWN_NAME,
                        expr.pos,
                        format!("The name '{}' does not exist in the current context", name),
                    );
                    ir::Expr::Literal(Value::Null)
                }
            }
            ExprKind::Member { target, name } => {
                if matches!(&target.kind, ExprKind::Name(root) if root == "Model" && !locals.contains(root))
                {
                    self.check_model_member(name);
                }
                ir::Expr::Member {
                    target: Box::new(self.expr(target, locals)),
                    name: name.name.clone(),
                }
            }
            ExprKind::Call { target, args } => {
                let callee = self.callee(target, args.len(), locals);
                let args = args.iter().map(|arg| self.expr(arg, locals)).collect();
                match callee {
                    Some(callee) => ir::Expr::Call { callee, args },
                    None => ir::Expr::Literal(Value::Null),
                }
            }
            ExprKind::Not(operand) => ir::Expr::Not(Box::new(self.expr(operand, locals))),
            ExprKind::Binary { op, lhs, rhs } => ir::Expr::Binary {
                op: *op,
                lhs: Box::new(self.expr(lhs, locals)),
                rhs: Box::new(self.expr(rhs, locals)),
            },
        }
    }

    fn check_model_member(&mut self, member: &Named) {
        let model = &self.options.model_type;
        if !model.accepts_member(&member.name) {
            let message = format!(
                "'{}' does not contain a definition for '{}'",
                model.name(),
                member.name
            );
            self.error(codes::UNKNOWN_MEMBER, member.pos, message);
        }
    }

    fn check_arity(&mut self, name: &str, pos: SourcePos, (min, max): (usize, usize), count: usize) -> bool {
        if (min..=max).contains(&count) {
            return true;
        }
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{} to {}", min, max)
        };
        self.error(
            codes::ARITY,
            pos,
            format!(
                "'{}' takes {} arguments but {} were supplied",
                name, expected, count
            ),
        );
        false
    }

    fn callee(&mut self, target: &syntax::Expr, argc: usize, locals: &[String]) -> Option<Callee> {
        match &target.kind {
            ExprKind::Name(name) if locals.contains(name) => {
                self.error(
                    codes::UNKNOWN_FUNCTION,
                    target.pos,
                    format!("'{}' is a variable and cannot be called", name),
                );
                None
            }
            ExprKind::Name(name) => self.resolve_unqualified(name, target.pos, argc),
            ExprKind::Member { .. } => {
                let Some(path) = dotted_path(target) else {
                    self.error(
                        codes::UNKNOWN_FUNCTION,
                        target.pos,
                        "Only template functions and helpers can be called",
                    );
                    return None;
                };
                self.resolve_qualified(&path, target.pos, argc)
            }
            _ => {
                self.error(codes::UNKNOWN_FUNCTION, target.pos, "This expression cannot be called");
                None
            }
        }
    }

    fn resolve_unqualified(&mut self, name: &str, pos: SourcePos, argc: usize) -> Option<Callee> {
        if let Some(index) = self.functions.iter().position(|(f, _)| f == name) {
            let params = self.functions[index].1;
            self.called.insert(index);
            return self
                .check_arity(name, pos, (params, params), argc)
                .then_some(Callee::Function(index));
        }

        if let Some(builtin) = Builtin::lookup(name) {
            return self
                .check_arity(name, pos, builtin.arity(), argc)
                .then_some(Callee::Builtin(builtin));
        }

        let candidates: Vec<ReferenceHandle> = self
            .references
            .iter()
            .filter(|r| self.usings.iter().any(|u| u == r.namespace()) && r.helper(name).is_some())
            .cloned()
            .collect();
        match candidates.as_slice() {
            [] => {
                self.error(
                    codes::UNKNOWN_FUNCTION,
                    pos,
                    format!("The function '{}' does not exist in the current context", name),
                );
                None
            }
            [reference] => self.bind_helper(reference, name, pos, argc),
            several => {
                let namespaces: Vec<&str> = several.iter().map(|r| r.namespace()).collect();
                self.error(
                    codes::AMBIGUOUS,
                    pos,
                    format!(
                        "The call '{}' is ambiguous between namespaces {}",
                        name,
                        namespaces.join(", ")
                    ),
                );
                None
            }
        }
    }

    fn resolve_qualified(&mut self, path: &str, pos: SourcePos, argc: usize) -> Option<Callee> {
        let (namespace, name) = path.rsplit_once('.')?;
        let reference = self
            .references
            .iter()
            .find(|r| r.namespace() == namespace)
            .cloned();
        match reference {
            Some(reference) if reference.helper(name).is_some() => {
                self.bind_helper(&reference, name, pos, argc)
            }
            Some(_) => {
                self.error(
                    codes::UNKNOWN_FUNCTION,
                    pos,
                    format!("The namespace '{}' has no function '{}'", namespace, name),
                );
                None
            }
            None => {
                let code = if namespace == "Model" || namespace.starts_with("Model.") {
                    codes::UNKNOWN_FUNCTION
                } else {
                    codes::UNKNOWN_NAME
                };
                self.error(
                    code,
                    pos,
                    format!("'{}' is not a function or a known namespace", path),
                );
                None
            }
        }
    }

    fn bind_helper(
        &mut self,
        reference: &ReferenceHandle,
        name: &str,
        pos: SourcePos,
        argc: usize,
    ) -> Option<Callee> {
        let helper = reference.helper(name)?;
        if !helper.arity().accepts(argc) {
            self.error(
                codes::ARITY,
                pos,
                format!(
                    "'{}.{}' takes {} arguments but {} were supplied",
                    reference.namespace(),
                    name,
                    helper.arity(),
                    argc
                ),
            );
            return None;
        }
        let import = Import {
            namespace: reference.namespace().to_string(),
            name: name.to_string(),
        };
        let slot = match self.imports.iter().position(|existing| *existing == import) {
            Some(slot) => slot,
            None => {
                self.imports.push(import);
                self.imports.len() - 1
            }
        };
        Some(Callee::Helper(slot))
    }
}

/// `A.B.C` for a member chain rooted at a name
fn dotted_path(expr: &syntax::Expr) -> Option<String> {
    match &expr.kind {
        ExprKind::Name(name) => Some(name.clone()),
        ExprKind::Member { target, name } => {
            let mut path = dotted_path(target)?;
            path.push('.');
            path.push_str(&name.name);
            Some(path)
        }
        _ => None,
    }
}
