//! Executing compiled templates
//!
//! A [`TemplateInstance`] binds one model to a [`CompiledTemplate`] for a
//! single render. Executing it walks the program's statements, writing to a
//! string buffer and registering sections with the [`ExecuteContext`].

use super::context::ExecuteContext;
use super::error::{ExecutionCause, ExecutionError};
use super::value::{self, html_encode, Evaluated};
use crate::compile::ir::{BinaryOp, Builtin, Callee, Expr, Stmt};
use crate::compile::CompiledTemplate;
use crate::config::consts::limits::MAX_CALL_DEPTH;
use crate::error::TemplateError;
use crate::types::{Encoding, ModelType, SourcePos};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// What executing templates need from the engine
pub trait RenderHost {
    /// Renders the template `key` as a partial with its own execute context
    fn include(&self, key: &str, model_type: &ModelType, model: Value)
        -> Result<String, TemplateError>;
}

/// A section body bound to the template instance that defined it
#[derive(Clone)]
pub struct SectionAction {
    compiled: Arc<CompiledTemplate>,
    model: Arc<Value>,
    section: usize,
    /// Locals in scope where the section was defined
    locals: Vec<(String, Value)>,
}

impl SectionAction {
    /// Key of the template that defined the section
    pub fn template(&self) -> &str {
        self.compiled.template()
    }

    pub fn name(&self) -> &str {
        self.compiled
            .program()
            .module()
            .sections
            .get(self.section)
            .map_or("", |section| section.name.as_str())
    }

    pub fn render(
        &self,
        context: &mut ExecuteContext,
        host: &dyn RenderHost,
    ) -> Result<String, TemplateError> {
        let program = self.compiled.program();
        let Some(section) = program.module().sections.get(self.section) else {
            return Err(TemplateError::Execution(ExecutionError::new(
                self.compiled.template(),
                None,
                ExecutionCause::InvalidBinary {
                    message: format!("section slot {} does not exist", self.section),
                },
            )));
        };

        let interpreter = Interpreter {
            compiled: &self.compiled,
            model: &self.model,
            model_type: self.compiled.model_type(),
            host,
        };
        let mut scope = self.locals.clone();
        let mut out = String::new();
        interpreter.stmts(&section.body, &mut scope, context, &mut out)?;
        Ok(out)
    }
}

impl fmt::Debug for SectionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionAction")
            .field("template", &self.template())
            .field("section", &self.name())
            .finish_non_exhaustive()
    }
}

impl PartialEq for SectionAction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.compiled, &other.compiled)
            && Arc::ptr_eq(&self.model, &other.model)
            && self.section == other.section
            && self.locals == other.locals
    }
}

impl Eq for SectionAction {}

/// One render of a compiled template with a bound model
#[derive(Debug)]
pub struct TemplateInstance {
    compiled: Arc<CompiledTemplate>,
    model: Arc<Value>,
}

impl TemplateInstance {
    pub(crate) fn new(compiled: Arc<CompiledTemplate>, model: Value) -> Self {
        Self {
            compiled,
            model: Arc::new(model),
        }
    }

    pub fn template(&self) -> &str {
        self.compiled.template()
    }

    pub fn layout(&self) -> Option<&str> {
        self.compiled.layout()
    }

    pub fn model(&self) -> &Value {
        &self.model
    }

    /// Runs the template body in the current frame of `context`
    pub fn execute(
        &self,
        context: &mut ExecuteContext,
        host: &dyn RenderHost,
    ) -> Result<String, TemplateError> {
        let interpreter = Interpreter {
            compiled: &self.compiled,
            model: &self.model,
            model_type: self.compiled.model_type(),
            host,
        };
        let mut scope = Vec::new();
        let mut out = String::new();
        interpreter.stmts(
            &self.compiled.program().module().body,
            &mut scope,
            context,
            &mut out,
        )?;
        Ok(out)
    }
}

/// Failure inside expression evaluation
enum Fault {
    Cause(ExecutionCause),
    /// An error from a nested render, passed through unchanged
    Nested(TemplateError),
}

impl From<ExecutionCause> for Fault {
    fn from(cause: ExecutionCause) -> Self {
        Fault::Cause(cause)
    }
}

type Scope = Vec<(String, Value)>;

struct Interpreter<'a> {
    compiled: &'a Arc<CompiledTemplate>,
    model: &'a Arc<Value>,
    model_type: &'a ModelType,
    host: &'a dyn RenderHost,
}

impl Interpreter<'_> {
    fn fail(&self, at: Option<SourcePos>, fault: Fault) -> TemplateError {
        match fault {
            Fault::Cause(cause) => TemplateError::Execution(ExecutionError::new(
                self.compiled.template(),
                at,
                cause,
            )),
            Fault::Nested(error) => error,
        }
    }

    fn stmts(
        &self,
        stmts: &[Stmt],
        scope: &mut Scope,
        context: &mut ExecuteContext,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        let depth = scope.len();
        let result = stmts
            .iter()
            .try_for_each(|stmt| self.stmt(stmt, scope, context, out));
        scope.truncate(depth);
        result
    }

    fn stmt(
        &self,
        stmt: &Stmt,
        scope: &mut Scope,
        context: &mut ExecuteContext,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        match stmt {
            Stmt::Write(text) => out.push_str(text),
            Stmt::Emit { expr, at } => {
                let value = self
                    .eval(expr, scope, context, 0)
                    .map_err(|f| self.fail(*at, f))?;
                self.write(value, out).map_err(|f| self.fail(*at, f))?;
            }
            Stmt::Let { name, expr, at } => {
                let value = self
                    .eval(expr, scope, context, 0)
                    .map_err(|f| self.fail(*at, f))?;
                scope.push((name.clone(), value.into_value()));
            }
            Stmt::If {
                branches,
                otherwise,
                at,
            } => {
                for branch in branches {
                    let cond = self
                        .eval(&branch.cond, scope, context, 0)
                        .map_err(|f| self.fail(*at, f))?;
                    if value::truthy(&cond.into_value()) {
                        return self.stmts(&branch.body, scope, context, out);
                    }
                }
                if let Some(body) = otherwise {
                    self.stmts(body, scope, context, out)?;
                }
            }
            Stmt::ForEach {
                var,
                source,
                body,
                at,
            } => {
                let source = self
                    .eval(source, scope, context, 0)
                    .map_err(|f| self.fail(*at, f))?;
                let items = value::iterate(source.into_value())
                    .map_err(|cause| self.fail(*at, Fault::Cause(cause)))?;
                for item in items {
                    scope.push((var.clone(), item));
                    let result = self.stmts(body, scope, context, out);
                    scope.pop();
                    result?;
                }
            }
            Stmt::DefineSection { section } => {
                let name = self
                    .compiled
                    .program()
                    .module()
                    .sections
                    .get(*section)
                    .map(|s| s.name.clone())
                    .unwrap_or_default();
                let action = SectionAction {
                    compiled: Arc::clone(self.compiled),
                    model: Arc::clone(self.model),
                    section: *section,
                    locals: scope.clone(),
                };
                context
                    .define_section(&name, action)
                    .map_err(|cause| self.fail(None, Fault::Cause(cause)))?;
            }
        }
        Ok(())
    }

    fn write(&self, value: Evaluated, out: &mut String) -> Result<(), Fault> {
        match value {
            Evaluated::Markup(text) => out.push_str(&text),
            Evaluated::Value(value) => {
                let text = value::stringify(&value)?;
                match self.compiled.encoding() {
                    Encoding::Html => out.push_str(&html_encode(&text)),
                    Encoding::Raw => out.push_str(&text),
                }
            }
        }
        Ok(())
    }

    fn eval(
        &self,
        expr: &Expr,
        scope: &Scope,
        context: &mut ExecuteContext,
        depth: usize,
    ) -> Result<Evaluated, Fault> {
        let value = match expr {
            Expr::Literal(value) => value.clone(),
            Expr::Model => Value::clone(self.model),
            Expr::Local(name) => lookup(scope, name)
                .cloned()
                .ok_or_else(|| ExecutionCause::UndefinedName { name: name.clone() })?,
            Expr::Member { target, name } => {
                let target_value = self.eval(target, scope, context, depth)?.into_value();
                value::member(&target_value, name).ok_or_else(|| {
                    ExecutionCause::MemberNotFound {
                        target: describe(target, &target_value),
                        member: name.clone(),
                    }
                })?
            }
            Expr::Call { callee, args } => return self.call(*callee, args, scope, context, depth),
            Expr::Not(operand) => {
                let operand = self.eval(operand, scope, context, depth)?.into_value();
                Value::Bool(!value::truthy(&operand))
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, scope, context, depth)?.into_value();
                match op {
                    BinaryOp::And if !value::truthy(&lhs) => Value::Bool(false),
                    BinaryOp::Or if value::truthy(&lhs) => Value::Bool(true),
                    _ => {
                        let rhs = self.eval(rhs, scope, context, depth)?.into_value();
                        Value::Bool(match op {
                            BinaryOp::Eq => value::loosely_equal(&lhs, &rhs),
                            BinaryOp::Ne => !value::loosely_equal(&lhs, &rhs),
                            BinaryOp::And | BinaryOp::Or => value::truthy(&rhs),
                        })
                    }
                }
            }
        };
        Ok(Evaluated::Value(value))
    }

    fn args(
        &self,
        args: &[Expr],
        scope: &Scope,
        context: &mut ExecuteContext,
        depth: usize,
    ) -> Result<Vec<Value>, Fault> {
        args.iter()
            .map(|arg| Ok(self.eval(arg, scope, context, depth)?.into_value()))
            .collect()
    }

    fn call(
        &self,
        callee: Callee,
        args: &[Expr],
        scope: &Scope,
        context: &mut ExecuteContext,
        depth: usize,
    ) -> Result<Evaluated, Fault> {
        match callee {
            Callee::Builtin(builtin) => self.builtin(builtin, args, scope, context, depth),
            Callee::Function(index) => {
                if depth >= MAX_CALL_DEPTH {
                    return Err(ExecutionCause::RecursionLimit {
                        depth: MAX_CALL_DEPTH,
                    }
                    .into());
                }
                let function = self
                    .compiled
                    .program()
                    .module()
                    .functions
                    .get(index)
                    .ok_or_else(|| invalid_slot("function", index))?;
                let values = self.args(args, scope, context, depth)?;
                let locals: Scope = function.params.iter().cloned().zip(values).collect();
                self.eval(&function.body, &locals, context, depth + 1)
            }
            Callee::Helper(slot) => {
                let program = self.compiled.program();
                let helper = program
                    .helper(slot)
                    .ok_or_else(|| invalid_slot("helper", slot))?;
                let values = self.args(args, scope, context, depth)?;
                let result = helper.call(&values).map_err(|message| {
                    let helper = program
                        .module()
                        .imports
                        .get(slot)
                        .map(|import| format!("{}.{}", import.namespace, import.name))
                        .unwrap_or_default();
                    ExecutionCause::HelperFailed { helper, message }
                })?;
                if helper.returns_markup() {
                    Ok(Evaluated::Markup(value::stringify(&result)?))
                } else {
                    Ok(Evaluated::Value(result))
                }
            }
        }
    }

    fn builtin(
        &self,
        builtin: Builtin,
        args: &[Expr],
        scope: &Scope,
        context: &mut ExecuteContext,
        depth: usize,
    ) -> Result<Evaluated, Fault> {
        let mut values = self.args(args, scope, context, depth)?.into_iter();
        let mut text_arg = |what: &str| -> Result<String, Fault> {
            match values.next() {
                Some(Value::String(text)) => Ok(text),
                other => Err(ExecutionCause::HelperFailed {
                    helper: builtin.name().to_string(),
                    message: format!(
                        "{} must be a string, got {}",
                        what,
                        other.as_ref().map_or("nothing", value::kind)
                    ),
                }
                .into()),
            }
        };

        match builtin {
            Builtin::RenderBody => context
                .current_body()
                .map(|body| Evaluated::Markup(body.content().to_string()))
                .ok_or(Fault::Cause(ExecutionCause::BodyUnavailable)),
            Builtin::IsSectionDefined => {
                let name = text_arg("section name")?;
                Ok(Evaluated::Value(Value::Bool(context.is_section_defined(&name))))
            }
            Builtin::RenderSection => {
                let name = text_arg("section name")?;
                let required = values.next().is_some_and(|v| value::truthy(&v));
                let host = self.host;
                match context.render_section_with(&name, |context, action| {
                    action.render(context, host)
                }) {
                    Some(rendered) => Ok(Evaluated::Markup(rendered.map_err(Fault::Nested)?)),
                    None if required => {
                        Err(ExecutionCause::RequiredSectionMissing { name }.into())
                    }
                    None => Ok(Evaluated::Markup(String::new())),
                }
            }
            Builtin::Include => {
                let key = text_arg("template key")?;
                let rendered = match values.next() {
                    Some(model) => self.host.include(&key, &ModelType::dynamic(), model),
                    None => self
                        .host
                        .include(&key, self.model_type, Value::clone(self.model)),
                };
                rendered.map(Evaluated::Markup).map_err(Fault::Nested)
            }
            Builtin::Raw => {
                let value = values.next().unwrap_or(Value::Null);
                Ok(Evaluated::Markup(value::stringify(&value)?))
            }
        }
    }
}

fn lookup<'s>(scope: &'s Scope, name: &str) -> Option<&'s Value> {
    scope
        .iter()
        .rev()
        .find(|(local, _)| local == name)
        .map(|(_, value)| value)
}

/// `Model.Address` for paths, the value kind otherwise
fn describe(expr: &Expr, value: &Value) -> String {
    fn path(expr: &Expr) -> Option<String> {
        match expr {
            Expr::Model => Some("Model".to_string()),
            Expr::Local(name) => Some(name.clone()),
            Expr::Member { target, name } => Some(format!("{}.{}", path(target)?, name)),
            _ => None,
        }
    }
    path(expr).unwrap_or_else(|| value::kind(value).to_string())
}

fn invalid_slot(kind: &str, index: usize) -> Fault {
    Fault::Cause(ExecutionCause::InvalidBinary {
        message: format!("{} slot {} does not exist", kind, index),
    })
}
