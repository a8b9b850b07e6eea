//! Intermediate representation produced by the toolchain
//!
//! A [`Module`] is what a compiled binary contains. Names are fully
//! resolved: locals by name, template functions by index, helpers through
//! the module's import table (linked at load time).

use crate::types::SourcePos;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub format: u32,
    pub namespace: String,
    pub class_name: String,
    pub base_type: String,
    pub model_type: String,
    pub usings: Vec<String>,
    pub layout: Option<String>,
    /// The layout came from an import file and applies to pages only
    #[serde(default)]
    pub layout_inherited: bool,
    pub imports: Vec<Import>,
    pub functions: Vec<Function>,
    pub sections: Vec<Section>,
    pub body: Vec<Stmt>,
}

/// A helper the module calls, bound to a function pointer when linked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: Expr,
    pub at: Option<SourcePos>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub cond: Expr,
    pub body: Vec<Stmt>,
}

/// Statements. `at` is the template position when line pragmas were on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Write(String),
    Emit {
        expr: Expr,
        at: Option<SourcePos>,
    },
    Let {
        name: String,
        expr: Expr,
        at: Option<SourcePos>,
    },
    If {
        branches: Vec<Branch>,
        otherwise: Option<Vec<Stmt>>,
        at: Option<SourcePos>,
    },
    ForEach {
        var: String,
        source: Expr,
        body: Vec<Stmt>,
        at: Option<SourcePos>,
    },
    /// Registers `sections[section]` with the execute context
    DefineSection { section: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Builtin {
    RenderBody,
    RenderSection,
    IsSectionDefined,
    Include,
    Raw,
}

impl Builtin {
    pub const ALL: [Builtin; 5] = [
        Builtin::RenderBody,
        Builtin::RenderSection,
        Builtin::IsSectionDefined,
        Builtin::Include,
        Builtin::Raw,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::RenderBody => "RenderBody",
            Builtin::RenderSection => "RenderSection",
            Builtin::IsSectionDefined => "IsSectionDefined",
            Builtin::Include => "Include",
            Builtin::Raw => "Raw",
        }
    }

    pub fn lookup(name: &str) -> Option<Builtin> {
        Self::ALL.into_iter().find(|builtin| builtin.name() == name)
    }

    /// Accepted argument counts (inclusive)
    pub fn arity(self) -> (usize, usize) {
        match self {
            Builtin::RenderBody => (0, 0),
            Builtin::RenderSection | Builtin::Include => (1, 2),
            Builtin::IsSectionDefined | Builtin::Raw => (1, 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Callee {
    Builtin(Builtin),
    /// Index into [`Module::functions`]
    Function(usize),
    /// Index into [`Module::imports`]
    Helper(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Value),
    Model,
    Local(String),
    Member {
        target: Box<Expr>,
        name: String,
    },
    Call {
        callee: Callee,
        args: Vec<Expr>,
    },
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Module {
    pub fn section_index(&self, name: &str) -> Option<usize> {
        self.sections.iter().position(|section| section.name == name)
    }
}
