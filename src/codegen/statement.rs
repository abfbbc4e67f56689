//! Statements and method bodies of the generated source.

use crate::{
    codegen::expression::{Expression, LValue, LocalId},
    types::JavaType,
};

/// A Java statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `T x;` at the top of the body, for locals assigned in several places
    Declare(LocalId),
    /// `target = value;`, or `T target = value;` when `declare` is set
    Assign {
        /// Assigned place
        target: LValue,
        /// Assigned value
        value: Expression,
        /// Whether the local is declared here
        declare: bool,
    },
    /// An expression evaluated for its effect
    Expression(Expression),
    /// `super(args)` or `this(args)` inside a constructor
    ConstructorCall {
        /// `true` for `this(...)`
        delegate: bool,
        /// Arguments
        args: Vec<Expression>,
    },
    /// `return;` / `return x;`
    Return(Option<Expression>),
    /// `throw x;`
    Throw(Expression),
    /// Lock acquire or release outside a recovered `synchronized` block
    Monitor {
        /// `true` for `monitor-enter`
        enter: bool,
        /// Lock object
        object: Expression,
    },
    /// `if (c) { .. } else { .. }`
    If {
        /// Condition
        condition: Expression,
        /// Taken arm
        then_branch: Vec<Statement>,
        /// Other arm; empty when absent
        else_branch: Vec<Statement>,
    },
    /// `while (c) { .. }`
    While {
        /// Label, when a nested jump targets this loop
        label: Option<String>,
        /// Condition
        condition: Expression,
        /// Body
        body: Vec<Statement>,
    },
    /// `do { .. } while (c);`
    DoWhile {
        /// Label
        label: Option<String>,
        /// Body
        body: Vec<Statement>,
        /// Condition
        condition: Expression,
    },
    /// `while (true) { .. }`
    Loop {
        /// Label
        label: Option<String>,
        /// Body
        body: Vec<Statement>,
    },
    /// `switch (x) { .. }`
    Switch {
        /// Selector
        selector: Expression,
        /// Case groups in source order
        arms: Vec<SwitchArm>,
    },
    /// `try { .. } catch (..) { .. } finally { .. }`
    Try {
        /// Protected body
        body: Vec<Statement>,
        /// Catch clauses in priority order
        catches: Vec<CatchBlock>,
        /// Finally body
        finally: Option<Vec<Statement>>,
    },
    /// `break;` / `break label;`
    Break(Option<String>),
    /// `continue;` / `continue label;`
    Continue(Option<String>),
    /// `label:` of an unstructured entry
    Label(String),
    /// `goto label;` of an unstructured jump
    Goto(String),
    /// `// text`
    Comment(String),
}

impl Statement {
    /// Returns `true` if control never continues after this statement.
    #[must_use]
    pub fn is_abrupt(&self) -> bool {
        matches!(
            self,
            Statement::Return(_)
                | Statement::Throw(_)
                | Statement::Break(_)
                | Statement::Continue(_)
                | Statement::Goto(_)
        )
    }

    /// Calls `f` on this statement and every nested one, in pre-order.
    pub fn visit(&self, f: &mut impl FnMut(&Statement)) {
        f(self);
        let nested: Vec<&Vec<Statement>> = match self {
            Statement::If {
                then_branch,
                else_branch,
                ..
            } => vec![then_branch, else_branch],
            Statement::While { body, .. }
            | Statement::DoWhile { body, .. }
            | Statement::Loop { body, .. } => vec![body],
            Statement::Switch { arms, .. } => arms.iter().map(|arm| &arm.body).collect(),
            Statement::Try {
                body,
                catches,
                finally,
            } => std::iter::once(body)
                .chain(catches.iter().map(|clause| &clause.body))
                .chain(finally.iter())
                .collect(),
            _ => Vec::new(),
        };
        for statements in nested {
            for statement in statements {
                statement.visit(f);
            }
        }
    }
}

/// One case group of a switch statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchArm {
    /// Case keys
    pub keys: Vec<i32>,
    /// `true` if `default:` labels this arm too
    pub default: bool,
    /// Arm body, ending with `break` unless control falls through
    pub body: Vec<Statement>,
}

/// One catch clause.
#[derive(Debug, Clone, PartialEq)]
pub struct CatchBlock {
    /// Caught types; several render as a multi-catch
    pub types: Vec<JavaType>,
    /// Exception variable
    pub local: LocalId,
    /// Handler body
    pub body: Vec<Statement>,
}

/// A named local variable or parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    /// Source name, unique within the method
    pub name: String,
    /// Declared type
    pub ty: JavaType,
    /// `true` for method parameters
    pub parameter: bool,
}

/// The generated body of one method.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodBody {
    /// Every local, parameters included
    pub locals: Vec<LocalVariable>,
    /// Declared parameters in signature order, receiver excluded
    pub params: Vec<LocalId>,
    /// Top-level statements
    pub statements: Vec<Statement>,
}

impl MethodBody {
    /// Returns a local by id.
    #[must_use]
    pub fn local(&self, id: LocalId) -> Option<&LocalVariable> {
        self.locals.get(id.index())
    }

    /// Returns the name of a local, or `?` for unknown ids.
    #[must_use]
    pub fn name(&self, id: LocalId) -> &str {
        self.local(id).map_or("?", |local| local.name.as_str())
    }

    /// Calls `f` on every statement of the body in pre-order.
    pub fn visit(&self, f: &mut impl FnMut(&Statement)) {
        for statement in &self.statements {
            statement.visit(f);
        }
    }
}
