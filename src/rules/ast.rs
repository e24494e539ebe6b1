use std::fmt;

use crate::ops::OpFn;
use crate::types::Value;

/// A typed rule expression node. Every node carries the resolved type name
/// of the value it produces.
#[derive(Debug, Clone)]
pub enum RuleNode {
    Literal {
        value: Value,
        type_name: String,
    },
    Variable {
        path: String,
        type_name: String,
    },
    Unary {
        token: String,
        operand: Box<RuleNode>,
        type_name: String,
        func: Option<OpFn>,
    },
    Binary {
        token: String,
        left: Box<RuleNode>,
        right: Box<RuleNode>,
        type_name: String,
        func: Option<OpFn>,
    },
    Call {
        name: String,
        args: Vec<RuleNode>,
        type_name: String,
    },
    ListLiteral {
        items: Vec<RuleNode>,
        type_name: String,
    },
}

impl RuleNode {
    /// The resolved type name of this node's value.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            RuleNode::Literal { type_name, .. }
            | RuleNode::Variable { type_name, .. }
            | RuleNode::Unary { type_name, .. }
            | RuleNode::Binary { type_name, .. }
            | RuleNode::Call { type_name, .. }
            | RuleNode::ListLiteral { type_name, .. } => type_name,
        }
    }
}

impl fmt::Display for RuleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleNode::Literal { value, .. } => write!(f, "{value}"),
            RuleNode::Variable { path, .. } => f.write_str(path),
            RuleNode::Unary { token, operand, .. } => write!(f, "({token} {operand})"),
            RuleNode::Binary {
                token, left, right, ..
            } => write!(f, "({left} {token} {right})"),
            RuleNode::Call { name, args, .. } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            RuleNode::ListLiteral { items, .. } => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A fully parsed rule: the typed expression tree plus the names it
/// references, collected once for introspection.
#[derive(Debug, Clone)]
pub struct RuleAst {
    pub root: RuleNode,
    pub return_type: String,
    pub variables: Vec<String>,
    pub functions: Vec<String>,
}

impl RuleAst {
    #[must_use]
    pub fn new(root: RuleNode) -> Self {
        let mut variables = Vec::new();
        let mut functions = Vec::new();
        collect_references(&root, &mut variables, &mut functions);
        let return_type = root.type_name().to_owned();
        Self {
            root,
            return_type,
            variables,
            functions,
        }
    }
}

fn collect_references(node: &RuleNode, variables: &mut Vec<String>, functions: &mut Vec<String>) {
    match node {
        RuleNode::Variable { path, .. } => {
            if !variables.iter().any(|v| v == path) {
                variables.push(path.clone());
            }
        }
        RuleNode::Call { name, args, .. } => {
            if !functions.iter().any(|f| f == name) {
                functions.push(name.clone());
            }
            for arg in args {
                collect_references(arg, variables, functions);
            }
        }
        RuleNode::Binary { left, right, .. } => {
            collect_references(left, variables, functions);
            collect_references(right, variables, functions);
        }
        RuleNode::Unary { operand, .. } => collect_references(operand, variables, functions),
        RuleNode::ListLiteral { items, .. } => {
            for item in items {
                collect_references(item, variables, functions);
            }
        }
        RuleNode::Literal { .. } => {}
    }
}
