use std::collections::{HashMap, HashSet};

use crate::error::SchemaValidationError;

use super::ast::{FieldDef, Primitive, SchemaAst, TypeExpr};

/// Check a parsed schema for self-consistency: unique names, resolvable type
/// references, and an acyclic struct graph.
pub(crate) fn validate(
    ast: &SchemaAst,
    known_custom_types: &HashSet<String>,
) -> Result<(), SchemaValidationError> {
    check_duplicates(ast)?;
    check_type_references(ast, known_custom_types)?;
    check_struct_cycles(ast)?;
    Ok(())
}

fn check_duplicates(ast: &SchemaAst) -> Result<(), SchemaValidationError> {
    let mut seen: HashSet<&str> = HashSet::new();
    let top_level = ast
        .fields
        .iter()
        .map(|f| f.name.as_str())
        .chain(ast.structs.iter().map(|s| s.name.as_str()))
        .chain(ast.functions.iter().map(|f| f.name.as_str()));
    for name in top_level {
        if !seen.insert(name) {
            return Err(SchemaValidationError::new(format!(
                "duplicate top-level name '{name}'"
            )));
        }
    }

    for s in &ast.structs {
        let mut fields: HashSet<&str> = HashSet::new();
        for f in &s.fields {
            if !fields.insert(f.name.as_str()) {
                return Err(SchemaValidationError::for_field(
                    format!("struct '{}' has duplicate field '{}'", s.name, f.name),
                    f.name.clone(),
                ));
            }
        }
    }
    Ok(())
}

fn check_type_references(
    ast: &SchemaAst,
    known_custom_types: &HashSet<String>,
) -> Result<(), SchemaValidationError> {
    let struct_names: HashSet<&str> = ast.structs.iter().map(|s| s.name.as_str()).collect();
    let resolves = |name: &str| {
        Primitive::parse(name).is_some()
            || struct_names.contains(name)
            || known_custom_types.contains(name)
    };

    let check_type = |ty: &TypeExpr, owner: &str| -> Result<(), SchemaValidationError> {
        match ty {
            TypeExpr::Primitive(_) => Ok(()),
            TypeExpr::Named(name) if resolves(name) => Ok(()),
            TypeExpr::Named(name) => Err(SchemaValidationError::for_field(
                format!("unknown type '{name}' referenced by '{owner}'"),
                owner.to_owned(),
            )),
            TypeExpr::List(elements) => {
                for element in elements {
                    if !resolves(element) {
                        return Err(SchemaValidationError::for_field(
                            format!("unknown list element type '{element}' referenced by '{owner}'"),
                            owner.to_owned(),
                        ));
                    }
                }
                Ok(())
            }
        }
    };

    let check_field = |f: &FieldDef, scope: Option<&str>| -> Result<(), SchemaValidationError> {
        let owner = match scope {
            Some(s) => format!("{s}.{}", f.name),
            None => f.name.clone(),
        };
        check_type(&f.ty, &owner)
    };

    for f in &ast.fields {
        check_field(f, None)?;
    }
    for s in &ast.structs {
        for f in &s.fields {
            check_field(f, Some(&s.name))?;
        }
    }
    for func in &ast.functions {
        for p in &func.params {
            check_type(&p.ty, &format!("{}({})", func.name, p.name))?;
        }
        check_type(&func.return_type, &func.name)?;
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DfsState {
    Unvisited,
    InStack,
    Done,
}

/// Depth-first traversal over the struct reference graph with a
/// currently-visiting set; a back edge is a cycle.
fn check_struct_cycles(ast: &SchemaAst) -> Result<(), SchemaValidationError> {
    let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
    let struct_names: HashSet<&str> = ast.structs.iter().map(|s| s.name.as_str()).collect();
    for s in &ast.structs {
        let mut refs = Vec::new();
        for f in &s.fields {
            match &f.ty {
                TypeExpr::Named(name) if struct_names.contains(name.as_str()) => {
                    refs.push(name.as_str());
                }
                TypeExpr::List(elements) => {
                    refs.extend(
                        elements
                            .iter()
                            .map(String::as_str)
                            .filter(|e| struct_names.contains(e)),
                    );
                }
                _ => {}
            }
        }
        adj.insert(s.name.as_str(), refs);
    }

    let mut state: HashMap<&str, DfsState> = ast
        .structs
        .iter()
        .map(|s| (s.name.as_str(), DfsState::Unvisited))
        .collect();
    let mut stack: Vec<&str> = Vec::new();

    for s in &ast.structs {
        let name = s.name.as_str();
        if state.get(name) == Some(&DfsState::Unvisited)
            && let Some(cycle) = dfs(name, &adj, &mut state, &mut stack)
        {
            return Err(SchemaValidationError::new(format!(
                "circular struct reference: {}",
                cycle.join(" -> ")
            )));
        }
    }
    Ok(())
}

fn dfs<'a>(
    node: &'a str,
    adj: &HashMap<&str, Vec<&'a str>>,
    state: &mut HashMap<&'a str, DfsState>,
    stack: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    state.insert(node, DfsState::InStack);
    stack.push(node);

    if let Some(neighbors) = adj.get(node) {
        for &neighbor in neighbors {
            match state.get(neighbor) {
                Some(DfsState::InStack) => {
                    let pos = stack.iter().position(|&n| n == neighbor).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        stack[pos..].iter().map(|&s| s.to_owned()).collect();
                    cycle.push(neighbor.to_owned());
                    return Some(cycle);
                }
                Some(DfsState::Unvisited) | None => {
                    if let Some(cycle) = dfs(neighbor, adj, state, stack) {
                        return Some(cycle);
                    }
                }
                Some(DfsState::Done) => {}
            }
        }
    }

    stack.pop();
    state.insert(node, DfsState::Done);
    None
}
