//! Boolean evaluation of combinatorial-geometry cell definitions.
//!
//! A legacy CSG cell is written as signed surface numbers combined with two
//! binary operators, `n` (intersection) and `u` (union), grouped with
//! parentheses: `(4 u -3 u -10) n (5 n 6 u -100) u -1 n -2`. The sign and
//! number of a surface token only matter to the cell itself. For the Boolean
//! structure every token is just the next input in a vector of per-surface
//! sense tests.
//!
//! The evaluator provides:
//! - Whitespace stripping and positional renaming of surface tokens
//! - Validation of the definition with descriptive errors
//! - An arena of nested functors, one per parenthesized group
//! - Strict left-to-right evaluation with equal operator precedence
//!
//! # Key Components
//!
//! - [`BooleanCellFunctor`]: the parsed, immutable cell definition
//! - [`SetOperation`]: intersection or union of two booleans

use std::fmt;

use crate::error::{NavError, Result};


const INTERSECTION: char = 'n';
const UNION: char = 'u';
const OPEN: char = '(';
const CLOSE: char = ')';

fn is_operator(c: char) -> bool {
    matches!(c, INTERSECTION | UNION | OPEN | CLOSE)
}

/// A binary set operation applied to two sense tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperation {
    Intersection,
    Union,
}

impl SetOperation {
    pub fn apply(self, left: bool, right: bool) -> bool {
        match self {
            SetOperation::Intersection => left && right,
            SetOperation::Union => left || right,
        }
    }

    fn symbol(self) -> char {
        match self {
            SetOperation::Intersection => INTERSECTION,
            SetOperation::Union => UNION,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Leaf { index: usize, surface: i64 },
    Operation(SetOperation),
    Open,
    Close,
}

/// Removes every whitespace character from a definition.
pub fn remove_white_space(definition: &str) -> String {
    definition.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Replaces each surface token with its position of first appearance.
///
/// Duplicated surfaces get distinct indices: `1n-2u1` becomes `0n1u2`.
pub fn rename_variables(definition: &str) -> Result<String> {
    let tokens = tokenize(definition)?;
    Ok(render(&tokens))
}

/// Counts the leaf variables of a renamed, whitespace-free definition.
pub fn count_variables(definition: &str) -> usize {
    if !definition.chars().any(is_operator) {
        return 1;
    }
    let mut count = 0;
    let mut in_run = false;
    for c in definition.chars() {
        if is_operator(c) {
            in_run = false;
        } else if !in_run {
            in_run = true;
            count += 1;
        }
    }
    count
}

/// Signed surface numbers of a definition, in order of appearance.
pub fn surface_tokens(definition: &str) -> Result<Vec<i64>> {
    let tokens = tokenize(&remove_white_space(definition))?;
    Ok(tokens
        .iter()
        .filter_map(|token| match token {
            Token::Leaf { surface, .. } => Some(*surface),
            _ => None,
        })
        .collect())
}

fn invalid(definition: &str, reason: impl Into<String>) -> NavError {
    NavError::InvalidCellDefinition {
        definition: definition.to_string(),
        reason: reason.into(),
    }
}

fn tokenize(definition: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = definition.char_indices().peekable();
    let mut next_index = 0;

    while let Some((start, c)) = chars.next() {
        match c {
            INTERSECTION => tokens.push(Token::Operation(SetOperation::Intersection)),
            UNION => tokens.push(Token::Operation(SetOperation::Union)),
            OPEN => tokens.push(Token::Open),
            CLOSE => tokens.push(Token::Close),
            _ => {
                let mut end = start + c.len_utf8();
                while let Some(&(i, next)) = chars.peek() {
                    if is_operator(next) {
                        break;
                    }
                    end = i + next.len_utf8();
                    chars.next();
                }
                let text = &definition[start..end];
                let surface = text
                    .parse::<i64>()
                    .map_err(|_| invalid(definition, format!("'{}' is not a surface number", text)))?;
                tokens.push(Token::Leaf {
                    index: next_index,
                    surface,
                });
                next_index += 1;
            }
        }
    }

    check_structure(definition, &tokens)?;
    Ok(tokens)
}

// Every operand is a leaf or a group, operands and operators alternate, and
// parentheses balance.
fn check_structure(definition: &str, tokens: &[Token]) -> Result<()> {
    let mut depth = 0usize;
    let mut expect_operand = true;

    for token in tokens {
        match token {
            Token::Leaf { .. } => {
                if !expect_operand {
                    return Err(invalid(definition, "missing operator between operands"));
                }
                expect_operand = false;
            }
            Token::Operation(op) => {
                if expect_operand {
                    return Err(invalid(
                        definition,
                        format!("operator '{}' has no left operand", op.symbol()),
                    ));
                }
                expect_operand = true;
            }
            Token::Open => {
                if !expect_operand {
                    return Err(invalid(definition, "missing operator before '('"));
                }
                depth += 1;
            }
            Token::Close => {
                if expect_operand {
                    return Err(invalid(definition, "empty or incomplete group"));
                }
                if depth == 0 {
                    return Err(invalid(definition, "unbalanced ')'"));
                }
                depth -= 1;
            }
        }
    }

    if expect_operand {
        return Err(invalid(definition, "definition does not end with an operand"));
    }
    if depth != 0 {
        return Err(invalid(definition, "unbalanced '('"));
    }
    Ok(())
}

fn render(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|token| match token {
            Token::Leaf { index, .. } => index.to_string(),
            Token::Operation(op) => op.symbol().to_string(),
            Token::Open => OPEN.to_string(),
            Token::Close => CLOSE.to_string(),
        })
        .collect()
}

/// One operand of a node: a raw sense test or a parenthesized child.
///
/// Indices are local to the node: the child's range `first..=last` selects the
/// slice of the node's input that the child evaluates.
#[derive(Debug, Clone, PartialEq)]
enum Term {
    Leaf(usize),
    Group {
        node: usize,
        first: usize,
        last: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Node {
    num_variables: usize,
    terms: Vec<Term>,
    operations: Vec<SetOperation>,
}

/// A parsed cell definition.
///
/// **Context**: Legacy CSG cells classify a point by testing its sense with
/// respect to every bounding surface and combining the results with the set
/// operations of the cell definition. The same definition is evaluated for
/// millions of points, so it is parsed once.
///
/// **How it Works**: Nodes live in an arena with the root at index 0. Each
/// top-level parenthesized group becomes a child node that owns a contiguous
/// range of input variables; nested groups are the child's business. Terms of
/// a node are combined strictly left to right. The structure is read-only
/// after construction and can be shared between threads.
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanCellFunctor {
    renamed: String,
    nodes: Vec<Node>,
}

impl BooleanCellFunctor {
    /// Parses a cell definition.
    pub fn new(definition: &str) -> Result<Self> {
        let clean = remove_white_space(definition);
        let tokens = tokenize(&clean)?;
        let renamed = render(&tokens);

        let mut nodes = Vec::new();
        build_node(&mut nodes, &tokens);

        debug_assert_eq!(nodes[0].num_variables, count_variables(&renamed));

        Ok(Self { renamed, nodes })
    }

    /// Number of sense tests the definition consumes.
    pub fn num_variables(&self) -> usize {
        self.nodes[0].num_variables
    }

    /// Whitespace-free definition with positional variable names.
    pub fn renamed_definition(&self) -> &str {
        &self.renamed
    }

    /// Top-level definition with each group replaced by `d0`, `d1`, ...
    pub fn reduced_definition(&self) -> String {
        let root = &self.nodes[0];
        if root.terms.is_empty() {
            return self.renamed.clone();
        }
        let mut reduced = String::new();
        let mut group = 0;
        for (i, term) in root.terms.iter().enumerate() {
            if i > 0 {
                reduced.push(root.operations[i - 1].symbol());
            }
            match term {
                Term::Leaf(index) => reduced.push_str(&index.to_string()),
                Term::Group { .. } => {
                    reduced.push_str(&format!("d{}", group));
                    group += 1;
                }
            }
        }
        reduced
    }

    /// Number of top-level parenthesized groups.
    pub fn num_children(&self) -> usize {
        self.child_ranges().len()
    }

    /// Inclusive variable ranges of the top-level groups, in order.
    pub fn child_ranges(&self) -> Vec<(usize, usize)> {
        self.nodes[0]
            .terms
            .iter()
            .filter_map(|term| match term {
                Term::Group { first, last, .. } => Some((*first, *last)),
                Term::Leaf(_) => None,
            })
            .collect()
    }

    /// Number of set operations joining the top-level terms.
    pub fn num_set_operations(&self) -> usize {
        self.nodes[0].operations.len()
    }

    /// Evaluates the definition for one sense test per variable.
    pub fn evaluate(&self, senses: &[bool]) -> bool {
        assert_eq!(
            senses.len(),
            self.num_variables(),
            "cell definition '{}' needs {} sense tests, got {}",
            self.renamed,
            self.num_variables(),
            senses.len()
        );
        self.evaluate_node(0, senses)
    }

    fn evaluate_node(&self, index: usize, senses: &[bool]) -> bool {
        let node = &self.nodes[index];
        if node.num_variables == 1 {
            return senses[0];
        }

        let mut terms = node.terms.iter().map(|term| match term {
            Term::Leaf(i) => senses[*i],
            Term::Group { node, first, last } => self.evaluate_node(*node, &senses[*first..=*last]),
        });
        // construction guarantees at least one term
        let first = terms.next().unwrap_or(false);
        terms
            .zip(node.operations.iter())
            .fold(first, |acc, (value, op)| op.apply(acc, value))
    }
}

impl fmt::Display for BooleanCellFunctor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.renamed)
    }
}

fn leaf_indices(tokens: &[Token]) -> impl Iterator<Item = usize> + '_ {
    tokens.iter().filter_map(|token| match token {
        Token::Leaf { index, .. } => Some(*index),
        _ => None,
    })
}

// Position of the parenthesis closing the one at `open`.
fn matching_close(tokens: &[Token], open: usize) -> usize {
    let mut depth = 0;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::Open => depth += 1,
            Token::Close => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => {}
        }
    }
    unreachable!("parentheses were validated before building")
}

// Tokens must be validated. Returns the arena index of the new node.
fn build_node(nodes: &mut Vec<Node>, tokens: &[Token]) -> usize {
    let offset = leaf_indices(tokens).next().unwrap_or(0);
    let num_variables = leaf_indices(tokens).count();

    let slot = nodes.len();
    nodes.push(Node {
        num_variables,
        ..Node::default()
    });
    if num_variables == 1 {
        return slot;
    }

    let mut terms = Vec::new();
    let mut operations = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Leaf { index, .. } => {
                terms.push(Term::Leaf(index - offset));
                i += 1;
            }
            Token::Operation(op) => {
                operations.push(*op);
                i += 1;
            }
            Token::Open => {
                let close = matching_close(tokens, i);
                let inner = &tokens[i + 1..close];
                let first = leaf_indices(inner).next().unwrap_or(offset) - offset;
                let last = first + leaf_indices(inner).count() - 1;
                let node = build_node(nodes, inner);
                terms.push(Term::Group { node, first, last });
                i = close + 1;
            }
            Token::Close => unreachable!("groups are consumed whole"),
        }
    }

    debug_assert_eq!(operations.len() + 1, terms.len());
    nodes[slot].terms = terms;
    nodes[slot].operations = operations;
    slot
}
