use crate::expr::{ExprArena, NodeId, Sort, StructureError, VarName};
use thiserror::Error;

/// Промежуточное дерево разбора. Загружается в арену отдельным шагом, чтобы грамматика
/// не зависела от идентичностей узлов.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParsedExpression {
	Identifier { name: VarName },
	Hole { sort: Sort },
	Application { function: Box<ParsedExpression>, argument: Box<ParsedExpression> },
	Equality { left: Box<ParsedExpression>, right: Box<ParsedExpression> },
	ForAll { variable: VarName, body: Box<ParsedExpression> },
	Exists { variable: VarName, body: Box<ParsedExpression> },
}

// Грамматика печатной нотации: `x`, `x_0`, `f x`, `(f x) y`, `a = b`, `(∀x) body`,
// `(∃x) body`, дырки `_` (терм) и `?` (высказывание).
peg::parser!(
	pub grammar notation() for str {
		pub rule theory() -> Vec<ParsedExpression>
			= _ axioms:(axiom() ** _) _ { axioms }

		rule axiom() -> ParsedExpression
			= "axiom" __ p:proposition() _ ";" { p }

		pub rule proposition() -> ParsedExpression
			= forall() / exists() / truth_hole() / equality()

		rule forall() -> ParsedExpression
			= "(" _ "∀" _ v:var_name() _ ")" _ body:proposition() {
				ParsedExpression::ForAll { variable: v, body: Box::new(body) }
			}

		rule exists() -> ParsedExpression
			= "(" _ "∃" _ v:var_name() _ ")" _ body:proposition() {
				ParsedExpression::Exists { variable: v, body: Box::new(body) }
			}

		rule truth_hole() -> ParsedExpression
			= "?" { ParsedExpression::Hole { sort: Sort::Truth } }

		rule equality() -> ParsedExpression
			= l:term() _ "=" _ r:term() {
				ParsedExpression::Equality { left: Box::new(l), right: Box::new(r) }
			}

		pub rule term() -> ParsedExpression
			= first:atom() rest:(__ a:atom() { a })* {
				rest.into_iter().fold(first, |function, argument| {
					ParsedExpression::Application {
						function: Box::new(function),
						argument: Box::new(argument),
					}
				})
			}

		rule atom() -> ParsedExpression
			= "(" _ t:term() _ ")" { t }
			/ "_" { ParsedExpression::Hole { sort: Sort::Value } }
			/ v:var_name() { ParsedExpression::Identifier { name: v } }

		rule var_name() -> VarName
			= n:identifier() sub:("_" s:integer() { s })? {
				VarName { name: n, subscript: sub }
			}

		rule identifier() -> String
			= n:$(['a'..='z' | 'A'..='Z'] ['a'..='z' | 'A'..='Z' | '0'..='9']*) {
				String::from(n)
			}

		rule integer() -> u32
			= n:$(['0'..='9']+) {? n.parse().map_err(|_| "number is too big") }

		rule _() = quiet!{[' ' | '\n' | '\t']*}

		rule __() = quiet!{[' ' | '\n' | '\t']+}
	}
);

#[derive(Debug, Error)]
pub enum ReadError {
	#[error("{0}")]
	Parse(#[from] peg::error::ParseError<peg::str::LineCol>),
	#[error("{0}")]
	Structure(#[from] StructureError),
}

/// Загружает разобранное дерево в арену.
pub fn load(arena: &mut ExprArena, parsed: &ParsedExpression) -> Result<NodeId, StructureError> {
	use ParsedExpression::*;

	match parsed {
		Identifier { name } => Ok(arena.named(name.clone())),
		Hole { sort } => Ok(arena.hole(*sort)),
		Application { function, argument } => {
			let function = load(arena, function)?;
			let argument = load(arena, argument)?;
			arena.application(function, argument)
		},
		Equality { left, right } => {
			let left = load(arena, left)?;
			let right = load(arena, right)?;
			arena.equality(left, right)
		},
		ForAll { variable, body } => {
			let variable = arena.named(variable.clone());
			let body = load(arena, body)?;
			arena.forall(variable, body)
		},
		Exists { variable, body } => {
			let variable = arena.named(variable.clone());
			let body = load(arena, body)?;
			arena.exists(variable, body)
		},
	}
}

/// Разбирает высказывание и загружает его в арену.
pub fn read_proposition(arena: &mut ExprArena, input: &str) -> Result<NodeId, ReadError> {
	let parsed = notation::proposition(input)?;
	Ok(load(arena, &parsed)?)
}

/// Разбирает терм и загружает его в арену.
pub fn read_term(arena: &mut ExprArena, input: &str) -> Result<NodeId, ReadError> {
	let parsed = notation::term(input)?;
	Ok(load(arena, &parsed)?)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip_through_render() {
		let mut arena = ExprArena::new();

		for text in &[
			"x = y",
			"x_0 = x_1",
			"f x = y",
			"(f x) y = z",
			"(∀x) x = c",
			"(∃x) (∀y) x = y",
			"x = _",
		] {
			let id = read_proposition(&mut arena, text).unwrap();
			assert_eq!(arena.render(id), *text);
		}
	}

	#[test]
	fn application_groups_to_the_left() {
		let mut arena = ExprArena::new();

		let flat = read_term(&mut arena, "f x y").unwrap();
		let explicit = read_term(&mut arena, "(f x) y").unwrap();
		assert!(arena.equals(flat, explicit));
	}

	#[test]
	fn truth_hole_parses() {
		let mut arena = ExprArena::new();

		let id = read_proposition(&mut arena, "(∀x) ?").unwrap();
		assert!(!arena.is_complete(id));
	}

	#[test]
	fn theory_lists_axioms() {
		let parsed = notation::theory("axiom c = c;\naxiom (∀x) x = c;").unwrap();
		assert_eq!(parsed.len(), 2);
	}
}
