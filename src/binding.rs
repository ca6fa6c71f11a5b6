use crate::expr::{ExprArena, Expression, NodeId};
use std::collections::BTreeMap;

/// `declaration -> value`: замена узла-объявления связанной переменной на выражение.
#[derive(Clone, Copy, Debug)]
pub struct Binding {
	pub declaration: NodeId,
	pub to_value: NodeId,
}

impl Binding {
	pub fn new(declaration: NodeId, to_value: NodeId) -> Binding {
		Binding { declaration, to_value }
	}
}

/// Хранилище привязок, ключ — идентичность узла-объявления.
#[derive(Default, Debug, Clone)]
pub struct BindingStorage(BTreeMap<NodeId, NodeId>);

impl BindingStorage {
	/// Добавляет привязку в хранилище. Если она уже существует, то проверяет что значения
	/// совпадают с точностью до альфа-эквивалентности. Если это не так, возвращает None.
	pub fn add(&mut self, arena: &ExprArena, binding: Binding) -> Option<()> {
		use std::collections::btree_map::Entry::*;

		match self.0.entry(binding.declaration) {
			Vacant(vacant) => {
				vacant.insert(binding.to_value);
				Some(())
			},
			Occupied(occupied) => {
				if arena.equals(*occupied.get(), binding.to_value) {
					Some(())
				} else {
					None
				}
			},
		}
	}

	pub fn get(&self, declaration: NodeId) -> Option<NodeId> {
		self.0.get(&declaration).copied()
	}

	pub fn contains(&self, declaration: NodeId) -> bool {
		self.0.contains_key(&declaration)
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
		self.0.iter().map(|(declaration, value)| (*declaration, *value))
	}
}

/// Успешная унификация, заякоренная на корне целевого дерева.
#[derive(Debug, Clone)]
pub struct Unification {
	pub root: NodeId,
	pub bindings: BindingStorage,
}

#[derive(Debug, Clone)]
pub enum UnificationResult {
	Success(Unification),
	Failure,
}

impl UnificationResult {
	fn empty(root: NodeId) -> UnificationResult {
		UnificationResult::Success(Unification { root, bindings: BindingStorage::default() })
	}

	fn single(arena: &ExprArena, root: NodeId, binding: Binding) -> UnificationResult {
		let mut bindings = BindingStorage::default();
		match bindings.add(arena, binding) {
			Some(()) => UnificationResult::Success(Unification { root, bindings }),
			None => UnificationResult::Failure,
		}
	}

	pub fn is_success(&self) -> bool {
		matches!(self, UnificationResult::Success(_))
	}

	pub fn into_unification(self) -> Option<Unification> {
		match self {
			UnificationResult::Success(unification) => Some(unification),
			UnificationResult::Failure => None,
		}
	}

	/// Объединение двух результатов. Конфликт привязок — обычный провал, разные корни —
	/// ошибка программиста, здесь паникуем.
	pub fn combined_with(self, arena: &ExprArena, other: UnificationResult) -> UnificationResult {
		use UnificationResult::*;

		match (self, other) {
			(Success(first), Success(second)) => {
				if first.root != second.root {
					panic!("cannot combine unifications anchored at different root expressions");
				}
				let mut bindings = first.bindings;
				for (declaration, to_value) in second.bindings.iter() {
					if bindings.add(arena, Binding::new(declaration, to_value)).is_none() {
						return Failure;
					}
				}
				Success(Unification { root: first.root, bindings })
			},
			_ => Failure,
		}
	}
}

/// Содержит ли поддерево вхождение данного объявления (occurs check).
fn occurs(arena: &ExprArena, tree: NodeId, declaration: NodeId) -> bool {
	arena
		.all_sub_expressions(tree)
		.into_iter()
		.filter(|sub| matches!(arena.get(*sub), Expression::Identifier { .. }))
		.any(|sub| arena.declaration_of(sub) == Some(declaration))
}

/// Структурная унификация `pattern` с `target`: подстановка универсально связанных переменных
/// паттерна, делающая оба выражения синтаксически одинаковыми. Экзистенциальные переменные
/// не подставляются, свободные идентификаторы матчатся только сами с собой.
pub fn unify(arena: &ExprArena, pattern: NodeId, target: NodeId) -> UnificationResult {
	use Expression::*;
	use UnificationResult::*;

	let root = arena.root_of(target);
	match arena.get(pattern) {
		Identifier { .. } => match arena.declaration_of(pattern) {
			None => {
				let matches_free = matches!(arena.get(target), Identifier { .. })
					&& arena.is_free(target)
					&& arena.var_name(target) == arena.var_name(pattern);
				if matches_free {
					UnificationResult::empty(root)
				} else {
					Failure
				}
			},
			Some(declaration) => {
				let same_declaration = matches!(arena.get(target), Identifier { .. })
					&& arena.declaration_of(target) == Some(declaration);
				let binder = arena.parent(declaration).expect("declaration without a binder");
				match arena.get(binder) {
					ForAll { .. } => {
						if same_declaration {
							UnificationResult::empty(root)
						} else if occurs(arena, target, declaration) {
							Failure
						} else {
							UnificationResult::single(arena, root, Binding::new(declaration, target))
						}
					},
					Exists { .. } => {
						if same_declaration {
							UnificationResult::empty(root)
						} else {
							Failure
						}
					},
					_ => unreachable!("declaration parent is not a binder"),
				}
			},
		},
		Hole { .. } => Failure,
		Application { function, argument } => match arena.get(target) {
			Application { function: target_function, argument: target_argument } => {
				unify(arena, *function, *target_function)
					.combined_with(arena, unify(arena, *argument, *target_argument))
			},
			_ => Failure,
		},
		// остальные составные узлы: успех без привязок только при альфа-равенстве
		Equality { .. } | ForAll { .. } | Exists { .. } => {
			if arena.equals(pattern, target) {
				UnificationResult::empty(root)
			} else {
				Failure
			}
		},
	}
}

/// Копия выражения, где каждое вхождение связанной переменной с привязанным объявлением
/// заменено копией значения привязки.
pub fn apply_bindings(arena: &mut ExprArena, bindings: &BindingStorage, expr: NodeId) -> NodeId {
	use Expression::*;

	match arena.get(expr).clone() {
		Identifier { .. } => {
			match arena.declaration_of(expr).and_then(|declaration| bindings.get(declaration)) {
				Some(value) => arena.copy(value),
				None => arena.copy(expr),
			}
		},
		Hole { .. } => arena.copy(expr),
		Application { function, argument } => {
			let function = apply_bindings(arena, bindings, function);
			let argument = apply_bindings(arena, bindings, argument);
			arena.application(function, argument).unwrap()
		},
		Equality { left, right } => {
			let left = apply_bindings(arena, bindings, left);
			let right = apply_bindings(arena, bindings, right);
			arena.equality(left, right).unwrap()
		},
		ForAll { variable, body } => {
			let variable = arena.copy(variable);
			let body = apply_bindings(arena, bindings, body);
			arena.forall(variable, body).unwrap()
		},
		Exists { variable, body } => {
			let variable = arena.copy(variable);
			let body = apply_bindings(arena, bindings, body);
			arena.exists(variable, body).unwrap()
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::expr::ExprArena;

	// (∀x) x = c, возвращает (квантор, вхождение x слева, правая часть c)
	fn forall_x_equals_c(arena: &mut ExprArena) -> (NodeId, NodeId, NodeId) {
		let x = arena.identifier("x");
		let c = arena.identifier("c");
		let eq = arena.equality(x, c).unwrap();
		let variable = arena.identifier("x");
		let forall = arena.forall(variable, eq).unwrap();
		(forall, x, c)
	}

	#[test]
	fn free_identifier_unifies_only_with_equal_free_identifier() {
		let mut arena = ExprArena::new();

		let (_, _, c) = forall_x_equals_c(&mut arena);
		let c2 = arena.identifier("c");
		let d = arena.identifier("d");

		assert!(unify(&arena, c, c2).is_success());
		assert!(!unify(&arena, c, d).is_success());
	}

	#[test]
	fn universal_variable_binds_to_target() {
		let mut arena = ExprArena::new();

		let (_, x, _) = forall_x_equals_c(&mut arena);
		let declaration = arena.declaration_of(x).unwrap();

		let f = arena.identifier("f");
		let a = arena.identifier("a");
		let target = arena.application(f, a).unwrap();

		let unification = unify(&arena, x, target).into_unification().unwrap();
		assert_eq!(unification.root, target);
		assert_eq!(unification.bindings.get(declaration), Some(target));
	}

	#[test]
	fn same_declaration_is_trivial_success() {
		let mut arena = ExprArena::new();

		// (∀x) x = x
		let left = arena.identifier("x");
		let right = arena.identifier("x");
		let eq = arena.equality(left, right).unwrap();
		let variable = arena.identifier("x");
		arena.forall(variable, eq).unwrap();

		let unification = unify(&arena, left, right).into_unification().unwrap();
		assert!(unification.bindings.is_empty());
	}

	#[test]
	fn occurs_check_fails() {
		let mut arena = ExprArena::new();

		// (∀x) x = f x: унификация левого x с правым применением содержит то же объявление
		let left = arena.identifier("x");
		let f = arena.identifier("f");
		let x2 = arena.identifier("x");
		let fx = arena.application(f, x2).unwrap();
		let eq = arena.equality(left, fx).unwrap();
		let variable = arena.identifier("x");
		arena.forall(variable, eq).unwrap();

		assert!(!unify(&arena, left, fx).is_success());
	}

	#[test]
	fn existential_variable_is_rigid() {
		let mut arena = ExprArena::new();

		// (∃x) x = c
		let left = arena.identifier("x");
		let c = arena.identifier("c");
		let eq = arena.equality(left, c).unwrap();
		let variable = arena.identifier("x");
		arena.exists(variable, eq).unwrap();

		assert!(!unify(&arena, left, c).is_success());

		let other = arena.identifier("x");
		let c2 = arena.identifier("c");
		arena.equality(other, c2).unwrap();
		// другой x — другое дерево, другое объявление: провал
		assert!(!unify(&arena, left, other).is_success());
	}

	#[test]
	fn application_bindings_conflict_fails() {
		let mut arena = ExprArena::new();

		// (∀x) (x x) = c — два вхождения одного объявления
		let first = arena.identifier("x");
		let second = arena.identifier("x");
		let pattern = arena.application(first, second).unwrap();
		let c = arena.identifier("c");
		let eq = arena.equality(pattern, c).unwrap();
		let variable = arena.identifier("x");
		arena.forall(variable, eq).unwrap();

		// цель (a b): конфликт x -> a и x -> b
		let a = arena.identifier("a");
		let b = arena.identifier("b");
		let conflict = arena.application(a, b).unwrap();
		assert!(!unify(&arena, pattern, conflict).is_success());

		// цель (a a): оба вхождения согласованы
		let a1 = arena.identifier("a");
		let a2 = arena.identifier("a");
		let agree = arena.application(a1, a2).unwrap();
		assert!(unify(&arena, pattern, agree).is_success());
	}

	#[test]
	#[should_panic(expected = "different root expressions")]
	fn combining_across_roots_panics() {
		let mut arena = ExprArena::new();

		let (_, x, _) = forall_x_equals_c(&mut arena);
		let first_target = arena.identifier("a");
		let second_target = arena.identifier("b");

		let first = unify(&arena, x, first_target);
		let second = unify(&arena, x, second_target);
		let _ = first.combined_with(&arena, second);
	}

	#[test]
	fn apply_bindings_substitutes_declaration() {
		let mut arena = ExprArena::new();

		// (∀x) x = c, привязка x -> f a, применяем к правой части... к левой: x
		let (_, x, c) = forall_x_equals_c(&mut arena);
		let declaration = arena.declaration_of(x).unwrap();

		let f = arena.identifier("f");
		let a = arena.identifier("a");
		let fa = arena.application(f, a).unwrap();

		let mut bindings = BindingStorage::default();
		bindings.add(&arena, Binding::new(declaration, fa)).unwrap();

		let substituted = apply_bindings(&mut arena, &bindings, x);
		assert!(arena.equals(substituted, fa));

		let untouched = apply_bindings(&mut arena, &bindings, c);
		assert!(arena.equals(untouched, c));
	}
}
