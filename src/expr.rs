use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Сорт выражения: терм (объект) или высказывание.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Sort {
	Value,
	Truth,
}

/// Имя переменной вместе с нижним индексом: `x`, `x_0`, `x_1`. Индексы нужны при переименовании связанных переменных.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VarName {
	pub name: String,
	pub subscript: Option<u32>,
}

impl VarName {
	pub fn new(name: &str) -> VarName {
		VarName { name: name.to_string(), subscript: None }
	}

	pub fn with_subscript(name: &str, subscript: u32) -> VarName {
		VarName { name: name.to_string(), subscript: Some(subscript) }
	}
}

impl fmt::Display for VarName {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self.subscript {
			Some(subscript) => write!(f, "{}_{}", self.name, subscript),
			None => write!(f, "{}", self.name),
		}
	}
}

/// Идентичность узла в арене. Два структурно равных узла всё равно имеют разные `NodeId`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(usize);

/// Узел дерева выражения. Замкнутый набор вариантов, чтобы `match` ловил забытые случаи.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Expression {
	Identifier { name: VarName },
	Hole { sort: Sort },
	Application { function: NodeId, argument: NodeId },
	Equality { left: NodeId, right: NodeId },
	ForAll { variable: NodeId, body: NodeId },
	Exists { variable: NodeId, body: NodeId },
}

#[derive(Clone, Debug)]
struct Node {
	expr: Expression,
	parent: Option<NodeId>,
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum StructureError {
	#[error("expression already had a parent")]
	AlreadyHasParent,
	#[error("cannot detach root expression")]
	CannotDetachRoot,
	#[error("cannot fill root hole")]
	CannotFillRootHole,
	#[error("cannot detach the bound variable of a binder")]
	CannotDetachBoundVariable,
	#[error("not a direct child of its parent")]
	NotADirectChild,
	#[error("a {expected:?} expression is required here")]
	SortMismatch { expected: Sort },
	#[error("an identifier is required here")]
	NotAnIdentifier,
	#[error("a hole is required here")]
	NotAHole,
	#[error("a binder is required here")]
	NotABinder,
	#[error("a stand-alone root expression is required here")]
	NotStandAlone,
	#[error("the name {0} is already visible to this binder")]
	NameIsVisible(VarName),
}

/// Арена, владеющая всеми узлами. Ребёнок ссылается на родителя невладеющим индексом,
/// родитель держит владеющие слоты детей.
#[derive(Default, Debug, Clone)]
pub struct ExprArena {
	nodes: Vec<Node>,
}

impl ExprArena {
	pub fn new() -> ExprArena {
		ExprArena::default()
	}

	fn alloc(&mut self, expr: Expression) -> NodeId {
		self.nodes.push(Node { expr, parent: None });
		NodeId(self.nodes.len() - 1)
	}

	/// Выделяет составной узел и прописывает детям родителя.
	fn alloc_with_children(&mut self, expr: Expression) -> NodeId {
		let id = self.alloc(expr);
		for child in self.children(id) {
			self.nodes[child.0].parent = Some(id);
		}
		id
	}

	fn check_new_children(&self, children: &[NodeId]) -> Result<(), StructureError> {
		for (index, child) in children.iter().enumerate() {
			if self.nodes[child.0].parent.is_some() || children[..index].contains(child) {
				return Err(StructureError::AlreadyHasParent);
			}
		}
		Ok(())
	}

	pub fn get(&self, id: NodeId) -> &Expression {
		&self.nodes[id.0].expr
	}

	pub fn parent(&self, id: NodeId) -> Option<NodeId> {
		self.nodes[id.0].parent
	}

	pub fn is_root(&self, id: NodeId) -> bool {
		self.parent(id).is_none()
	}

	pub fn root_of(&self, id: NodeId) -> NodeId {
		let mut current = id;
		while let Some(parent) = self.parent(current) {
			current = parent;
		}
		current
	}

	pub fn sort(&self, id: NodeId) -> Sort {
		use Expression::*;

		match self.get(id) {
			Identifier { .. } | Application { .. } => Sort::Value,
			Equality { .. } | ForAll { .. } | Exists { .. } => Sort::Truth,
			Hole { sort } => *sort,
		}
	}

	fn children(&self, id: NodeId) -> Vec<NodeId> {
		use Expression::*;

		match self.get(id) {
			Identifier { .. } | Hole { .. } => vec![],
			Application { function, argument } => vec![*function, *argument],
			Equality { left, right } => vec![*left, *right],
			ForAll { variable, body } | Exists { variable, body } => vec![*variable, *body],
		}
	}

	pub fn var_name(&self, id: NodeId) -> Option<&VarName> {
		match self.get(id) {
			Expression::Identifier { name } => Some(name),
			_ => None,
		}
	}

	// --- конструкторы ---

	pub fn identifier(&mut self, name: &str) -> NodeId {
		self.alloc(Expression::Identifier { name: VarName::new(name) })
	}

	pub fn identifier_sub(&mut self, name: &str, subscript: u32) -> NodeId {
		self.alloc(Expression::Identifier { name: VarName::with_subscript(name, subscript) })
	}

	pub fn named(&mut self, name: VarName) -> NodeId {
		self.alloc(Expression::Identifier { name })
	}

	pub fn hole(&mut self, sort: Sort) -> NodeId {
		self.alloc(Expression::Hole { sort })
	}

	pub fn application(&mut self, function: NodeId, argument: NodeId) -> Result<NodeId, StructureError> {
		self.require_sort(function, Sort::Value)?;
		self.require_sort(argument, Sort::Value)?;
		self.check_new_children(&[function, argument])?;
		Ok(self.alloc_with_children(Expression::Application { function, argument }))
	}

	pub fn equality(&mut self, left: NodeId, right: NodeId) -> Result<NodeId, StructureError> {
		self.require_sort(left, Sort::Value)?;
		self.require_sort(right, Sort::Value)?;
		self.check_new_children(&[left, right])?;
		Ok(self.alloc_with_children(Expression::Equality { left, right }))
	}

	pub fn forall(&mut self, variable: NodeId, body: NodeId) -> Result<NodeId, StructureError> {
		self.require_identifier(variable)?;
		self.require_sort(body, Sort::Truth)?;
		self.check_new_children(&[variable, body])?;
		Ok(self.alloc_with_children(Expression::ForAll { variable, body }))
	}

	pub fn exists(&mut self, variable: NodeId, body: NodeId) -> Result<NodeId, StructureError> {
		self.require_identifier(variable)?;
		self.require_sort(body, Sort::Truth)?;
		self.check_new_children(&[variable, body])?;
		Ok(self.alloc_with_children(Expression::Exists { variable, body }))
	}

	fn require_sort(&self, id: NodeId, expected: Sort) -> Result<(), StructureError> {
		if self.sort(id) == expected {
			Ok(())
		} else {
			Err(StructureError::SortMismatch { expected })
		}
	}

	fn require_identifier(&self, id: NodeId) -> Result<(), StructureError> {
		match self.get(id) {
			Expression::Identifier { .. } => Ok(()),
			_ => Err(StructureError::NotAnIdentifier),
		}
	}

	pub fn require_root(&self, id: NodeId) -> Result<(), StructureError> {
		if self.is_root(id) {
			Ok(())
		} else {
			Err(StructureError::NotStandAlone)
		}
	}

	// --- обходы ---

	/// Все подвыражения в прямом порядке, включая само выражение.
	pub fn all_sub_expressions(&self, id: NodeId) -> Vec<NodeId> {
		let mut result = vec![];
		self.walk(id, &mut result);
		result
	}

	fn walk(&self, id: NodeId, out: &mut Vec<NodeId>) {
		out.push(id);
		for child in self.children(id) {
			self.walk(child, out);
		}
	}

	pub fn all_holes_of_sort(&self, id: NodeId, sort: Sort) -> Vec<NodeId> {
		self.all_sub_expressions(id)
			.into_iter()
			.filter(|sub| matches!(self.get(*sub), Expression::Hole { sort: s } if *s == sort))
			.collect()
	}

	pub fn is_complete(&self, id: NodeId) -> bool {
		!self
			.all_sub_expressions(id)
			.into_iter()
			.any(|sub| matches!(self.get(sub), Expression::Hole { .. }))
	}

	/// Свободно ли вхождение идентификатора: поднимаемся по родителям и ищем связывающий квантор.
	pub fn is_free(&self, occurrence: NodeId) -> bool {
		self.declaration_of(occurrence).is_none()
	}

	/// Узел переменной ближайшего объемлющего квантора, объявляющего это имя.
	pub fn declaration_of(&self, occurrence: NodeId) -> Option<NodeId> {
		use Expression::*;

		let name = self.var_name(occurrence)?.clone();
		let mut current = occurrence;
		while let Some(parent) = self.parent(current) {
			if let ForAll { variable, .. } | Exists { variable, .. } = self.get(parent) {
				if self.var_name(*variable) == Some(&name) {
					return Some(*variable);
				}
			}
			current = parent;
		}
		None
	}

	/// Свободные переменные поддерева. Вхождение проверяет свободу через `is_free`.
	pub fn free_variables(&self, id: NodeId) -> BTreeSet<VarName> {
		self.free_occurrences(id)
			.into_iter()
			.map(|sub| self.var_name(sub).unwrap().clone())
			.collect()
	}

	/// Вхождения идентификаторов поддерева, свободные во всём дереве.
	pub fn free_occurrences(&self, id: NodeId) -> Vec<NodeId> {
		self.all_sub_expressions(id)
			.into_iter()
			.filter(|sub| matches!(self.get(*sub), Expression::Identifier { .. }))
			.filter(|sub| self.is_free(*sub))
			.collect()
	}

	// --- сравнение ---

	/// Структурное равенство с точностью до переименования связанных переменных.
	/// Дырки равны только сами себе.
	pub fn equals(&self, a: NodeId, b: NodeId) -> bool {
		self.equals_inner(a, b, &mut Vec::new())
	}

	fn equals_inner(&self, a: NodeId, b: NodeId, pairs: &mut Vec<(VarName, VarName)>) -> bool {
		use Expression::*;

		match (self.get(a), self.get(b)) {
			(Identifier { name: name_a }, Identifier { name: name_b }) => {
				let bound_a = pairs.iter().rposition(|(left, _)| left == name_a);
				let bound_b = pairs.iter().rposition(|(_, right)| right == name_b);
				match (bound_a, bound_b) {
					(Some(i), Some(j)) => i == j,
					(None, None) => name_a == name_b,
					_ => false,
				}
			},
			(Hole { .. }, Hole { .. }) => a == b,
			(
				Application { function: function_a, argument: argument_a },
				Application { function: function_b, argument: argument_b },
			) => {
				self.equals_inner(*function_a, *function_b, pairs)
					&& self.equals_inner(*argument_a, *argument_b, pairs)
			},
			(Equality { left: left_a, right: right_a }, Equality { left: left_b, right: right_b }) => {
				self.equals_inner(*left_a, *left_b, pairs)
					&& self.equals_inner(*right_a, *right_b, pairs)
			},
			(ForAll { variable: var_a, body: body_a }, ForAll { variable: var_b, body: body_b })
			| (Exists { variable: var_a, body: body_a }, Exists { variable: var_b, body: body_b }) => {
				pairs.push((
					self.var_name(*var_a).unwrap().clone(),
					self.var_name(*var_b).unwrap().clone(),
				));
				let result = self.equals_inner(*body_a, *body_b, pairs);
				pairs.pop();
				result
			},
			_ => false,
		}
	}

	// --- копирование и замена ---

	/// Глубокая копия: свежие идентичности, без родителя.
	pub fn copy(&mut self, id: NodeId) -> NodeId {
		use Expression::*;

		match self.get(id).clone() {
			Identifier { name } => self.alloc(Identifier { name }),
			Hole { sort } => self.alloc(Hole { sort }),
			Application { function, argument } => {
				let function = self.copy(function);
				let argument = self.copy(argument);
				self.alloc_with_children(Application { function, argument })
			},
			Equality { left, right } => {
				let left = self.copy(left);
				let right = self.copy(right);
				self.alloc_with_children(Equality { left, right })
			},
			ForAll { variable, body } => {
				let variable = self.copy(variable);
				let body = self.copy(body);
				self.alloc_with_children(ForAll { variable, body })
			},
			Exists { variable, body } => {
				let variable = self.copy(variable);
				let body = self.copy(body);
				self.alloc_with_children(Exists { variable, body })
			},
		}
	}

	/// Замена по идентичности: новое дерево, где узел `target` заменён копией `replacement`.
	/// Исходное дерево не изменяется.
	pub fn replace(&mut self, root: NodeId, target: NodeId, replacement: NodeId) -> NodeId {
		use Expression::*;

		if root == target {
			return self.copy(replacement);
		}
		match self.get(root).clone() {
			Identifier { .. } | Hole { .. } => self.copy(root),
			Application { function, argument } => {
				let function = self.replace(function, target, replacement);
				let argument = self.replace(argument, target, replacement);
				self.alloc_with_children(Application { function, argument })
			},
			Equality { left, right } => {
				let left = self.replace(left, target, replacement);
				let right = self.replace(right, target, replacement);
				self.alloc_with_children(Equality { left, right })
			},
			ForAll { variable, body } => {
				let variable = self.replace(variable, target, replacement);
				let body = self.replace(body, target, replacement);
				self.alloc_with_children(ForAll { variable, body })
			},
			Exists { variable, body } => {
				let variable = self.replace(variable, target, replacement);
				let body = self.replace(body, target, replacement);
				self.alloc_with_children(Exists { variable, body })
			},
		}
	}

	// --- подстановка ---

	/// Подстановка квантора: копия тела, где связанная переменная заменена на `value`.
	/// Внутренние кванторы, чьи имена пересекаются со свободными переменными `value`,
	/// сначала переименовываются на следующий незанятый индекс того же имени.
	pub fn apply_binder(&mut self, binder: NodeId, value: NodeId) -> Result<NodeId, StructureError> {
		use Expression::*;

		let (variable, body) = match self.get(binder) {
			ForAll { variable, body } | Exists { variable, body } => (*variable, *body),
			_ => return Err(StructureError::NotABinder),
		};
		self.require_sort(value, Sort::Value)?;

		let bound_name = self.var_name(variable).unwrap().clone();
		let value_free = self.free_variables(value);

		let body_copy = self.copy(body);
		for sub in self.all_sub_expressions(body_copy) {
			let inner_variable = match self.get(sub) {
				ForAll { variable, .. } | Exists { variable, .. } => *variable,
				_ => continue,
			};
			let inner_name = self.var_name(inner_variable).unwrap().clone();
			if value_free.contains(&inner_name) {
				let subscript = self.fresh_subscript(&[body_copy, value], &inner_name.name);
				let renamed = VarName::with_subscript(&inner_name.name, subscript);
				self.rename_bound_occurrences(sub, &inner_name, &renamed);
			}
		}

		Ok(self.substitute_free(body_copy, &bound_name, value))
	}

	/// Следующий индекс имени, не встречающийся ни в одном из деревьев.
	fn fresh_subscript(&self, trees: &[NodeId], base: &str) -> u32 {
		trees
			.iter()
			.flat_map(|tree| self.all_sub_expressions(*tree))
			.filter_map(|sub| self.var_name(sub))
			.filter(|name| name.name == base)
			.filter_map(|name| name.subscript)
			.map(|subscript| subscript + 1)
			.max()
			.unwrap_or(0)
	}

	/// Переименовывает переменную квантора и все связанные ею вхождения. Мутирует узлы на
	/// месте, поэтому вызывается только на корне или на свежей копии.
	fn rename_bound_occurrences(&mut self, binder: NodeId, old: &VarName, new: &VarName) {
		use Expression::*;

		let (variable, body) = match self.get(binder) {
			ForAll { variable, body } | Exists { variable, body } => (*variable, *body),
			_ => unreachable!("rename on a non-binder"),
		};
		self.nodes[variable.0].expr = Identifier { name: new.clone() };
		self.rename_unshadowed(body, old, new);
	}

	fn rename_unshadowed(&mut self, id: NodeId, old: &VarName, new: &VarName) {
		use Expression::*;

		match self.get(id).clone() {
			Identifier { name } => {
				if name == *old {
					self.nodes[id.0].expr = Identifier { name: new.clone() };
				}
			},
			Hole { .. } => {},
			Application { function, argument } => {
				self.rename_unshadowed(function, old, new);
				self.rename_unshadowed(argument, old, new);
			},
			Equality { left, right } => {
				self.rename_unshadowed(left, old, new);
				self.rename_unshadowed(right, old, new);
			},
			ForAll { variable, body } | Exists { variable, body } => {
				// внутренний квантор того же имени затеняет, глубже не идём
				if self.var_name(variable) == Some(old) {
					return;
				}
				self.rename_unshadowed(body, old, new);
			},
		}
	}

	/// Копия поддерева, где не затенённые внутри него вхождения `name` заменены копиями `value`.
	fn substitute_free(&mut self, id: NodeId, name: &VarName, value: NodeId) -> NodeId {
		use Expression::*;

		match self.get(id).clone() {
			Identifier { name: current } => {
				if current == *name {
					self.copy(value)
				} else {
					self.alloc(Identifier { name: current })
				}
			},
			Hole { sort } => self.alloc(Hole { sort }),
			Application { function, argument } => {
				let function = self.substitute_free(function, name, value);
				let argument = self.substitute_free(argument, name, value);
				self.alloc_with_children(Application { function, argument })
			},
			Equality { left, right } => {
				let left = self.substitute_free(left, name, value);
				let right = self.substitute_free(right, name, value);
				self.alloc_with_children(Equality { left, right })
			},
			ForAll { variable, .. } | Exists { variable, .. }
				if self.var_name(variable) == Some(name) =>
			{
				self.copy(id)
			},
			ForAll { variable, body } => {
				let variable = self.copy(variable);
				let body = self.substitute_free(body, name, value);
				self.alloc_with_children(ForAll { variable, body })
			},
			Exists { variable, body } => {
				let variable = self.copy(variable);
				let body = self.substitute_free(body, name, value);
				self.alloc_with_children(Exists { variable, body })
			},
		}
	}

	// --- переименование ---

	/// Переименование переменной квантора. Отклоняется, если новое имя уже видно этому
	/// квантору: свободно в дереве или связано объемлющим квантором. Корень переименовывается
	/// на месте (редактор держит живую ссылку на корень), не-корень возвращается свежей копией.
	pub fn rename_variable(&mut self, binder: NodeId, new_name: VarName) -> Result<NodeId, StructureError> {
		use Expression::*;

		let variable = match self.get(binder) {
			ForAll { variable, .. } | Exists { variable, .. } => *variable,
			_ => return Err(StructureError::NotABinder),
		};
		let old_name = self.var_name(variable).unwrap().clone();
		if old_name == new_name {
			return Ok(binder);
		}

		let root = self.root_of(binder);
		if self.free_variables(root).contains(&new_name) {
			return Err(StructureError::NameIsVisible(new_name));
		}
		let mut current = binder;
		while let Some(parent) = self.parent(current) {
			if let ForAll { variable, .. } | Exists { variable, .. } = self.get(parent) {
				if self.var_name(*variable) == Some(&new_name) {
					return Err(StructureError::NameIsVisible(new_name));
				}
			}
			current = parent;
		}

		if self.is_root(binder) {
			self.rename_bound_occurrences(binder, &old_name, &new_name);
			Ok(binder)
		} else {
			let copy = self.copy(binder);
			self.rename_bound_occurrences(copy, &old_name, &new_name);
			Ok(copy)
		}
	}

	// --- структурное редактирование ---

	/// Отсоединяет выражение от родителя, оставляя на его месте свежую дырку того же сорта.
	/// Возвращает дырку.
	pub fn detach_from_parent(&mut self, child: NodeId) -> Result<NodeId, StructureError> {
		use Expression::*;

		let parent = self.parent(child).ok_or(StructureError::CannotDetachRoot)?;
		if let ForAll { variable, .. } | Exists { variable, .. } = self.get(parent) {
			if *variable == child {
				return Err(StructureError::CannotDetachBoundVariable);
			}
		}
		let hole = self.alloc(Expression::Hole { sort: self.sort(child) });
		self.swap_slot(parent, child, hole)?;
		self.nodes[hole.0].parent = Some(parent);
		self.nodes[child.0].parent = None;
		Ok(hole)
	}

	/// Заполняет дырку копией выражения того же сорта. Возвращает вставленную копию.
	pub fn fill_with(&mut self, hole: NodeId, expr: NodeId) -> Result<NodeId, StructureError> {
		let sort = match self.get(hole) {
			Expression::Hole { sort } => *sort,
			_ => return Err(StructureError::NotAHole),
		};
		let parent = self.parent(hole).ok_or(StructureError::CannotFillRootHole)?;
		if self.sort(expr) != sort {
			return Err(StructureError::SortMismatch { expected: sort });
		}
		let filling = self.copy(expr);
		self.swap_slot(parent, hole, filling)?;
		self.nodes[filling.0].parent = Some(parent);
		self.nodes[hole.0].parent = None;
		Ok(filling)
	}

	fn swap_slot(&mut self, parent: NodeId, from: NodeId, to: NodeId) -> Result<(), StructureError> {
		use Expression::*;

		let updated = match self.get(parent).clone() {
			Application { function, argument } if function == from => {
				Application { function: to, argument }
			},
			Application { function, argument } if argument == from => {
				Application { function, argument: to }
			},
			Equality { left, right } if left == from => Equality { left: to, right },
			Equality { left, right } if right == from => Equality { left, right: to },
			ForAll { variable, body } if body == from => ForAll { variable, body: to },
			Exists { variable, body } if body == from => Exists { variable, body: to },
			_ => return Err(StructureError::NotADirectChild),
		};
		self.nodes[parent.0].expr = updated;
		Ok(())
	}

	// --- печать ---

	/// Фиксированная грамматика печати: `x`, `x_0`, `f x`, `(f x) y`, `a = b`,
	/// `(∀x) body`, `(∃x) body`.
	pub fn render(&self, id: NodeId) -> String {
		use Expression::*;

		match self.get(id) {
			Identifier { name } => name.to_string(),
			Hole { .. } => "_".to_string(),
			Application { function, argument } => format!(
				"{} {}",
				self.render_operand(*function),
				self.render_operand(*argument),
			),
			Equality { left, right } => {
				format!("{} = {}", self.render(*left), self.render(*right))
			},
			ForAll { variable, body } => {
				format!("(∀{}) {}", self.render(*variable), self.render(*body))
			},
			Exists { variable, body } => {
				format!("(∃{}) {}", self.render(*variable), self.render(*body))
			},
		}
	}

	fn render_operand(&self, id: NodeId) -> String {
		match self.get(id) {
			Expression::Application { .. } => format!("({})", self.render(id)),
			_ => self.render(id),
		}
	}
}
