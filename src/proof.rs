use crate::binding::{apply_bindings, unify, BindingStorage, UnificationResult};
use crate::expr::{ExprArena, Expression, NodeId, Sort, StructureError, VarName};
use itertools::Itertools;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Вид шага вывода.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProofKind {
	ForallElimination,
	ForallIntroduction,
	ExistsElimination { witness: NodeId },
	ExistsIntroduction,
	Rewrite,
	NameTerm,
}

/// Записанный шаг вывода: что доказано, какие высказывания процитированы, и вложенные
/// шаги законченного введения квантора всеобщности.
#[derive(Clone, Debug)]
pub struct Proof {
	pub kind: ProofKind,
	pub proven: NodeId,
	references: Vec<NodeId>,
	steps: Vec<Proof>,
}

impl Proof {
	fn new(kind: ProofKind, proven: NodeId, references: Vec<NodeId>) -> Proof {
		Proof {
			kind,
			proven,
			references: references.into_iter().unique().collect(),
			steps: vec![],
		}
	}

	/// Процитированные доказанные высказывания, без повторов.
	pub fn referenced_propositions(&self) -> &[NodeId] {
		&self.references
	}

	pub fn steps(&self) -> &[Proof] {
		&self.steps
	}
}

/// Иерархический идентификатор высказывания: аксиома `A n`, теорема `T n` или шаг `T n.s1.s2`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PropositionId {
	Axiom(usize),
	Theorem(usize, Vec<usize>),
}

impl fmt::Display for PropositionId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			PropositionId::Axiom(number) => write!(f, "A{}", number),
			PropositionId::Theorem(number, path) => {
				write!(f, "T{}", number)?;
				for step in path {
					write!(f, ".{}", step)?;
				}
				Ok(())
			},
		}
	}
}

/// Произвольный объект открытого доказательства: доступен как свидетель ровно один раз.
#[derive(Clone, Debug)]
struct ArbitraryObject {
	id: NodeId,
	name: VarName,
	used: bool,
}

/// Открытый контекст доказательства. `slot` — номер шага, который займёт его результат
/// в родительском контексте.
#[derive(Debug, Default)]
struct ProofContext {
	arbitrary: Vec<ArbitraryObject>,
	steps: Vec<Proof>,
	slot: usize,
}

#[derive(Debug, Error)]
pub enum ProofError {
	#[error("{0}")]
	Structure(#[from] StructureError),
	#[error("an axiom must be a complete root truth expression")]
	InvalidAxiom,
	#[error("The name {0} is already taken")]
	NameTaken(VarName),
	#[error("an arbitrary variable must be a root identifier")]
	InvalidArbitraryVariable,
	#[error("this proposition is not proven in the system")]
	NotProven,
	#[error("a forall of a proven proposition is required")]
	NotAProvenForall,
	#[error("a complete expression is required here")]
	Incomplete,
	#[error("Cannot apply a forall if it'd leave new unknown free variables")]
	UnknownFreeVariables,
	#[error("Cannot eliminate a non-root existential quantifier")]
	NonRootExistential,
	#[error("the object {0} cannot witness an existential here")]
	UnavailableWitness(VarName),
	#[error("the identifier does not occur free in this proposition")]
	NotFreeInProposition,
	#[error("the source is not a member of a proven equation")]
	NotAnEquationMember,
	#[error("the rewrite target must be a value inside another proven proposition")]
	InvalidRewriteTarget,
	#[error("the source does not unify with the target")]
	RewriteDoesNotUnify,
	#[error("the bindings do not determine the other side of the equation")]
	UnderdeterminedRewrite,
	#[error("the term refers to unknown objects")]
	UnknownObjectsInTerm,
	#[error("there is no ongoing proof to finish")]
	NoOngoingProof,
	#[error("cannot finish a proof without steps")]
	EmptyProof,
	#[error("Cannot finish proof with free variables")]
	UnresolvedWitness,
}

/// Ядро формальной системы: аксиомы, теоремы, известные объекты и стек открытых
/// контекстов доказательства. Все операции проверяют предусловия до любой мутации.
#[derive(Default, Debug)]
pub struct FormalSystem {
	exprs: ExprArena,
	axioms: Vec<NodeId>,
	theorems: Vec<Proof>,
	well_known: BTreeSet<VarName>,
	used_witnesses: BTreeSet<VarName>,
	contexts: Vec<ProofContext>,
}

impl FormalSystem {
	pub fn new() -> FormalSystem {
		FormalSystem::default()
	}

	/// Арена выражений системы: в ней же редактор строит кандидатов.
	pub fn exprs(&self) -> &ExprArena {
		&self.exprs
	}

	pub fn exprs_mut(&mut self) -> &mut ExprArena {
		&mut self.exprs
	}

	// --- реестры ---

	pub fn axioms(&self) -> &[NodeId] {
		&self.axioms
	}

	pub fn theorems(&self) -> Vec<NodeId> {
		self.theorems.iter().map(|theorem| theorem.proven).collect()
	}

	pub fn theorem_proofs(&self) -> &[Proof] {
		&self.theorems
	}

	pub fn well_known_objects(&self) -> Vec<VarName> {
		self.well_known.iter().cloned().collect()
	}

	/// Все объекты, на которые сейчас можно ссылаться: глобально известные плюс
	/// произвольные объекты открытых контекстов.
	pub fn objects_in_context(&self) -> Vec<VarName> {
		self.well_known
			.iter()
			.cloned()
			.chain(
				self.contexts
					.iter()
					.flat_map(|context| context.arbitrary.iter().map(|arb| arb.name.clone())),
			)
			.unique()
			.collect()
	}

	/// Неиспользованные произвольные объекты внутреннего открытого контекста.
	pub fn arbitrary_objects_in_current_ongoing_proof(&self) -> Vec<NodeId> {
		self.contexts
			.last()
			.map(|context| {
				context
					.arbitrary
					.iter()
					.filter(|arb| !arb.used)
					.map(|arb| arb.id)
					.collect()
			})
			.unwrap_or_default()
	}

	pub fn is_well_known_free_variable(&self, name: &VarName) -> bool {
		self.well_known.contains(name)
	}

	pub fn is_known_object(&self, name: &VarName) -> bool {
		self.well_known.contains(name)
			|| self
				.contexts
				.iter()
				.any(|context| context.arbitrary.iter().any(|arb| arb.name == *name))
	}

	/// Все высказывания, на которые сейчас можно опереться: аксиомы, теоремы и шаги
	/// открытых контекстов. Шаги уже законченных вложенных доказательств сюда не входят —
	/// их произвольные объекты разряжены обобщением.
	fn proven_propositions(&self) -> Vec<NodeId> {
		self.axioms
			.iter()
			.copied()
			.chain(self.theorems.iter().map(|theorem| theorem.proven))
			.chain(
				self.contexts
					.iter()
					.flat_map(|context| context.steps.iter().map(|step| step.proven)),
			)
			.collect()
	}

	fn is_proven(&self, prop: NodeId) -> bool {
		self.proven_propositions().contains(&prop)
	}

	// --- аксиомы и имена ---

	/// Добавляет аксиому: корневое полное высказывание. Каждая её свободная переменная
	/// становится общеизвестным объектом (повторно — идемпотентно).
	pub fn add_axiom(&mut self, axiom: NodeId) -> Result<(), ProofError> {
		let valid = self.exprs.sort(axiom) == Sort::Truth
			&& self.exprs.is_root(axiom)
			&& self.exprs.is_complete(axiom);
		if !valid {
			return Err(ProofError::InvalidAxiom);
		}
		for name in self.exprs.free_variables(axiom) {
			self.well_known.insert(name);
		}
		self.axioms.push(axiom);
		Ok(())
	}

	/// Даёт терму имя: регистрирует новый общеизвестный объект и записывает `newId = term`.
	pub fn name_term(&mut self, new_id: NodeId, value: NodeId) -> Result<NodeId, ProofError> {
		let name = match self.exprs.var_name(new_id) {
			Some(name) => name.clone(),
			None => return Err(StructureError::NotAnIdentifier.into()),
		};
		self.exprs.require_root(new_id)?;
		self.exprs.require_root(value)?;
		if self.exprs.sort(value) != Sort::Value {
			return Err(StructureError::SortMismatch { expected: Sort::Value }.into());
		}
		if !self.exprs.is_complete(value) {
			return Err(ProofError::Incomplete);
		}
		if self.is_known_object(&name) {
			return Err(ProofError::NameTaken(name));
		}
		if !self
			.exprs
			.free_variables(value)
			.iter()
			.all(|free| self.is_known_object(free))
		{
			return Err(ProofError::UnknownObjectsInTerm);
		}

		let left = self.exprs.copy(new_id);
		let right = self.exprs.copy(value);
		let proven = self.exprs.equality(left, right)?;
		self.well_known.insert(name);
		self.record(Proof::new(ProofKind::NameTerm, proven, vec![]));
		Ok(proven)
	}

	// --- контексты доказательства ---

	fn push_context(&mut self) {
		let slot = match self.contexts.last() {
			Some(parent) => parent.steps.len() + 1,
			None => 0,
		};
		self.contexts.push(ProofContext { arbitrary: vec![], steps: vec![], slot });
	}

	/// Открывает свежий вложенный контекст доказательства.
	pub fn start_new_proof(&mut self) {
		self.push_context();
	}

	fn check_new_arbitrary(&self, ids: &[NodeId]) -> Result<Vec<(NodeId, VarName)>, ProofError> {
		let mut checked = vec![];
		for id in ids {
			let name = match self.exprs.var_name(*id) {
				Some(name) if self.exprs.is_root(*id) => name.clone(),
				_ => return Err(ProofError::InvalidArbitraryVariable),
			};
			if self.is_known_object(&name) {
				return Err(ProofError::NameTaken(name));
			}
			checked.push((*id, name));
		}
		if checked.iter().map(|(_, name)| name).unique().count() != checked.len() {
			return Err(ProofError::InvalidArbitraryVariable);
		}
		Ok(checked)
	}

	fn add_arbitrary(&mut self, checked: Vec<(NodeId, VarName)>) {
		let context = self.contexts.last_mut().unwrap();
		for (id, name) in checked {
			context.arbitrary.push(ArbitraryObject { id, name, used: false });
		}
	}

	/// Вводит произвольные объекты в текущий контекст; если открытого контекста нет,
	/// открывает новый.
	pub fn new_arbitrary_variables(&mut self, ids: &[NodeId]) -> Result<(), ProofError> {
		let checked = self.check_new_arbitrary(ids)?;
		if self.contexts.is_empty() {
			self.push_context();
		}
		self.add_arbitrary(checked);
		Ok(())
	}

	/// Начинает введение квантора всеобщности: новый контекст со своими произвольными
	/// объектами.
	pub fn start_forall_introduction(&mut self, ids: &[NodeId]) -> Result<(), ProofError> {
		let checked = self.check_new_arbitrary(ids)?;
		self.push_context();
		self.add_arbitrary(checked);
		Ok(())
	}

	/// Записывает шаг во внутренний открытый контекст, а без контекста — новой теоремой.
	fn record(&mut self, proof: Proof) {
		match self.contexts.last_mut() {
			Some(context) => context.steps.push(proof),
			None => self.theorems.push(proof),
		}
	}

	/// Заканчивает внутреннее доказательство: каждая ещё свободная неиспользованная
	/// произвольная переменная оборачивается квантором всеобщности (введённая последней —
	/// самым внутренним), контекст снимается, результат записывается наружу.
	pub fn finish_current_proof(&mut self) -> Result<NodeId, ProofError> {
		let context = self.contexts.last().ok_or(ProofError::NoOngoingProof)?;
		let final_prop = match context.steps.last() {
			Some(step) => step.proven,
			None => return Err(ProofError::EmptyProof),
		};
		let free = self.exprs.free_variables(final_prop);
		if context
			.arbitrary
			.iter()
			.any(|arb| arb.used && free.contains(&arb.name))
		{
			return Err(ProofError::UnresolvedWitness);
		}

		let context = self.contexts.pop().unwrap();
		let mut proven = self.exprs.copy(final_prop);
		for arb in context.arbitrary.iter().rev() {
			if arb.used || !free.contains(&arb.name) {
				continue;
			}
			let variable = self.exprs.named(arb.name.clone());
			proven = self.exprs.forall(variable, proven).unwrap();
		}

		let inner: BTreeSet<NodeId> = context.steps.iter().map(|step| step.proven).collect();
		let references = context
			.steps
			.iter()
			.flat_map(|step| step.references.iter().copied())
			.filter(|reference| !inner.contains(reference))
			.collect();
		let mut proof = Proof::new(ProofKind::ForallIntroduction, proven, references);
		proof.steps = context.steps;
		self.record(proof);
		Ok(proven)
	}

	// --- устранение и введение кванторов ---

	fn forall_application_result(&mut self, forall: NodeId, arg: NodeId) -> Result<NodeId, ProofError> {
		let result = self.exprs.apply_binder(forall, arg)?;
		let all_known = self
			.exprs
			.free_variables(result)
			.iter()
			.all(|free| self.is_known_object(free));
		if all_known {
			Ok(result)
		} else {
			Err(ProofError::UnknownFreeVariables)
		}
	}

	/// Все кванторы всеобщности доказанных высказываний, к которым можно применить `arg`,
	/// не оставив неизвестных свободных переменных.
	pub fn universal_quantifiers_applicable_to(&mut self, arg: NodeId) -> Vec<NodeId> {
		let stand_alone = self.exprs.is_root(arg)
			&& self.exprs.is_complete(arg)
			&& self.exprs.sort(arg) == Sort::Value;
		if !stand_alone {
			return vec![];
		}
		let foralls: Vec<NodeId> = self
			.proven_propositions()
			.into_iter()
			.flat_map(|prop| self.exprs.all_sub_expressions(prop))
			.filter(|sub| matches!(self.exprs.get(*sub), Expression::ForAll { .. }))
			.collect();
		foralls
			.into_iter()
			.filter(|forall| self.forall_application_result(*forall, arg).is_ok())
			.collect()
	}

	/// Устранение квантора всеобщности: подставляет `arg` в тело и записывает результат.
	pub fn eliminate_forall(&mut self, forall: NodeId, arg: NodeId) -> Result<NodeId, ProofError> {
		if !matches!(self.exprs.get(forall), Expression::ForAll { .. }) {
			return Err(ProofError::NotAProvenForall);
		}
		let source = self.exprs.root_of(forall);
		if !self.is_proven(source) {
			return Err(ProofError::NotAProvenForall);
		}
		self.exprs.require_root(arg)?;
		if !self.exprs.is_complete(arg) {
			return Err(ProofError::Incomplete);
		}
		if self.exprs.sort(arg) != Sort::Value {
			return Err(StructureError::SortMismatch { expected: Sort::Value }.into());
		}
		let proven = self.forall_application_result(forall, arg)?;
		self.record(Proof::new(ProofKind::ForallElimination, proven, vec![source]));
		Ok(proven)
	}

	/// Доказанные высказывания, в которых идентификатор встречается свободно.
	pub fn candidates_for_existential_quantification(&self, id: NodeId) -> Vec<NodeId> {
		let name = match self.exprs.var_name(id) {
			Some(name) => name.clone(),
			None => return vec![],
		};
		self.proven_propositions()
			.into_iter()
			.filter(|prop| self.exprs.free_variables(*prop).contains(&name))
			.collect()
	}

	/// Введение квантора существования над доказанным высказыванием со свободным `id`.
	pub fn introduce_exists(&mut self, id: NodeId, proven_expr: NodeId) -> Result<NodeId, ProofError> {
		if !self.is_proven(proven_expr) {
			return Err(ProofError::NotProven);
		}
		let name = match self.exprs.var_name(id) {
			Some(name) => name.clone(),
			None => return Err(StructureError::NotAnIdentifier.into()),
		};
		if !self.exprs.free_variables(proven_expr).contains(&name) {
			return Err(ProofError::NotFreeInProposition);
		}
		let body = self.exprs.copy(proven_expr);
		let variable = self.exprs.named(name);
		let proven = self.exprs.exists(variable, body)?;
		self.record(Proof::new(ProofKind::ExistsIntroduction, proven, vec![proven_expr]));
		Ok(proven)
	}

	fn witness_name(&self, obj: NodeId) -> Result<VarName, ProofError> {
		let name = match self.exprs.var_name(obj) {
			Some(name) if self.exprs.is_root(obj) => name.clone(),
			_ => return Err(StructureError::NotAnIdentifier.into()),
		};
		if self.used_witnesses.contains(&name) {
			return Err(ProofError::UnavailableWitness(name));
		}
		// общеизвестный объект годится всегда, произвольный — только неиспользованный
		// и только из внутреннего открытого контекста
		if self.well_known.contains(&name) {
			return Ok(name);
		}
		let owned_here = self
			.contexts
			.last()
			.map(|context| {
				context
					.arbitrary
					.iter()
					.any(|arb| arb.name == name && !arb.used)
			})
			.unwrap_or(false);
		if owned_here {
			Ok(name)
		} else {
			Err(ProofError::UnavailableWitness(name))
		}
	}

	/// Корневые доказанные кванторы существования, устранимые данным объектом.
	pub fn existential_quantifiers_replaceable_with(&self, obj: NodeId) -> Vec<NodeId> {
		if self.witness_name(obj).is_err() {
			return vec![];
		}
		self.proven_propositions()
			.into_iter()
			.filter(|prop| matches!(self.exprs.get(*prop), Expression::Exists { .. }))
			.collect()
	}

	/// Устранение корневого квантора существования свидетелем `obj`; свидетель помечается
	/// использованным.
	pub fn eliminate_exists(&mut self, exists: NodeId, obj: NodeId) -> Result<NodeId, ProofError> {
		if !matches!(self.exprs.get(exists), Expression::Exists { .. })
			|| !self.exprs.is_root(exists)
		{
			return Err(ProofError::NonRootExistential);
		}
		if !self.is_proven(exists) {
			return Err(ProofError::NotProven);
		}
		let name = self.witness_name(obj)?;
		let proven = self.exprs.apply_binder(exists, obj)?;

		let mut marked = false;
		if let Some(context) = self.contexts.last_mut() {
			if let Some(arb) = context.arbitrary.iter_mut().find(|arb| arb.name == name) {
				arb.used = true;
				marked = true;
			}
		}
		if !marked {
			self.used_witnesses.insert(name);
		}
		self.record(Proof::new(
			ProofKind::ExistsElimination { witness: obj },
			proven,
			vec![exists],
		));
		Ok(proven)
	}

	// --- переписывание по равенству ---

	/// Для стороны доказанного равенства — противоположная сторона и само равенство.
	fn equation_of(&self, term: NodeId) -> Option<(NodeId, NodeId)> {
		let parent = self.exprs.parent(term)?;
		match self.exprs.get(parent) {
			Expression::Equality { left, right } if *left == term => Some((parent, *right)),
			Expression::Equality { left, right } if *right == term => Some((parent, *left)),
			_ => None,
		}
	}

	/// Определяют ли привязки противоположную сторону целиком: каждое связанное вхождение
	/// в ней должно иметь привязанное объявление.
	fn determines_opposite(&self, bindings: &BindingStorage, opposite: NodeId) -> bool {
		self.exprs
			.all_sub_expressions(opposite)
			.into_iter()
			.filter(|sub| matches!(self.exprs.get(*sub), Expression::Identifier { .. }))
			.filter_map(|sub| self.exprs.declaration_of(sub))
			.all(|declaration| bindings.contains(declaration))
	}

	/// Места в других доказанных высказываниях, которые унифицируются с `term` так, что
	/// привязки определяют противоположную сторону его равенства.
	pub fn rewrite_candidates_matching(&self, term: NodeId) -> Vec<NodeId> {
		let source_root = self.exprs.root_of(term);
		if !self.is_proven(source_root) {
			return vec![];
		}
		let (_, opposite) = match self.equation_of(term) {
			Some(equation) => equation,
			None => return vec![],
		};
		let mut result = vec![];
		for prop in self.proven_propositions() {
			if prop == source_root {
				continue;
			}
			for sub in self.exprs.all_sub_expressions(prop) {
				if self.exprs.sort(sub) != Sort::Value {
					continue;
				}
				if let UnificationResult::Success(unification) = unify(&self.exprs, term, sub) {
					if self.determines_opposite(&unification.bindings, opposite) {
						result.push(sub);
					}
				}
			}
		}
		result
	}

	/// Переписывание: в дереве цели вхождение `target` заменяется противоположной стороной
	/// равенства `source` с применёнными привязками унификации.
	pub fn rewrite(&mut self, source: NodeId, target: NodeId) -> Result<NodeId, ProofError> {
		let source_root = self.exprs.root_of(source);
		if !self.is_proven(source_root) {
			return Err(ProofError::NotProven);
		}
		let (_, opposite) = self.equation_of(source).ok_or(ProofError::NotAnEquationMember)?;
		let target_root = self.exprs.root_of(target);
		let target_valid = self.exprs.sort(target) == Sort::Value
			&& target_root != source_root
			&& self.is_proven(target_root);
		if !target_valid {
			return Err(ProofError::InvalidRewriteTarget);
		}
		let unification = unify(&self.exprs, source, target)
			.into_unification()
			.ok_or(ProofError::RewriteDoesNotUnify)?;
		if !self.determines_opposite(&unification.bindings, opposite) {
			return Err(ProofError::UnderdeterminedRewrite);
		}
		let replacement = apply_bindings(&mut self.exprs, &unification.bindings, opposite);
		let proven = self.exprs.replace(target_root, target, replacement);
		self.record(Proof::new(ProofKind::Rewrite, proven, vec![source_root, target_root]));
		Ok(proven)
	}

	// --- идентификаторы высказываний ---

	/// Иерархический номер высказывания: `A n` для аксиом, `T n` для теорем, `T n.s1.s2`
	/// для шага на пути вложенных контекстов. Номер открытого контекста — слот, который
	/// займёт его будущий результат.
	pub fn identifier_of(&self, prop: NodeId) -> Option<PropositionId> {
		if let Some(index) = self.axioms.iter().position(|axiom| *axiom == prop) {
			return Some(PropositionId::Axiom(index + 1));
		}
		for (index, theorem) in self.theorems.iter().enumerate() {
			if let Some(path) = find_in_proof(theorem, prop, vec![]) {
				return Some(PropositionId::Theorem(index + 1, path));
			}
		}
		let mut prefix = vec![];
		for (depth, context) in self.contexts.iter().enumerate() {
			if depth > 0 {
				prefix.push(context.slot);
			}
			for (step_index, step) in context.steps.iter().enumerate() {
				let mut path = prefix.clone();
				path.push(step_index + 1);
				if let Some(found) = find_in_proof(step, prop, path) {
					return Some(PropositionId::Theorem(self.theorems.len() + 1, found));
				}
			}
		}
		None
	}
}

fn find_in_proof(proof: &Proof, prop: NodeId, path: Vec<usize>) -> Option<Vec<usize>> {
	if proof.proven == prop {
		return Some(path);
	}
	proof.steps.iter().enumerate().find_map(|(index, step)| {
		let mut sub_path = path.clone();
		sub_path.push(index + 1);
		find_in_proof(step, prop, sub_path)
	})
}
