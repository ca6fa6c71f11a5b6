use dedukt::expr::{Expression, NodeId, Sort, StructureError, VarName};
use dedukt::parsing::{read_proposition, read_term};
use dedukt::proof::{FormalSystem, ProofError, PropositionId};

fn add_axiom(system: &mut FormalSystem, text: &str) -> NodeId {
	let axiom = read_proposition(system.exprs_mut(), text).unwrap();
	system.add_axiom(axiom).unwrap();
	axiom
}

fn term(system: &mut FormalSystem, text: &str) -> NodeId {
	read_term(system.exprs_mut(), text).unwrap()
}

/// Вхождение с данной печатью, являющееся стороной равенства.
fn equation_member(system: &FormalSystem, root: NodeId, text: &str) -> NodeId {
	system
		.exprs()
		.all_sub_expressions(root)
		.into_iter()
		.filter(|sub| system.exprs().render(*sub) == text)
		.find(|sub| {
			system
				.exprs()
				.parent(*sub)
				.map(|parent| matches!(system.exprs().get(parent), Expression::Equality { .. }))
				.unwrap_or(false)
		})
		.unwrap()
}

fn first_forall(system: &FormalSystem, root: NodeId) -> NodeId {
	system
		.exprs()
		.all_sub_expressions(root)
		.into_iter()
		.find(|sub| matches!(system.exprs().get(*sub), Expression::ForAll { .. }))
		.unwrap()
}

#[test]
fn axioms_are_numbered_in_order() {
	let mut system = FormalSystem::new();

	let first = add_axiom(&mut system, "c = c");
	let second = add_axiom(&mut system, "(∀x) x = c");

	assert_eq!(system.identifier_of(first), Some(PropositionId::Axiom(1)));
	assert_eq!(system.identifier_of(second), Some(PropositionId::Axiom(2)));
	assert_eq!(system.identifier_of(first).unwrap().to_string(), "A1");
}

#[test]
fn axiom_with_hole_is_rejected() {
	let mut system = FormalSystem::new();

	let incomplete = read_proposition(system.exprs_mut(), "c = _").unwrap();
	assert!(matches!(system.add_axiom(incomplete), Err(ProofError::InvalidAxiom)));

	let value = term(&mut system, "c");
	assert!(matches!(system.add_axiom(value), Err(ProofError::InvalidAxiom)));

	assert!(system.axioms().is_empty());
}

#[test]
fn axiom_free_variables_become_well_known() {
	let mut system = FormalSystem::new();

	add_axiom(&mut system, "(∀x) x = a");

	assert!(system.is_well_known_free_variable(&VarName::new("a")));
	assert!(!system.is_well_known_free_variable(&VarName::new("x")));
	assert_eq!(system.well_known_objects(), vec![VarName::new("a")]);
}

#[test]
fn forall_elimination_with_known_argument() {
	let mut system = FormalSystem::new();

	let axiom = add_axiom(&mut system, "(∀x) x = a");
	let forall = first_forall(&system, axiom);

	let known = term(&mut system, "a");
	assert_eq!(system.universal_quantifiers_applicable_to(known), vec![forall]);

	let theorem = system.eliminate_forall(forall, known).unwrap();
	assert_eq!(system.exprs().render(theorem), "a = a");
	assert_eq!(system.identifier_of(theorem), Some(PropositionId::Theorem(1, vec![])));
	assert_eq!(system.theorems(), vec![theorem]);
}

#[test]
fn forall_elimination_rejects_unknown_free_variables() {
	let mut system = FormalSystem::new();

	let axiom = add_axiom(&mut system, "(∀x) x = a");
	let forall = first_forall(&system, axiom);

	let unknown = term(&mut system, "b");
	assert!(system.universal_quantifiers_applicable_to(unknown).is_empty());
	assert!(matches!(
		system.eliminate_forall(forall, unknown),
		Err(ProofError::UnknownFreeVariables),
	));
	assert!(system.theorems().is_empty());
}

#[test]
fn forall_elimination_requires_stand_alone_argument() {
	let mut system = FormalSystem::new();

	let axiom = add_axiom(&mut system, "(∀x) x = a");
	let forall = first_forall(&system, axiom);
	let inner_a = equation_member(&system, axiom, "a");

	assert!(matches!(
		system.eliminate_forall(forall, inner_a),
		Err(ProofError::Structure(StructureError::NotStandAlone)),
	));
}

#[test]
fn rewrite_produces_other_equation_side() {
	let mut system = FormalSystem::new();

	// аксиомы (∀x) x = a и b = w дают теорему a = w
	let first = add_axiom(&mut system, "(∀x) x = a");
	let second = add_axiom(&mut system, "b = w");

	let source = equation_member(&system, first, "x");
	let target = equation_member(&system, second, "b");

	assert!(system.rewrite_candidates_matching(source).contains(&target));

	let theorem = system.rewrite(source, target).unwrap();
	assert_eq!(system.exprs().render(theorem), "a = w");
	assert_eq!(
		system.theorem_proofs()[0].referenced_propositions(),
		&[first, second],
	);
}

#[test]
fn rewrite_rejects_target_in_same_expression() {
	let mut system = FormalSystem::new();

	let axiom = add_axiom(&mut system, "(∀x) x = a");
	let source = equation_member(&system, axiom, "x");
	let target = equation_member(&system, axiom, "a");

	assert!(matches!(
		system.rewrite(source, target),
		Err(ProofError::InvalidRewriteTarget),
	));
}

#[test]
fn nested_proof_steps_follow_context_paths() {
	let mut system = FormalSystem::new();

	let first = add_axiom(&mut system, "(∀x) x = c");
	let second = add_axiom(&mut system, "(∀x) c = x");
	assert_eq!(system.identifier_of(first), Some(PropositionId::Axiom(1)));
	assert_eq!(system.identifier_of(second), Some(PropositionId::Axiom(2)));

	let u = term(&mut system, "u");
	system.new_arbitrary_variables(&[u]).unwrap();

	let forall = first_forall(&system, first);
	let step_u = system.eliminate_forall(forall, u).unwrap();
	assert_eq!(system.identifier_of(step_u), Some(PropositionId::Theorem(1, vec![1])));

	// вложенное введение всеобщности занимает слот второго шага
	let v = term(&mut system, "v");
	system.start_forall_introduction(&[v]).unwrap();

	let step_v = system.eliminate_forall(forall, v).unwrap();
	assert_eq!(
		system.identifier_of(step_v),
		Some(PropositionId::Theorem(1, vec![2, 1])),
	);
	assert_eq!(system.identifier_of(step_v).unwrap().to_string(), "T1.2.1");

	let inner_result = system.finish_current_proof().unwrap();
	assert_eq!(system.exprs().render(inner_result), "(∀v) v = c");
	assert_eq!(
		system.identifier_of(inner_result),
		Some(PropositionId::Theorem(1, vec![2])),
	);
	// шаг законченного вложенного доказательства остаётся адресуемым
	assert_eq!(
		system.identifier_of(step_v),
		Some(PropositionId::Theorem(1, vec![2, 1])),
	);

	let theorem = system.finish_current_proof().unwrap();
	assert_eq!(system.identifier_of(theorem), Some(PropositionId::Theorem(1, vec![])));
	assert_eq!(system.identifier_of(step_u), Some(PropositionId::Theorem(1, vec![1])));
}

#[test]
fn finishing_generalizes_innermost_last() {
	let mut system = FormalSystem::new();

	let axiom = add_axiom(&mut system, "(∀x) (∀y) x = y");

	let u = term(&mut system, "u");
	let v = term(&mut system, "v");
	system.new_arbitrary_variables(&[u, v]).unwrap();

	let outer = first_forall(&system, axiom);
	let step = system.eliminate_forall(outer, u).unwrap();
	assert_eq!(system.exprs().render(step), "(∀y) u = y");

	let step_forall = first_forall(&system, step);
	let last = system.eliminate_forall(step_forall, v).unwrap();
	assert_eq!(system.exprs().render(last), "u = v");

	// введённая последней v связывается самым внутренним квантором
	let theorem = system.finish_current_proof().unwrap();
	assert_eq!(system.exprs().render(theorem), "(∀u) (∀v) u = v");
}

#[test]
fn finishing_requires_steps_and_context() {
	let mut system = FormalSystem::new();

	assert!(matches!(system.finish_current_proof(), Err(ProofError::NoOngoingProof)));

	system.start_new_proof();
	assert!(matches!(system.finish_current_proof(), Err(ProofError::EmptyProof)));
}

#[test]
fn exists_introduction_over_free_identifier() {
	let mut system = FormalSystem::new();

	let axiom = add_axiom(&mut system, "a = a");
	let a = term(&mut system, "a");

	assert_eq!(system.candidates_for_existential_quantification(a), vec![axiom]);

	let theorem = system.introduce_exists(a, axiom).unwrap();
	assert_eq!(system.exprs().render(theorem), "(∃a) a = a");
	assert_eq!(system.theorem_proofs()[0].referenced_propositions(), &[axiom]);

	let missing = term(&mut system, "q");
	assert!(matches!(
		system.introduce_exists(missing, axiom),
		Err(ProofError::NotFreeInProposition),
	));
}

#[test]
fn exists_elimination_marks_witness_used() {
	let mut system = FormalSystem::new();

	let exists = add_axiom(&mut system, "(∃x) x = c");

	let w = term(&mut system, "w");
	system.start_new_proof();
	system.new_arbitrary_variables(&[w]).unwrap();
	assert_eq!(system.arbitrary_objects_in_current_ongoing_proof(), vec![w]);
	assert_eq!(system.existential_quantifiers_replaceable_with(w), vec![exists]);

	let proven = system.eliminate_exists(exists, w).unwrap();
	assert_eq!(system.exprs().render(proven), "w = c");
	// использованный свидетель исчезает из доступных произвольных объектов
	assert!(system.arbitrary_objects_in_current_ongoing_proof().is_empty());
	assert!(system.existential_quantifiers_replaceable_with(w).is_empty());

	// и доказательство с ним нельзя закончить, пока он свободен в результате
	assert!(matches!(system.finish_current_proof(), Err(ProofError::UnresolvedWitness)));
}

#[test]
fn arbitrary_witness_is_owned_by_innermost_context() {
	let mut system = FormalSystem::new();

	let exists = add_axiom(&mut system, "(∃x) x = c");

	let w = term(&mut system, "w");
	system.start_new_proof();
	system.new_arbitrary_variables(&[w]).unwrap();

	// во вложенном контексте объект внешнего контекста не годится в свидетели
	system.start_new_proof();
	assert!(system.existential_quantifiers_replaceable_with(w).is_empty());
	assert!(matches!(
		system.eliminate_exists(exists, w),
		Err(ProofError::UnavailableWitness(_)),
	));
}

#[test]
fn well_known_witness_is_single_use() {
	let mut system = FormalSystem::new();

	let exists = add_axiom(&mut system, "(∃x) x = c");
	add_axiom(&mut system, "d = d");

	let d = term(&mut system, "d");
	let proven = system.eliminate_exists(exists, d).unwrap();
	assert_eq!(system.exprs().render(proven), "d = c");

	let d_again = term(&mut system, "d");
	assert!(matches!(
		system.eliminate_exists(exists, d_again),
		Err(ProofError::UnavailableWitness(_)),
	));
}

#[test]
fn exists_elimination_requires_root_existential() {
	let mut system = FormalSystem::new();

	// квантор существования не в корне устранять нельзя
	let axiom = add_axiom(&mut system, "(∀y) (∃x) x = y");
	let nested_exists = system
		.exprs()
		.all_sub_expressions(axiom)
		.into_iter()
		.find(|sub| matches!(system.exprs().get(*sub), Expression::Exists { .. }))
		.unwrap();

	let c = term(&mut system, "c");
	assert!(matches!(
		system.eliminate_exists(nested_exists, c),
		Err(ProofError::NonRootExistential),
	));
}

#[test]
fn name_term_registers_well_known_object() {
	let mut system = FormalSystem::new();

	add_axiom(&mut system, "(∀x) x = a");

	let m = term(&mut system, "m");
	let value = term(&mut system, "a");
	let theorem = system.name_term(m, value).unwrap();
	assert_eq!(system.exprs().render(theorem), "m = a");
	assert!(system.is_known_object(&VarName::new("m")));

	let m_again = term(&mut system, "m");
	let value_again = term(&mut system, "a");
	assert!(matches!(
		system.name_term(m_again, value_again),
		Err(ProofError::NameTaken(_)),
	));

	let unknown_value = term(&mut system, "z q");
	let q = term(&mut system, "q2");
	assert!(matches!(
		system.name_term(q, unknown_value),
		Err(ProofError::UnknownObjectsInTerm),
	));
}

#[test]
fn incomplete_expressions_are_not_complete() {
	let mut system = FormalSystem::new();

	let incomplete = read_proposition(system.exprs_mut(), "(∀x) ?").unwrap();
	assert!(!system.exprs().is_complete(incomplete));
	assert_eq!(system.exprs().all_holes_of_sort(incomplete, Sort::Truth).len(), 1);
	assert_eq!(system.exprs().all_holes_of_sort(incomplete, Sort::Value).len(), 0);
}
