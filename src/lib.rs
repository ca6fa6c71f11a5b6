use annotate_snippets::{
	display_list::{DisplayList, FormatOptions},
	snippet::{Annotation, AnnotationType, Snippet},
};

use crate::utils::span::peg_error_to_snippet;

pub mod binding;
pub mod expr;
pub mod parsing;
pub mod proof;
pub mod utils;

fn print_error_snippet(text: &str) {
	let snippet = Snippet {
		title: Some(Annotation { label: Some(text), id: None, annotation_type: AnnotationType::Error }),
		opt: FormatOptions { color: true, ..Default::default() },
		..Snippet::default()
	};
	println!("{}", DisplayList::from(snippet));
}

/// Читает файл теории — список `axiom <высказывание>;` — и возвращает формальную систему
/// с добавленными аксиомами. Ошибки печатаются сниппетами.
pub fn read_theory(input: &str) -> Result<proof::FormalSystem, ()> {
	use crate::proof::FormalSystem;

	let parsed = parsing::notation::theory(input).map_err(|err| peg_error_to_snippet(err, input))?;

	let mut system = FormalSystem::new();
	for parsed_axiom in &parsed {
		let axiom = parsing::load(system.exprs_mut(), parsed_axiom)
			.map_err(|err| print_error_snippet(&err.to_string()))?;
		system
			.add_axiom(axiom)
			.map_err(|err| print_error_snippet(&err.to_string()))?;
	}

	Ok(system)
}
