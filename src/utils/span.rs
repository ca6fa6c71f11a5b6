use annotate_snippets::{
	display_list::{DisplayList, FormatOptions},
	snippet::{Annotation, AnnotationType, Slice, Snippet, SourceAnnotation},
};
use itertools::Itertools;

fn find_char_pos(string: &str, byte_pos: usize) -> usize {
	string
		.char_indices()
		.map(|(index, _)| index)
		.enumerate()
		.find(|(_, index)| index == &byte_pos)
		.map(|(char_pos, _)| char_pos)
		.unwrap_or_else(|| string.chars().count())
}

pub trait GetErrorCharsRange {
	fn get_error_range(&self, string: &str) -> (usize, usize);
}

impl GetErrorCharsRange for peg::str::LineCol {
	fn get_error_range(&self, string: &str) -> (usize, usize) {
		(
			find_char_pos(string, self.offset),
			find_char_pos(string, self.offset) + 1,
		)
	}
}

/// Преобразование ошибки `rust-peg` в формат `snippet`.
pub fn peg_error_to_snippet<T: GetErrorCharsRange>(err: peg::error::ParseError<T>, string: &str) {
	let inner_text = format!(
		"expected tokens: {}",
		err.expected.tokens().collect::<Vec<_>>().into_iter().join(", ")
	);

	let snippet = Snippet {
		title: Some(Annotation {
			label: Some("unexpected token"),
			id: None,
			annotation_type: AnnotationType::Error,
		}),
		footer: vec![Annotation {
			label: Some(&inner_text),
			id: None,
			annotation_type: AnnotationType::Note,
		}],
		slices: vec![
			Slice {
				source: string,
				line_start: 0,
				origin: None,
				fold: true,
				annotations: vec![
					SourceAnnotation {
						label: "unexpected token",
						annotation_type: AnnotationType::Error,
						range: err.location.get_error_range(string),
					},
				],
			},
		],
		opt: FormatOptions {
			color: true,
			..Default::default()
		},
	};
	println!("{}", DisplayList::from(snippet));
}
