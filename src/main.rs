use colored::Colorize;
use dedukt::read_theory;

fn main() {
	let input = match std::fs::read_to_string("theory/math.ded") {
		Ok(input) => input,
		Err(_) => {
			println!("{}", "can't read `theory/math.ded`".red());
			return;
		},
	};
	match read_theory(&input) {
		Ok(system) => {
			for axiom in system.axioms() {
				let id = system.identifier_of(*axiom).unwrap().to_string();
				println!("{} {}", id.as_str().green().bold(), system.exprs().render(*axiom));
			}
			println!("{}", "`theory/math.ded` is OK".green());
		},
		Err(()) => println!("{}", "`theory/math.ded` has errors".red()),
	}
}
