// Serializes a `Program` back to source text in canonical minimal form:
// trailing default operands elided, single-space token separation, one
// instruction per line, labels placed immediately before the index they bind.
// The minifier uses this as its final text-emission step; `load` of the
// output always reproduces the same `Program`.

use std::collections::BTreeMap;

use crate::ast::{Instruction, Operand, Program};
use crate::value::Value;

fn print_value(v: &Value) -> String
{
	match v
	{
		Value::Integer(n) => n.to_string(),
		Value::Text(s) => format!("#{}#", s),
	}
}

fn print_operand(op: &Operand) -> String
{
	match op
	{
		Operand::Literal(v) => print_value(v),
		Operand::VarRef(name) => format!("*{}*", name),
		Operand::Expr(node) => format!("({})", node),
	}
}

fn is_default_one(op: &Operand) -> bool
{
	*op == Operand::default_one()
}

fn print_instruction(instr: &Instruction) -> String
{
	match instr
	{
		Instruction::Set { dest, value, .. } => format!("set *{}* {}", dest, print_operand(value)),

		Instruction::Say { value, nl_qty, condition, .. } =>
		{
			let mut parts = vec!["say".to_string(), print_operand(value)];
			let condition_default = is_default_one(condition);
			let nl_default = is_default_one(nl_qty);

			if !(nl_default && condition_default) { parts.push(print_operand(nl_qty)); }
			if !condition_default { parts.push(print_operand(condition)); }

			parts.join(" ")
		},

		Instruction::Ask { n, condition, .. } =>
		{
			let mut parts = vec!["ask".to_string(), print_operand(n)];
			if !is_default_one(condition) { parts.push(print_operand(condition)); }
			parts.join(" ")
		},

		Instruction::Jmp { target, condition, .. } =>
		{
			let mut parts = vec!["jmp".to_string(), format!(":{}:", target)];
			if !is_default_one(condition) { parts.push(print_operand(condition)); }
			parts.join(" ")
		},

		Instruction::Halt { condition, .. } =>
		{
			if is_default_one(condition) { "halt".to_string() } else { format!("halt {}", print_operand(condition)) }
		},
	}
}

pub fn print_program(program: &Program) -> String
{
	let mut labels_at: BTreeMap<usize, Vec<&String>> = BTreeMap::new();
	for (name, idx) in &program.labels
	{
		labels_at.entry(*idx).or_insert_with(Vec::new).push(name);
	}
	for names in labels_at.values_mut()
	{
		names.sort();
	}

	let mut out = String::new();

	for (idx, instr) in program.instructions.iter().enumerate()
	{
		if let Some(names) = labels_at.get(&idx)
		{
			for name in names
			{
				out.push_str(&format!(":{}:\n", name));
			}
		}

		out.push_str(&print_instruction(instr));
		out.push('\n');
	}

	if let Some(names) = labels_at.get(&program.len())
	{
		for name in names
		{
			out.push_str(&format!(":{}:\n", name));
		}
	}

	out
}

#[cfg(test)]
mod tests
{
	use super::*;
	use crate::parser::load;

	#[test]
	fn round_trip_preserves_semantics()
	{
		let src = "set *score* 0\n:loop:\nsay *score* 1 ((*score*)<5)\nset *score* ((*score*)+1)\njmp :loop: ((*score*)<5)\nhalt\n";
		let program = load(src).unwrap();
		let printed = print_program(&program);
		let reparsed = load(&printed).unwrap();
		assert_eq!(program.instructions, reparsed.instructions);
		assert_eq!(program.labels, reparsed.labels);
	}

	#[test]
	fn defaults_are_elided()
	{
		let program = load("say #hi#\n").unwrap();
		assert_eq!(print_program(&program), "say #hi#\n");
	}

	#[test]
	fn trailing_label_with_no_instruction_is_preserved()
	{
		let src = "say #hi#\n:end:\n";
		let program = load(src).unwrap();
		let printed = print_program(&program);
		assert!(printed.ends_with(":end:\n"));
	}
}
