// The individual rewrite passes the driver in `mod.rs` sequences. Each pass
// takes a `&mut Program` and returns whether it changed anything, so the
// driver can iterate to a fixpoint. Passes that delete instructions share
// `remove_indices`, which keeps the label table and any `ask` option counts
// consistent with the new, shorter instruction list.

use std::collections::{BTreeSet, HashMap, HashSet};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::ast::{Instruction, Operand, Program};
use crate::expr::{self, ExprNode};
use crate::location::LineNumber;
use crate::value::Value;

// `ask`'s dispatch arithmetic is positional: the k-th following instruction is
// option k. Any pass that deletes or inserts instructions has to either know
// exactly how many options shift, or leave the whole program alone. We only
// know that when `n` is a literal; an `n` computed from an expression means we
// can't reason about the span statically, so every instruction-count-changing
// pass below becomes a no-op for such a program.
fn has_dynamic_ask(program: &Program) -> bool
{
	program.instructions.iter().any(|instr| matches!(instr, Instruction::Ask { n, .. } if !matches!(n, Operand::Literal(_))))
}

fn ask_literal_n(instr: &Instruction) -> Option<i64>
{
	match instr
	{
		Instruction::Ask { n: Operand::Literal(Value::Integer(k)), .. } => Some(*k),
		_ => None,
	}
}

// Every index that some `ask n` treats as a dispatch target: the `n` option
// slots, plus the instruction right after the block (the disabled-`ask`/
// default-fallthrough landing spot). These must never be deleted out from
// under the `ask` that addresses them.
fn ask_dispatch_targets(program: &Program) -> HashSet<usize>
{
	let mut targets = HashSet::new();

	for (idx, instr) in program.instructions.iter().enumerate()
	{
		if let Some(k) = ask_literal_n(instr)
		{
			let k = k as usize;
			for t in (idx + 1)..=(idx + k) { targets.insert(t); }
			targets.insert(idx + k + 1);
		}
	}

	targets
}

// Removes the given instruction indices, then repairs everything that is
// expressed as an absolute or relative index: the label table (every label
// maps to "however many surviving instructions precede it", which is correct
// whether or not the label's own old index was itself removed) and every
// `ask`'s literal option count (reduced by however many of its own option
// slots were removed).
fn remove_indices(program: &mut Program, remove: &BTreeSet<usize>)
{
	if remove.is_empty() { return; }

	let total = program.instructions.len();
	let mut removed_before = vec![0usize; total + 1];
	for i in 0..total
	{
		removed_before[i + 1] = removed_before[i] + if remove.contains(&i) { 1 } else { 0 };
	}
	let map_index = |old: usize| old - removed_before[old];

	for (idx, instr) in program.instructions.iter_mut().enumerate()
	{
		if let Instruction::Ask { n: Operand::Literal(Value::Integer(k)), .. } = instr
		{
			let span_removed = remove.iter().filter(|&&r| r > idx && r <= idx + (*k as usize)).count();
			if span_removed > 0 { *k -= span_removed as i64; }
		}
	}

	for v in program.labels.values_mut()
	{
		*v = map_index(*v);
	}

	let mut kept = Vec::with_capacity(total - remove.len());
	for (idx, instr) in program.instructions.drain(..).enumerate()
	{
		if !remove.contains(&idx) { kept.push(instr); }
	}
	program.instructions = kept;
}

// Inserts instructions at program start. Every existing index shifts by the
// same constant, so labels just need a flat offset; `ask` option counts are
// untouched because an option's distance from its own `ask` never changes.
fn prepend_instructions(program: &mut Program, mut new_instrs: Vec<Instruction>)
{
	let delta = new_instrs.len();
	if delta == 0 { return; }

	for v in program.labels.values_mut() { *v += delta; }

	new_instrs.append(&mut program.instructions);
	program.instructions = new_instrs;
}

fn operands_mut(instr: &mut Instruction) -> Vec<&mut Operand>
{
	match instr
	{
		Instruction::Set { value, .. } => vec![value],
		Instruction::Say { value, nl_qty, condition, .. } => vec![value, nl_qty, condition],
		Instruction::Ask { n, condition, .. } => vec![n, condition],
		Instruction::Jmp { condition, .. } => vec![condition],
		Instruction::Halt { condition, .. } => vec![condition],
	}
}

fn operands(instr: &Instruction) -> Vec<&Operand>
{
	match instr
	{
		Instruction::Set { value, .. } => vec![value],
		Instruction::Say { value, nl_qty, condition, .. } => vec![value, nl_qty, condition],
		Instruction::Ask { n, condition, .. } => vec![n, condition],
		Instruction::Jmp { condition, .. } => vec![condition],
		Instruction::Halt { condition, .. } => vec![condition],
	}
}

// --- pass 1: comment removal ------------------------------------------------

fn is_dead_comment(instr: &Instruction) -> bool
{
	matches!(instr, Instruction::Say { condition: Operand::Literal(Value::Integer(0)), .. })
}

pub fn comment_removal(program: &mut Program) -> bool
{
	if has_dynamic_ask(program) { return false; }

	let targets = ask_dispatch_targets(program);
	let remove: BTreeSet<usize> = program.instructions.iter().enumerate()
		.filter(|(idx, instr)| is_dead_comment(instr) && !targets.contains(idx))
		.map(|(idx, _)| idx)
		.collect();

	if remove.is_empty() { return false; }

	remove_indices(program, &remove);
	true
}

// --- pass 5: constant folding ------------------------------------------------

// Folds any `Expr` operand whose tree is built entirely from literals (no
// variable reads, no `rng`) into the literal it always evaluates to. `rng`
// expressions are never foldable by construction (`expr::is_foldable` says
// so), so this pass never touches randomness.
pub fn constant_folding(program: &mut Program) -> bool
{
	let mut changed = false;
	let mut dummy_rng = StdRng::seed_from_u64(0);
	let empty_vars: HashMap<String, Value> = HashMap::new();

	for instr in &mut program.instructions
	{
		for operand in operands_mut(instr)
		{
			if let Operand::Expr(node) = operand
			{
				if expr::is_foldable(node)
				{
					if let Ok(v) = expr::eval(node, LineNumber(0), &empty_vars, &mut dummy_rng)
					{
						*operand = Operand::Literal(v);
						changed = true;
					}
				}
			}
		}
	}

	changed
}

// --- pass 7: dead-store elimination -----------------------------------------

fn reads_var(op: &Operand, var: &str) -> bool
{
	match op
	{
		Operand::VarRef(name) => name == var,
		Operand::Expr(node) =>
		{
			let mut vars = HashSet::new();
			expr::collect_vars(node, &mut vars);
			vars.contains(var)
		},
		_ => false,
	}
}

fn instruction_reads_var(instr: &Instruction, var: &str) -> bool
{
	match instr
	{
		// The destination of a `set` is a write, not a read of its old value.
		Instruction::Set { value, .. } => reads_var(value, var),
		_ => operands(instr).iter().any(|op| reads_var(op, var)),
	}
}

fn is_store_to(instr: &Instruction, var: &str) -> bool
{
	matches!(instr, Instruction::Set { dest, .. } if dest == var)
}

// Forward flood from just after a `set *var*`, following every possible
// control path. A path that reaches a read before any rewrite of `var` makes
// the whole store live. A path that reaches another `set *var*` first, or
// runs off the end of the program, or loops back on an index already visited
// without having found a read, contributes nothing and the flood stops there.
fn is_store_live(program: &Program, store_idx: usize, var: &str) -> bool
{
	let len = program.instructions.len();
	let mut visited = HashSet::new();
	let mut stack = successors(program, store_idx);

	while let Some(idx) = stack.pop()
	{
		if idx >= len { continue; }
		if !visited.insert(idx) { continue; }

		let instr = &program.instructions[idx];

		if instruction_reads_var(instr, var) { return true; }
		if is_store_to(instr, var) { continue; }

		stack.extend(successors(program, idx));
	}

	false
}

pub fn dead_store_elimination(program: &mut Program) -> bool
{
	if has_dynamic_ask(program) { return false; }

	let remove: BTreeSet<usize> = program.instructions.iter().enumerate()
		.filter_map(|(idx, instr)| match instr
		{
			Instruction::Set { dest, .. } if !is_store_live(program, idx, dest) => Some(idx),
			_ => None,
		})
		.collect();

	if remove.is_empty() { return false; }

	remove_indices(program, &remove);
	true
}

// --- pass 8: unreachable-code elimination -----------------------------------

// Statically reachable successors of one instruction. An unconditional
// `jmp`/`halt` (condition literal `1`) is a hard terminator: it never falls
// through. Everything else flows to the next instruction and, for `jmp`,
// also branches to its target. `ask`'s successors are every one of its `n`
// option slots, plus the instruction right after the block - the landing
// spot when `ask` is disabled.
fn successors(program: &Program, idx: usize) -> Vec<usize>
{
	let instr = &program.instructions[idx];

	match instr
	{
		Instruction::Set { .. } | Instruction::Say { .. } => vec![idx + 1],

		Instruction::Jmp { target, .. } =>
		{
			let tgt = program.labels[target];
			if instr.is_unconditional_transfer() { vec![tgt] } else { vec![idx + 1, tgt] }
		},

		Instruction::Halt { .. } =>
		{
			if instr.is_unconditional_transfer() { vec![] } else { vec![idx + 1] }
		},

		Instruction::Ask { .. } =>
		{
			match ask_literal_n(instr)
			{
				Some(k) =>
				{
					let k = k as usize;
					let mut v: Vec<usize> = (idx + 1..=idx + k).collect();
					v.push(idx + k + 1);
					v
				},
				// A dynamic ask is statically opaque; `has_dynamic_ask` already
				// keeps this pass from ever running on such a program, but stay
				// conservative here too rather than guess.
				None => vec![idx + 1],
			}
		},
	}
}

fn reachable_set(program: &Program) -> HashSet<usize>
{
	let len = program.instructions.len();
	let mut reachable = HashSet::new();
	let mut stack = Vec::new();

	if !program.is_empty() { stack.push(0); }

	// A label-declared position is preserved conservatively even if
	// no live jmp currently targets it.
	for &idx in program.labels.values()
	{
		if idx < len { stack.push(idx); }
	}

	while let Some(idx) = stack.pop()
	{
		if idx >= len || !reachable.insert(idx) { continue; }

		for succ in successors(program, idx)
		{
			if succ < len && !reachable.contains(&succ) { stack.push(succ); }
		}
	}

	reachable
}

pub fn unreachable_code_elimination(program: &mut Program) -> bool
{
	if has_dynamic_ask(program) { return false; }

	let reachable = reachable_set(program);
	let remove: BTreeSet<usize> = (0..program.instructions.len()).filter(|i| !reachable.contains(i)).collect();

	if remove.is_empty() { return false; }

	remove_indices(program, &remove);
	true
}

// --- pass 6: string pooling --------------------------------------------------

fn count_strings_in_expr(node: &ExprNode, counts: &mut HashMap<String, usize>)
{
	match node
	{
		ExprNode::StrLiteral(s) => { *counts.entry(s.clone()).or_insert(0) += 1; },
		ExprNode::IntLiteral(_) | ExprNode::Var(_) => {},
		ExprNode::Rng(a, b) => { count_strings_in_expr(a, counts); count_strings_in_expr(b, counts); },
		ExprNode::BinOp(_, a, b) => { count_strings_in_expr(a, counts); count_strings_in_expr(b, counts); },
	}
}

fn count_strings_in_operand(op: &Operand, counts: &mut HashMap<String, usize>)
{
	match op
	{
		Operand::Literal(Value::Text(s)) => { *counts.entry(s.clone()).or_insert(0) += 1; },
		Operand::Expr(node) => count_strings_in_expr(node, counts),
		_ => {},
	}
}

fn replace_strings_in_expr(node: &mut ExprNode, pool: &HashMap<String, String>)
{
	match node
	{
		ExprNode::StrLiteral(s) =>
		{
			if let Some(var) = pool.get(s) { *node = ExprNode::Var(var.clone()); }
		},
		ExprNode::IntLiteral(_) | ExprNode::Var(_) => {},
		ExprNode::Rng(a, b) => { replace_strings_in_expr(a, pool); replace_strings_in_expr(b, pool); },
		ExprNode::BinOp(_, a, b) => { replace_strings_in_expr(a, pool); replace_strings_in_expr(b, pool); },
	}
}

fn replace_strings_in_operand(op: &mut Operand, pool: &HashMap<String, String>)
{
	match op
	{
		Operand::Literal(Value::Text(s)) =>
		{
			if let Some(var) = pool.get(s) { *op = Operand::VarRef(var.clone()); }
		},
		Operand::Expr(node) => replace_strings_in_expr(node, pool),
		_ => {},
	}
}

fn all_var_names(program: &Program) -> HashSet<String>
{
	let mut names = HashSet::new();

	for instr in &program.instructions
	{
		if let Instruction::Set { dest, .. } = instr { names.insert(dest.clone()); }

		for op in operands(instr)
		{
			match op
			{
				Operand::VarRef(n) => { names.insert(n.clone()); },
				Operand::Expr(node) => expr::collect_vars(node, &mut names),
				_ => {},
			}
		}
	}

	names
}

// Strings seen more than `threshold` times get hoisted into a single `set`
// at program start (the one insertion point that trivially dominates every
// use) and every occurrence is replaced with a reference to it.
pub fn string_pooling(program: &mut Program, threshold: usize) -> bool
{
	let mut counts: HashMap<String, usize> = HashMap::new();
	for instr in &program.instructions
	{
		for op in operands(instr) { count_strings_in_operand(op, &mut counts); }
	}

	let mut candidates: Vec<String> = counts.into_iter().filter(|(_, c)| *c > threshold).map(|(s, _)| s).collect();
	candidates.sort();

	if candidates.is_empty() { return false; }

	let existing = all_var_names(program);
	let mut pool: HashMap<String, String> = HashMap::new();

	for (i, s) in candidates.iter().enumerate()
	{
		let mut name = format!("pool{}", i);
		while existing.contains(&name) || pool.values().any(|v| v == &name) { name.push('_'); }
		pool.insert(s.clone(), name);
	}

	for instr in &mut program.instructions
	{
		for op in operands_mut(instr) { replace_strings_in_operand(op, &pool); }
	}

	let new_instrs: Vec<Instruction> = candidates.iter()
		.map(|s| Instruction::Set { line: LineNumber(0), dest: pool[s].clone(), value: Operand::Literal(Value::Text(s.clone())) })
		.collect();

	prepend_instructions(program, new_instrs);
	true
}

// --- pass 4: name shrinking --------------------------------------------------

// Bijective base-26 counting, the spreadsheet-column scheme: 0 -> "a", 25 ->
// "z", 26 -> "aa". Produces the shortest possible fresh identifier for each
// rank in the assignment order.
fn short_name(mut i: usize) -> String
{
	let mut letters = Vec::new();

	loop
	{
		letters.push((b'a' + (i % 26) as u8) as char);
		if i < 26 { break; }
		i = i / 26 - 1;
	}

	letters.iter().rev().collect()
}

fn collect_expr_vars_ordered(node: &ExprNode, seen: &mut HashSet<String>, order: &mut Vec<String>)
{
	match node
	{
		ExprNode::Var(name) => { if seen.insert(name.clone()) { order.push(name.clone()); } },
		ExprNode::IntLiteral(_) | ExprNode::StrLiteral(_) => {},
		ExprNode::Rng(a, b) => { collect_expr_vars_ordered(a, seen, order); collect_expr_vars_ordered(b, seen, order); },
		ExprNode::BinOp(_, a, b) => { collect_expr_vars_ordered(a, seen, order); collect_expr_vars_ordered(b, seen, order); },
	}
}

fn collect_operand_vars_ordered(op: &Operand, seen: &mut HashSet<String>, order: &mut Vec<String>)
{
	match op
	{
		Operand::VarRef(name) => { if seen.insert(name.clone()) { order.push(name.clone()); } },
		Operand::Expr(node) => collect_expr_vars_ordered(node, seen, order),
		_ => {},
	}
}

fn rename_expr_vars(node: &mut ExprNode, map: &HashMap<String, String>)
{
	match node
	{
		ExprNode::Var(name) => { if let Some(new_name) = map.get(name) { *name = new_name.clone(); } },
		ExprNode::IntLiteral(_) | ExprNode::StrLiteral(_) => {},
		ExprNode::Rng(a, b) => { rename_expr_vars(a, map); rename_expr_vars(b, map); },
		ExprNode::BinOp(_, a, b) => { rename_expr_vars(a, map); rename_expr_vars(b, map); },
	}
}

fn rename_operand_vars(op: &mut Operand, map: &HashMap<String, String>)
{
	match op
	{
		Operand::VarRef(name) => { if let Some(new_name) = map.get(name) { *name = new_name.clone(); } },
		Operand::Expr(node) => rename_expr_vars(node, map),
		_ => {},
	}
}

// Variables and labels are renamed independently (per spec §3, they live in
// disjoint namespaces), each in first-occurrence order so the rewrite reads
// top-to-bottom the way a human minifier would have done it by hand.
pub fn name_shrinking(program: &mut Program) -> bool
{
	let mut var_order = Vec::new();
	let mut var_seen = HashSet::new();

	for instr in &program.instructions
	{
		if let Instruction::Set { dest, .. } = instr
		{
			if var_seen.insert(dest.clone()) { var_order.push(dest.clone()); }
		}
		for op in operands(instr) { collect_operand_vars_ordered(op, &mut var_seen, &mut var_order); }
	}

	let mut label_entries: Vec<(String, usize)> = program.labels.iter().map(|(k, v)| (k.clone(), *v)).collect();
	label_entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

	let var_map: HashMap<String, String> = var_order.iter().enumerate().map(|(i, n)| (n.clone(), short_name(i))).collect();
	let label_map: HashMap<String, String> = label_entries.iter().enumerate().map(|(i, (n, _))| (n.clone(), short_name(i))).collect();

	let changed = var_map.iter().any(|(old, new)| old != new) || label_map.iter().any(|(old, new)| old != new);
	if !changed { return false; }

	for instr in &mut program.instructions
	{
		if let Instruction::Set { dest, .. } = instr
		{
			if let Some(new_name) = var_map.get(dest) { *dest = new_name.clone(); }
		}
		if let Instruction::Jmp { target, .. } = instr
		{
			if let Some(new_name) = label_map.get(target) { *target = new_name.clone(); }
		}
		for op in operands_mut(instr) { rename_operand_vars(op, &var_map); }
	}

	let new_labels: HashMap<String, usize> = program.labels.iter().map(|(k, v)| (label_map[k].clone(), *v)).collect();
	program.labels = new_labels;

	true
}

#[cfg(test)]
mod tests
{
	use super::*;
	use crate::parser::load;
	use crate::printer::print_program;

	#[test]
	fn comment_removal_drops_say_zero_lines()
	{
		let mut program = load("say #hi#\nsay #dead# 1 0\nhalt\n").unwrap();
		assert!(comment_removal(&mut program));
		assert_eq!(program.len(), 2);
		assert!(!comment_removal(&mut program), "must be idempotent");
	}

	#[test]
	fn comment_removal_spares_ask_option_slots()
	{
		let src = "ask 2\nsay #dead# 1 0\njmp :b:\nhalt\n:b:\nhalt\n";
		let mut program = load(src).unwrap();
		let before = program.len();
		assert!(!comment_removal(&mut program));
		assert_eq!(program.len(), before);
	}

	#[test]
	fn constant_folding_reduces_literal_only_expressions()
	{
		let mut program = load("say ((1+2)*3)\n").unwrap();
		assert!(constant_folding(&mut program));
		match &program.instructions[0]
		{
			Instruction::Say { value: Operand::Literal(Value::Integer(n)), .. } => assert_eq!(*n, 9),
			other => panic!("expected a folded literal, got {:?}", other),
		}
		assert!(!constant_folding(&mut program), "must be idempotent");
	}

	#[test]
	fn constant_folding_leaves_var_and_rng_expressions_alone()
	{
		let mut program = load("say ((*x*)+1)\nsay (rng 1 6)\n").unwrap();
		assert!(!constant_folding(&mut program));
	}

	#[test]
	fn dead_store_elimination_removes_unread_overwritten_store()
	{
		let mut program = load("set *x* 1\nset *x* 2\nsay *x*\n").unwrap();
		assert!(dead_store_elimination(&mut program));
		assert_eq!(program.len(), 2);
		assert!(!dead_store_elimination(&mut program), "must be idempotent");
	}

	#[test]
	fn dead_store_elimination_keeps_stores_read_on_a_later_path()
	{
		let src = "set *i* 0\n:loop:\nsay *i* 0\nset *i* ((*i*)+1)\njmp :loop: ((*i*)<3)\nhalt\n";
		let mut program = load(src).unwrap();
		let before = program.len();
		dead_store_elimination(&mut program);
		assert_eq!(program.len(), before);
	}

	#[test]
	fn dead_store_elimination_drops_a_store_never_read_again()
	{
		let mut program = load("set *unused* 1\nhalt\n").unwrap();
		assert!(dead_store_elimination(&mut program));
		assert_eq!(program.len(), 1);
	}

	#[test]
	fn unreachable_code_elimination_drops_instructions_past_an_unconditional_halt()
	{
		let mut program = load("say #a#\nhalt\nsay #never#\n").unwrap();
		assert!(unreachable_code_elimination(&mut program));
		assert_eq!(program.len(), 2);
		assert!(!unreachable_code_elimination(&mut program), "must be idempotent");
	}

	#[test]
	fn unreachable_code_elimination_preserves_ask_option_block()
	{
		let src = "ask 2\njmp :a:\njmp :b:\n:a:\nsay #A#\nhalt\n:b:\nsay #B#\nhalt\n";
		let mut program = load(src).unwrap();
		let before = program.len();
		unreachable_code_elimination(&mut program);
		assert_eq!(program.len(), before);
	}

	#[test]
	fn string_pooling_hoists_strings_used_above_threshold()
	{
		let mut program = load("say #hi#\nsay #hi#\nsay #hi#\n").unwrap();
		assert!(string_pooling(&mut program, 2));
		assert_eq!(program.len(), 4);
		assert!(matches!(&program.instructions[0], Instruction::Set { value: Operand::Literal(Value::Text(s)), .. } if s == "hi"));
		for instr in &program.instructions[1..]
		{
			assert!(matches!(instr, Instruction::Say { value: Operand::VarRef(_), .. }));
		}
		assert!(!string_pooling(&mut program, 2), "must be idempotent");
	}

	#[test]
	fn string_pooling_leaves_rare_strings_alone()
	{
		let mut program = load("say #once#\nsay #twice#\nsay #twice#\n").unwrap();
		assert!(!string_pooling(&mut program, 2));
	}

	#[test]
	fn string_pooling_preserves_output()
	{
		let src = "say #hi# 1 1\nsay #hi# 1 1\nsay #hi# 1 1\nhalt\n";
		let before = load(src).unwrap();
		let mut after = load(src).unwrap();
		string_pooling(&mut after, 2);
		let reprinted = print_program(&after);
		let reloaded = load(&reprinted).unwrap();

		use std::io::Cursor;
		use crate::interpreter::{Interpreter, InterpreterConfig};

		let run = |p: &Program| -> String
		{
			let mut interp = Interpreter::new(p, InterpreterConfig { seed: Some(1) });
			let mut out = Vec::new();
			interp.run(Cursor::new(&b""[..]), &mut out).unwrap();
			String::from_utf8(out).unwrap()
		};

		assert_eq!(run(&before), run(&reloaded));
	}

	#[test]
	fn name_shrinking_renames_vars_and_labels_independently()
	{
		let mut program = load("set *score* 0\n:loop:\nsay *score*\njmp :loop: 0\n").unwrap();
		assert!(name_shrinking(&mut program));
		match &program.instructions[0]
		{
			Instruction::Set { dest, .. } => assert_eq!(dest, "a"),
			_ => panic!("expected a set"),
		}
		assert_eq!(program.labels["a"], 1);
		assert!(!name_shrinking(&mut program), "must be idempotent");
	}

	#[test]
	fn short_name_produces_spreadsheet_style_sequence()
	{
		assert_eq!(short_name(0), "a");
		assert_eq!(short_name(25), "z");
		assert_eq!(short_name(26), "aa");
		assert_eq!(short_name(27), "ab");
	}
}
