// Executes a loaded `Program`. The fetch-dispatch loop is flat: no pipeline,
// no microcycles, just a program counter and a match over the current
// instruction, the way a tiny bytecode VM actually runs.

use std::collections::HashMap;
use std::io::{BufRead, Write};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::ast::{Instruction, Operand, Program};
use crate::error::RuntimeError;
use crate::expr;
use crate::location::LineNumber;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct InterpreterConfig
{
	// `None` seeds the rng from entropy; `Some(seed)` makes `rng` runs reproducible,
	// which is what test harnesses and the minifier's constant folder both want.
	pub seed: Option<u64>,
}

impl Default for InterpreterConfig
{
	fn default() -> Self
	{
		InterpreterConfig { seed: None }
	}
}

pub struct Interpreter<'prog>
{
	program: &'prog Program,
	vars: HashMap<String, Value>,
	pc: usize,
	rng: StdRng,
}

impl<'prog> Interpreter<'prog>
{
	pub fn new(program: &'prog Program, config: InterpreterConfig) -> Interpreter<'prog>
	{
		let rng = match config.seed
		{
			Some(seed) => StdRng::seed_from_u64(seed),
			None => StdRng::from_entropy(),
		};

		Interpreter { program, vars: HashMap::new(), pc: 0, rng }
	}

	pub fn vars(&self) -> &HashMap<String, Value>
	{
		&self.vars
	}

	// The current program counter. `0 <= pc() <= program.len()` holds before
	// and after every call to `step`; `pc() == program.len()` means execution
	// has terminated normally.
	pub fn pc(&self) -> usize
	{
		self.pc
	}

	pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, mut output: W) -> Result<(), RuntimeError>
	{
		while self.pc < self.program.len()
		{
			self.step(&mut input, &mut output)?;
		}

		Ok(())
	}

	// Dispatches exactly one instruction and advances `pc`. Factored out of
	// `run` so the program-counter invariant can be exercised one instruction
	// at a time from tests, not just asserted over a whole run.
	fn step<R: BufRead, W: Write>(&mut self, input: &mut R, output: &mut W) -> Result<(), RuntimeError>
	{
		// Copying the reference out decouples its lifetime from `self`, so the
		// instruction we dispatch on can be borrowed independently of `&mut self`
		// below (needed because evaluating an expression touches `self.rng`).
		let program = self.program;
		let instr = &program.instructions[self.pc];
		log::trace!("pc={} dispatch {:?}", self.pc, instr);

		let mut jumped = false;

		match instr
		{
			Instruction::Set { line, dest, value } =>
			{
				let v = self.eval_operand(*line, value)?;
				log::debug!("{} set *{}* = {:?}", line, dest, v);
				self.vars.insert(dest.clone(), v);
			},

			Instruction::Say { line, value, nl_qty, condition } =>
			{
				if self.eval_condition(*line, condition)?
				{
					let v = self.eval_operand(*line, value)?;
					let nl = self.eval_nonnegative(*line, nl_qty)?;

					output.write_all(v.render().as_bytes()).map_err(|e| RuntimeError::Io(*line, e.to_string()))?;
					for _ in 0..nl
					{
						output.write_all(b"\n").map_err(|e| RuntimeError::Io(*line, e.to_string()))?;
					}
				}
			},

			Instruction::Ask { line, n, condition } =>
			{
				let active = self.eval_condition(*line, condition)?;
				let n_val = self.eval_operand(*line, n)?;
				let n_int = match n_val.as_arith_integer()
				{
					Some(v) if v >= 1 => v,
					Some(_) => return Err(RuntimeError::RangeError(*line, "ask requires n >= 1".to_string())),
					None => return Err(RuntimeError::TypeError(*line, "ask's option count must be an integer".to_string())),
				};

				if !active
				{
					self.pc += 1 + n_int as usize;
					jumped = true;
				}
				else
				{
					let mut line_buf = String::new();
					let bytes_read = input.read_line(&mut line_buf).map_err(|e| RuntimeError::Io(*line, e.to_string()))?;
					let trimmed = line_buf.trim_end_matches(|c| c == '\n' || c == '\r');
					let choice: Option<i64> = if bytes_read == 0 { None } else { trimmed.parse().ok() };

					match choice
					{
						Some(k) if k >= 1 && k <= n_int =>
						{
							self.pc += 1 + (k - 1) as usize;
							jumped = true;
						},
						Some(_) => { self.pc += 1; jumped = true; },
						None => return Err(RuntimeError::InputError(*line)),
					}
				}
			},

			Instruction::Jmp { line, target, condition } =>
			{
				if self.eval_condition(*line, condition)?
				{
					self.pc = program.labels[target];
					jumped = true;
				}
			},

			Instruction::Halt { line, condition } =>
			{
				if self.eval_condition(*line, condition)?
				{
					self.pc = program.len();
					jumped = true;
				}
			},
		}

		if !jumped { self.pc += 1; }

		Ok(())
	}

	fn eval_operand(&mut self, line: LineNumber, operand: &Operand) -> Result<Value, RuntimeError>
	{
		match operand
		{
			Operand::Literal(v) => Ok(v.clone()),
			Operand::VarRef(name) => self.vars.get(name).cloned().ok_or_else(|| RuntimeError::UndefinedVar(line, name.clone())),
			Operand::Expr(node) => expr::eval(node, line, &self.vars, &mut self.rng),
		}
	}

	fn eval_condition(&mut self, line: LineNumber, operand: &Operand) -> Result<bool, RuntimeError>
	{
		Ok(self.eval_operand(line, operand)?.is_truthy())
	}

	fn eval_nonnegative(&mut self, line: LineNumber, operand: &Operand) -> Result<i64, RuntimeError>
	{
		let v = self.eval_operand(line, operand)?;
		match v.as_arith_integer()
		{
			Some(n) if n >= 0 => Ok(n),
			Some(_) => Err(RuntimeError::RangeError(line, "newline count must not be negative".to_string())),
			None => Err(RuntimeError::TypeError(line, "newline count must be an integer".to_string())),
		}
	}
}

#[cfg(test)]
mod tests
{
	use super::*;
	use crate::parser::load;
	use std::io::Cursor;

	fn run_program(src: &str, input: &str) -> (String, Result<(), RuntimeError>)
	{
		let program = load(src).unwrap();
		let mut interp = Interpreter::new(&program, InterpreterConfig { seed: Some(1) });
		let mut out = Vec::new();
		let result = interp.run(Cursor::new(input.as_bytes()), &mut out);
		(String::from_utf8(out).unwrap(), result)
	}

	#[test]
	fn say_prints_value_and_newlines()
	{
		let (out, result) = run_program("say #hi# 2\n", "");
		assert!(result.is_ok());
		assert_eq!(out, "hi\n\n");
	}

	#[test]
	fn set_then_say_roundtrips_a_variable()
	{
		let (out, result) = run_program("set *x* 5\nsay *x*\n", "");
		assert!(result.is_ok());
		assert_eq!(out, "5\n");
	}

	#[test]
	fn loop_with_jmp_and_condition()
	{
		let src = "set *i* 0\n:loop:\nsay *i* 0\nset *i* ((*i*)+1)\njmp :loop: ((*i*)<3)\n";
		let (out, result) = run_program(src, "");
		assert!(result.is_ok());
		assert_eq!(out, "012");
	}

	#[test]
	fn undefined_var_is_fatal()
	{
		let (_, result) = run_program("say *missing*\n", "");
		match result
		{
			Err(RuntimeError::UndefinedVar(_, name)) => assert_eq!(name, "missing"),
			other => panic!("expected UndefinedVar mentioning 'missing', got {:?}", other),
		}
	}

	#[test]
	fn string_comparison_is_case_sensitive()
	{
		let src = "set *n* #Alice#\nsay #yes# 1 1 ((*n*)==#alice#)\nhalt\n";
		let (out, result) = run_program(src, "");
		assert!(result.is_ok());
		assert_eq!(out, "");
	}

	#[test]
	fn integer_division_and_modulo_floor_toward_zero()
	{
		let (out, result) = run_program("say ((7/2)) 1 1\nsay ((10%3)) 1 1\n", "");
		assert!(result.is_ok());
		assert_eq!(out, "3\n1\n");
	}

	const MENU_SRC: &str = "say #a?# 1 1\nask 2\njmp :A:\njmp :B:\n:A:\nsay #A# 1 1\nhalt\n:B:\nsay #B# 1 1\nhalt\n";

	#[test]
	fn ask_dispatches_to_the_chosen_option()
	{
		let (out, result) = run_program(MENU_SRC, "2\n");
		assert!(result.is_ok());
		assert_eq!(out, "a?\nB\n");
	}

	#[test]
	fn ask_with_out_of_range_choice_falls_through_to_option_one()
	{
		let (out, result) = run_program(MENU_SRC, "9\n");
		assert!(result.is_ok());
		assert_eq!(out, "a?\nA\n");
	}

	#[test]
	fn ask_with_non_numeric_input_is_an_input_error()
	{
		let src = "ask 2\nhalt\n";
		let (_, result) = run_program(src, "nope\n");
		assert!(matches!(result, Err(RuntimeError::InputError(_))));
	}

	#[test]
	fn disabled_ask_skips_all_its_options()
	{
		let src = "ask 2 0\nsay #one#\nsay #two#\nsay #after#\n";
		let (out, result) = run_program(src, "");
		assert!(result.is_ok());
		assert_eq!(out, "after\n");
	}

	#[test]
	fn halt_stops_execution()
	{
		let (out, result) = run_program("say #a#\nhalt\nsay #b#\n", "");
		assert!(result.is_ok());
		assert_eq!(out, "a\n");
	}

	// Steps a program one instruction at a time (rather than calling `run`
	// straight through) so `0 <= pc <= len` can be asserted after every single
	// dispatch, not just inferred from the final result.
	fn step_and_check_pc_invariant(src: &str, input: &str)
	{
		let program = load(src).unwrap();
		let len = program.len();
		let mut interp = Interpreter::new(&program, InterpreterConfig { seed: Some(1) });
		let mut out = Vec::new();
		let mut cursor = Cursor::new(input.as_bytes());

		while interp.pc() < len
		{
			interp.step(&mut cursor, &mut out).unwrap();
			assert!(interp.pc() <= len, "pc {} exceeded len {}", interp.pc(), len);
		}

		assert_eq!(interp.pc(), len);
	}

	#[test]
	fn pc_invariant_holds_after_every_step_of_a_loop()
	{
		let src = "set *i* 0\n:loop:\nsay *i* 0\nset *i* ((*i*)+1)\njmp :loop: ((*i*)<3)\nhalt\n";
		step_and_check_pc_invariant(src, "");
	}

	#[test]
	fn pc_invariant_holds_after_every_step_of_an_ask_dispatch()
	{
		for input in ["1\n", "2\n", "9\n"]
		{
			step_and_check_pc_invariant(MENU_SRC, input);
		}
	}

	#[test]
	fn ask_disabled_identity_matches_the_ask_and_its_options_deleted()
	{
		let with_ask = "say #before#\nask 2 0\nsay #one#\nsay #two#\nsay #after#\n";
		let without_ask = "say #before#\nsay #after#\n";

		let (with_ask_out, with_ask_result) = run_program(with_ask, "");
		let (without_ask_out, without_ask_result) = run_program(without_ask, "");

		assert!(with_ask_result.is_ok());
		assert!(without_ask_result.is_ok());
		assert_eq!(with_ask_out, without_ask_out);
	}
}
