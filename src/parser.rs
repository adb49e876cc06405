// Turns source text into a `Program` in three passes: classify each line
// (blank, label, or instruction), build the label table, then type-check
// every instruction's operands against its opcode's arity. Errors accumulate
// across the whole file instead of stopping at the first one, so a caller
// sees every mistake in a single pass.

use crate::ast::{Instruction, Operand, Program};
use crate::error::{ArityError, LabelError, LoadError, SyntaxError};
use crate::expr;
use crate::lexer::{self, Token, TokenKind};
use crate::location::LineNumber;
use crate::value::Value;

enum Classified
{
	Blank,
	Label(String),
	Instruction(Vec<Token>),
}

fn classify(line_no: LineNumber, text: &str) -> Result<Classified, LoadError>
{
	let tokens = lexer::lex_line(line_no, text)?;

	if tokens.is_empty()
	{
		return Ok(Classified::Blank);
	}

	if tokens.len() == 1
	{
		if let TokenKind::Label(name) = &tokens[0].kind
		{
			return Ok(Classified::Label(name.clone()));
		}
	}

	Ok(Classified::Instruction(tokens))
}

fn operand_from_token(line: LineNumber, token: &Token) -> Result<Operand, LoadError>
{
	match &token.kind
	{
		TokenKind::Str(s) => Ok(Operand::Literal(Value::Text(s.clone()))),
		TokenKind::VarOrExpr(name) => Ok(Operand::VarRef(name.clone())),
		TokenKind::Expr(content) => Ok(Operand::Expr(expr::parse(line, content)?)),
		TokenKind::Word(w) =>
		{
			match w.parse::<i64>()
			{
				Ok(n) => Ok(Operand::Literal(Value::Integer(n))),
				Err(_) => Err(ArityError::WrongOperandKind(line, "value").into()),
			}
		},
		TokenKind::Label(_) => Err(ArityError::WrongOperandKind(line, "value").into()),
	}
}

fn label_target_from_token(line: LineNumber, token: &Token) -> Result<String, LoadError>
{
	match &token.kind
	{
		TokenKind::Label(name) => Ok(name.clone()),
		_ => Err(ArityError::WrongOperandKind(line, "jmp").into()),
	}
}

fn build_instruction(line: LineNumber, tokens: &[Token]) -> Result<Instruction, LoadError>
{
	let opcode = match &tokens[0].kind
	{
		TokenKind::Word(w) => w.clone(),
		_ => return Err(SyntaxError::UnknownOpcode(line, "?".to_string()).into()),
	};

	let operands = &tokens[1..];

	match opcode.as_str()
	{
		"set" =>
		{
			if operands.len() < 2 { return Err(ArityError::MissingOperand(line, "set").into()); }
			if operands.len() > 2 { return Err(ArityError::TooManyOperands(line, "set").into()); }

			let dest = match &operands[0].kind
			{
				TokenKind::VarOrExpr(name) => name.clone(),
				_ => return Err(ArityError::WrongOperandKind(line, "set").into()),
			};

			let value = operand_from_token(line, &operands[1])?;
			Ok(Instruction::Set { line, dest, value })
		},

		"say" =>
		{
			if operands.is_empty() { return Err(ArityError::MissingOperand(line, "say").into()); }
			if operands.len() > 3 { return Err(ArityError::TooManyOperands(line, "say").into()); }

			let value = operand_from_token(line, &operands[0])?;
			let nl_qty = if operands.len() > 1 { operand_from_token(line, &operands[1])? } else { Operand::default_one() };
			let condition = if operands.len() > 2 { operand_from_token(line, &operands[2])? } else { Operand::default_one() };

			Ok(Instruction::Say { line, value, nl_qty, condition })
		},

		"ask" =>
		{
			if operands.is_empty() { return Err(ArityError::MissingOperand(line, "ask").into()); }
			if operands.len() > 2 { return Err(ArityError::TooManyOperands(line, "ask").into()); }

			let n = operand_from_token(line, &operands[0])?;

			if let Operand::Literal(Value::Integer(0)) = n
			{
				return Err(ArityError::AskRequestsZeroOptions(line).into());
			}

			let condition = if operands.len() > 1 { operand_from_token(line, &operands[1])? } else { Operand::default_one() };

			Ok(Instruction::Ask { line, n, condition })
		},

		"jmp" =>
		{
			if operands.is_empty() { return Err(ArityError::MissingOperand(line, "jmp").into()); }
			if operands.len() > 2 { return Err(ArityError::TooManyOperands(line, "jmp").into()); }

			let target = label_target_from_token(line, &operands[0])?;
			let condition = if operands.len() > 1 { operand_from_token(line, &operands[1])? } else { Operand::default_one() };

			Ok(Instruction::Jmp { line, target, condition })
		},

		"halt" =>
		{
			if operands.len() > 1 { return Err(ArityError::TooManyOperands(line, "halt").into()); }

			let condition = if !operands.is_empty() { operand_from_token(line, &operands[0])? } else { Operand::default_one() };

			Ok(Instruction::Halt { line, condition })
		},

		other => Err(SyntaxError::UnknownOpcode(line, other.to_string()).into()),
	}
}

pub fn load(src: &str) -> Result<Program, Vec<(LineNumber, LoadError)>>
{
	let mut errors: Vec<(LineNumber, LoadError)> = Vec::new();
	let mut classified: Vec<(LineNumber, Classified)> = Vec::new();

	for (idx, text) in src.lines().enumerate()
	{
		let line_no = LineNumber(idx + 1);
		match classify(line_no, text)
		{
			Ok(c) => classified.push((line_no, c)),
			Err(e) => errors.push((line_no, e)),
		}
	}

	// pass 2: label table, counting only lines that will become instructions.
	let mut labels = std::collections::HashMap::new();
	let mut next_index = 0usize;

	for (line_no, c) in &classified
	{
		match c
		{
			Classified::Blank => {},
			Classified::Label(name) =>
			{
				if labels.insert(name.clone(), next_index).is_some()
				{
					errors.push((*line_no, LabelError::Duplicate(*line_no, name.clone()).into()));
				}
			},
			Classified::Instruction(_) => next_index += 1,
		}
	}

	// pass 3: build and type-check each instruction.
	let mut instructions = Vec::new();

	for (line_no, c) in &classified
	{
		if let Classified::Instruction(tokens) = c
		{
			match build_instruction(*line_no, tokens)
			{
				Ok(instr) => instructions.push(instr),
				Err(e) => errors.push((*line_no, e)),
			}
		}
	}

	// label resolution: every jmp target must exist.
	for instr in &instructions
	{
		if let Instruction::Jmp { line, target, .. } = instr
		{
			if !labels.contains_key(target)
			{
				errors.push((*line, LabelError::Undefined(*line, target.clone()).into()));
			}
		}
	}

	if !errors.is_empty()
	{
		return Err(errors);
	}

	Ok(Program { instructions, labels })
}

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn loads_a_minimal_program()
	{
		let program = load("say #hi#\nhalt\n").unwrap();
		assert_eq!(program.len(), 2);
	}

	#[test]
	fn labels_bind_the_next_instruction_index()
	{
		let program = load(":start:\nsay #a#\njmp :start:\n").unwrap();
		assert_eq!(program.labels["start"], 0);
	}

	#[test]
	fn duplicate_labels_are_rejected()
	{
		let errors = load(":x:\nsay #a#\n:x:\nsay #b#\n").unwrap_err();
		assert!(errors.iter().any(|(_, e)| matches!(e, LoadError::Label(LabelError::Duplicate(_, _)))));
	}

	#[test]
	fn jmp_to_undefined_label_is_rejected()
	{
		let errors = load("jmp :nowhere:\n").unwrap_err();
		assert!(errors.iter().any(|(_, e)| matches!(e, LoadError::Label(LabelError::Undefined(_, _)))));
	}

	#[test]
	fn say_fills_in_default_operands()
	{
		let program = load("say #hi#\n").unwrap();
		match &program.instructions[0]
		{
			Instruction::Say { nl_qty, condition, .. } =>
			{
				assert_eq!(*nl_qty, Operand::default_one());
				assert_eq!(*condition, Operand::default_one());
			},
			_ => panic!("expected a say instruction"),
		}
	}

	#[test]
	fn ask_with_zero_options_is_rejected_at_load_time()
	{
		let errors = load("ask 0\n").unwrap_err();
		assert!(errors.iter().any(|(_, e)| matches!(e, LoadError::Arity(ArityError::AskRequestsZeroOptions(_)))));
	}

	#[test]
	fn errors_accumulate_across_the_whole_file()
	{
		let errors = load("bogus\njmp :nowhere:\n").unwrap_err();
		assert_eq!(errors.len(), 2);
	}

	#[test]
	fn set_value_may_be_a_parenthesized_expression()
	{
		let program = load("set *x* (1+2)\n").unwrap();
		match &program.instructions[0]
		{
			Instruction::Set { value: Operand::Expr(_), .. } => {},
			_ => panic!("expected an expr operand"),
		}
	}
}
