use std::collections::HashMap;

use crate::expr::ExprNode;
use crate::location::LineNumber;
use crate::value::Value;

// `jmp`'s target is a label name, but it's carried on `Instruction::Jmp`
// directly as a `String` rather than through this enum: a label reference is
// only ever valid in that one syntactic position, never as a general
// value-producing operand, so there is no `Operand::LabelRef` variant here
// to begin with.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand
{
	Literal(Value),
	VarRef(String),
	Expr(ExprNode),
}

impl Operand
{
	pub fn default_one() -> Operand
	{
		Operand::Literal(Value::Integer(1))
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction
{
	Set { line: LineNumber, dest: String, value: Operand },
	Say { line: LineNumber, value: Operand, nl_qty: Operand, condition: Operand },
	Ask { line: LineNumber, n: Operand, condition: Operand },
	Jmp { line: LineNumber, target: String, condition: Operand },
	Halt { line: LineNumber, condition: Operand },
}

impl Instruction
{
	pub fn line(&self) -> LineNumber
	{
		match self
		{
			Instruction::Set { line, .. } => *line,
			Instruction::Say { line, .. } => *line,
			Instruction::Ask { line, .. } => *line,
			Instruction::Jmp { line, .. } => *line,
			Instruction::Halt { line, .. } => *line,
		}
	}

	pub fn opcode_name(&self) -> &'static str
	{
		match self
		{
			Instruction::Set { .. } => "set",
			Instruction::Say { .. } => "say",
			Instruction::Ask { .. } => "ask",
			Instruction::Jmp { .. } => "jmp",
			Instruction::Halt { .. } => "halt",
		}
	}

	// True when this instruction's condition, if taken, is guaranteed true and
	// it always diverts control flow away from the following instruction.
	pub fn is_unconditional_transfer(&self) -> bool
	{
		match self
		{
			Instruction::Jmp { condition, .. } | Instruction::Halt { condition, .. } =>
				matches!(condition, Operand::Literal(Value::Integer(1))),
			_ => false,
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct Program
{
	pub instructions: Vec<Instruction>,
	pub labels: HashMap<String, usize>,
}

impl Program
{
	pub fn len(&self) -> usize
	{
		self.instructions.len()
	}

	pub fn is_empty(&self) -> bool
	{
		self.instructions.is_empty()
	}
}
