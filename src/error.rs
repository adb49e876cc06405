use std::error::Error;
use std::fmt;

use crate::location::LineNumber;

// Errors raised while tokenizing and structurally parsing a line, before any
// label or operand-kind checking has happened.
#[derive(Debug)]
pub enum SyntaxError
{
	UnclosedString(LineNumber, String),
	UnclosedVarOrExpr(LineNumber, String),
	UnclosedLabel(LineNumber, String),
	UnbalancedExpr(LineNumber, String),
	UnknownOpcode(LineNumber, String),
	MalformedExpr(LineNumber, String),
	EmptyLabel(LineNumber),
}

impl fmt::Display for SyntaxError
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		match self
		{
			SyntaxError::UnclosedString(line, text) => write!(f, "{} unclosed '#' string literal starting '#{}'", line, text),
			SyntaxError::UnclosedVarOrExpr(line, text) => write!(f, "{} unclosed '*' variable reference starting '*{}'", line, text),
			SyntaxError::UnclosedLabel(line, text) => write!(f, "{} unclosed ':' label starting ':{}'", line, text),
			SyntaxError::UnbalancedExpr(line, text) => write!(f, "{} unbalanced '(' in expression '({}'", line, text),
			SyntaxError::UnknownOpcode(line, op) => write!(f, "{} unknown opcode '{}'", line, op),
			SyntaxError::MalformedExpr(line, expr) => write!(f, "{} malformed expression '{}'", line, expr),
			SyntaxError::EmptyLabel(line) => write!(f, "{} empty label name", line),
		}
	}
}

impl Error for SyntaxError {}

// Errors raised while building and resolving the label table.
#[derive(Debug)]
pub enum LabelError
{
	Duplicate(LineNumber, String),
	Undefined(LineNumber, String),
}

impl fmt::Display for LabelError
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		match self
		{
			LabelError::Duplicate(line, name) => write!(f, "{} label '{}' declared more than once", line, name),
			LabelError::Undefined(line, name) => write!(f, "{} jmp targets undefined label '{}'", line, name),
		}
	}
}

impl Error for LabelError {}

// Errors raised while checking an instruction's operand count and operand kinds.
#[derive(Debug)]
pub enum ArityError
{
	MissingOperand(LineNumber, &'static str),
	TooManyOperands(LineNumber, &'static str),
	WrongOperandKind(LineNumber, &'static str),
	AskRequestsZeroOptions(LineNumber),
}

impl fmt::Display for ArityError
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		match self
		{
			ArityError::MissingOperand(line, opcode) => write!(f, "{} '{}' is missing a required operand", line, opcode),
			ArityError::TooManyOperands(line, opcode) => write!(f, "{} '{}' has too many operands", line, opcode),
			ArityError::WrongOperandKind(line, opcode) => write!(f, "{} '{}' operand has the wrong kind", line, opcode),
			ArityError::AskRequestsZeroOptions(line) => write!(f, "{} 'ask' requires at least one option (n >= 1)", line),
		}
	}
}

impl Error for ArityError {}

// Everything that can fail while turning source text into a `Program`.
#[derive(Debug)]
pub enum LoadError
{
	Syntax(SyntaxError),
	Label(LabelError),
	Arity(ArityError),
}

impl From<SyntaxError> for LoadError
{
	fn from(e: SyntaxError) -> Self { LoadError::Syntax(e) }
}

impl From<LabelError> for LoadError
{
	fn from(e: LabelError) -> Self { LoadError::Label(e) }
}

impl From<ArityError> for LoadError
{
	fn from(e: ArityError) -> Self { LoadError::Arity(e) }
}

impl fmt::Display for LoadError
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		match self
		{
			LoadError::Syntax(e) => write!(f, "{}", e),
			LoadError::Label(e) => write!(f, "{}", e),
			LoadError::Arity(e) => write!(f, "{}", e),
		}
	}
}

impl Error for LoadError {}

// Everything that can fail while running a loaded `Program`. Every variant is fatal:
// WhitVM has no exception handling, so the interpreter always stops on the first one.
#[derive(Debug)]
pub enum RuntimeError
{
	UndefinedVar(LineNumber, String),
	TypeError(LineNumber, String),
	DivisionByZero(LineNumber),
	InputError(LineNumber),
	RangeError(LineNumber, String),
	Io(LineNumber, String),
}

impl fmt::Display for RuntimeError
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		match self
		{
			RuntimeError::UndefinedVar(line, name) => write!(f, "{} variable '{}' is not set", line, name),
			RuntimeError::TypeError(line, msg) => write!(f, "{} type error: {}", line, msg),
			RuntimeError::DivisionByZero(line) => write!(f, "{} division by zero", line),
			RuntimeError::InputError(line) => write!(f, "{} expected a numeric option from input", line),
			RuntimeError::RangeError(line, msg) => write!(f, "{} range error: {}", line, msg),
			RuntimeError::Io(line, msg) => write!(f, "{} i/o error: {}", line, msg),
		}
	}
}

impl Error for RuntimeError {}

// Everything that can fail while minifying source text.
#[derive(Debug)]
pub enum MinifyError
{
	SourceInvalid(Vec<(LineNumber, LoadError)>),
	RewriteUnparseable(Vec<(LineNumber, LoadError)>),
}

impl fmt::Display for MinifyError
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		match self
		{
			MinifyError::SourceInvalid(errs) => write!(f, "source does not load ({} error(s))", errs.len()),
			MinifyError::RewriteUnparseable(errs) => write!(f, "minified rewrite failed to reparse ({} error(s)) - this is a minifier bug", errs.len()),
		}
	}
}

impl Error for MinifyError {}
