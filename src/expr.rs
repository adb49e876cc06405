// Parenthesized expressions: tokenizing, parsing and evaluating.
//
// The line tokenizer (see `lexer.rs`) hands us the raw text between a matched
// pair of `(` `)` with the outermost parens already stripped. Everything in
// here is a second, smaller grammar that operates purely on that substring.

use std::collections::HashMap;
use std::fmt;

use rand::Rng;
use rand::rngs::StdRng;

use crate::error::{RuntimeError, SyntaxError};
use crate::location::LineNumber;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp
{
	Mul,
	Div,
	Mod,
	Add,
	Sub,
	Eq,
	Ne,
	Lt,
	Gt,
	Le,
	Ge,
}

impl BinOp
{
	fn symbol(self) -> &'static str
	{
		match self
		{
			BinOp::Mul => "*",
			BinOp::Div => "/",
			BinOp::Mod => "%",
			BinOp::Add => "+",
			BinOp::Sub => "-",
			BinOp::Eq => "==",
			BinOp::Ne => "!=",
			BinOp::Lt => "<",
			BinOp::Gt => ">",
			BinOp::Le => "<=",
			BinOp::Ge => ">=",
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprNode
{
	IntLiteral(i64),
	StrLiteral(String),
	Var(String),
	Rng(Box<ExprNode>, Box<ExprNode>),
	BinOp(BinOp, Box<ExprNode>, Box<ExprNode>),
}

// True when a tree can be evaluated with no variable store and no rng at all,
// i.e. it always produces the same value no matter when or where it runs.
pub fn is_foldable(node: &ExprNode) -> bool
{
	match node
	{
		ExprNode::IntLiteral(_) | ExprNode::StrLiteral(_) => true,
		ExprNode::Var(_) => false,
		ExprNode::Rng(_, _) => false,
		ExprNode::BinOp(_, lhs, rhs) => is_foldable(lhs) && is_foldable(rhs),
	}
}

pub fn collect_vars(node: &ExprNode, out: &mut std::collections::HashSet<String>)
{
	match node
	{
		ExprNode::IntLiteral(_) | ExprNode::StrLiteral(_) => {},
		ExprNode::Var(name) => { out.insert(name.clone()); },
		ExprNode::Rng(lo, hi) =>
		{
			collect_vars(lo, out);
			collect_vars(hi, out);
		},
		ExprNode::BinOp(_, lhs, rhs) =>
		{
			collect_vars(lhs, out);
			collect_vars(rhs, out);
		},
	}
}

// --- tokenizing -----------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum ExprToken
{
	Int(i64),
	Str(String),
	Var(String),
	Ident(String),
	Op(BinOp),
	LParen,
	RParen,
}

fn is_ident_start(c: char) -> bool
{
	c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool
{
	c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(line: LineNumber, content: &str) -> Result<Vec<ExprToken>, SyntaxError>
{
	let chars: Vec<char> = content.chars().collect();
	let mut i = 0usize;
	let mut tokens = Vec::new();

	while i < chars.len()
	{
		let c = chars[i];

		if c.is_whitespace()
		{
			i += 1;
			continue;
		}

		if c == '('
		{
			tokens.push(ExprToken::LParen);
			i += 1;
			continue;
		}

		if c == ')'
		{
			tokens.push(ExprToken::RParen);
			i += 1;
			continue;
		}

		if c == '#'
		{
			let start = i + 1;
			let mut j = start;
			while j < chars.len() && chars[j] != '#' { j += 1; }
			if j >= chars.len() { return Err(SyntaxError::MalformedExpr(line, content.to_string())); }
			tokens.push(ExprToken::Str(chars[start..j].iter().collect()));
			i = j + 1;
			continue;
		}

		if c == '*'
		{
			let next = chars.get(i + 1).copied();
			if next.map(is_ident_start).unwrap_or(false)
			{
				let start = i + 1;
				let mut j = start;
				while j < chars.len() && is_ident_continue(chars[j]) { j += 1; }
				if j >= chars.len() || chars[j] != '*'
				{
					return Err(SyntaxError::MalformedExpr(line, content.to_string()));
				}
				tokens.push(ExprToken::Var(chars[start..j].iter().collect()));
				i = j + 1;
				continue;
			}
			else
			{
				tokens.push(ExprToken::Op(BinOp::Mul));
				i += 1;
				continue;
			}
		}

		if c.is_ascii_digit()
		{
			let start = i;
			let mut j = start;
			while j < chars.len() && chars[j].is_ascii_digit() { j += 1; }
			let digits: String = chars[start..j].iter().collect();
			let n: i64 = digits.parse().map_err(|_| SyntaxError::MalformedExpr(line, content.to_string()))?;
			tokens.push(ExprToken::Int(n));
			i = j;
			continue;
		}

		if is_ident_start(c)
		{
			let start = i;
			let mut j = start;
			while j < chars.len() && is_ident_continue(chars[j]) { j += 1; }
			let word: String = chars[start..j].iter().collect();
			tokens.push(ExprToken::Ident(word));
			i = j;
			continue;
		}

		// two-character operators before their one-character prefixes
		let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
		match two.as_str()
		{
			"==" => { tokens.push(ExprToken::Op(BinOp::Eq)); i += 2; continue; },
			"!=" => { tokens.push(ExprToken::Op(BinOp::Ne)); i += 2; continue; },
			"<=" => { tokens.push(ExprToken::Op(BinOp::Le)); i += 2; continue; },
			">=" => { tokens.push(ExprToken::Op(BinOp::Ge)); i += 2; continue; },
			_ => {},
		}

		let op = match c
		{
			'/' => Some(BinOp::Div),
			'%' => Some(BinOp::Mod),
			'+' => Some(BinOp::Add),
			'-' => Some(BinOp::Sub),
			'<' => Some(BinOp::Lt),
			'>' => Some(BinOp::Gt),
			_ => None,
		};

		match op
		{
			Some(o) => { tokens.push(ExprToken::Op(o)); i += 1; },
			None => return Err(SyntaxError::MalformedExpr(line, content.to_string())),
		}
	}

	Ok(tokens)
}

// --- recursive-descent parsing ---------------------------------------------

struct TokenCursor<'a>
{
	tokens: &'a [ExprToken],
	pos: usize,
}

impl<'a> TokenCursor<'a>
{
	fn peek(&self) -> Option<&ExprToken>
	{
		self.tokens.get(self.pos)
	}

	fn bump(&mut self) -> Option<&ExprToken>
	{
		let t = self.tokens.get(self.pos);
		if t.is_some() { self.pos += 1; }
		t
	}
}

fn malformed(line: LineNumber, content: &str) -> SyntaxError
{
	SyntaxError::MalformedExpr(line, content.to_string())
}

// relational has the lowest precedence, then additive, then multiplicative.
fn parse_relational(cur: &mut TokenCursor, line: LineNumber, content: &str) -> Result<ExprNode, SyntaxError>
{
	let mut lhs = parse_additive(cur, line, content)?;

	loop
	{
		let op = match cur.peek()
		{
			Some(ExprToken::Op(o @ BinOp::Eq)) | Some(ExprToken::Op(o @ BinOp::Ne))
			| Some(ExprToken::Op(o @ BinOp::Lt)) | Some(ExprToken::Op(o @ BinOp::Gt))
			| Some(ExprToken::Op(o @ BinOp::Le)) | Some(ExprToken::Op(o @ BinOp::Ge)) => *o,
			_ => break,
		};

		cur.bump();
		let rhs = parse_additive(cur, line, content)?;
		lhs = ExprNode::BinOp(op, Box::new(lhs), Box::new(rhs));
	}

	Ok(lhs)
}

fn parse_additive(cur: &mut TokenCursor, line: LineNumber, content: &str) -> Result<ExprNode, SyntaxError>
{
	let mut lhs = parse_multiplicative(cur, line, content)?;

	loop
	{
		let op = match cur.peek()
		{
			Some(ExprToken::Op(o @ BinOp::Add)) | Some(ExprToken::Op(o @ BinOp::Sub)) => *o,
			_ => break,
		};

		cur.bump();
		let rhs = parse_multiplicative(cur, line, content)?;
		lhs = ExprNode::BinOp(op, Box::new(lhs), Box::new(rhs));
	}

	Ok(lhs)
}

fn parse_multiplicative(cur: &mut TokenCursor, line: LineNumber, content: &str) -> Result<ExprNode, SyntaxError>
{
	let mut lhs = parse_atom(cur, line, content)?;

	loop
	{
		let op = match cur.peek()
		{
			Some(ExprToken::Op(o @ BinOp::Mul)) | Some(ExprToken::Op(o @ BinOp::Div)) | Some(ExprToken::Op(o @ BinOp::Mod)) => *o,
			_ => break,
		};

		cur.bump();
		let rhs = parse_atom(cur, line, content)?;
		lhs = ExprNode::BinOp(op, Box::new(lhs), Box::new(rhs));
	}

	Ok(lhs)
}

// rng takes exactly two atoms as arguments; a caller wanting a compound bound
// must parenthesize it, e.g. `rng (1+1) 6`.
fn parse_atom(cur: &mut TokenCursor, line: LineNumber, content: &str) -> Result<ExprNode, SyntaxError>
{
	match cur.bump()
	{
		Some(ExprToken::Int(n)) => Ok(ExprNode::IntLiteral(*n)),
		Some(ExprToken::Str(s)) => Ok(ExprNode::StrLiteral(s.clone())),
		Some(ExprToken::Var(name)) => Ok(ExprNode::Var(name.clone())),
		Some(ExprToken::LParen) =>
		{
			let inner = parse_relational(cur, line, content)?;
			match cur.bump()
			{
				Some(ExprToken::RParen) => Ok(inner),
				_ => Err(malformed(line, content)),
			}
		},
		Some(ExprToken::Ident(word)) if word == "rng" =>
		{
			let lo = parse_atom(cur, line, content)?;
			let hi = parse_atom(cur, line, content)?;
			Ok(ExprNode::Rng(Box::new(lo), Box::new(hi)))
		},
		_ => Err(malformed(line, content)),
	}
}

pub fn parse(line: LineNumber, content: &str) -> Result<ExprNode, SyntaxError>
{
	let tokens = tokenize(line, content)?;
	let mut cur = TokenCursor { tokens: &tokens, pos: 0 };
	let node = parse_relational(&mut cur, line, content)?;

	if cur.pos != tokens.len()
	{
		return Err(malformed(line, content));
	}

	Ok(node)
}

// --- evaluation -------------------------------------------------------------

fn arith_pair(line: LineNumber, op: BinOp, lhs: &Value, rhs: &Value) -> Result<(i64, i64), RuntimeError>
{
	let l = lhs.as_arith_integer().ok_or_else(|| RuntimeError::TypeError(line, format!("'{}' requires integer operands, got {}", op.symbol(), lhs.kind_name())))?;
	let r = rhs.as_arith_integer().ok_or_else(|| RuntimeError::TypeError(line, format!("'{}' requires integer operands, got {}", op.symbol(), rhs.kind_name())))?;
	Ok((l, r))
}

pub fn eval(node: &ExprNode, line: LineNumber, vars: &HashMap<String, Value>, rng: &mut StdRng) -> Result<Value, RuntimeError>
{
	match node
	{
		ExprNode::IntLiteral(n) => Ok(Value::Integer(*n)),
		ExprNode::StrLiteral(s) => Ok(Value::Text(s.clone())),
		ExprNode::Var(name) => vars.get(name).cloned().ok_or_else(|| RuntimeError::UndefinedVar(line, name.clone())),

		ExprNode::Rng(lo, hi) =>
		{
			let lo_v = eval(lo, line, vars, rng)?;
			let hi_v = eval(hi, line, vars, rng)?;
			let lo_i = lo_v.as_arith_integer().ok_or_else(|| RuntimeError::TypeError(line, "rng bounds must be integers".to_string()))?;
			let hi_i = hi_v.as_arith_integer().ok_or_else(|| RuntimeError::TypeError(line, "rng bounds must be integers".to_string()))?;

			if lo_i > hi_i
			{
				return Err(RuntimeError::RangeError(line, format!("rng {} {} has min greater than max", lo_i, hi_i)));
			}

			Ok(Value::Integer(rng.gen_range(lo_i..=hi_i)))
		},

		ExprNode::BinOp(op, lhs, rhs) =>
		{
			let l = eval(lhs, line, vars, rng)?;
			let r = eval(rhs, line, vars, rng)?;
			eval_binop(*op, line, &l, &r)
		},
	}
}

fn eval_binop(op: BinOp, line: LineNumber, l: &Value, r: &Value) -> Result<Value, RuntimeError>
{
	match op
	{
		BinOp::Mul =>
		{
			let (a, b) = arith_pair(line, op, l, r)?;
			Ok(Value::Integer(a * b))
		},
		BinOp::Div =>
		{
			let (a, b) = arith_pair(line, op, l, r)?;
			if b == 0 { return Err(RuntimeError::DivisionByZero(line)); }
			Ok(Value::Integer(a / b))
		},
		BinOp::Mod =>
		{
			let (a, b) = arith_pair(line, op, l, r)?;
			if b == 0 { return Err(RuntimeError::DivisionByZero(line)); }
			Ok(Value::Integer(a % b))
		},
		BinOp::Add =>
		{
			let (a, b) = arith_pair(line, op, l, r)?;
			Ok(Value::Integer(a + b))
		},
		BinOp::Sub =>
		{
			let (a, b) = arith_pair(line, op, l, r)?;
			Ok(Value::Integer(a - b))
		},

		// equality never coerces across kinds: a mismatched kind is simply unequal.
		BinOp::Eq => Ok(Value::Integer(if values_equal(l, r) { 1 } else { 0 })),
		BinOp::Ne => Ok(Value::Integer(if values_equal(l, r) { 0 } else { 1 })),

		BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => eval_ordering(op, line, l, r),
	}
}

fn values_equal(l: &Value, r: &Value) -> bool
{
	match (l, r)
	{
		(Value::Integer(a), Value::Integer(b)) => a == b,
		(Value::Text(a), Value::Text(b)) => a == b,
		_ => false,
	}
}

fn eval_ordering(op: BinOp, line: LineNumber, l: &Value, r: &Value) -> Result<Value, RuntimeError>
{
	let ordering = match (l, r)
	{
		(Value::Integer(a), Value::Integer(b)) => a.cmp(b),
		(Value::Text(a), Value::Text(b)) => a.cmp(b),
		_ => return Err(RuntimeError::TypeError(line, format!("'{}' cannot compare {} to {}", op.symbol(), l.kind_name(), r.kind_name()))),
	};

	let result = match op
	{
		BinOp::Lt => ordering == std::cmp::Ordering::Less,
		BinOp::Gt => ordering == std::cmp::Ordering::Greater,
		BinOp::Le => ordering != std::cmp::Ordering::Greater,
		BinOp::Ge => ordering != std::cmp::Ordering::Less,
		_ => unreachable!(),
	};

	Ok(Value::Integer(if result { 1 } else { 0 }))
}

impl fmt::Display for ExprNode
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		match self
		{
			ExprNode::IntLiteral(n) => write!(f, "{}", n),
			ExprNode::StrLiteral(s) => write!(f, "#{}#", s),
			ExprNode::Var(name) => write!(f, "*{}*", name),
			ExprNode::Rng(lo, hi) => write!(f, "rng {} {}", render_atom(lo), render_atom(hi)),
			ExprNode::BinOp(op, lhs, rhs) => write!(f, "{}{}{}", lhs, op.symbol(), rhs),
		}
	}
}

// rng's arguments print parenthesized whenever they aren't already a single atom,
// so the minifier's rewritten text parses back to the same tree.
fn render_atom(node: &ExprNode) -> String
{
	match node
	{
		ExprNode::IntLiteral(_) | ExprNode::StrLiteral(_) | ExprNode::Var(_) | ExprNode::Rng(_, _) => format!("{}", node),
		ExprNode::BinOp(_, _, _) => format!("({})", node),
	}
}

#[cfg(test)]
mod tests
{
	use super::*;
	use rand::SeedableRng;

	fn eval_str(s: &str) -> Value
	{
		let node = parse(LineNumber(1), s).expect("parse");
		let vars = HashMap::new();
		let mut rng = StdRng::seed_from_u64(0);
		eval(&node, LineNumber(1), &vars, &mut rng).expect("eval")
	}

	#[test]
	fn arithmetic_precedence()
	{
		assert_eq!(eval_str("1+2*3"), Value::Integer(7));
		assert_eq!(eval_str("(1+2)*3"), Value::Integer(9));
	}

	#[test]
	fn division_and_modulo()
	{
		assert_eq!(eval_str("7/2"), Value::Integer(3));
		assert_eq!(eval_str("7%2"), Value::Integer(1));
	}

	#[test]
	fn division_by_zero_is_fatal()
	{
		let node = parse(LineNumber(1), "1/0").unwrap();
		let vars = HashMap::new();
		let mut rng = StdRng::seed_from_u64(0);
		let err = eval(&node, LineNumber(1), &vars, &mut rng).unwrap_err();
		assert!(matches!(err, RuntimeError::DivisionByZero(_)));
	}

	#[test]
	fn var_ref_requires_adjacency_to_disambiguate_from_multiply()
	{
		let mut vars = HashMap::new();
		vars.insert("i".to_string(), Value::Integer(5));
		let node = parse(LineNumber(1), "(*i*)*2").unwrap();
		let mut rng = StdRng::seed_from_u64(0);
		assert_eq!(eval(&node, LineNumber(1), &vars, &mut rng).unwrap(), Value::Integer(10));
	}

	#[test]
	fn mixed_kind_equality_is_never_equal()
	{
		let node = parse(LineNumber(1), "#7#==7").unwrap();
		let vars = HashMap::new();
		let mut rng = StdRng::seed_from_u64(0);
		assert_eq!(eval(&node, LineNumber(1), &vars, &mut rng).unwrap(), Value::Integer(0));
	}

	#[test]
	fn mixed_kind_ordering_is_a_type_error()
	{
		let node = parse(LineNumber(1), "#a#<7").unwrap();
		let vars = HashMap::new();
		let mut rng = StdRng::seed_from_u64(0);
		assert!(matches!(eval(&node, LineNumber(1), &vars, &mut rng), Err(RuntimeError::TypeError(_, _))));
	}

	#[test]
	fn rng_bounds_checked_at_eval_time()
	{
		let node = parse(LineNumber(1), "rng 6 1").unwrap();
		let vars = HashMap::new();
		let mut rng = StdRng::seed_from_u64(0);
		assert!(matches!(eval(&node, LineNumber(1), &vars, &mut rng), Err(RuntimeError::RangeError(_, _))));
	}

	#[test]
	fn foldable_detects_vars_and_rng()
	{
		assert!(is_foldable(&parse(LineNumber(1), "1+2*3").unwrap()));
		assert!(!is_foldable(&parse(LineNumber(1), "*x*+1").unwrap()));
		assert!(!is_foldable(&parse(LineNumber(1), "rng 1 6").unwrap()));
	}
}
