// Multi-pass minifier. Operates on the same `Program` the parser produces,
// not on raw text, so every pass reasons about instructions and operands
// directly instead of re-deriving structure from source. The three always-on
// passes (comment removal, default-operand elision, whitespace normalization)
// are mandatory because the minifier's own output has to be valid, reparseable
// source; the rest are opt-in rewrites that may change size but never the
// observable trace.
//
// Default elision and whitespace normalization aren't separate AST passes at
// all: `crate::printer::print_program` already emits one instruction per
// line, single-space separated, with trailing default operands omitted. That
// is the "serialize" step at the end of the pipeline below.

mod passes;

use crate::ast::Program;
use crate::error::MinifyError;
use crate::parser;
use crate::printer;

// Bounded fixpoint: every pass is idempotent on its own, so the loop below
// exists only to let passes that expose new opportunities for each other
// (constant folding exposing a dead store, a dead store removing the last use
// of a pooled string) settle. A real regression in some pass's idempotence
// would otherwise spin forever; this bound turns that into a logged no-op
// instead of a hang.
const MAX_FIXPOINT_ITERATIONS: usize = 8;

#[derive(Debug, Clone)]
pub struct MinifierConfig
{
	pub name_shrinking: bool,
	pub constant_folding: bool,
	pub string_pooling: bool,
	pub string_pool_threshold: usize,
	pub dead_store_elimination: bool,
	pub unreachable_code_elimination: bool,
}

impl Default for MinifierConfig
{
	fn default() -> Self
	{
		MinifierConfig
		{
			name_shrinking: true,
			constant_folding: true,
			string_pooling: true,
			string_pool_threshold: 2,
			dead_store_elimination: true,
			unreachable_code_elimination: true,
		}
	}
}

// Runs the selected opt-in passes to a fixpoint. Order follows the
// dependencies called out by the language spec: constant folding before
// dead-store elimination (folding can turn a variable read into a literal,
// exposing the store that fed it as dead), dead-store elimination before
// string pooling (an about-to-be-deleted store shouldn't be the one that
// gets pool-ified), and name shrinking last of all so freshly introduced pool
// variables get minimal names too.
fn run_pipeline(program: &mut Program, config: &MinifierConfig)
{
	passes::comment_removal(program);

	for i in 0..MAX_FIXPOINT_ITERATIONS
	{
		let mut changed = false;

		if config.constant_folding { changed |= passes::constant_folding(program); }
		if config.dead_store_elimination { changed |= passes::dead_store_elimination(program); }
		if config.string_pooling { changed |= passes::string_pooling(program, config.string_pool_threshold); }
		if config.unreachable_code_elimination { changed |= passes::unreachable_code_elimination(program); }
		changed |= passes::comment_removal(program);

		if !changed
		{
			log::debug!("minifier pipeline reached a fixpoint after {} iteration(s)", i + 1);
			break;
		}

		if i == MAX_FIXPOINT_ITERATIONS - 1
		{
			log::warn!("minifier pipeline did not reach a fixpoint within {} iterations", MAX_FIXPOINT_ITERATIONS);
		}
	}

	if config.name_shrinking
	{
		passes::name_shrinking(program);
	}
}

// The three entry points named in the crate's scope are `load`, `Interpreter`
// and `minify`; this is the third. Loads `src`, rewrites it under `config`,
// re-serializes, and verifies the result still parses before handing it back.
pub fn minify(src: &str, config: MinifierConfig) -> Result<String, MinifyError>
{
	let mut program = parser::load(src).map_err(MinifyError::SourceInvalid)?;

	run_pipeline(&mut program, &config);

	let rewritten = printer::print_program(&program);

	match parser::load(&rewritten)
	{
		Ok(_) => Ok(rewritten),
		Err(errs) => Err(MinifyError::RewriteUnparseable(errs)),
	}
}

#[cfg(test)]
mod tests
{
	use super::*;
	use crate::interpreter::{Interpreter, InterpreterConfig};
	use std::io::Cursor;

	fn run(src: &str, input: &str) -> String
	{
		let program = parser::load(src).unwrap();
		let mut interp = Interpreter::new(&program, InterpreterConfig { seed: Some(7) });
		let mut out = Vec::new();
		interp.run(Cursor::new(input.as_bytes()), &mut out).unwrap();
		String::from_utf8(out).unwrap()
	}

	#[test]
	fn minify_rejects_invalid_source()
	{
		let err = minify("bogus\n", MinifierConfig::default()).unwrap_err();
		assert!(matches!(err, MinifyError::SourceInvalid(_)));
	}

	#[test]
	fn minify_shrinks_default_config_output()
	{
		let src = "set *score* 0\n:loop:\nsay *score* 1 1\nset *score* ((*score*)+1)\njmp :loop: ((*score*)<3)\nhalt 1\n";
		let minified = minify(src, MinifierConfig::default()).unwrap();
		assert!(minified.len() < src.len());
	}

	#[test]
	fn minify_preserves_output_for_every_opt_in_pass_combination()
	{
		let src = "set *i* 0\n\
			:loop:\n\
			say #count:# 0 1\n\
			say *i* 1 1\n\
			set *i* ((*i*)+1)\n\
			jmp :loop: ((*i*)<3)\n\
			say #count:# 0 1\n\
			say #done# 1 1\n\
			halt 1\n";

		let baseline = run(src, "");

		let configs = [
			MinifierConfig { name_shrinking: false, constant_folding: false, string_pooling: false, dead_store_elimination: false, unreachable_code_elimination: false, ..MinifierConfig::default() },
			MinifierConfig::default(),
			MinifierConfig { string_pooling: false, ..MinifierConfig::default() },
			MinifierConfig { name_shrinking: false, ..MinifierConfig::default() },
		];

		for config in configs
		{
			let minified = minify(src, config).unwrap();
			assert_eq!(run(&minified, ""), baseline);
		}
	}

	#[test]
	fn minify_preserves_ask_dispatch_behavior()
	{
		let src = "say #a?# 1 1\nask 2\njmp :a:\njmp :b:\n:a:\nsay #A# 1 1\nhalt\n:b:\nsay #B# 1 1\nhalt\n";

		for input in ["1\n", "2\n", "9\n"]
		{
			let baseline = run(src, input);
			let minified = minify(src, MinifierConfig::default()).unwrap();
			assert_eq!(run(&minified, input), baseline);
		}
	}

	#[test]
	fn minify_is_idempotent_on_its_own_output()
	{
		let src = "set *x* (1+2)\nsay *x* 1 1\nsay #repeat# 1 1\nsay #repeat# 1 1\nsay #repeat# 1 1\nhalt\n";
		let once = minify(src, MinifierConfig::default()).unwrap();
		let twice = minify(&once, MinifierConfig::default()).unwrap();
		assert_eq!(once, twice);
	}
}
