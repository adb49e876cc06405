// A thin demo driver, in the spirit of the library's own smoke tests: it
// exercises `load`, `Interpreter::run` and `minify` against one embedded
// program. It does not parse arguments, read files, or pretty-print
// diagnostics - those are the job of the external CLI this crate is a library
// for (see the crate's design notes on scope).

use std::io::{self, Cursor};

use whitvm::{load, minify, Interpreter, InterpreterConfig, MinifierConfig};

const DEMO_SOURCE: &str = "
	set *i* 0
	:loop:
	say *i* 1 1
	set *i* ((*i*)+1)
	jmp :loop: ((*i*)<3)
	say #done# 1 1
	halt
";

fn main()
{
	let program = match load(DEMO_SOURCE)
	{
		Ok(program) => program,
		Err(errors) =>
		{
			for (line, err) in &errors { eprintln!("{} {}", line, err); }
			std::process::exit(2);
		},
	};

	println!("-- running --");
	let mut interpreter = Interpreter::new(&program, InterpreterConfig::default());
	if let Err(err) = interpreter.run(Cursor::new(&b""[..]), io::stdout())
	{
		eprintln!("{}", err);
		std::process::exit(1);
	}

	println!("-- minifying --");
	match minify(DEMO_SOURCE, MinifierConfig::default())
	{
		Ok(rewritten) =>
		{
			println!("{}", rewritten);
			println!("{} bytes -> {} bytes", DEMO_SOURCE.len(), rewritten.len());
		},
		Err(err) => eprintln!("{}", err),
	}
}
