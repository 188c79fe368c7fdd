//! Device script compiler
//!
//! Scripts are line oriented. Each line holds one statement:
//!
//! ```text
//! # comment
//! println "booting"        print text with a trailing newline
//! print "x=\t1"            print text as-is
//! pin 2 high|low|toggle    drive a GPIO pin
//! wait 10                  sleep for a number of ticks
//! loop ... end             repeat forever
//! repeat 3 ... end         repeat a fixed number of times
//! import "lib/led.script"  inline another file
//! error "msg"              report a recoverable device error
//! abort "msg"              report a fatal device error
//! halt                     stop the program
//! ```
//!
//! Compilation does not stop at the first problem; every diagnostic found
//! is returned together. A debug build also records where every instruction
//! came from.

use sim_package::VirtualFileSet;
use tracing::debug;

use crate::error::{BuildError, Diagnostic};
use crate::program::{Op, PinAction, Program, SourceLocation, GPIO_PINS};
use crate::BuildOptions;

/// Lexical token on a script line
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Str(String),
}

/// Split a line into words and quoted strings, dropping comments
fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '#' {
            break;
        } else if c == '"' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    None => return Err("unterminated string".to_string()),
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some('"') => text.push('"'),
                        Some('\\') => text.push('\\'),
                        Some(other) => return Err(format!("unknown escape \\{}", other)),
                        None => return Err("unterminated string".to_string()),
                    },
                    Some(other) => text.push(other),
                }
            }
            tokens.push(Token::Str(text));
        } else {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '"' || c == '#' {
                    break;
                }
                word.push(c);
                chars.next();
            }
            tokens.push(Token::Word(word));
        }
    }
    Ok(tokens)
}

/// An open `loop`/`repeat` block
struct Block {
    start: usize,
    line: usize,
}

/// Compiles a file set into a [`Program`]
struct Compiler<'a> {
    files: &'a VirtualFileSet,
    ops: Vec<Op>,
    /// Filled only for debug builds
    locations: Vec<SourceLocation>,
    debug: bool,
    diagnostics: Vec<Diagnostic>,
    import_stack: Vec<String>,
}

impl<'a> Compiler<'a> {
    fn new(files: &'a VirtualFileSet, options: BuildOptions) -> Self {
        Self {
            files,
            ops: Vec::new(),
            locations: Vec::new(),
            debug: options.debug,
            diagnostics: Vec::new(),
            import_stack: Vec::new(),
        }
    }

    /// Attribute ops emitted since the last call to `file:line`
    fn record_location(&mut self, file: &str, line: usize) {
        if !self.debug {
            return;
        }
        // Imported ops already carry their own locations
        while self.locations.len() < self.ops.len() {
            self.locations.push(SourceLocation {
                file: file.to_string(),
                line,
            });
        }
    }

    fn error(&mut self, file: &str, line: usize, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(file, line, message));
    }

    /// Compile one file, inlining its imports
    fn compile_file(&mut self, path: &str, from: Option<(&str, usize)>) {
        let (report_file, report_line) = from.unwrap_or((path, 0));

        if self.import_stack.iter().any(|p| p == path) {
            let chain = format!("{} -> {}", self.import_stack.join(" -> "), path);
            self.error(report_file, report_line, format!("import cycle: {}", chain));
            return;
        }
        let files = self.files;
        let Some(bytes) = files.get(path) else {
            self.error(report_file, report_line, format!("file not found: {}", path));
            return;
        };
        let Ok(source) = std::str::from_utf8(bytes) else {
            self.error(path, 0, "file is not valid UTF-8");
            return;
        };

        debug!("Compiling {}", path);
        self.import_stack.push(path.to_string());
        let mut blocks: Vec<Block> = Vec::new();

        for (index, line) in source.lines().enumerate() {
            let line_no = index + 1;
            match tokenize(line) {
                Ok(tokens) if tokens.is_empty() => {}
                Ok(tokens) => {
                    self.statement(path, line_no, &tokens, &mut blocks);
                    self.record_location(path, line_no);
                }
                Err(message) => self.error(path, line_no, message),
            }
        }

        for block in blocks {
            self.error(path, block.line, "block is never closed with `end`");
        }
        self.import_stack.pop();
    }

    fn statement(&mut self, file: &str, line: usize, tokens: &[Token], blocks: &mut Vec<Block>) {
        let Token::Word(keyword) = &tokens[0] else {
            self.error(file, line, "expected a statement, found a string");
            return;
        };
        let args = &tokens[1..];

        match keyword.as_str() {
            "print" | "println" => {
                let Some(text) = self.string_arg(file, line, keyword, args) else {
                    return;
                };
                let text = if keyword == "println" {
                    format!("{}\n", text)
                } else {
                    text
                };
                self.ops.push(Op::Print(text));
            }
            "pin" => {
                let [Token::Word(pin), Token::Word(action)] = args else {
                    self.error(file, line, "usage: pin <0-31> high|low|toggle");
                    return;
                };
                let pin = match pin.parse::<u8>() {
                    Ok(pin) if pin < GPIO_PINS => pin,
                    _ => {
                        self.error(file, line, format!("invalid pin number: {}", pin));
                        return;
                    }
                };
                let action = match action.as_str() {
                    "high" => PinAction::High,
                    "low" => PinAction::Low,
                    "toggle" => PinAction::Toggle,
                    other => {
                        self.error(file, line, format!("invalid pin action: {}", other));
                        return;
                    }
                };
                self.ops.push(Op::Pin { pin, action });
            }
            "wait" => match self.count_arg(file, line, keyword, args) {
                Some(0) => self.error(file, line, "wait needs at least 1 tick"),
                Some(ticks) => self.ops.push(Op::Wait(ticks)),
                None => {}
            },
            "loop" => {
                if !args.is_empty() {
                    self.error(file, line, "loop takes no arguments");
                }
                blocks.push(Block {
                    start: self.ops.len(),
                    line,
                });
                self.ops.push(Op::LoopStart { count: None, end: 0 });
            }
            "repeat" => {
                // A bad count still opens the block so its `end` pairs up
                let count = self.count_arg(file, line, keyword, args).unwrap_or(0);
                blocks.push(Block {
                    start: self.ops.len(),
                    line,
                });
                self.ops.push(Op::LoopStart {
                    count: Some(count),
                    end: 0,
                });
            }
            "end" => {
                if !args.is_empty() {
                    self.error(file, line, "end takes no arguments");
                }
                let Some(block) = blocks.pop() else {
                    self.error(file, line, "`end` without a matching loop");
                    return;
                };
                let end = self.ops.len();
                if let Some(Op::LoopStart { end: slot, .. }) = self.ops.get_mut(block.start) {
                    *slot = end;
                }
                self.ops.push(Op::LoopEnd { start: block.start });
            }
            "import" => {
                let Some(target) = self.string_arg(file, line, keyword, args) else {
                    return;
                };
                self.compile_file(&target, Some((file, line)));
            }
            "error" | "abort" => {
                let Some(message) = self.string_arg(file, line, keyword, args) else {
                    return;
                };
                self.ops.push(if keyword == "error" {
                    Op::Error(message)
                } else {
                    Op::Abort(message)
                });
            }
            "halt" => {
                if !args.is_empty() {
                    self.error(file, line, "halt takes no arguments");
                }
                self.ops.push(Op::Halt);
            }
            other => self.error(file, line, format!("unknown statement: {}", other)),
        }
    }

    fn string_arg(
        &mut self,
        file: &str,
        line: usize,
        keyword: &str,
        args: &[Token],
    ) -> Option<String> {
        match args {
            [Token::Str(text)] => Some(text.clone()),
            _ => {
                self.error(file, line, format!("usage: {} \"text\"", keyword));
                None
            }
        }
    }

    fn count_arg(&mut self, file: &str, line: usize, keyword: &str, args: &[Token]) -> Option<u32> {
        match args {
            [Token::Word(word)] => match word.parse::<u32>() {
                Ok(n) => Some(n),
                Err(_) => {
                    self.error(file, line, format!("invalid count: {}", word));
                    None
                }
            },
            _ => {
                self.error(file, line, format!("usage: {} <count>", keyword));
                None
            }
        }
    }
}

/// Compile `entry` (and anything it imports) from a file set
pub fn compile(files: &VirtualFileSet, entry: &str, name: &str) -> Result<Program, BuildError> {
    compile_with(files, entry, name, BuildOptions::default())
}

/// Compile with explicit build options
pub fn compile_with(
    files: &VirtualFileSet,
    entry: &str,
    name: &str,
    options: BuildOptions,
) -> Result<Program, BuildError> {
    let mut compiler = Compiler::new(files, options);
    compiler.compile_file(entry, None);

    if compiler.diagnostics.is_empty() {
        Ok(Program {
            name: name.to_string(),
            ops: compiler.ops,
            locations: compiler.locations,
        })
    } else {
        Err(BuildError::new(compiler.diagnostics))
    }
}
