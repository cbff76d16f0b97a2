// ABOUTME: Configuration and constants for the Lisp interpreter

pub const VERSION: &str = "0.1.0";
pub const WELCOME_MESSAGE: &str = "nanlisp";
pub const WELCOME_SUBTITLE: &str = "A NaN-boxed Lisp runtime with tail-call optimization";

/// Sizing for the interpreter's single contiguous memory region (spec §3/§6.3):
/// `pool_cells` pairs live at the low end, addressed by cell index; the
/// remainder up to `total_cells` is the byte-addressable atom/string heap and
/// the downward-growing evaluation stack, shared out of the same buffer.
#[derive(Debug, Clone, Copy)]
pub struct MemoryConfig {
    pub pool_cells: usize,
    pub total_cells: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        // Half the pool for pairs, half the remaining space for heap/stack;
        // kept well under 2^20 cells so a default session starts in well
        // under a second even with zero prior GC experience.
        Self {
            pool_cells: 1 << 16,
            total_cells: 1 << 18,
        }
    }
}

pub const HELP_TEXT: &str = r#"
Available commands:
  (quit)               - Exit the REPL
  (help)               - Show this help message

Type any Lisp expression to evaluate it. Use Ctrl-D or (quit) to exit.
"#;

pub const BUILTINS_SUMMARY: &str = r#"
Built-in Functions:

Arithmetic:     + - * / % int
Comparison:     eq? < > <= >=
Logic:          not (and/or are special forms)
Pairs/Lists:    cons car cdr list length set-car! set-cdr!
Predicates:     type number? atom? string? cons? nil? closure? macro? primitive?
Strings:        string
Console I/O:    print println
Error:          throw error? error-code
Control forms:  if cond and or begin while let let* letrec letrec*
                lambda macro define setq catch eval apply curry

Type (help) for more information.
"#;
