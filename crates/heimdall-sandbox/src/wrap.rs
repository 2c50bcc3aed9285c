//! Source-level expression wrapper: gives bare expressions a return value.
//!
//! [`PyWorker`](crate::worker::PyWorker) applies [`maybe_wrap_last_expr`] to
//! submitted source before compiling it, so a call like `execute_python("1 +
//! 1")` can report `result = "2"` (spec.md §4.5 step 2) the same way a REPL
//! would, without requiring user code to assign to a named variable.

/// Heuristically wrap the last line of `code` as `__result__ = <last_line>`
/// if the last line looks like a bare value-producing expression rather than
/// a statement or a side-effecting call.
///
/// # Rules (in order of evaluation)
///
/// The last non-empty line is **left unchanged** when:
/// - The code is empty or all whitespace/blank lines.
/// - The last non-empty line is indented (inside a block).
/// - The last non-empty line starts with a statement keyword:
///   `def`, `class`, `if`, `elif`, `else`, `for`, `while`, `try`, `except`,
///   `finally`, `with`, `import`, `from`, `return`, `pass`, `break`,
///   `continue`, `raise`, `assert`, `del`, `global`, `nonlocal`, `yield`,
///   `async`, `await`, `match`, `case`, `@`.
/// - The last non-empty line contains a bare assignment `=` (not `==`, `!=`,
///   `<=`, `>=`, or compound assignments like `+=`, `-=`, etc.).
/// - The last non-empty line looks like a function/method call (the trimmed
///   line ends with `)` at balanced nesting depth).
///
/// Otherwise the line is wrapped as `__result__ = <line>`.
///
/// # Examples
/// ```
/// use heimdall_sandbox::wrap::maybe_wrap_last_expr;
/// assert_eq!(maybe_wrap_last_expr("1 + 1"), "__result__ = 1 + 1");
/// assert_eq!(maybe_wrap_last_expr("x = 1\nprint(x)"), "x = 1\nprint(x)");
/// assert_eq!(maybe_wrap_last_expr(""), "");
/// ```
pub fn maybe_wrap_last_expr(code: &str) -> String {
    const STATEMENT_PREFIXES: &[&str] = &[
        "def ",
        "class ",
        "if ",
        "elif ",
        "else:",
        "else :",
        "for ",
        "while ",
        "try:",
        "try :",
        "except",
        "finally:",
        "finally :",
        "with ",
        "import ",
        "from ",
        "return ",
        "return\n",
        "return\r",
        "pass",
        "break",
        "continue",
        "raise ",
        "raise\n",
        "raise\r",
        "assert ",
        "del ",
        "global ",
        "nonlocal ",
        "yield ",
        "yield\n",
        "yield\r",
        "async ",
        "await ",
        "match ",
        "case ",
        "@",
        "#",
    ];

    const BARE_KEYWORDS: &[&str] = &[
        "pass", "break", "continue", "return", "yield", "raise", "else:", "finally:", "try:",
    ];

    let lines: Vec<&str> = code.split('\n').collect();

    let last_idx = match lines
        .iter()
        .enumerate()
        .rev()
        .find(|(_, l)| !l.trim().is_empty())
        .map(|(i, _)| i)
    {
        Some(i) => i,
        None => return code.to_string(),
    };

    let original_last_line = lines[last_idx];
    let last_line = original_last_line.trim();

    let leading = original_last_line.len() - original_last_line.trim_start().len();
    if leading > 0 {
        return code.to_string();
    }

    for kw in BARE_KEYWORDS {
        if last_line == *kw {
            return code.to_string();
        }
    }

    for prefix in STATEMENT_PREFIXES {
        if last_line.starts_with(prefix) {
            return code.to_string();
        }
    }

    if looks_like_assignment(last_line) {
        return code.to_string();
    }

    if is_call_statement(last_line) {
        return code.to_string();
    }

    let formatted = format!("__result__ = {last_line}");
    let mut new_lines: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    new_lines[last_idx] = formatted;
    new_lines.join("\n")
}

/// Returns `true` if `line` looks like an assignment statement.
fn looks_like_assignment(line: &str) -> bool {
    let chars: Vec<char> = line.chars().collect();
    let n = chars.len();

    for i in 0..n {
        if chars[i] != '=' {
            continue;
        }
        if i + 1 < n && chars[i + 1] == '=' {
            continue;
        }
        if i > 0 {
            let prev = chars[i - 1];
            match prev {
                '!' | '<' | '>' | '=' => continue,
                '+' | '-' | '*' | '/' | '%' | '&' | '|' | '^' | '~' => return true,
                _ => return true,
            }
        } else {
            return true;
        }
    }
    false
}

/// Returns `true` if `line` is a top-level function/method call expression.
fn is_call_statement(line: &str) -> bool {
    if !line.ends_with(')') {
        return false;
    }

    let mut depth: i32 = 0;
    for ch in line.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
    }
    if depth != 0 {
        return false;
    }

    if line.starts_with('(') {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_bare_expression() {
        assert_eq!(maybe_wrap_last_expr("1 + 1"), "__result__ = 1 + 1");
    }

    #[test]
    fn test_no_wrap_assignment() {
        assert_eq!(maybe_wrap_last_expr("x = 1"), "x = 1");
    }

    #[test]
    fn test_wrap_multiline_last_expr() {
        let code = "x = 5\nx * 2";
        let result = maybe_wrap_last_expr(code);
        assert_eq!(result, "x = 5\n__result__ = x * 2");
    }

    #[test]
    fn test_no_wrap_call_print() {
        let code = "x = 1\nprint(x)";
        let result = maybe_wrap_last_expr(code);
        assert_eq!(result, "x = 1\nprint(x)");
    }

    #[test]
    fn test_no_wrap_empty() {
        assert_eq!(maybe_wrap_last_expr(""), "");
    }

    #[test]
    fn test_no_wrap_whitespace_only() {
        assert_eq!(maybe_wrap_last_expr("   \n   \n"), "   \n   \n");
    }

    #[test]
    fn test_no_wrap_def() {
        assert_eq!(maybe_wrap_last_expr("def f(): pass"), "def f(): pass");
    }

    #[test]
    fn test_no_wrap_class() {
        assert_eq!(maybe_wrap_last_expr("class Foo: pass"), "class Foo: pass");
    }

    #[test]
    fn test_no_wrap_if() {
        assert_eq!(maybe_wrap_last_expr("if True: pass"), "if True: pass");
    }

    #[test]
    fn test_no_wrap_for() {
        assert_eq!(maybe_wrap_last_expr("for x in []: pass"), "for x in []: pass");
    }

    #[test]
    fn test_no_wrap_while() {
        assert_eq!(maybe_wrap_last_expr("while False: pass"), "while False: pass");
    }

    #[test]
    fn test_no_wrap_try() {
        let code = "try:\n    pass\nexcept:\n    pass";
        assert_eq!(maybe_wrap_last_expr(code), code);
    }

    #[test]
    fn test_no_wrap_with() {
        let code = "with open('f') as f:\n    pass";
        assert_eq!(maybe_wrap_last_expr(code), code);
    }

    #[test]
    fn test_no_wrap_import() {
        assert_eq!(maybe_wrap_last_expr("import math"), "import math");
    }

    #[test]
    fn test_no_wrap_from() {
        assert_eq!(maybe_wrap_last_expr("from math import sqrt"), "from math import sqrt");
    }

    #[test]
    fn test_no_wrap_return() {
        assert_eq!(maybe_wrap_last_expr("return x"), "return x");
    }

    #[test]
    fn test_no_wrap_pass() {
        assert_eq!(maybe_wrap_last_expr("pass"), "pass");
    }

    #[test]
    fn test_no_wrap_break() {
        assert_eq!(maybe_wrap_last_expr("break"), "break");
    }

    #[test]
    fn test_no_wrap_continue() {
        assert_eq!(maybe_wrap_last_expr("continue"), "continue");
    }

    #[test]
    fn test_no_wrap_raise() {
        assert_eq!(
            maybe_wrap_last_expr("raise ValueError('x')"),
            "raise ValueError('x')"
        );
    }

    #[test]
    fn test_no_wrap_assert() {
        assert_eq!(maybe_wrap_last_expr("assert x == 1"), "assert x == 1");
    }

    #[test]
    fn test_no_wrap_del() {
        assert_eq!(maybe_wrap_last_expr("del x"), "del x");
    }

    #[test]
    fn test_no_wrap_global() {
        assert_eq!(maybe_wrap_last_expr("global x"), "global x");
    }

    #[test]
    fn test_no_wrap_nonlocal() {
        assert_eq!(maybe_wrap_last_expr("nonlocal x"), "nonlocal x");
    }

    #[test]
    fn test_no_wrap_yield() {
        assert_eq!(maybe_wrap_last_expr("yield x"), "yield x");
    }

    #[test]
    fn test_no_wrap_augmented_assignment() {
        assert_eq!(maybe_wrap_last_expr("x += 1"), "x += 1");
    }

    #[test]
    fn test_wrap_comparison_expr() {
        assert_eq!(maybe_wrap_last_expr("x == 1"), "__result__ = x == 1");
    }

    #[test]
    fn test_wrap_string_literal() {
        assert_eq!(maybe_wrap_last_expr("\"hello\""), "__result__ = \"hello\"");
    }

    #[test]
    fn test_wrap_variable_ref() {
        let code = "x = 42\nx";
        assert_eq!(maybe_wrap_last_expr(code), "x = 42\n__result__ = x");
    }
}
