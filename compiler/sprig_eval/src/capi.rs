//! C interface exported to loaded compile-time code.
//!
//! Compile-time procedures are transpiled to C, built into a dynamic
//! library, and loaded into the compiler process; the generated code
//! manipulates tokens and output exclusively through these functions. All
//! pointers are opaque on the C side (`SprigEnvironment*`, `SprigTokens*`,
//! ...) and are the same addresses the trampolines in [`crate::runtime`]
//! passed in, so every function here trusts its caller to hand back what it
//! was given and guards only against null.
//!
//! The argument/token accessors mirror [`crate::helpers`]; keep the two in
//! sync when extending either.

use std::ffi::{c_char, c_void, CStr};

use sprig_lexer::{Token, TokenKind, TokenRun};
use sprig_output::{add_string_output, GeneratorOutput, OutputModifiers};

use crate::environment::Environment;
use crate::evaluator::{evaluate_generate_recursive, EvaluatorContext};
use crate::helpers::{get_argument, find_close_paren_token_index, push_back_token_expression};
use crate::hooks::replace_and_evaluate_definition;

unsafe fn cstr_or_empty<'a>(pointer: *const c_char) -> &'a str {
    if pointer.is_null() {
        return "";
    }
    CStr::from_ptr(pointer).to_str().unwrap_or("")
}

/// Index of the `which`th argument of the invocation at `start`, or -1.
///
/// # Safety
/// `tokens` must be the `SprigTokens*` passed to the calling procedure.
#[no_mangle]
pub unsafe extern "C" fn sprig_get_argument(
    tokens: *const c_void,
    start: i32,
    which: i32,
) -> i32 {
    if tokens.is_null() || start < 0 || which < 0 {
        return -1;
    }
    let run = &*(tokens as *const TokenRun);
    let start = start as usize;
    if start >= run.len() || run[start].kind != TokenKind::OpenParen {
        return -1;
    }
    let end = find_close_paren_token_index(run, start);
    match get_argument(run, start, which as usize, end) {
        Some(index) => index as i32,
        None => -1,
    }
}

/// Borrow the token at `index`, or null when out of range.
///
/// # Safety
/// `tokens` must be the `SprigTokens*` passed to the calling procedure. The
/// returned pointer is valid until environment teardown.
#[no_mangle]
pub unsafe extern "C" fn sprig_token_at(tokens: *const c_void, index: i32) -> *const c_void {
    if tokens.is_null() || index < 0 {
        return std::ptr::null();
    }
    let run = &*(tokens as *const TokenRun);
    match run.get(index as usize) {
        Some(token) => token as *const Token as *const c_void,
        None => std::ptr::null(),
    }
}

/// Append a synthesized symbol token to a macro's expansion buffer.
///
/// # Safety
/// `expansion` must be the out-token buffer passed to the calling macro;
/// `blame` must be a token obtained from [`sprig_token_at`].
#[no_mangle]
pub unsafe extern "C" fn sprig_tokens_push_symbol(
    expansion: *mut c_void,
    contents: *const c_char,
    blame: *const c_void,
) {
    if expansion.is_null() || blame.is_null() {
        return;
    }
    let expansion = &mut *(expansion as *mut Vec<Token>);
    let blame = &*(blame as *const Token);
    expansion.push(Token::synthesized_symbol(cstr_or_empty(contents), blame));
}

/// Append an open paren to a macro's expansion buffer.
///
/// # Safety
/// Same contract as [`sprig_tokens_push_symbol`].
#[no_mangle]
pub unsafe extern "C" fn sprig_tokens_push_open(expansion: *mut c_void, blame: *const c_void) {
    if expansion.is_null() || blame.is_null() {
        return;
    }
    let expansion = &mut *(expansion as *mut Vec<Token>);
    let blame = &*(blame as *const Token);
    let mut token = Token::synthesized_symbol("", blame);
    token.kind = TokenKind::OpenParen;
    expansion.push(token);
}

/// Append a close paren to a macro's expansion buffer.
///
/// # Safety
/// Same contract as [`sprig_tokens_push_symbol`].
#[no_mangle]
pub unsafe extern "C" fn sprig_tokens_push_close(expansion: *mut c_void, blame: *const c_void) {
    if expansion.is_null() || blame.is_null() {
        return;
    }
    let expansion = &mut *(expansion as *mut Vec<Token>);
    let blame = &*(blame as *const Token);
    let mut token = Token::synthesized_symbol("", blame);
    token.kind = TokenKind::CloseParen;
    expansion.push(token);
}

/// Append a string literal token to a macro's expansion buffer.
///
/// # Safety
/// Same contract as [`sprig_tokens_push_symbol`].
#[no_mangle]
pub unsafe extern "C" fn sprig_tokens_push_string(
    expansion: *mut c_void,
    contents: *const c_char,
    blame: *const c_void,
) {
    if expansion.is_null() || blame.is_null() {
        return;
    }
    let expansion = &mut *(expansion as *mut Vec<Token>);
    let blame = &*(blame as *const Token);
    let mut token = Token::synthesized_symbol(cstr_or_empty(contents), blame);
    token.kind = TokenKind::String;
    expansion.push(token);
}

/// Append the whole expression starting at `index` of the invocation run to
/// a macro's expansion buffer (`tok-splice`).
///
/// # Safety
/// `tokens` must be the `SprigTokens*` passed to the calling macro.
#[no_mangle]
pub unsafe extern "C" fn sprig_tokens_push_expression(
    expansion: *mut c_void,
    tokens: *const c_void,
    index: i32,
) {
    if expansion.is_null() || tokens.is_null() || index < 0 {
        return;
    }
    let expansion = &mut *(expansion as *mut Vec<Token>);
    let run = &*(tokens as *const TokenRun);
    if (index as usize) < run.len() {
        push_back_token_expression(expansion, run, index as usize);
    }
}

/// Append literal text to a generator's source output.
///
/// # Safety
/// `output` must be the `SprigOutput*` passed to the calling generator;
/// `blame` must be a token obtained from [`sprig_token_at`].
#[no_mangle]
pub unsafe extern "C" fn sprig_add_string_output(
    output: *mut c_void,
    text: *const c_char,
    modifiers: u32,
    blame: *const c_void,
) {
    if output.is_null() || blame.is_null() {
        return;
    }
    let output = &mut *(output as *mut GeneratorOutput);
    let blame = &*(blame as *const Token);
    add_string_output(
        &mut output.source,
        cstr_or_empty(text),
        OutputModifiers::from_bits(modifiers),
        blame,
    );
}

/// Recursively evaluate the form at `start`, for generators that emit
/// sub-expressions. Returns the error count.
///
/// # Safety
/// All pointers must be the ones passed to the calling generator.
#[no_mangle]
pub unsafe extern "C" fn sprig_evaluate(
    environment: *mut c_void,
    context: *const c_void,
    tokens: *const c_void,
    start: i32,
    output: *mut c_void,
) -> i32 {
    if environment.is_null() || context.is_null() || tokens.is_null() || output.is_null() {
        return 1;
    }
    if start < 0 {
        return 1;
    }
    let environment = &mut *(environment as *mut Environment);
    let context = &*(context as *const EvaluatorContext);
    let run = &*(tokens as *const TokenRun);
    let output = &mut *(output as *mut GeneratorOutput);
    evaluate_generate_recursive(environment, context, run, start as usize, output) as i32
}

/// Emit an error blamed to `token`.
///
/// # Safety
/// `token` must be a token obtained from [`sprig_token_at`].
#[no_mangle]
pub unsafe extern "C" fn sprig_error(token: *const c_void, message: *const c_char) {
    if token.is_null() {
        return;
    }
    let token = &*(token as *const Token);
    sprig_diagnostic::emit_blamed_error(token, cstr_or_empty(message));
}

/// Append an argument to the mutable link command inside a `pre-link` hook.
///
/// # Safety
/// `link_command` must be the `SprigLinkCommand*` passed to the hook.
#[no_mangle]
pub unsafe extern "C" fn sprig_link_command_add(
    link_command: *mut c_void,
    argument: *const c_char,
) {
    if link_command.is_null() {
        return;
    }
    let link_command = &mut *(link_command as *mut Vec<String>);
    link_command.push(cstr_or_empty(argument).to_string());
}

/// Rewrite an existing definition from a freshly built token buffer. The
/// only sanctioned mutation path for hooks; see
/// [`replace_and_evaluate_definition`].
///
/// # Safety
/// `environment` must be the `SprigEnvironment*` passed to the hook;
/// `new_tokens` must be a token buffer built with the `sprig_tokens_push_*`
/// functions.
#[no_mangle]
pub unsafe extern "C" fn sprig_replace_and_evaluate_definition(
    environment: *mut c_void,
    name: *const c_char,
    new_tokens: *const c_void,
) -> bool {
    if environment.is_null() || new_tokens.is_null() {
        return false;
    }
    let environment = &mut *(environment as *mut Environment);
    let buffer = &*(new_tokens as *const Vec<Token>);
    let run = environment.add_comptime_run(buffer.clone());
    replace_and_evaluate_definition(environment, cstr_or_empty(name), &run)
}
