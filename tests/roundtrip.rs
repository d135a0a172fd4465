//! Property tests for the reader and printer.

use proptest::prelude::*;
use schemer::ast::{Value, sym, val};
use schemer::scheme::{parse_program, parse_scheme, tokenize};
use schemer::Interpreter;

/// Symbols start with a letter so they never read back as numbers or booleans
fn symbol() -> impl Strategy<Value = Value> {
    "[a-z][a-z0-9!?*<>=-]{0,8}".prop_map(sym)
}

fn form() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<i64>().prop_map(Value::Integer),
        (-1e12f64..1e12f64).prop_map(Value::Float),
        prop_oneof![
            any::<f64>().prop_filter("finite", |x| x.is_finite()),
            Just(f64::INFINITY),
            Just(f64::NEG_INFINITY),
            Just(f64::NAN),
        ]
        .prop_map(Value::Float),
        any::<bool>().prop_map(Value::Bool),
        "[ -~\t\n]{0,20}".prop_map(val),
        symbol(),
    ];
    leaf.prop_recursive(4, 32, 6, |inner| {
        prop::collection::vec(inner, 0..6).prop_map(Value::list)
    })
}

proptest! {
    #[test]
    fn printed_forms_read_back(form in form()) {
        let printed = form.to_string();
        let reread = parse_scheme(&printed)
            .map_err(|e| TestCaseError::fail(format!("{printed}: {e}")))?;
        prop_assert!(reread.is_eqv(&form), "{printed} read back as {reread}");
        prop_assert_eq!(reread.to_string(), printed);
    }

    #[test]
    fn tokenizer_accepts_any_text(text in any::<String>()) {
        prop_assert!(tokenize(&text).is_ok());
        // The reader may reject it, but must not panic
        let _ = parse_program(&text);
    }

    #[test]
    fn string_literals_survive_reading(text in "[ -!#-\\[\\]-~]{0,40}") {
        // No quotes or backslashes, so the literal needs no escaping
        let program = format!("\"{text}\"");
        prop_assert_eq!(parse_scheme(&program).ok(), Some(val(text.as_str())));
    }

    #[test]
    fn integer_addition_matches_checked_add(a in any::<i64>(), b in any::<i64>()) {
        let mut interpreter = Interpreter::new();
        let result = interpreter.eval_str(&format!("(+ {a} {b})"));
        match a.checked_add(b) {
            Some(sum) => prop_assert_eq!(result.ok(), Some(val(sum))),
            None => prop_assert!(result.is_err()),
        }
    }

    #[test]
    fn quoted_forms_evaluate_to_themselves(form in form()) {
        let mut interpreter = Interpreter::new();
        let result = interpreter
            .eval_str(&format!("'{form}"))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert!(result.is_eqv(&form));
    }
}
