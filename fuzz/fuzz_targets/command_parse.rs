//! Fuzz target for the command interpreter
//!
//! Interprets arbitrary text from a registered session to find panics in
//! tokenisation, case folding or reply formatting.
//!
//! # Invariants
//!
//! - Interpretation never fails for a registered session
//! - Text whose first token does not start with `/` is always chat
//! - A rename request is always lower-case and never a name already held
//! - The registry is never mutated

#![no_main]

use libfuzzer_sys::fuzz_target;
use parley_server::{Command, Outcome, SessionRegistry, command};

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);

    let mut registry = SessionRegistry::new();
    let (origin, _) = registry.register(());
    registry.register(());
    let names_before = registry.names().to_vec();

    let parsed = Command::parse(&text);
    let is_command = text.split_whitespace().next().is_some_and(|t| t.starts_with('/'));
    assert_eq!(matches!(parsed, Command::Chat(_)), !is_command);

    let outcome = command::interpret(origin, &text, &registry).expect("origin is registered");
    if let Outcome::Rename { new_name, .. } = &outcome {
        assert_eq!(*new_name, new_name.to_lowercase());
        assert!(!registry.is_name_taken(new_name));
    }

    assert_eq!(registry.names(), &names_before[..]);
});
