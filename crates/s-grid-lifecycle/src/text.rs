//! ---
//! sgrid_section: "03-lifecycle-modeling"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Lifecycle naming, transition notation, and next-hop search."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;

/// Compact textual notation declaring the transitions of one lifecycle.
///
/// Grammar: identifiers joined by arrow operators. `a-->b` declares a
/// forward edge, `a<--b` the reverse, `a<-->b` both, and a lone
/// identifier declares a disconnected state. Dash count is free
/// (`a->b` and `a---->b` are equivalent); chains share their interior
/// words (`a<-->b<-->c` yields all four edges).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LifecycleStateMachineText(String);

impl LifecycleStateMachineText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LifecycleStateMachineText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LifecycleStateMachineText {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Arrow { left: bool, right: bool },
}

/// State and edge declarations extracted from a notation text.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Declarations {
    /// Directed edges in application order: forward edges first, then
    /// reversed edges, then isolated states.
    pub edges: Vec<(String, String)>,
    pub isolated: Vec<String>,
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_arrow_char(c: char) -> bool {
    matches!(c, '<' | '-' | '>')
}

/// Split the notation into word and arrow tokens.
///
/// An arrow run must match `<?-*>?` and carry at least one head; anything
/// else in the operator character set is outside the documented grammar
/// and rejected rather than guessed at.
fn tokenize(text: &str) -> Result<Vec<Token>, LifecycleError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if is_word_char(c) {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if !is_word_char(c) {
                    break;
                }
                word.push(c);
                chars.next();
            }
            tokens.push(Token::Word(word));
        } else if is_arrow_char(c) {
            let mut run = String::new();
            while let Some(&c) = chars.peek() {
                if !is_arrow_char(c) {
                    break;
                }
                run.push(c);
                chars.next();
            }
            tokens.push(arrow_token(&run)?);
        } else {
            return Err(LifecycleError::UnspecifiedNotation(c.to_string()));
        }
    }
    Ok(tokens)
}

fn arrow_token(run: &str) -> Result<Token, LifecycleError> {
    let left = run.starts_with('<');
    let right = run.ends_with('>');
    let body = &run[usize::from(left)..run.len() - usize::from(right)];
    if (!left && !right) || !body.chars().all(|c| c == '-') {
        return Err(LifecycleError::UnspecifiedNotation(run.to_owned()));
    }
    Ok(Token::Arrow { left, right })
}

/// Parse the notation into edge and isolated-state declarations.
///
/// Application order follows the documented semantics: every forward
/// (right-headed) edge is declared scanning left to right, then every
/// reversed (left-headed) edge, then the bare words.
pub(crate) fn parse(text: &str) -> Result<Declarations, LifecycleError> {
    let tokens = tokenize(text)?;

    // Arrows must sit between two words.
    for (index, token) in tokens.iter().enumerate() {
        if matches!(token, Token::Arrow { .. }) {
            let flanked = index > 0
                && matches!(tokens.get(index - 1), Some(Token::Word(_)))
                && matches!(tokens.get(index + 1), Some(Token::Word(_)));
            if !flanked {
                return Err(LifecycleError::UnspecifiedNotation(text.trim().to_owned()));
            }
        }
    }

    let mut declarations = Declarations::default();
    for (index, token) in tokens.iter().enumerate() {
        if let Token::Arrow { right: true, .. } = token {
            if let (Some(Token::Word(from)), Some(Token::Word(to))) =
                (tokens.get(index - 1), tokens.get(index + 1))
            {
                declarations.edges.push((from.clone(), to.clone()));
            }
        }
    }
    for (index, token) in tokens.iter().enumerate() {
        if let Token::Arrow { left: true, .. } = token {
            if let (Some(Token::Word(from)), Some(Token::Word(to))) =
                (tokens.get(index - 1), tokens.get(index + 1))
            {
                declarations.edges.push((to.clone(), from.clone()));
            }
        }
    }
    for (index, token) in tokens.iter().enumerate() {
        if let Token::Word(word) = token {
            let arrow_adjacent = matches!(
                index.checked_sub(1).and_then(|i| tokens.get(i)),
                Some(Token::Arrow { .. })
            ) || matches!(tokens.get(index + 1), Some(Token::Arrow { .. }));
            if !arrow_adjacent {
                declarations.isolated.push(word.clone());
            }
        }
    }
    Ok(declarations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(text: &str) -> Vec<(String, String)> {
        parse(text).expect("parseable notation").edges
    }

    #[test]
    fn forward_chain_declares_each_hop() {
        assert_eq!(
            edges("a_x-->b_x-->c_x"),
            vec![
                ("a_x".to_owned(), "b_x".to_owned()),
                ("b_x".to_owned(), "c_x".to_owned()),
            ]
        );
    }

    #[test]
    fn reversed_arrow_flips_the_edge() {
        assert_eq!(edges("a<--b"), vec![("b".to_owned(), "a".to_owned())]);
        assert_eq!(edges("a<b"), vec![("b".to_owned(), "a".to_owned())]);
    }

    #[test]
    fn bidirectional_chain_yields_all_edges_in_pass_order() {
        assert_eq!(
            edges("a<-->b<-->c"),
            vec![
                ("a".to_owned(), "b".to_owned()),
                ("b".to_owned(), "c".to_owned()),
                ("b".to_owned(), "a".to_owned()),
                ("c".to_owned(), "b".to_owned()),
            ]
        );
    }

    #[test]
    fn dash_count_and_spacing_are_free() {
        assert_eq!(edges("a ----> b"), vec![("a".to_owned(), "b".to_owned())]);
        assert_eq!(edges("a>b"), vec![("a".to_owned(), "b".to_owned())]);
    }

    #[test]
    fn lone_words_become_isolated_states() {
        let declarations = parse("a-->b standalone other").expect("parses");
        assert_eq!(declarations.isolated, vec!["standalone", "other"]);
    }

    #[test]
    fn headless_dash_runs_are_unspecified() {
        assert!(matches!(
            parse("a -- b"),
            Err(LifecycleError::UnspecifiedNotation(_))
        ));
    }

    #[test]
    fn dangling_arrows_are_unspecified() {
        assert!(parse("a -->").is_err());
        assert!(parse("--> b").is_err());
        assert!(parse("a --> --> b").is_err());
    }

    #[test]
    fn foreign_characters_are_unspecified() {
        assert!(parse("a => b").is_err());
    }
}
