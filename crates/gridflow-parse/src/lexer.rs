//! Breaks formula source text into primitive lexical tokens.
//!
//! This stage knows nothing about references, sheets, or named expressions —
//! it only classifies characters into numbers, quoted strings, bare words
//! (candidate references / names / function calls), operators, and
//! punctuation. [`crate::parser::parse_formula`] drives resolution from here.

use smallvec::SmallVec;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("'{0}' is not a valid reference")]
    InvalidReference(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LexToken {
    Number(f64),
    String(String),
    /// A bare word: a reference, a named expression, or (if immediately
    /// followed by `(`) a function name.
    Word(String),
    FunctionWord(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Amp,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Open,
    Close,
    Comma,
}

pub fn lex(input: &str) -> Result<Vec<LexToken>, LexError> {
    let src = input.strip_prefix('=').unwrap_or(input);
    let chars: SmallVec<[char; 128]> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '+' => {
                out.push(LexToken::Plus);
                i += 1;
            }
            '-' => {
                out.push(LexToken::Minus);
                i += 1;
            }
            '*' => {
                out.push(LexToken::Star);
                i += 1;
            }
            '/' => {
                out.push(LexToken::Slash);
                i += 1;
            }
            '^' => {
                out.push(LexToken::Caret);
                i += 1;
            }
            '&' => {
                out.push(LexToken::Amp);
                i += 1;
            }
            '(' => {
                out.push(LexToken::Open);
                i += 1;
            }
            ')' => {
                out.push(LexToken::Close);
                i += 1;
            }
            ',' => {
                out.push(LexToken::Comma);
                i += 1;
            }
            '=' => {
                out.push(LexToken::Eq);
                i += 1;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'>') {
                    out.push(LexToken::Ne);
                    i += 2;
                } else if chars.get(i + 1) == Some(&'=') {
                    out.push(LexToken::Le);
                    i += 2;
                } else {
                    out.push(LexToken::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    out.push(LexToken::Ge);
                    i += 2;
                } else {
                    out.push(LexToken::Gt);
                    i += 1;
                }
            }
            '"' => {
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(LexError::UnterminatedString),
                        Some('"') if chars.get(i + 1) == Some(&'"') => {
                            s.push('"');
                            i += 2;
                        }
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            s.push(*ch);
                            i += 1;
                        }
                    }
                }
                out.push(LexToken::String(s));
            }
            c if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    i += 1;
                    if i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
                        i += 1;
                    }
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let n = text.parse::<f64>().map_err(|_| LexError::UnexpectedChar(c))?;
                out.push(LexToken::Number(n));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' || c == '\'' => {
                let start = i;
                if c == '\'' {
                    i += 1;
                    while i < chars.len() && chars[i] != '\'' {
                        i += 1;
                    }
                    i += 1;
                }
                while i < chars.len()
                    && (chars[i].is_alphanumeric()
                        || chars[i] == '_'
                        || chars[i] == '$'
                        || chars[i] == '.'
                        || chars[i] == '!'
                        || chars[i] == ':')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if chars.get(i) == Some(&'(') {
                    out.push(LexToken::FunctionWord(word));
                } else {
                    out.push(LexToken::Word(word));
                }
            }
            other => return Err(LexError::UnexpectedChar(other)),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_plain_arithmetic() {
        let toks = lex("=1+2*3").unwrap();
        assert_eq!(
            toks,
            vec![
                LexToken::Number(1.0),
                LexToken::Plus,
                LexToken::Number(2.0),
                LexToken::Star,
                LexToken::Number(3.0),
            ]
        );
    }

    #[test]
    fn lexes_function_call_word_distinctly_from_reference() {
        let toks = lex("=SUM(A1,B1)").unwrap();
        assert_eq!(toks[0], LexToken::FunctionWord("SUM".into()));
        assert_eq!(toks[1], LexToken::Open);
        assert_eq!(toks[2], LexToken::Word("A1".into()));
    }

    #[test]
    fn lexes_quoted_string_with_escaped_quote() {
        let toks = lex(r#"="a""b""#).unwrap();
        assert_eq!(toks, vec![LexToken::String("a\"b".into())]);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert_eq!(lex("=\"oops"), Err(LexError::UnterminatedString));
    }

    #[test]
    fn lexes_comparison_operators() {
        let toks = lex("=A1<=B1").unwrap();
        assert_eq!(toks[1], LexToken::Le);
    }

    #[test]
    fn lexes_range_reference_as_one_word() {
        let toks = lex("=SUM(A1:B2)").unwrap();
        assert_eq!(toks[2], LexToken::Word("A1:B2".into()));
    }
}
