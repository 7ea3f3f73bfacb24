use std::fmt;

use crate::error::SyntaxError;
use crate::limits::Limits;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    Pipe,
    RedirIn,
    RedirOut,
    Background,
    EndOfLine,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(word) => write!(f, "'{}'", word),
            Token::Pipe => f.write_str("'|'"),
            Token::RedirIn => f.write_str("'<'"),
            Token::RedirOut => f.write_str("'>'"),
            Token::Background => f.write_str("'&'"),
            Token::EndOfLine => f.write_str("end of line"),
        }
    }
}

fn is_separator(c: char) -> bool {
    matches!(c, ' ' | '\t')
}

fn is_word_char(c: char) -> bool {
    !matches!(c, ' ' | '\t' | '<' | '>' | '|' | '&' | '\n')
}

/// Split one input line into words and operators.
///
/// Operators never need surrounding whitespace: `cmd>out` is three tokens.
/// The result always ends with exactly one `EndOfLine`; anything after a
/// newline is ignored. A word longer than `max_line` bytes is an error.
pub fn tokenize(line: &str, limits: &Limits) -> Result<Vec<Token>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if is_separator(c) {
            chars.next();
            continue;
        }

        let token = match c {
            '\n' => break,
            '<' => Token::RedirIn,
            '>' => Token::RedirOut,
            '|' => Token::Pipe,
            '&' => Token::Background,
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if !is_word_char(c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                if word.len() > limits.max_line {
                    return Err(SyntaxError::WordTooLong(limits.max_line));
                }
                tokens.push(Token::Word(word));
                continue;
            }
        };
        chars.next();
        tokens.push(token);
    }

    tokens.push(Token::EndOfLine);
    Ok(tokens)
}
