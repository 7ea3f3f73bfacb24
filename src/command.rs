use std::path::PathBuf;

use crate::error::SyntaxError;
use crate::limits::Limits;
use crate::tokenizer::Token;

/// One stage of a pipeline: the program name followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub args: Vec<String>,
}

impl Command {
    pub fn program(&self) -> &str {
        &self.args[0]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
    /// Standard input of the first command.
    pub input: Option<PathBuf>,
    /// Standard output of the last command.
    pub output: Option<PathBuf>,
    pub background: bool,
}

static END_OF_LINE: Token = Token::EndOfLine;

struct Parser<'a> {
    tokens: &'a [Token],
    position: usize,
    limits: &'a Limits,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &'a Token {
        self.tokens.get(self.position).unwrap_or(&END_OF_LINE)
    }

    fn next(&mut self) -> &'a Token {
        let token = self.peek();
        self.position += 1;
        token
    }

    fn check(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn command(&mut self) -> Result<Command, SyntaxError> {
        let mut args = Vec::new();

        while let Token::Word(word) = self.peek() {
            if args.len() == self.limits.max_args {
                return Err(SyntaxError::TooManyArgs(self.limits.max_args));
            }
            args.push(word.clone());
            self.position += 1;
        }

        if args.is_empty() {
            return Err(SyntaxError::MissingCommand);
        }
        Ok(Command { args })
    }

    fn file_name(&mut self, operator: char) -> Result<PathBuf, SyntaxError> {
        match self.next() {
            Token::Word(name) if name.is_empty() => Err(SyntaxError::MissingRedirectTarget(operator)),
            Token::Word(name) if name.len() >= self.limits.max_name => Err(SyntaxError::NameTooLong {
                name: name.clone(),
                limit: self.limits.max_name,
            }),
            Token::Word(name) => Ok(PathBuf::from(name)),
            _ => Err(SyntaxError::MissingRedirectTarget(operator)),
        }
    }

    fn pipeline(&mut self) -> Result<Pipeline, SyntaxError> {
        let mut commands = vec![self.command()?];

        let input = if self.check(&Token::RedirIn) {
            Some(self.file_name('<')?)
        } else {
            None
        };

        while self.check(&Token::Pipe) {
            if commands.len() == self.limits.max_stages {
                return Err(SyntaxError::TooManyCommands(self.limits.max_stages));
            }
            commands.push(self.command()?);
        }

        let output = if self.check(&Token::RedirOut) {
            Some(self.file_name('>')?)
        } else {
            None
        };

        let background = self.check(&Token::Background);

        match self.next() {
            Token::EndOfLine => Ok(Pipeline { commands, input, output, background }),
            token => Err(SyntaxError::Unexpected(token.clone())),
        }
    }
}

impl Pipeline {
    /// Build a pipeline from a token sequence.
    ///
    /// Grammar: `command ['<' word] {'|' command} ['>' word] ['&'] EndOfLine`.
    /// Input redirection may only follow the first command and output
    /// redirection may only follow the last one.
    pub fn parse(tokens: &[Token], limits: &Limits) -> Result<Self, SyntaxError> {
        Parser { tokens, position: 0, limits }.pipeline()
    }
}
