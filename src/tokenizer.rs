use std::fmt;

use crate::error::{Error, Result};

/// Lexical units of the supported SQL dialect. Keywords are recognised
/// case-insensitively; identifiers and strings keep their casing.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Create,
    Table,
    Drop,
    If,
    Exists,
    Insert,
    Into,
    Values,
    Select,
    From,
    Where,
    Update,
    Set,
    Delete,
    And,
    Or,
    Not,
    Is,
    Null,
    As,
    Limit,
    Order,
    By,
    Asc,
    Desc,

    /// Table, column, type or function name.
    Ident(String),
    Number(i64),
    /// Contents of a `'...'` literal with `''` already unescaped.
    String(String),
    FloatNumber(f64),
    True,
    False,

    LeftParen,
    RightParen,
    Comma,
    Semicolon,
    Star,
    Minus,
    Greater,
    GreaterEqual,
    Lower,
    LowerEqual,
    Equal,
    /// `<>` or `!=`
    NotEqual,

    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "identifier {name:?}"),
            Token::Number(n) => write!(f, "number {n}"),
            Token::FloatNumber(n) => write!(f, "number {n}"),
            Token::String(s) => write!(f, "string '{s}'"),
            Token::LeftParen => f.write_str("'('"),
            Token::RightParen => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
            Token::Semicolon => f.write_str("';'"),
            Token::Star => f.write_str("'*'"),
            Token::Minus => f.write_str("'-'"),
            Token::Greater => f.write_str("'>'"),
            Token::GreaterEqual => f.write_str("'>='"),
            Token::Lower => f.write_str("'<'"),
            Token::LowerEqual => f.write_str("'<='"),
            Token::Equal => f.write_str("'='"),
            Token::NotEqual => f.write_str("'<>'"),
            Token::Eof => f.write_str("end of input"),
            keyword => write!(f, "{}", format!("{keyword:?}").to_uppercase()),
        }
    }
}

/// A [Token] together with the character offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// Splits SQL text into [Spanned] tokens.
pub struct Tokenizer {
    input: Vec<char>,
    /// Character offset of the cursor; reported as the token position.
    position: usize,
}

impl Tokenizer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Tokenizes the whole input. The last token is always [Token::Eof].
    ///
    /// # Errors
    /// [Error::Parse] at the first character that starts no token, or at the
    /// opening quote of an unterminated string.
    ///
    /// # Example
    /// ```
    /// # use tinysql::tokenizer::{Tokenizer, Token};
    /// let mut t = Tokenizer::new("SELECT *");
    /// let tokens = t.tokenize().unwrap();
    /// assert_eq!(tokens[0].token, Token::Select);
    /// assert_eq!(tokens[1].position, 7);
    /// ```
    pub fn tokenize(&mut self) -> Result<Vec<Spanned>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments();
            if self.is_at_end() {
                break;
            }

            let position = self.position;
            let token = self.next_token()?;
            tokens.push(Spanned { token, position });
        }

        tokens.push(Spanned {
            token: Token::Eof,
            position: self.input.len(),
        });
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token> {
        let ch = self.current_char();

        let token = match ch {
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            ',' => Token::Comma,
            ';' => Token::Semicolon,
            '*' => Token::Star,
            '-' => Token::Minus,
            '=' => Token::Equal,
            '>' => {
                self.advance();
                return Ok(if self.eat('=') {
                    Token::GreaterEqual
                } else {
                    Token::Greater
                });
            }
            '<' => {
                self.advance();
                return Ok(if self.eat('=') {
                    Token::LowerEqual
                } else if self.eat('>') {
                    Token::NotEqual
                } else {
                    Token::Lower
                });
            }
            '!' => {
                self.advance();
                if self.eat('=') {
                    return Ok(Token::NotEqual);
                }
                return Err(Error::parse("expected '=' after '!'", self.position - 1));
            }
            c if c.is_alphabetic() || c == '_' => return Ok(self.read_identifier()),
            c if c.is_ascii_digit() => return self.read_number(),
            '\'' => return self.read_string(),
            '"' => return self.read_quoted_identifier(),
            _ => {
                return Err(Error::parse(
                    format!("character {ch:?} is not supported"),
                    self.position,
                ));
            }
        };
        self.advance();
        Ok(token)
    }

    // --- Navigation Helpers ---

    fn current_char(&self) -> char {
        self.input[self.position]
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    /// Consumes `expected` if it is the current character.
    fn eat(&mut self, expected: char) -> bool {
        if !self.is_at_end() && self.current_char() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    /// Consumes whitespace and `--` line comments.
    fn skip_whitespace_and_comments(&mut self) {
        while !self.is_at_end() {
            let ch = self.current_char();
            if ch.is_whitespace() {
                self.advance();
            } else if ch == '-' && self.peek_char() == Some('-') {
                while !self.is_at_end() && self.current_char() != '\n' {
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    // --- Extraction Logic ---

    /// Keyword or bare identifier.
    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();

        while !self.is_at_end()
            && (self.current_char().is_alphanumeric() || self.current_char() == '_')
        {
            ident.push(self.current_char());
            self.advance();
        }

        match ident.to_uppercase().as_str() {
            "CREATE" => Token::Create,
            "TABLE" => Token::Table,
            "DROP" => Token::Drop,
            "IF" => Token::If,
            "EXISTS" => Token::Exists,
            "INSERT" => Token::Insert,
            "INTO" => Token::Into,
            "VALUES" => Token::Values,
            "SELECT" => Token::Select,
            "FROM" => Token::From,
            "WHERE" => Token::Where,
            "UPDATE" => Token::Update,
            "SET" => Token::Set,
            "DELETE" => Token::Delete,
            "TRUE" => Token::True,
            "FALSE" => Token::False,
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            "IS" => Token::Is,
            "NULL" => Token::Null,
            "AS" => Token::As,
            "LIMIT" => Token::Limit,
            "ORDER" => Token::Order,
            "BY" => Token::By,
            "ASC" => Token::Asc,
            "DESC" => Token::Desc,
            _ => Token::Ident(ident),
        }
    }

    /// Reads a `"quoted"` identifier verbatim, so keywords can be used as names.
    fn read_quoted_identifier(&mut self) -> Result<Token> {
        let start = self.position;
        self.advance();

        let mut ident = String::new();
        while !self.is_at_end() && self.current_char() != '"' {
            ident.push(self.current_char());
            self.advance();
        }
        if self.is_at_end() {
            return Err(Error::parse("unterminated quoted identifier", start));
        }
        self.advance();

        if ident.is_empty() {
            return Err(Error::parse("empty quoted identifier", start));
        }
        Ok(Token::Ident(ident))
    }

    /// Integer, or float when a `.` follows the digits.
    fn read_number(&mut self) -> Result<Token> {
        let start = self.position;
        let mut number = String::new();
        let mut has_dot = false;

        while !self.is_at_end()
            && (self.current_char().is_ascii_digit() || (self.current_char() == '.' && !has_dot))
        {
            if self.current_char() == '.' {
                has_dot = true;
            }
            number.push(self.current_char());
            self.advance();
        }

        if !self.is_at_end() && self.current_char() == '.' {
            return Err(Error::parse(
                "multiple dots are not allowed for a float",
                self.position,
            ));
        }

        if has_dot {
            return number
                .parse::<f64>()
                .map(Token::FloatNumber)
                .map_err(|e| Error::parse(format!("invalid number {number:?}: {e}"), start));
        }

        number
            .parse::<i64>()
            .map(Token::Number)
            .map_err(|e| Error::parse(format!("invalid integer {number:?}: {e}"), start))
    }

    /// Reads a string literal enclosed in single quotes. A doubled quote
    /// (`''`) inside the literal stands for one quote character.
    fn read_string(&mut self) -> Result<Token> {
        let start = self.position;
        self.advance();

        let mut string = String::new();
        loop {
            if self.is_at_end() {
                return Err(Error::parse("unterminated string", start));
            }
            let ch = self.current_char();
            self.advance();
            if ch == '\'' {
                if self.eat('\'') {
                    string.push('\'');
                    continue;
                }
                break;
            }
            string.push(ch);
        }

        Ok(Token::String(string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(sql: &str) -> Vec<Token> {
        Tokenizer::new(sql)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_tokenize_simple() {
        assert_eq!(
            tokens("CREATE TABLE users"),
            vec![
                Token::Create,
                Token::Table,
                Token::Ident("users".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_are_case_insensitive_identifiers_are_not() {
        assert_eq!(
            tokens("select Name from Users"),
            vec![
                Token::Select,
                Token::Ident("Name".into()),
                Token::From,
                Token::Ident("Users".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_create_table() {
        assert_eq!(
            tokens("CREATE TABLE users (id INT, name TEXT)"),
            vec![
                Token::Create,
                Token::Table,
                Token::Ident("users".into()),
                Token::LeftParen,
                Token::Ident("id".into()),
                Token::Ident("INT".into()),
                Token::Comma,
                Token::Ident("name".into()),
                Token::Ident("TEXT".into()),
                Token::RightParen,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_numbers() {
        assert_eq!(
            tokens("42, 1.14, -7"),
            vec![
                Token::Number(42),
                Token::Comma,
                Token::FloatNumber(1.14),
                Token::Comma,
                Token::Minus,
                Token::Number(7),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_operators() {
        assert_eq!(
            tokens("< <= > >= = <> !="),
            vec![
                Token::Lower,
                Token::LowerEqual,
                Token::Greater,
                Token::GreaterEqual,
                Token::Equal,
                Token::NotEqual,
                Token::NotEqual,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_strings() {
        assert_eq!(
            tokens("'Alice', 'Bob Dylan', '', 'it''s'"),
            vec![
                Token::String("Alice".into()),
                Token::Comma,
                Token::String("Bob Dylan".into()),
                Token::Comma,
                Token::String("".into()),
                Token::Comma,
                Token::String("it's".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_quoted_identifiers() {
        assert_eq!(
            tokens("SELECT \"select\" -- trailing comment\nFROM t;"),
            vec![
                Token::Select,
                Token::Ident("select".into()),
                Token::From,
                Token::Ident("t".into()),
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_positions() {
        let spanned = Tokenizer::new("SELECT  id").tokenize().unwrap();
        assert_eq!(spanned[0].position, 0);
        assert_eq!(spanned[1].position, 8);
        assert_eq!(spanned[2].token, Token::Eof);
        assert_eq!(spanned[2].position, 10);
    }

    #[test]
    fn test_unterminated_string() {
        let err = Tokenizer::new("SELECT 'hello").tokenize().unwrap_err();
        assert!(matches!(err, Error::Parse { position: 7, .. }));
    }

    #[test]
    fn test_unsupported_character() {
        let err = Tokenizer::new("SELECT id # x").tokenize().unwrap_err();
        assert!(matches!(err, Error::Parse { position: 10, .. }));
        assert!(Tokenizer::new("1.2.3").tokenize().is_err());
        assert!(Tokenizer::new("99999999999999999999").tokenize().is_err());
    }
}
