use crate::error::{Error, Result};
use crate::tokenizer::{Spanned, Token, Tokenizer};
use crate::{ColumnDef, DataType, Value, ast::*};

/// Tokenizes and parses a single SQL statement.
///
/// # Example
/// ```
/// use tinysql::ast::Statement;
/// let stmt = tinysql::parser::parse_sql("SELECT * FROM users;").unwrap();
/// assert!(matches!(stmt, Statement::Select(_)));
/// ```
pub fn parse_sql(sql: &str) -> Result<Statement> {
    let tokens = Tokenizer::new(sql).tokenize()?;
    Parser::new(tokens).parse()
}

/// Deepest allowed nesting of `NOT` and parentheses in a predicate.
const MAX_NESTING: usize = 128;

/// Recursive-descent parser over a token stream. Stops at the first error.
pub struct Parser {
    tokens: Vec<Spanned>,
    position: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
        }
    }

    pub fn parse(&mut self) -> Result<Statement> {
        let statement = match self.current_token() {
            Token::Create => self.parse_create_table(),
            Token::Drop => self.parse_drop_table(),
            Token::Insert => self.parse_insert(),
            Token::Update => self.parse_update(),
            Token::Delete => self.parse_delete(),
            Token::Select => self.parse_select(),
            _ => Err(self.unexpected("a statement")),
        }?;

        // semicolon is optionnal in SQL so skip it
        if matches!(self.current_token(), Token::Semicolon) {
            self.advance();
        }

        // Check we are at the end of the statement
        if !self.is_at_end() {
            return Err(self.unexpected("end of statement"));
        }

        Ok(statement)
    }

    //helpers
    fn current(&self) -> &Spanned {
        &self.tokens[self.position]
    }

    fn current_token(&self) -> &Token {
        &self.current().token
    }

    fn peek_token(&self) -> &Token {
        let next = (self.position + 1).min(self.tokens.len() - 1);
        &self.tokens[next].token
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current_token(), Token::Eof)
    }

    fn unexpected(&self, expected: &str) -> Error {
        Error::parse(
            format!("expected {expected}, found {}", self.current_token()),
            self.current().position,
        )
    }

    fn consume(&mut self, expected: Token) -> Result<()> {
        if *self.current_token() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&expected.to_string()))
        }
    }

    /// Consumes `expected` if present and reports whether it was.
    fn eat(&mut self, expected: &Token) -> bool {
        if self.current_token() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume_ident(&mut self) -> Result<String> {
        match self.current_token() {
            Token::Ident(string) => {
                let string = string.clone(); // Get the name
                self.advance();
                Ok(string)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn consume_data_type(&mut self) -> Result<DataType> {
        let position = self.current().position;
        let name = self.consume_ident()?;
        let data_type = DataType::from_sql_name(&name)
            .ok_or_else(|| Error::parse(format!("unknown column type {name:?}"), position))?;

        // VARCHAR(255), DECIMAL(10, 2): the size is accepted and ignored
        if self.eat(&Token::LeftParen) {
            self.consume_number()?;
            if self.eat(&Token::Comma) {
                self.consume_number()?;
            }
            self.consume(Token::RightParen)?;
        }
        Ok(data_type)
    }

    fn consume_number(&mut self) -> Result<i64> {
        match *self.current_token() {
            Token::Number(n) => {
                self.advance();
                Ok(n)
            }
            _ => Err(self.unexpected("integer")),
        }
    }

    /// Parses `item {, item}` until something other than a comma follows.
    fn comma_separated<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let mut items = vec![item(self)?];
        while self.eat(&Token::Comma) {
            items.push(item(self)?);
        }
        Ok(items)
    }

    fn parse_column_def(&mut self) -> Result<ColumnDef> {
        let name = self.consume_ident()?;
        let data_type = self.consume_data_type()?;
        Ok(ColumnDef::new(name, data_type))
    }

    fn parse_create_table(&mut self) -> Result<Statement> {
        self.consume(Token::Create)?; // advance if CREATE
        self.consume(Token::Table)?; // advance if TABLE
        let name = self.consume_ident()?;
        self.consume(Token::LeftParen)?;
        let columns = self.comma_separated(Self::parse_column_def)?;
        self.consume(Token::RightParen)?;
        Ok(Statement::CreateTable(CreateTable { name, columns }))
    }

    fn parse_drop_table(&mut self) -> Result<Statement> {
        self.consume(Token::Drop)?;
        self.consume(Token::Table)?;
        let if_exists = self.eat(&Token::If);
        if if_exists {
            self.consume(Token::Exists)?;
        }
        let name = self.consume_ident()?;
        Ok(Statement::DropTable(DropTable { name, if_exists }))
    }

    fn parse_insert(&mut self) -> Result<Statement> {
        self.consume(Token::Insert)?;
        self.consume(Token::Into)?;
        let table = self.consume_ident()?;

        let columns = if self.eat(&Token::LeftParen) {
            let columns = self.comma_separated(Self::consume_ident)?;
            self.consume(Token::RightParen)?;
            Some(columns)
        } else {
            None
        };

        self.consume(Token::Values)?;
        let rows = self.comma_separated(|p| {
            p.consume(Token::LeftParen)?;
            let values = p.comma_separated(Self::parse_literal)?;
            p.consume(Token::RightParen)?;
            Ok(values)
        })?;

        Ok(Statement::InsertInto(InsertInto {
            table,
            columns,
            rows,
        }))
    }

    fn parse_update(&mut self) -> Result<Statement> {
        self.consume(Token::Update)?;
        let table = self.consume_ident()?;
        self.consume(Token::Set)?;
        let assignments = self.comma_separated(|p| {
            let column = p.consume_ident()?;
            p.consume(Token::Equal)?;
            let value = p.parse_operand()?;
            Ok((column, value))
        })?;
        let where_clause = self.parse_where()?;
        Ok(Statement::Update(Update {
            table,
            assignments,
            where_clause,
        }))
    }

    fn parse_delete(&mut self) -> Result<Statement> {
        self.consume(Token::Delete)?;
        self.consume(Token::From)?;
        let table = self.consume_ident()?;
        let where_clause = self.parse_where()?;
        Ok(Statement::Delete(Delete {
            table,
            where_clause,
        }))
    }

    fn parse_select(&mut self) -> Result<Statement> {
        self.consume(Token::Select)?;
        let columns = self.parse_projection()?;
        self.consume(Token::From)?;
        let table = self.consume_ident()?;
        let where_clause = self.parse_where()?;

        let mut order_by = Vec::new();
        if self.eat(&Token::Order) {
            self.consume(Token::By)?;
            order_by = self.comma_separated(|p| {
                let column = p.consume_ident()?;
                let direction = if p.eat(&Token::Desc) {
                    SortDirection::Desc
                } else {
                    p.eat(&Token::Asc);
                    SortDirection::Asc
                };
                Ok(OrderByClause { column, direction })
            })?;
        }

        let limit = if self.eat(&Token::Limit) {
            let position = self.current().position;
            let n = self.consume_number()?;
            Some(usize::try_from(n).map_err(|_| Error::parse("LIMIT must not be negative", position))?)
        } else {
            None
        };

        Ok(Statement::Select(Select {
            columns,
            table,
            where_clause,
            order_by,
            limit,
        }))
    }

    fn parse_projection(&mut self) -> Result<ColumnsSelect> {
        if self.eat(&Token::Star) {
            return Ok(ColumnsSelect::Star);
        }

        let mut items = Vec::new();
        let mut aggregates = Vec::new();
        loop {
            let position = self.current().position;
            let is_call = matches!(self.current_token(), Token::Ident(_))
                && *self.peek_token() == Token::LeftParen;

            if is_call {
                aggregates.push(self.parse_aggregate()?);
            } else {
                let column = self.consume_ident()?;
                let alias = self.parse_alias()?;
                items.push(SelectItem { column, alias });
            }

            if !items.is_empty() && !aggregates.is_empty() {
                return Err(Error::parse(
                    "cannot mix aggregates and plain columns without GROUP BY",
                    position,
                ));
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }

        if aggregates.is_empty() {
            Ok(ColumnsSelect::Columns(items))
        } else {
            Ok(ColumnsSelect::Aggregates(aggregates))
        }
    }

    fn parse_aggregate(&mut self) -> Result<Aggregate> {
        let position = self.current().position;
        let name = self.consume_ident()?;
        let func = AggregateFunc::from_name(&name)
            .ok_or_else(|| Error::parse(format!("unknown function {name:?}"), position))?;

        self.consume(Token::LeftParen)?;
        let column = if self.eat(&Token::Star) {
            if func != AggregateFunc::Count {
                return Err(Error::parse(format!("{func}(*) is not supported"), position));
            }
            None
        } else {
            Some(self.consume_ident()?)
        };
        self.consume(Token::RightParen)?;

        let alias = self.parse_alias()?;
        Ok(Aggregate {
            func,
            column,
            alias,
        })
    }

    fn parse_alias(&mut self) -> Result<Option<String>> {
        if self.eat(&Token::As) {
            Ok(Some(self.consume_ident()?))
        } else {
            Ok(None)
        }
    }

    fn parse_where(&mut self) -> Result<Option<Expr>> {
        if self.eat(&Token::Where) {
            Ok(Some(self.parse_expr()?))
        } else {
            Ok(None)
        }
    }

    // --- Predicates: OR < AND < NOT < comparison ---

    fn parse_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Or {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::And {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat(&Token::Not) {
            let inner = self.nested(Self::parse_not)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        if self.eat(&Token::LeftParen) {
            let expr = self.nested(Self::parse_expr)?;
            self.consume(Token::RightParen)?;
            return Ok(expr);
        }

        let left = self.parse_operand()?;

        if self.eat(&Token::Is) {
            let negated = self.eat(&Token::Not);
            self.consume(Token::Null)?;
            return Ok(Expr::IsNull {
                operand: left,
                negated,
            });
        }

        let op = match self.current_token() {
            Token::Equal => ComparisonOp::Eq,
            Token::NotEqual => ComparisonOp::NotEq,
            Token::Lower => ComparisonOp::Lt,
            Token::LowerEqual => ComparisonOp::LtEq,
            Token::Greater => ComparisonOp::Gt,
            Token::GreaterEqual => ComparisonOp::GtEq,
            _ => return Ok(Expr::Operand(left)),
        };
        self.advance();
        let right = self.parse_operand()?;
        Ok(Expr::Comparison { left, op, right })
    }

    /// Runs `parse` one nesting level deeper, failing past [MAX_NESTING]
    /// instead of exhausting the stack.
    fn nested(&mut self, parse: fn(&mut Self) -> Result<Expr>) -> Result<Expr> {
        if self.depth >= MAX_NESTING {
            return Err(Error::parse(
                format!("expression nested more than {MAX_NESTING} levels deep"),
                self.current().position,
            ));
        }
        self.depth += 1;
        let expr = parse(self);
        self.depth -= 1;
        expr
    }

    fn parse_operand(&mut self) -> Result<Operand> {
        if let Token::Ident(name) = self.current_token() {
            let name = name.clone();
            self.advance();
            return Ok(Operand::Column(name));
        }
        self.parse_literal().map(Operand::Literal)
    }

    fn parse_literal(&mut self) -> Result<Value> {
        let value = match self.current_token() {
            Token::Number(n) => Value::Int(*n),
            Token::FloatNumber(f) => Value::Float(*f),
            Token::String(s) => Value::Text(s.as_str().into()),
            Token::True => Value::Bool(true),
            Token::False => Value::Bool(false),
            Token::Null => Value::Null,
            Token::Minus => {
                self.advance();
                return match *self.current_token() {
                    Token::Number(n) => {
                        self.advance();
                        Ok(Value::Int(-n))
                    }
                    Token::FloatNumber(f) => {
                        self.advance();
                        Ok(Value::Float(-f))
                    }
                    _ => Err(self.unexpected("number after '-'")),
                };
            }
            _ => return Err(self.unexpected("a literal value")),
        };
        self.advance();
        Ok(value)
    }
}
