//! Recursive-descent parser over the token stream.

use super::ast::{
    Assignment, Comparison, Condition, CreateIndex, CreateTable, Delete, DropIndex, DropTable,
    Insert, OrderKey, Predicate, Projection, Select, Statement, Update,
};
use super::lexer::{tokenize, Operator, Token, TokenKind};
use crate::error::{CoreError, CoreResult};
use crate::types::{Column, ColumnType, Value};

/// Words that cannot be used as bare identifiers or bare values.
const RESERVED: &[&str] = &[
    "AND", "BY", "CREATE", "DEFAULT", "DELETE", "DROP", "EXISTS", "FROM", "IF", "IN", "INDEX",
    "INSERT", "INTO", "IS", "KEY", "LIKE", "LIMIT", "NOT", "ON", "OR", "ORDER", "PRIMARY",
    "SELECT", "SET", "TABLE", "UPDATE", "VALUES", "WHERE",
];

/// Parses one statement.
///
/// # Errors
///
/// - [`CoreError::UnsupportedStatement`] if the leading keyword is outside
///   SELECT, INSERT, UPDATE, DELETE, CREATE and DROP
/// - [`CoreError::Syntax`] if the text does not match the grammar
pub fn parse(sql: &str) -> CoreResult<Statement> {
    let tokens = tokenize(sql)?;
    let mut parser = Parser { tokens, pos: 0 };
    let statement = parser.statement()?;

    parser.eat(&TokenKind::Semicolon);
    if parser.peek().kind != TokenKind::Eof {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(statement)
}

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize always ends the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> CoreError {
        CoreError::syntax(message, self.peek().pos)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> CoreResult<()> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.peek().is_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> CoreResult<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.error(format!("expected {kw}")))
        }
    }

    fn identifier(&mut self, what: &str) -> CoreResult<String> {
        match &self.peek().kind {
            TokenKind::Ident(word) if !is_reserved(word) => {
                let word = word.clone();
                self.advance();
                Ok(word)
            }
            TokenKind::QuotedIdent(word) => {
                let word = word.clone();
                self.advance();
                Ok(word)
            }
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    fn identifier_list(&mut self, what: &str) -> CoreResult<Vec<String>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut names = vec![self.identifier(what)?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.identifier(what)?);
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(names)
    }

    /// Parses a literal into its untyped value.
    ///
    /// `NULL`, `TRUE` and `FALSE` are recognised by name only; numbers stay
    /// numbers; any other bare word is kept as text.
    fn literal(&mut self) -> CoreResult<Value> {
        let token = self.peek().clone();
        let value = match token.kind {
            TokenKind::Str(text) | TokenKind::QuotedIdent(text) => Value::Text(text),
            TokenKind::Blob(bytes) => Value::Blob(bytes),
            TokenKind::Number(text) => number_literal(&text, token.pos)?,
            TokenKind::Ident(word) => match word.to_ascii_uppercase().as_str() {
                "NULL" => Value::Null,
                "TRUE" => Value::Boolean(true),
                "FALSE" => Value::Boolean(false),
                _ if is_reserved(&word) => return Err(self.error("expected a value")),
                _ => Value::Text(word),
            },
            _ => return Err(self.error("expected a value")),
        };
        self.advance();
        Ok(value)
    }

    fn statement(&mut self) -> CoreResult<Statement> {
        let keyword = match &self.peek().kind {
            TokenKind::Ident(word) => word.to_ascii_uppercase(),
            TokenKind::Eof => return Err(self.error("empty statement")),
            _ => return Err(self.error("expected a statement keyword")),
        };
        self.advance();

        match keyword.as_str() {
            "SELECT" => self.select().map(Statement::Select),
            "INSERT" => self.insert().map(Statement::Insert),
            "UPDATE" => self.update().map(Statement::Update),
            "DELETE" => self.delete().map(Statement::Delete),
            "CREATE" => self.create(),
            "DROP" => self.drop(),
            _ => Err(CoreError::unsupported(keyword)),
        }
    }

    fn select(&mut self) -> CoreResult<Select> {
        let projection = if self.eat(&TokenKind::Star) {
            Projection::All
        } else {
            let mut columns = vec![self.identifier("column name or '*'")?];
            while self.eat(&TokenKind::Comma) {
                columns.push(self.identifier("column name")?);
            }
            Projection::Columns(columns)
        };

        self.expect_keyword("FROM")?;
        let table = self.identifier("table name")?;
        let filter = self.where_clause()?;

        let mut order_by = Vec::new();
        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            loop {
                let column = self.identifier("column name")?;
                let descending = if self.eat_keyword("DESC") {
                    true
                } else {
                    self.eat_keyword("ASC");
                    false
                };
                order_by.push(OrderKey { column, descending });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }

        let limit = if self.eat_keyword("LIMIT") {
            let token = self.advance();
            match token.kind {
                TokenKind::Number(text) => Some(
                    text.parse::<usize>()
                        .map_err(|_| CoreError::syntax("LIMIT must be a non-negative integer", token.pos))?,
                ),
                _ => return Err(CoreError::syntax("expected LIMIT count", token.pos)),
            }
        } else {
            None
        };

        Ok(Select {
            projection,
            table,
            filter,
            order_by,
            limit,
        })
    }

    fn insert(&mut self) -> CoreResult<Insert> {
        self.expect_keyword("INTO")?;
        let table = self.identifier("table name")?;
        let columns = if self.peek().kind == TokenKind::LParen {
            Some(self.identifier_list("column name")?)
        } else {
            None
        };

        self.expect_keyword("VALUES")?;
        self.expect(TokenKind::LParen, "'('")?;
        let mut values = vec![self.literal()?];
        while self.eat(&TokenKind::Comma) {
            values.push(self.literal()?);
        }
        self.expect(TokenKind::RParen, "')'")?;

        Ok(Insert {
            table,
            columns,
            values,
        })
    }

    fn update(&mut self) -> CoreResult<Update> {
        let table = self.identifier("table name")?;
        self.expect_keyword("SET")?;

        let mut assignments = Vec::new();
        loop {
            let column = self.identifier("column name")?;
            self.expect(TokenKind::Op(Operator::Eq), "'='")?;
            let value = self.literal()?;
            assignments.push(Assignment { column, value });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        let filter = self.where_clause()?;
        Ok(Update {
            table,
            assignments,
            filter,
        })
    }

    fn delete(&mut self) -> CoreResult<Delete> {
        self.expect_keyword("FROM")?;
        let table = self.identifier("table name")?;
        let filter = self.where_clause()?;
        Ok(Delete { table, filter })
    }

    fn create(&mut self) -> CoreResult<Statement> {
        if self.eat_keyword("TABLE") {
            return self.create_table().map(Statement::CreateTable);
        }
        let unique = self.eat_keyword("UNIQUE");
        if self.eat_keyword("INDEX") {
            return self.create_index(unique).map(Statement::CreateIndex);
        }
        Err(self.unsupported_object("CREATE"))
    }

    fn drop(&mut self) -> CoreResult<Statement> {
        if self.eat_keyword("TABLE") {
            let if_exists = self.if_exists()?;
            let name = self.identifier("table name")?;
            return Ok(Statement::DropTable(DropTable { name, if_exists }));
        }
        if self.eat_keyword("INDEX") {
            let if_exists = self.if_exists()?;
            let name = self.identifier("index name")?;
            return Ok(Statement::DropIndex(DropIndex { name, if_exists }));
        }
        Err(self.unsupported_object("DROP"))
    }

    fn unsupported_object(&self, verb: &str) -> CoreError {
        match &self.peek().kind {
            TokenKind::Ident(word) => CoreError::unsupported(format!("{verb} {}", word.to_ascii_uppercase())),
            _ => self.error(format!("expected TABLE or INDEX after {verb}")),
        }
    }

    fn if_not_exists(&mut self) -> CoreResult<bool> {
        if self.eat_keyword("IF") {
            self.expect_keyword("NOT")?;
            self.expect_keyword("EXISTS")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn if_exists(&mut self) -> CoreResult<bool> {
        if self.eat_keyword("IF") {
            self.expect_keyword("EXISTS")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn create_table(&mut self) -> CoreResult<CreateTable> {
        let if_not_exists = self.if_not_exists()?;
        let name = self.identifier("table name")?;
        self.expect(TokenKind::LParen, "'('")?;

        let mut columns: Vec<Column> = Vec::new();
        let mut table_key: Option<(Vec<String>, usize)> = None;
        loop {
            if self.peek().is_keyword("PRIMARY") {
                let pos = self.peek().pos;
                self.advance();
                self.expect_keyword("KEY")?;
                if table_key.is_some() {
                    return Err(CoreError::syntax("duplicate PRIMARY KEY clause", pos));
                }
                table_key = Some((self.identifier_list("column name")?, pos));
            } else {
                columns.push(self.column_def()?);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;

        if columns.is_empty() {
            return Err(self.error("table needs at least one column"));
        }

        let primary_key = match table_key {
            Some((names, pos)) => {
                for key in &names {
                    let Some(column) = columns.iter_mut().find(|c| &c.name == key) else {
                        return Err(CoreError::syntax(
                            format!("primary key column {key} is not defined"),
                            pos,
                        ));
                    };
                    column.primary_key = true;
                }
                names
            }
            None => columns
                .iter()
                .filter(|c| c.primary_key)
                .map(|c| c.name.clone())
                .collect(),
        };

        Ok(CreateTable {
            name,
            if_not_exists,
            columns,
            primary_key,
        })
    }

    fn column_def(&mut self) -> CoreResult<Column> {
        let name = self.identifier("column name")?;

        let type_pos = self.peek().pos;
        let type_name = match &self.peek().kind {
            TokenKind::Ident(word) => word.clone(),
            _ => return Err(self.error("expected column type")),
        };
        let column_type = ColumnType::from_sql(&type_name)
            .ok_or_else(|| CoreError::syntax(format!("unknown column type {type_name}"), type_pos))?;
        self.advance();

        // Length arguments such as VARCHAR(255) or DECIMAL(10, 2) are accepted and ignored.
        if self.eat(&TokenKind::LParen) {
            loop {
                match self.advance().kind {
                    TokenKind::Number(_) => {}
                    _ => return Err(CoreError::syntax("expected type length", type_pos)),
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "')'")?;
        }

        let mut column = Column::new(name, column_type);
        loop {
            if self.eat_keyword("PRIMARY") {
                self.expect_keyword("KEY")?;
                column.primary_key = true;
            } else if self.eat_keyword("NOT") {
                self.expect_keyword("NULL")?;
                column.not_null = true;
            } else if self.eat_keyword("NULL") {
                // explicit nullable
            } else if self.eat_keyword("DEFAULT") {
                column.default = Some(self.literal()?);
            } else if self.eat_keyword("AUTOINCREMENT") {
                // implied for a single INTEGER primary key
            } else {
                break;
            }
        }
        Ok(column)
    }

    fn create_index(&mut self, unique: bool) -> CoreResult<CreateIndex> {
        let if_not_exists = self.if_not_exists()?;
        let name = self.identifier("index name")?;
        self.expect_keyword("ON")?;
        let table = self.identifier("table name")?;
        let columns = self.identifier_list("column name")?;
        Ok(CreateIndex {
            name,
            table,
            columns,
            unique,
            if_not_exists,
        })
    }

    fn where_clause(&mut self) -> CoreResult<Option<Predicate>> {
        if !self.eat_keyword("WHERE") {
            return Ok(None);
        }

        let mut branches = Vec::new();
        loop {
            let mut conditions = vec![self.condition()?];
            while self.eat_keyword("AND") {
                conditions.push(self.condition()?);
            }
            branches.push(conditions);
            if !self.eat_keyword("OR") {
                break;
            }
        }
        Ok(Some(Predicate { branches }))
    }

    fn condition(&mut self) -> CoreResult<Condition> {
        // Literal on the left: `25 < age` reads as `age > 25`.
        if matches!(
            self.peek().kind,
            TokenKind::Number(_) | TokenKind::Str(_) | TokenKind::Blob(_)
        ) {
            let value = self.literal()?;
            let op = self.operator()?;
            let column = self.identifier("column name")?;
            return Ok(Condition {
                column,
                test: comparison(op.flipped(), value),
            });
        }

        let column = self.identifier("column name")?;

        if let TokenKind::Op(op) = self.peek().kind {
            self.advance();
            let value = self.literal()?;
            return Ok(Condition {
                column,
                test: comparison(op, value),
            });
        }

        let test = if self.eat_keyword("LIKE") {
            let pattern = match self.literal()? {
                Value::Text(text) => text,
                other => other.render(),
            };
            Comparison::Like(pattern)
        } else if self.eat_keyword("IN") {
            self.expect(TokenKind::LParen, "'('")?;
            let mut values = vec![self.literal()?];
            while self.eat(&TokenKind::Comma) {
                values.push(self.literal()?);
            }
            self.expect(TokenKind::RParen, "')'")?;
            Comparison::In(values)
        } else if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            self.expect_keyword("NULL")?;
            if negated {
                Comparison::IsNotNull
            } else {
                Comparison::IsNull
            }
        } else {
            return Err(self.error("expected comparison operator"));
        };

        Ok(Condition { column, test })
    }

    fn operator(&mut self) -> CoreResult<Operator> {
        match self.peek().kind {
            TokenKind::Op(op) => {
                self.advance();
                Ok(op)
            }
            _ => Err(self.error("expected comparison operator")),
        }
    }
}

fn comparison(op: Operator, value: Value) -> Comparison {
    match op {
        Operator::Eq => Comparison::Eq(value),
        Operator::NotEq => Comparison::NotEq(value),
        Operator::Gt => Comparison::Gt(value),
        Operator::Ge => Comparison::Ge(value),
        Operator::Lt => Comparison::Lt(value),
        Operator::Le => Comparison::Le(value),
    }
}

/// Integers stay integers; anything with a fraction or exponent, or too
/// large for i64, becomes a real.
fn number_literal(text: &str, pos: usize) -> CoreResult<Value> {
    if !text.contains(['.', 'e', 'E']) {
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Integer(i));
        }
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => Ok(Value::Real(f)),
        _ => Err(CoreError::syntax(format!("numeric literal out of range: {text}"), pos)),
    }
}
