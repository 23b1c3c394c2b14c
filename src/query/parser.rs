use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::{char, multispace0};
use nom::combinator::{map, value};
use nom::sequence::delimited;
use nom::{IResult, Parser};
use crate::core::error::{Error, ErrorKind, Result};
use crate::query::ast::{Expression, TermExpression};
use crate::query::types::{CompareOperator, QueryValidator};

// Characters that end a bare word
pub(crate) const RESERVED: &str = "()\"[]=!<>:|&";

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Op(CompareOperator),
    Column(String), // [bracketed name]
    Text(String),   // "quoted value"
    Word(String),
}

/// Parses WHERE clauses:
/// - "visouza" -> value searched in every column
/// - "Name = visouza" / "[Assigned To]:scott" -> column term
/// - "ID > 3 AND (Name:eric OR NOT Name:scott)" -> boolean tree
/// - "a b" -> implicit AND
/// - "" or "*" -> All
pub struct QueryParser {
    validator: QueryValidator,
}

impl QueryParser {
    pub fn new() -> Self {
        QueryParser {
            validator: QueryValidator::default(),
        }
    }

    pub fn with_validator(validator: QueryValidator) -> Self {
        QueryParser { validator }
    }

    pub fn parse(&self, input: &str) -> Result<Expression> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Ok(Expression::All);
        }

        let mut stream = TokenStream {
            tokens,
            pos: 0,
            depth: 0,
            max_nesting: self.validator.max_nesting(),
        };
        let expression = stream.parse_or()?;
        if let Some(token) = stream.peek() {
            return Err(parse_error(format!("Unexpected {} in '{input}'", describe(token))));
        }

        self.validator.validate(&expression)?;
        Ok(expression)
    }
}

impl Default for QueryParser {
    fn default() -> Self {
        QueryParser::new()
    }
}

/// Parse with the default limits.
pub fn parse_where(input: &str) -> Result<Expression> {
    QueryParser::new().parse(input)
}

/// Where a partly typed query stands, judged from its complete tokens.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Position {
    /// Start of input, or after AND, OR, NOT or '('.
    TermStart,
    /// After a bare word or [column]; an operator follows if it names a column.
    AfterWord(String),
    /// After an operator, with the column it compares if one was given.
    AfterOperator(Option<String>, CompareOperator),
    /// After a full term or ')'.
    AfterTerm,
}

pub(crate) fn position_after(prefix: &str) -> Result<Position> {
    let tokens = tokenize(prefix)?;
    let before = |back: usize| tokens.len().checked_sub(back).and_then(|i| tokens.get(i));
    Ok(match before(1) {
        None | Some(Token::And | Token::Or | Token::Not | Token::LParen) => Position::TermStart,
        Some(Token::RParen) => Position::AfterTerm,
        Some(Token::Op(op)) => match before(2) {
            Some(Token::Word(column) | Token::Column(column)) => Position::AfterOperator(Some(column.clone()), *op),
            _ => Position::AfterOperator(None, *op),
        },
        Some(Token::Word(word) | Token::Column(word)) => match before(2) {
            Some(Token::Op(_)) => Position::AfterTerm,
            _ => Position::AfterWord(word.clone()),
        },
        Some(Token::Text(_)) => Position::AfterTerm,
    })
}

fn parse_error(context: String) -> Error {
    Error::new(ErrorKind::Parse, context)
}

fn describe(token: &Token) -> String {
    match token {
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::And => "AND".to_string(),
        Token::Or => "OR".to_string(),
        Token::Not => "NOT".to_string(),
        Token::Op(op) => format!("'{op}'"),
        Token::Column(c) => format!("column [{c}]"),
        Token::Text(t) | Token::Word(t) => format!("'{t}'"),
    }
}

// ---- Lexer ----

fn operator(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::Op(CompareOperator::MatchesExact), tag("::")),
        value(Token::Op(CompareOperator::StartsWith), tag("|>")),
        value(Token::Op(CompareOperator::NotEquals), alt((tag("!="), tag("<>")))),
        value(Token::Op(CompareOperator::LessThanOrEqual), tag("<=")),
        value(Token::Op(CompareOperator::GreaterThanOrEqual), tag(">=")),
        value(Token::Op(CompareOperator::Equals), alt((tag("=="), tag("=")))),
        value(Token::Op(CompareOperator::Matches), tag(":")),
        value(Token::Op(CompareOperator::LessThan), tag("<")),
        value(Token::Op(CompareOperator::GreaterThan), tag(">")),
    ))
    .parse(input)
}

fn symbol(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::LParen, char('(')),
        value(Token::RParen, char(')')),
        value(Token::And, tag("&&")),
        value(Token::Or, tag("||")),
    ))
    .parse(input)
}

fn bang(input: &str) -> IResult<&str, Token> {
    value(Token::Not, char('!')).parse(input)
}

// "" inside a quoted value is a literal quote
fn quoted(input: &str) -> IResult<&str, Token> {
    let (mut rest, _) = char('"').parse(input)?;
    let mut text = String::new();
    loop {
        let (after, chunk) = take_while(|c: char| c != '"').parse(rest)?;
        text.push_str(chunk);
        let (after, _) = char('"').parse(after)?;
        if let Ok((escaped, _)) = char::<&str, nom::error::Error<&str>>('"').parse(after) {
            text.push('"');
            rest = escaped;
            continue;
        }
        return Ok((after, Token::Text(text)));
    }
}

fn column(input: &str) -> IResult<&str, Token> {
    map(
        delimited(char('['), take_while(|c: char| c != ']'), char(']')),
        |name: &str| Token::Column(name.trim().to_string()),
    )
    .parse(input)
}

fn word(input: &str) -> IResult<&str, Token> {
    map(
        take_while1(|c: char| !c.is_whitespace() && !RESERVED.contains(c)),
        |w: &str| {
            if w.eq_ignore_ascii_case("and") {
                Token::And
            } else if w.eq_ignore_ascii_case("or") {
                Token::Or
            } else if w.eq_ignore_ascii_case("not") {
                Token::Not
            } else {
                Token::Word(w.to_string())
            }
        },
    )
    .parse(input)
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = input;
    loop {
        let (after_space, _) = multispace0::<&str, nom::error::Error<&str>>(rest)
            .map_err(|e| parse_error(e.to_string()))?;
        rest = after_space;
        if rest.is_empty() {
            return Ok(tokens);
        }

        match alt((symbol, operator, bang, quoted, column, word)).parse(rest) {
            Ok((after, token)) => {
                tokens.push(token);
                rest = after;
            }
            Err(_) => {
                let position = input.len() - rest.len();
                let reason = match rest.chars().next() {
                    Some('"') => "Unterminated quoted value",
                    Some('[') => "Unterminated column name",
                    _ => "Unexpected character",
                };
                return Err(parse_error(format!("{reason} at position {position} in '{input}'")));
            }
        }
    }
}

// ---- Recursive descent: OR < AND (explicit or implicit) < NOT < primary ----

struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,       // Open parentheses and NOTs around the current position
    max_nesting: usize,
}

impl TokenStream {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    // Parentheses and NOTs may not nest past max_nesting
    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.max_nesting {
            return Err(parse_error(format!("Query nesting exceeds maximum {}", self.max_nesting)));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expression> {
        let mut children = vec![self.parse_and()?];
        while self.eat(&Token::Or) {
            children.push(self.parse_and()?);
        }
        Ok(Expression::or(children))
    }

    fn parse_and(&mut self) -> Result<Expression> {
        let mut children = vec![self.parse_not()?];
        loop {
            if self.eat(&Token::And) {
                children.push(self.parse_not()?);
                continue;
            }
            match self.peek() {
                Some(Token::Or) | Some(Token::RParen) | None => break,
                _ => children.push(self.parse_not()?),
            }
        }
        Ok(Expression::and(children))
    }

    fn parse_not(&mut self) -> Result<Expression> {
        if self.eat(&Token::Not) {
            self.enter()?;
            let inner = self.parse_not()?;
            self.depth -= 1;
            return Ok(Expression::not(inner));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        match self.next() {
            Some(Token::LParen) => {
                if self.eat(&Token::RParen) {
                    return Err(parse_error("Empty parentheses".to_string()));
                }
                self.enter()?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                if !self.eat(&Token::RParen) {
                    return Err(parse_error("Missing closing ')'".to_string()));
                }
                Ok(inner)
            }
            Some(Token::Column(name)) => {
                let op = match self.next() {
                    Some(Token::Op(op)) => op,
                    _ => return Err(parse_error(format!("Expected an operator after column [{name}]"))),
                };
                let value = self.parse_value(&format!("[{name}] {op}"))?;
                Ok(Expression::Term(TermExpression::new(Some(&name), op, &value)))
            }
            Some(Token::Word(word)) => {
                if let Some(Token::Op(op)) = self.peek().cloned() {
                    self.pos += 1;
                    let value = self.parse_value(&format!("{word} {op}"))?;
                    return Ok(Expression::Term(TermExpression::new(Some(&word), op, &value)));
                }
                if word == "*" {
                    return Ok(Expression::All);
                }
                Ok(Expression::any_column(&word))
            }
            Some(Token::Text(text)) => Ok(Expression::any_column(&text)),
            Some(Token::Op(op)) => {
                let value = self.parse_value(&op.to_string())?;
                Ok(Expression::Term(TermExpression::new(None, op, &value)))
            }
            Some(token) => Err(parse_error(format!("Unexpected {}", describe(&token)))),
            None => Err(parse_error("Unexpected end of query".to_string())),
        }
    }

    fn parse_value(&mut self, after: &str) -> Result<String> {
        match self.next() {
            Some(Token::Word(value)) | Some(Token::Text(value)) => Ok(value),
            // Keywords are ordinary values once an operator precedes them
            Some(Token::And) => Ok("and".to_string()),
            Some(Token::Or) => Ok("or".to_string()),
            Some(Token::Not) => Ok("not".to_string()),
            _ => Err(parse_error(format!("Expected a value after '{after}'"))),
        }
    }
}
