//! Boolean-expression grammar over condition names.
//!
//! `not`/`and`/`or` are case-insensitive. Once an AND or OR binds a chain,
//! only that operator may continue the chain at that nesting level; mixing
//! requires explicit parentheses. There is no operator precedence.

use crate::domain::errors::ParseError;
use crate::domain::expression::BoolExpr;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Identifier(String),
    LParen,
    RParen,
    Not,
    And,
    Or,
}

fn tokenize(text: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            c if c.is_alphanumeric() || c == '_' || c == '-' => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '-' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match word.to_lowercase().as_str() {
                    "not" => Token::Not,
                    "and" => Token::And,
                    "or" => Token::Or,
                    _ => Token::Identifier(word),
                });
            }
            other => {
                return Err(ParseError::UnknownIdentifier {
                    identifier: other.to_string(),
                })
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    defs: &'a HashMap<String, usize>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// A chain of terms joined by one of AND/OR. The first binary operator
    /// seen locks the chain's operator.
    fn parse_chain(&mut self) -> Result<BoolExpr, ParseError> {
        let mut terms = vec![self.parse_term()?];
        let mut chain_op: Option<Token> = None;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::And => Token::And,
                Token::Or => Token::Or,
                _ => break,
            };
            match &chain_op {
                None => chain_op = Some(op.clone()),
                Some(bound) if *bound != op => return Err(ParseError::MixedAndOr),
                Some(_) => {}
            }
            self.advance();
            terms.push(self.parse_term()?);
        }

        Ok(match chain_op {
            None => terms.remove(0),
            Some(Token::And) => BoolExpr::And(terms),
            Some(_) => BoolExpr::Or(terms),
        })
    }

    fn parse_term(&mut self) -> Result<BoolExpr, ParseError> {
        match self.advance() {
            Some(Token::Not) => {
                // `not` binds exactly one following term.
                if self.peek().is_none() {
                    return Err(ParseError::InvalidNotArity);
                }
                Ok(BoolExpr::Not(Box::new(self.parse_term()?)))
            }
            Some(Token::LParen) => {
                let inner = self.parse_chain()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ParseError::UnbalancedParentheses),
                }
            }
            Some(Token::Identifier(name)) => {
                let index = self.defs.get(&name).ok_or(ParseError::UnknownIdentifier {
                    identifier: name.clone(),
                })?;
                Ok(BoolExpr::Literal(*index))
            }
            Some(Token::RParen) => Err(ParseError::UnbalancedParentheses),
            Some(Token::And) | Some(Token::Or) => Err(ParseError::EmptyExpression),
            None => Err(ParseError::EmptyExpression),
        }
    }
}

/// Parse a boolean expression over the given condition-name definitions.
pub fn parse_bool_expr(
    text: &str,
    defs: &HashMap<String, usize>,
) -> Result<BoolExpr, ParseError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(ParseError::EmptyExpression);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        defs,
    };
    let expr = parser.parse_chain()?;
    if parser.pos != parser.tokens.len() {
        let rest: Vec<String> = parser.tokens[parser.pos..]
            .iter()
            .map(|t| format!("{:?}", t))
            .collect();
        return Err(ParseError::TrailingTokens {
            rest: rest.join(" "),
        });
    }
    Ok(expr)
}
