//! Recursive-descent parser for tag queries

use super::{CompareOp, Comparison, MetaPredicate, TagQuery};
use crate::{
    error::{DatasetError, Result},
    types::Rating,
};

/// e621 metatags that sort, page or look up other entities; there is no way to
/// express them as a filter over a single record.
const UNSUPPORTED_METATAGS: &[&str] = &[
    "order", "limit", "id", "md5", "user", "status", "pool", "set", "fav", "source",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prefix {
    None,
    Minus,
    Tilde,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Word(Prefix, String),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: usize,
}

/// Split a query into whitespace-separated words with their byte positions
fn words(input: &str) -> Vec<(usize, &str)> {
    let mut words = Vec::new();
    let mut start = None;

    for (index, c) in input.char_indices().chain(std::iter::once((input.len(), ' '))) {
        match (c.is_whitespace(), start) {
            (true, Some(begin)) => {
                words.extend(input.get(begin..index).map(|word| (begin, word)));
                start = None;
            },
            (false, None) => start = Some(index),
            _ => {},
        }
    }
    words
}

/// Tokenize a query
///
/// Parentheses group only as standalone words, as on e621, so tags such as
/// `fox_(species)` stay whole.
fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();

    for (position, word) in words(input) {
        let kind = match word {
            "(" => TokenKind::LParen,
            ")" => TokenKind::RParen,
            "AND" | "&&" => TokenKind::And,
            "OR" | "||" => TokenKind::Or,
            "NOT" | "!" | "-" => TokenKind::Not,
            "~" => {
                return Err(DatasetError::query_syntax(
                    position,
                    "'~' must be followed by a tag",
                ))
            },
            _ => {
                if let Some(rest) = word.strip_prefix('-').or_else(|| word.strip_prefix('!')) {
                    TokenKind::Word(Prefix::Minus, rest.to_string())
                } else if let Some(rest) = word.strip_prefix('~') {
                    TokenKind::Word(Prefix::Tilde, rest.to_string())
                } else {
                    TokenKind::Word(Prefix::None, word.to_string())
                }
            },
        };
        tokens.push(Token { kind, position });
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn position(&self) -> usize {
        self.peek().map_or(self.end, |token| token.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<TagQuery> {
        let mut alternatives = vec![self.parse_and()?];
        while matches!(self.peek(), Some(Token { kind: TokenKind::Or, .. })) {
            self.advance();
            alternatives.push(self.parse_and()?);
        }
        Ok(collapse(alternatives, TagQuery::Or))
    }

    fn parse_and(&mut self) -> Result<TagQuery> {
        let mut operands = Vec::new();
        let mut tilde_group = Vec::new();
        let mut tilde_slot = None;

        loop {
            let Some(token) = self.peek() else { break };
            match &token.kind {
                TokenKind::RParen | TokenKind::Or => break,
                TokenKind::And => {
                    let position = token.position;
                    self.advance();
                    if !self.starts_operand() {
                        return Err(DatasetError::query_syntax(
                            position,
                            "expected an operand after AND",
                        ));
                    }
                },
                TokenKind::Word(Prefix::Tilde, text) => {
                    let (text, position) = (text.clone(), token.position);
                    self.advance();
                    tilde_slot.get_or_insert(operands.len());
                    tilde_group.push(atom(&text, position)?);
                },
                _ => operands.push(self.parse_unary()?),
            }
        }

        if let Some(slot) = tilde_slot {
            operands.insert(slot, collapse(tilde_group, TagQuery::Or));
        }
        if operands.is_empty() {
            return Err(DatasetError::query_syntax(
                self.position(),
                "expected a tag or '('",
            ));
        }
        Ok(collapse(operands, TagQuery::And))
    }

    fn parse_unary(&mut self) -> Result<TagQuery> {
        let position = self.position();
        let Some(token) = self.advance() else {
            return Err(DatasetError::query_syntax(position, "unexpected end of query"));
        };

        match token.kind {
            TokenKind::Not => {
                if !self.starts_operand() {
                    return Err(DatasetError::query_syntax(
                        position,
                        "expected an operand after NOT",
                    ));
                }
                Ok(TagQuery::Not(Box::new(self.parse_unary()?)))
            },
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(inner),
                    _ => Err(DatasetError::query_syntax(position, "unclosed '('")),
                }
            },
            TokenKind::Word(Prefix::Minus, text) => {
                Ok(TagQuery::Not(Box::new(atom(&text, token.position)?)))
            },
            TokenKind::Word(_, text) => atom(&text, token.position),
            TokenKind::RParen => Err(DatasetError::query_syntax(position, "unexpected ')'")),
            TokenKind::And | TokenKind::Or => Err(DatasetError::query_syntax(
                position,
                "operator is missing its left operand",
            )),
        }
    }

    fn starts_operand(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token {
                kind: TokenKind::Not | TokenKind::LParen | TokenKind::Word(..),
                ..
            })
        )
    }
}

fn collapse(mut items: Vec<TagQuery>, combine: fn(Vec<TagQuery>) -> TagQuery) -> TagQuery {
    if items.len() == 1 {
        items.remove(0)
    } else {
        combine(items)
    }
}

fn atom(text: &str, position: usize) -> Result<TagQuery> {
    if text.is_empty() {
        return Err(DatasetError::query_syntax(position, "empty tag"));
    }

    let Some((name, value)) = text.split_once(':') else {
        return Ok(TagQuery::Tag(text.to_string()));
    };

    let lowered = name.to_lowercase();
    let predicate = match lowered.as_str() {
        "rating" => MetaPredicate::Rating(Rating::parse(value).ok_or_else(|| {
            DatasetError::query_syntax(position, format!("unknown rating '{value}'"))
        })?),
        "score" => MetaPredicate::Score(comparison(value, position)?),
        "favcount" | "fav_count" => MetaPredicate::FavCount(comparison(value, position)?),
        "width" | "image_width" => MetaPredicate::Width(comparison(value, position)?),
        "height" | "image_height" => MetaPredicate::Height(comparison(value, position)?),
        "ext" | "type" | "file_ext" => {
            if value.is_empty() {
                return Err(DatasetError::query_syntax(position, "ext: needs a value"));
            }
            MetaPredicate::Ext(value.to_lowercase())
        },
        other if UNSUPPORTED_METATAGS.contains(&other) => {
            return Err(DatasetError::query_syntax(
                position,
                format!("metatag '{other}:' is not supported"),
            ))
        },
        // Tags such as `16:9` legitimately contain a colon
        _ => return Ok(TagQuery::Tag(text.to_string())),
    };

    Ok(TagQuery::Meta(predicate))
}

fn comparison(value: &str, position: usize) -> Result<Comparison> {
    let (op, number) = if let Some(rest) = value.strip_prefix(">=") {
        (CompareOp::Ge, rest)
    } else if let Some(rest) = value.strip_prefix("<=") {
        (CompareOp::Le, rest)
    } else if let Some(rest) = value.strip_prefix('>') {
        (CompareOp::Gt, rest)
    } else if let Some(rest) = value.strip_prefix('<') {
        (CompareOp::Lt, rest)
    } else if let Some(rest) = value.strip_prefix('=') {
        (CompareOp::Eq, rest)
    } else {
        (CompareOp::Eq, value)
    };

    let value = number.parse::<i64>().map_err(|_| {
        DatasetError::query_syntax(position, format!("expected a number, found '{number}'"))
    })?;
    Ok(Comparison { op, value })
}

/// Parse a complete query string
pub(super) fn parse(input: &str) -> Result<TagQuery> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok(TagQuery::Any);
    }

    let mut parser = Parser {
        tokens,
        cursor: 0,
        end: input.len(),
    };
    let query = parser.parse_or()?;

    if let Some(token) = parser.peek() {
        return Err(DatasetError::query_syntax(token.position, "unexpected ')'"));
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str) -> TagQuery {
        TagQuery::Tag(name.to_string())
    }

    fn not(query: TagQuery) -> TagQuery {
        TagQuery::Not(Box::new(query))
    }

    fn syntax_error_position(input: &str) -> usize {
        match parse(input) {
            Err(DatasetError::InvalidQuerySyntax { position, .. }) => position,
            other => panic!("expected syntax error for {input:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_juxtaposition_is_and() {
        assert_eq!(
            parse("a b c").unwrap(),
            TagQuery::And(vec![tag("a"), tag("b"), tag("c")])
        );
        assert_eq!(parse("a && b").unwrap(), parse("a AND b").unwrap());
    }

    #[test]
    fn test_or_binds_looser_than_and() {
        assert_eq!(
            parse("a b OR c").unwrap(),
            TagQuery::Or(vec![TagQuery::And(vec![tag("a"), tag("b")]), tag("c")])
        );
    }

    #[test]
    fn test_negation_forms() {
        let expected = TagQuery::And(vec![tag("a"), not(tag("b"))]);
        assert_eq!(parse("a -b").unwrap(), expected);
        assert_eq!(parse("a !b").unwrap(), expected);
        assert_eq!(parse("a NOT b").unwrap(), expected);
        assert_eq!(parse("a ! b").unwrap(), expected);
        assert_eq!(parse("NOT NOT a").unwrap(), not(not(tag("a"))));
        assert_eq!(
            parse("- ( a OR b )").unwrap(),
            not(TagQuery::Or(vec![tag("a"), tag("b")]))
        );
    }

    #[test]
    fn test_tilde_group_becomes_single_or() {
        assert_eq!(
            parse("a ~b -c ~d").unwrap(),
            TagQuery::And(vec![
                tag("a"),
                TagQuery::Or(vec![tag("b"), tag("d")]),
                not(tag("c")),
            ])
        );
        // A lone ~tag behaves like a required tag
        assert_eq!(parse("~a").unwrap(), tag("a"));
    }

    #[test]
    fn test_parenthesised_tags_stay_whole() {
        assert_eq!(parse("fox_(species)").unwrap(), tag("fox_(species)"));
        assert_eq!(parse("-fox_(species)").unwrap(), not(tag("fox_(species)")));
        assert_eq!(
            parse("~a_(b) ~c").unwrap(),
            TagQuery::Or(vec![tag("a_(b)"), tag("c")])
        );
        assert_eq!(
            parse("mario_(series) smile_(expression)").unwrap(),
            TagQuery::And(vec![tag("mario_(series)"), tag("smile_(expression)")])
        );
    }

    #[test]
    fn test_standalone_parens_group() {
        assert_eq!(
            parse("( a OR b )").unwrap(),
            TagQuery::Or(vec![tag("a"), tag("b")])
        );
        assert_eq!(
            parse("wolf ( fox_(species) OR cat )").unwrap(),
            TagQuery::And(vec![
                tag("wolf"),
                TagQuery::Or(vec![tag("fox_(species)"), tag("cat")]),
            ])
        );
        // Attached parens belong to the tag
        assert_eq!(
            parse("(a OR b)").unwrap(),
            TagQuery::Or(vec![tag("(a"), tag("b)")])
        );
    }

    #[test]
    fn test_positions_with_wide_whitespace() {
        assert_eq!(syntax_error_position("a\u{3000}AND"), 4);
    }

    #[test]
    fn test_keywords_are_uppercase_only() {
        assert_eq!(
            parse("cat and dog").unwrap(),
            TagQuery::And(vec![tag("cat"), tag("and"), tag("dog")])
        );
    }

    #[test]
    fn test_colon_tags_and_metatags() {
        assert_eq!(parse("16:9").unwrap(), tag("16:9"));
        assert_eq!(
            parse("score:>10").unwrap(),
            TagQuery::Meta(MetaPredicate::Score(Comparison {
                op: CompareOp::Gt,
                value: 10
            }))
        );
        assert_eq!(
            parse("type:PNG").unwrap(),
            TagQuery::Meta(MetaPredicate::Ext("png".to_string()))
        );
    }

    #[test]
    fn test_syntax_errors_report_position() {
        assert_eq!(syntax_error_position("a AND"), 2);
        assert_eq!(syntax_error_position("( a OR b"), 0);
        assert_eq!(syntax_error_position("a )"), 2);
        assert_eq!(syntax_error_position("OR a"), 0);
        assert_eq!(syntax_error_position("a OR"), 4);
        assert_eq!(syntax_error_position("( )"), 2);
        assert_eq!(syntax_error_position("a NOT"), 2);
        assert_eq!(syntax_error_position("a ~"), 2);
        assert_eq!(syntax_error_position("a -"), 2);
    }

    #[test]
    fn test_invalid_metatags() {
        assert!(parse("order:score").is_err());
        assert!(parse("limit:10").is_err());
        assert!(parse("rating:x").is_err());
        assert!(parse("score:>=high").is_err());
        assert!(parse("ext:").is_err());
    }
}
