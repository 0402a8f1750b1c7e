//! Tag query filtering
//!
//! A [`TagQuery`] is a boolean expression tree over tag-set membership, built once
//! from user input by [`TagQuery::parse`] and evaluated read-only against every
//! [`Record`]. Syntax errors surface at parse time, before any record is read.
//!
//! The grammar accepts both explicit operators and e621's search syntax:
//!
//! ```rust
//! use e621_noapi::query::TagQuery;
//!
//! let explicit = TagQuery::parse("wolf AND ( solo OR duo ) AND NOT comic")?;
//! let e621 = TagQuery::parse("wolf ~solo ~duo -comic")?;
//! assert_eq!(explicit, e621);
//! # Ok::<(), e621_noapi::DatasetError>(())
//! ```

mod parser;
mod prefilter;

pub use prefilter::{FilterRejection, RecordFilter};

use crate::{
    error::Result,
    types::{Rating, Record},
};
use std::fmt;

/// Comparison operator of a numeric metatag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }

    fn holds(self, actual: i64, expected: i64) -> bool {
        match self {
            Self::Eq => actual == expected,
            Self::Gt => actual > expected,
            Self::Ge => actual >= expected,
            Self::Lt => actual < expected,
            Self::Le => actual <= expected,
        }
    }
}

/// Numeric comparison against a record attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Comparison {
    pub op: CompareOp,
    pub value: i64,
}

impl Comparison {
    fn holds(self, actual: Option<i64>) -> bool {
        actual.is_some_and(|actual| self.op.holds(actual, self.value))
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.symbol(), self.value)
    }
}

/// Predicate on post metadata (`rating:e`, `score:>=10`, ...)
///
/// A record without the attribute never satisfies the predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaPredicate {
    Rating(Rating),
    Score(Comparison),
    FavCount(Comparison),
    Width(Comparison),
    Height(Comparison),
    Ext(String),
}

impl MetaPredicate {
    fn matches(&self, record: &Record) -> bool {
        let meta = &record.metadata;
        match self {
            Self::Rating(rating) => meta.rating == Some(*rating),
            Self::Score(cmp) => cmp.holds(meta.score),
            Self::FavCount(cmp) => cmp.holds(meta.fav_count),
            Self::Width(cmp) => cmp.holds(meta.width.map(i64::from)),
            Self::Height(cmp) => cmp.holds(meta.height.map(i64::from)),
            Self::Ext(ext) => record.extension().is_some_and(|actual| actual == *ext),
        }
    }
}

impl fmt::Display for MetaPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rating(Rating::Safe) => write!(f, "rating:s"),
            Self::Rating(Rating::Questionable) => write!(f, "rating:q"),
            Self::Rating(Rating::Explicit) => write!(f, "rating:e"),
            Self::Score(cmp) => write!(f, "score:{cmp}"),
            Self::FavCount(cmp) => write!(f, "favcount:{cmp}"),
            Self::Width(cmp) => write!(f, "width:{cmp}"),
            Self::Height(cmp) => write!(f, "height:{cmp}"),
            Self::Ext(ext) => write!(f, "ext:{ext}"),
        }
    }
}

/// Boolean expression over a record's tag set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagQuery {
    /// The empty query; matches every record
    Any,
    /// Exact tag membership
    Tag(String),
    /// Metadata predicate
    Meta(MetaPredicate),
    Not(Box<TagQuery>),
    And(Vec<TagQuery>),
    Or(Vec<TagQuery>),
}

impl TagQuery {
    /// Parse a query string.
    ///
    /// # Errors
    /// Returns `DatasetError::InvalidQuerySyntax` describing the first problem found.
    pub fn parse(input: &str) -> Result<Self> {
        parser::parse(input)
    }

    /// Evaluate the query against a record
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Any => true,
            Self::Tag(tag) => record.has_tag(tag),
            Self::Meta(predicate) => predicate.matches(record),
            Self::Not(inner) => !inner.matches(record),
            Self::And(items) => items.iter().all(|item| item.matches(record)),
            Self::Or(items) => items.iter().any(|item| item.matches(record)),
        }
    }

    /// Render the query in a form that parses back to the same query
    ///
    /// Returns `None` when a tag cannot be written in query syntax, such as a
    /// tag named `AND` or one starting with `-` or `~`.
    #[must_use]
    pub fn to_query_string(&self) -> Option<String> {
        if *self == Self::Any {
            return Some(String::new());
        }
        let rendered = self.to_string();
        (Self::parse(&rendered).ok()? == *self).then_some(rendered)
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(_) | Self::Or(_) => write!(f, "( {self} )"),
            _ => write!(f, "{self}"),
        }
    }
}

/// Human-readable rendering with explicit operators
///
/// Tags that collide with the query syntax are written verbatim, so the output
/// does not always parse back; use [`TagQuery::to_query_string`] for that.
impl fmt::Display for TagQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Tag(tag) => write!(f, "{tag}"),
            Self::Meta(predicate) => write!(f, "{predicate}"),
            Self::Not(inner) => {
                write!(f, "NOT ")?;
                inner.fmt_operand(f)
            },
            Self::And(items) | Self::Or(items) => {
                let separator = if matches!(self, Self::And(_)) {
                    " AND "
                } else {
                    " OR "
                };
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(separator)?;
                    }
                    item.fmt_operand(f)?;
                }
                Ok(())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RecordMetadata, SourceReference};
    use std::path::PathBuf;

    fn record(tags: &[&str]) -> Record {
        Record {
            id: "1".to_string(),
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            source: SourceReference::Path(PathBuf::from("1.png")),
            metadata: RecordMetadata::default(),
        }
    }

    #[test]
    fn test_and_not_scenario() {
        let query = TagQuery::parse("a AND NOT b").unwrap();
        let records = [record(&["a", "b"]), record(&["a"]), record(&["b"])];
        let matched: Vec<bool> = records.iter().map(|r| query.matches(r)).collect();
        assert_eq!(matched, vec![false, true, false]);
    }

    #[test]
    fn test_any_matches_everything() {
        let query = TagQuery::parse("   ").unwrap();
        assert_eq!(query, TagQuery::Any);
        assert!(query.matches(&record(&[])));
    }

    #[test]
    fn test_tags_are_case_sensitive() {
        let query = TagQuery::parse("Wolf").unwrap();
        assert!(!query.matches(&record(&["wolf"])));
        assert!(query.matches(&record(&["Wolf"])));
    }

    #[test]
    fn test_meta_predicates() {
        let mut post = record(&["wolf"]);
        post.metadata.rating = Some(Rating::Explicit);
        post.metadata.score = Some(15);
        post.metadata.width = Some(1024);
        post.metadata.file_ext = Some("png".to_string());

        assert!(TagQuery::parse("rating:e score:>=10").unwrap().matches(&post));
        assert!(!TagQuery::parse("rating:s").unwrap().matches(&post));
        assert!(TagQuery::parse("width:>512 ext:png").unwrap().matches(&post));
        assert!(!TagQuery::parse("score:<15").unwrap().matches(&post));

        // Missing attributes never satisfy a predicate
        assert!(!TagQuery::parse("height:>=1").unwrap().matches(&post));
        assert!(!TagQuery::parse("favcount:0").unwrap().matches(&post));
    }

    #[test]
    fn test_display_round_trips_through_parser() {
        let query = TagQuery::parse("a ( b || fox_(species) ) -d score:>=3").unwrap();
        let rendered = query.to_string();
        assert_eq!(
            rendered,
            "a AND ( b OR fox_(species) ) AND NOT d AND score:>=3"
        );
        assert_eq!(TagQuery::parse(&rendered).unwrap(), query);
        assert_eq!(query.to_query_string(), Some(rendered));
    }

    #[test]
    fn test_parenthesised_tag_matches_its_record() {
        let query = TagQuery::parse("fox_(species)").unwrap();
        assert!(query.matches(&record(&["fox_(species)", "solo"])));
        assert!(!query.matches(&record(&["fox_", "species"])));
    }

    #[test]
    fn test_unwritable_tags_have_no_query_string() {
        for name in ["AND", "-x", "~x", "(", "rating:s", "two words"] {
            let query = TagQuery::And(vec![
                TagQuery::Tag("a".to_string()),
                TagQuery::Tag(name.to_string()),
            ]);
            assert_eq!(query.to_query_string(), None, "tag {name:?}");
        }
        assert_eq!(TagQuery::Any.to_query_string(), Some(String::new()));
        assert_eq!(
            TagQuery::Tag("16:9".to_string()).to_query_string(),
            Some("16:9".to_string())
        );
    }
}
