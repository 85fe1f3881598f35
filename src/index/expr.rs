//! Tag expressions
//!
//! Expressions filter series by tag (or by the synthetic `name` tag):
//!
//! ```text
//! key=value     exact match         key=     key is absent
//! key!=value    anything else       key!=    key is present
//! key=~regex    regex, anchored at the start of the value
//! key!=~regex   regex does not match
//! ```
//!
//! A series without the key has the empty value for the purpose of regex
//! operators, so `key=~.*` also matches series lacking `key`.

use crate::index::{IndexError, IndexResult};
use crate::metric::MetricDefinition;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    combinator::{rest, value},
    sequence::tuple,
    IResult,
};
use regex::Regex;

/// Comparison operator of an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    Match,
    NotMatch,
}

impl Operator {
    fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
            Operator::Match => "=~",
            Operator::NotMatch => "!=~",
        }
    }
}

/// One parsed `key<op>value` expression
#[derive(Debug, Clone)]
pub struct TagExpression {
    pub key: String,
    pub operator: Operator,
    pub value: String,
    regex: Option<Regex>,
}

fn tag_key(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !matches!(c, ';' | '!' | '^' | '='))(input)
}

fn operator(input: &str) -> IResult<&str, Operator> {
    alt((
        value(Operator::NotMatch, tag("!=~")),
        value(Operator::NotEqual, tag("!=")),
        value(Operator::Match, tag("=~")),
        value(Operator::Equal, tag("=")),
    ))(input)
}

fn expression(input: &str) -> IResult<&str, (&str, Operator, &str)> {
    tuple((tag_key, operator, rest))(input)
}

impl TagExpression {
    /// Parse and, for regex operators, compile an expression
    pub fn parse(input: &str) -> IndexResult<Self> {
        let (_, (key, operator, raw_value)) = expression(input)
            .map_err(|_| IndexError::Expression(format!("invalid expression: {:?}", input)))?;

        let regex = match operator {
            Operator::Match | Operator::NotMatch => {
                let anchored = format!("^(?:{})", raw_value);
                Some(Regex::new(&anchored).map_err(|e| {
                    IndexError::Expression(format!("invalid regex in {:?}: {}", input, e))
                })?)
            }
            Operator::Equal | Operator::NotEqual => {
                if raw_value.contains(';') {
                    return Err(IndexError::Expression(format!(
                        "invalid value in {:?}",
                        input
                    )));
                }
                None
            }
        };

        Ok(Self {
            key: key.to_string(),
            operator,
            value: raw_value.to_string(),
            regex,
        })
    }

    /// Whether a series whose value for `key` is `value` passes
    pub fn matches_value(&self, value: Option<&str>) -> bool {
        match self.operator {
            Operator::Equal if self.value.is_empty() => value.is_none(),
            Operator::Equal => value == Some(self.value.as_str()),
            Operator::NotEqual if self.value.is_empty() => value.is_some(),
            Operator::NotEqual => value != Some(self.value.as_str()),
            Operator::Match => self.regex_matches(value.unwrap_or("")),
            Operator::NotMatch => !self.regex_matches(value.unwrap_or("")),
        }
    }

    /// Evaluate directly against a definition
    pub fn matches(&self, def: &MetricDefinition) -> bool {
        self.matches_value(def.tag_value(&self.key))
    }

    /// Whether the expression matches series that lack the key
    pub fn matches_absent(&self) -> bool {
        self.matches_value(None)
    }

    /// Regex test used by the index when scanning values
    pub(crate) fn regex_matches(&self, value: &str) -> bool {
        self.regex.as_ref().map_or(false, |re| re.is_match(value))
    }

    /// Lower runs first when intersecting
    fn cost(&self) -> u8 {
        match self.operator {
            Operator::Equal if !self.value.is_empty() => 0,
            Operator::Match if !self.matches_absent() => 1,
            Operator::Match => 2,
            _ => 3,
        }
    }
}

impl std::fmt::Display for TagExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.key, self.operator.as_str(), self.value)
    }
}

/// ANDed list of expressions, ordered cheapest first
#[derive(Debug, Clone)]
pub struct TagQuery {
    expressions: Vec<TagExpression>,
}

impl TagQuery {
    pub fn parse<S: AsRef<str>>(expressions: &[S]) -> IndexResult<Self> {
        if expressions.is_empty() {
            return Err(IndexError::Expression("no tags specified".to_string()));
        }

        let mut parsed = expressions
            .iter()
            .map(|e| TagExpression::parse(e.as_ref()))
            .collect::<IndexResult<Vec<_>>>()?;
        parsed.sort_by_key(TagExpression::cost);

        Ok(Self {
            expressions: parsed,
        })
    }

    pub fn expressions(&self) -> &[TagExpression] {
        &self.expressions
    }

    /// Scan evaluation against a single definition
    pub fn matches(&self, def: &MetricDefinition) -> bool {
        self.expressions.iter().all(|e| e.matches(def))
    }
}
