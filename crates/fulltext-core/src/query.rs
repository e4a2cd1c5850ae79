//! Query planning.
//!
//! A query string is split on whitespace and every word goes through the
//! same class segmentation as indexed text. `*` and `?` stick to the run they
//! touch (a leading wildcard attaches to the following run), so `2023fin*`
//! becomes the term `2023` plus the wildcard `fin*`. Runs carrying a
//! wildcard are matched against indexed terms, letter and digit runs become
//! exact term clauses, CJK runs become phrases over their ideographs. All
//! clauses must match.

use crate::analyzer::{CharClass, classify};
use crate::error::Result;
use regex::Regex;

#[derive(Debug, Clone)]
pub enum Clause {
    Term(String),
    /// Terms at consecutive positions.
    Phrase(Vec<String>),
    Wildcard {
        /// Literal text before the first wildcard, used to narrow the scan.
        prefix: String,
        matcher: Regex,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ParsedQuery {
    pub clauses: Vec<Clause>,
}

impl ParsedQuery {
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

#[inline]
fn is_wildcard(c: char) -> bool {
    matches!(c, '*' | '?')
}

fn wildcard_clause(word: &str) -> Result<Clause> {
    let word = word.to_ascii_lowercase();
    let prefix: String = word.chars().take_while(|&c| !is_wildcard(c)).collect();

    let mut pattern = String::with_capacity(word.len() + 8);
    pattern.push('^');
    for c in word.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            _ => pattern.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    pattern.push('$');

    Ok(Clause::Wildcard {
        prefix,
        matcher: Regex::new(&pattern)?,
    })
}

/// A run of one character class inside a query word, wildcards included.
struct Run {
    class: CharClass,
    text: String,
    wildcard: bool,
}

fn word_runs(word: &str) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    let mut open = false;
    let mut leading = String::new();

    for c in word.chars() {
        if is_wildcard(c) {
            match runs.last_mut() {
                Some(run) if open => {
                    run.text.push(c);
                    run.wildcard = true;
                }
                _ => leading.push(c),
            }
            continue;
        }

        let class = classify(c);
        if class == CharClass::Symbol {
            open = false;
            leading.clear();
            continue;
        }

        match runs.last_mut() {
            Some(run) if open && run.class == class => run.text.push(c),
            _ => {
                let mut text = std::mem::take(&mut leading);
                let wildcard = !text.is_empty();
                text.push(c);
                runs.push(Run {
                    class,
                    text,
                    wildcard,
                });
                open = true;
            }
        }
    }

    runs
}

fn cjk_clause(text: &str) -> Clause {
    let chars: Vec<String> = text.chars().map(String::from).collect();
    match <[String; 1]>::try_from(chars) {
        Ok([single]) => Clause::Term(single),
        Err(chars) => Clause::Phrase(chars),
    }
}

pub fn parse_query(query: &str) -> Result<ParsedQuery> {
    let mut clauses = Vec::new();

    for word in query.split_whitespace() {
        if word.chars().all(is_wildcard) {
            // a bare "*" matches every term and adds nothing to an AND query
            if clauses.is_empty() {
                clauses.push(wildcard_clause(word)?);
            }
            continue;
        }

        for run in word_runs(word) {
            match run.class {
                // ideographs are indexed one per term, a wildcard inside a
                // CJK run only splits it
                CharClass::Cjk => clauses.extend(
                    run.text
                        .split(is_wildcard)
                        .filter(|piece| !piece.is_empty())
                        .map(cjk_clause),
                ),
                _ if run.wildcard => clauses.push(wildcard_clause(&run.text)?),
                CharClass::Latin => clauses.push(Clause::Term(run.text.to_ascii_lowercase())),
                _ => clauses.push(Clause::Term(run.text)),
            }
        }
    }

    Ok(ParsedQuery { clauses })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn describe(query: &ParsedQuery) -> Vec<String> {
        query
            .clauses
            .iter()
            .map(|clause| match clause {
                Clause::Term(t) => format!("term:{t}"),
                Clause::Phrase(p) => format!("phrase:{}", p.join("|")),
                Clause::Wildcard { prefix, matcher } => {
                    format!("wild:{prefix}:{}", matcher.as_str())
                }
            })
            .collect()
    }

    #[test]
    fn words_are_analyzed_into_clauses() {
        let parsed = parse_query("Hello foo123 世界").unwrap();
        assert_eq!(
            describe(&parsed),
            vec!["term:hello", "term:foo", "term:123", "phrase:世|界"]
        );
    }

    #[test]
    fn single_ideograph_is_a_term() {
        let parsed = parse_query("中").unwrap();
        assert_eq!(describe(&parsed), vec!["term:中"]);
    }

    #[test]
    fn wildcards_keep_literal_prefix() {
        let parsed = parse_query("Hel*o *orld").unwrap();
        assert_eq!(
            describe(&parsed),
            vec!["wild:hel:^hel.*o$", "wild::^.*orld$"]
        );
    }

    #[test]
    fn wildcard_words_follow_class_boundaries() {
        let parsed = parse_query("2023fin* foo-ba* 年度* *porting").unwrap();
        assert_eq!(
            describe(&parsed),
            vec![
                "term:2023",
                "wild:fin:^fin.*$",
                "term:foo",
                "wild:ba:^ba.*$",
                "phrase:年|度",
                "wild::^.*porting$",
            ]
        );
    }

    #[test]
    fn symbols_split_wildcard_words() {
        let parsed = parse_query("a.b* Report*2024").unwrap();
        assert_eq!(
            describe(&parsed),
            vec!["term:a", "wild:b:^b.*$", "wild:report:^report.*$", "term:2024"]
        );
    }

    #[test]
    fn leading_wildcard_is_dropped_at_a_symbol() {
        let parsed = parse_query("*-draft 报*告").unwrap();
        assert_eq!(describe(&parsed), vec!["term:draft", "term:报", "term:告"]);
    }

    #[test]
    fn bare_wildcard_only_matters_alone() {
        assert_eq!(describe(&parse_query("*").unwrap()), vec!["wild::^.*$"]);
        assert_eq!(
            describe(&parse_query("draft * ?").unwrap()),
            vec!["term:draft"]
        );
    }

    #[test]
    fn symbols_only_query_is_empty() {
        assert!(parse_query("--- ,,,").unwrap().is_empty());
    }
}
